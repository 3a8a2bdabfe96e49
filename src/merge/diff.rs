//! Line-level shortest edit script
//!
//! Myers' greedy O((N+M)D) diff over line sequences. The output is the
//! ordered action stream consumed by the block machine: `Keep` for common
//! lines, `Remove` for local-only ("a") lines, `Insert` for remote-only
//! ("b") lines.

/// One step of the edit script
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffAction {
    /// Line common to both sides
    Keep,
    /// Line present only on the remote ("b") side
    Insert,
    /// Line present only on the local ("a") side
    Remove,
}

/// Diff two line sequences into an ordered action stream
pub fn diff_lines<'a>(a: &[&'a str], b: &[&'a str]) -> Vec<(DiffAction, &'a str)> {
    if a.is_empty() && b.is_empty() {
        return Vec::new();
    }
    let trace = shortest_edit(a, b);
    backtrack(a, b, &trace)
}

/// Forward pass: furthest-reaching x per diagonal, snapshotted per depth
fn shortest_edit(a: &[&str], b: &[&str]) -> Vec<Vec<isize>> {
    let n = a.len() as isize;
    let m = b.len() as isize;
    let max = n + m;
    let offset = max;

    let mut v = vec![0isize; (2 * max + 1) as usize];
    let mut trace = Vec::new();

    for d in 0..=max {
        trace.push(v.clone());

        let mut k = -d;
        while k <= d {
            let idx = (k + offset) as usize;
            let mut x = if k == -d || (k != d && v[idx - 1] < v[idx + 1]) {
                v[idx + 1]
            } else {
                v[idx - 1] + 1
            };
            let mut y = x - k;

            while x < n && y < m && a[x as usize] == b[y as usize] {
                x += 1;
                y += 1;
            }
            v[idx] = x;

            if x >= n && y >= m {
                return trace;
            }
            k += 2;
        }
    }

    unreachable!("edit distance cannot exceed the combined length");
}

/// Walk the trace back from (n, m), emitting the script in reverse
fn backtrack<'a>(
    a: &[&'a str],
    b: &[&'a str],
    trace: &[Vec<isize>],
) -> Vec<(DiffAction, &'a str)> {
    let n = a.len() as isize;
    let m = b.len() as isize;
    let offset = n + m;

    let mut x = n;
    let mut y = m;
    let mut script = Vec::new();

    for (d, v) in trace.iter().enumerate().rev() {
        let d = d as isize;
        let k = x - y;
        let idx = (k + offset) as usize;

        let prev_k = if k == -d || (k != d && v[idx - 1] < v[idx + 1]) {
            k + 1
        } else {
            k - 1
        };
        let prev_x = v[(prev_k + offset) as usize];
        let prev_y = prev_x - prev_k;

        while x > prev_x && y > prev_y {
            script.push((DiffAction::Keep, a[(x - 1) as usize]));
            x -= 1;
            y -= 1;
        }

        if d > 0 {
            if x == prev_x {
                script.push((DiffAction::Insert, b[(y - 1) as usize]));
            } else {
                script.push((DiffAction::Remove, a[(x - 1) as usize]));
            }
        }

        x = prev_x;
        y = prev_y;
    }

    script.reverse();
    script
}
