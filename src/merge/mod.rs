//! Deterministic line-oriented merge engine
//!
//! Pure function from (local text, remote text, resolution hint) to merged
//! text. No I/O, no shared state: the diff action stream is segmented into
//! plain and conflict blocks, and each conflict either auto-resolves to the
//! hinted side or renders git-style textual markers carrying the conflict
//! label. Guards that decide whether to merge at all (identical texts, a
//! file mid human-resolution) live at the call site, not here.

pub mod blocks;
pub mod diff;

pub use blocks::Block;
pub use diff::{diff_lines, DiffAction};

/// Which side a conflict auto-resolves to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Keep the local ("a") lines
    Local,
    /// Take the remote ("b") lines
    Remote,
}

/// Merge two texts. With a hint, conflicts resolve cleanly to the hinted
/// side unless a side already carries `label` (a file mid-resolution keeps
/// its markers). Without a hint, every conflict renders markers labelled
/// with `label`.
pub fn merge(local: &str, remote: &str, resolve: Option<Resolution>, label: &str) -> String {
    let a: Vec<&str> = local.split('\n').collect();
    let b: Vec<&str> = remote.split('\n').collect();

    let script = diff_lines(&a, &b);
    let rendered: Vec<String> = blocks::assemble(&script)
        .iter()
        .filter_map(|block| block.render(resolve, label))
        .collect();

    rendered.join("\n")
}

/// Whether a text already contains this peer's conflict label
pub fn has_conflict_marker(text: &str, label: &str) -> bool {
    text.contains(label)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_text_is_unchanged() {
        for text in ["", "a", "a\nb\nc", "a\n\n\nb", "trailing\n"] {
            assert_eq!(merge(text, text, None, "PEER1"), text);
            assert_eq!(merge(text, text, Some(Resolution::Local), "PEER1"), text);
        }
    }

    #[test]
    fn test_hinted_merge_resolves_clean() {
        // One changed middle line plus a hint: no markers in the output.
        let merged = merge("a\nb\nc", "a\nx\nc", Some(Resolution::Remote), "PEER1");
        assert_eq!(merged, "a\nx\nc");

        let merged = merge("a\nb\nc", "a\nx\nc", Some(Resolution::Local), "PEER1");
        assert_eq!(merged, "a\nb\nc");
    }

    #[test]
    fn test_unhinted_merge_renders_markers() {
        let merged = merge("a\nb\nc", "a\nx\nc", None, "PEER1");
        assert_eq!(
            merged,
            "a\n<<<<<<< PEER1\nb\n=======\nx\n>>>>>>> PEER1\nc"
        );
    }

    #[test]
    fn test_remote_only_addition() {
        let merged = merge("a\nc", "a\nb\nc", None, "PEER1");
        assert_eq!(merged, "a\n<<<<<<< PEER1\n=======\nb\n>>>>>>> PEER1\nc");

        let merged = merge("a\nc", "a\nb\nc", Some(Resolution::Remote), "PEER1");
        assert_eq!(merged, "a\nb\nc");

        // Resolving for the empty local side drops the addition entirely.
        let merged = merge("a\nc", "a\nb\nc", Some(Resolution::Local), "PEER1");
        assert_eq!(merged, "a\nc");
    }

    #[test]
    fn test_hint_reproduces_side_lines_in_order() {
        let local = "one\ntwo\nthree\nfour";
        let remote = "one\n2\nthree\n4\nfive";

        let merged = merge(local, remote, Some(Resolution::Local), "PEER1");
        for line in ["two", "four"] {
            assert!(merged.contains(line));
        }
        assert!(!merged.contains("2\n") && !merged.contains("five"));

        let merged = merge(local, remote, Some(Resolution::Remote), "PEER1");
        assert_eq!(merged, remote);
    }

    #[test]
    fn test_mid_resolution_conflict_keeps_markers_despite_hint() {
        let local = "a\n<<<<<<< PEER1\nb\n=======\nx\n>>>>>>> PEER1\nc";
        let remote = "a\n<<<<<<< PEER1\nz\n=======\nx\n>>>>>>> PEER1\nc";

        let merged = merge(local, remote, Some(Resolution::Remote), "PEER1");
        assert!(merged.contains("<<<<<<< PEER1"));
        assert!(merged.contains(">>>>>>> PEER1"));
    }

    #[test]
    fn test_determinism() {
        let a = "x\ny\nz";
        let b = "x\nq\nz\nw";
        let first = merge(a, b, None, "L");
        for _ in 0..5 {
            assert_eq!(merge(a, b, None, "L"), first);
        }
    }

    #[test]
    fn test_multiple_conflict_regions() {
        let merged = merge("a\nb\nc\nd\ne", "a\nB\nc\nD\ne", None, "P");
        let opens = merged.matches("<<<<<<< P").count();
        let closes = merged.matches(">>>>>>> P").count();
        assert_eq!(opens, 2);
        assert_eq!(closes, 2);
        // Unchanged lines stay outside the conflict blocks.
        assert!(merged.starts_with("a\n"));
        assert!(merged.ends_with("\ne"));
    }
}
