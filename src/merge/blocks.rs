//! Block machine and rendering
//!
//! Segments the diff action stream into an ordered sequence of blocks: runs
//! of common lines become `Plain` blocks, contiguous runs of edits become a
//! single `Conflict` block with two named line lists. A conflict region made
//! of only insertions or only removals still yields a conflict block with
//! one side empty.

use super::Resolution;
use crate::merge::diff::DiffAction;

/// A segment of the merged document
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    /// Lines common to both sides
    Plain { lines: Vec<String> },
    /// Two competing line sets with no line-level reconciliation
    Conflict {
        local: Vec<String>,
        remote: Vec<String>,
    },
}

/// Fold the action stream into blocks. A `Keep` closes any open conflict;
/// `Remove`/`Insert` open or continue one, accumulating into the local or
/// remote side respectively.
pub fn assemble(script: &[(DiffAction, &str)]) -> Vec<Block> {
    let mut blocks: Vec<Block> = Vec::new();

    for (action, line) in script {
        let line = line.to_string();
        match action {
            DiffAction::Keep => match blocks.last_mut() {
                Some(Block::Plain { lines }) => lines.push(line),
                _ => blocks.push(Block::Plain { lines: vec![line] }),
            },
            DiffAction::Remove => match blocks.last_mut() {
                Some(Block::Conflict { local, .. }) => local.push(line),
                _ => blocks.push(Block::Conflict {
                    local: vec![line],
                    remote: Vec::new(),
                }),
            },
            DiffAction::Insert => match blocks.last_mut() {
                Some(Block::Conflict { remote, .. }) => remote.push(line),
                _ => blocks.push(Block::Conflict {
                    local: Vec::new(),
                    remote: vec![line],
                }),
            },
        }
    }

    blocks
}

impl Block {
    /// Render this block. A conflict renders clean (hinted side only) when a
    /// resolution hint is supplied and neither side already carries the
    /// conflict label; otherwise it renders full markers. An empty side
    /// contributes no line section. Returns `None` when a hinted conflict
    /// resolves to a side with no lines at all, so the block collapses away
    /// instead of leaving a stray blank line.
    pub fn render(&self, resolve: Option<Resolution>, label: &str) -> Option<String> {
        match self {
            Block::Plain { lines } => Some(lines.join("\n")),
            Block::Conflict { local, remote } => {
                let mid_resolution = local
                    .iter()
                    .chain(remote.iter())
                    .any(|line| line.contains(label));

                if let Some(side) = resolve {
                    if !mid_resolution {
                        let chosen = match side {
                            Resolution::Local => local,
                            Resolution::Remote => remote,
                        };
                        if chosen.is_empty() {
                            return None;
                        }
                        return Some(chosen.join("\n"));
                    }
                }

                let mut out = vec![marker('<', label)];
                if !local.is_empty() {
                    out.push(local.join("\n"));
                }
                out.push("=======".to_string());
                if !remote.is_empty() {
                    out.push(remote.join("\n"));
                }
                out.push(marker('>', label));
                Some(out.join("\n"))
            }
        }
    }
}

fn marker(symbol: char, label: &str) -> String {
    let bar: String = std::iter::repeat(symbol).take(7).collect();
    if label.is_empty() {
        bar
    } else {
        format!("{bar} {label}")
    }
}
