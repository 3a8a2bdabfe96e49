//! Sync-root path resolution
//!
//! Every path on the wire is relative to the sync root. Resolution walks the
//! components and rejects anything that could land outside the root before
//! any read or write happens — a security invariant, not a style choice.

use std::path::{Component, Path, PathBuf};

use crate::error::{Error, Result};

/// Resolve a wire path under the sync root, rejecting escapes
pub fn resolve_in_root(root: &Path, relative: &str) -> Result<PathBuf> {
    let candidate = Path::new(relative);
    if candidate.is_absolute() {
        return Err(Error::PathEscape(candidate.to_path_buf()));
    }

    let mut resolved = root.to_path_buf();
    for component in candidate.components() {
        match component {
            Component::Normal(part) => resolved.push(part),
            Component::CurDir => {}
            // ParentDir, RootDir, Prefix: all escape routes.
            _ => return Err(Error::PathEscape(candidate.to_path_buf())),
        }
    }
    Ok(resolved)
}

/// Wire representation of a local path: relative to the root, `/`-separated
pub fn relativize(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    let parts: Vec<String> = relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    parts.join("/")
}
