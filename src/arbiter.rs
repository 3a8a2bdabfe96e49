//! Freshness arbitration
//!
//! Decides, without coordination, which of two concurrently edited versions
//! is authoritative. The remote side wins iff its best timestamp is strictly
//! greater than the local modification time; `edited_on` (filesystem mtime at
//! emission) beats the wall-clock emission `timestamp` whenever present.
//! A file that does not exist locally gets a sentinel mtime below any real
//! timestamp, so incoming content for unknown files is always accepted.

use std::path::Path;
use std::time::UNIX_EPOCH;

use chrono::Utc;

/// Sentinel modification time for files that do not exist locally
pub const MISSING_MTIME: f64 = -1.0;

/// Whether the remote version is authoritative over the local one
pub fn is_remote_newer(
    local_mtime: f64,
    remote_timestamp: f64,
    remote_edited_on: Option<f64>,
) -> bool {
    remote_edited_on.unwrap_or(remote_timestamp) > local_mtime
}

/// Local modification time as epoch seconds, or the sentinel when missing
pub fn modified_at(path: &Path) -> f64 {
    std::fs::metadata(path)
        .and_then(|meta| meta.modified())
        .ok()
        .and_then(|mtime| mtime.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs_f64())
        .unwrap_or(MISSING_MTIME)
}

/// Current wall clock as epoch seconds (the wire timestamp format)
pub fn unix_now() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_strict_comparison() {
        assert!(is_remote_newer(100.0, 101.0, None));
        assert!(!is_remote_newer(100.0, 100.0, None));
        assert!(!is_remote_newer(100.0, 99.0, None));
    }

    #[test]
    fn test_edited_on_beats_timestamp() {
        // Stale edit carried by a fresh envelope loses.
        assert!(!is_remote_newer(100.0, 200.0, Some(50.0)));
        // Fresh edit carried by a stale envelope wins.
        assert!(is_remote_newer(100.0, 50.0, Some(200.0)));
        assert!(!is_remote_newer(100.0, 200.0, Some(100.0)));
    }

    #[test]
    fn test_missing_file_always_loses() {
        assert!(is_remote_newer(MISSING_MTIME, 0.0, None));
        assert!(is_remote_newer(MISSING_MTIME, -0.5, None));
        assert!(is_remote_newer(MISSING_MTIME, 0.0, Some(-0.5)));
    }

    #[test]
    fn test_modified_at_sentinel_and_real() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.txt");
        assert_eq!(modified_at(&missing), MISSING_MTIME);

        let present = dir.path().join("yes.txt");
        let mut f = std::fs::File::create(&present).unwrap();
        f.write_all(b"hello").unwrap();
        drop(f);

        let mtime = modified_at(&present);
        assert!(mtime > 0.0);
        // A remote edit stamped after the local mtime is newer.
        assert!(is_remote_newer(mtime, mtime + 1.0, None));
        assert!(!is_remote_newer(mtime, mtime, None));
    }
}
