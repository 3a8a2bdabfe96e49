//! File synchronization events
//!
//! Timestamps are epoch seconds. `edited_on` is the filesystem modification
//! time at emission and, when present, outranks the wall-clock `timestamp`
//! during freshness arbitration.

use serde::{Deserialize, Serialize};

use crate::arbiter::unix_now;

pub const EVENT_TYPE_CREATED: &str = "created";
pub const EVENT_TYPE_MODIFIED: &str = "modified";
pub const EVENT_TYPE_DELETED: &str = "deleted";
pub const EVENT_TYPE_MOVED: &str = "moved";
pub const EVENT_TYPE_CONTENT: &str = "content";
pub const EVENT_TYPE_CONTENT_REQUEST: &str = "content_request";

/// A change observed on some peer's filesystem
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileChangeEvent {
    pub event_type: String,
    /// Path relative to the sync root
    pub src_path: String,
    /// Destination path for renames
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dest_path: Option<String>,
    pub is_directory: bool,
    /// Emission wall-clock time
    pub timestamp: f64,
    /// Filesystem mtime at emission
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edited_on: Option<f64>,
}

/// Ask whichever peer has it to broadcast a file's content
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentRequest {
    pub event_type: String,
    pub src_path: String,
    pub timestamp: f64,
}

impl ContentRequest {
    pub fn new(src_path: &str) -> Self {
        Self {
            event_type: EVENT_TYPE_CONTENT_REQUEST.to_string(),
            src_path: src_path.to_string(),
            timestamp: unix_now(),
        }
    }
}

/// Full text content of one file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentEvent {
    pub event_type: String,
    pub src_path: String,
    pub content: String,
    pub timestamp: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edited_on: Option<f64>,
}

impl ContentEvent {
    pub fn new(src_path: &str, content: String, edited_on: f64) -> Self {
        Self {
            event_type: EVENT_TYPE_CONTENT.to_string(),
            src_path: src_path.to_string(),
            content,
            timestamp: unix_now(),
            edited_on: Some(edited_on),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_optional_fields_stay_off_the_wire() {
        let event = FileChangeEvent {
            event_type: EVENT_TYPE_MODIFIED.into(),
            src_path: "a.txt".into(),
            dest_path: None,
            is_directory: false,
            timestamp: 1.0,
            edited_on: None,
        };
        let wire = serde_json::to_value(&event).unwrap();
        assert!(wire.get("dest_path").is_none());
        assert!(wire.get("edited_on").is_none());
    }

    #[test]
    fn test_content_event_carries_edited_on() {
        let event = ContentEvent::new("a.txt", "hello".into(), 42.0);
        assert_eq!(event.event_type, "content");
        assert_eq!(event.edited_on, Some(42.0));
        assert!(event.timestamp > 0.0);
    }
}
