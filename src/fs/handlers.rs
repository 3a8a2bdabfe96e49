//! File synchronization handlers
//!
//! The reconciliation pipeline: a remote `modified` notification is gated by
//! the freshness arbiter into a `content_request`; whoever holds the file
//! answers with a `content` event; receivers merge that content into their
//! local copy, auto-resolving toward whichever side the arbiter declares
//! authoritative. Handlers must be idempotent — identical-content deliveries
//! are no-ops — because the bus only guarantees at-least-once handling.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use crate::arbiter::{is_remote_newer, modified_at};
use crate::bus::envelope;
use crate::bus::publish::{publish_event, Publish};
use crate::error::{Error, Result};
use crate::fs::events::{
    ContentEvent, ContentRequest, FileChangeEvent, EVENT_TYPE_CONTENT, EVENT_TYPE_CONTENT_REQUEST,
    EVENT_TYPE_MODIFIED,
};
use crate::fs::paths::resolve_in_root;
use crate::merge::{self, Resolution};
use crate::peer::PeerContext;

/// Routing key for file synchronization traffic
const FILE_ROUTING_KEY: &str = "event.file";

/// Collaborator owning the file synchronization event types
pub struct FileSyncHandlers {
    publisher: Arc<dyn Publish>,
    ctx: Arc<PeerContext>,
}

impl FileSyncHandlers {
    pub fn new(publisher: Arc<dyn Publish>, ctx: Arc<PeerContext>) -> Self {
        Self { publisher, ctx }
    }

    fn local_path(&self, src_path: &str) -> Result<PathBuf> {
        resolve_in_root(&self.ctx.sync_root, src_path)
    }

    /// A peer saw this file change. If their copy is fresher than ours, ask
    /// the network to broadcast the content; a stale notification is ignored.
    async fn on_modified(&self, event: FileChangeEvent) -> Result<()> {
        if event.is_directory {
            return Ok(());
        }
        let path = self.local_path(&event.src_path)?;

        if is_remote_newer(modified_at(&path), event.timestamp, event.edited_on) {
            debug!(path = %event.src_path, "remote change is newer, requesting content");
            publish_event(
                self.publisher.as_ref(),
                FILE_ROUTING_KEY,
                &ContentRequest::new(&event.src_path),
            )
            .await?;
        }
        Ok(())
    }

    /// Broadcast our copy of the requested file
    async fn on_content_request(&self, event: ContentRequest) -> Result<()> {
        let path = self.local_path(&event.src_path)?;
        let content =
            std::fs::read_to_string(&path).map_err(|e| Error::storage(path.clone(), e))?;

        let response = ContentEvent::new(&event.src_path, content, modified_at(&path));
        publish_event(self.publisher.as_ref(), FILE_ROUTING_KEY, &response).await
    }

    /// Merge incoming content into the local copy
    async fn on_content(&self, event: ContentEvent) -> Result<()> {
        let path = self.local_path(&event.src_path)?;

        let local = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(Error::storage(path, e)),
        };

        if local == event.content {
            return Ok(());
        }

        let label = &self.ctx.conflict_label;
        if merge::has_conflict_marker(&local, label) != merge::has_conflict_marker(&event.content, label)
        {
            // One side is mid human-resolution; merging into or out of it
            // would wreck the markers. Drop the event.
            warn!(path = %event.src_path, "dropping content event: one side holds unresolved markers");
            return Ok(());
        }

        let resolve = if is_remote_newer(modified_at(&path), event.timestamp, event.edited_on) {
            Resolution::Remote
        } else {
            Resolution::Local
        };
        let merged = merge::merge(&local, &event.content, Some(resolve), label);

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Error::storage(parent.to_path_buf(), e))?;
        }
        std::fs::write(&path, merged).map_err(|e| Error::storage(path.clone(), e))?;
        debug!(path = %event.src_path, ?resolve, "merged remote content");
        Ok(())
    }
}

#[async_trait]
impl crate::router::Collaborator for FileSyncHandlers {
    fn subscriptions(&self) -> Vec<&'static str> {
        vec![
            EVENT_TYPE_MODIFIED,
            EVENT_TYPE_CONTENT_REQUEST,
            EVENT_TYPE_CONTENT,
        ]
    }

    async fn handle(&self, event_type: &str, event: &Value) -> Result<()> {
        match event_type {
            EVENT_TYPE_MODIFIED => self.on_modified(envelope::from_value(event)?).await,
            EVENT_TYPE_CONTENT_REQUEST => {
                self.on_content_request(envelope::from_value(event)?).await
            }
            EVENT_TYPE_CONTENT => self.on_content(envelope::from_value(event)?).await,
            other => {
                warn!(event_type = other, "file sync received unclaimed event type");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::publish::testing::RecordingPublisher;
    use crate::peer::PeerId;
    use std::time::Duration;
    use tempfile::TempDir;

    /// Far enough in the future to beat any real mtime
    const FAR_FUTURE: f64 = 4e12;

    fn fixture(label: &str) -> (TempDir, Arc<RecordingPublisher>, FileSyncHandlers) {
        let dir = tempfile::tempdir().unwrap();
        let publisher = Arc::new(RecordingPublisher::new());
        let ctx = Arc::new(PeerContext::new(
            PeerId::generate(),
            dir.path().to_path_buf(),
            Some(label.to_string()),
            Duration::from_secs(5),
        ));
        let handlers = FileSyncHandlers::new(
            Arc::clone(&publisher) as Arc<dyn Publish>,
            ctx,
        );
        (dir, publisher, handlers)
    }

    fn change_event(src_path: &str, edited_on: f64) -> FileChangeEvent {
        FileChangeEvent {
            event_type: EVENT_TYPE_MODIFIED.into(),
            src_path: src_path.into(),
            dest_path: None,
            is_directory: false,
            timestamp: edited_on,
            edited_on: Some(edited_on),
        }
    }

    fn content_event(src_path: &str, content: &str, edited_on: f64) -> ContentEvent {
        ContentEvent {
            event_type: EVENT_TYPE_CONTENT.into(),
            src_path: src_path.into(),
            content: content.into(),
            timestamp: edited_on,
            edited_on: Some(edited_on),
        }
    }

    #[tokio::test]
    async fn test_newer_remote_change_triggers_content_request() {
        let (_dir, publisher, handlers) = fixture("PEER1");

        handlers
            .on_modified(change_event("a.txt", FAR_FUTURE))
            .await
            .unwrap();
        assert_eq!(publisher.sent_event_types(), vec!["content_request"]);
    }

    #[tokio::test]
    async fn test_stale_remote_change_is_ignored() {
        let (dir, publisher, handlers) = fixture("PEER1");
        std::fs::write(dir.path().join("a.txt"), "current").unwrap();

        handlers.on_modified(change_event("a.txt", 1.0)).await.unwrap();
        assert!(publisher.sent_event_types().is_empty());
    }

    #[tokio::test]
    async fn test_directory_changes_are_skipped() {
        let (_dir, publisher, handlers) = fixture("PEER1");
        let mut event = change_event("some-dir", FAR_FUTURE);
        event.is_directory = true;

        handlers.on_modified(event).await.unwrap();
        assert!(publisher.sent_event_types().is_empty());
    }

    #[tokio::test]
    async fn test_content_request_broadcasts_file() {
        let (dir, publisher, handlers) = fixture("PEER1");
        std::fs::write(dir.path().join("a.txt"), "hello\nworld").unwrap();

        handlers
            .on_content_request(ContentRequest::new("a.txt"))
            .await
            .unwrap();

        let sent = publisher.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        let (routing_key, event) = &sent[0];
        assert_eq!(routing_key, "event.file");
        assert_eq!(event["event_type"], "content");
        assert_eq!(event["content"], "hello\nworld");
        assert!(event["edited_on"].as_f64().unwrap() > 0.0);
    }

    #[tokio::test]
    async fn test_identical_content_is_a_noop() {
        let (dir, _publisher, handlers) = fixture("PEER1");
        let path = dir.path().join("a.txt");
        std::fs::write(&path, "same").unwrap();
        let mtime_before = modified_at(&path);

        handlers
            .on_content(content_event("a.txt", "same", FAR_FUTURE))
            .await
            .unwrap();

        // No rewrite happened.
        assert_eq!(modified_at(&path), mtime_before);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "same");
    }

    #[tokio::test]
    async fn test_marker_mismatch_drops_event() {
        let (dir, _publisher, handlers) = fixture("PEER1");
        let path = dir.path().join("a.txt");
        let mid_resolution = "<<<<<<< PEER1\nb\n=======\nx\n>>>>>>> PEER1";
        std::fs::write(&path, mid_resolution).unwrap();

        handlers
            .on_content(content_event("a.txt", "clean text", FAR_FUTURE))
            .await
            .unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), mid_resolution);
    }

    #[tokio::test]
    async fn test_newer_remote_content_wins_merge() {
        let (dir, _publisher, handlers) = fixture("PEER1");
        let path = dir.path().join("a.txt");
        std::fs::write(&path, "a\nb\nc").unwrap();

        handlers
            .on_content(content_event("a.txt", "a\nx\nc", FAR_FUTURE))
            .await
            .unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "a\nx\nc");
    }

    #[tokio::test]
    async fn test_older_remote_content_loses_merge() {
        let (dir, _publisher, handlers) = fixture("PEER1");
        let path = dir.path().join("a.txt");
        std::fs::write(&path, "a\nb\nc").unwrap();

        handlers
            .on_content(content_event("a.txt", "a\nx\nc", 1.0))
            .await
            .unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "a\nb\nc");
    }

    #[tokio::test]
    async fn test_content_for_unknown_file_is_accepted() {
        let (dir, _publisher, handlers) = fixture("PEER1");

        handlers
            .on_content(content_event("nested/new.txt", "fresh", 1.0))
            .await
            .unwrap();

        assert_eq!(
            std::fs::read_to_string(dir.path().join("nested/new.txt")).unwrap(),
            "fresh"
        );
    }

    #[tokio::test]
    async fn test_escaping_paths_are_rejected() {
        let (_dir, publisher, handlers) = fixture("PEER1");

        let err = handlers
            .on_content(content_event("../escape.txt", "evil", FAR_FUTURE))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::PathEscape(_)));

        let err = handlers
            .on_modified(change_event("../escape.txt", FAR_FUTURE))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::PathEscape(_)));
        assert!(publisher.sent_event_types().is_empty());
    }
}
