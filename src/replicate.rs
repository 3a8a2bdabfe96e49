//! Whole-tree replication
//!
//! A joining peer can ask the mesh for everything: it publishes a
//! `tree_request`, and every peer that hears it walks its sync root and
//! broadcasts each file as a `tree_content` event with base64-encoded bytes.
//! Receivers write whatever they do not already hold. This is a bulk
//! bootstrap path and does no merging; the line-merge pipeline takes over
//! once the trees converge.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::bus::envelope;
use crate::bus::publish::{publish_event, Publish};
use crate::error::{Error, Result};
use crate::events::EVENT_TYPE_READY;
use crate::fs::paths::{relativize, resolve_in_root};
use crate::peer::PeerContext;
use crate::router::Collaborator;

pub const EVENT_TYPE_TREE_REQUEST: &str = "tree_request";
pub const EVENT_TYPE_TREE_CONTENT: &str = "tree_content";

/// Routing key for tree replication traffic
const TREE_ROUTING_KEY: &str = "event.tree";

/// Ask every peer to broadcast its whole tree
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeRequest {
    pub event_type: String,
}

impl TreeRequest {
    pub fn new() -> Self {
        Self {
            event_type: EVENT_TYPE_TREE_REQUEST.to_string(),
        }
    }
}

impl Default for TreeRequest {
    fn default() -> Self {
        Self::new()
    }
}

/// One file of a broadcast tree
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeContent {
    pub event_type: String,
    /// Path relative to the sync root
    pub path: String,
    /// Base64-encoded file bytes
    pub content: String,
}

impl TreeContent {
    pub fn new(path: String, bytes: &[u8]) -> Self {
        Self {
            event_type: EVENT_TYPE_TREE_CONTENT.to_string(),
            path,
            content: BASE64.encode(bytes),
        }
    }
}

/// Collaborator owning the tree replication event types
pub struct TreeReplicator {
    publisher: Arc<dyn Publish>,
    ctx: Arc<PeerContext>,
    replicate_on_start: bool,
}

impl TreeReplicator {
    pub fn new(publisher: Arc<dyn Publish>, ctx: Arc<PeerContext>, replicate_on_start: bool) -> Self {
        Self {
            publisher,
            ctx,
            replicate_on_start,
        }
    }

    async fn on_ready(&self) -> Result<()> {
        if !self.replicate_on_start {
            return Ok(());
        }
        info!("requesting full tree from the mesh");
        publish_event(self.publisher.as_ref(), TREE_ROUTING_KEY, &TreeRequest::new()).await
    }

    /// Walk the tree and broadcast every file. An unreadable file is logged
    /// and skipped so one bad entry cannot abort the whole broadcast.
    async fn on_request(&self) -> Result<()> {
        let mut files = Vec::new();
        collect_files(&self.ctx.sync_root, &mut files);
        info!(count = files.len(), "broadcasting tree");

        for path in files {
            let bytes = match std::fs::read(&path) {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping unreadable file");
                    continue;
                }
            };
            let event = TreeContent::new(relativize(&self.ctx.sync_root, &path), &bytes);
            if let Err(e) =
                publish_event(self.publisher.as_ref(), TREE_ROUTING_KEY, &event).await
            {
                warn!(path = %path.display(), error = %e, "skipping file after publish failure");
            }
        }
        Ok(())
    }

    async fn on_content(&self, event: TreeContent) -> Result<()> {
        let path = resolve_in_root(&self.ctx.sync_root, &event.path)?;
        let bytes = BASE64
            .decode(&event.content)
            .map_err(|e| Error::Decode(format!("tree content for {}: {e}", event.path)))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Error::storage(parent.to_path_buf(), e))?;
        }
        std::fs::write(&path, bytes).map_err(|e| Error::storage(path, e))?;
        debug!(path = %event.path, "replicated file");
        Ok(())
    }
}

fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(path = %dir.display(), error = %e, "skipping unreadable directory");
            return;
        }
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_files(&path, out);
        } else {
            out.push(path);
        }
    }
}

#[async_trait]
impl Collaborator for TreeReplicator {
    fn subscriptions(&self) -> Vec<&'static str> {
        vec![EVENT_TYPE_READY, EVENT_TYPE_TREE_REQUEST, EVENT_TYPE_TREE_CONTENT]
    }

    async fn handle(&self, event_type: &str, event: &Value) -> Result<()> {
        match event_type {
            EVENT_TYPE_READY => self.on_ready().await,
            EVENT_TYPE_TREE_REQUEST => self.on_request().await,
            EVENT_TYPE_TREE_CONTENT => self.on_content(envelope::from_value(event)?).await,
            other => {
                warn!(event_type = other, "tree replicator received unclaimed event type");
                Ok(())
            }
        }
    }
}
