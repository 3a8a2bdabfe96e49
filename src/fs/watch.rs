//! Watcher bridge
//!
//! Change capture itself is an external concern: anything able to observe
//! the tree feeds `WatchNotification`s into a channel, and the bridge task
//! wraps them with relative paths plus `timestamp`/`edited_on` and publishes
//! them. The bridge runs as its own task and only ever touches the
//! non-blocking publish path, so it never stalls the router.
//!
//! `spawn_poll_scanner` is the built-in capture source for the daemon: a
//! coarse mtime sweep that emits created/modified/deleted notifications.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::arbiter::unix_now;
use crate::bus::publish::{publish_event, Publish};
use crate::fs::events::{
    FileChangeEvent, EVENT_TYPE_CREATED, EVENT_TYPE_DELETED, EVENT_TYPE_MODIFIED, EVENT_TYPE_MOVED,
};
use crate::fs::paths::relativize;
use crate::peer::PeerContext;

/// Kind of raw filesystem change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Modified,
    Deleted,
    Moved,
}

impl ChangeKind {
    pub fn event_type(self) -> &'static str {
        match self {
            ChangeKind::Created => EVENT_TYPE_CREATED,
            ChangeKind::Modified => EVENT_TYPE_MODIFIED,
            ChangeKind::Deleted => EVENT_TYPE_DELETED,
            ChangeKind::Moved => EVENT_TYPE_MOVED,
        }
    }
}

/// Raw change notification from whatever capture source is wired in
#[derive(Debug, Clone)]
pub struct WatchNotification {
    pub kind: ChangeKind,
    pub src_path: PathBuf,
    pub dest_path: Option<PathBuf>,
    pub is_directory: bool,
}

/// Wrap raw notifications and publish them to the bus
pub fn spawn_watch_bridge(
    mut notifications: mpsc::Receiver<WatchNotification>,
    publisher: Arc<dyn Publish>,
    ctx: Arc<PeerContext>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(root = %ctx.sync_root.display(), "watch bridge started");

        while let Some(note) = notifications.recv().await {
            let now = unix_now();
            let event = FileChangeEvent {
                event_type: note.kind.event_type().to_string(),
                src_path: relativize(&ctx.sync_root, &note.src_path),
                dest_path: note
                    .dest_path
                    .as_deref()
                    .map(|p| relativize(&ctx.sync_root, p)),
                is_directory: note.is_directory,
                timestamp: now,
                edited_on: Some(now),
            };

            debug!(kind = ?note.kind, path = %event.src_path, "publishing local change");
            if let Err(e) = publish_event(publisher.as_ref(), "event.file", &event).await {
                // Exhausted pool or broker hiccup: the notification is
                // droppable, peers can re-request content later.
                warn!(path = %event.src_path, error = %e, "dropping local change notification");
            }
        }

        info!("watch bridge stopped: notification channel closed");
    })
}

/// Periodic mtime sweep emitting change notifications into the bridge
pub fn spawn_poll_scanner(
    root: PathBuf,
    interval: Duration,
    notifications: mpsc::Sender<WatchNotification>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut seen: HashMap<PathBuf, f64> = HashMap::new();
        let mut first_sweep = true;
        let mut ticker = tokio::time::interval(interval);

        loop {
            ticker.tick().await;

            let mut current: HashMap<PathBuf, f64> = HashMap::new();
            collect_mtimes(&root, &mut current);

            for (path, mtime) in &current {
                let kind = match seen.get(path) {
                    None => ChangeKind::Created,
                    Some(old) if old < mtime => ChangeKind::Modified,
                    Some(_) => continue,
                };
                // The first sweep only primes the baseline.
                if !first_sweep {
                    let note = WatchNotification {
                        kind,
                        src_path: path.clone(),
                        dest_path: None,
                        is_directory: false,
                    };
                    if notifications.send(note).await.is_err() {
                        return;
                    }
                }
            }

            if !first_sweep {
                for path in seen.keys() {
                    if !current.contains_key(path) {
                        let note = WatchNotification {
                            kind: ChangeKind::Deleted,
                            src_path: path.clone(),
                            dest_path: None,
                            is_directory: false,
                        };
                        if notifications.send(note).await.is_err() {
                            return;
                        }
                    }
                }
            }

            seen = current;
            first_sweep = false;
        }
    })
}

fn collect_mtimes(dir: &Path, out: &mut HashMap<PathBuf, f64>) {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return,
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_mtimes(&path, out);
        } else {
            out.insert(path.clone(), crate::arbiter::modified_at(&path));
        }
    }
}
