//! Filesystem synchronization: events, handlers, path guards, watcher bridge.

pub mod events;
pub mod handlers;
pub mod paths;
pub mod watch;

pub use events::{ContentEvent, ContentRequest, FileChangeEvent};
pub use handlers::FileSyncHandlers;
pub use paths::{relativize, resolve_in_root};
pub use watch::{spawn_poll_scanner, spawn_watch_bridge, ChangeKind, WatchNotification};
