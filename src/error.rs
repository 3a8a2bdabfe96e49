//! Error taxonomy for treesync
//!
//! Topology failures are fatal at startup; everything scoped to a single
//! event (path escapes, storage I/O, publish exhaustion, bad payloads) is
//! logged and dropped by the dispatch loop.

use std::path::PathBuf;

/// Crate-wide error type
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Broker fabric could not be established or torn down
    #[error("topology setup failed: {0}")]
    Topology(String),

    /// Underlying AMQP failure
    #[error("broker error: {0}")]
    Broker(#[from] lapin::Error),

    /// A relative path resolved outside the sync root
    #[error("path '{0}' escapes the sync root")]
    PathEscape(PathBuf),

    /// Local read/write failure while handling an event
    #[error("storage failure on '{path}': {source}")]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Non-blocking acquisition of a publish channel failed
    #[error("publisher pool exhausted")]
    PublishExhausted,

    /// Malformed envelope or event payload
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Base64 payload in an event could not be decoded
    #[error("undecodable payload: {0}")]
    Decode(String),

    /// Two collaborators claimed the same event type
    #[error("duplicate handler registered for event type '{0}'")]
    DuplicateHandler(String),

    /// Invalid configuration value
    #[error("configuration error: {0}")]
    Config(String),

    /// Gateway-local failure (bad body, unroutable URL)
    #[error("gateway error: {0}")]
    Gateway(String),
}

impl Error {
    /// Wrap an I/O error with the path it occurred on
    pub fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Storage {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
