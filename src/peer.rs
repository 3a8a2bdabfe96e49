//! Peer identity and per-process context
//!
//! `PeerId` is generated once per process lifetime and never persisted. It
//! names the peer's private broker objects and tags every outbound message
//! through the `client-id` origin header. `PeerContext` replaces ambient
//! globals: it is built once at startup and passed to every component that
//! needs identity, topology names, or the sync root.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use uuid::Uuid;

use crate::bus::topology::TopologyNames;

/// Opaque per-process peer identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeerId(Uuid);

impl PeerId {
    /// Generate a fresh identity for this process
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Short prefix for labels and log lines
    pub fn short(&self) -> String {
        self.0.to_string()[..8].to_string()
    }
}

impl From<Uuid> for PeerId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Shared per-process context, constructed once at startup
#[derive(Debug, Clone)]
pub struct PeerContext {
    /// This peer's identity
    pub peer_id: PeerId,
    /// Broker object names derived from the identity
    pub topology: TopologyNames,
    /// Root directory all sync paths resolve under
    pub sync_root: PathBuf,
    /// Label rendered into conflict markers
    pub conflict_label: String,
    /// How long the gateway waits for a correlated response
    pub gateway_timeout: Duration,
}

impl PeerContext {
    pub fn new(
        peer_id: PeerId,
        sync_root: PathBuf,
        conflict_label: Option<String>,
        gateway_timeout: Duration,
    ) -> Self {
        let conflict_label = conflict_label.unwrap_or_else(|| peer_id.short());
        Self {
            peer_id,
            topology: TopologyNames::for_peer(&peer_id),
            sync_root,
            conflict_label,
            gateway_timeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peer_ids_are_unique() {
        assert_ne!(PeerId::generate(), PeerId::generate());
    }

    #[test]
    fn test_short_is_prefix() {
        let peer = PeerId::generate();
        assert_eq!(peer.short().len(), 8);
        assert!(peer.to_string().starts_with(&peer.short()));
    }

    #[test]
    fn test_context_defaults_label_to_short_id() {
        let peer = PeerId::generate();
        let ctx = PeerContext::new(peer, PathBuf::from("."), None, Duration::from_secs(5));
        assert_eq!(ctx.conflict_label, peer.short());

        let ctx = PeerContext::new(
            peer,
            PathBuf::from("."),
            Some("PEER1".into()),
            Duration::from_secs(5),
        );
        assert_eq!(ctx.conflict_label, "PEER1");
    }
}
