//! treesync - broker-based directory tree synchronization
//!
//! Peers connected to the same AMQP broker keep a directory tree converged.
//! The broker fabric routes every published event to every peer except its
//! originator, so handlers never see their own traffic. Remote changes are
//! gated by a freshness arbiter, file content is reconciled with a
//! deterministic line merge, and conflicting regions surface as inline
//! markers for a human to resolve.
//!
//! ## Services
//!
//! - **Bus**: per-peer AMQP fabric with self-echo suppression
//! - **Router**: consume loop dispatching events to collaborators
//! - **File sync**: change detection, freshness arbitration, line merge
//! - **Replication**: whole-tree bootstrap for joining peers
//! - **Gateway**: HTTP requests tunneled through the mesh

pub mod arbiter;
pub mod bus;
pub mod config;
pub mod error;
pub mod events;
pub mod fs;
pub mod gateway;
pub mod merge;
pub mod peer;
pub mod replicate;
pub mod router;

pub use config::Args;
pub use error::{Error, Result};
pub use merge::{merge, Resolution};
pub use peer::{PeerContext, PeerId};
pub use router::{Collaborator, EventRouter, HandlerRegistry};
