//! Broker plumbing: connection, topology fabric, publishing, envelopes.

pub mod client;
pub mod envelope;
pub mod publish;
pub mod topology;

pub use client::BusClient;
pub use envelope::ORIGIN_HEADER;
pub use publish::{publish_event, Publish, PublisherPool};
pub use topology::{Topology, TopologyNames, EMPTY_EXCHANGE, MAIN_EXCHANGE};
