//! Broker topology: broadcast with broker-side self-echo suppression
//!
//! Every publish goes to the shared fanout exchange, which feeds each peer's
//! private headers "negation" exchange. The negation exchange carries a
//! single binding that routes messages whose origin header equals this peer's
//! own id into the shared black-hole exchange; everything else falls through
//! the alternate-exchange path into the peer's own topic exchange and queue.
//! A peer therefore never observes its own publishes, with no consumer-side
//! identity comparison and no publish/self-delivery race.

use lapin::options::{
    ExchangeBindOptions, ExchangeDeclareOptions, ExchangeDeleteOptions, QueueBindOptions,
    QueueDeclareOptions, QueueDeleteOptions,
};
use lapin::types::{AMQPValue, FieldTable};
use lapin::{Channel, ExchangeKind};
use tracing::{debug, info};

use crate::bus::envelope::ORIGIN_HEADER;
use crate::error::{Error, Result};
use crate::peer::PeerId;

/// Shared fanout exchange every peer publishes to
pub const MAIN_EXCHANGE: &str = "sync";
/// Shared black-hole exchange that swallows self-echoes
pub const EMPTY_EXCHANGE: &str = "sync-empty";

/// Broker object names for one peer
#[derive(Debug, Clone)]
pub struct TopologyNames {
    /// Shared fanout broadcast exchange (long-lived)
    pub main: String,
    /// Shared sink exchange with no queue bindings (long-lived)
    pub empty: String,
    /// Per-peer headers exchange filtering out this peer's own messages
    pub negation: String,
    /// Per-peer topic exchange, the negation exchange's alternate
    pub client: String,
    /// Per-peer consumption queue
    pub queue: String,
}

impl TopologyNames {
    /// Derive the full name set for a peer identity
    pub fn for_peer(peer: &PeerId) -> Self {
        Self {
            main: MAIN_EXCHANGE.to_string(),
            empty: EMPTY_EXCHANGE.to_string(),
            negation: format!("sync-negation-{peer}"),
            client: format!("sync-client-{peer}"),
            queue: format!("q-sync-{peer}"),
        }
    }
}

/// Declares and dismantles the peer's routing fabric
pub struct Topology {
    peer: PeerId,
    names: TopologyNames,
}

impl Topology {
    pub fn new(peer: PeerId, names: TopologyNames) -> Self {
        Self { peer, names }
    }

    pub fn names(&self) -> &TopologyNames {
        &self.names
    }

    /// Establish the routing fabric. Idempotent broker RPCs; any failure
    /// (e.g. a conflicting redeclaration) is fatal — the peer must not start
    /// consuming with an inconsistent fabric.
    pub async fn create(&self, channel: &Channel) -> Result<()> {
        let names = &self.names;

        channel
            .exchange_declare(
                &names.main,
                ExchangeKind::Fanout,
                ExchangeDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| Error::Topology(format!("declare '{}': {e}", names.main)))?;

        channel
            .exchange_declare(
                &names.empty,
                ExchangeKind::Direct,
                ExchangeDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| Error::Topology(format!("declare '{}': {e}", names.empty)))?;

        // Unmatched messages fall through to the peer's own exchange.
        let mut negation_args = FieldTable::default();
        negation_args.insert(
            "alternate-exchange".into(),
            AMQPValue::LongString(names.client.as_str().into()),
        );
        channel
            .exchange_declare(
                &names.negation,
                ExchangeKind::Headers,
                ExchangeDeclareOptions {
                    auto_delete: true,
                    ..Default::default()
                },
                negation_args,
            )
            .await
            .map_err(|e| Error::Topology(format!("declare '{}': {e}", names.negation)))?;

        channel
            .exchange_declare(
                &names.client,
                ExchangeKind::Topic,
                ExchangeDeclareOptions {
                    auto_delete: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| Error::Topology(format!("declare '{}': {e}", names.client)))?;

        // The self-filter: messages carrying our own origin header match this
        // binding and end in the black hole.
        let mut self_filter = FieldTable::default();
        self_filter.insert("x-match".into(), AMQPValue::LongString("all".into()));
        self_filter.insert(
            ORIGIN_HEADER.into(),
            AMQPValue::LongString(self.peer.to_string().into()),
        );
        channel
            .exchange_bind(
                &names.empty,
                &names.negation,
                "",
                ExchangeBindOptions::default(),
                self_filter,
            )
            .await
            .map_err(|e| Error::Topology(format!("bind '{}' to '{}': {e}", names.empty, names.negation)))?;

        channel
            .exchange_bind(
                &names.negation,
                &names.main,
                "",
                ExchangeBindOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| {
                Error::Topology(format!("bind '{}' to '{}': {e}", names.negation, names.main))
            })?;

        channel
            .queue_declare(
                &names.queue,
                QueueDeclareOptions {
                    auto_delete: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| Error::Topology(format!("declare queue '{}': {e}", names.queue)))?;

        channel
            .queue_bind(
                &names.queue,
                &names.client,
                "#",
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| Error::Topology(format!("bind queue '{}': {e}", names.queue)))?;

        info!(peer = %self.peer, "Topology established");
        Ok(())
    }

    /// Remove only the per-peer objects. The shared broadcast and sink
    /// exchanges persist for other peers.
    pub async fn teardown(&self, channel: &Channel) -> Result<()> {
        let names = &self.names;

        channel
            .queue_delete(&names.queue, QueueDeleteOptions::default())
            .await
            .map_err(|e| Error::Topology(format!("delete queue '{}': {e}", names.queue)))?;

        for exchange in [&names.negation, &names.client] {
            channel
                .exchange_delete(exchange, ExchangeDeleteOptions::default())
                .await
                .map_err(|e| Error::Topology(format!("delete '{exchange}': {e}")))?;
        }

        debug!(peer = %self.peer, "Topology dismantled");
        Ok(())
    }
}
