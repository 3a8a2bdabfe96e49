//! Outbound publishing
//!
//! All producers (router handlers, the watcher bridge, gateway request
//! tasks) share one fixed-size pool of publish channels. Acquisition is
//! non-blocking: when every channel is in flight the publish fails with
//! `Error::PublishExhausted` and the caller decides what to drop. Every
//! publish stamps the origin-peer header that drives the negation topology.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use lapin::options::BasicPublishOptions;
use lapin::types::{AMQPValue, FieldTable};
use lapin::{BasicProperties, Channel};
use serde::Serialize;
use tokio::sync::Semaphore;
use tracing::trace;

use crate::bus::client::BusClient;
use crate::bus::envelope::{self, ORIGIN_HEADER};
use crate::error::{Error, Result};
use crate::peer::PeerId;

/// Seam for everything that publishes events to the bus
#[async_trait]
pub trait Publish: Send + Sync {
    /// Publish pre-serialized envelope bytes under a routing key
    async fn publish_raw(&self, routing_key: &str, payload: Vec<u8>) -> Result<()>;
}

/// Serialize and publish a typed event
pub async fn publish_event<T: Serialize>(
    publisher: &dyn Publish,
    routing_key: &str,
    event: &T,
) -> Result<()> {
    publisher
        .publish_raw(routing_key, envelope::to_bytes(event)?)
        .await
}

/// Fixed-size pool of AMQP publish channels
pub struct PublisherPool {
    channels: Vec<Channel>,
    permits: Arc<Semaphore>,
    next: AtomicUsize,
    peer: PeerId,
    exchange: String,
}

impl PublisherPool {
    /// Open `size` channels on the connection, all publishing to `exchange`
    pub async fn new(client: &BusClient, peer: PeerId, exchange: &str, size: usize) -> Result<Self> {
        if size == 0 {
            return Err(Error::Config("publisher pool size must be at least 1".into()));
        }

        let mut channels = Vec::with_capacity(size);
        for _ in 0..size {
            channels.push(client.channel().await?);
        }

        Ok(Self {
            permits: Arc::new(Semaphore::new(channels.len())),
            channels,
            next: AtomicUsize::new(0),
            peer,
            exchange: exchange.to_string(),
        })
    }

    fn origin_headers(&self) -> FieldTable {
        let mut headers = FieldTable::default();
        headers.insert(
            ORIGIN_HEADER.into(),
            AMQPValue::LongString(self.peer.to_string().into()),
        );
        headers
    }
}

#[async_trait]
impl Publish for PublisherPool {
    async fn publish_raw(&self, routing_key: &str, payload: Vec<u8>) -> Result<()> {
        let _permit = self
            .permits
            .try_acquire()
            .map_err(|_| Error::PublishExhausted)?;

        let index = self.next.fetch_add(1, Ordering::Relaxed) % self.channels.len();
        let properties = BasicProperties::default()
            .with_content_type("application/json".into())
            .with_headers(self.origin_headers());

        self.channels[index]
            .basic_publish(
                &self.exchange,
                routing_key,
                BasicPublishOptions::default(),
                &payload,
                properties,
            )
            .await?
            .await?;

        trace!(routing_key, bytes = payload.len(), "published");
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Recording publisher for handler tests
    use super::*;
    use serde_json::Value;
    use std::sync::Mutex;

    /// Captures published events instead of talking to a broker
    #[derive(Default)]
    pub struct RecordingPublisher {
        pub sent: Mutex<Vec<(String, Value)>>,
        pub exhausted: bool,
    }

    impl RecordingPublisher {
        pub fn new() -> Self {
            Self::default()
        }

        /// A publisher whose pool is always exhausted
        pub fn exhausted() -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
                exhausted: true,
            }
        }

        pub fn sent_event_types(&self) -> Vec<String> {
            self.sent
                .lock()
                .unwrap()
                .iter()
                .filter_map(|(_, v)| v["event_type"].as_str().map(str::to_string))
                .collect()
        }
    }

    #[async_trait]
    impl Publish for RecordingPublisher {
        async fn publish_raw(&self, routing_key: &str, payload: Vec<u8>) -> Result<()> {
            if self.exhausted {
                return Err(Error::PublishExhausted);
            }
            let value: Value = serde_json::from_slice(&payload)?;
            self.sent
                .lock()
                .unwrap()
                .push((routing_key.to_string(), value));
            Ok(())
        }
    }
}
