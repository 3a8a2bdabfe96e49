//! Event router
//!
//! Single per-peer consumption loop. Collaborators contribute handlers for
//! the event types they own; the merged table rejects duplicate claims at
//! registration time, except for the local-only `_ready` signal, which is
//! broadcast to every collaborator that subscribes to it. Dispatch is strictly sequential — handlers never run
//! concurrently with each other — and each delivery is acknowledged only
//! after its handler returns, so a crash mid-handler leaves the message for
//! broker redelivery. Event-local handler failures are logged and the event
//! dropped; only topology and connection failures escape the loop.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures_util::StreamExt;
use lapin::message::Delivery;
use lapin::options::{BasicAckOptions, BasicConsumeOptions};
use lapin::types::FieldTable;
use lapin::Channel;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::bus::publish::{publish_event, Publish};
use crate::bus::envelope;
use crate::error::{Error, Result};
use crate::events::{PingEvent, PongEvent, EVENT_TYPE_PING, EVENT_TYPE_PONG, EVENT_TYPE_READY};
use crate::peer::PeerContext;

/// Routing key for the liveness probe/reply pair
const LIVENESS_ROUTING_KEY: &str = "event";

/// A component owning a set of event types
#[async_trait]
pub trait Collaborator: Send + Sync {
    /// Event types this collaborator handles, including the local-only
    /// `_ready` event if it wants a start-of-consumption signal
    fn subscriptions(&self) -> Vec<&'static str>;

    /// Handle one event, synchronously from the router's point of view
    async fn handle(&self, event_type: &str, event: &Value) -> Result<()>;
}

/// Handler table merged from all registered collaborators
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn Collaborator>>,
    ready: Vec<Arc<dyn Collaborator>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a collaborator's subscriptions into the table. Claiming an
    /// event type someone else already owns is a registration-time error,
    /// never a silent overwrite. The local-only `_ready` signal is exempt:
    /// it is a broadcast, and any number of collaborators may subscribe.
    pub fn register(&mut self, collaborator: Arc<dyn Collaborator>) -> Result<()> {
        for event_type in collaborator.subscriptions() {
            if event_type == EVENT_TYPE_READY {
                self.ready.push(Arc::clone(&collaborator));
                continue;
            }
            if self.handlers.contains_key(event_type) {
                return Err(Error::DuplicateHandler(event_type.to_string()));
            }
            self.handlers
                .insert(event_type.to_string(), Arc::clone(&collaborator));
        }
        Ok(())
    }

    /// Collaborators that asked for the start-of-consumption signal
    pub fn ready_listeners(&self) -> &[Arc<dyn Collaborator>] {
        &self.ready
    }

    pub fn get(&self, event_type: &str) -> Option<&Arc<dyn Collaborator>> {
        self.handlers.get(event_type)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// The per-peer consumption loop
pub struct EventRouter {
    registry: HandlerRegistry,
    publisher: Arc<dyn Publish>,
    ctx: Arc<PeerContext>,
    live_peers: HashMap<String, Instant>,
}

impl EventRouter {
    pub fn new(
        registry: HandlerRegistry,
        publisher: Arc<dyn Publish>,
        ctx: Arc<PeerContext>,
    ) -> Self {
        Self {
            registry,
            publisher,
            ctx,
            live_peers: HashMap::new(),
        }
    }

    /// Peers that have replied to a liveness probe. Advisory only.
    pub fn live_peers(&self) -> Vec<String> {
        self.live_peers.keys().cloned().collect()
    }

    /// Enter the consuming state. Terminal until the connection drops or the
    /// process exits.
    pub async fn run(&mut self, channel: &Channel) -> Result<()> {
        let mut consumer = channel
            .basic_consume(
                &self.ctx.topology.queue,
                &format!("peer-{}", self.ctx.peer_id.short()),
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await?;

        info!(
            queue = %self.ctx.topology.queue,
            handlers = self.registry.len(),
            "Consuming as peer {}",
            self.ctx.peer_id
        );

        // Announce ourselves, then give collaborators their start signal.
        if let Err(e) =
            publish_event(self.publisher.as_ref(), LIVENESS_ROUTING_KEY, &PingEvent::new()).await
        {
            warn!(error = %e, "failed to publish liveness probe");
        }
        self.dispatch_ready().await;

        while let Some(delivery) = consumer.next().await {
            let delivery = delivery?;
            self.on_delivery(&delivery).await;
            delivery.ack(BasicAckOptions::default()).await?;
        }

        info!("Consumer stream ended");
        Ok(())
    }

    async fn on_delivery(&mut self, delivery: &Delivery) {
        let envelope_value: Value = match serde_json::from_slice(&delivery.data) {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, "dropping undecodable envelope");
                return;
            }
        };

        let Some(event_type) = envelope::event_type(&envelope_value).map(str::to_owned) else {
            warn!("dropping envelope without event_type");
            return;
        };

        match event_type.as_str() {
            EVENT_TYPE_PING => {
                if let Err(e) =
                    publish_event(self.publisher.as_ref(), LIVENESS_ROUTING_KEY, &PongEvent::new())
                        .await
                {
                    warn!(error = %e, "failed to answer liveness probe");
                }
            }
            EVENT_TYPE_PONG => {
                if let Some(origin) = envelope::origin(delivery) {
                    self.note_liveness(origin);
                }
            }
            _ => {}
        }

        self.dispatch(&event_type, &envelope_value).await;
    }

    /// Broadcast the start-of-consumption signal, containing failures
    async fn dispatch_ready(&self) {
        let event = json!({ "event_type": EVENT_TYPE_READY });
        for listener in self.registry.ready_listeners() {
            if let Err(e) = listener.handle(EVENT_TYPE_READY, &event).await {
                warn!(error = %e, "ready handler failed");
            }
        }
    }

    /// Record a liveness reply from a peer
    fn note_liveness(&mut self, origin: String) {
        debug!(peer = %origin, "liveness reply");
        self.live_peers.insert(origin, Instant::now());
    }

    /// Invoke the matching handler, containing event-local failures
    async fn dispatch(&self, event_type: &str, event: &Value) {
        let Some(handler) = self.registry.get(event_type) else {
            return;
        };
        if let Err(e) = handler.handle(event_type, event).await {
            warn!(event_type, error = %e, "handler failed, dropping event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::publish::testing::RecordingPublisher;
    use crate::peer::PeerId;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct StubCollaborator {
        subscriptions: Vec<&'static str>,
        calls: AtomicUsize,
        fail: bool,
    }

    impl StubCollaborator {
        fn new(subscriptions: Vec<&'static str>) -> Self {
            Self {
                subscriptions,
                calls: AtomicUsize::new(0),
                fail: false,
            }
        }

        fn failing(subscriptions: Vec<&'static str>) -> Self {
            Self {
                fail: true,
                ..Self::new(subscriptions)
            }
        }
    }

    #[async_trait]
    impl Collaborator for StubCollaborator {
        fn subscriptions(&self) -> Vec<&'static str> {
            self.subscriptions.clone()
        }

        async fn handle(&self, _event_type: &str, _event: &Value) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(Error::Gateway("boom".into()))
            } else {
                Ok(())
            }
        }
    }

    fn test_router(registry: HandlerRegistry) -> EventRouter {
        let ctx = Arc::new(PeerContext::new(
            PeerId::generate(),
            PathBuf::from("."),
            None,
            Duration::from_secs(5),
        ));
        EventRouter::new(registry, Arc::new(RecordingPublisher::new()), ctx)
    }

    #[test]
    fn test_duplicate_registration_is_an_error() {
        let mut registry = HandlerRegistry::new();
        registry
            .register(Arc::new(StubCollaborator::new(vec!["content"])))
            .unwrap();

        let err = registry
            .register(Arc::new(StubCollaborator::new(vec!["modified", "content"])))
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateHandler(t) if t == "content"));
    }

    #[test]
    fn test_registry_merges_collaborators() {
        let mut registry = HandlerRegistry::new();
        registry
            .register(Arc::new(StubCollaborator::new(vec!["modified", "content"])))
            .unwrap();
        registry
            .register(Arc::new(StubCollaborator::new(vec!["http_request"])))
            .unwrap();

        assert_eq!(registry.len(), 3);
        assert!(registry.get("content").is_some());
        assert!(registry.get("unknown").is_none());
    }

    #[tokio::test]
    async fn test_dispatch_contains_handler_failures() {
        let failing = Arc::new(StubCollaborator::failing(vec!["content"]));
        let mut registry = HandlerRegistry::new();
        registry.register(Arc::clone(&failing) as Arc<dyn Collaborator>).unwrap();

        let router = test_router(registry);
        // Must not panic or propagate.
        router
            .dispatch("content", &json!({"event_type": "content"}))
            .await;
        assert_eq!(failing.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_dispatch_ignores_unclaimed_event_types() {
        let router = test_router(HandlerRegistry::new());
        router
            .dispatch("nobody-home", &json!({"event_type": "nobody-home"}))
            .await;
    }

    #[test]
    fn test_production_collaborators_register_together() {
        use crate::fs::FileSyncHandlers;
        use crate::gateway::{GatewayConfig, HttpGateway};
        use crate::replicate::TreeReplicator;

        let publisher: Arc<dyn Publish> = Arc::new(RecordingPublisher::new());
        let ctx = Arc::new(PeerContext::new(
            PeerId::generate(),
            PathBuf::from("."),
            None,
            Duration::from_secs(5),
        ));

        // The full daemon line-up: several collaborators want the start
        // signal, and that must not count as a duplicate claim.
        let mut registry = HandlerRegistry::new();
        registry
            .register(Arc::new(FileSyncHandlers::new(
                Arc::clone(&publisher),
                Arc::clone(&ctx),
            )))
            .unwrap();
        registry
            .register(Arc::new(TreeReplicator::new(
                Arc::clone(&publisher),
                Arc::clone(&ctx),
                false,
            )))
            .unwrap();
        registry
            .register(Arc::new(HttpGateway::new(
                Arc::clone(&publisher),
                GatewayConfig {
                    enabled: false,
                    listen: "127.0.0.1:0".parse().unwrap(),
                    timeout: Duration::from_secs(1),
                    routes: HashMap::new(),
                    only_with_prefix: false,
                },
            )))
            .unwrap();

        assert_eq!(registry.ready_listeners().len(), 2);
        assert!(registry.get("modified").is_some());
        assert!(registry.get("tree_request").is_some());
        assert!(registry.get("http_request").is_some());
    }

    #[tokio::test]
    async fn test_ready_broadcast_reaches_every_listener() {
        let first = Arc::new(StubCollaborator::failing(vec![EVENT_TYPE_READY]));
        let second = Arc::new(StubCollaborator::new(vec![EVENT_TYPE_READY, "content"]));

        let mut registry = HandlerRegistry::new();
        registry
            .register(Arc::clone(&first) as Arc<dyn Collaborator>)
            .unwrap();
        registry
            .register(Arc::clone(&second) as Arc<dyn Collaborator>)
            .unwrap();

        let router = test_router(registry);
        router.dispatch_ready().await;

        // Both got the signal; the first one's failure was contained.
        assert_eq!(first.calls.load(Ordering::SeqCst), 1);
        assert_eq!(second.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_liveness_set_updates() {
        let mut router = test_router(HandlerRegistry::new());
        assert!(router.live_peers().is_empty());

        router.note_liveness("peer-a".into());
        router.note_liveness("peer-b".into());
        router.note_liveness("peer-a".into());

        let mut peers = router.live_peers();
        peers.sort();
        assert_eq!(peers, vec!["peer-a", "peer-b"]);
    }
}
