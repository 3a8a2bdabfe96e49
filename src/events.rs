//! Core bus events
//!
//! Every envelope on the wire is a JSON object carrying an `event_type`
//! discriminant. The liveness probe/reply pair defined here is handled by the
//! router itself; collaborators contribute their own event types.

use serde::{Deserialize, Serialize};

/// Liveness probe, broadcast when a peer starts consuming
pub const EVENT_TYPE_PING: &str = "ping";
/// Liveness reply, broadcast in response to a probe
pub const EVENT_TYPE_PONG: &str = "pong";
/// Local-only event dispatched when the router enters its consuming state.
/// Never published to the bus.
pub const EVENT_TYPE_READY: &str = "_ready";

/// Liveness probe
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PingEvent {
    pub event_type: String,
}

impl PingEvent {
    pub fn new() -> Self {
        Self {
            event_type: EVENT_TYPE_PING.to_string(),
        }
    }
}

impl Default for PingEvent {
    fn default() -> Self {
        Self::new()
    }
}

/// Liveness reply
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PongEvent {
    pub event_type: String,
}

impl PongEvent {
    pub fn new() -> Self {
        Self {
            event_type: EVENT_TYPE_PONG.to_string(),
        }
    }
}

impl Default for PongEvent {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ping_pong_discriminants() {
        let ping = serde_json::to_value(PingEvent::new()).unwrap();
        assert_eq!(ping["event_type"], "ping");
        let pong = serde_json::to_value(PongEvent::new()).unwrap();
        assert_eq!(pong["event_type"], "pong");
    }
}
