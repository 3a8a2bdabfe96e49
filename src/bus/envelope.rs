//! Envelope helpers
//!
//! Envelopes are self-describing JSON records keyed by `event_type`. The
//! origin-peer header exists solely for the broker's negation routing; the
//! only consumer-side reader is the router's liveness bookkeeping.

use lapin::message::Delivery;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::Result;

/// AMQP header naming the publishing peer
pub const ORIGIN_HEADER: &str = "client-id";

/// Extract the `event_type` discriminant from a decoded envelope
pub fn event_type(envelope: &Value) -> Option<&str> {
    envelope.get("event_type").and_then(Value::as_str)
}

/// Serialize an event to wire bytes
pub fn to_bytes<T: Serialize>(event: &T) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(event)?)
}

/// Decode a typed event out of an already-parsed envelope
pub fn from_value<T: DeserializeOwned>(envelope: &Value) -> Result<T> {
    Ok(serde_json::from_value(envelope.clone())?)
}

/// Read the origin-peer header off a delivery, if present
pub fn origin(delivery: &Delivery) -> Option<String> {
    let headers = delivery.properties.headers().as_ref()?;
    headers.inner().iter().find_map(|(key, value)| {
        if key.as_str() != ORIGIN_HEADER {
            return None;
        }
        match value {
            lapin::types::AMQPValue::LongString(s) => {
                Some(String::from_utf8_lossy(s.as_bytes()).into_owned())
            }
            lapin::types::AMQPValue::ShortString(s) => Some(s.as_str().to_string()),
            _ => None,
        }
    })
}
