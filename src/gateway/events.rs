//! HTTP tunneling events
//!
//! Requests and responses are paired through `correlation_id`. Bodies travel
//! base64-encoded so arbitrary bytes survive the JSON envelope.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const EVENT_TYPE_HTTP_REQUEST: &str = "http_request";
pub const EVENT_TYPE_HTTP_RESPONSE: &str = "http_response";

/// Status code reported when the remote peer could not reach the target
pub const STATUS_UNREACHABLE: i32 = -1;

/// An HTTP request tunneled over the bus
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpRequestEvent {
    pub event_type: String,
    pub correlation_id: String,
    pub method: String,
    pub url: String,
    pub headers: HashMap<String, String>,
    /// Base64-encoded request body
    pub body: String,
}

impl HttpRequestEvent {
    pub fn new(method: String, url: String, headers: HashMap<String, String>, body: String) -> Self {
        Self {
            event_type: EVENT_TYPE_HTTP_REQUEST.to_string(),
            correlation_id: Uuid::new_v4().to_string(),
            method,
            url,
            headers,
            body,
        }
    }
}

/// The answer a remote peer produced for a tunneled request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpResponseEvent {
    pub event_type: String,
    pub correlation_id: String,
    pub status_code: i32,
    pub headers: HashMap<String, String>,
    /// Base64-encoded response body
    pub body: String,
}

impl HttpResponseEvent {
    pub fn new(
        correlation_id: String,
        status_code: i32,
        headers: HashMap<String, String>,
        body: String,
    ) -> Self {
        Self {
            event_type: EVENT_TYPE_HTTP_RESPONSE.to_string(),
            correlation_id,
            status_code,
            headers,
            body,
        }
    }

    /// Synthetic response for an unreachable target
    pub fn unreachable(correlation_id: String) -> Self {
        Self::new(correlation_id, STATUS_UNREACHABLE, HashMap::new(), String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_gets_fresh_correlation_ids() {
        let a = HttpRequestEvent::new("GET".into(), "http://x/".into(), HashMap::new(), String::new());
        let b = HttpRequestEvent::new("GET".into(), "http://x/".into(), HashMap::new(), String::new());
        assert_ne!(a.correlation_id, b.correlation_id);
        assert_eq!(a.event_type, "http_request");
    }

    #[test]
    fn test_unreachable_response_shape() {
        let resp = HttpResponseEvent::unreachable("abc".into());
        assert_eq!(resp.status_code, STATUS_UNREACHABLE);
        assert!(resp.headers.is_empty());
        assert!(resp.body.is_empty());
    }
}
