//! HTTP gateway
//!
//! Lets a request enter the mesh on one peer and be served by whichever peer
//! can reach the target. The listening side wraps the request into an
//! `http_request` event, publishes it, and polls a correlation map until the
//! matching `http_response` arrives or the timeout lapses. Every peer that
//! hears an `http_request` attempts the outbound call and answers with an
//! `http_response`; self-echo suppression keeps the originator from serving
//! its own request.

pub mod events;

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde_json::Value;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use crate::bus::envelope;
use crate::bus::publish::{publish_event, Publish};
use crate::error::{Error, Result};
use crate::events::EVENT_TYPE_READY;
use crate::router::Collaborator;

use events::{HttpRequestEvent, HttpResponseEvent, EVENT_TYPE_HTTP_REQUEST, EVENT_TYPE_HTTP_RESPONSE};

/// Routing key for tunneled HTTP traffic
const HTTP_ROUTING_KEY: &str = "event.http";

/// Header set on synthetic timeout responses
const TIMEOUT_HEADER: &str = "treesync-timeout";

/// Poll interval while waiting for a correlated response
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Gateway settings resolved from the command line
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub enabled: bool,
    pub listen: SocketAddr,
    pub timeout: Duration,
    /// First path segment to `host:port` destinations
    pub routes: HashMap<String, String>,
    /// Refuse requests whose first segment is not a configured prefix
    pub only_with_prefix: bool,
}

type PendingResponses = Arc<Mutex<HashMap<String, HttpResponseEvent>>>;

struct GatewayState {
    publisher: Arc<dyn Publish>,
    config: GatewayConfig,
    pending: PendingResponses,
}

/// Collaborator owning the HTTP tunneling event types
pub struct HttpGateway {
    state: Arc<GatewayState>,
    client: reqwest::Client,
}

impl HttpGateway {
    pub fn new(publisher: Arc<dyn Publish>, config: GatewayConfig) -> Self {
        Self {
            state: Arc::new(GatewayState {
                publisher,
                config,
                pending: Arc::new(Mutex::new(HashMap::new())),
            }),
            client: reqwest::Client::new(),
        }
    }

    /// Spawn the listener once the consumer is live
    fn on_ready(&self) -> Result<()> {
        if !self.state.config.enabled {
            debug!("http gateway disabled");
            return Ok(());
        }
        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            if let Err(e) = serve(state).await {
                error!(error = %e, "http gateway listener failed");
            }
        });
        Ok(())
    }

    /// Another peer tunneled a request to us: perform it and answer
    async fn on_bus_request(&self, event: HttpRequestEvent) -> Result<()> {
        let method = reqwest::Method::from_bytes(event.method.as_bytes())
            .unwrap_or(reqwest::Method::GET);
        let body = BASE64
            .decode(&event.body)
            .map_err(|e| Error::Decode(format!("request body: {e}")))?;

        let mut headers = reqwest::header::HeaderMap::new();
        for (name, value) in &event.headers {
            // Host and Content-Length are derived from the outbound request.
            if name.eq_ignore_ascii_case("host") || name.eq_ignore_ascii_case("content-length") {
                continue;
            }
            if let (Ok(name), Ok(value)) = (
                reqwest::header::HeaderName::from_bytes(name.as_bytes()),
                reqwest::header::HeaderValue::from_str(value),
            ) {
                headers.insert(name, value);
            }
        }

        let response = match self
            .client
            .request(method, &event.url)
            .headers(headers)
            .body(body)
            .send()
            .await
        {
            Ok(upstream) => {
                let status = upstream.status().as_u16() as i32;
                let headers = upstream
                    .headers()
                    .iter()
                    .filter_map(|(name, value)| {
                        value
                            .to_str()
                            .ok()
                            .map(|v| (name.to_string(), v.to_string()))
                    })
                    .collect();
                let bytes = upstream
                    .bytes()
                    .await
                    .map_err(|e| Error::Gateway(format!("reading upstream body: {e}")))?;
                HttpResponseEvent::new(
                    event.correlation_id,
                    status,
                    headers,
                    BASE64.encode(&bytes),
                )
            }
            Err(e) if e.is_connect() || e.is_timeout() => {
                warn!(url = %event.url, "target unreachable, answering with synthetic response");
                HttpResponseEvent::unreachable(event.correlation_id)
            }
            Err(e) => return Err(Error::Gateway(format!("outbound request failed: {e}"))),
        };

        publish_event(self.state.publisher.as_ref(), HTTP_ROUTING_KEY, &response).await
    }

    /// A peer answered one of our tunneled requests
    fn on_bus_response(&self, event: HttpResponseEvent) {
        let mut pending = self.state.pending.lock().unwrap();
        pending.insert(event.correlation_id.clone(), event);
    }
}

#[async_trait]
impl Collaborator for HttpGateway {
    fn subscriptions(&self) -> Vec<&'static str> {
        vec![EVENT_TYPE_READY, EVENT_TYPE_HTTP_REQUEST, EVENT_TYPE_HTTP_RESPONSE]
    }

    async fn handle(&self, event_type: &str, event: &Value) -> Result<()> {
        match event_type {
            EVENT_TYPE_READY => self.on_ready(),
            EVENT_TYPE_HTTP_REQUEST => self.on_bus_request(envelope::from_value(event)?).await,
            EVENT_TYPE_HTTP_RESPONSE => {
                self.on_bus_response(envelope::from_value(event)?);
                Ok(())
            }
            other => {
                warn!(event_type = other, "http gateway received unclaimed event type");
                Ok(())
            }
        }
    }
}

/// Map a local request path to its tunnel destination URL
fn proxy_url(path_and_query: &str, routes: &HashMap<String, String>, only_with_prefix: bool) -> Option<String> {
    let trimmed = path_and_query.trim_start_matches('/');
    let (prefix, rest) = match trimmed.split_once('/') {
        Some((prefix, rest)) => (prefix, rest),
        None => (trimmed, ""),
    };

    if let Some(destination) = routes.get(prefix) {
        Some(format!("http://{destination}/{rest}"))
    } else if only_with_prefix || prefix.is_empty() {
        None
    } else {
        // No configured route: treat the first segment as the host itself.
        Some(format!("http://{prefix}/{rest}"))
    }
}

/// Poll the correlation map until the response shows up or time runs out
async fn wait_response(
    pending: &PendingResponses,
    correlation_id: &str,
    timeout: Duration,
) -> Option<HttpResponseEvent> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        {
            let mut map = pending.lock().unwrap();
            if let Some(response) = map.remove(correlation_id) {
                return Some(response);
            }
        }
        if tokio::time::Instant::now() >= deadline {
            return None;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

async fn serve(state: Arc<GatewayState>) -> Result<()> {
    let listener = TcpListener::bind(state.config.listen)
        .await
        .map_err(|e| Error::Gateway(format!("binding {}: {e}", state.config.listen)))?;
    info!(listen = %state.config.listen, "http gateway listening");

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    let io = TokioIo::new(stream);
                    let service = service_fn(move |req| {
                        let state = Arc::clone(&state);
                        async move { handle_request(state, req).await }
                    });
                    if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                        error!(peer = %addr, error = ?err, "error serving gateway connection");
                    }
                });
            }
            Err(e) => error!(error = ?e, "error accepting gateway connection"),
        }
    }
}

async fn handle_request(
    state: Arc<GatewayState>,
    req: Request<Incoming>,
) -> std::result::Result<Response<Full<Bytes>>, hyper::Error> {
    let method = req.method().as_str().to_string();
    let path_and_query = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| "/".to_string());

    let url = match proxy_url(&path_and_query, &state.config.routes, state.config.only_with_prefix) {
        Some(url) => url,
        None => {
            return Ok(plain_response(
                StatusCode::FORBIDDEN,
                "no route for this prefix",
            ));
        }
    };

    let headers = req
        .headers()
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.to_string(), v.to_string()))
        })
        .collect();
    let body = req.into_body().collect().await?.to_bytes();

    let event = HttpRequestEvent::new(method, url, headers, BASE64.encode(&body));
    let correlation_id = event.correlation_id.clone();
    debug!(url = %event.url, correlation_id = %correlation_id, "tunneling request");

    if let Err(e) = publish_event(state.publisher.as_ref(), HTTP_ROUTING_KEY, &event).await {
        warn!(error = %e, "could not publish tunneled request");
        return Ok(plain_response(
            StatusCode::SERVICE_UNAVAILABLE,
            "could not reach the mesh",
        ));
    }

    match wait_response(&state.pending, &correlation_id, state.config.timeout).await {
        Some(response) if response.status_code < 100 => Ok(plain_response(
            StatusCode::BAD_GATEWAY,
            "remote peer could not reach the target",
        )),
        Some(response) => {
            let status = StatusCode::from_u16(response.status_code as u16)
                .unwrap_or(StatusCode::BAD_GATEWAY);
            let body = BASE64.decode(&response.body).unwrap_or_default();
            let mut builder = Response::builder().status(status);
            for (name, value) in &response.headers {
                if name.eq_ignore_ascii_case("content-length")
                    || name.eq_ignore_ascii_case("transfer-encoding")
                {
                    continue;
                }
                builder = builder.header(name, value);
            }
            Ok(builder
                .body(Full::new(Bytes::from(body)))
                .unwrap_or_else(|_| plain_response(StatusCode::BAD_GATEWAY, "malformed response")))
        }
        None => {
            let timeout_secs = state.config.timeout.as_secs().to_string();
            Ok(Response::builder()
                .status(StatusCode::GATEWAY_TIMEOUT)
                .header(TIMEOUT_HEADER, timeout_secs)
                .body(Full::new(Bytes::from_static(b"no peer answered in time")))
                .expect("static timeout response"))
        }
    }
}

fn plain_response(status: StatusCode, message: &'static str) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .body(Full::new(Bytes::from_static(message.as_bytes())))
        .expect("static response")
}
