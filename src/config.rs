//! Configuration for treesync
//!
//! CLI arguments and environment variable handling using clap.

use std::collections::HashMap;
use std::net::SocketAddr;

use clap::Parser;
use uuid::Uuid;

/// treesync - broker-based directory tree synchronization
#[derive(Parser, Debug, Clone)]
#[command(name = "treesync")]
#[command(about = "Synchronize a directory tree across peers over an AMQP broker")]
pub struct Args {
    /// Unique peer identifier for this instance
    #[arg(long, env = "PEER_ID", default_value_t = Uuid::new_v4())]
    pub peer_id: Uuid,

    /// AMQP broker URL
    #[arg(long, env = "AMQP_URL", default_value = "amqp://127.0.0.1:5672/%2f")]
    pub amqp_url: String,

    /// Directory tree to synchronize
    #[arg(long, env = "SYNC_ROOT", default_value = ".")]
    pub sync_root: String,

    /// Label used in conflict markers (defaults to the short peer id)
    #[arg(long, env = "CONFLICT_LABEL")]
    pub conflict_label: Option<String>,

    /// Number of pooled publish channels
    #[arg(long, env = "PUBLISH_CHANNELS", default_value = "8")]
    pub publish_channels: usize,

    /// Request the full tree from the mesh on startup
    #[arg(long, env = "REPLICATE_ON_START", default_value = "false")]
    pub replicate_on_start: bool,

    /// Local change scan interval in milliseconds
    #[arg(long, env = "SCAN_INTERVAL_MS", default_value = "1000")]
    pub scan_interval_ms: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// HTTP gateway configuration
    #[command(flatten)]
    pub gateway: GatewayArgs,
}

/// HTTP gateway configuration
#[derive(Parser, Debug, Clone)]
pub struct GatewayArgs {
    /// Enable the HTTP gateway listener
    #[arg(long, env = "GATEWAY_ENABLED", default_value = "false")]
    pub gateway_enabled: bool,

    /// Address the gateway listens on
    #[arg(long, env = "GATEWAY_LISTEN", default_value = "0.0.0.0:8080")]
    pub gateway_listen: SocketAddr,

    /// How long to wait for a tunneled response in milliseconds
    #[arg(long, env = "GATEWAY_TIMEOUT_MS", default_value = "5000")]
    pub gateway_timeout_ms: u64,

    /// Prefix routes as `prefix=host:port` pairs, comma separated
    #[arg(long, env = "GATEWAY_ROUTES")]
    pub gateway_routes: Option<String>,

    /// Refuse requests whose first path segment is not a configured prefix
    #[arg(long, env = "GATEWAY_ONLY_WITH_PREFIX", default_value = "false")]
    pub gateway_only_with_prefix: bool,
}

impl Args {
    /// Parse the `prefix=host:port,...` route table
    pub fn route_table(&self) -> Result<HashMap<String, String>, String> {
        let mut routes = HashMap::new();
        let Some(ref raw) = self.gateway.gateway_routes else {
            return Ok(routes);
        };
        for pair in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let Some((prefix, destination)) = pair.split_once('=') else {
                return Err(format!("route '{pair}' is not of the form prefix=host:port"));
            };
            let (prefix, destination) = (prefix.trim(), destination.trim());
            if prefix.is_empty() || destination.is_empty() {
                return Err(format!("route '{pair}' has an empty prefix or destination"));
            }
            routes.insert(prefix.to_string(), destination.to_string());
        }
        Ok(routes)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.publish_channels == 0 {
            return Err("PUBLISH_CHANNELS must be at least 1".to_string());
        }
        if self.scan_interval_ms == 0 {
            return Err("SCAN_INTERVAL_MS must be at least 1".to_string());
        }
        if let Some(ref label) = self.conflict_label {
            if label.is_empty() {
                return Err("CONFLICT_LABEL must not be empty when set".to_string());
            }
        }
        if self.gateway.gateway_only_with_prefix && self.gateway.gateway_routes.is_none() {
            return Err(
                "GATEWAY_ONLY_WITH_PREFIX requires GATEWAY_ROUTES to be set".to_string(),
            );
        }
        self.route_table().map(|_| ())
    }
}
