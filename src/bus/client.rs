//! AMQP connection wrapper
//!
//! Thin wrapper over a lapin connection. Fails fast when the broker is not
//! reachable at startup; lapin handles frame-level keep-alive after that.

use lapin::{Channel, Connection, ConnectionProperties};
use tracing::info;

use crate::error::Result;

/// Connection to the message broker
pub struct BusClient {
    connection: Connection,
}

impl BusClient {
    /// Connect to the broker
    pub async fn connect(url: &str) -> Result<Self> {
        info!("Connecting to broker at {}", url);
        let connection = Connection::connect(url, ConnectionProperties::default()).await?;
        info!("Connected to broker at {}", url);
        Ok(Self { connection })
    }

    /// Open a fresh channel on this connection
    pub async fn channel(&self) -> Result<Channel> {
        Ok(self.connection.create_channel().await?)
    }

    /// Whether the underlying connection is still usable
    pub fn is_connected(&self) -> bool {
        self.connection.status().connected()
    }
}
