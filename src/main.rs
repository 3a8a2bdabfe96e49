//! treesync - broker-based directory tree synchronization

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use treesync::{
    bus::{BusClient, PublisherPool, Topology, MAIN_EXCHANGE},
    config::Args,
    fs::{spawn_poll_scanner, spawn_watch_bridge, FileSyncHandlers},
    gateway::{GatewayConfig, HttpGateway},
    replicate::TreeReplicator,
    Collaborator, EventRouter, HandlerRegistry, PeerContext, PeerId,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    // Parse command line arguments
    let args = Args::parse();

    // Initialize tracing/logging
    let log_level = args.log_level.clone();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("treesync={},info", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Validate configuration
    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    let peer_id = PeerId::from(args.peer_id);
    let sync_root = PathBuf::from(&args.sync_root)
        .canonicalize()
        .unwrap_or_else(|e| {
            error!("Sync root '{}' is not usable: {}", args.sync_root, e);
            std::process::exit(1);
        });

    // Print startup banner
    info!("======================================");
    info!("  treesync - directory synchronization");
    info!("======================================");
    info!(
        "Build: {} ({})",
        env!("GIT_COMMIT_SHORT"),
        env!("BUILD_TIMESTAMP")
    );
    info!("Peer ID: {}", peer_id);
    info!("Broker: {}", args.amqp_url);
    info!("Sync root: {}", sync_root.display());
    info!("Publish channels: {}", args.publish_channels);
    info!("Replicate on start: {}", args.replicate_on_start);
    if args.gateway.gateway_enabled {
        info!("Gateway: {}", args.gateway.gateway_listen);
    } else {
        info!("Gateway: disabled");
    }
    info!("======================================");

    let ctx = Arc::new(PeerContext::new(
        peer_id,
        sync_root,
        args.conflict_label.clone(),
        Duration::from_millis(args.gateway.gateway_timeout_ms),
    ));

    // Connect to the broker and lay down the per-peer fabric
    let client = match BusClient::connect(&args.amqp_url).await {
        Ok(client) => {
            info!("Broker connected successfully");
            client
        }
        Err(e) => {
            error!("Broker connection failed: {}", e);
            std::process::exit(1);
        }
    };

    let topology = Topology::new(ctx.peer_id, ctx.topology.clone());
    let setup_channel = client.channel().await?;
    if let Err(e) = topology.create(&setup_channel).await {
        error!("Topology setup failed: {}", e);
        std::process::exit(1);
    }
    info!("Topology ready: consuming from '{}'", ctx.topology.queue);

    let publisher: Arc<dyn treesync::bus::Publish> = Arc::new(
        PublisherPool::new(&client, ctx.peer_id, MAIN_EXCHANGE, args.publish_channels).await?,
    );

    // Local change capture: poll scanner feeding the watcher bridge
    let (watch_tx, watch_rx) = tokio::sync::mpsc::channel(256);
    spawn_poll_scanner(
        ctx.sync_root.clone(),
        Duration::from_millis(args.scan_interval_ms),
        watch_tx,
    );
    spawn_watch_bridge(watch_rx, Arc::clone(&publisher), Arc::clone(&ctx));

    // Register collaborators
    let mut registry = HandlerRegistry::new();
    registry.register(Arc::new(FileSyncHandlers::new(
        Arc::clone(&publisher),
        Arc::clone(&ctx),
    )) as Arc<dyn Collaborator>)?;
    registry.register(Arc::new(TreeReplicator::new(
        Arc::clone(&publisher),
        Arc::clone(&ctx),
        args.replicate_on_start,
    )) as Arc<dyn Collaborator>)?;
    registry.register(Arc::new(HttpGateway::new(
        Arc::clone(&publisher),
        GatewayConfig {
            enabled: args.gateway.gateway_enabled,
            listen: args.gateway.gateway_listen,
            timeout: ctx.gateway_timeout,
            routes: args.route_table().expect("validated above"),
            only_with_prefix: args.gateway.gateway_only_with_prefix,
        },
    )) as Arc<dyn Collaborator>)?;

    let mut router = EventRouter::new(registry, Arc::clone(&publisher), Arc::clone(&ctx));
    let consume_channel = client.channel().await?;

    tokio::select! {
        result = router.run(&consume_channel) => {
            if let Err(e) = result {
                error!("Router stopped: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
        }
    }

    // Remove the per-peer fabric so the broker does not accumulate
    // auto-delete leftovers from unclean exits.
    if let Ok(channel) = client.channel().await {
        if let Err(e) = topology.teardown(&channel).await {
            error!("Topology teardown failed: {}", e);
        }
    }

    info!("Goodbye");
    Ok(())
}
