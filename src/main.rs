// Allow dead code - some accessors exist for monitoring endpoints and tests only
#![allow(dead_code)]

//! Peer Uptime Node
//!
//! Decentralized peer health monitor. Every node probes the peers it
//! knows over HTTP, keeps a smoothed reliability score per peer and
//! gossips its peer list so the network of monitors discovers itself.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      PEER UPTIME NODE                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Probe Loop         ──→ next host, POST /api/status, score  │
//! │  Registry (RwLock)  ←── hosts, scheduler, probe counter     │
//! │  Status Server      ←── answers probes, registers callers   │
//! │  HTTP API           ←── /health, /metrics, /peers           │
//! └─────────────────────────────────────────────────────────────┘
//! ```

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

mod api;
mod config;
mod probe;
mod registry;
mod types;

#[cfg(test)]
mod tests;

use api::Metrics;
use config::NodeConfig;
use registry::Registry;

/// Peer Uptime - decentralized peer health monitor
#[derive(Parser, Debug)]
#[command(name = "peer-uptime")]
#[command(author = "PeerUptime Contributors")]
#[command(version = "0.1.0")]
#[command(about = "Probe peers, score their uptime and gossip the peer list", long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "peer-uptime.toml")]
    config: PathBuf,

    /// Interface the status server binds to
    #[arg(long, env = "PEER_IP")]
    ip: Option<String>,

    /// Port the status server binds to
    #[arg(long, env = "PEER_PORT")]
    port: Option<u16>,

    /// URL under which other peers reach this node
    #[arg(long, env = "PEER_URL")]
    url: Option<String>,

    /// Bootstrap peer probed first
    #[arg(long, env = "PEER_DISCOVERY_URL")]
    discovery_url: Option<String>,

    /// Score memory factor (k >= 1)
    #[arg(long, env = "PEER_MEMORY_SCORE_FACTOR")]
    memory_factor: Option<u32>,

    /// Pause between probe cycles in milliseconds
    #[arg(long, env = "PEER_WAITING_TIME")]
    waiting_time: Option<u64>,

    /// Maximum peers exchanged per discovery reply
    #[arg(long, env = "PEER_DISCOVERY_LIMIT")]
    discovery_limit: Option<usize>,

    /// Run the status server (true/false)
    #[arg(long, env = "PEER_SERVER")]
    server: Option<bool>,

    /// Run the probe loop (true/false)
    #[arg(long, env = "PEER_CLIENT")]
    client: Option<bool>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| args.log_level.clone().into())
        )
        .init();

    info!("🛰️  Peer Uptime Node v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = if args.config.exists() {
        NodeConfig::load(&args.config)?
    } else {
        warn!("Config file not found, using defaults");
        NodeConfig::default()
    };

    // Override config with CLI args / environment
    let config = config
        .with_listen_ip(args.ip)
        .with_port(args.port)
        .with_url(args.url)
        .with_discovery_url(args.discovery_url)
        .with_memory_factor(args.memory_factor)
        .with_waiting_time_ms(args.waiting_time)
        .with_discovery_limit(args.discovery_limit)
        .with_server_enabled(args.server)
        .with_client_enabled(args.client);

    config.validate()?;

    info!("⚙️  Configuration:");
    info!("   Listen: {}:{}", config.listen_ip, config.port);
    info!("   Advertised URL: {}", config.url);
    info!("   Discovery URL: {}", config.discovery_url);
    info!("   Memory factor: {}", config.memory_factor);
    info!("   Probe interval: {}ms", config.waiting_time_ms);
    info!("   Discovery limit: {}", config.discovery_limit);

    let shared_config = Arc::new(config);

    // Initialize registry with the bootstrap peer
    let mut registry = Registry::new(shared_config.url.clone());
    if !registry.register(&shared_config.discovery_url) {
        warn!("Discovery URL is empty or this node's own URL, starting with an empty registry");
    }
    let registry = registry.shared();

    let metrics = Arc::new(Metrics::new());
    metrics.set_known_peers(registry.read().await.len() as u64);

    // Start enabled services
    let server_handle = shared_config.server_enabled.then(|| {
        tokio::spawn(api::run_api_server(
            shared_config.clone(),
            registry.clone(),
            metrics.clone(),
        ))
    });

    let probe_handle = shared_config.client_enabled.then(|| {
        tokio::spawn(probe::run_probe_loop(
            shared_config.clone(),
            registry.clone(),
            metrics.clone(),
        ))
    });

    info!("✅ Services started (server={}, client={})", server_handle.is_some(), probe_handle.is_some());
    info!("   Press Ctrl+C to shutdown");

    // Wait for shutdown signal
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("🛑 Shutdown signal received");
        }
        result = join_optional(server_handle) => {
            error!("Status server exited: {:?}", result);
        }
        result = join_optional(probe_handle) => {
            error!("Probe loop exited: {:?}", result);
        }
    }

    let stats = registry.read().await.stats();
    info!(
        "👋 Peer Uptime Node shutting down ({} peers known, {} probes run)",
        stats.total_peers, stats.probe_counter
    );
    Ok(())
}

/// Await a service handle, or never resolve if the service is disabled
async fn join_optional(
    handle: Option<tokio::task::JoinHandle<anyhow::Result<()>>>,
) -> Result<anyhow::Result<()>, tokio::task::JoinError> {
    match handle {
        Some(handle) => handle.await,
        None => std::future::pending().await,
    }
}
