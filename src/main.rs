//! Rewriting reverse proxy binary.
//!
//! ```text
//!  client ──?url=target──▶ ┌──────────────────────────────────────────┐
//!                          │ resolve target → spoof identity → fetch  │ ──▶ upstream
//!  client ◀──rewritten──── │ rewrite HTML / manifests, or stream      │ ◀──
//!                          │ CORS, strip framing headers, Location    │
//!                          └──────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

use rewrite_proxy::config::{load_config, ProxyConfig};
use rewrite_proxy::lifecycle::{self, signals, Shutdown};
use rewrite_proxy::observability::logging;

#[derive(Parser, Debug)]
#[command(name = "rewrite-proxy", version, about = "Rewriting reverse proxy for web pages and HLS/DASH streams")]
struct Args {
    /// Path to the TOML configuration file. Defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override `listener.bind_address`.
    #[arg(short, long)]
    bind: Option<SocketAddr>,

    /// Override `observability.log_level` (RUST_LOG still takes precedence).
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => ProxyConfig::default(),
    };
    if let Some(bind) = args.bind {
        config.listener.bind_address = bind.to_string();
    }
    if let Some(level) = args.log_level {
        config.observability.log_level = level;
    }

    logging::init_tracing(&config.observability.log_level);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "rewrite-proxy starting");

    let shutdown = Shutdown::new();
    signals::spawn_signal_listener(shutdown.clone());

    lifecycle::start(config, &shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
