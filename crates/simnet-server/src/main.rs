//! simnet server binary.
//!
//! # Usage
//!
//! ```bash
//! # Ring of 8 nodes pinging every 500ms
//! simnet-server --nodes 8 --ping-interval-ms 500
//! ```

use std::time::Duration;

use clap::Parser;
use simnet_server::{Server, ServerConfig};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// simnet overlay simulator server
#[derive(Parser, Debug)]
#[command(name = "simnet-server")]
#[command(about = "Runs a simulated p2p overlay network")]
#[command(version)]
struct Args {
    /// Number of nodes in the ring
    #[arg(short, long, default_value = "4")]
    nodes: usize,

    /// Pause between ping rounds on each link, in milliseconds
    #[arg(long, default_value = "1000")]
    ping_interval_ms: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    tracing::info!("simnet server starting");

    let config = ServerConfig {
        nodes: args.nodes,
        ping_interval: Duration::from_millis(args.ping_interval_ms),
    };
    let (server, shutdown) = Server::new(config);
    server.run(shutdown).await?;

    Ok(())
}
