//! Standalone match server binary.
//!
//! Usage: cargo run -p felt_web --bin felt-server

use clap::Parser;
use felt_web::{ServerConfig, WebServer};
use std::path::PathBuf;

/// Felt match server - Texas Hold'em tables for programmatic agents
#[derive(Parser, Debug)]
#[command(name = "felt-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Host address to bind to
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Port number to bind to (falls back to $PORT, then 3000)
    #[arg(short, long)]
    port: Option<u16>,

    /// Directory for persisted replays; omit to disable the sink
    #[arg(long)]
    replay_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    felt_web::init_logging();

    let args = Args::parse();
    let port = args
        .port
        .or_else(|| std::env::var("PORT").ok().and_then(|raw| raw.parse().ok()))
        .unwrap_or(felt_web::server::DEFAULT_PORT);

    let mut config = ServerConfig::new(args.host, port);
    if let Some(dir) = args.replay_dir {
        tracing::info!(dir = %dir.display(), "replay sink enabled");
        config = config.with_replay_dir(dir);
    }

    let server = WebServer::new(config);
    let handle = server.start().await?;
    tracing::info!("server running at http://{}", handle.address());

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");
    handle.shutdown().await?;
    tracing::info!("server stopped cleanly");

    Ok(())
}
