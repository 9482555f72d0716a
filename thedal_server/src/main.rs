mod routes;
mod state;

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use thedal_core::engine::RetrievalEngine;
use thedal_core::EngineConfig;

use crate::state::AppState;

#[derive(Debug, Parser)]
#[command(name = "thedal_server", version, about = "Federated retrieval and enrichment server")]
struct Args {
    /// Path to a TOML config file; defaults apply when omitted.
    #[arg(long, short = 'c', value_name = "FILE")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => EngineConfig::load(path)?,
        None => {
            let mut config = EngineConfig::default();
            config.apply_env_overrides();
            config
        }
    };

    let filter = EnvFilter::try_new(&config.server.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let addr: SocketAddr = config.server.bind.parse()?;
    let engine = RetrievalEngine::new(config)?;
    let app = routes::router(AppState::new(engine));

    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "thedal server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to install ctrl-c handler");
    }
}
