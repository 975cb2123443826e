//! Hexlands multiplayer game server.

use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod catalog;
mod config;
mod error;
mod idempotency;
mod persist;
mod protocol;
mod rate_limit;
mod room;
mod server;

use config::Config;
use server::ServerState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    info!(
        "Starting Hexlands server (data dir {})...",
        config.data_dir.display()
    );

    let state = Arc::new(ServerState::new(config));
    state.restore().await?;

    server::run_server(state).await
}
