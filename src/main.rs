mod app_state;
mod commands;
mod config;
mod console;
mod deeplink;
mod error;
mod keys;
mod models;
mod nfc;
mod registry;
mod rotation;
mod service;

use clap::Parser;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use app_state::AppState;
use config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "boltcard_admin=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // Parse configuration
    let config = Arc::new(Config::parse());
    let command = config.command.clone();

    // Create shared state
    let mut state = AppState::from_config(config)?;
    tracing::debug!(origin = %state.origin, "using card service");

    commands::run(&mut state, command).await
}
