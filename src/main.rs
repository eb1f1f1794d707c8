//! Royale Match Server - authoritative battle-royale match orchestration
//!
//! The binary wires the match pool together and keeps it swept:
//! - configuration from the environment
//! - a registry of live matches, each driven by its own scheduler
//! - a periodic reclaim loop for concluded matches
//!
//! Player transport, damage application, and persistence are external
//! collaborators; they attach to matches through the library API.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use royale_match_server::config::Config;
use royale_match_server::game::GameRegistry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Config::from_env()?;

    // Initialize tracing
    init_tracing(&config.log_level);

    info!("Starting Royale Match Server");
    info!(
        min_players = config.min_players,
        max_players = config.max_players,
        zone_radius = config.zone_initial_radius,
        "Match pool configuration"
    );

    let registry = Arc::new(GameRegistry::new(config.clone()));

    // Sweep concluded matches out of the pool
    let sweeper = Arc::clone(&registry);
    let reclaim_interval = Duration::from_secs(config.reclaim_interval_secs);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(reclaim_interval);
        loop {
            ticker.tick().await;
            let reclaimed = sweeper.reclaim();
            if reclaimed > 0 {
                info!(reclaimed, "Reclaimed concluded matches");
            }
        }
    });

    info!("Match pool ready");

    shutdown_signal().await;

    info!("Server shutdown complete");
    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        }
        _ = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        }
    }
}
