mod api;
mod audit;
mod bootstrap;
mod health;

use std::time::Duration;

use anyhow::Result;
use chantier_core::config::{AppConfig, LoadOptions};
use tokio::sync::oneshot;
use tracing::{error, info, warn};

fn init_logging(config: &AppConfig) {
    use chantier_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap(config).await?;
    let address = app.config.listen_address();
    let grace = Duration::from_secs(app.config.server.graceful_shutdown_secs);
    let listener = tokio::net::TcpListener::bind(&address).await?;

    info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        bind_address = %address,
        actor_header = %app.config.auth.actor_header,
        "chantier-server listening"
    );

    let (stopping_tx, stopping_rx) = oneshot::channel::<()>();
    let server = axum::serve(listener, app.router()).with_graceful_shutdown(async move {
        wait_for_shutdown().await;
        let _ = stopping_tx.send(());
    });

    tokio::select! {
        result = async { server.await } => result?,
        _ = grace_period_elapsed(stopping_rx, grace) => {
            warn!(
                event_name = "system.server.shutdown_forced",
                correlation_id = "shutdown",
                grace_secs = grace.as_secs(),
                "in-flight requests did not finish within the grace period"
            );
        }
    }

    app.db_pool.close().await;
    info!(
        event_name = "system.server.stopped",
        correlation_id = "shutdown",
        "chantier-server stopped"
    );

    Ok(())
}

async fn wait_for_shutdown() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        error!(
            event_name = "system.server.signal_error",
            correlation_id = "shutdown",
            error = %error,
            "failed to listen for the shutdown signal"
        );
        std::future::pending::<()>().await;
    }
    info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        "shutdown signal received, draining connections"
    );
}

/// Resolves once shutdown has started and the grace period has run out.
async fn grace_period_elapsed(stopping: oneshot::Receiver<()>, grace: Duration) {
    if stopping.await.is_err() {
        std::future::pending::<()>().await;
    }
    tokio::time::sleep(grace).await;
}
