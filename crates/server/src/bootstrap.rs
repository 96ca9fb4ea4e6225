use axum::Router;
use chantier_core::config::AppConfig;
use chantier_db::{connection::connect_with_config, migrations, DbPool};
use thiserror::Error;
use tracing::info;

use crate::api::{self, AppState};
use crate::health;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub state: AppState,
}

impl Application {
    /// API routes plus `/health`, ready to hand to `axum::serve`.
    pub fn router(&self) -> Router {
        api::router(self.state.clone()).merge(health::router(self.db_pool.clone()))
    }
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
}

/// Connects and migrates the database described by an already validated config.
pub async fn bootstrap(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool =
        connect_with_config(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let state = AppState::from_pool(db_pool.clone(), &config.auth.actor_header);
    Ok(Application { config, db_pool, state })
}
