use std::collections::BTreeMap;

use chantier_core::config::{AppConfig, LoadOptions};
use chantier_db::connection::connect_with_config;
use chantier_db::migrations;

use crate::commands::{runtime, CommandResult};

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "migrate",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let runtime = match runtime() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "migrate",
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    let result = runtime.block_on(async {
        let pool = connect_with_config(&config.database)
            .await
            .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;
        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;
        let versions = migrations::applied_versions(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;
        pool.close().await;
        Ok::<Vec<i64>, (&'static str, String, u8)>(versions)
    });

    match result {
        Ok(versions) => {
            let applied =
                versions.iter().map(i64::to_string).collect::<Vec<_>>().join(",");
            let details = BTreeMap::from([
                ("database_url", config.database.url.clone()),
                ("applied_versions", applied),
            ]);
            CommandResult::success_with_details("migrate", "schema is up to date", details)
        }
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("migrate", error_class, message, exit_code)
        }
    }
}
