use chantier_core::config::{AppConfig, LoadOptions};
use chantier_db::connection::{connect_with_config, ping};
use chantier_db::migrations::{self, MIGRATOR};
use serde::Serialize;

use crate::commands::{escape_json, runtime, CommandResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

impl DoctorCheck {
    fn pass(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Pass, details: details.into() }
    }

    fn fail(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Fail, details: details.into() }
    }

    fn skipped(name: &'static str, reason: &str) -> Self {
        Self { name, status: CheckStatus::Skipped, details: format!("skipped because {reason}") }
    }
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> CommandResult {
    let report = build_report();
    let exit_code = if report.overall_status == CheckStatus::Pass { 0 } else { 1 };

    let output = if json_output {
        serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        })
    } else {
        render_human(&report)
    };

    CommandResult::plain(exit_code, output)
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck::pass(
                "config_validation",
                "configuration loaded and validated",
            ));
            checks.extend(check_database(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck::fail("config_validation", error.to_string()));
            checks.push(DoctorCheck::skipped(
                "database_connectivity",
                "configuration did not load",
            ));
            checks.push(DoctorCheck::skipped("schema_migrations", "configuration did not load"));
        }
    }

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

/// Connectivity, then whether every bundled migration has been applied.
/// The schema check is skipped when the database cannot be reached.
fn check_database(config: &AppConfig) -> Vec<DoctorCheck> {
    let runtime = match runtime() {
        Ok(runtime) => runtime,
        Err(error) => {
            return vec![
                DoctorCheck::fail(
                    "database_connectivity",
                    format!("failed to initialize async runtime: {error}"),
                ),
                DoctorCheck::skipped("schema_migrations", "the async runtime did not start"),
            ];
        }
    };

    runtime.block_on(async {
        let pool = match connect_with_config(&config.database).await {
            Ok(pool) => pool,
            Err(error) => {
                return vec![
                    DoctorCheck::fail(
                        "database_connectivity",
                        format!("failed to connect to database: {error}"),
                    ),
                    DoctorCheck::skipped("schema_migrations", "the database is unreachable"),
                ];
            }
        };

        let checks = match ping(&pool).await {
            Ok(()) => vec![
                DoctorCheck::pass(
                    "database_connectivity",
                    format!("connected using `{}`", config.database.url),
                ),
                check_schema(
                    migrations::applied_versions(&pool).await.map_err(|error| error.to_string()),
                ),
            ],
            Err(error) => vec![
                DoctorCheck::fail("database_connectivity", format!("ping failed: {error}")),
                DoctorCheck::skipped("schema_migrations", "the database is unreachable"),
            ],
        };

        pool.close().await;
        checks
    })
}

fn check_schema(applied: Result<Vec<i64>, String>) -> DoctorCheck {
    let applied = match applied {
        Ok(applied) => applied,
        Err(error) => {
            return DoctorCheck::fail(
                "schema_migrations",
                format!("failed to read applied migrations: {error}"),
            );
        }
    };

    let pending: Vec<i64> = MIGRATOR
        .iter()
        .filter(|migration| !migration.migration_type.is_down_migration())
        .map(|migration| migration.version)
        .filter(|version| !applied.contains(version))
        .collect();

    if pending.is_empty() {
        DoctorCheck::pass("schema_migrations", format!("{} migration(s) applied", applied.len()))
    } else {
        DoctorCheck::fail(
            "schema_migrations",
            format!("pending migrations {pending:?}; run `chantier migrate`"),
        )
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}
