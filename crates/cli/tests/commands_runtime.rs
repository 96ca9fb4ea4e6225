use std::env;
use std::sync::{Mutex, OnceLock};

use chantier_cli::commands::{config, doctor, migrate};
use serde_json::Value;

#[test]
fn migrate_returns_success_with_valid_env() {
    with_env(&[("CHANTIER_DATABASE_URL", "sqlite::memory:")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 0, "expected successful migrate run");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");
        assert_eq!(payload["details"]["applied_versions"], "1");
    });
}

#[test]
fn migrate_returns_config_failure_for_invalid_port() {
    with_env(&[("CHANTIER_SERVER_PORT", "0")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn migrate_is_idempotent_on_a_file_database() {
    let dir = tempfile::tempdir().expect("temp dir");
    let url = format!("sqlite://{}", dir.path().join("chantier.db").display());

    with_env(&[("CHANTIER_DATABASE_URL", url.as_str())], || {
        let first = migrate::run();
        assert_eq!(first.exit_code, 0, "expected first migrate run to succeed");

        let second = migrate::run();
        assert_eq!(second.exit_code, 0, "expected second migrate run to succeed");
        assert_eq!(
            parse_payload(&first.output)["details"],
            parse_payload(&second.output)["details"]
        );
    });
}

#[test]
fn doctor_reports_pending_schema_until_migrated() {
    let dir = tempfile::tempdir().expect("temp dir");
    let url = format!("sqlite://{}", dir.path().join("chantier.db").display());

    with_env(&[("CHANTIER_DATABASE_URL", url.as_str())], || {
        let before = doctor::run(true);
        assert_eq!(before.exit_code, 1, "fresh database should fail the schema check");
        let report = parse_payload(&before.output);
        assert_eq!(report["overall_status"], "fail");
        assert_eq!(check(&report, "database_connectivity")["status"], "pass");
        assert_eq!(check(&report, "schema_migrations")["status"], "fail");

        assert_eq!(migrate::run().exit_code, 0);

        let after = doctor::run(true);
        assert_eq!(after.exit_code, 0, "migrated database should pass every check");
        let report = parse_payload(&after.output);
        assert_eq!(report["overall_status"], "pass");
    });
}

#[test]
fn doctor_skips_database_checks_when_config_is_invalid() {
    with_env(&[("CHANTIER_LOGGING_FORMAT", "xml")], || {
        let result = doctor::run(false);
        assert_eq!(result.exit_code, 1);
        assert!(result.output.contains("[fail] config_validation"));
        assert!(result.output.contains("[skip] database_connectivity"));
        assert!(result.output.contains("[skip] schema_migrations"));
    });
}

#[test]
fn config_attributes_values_to_their_source() {
    with_env(
        &[("CHANTIER_DATABASE_URL", "sqlite::memory:"), ("CHANTIER_LOG_LEVEL", "debug")],
        || {
            let output = config::run();
            assert!(output.contains(
                "- database.url = sqlite::memory: (source: env (CHANTIER_DATABASE_URL))"
            ));
            assert!(output.contains("- logging.level = debug (source: env (CHANTIER_LOG_LEVEL))"));
            assert!(output.contains("- auth.actor_header = x-user-id (source: default)"));
        },
    );
}

fn check<'a>(report: &'a Value, name: &str) -> &'a Value {
    report["checks"]
        .as_array()
        .and_then(|checks| checks.iter().find(|check| check["name"] == name))
        .unwrap_or_else(|| panic!("missing check `{name}`"))
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "CHANTIER_DATABASE_URL",
        "CHANTIER_DATABASE_MAX_CONNECTIONS",
        "CHANTIER_DATABASE_TIMEOUT_SECS",
        "CHANTIER_SERVER_BIND_ADDRESS",
        "CHANTIER_SERVER_PORT",
        "CHANTIER_SERVER_GRACEFUL_SHUTDOWN_SECS",
        "CHANTIER_AUTH_ACTOR_HEADER",
        "CHANTIER_LOGGING_LEVEL",
        "CHANTIER_LOGGING_FORMAT",
        "CHANTIER_LOG_LEVEL",
        "CHANTIER_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
