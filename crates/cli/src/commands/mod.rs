pub mod config;
pub mod doctor;
pub mod migrate;

use std::collections::BTreeMap;

use serde::Serialize;

/// Rendered command output plus the process exit code.
///
/// Exit codes: 0 success, 1 failed readiness check, 2 configuration, 3 runtime
/// initialisation, 4 database connectivity, 5 migration.
#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome<'a> {
    command: &'a str,
    status: &'static str,
    error_class: Option<&'a str>,
    message: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    details: BTreeMap<&'static str, String>,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        Self::success_with_details(command, message, BTreeMap::new())
    }

    pub fn success_with_details(
        command: &str,
        message: impl Into<String>,
        details: BTreeMap<&'static str, String>,
    ) -> Self {
        let payload = CommandOutcome {
            command,
            status: "ok",
            error_class: None,
            message: message.into(),
            details,
        };
        Self { exit_code: 0, output: serialize_payload(&payload) }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let payload = CommandOutcome {
            command,
            status: "error",
            error_class: Some(error_class),
            message: message.into(),
            details: BTreeMap::new(),
        };
        Self { exit_code, output: serialize_payload(&payload) }
    }

    pub fn plain(exit_code: u8, output: String) -> Self {
        Self { exit_code, output }
    }
}

/// Builds the current-thread runtime the synchronous commands block on.
pub(crate) fn runtime() -> std::io::Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread().enable_all().build()
}

fn serialize_payload(payload: &CommandOutcome<'_>) -> String {
    serde_json::to_string(payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"{}\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            escape_json(payload.command),
            escape_json(&error.to_string())
        )
    })
}

pub(crate) fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use serde_json::Value;

    use super::CommandResult;

    #[test]
    fn failure_payload_carries_error_class_and_exit_code() {
        let result = CommandResult::failure("migrate", "db_connectivity", "unable to open", 4);
        let payload: Value = serde_json::from_str(&result.output).expect("json payload");

        assert_eq!(result.exit_code, 4);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "db_connectivity");
        assert!(payload.get("details").is_none());
    }

    #[test]
    fn success_details_are_serialized_when_present() {
        let details = BTreeMap::from([("applied_versions", "1".to_owned())]);
        let result = CommandResult::success_with_details("migrate", "done", details);
        let payload: Value = serde_json::from_str(&result.output).expect("json payload");

        assert_eq!(payload["details"]["applied_versions"], "1");
        assert_eq!(payload["error_class"], Value::Null);
    }
}
