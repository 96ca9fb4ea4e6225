use chantier_core::audit::{AuditEvent, AuditOutcome, AuditSink};
use tracing::{info, warn};

/// Writes audit events as structured log records.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn emit(&self, event: AuditEvent) {
        let request_id = event.request_id.as_ref().map(|id| id.0.as_str()).unwrap_or("none");
        let metadata = serde_json::to_string(&event.metadata).unwrap_or_default();

        match event.outcome {
            AuditOutcome::Success => info!(
                event_name = %event.event_type,
                correlation_id = %event.correlation_id,
                request_id,
                actor = %event.actor,
                category = ?event.category,
                metadata = %metadata,
                "audit event"
            ),
            AuditOutcome::Rejected | AuditOutcome::Failed => warn!(
                event_name = %event.event_type,
                correlation_id = %event.correlation_id,
                request_id,
                actor = %event.actor,
                category = ?event.category,
                outcome = ?event.outcome,
                metadata = %metadata,
                "audit event"
            ),
        }
    }
}
