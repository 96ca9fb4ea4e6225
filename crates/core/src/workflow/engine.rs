use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::domain::activity::{HistoryEntry, Notification};
use crate::domain::request::{ExitRecord, Request, RequestStatus, ValidationSignature};
use crate::domain::user::User;
use crate::workflow::actions::{action_label, RequestAction};
use crate::workflow::permission::{self, Denial, PermissionContext};

const NOTIFICATION_TITLE: &str = "Mise à jour de demande";

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ActionError {
    #[error("unrecognized action `{name}`")]
    UnknownAction { name: String },
    #[error("`{action}` refused: {}", .denial.reason())]
    Denied { action: RequestAction, denial: Denial },
    #[error("exit record is missing or locked")]
    ExitRecordLocked,
    #[error("exit record could only be modified until {editable_until}")]
    ExitWindowClosed { editable_until: DateTime<Utc> },
    #[error("released quantity for `{item}` must not be negative")]
    NegativeQuantity { item: String },
    #[error("status cannot move back from {from:?} to {to:?}")]
    BackwardTransition { from: RequestStatus, to: RequestStatus },
}

/// Caller-supplied payload of an action: the optional comment and, for exit preparation
/// and amendment, the quantities released per item.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionInput {
    #[serde(rename = "commentaire", default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(rename = "quantitesSorties", default, skip_serializing_if = "Option::is_none")]
    pub exit_quantities: Option<BTreeMap<String, Decimal>>,
}

impl ActionInput {
    pub fn with_comment(comment: impl Into<String>) -> Self {
        Self { comment: Some(comment.into()), exit_quantities: None }
    }

    fn checked_quantities(&self) -> Result<Option<BTreeMap<String, Decimal>>, ActionError> {
        let Some(quantities) = &self.exit_quantities else {
            return Ok(None);
        };
        if let Some((item, _)) = quantities.iter().find(|(_, quantity)| quantity.is_sign_negative()) {
            return Err(ActionError::NegativeQuantity { item: item.clone() });
        }
        Ok(Some(quantities.clone()))
    }
}

/// Everything a successful action produces. Only `request` is written back by the caller;
/// the notification and history entry are handed to whoever persists them.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActionOutcome {
    #[serde(rename = "demande")]
    pub request: Request,
    pub notification: Notification,
    #[serde(rename = "historyEntry")]
    pub history_entry: HistoryEntry,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct ActionEngine;

impl ActionEngine {
    pub fn new() -> Self {
        Self
    }

    /// Validates `action` for `actor` against `request` and computes the updated request.
    /// The input is never modified; on any error nothing has been written.
    pub fn apply(
        &self,
        request: &Request,
        actor: &User,
        action: RequestAction,
        input: &ActionInput,
        now: DateTime<Utc>,
    ) -> Result<ActionOutcome, ActionError> {
        permission::evaluate(action, &PermissionContext::new(request, actor))
            .map_err(|denial| ActionError::Denied { action, denial })?;

        let comment = input.comment.clone();
        let stamp = |step: &str| ValidationSignature::new(&actor.id, step, comment.clone(), now);
        let step = action.signature_step().unwrap_or(action.as_str());
        let mut next = request.clone();

        match action {
            RequestAction::Submit => {
                next.status = RequestStatus::Submitted;
            }
            RequestAction::ApproveMaterial => {
                next.status = RequestStatus::SupervisorApproved;
                next.supervisor_validation = Some(stamp(step));
            }
            RequestAction::ApproveTooling => {
                next.status = RequestStatus::SafetyApproved;
                next.safety_validation = Some(stamp(step));
            }
            RequestAction::Reject => {
                next.status = RequestStatus::Rejected;
                next.rejection_reason = comment.clone();
            }
            RequestAction::PrepareExit => {
                next.status = RequestStatus::ExitPrepared;
                let mut record = ExitRecord::open(stamp(step));
                record.quantities = input.checked_quantities()?.unwrap_or_default();
                next.exit_record = Some(record);
                next.exited_at = Some(now);
            }
            RequestAction::AmendExit => {
                let record = request
                    .exit_record
                    .as_ref()
                    .filter(|record| record.modifiable)
                    .ok_or(ActionError::ExitRecordLocked)?;
                if !record.within_edit_window(now) {
                    return Err(ActionError::ExitWindowClosed {
                        editable_until: record.editable_until,
                    });
                }

                let mut amended = record.clone();
                if let Some(text) = comment.as_deref().filter(|text| !text.is_empty()) {
                    amended.stamp.comment = Some(text.to_owned());
                }
                if let Some(quantities) = input.checked_quantities()? {
                    amended.quantities = quantities;
                }
                next.exit_record = Some(amended);
            }
            RequestAction::ValidatePreparation => {
                next.status = RequestStatus::ExitValidated;
                next.preparation_validation = Some(stamp(step));
                if let Some(record) = next.exit_record.as_mut() {
                    record.modifiable = false;
                }
            }
            RequestAction::FinalValidation => {
                next.status = RequestStatus::FinalApproved;
                next.final_validation = Some(stamp(step));
                next.final_validated_at = Some(now);
            }
            RequestAction::Archive => {
                next.status = RequestStatus::Archived;
            }
        }

        if next.status.rank() < request.status.rank() {
            return Err(ActionError::BackwardTransition { from: request.status, to: next.status });
        }
        next.updated_at = now;

        let label = action_label(action);
        let notification = Notification {
            id: Uuid::new_v4().to_string(),
            user_id: request.owner_id.clone(),
            title: NOTIFICATION_TITLE.to_owned(),
            message: format!("Votre demande {} a été {label}", request.numero),
            read: false,
            created_at: now,
            request_id: request.id.clone(),
            project_id: request.project_id.clone(),
        };
        let history_entry = HistoryEntry {
            id: Uuid::new_v4().to_string(),
            request_id: request.id.clone(),
            user_id: actor.id.clone(),
            action: label.to_owned(),
            previous_status: request.status,
            new_status: next.status,
            comment,
            timestamp: now,
            signature: format!("{}-{}-{}", actor.id.0, now.timestamp_millis(), action.as_str()),
        };

        Ok(ActionOutcome { request: next, notification, history_entry })
    }

    #[allow(clippy::too_many_arguments)]
    pub fn apply_with_audit<S>(
        &self,
        request: &Request,
        actor: &User,
        action: RequestAction,
        input: &ActionInput,
        now: DateTime<Utc>,
        sink: &S,
        audit: &AuditContext,
    ) -> Result<ActionOutcome, ActionError>
    where
        S: AuditSink + ?Sized,
    {
        let result = self.apply(request, actor, action, input, now);
        match &result {
            Ok(outcome) => sink.emit(
                AuditEvent::from_context(
                    audit,
                    "workflow.action_applied",
                    AuditCategory::Workflow,
                    AuditOutcome::Success,
                )
                .with_metadata("action", action.as_str())
                .with_metadata("from", request.status.as_str())
                .with_metadata("to", outcome.request.status.as_str()),
            ),
            Err(error) => sink.emit(
                AuditEvent::from_context(
                    audit,
                    "workflow.action_rejected",
                    AuditCategory::Workflow,
                    AuditOutcome::Rejected,
                )
                .with_metadata("action", action.as_str())
                .with_metadata("status", request.status.as_str())
                .with_metadata("error", error.to_string()),
            ),
        }
        result
    }
}
