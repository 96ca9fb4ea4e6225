use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use chantier_core::audit::AuditContext;
use chantier_core::domain::request::RequestId;
use chantier_core::errors::ApplicationError;
use chantier_core::{ActionInput, ActionOutcome, RequestAction};
use chrono::Utc;
use serde::Deserialize;
use tracing::info;

use crate::api::{
    authenticate, correlation_id, parse_body, persistence, reject, ApiResult, ApiSuccess,
    AppState,
};

/// Body of `POST /api/demandes/{id}/actions`.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ActionRequest {
    pub action: String,
    #[serde(rename = "commentaire", default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub data: Option<ActionData>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ActionData {
    #[serde(rename = "quantitesSorties", default)]
    pub exit_quantities: Option<std::collections::BTreeMap<String, rust_decimal::Decimal>>,
}

impl ActionRequest {
    fn into_input(self) -> Result<(RequestAction, ActionInput), ApplicationError> {
        let action = self.action.parse::<RequestAction>()?;
        let input = ActionInput {
            comment: self.comment,
            exit_quantities: self.data.and_then(|data| data.exit_quantities),
        };
        Ok((action, input))
    }
}

/// Applies one workflow action. Checks run in order: caller identity, request existence,
/// body and action name, then the action's own rule.
pub async fn perform(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<ApiSuccess<ActionOutcome>>> {
    let correlation_id = correlation_id();
    run(&state, RequestId(id), &headers, &body, &correlation_id)
        .await
        .map(ApiSuccess::new)
        .map_err(|error| reject(error, &correlation_id))
}

async fn run(
    state: &AppState,
    id: RequestId,
    headers: &HeaderMap,
    body: &[u8],
    correlation_id: &str,
) -> Result<ActionOutcome, ApplicationError> {
    let actor = authenticate(state, headers).await?;

    let request = state
        .requests
        .find_by_id(&id)
        .await
        .map_err(persistence)?
        .ok_or_else(|| ApplicationError::NotFound { entity: "request", id: id.0.clone() })?;

    let payload: ActionRequest = parse_body(body, "action")?;
    let (action, input) = payload.into_input()?;

    let audit = AuditContext::new(Some(id), correlation_id, actor.id.0.clone());
    let outcome = state.engine.apply_with_audit(
        &request,
        &actor,
        action,
        &input,
        Utc::now(),
        state.audit.as_ref(),
        &audit,
    )?;

    state.requests.save(outcome.request.clone()).await.map_err(persistence)?;

    info!(
        event_name = "api.request.action_applied",
        correlation_id,
        request_id = %outcome.request.id.0,
        action = action.as_str(),
        actor = %actor.id.0,
        from = request.status.as_str(),
        to = outcome.request.status.as_str(),
        "request action applied"
    );

    Ok(outcome)
}
