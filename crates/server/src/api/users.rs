use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use chantier_core::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome};
use chantier_core::domain::user::{NewUser, User, UserId};
use chantier_core::errors::{ApplicationError, DomainError};
use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::api::{
    authenticate, correlation_id, parse_body, persistence, reject, ApiResult, ApiSuccess,
    AppState,
};

pub async fn list(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<ApiSuccess<Vec<User>>>> {
    let correlation_id = correlation_id();
    list_users(&state, &headers)
        .await
        .map(ApiSuccess::new)
        .map_err(|error| reject(error, &correlation_id))
}

pub async fn create(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<ApiSuccess<User>>)> {
    let correlation_id = correlation_id();
    create_user(&state, &headers, &body, &correlation_id)
        .await
        .map(|user| (StatusCode::CREATED, ApiSuccess::new(user)))
        .map_err(|error| reject(error, &correlation_id))
}

async fn require_superadmin(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<User, ApplicationError> {
    let actor = authenticate(state, headers).await?;
    if !actor.is_superadmin() {
        return Err(ApplicationError::Forbidden(
            "the user directory is restricted to superadmins".to_owned(),
        ));
    }
    Ok(actor)
}

async fn list_users(state: &AppState, headers: &HeaderMap) -> Result<Vec<User>, ApplicationError> {
    require_superadmin(state, headers).await?;
    state.users.list().await.map_err(persistence)
}

async fn create_user(
    state: &AppState,
    headers: &HeaderMap,
    body: &[u8],
    correlation_id: &str,
) -> Result<User, ApplicationError> {
    let actor = require_superadmin(state, headers).await?;
    let input: NewUser = parse_body(body, "user")?;

    let mut user = input.into_user(UserId(Uuid::new_v4().simple().to_string()), Utc::now())?;
    user.projects.sort_by(|a, b| a.0.cmp(&b.0));
    user.projects.dedup();

    if state.users.find_by_email(&user.email).await.map_err(persistence)?.is_some() {
        let message = format!("email `{}` is already registered", user.email);
        return Err(DomainError::InvalidInput(message).into());
    }

    let mut projects = Vec::with_capacity(user.projects.len());
    for project_id in &user.projects {
        let project =
            state.projects.find_by_id(project_id).await.map_err(persistence)?.ok_or_else(|| {
                DomainError::InvalidInput(format!("projet `{}` does not exist", project_id.0))
            })?;
        projects.push(project);
    }

    state.users.save(user.clone()).await.map_err(persistence)?;
    for mut project in projects {
        if !project.members.contains(&user.id) {
            project.members.push(user.id.clone());
        }
        state.projects.save(project).await.map_err(persistence)?;
    }

    state.audit.emit(
        AuditEvent::from_context(
            &AuditContext::new(None, correlation_id, actor.id.0.clone()),
            "directory.user_created",
            AuditCategory::Directory,
            AuditOutcome::Success,
        )
        .with_metadata("user_id", user.id.0.clone())
        .with_metadata("role", user.role.as_str()),
    );
    info!(
        event_name = "api.user.created",
        correlation_id,
        user_id = %user.id.0,
        role = user.role.as_str(),
        "user created"
    );
    Ok(user)
}
