use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use chantier_core::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome};
use chantier_core::domain::project::{NewProject, Project, ProjectId};
use chantier_core::errors::{ApplicationError, DomainError};
use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::api::{
    authenticate, correlation_id, parse_body, persistence, reject, ApiResult, ApiSuccess,
    AppState,
};

/// Superadmins see every project; everyone else sees what they created or belong to.
pub async fn list(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<ApiSuccess<Vec<Project>>>> {
    let correlation_id = correlation_id();
    visible_projects(&state, &headers)
        .await
        .map(ApiSuccess::new)
        .map_err(|error| reject(error, &correlation_id))
}

pub async fn create(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<ApiSuccess<Project>>)> {
    let correlation_id = correlation_id();
    create_project(&state, &headers, &body, &correlation_id)
        .await
        .map(|project| (StatusCode::CREATED, ApiSuccess::new(project)))
        .map_err(|error| reject(error, &correlation_id))
}

async fn visible_projects(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<Vec<Project>, ApplicationError> {
    let actor = authenticate(state, headers).await?;
    let projects = state.projects.list().await.map_err(persistence)?;
    Ok(projects.into_iter().filter(|project| project.is_visible_to(&actor)).collect())
}

async fn create_project(
    state: &AppState,
    headers: &HeaderMap,
    body: &[u8],
    correlation_id: &str,
) -> Result<Project, ApplicationError> {
    let actor = authenticate(state, headers).await?;
    if !actor.is_superadmin() {
        return Err(ApplicationError::Forbidden(
            "only a superadmin can create projects".to_owned(),
        ));
    }
    let input: NewProject = parse_body(body, "project")?;

    let id = ProjectId(Uuid::new_v4().simple().to_string());
    let mut project = input.into_project(id.clone(), actor.id.clone(), Utc::now())?;
    project.members.sort_by(|a, b| a.0.cmp(&b.0));
    project.members.dedup();

    let mut members = Vec::with_capacity(project.members.len());
    for user_id in &project.members {
        let user = state.users.find_by_id(user_id).await.map_err(persistence)?.ok_or_else(|| {
            DomainError::InvalidInput(format!("utilisateur `{}` does not exist", user_id.0))
        })?;
        members.push(user);
    }

    state.projects.save(project.clone()).await.map_err(persistence)?;
    for mut user in members {
        user.attach_project(&id);
        state.users.save(user).await.map_err(persistence)?;
    }

    state.audit.emit(
        AuditEvent::from_context(
            &AuditContext::new(None, correlation_id, actor.id.0.clone()),
            "project.created",
            AuditCategory::Project,
            AuditOutcome::Success,
        )
        .with_metadata("project_id", id.0.clone())
        .with_metadata("members", project.members.len().to_string()),
    );
    info!(
        event_name = "api.project.created",
        correlation_id,
        project_id = %id.0,
        members = project.members.len(),
        "project created"
    );
    Ok(project)
}
