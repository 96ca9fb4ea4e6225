//! JSON API for requests, projects and the user directory.
//!
//! Every response is wrapped in `{ "success": bool, ... }`. Failures carry the error
//! message and the correlation id that the matching log lines were written with.

use std::sync::Arc;

use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use chantier_core::audit::AuditSink;
use chantier_core::domain::user::{User, UserId};
use chantier_core::errors::{ApplicationError, DomainError, InterfaceError};
use chantier_core::ActionEngine;
use chantier_db::{
    DbPool, ProjectRepository, RepositoryError, RequestRepository, SqlProjectRepository,
    SqlRequestRepository, SqlUserDirectory, UserDirectory,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{error, warn};
use uuid::Uuid;

use crate::audit::TracingAuditSink;

pub mod actions;
pub mod projects;
pub mod requests;
pub mod users;

#[derive(Clone)]
pub struct AppState {
    pub requests: Arc<dyn RequestRepository>,
    pub users: Arc<dyn UserDirectory>,
    pub projects: Arc<dyn ProjectRepository>,
    pub audit: Arc<dyn AuditSink>,
    pub engine: ActionEngine,
    actor_header: String,
}

impl AppState {
    pub fn new(
        requests: Arc<dyn RequestRepository>,
        users: Arc<dyn UserDirectory>,
        projects: Arc<dyn ProjectRepository>,
        audit: Arc<dyn AuditSink>,
        actor_header: &str,
    ) -> Self {
        Self {
            requests,
            users,
            projects,
            audit,
            engine: ActionEngine::new(),
            actor_header: actor_header.trim().to_ascii_lowercase(),
        }
    }

    pub fn from_pool(pool: DbPool, actor_header: &str) -> Self {
        Self::new(
            Arc::new(SqlRequestRepository::new(pool.clone())),
            Arc::new(SqlUserDirectory::new(pool.clone())),
            Arc::new(SqlProjectRepository::new(pool)),
            Arc::new(TracingAuditSink),
            actor_header,
        )
    }

    pub fn actor_header(&self) -> &str {
        &self.actor_header
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/demandes", get(requests::list).post(requests::create))
        .route("/api/demandes/{id}", get(requests::get))
        .route("/api/demandes/{id}/actions", post(actions::perform))
        .route("/api/projets", get(projects::list).post(projects::create))
        .route("/api/users", get(users::list).post(users::create))
        .with_state(state)
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ApiSuccess<T> {
    pub success: bool,
    pub data: T,
}

impl<T> ApiSuccess<T> {
    pub fn new(data: T) -> Json<Self> {
        Json(Self { success: true, data })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ApiFailure {
    pub success: bool,
    pub error: String,
    pub correlation_id: String,
}

pub type ApiError = (StatusCode, Json<ApiFailure>);
pub type ApiResult<T> = Result<T, ApiError>;

pub(crate) fn correlation_id() -> String {
    format!("req-{}", Uuid::new_v4())
}

/// Converts an application failure into its HTTP status and envelope.
/// Internal failures are logged in full but only a generic message leaves the process.
pub(crate) fn reject(error: ApplicationError, correlation_id: &str) -> ApiError {
    let interface = error.into_interface(correlation_id);
    let (status, message) = match &interface {
        InterfaceError::Unauthenticated { message, .. } => {
            (StatusCode::UNAUTHORIZED, message.clone())
        }
        InterfaceError::Forbidden { message, .. } => (StatusCode::FORBIDDEN, message.clone()),
        InterfaceError::NotFound { message, .. } => (StatusCode::NOT_FOUND, message.clone()),
        InterfaceError::BadRequest { message, .. } => (StatusCode::BAD_REQUEST, message.clone()),
        InterfaceError::Internal { message, .. } => {
            error!(
                event_name = "api.request.failed",
                correlation_id,
                error = %message,
                "request failed with an internal error"
            );
            (StatusCode::INTERNAL_SERVER_ERROR, interface.user_message().to_owned())
        }
    };

    if status.is_client_error() {
        warn!(
            event_name = "api.request.rejected",
            correlation_id,
            status = status.as_u16(),
            error = %message,
            "request rejected"
        );
    }

    (
        status,
        Json(ApiFailure {
            success: false,
            error: message,
            correlation_id: interface.correlation_id().to_owned(),
        }),
    )
}

pub(crate) fn persistence(error: RepositoryError) -> ApplicationError {
    ApplicationError::Persistence(error.to_string())
}

/// Decodes a JSON request body. Handlers call this only after the actor has been
/// authenticated and authorized.
pub(crate) fn parse_body<T: DeserializeOwned>(
    body: &[u8],
    what: &str,
) -> Result<T, ApplicationError> {
    serde_json::from_slice(body).map_err(|error| {
        ApplicationError::Domain(DomainError::InvalidInput(format!("invalid {what} body: {error}")))
    })
}

/// Resolves the calling user from the actor header. A missing header and an id that
/// matches no user are both unauthenticated.
pub(crate) async fn authenticate(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<User, ApplicationError> {
    let raw = headers
        .get(state.actor_header())
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| {
            ApplicationError::Unauthenticated(format!("missing `{}` header", state.actor_header()))
        })?;

    state
        .users
        .find_by_id(&UserId(raw.to_owned()))
        .await
        .map_err(persistence)?
        .ok_or_else(|| ApplicationError::Unauthenticated(format!("unknown user `{raw}`")))
}
