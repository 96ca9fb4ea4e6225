use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use chantier_core::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome};
use chantier_core::domain::request::{NewRequest, Request, RequestId};
use chantier_core::errors::ApplicationError;
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
) -> ApiResult<Json<ApiSuccess<Vec<Request>>>> {
    let correlation_id = correlation_id();
    visible_requests(&state, &headers)
        .await
        .map(ApiSuccess::new)
        .map_err(|error| reject(error, &correlation_id))
}

pub async fn get(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Json<ApiSuccess<Request>>> {
    let correlation_id = correlation_id();
    visible_request(&state, &headers, RequestId(id))
        .await
        .map(ApiSuccess::new)
        .map_err(|error| reject(error, &correlation_id))
}

/// Opens a draft owned by the caller. The caller must belong to the target project.
pub async fn create(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<ApiSuccess<Request>>)> {
    let correlation_id = correlation_id();
    open_draft(&state, &headers, &body, &correlation_id)
        .await
        .map(|request| (StatusCode::CREATED, ApiSuccess::new(request)))
        .map_err(|error| reject(error, &correlation_id))
}

async fn visible_requests(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<Vec<Request>, ApplicationError> {
    let actor = authenticate(state, headers).await?;
    let requests = state.requests.list().await.map_err(persistence)?;
    Ok(requests.into_iter().filter(|request| request.is_visible_to(&actor)).collect())
}

async fn visible_request(
    state: &AppState,
    headers: &HeaderMap,
    id: RequestId,
) -> Result<Request, ApplicationError> {
    let actor = authenticate(state, headers).await?;
    let request = state
        .requests
        .find_by_id(&id)
        .await
        .map_err(persistence)?
        .ok_or(ApplicationError::NotFound { entity: "request", id: id.0 })?;

    if !request.is_visible_to(&actor) {
        return Err(ApplicationError::Forbidden(format!(
            "request `{}` is outside your projects",
            request.numero
        )));
    }
    Ok(request)
}

async fn open_draft(
    state: &AppState,
    headers: &HeaderMap,
    body: &[u8],
    correlation_id: &str,
) -> Result<Request, ApplicationError> {
    let actor = authenticate(state, headers).await?;
    let input: NewRequest = parse_body(body, "request")?;
    let project = state
        .projects
        .find_by_id(&input.project_id)
        .await
        .map_err(persistence)?
        .ok_or_else(|| ApplicationError::NotFound {
            entity: "project",
            id: input.project_id.0.clone(),
        })?;

    if !actor.is_superadmin() && !actor.is_member_of(&project.id) {
        return Err(ApplicationError::Forbidden(format!(
            "you are not attached to project `{}`",
            project.id.0
        )));
    }

    let id = RequestId(Uuid::new_v4().simple().to_string());
    let request = input.into_request(id.clone(), actor.id.clone(), Utc::now())?;
    state.requests.save(request.clone()).await.map_err(persistence)?;

    state.audit.emit(
        AuditEvent::from_context(
            &AuditContext::new(Some(id), correlation_id, actor.id.0.clone()),
            "request.created",
            AuditCategory::Workflow,
            AuditOutcome::Success,
        )
        .with_metadata("numero", request.numero.clone())
        .with_metadata("project_id", request.project_id.0.clone()),
    );
    info!(
        event_name = "api.request.created",
        correlation_id,
        request_id = %request.id.0,
        numero = %request.numero,
        "draft request created"
    );
    Ok(request)
}

#[cfg(test)]
mod tests {
    use axum::body::{to_bytes, Body};
    use axum::extract::{Path, State};
    use axum::http::{HeaderMap, Request as HttpRequest, StatusCode};
    use axum::Json;
    use chantier_core::domain::project::ProjectId;
    use chantier_core::domain::request::{NewRequest, RequestKind, RequestStatus};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::{create, get, list};
    use crate::api::fixtures::{headers_for, json_body, request, state};
    use crate::api::router;

    fn draft(project: &str) -> NewRequest {
        NewRequest { kind: RequestKind::Material, project_id: ProjectId(project.to_owned()) }
    }

    #[tokio::test]
    async fn member_opens_a_numbered_draft() {
        let (state, sink) = state(Vec::new());

        let (status, Json(created)) =
            create(State(state.clone()), headers_for("2"), json_body(&draft("1")))
                .await
                .expect("created");

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created.data.status, RequestStatus::Draft);
        assert_eq!(created.data.owner_id.0, "2");
        assert!(created.data.numero.starts_with("DEM-"));
        assert_eq!(sink.events()[0].event_type, "request.created");

        let stored = state.requests.list().await.expect("list");
        assert_eq!(stored.len(), 1);
    }

    #[tokio::test]
    async fn outsiders_and_unknown_projects_cannot_open_drafts() {
        let (state, _) = state(Vec::new());

        let (status, _) =
            create(State(state.clone()), headers_for("7"), json_body(&draft("1")))
                .await
                .expect_err("not a member");
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) =
            create(State(state.clone()), headers_for("2"), json_body(&draft("404")))
                .await
                .expect_err("unknown project");
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = create(State(state), HeaderMap::new(), json_body(&draft("1")))
            .await
            .expect_err("anonymous");
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn reads_are_limited_to_visible_requests() {
        let (state, _) = state(vec![request("d-1", RequestKind::Material)]);

        let Json(own) = get(State(state.clone()), Path("d-1".to_owned()), headers_for("2"))
            .await
            .expect("owner reads");
        assert_eq!(own.data.id.0, "d-1");

        let Json(admin) = get(State(state.clone()), Path("d-1".to_owned()), headers_for("1"))
            .await
            .expect("superadmin reads");
        assert_eq!(admin.data.id.0, "d-1");

        let (status, _) = get(State(state.clone()), Path("d-1".to_owned()), headers_for("7"))
            .await
            .expect_err("outsider");
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = get(State(state.clone()), Path("nope".to_owned()), headers_for("2"))
            .await
            .expect_err("missing");
        assert_eq!(status, StatusCode::NOT_FOUND);

        let Json(outsider_list) = list(State(state.clone()), headers_for("7")).await.expect("list");
        assert!(outsider_list.data.is_empty());

        let Json(member_list) = list(State(state), headers_for("4")).await.expect("list");
        assert_eq!(member_list.data.len(), 1);
    }

    #[tokio::test]
    async fn router_creates_draft_from_wire_body() {
        let (state, _) = state(Vec::new());

        let response = router(state)
            .oneshot(
                HttpRequest::builder()
                    .method("POST")
                    .uri("/api/demandes")
                    .header("x-user-id", "2")
                    .header("content-type", "application/json")
                    .body(Body::from(json!({ "type": "outillage", "projetId": "1" }).to_string()))
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::CREATED);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body bytes");
        let payload: Value = serde_json::from_slice(&bytes).expect("json body");
        assert_eq!(payload["data"]["type"], json!("outillage"));
        assert_eq!(payload["data"]["status"], json!("brouillon"));
        assert_eq!(payload["data"]["technicienId"], json!("2"));
    }
}
