use sqlx::Row;

use chantier_core::domain::request::{Request, RequestId};

use super::{RepositoryError, RequestRepository};
use crate::DbPool;

/// Stores each request as a JSON document next to the columns queries filter on.
pub struct SqlRequestRepository {
    pool: DbPool,
}

impl SqlRequestRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_request(row: &sqlx::sqlite::SqliteRow) -> Result<Request, RepositoryError> {
    let document: String = row.try_get("document").map_err(RepositoryError::decode)?;
    serde_json::from_str(&document).map_err(RepositoryError::decode)
}

#[async_trait::async_trait]
impl RequestRepository for SqlRequestRepository {
    async fn find_by_id(&self, id: &RequestId) -> Result<Option<Request>, RepositoryError> {
        let row = sqlx::query("SELECT document FROM request WHERE id = ?")
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_request).transpose()
    }

    async fn save(&self, request: Request) -> Result<(), RepositoryError> {
        let document = serde_json::to_string(&request).map_err(RepositoryError::decode)?;

        sqlx::query(
            "INSERT INTO request (id, numero, kind, owner_id, project_id, status, document,
                                  created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 status = excluded.status,
                 document = excluded.document,
                 updated_at = excluded.updated_at",
        )
        .bind(&request.id.0)
        .bind(&request.numero)
        .bind(request.kind.as_str())
        .bind(&request.owner_id.0)
        .bind(&request.project_id.0)
        .bind(request.status.as_str())
        .bind(document)
        .bind(request.created_at.to_rfc3339())
        .bind(request.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list(&self) -> Result<Vec<Request>, RepositoryError> {
        let rows = sqlx::query("SELECT document FROM request ORDER BY created_at DESC, id")
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(row_to_request).collect()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, NaiveDate, TimeZone, Utc};
    use rust_decimal::Decimal;
    use sqlx::Row;

    use chantier_core::domain::project::{Project, ProjectId};
    use chantier_core::domain::request::{
        ExitRecord, NewRequest, RequestId, RequestKind, RequestStatus, ValidationSignature,
    };
    use chantier_core::domain::user::{Role, User, UserId};

    use super::SqlRequestRepository;
    use crate::repositories::{
        ProjectRepository, RequestRepository, SqlProjectRepository, SqlUserDirectory,
        UserDirectory,
    };
    use crate::{connect_with_settings, migrations};

    async fn setup() -> sqlx::SqlitePool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");

        SqlUserDirectory::new(pool.clone())
            .save(User {
                id: UserId("2".to_owned()),
                last_name: "Durand".to_owned(),
                first_name: "Luc".to_owned(),
                email: "technicien@example.com".to_owned(),
                role: Role::Technician,
                projects: Vec::new(),
                created_at: Utc::now(),
            })
            .await
            .expect("save owner");
        SqlProjectRepository::new(pool.clone())
            .save(Project {
                id: ProjectId("P".to_owned()),
                name: "Alpha".to_owned(),
                description: None,
                start_date: NaiveDate::from_ymd_opt(2024, 1, 1).expect("date"),
                end_date: None,
                created_by: UserId("2".to_owned()),
                active: true,
                members: vec![UserId("2".to_owned())],
                created_at: Utc::now(),
            })
            .await
            .expect("save project");
        pool
    }

    #[tokio::test]
    async fn sql_request_round_trip_keeps_exit_record_and_indexed_status() {
        let pool = setup().await;
        let repo = SqlRequestRepository::new(pool.clone());
        let created = Utc.with_ymd_and_hms(2026, 2, 10, 8, 15, 0).single().expect("date");
        let mut request = NewRequest { kind: RequestKind::Material, project_id: ProjectId("P".into()) }
            .into_request(RequestId("0a1b2c3d".into()), UserId("2".into()), created)
            .expect("draft");
        repo.save(request.clone()).await.expect("insert");

        let prepared = created + Duration::minutes(20);
        let mut exit = ExitRecord::open(ValidationSignature::new(
            &UserId("5".into()),
            "preparation_sortie",
            Some("quai 2".into()),
            prepared,
        ));
        exit.quantities.insert("ciment".into(), Decimal::new(125, 1));
        request.status = RequestStatus::ExitPrepared;
        request.exit_record = Some(exit);
        request.exited_at = Some(prepared);
        request.updated_at = prepared;
        repo.save(request.clone()).await.expect("update");

        assert_eq!(repo.find_by_id(&request.id).await.expect("find"), Some(request.clone()));
        assert_eq!(repo.list().await.expect("list"), vec![request]);

        let status: String = sqlx::query("SELECT status FROM request WHERE id = '0a1b2c3d'")
            .fetch_one(&pool)
            .await
            .expect("row")
            .get("status");
        assert_eq!(status, "sortie_preparee");
    }

    #[tokio::test]
    async fn missing_request_is_none() {
        let repo = SqlRequestRepository::new(setup().await);
        assert_eq!(repo.find_by_id(&RequestId("nope".into())).await.expect("find"), None);
    }

    #[tokio::test]
    async fn corrupt_document_is_a_decode_error() {
        let pool = setup().await;
        sqlx::query(
            "INSERT INTO request (id, numero, kind, owner_id, project_id, status, document,
                                  created_at, updated_at)
             VALUES ('x', 'DEM-2026-X', 'materiel', '2', 'P', 'brouillon', '{not json',
                     '2026-01-01T00:00:00+00:00', '2026-01-01T00:00:00+00:00')",
        )
        .execute(&pool)
        .await
        .expect("insert");

        let result = SqlRequestRepository::new(pool).find_by_id(&RequestId("x".into())).await;
        assert!(matches!(result, Err(crate::repositories::RepositoryError::Decode(_))));
    }
}
