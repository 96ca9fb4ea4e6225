use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sqlx::Row;

use chantier_core::domain::project::ProjectId;
use chantier_core::domain::user::{Role, User, UserId};

use super::{RepositoryError, UserDirectory};
use crate::DbPool;

pub struct SqlUserDirectory {
    pool: DbPool,
}

impl SqlUserDirectory {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn memberships(&self, user_id: &str) -> Result<Vec<ProjectId>, RepositoryError> {
        let ids: Vec<String> = sqlx::query_scalar(
            "SELECT project_id FROM user_project WHERE user_id = ? ORDER BY project_id",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids.into_iter().map(ProjectId).collect())
    }
}

pub(crate) fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|value| value.with_timezone(&Utc))
        .map_err(|error| RepositoryError::Decode(format!("timestamp `{raw}`: {error}")))
}

fn row_to_user(
    row: &sqlx::sqlite::SqliteRow,
    projects: Vec<ProjectId>,
) -> Result<User, RepositoryError> {
    let id: String = row.try_get("id").map_err(RepositoryError::decode)?;
    let role_raw: String = row.try_get("role").map_err(RepositoryError::decode)?;
    let created_at_raw: String = row.try_get("created_at").map_err(RepositoryError::decode)?;

    let role = Role::parse(&role_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown role `{role_raw}` for user {id}")))?;

    Ok(User {
        id: UserId(id),
        last_name: row.try_get("last_name").map_err(RepositoryError::decode)?,
        first_name: row.try_get("first_name").map_err(RepositoryError::decode)?,
        email: row.try_get("email").map_err(RepositoryError::decode)?,
        role,
        projects,
        created_at: parse_timestamp(&created_at_raw)?,
    })
}

const SELECT_USER: &str =
    "SELECT id, last_name, first_name, email, role, created_at FROM app_user";

#[async_trait::async_trait]
impl UserDirectory for SqlUserDirectory {
    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query(&format!("{SELECT_USER} WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(ref row) => Ok(Some(row_to_user(row, self.memberships(&id.0).await?)?)),
            None => Ok(None),
        }
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query(&format!("{SELECT_USER} WHERE email = ? COLLATE NOCASE"))
            .bind(email.trim())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(ref row) => {
                let id: String = row.try_get("id").map_err(RepositoryError::decode)?;
                Ok(Some(row_to_user(row, self.memberships(&id).await?)?))
            }
            None => Ok(None),
        }
    }

    async fn list(&self) -> Result<Vec<User>, RepositoryError> {
        let rows = sqlx::query(&format!("{SELECT_USER} ORDER BY created_at, id"))
            .fetch_all(&self.pool)
            .await?;

        let mut memberships: HashMap<String, Vec<ProjectId>> = HashMap::new();
        let links = sqlx::query("SELECT user_id, project_id FROM user_project ORDER BY project_id")
            .fetch_all(&self.pool)
            .await?;
        for link in &links {
            let user_id: String = link.try_get("user_id").map_err(RepositoryError::decode)?;
            let project_id: String = link.try_get("project_id").map_err(RepositoryError::decode)?;
            memberships.entry(user_id).or_default().push(ProjectId(project_id));
        }

        rows.iter()
            .map(|row| {
                let id: String = row.try_get("id").map_err(RepositoryError::decode)?;
                row_to_user(row, memberships.remove(&id).unwrap_or_default())
            })
            .collect()
    }

    async fn save(&self, user: User) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO app_user (id, last_name, first_name, email, role, created_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 last_name = excluded.last_name,
                 first_name = excluded.first_name,
                 email = excluded.email,
                 role = excluded.role",
        )
        .bind(&user.id.0)
        .bind(&user.last_name)
        .bind(&user.first_name)
        .bind(&user.email)
        .bind(user.role.as_str())
        .bind(user.created_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM user_project WHERE user_id = ?")
            .bind(&user.id.0)
            .execute(&mut *tx)
            .await?;
        for project_id in &user.projects {
            sqlx::query("INSERT OR IGNORE INTO user_project (user_id, project_id) VALUES (?, ?)")
                .bind(&user.id.0)
                .bind(&project_id.0)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, TimeZone, Utc};

    use chantier_core::domain::project::{Project, ProjectId};
    use chantier_core::domain::user::{Role, User, UserId};

    use super::SqlUserDirectory;
    use crate::repositories::{ProjectRepository, SqlProjectRepository, UserDirectory};
    use crate::{connect_with_settings, migrations};

    async fn setup() -> sqlx::SqlitePool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        pool
    }

    fn user(id: &str, role: Role, projects: &[&str]) -> User {
        User {
            id: UserId(id.to_owned()),
            last_name: "Dupont".to_owned(),
            first_name: "Jean".to_owned(),
            email: format!("user{id}@example.com"),
            role,
            projects: projects.iter().map(|p| ProjectId((*p).to_owned())).collect(),
            created_at: Utc.with_ymd_and_hms(2026, 1, 5, 7, 30, 0).single().expect("date"),
        }
    }

    #[tokio::test]
    async fn sql_user_round_trip_with_memberships() {
        let pool = setup().await;
        let directory = SqlUserDirectory::new(pool.clone());
        let admin = user("1", Role::Superadmin, &[]);
        directory.save(admin.clone()).await.expect("save admin");

        SqlProjectRepository::new(pool.clone())
            .save(Project {
                id: ProjectId("P".to_owned()),
                name: "Alpha".to_owned(),
                description: None,
                start_date: NaiveDate::from_ymd_opt(2024, 1, 1).expect("date"),
                end_date: None,
                created_by: admin.id.clone(),
                active: true,
                members: Vec::new(),
                created_at: Utc::now(),
            })
            .await
            .expect("save project");

        let technician = user("2", Role::Technician, &["P"]);
        directory.save(technician.clone()).await.expect("save technician");

        assert_eq!(directory.find_by_id(&technician.id).await.expect("find"), Some(technician.clone()));
        assert_eq!(
            directory.find_by_email("USER2@example.com").await.expect("by email"),
            Some(technician.clone())
        );
        assert_eq!(directory.list().await.expect("list"), vec![admin, technician]);
    }

    #[tokio::test]
    async fn sql_user_save_replaces_memberships() {
        let pool = setup().await;
        let directory = SqlUserDirectory::new(pool);
        let mut supervisor = user("3", Role::SiteSupervisor, &[]);
        directory.save(supervisor.clone()).await.expect("save");

        supervisor.role = Role::ProjectManager;
        directory.save(supervisor.clone()).await.expect("update");

        let found = directory.find_by_id(&supervisor.id).await.expect("find").expect("exists");
        assert_eq!(found.role, Role::ProjectManager);
        assert!(found.projects.is_empty());
    }

    #[tokio::test]
    async fn unknown_role_is_a_decode_error() {
        let pool = setup().await;
        sqlx::query(
            "INSERT INTO app_user (id, last_name, first_name, email, role, created_at)
             VALUES ('9', 'X', 'Y', 'x@example.com', 'stagiaire', '2026-01-01T00:00:00+00:00')",
        )
        .execute(&pool)
        .await
        .expect("insert");

        let result = SqlUserDirectory::new(pool).find_by_id(&UserId("9".to_owned())).await;
        assert!(matches!(result, Err(crate::repositories::RepositoryError::Decode(_))));
    }
}
