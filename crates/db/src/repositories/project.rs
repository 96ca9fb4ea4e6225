use std::collections::HashMap;

use chrono::NaiveDate;
use sqlx::Row;

use chantier_core::domain::project::{Project, ProjectId};
use chantier_core::domain::user::UserId;

use super::user::parse_timestamp;
use super::{ProjectRepository, RepositoryError};
use crate::DbPool;

const DATE_FORMAT: &str = "%Y-%m-%d";

pub struct SqlProjectRepository {
    pool: DbPool,
}

impl SqlProjectRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn member_ids(&self, project_id: &str) -> Result<Vec<UserId>, RepositoryError> {
        let ids: Vec<String> = sqlx::query_scalar(
            "SELECT user_id FROM user_project WHERE project_id = ? ORDER BY user_id",
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids.into_iter().map(UserId).collect())
    }
}

fn parse_date(raw: &str) -> Result<NaiveDate, RepositoryError> {
    NaiveDate::parse_from_str(raw, DATE_FORMAT)
        .map_err(|error| RepositoryError::Decode(format!("date `{raw}`: {error}")))
}

fn row_to_project(
    row: &sqlx::sqlite::SqliteRow,
    members: Vec<UserId>,
) -> Result<Project, RepositoryError> {
    let start_raw: String = row.try_get("start_date").map_err(RepositoryError::decode)?;
    let end_raw: Option<String> = row.try_get("end_date").map_err(RepositoryError::decode)?;
    let active: i64 = row.try_get("active").map_err(RepositoryError::decode)?;
    let created_at_raw: String = row.try_get("created_at").map_err(RepositoryError::decode)?;

    Ok(Project {
        id: ProjectId(row.try_get("id").map_err(RepositoryError::decode)?),
        name: row.try_get("name").map_err(RepositoryError::decode)?,
        description: row.try_get("description").map_err(RepositoryError::decode)?,
        start_date: parse_date(&start_raw)?,
        end_date: end_raw.as_deref().map(parse_date).transpose()?,
        created_by: UserId(row.try_get("created_by").map_err(RepositoryError::decode)?),
        active: active != 0,
        members,
        created_at: parse_timestamp(&created_at_raw)?,
    })
}

const SELECT_PROJECT: &str = "SELECT id, name, description, start_date, end_date, created_by,
        active, created_at FROM project";

#[async_trait::async_trait]
impl ProjectRepository for SqlProjectRepository {
    async fn find_by_id(&self, id: &ProjectId) -> Result<Option<Project>, RepositoryError> {
        let row = sqlx::query(&format!("{SELECT_PROJECT} WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(ref row) => Ok(Some(row_to_project(row, self.member_ids(&id.0).await?)?)),
            None => Ok(None),
        }
    }

    async fn list(&self) -> Result<Vec<Project>, RepositoryError> {
        let rows = sqlx::query(&format!("{SELECT_PROJECT} ORDER BY created_at DESC, id"))
            .fetch_all(&self.pool)
            .await?;

        let mut members: HashMap<String, Vec<UserId>> = HashMap::new();
        let links = sqlx::query("SELECT user_id, project_id FROM user_project ORDER BY user_id")
            .fetch_all(&self.pool)
            .await?;
        for link in &links {
            let project_id: String = link.try_get("project_id").map_err(RepositoryError::decode)?;
            let user_id: String = link.try_get("user_id").map_err(RepositoryError::decode)?;
            members.entry(project_id).or_default().push(UserId(user_id));
        }

        rows.iter()
            .map(|row| {
                let id: String = row.try_get("id").map_err(RepositoryError::decode)?;
                row_to_project(row, members.remove(&id).unwrap_or_default())
            })
            .collect()
    }

    async fn save(&self, project: Project) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO project (id, name, description, start_date, end_date, created_by,
                                  active, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 name = excluded.name,
                 description = excluded.description,
                 start_date = excluded.start_date,
                 end_date = excluded.end_date,
                 active = excluded.active",
        )
        .bind(&project.id.0)
        .bind(&project.name)
        .bind(&project.description)
        .bind(project.start_date.format(DATE_FORMAT).to_string())
        .bind(project.end_date.map(|date| date.format(DATE_FORMAT).to_string()))
        .bind(&project.created_by.0)
        .bind(i64::from(project.active))
        .bind(project.created_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM user_project WHERE project_id = ?")
            .bind(&project.id.0)
            .execute(&mut *tx)
            .await?;
        for user_id in &project.members {
            sqlx::query("INSERT OR IGNORE INTO user_project (user_id, project_id) VALUES (?, ?)")
                .bind(&user_id.0)
                .bind(&project.id.0)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}
