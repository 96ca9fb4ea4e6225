use async_trait::async_trait;
use thiserror::Error;

use chantier_core::domain::project::{Project, ProjectId};
use chantier_core::domain::request::{Request, RequestId};
use chantier_core::domain::user::{User, UserId};

pub mod memory;
pub mod project;
pub mod request;
pub mod user;

pub use memory::{InMemoryProjectRepository, InMemoryRequestRepository, InMemoryUserDirectory};
pub use project::SqlProjectRepository;
pub use request::SqlRequestRepository;
pub use user::SqlUserDirectory;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

impl RepositoryError {
    pub(crate) fn decode(error: impl std::fmt::Display) -> Self {
        Self::Decode(error.to_string())
    }
}

/// Requests are written back whole; `save` replaces any stored version of the same id.
#[async_trait]
pub trait RequestRepository: Send + Sync {
    async fn find_by_id(&self, id: &RequestId) -> Result<Option<Request>, RepositoryError>;
    async fn save(&self, request: Request) -> Result<(), RepositoryError>;
    /// Most recently created first.
    async fn list(&self) -> Result<Vec<Request>, RepositoryError>;
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, RepositoryError>;
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError>;
    async fn list(&self) -> Result<Vec<User>, RepositoryError>;
    async fn save(&self, user: User) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait ProjectRepository: Send + Sync {
    async fn find_by_id(&self, id: &ProjectId) -> Result<Option<Project>, RepositoryError>;
    async fn list(&self) -> Result<Vec<Project>, RepositoryError>;
    async fn save(&self, project: Project) -> Result<(), RepositoryError>;
}
