use std::collections::HashMap;

use tokio::sync::RwLock;

use chantier_core::domain::project::{Project, ProjectId};
use chantier_core::domain::request::{Request, RequestId};
use chantier_core::domain::user::{User, UserId};

use super::{ProjectRepository, RepositoryError, RequestRepository, UserDirectory};

#[derive(Default)]
pub struct InMemoryRequestRepository {
    requests: RwLock<HashMap<String, Request>>,
}

impl InMemoryRequestRepository {
    pub fn with_requests(requests: impl IntoIterator<Item = Request>) -> Self {
        let requests = requests.into_iter().map(|request| (request.id.0.clone(), request)).collect();
        Self { requests: RwLock::new(requests) }
    }
}

#[async_trait::async_trait]
impl RequestRepository for InMemoryRequestRepository {
    async fn find_by_id(&self, id: &RequestId) -> Result<Option<Request>, RepositoryError> {
        let requests = self.requests.read().await;
        Ok(requests.get(&id.0).cloned())
    }

    async fn save(&self, request: Request) -> Result<(), RepositoryError> {
        let mut requests = self.requests.write().await;
        requests.insert(request.id.0.clone(), request);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Request>, RepositoryError> {
        let requests = self.requests.read().await;
        let mut listed: Vec<Request> = requests.values().cloned().collect();
        listed.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.0.cmp(&b.id.0)));
        Ok(listed)
    }
}

#[derive(Default)]
pub struct InMemoryUserDirectory {
    users: RwLock<HashMap<String, User>>,
}

impl InMemoryUserDirectory {
    pub fn with_users(users: impl IntoIterator<Item = User>) -> Self {
        let users = users.into_iter().map(|user| (user.id.0.clone(), user)).collect();
        Self { users: RwLock::new(users) }
    }
}

#[async_trait::async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, RepositoryError> {
        let users = self.users.read().await;
        Ok(users.get(&id.0).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError> {
        let users = self.users.read().await;
        Ok(users.values().find(|user| user.email.eq_ignore_ascii_case(email.trim())).cloned())
    }

    async fn list(&self) -> Result<Vec<User>, RepositoryError> {
        let users = self.users.read().await;
        let mut listed: Vec<User> = users.values().cloned().collect();
        listed.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.0.cmp(&b.id.0)));
        Ok(listed)
    }

    async fn save(&self, user: User) -> Result<(), RepositoryError> {
        let mut users = self.users.write().await;
        users.insert(user.id.0.clone(), user);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryProjectRepository {
    projects: RwLock<HashMap<String, Project>>,
}

impl InMemoryProjectRepository {
    pub fn with_projects(projects: impl IntoIterator<Item = Project>) -> Self {
        let projects = projects.into_iter().map(|project| (project.id.0.clone(), project)).collect();
        Self { projects: RwLock::new(projects) }
    }
}

#[async_trait::async_trait]
impl ProjectRepository for InMemoryProjectRepository {
    async fn find_by_id(&self, id: &ProjectId) -> Result<Option<Project>, RepositoryError> {
        let projects = self.projects.read().await;
        Ok(projects.get(&id.0).cloned())
    }

    async fn list(&self) -> Result<Vec<Project>, RepositoryError> {
        let projects = self.projects.read().await;
        let mut listed: Vec<Project> = projects.values().cloned().collect();
        listed.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.0.cmp(&b.id.0)));
        Ok(listed)
    }

    async fn save(&self, project: Project) -> Result<(), RepositoryError> {
        let mut projects = self.projects.write().await;
        projects.insert(project.id.0.clone(), project);
        Ok(())
    }
}
