use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::project::ProjectId;
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    #[serde(rename = "superadmin")]
    Superadmin,
    #[serde(rename = "technicien")]
    Technician,
    #[serde(rename = "conducteur_travaux")]
    SiteSupervisor,
    #[serde(rename = "responsable_qhse")]
    SafetyOfficer,
    #[serde(rename = "responsable_appro")]
    SupplyManager,
    #[serde(rename = "charge_affaire")]
    ProjectManager,
}

impl Role {
    pub const ALL: [Role; 6] = [
        Self::Superadmin,
        Self::Technician,
        Self::SiteSupervisor,
        Self::SafetyOfficer,
        Self::SupplyManager,
        Self::ProjectManager,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Superadmin => "superadmin",
            Self::Technician => "technicien",
            Self::SiteSupervisor => "conducteur_travaux",
            Self::SafetyOfficer => "responsable_qhse",
            Self::SupplyManager => "responsable_appro",
            Self::ProjectManager => "charge_affaire",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|role| role.as_str() == value)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    #[serde(rename = "nom")]
    pub last_name: String,
    #[serde(rename = "prenom")]
    pub first_name: String,
    pub email: String,
    pub role: Role,
    #[serde(rename = "projets", default)]
    pub projects: Vec<ProjectId>,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn is_superadmin(&self) -> bool {
        self.role == Role::Superadmin
    }

    pub fn is_member_of(&self, project_id: &ProjectId) -> bool {
        self.projects.iter().any(|id| id == project_id)
    }

    pub fn attach_project(&mut self, project_id: &ProjectId) {
        if !self.is_member_of(project_id) {
            self.projects.push(project_id.clone());
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewUser {
    #[serde(rename = "nom")]
    pub last_name: String,
    #[serde(rename = "prenom")]
    pub first_name: String,
    pub email: String,
    pub role: Role,
    #[serde(rename = "projets", default)]
    pub projects: Vec<ProjectId>,
}

impl NewUser {
    pub fn into_user(self, id: UserId, now: DateTime<Utc>) -> Result<User, DomainError> {
        let last_name = self.last_name.trim();
        let first_name = self.first_name.trim();
        let email = self.email.trim();

        if last_name.is_empty() || first_name.is_empty() || email.is_empty() {
            return Err(DomainError::InvalidInput("nom, prenom and email are required".to_owned()));
        }
        if !email.contains('@') {
            return Err(DomainError::InvalidInput(format!("`{email}` is not an email address")));
        }

        Ok(User {
            id,
            last_name: last_name.to_owned(),
            first_name: first_name.to_owned(),
            email: email.to_ascii_lowercase(),
            role: self.role,
            projects: self.projects,
            created_at: now,
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::{NewUser, Role, UserId};
    use crate::domain::project::ProjectId;

    #[test]
    fn role_storage_encoding_round_trips() {
        for role in Role::ALL {
            assert_eq!(Role::parse(role.as_str()), Some(role));
        }
        assert_eq!(Role::parse("admin"), None);
    }

    #[test]
    fn attach_project_is_idempotent() {
        let mut user = NewUser {
            last_name: "Dupont".to_owned(),
            first_name: "Jean".to_owned(),
            email: "Jean.Dupont@example.com".to_owned(),
            role: Role::Technician,
            projects: Vec::new(),
        }
        .into_user(UserId("2".to_owned()), Utc::now())
        .expect("valid user");

        let project = ProjectId("1".to_owned());
        user.attach_project(&project);
        user.attach_project(&project);

        assert_eq!(user.projects, vec![project.clone()]);
        assert!(user.is_member_of(&project));
        assert_eq!(user.email, "jean.dupont@example.com");
    }

    #[test]
    fn new_user_rejects_missing_names_and_bad_email() {
        let blank = NewUser {
            last_name: " ".to_owned(),
            first_name: "Jean".to_owned(),
            email: "jean@example.com".to_owned(),
            role: Role::Technician,
            projects: Vec::new(),
        };
        assert!(blank.into_user(UserId("x".to_owned()), Utc::now()).is_err());

        let bad_email = NewUser {
            last_name: "Dupont".to_owned(),
            first_name: "Jean".to_owned(),
            email: "jean.example.com".to_owned(),
            role: Role::Technician,
            projects: Vec::new(),
        };
        assert!(bad_email.into_user(UserId("x".to_owned()), Utc::now()).is_err());
    }

    #[test]
    fn role_deserializes_from_wire_name() {
        let role: Role = serde_json::from_str("\"responsable_appro\"").expect("deserialize");
        assert_eq!(role, Role::SupplyManager);
    }
}
