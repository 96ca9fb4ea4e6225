use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::project::ProjectId;
use crate::domain::user::{User, UserId};
use crate::errors::DomainError;

/// Minutes during which a prepared exit record may still be edited.
pub const EXIT_EDIT_WINDOW_MINUTES: i64 = 45;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequestKind {
    #[serde(rename = "materiel")]
    Material,
    #[serde(rename = "outillage")]
    Tooling,
}

impl RequestKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Material => "materiel",
            Self::Tooling => "outillage",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "materiel" => Some(Self::Material),
            "outillage" => Some(Self::Tooling),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequestStatus {
    #[serde(rename = "brouillon")]
    Draft,
    #[serde(rename = "soumise")]
    Submitted,
    #[serde(rename = "validee_conducteur")]
    SupervisorApproved,
    #[serde(rename = "validee_qhse")]
    SafetyApproved,
    #[serde(rename = "rejetee")]
    Rejected,
    #[serde(rename = "sortie_preparee")]
    ExitPrepared,
    #[serde(rename = "validee_charge_affaire")]
    ExitValidated,
    #[serde(rename = "validee_finale")]
    FinalApproved,
    #[serde(rename = "archivee")]
    Archived,
}

impl RequestStatus {
    pub const ALL: [RequestStatus; 9] = [
        Self::Draft,
        Self::Submitted,
        Self::SupervisorApproved,
        Self::SafetyApproved,
        Self::Rejected,
        Self::ExitPrepared,
        Self::ExitValidated,
        Self::FinalApproved,
        Self::Archived,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "brouillon",
            Self::Submitted => "soumise",
            Self::SupervisorApproved => "validee_conducteur",
            Self::SafetyApproved => "validee_qhse",
            Self::Rejected => "rejetee",
            Self::ExitPrepared => "sortie_preparee",
            Self::ExitValidated => "validee_charge_affaire",
            Self::FinalApproved => "validee_finale",
            Self::Archived => "archivee",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.as_str() == value.trim())
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Rejected | Self::Archived)
    }

    /// Position in the lifecycle. Statuses only ever move to an equal or higher rank.
    pub fn rank(&self) -> u8 {
        match self {
            Self::Draft => 0,
            Self::Submitted => 1,
            Self::SupervisorApproved | Self::SafetyApproved | Self::Rejected => 2,
            Self::ExitPrepared => 3,
            Self::ExitValidated => 4,
            Self::FinalApproved => 5,
            Self::Archived => 6,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationSignature {
    #[serde(rename = "userId")]
    pub user_id: UserId,
    pub date: DateTime<Utc>,
    #[serde(rename = "commentaire", default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    /// `<user>-<step>-<millis>` audit marker. Carries no integrity guarantee.
    pub signature: String,
}

impl ValidationSignature {
    pub fn new(user_id: &UserId, step: &str, comment: Option<String>, now: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.clone(),
            date: now,
            comment,
            signature: format!("{}-{}-{}", user_id.0, step, now.timestamp_millis()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitRecord {
    #[serde(flatten)]
    pub stamp: ValidationSignature,
    #[serde(rename = "quantitesSorties", default)]
    pub quantities: BTreeMap<String, Decimal>,
    pub modifiable: bool,
    #[serde(rename = "dateModificationLimite")]
    pub editable_until: DateTime<Utc>,
}

impl ExitRecord {
    pub fn open(stamp: ValidationSignature) -> Self {
        let editable_until = stamp.date + Duration::minutes(EXIT_EDIT_WINDOW_MINUTES);
        Self { stamp, quantities: BTreeMap::new(), modifiable: true, editable_until }
    }

    /// Inclusive: an edit at exactly the window length is still accepted.
    pub fn within_edit_window(&self, now: DateTime<Utc>) -> bool {
        now - self.stamp.date <= Duration::minutes(EXIT_EDIT_WINDOW_MINUTES)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub id: RequestId,
    pub numero: String,
    #[serde(rename = "type")]
    pub kind: RequestKind,
    #[serde(rename = "technicienId")]
    pub owner_id: UserId,
    #[serde(rename = "projetId")]
    pub project_id: ProjectId,
    pub status: RequestStatus,
    #[serde(rename = "validationConducteur", default, skip_serializing_if = "Option::is_none")]
    pub supervisor_validation: Option<ValidationSignature>,
    #[serde(rename = "validationQHSE", default, skip_serializing_if = "Option::is_none")]
    pub safety_validation: Option<ValidationSignature>,
    #[serde(rename = "rejetMotif", default, skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
    #[serde(rename = "sortieAppro", default, skip_serializing_if = "Option::is_none")]
    pub exit_record: Option<ExitRecord>,
    #[serde(rename = "dateSortie", default, skip_serializing_if = "Option::is_none")]
    pub exited_at: Option<DateTime<Utc>>,
    #[serde(rename = "validationChargeAffaire", default, skip_serializing_if = "Option::is_none")]
    pub preparation_validation: Option<ValidationSignature>,
    #[serde(rename = "validationFinale", default, skip_serializing_if = "Option::is_none")]
    pub final_validation: Option<ValidationSignature>,
    #[serde(rename = "dateValidationFinale", default, skip_serializing_if = "Option::is_none")]
    pub final_validated_at: Option<DateTime<Utc>>,
    #[serde(rename = "dateCreation")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "dateModification")]
    pub updated_at: DateTime<Utc>,
}

impl Request {
    pub fn is_owned_by(&self, user_id: &UserId) -> bool {
        &self.owner_id == user_id
    }

    /// Readable by its owner, by anyone attached to its project, and by superadmins.
    pub fn is_visible_to(&self, user: &User) -> bool {
        user.is_superadmin() || self.is_owned_by(&user.id) || user.is_member_of(&self.project_id)
    }
}

/// Body of a draft request creation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRequest {
    #[serde(rename = "type")]
    pub kind: RequestKind,
    #[serde(rename = "projetId")]
    pub project_id: ProjectId,
}

impl NewRequest {
    pub fn into_request(
        self,
        id: RequestId,
        owner_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<Request, DomainError> {
        if self.project_id.0.trim().is_empty() {
            return Err(DomainError::InvalidInput("projetId is required".to_owned()));
        }

        let suffix: String = id.0.chars().filter(char::is_ascii_hexdigit).take(6).collect();
        let numero = format!("DEM-{}-{}", now.format("%Y"), suffix.to_ascii_uppercase());

        Ok(Request {
            id,
            numero,
            kind: self.kind,
            owner_id,
            project_id: self.project_id,
            status: RequestStatus::Draft,
            supervisor_validation: None,
            safety_validation: None,
            rejection_reason: None,
            exit_record: None,
            exited_at: None,
            preparation_validation: None,
            final_validation: None,
            final_validated_at: None,
            created_at: now,
            updated_at: now,
        })
    }
}
