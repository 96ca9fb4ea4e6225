use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::project::ProjectId;
use crate::domain::request::{RequestId, RequestStatus};
use crate::domain::user::UserId;

/// Message addressed to a request's owning technician after an action succeeds.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    #[serde(rename = "userId")]
    pub user_id: UserId,
    #[serde(rename = "titre")]
    pub title: String,
    pub message: String,
    #[serde(rename = "lu")]
    pub read: bool,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "demandeId")]
    pub request_id: RequestId,
    #[serde(rename = "projetId")]
    pub project_id: ProjectId,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: String,
    #[serde(rename = "demandeId")]
    pub request_id: RequestId,
    #[serde(rename = "userId")]
    pub user_id: UserId,
    pub action: String,
    #[serde(rename = "ancienStatus")]
    pub previous_status: RequestStatus,
    #[serde(rename = "nouveauStatus")]
    pub new_status: RequestStatus,
    #[serde(rename = "commentaire", default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub signature: String,
}
