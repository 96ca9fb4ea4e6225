use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::user::{User, UserId};
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProjectId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    #[serde(rename = "nom")]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "dateDebut")]
    pub start_date: NaiveDate,
    #[serde(rename = "dateFin", default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
    #[serde(rename = "createdBy")]
    pub created_by: UserId,
    #[serde(rename = "actif")]
    pub active: bool,
    #[serde(rename = "utilisateurs", default)]
    pub members: Vec<UserId>,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

impl Project {
    /// Projects a non-superadmin may see: the ones they created or are attached to.
    pub fn is_visible_to(&self, user: &User) -> bool {
        user.is_superadmin()
            || self.created_by == user.id
            || user.is_member_of(&self.id)
            || self.members.contains(&user.id)
    }
}

/// Project creation payload. Dates arrive as `YYYY-MM-DD` or RFC 3339 strings and an
/// empty `dateFin` means the project is open-ended.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProject {
    #[serde(rename = "nom")]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "dateDebut")]
    pub start_date: String,
    #[serde(rename = "dateFin", default)]
    pub end_date: Option<String>,
    #[serde(rename = "utilisateurs", default)]
    pub members: Vec<UserId>,
}

impl NewProject {
    pub fn into_project(
        self,
        id: ProjectId,
        created_by: UserId,
        now: DateTime<Utc>,
    ) -> Result<Project, DomainError> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(DomainError::InvalidInput("nom is required".to_owned()));
        }

        let start = parse_instant("dateDebut", &self.start_date)?;
        let end = match self.end_date.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => Some(parse_instant("dateFin", raw)?),
        };

        // Ordered on the full instants; a same-day range with a later end time is valid.
        if let Some(end) = end {
            if end <= start {
                return Err(DomainError::InvalidProjectRange { start, end });
            }
        }
        let start_date = start.date_naive();
        let end_date = end.map(|end| end.date_naive());

        let description =
            self.description.map(|value| value.trim().to_owned()).filter(|value| !value.is_empty());

        Ok(Project {
            id,
            name: name.to_owned(),
            description,
            start_date,
            end_date,
            created_by,
            active: true,
            members: self.members,
            created_at: now,
        })
    }
}

/// Accepts `YYYY-MM-DD` (midnight UTC) or a full RFC 3339 timestamp.
fn parse_instant(field: &str, raw: &str) -> Result<DateTime<Utc>, DomainError> {
    let raw = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Ok(Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN)));
    }

    DateTime::parse_from_rfc3339(raw)
        .map(|value| value.with_timezone(&Utc))
        .map_err(|_| DomainError::InvalidInput(format!("{field} `{raw}` is not a valid date")))
}
