use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::workflow::engine::ActionError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequestAction {
    #[serde(rename = "soumettre")]
    Submit,
    #[serde(rename = "valider_materiel")]
    ApproveMaterial,
    #[serde(rename = "valider_outillage")]
    ApproveTooling,
    #[serde(rename = "rejeter")]
    Reject,
    #[serde(rename = "preparer_sortie")]
    PrepareExit,
    #[serde(rename = "modifier_sortie")]
    AmendExit,
    #[serde(rename = "valider_preparation")]
    ValidatePreparation,
    #[serde(rename = "validation_finale")]
    FinalValidation,
    #[serde(rename = "archiver")]
    Archive,
}

impl RequestAction {
    pub const ALL: [RequestAction; 9] = [
        Self::Submit,
        Self::ApproveMaterial,
        Self::ApproveTooling,
        Self::Reject,
        Self::PrepareExit,
        Self::AmendExit,
        Self::ValidatePreparation,
        Self::FinalValidation,
        Self::Archive,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Submit => "soumettre",
            Self::ApproveMaterial => "valider_materiel",
            Self::ApproveTooling => "valider_outillage",
            Self::Reject => "rejeter",
            Self::PrepareExit => "preparer_sortie",
            Self::AmendExit => "modifier_sortie",
            Self::ValidatePreparation => "valider_preparation",
            Self::FinalValidation => "validation_finale",
            Self::Archive => "archiver",
        }
    }

    /// Step name embedded in the validation signature written by this action.
    pub fn signature_step(&self) -> Option<&'static str> {
        match self {
            Self::ApproveMaterial => Some("validation_materiel"),
            Self::ApproveTooling => Some("validation_outillage"),
            Self::PrepareExit => Some("preparation_sortie"),
            Self::ValidatePreparation => Some("validation_preparation"),
            Self::FinalValidation => Some("validation_finale"),
            Self::Submit | Self::Reject | Self::AmendExit | Self::Archive => None,
        }
    }
}

impl fmt::Display for RequestAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestAction {
    type Err = ActionError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|action| action.as_str() == value)
            .ok_or_else(|| ActionError::UnknownAction { name: value.to_owned() })
    }
}

/// Past participle shown to the request owner, e.g. "Votre demande DEM-.. a été soumise".
pub fn action_label(action: RequestAction) -> &'static str {
    match action {
        RequestAction::Submit => "soumise",
        RequestAction::ApproveMaterial => "validée par le conducteur",
        RequestAction::ApproveTooling => "validée par le responsable QHSE",
        RequestAction::Reject => "rejetée",
        RequestAction::PrepareExit => "préparée pour sortie",
        RequestAction::AmendExit => "modifiée",
        RequestAction::ValidatePreparation => "validée par le chargé d'affaire",
        RequestAction::FinalValidation => "validée définitivement",
        RequestAction::Archive => "archivée",
    }
}
