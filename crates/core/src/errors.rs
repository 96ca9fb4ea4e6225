use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::workflow::ActionError;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error(transparent)]
    Action(#[from] ActionError),
    #[error("project end date {end} must be after start date {start}")]
    InvalidProjectRange { start: DateTime<Utc>, end: DateTime<Utc> },
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("{entity} `{id}` not found")]
    NotFound { entity: &'static str, id: String },
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

impl From<ActionError> for ApplicationError {
    fn from(value: ActionError) -> Self {
        Self::Domain(DomainError::Action(value))
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("unauthenticated: {message}")]
    Unauthenticated { message: String, correlation_id: String },
    #[error("forbidden: {message}")]
    Forbidden { message: String, correlation_id: String },
    #[error("not found: {message}")]
    NotFound { message: String, correlation_id: String },
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Unauthenticated { .. } => "Authentication is required.",
            Self::Forbidden { .. } => "You are not allowed to perform this action.",
            Self::NotFound { .. } => "The requested resource does not exist.",
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Unauthenticated { message, .. }
            | Self::Forbidden { message, .. }
            | Self::NotFound { message, .. }
            | Self::BadRequest { message, .. }
            | Self::Internal { message, .. } => message,
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::Unauthenticated { correlation_id, .. }
            | Self::Forbidden { correlation_id, .. }
            | Self::NotFound { correlation_id, .. }
            | Self::BadRequest { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::Unauthenticated { correlation_id: id, .. }
            | InterfaceError::Forbidden { correlation_id: id, .. }
            | InterfaceError::NotFound { correlation_id: id, .. }
            | InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        let correlation_id = "unassigned".to_owned();
        let message = value.to_string();
        match value {
            ApplicationError::Unauthenticated(_) => Self::Unauthenticated { message, correlation_id },
            ApplicationError::Forbidden(_)
            | ApplicationError::Domain(DomainError::Action(
                ActionError::Denied { .. }
                | ActionError::ExitRecordLocked
                | ActionError::ExitWindowClosed { .. },
            )) => Self::Forbidden { message, correlation_id },
            ApplicationError::NotFound { .. } => Self::NotFound { message, correlation_id },
            ApplicationError::Domain(DomainError::Action(
                ActionError::UnknownAction { .. } | ActionError::NegativeQuantity { .. },
            ))
            | ApplicationError::Domain(DomainError::InvalidProjectRange { .. })
            | ApplicationError::Domain(DomainError::InvalidInput(_)) => {
                Self::BadRequest { message, correlation_id }
            }
            ApplicationError::Domain(DomainError::Action(ActionError::BackwardTransition {
                ..
            }))
            | ApplicationError::Domain(DomainError::InvariantViolation(_))
            | ApplicationError::Persistence(_)
            | ApplicationError::Configuration(_) => Self::Internal { message, correlation_id },
        }
    }
}
