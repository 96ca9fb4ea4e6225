pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod workflow;

pub use domain::activity::{HistoryEntry, Notification};
pub use domain::project::{NewProject, Project, ProjectId};
pub use domain::request::{
    ExitRecord, NewRequest, Request, RequestId, RequestKind, RequestStatus, ValidationSignature,
};
pub use domain::user::{NewUser, Role, User, UserId};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use workflow::{ActionEngine, ActionError, ActionInput, ActionOutcome, RequestAction};
