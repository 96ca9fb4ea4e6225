pub mod actions;
pub mod engine;
pub mod permission;

pub use actions::{action_label, RequestAction};
pub use engine::{ActionEngine, ActionError, ActionInput, ActionOutcome};
pub use permission::{Denial, PermissionContext, ProjectScope, Rule};
