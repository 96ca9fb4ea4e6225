//! Who may run which action, on which request, in which status.
//!
//! Every action is described by one or more [`Rule`] rows. An action is allowed when any of
//! its rows matches; each row is a conjunction of a status precondition, a role precondition,
//! an optional request-kind precondition, an optional ownership precondition and a project
//! scope. `ProjectScope::Member` is satisfied by project membership or by the superadmin role.

use serde::{Deserialize, Serialize};

use crate::domain::request::{Request, RequestKind, RequestStatus};
use crate::domain::user::{Role, User};
use crate::workflow::actions::RequestAction;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectScope {
    Member,
    Unscoped,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rule {
    pub action: RequestAction,
    pub from: &'static [RequestStatus],
    /// Empty means any role.
    pub roles: &'static [Role],
    pub kind: Option<RequestKind>,
    pub owner_only: bool,
    pub scope: ProjectScope,
}

use RequestStatus as S;

pub const RULES: &[Rule] = &[
    Rule {
        action: RequestAction::Submit,
        from: &[S::Draft],
        roles: &[],
        kind: None,
        owner_only: true,
        scope: ProjectScope::Unscoped,
    },
    Rule {
        action: RequestAction::ApproveMaterial,
        from: &[S::Submitted],
        roles: &[Role::SiteSupervisor],
        kind: Some(RequestKind::Material),
        owner_only: false,
        scope: ProjectScope::Member,
    },
    Rule {
        action: RequestAction::ApproveTooling,
        from: &[S::Submitted],
        roles: &[Role::SafetyOfficer],
        kind: Some(RequestKind::Tooling),
        owner_only: false,
        scope: ProjectScope::Member,
    },
    Rule {
        action: RequestAction::Reject,
        from: &[S::Submitted],
        roles: &[Role::SiteSupervisor],
        kind: Some(RequestKind::Material),
        owner_only: false,
        scope: ProjectScope::Member,
    },
    Rule {
        action: RequestAction::Reject,
        from: &[S::Submitted],
        roles: &[Role::SafetyOfficer],
        kind: Some(RequestKind::Tooling),
        owner_only: false,
        scope: ProjectScope::Member,
    },
    Rule {
        action: RequestAction::Reject,
        from: &[S::Submitted],
        roles: &[Role::Superadmin],
        kind: None,
        owner_only: false,
        scope: ProjectScope::Member,
    },
    Rule {
        action: RequestAction::PrepareExit,
        from: &[S::SupervisorApproved, S::SafetyApproved],
        roles: &[Role::SupplyManager],
        kind: None,
        owner_only: false,
        scope: ProjectScope::Member,
    },
    Rule {
        action: RequestAction::AmendExit,
        from: &[S::ExitPrepared],
        roles: &[Role::SupplyManager],
        kind: None,
        owner_only: false,
        scope: ProjectScope::Member,
    },
    Rule {
        action: RequestAction::ValidatePreparation,
        from: &[S::ExitPrepared],
        roles: &[Role::ProjectManager],
        kind: None,
        owner_only: false,
        scope: ProjectScope::Member,
    },
    Rule {
        action: RequestAction::FinalValidation,
        from: &[S::ExitValidated],
        roles: &[Role::Technician],
        kind: None,
        owner_only: true,
        scope: ProjectScope::Unscoped,
    },
    Rule {
        action: RequestAction::Archive,
        from: &[S::FinalApproved],
        roles: &[Role::Superadmin],
        kind: None,
        owner_only: false,
        scope: ProjectScope::Unscoped,
    },
];

/// The facts about a request and its actor that rules are evaluated against.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PermissionContext {
    pub status: RequestStatus,
    pub kind: RequestKind,
    pub role: Role,
    pub is_owner: bool,
    pub is_member: bool,
}

impl PermissionContext {
    pub fn new(request: &Request, actor: &User) -> Self {
        Self {
            status: request.status,
            kind: request.kind,
            role: actor.role,
            is_owner: request.is_owned_by(&actor.id),
            is_member: actor.is_member_of(&request.project_id),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "denial", rename_all = "snake_case")]
pub enum Denial {
    WrongStatus { status: RequestStatus },
    RoleNotAllowed { role: Role },
    KindMismatch { kind: RequestKind },
    NotOwner,
    NotProjectMember,
}

impl Denial {
    pub fn reason(&self) -> String {
        match self {
            Self::WrongStatus { status } => {
                format!("action is not available in status `{}`", status.as_str())
            }
            Self::RoleNotAllowed { role } => format!("role `{}` may not run this action", role.as_str()),
            Self::KindMismatch { kind } => {
                format!("action does not apply to `{}` requests", kind.as_str())
            }
            Self::NotOwner => "only the owning technician may run this action".to_owned(),
            Self::NotProjectMember => "actor is not attached to the request's project".to_owned(),
        }
    }

    // How far a row got before failing; used to report the most specific denial.
    fn depth(&self) -> u8 {
        match self {
            Self::WrongStatus { .. } => 0,
            Self::RoleNotAllowed { .. } => 1,
            Self::KindMismatch { .. } => 2,
            Self::NotOwner => 3,
            Self::NotProjectMember => 4,
        }
    }
}

impl Rule {
    pub fn check(&self, ctx: &PermissionContext) -> Result<(), Denial> {
        if !self.from.contains(&ctx.status) {
            return Err(Denial::WrongStatus { status: ctx.status });
        }
        if !self.roles.is_empty() && !self.roles.contains(&ctx.role) {
            return Err(Denial::RoleNotAllowed { role: ctx.role });
        }
        if let Some(kind) = self.kind {
            if kind != ctx.kind {
                return Err(Denial::KindMismatch { kind: ctx.kind });
            }
        }
        if self.owner_only && !ctx.is_owner {
            return Err(Denial::NotOwner);
        }
        if self.scope == ProjectScope::Member && !(ctx.is_member || ctx.role == Role::Superadmin) {
            return Err(Denial::NotProjectMember);
        }
        Ok(())
    }
}

pub fn rules_for(action: RequestAction) -> impl Iterator<Item = &'static Rule> {
    RULES.iter().filter(move |rule| rule.action == action)
}

pub fn evaluate(action: RequestAction, ctx: &PermissionContext) -> Result<(), Denial> {
    let mut deepest: Option<Denial> = None;

    for rule in rules_for(action) {
        match rule.check(ctx) {
            Ok(()) => return Ok(()),
            Err(denial) => {
                let deeper = deepest.as_ref().map_or(true, |current| denial.depth() > current.depth());
                if deeper {
                    deepest = Some(denial);
                }
            }
        }
    }

    Err(deepest.unwrap_or(Denial::WrongStatus { status: ctx.status }))
}

#[cfg(test)]
mod tests {
    use super::{evaluate, rules_for, Denial, PermissionContext};
    use crate::domain::request::{RequestKind, RequestStatus};
    use crate::domain::user::Role;
    use crate::workflow::actions::RequestAction;

    /// The guard expressions of the action endpoint, written out literally.
    fn literal_guard(action: RequestAction, ctx: &PermissionContext) -> bool {
        use RequestStatus as S;
        let superadmin = ctx.role == Role::Superadmin;
        let member = ctx.is_member;
        match action {
            RequestAction::Submit => ctx.status == S::Draft && ctx.is_owner,
            RequestAction::ApproveMaterial => {
                ctx.status == S::Submitted
                    && ctx.kind == RequestKind::Material
                    && ctx.role == Role::SiteSupervisor
                    && member
            }
            RequestAction::ApproveTooling => {
                ctx.status == S::Submitted
                    && ctx.kind == RequestKind::Tooling
                    && ctx.role == Role::SafetyOfficer
                    && member
            }
            RequestAction::Reject => {
                ctx.status == S::Submitted
                    && ((ctx.kind == RequestKind::Material && ctx.role == Role::SiteSupervisor)
                        || (ctx.kind == RequestKind::Tooling && ctx.role == Role::SafetyOfficer)
                        || superadmin)
                    && (superadmin || member)
            }
            RequestAction::PrepareExit => {
                (ctx.status == S::SupervisorApproved || ctx.status == S::SafetyApproved)
                    && ctx.role == Role::SupplyManager
                    && (superadmin || member)
            }
            RequestAction::AmendExit => {
                ctx.status == S::ExitPrepared
                    && ctx.role == Role::SupplyManager
                    && (superadmin || member)
            }
            RequestAction::ValidatePreparation => {
                ctx.status == S::ExitPrepared
                    && ctx.role == Role::ProjectManager
                    && (superadmin || member)
            }
            RequestAction::FinalValidation => {
                ctx.status == S::ExitValidated && ctx.role == Role::Technician && ctx.is_owner
            }
            RequestAction::Archive => ctx.status == S::FinalApproved && superadmin,
        }
    }

    fn all_contexts() -> Vec<PermissionContext> {
        let mut contexts = Vec::new();
        for status in RequestStatus::ALL {
            for kind in [RequestKind::Material, RequestKind::Tooling] {
                for role in Role::ALL {
                    for is_owner in [false, true] {
                        for is_member in [false, true] {
                            contexts.push(PermissionContext {
                                status,
                                kind,
                                role,
                                is_owner,
                                is_member,
                            });
                        }
                    }
                }
            }
        }
        contexts
    }

    #[test]
    fn rule_table_matches_literal_guards_for_every_combination() {
        for action in RequestAction::ALL {
            for ctx in all_contexts() {
                assert_eq!(
                    evaluate(action, &ctx).is_ok(),
                    literal_guard(action, &ctx),
                    "mismatch for {action} with {ctx:?}"
                );
            }
        }
    }

    #[test]
    fn every_action_has_at_least_one_rule() {
        for action in RequestAction::ALL {
            assert!(rules_for(action).next().is_some(), "{action} has no rule");
        }
    }

    #[test]
    fn terminal_statuses_allow_nothing() {
        for ctx in all_contexts().into_iter().filter(|ctx| ctx.status.is_terminal()) {
            for action in RequestAction::ALL {
                assert_eq!(
                    evaluate(action, &ctx),
                    Err(Denial::WrongStatus { status: ctx.status }),
                    "{action} must be refused once {}",
                    ctx.status.as_str()
                );
            }
        }
    }

    #[test]
    fn supervisor_cannot_approve_tooling_on_material_request() {
        let ctx = PermissionContext {
            status: RequestStatus::Submitted,
            kind: RequestKind::Material,
            role: Role::SiteSupervisor,
            is_owner: false,
            is_member: true,
        };

        assert_eq!(evaluate(RequestAction::ApproveMaterial, &ctx), Ok(()));
        assert_eq!(
            evaluate(RequestAction::ApproveTooling, &ctx),
            Err(Denial::RoleNotAllowed { role: Role::SiteSupervisor })
        );
    }

    #[test]
    fn superadmin_rejects_without_membership_but_supply_manager_cannot_reject() {
        let mut ctx = PermissionContext {
            status: RequestStatus::Submitted,
            kind: RequestKind::Material,
            role: Role::Superadmin,
            is_owner: false,
            is_member: false,
        };
        assert_eq!(evaluate(RequestAction::Reject, &ctx), Ok(()));

        ctx.role = Role::SupplyManager;
        ctx.is_member = true;
        assert_eq!(
            evaluate(RequestAction::Reject, &ctx),
            Err(Denial::RoleNotAllowed { role: Role::SupplyManager })
        );
    }

    #[test]
    fn outsider_is_refused_as_non_member() {
        let ctx = PermissionContext {
            status: RequestStatus::SupervisorApproved,
            kind: RequestKind::Material,
            role: Role::SupplyManager,
            is_owner: false,
            is_member: false,
        };
        assert_eq!(evaluate(RequestAction::PrepareExit, &ctx), Err(Denial::NotProjectMember));
    }

    #[test]
    fn denials_serialize_with_a_tag_distinct_from_their_fields() {
        let cases = [
            (
                Denial::WrongStatus { status: RequestStatus::Draft },
                serde_json::json!({ "denial": "wrong_status", "status": "brouillon" }),
            ),
            (
                Denial::RoleNotAllowed { role: Role::Technician },
                serde_json::json!({ "denial": "role_not_allowed", "role": "technicien" }),
            ),
            (
                Denial::KindMismatch { kind: RequestKind::Tooling },
                serde_json::json!({ "denial": "kind_mismatch", "kind": "outillage" }),
            ),
            (Denial::NotOwner, serde_json::json!({ "denial": "not_owner" })),
            (Denial::NotProjectMember, serde_json::json!({ "denial": "not_project_member" })),
        ];

        for (denial, expected) in cases {
            let encoded = serde_json::to_value(&denial).expect("serialize denial");
            assert_eq!(encoded, expected);
            let decoded: Denial = serde_json::from_value(encoded).expect("deserialize denial");
            assert_eq!(decoded, denial);
        }
    }
}
