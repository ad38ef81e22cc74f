use std::collections::HashMap;

use once_cell::sync::Lazy;
use thiserror::Error;

use crate::ownership::{is_owner, is_receiver, not_author};
use crate::resource::{Action, ResourceInstance, ResourceKind};
use crate::subject::{Role, Subject};

/// Decision predicate over the concrete resource instance.
pub type Predicate = fn(&Subject, &ResourceInstance) -> bool;

/// The rule for one (role, resource kind, action) triple. Deny is implicit:
/// a triple with no cell is denied, so the variant set stays two-valued.
#[derive(Clone, Copy, Debug)]
pub enum PolicyCell {
    /// Always permitted, no instance needed.
    Allow,
    /// Deferred to runtime inspection of the instance.
    Predicate(Predicate),
}

/// One row of the declarative rule table.
#[derive(Clone, Copy, Debug)]
pub struct PolicyRule {
    pub role: Role,
    pub kind: ResourceKind,
    pub action: Action,
    pub cell: PolicyCell,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PolicyConfigurationError {
    #[error("action {action} is not declared for resource kind {kind}")]
    UndeclaredAction {
        kind: &'static str,
        action: &'static str,
    },
    #[error("duplicate rule for {role} / {kind} / {action}")]
    DuplicateRule {
        role: &'static str,
        kind: &'static str,
        action: &'static str,
    },
    #[error("role {role} declares no rules for resource kind {kind}")]
    MissingRow {
        role: &'static str,
        kind: &'static str,
    },
}

/// Immutable decision table, built once at startup and shared read-only by
/// every request. Construction validates the rule set; a matrix that loads
/// is internally consistent.
#[derive(Debug)]
pub struct PolicyMatrix {
    cells: HashMap<(Role, ResourceKind, Action), PolicyCell>,
}

impl PolicyMatrix {
    /// Build the matrix from the built-in rule table.
    pub fn new() -> Result<Self, PolicyConfigurationError> {
        Self::from_rules(default_rules())
    }

    /// Build a matrix from an explicit rule set.
    ///
    /// Rejects rules whose action is not declared for their resource kind,
    /// duplicate triples, and roles that leave a whole resource kind
    /// undeclared. Failure here is fatal configuration breakage; callers
    /// must not serve traffic with it.
    pub fn from_rules(
        rules: impl IntoIterator<Item = PolicyRule>,
    ) -> Result<Self, PolicyConfigurationError> {
        let mut cells = HashMap::new();
        for rule in rules {
            if !rule.kind.actions().contains(&rule.action) {
                return Err(PolicyConfigurationError::UndeclaredAction {
                    kind: rule.kind.as_str(),
                    action: rule.action.as_str(),
                });
            }
            if cells
                .insert((rule.role, rule.kind, rule.action), rule.cell)
                .is_some()
            {
                return Err(PolicyConfigurationError::DuplicateRule {
                    role: rule.role.as_str(),
                    kind: rule.kind.as_str(),
                    action: rule.action.as_str(),
                });
            }
        }
        for role in Role::ALL {
            for kind in ResourceKind::ALL {
                let has_row = kind
                    .actions()
                    .iter()
                    .any(|action| cells.contains_key(&(role, kind, *action)));
                if !has_row {
                    return Err(PolicyConfigurationError::MissingRow {
                        role: role.as_str(),
                        kind: kind.as_str(),
                    });
                }
            }
        }
        Ok(Self { cells })
    }

    /// The built-in matrix. The rule table is static data validated by
    /// construction, so a failure here is a programming error caught by the
    /// crate's own tests long before a release.
    pub fn shared() -> &'static PolicyMatrix {
        static MATRIX: Lazy<PolicyMatrix> =
            Lazy::new(|| PolicyMatrix::new().expect("built-in policy rules are valid"));
        &MATRIX
    }

    pub(crate) fn cell(&self, role: Role, kind: ResourceKind, action: Action) -> Option<PolicyCell> {
        self.cells.get(&(role, kind, action)).copied()
    }
}

/// The built-in rule table, role-major.
///
/// The recurring pattern: `create`/`read` are open to every role; `update`
/// is unconditional only for ADMIN and ownership-gated for everyone else,
/// MODERATOR included; `delete` is unconditional for ADMIN and MODERATOR
/// and ownership-gated for STUDENT and GUEST. Moderators curate by removal,
/// not by rewriting others' content, hence the update/delete asymmetry.
/// `report` is a self-reporting guard for every role. Notifications are
/// private per-subject: every role, ADMIN included, only touches its own.
pub fn default_rules() -> Vec<PolicyRule> {
    let mut rules = Vec::new();
    for role in Role::ALL {
        for kind in [ResourceKind::Posts, ResourceKind::Comments] {
            rules.push(rule(role, kind, Action::Create, PolicyCell::Allow));
            rules.push(rule(role, kind, Action::Read, PolicyCell::Allow));
            rules.push(rule(
                role,
                kind,
                Action::Update,
                match role {
                    Role::Admin => PolicyCell::Allow,
                    _ => PolicyCell::Predicate(is_owner),
                },
            ));
            rules.push(rule(
                role,
                kind,
                Action::Delete,
                match role {
                    Role::Admin | Role::Moderator => PolicyCell::Allow,
                    _ => PolicyCell::Predicate(is_owner),
                },
            ));
            rules.push(rule(role, kind, Action::Report, PolicyCell::Predicate(not_author)));
        }
        for action in [Action::Read, Action::Update, Action::Delete] {
            rules.push(rule(
                role,
                ResourceKind::Notifications,
                action,
                PolicyCell::Predicate(is_receiver),
            ));
        }
    }
    rules
}

fn rule(role: Role, kind: ResourceKind, action: Action, cell: PolicyCell) -> PolicyRule {
    PolicyRule {
        role,
        kind,
        action,
        cell,
    }
}
