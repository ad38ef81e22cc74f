use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

use crate::matrix::{PolicyCell, PolicyMatrix};
use crate::resource::{Action, ResourceInstance, ResourceKind};
use crate::subject::Subject;

/// Raised by the enforcement guard when a decision comes back deny.
/// Carries the triple for diagnostics; surfaced to clients as a forbidden
/// response, never swallowed or retried.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("subject {subject_id} may not {action} {kind}", action = .action.as_str(), kind = .kind.as_str())]
pub struct PermissionDenied {
    pub subject_id: Uuid,
    pub kind: ResourceKind,
    pub action: Action,
}

impl PolicyMatrix {
    /// Decide whether `subject` may perform `action` on `kind`.
    ///
    /// Pure and fail-closed: a triple with no cell is a deny. Static
    /// actions (`create`, `read` where unconditional) need no instance;
    /// instance-dependent cells with no instance supplied are a caller bug
    /// and evaluate to deny.
    pub fn evaluate(
        &self,
        subject: &Subject,
        kind: ResourceKind,
        action: Action,
        instance: Option<&ResourceInstance>,
    ) -> bool {
        match self.cell(subject.role, kind, action) {
            None => false,
            Some(PolicyCell::Allow) => true,
            Some(PolicyCell::Predicate(predicate)) => match instance {
                Some(instance) => predicate(subject, instance),
                None => {
                    warn!(
                        kind = kind.as_str(),
                        action = action.as_str(),
                        "instance-dependent rule evaluated without an instance; denying"
                    );
                    false
                }
            },
        }
    }

    /// Authoritative server-side guard. Call before any storage mutation;
    /// on deny the caller must not proceed.
    pub fn assert_permission(
        &self,
        subject: &Subject,
        kind: ResourceKind,
        action: Action,
        instance: Option<&ResourceInstance>,
    ) -> Result<(), PermissionDenied> {
        if self.evaluate(subject, kind, action, instance) {
            Ok(())
        } else {
            Err(PermissionDenied {
                subject_id: subject.id,
                kind,
                action,
            })
        }
    }

    /// Advisory capability query for deciding UI affordances. Identical
    /// lookup to [`PolicyMatrix::assert_permission`]; never a security
    /// boundary — the guard on the server remains authoritative.
    pub fn can_perform(
        &self,
        subject: &Subject,
        kind: ResourceKind,
        action: Action,
        instance: Option<&ResourceInstance>,
    ) -> bool {
        self.evaluate(subject, kind, action, instance)
    }
}

/// [`PolicyMatrix::assert_permission`] against the built-in matrix.
pub fn assert_permission(
    subject: &Subject,
    kind: ResourceKind,
    action: Action,
    instance: Option<&ResourceInstance>,
) -> Result<(), PermissionDenied> {
    PolicyMatrix::shared().assert_permission(subject, kind, action, instance)
}

/// [`PolicyMatrix::can_perform`] against the built-in matrix.
pub fn can_perform(
    subject: &Subject,
    kind: ResourceKind,
    action: Action,
    instance: Option<&ResourceInstance>,
) -> bool {
    PolicyMatrix::shared().can_perform(subject, kind, action, instance)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subject::Role;

    fn subject(role: Role) -> Subject {
        Subject::new(Uuid::new_v4(), role)
    }

    #[test]
    fn undeclared_triple_is_denied() {
        let matrix = PolicyMatrix::new().unwrap();
        for role in Role::ALL {
            assert!(!matrix.evaluate(
                &subject(role),
                ResourceKind::Notifications,
                Action::Create,
                None,
            ));
            assert!(!matrix.evaluate(
                &subject(role),
                ResourceKind::Notifications,
                Action::Report,
                Some(&ResourceInstance::addressed_to(Uuid::new_v4())),
            ));
        }
    }

    #[test]
    fn anyone_may_create_and_read_content() {
        let matrix = PolicyMatrix::new().unwrap();
        for role in Role::ALL {
            for kind in [ResourceKind::Posts, ResourceKind::Comments] {
                assert!(matrix.evaluate(&subject(role), kind, Action::Create, None));
                assert!(matrix.evaluate(&subject(role), kind, Action::Read, None));
            }
        }
    }

    #[test]
    fn admin_updates_regardless_of_authorship() {
        let matrix = PolicyMatrix::new().unwrap();
        let admin = subject(Role::Admin);
        let foreign = ResourceInstance::authored_by(Uuid::new_v4());
        assert!(matrix.evaluate(&admin, ResourceKind::Posts, Action::Update, Some(&foreign)));
    }

    #[test]
    fn moderator_deletes_anything_but_edits_only_their_own() {
        let matrix = PolicyMatrix::new().unwrap();
        let moderator = subject(Role::Moderator);
        let foreign = ResourceInstance::authored_by(Uuid::new_v4());
        let own = ResourceInstance::authored_by(moderator.id);
        for kind in [ResourceKind::Posts, ResourceKind::Comments] {
            assert!(matrix.evaluate(&moderator, kind, Action::Delete, Some(&foreign)));
            assert!(!matrix.evaluate(&moderator, kind, Action::Update, Some(&foreign)));
            assert!(matrix.evaluate(&moderator, kind, Action::Update, Some(&own)));
        }
    }

    #[test]
    fn students_and_guests_touch_only_their_own_content() {
        let matrix = PolicyMatrix::new().unwrap();
        for role in [Role::Student, Role::Guest] {
            let actor = subject(role);
            let own = ResourceInstance::authored_by(actor.id);
            let foreign = ResourceInstance::authored_by(Uuid::new_v4());
            for action in [Action::Update, Action::Delete] {
                assert!(matrix.evaluate(&actor, ResourceKind::Posts, action, Some(&own)));
                assert!(!matrix.evaluate(&actor, ResourceKind::Posts, action, Some(&foreign)));
            }
        }
    }

    #[test]
    fn self_report_is_blocked_for_every_role() {
        let matrix = PolicyMatrix::new().unwrap();
        for role in Role::ALL {
            let actor = subject(role);
            let own = ResourceInstance::authored_by(actor.id);
            let foreign = ResourceInstance::authored_by(Uuid::new_v4());
            assert!(!matrix.evaluate(&actor, ResourceKind::Posts, Action::Report, Some(&own)));
            assert!(matrix.evaluate(&actor, ResourceKind::Posts, Action::Report, Some(&foreign)));
        }
    }

    #[test]
    fn notifications_are_private_even_to_admins() {
        let matrix = PolicyMatrix::new().unwrap();
        for role in Role::ALL {
            let actor = subject(role);
            let own = ResourceInstance::addressed_to(actor.id);
            let foreign = ResourceInstance::addressed_to(Uuid::new_v4());
            for action in [Action::Read, Action::Update, Action::Delete] {
                assert!(matrix.evaluate(&actor, ResourceKind::Notifications, action, Some(&own)));
                assert!(!matrix.evaluate(
                    &actor,
                    ResourceKind::Notifications,
                    action,
                    Some(&foreign),
                ));
            }
        }
    }

    #[test]
    fn predicate_without_instance_denies() {
        let matrix = PolicyMatrix::new().unwrap();
        assert!(!matrix.evaluate(&subject(Role::Student), ResourceKind::Posts, Action::Update, None));
    }

    #[test]
    fn guard_carries_the_denied_triple() {
        let actor = subject(Role::Guest);
        let foreign = ResourceInstance::authored_by(Uuid::new_v4());
        let err = assert_permission(&actor, ResourceKind::Posts, Action::Delete, Some(&foreign))
            .unwrap_err();
        assert_eq!(err.subject_id, actor.id);
        assert_eq!(err.kind, ResourceKind::Posts);
        assert_eq!(err.action, Action::Delete);
    }

    #[test]
    fn evaluation_is_idempotent() {
        let actor = subject(Role::Student);
        let own = ResourceInstance::authored_by(actor.id);
        let first = can_perform(&actor, ResourceKind::Posts, Action::Update, Some(&own));
        let second = can_perform(&actor, ResourceKind::Posts, Action::Update, Some(&own));
        assert_eq!(first, second);
    }
}
