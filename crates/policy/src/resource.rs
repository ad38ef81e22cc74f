use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Closed catalogue of protected resource kinds.
///
/// Each kind declares the actions that are meaningful for it. The policy
/// matrix is validated against these sets at construction time, so a rule
/// for an undeclared action never survives to evaluation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Posts,
    Comments,
    Notifications,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 3] = [
        ResourceKind::Posts,
        ResourceKind::Comments,
        ResourceKind::Notifications,
    ];

    /// The closed action set for this kind. Notifications are
    /// system-generated, so `create` is not meaningful for them.
    pub fn actions(self) -> &'static [Action] {
        match self {
            ResourceKind::Posts | ResourceKind::Comments => &[
                Action::Create,
                Action::Read,
                Action::Update,
                Action::Delete,
                Action::Report,
            ],
            ResourceKind::Notifications => &[Action::Read, Action::Update, Action::Delete],
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::Posts => "posts",
            ResourceKind::Comments => "comments",
            ResourceKind::Notifications => "notifications",
        }
    }
}

/// Operation names meaningful within a resource kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Create,
    Read,
    Update,
    Delete,
    Report,
}

impl Action {
    pub const ALL: [Action; 5] = [
        Action::Create,
        Action::Read,
        Action::Update,
        Action::Delete,
        Action::Report,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Action::Create => "create",
            Action::Read => "read",
            Action::Update => "update",
            Action::Delete => "delete",
            Action::Report => "report",
        }
    }
}

/// Nested relation form of an owning subject, as produced by joined queries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerRef {
    pub id: Uuid,
}

/// Narrow ownership view of a loaded resource record.
///
/// Depending on which query produced the record, the owning subject arrives
/// either as a nested relation (`author: { id }`) or as a flat foreign key
/// (`authorId`); notifications use the addressed-to pair (`user` /
/// `userId`). Only the resolver functions in [`crate::ownership`] may read
/// these fields — everything else goes through them.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResourceInstance {
    pub author: Option<OwnerRef>,
    pub author_id: Option<Uuid>,
    pub user: Option<OwnerRef>,
    pub user_id: Option<Uuid>,
}

impl ResourceInstance {
    /// Instance authored by `id`, flat foreign-key form.
    pub fn authored_by(id: Uuid) -> Self {
        Self {
            author_id: Some(id),
            ..Self::default()
        }
    }

    /// Instance authored by `id`, nested relation form.
    pub fn with_author(id: Uuid) -> Self {
        Self {
            author: Some(OwnerRef { id }),
            ..Self::default()
        }
    }

    /// Notification-style instance addressed to `id`, flat form.
    pub fn addressed_to(id: Uuid) -> Self {
        Self {
            user_id: Some(id),
            ..Self::default()
        }
    }

    /// Notification-style instance addressed to `id`, nested form.
    pub fn with_user(id: Uuid) -> Self {
        Self {
            user: Some(OwnerRef { id }),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_kind_declares_at_least_one_action() {
        for kind in ResourceKind::ALL {
            assert!(!kind.actions().is_empty(), "{} has no actions", kind.as_str());
        }
    }

    #[test]
    fn notifications_have_no_create() {
        assert!(!ResourceKind::Notifications.actions().contains(&Action::Create));
    }

    #[test]
    fn instance_accepts_both_wire_shapes() {
        let id = Uuid::new_v4();
        let nested: ResourceInstance =
            serde_json::from_value(serde_json::json!({ "author": { "id": id } })).unwrap();
        assert_eq!(nested.author, Some(OwnerRef { id }));
        assert_eq!(nested.author_id, None);

        let flat: ResourceInstance =
            serde_json::from_value(serde_json::json!({ "authorId": id })).unwrap();
        assert_eq!(flat.author_id, Some(id));
        assert_eq!(flat.author, None);
    }
}
