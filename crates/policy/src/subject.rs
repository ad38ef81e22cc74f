use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The authenticated actor attempting an action.
///
/// Produced by the session layer; this crate trusts it and never verifies
/// tokens or loads anything from storage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    pub id: Uuid,
    pub role: Role,
}

impl Subject {
    pub fn new(id: Uuid, role: Role) -> Self {
        Self { id, role }
    }
}

/// Closed set of roles. Each role's permissions are declared independently
/// in the policy matrix; there is no implicit hierarchy between them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Admin,
    Moderator,
    Student,
    Guest,
}

impl Role {
    pub const ALL: [Role; 4] = [Role::Admin, Role::Moderator, Role::Student, Role::Guest];

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "ADMIN",
            Role::Moderator => "MODERATOR",
            Role::Student => "STUDENT",
            Role::Guest => "GUEST",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "ADMIN" => Some(Role::Admin),
            "MODERATOR" => Some(Role::Moderator),
            "STUDENT" => Some(Role::Student),
            "GUEST" => Some(Role::Guest),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_spellings_round_trip() {
        for role in Role::ALL {
            assert_eq!(Role::from_str(role.as_str()), Some(role));
        }
        assert_eq!(Role::from_str("PROFESSOR"), None);
        assert_eq!(Role::from_str("admin"), None);
    }
}
