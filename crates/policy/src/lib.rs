//! Authorization engine for the campus board.
//!
//! The crate answers one question: may this subject perform this action on
//! this resource? Decisions come from a single declarative matrix indexed by
//! role, resource kind, and action. A cell is either an unconditional allow
//! or a predicate over the concrete resource instance (ownership checks);
//! a missing cell is a deny.
//!
//! The crate is deliberately platform-free: no I/O, no async, no storage
//! types. The server links it for the authoritative [`assert_permission`]
//! guard, and a client build links the very same crate for the advisory
//! [`can_perform`] query, so the two can never disagree on the rules.

mod engine;
mod matrix;
mod ownership;
mod resource;
mod subject;

pub use engine::{assert_permission, can_perform, PermissionDenied};
pub use matrix::{
    default_rules, PolicyCell, PolicyConfigurationError, PolicyMatrix, PolicyRule, Predicate,
};
pub use ownership::{is_owner, is_receiver, not_author, resolve_author, resolve_user};
pub use resource::{Action, OwnerRef, ResourceInstance, ResourceKind};
pub use subject::{Role, Subject};
