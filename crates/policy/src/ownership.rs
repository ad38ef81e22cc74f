//! Owner extraction and the ownership predicates used by the policy matrix.
//!
//! These functions are the single translation point between the two
//! ownership encodings a record can arrive in. They never fail: a record
//! stripped of both encodings simply has no owner, which makes every
//! ownership predicate deny.

use uuid::Uuid;

use crate::resource::ResourceInstance;
use crate::subject::Subject;

/// Owning author of the instance, if any. The nested relation is the
/// freshly-joined, authoritative value and wins over the flat foreign key
/// when both are present.
pub fn resolve_author(instance: &ResourceInstance) -> Option<Uuid> {
    instance.author.map(|a| a.id).or(instance.author_id)
}

/// Addressed-to subject of the instance, if any. Same precedence rule as
/// [`resolve_author`], for the `user` / `userId` pair notifications carry.
pub fn resolve_user(instance: &ResourceInstance) -> Option<Uuid> {
    instance.user.map(|u| u.id).or(instance.user_id)
}

/// The subject authored this instance.
pub fn is_owner(subject: &Subject, instance: &ResourceInstance) -> bool {
    resolve_author(instance) == Some(subject.id)
}

/// The instance is addressed to this subject.
pub fn is_receiver(subject: &Subject, instance: &ResourceInstance) -> bool {
    resolve_user(instance) == Some(subject.id)
}

/// Self-reporting guard: anyone may report content except its own author.
/// An ownerless instance is reportable; denying there would let stripped
/// records shield their content.
pub fn not_author(subject: &Subject, instance: &ResourceInstance) -> bool {
    resolve_author(instance) != Some(subject.id)
}
