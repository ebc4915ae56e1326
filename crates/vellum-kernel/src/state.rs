//! Per-resource, per-project lifecycle.
//!
//! ```text
//! current     Create          Write      Delete     Publish
//! (absent)    New             NotFound   NotFound   NotFound
//! Unchanged   AlreadyExists   Changed    Deleted    Unchanged
//! Changed     AlreadyExists   Changed    Deleted    Unchanged
//! New         AlreadyExists   New        (absent)   Unchanged
//! Deleted     AlreadyExists*  NotFound   Deleted    (absent)
//! ```
//!
//! `*` with `force`, a create over a tombstone yields `Changed`: the path
//! still exists in the baseline, so publishing must overwrite it.

use thiserror::Error;
use vellum_types::ResourceState;

/// What happened to a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateEvent {
    Create,
    Write,
    Delete,
    Publish,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("resource not found")]
    NotFound,
    #[error("resource already exists")]
    AlreadyExists,
}

/// Next state of a resource, or `None` when the resource leaves the project.
pub fn transition(
    current: Option<ResourceState>,
    event: StateEvent,
    force: bool,
) -> Result<Option<ResourceState>, TransitionError> {
    use ResourceState::*;
    use StateEvent::*;

    match (current, event) {
        (None, Create) => Ok(Some(New)),
        (None, _) => Err(TransitionError::NotFound),

        (Some(Deleted), Create) if force => Ok(Some(Changed)),
        (Some(_), Create) => Err(TransitionError::AlreadyExists),

        (Some(Unchanged | Changed), Write) => Ok(Some(Changed)),
        (Some(New), Write) => Ok(Some(New)),
        (Some(Deleted), Write) => Err(TransitionError::NotFound),

        (Some(Unchanged | Changed | Deleted), Delete) => Ok(Some(Deleted)),
        (Some(New), Delete) => Ok(None),

        (Some(Deleted), Publish) => Ok(None),
        (Some(_), Publish) => Ok(Some(Unchanged)),
    }
}
