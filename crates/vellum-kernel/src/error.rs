//! Broker error types.

use std::io;

use thiserror::Error;
use vellum_types::{Capability, PathError, ProjectId, ProjectState, UserId};

use crate::lock::LockError;
use crate::project::ProjectError;
use crate::state::TransitionError;
use crate::store::StoreError;
use crate::tree::Conflict;

/// Broker error type.
///
/// One variant per failure kind so callers can tell them apart; use
/// [`kind`](Self::kind) for a flat discriminant.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// The caller's role lacks the capability bit on the resource.
    #[error("access denied: {capability} on {path}")]
    AccessDenied { path: String, capability: Capability },

    /// The caller may not use the project at all.
    #[error("access denied to project {project}")]
    ProjectAccessDenied { project: String },

    /// Mutation in a project that is not unlocked.
    #[error("project {project} is {state}")]
    ProjectLocked { project: String, state: ProjectState },

    /// Direct mutation of the online project.
    #[error("project {0} is online and read-only")]
    OnlineReadOnly(String),

    /// Resource is locked by another user.
    #[error("{path} is locked by {holder}")]
    ResourceLocked { path: String, holder: UserId },

    /// Strict locking: the caller must hold the lock first.
    #[error("{0} must be locked before it can be changed")]
    LockRequired(String),

    /// Resource or parent folder not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Publishing would leave `path` without its parent folder, which
    /// another project has removed meanwhile.
    #[error("{path} has no parent folder {parent}")]
    MissingParent { path: String, parent: String },

    /// Destination already exists.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Non-forced folder operation on a folder with live children.
    #[error("folder not empty: {0}")]
    NotEmpty(String),

    /// A cascading folder operation stopped at `failed`. Everything in
    /// `completed` stays applied.
    #[error("stopped at {failed} after {} completed: {cause}", .completed.len())]
    PartialFailure {
        failed: String,
        completed: Vec<String>,
        cause: Box<BrokerError>,
    },

    /// Expected a folder.
    #[error("not a folder: {0}")]
    NotAFolder(String),

    /// Expected a file.
    #[error("is a folder: {0}")]
    NotAFile(String),

    #[error("invalid path: {0}")]
    InvalidPath(#[from] PathError),

    #[error("unknown project: {0}")]
    UnknownProject(ProjectId),

    /// Request that can never succeed (e.g. moving a folder into itself).
    #[error("invalid operation: {0}")]
    Invalid(String),

    #[error("storage error: {0}")]
    Storage(#[from] StoreError),
}

/// Flat discriminant of [`BrokerError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    AccessDenied,
    ProjectLocked,
    ResourceLocked,
    NotFound,
    AlreadyExists,
    NotEmpty,
    PartialFailure,
    InvalidPath,
    Invalid,
    Storage,
}

impl BrokerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::AccessDenied { .. } | Self::ProjectAccessDenied { .. } => ErrorKind::AccessDenied,
            Self::ProjectLocked { .. } | Self::OnlineReadOnly(_) => ErrorKind::ProjectLocked,
            Self::ResourceLocked { .. } | Self::LockRequired(_) => ErrorKind::ResourceLocked,
            Self::NotFound(_) | Self::MissingParent { .. } | Self::UnknownProject(_) => {
                ErrorKind::NotFound
            }
            Self::AlreadyExists(_) => ErrorKind::AlreadyExists,
            Self::NotEmpty(_) => ErrorKind::NotEmpty,
            Self::PartialFailure { .. } => ErrorKind::PartialFailure,
            Self::InvalidPath(_) => ErrorKind::InvalidPath,
            Self::NotAFolder(_) | Self::NotAFile(_) | Self::Invalid(_) => ErrorKind::Invalid,
            Self::Storage(_) => ErrorKind::Storage,
        }
    }

    /// Create a NotFound error.
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound(path.into())
    }

    /// Create an AlreadyExists error.
    pub fn already_exists(path: impl Into<String>) -> Self {
        Self::AlreadyExists(path.into())
    }

    /// Create an AccessDenied error.
    pub fn access_denied(path: impl Into<String>, capability: Capability) -> Self {
        Self::AccessDenied { path: path.into(), capability }
    }

    /// Create a NotAFolder error.
    pub fn not_a_folder(path: impl Into<String>) -> Self {
        Self::NotAFolder(path.into())
    }

    /// Create a NotAFile error.
    pub fn not_a_file(path: impl Into<String>) -> Self {
        Self::NotAFile(path.into())
    }

    /// Create a NotEmpty error.
    pub fn not_empty(path: impl Into<String>) -> Self {
        Self::NotEmpty(path.into())
    }

    /// Create an Invalid error.
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::Invalid(msg.into())
    }

    /// The innermost cause, looking through `PartialFailure`.
    pub fn root_cause(&self) -> &BrokerError {
        match self {
            Self::PartialFailure { cause, .. } => cause.root_cause(),
            other => other,
        }
    }
}

impl From<LockError> for BrokerError {
    fn from(e: LockError) -> Self {
        match e {
            LockError::AlreadyLocked { resource, holder } => Self::ResourceLocked {
                path: resource.to_string(),
                holder,
            },
        }
    }
}

impl From<ProjectError> for BrokerError {
    fn from(e: ProjectError) -> Self {
        match e {
            ProjectError::Unknown(id) => Self::UnknownProject(id),
            ProjectError::DuplicateName(name) => Self::AlreadyExists(name),
            ProjectError::Online(name) => Self::OnlineReadOnly(name),
            ProjectError::Archived(name) => Self::ProjectLocked {
                project: name,
                state: ProjectState::Archive,
            },
        }
    }
}

/// Converts a state-table rejection for `path`.
pub(crate) fn transition_error(path: &str, e: TransitionError) -> BrokerError {
    match e {
        TransitionError::NotFound => BrokerError::not_found(path),
        TransitionError::AlreadyExists => BrokerError::already_exists(path),
    }
}

/// Converts a publish conflict between an overlay and the baseline.
pub(crate) fn conflict_error(e: Conflict) -> BrokerError {
    match e {
        Conflict::MissingParent { path, parent } => BrokerError::MissingParent { path, parent },
        Conflict::NotEmpty { folder, .. } => BrokerError::NotEmpty(folder),
    }
}

/// Convert BrokerError to std::io::Error for callers that speak io.
impl From<BrokerError> for io::Error {
    fn from(e: BrokerError) -> Self {
        let kind = match e.kind() {
            ErrorKind::AccessDenied | ErrorKind::ProjectLocked | ErrorKind::ResourceLocked => {
                io::ErrorKind::PermissionDenied
            }
            ErrorKind::NotFound => io::ErrorKind::NotFound,
            ErrorKind::AlreadyExists => io::ErrorKind::AlreadyExists,
            ErrorKind::NotEmpty => io::ErrorKind::DirectoryNotEmpty,
            ErrorKind::InvalidPath | ErrorKind::Invalid => io::ErrorKind::InvalidInput,
            ErrorKind::PartialFailure | ErrorKind::Storage => io::ErrorKind::Other,
        };
        io::Error::new(kind, e.to_string())
    }
}

/// Broker result type.
pub type BrokerResult<T> = Result<T, BrokerError>;
