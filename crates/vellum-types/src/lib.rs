//! Shared vocabulary for vellum.
//!
//! This crate is the leaf of the workspace: typed IDs, users and groups, the
//! permission codec, resource/project state enumerations, path helpers and
//! the resource records the broker hands out. It has **no internal vellum
//! dependencies**.
//!
//! # Key Types
//!
//! |-------------------|----------------------------------------------|
//! | Type              | Purpose                                      |
//! |-------------------|----------------------------------------------|
//! | [`AccessFlags`]   | Nine triad bits + internal bit               |
//! | [`Capability`]    | What a caller asks to do (read/write/...)    |
//! | [`Role`]          | Caller's relation to a resource              |
//! | [`ResourceType`]  | Folder, plain text, binary, XML, custom      |
//! | [`ProjectState`]  | Unlocked / Locked / Archive                  |
//! | [`ResourceState`] | Unchanged / Changed / New / Deleted          |
//! | [`Resource`]      | Header snapshot of a file or folder          |
//! | [`File`]          | Header plus bytes                            |
//! |-------------------|----------------------------------------------|

pub mod access;
pub mod ids;
pub mod kinds;
pub mod path;
pub mod principal;
pub mod resource;

// Re-export primary types at crate root for convenience.
pub use access::{AccessFlags, Capability, InvalidAccessMask, Triad, decode, encode, evaluate};
pub use ids::{ContentId, GroupId, ProjectId, ResourceId, UserId};
pub use kinds::{
    FIRST_CUSTOM_TYPE_ID, ProjectKind, ProjectState, ResourceState, ResourceType,
    UnknownResourceType,
};
pub use path::PathError;
pub use principal::{Group, Role, User};
pub use resource::{File, FileContent, HeaderUpdate, Resource};

/// Current time as Unix milliseconds.
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
