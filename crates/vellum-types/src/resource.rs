//! Resource records returned by the broker.
//!
//! These are snapshots: mutating a `Resource` value changes nothing in the
//! broker. `state` and `locked_by` describe the resource as seen from the
//! project it was read in.

use serde::{Deserialize, Serialize};

use crate::access::AccessFlags;
use crate::ids::{ContentId, GroupId, ResourceId, UserId};
use crate::kinds::{ResourceState, ResourceType};
use crate::path;

/// Payload reference of a file.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileContent {
    /// Key handed to the content store.
    pub content_id: ContentId,
    /// Length of the payload in bytes.
    pub length: u64,
}

/// Shared header of files and folders.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    /// Stable across renames and moves.
    pub id: ResourceId,
    /// Full virtual path.
    pub path: String,
    pub kind: ResourceType,
    pub owner: UserId,
    pub group: GroupId,
    pub flags: AccessFlags,
    pub state: ResourceState,
    pub locked_by: Option<UserId>,
    /// `None` for folders.
    pub content: Option<FileContent>,
    /// Unix millis.
    pub created_at: u64,
    /// Unix millis.
    pub modified_at: u64,
    pub modified_by: UserId,
}

impl Resource {
    pub fn is_folder(&self) -> bool {
        self.kind.is_folder()
    }

    pub fn is_file(&self) -> bool {
        !self.is_folder()
    }

    /// Last path component.
    pub fn name(&self) -> &str {
        path::name(&self.path)
    }

    /// Path of the containing folder; `None` for the root.
    pub fn parent_path(&self) -> Option<&str> {
        path::parent(&self.path)
    }

    /// Payload length; zero for folders.
    pub fn length(&self) -> u64 {
        self.content.map(|c| c.length).unwrap_or(0)
    }

    pub fn is_locked(&self) -> bool {
        self.locked_by.is_some()
    }
}

/// A file header plus its bytes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct File {
    pub resource: Resource,
    pub bytes: Vec<u8>,
}

impl File {
    pub fn path(&self) -> &str {
        &self.resource.path
    }
}

/// Header fields a caller may rewrite without touching content.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderUpdate {
    /// New resource type (must stay a file type for files).
    pub kind: Option<ResourceType>,
    /// New access mask.
    pub flags: Option<AccessFlags>,
}

impl HeaderUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_kind(mut self, kind: ResourceType) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn with_flags(mut self, flags: AccessFlags) -> Self {
        self.flags = Some(flags);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.kind.is_none() && self.flags.is_none()
    }
}
