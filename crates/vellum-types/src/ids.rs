//! Typed identifiers for users, groups, projects, resources and content.
//!
//! All ID types wrap UUIDv7 (time-ordered, globally unique) and display as
//! standard UUID text for logging. The `short()` form (first 8 hex chars) is
//! for human-facing output only, never a lookup key.
//!
//! `UserId` and `GroupId` also have deterministic sentinels via `system()`,
//! derived from UUIDv5, used for broker-owned resources such as the root
//! folder.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A user identifier (UUIDv7, or UUIDv5 for sentinels).
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(uuid::Uuid);

/// A group identifier (UUIDv7, or UUIDv5 for sentinels).
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupId(uuid::Uuid);

/// A project identifier (UUIDv7).
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectId(uuid::Uuid);

/// A resource identifier (UUIDv7). Stable across renames and moves.
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(uuid::Uuid);

/// A content identifier (UUIDv7): the key a file's bytes are stored under.
///
/// Distinct from `ResourceId`: an offline edit of a published file gets a
/// fresh `ContentId` so the online bytes stay untouched until publish.
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentId(uuid::Uuid);

// ── Shared behavior ─────────────────────────────────────────────────────────

macro_rules! impl_typed_id {
    ($T:ident, $name:literal) => {
        impl $T {
            /// Create a new time-ordered ID (UUIDv7).
            pub fn new() -> Self {
                Self(uuid::Uuid::now_v7())
            }

            /// First 8 hex characters, for human display only.
            pub fn short(&self) -> String {
                self.0.as_simple().to_string()[..8].to_string()
            }

            /// The raw 16 bytes.
            pub fn as_bytes(&self) -> &[u8; 16] {
                self.0.as_bytes()
            }

            /// Reconstruct from 16 bytes.
            pub fn from_bytes(b: [u8; 16]) -> Self {
                Self(uuid::Uuid::from_bytes(b))
            }

            /// Parse hyphenated or simple UUID text.
            pub fn parse(s: &str) -> Result<Self, uuid::Error> {
                uuid::Uuid::parse_str(s).map(Self)
            }

        }

        impl Default for $T {
            fn default() -> Self {
                Self::new()
            }
        }

        impl From<uuid::Uuid> for $T {
            fn from(u: uuid::Uuid) -> Self {
                Self(u)
            }
        }

        impl From<$T> for uuid::Uuid {
            fn from(id: $T) -> uuid::Uuid {
                id.0
            }
        }

        impl fmt::Display for $T {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl fmt::Debug for $T {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", $name, self.short())
            }
        }
    };
}

impl_typed_id!(UserId, "UserId");
impl_typed_id!(GroupId, "GroupId");
impl_typed_id!(ProjectId, "ProjectId");
impl_typed_id!(ResourceId, "ResourceId");
impl_typed_id!(ContentId, "ContentId");

// ── Sentinels ───────────────────────────────────────────────────────────────

/// Fixed namespace for deriving deterministic sentinel IDs via UUIDv5.
const VELLUM_PRINCIPAL_NS: uuid::Uuid = uuid::uuid!("3f0c9a52-6d1e-4b7a-9e24-8c5b1d7f0a93");

impl UserId {
    /// The well-known "system" user, owner of broker-created resources.
    ///
    /// Same value on every call (UUIDv5).
    pub fn system() -> Self {
        Self(uuid::Uuid::new_v5(&VELLUM_PRINCIPAL_NS, b"user:system"))
    }
}

impl GroupId {
    /// The well-known "system" group, group of broker-created resources.
    pub fn system() -> Self {
        Self(uuid::Uuid::new_v5(&VELLUM_PRINCIPAL_NS, b"group:system"))
    }
}

// ============================================================================
// Tests
// ============================================================================
