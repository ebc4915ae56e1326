//! Users and groups.
//!
//! A `User` is anyone who calls into the broker. Resources carry one owning
//! user and one group; the caller's relationship to those two decides which
//! permission triad applies.

use serde::{Deserialize, Serialize};

use crate::ids::{GroupId, UserId};

/// An entity that can call into the broker.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Globally unique, permanent identifier (UUIDv7).
    pub id: UserId,
    /// Short login name: "amy", "editor", "system".
    pub name: String,
    /// Full display name.
    pub display_name: String,
}

impl User {
    /// Create a new user with a fresh ID.
    pub fn new(name: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: UserId::new(),
            name: name.into(),
            display_name: display_name.into(),
        }
    }

    /// The well-known system user.
    pub fn system() -> Self {
        Self {
            id: UserId::system(),
            name: "system".into(),
            display_name: "System".into(),
        }
    }
}

impl std::fmt::Display for User {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name, self.display_name)
    }
}

/// A named set of users.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    pub name: String,
}

impl Group {
    /// Create a new group with a fresh ID.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: GroupId::new(),
            name: name.into(),
        }
    }
}

/// How a caller relates to a resource, as reported by the directory.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// The caller owns the resource.
    Owner,
    /// The caller is a member of the resource's group.
    GroupMember,
    /// Everyone else.
    Other,
}
