//! Shared enumerations: resource types, project and resource states.
//!
//! Every component imports its vocabulary from here. Nothing in this module
//! has behaviour beyond parsing, formatting and simple predicates.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum::EnumString;

/// What a resource is.
///
/// The first six variants carry the historical numeric type ids 0..=5.
/// Callers can register additional types as `Custom(id)` with `id >= 6`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    Folder,
    PlainText,
    Binary,
    /// Structured XML content.
    XmlBase,
    XmlTemplate,
    DocLoader,
    /// Caller-defined type.
    Custom(u32),
}

/// First numeric id available to `ResourceType::Custom`.
pub const FIRST_CUSTOM_TYPE_ID: u32 = 6;

impl ResourceType {
    /// Numeric type id.
    pub fn type_id(&self) -> u32 {
        match self {
            ResourceType::Folder => 0,
            ResourceType::PlainText => 1,
            ResourceType::Binary => 2,
            ResourceType::XmlBase => 3,
            ResourceType::XmlTemplate => 4,
            ResourceType::DocLoader => 5,
            ResourceType::Custom(id) => *id,
        }
    }

    /// Inverse of [`type_id`](Self::type_id).
    pub fn from_type_id(id: u32) -> Self {
        match id {
            0 => ResourceType::Folder,
            1 => ResourceType::PlainText,
            2 => ResourceType::Binary,
            3 => ResourceType::XmlBase,
            4 => ResourceType::XmlTemplate,
            5 => ResourceType::DocLoader,
            other => ResourceType::Custom(other),
        }
    }

    /// Returns true for the folder type.
    pub fn is_folder(&self) -> bool {
        matches!(self, ResourceType::Folder)
    }

    /// Convert to string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Folder => "folder",
            ResourceType::PlainText => "plain_text",
            ResourceType::Binary => "binary",
            ResourceType::XmlBase => "xml_base",
            ResourceType::XmlTemplate => "xml_template",
            ResourceType::DocLoader => "doc_loader",
            ResourceType::Custom(_) => "custom",
        }
    }
}

impl std::fmt::Display for ResourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceType::Custom(id) => write!(f, "custom:{id}"),
            other => f.write_str(other.as_str()),
        }
    }
}

/// Error returned when a resource type name cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown resource type: {0}")]
pub struct UnknownResourceType(pub String);

impl FromStr for ResourceType {
    type Err = UnknownResourceType;

    /// Accepts the snake-case names, `custom:<id>`, or a bare numeric id.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        let parsed = match lower.as_str() {
            "folder" => Some(ResourceType::Folder),
            "plain_text" | "plaintext" | "text" => Some(ResourceType::PlainText),
            "binary" => Some(ResourceType::Binary),
            "xml_base" | "xmlbase" => Some(ResourceType::XmlBase),
            "xml_template" | "xmltemplate" => Some(ResourceType::XmlTemplate),
            "doc_loader" | "docloader" => Some(ResourceType::DocLoader),
            other => other
                .strip_prefix("custom:")
                .unwrap_or(other)
                .parse::<u32>()
                .ok()
                .map(ResourceType::from_type_id),
        };
        parsed.ok_or_else(|| UnknownResourceType(s.to_string()))
    }
}

/// Run state of a project.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(ascii_case_insensitive)]
pub enum ProjectState {
    /// Resources may be changed.
    #[default]
    Unlocked,
    /// Resources cannot be changed; may return to `Unlocked`.
    Locked,
    /// Resources cannot be changed, and the project never leaves this state.
    #[strum(serialize = "archive", serialize = "archived")]
    Archive,
}

impl ProjectState {
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        <Self as FromStr>::from_str(s).ok()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectState::Unlocked => "unlocked",
            ProjectState::Locked => "locked",
            ProjectState::Archive => "archive",
        }
    }

    /// True if resources in this project may be mutated.
    pub fn is_mutable(&self) -> bool {
        matches!(self, ProjectState::Unlocked)
    }

    /// True if no transition out of this state exists.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProjectState::Archive)
    }

    /// Whether `self -> next` is a legal run-state change.
    pub fn can_transition_to(&self, next: ProjectState) -> bool {
        !self.is_terminal() || next == *self
    }
}

impl std::fmt::Display for ProjectState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Online baseline vs offline working copy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(ascii_case_insensitive)]
pub enum ProjectKind {
    Online,
    Offline,
}

impl ProjectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectKind::Online => "online",
            ProjectKind::Offline => "offline",
        }
    }
}

impl std::fmt::Display for ProjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Divergence of a resource from the online baseline, per project.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(ascii_case_insensitive)]
pub enum ResourceState {
    #[default]
    Unchanged,
    Changed,
    New,
    /// Tombstone: kept until publish so the deletion reaches the baseline.
    Deleted,
}

impl ResourceState {
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        <Self as FromStr>::from_str(s).ok()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceState::Unchanged => "unchanged",
            ResourceState::Changed => "changed",
            ResourceState::New => "new",
            ResourceState::Deleted => "deleted",
        }
    }

    /// Historical numeric state code.
    pub fn code(&self) -> u8 {
        match self {
            ResourceState::Unchanged => 0,
            ResourceState::Changed => 1,
            ResourceState::New => 2,
            ResourceState::Deleted => 3,
        }
    }

    /// Anything but a tombstone.
    pub fn is_live(&self) -> bool {
        !matches!(self, ResourceState::Deleted)
    }

    /// True if publishing this project would touch the baseline for this resource.
    pub fn is_pending(&self) -> bool {
        !matches!(self, ResourceState::Unchanged)
    }
}

impl std::fmt::Display for ResourceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
