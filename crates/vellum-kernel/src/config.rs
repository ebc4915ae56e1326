//! Broker configuration.
//!
//! Loaded from TOML; every field has a default, so an empty file is a valid
//! configuration:
//!
//! ```toml
//! online_project = "Online"
//! admin_group = "Administrators"
//! admin_bypasses_lock = false
//! force_lock_requires_admin = false
//! locking = "permissive"   # or "strict"
//! default_flags = 0o457    # optional raw mask for new resources
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use strum::EnumString;
use vellum_types::AccessFlags;

/// Error type for config operations.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Whether unlocked resources may be changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(ascii_case_insensitive)]
pub enum LockingMode {
    /// Unlocked resources, or resources locked by the caller, may be changed.
    #[default]
    Permissive,
    /// The caller must hold the lock.
    Strict,
}

impl LockingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            LockingMode::Permissive => "permissive",
            LockingMode::Strict => "strict",
        }
    }
}

impl std::fmt::Display for LockingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Name of the online project.
    pub online_project: String,
    /// Members of this group are administrators.
    pub admin_group: String,
    /// Administrators may change resources locked by someone else.
    pub admin_bypasses_lock: bool,
    /// Only administrators may take a lock by force.
    pub force_lock_requires_admin: bool,
    pub locking: LockingMode,
    /// Raw mask applied to new resources when the caller gives none.
    pub default_flags: Option<u32>,
    /// Raw mask of the root folder.
    pub root_flags: Option<u32>,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            online_project: "Online".into(),
            admin_group: "Administrators".into(),
            admin_bypasses_lock: false,
            force_lock_requires_admin: false,
            locking: LockingMode::Permissive,
            default_flags: None,
            root_flags: None,
        }
    }
}

impl BrokerConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: BrokerConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path.as_ref())?;
        tracing::debug!(path = %path.as_ref().display(), "loading broker config");
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.online_project.trim().is_empty() {
            return Err(ConfigError::Invalid("online_project must not be empty".into()));
        }
        if self.admin_group.trim().is_empty() {
            return Err(ConfigError::Invalid("admin_group must not be empty".into()));
        }
        for (field, raw) in [("default_flags", self.default_flags), ("root_flags", self.root_flags)] {
            if let Some(raw) = raw.filter(|r| AccessFlags::from_bits(*r).is_none()) {
                return Err(ConfigError::Invalid(format!("{field} has unknown bits: {raw:#o}")));
            }
        }
        Ok(())
    }

    /// Mask for new resources.
    pub fn default_flags(&self) -> AccessFlags {
        self.default_flags
            .map(AccessFlags::from_bits_truncate)
            .unwrap_or(AccessFlags::DEFAULT)
    }

    /// Mask of the root folder. Everyone may read, write and see it unless
    /// configured otherwise.
    pub fn root_flags(&self) -> AccessFlags {
        self.root_flags
            .map(AccessFlags::from_bits_truncate)
            .unwrap_or(AccessFlags::READ | AccessFlags::WRITE | AccessFlags::VISIBLE)
    }
}
