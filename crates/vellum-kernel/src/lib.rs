//! # vellum-kernel
//!
//! The resource broker: a versioned virtual file system shared by many
//! users and split into projects.
//!
//! - One **online** project holds the published baseline. It is read-only
//!   for direct writes.
//! - Any number of **offline** projects hold working copies. Changes there
//!   stay invisible online until the project is published.
//! - Every resource carries an owner, a group and an access mask; a
//!   process-wide **lock table** lets one user claim a resource.
//! - Folder operations can cascade over a subtree on a best-effort basis.
//!
//! Bytes live behind [`ContentStore`]; users and groups behind
//! [`Directory`]. Both are supplied by the embedding application.

pub mod broker;
pub mod config;
pub mod directory;
pub mod error;
pub mod lock;
pub mod project;
pub mod state;
pub mod store;
mod tree;

pub use broker::{Broker, CreateOptions, PublishReport};
pub use config::{BrokerConfig, ConfigError, LockingMode};
pub use directory::{Directory, StaticDirectory};
pub use error::{BrokerError, BrokerResult, ErrorKind};
pub use lock::{Lock, LockError, LockOutcome, LockTable};
pub use project::{Project, ProjectError, ProjectRegistry};
pub use state::{StateEvent, TransitionError, transition};
pub use store::{ContentStore, MemoryStore, SqliteStore, StoreError, StoreResult};
