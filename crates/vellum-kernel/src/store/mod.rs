//! Content storage collaborator.
//!
//! The broker treats file content as opaque bytes keyed by [`ContentId`].
//! Content is written once per id: every write in the broker allocates a
//! fresh id, so a store never has to handle in-place updates of live data.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use thiserror::Error;
use vellum_types::ContentId;

/// Storage error type.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No bytes stored under this id.
    #[error("content not found: {0}")]
    Missing(ContentId),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

/// Storage result type.
pub type StoreResult<T> = Result<T, StoreError>;

/// Byte storage used by the broker.
pub trait ContentStore: Send + Sync {
    /// Bytes stored under `id`.
    fn get_bytes(&self, id: ContentId) -> StoreResult<Vec<u8>>;

    /// Store `bytes` under `id`, replacing anything already there.
    fn put_bytes(&self, id: ContentId, bytes: &[u8]) -> StoreResult<()>;

    /// Forget the bytes of a version nothing references anymore.
    fn discard(&self, id: ContentId) -> StoreResult<()> {
        let _ = id;
        Ok(())
    }

    /// Whether bytes are stored under `id`.
    fn contains(&self, id: ContentId) -> StoreResult<bool> {
        match self.get_bytes(id) {
            Ok(_) => Ok(true),
            Err(StoreError::Missing(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }
}
