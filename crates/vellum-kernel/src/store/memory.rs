//! In-memory content store.

use dashmap::DashMap;
use vellum_types::ContentId;

use super::{ContentStore, StoreError, StoreResult};

/// Content held in a concurrent map. Lost on drop.
#[derive(Debug, Default)]
pub struct MemoryStore {
    blobs: DashMap<ContentId, Vec<u8>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored payloads.
    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }
}

impl ContentStore for MemoryStore {
    fn get_bytes(&self, id: ContentId) -> StoreResult<Vec<u8>> {
        self.blobs
            .get(&id)
            .map(|b| b.value().clone())
            .ok_or(StoreError::Missing(id))
    }

    fn put_bytes(&self, id: ContentId, bytes: &[u8]) -> StoreResult<()> {
        self.blobs.insert(id, bytes.to_vec());
        Ok(())
    }

    fn discard(&self, id: ContentId) -> StoreResult<()> {
        self.blobs.remove(&id);
        Ok(())
    }

    fn contains(&self, id: ContentId) -> StoreResult<bool> {
        Ok(self.blobs.contains_key(&id))
    }
}
