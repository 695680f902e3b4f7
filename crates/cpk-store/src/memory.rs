use std::collections::HashMap;
use std::sync::RwLock;

use cpk_types::ObjectId;

use crate::error::{StoreError, StoreResult};
use crate::traits::{digest, ObjectStore};

/// In-memory, HashMap-based blob store.
///
/// Intended for tests and embedding. Blobs are cloned on read and write.
pub struct InMemoryObjectStore {
    blobs: RwLock<HashMap<ObjectId, Vec<u8>>>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self {
            blobs: RwLock::new(HashMap::new()),
        }
    }

    /// Number of blobs currently stored.
    pub fn len(&self) -> usize {
        self.blobs.read().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.read().expect("lock poisoned").is_empty()
    }

    /// Total bytes across all stored blobs.
    pub fn total_bytes(&self) -> u64 {
        self.blobs
            .read()
            .expect("lock poisoned")
            .values()
            .map(|b| b.len() as u64)
            .sum()
    }

    /// Sorted list of every stored digest.
    pub fn all_ids(&self) -> Vec<ObjectId> {
        let map = self.blobs.read().expect("lock poisoned");
        let mut ids: Vec<ObjectId> = map.keys().copied().collect();
        ids.sort();
        ids
    }
}

impl Default for InMemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectStore for InMemoryObjectStore {
    fn put(&self, data: &[u8]) -> StoreResult<ObjectId> {
        let id = digest(data);
        self.blobs
            .write()
            .expect("lock poisoned")
            .entry(id)
            .or_insert_with(|| data.to_vec());
        Ok(id)
    }

    fn get(&self, id: &ObjectId) -> StoreResult<Vec<u8>> {
        self.blobs
            .read()
            .expect("lock poisoned")
            .get(id)
            .cloned()
            .ok_or(StoreError::NotFound(*id))
    }

    fn contains(&self, id: &ObjectId) -> StoreResult<bool> {
        Ok(self.blobs.read().expect("lock poisoned").contains_key(id))
    }
}

impl std::fmt::Debug for InMemoryObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryObjectStore")
            .field("blob_count", &self.len())
            .finish()
    }
}
