use std::sync::Arc;

use cpk_crypto::ContentHasher;
use cpk_types::ObjectId;

use crate::error::StoreResult;

/// Digest under which `data` is stored.
pub fn digest(data: &[u8]) -> ObjectId {
    ContentHasher::STORE.hash(data)
}

/// Content-addressed blob store.
///
/// Implementations must satisfy:
/// - `put` returns [`digest`] of the bytes and is idempotent.
/// - `get` returns exactly the bytes that were put, or `NotFound`.
/// - Blobs are never updated or removed.
pub trait ObjectStore: Send + Sync {
    /// Store `data` and return its digest.
    fn put(&self, data: &[u8]) -> StoreResult<ObjectId>;

    /// Fetch the blob stored under `id`.
    fn get(&self, id: &ObjectId) -> StoreResult<Vec<u8>>;

    fn contains(&self, id: &ObjectId) -> StoreResult<bool>;
}

impl<S: ObjectStore + ?Sized> ObjectStore for Arc<S> {
    fn put(&self, data: &[u8]) -> StoreResult<ObjectId> {
        (**self).put(data)
    }

    fn get(&self, id: &ObjectId) -> StoreResult<Vec<u8>> {
        (**self).get(id)
    }

    fn contains(&self, id: &ObjectId) -> StoreResult<bool> {
        (**self).contains(id)
    }
}
