use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use cpk_types::ObjectId;
use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult};
use crate::traits::{digest, ObjectStore};

/// Directory-backed blob store.
///
/// Each blob lives in `<root>/<hex digest>`. Writes go to a temporary file in
/// the same directory and are renamed into place, so a reader never sees a
/// partial blob.
#[derive(Debug, Clone)]
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    /// Open (creating if needed) a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> StoreResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, id: &ObjectId) -> PathBuf {
        self.root.join(id.to_hex())
    }

    /// Every digest present in the directory, sorted. Stray files are skipped.
    pub fn ids(&self) -> StoreResult<Vec<ObjectId>> {
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if let Some(id) = entry
                .file_name()
                .to_str()
                .and_then(|name| ObjectId::from_hex(name).ok())
            {
                ids.push(id);
            }
        }
        ids.sort();
        Ok(ids)
    }
}

impl ObjectStore for FsObjectStore {
    fn put(&self, data: &[u8]) -> StoreResult<ObjectId> {
        let id = digest(data);
        let path = self.path_for(&id);
        if path.exists() {
            debug!(blob = %id.short_hex(), "blob already stored");
            return Ok(id);
        }

        let mut tmp = tempfile::NamedTempFile::new_in(&self.root)?;
        tmp.write_all(data)?;
        tmp.as_file().sync_all()?;
        if let Err(e) = tmp.persist(&path) {
            // A concurrent writer may have won the rename with the same bytes.
            if !path.exists() {
                return Err(StoreError::Io(e.error));
            }
            warn!(blob = %id.short_hex(), "lost rename race; keeping existing blob");
        }
        debug!(blob = %id.short_hex(), bytes = data.len(), "stored blob");
        Ok(id)
    }

    fn get(&self, id: &ObjectId) -> StoreResult<Vec<u8>> {
        let data = match fs::read(self.path_for(id)) {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(StoreError::NotFound(*id)),
            Err(e) => return Err(e.into()),
        };
        let computed = digest(&data);
        if computed != *id {
            return Err(StoreError::HashMismatch {
                expected: *id,
                computed,
            });
        }
        Ok(data)
    }

    fn contains(&self, id: &ObjectId) -> StoreResult<bool> {
        Ok(self.path_for(id).is_file())
    }
}
