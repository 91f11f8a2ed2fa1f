//! In-memory stub implementations of the storage ports, for tests and for
//! embedders that don't need durability.

use std::collections::HashMap;

use parking_lot::Mutex;
use tidemark_batch_types::ControlRecord;

use crate::{BlobObject, BlobStore, ControlStore, DbError, DbResult, Version};

/// Blob store over a mutex-guarded map.
#[derive(Debug, Default)]
pub struct StubBlobStore {
    objects: Mutex<HashMap<String, BlobObject>>,
}

impl StubBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All stored keys, for test assertions.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<_> = self.objects.lock().keys().cloned().collect();
        keys.sort();
        keys
    }
}

impl BlobStore for StubBlobStore {
    fn put(&self, key: &str, data: &[u8], content_type: &str) -> DbResult<()> {
        let obj = BlobObject::new(data.to_vec(), content_type);
        self.objects.lock().insert(key.to_owned(), obj);
        Ok(())
    }

    fn get(&self, key: &str) -> DbResult<Option<BlobObject>> {
        Ok(self.objects.lock().get(key).cloned())
    }
}

/// Control store over a mutex-guarded slot, with real conditional-write
/// semantics so concurrency tests mean something.
#[derive(Debug, Default)]
pub struct StubControlStore {
    slot: Mutex<Option<(Version, ControlRecord)>>,
}

impl StubControlStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ControlStore for StubControlStore {
    fn get(&self) -> DbResult<Option<(Version, ControlRecord)>> {
        Ok(self.slot.lock().clone())
    }

    fn put_conditional(
        &self,
        expected: Option<Version>,
        record: &ControlRecord,
    ) -> DbResult<Version> {
        let mut slot = self.slot.lock();
        let current = slot.as_ref().map(|(v, _)| *v);
        if current != expected {
            return Err(DbError::VersionConflict);
        }
        let next = current.map(|v| v + 1).unwrap_or(0);
        *slot = Some((next, record.clone()));
        Ok(next)
    }
}
