//! In-memory snapshot backend.
//!
//! Thread-safe and process-local. Used for embedded setups and tests, and as
//! the reference implementation of [`SnapshotBackend`].

use std::collections::BTreeMap;
use std::sync::RwLock;

use crate::storage::traits::{SnapshotBackend, StorageError};

fn lock_err(context: &'static str) -> StorageError {
    StorageError::Backend(format!("poisoned lock: {context}"))
}

/// Buckets held in a map behind a lock.
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    buckets: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl InMemoryBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of the buckets written so far.
    pub fn bucket_names(&self) -> Result<Vec<String>, StorageError> {
        let buckets = self.buckets.read().map_err(|_| lock_err("memory.bucket_names"))?;
        Ok(buckets.keys().cloned().collect())
    }
}

impl SnapshotBackend for InMemoryBackend {
    fn put_bucket(&self, name: &str, bytes: &[u8]) -> Result<(), StorageError> {
        let mut buckets = self.buckets.write().map_err(|_| lock_err("memory.put_bucket"))?;
        buckets.insert(name.to_string(), bytes.to_vec());
        Ok(())
    }

    fn get_bucket(&self, name: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let buckets = self.buckets.read().map_err(|_| lock_err("memory.get_bucket"))?;
        Ok(buckets.get(name).cloned())
    }
}
