//! The snapshot persistence contract.
//!
//! A backend stores opaque byte buckets by name. The store writes one JSON
//! bucket per entity kind; backends never look inside them.

use thiserror::Error;
use tracing::debug;

use crate::snapshot::Snapshot;

/// Errors raised while saving or loading snapshots.
#[derive(Debug, Error)]
pub enum StorageError {
    /// A stored bucket could not be decoded into its collection.
    #[error("bucket {bucket:?} failed to decode: {message}")]
    BucketDecode { bucket: String, message: String },

    /// A collection could not be encoded into a bucket.
    #[error("bucket {bucket:?} failed to encode: {message}")]
    BucketEncode { bucket: String, message: String },

    /// Backend-specific failure (poisoned lock, held directory lock, ...).
    #[error("storage backend error: {0}")]
    Backend(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Byte-bucket storage for snapshots.
///
/// Implementations must be safe to share across threads. Saving writes every
/// bucket in turn; a failure part way through can leave a mix of old and new
/// buckets, which the migration pass on load repairs.
pub trait SnapshotBackend: Send + Sync {
    /// Stores `bytes` under `name`, replacing any previous contents.
    fn put_bucket(&self, name: &str, bytes: &[u8]) -> Result<(), StorageError>;

    /// Returns the bytes stored under `name`, or `None` if it was never written.
    fn get_bucket(&self, name: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Writes every collection of `snapshot` as its own bucket.
    fn save(&self, snapshot: &Snapshot) -> Result<(), StorageError> {
        for (name, bytes) in snapshot.to_buckets()? {
            debug!(target: "colonycore::storage", bucket = name, bytes = bytes.len(), "writing bucket");
            self.put_bucket(name, &bytes)?;
        }
        Ok(())
    }

    /// Reads every bucket back into a snapshot. Missing buckets load empty.
    fn load(&self) -> Result<Snapshot, StorageError> {
        Snapshot::from_buckets(|name| self.get_bucket(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_trait_is_object_safe() {
        fn accepts(_: &dyn SnapshotBackend) {}
        let backend = crate::storage::InMemoryBackend::new();
        accepts(&backend);
    }

    #[test]
    fn decode_error_names_bucket() {
        let err = StorageError::BucketDecode {
            bucket: "housing".to_string(),
            message: "expected value".to_string(),
        };
        assert_eq!(err.to_string(), "bucket \"housing\" failed to decode: expected value");
    }
}
