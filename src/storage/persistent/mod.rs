//! Durable snapshot storage on the local filesystem.
//!
//! ```text
//! <dir>/
//!   .lock               exclusive lock (flock / LockFileEx)
//!   organisms.bucket    [version][len][json][crc32]
//!   cohorts.bucket
//!   ...
//! ```
//!
//! Each bucket file is replaced atomically. A save that dies part way through
//! leaves some buckets old and some new; loading such a directory still works
//! and the migration run on import repairs any references that no longer line
//! up.

mod codec;
mod file_lock;
mod files;

pub use files::FileBackend;

use std::path::Path;

use crate::error::ColonyError;

/// Configuration for [`FileBackend`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistentConfig {
    /// Whether to fsync each bucket before it replaces the previous version.
    pub sync_on_write: bool,
    /// Largest bucket payload written or read, in bytes.
    pub max_bucket_bytes: usize,
}

impl Default for PersistentConfig {
    fn default() -> Self {
        Self {
            sync_on_write: true,
            max_bucket_bytes: codec::DEFAULT_MAX_PAYLOAD,
        }
    }
}

impl PersistentConfig {
    /// Checks that `max_bucket_bytes` is non-zero and fits the 32-bit
    /// length prefix of a bucket frame.
    pub fn validate(self) -> Result<Self, ColonyError> {
        if self.max_bucket_bytes == 0 || u32::try_from(self.max_bucket_bytes).is_err() {
            return Err(ColonyError::Config {
                message: format!(
                    "max_bucket_bytes must be between 1 and {} (got {})",
                    u32::MAX,
                    self.max_bucket_bytes
                ),
            });
        }
        Ok(self)
    }
}

/// Opens or creates a snapshot directory at `path`.
///
/// # Errors
/// - the directory cannot be created or read
/// - another backend holds the directory lock
///
/// # Example
/// ```rust,ignore
/// use colonycore::storage::persistent::open_backend;
///
/// let backend = open_backend("./colony.d", None)?;
/// store.save_to(&backend)?;
/// ```
pub fn open_backend(
    path: impl AsRef<Path>,
    config: Option<PersistentConfig>,
) -> Result<FileBackend, ColonyError> {
    let config = config.unwrap_or_default().validate()?;
    Ok(FileBackend::open(path.as_ref(), config)?)
}
