//! Snapshot persistence.
//!
//! The store itself is purely in-memory; these backends hold snapshots between
//! runs. [`InMemoryBackend`] is always available, the file-based backend sits
//! behind the `persistent` feature.

mod memory;
mod traits;

#[cfg(feature = "persistent")]
pub mod persistent;

pub use memory::InMemoryBackend;
pub use traits::{SnapshotBackend, StorageError};
