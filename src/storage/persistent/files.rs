//! One checksummed file per bucket.

use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use uuid::Uuid;

use super::codec;
use super::file_lock::DirLock;
use super::PersistentConfig;
use crate::storage::traits::{SnapshotBackend, StorageError};

const BUCKET_EXTENSION: &str = "bucket";
const TEMP_EXTENSION: &str = "tmp";

/// Snapshot backend writing `<bucket>.bucket` files into a locked directory.
///
/// Each bucket is replaced atomically: it is written to a temporary file,
/// optionally fsynced, then renamed over the previous version.
#[derive(Debug)]
pub struct FileBackend {
    dir: PathBuf,
    config: PersistentConfig,
    _lock: DirLock,
}

fn valid_bucket_name(name: &str) -> bool {
    !name.is_empty() && name.bytes().all(|b| b.is_ascii_lowercase() || b == b'_')
}

impl FileBackend {
    /// Opens (creating if needed) the directory and takes its lock.
    ///
    /// Leftover temporary files from an interrupted save are removed.
    pub fn open(dir: &Path, config: PersistentConfig) -> Result<Self, StorageError> {
        fs::create_dir_all(dir)?;
        let lock = DirLock::acquire(dir)?;

        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == TEMP_EXTENSION) {
                if let Err(err) = fs::remove_file(&path) {
                    warn!(target: "colonycore::storage", path = %path.display(), error = %err, "failed to remove stale temp file");
                }
            }
        }

        debug!(target: "colonycore::storage", dir = %dir.display(), "file backend opened");
        Ok(Self {
            dir: dir.to_path_buf(),
            config,
            _lock: lock,
        })
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn bucket_path(&self, name: &str) -> Result<PathBuf, StorageError> {
        if !valid_bucket_name(name) {
            return Err(StorageError::Backend(format!("invalid bucket name {name:?}")));
        }
        Ok(self.dir.join(format!("{name}.{BUCKET_EXTENSION}")))
    }

    fn write_temp(&self, temp_path: &Path, framed: &[u8]) -> std::io::Result<()> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(temp_path)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(framed)?;
        writer.flush()?;
        if self.config.sync_on_write {
            writer.get_ref().sync_all()?;
        }
        Ok(())
    }
}

impl SnapshotBackend for FileBackend {
    fn put_bucket(&self, name: &str, bytes: &[u8]) -> Result<(), StorageError> {
        let final_path = self.bucket_path(name)?;
        let framed = codec::encode(bytes, self.config.max_bucket_bytes)?;
        let temp_path = final_path.with_extension(format!("{}.{TEMP_EXTENSION}", Uuid::new_v4().simple()));

        if let Err(err) = self.write_temp(&temp_path, &framed) {
            let _ = fs::remove_file(&temp_path);
            return Err(err.into());
        }
        if let Err(err) = fs::rename(&temp_path, &final_path) {
            let _ = fs::remove_file(&temp_path);
            return Err(err.into());
        }
        Ok(())
    }

    fn get_bucket(&self, name: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let path = self.bucket_path(name)?;
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let bytes = codec::decode(&mut BufReader::new(file), self.config.max_bucket_bytes).map_err(|e| {
            StorageError::BucketDecode {
                bucket: name.to_string(),
                message: e.to_string(),
            }
        })?;
        Ok(Some(bytes))
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn bucket_survives_reopen() {
        let dir = tempdir().unwrap();
        {
            let backend = FileBackend::open(dir.path(), PersistentConfig::default()).unwrap();
            backend.put_bucket("cohorts", b"{}").unwrap();
            assert!(dir.path().join("cohorts.bucket").exists());
        }
        let backend = FileBackend::open(dir.path(), PersistentConfig::default()).unwrap();
        assert_eq!(backend.get_bucket("cohorts").unwrap().as_deref(), Some(&b"{}"[..]));
        assert!(backend.get_bucket("lines").unwrap().is_none());
    }

    #[test]
    fn rejects_path_like_bucket_names() {
        let dir = tempdir().unwrap();
        let backend = FileBackend::open(dir.path(), PersistentConfig::default()).unwrap();
        assert!(backend.put_bucket("../escape", b"{}").is_err());
        assert!(backend.get_bucket("").is_err());
    }

    #[test]
    fn stale_temp_files_are_cleaned_on_open() {
        let dir = tempdir().unwrap();
        let stale = dir.path().join("organisms.abc.tmp");
        fs::write(&stale, b"partial").unwrap();
        let _backend = FileBackend::open(dir.path(), PersistentConfig::default()).unwrap();
        assert!(!stale.exists());
    }

    #[test]
    fn oversized_bucket_is_refused() {
        let dir = tempdir().unwrap();
        let config = PersistentConfig {
            max_bucket_bytes: 16,
            ..PersistentConfig::default()
        };
        let backend = FileBackend::open(dir.path(), config).unwrap();
        backend.put_bucket("lines", b"{}").unwrap();
        assert!(backend.put_bucket("lines", &[b' '; 17]).is_err());
        assert_eq!(backend.get_bucket("lines").unwrap().as_deref(), Some(&b"{}"[..]));
    }

    #[test]
    fn corrupt_file_reports_bucket() {
        let dir = tempdir().unwrap();
        let backend = FileBackend::open(dir.path(), PersistentConfig::default()).unwrap();
        backend.put_bucket("samples", b"{}").unwrap();
        let path = dir.path().join("samples.bucket");
        let mut raw = fs::read(&path).unwrap();
        raw[5] ^= 0xFF;
        fs::write(&path, raw).unwrap();

        let err = backend.get_bucket("samples").unwrap_err();
        assert!(matches!(err, StorageError::BucketDecode { ref bucket, .. } if bucket == "samples"));
    }
}
