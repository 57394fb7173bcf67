//! Exclusive ownership of a snapshot directory.
//!
//! The OS lock sits on a `.lock` file inside the directory and goes away when
//! the [`DirLock`] is dropped and the file closed.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;

use crate::storage::traits::StorageError;

const LOCK_FILE: &str = ".lock";

/// Held for as long as a [`FileBackend`](super::FileBackend) owns its directory.
#[derive(Debug)]
pub struct DirLock {
    _file: File,
}

impl DirLock {
    /// Takes the directory without waiting.
    ///
    /// # Errors
    /// [`StorageError::Backend`] if another backend already holds `dir`, or
    /// the lock file cannot be opened or locked.
    pub fn acquire(dir: &Path) -> Result<Self, StorageError> {
        let path = dir.join(LOCK_FILE);
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;
        match try_lock_exclusive(&file) {
            Ok(true) => Ok(Self { _file: file }),
            Ok(false) => Err(StorageError::Backend(format!(
                "snapshot directory {} is held by another backend",
                dir.display()
            ))),
            Err(err) => Err(StorageError::Backend(format!(
                "failed to lock {}: {err}",
                path.display()
            ))),
        }
    }
}

/// `Ok(false)` when another holder has the lock.
#[cfg(unix)]
fn try_lock_exclusive(file: &File) -> io::Result<bool> {
    use std::os::unix::io::AsRawFd;

    // SAFETY: the descriptor belongs to `file`, which outlives the call.
    if unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) } == 0 {
        return Ok(true);
    }
    let err = io::Error::last_os_error();
    if err.raw_os_error() == Some(libc::EWOULDBLOCK) {
        Ok(false)
    } else {
        Err(err)
    }
}

#[cfg(windows)]
fn try_lock_exclusive(file: &File) -> io::Result<bool> {
    use std::os::windows::io::AsRawHandle;
    use windows_sys::Win32::Foundation::{ERROR_LOCK_VIOLATION, HANDLE};
    use windows_sys::Win32::Storage::FileSystem::{
        LockFileEx, LOCKFILE_EXCLUSIVE_LOCK, LOCKFILE_FAIL_IMMEDIATELY,
    };
    use windows_sys::Win32::System::IO::OVERLAPPED;

    // SAFETY: the handle belongs to `file`; a zeroed OVERLAPPED locks from offset 0.
    let locked = unsafe {
        let mut overlapped: OVERLAPPED = std::mem::zeroed();
        LockFileEx(
            file.as_raw_handle() as HANDLE,
            LOCKFILE_EXCLUSIVE_LOCK | LOCKFILE_FAIL_IMMEDIATELY,
            0,
            1,
            0,
            &mut overlapped,
        )
    };
    if locked != 0 {
        return Ok(true);
    }
    let err = io::Error::last_os_error();
    #[allow(clippy::cast_possible_wrap)]
    let contended = err.raw_os_error() == Some(ERROR_LOCK_VIOLATION as i32);
    if contended {
        Ok(false)
    } else {
        Err(err)
    }
}

#[cfg(not(any(unix, windows)))]
fn try_lock_exclusive(_file: &File) -> io::Result<bool> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "directory locking is not available on this platform",
    ))
}
