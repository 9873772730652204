//! # Advisory File Lock
//!
//! An exclusive advisory lock over the database file, taken with `flock(2)`
//! at open and held for the engine's lifetime. A second engine instance
//! opening the same path fails immediately with [`MonsoonError::LockBusy`]
//! instead of corrupting the log.
//!
//! `flock` locks attach to the open file description, so the lock follows
//! the descriptor through the vacuum rename: when the compacted temporary
//! is renamed over the primary path, its already-held lock becomes the lock
//! on the primary, and the replaced file's lock dies with its descriptor.

use std::fs::File;
use std::io;
use std::os::unix::io::AsRawFd;

use crate::error::{MonsoonError, Result};

/// Takes an exclusive non-blocking `flock` on `file`. The lock is released
/// when every descriptor for this open file description is closed.
pub fn acquire_exclusive(file: &File) -> Result<()> {
    let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
    if rc == 0 {
        return Ok(());
    }

    let err = io::Error::last_os_error();
    match err.raw_os_error() {
        Some(libc::EWOULDBLOCK) => Err(MonsoonError::LockBusy),
        _ => Err(MonsoonError::Io(err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::OpenOptions;
    use tempfile::tempdir;

    #[test]
    fn second_handle_observes_lock_busy() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("locked.monsoon");

        let first = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .unwrap();
        acquire_exclusive(&first).unwrap();

        let second = OpenOptions::new().read(true).write(true).open(&path).unwrap();
        match acquire_exclusive(&second) {
            Err(MonsoonError::LockBusy) => {}
            other => panic!("expected LockBusy, got {other:?}"),
        }
    }

    #[test]
    fn lock_releases_on_close() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("released.monsoon");

        let first = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .unwrap();
        acquire_exclusive(&first).unwrap();
        drop(first);

        let second = OpenOptions::new().read(true).write(true).open(&path).unwrap();
        acquire_exclusive(&second).unwrap();
    }
}
