//! Single-instance file lock.
//!
//! An exclusive, non-blocking advisory lock on a known path. Release is
//! guaranteed by the OS when the holding process's file descriptor closes —
//! on clean `Drop`, on panic unwind, and on `abort()` alike — so the
//! "guaranteed-release regardless of panic/crash path" requirement holds
//! even though this workspace builds with `panic = "abort"` in release.

use std::fs::{File, OpenOptions};
use std::path::Path;

use fs2::FileExt;

/// Holds an exclusive lock on a file for the lifetime of the value.
pub struct SingleInstanceLock {
    file: File,
}

impl SingleInstanceLock {
    /// Attempts to acquire the lock at `path` without blocking. Returns
    /// `Ok(None)` if another process already holds it.
    pub fn try_acquire(path: &Path) -> std::io::Result<Option<Self>> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)?;

        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(Self { file })),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e),
        }
    }
}

impl Drop for SingleInstanceLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn second_acquire_fails_while_first_is_held() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tracker.lock");

        let first = SingleInstanceLock::try_acquire(&path).unwrap();
        assert!(first.is_some());

        let second = SingleInstanceLock::try_acquire(&path).unwrap();
        assert!(second.is_none());
    }

    #[test]
    fn lock_is_released_on_drop() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tracker.lock");

        {
            let _first = SingleInstanceLock::try_acquire(&path).unwrap().unwrap();
        }

        let second = SingleInstanceLock::try_acquire(&path).unwrap();
        assert!(second.is_some());
    }
}
