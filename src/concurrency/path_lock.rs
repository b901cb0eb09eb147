//! Cross-process per-path lock using advisory file locking (fs2 flock).
//!
//! Backup and restore do no locking of their own. Callers that may touch the
//! same file from several processes (two CLI invocations, an editor hook and
//! a wizard) take this lock around the operation.

use anyhow::Result;
use fs2::FileExt;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

use crate::backup::digest_bytes;

/// Advisory lock keyed by a file path.
///
/// The lock file is `<lock_dir>/<sha256 of the resolved path>.lock`, so any
/// spelling of the same path maps to the same lock.
#[derive(Debug, Clone)]
pub struct PathLock {
    path: PathBuf,
}

/// RAII guard that releases the lock on drop.
pub struct PathLockGuard {
    file: File,
}

impl Drop for PathLockGuard {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

impl PathLock {
    pub fn for_path(lock_dir: &Path, target: &Path) -> Result<Self> {
        fs::create_dir_all(lock_dir)?;
        let resolved = crate::backup::resolve_lenient(target);
        let key = digest_bytes(resolved.to_string_lossy().as_bytes());
        Ok(Self {
            path: lock_dir.join(format!("{}.lock", key)),
        })
    }

    /// Lock file backing this lock.
    pub fn lock_file(&self) -> &Path {
        &self.path
    }

    /// Blocking acquire. Waits until the lock is available.
    pub fn acquire(&self) -> Result<PathLockGuard> {
        let file = File::create(&self.path)?;
        file.lock_exclusive()?;
        Ok(PathLockGuard { file })
    }

    /// Non-blocking acquire. Returns `None` if another holder has it.
    pub fn try_acquire(&self) -> Result<Option<PathLockGuard>> {
        let file = File::create(&self.path)?;
        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(PathLockGuard { file })),
            Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(None),
            #[cfg(unix)]
            Err(ref e) if e.raw_os_error() == Some(libc::EWOULDBLOCK) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Barrier};

    #[test]
    fn same_path_maps_to_same_lock_file() {
        let tmp = tempfile::tempdir().unwrap();
        let locks = tmp.path().join("locks");
        let target = tmp.path().join(".bashrc");
        fs::write(&target, "x").unwrap();

        let a = PathLock::for_path(&locks, &target).unwrap();
        let b = PathLock::for_path(&locks, &tmp.path().join(".").join(".bashrc")).unwrap();
        let other = PathLock::for_path(&locks, &tmp.path().join(".zshrc")).unwrap();

        assert_eq!(a.lock_file(), b.lock_file());
        assert_ne!(a.lock_file(), other.lock_file());
        assert!(a.lock_file().starts_with(&locks));
    }

    #[test]
    fn try_acquire_returns_none_when_held() {
        let tmp = tempfile::tempdir().unwrap();
        let lock = PathLock::for_path(tmp.path(), &tmp.path().join(".bashrc")).unwrap();

        // Hold the lock from a raw file
        let file = File::create(lock.lock_file()).unwrap();
        file.lock_exclusive().unwrap();
        assert!(lock.try_acquire().unwrap().is_none());

        file.unlock().unwrap();
        drop(file);
        assert!(lock.try_acquire().unwrap().is_some());
    }

    #[test]
    fn guard_drop_releases_lock() {
        let tmp = tempfile::tempdir().unwrap();
        let lock = PathLock::for_path(tmp.path(), &tmp.path().join(".bashrc")).unwrap();

        {
            let _guard = lock.acquire().unwrap();
        }
        let _again = lock.acquire().unwrap();
    }

    #[test]
    fn concurrent_threads_serialize() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().to_path_buf();
        let inside = Arc::new(AtomicU32::new(0));
        let finished = Arc::new(AtomicU32::new(0));
        let barrier = Arc::new(Barrier::new(3));

        let handles: Vec<_> = (0..3)
            .map(|_| {
                let dir = dir.clone();
                let inside = inside.clone();
                let finished = finished.clone();
                let barrier = barrier.clone();
                std::thread::spawn(move || {
                    let lock = PathLock::for_path(&dir, &dir.join(".bashrc")).unwrap();
                    barrier.wait();
                    let _guard = lock.acquire().unwrap();
                    assert_eq!(inside.fetch_add(1, Ordering::SeqCst), 0);
                    std::thread::sleep(std::time::Duration::from_millis(10));
                    inside.fetch_sub(1, Ordering::SeqCst);
                    finished.fetch_add(1, Ordering::SeqCst);
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(finished.load(Ordering::SeqCst), 3);
    }
}
