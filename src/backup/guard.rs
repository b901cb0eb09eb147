//! Permission to mutate a protected file.
//!
//! A [`MutationPermit`] is handed out only after the path has passed the
//! allow-list and (when the file exists) a backup has been written. The
//! mutating helpers live on the permit, so code without one has no way to
//! reach them.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::info;

use super::catalog::apply_mode;
use super::record::{BackupRecord, PermissionBits};
use crate::error::{Error, Result};

#[derive(Debug)]
pub struct MutationPermit {
    path: PathBuf,
    backup: Option<BackupRecord>,
}

impl MutationPermit {
    /// Only the security manager issues permits, after its checks pass.
    pub(crate) fn new(path: PathBuf, backup: Option<BackupRecord>) -> Self {
        Self { path, backup }
    }

    /// Resolved path this permit covers.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Backup taken before the permit was issued; `None` for a new file.
    pub fn backup(&self) -> Option<&BackupRecord> {
        self.backup.as_ref()
    }

    /// Replace the file's content via temp file + rename, keeping its mode.
    pub fn write_atomic(&self, content: &[u8]) -> Result<()> {
        let parent = self.path.parent().ok_or_else(|| {
            Error::io(
                "write",
                &self.path,
                io::Error::new(io::ErrorKind::InvalidInput, "path has no parent directory"),
            )
        })?;

        let existing_mode = existing_permissions(&self.path)?;

        let mut staged = tempfile::Builder::new()
            .prefix(".confguard-write-")
            .tempfile_in(parent)
            .map_err(|e| Error::io("create temp file in", parent, e))?;
        staged
            .write_all(content)
            .and_then(|_| staged.as_file().sync_all())
            .map_err(|e| Error::io("write", staged.path().to_path_buf(), e))?;

        if let Some(bits) = existing_mode {
            apply_mode(staged.path(), bits)?;
        }

        staged
            .persist(&self.path)
            .map_err(|e| Error::io("rename onto", &self.path, e.error))?;
        info!("Wrote {} ({} bytes)", self.path.display(), content.len());
        Ok(())
    }

    /// Delete the file. A file that is already gone is not an error.
    pub fn remove(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                info!("Removed {}", self.path.display());
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::io("remove", &self.path, e)),
        }
    }
}

fn existing_permissions(path: &Path) -> Result<Option<PermissionBits>> {
    match fs::metadata(path) {
        #[cfg(unix)]
        Ok(metadata) => {
            use std::os::unix::fs::PermissionsExt;
            Ok(Some(PermissionBits::from_mode(metadata.permissions().mode())))
        }
        #[cfg(not(unix))]
        Ok(_) => Ok(None),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(Error::io("stat", path, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_atomic_replaces_content() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join(".bashrc");
        fs::write(&path, "old").unwrap();

        let permit = MutationPermit::new(path.clone(), None);
        permit.write_atomic(b"new content").unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"new content");
        let leftovers = fs::read_dir(tmp.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with(".confguard-write-"))
            .count();
        assert_eq!(leftovers, 0);
    }

    #[cfg(unix)]
    #[test]
    fn write_atomic_keeps_mode() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join(".netrc");
        fs::write(&path, "machine x").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o600)).unwrap();

        MutationPermit::new(path.clone(), None)
            .write_atomic(b"machine y")
            .unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn write_atomic_creates_new_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join(".inputrc");

        MutationPermit::new(path.clone(), None)
            .write_atomic(b"set editing-mode vi")
            .unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "set editing-mode vi");
    }

    #[test]
    fn remove_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join(".zshrc");
        fs::write(&path, "x").unwrap();

        let permit = MutationPermit::new(path.clone(), None);
        permit.remove().unwrap();
        assert!(!path.exists());
        permit.remove().unwrap();
    }
}
