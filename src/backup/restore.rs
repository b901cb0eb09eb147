//! Verified, crash-safe restore of a file from a catalog entry.
//!
//! Every step gates the next and the target is only touched by the final
//! rename:
//!
//! 1. Pick the record (explicit, or the latest for the path)
//! 2. Re-hash the stored copy against the record → `IntegrityMismatch`
//! 3. Stage a copy in a temp file next to the target (same filesystem)
//! 4. Re-hash the staged copy → `IntegrityMismatch`
//! 5. Apply recorded mode bits; chown only when running as root
//! 6. Atomically rename the staged copy onto the target
//!
//! A failure anywhere before step 6 drops the temp file and leaves the
//! target byte-for-byte as it was.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;
use tracing::{debug, error, info};

use super::catalog::{BackupCatalog, apply_mode};
use super::hasher::{self, ContentHash};
use super::record::BackupRecord;
use crate::error::{Error, Result};

/// Privilege check and chown, split out so restore logic can be exercised unprivileged.
#[cfg_attr(test, mockall::automock)]
pub trait OwnershipControl: Send + Sync {
    /// Whether ownership changes should be attempted at all.
    fn is_privileged(&self) -> bool;

    /// Hand `path` to the named user.
    fn set_owner(&self, path: &Path, owner: &str) -> Result<()>;
}

/// Real ownership control: effective uid 0 is privileged.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemOwnership;

impl OwnershipControl for SystemOwnership {
    fn is_privileged(&self) -> bool {
        #[cfg(unix)]
        {
            nix::unistd::geteuid().is_root()
        }
        #[cfg(not(unix))]
        {
            false
        }
    }

    fn set_owner(&self, path: &Path, owner: &str) -> Result<()> {
        #[cfg(unix)]
        {
            let (uid, gid) =
                lookup_owner(owner).map_err(|reason| ownership_error(path, owner, reason))?;
            nix::unistd::chown(path, Some(uid), gid)
                .map_err(|e| ownership_error(path, owner, e.to_string()))
        }
        #[cfg(not(unix))]
        {
            let _ = (path, owner);
            Ok(())
        }
    }
}

/// Uid and primary gid for a recorded owner.
///
/// Owners without a passwd entry are recorded as a numeric uid; those keep
/// their current group.
#[cfg(unix)]
fn lookup_owner(
    owner: &str,
) -> std::result::Result<(nix::unistd::Uid, Option<nix::unistd::Gid>), String> {
    use nix::unistd::{Uid, User};

    match User::from_name(owner).map_err(|e| e.to_string())? {
        Some(user) => Ok((user.uid, Some(user.gid))),
        None => owner
            .parse::<u32>()
            .map(|raw| (Uid::from_raw(raw), None))
            .map_err(|_| "no such user".to_string()),
    }
}

#[cfg(unix)]
fn ownership_error(path: &Path, owner: &str, reason: String) -> Error {
    Error::Ownership {
        path: path.to_path_buf(),
        owner: owner.to_string(),
        reason,
    }
}

/// What a successful restore did.
#[derive(Debug, Clone)]
pub struct RestoreOutcome {
    /// The path that was replaced.
    pub target: PathBuf,
    /// The record the content came from.
    pub record: BackupRecord,
    /// False when ownership was skipped for lack of privilege.
    pub ownership_restored: bool,
}

pub struct AtomicRestorer {
    catalog: BackupCatalog,
    ownership: Arc<dyn OwnershipControl>,
}

impl AtomicRestorer {
    pub fn new(catalog: BackupCatalog) -> Self {
        Self::with_ownership(catalog, Arc::new(SystemOwnership))
    }

    pub fn with_ownership(catalog: BackupCatalog, ownership: Arc<dyn OwnershipControl>) -> Self {
        Self { catalog, ownership }
    }

    /// Restore `original`, logging the failure kind and returning false on any error.
    pub fn restore(&self, original: &Path, record: Option<&BackupRecord>) -> bool {
        match self.try_restore(original, record) {
            Ok(_) => true,
            Err(e) => {
                error!(
                    "Restore failed for {} ({:?}): {}",
                    original.display(),
                    e.kind(),
                    e
                );
                false
            }
        }
    }

    /// Restore `original` from `record`, or from its latest backup when `record` is None.
    ///
    /// A symlinked target has its link destination restored; the link itself
    /// is left in place.
    pub fn try_restore(
        &self,
        original: &Path,
        record: Option<&BackupRecord>,
    ) -> Result<RestoreOutcome> {
        let record = match record {
            Some(record) => record.clone(),
            None => self
                .catalog
                .latest_backup(original)
                .ok_or_else(|| Error::NoBackups(original.to_path_buf()))?,
        };

        verify(&record.backup_path, &record.content_hash).map_err(|e| match e {
            Error::Io { ref source, .. } if source.kind() == io::ErrorKind::NotFound => {
                Error::BackupMissing(record.backup_path.clone())
            }
            other => other,
        })?;

        let target = super::resolve_lenient(original);
        let parent = target.parent().ok_or_else(|| {
            Error::io(
                "restore",
                &target,
                io::Error::new(io::ErrorKind::InvalidInput, "target has no parent directory"),
            )
        })?;

        let staged = stage_verified(&record.backup_path, parent, &record.content_hash)?;

        apply_mode(staged.path(), record.permissions)?;
        let ownership_restored = if self.ownership.is_privileged() {
            self.ownership.set_owner(staged.path(), &record.owner)?;
            true
        } else {
            debug!(
                "Not privileged, leaving ownership of {} unchanged",
                target.display()
            );
            false
        };

        staged
            .persist(&target)
            .map_err(|e| Error::io("rename onto", &target, e.error))?;

        info!(
            "Successfully restored {} from {}",
            target.display(),
            record.backup_path.display()
        );

        Ok(RestoreOutcome {
            target,
            record,
            ownership_restored,
        })
    }
}

/// Copy `source` into a synced temp file in `parent` and check the copy hashes to `expected`.
///
/// The temp file is deleted when it is dropped, so any error here leaves
/// nothing behind.
fn stage_verified(source: &Path, parent: &Path, expected: &ContentHash) -> Result<NamedTempFile> {
    let mut staged = tempfile::Builder::new()
        .prefix(".confguard-restore-")
        .tempfile_in(parent)
        .map_err(|e| Error::io("create temp file in", parent, e))?;

    let mut input = File::open(source).map_err(|e| Error::io("open", source, e))?;
    io::copy(&mut input, &mut staged).map_err(|e| Error::io("copy", source, e))?;
    staged
        .as_file()
        .sync_all()
        .map_err(|e| Error::io("sync", staged.path().to_path_buf(), e))?;

    verify(staged.path(), expected)?;
    Ok(staged)
}

fn verify(path: &Path, expected: &ContentHash) -> Result<()> {
    let actual = hasher::digest(path)?;
    if actual != *expected {
        return Err(Error::IntegrityMismatch {
            path: path.to_path_buf(),
            expected: expected.to_string(),
            actual: actual.to_string(),
        });
    }
    Ok(())
}
