//! Content-addressed backups and verified restore.
//!
//! - [`hasher`]: streaming SHA-256 digests
//! - [`catalog`]: append-only store of copies plus `.meta` sidecars
//! - [`restore`]: hash-checked, temp-file-then-rename restore
//! - [`guard`]: the only way to obtain permission to mutate a protected file

pub mod catalog;
pub mod guard;
pub mod hasher;
pub mod record;
pub mod restore;

pub use catalog::BackupCatalog;
pub use guard::MutationPermit;
pub use hasher::{ContentHash, digest, digest_bytes};
pub use record::{BackupCategory, BackupRecord, PermissionBits};
pub use restore::{AtomicRestorer, OwnershipControl, RestoreOutcome, SystemOwnership};

use std::path::{Component, Path, PathBuf};

/// Best-effort canonical form of a path that may no longer exist.
///
/// Existing paths are canonicalized. Otherwise the parent is canonicalized
/// and the file name re-attached, so a deleted original still matches the
/// `original_path` recorded when it was backed up. Falls back to the
/// absolute (uncanonicalized) path.
pub(crate) fn resolve_lenient(path: &Path) -> PathBuf {
    if let Ok(canonical) = path.canonicalize() {
        return canonical;
    }

    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };

    match (absolute.parent(), absolute.components().next_back()) {
        (Some(parent), Some(Component::Normal(name))) => parent
            .canonicalize()
            .map(|p| p.join(name))
            .unwrap_or(absolute),
        _ => absolute,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn resolve_lenient_handles_missing_leaf() {
        let tmp = tempfile::tempdir().unwrap();
        let existing = tmp.path().join("present");
        fs::write(&existing, "x").unwrap();

        assert_eq!(resolve_lenient(&existing), existing.canonicalize().unwrap());

        let missing = tmp.path().join("gone");
        assert_eq!(
            resolve_lenient(&missing),
            tmp.path().canonicalize().unwrap().join("gone")
        );
    }

    #[test]
    fn resolve_lenient_keeps_unresolvable_paths_absolute() {
        let path = Path::new("/definitely/not/here/.bashrc");
        assert_eq!(resolve_lenient(path), path.to_path_buf());
    }
}
