//! Durable, append-only store of backup copies and their sidecar records.
//!
//! Layout under the root:
//!
//! ```text
//! <root>/                                   (0700)
//! ├── shell_configs/                        (0700)
//! │   ├── .bashrc_20260101_120000.bak       copy, original mode bits
//! │   └── .bashrc_20260101_120000.meta      JSON BackupRecord
//! ├── system_configs/                       (0700)
//! └── logs/                                 (0700) audit log
//! ```
//!
//! Nothing in the store is ever rewritten. A backup adds exactly one copy
//! and one sidecar; both are created with no-clobber semantics.

use chrono::{Local, NaiveDateTime};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::hasher;
use super::record::{BackupCategory, BackupRecord, PermissionBits};
use crate::error::{Error, Result};

const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";
const LOGS_DIR: &str = "logs";

/// Upper bound on same-second collisions before giving up.
const MAX_SEQUENCE: u32 = 1000;

#[derive(Debug, Clone)]
pub struct BackupCatalog {
    root: PathBuf,
}

impl BackupCatalog {
    /// Open (and lay out) the backup store at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let catalog = Self { root: root.into() };

        secure_dir(&catalog.root)?;
        for category in BackupCategory::ALL {
            secure_dir(&catalog.category_dir(category))?;
        }
        secure_dir(&catalog.logs_dir())?;

        Ok(catalog)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn category_dir(&self, category: BackupCategory) -> PathBuf {
        self.root.join(category.dir_name())
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join(LOGS_DIR)
    }

    /// Back up `path` before it is mutated.
    ///
    /// Returns `None` when there is nothing to protect (missing or unreadable
    /// source) or the backup could not be written. Both are logged; neither
    /// is fatal to the caller.
    pub fn create_backup(&self, path: &Path, category: BackupCategory) -> Option<BackupRecord> {
        match self.try_create_backup(path, category) {
            Ok(record) => Some(record),
            Err(Error::SourceNotFound(p)) => {
                warn!("File not found, nothing to back up: {}", p.display());
                None
            }
            Err(e) => {
                warn!("Backup failed for {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Like [`create_backup`](Self::create_backup) but reports why it failed.
    pub fn try_create_backup(&self, path: &Path, category: BackupCategory) -> Result<BackupRecord> {
        self.create_backup_at(path, category, Local::now().naive_local())
    }

    /// Back up `path` stamping it with `now` instead of the wall clock.
    pub fn create_backup_at(
        &self,
        path: &Path,
        category: BackupCategory,
        now: NaiveDateTime,
    ) -> Result<BackupRecord> {
        let source = match path.canonicalize() {
            Ok(p) => p,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(Error::SourceNotFound(path.to_path_buf()));
            }
            Err(e) => return Err(Error::io("resolve", path, e)),
        };

        let metadata = fs::metadata(&source).map_err(|e| Error::io("stat", &source, e))?;
        if !metadata.is_file() {
            return Err(Error::io(
                "back up",
                &source,
                io::Error::new(io::ErrorKind::InvalidInput, "not a regular file"),
            ));
        }

        let file_name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                Error::io(
                    "back up",
                    &source,
                    io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"),
                )
            })?;

        let timestamp = now.format(TIMESTAMP_FORMAT).to_string();
        let dir = self.category_dir(category);

        let source_hash = hasher::digest(&source)?;
        let mut input = File::open(&source).map_err(|e| Error::io("open", &source, e))?;

        let (backup_path, sequence, mut output) =
            reserve_backup_file(&dir, &file_name, &timestamp)?;

        let written = (|| -> Result<BackupRecord> {
            let size =
                io::copy(&mut input, &mut output).map_err(|e| Error::io("copy", &source, e))?;
            output
                .sync_all()
                .map_err(|e| Error::io("sync", &backup_path, e))?;
            drop(output);

            // The copy must carry the bytes that were hashed
            let copy_hash = hasher::digest(&backup_path)?;
            if copy_hash != source_hash {
                return Err(Error::SourceChanged(source.clone()));
            }

            let permissions = permission_bits(&metadata);
            apply_mode(&backup_path, permissions)?;

            let record = BackupRecord {
                original_path: source.clone(),
                category,
                timestamp: timestamp.clone(),
                content_hash: source_hash.clone(),
                permissions,
                owner: owner_name(&metadata),
                backup_path: backup_path.clone(),
                size,
                sequence,
            };

            write_sidecar(&dir, &record)?;
            Ok(record)
        })();

        match written {
            Ok(record) => {
                info!("Created backup: {}", record.backup_path.display());
                Ok(record)
            }
            Err(e) => {
                let _ = fs::remove_file(&backup_path);
                Err(e)
            }
        }
    }

    /// All records, optionally only those for `original`, most recent first.
    ///
    /// Sidecars that cannot be read or parsed are skipped with a warning.
    pub fn list_backups(&self, original: Option<&Path>) -> Vec<BackupRecord> {
        let filter = original.map(super::resolve_lenient);
        let mut records = Vec::new();

        for category in BackupCategory::ALL {
            let dir = self.category_dir(category);
            let pattern = format!("{}/*.meta", glob::Pattern::escape(&dir.to_string_lossy()));

            let entries = match glob::glob(&pattern) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!("Invalid backup scan pattern {}: {}", pattern, e);
                    continue;
                }
            };

            for entry in entries.flatten() {
                match load_sidecar(&entry) {
                    Ok(record) => {
                        if filter
                            .as_ref()
                            .is_none_or(|wanted| record.original_path == *wanted)
                        {
                            records.push(record);
                        }
                    }
                    Err(e) => warn!("Skipping backup record: {}", e),
                }
            }
        }

        records.sort_by(|a, b| b.recency_key().cmp(&a.recency_key()));
        debug!(
            "Listed {} backup(s){}",
            records.len(),
            original
                .map(|p| format!(" for {}", p.display()))
                .unwrap_or_default()
        );
        records
    }

    /// The most recent record for `original`, if any.
    pub fn latest_backup(&self, original: &Path) -> Option<BackupRecord> {
        self.list_backups(Some(original)).into_iter().next()
    }
}

/// Claim a fresh `<name>_<ts>[-n].bak` in `dir`, never reusing an existing name.
fn reserve_backup_file(
    dir: &Path,
    file_name: &str,
    timestamp: &str,
) -> Result<(PathBuf, u32, File)> {
    for sequence in 0..MAX_SEQUENCE {
        let stem = if sequence == 0 {
            format!("{}_{}", file_name, timestamp)
        } else {
            format!("{}_{}-{}", file_name, timestamp, sequence)
        };
        let backup_path = dir.join(format!("{}.bak", stem));
        if BackupRecord::sidecar_path(&backup_path).exists() {
            continue;
        }

        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&backup_path)
        {
            Ok(file) => return Ok((backup_path, sequence, file)),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(Error::io("create", &backup_path, e)),
        }
    }

    Err(Error::io(
        "create",
        dir.join(format!("{}_{}.bak", file_name, timestamp)),
        io::Error::new(io::ErrorKind::AlreadyExists, "too many backups in one second"),
    ))
}

/// Write the sidecar via temp file + no-clobber rename so readers never see a partial record.
fn write_sidecar(dir: &Path, record: &BackupRecord) -> Result<()> {
    let sidecar = BackupRecord::sidecar_path(&record.backup_path);

    let mut tmp = tempfile::Builder::new()
        .prefix(".confguard-meta-")
        .suffix(".tmp")
        .tempfile_in(dir)
        .map_err(|e| Error::io("create temp file in", dir, e))?;

    let json = serde_json::to_vec_pretty(record).map_err(|e| Error::Sidecar {
        path: sidecar.clone(),
        source: e,
    })?;
    tmp.write_all(&json)
        .and_then(|_| tmp.as_file().sync_all())
        .map_err(|e| Error::io("write", tmp.path().to_path_buf(), e))?;

    tmp.persist_noclobber(&sidecar)
        .map_err(|e| Error::io("persist", &sidecar, e.error))?;
    Ok(())
}

fn load_sidecar(path: &Path) -> Result<BackupRecord> {
    let json = fs::read_to_string(path).map_err(|e| Error::io("read", path, e))?;
    serde_json::from_str(&json).map_err(|e| Error::Sidecar {
        path: path.to_path_buf(),
        source: e,
    })
}

fn secure_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).map_err(|e| Error::io("create directory", path, e))?;
    apply_mode(path, PermissionBits::from_mode(0o700))
}

pub(crate) fn apply_mode(path: &Path, bits: PermissionBits) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(bits.mode()))
            .map_err(|e| Error::io("set permissions on", path, e))?;
    }
    #[cfg(not(unix))]
    let _ = (path, bits);
    Ok(())
}

fn permission_bits(metadata: &fs::Metadata) -> PermissionBits {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        PermissionBits::from_mode(metadata.permissions().mode())
    }
    #[cfg(not(unix))]
    {
        if metadata.permissions().readonly() {
            PermissionBits::from_mode(0o444)
        } else {
            PermissionBits::from_mode(0o644)
        }
    }
}

fn owner_name(metadata: &fs::Metadata) -> String {
    #[cfg(unix)]
    {
        use nix::unistd::{Uid, User};
        use std::os::unix::fs::MetadataExt;

        let uid = metadata.uid();
        match User::from_uid(Uid::from_raw(uid)) {
            Ok(Some(user)) => user.name,
            _ => uid.to_string(),
        }
    }
    #[cfg(not(unix))]
    {
        let _ = metadata;
        std::env::var("USERNAME").unwrap_or_default()
    }
}
