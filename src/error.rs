//! Error types for the trust-and-integrity core.
//!
//! Every failure is a value. Callers branch on [`Error::kind`] instead of
//! matching message strings, and UI layers can single out security denials
//! with [`Error::is_security`].

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Coarse classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// No source file to back up, or no backup to restore from.
    NotFound,
    /// A stored or staged copy disagrees with its recorded digest.
    IntegrityMismatch,
    /// A path failed the allow-list or a command failed the deny-list.
    PermissionDenied,
    /// Underlying filesystem or process operation failed.
    IoFailure,
    /// A sandboxed execution exceeded its caller-supplied bound.
    Timeout,
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("Source file does not exist: {0}")]
    SourceNotFound(PathBuf),

    #[error("No backups recorded for {0}")]
    NoBackups(PathBuf),

    #[error("Backup file is missing: {0}")]
    BackupMissing(PathBuf),

    #[error("Integrity check failed for {path}: expected {expected}, found {actual}")]
    IntegrityMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("Source {0} changed while it was being backed up")]
    SourceChanged(PathBuf),

    #[error("Access denied to path: {0}")]
    PathDenied(PathBuf),

    #[error("Command not allowed (matched '{pattern}'): {command}")]
    CommandDenied { command: String, pattern: String },

    #[error("Failed to {op} {path}: {source}")]
    Io {
        op: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Malformed backup record {path}: {source}")]
    Sidecar {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Failed to spawn sandboxed command: {0}")]
    Spawn(std::io::Error),

    #[error("Failed to restore ownership of {path} to '{owner}': {reason}")]
    Ownership {
        path: PathBuf,
        owner: String,
        reason: String,
    },

    #[error("Sandboxed command timed out after {}ms: {command}", after.as_millis())]
    Timeout { command: String, after: Duration },
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::SourceNotFound(_) | Error::NoBackups(_) | Error::BackupMissing(_) => {
                ErrorKind::NotFound
            }
            Error::IntegrityMismatch { .. } | Error::SourceChanged(_) => {
                ErrorKind::IntegrityMismatch
            }
            Error::PathDenied(_) | Error::CommandDenied { .. } => ErrorKind::PermissionDenied,
            Error::Io { .. }
            | Error::Sidecar { .. }
            | Error::Spawn(_)
            | Error::Ownership { .. } => {
                ErrorKind::IoFailure
            }
            Error::Timeout { .. } => ErrorKind::Timeout,
        }
    }

    /// True for policy denials, which UI layers surface differently from I/O noise.
    pub fn is_security(&self) -> bool {
        self.kind() == ErrorKind::PermissionDenied
    }

    pub(crate) fn io(op: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            op,
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
