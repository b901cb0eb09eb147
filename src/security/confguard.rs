//! # confguard Security Module
//!
//! Front door for the trust-and-integrity core. Every security-relevant
//! type, constant and function is re-exported here.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                  manager.rs: SecurityManager                     │
//! │        backup · restore · guarded mutation · sandbox · audit     │
//! ├────────────────┬────────────────┬──────────────┬────────────────┤
//! │ context.rs     │ path_policy.rs │ command_     │ audit.rs       │
//! │ Immutable,     │ Allow list of  │ policy.rs    │ Append-only    │
//! │ Arc-shared     │ resolved roots │ Deny list of │ JSONL + hash   │
//! │ user/env/roots │                │ substrings   │ chain          │
//! ├────────────────┴────────────────┴──────────────┴────────────────┤
//! │  crate::backup (catalog, restore, guard) · crate::sandbox       │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Security Model
//!
//! 1. **Fail closed**: a path that cannot be resolved is denied, a
//!    backup whose digest does not match is never restored, and a
//!    mutation whose backup failed is refused.
//!
//! 2. **Backup before mutate**: the only way to write a protected file
//!    is through a [`MutationPermit`](crate::backup::MutationPermit),
//!    which [`SecurityManager::prepare_mutation`] issues after the path
//!    check and the backup.
//!
//! 3. **Atomic restore**: the target is replaced by a single rename from
//!    a verified temp file in its own directory. Readers see the old
//!    content or the new, never a mix.
//!
//! 4. **Restricted execution**: commands pass a deny list before any
//!    process exists, then run with a cleared environment and fixed
//!    `PATH` in a private scratch directory. The deny list is a textual
//!    filter and can be bypassed by respelling; there is no kernel
//!    isolation.
//!
//! 5. **Tamper-evident log**: backups, restores, denials and command
//!    runs are appended to a hash-chained audit log.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use confguard::backup::BackupCategory;
//! use confguard::security::{SecurityContext, SecurityManager};
//!
//! let config = confguard::Config::load()?;
//! let ctx = Arc::new(SecurityContext::from_config(&config));
//! let manager = SecurityManager::new(ctx, config.backup_root())?;
//!
//! let permit = manager.prepare_mutation(&rc_path, BackupCategory::ShellConfig)?;
//! permit.write_atomic(new_content.as_bytes())?;
//!
//! let output = manager.run_sandboxed("git --version", None).await?;
//! ```
//!
//! ## File Hierarchy
//!
//! ```text
//! ~/.local/share/confguard/backups/         # Backup root (0700)
//! ├── shell_configs/                        # .bak copies + .meta sidecars
//! ├── system_configs/
//! └── logs/
//!     └── audit.jsonl                       # Append-only audit log
//! ```
//!
//! ## Threat Model
//!
//! | Threat | Defense Layer |
//! |--------|--------------|
//! | Edit destroys a config file | Backup before mutate |
//! | Stored backup silently corrupted | Digest re-check before and after staging |
//! | Crash mid-restore | Temp file + atomic rename |
//! | Write escapes via `..` or symlink | Resolved-path allow list |
//! | Destructive shell command | Deny list, checked before spawn |
//! | Secrets leak into child env | Cleared env, allow-listed vars only |
//! | Runaway command | Timeout kills the whole process group |
//! | Audit log edited | Hash chain |

// ── Context ─────────────────────────────────────────────────────────

pub use super::context::{
    DIRECTORY_MODE, FORWARDED_ENV_VARS, SAFE_PATH_DIRS, SecurityContext, SecurityContextBuilder,
    safe_path,
};

// ── Policies ────────────────────────────────────────────────────────

pub use super::command_policy::{CommandPolicy, DEFAULT_RESTRICTED_PATTERNS};
pub use super::path_policy::PathPolicy;

// ── Audit Log ───────────────────────────────────────────────────────

pub use super::audit::{
    AuditAction, AuditEntry, GENESIS_HASH, append_audit_entry, audit_file_path, read_audit_log,
    verify_audit_chain,
};

// ── Facade ──────────────────────────────────────────────────────────

pub use super::manager::SecurityManager;
