//! Facade wiring the catalog, restorer, policies, sandbox and audit log
//! together around one shared [`SecurityContext`].

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::audit::{self, AuditAction, AuditEntry};
use super::context::SecurityContext;
use crate::backup::{
    AtomicRestorer, BackupCatalog, BackupCategory, BackupRecord, MutationPermit, OwnershipControl,
    RestoreOutcome, SystemOwnership, digest,
};
use crate::cache::TimedCache;
use crate::error::{Error, Result};
use crate::sandbox::{SandboxExecutor, SandboxResult};

pub struct SecurityManager {
    ctx: Arc<SecurityContext>,
    catalog: BackupCatalog,
    restorer: AtomicRestorer,
    executor: SandboxExecutor,
    /// Serializes audit appends so concurrent events keep the chain linear.
    audit_lock: Mutex<()>,
}

impl SecurityManager {
    pub fn new(ctx: Arc<SecurityContext>, catalog_root: impl Into<PathBuf>) -> Result<Self> {
        Self::with_ownership(ctx, catalog_root, Arc::new(SystemOwnership))
    }

    /// Like [`new`](Self::new) with a substitute ownership control.
    pub fn with_ownership(
        ctx: Arc<SecurityContext>,
        catalog_root: impl Into<PathBuf>,
        ownership: Arc<dyn OwnershipControl>,
    ) -> Result<Self> {
        let catalog = BackupCatalog::open(catalog_root)?;
        let restorer = AtomicRestorer::with_ownership(catalog.clone(), ownership);
        let executor = SandboxExecutor::new(ctx.clone());
        debug!(
            "Security manager ready: backups in {}, {} allowed root(s), {} restricted pattern(s)",
            catalog.root().display(),
            ctx.allowed_roots().len(),
            ctx.restricted_patterns().len()
        );
        Ok(Self {
            ctx,
            catalog,
            restorer,
            executor,
            audit_lock: Mutex::new(()),
        })
    }

    pub fn context(&self) -> &Arc<SecurityContext> {
        &self.ctx
    }

    pub fn catalog(&self) -> &BackupCatalog {
        &self.catalog
    }

    // ── Backups ─────────────────────────────────────────────────────

    /// Back up `path`; `None` when there was nothing to back up or it failed.
    pub fn create_backup(&self, path: &Path, category: BackupCategory) -> Option<BackupRecord> {
        self.try_create_backup(path, category).ok()
    }

    pub fn try_create_backup(&self, path: &Path, category: BackupCategory) -> Result<BackupRecord> {
        match self.catalog.try_create_backup(path, category) {
            Ok(record) => {
                self.audit(
                    AuditAction::BackupCreated,
                    &record.original_path.display().to_string(),
                    record.content_hash.as_str(),
                    Some(&record.backup_path.display().to_string()),
                );
                Ok(record)
            }
            Err(e) => {
                warn!("Backup of {} skipped: {}", path.display(), e);
                self.audit(
                    AuditAction::BackupSkipped,
                    &path.display().to_string(),
                    "",
                    Some(&e.to_string()),
                );
                Err(e)
            }
        }
    }

    pub fn list_backups(&self, original: Option<&Path>) -> Vec<BackupRecord> {
        self.catalog.list_backups(original)
    }

    // ── Restore ─────────────────────────────────────────────────────

    /// Restore `original` from its latest backup, or from `record`.
    ///
    /// The target must pass the path policy, like any other mutation.
    pub fn restore(&self, original: &Path, record: Option<&BackupRecord>) -> bool {
        self.try_restore(original, record).is_ok()
    }

    pub fn try_restore(
        &self,
        original: &Path,
        record: Option<&BackupRecord>,
    ) -> Result<RestoreOutcome> {
        self.check_path(original)?;
        let subject = original.display().to_string();
        match self.restorer.try_restore(original, record) {
            Ok(outcome) => {
                self.audit(
                    AuditAction::Restored,
                    &outcome.target.display().to_string(),
                    outcome.record.content_hash.as_str(),
                    Some(&outcome.record.backup_path.display().to_string()),
                );
                Ok(outcome)
            }
            Err(e) => {
                warn!("Restore of {} failed ({:?}): {}", original.display(), e.kind(), e);
                let action = match e {
                    Error::IntegrityMismatch { .. } => AuditAction::IntegrityMismatch,
                    _ => AuditAction::RestoreFailed,
                };
                self.audit(action, &subject, "", Some(&e.to_string()));
                Err(e)
            }
        }
    }

    // ── Guarded mutation ────────────────────────────────────────────

    /// Check `path` against the allow list and back it up if it exists.
    ///
    /// The returned permit is the only handle that can write or remove the
    /// file. A denied path or a failed backup refuses the mutation.
    pub fn prepare_mutation(
        &self,
        path: &Path,
        category: BackupCategory,
    ) -> Result<MutationPermit> {
        let resolved = self.check_path(path)?;

        let backup = if resolved.exists() {
            Some(self.try_create_backup(&resolved, category)?)
        } else {
            debug!("{} does not exist yet, nothing to back up", resolved.display());
            None
        };

        Ok(MutationPermit::new(resolved, backup))
    }

    // ── Integrity ───────────────────────────────────────────────────

    /// Whether `path` still matches its latest backup.
    ///
    /// True when there is no backup to compare against; false on any error.
    pub fn verify_file_integrity(&self, path: &Path) -> bool {
        let Some(latest) = self.catalog.latest_backup(path) else {
            return true;
        };
        match digest(path) {
            Ok(current) => current == latest.content_hash,
            Err(e) => {
                debug!("Integrity check of {} failed: {}", path.display(), e);
                false
            }
        }
    }

    /// [`verify_file_integrity`](Self::verify_file_integrity) memoized in a caller-owned cache.
    pub fn integrity_status(
        &self,
        path: &Path,
        cache: &mut TimedCache<PathBuf, bool>,
        now: Instant,
    ) -> bool {
        let key = crate::backup::resolve_lenient(path);
        if let Some(cached) = cache.get(&key, now) {
            return cached;
        }
        let status = self.verify_file_integrity(path);
        cache.insert(key, status, now);
        status
    }

    // ── Policies ────────────────────────────────────────────────────

    pub fn is_path_allowed(&self, path: &Path) -> bool {
        self.ctx.path_policy().is_allowed(path)
    }

    pub fn is_command_safe(&self, command: &str) -> bool {
        self.ctx.command_policy().is_safe(command)
    }

    /// Resolve `path` under the allow list, auditing denials.
    pub fn check_path(&self, path: &Path) -> Result<PathBuf> {
        self.ctx.path_policy().check(path).inspect_err(|e| {
            warn!("{}", e);
            self.audit(AuditAction::PathDenied, &path.display().to_string(), "", None);
        })
    }

    // ── Sandbox ─────────────────────────────────────────────────────

    pub async fn run_sandboxed(
        &self,
        command: &str,
        timeout: Option<Duration>,
    ) -> Result<SandboxResult> {
        let result = self.executor.run_sandboxed(command, timeout).await;
        match &result {
            Ok(output) => self.audit(
                AuditAction::CommandExecuted,
                command,
                "",
                Some(&format!("exit {} in {}ms", output.exit_code, output.duration_ms)),
            ),
            Err(Error::CommandDenied { pattern, .. }) => self.audit(
                AuditAction::CommandBlocked,
                command,
                "",
                Some(&format!("matched '{}'", pattern)),
            ),
            Err(Error::Timeout { after, .. }) => self.audit(
                AuditAction::CommandTimedOut,
                command,
                "",
                Some(&format!("after {}ms", after.as_millis())),
            ),
            Err(e) => debug!("Sandboxed command failed to run: {}", e),
        }
        result
    }

    // ── Audit ───────────────────────────────────────────────────────

    pub fn audit_log(&self) -> anyhow::Result<Vec<AuditEntry>> {
        audit::read_audit_log(&self.catalog.logs_dir())
    }

    pub fn verify_audit_chain(&self) -> anyhow::Result<Vec<usize>> {
        audit::verify_audit_chain(&self.catalog.logs_dir())
    }

    /// Append an audit entry. Failures are logged, never propagated.
    fn audit(
        &self,
        action: AuditAction,
        subject: &str,
        content_sha256: &str,
        detail: Option<&str>,
    ) {
        let _guard = self.audit_lock.lock().unwrap_or_else(|e| e.into_inner());
        if let Err(e) = audit::append_audit_entry(
            &self.catalog.logs_dir(),
            action,
            subject,
            content_sha256,
            detail,
        ) {
            warn!("Failed to write audit entry: {:#}", e);
        } else {
            info!(target: "confguard::audit", "{:?} {}", action, subject);
        }
    }
}
