//! Append-only, hash-chained audit log of security events.
//!
//! Stored at `<backup_root>/logs/audit.jsonl`, inside the 0700 backup store.
//! Each entry carries the SHA-256 of the previous line, so an edited or
//! deleted line shows up as a broken link.
//!
//! # Format
//!
//! One JSON object per line (JSONL):
//!
//! | Field | Description |
//! |-------|-------------|
//! | `ts` | RFC 3339 timestamp |
//! | `action` | `backup_created`, `restored`, `command_blocked`, ... |
//! | `subject` | Path or command the event concerns |
//! | `content_sha256` | Content digest involved, empty if none |
//! | `prev_entry_sha256` | SHA-256 of the previous JSONL line (chain link) |
//! | `detail` | Optional free text |
//!
//! The first entry links to `000...000` (64 zeros).

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::backup::digest_bytes;

const AUDIT_FILENAME: &str = "audit.jsonl";

/// Chain link for the first entry (no predecessor).
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub ts: String,
    pub action: AuditAction,
    /// Path or command text the event is about.
    pub subject: String,
    pub content_sha256: String,
    pub prev_entry_sha256: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    BackupCreated,
    /// Nothing to back up, or the backup failed.
    BackupSkipped,
    Restored,
    RestoreFailed,
    /// A stored or staged copy did not match its recorded digest.
    IntegrityMismatch,
    PathDenied,
    CommandBlocked,
    CommandExecuted,
    CommandTimedOut,
    /// Previous entry corrupted, new chain segment started.
    ChainRecovery,
}

/// Append an entry, linking it to the last line of the log.
///
/// If the last line is not a valid entry, a `ChainRecovery` entry is
/// written first to mark the break.
pub fn append_audit_entry(
    logs_dir: &Path,
    action: AuditAction,
    subject: &str,
    content_sha256: &str,
    detail: Option<&str>,
) -> Result<()> {
    let path = audit_file_path(logs_dir);

    let prev_hash = match last_line(&path)? {
        Some(line) if serde_json::from_str::<AuditEntry>(&line).is_ok() => line_hash(&line),
        Some(line) => {
            let recovery = AuditEntry {
                ts: chrono::Utc::now().to_rfc3339(),
                action: AuditAction::ChainRecovery,
                subject: path.display().to_string(),
                content_sha256: String::new(),
                prev_entry_sha256: line_hash(&line),
                detail: Some(format!(
                    "Previous entry corrupted ({} bytes), new chain segment",
                    line.len()
                )),
            };
            let recovery_json =
                serde_json::to_string(&recovery).context("Failed to serialize recovery entry")?;
            append_line(&path, &recovery_json)?;
            line_hash(&recovery_json)
        }
        None => GENESIS_HASH.to_string(),
    };

    let entry = AuditEntry {
        ts: chrono::Utc::now().to_rfc3339(),
        action,
        subject: subject.to_string(),
        content_sha256: content_sha256.to_string(),
        prev_entry_sha256: prev_hash,
        detail: detail.map(str::to_string),
    };

    let json = serde_json::to_string(&entry).context("Failed to serialize audit entry")?;
    append_line(&path, &json)
}

fn last_line(path: &Path) -> Result<Option<String>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path).context("Failed to read audit log")?;
    Ok(content
        .lines()
        .rev()
        .find(|l| !l.is_empty())
        .map(str::to_string))
}

fn append_line(path: &Path, line: &str) -> Result<()> {
    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .context("Failed to open audit log")?;
    writeln!(file, "{}", line).context("Failed to write audit entry")?;
    Ok(())
}

/// All parseable entries. Corrupted lines are skipped; a missing log is empty.
pub fn read_audit_log(logs_dir: &Path) -> Result<Vec<AuditEntry>> {
    let path = audit_file_path(logs_dir);
    if !path.exists() {
        return Ok(Vec::new());
    }

    let content = fs::read_to_string(&path).context("Failed to read audit log")?;
    Ok(content
        .lines()
        .filter(|l| !l.is_empty())
        .filter_map(|l| serde_json::from_str::<AuditEntry>(l).ok())
        .collect())
}

/// Line indices where the chain is broken. Empty means intact.
///
/// Corrupted (non-JSON) lines are reported as broken.
pub fn verify_audit_chain(logs_dir: &Path) -> Result<Vec<usize>> {
    let path = audit_file_path(logs_dir);
    if !path.exists() {
        return Ok(Vec::new());
    }

    let content = fs::read_to_string(&path).context("Failed to read audit log")?;
    let lines: Vec<&str> = content.lines().filter(|l| !l.is_empty()).collect();

    let mut broken = Vec::new();
    for (i, line) in lines.iter().enumerate() {
        let expected = if i == 0 {
            GENESIS_HASH.to_string()
        } else {
            line_hash(lines[i - 1])
        };
        match serde_json::from_str::<AuditEntry>(line) {
            Ok(entry) if entry.prev_entry_sha256 == expected => {}
            _ => broken.push(i),
        }
    }

    Ok(broken)
}

pub fn audit_file_path(logs_dir: &Path) -> PathBuf {
    logs_dir.join(AUDIT_FILENAME)
}

fn line_hash(line: &str) -> String {
    digest_bytes(line.as_bytes()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn append(dir: &Path, action: AuditAction, subject: &str) {
        append_audit_entry(dir, action, subject, "", None).unwrap();
    }

    #[test]
    fn audit_chain_integrity() {
        let tmp = tempfile::tempdir().unwrap();

        for i in 0..5 {
            append_audit_entry(
                tmp.path(),
                AuditAction::BackupCreated,
                &format!("/home/u/.rc{}", i),
                &format!("sha256_{}", i),
                None,
            )
            .unwrap();
        }

        assert_eq!(read_audit_log(tmp.path()).unwrap().len(), 5);
        let broken = verify_audit_chain(tmp.path()).unwrap();
        assert!(broken.is_empty(), "Chain should be intact: {:?}", broken);
    }

    #[test]
    fn first_entry_uses_genesis_hash() {
        let tmp = tempfile::tempdir().unwrap();
        append(tmp.path(), AuditAction::CommandBlocked, "rm -rf /");

        let entries = read_audit_log(tmp.path()).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].prev_entry_sha256, GENESIS_HASH);
        assert_eq!(entries[0].action, AuditAction::CommandBlocked);
        assert_eq!(entries[0].subject, "rm -rf /");
    }

    #[test]
    fn edited_entry_breaks_the_next_link() {
        let tmp = tempfile::tempdir().unwrap();
        for i in 0..3 {
            append_audit_entry(
                tmp.path(),
                AuditAction::Restored,
                "/home/u/.bashrc",
                &format!("sha256_{}", i),
                None,
            )
            .unwrap();
        }

        let path = audit_file_path(tmp.path());
        let content = fs::read_to_string(&path).unwrap();
        let mut lines: Vec<&str> = content.lines().collect();
        let tampered = lines[1].replace("sha256_1", "sha256_x");
        lines[1] = &tampered;
        fs::write(&path, lines.join("\n") + "\n").unwrap();

        let broken = verify_audit_chain(tmp.path()).unwrap();
        assert_eq!(broken, vec![2]);
    }

    #[test]
    fn empty_log_no_errors() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(read_audit_log(tmp.path()).unwrap().is_empty());
        assert!(verify_audit_chain(tmp.path()).unwrap().is_empty());
    }

    #[test]
    fn actions_serialize_snake_case() {
        let entry = AuditEntry {
            ts: "2026-02-09T14:00:00Z".to_string(),
            action: AuditAction::CommandTimedOut,
            subject: "sleep 100".to_string(),
            content_sha256: String::new(),
            prev_entry_sha256: GENESIS_HASH.to_string(),
            detail: None,
        };

        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains("\"command_timed_out\""));
        assert!(!json.contains("\"detail\""));
    }

    #[test]
    fn chain_recovery_on_corrupted_line() {
        let tmp = tempfile::tempdir().unwrap();
        append(tmp.path(), AuditAction::BackupCreated, "/a");
        append(tmp.path(), AuditAction::Restored, "/a");

        let path = audit_file_path(tmp.path());
        let mut content = fs::read_to_string(&path).unwrap();
        content.push_str("this is not json\n");
        fs::write(&path, &content).unwrap();

        append(tmp.path(), AuditAction::PathDenied, "/etc/shadow");

        let entries = read_audit_log(tmp.path()).unwrap();
        // BackupCreated, Restored, ChainRecovery, PathDenied (garbage skipped)
        assert_eq!(entries.len(), 4);
        assert_eq!(entries[2].action, AuditAction::ChainRecovery);
        assert!(entries[2].detail.as_ref().unwrap().contains("corrupted"));

        // Only the garbage line itself is reported
        assert_eq!(verify_audit_chain(tmp.path()).unwrap(), vec![2]);
    }
}
