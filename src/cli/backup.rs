//! CLI subcommands: `confguard backup|list|restore|verify`

use anyhow::Result;
use clap::Args;
use std::path::{Path, PathBuf};

use super::open_manager;
use crate::backup::{BackupCategory, BackupRecord};
use crate::concurrency::PathLock;
use crate::config::Config;

#[derive(Args)]
pub struct BackupArgs {
    /// File to back up
    pub path: PathBuf,

    /// Category: shell or system (default: inferred from the file name)
    #[arg(short, long)]
    pub category: Option<BackupCategory>,
}

#[derive(Args)]
pub struct ListArgs {
    /// Only list backups of this file
    pub path: Option<PathBuf>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args)]
pub struct RestoreArgs {
    /// File to restore
    pub path: PathBuf,

    /// Restore from this backup file instead of the latest
    #[arg(long, value_name = "BACKUP_PATH")]
    pub from: Option<PathBuf>,
}

#[derive(Args)]
pub struct VerifyArgs {
    /// Files to check
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,
}

pub fn run_backup(args: BackupArgs, config: &Config) -> Result<()> {
    let manager = open_manager(config)?;
    let category = args
        .category
        .unwrap_or_else(|| BackupCategory::infer(&args.path));

    let lock = PathLock::for_path(&config.paths.locks_dir(), &args.path)?;
    let _guard = lock.acquire()?;

    let record = manager.try_create_backup(&args.path, category)?;
    println!("Backed up {}", record.original_path.display());
    println!("  backup:  {}", record.backup_path.display());
    println!("  sha256:  {}", record.content_hash);
    println!("  mode:    {}  owner: {}", record.permissions, record.owner);
    Ok(())
}

pub fn run_list(args: ListArgs, config: &Config) -> Result<()> {
    let manager = open_manager(config)?;
    let records = manager.list_backups(args.path.as_deref());

    if args.json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    if records.is_empty() {
        println!("No backups.");
        return Ok(());
    }

    println!("Backups ({}, most recent first):", records.len());
    println!();
    for record in &records {
        println!(
            "  {}  {}  {} bytes  sha256:{}",
            display_timestamp(record),
            record.original_path.display(),
            record.size,
            short_hash(record),
        );
        println!("      {}", record.backup_path.display());
    }
    Ok(())
}

pub fn run_restore(args: RestoreArgs, config: &Config) -> Result<()> {
    let manager = open_manager(config)?;

    let record = match args.from {
        Some(ref from) => Some(find_record(&manager.list_backups(Some(&args.path)), from)?),
        None => None,
    };

    let lock = PathLock::for_path(&config.paths.locks_dir(), &args.path)?;
    let _guard = lock.acquire()?;

    let outcome = manager.try_restore(&args.path, record.as_ref())?;
    println!(
        "Restored {} from {}",
        outcome.target.display(),
        outcome.record.backup_path.display()
    );
    if !outcome.ownership_restored {
        println!("  (ownership unchanged: not running as root)");
    }
    Ok(())
}

pub fn run_verify(args: VerifyArgs, config: &Config) -> Result<()> {
    let manager = open_manager(config)?;
    let mut modified = 0;

    for path in &args.paths {
        let status = if manager.catalog().latest_backup(path).is_none() {
            "untracked"
        } else if manager.verify_file_integrity(path) {
            "ok"
        } else {
            modified += 1;
            "MODIFIED"
        };
        println!("  {:<10} {}", status, path.display());
    }

    if modified > 0 {
        anyhow::bail!("{} file(s) differ from their latest backup", modified);
    }
    Ok(())
}

fn find_record(records: &[BackupRecord], from: &Path) -> Result<BackupRecord> {
    let wanted = from.canonicalize().unwrap_or_else(|_| from.to_path_buf());
    records
        .iter()
        .find(|r| {
            r.backup_path == wanted
                || r.backup_path.file_name().is_some_and(|name| name == from.as_os_str())
        })
        .cloned()
        .ok_or_else(|| anyhow::anyhow!("{} is not a backup of this file", from.display()))
}

fn short_hash(record: &BackupRecord) -> &str {
    let hash = record.content_hash.as_str();
    hash.get(..16).unwrap_or(hash)
}

/// `20260115_090000` → `2026-01-15 09:00:00`
fn display_timestamp(record: &BackupRecord) -> String {
    chrono::NaiveDateTime::parse_from_str(&record.timestamp, "%Y%m%d_%H%M%S")
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|_| record.timestamp.clone())
}
