pub mod audit;
pub mod backup;
pub mod check;
pub mod config;
pub mod paths;
pub mod sandbox;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::sync::Arc;

use crate::backup::BackupCatalog;
use crate::config::Config;
use crate::security::{SecurityContext, SecurityManager};

#[derive(Parser)]
#[command(name = "confguard")]
#[command(
    author,
    version,
    about = "Verified backups, atomic restore and sandboxed commands for shell configuration"
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file
    #[arg(short, long, global = true, env = "CONFGUARD_CONFIG")]
    pub config: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Back up a file before changing it
    Backup(backup::BackupArgs),

    /// List backups, most recent first
    List(backup::ListArgs),

    /// Restore a file from its latest (or a chosen) backup
    Restore(backup::RestoreArgs),

    /// Check files against their latest backup
    Verify(backup::VerifyArgs),

    /// Run a command in the sandbox
    Run(sandbox::RunArgs),

    /// Test a path or command against the security policies
    Check(check::CheckArgs),

    /// Show the security audit log
    Audit(audit::AuditArgs),

    /// Show resolved XDG directory paths
    Paths,

    /// Configuration management
    Config(config::ConfigArgs),
}

/// Build the security manager for this process from `config`.
pub fn open_manager(config: &Config) -> Result<SecurityManager> {
    let root = config.backup_root();
    // The backup root must exist before the context resolves its allowed roots
    BackupCatalog::open(&root)?;
    let ctx = Arc::new(SecurityContext::from_config(config));
    Ok(SecurityManager::new(ctx, root)?)
}
