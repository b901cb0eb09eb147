//! CLI subcommand: `confguard audit`

use anyhow::Result;
use clap::Args;

use super::open_manager;
use crate::config::Config;

#[derive(Args)]
pub struct AuditArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// Only verify the hash chain
    #[arg(long)]
    pub verify: bool,

    /// Filter by action type (e.g., command_blocked, integrity_mismatch)
    #[arg(long)]
    pub filter: Option<String>,
}

pub fn run(args: AuditArgs, config: &Config) -> Result<()> {
    let manager = open_manager(config)?;
    let broken = manager.verify_audit_chain()?;

    if args.verify {
        if broken.is_empty() {
            println!("Audit chain intact.");
            return Ok(());
        }
        anyhow::bail!("Audit chain broken at line(s) {:?}", broken);
    }

    let mut entries = manager.audit_log()?;
    if let Some(ref wanted) = args.filter {
        entries.retain(|e| {
            serde_json::to_value(e.action)
                .ok()
                .and_then(|v| v.as_str().map(|s| s == wanted))
                .unwrap_or(false)
        });
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if entries.is_empty() {
        println!("No audit log entries.");
        return Ok(());
    }

    println!("Security Audit Log ({} entries):", entries.len());
    println!();
    for entry in &entries {
        let detail = entry
            .detail
            .as_deref()
            .map(|d| format!(" ({})", d))
            .unwrap_or_default();
        let sha = entry.content_sha256.get(..16).unwrap_or(&entry.content_sha256);
        if sha.is_empty() {
            println!("  {} {:?} {}{}", entry.ts, entry.action, entry.subject, detail);
        } else {
            println!(
                "  {} {:?} {} sha256:{}{}",
                entry.ts, entry.action, entry.subject, sha, detail
            );
        }
    }

    println!();
    if broken.is_empty() {
        println!("Chain integrity: OK");
    } else {
        println!("Chain integrity: BROKEN at line(s) {:?}", broken);
    }
    Ok(())
}
