//! CLI subcommand: `confguard check path|command`

use anyhow::Result;
use clap::{Args, Subcommand};
use std::path::PathBuf;

use super::open_manager;
use crate::config::Config;

#[derive(Args)]
pub struct CheckArgs {
    #[command(subcommand)]
    pub command: CheckCommands,
}

#[derive(Subcommand)]
pub enum CheckCommands {
    /// Is this path inside the allowed roots?
    Path { path: PathBuf },

    /// Would this command pass the deny list?
    Command {
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },

    /// Show the allowed roots and restricted patterns
    Policy,
}

pub fn run(args: CheckArgs, config: &Config) -> Result<()> {
    let manager = open_manager(config)?;
    let ctx = manager.context();

    match args.command {
        CheckCommands::Path { path } => {
            let resolved = manager.check_path(&path)?;
            println!("allowed: {}", resolved.display());
        }
        CheckCommands::Command { command } => {
            let command = command.join(" ");
            ctx.command_policy().check(&command)?;
            println!("allowed: {}", command);
        }
        CheckCommands::Policy => {
            println!("User:       {} (group {})", ctx.user(), ctx.group());
            println!();
            println!("Allowed roots:");
            for root in ctx.allowed_roots() {
                println!("  {}", root.display());
            }
            println!();
            println!("Restricted patterns:");
            for pattern in ctx.restricted_patterns() {
                println!("  {}", pattern);
            }
            println!();
            println!("Sandbox environment:");
            for (key, value) in ctx.environment() {
                println!("  {}={}", key, value);
            }
        }
    }
    Ok(())
}
