//! CLI subcommand: `confguard run`

use anyhow::Result;
use clap::Args;
use std::io::Write;
use std::time::Duration;

use super::open_manager;
use crate::config::Config;

#[derive(Args)]
pub struct RunArgs {
    /// Kill the command after this many seconds (0 = no limit; default from config)
    #[arg(short, long)]
    pub timeout_secs: Option<u64>,

    /// Output the result as JSON
    #[arg(long)]
    pub json: bool,

    /// Command to run with /bin/sh -c
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,
}

pub async fn run(args: RunArgs, config: &Config) -> Result<()> {
    if !config.sandbox.enabled {
        anyhow::bail!("Sandboxed execution is disabled (sandbox.enabled = false)");
    }

    let manager = open_manager(config)?;
    let command = args.command.join(" ");
    let timeout = match args.timeout_secs.unwrap_or(config.sandbox.timeout_secs) {
        0 => None,
        secs => Some(Duration::from_secs(secs)),
    };

    let result = manager.run_sandboxed(&command, timeout).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print!("{}", result.stdout);
        eprint!("{}", result.stderr);
        std::io::stdout().flush()?;
    }

    if !result.success() {
        anyhow::bail!(
            "Command exited with status {} after {}ms",
            result.exit_code,
            result.duration_ms
        );
    }
    Ok(())
}
