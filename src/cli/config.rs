use anyhow::Result;
use clap::{Args, Subcommand};

use crate::config::{Config, DEFAULT_CONFIG_TEMPLATE};

#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show current configuration
    Show {
        /// Output format: toml (default) or json
        #[arg(short, long, default_value = "toml")]
        format: String,
    },

    /// Get a configuration value
    Get {
        /// Config key (e.g., sandbox.timeout_secs)
        key: String,
    },

    /// Set a configuration value
    Set {
        /// Config key (e.g., sandbox.timeout_secs)
        key: String,

        /// Value to set
        value: String,
    },

    /// Show config file path
    Path,

    /// Initialize default config file
    Init {
        /// Overwrite existing config
        #[arg(short, long)]
        force: bool,
    },
}

pub fn run(args: ConfigArgs, config_file: Option<&str>) -> Result<()> {
    match args.command {
        ConfigCommands::Show { format } => show_config(config_file, &format),
        ConfigCommands::Get { key } => get_config(config_file, &key),
        ConfigCommands::Set { key, value } => set_config(config_file, &key, &value),
        ConfigCommands::Path => show_path(config_file),
        ConfigCommands::Init { force } => init_config(config_file, force),
    }
}

fn show_config(config_file: Option<&str>, format: &str) -> Result<()> {
    let config = Config::load_with_override(config_file)?;

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&config)?),
        _ => println!("{}", toml::to_string_pretty(&config)?),
    }

    Ok(())
}

fn get_config(config_file: Option<&str>, key: &str) -> Result<()> {
    let config = Config::load_with_override(config_file)?;
    println!("{}", config.get_value(key)?);
    Ok(())
}

fn set_config(config_file: Option<&str>, key: &str, value: &str) -> Result<()> {
    let mut config = Config::load_with_override(config_file)?;
    config.set_value(key, value)?;
    config.save()?;
    println!("Set {} = {}", key, value);
    Ok(())
}

fn show_path(config_file: Option<&str>) -> Result<()> {
    match config_file {
        Some(file) => println!("{}", shellexpand::tilde(file)),
        None => println!("{}", Config::config_path()?.display()),
    }
    Ok(())
}

fn init_config(config_file: Option<&str>, force: bool) -> Result<()> {
    let path = match config_file {
        Some(file) => std::path::PathBuf::from(shellexpand::tilde(file).to_string()),
        None => Config::config_path()?,
    };

    if path.exists() && !force {
        anyhow::bail!(
            "Config file already exists at {}. Use --force to overwrite.",
            path.display()
        );
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&path, DEFAULT_CONFIG_TEMPLATE)?;

    println!("Created config file at {}", path.display());
    Ok(())
}
