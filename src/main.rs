use anyhow::Result;
use clap::Parser;
use std::fs::OpenOptions;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use confguard::Config;
use confguard::cli::{self, Cli, Commands};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // `config` subcommands must work even when the config file is broken
    let command = match cli.command {
        Commands::Config(args) => return cli::config::run(args, cli.config.as_deref()),
        other => other,
    };

    let config = Config::load_with_override(cli.config.as_deref())?;
    init_logging(&config, cli.verbose);

    let result = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async_main(command, &config, cli.config.as_deref()));

    if let Err(ref e) = result
        && let Some(err) = e.downcast_ref::<confguard::Error>()
        && err.is_security()
    {
        eprintln!("confguard: denied: {}", err);
        std::process::exit(2);
    }
    result
}

async fn async_main(command: Commands, config: &Config, config_file: Option<&str>) -> Result<()> {
    match command {
        Commands::Backup(args) => cli::backup::run_backup(args, config),
        Commands::List(args) => cli::backup::run_list(args, config),
        Commands::Restore(args) => cli::backup::run_restore(args, config),
        Commands::Verify(args) => cli::backup::run_verify(args, config),
        Commands::Run(args) => cli::sandbox::run(args, config).await,
        Commands::Check(args) => cli::check::run(args, config),
        Commands::Audit(args) => cli::audit::run(args, config),
        Commands::Paths => cli::paths::run(config),
        Commands::Config(args) => cli::config::run(args, config_file),
    }
}

/// Console logging to stderr plus a plain-text copy appended to the log file.
fn init_logging(config: &Config, verbose: bool) {
    let level = if verbose {
        "debug"
    } else {
        config.logging.level.as_str()
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let log_file = config.log_file();
    let file_layer = log_file
        .parent()
        .map(std::fs::create_dir_all)
        .transpose()
        .and_then(|_| OpenOptions::new().create(true).append(true).open(&log_file))
        .map(|file| {
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(file))
        });

    let registry = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr));

    match file_layer {
        Ok(layer) => registry.with(layer).init(),
        Err(e) => {
            registry.init();
            tracing::warn!("Logging to {} disabled: {}", log_file.display(), e);
        }
    }
}
