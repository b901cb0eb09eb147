//! CLI subcommand: `confguard paths`
//!
//! Prints all resolved XDG-compliant paths for debugging and scripting.

use anyhow::Result;

use crate::backup::BackupCategory;
use crate::config::Config;
use crate::security::audit_file_path;

pub fn run(config: &Config) -> Result<()> {
    let paths = &config.paths;
    let backup_root = config.backup_root();

    println!("confguard Paths (XDG Base Directory)");
    println!("====================================");
    println!();
    println!("Config:     {}", paths.config_dir.display());
    println!("  config file:    {}", config.file().display());
    println!();
    println!("Data:       {}", paths.data_dir.display());
    println!("  backup root:    {}", backup_root.display());
    for category in BackupCategory::ALL {
        println!(
            "  {:<15} {}",
            format!("{}:", category.dir_name()),
            backup_root.join(category.dir_name()).display()
        );
    }
    println!(
        "  audit log:      {}",
        audit_file_path(&backup_root.join("logs")).display()
    );
    println!();
    println!("State:      {}", paths.state_dir.display());
    println!("  log file:       {}", config.log_file().display());
    println!();
    println!("Cache:      {}", paths.cache_dir.display());
    println!();
    match paths.runtime_dir {
        Some(ref dir) => println!("Runtime:    {}", dir.display()),
        None => println!("Runtime:    (not available)"),
    }
    println!("  path locks:     {}", paths.locks_dir().display());

    Ok(())
}
