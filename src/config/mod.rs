use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use crate::paths::Paths;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Resolved XDG-compliant paths (not serialized)
    #[serde(skip)]
    pub paths: Paths,

    /// Explicit config file (`--config`), replacing config_dir/config.toml
    #[serde(skip)]
    pub source: Option<PathBuf>,

    #[serde(default)]
    pub backup: BackupConfig,

    #[serde(default)]
    pub sandbox: SandboxConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackupConfig {
    /// Backup store root. Overrides the XDG default (data_dir/backups)
    /// unless CONFGUARD_BACKUP_DIR is set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxConfig {
    /// Allow sandboxed command execution at all (default: true)
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Kill sandboxed commands after this many seconds (0 = no limit, default: 120)
    #[serde(default = "default_sandbox_timeout")]
    pub timeout_secs: u64,

    /// Additional allowed path roots on top of home, tool dirs, and temp dirs
    #[serde(default)]
    pub allow_paths: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file. Empty means state_dir/logs/confguard.log.
    #[serde(default)]
    pub file: String,
}

fn default_true() -> bool {
    true
}
fn default_sandbox_timeout() -> u64 {
    120
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            timeout_secs: default_sandbox_timeout(),
            allow_paths: Vec::new(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: String::new(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let paths = Paths::resolve()?;
        Self::load_from(paths)
    }

    /// Load from an explicit file when given, else the default location.
    ///
    /// An explicit file must already exist.
    pub fn load_with_override(file: Option<&str>) -> Result<Self> {
        let Some(file) = file else {
            return Self::load();
        };

        let path = PathBuf::from(shellexpand::tilde(file).to_string());
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let mut config: Config = toml::from_str(&content)?;

        let paths = Paths::resolve()?;
        paths.ensure_dirs()?;
        config.paths = paths;
        config.source = Some(path);
        config.apply_overrides();

        Ok(config)
    }

    /// Load with already-resolved paths. Creates a commented template on first run.
    pub fn load_from(paths: Paths) -> Result<Self> {
        paths.ensure_dirs()?;
        let path = paths.config_file();

        if !path.exists() {
            let mut config = Config {
                paths,
                ..Config::default()
            };
            config.save_with_template()?;
            config.apply_overrides();
            return Ok(config);
        }

        let content = fs::read_to_string(&path)?;
        let mut config: Config = toml::from_str(&content)?;
        config.paths = paths;
        config.apply_overrides();

        Ok(config)
    }

    /// Apply `backup.dir` unless the environment already pinned the backup root.
    fn apply_overrides(&mut self) {
        if std::env::var("CONFGUARD_BACKUP_DIR").is_ok() {
            return;
        }
        if let Some(ref dir) = self.backup.dir {
            let expanded = PathBuf::from(shellexpand::tilde(dir).to_string());
            if expanded.is_absolute() {
                self.paths.backup_root = expanded;
            }
        }
    }

    /// The file this config is read from and saved to.
    pub fn file(&self) -> PathBuf {
        self.source
            .clone()
            .unwrap_or_else(|| self.paths.config_file())
    }

    pub fn save(&self) -> Result<()> {
        let path = self.file();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        fs::write(&path, content)?;

        Ok(())
    }

    /// Save config with a helpful template (for first-time setup)
    pub fn save_with_template(&self) -> Result<()> {
        let path = self.file();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        fs::write(&path, DEFAULT_CONFIG_TEMPLATE)?;
        tracing::info!("Created default config at {}", path.display());

        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let paths = Paths::resolve()?;
        Ok(paths.config_file())
    }

    /// Backup store root after env and config overrides.
    pub fn backup_root(&self) -> PathBuf {
        self.paths.backup_root.clone()
    }

    /// Resolved log file path.
    pub fn log_file(&self) -> PathBuf {
        if self.logging.file.is_empty() {
            self.paths.log_file()
        } else {
            PathBuf::from(shellexpand::tilde(&self.logging.file).to_string())
        }
    }

    /// Extra allowed roots from config, with `~` expanded.
    pub fn extra_allowed_roots(&self) -> Vec<PathBuf> {
        self.sandbox
            .allow_paths
            .iter()
            .map(|p| PathBuf::from(shellexpand::tilde(p).to_string()))
            .collect()
    }

    pub fn get_value(&self, key: &str) -> Result<String> {
        let parts: Vec<&str> = key.split('.').collect();

        match parts.as_slice() {
            ["backup", "dir"] => Ok(self
                .backup
                .dir
                .clone()
                .unwrap_or_else(|| self.paths.backup_root.display().to_string())),
            ["sandbox", "enabled"] => Ok(self.sandbox.enabled.to_string()),
            ["sandbox", "timeout_secs"] => Ok(self.sandbox.timeout_secs.to_string()),
            ["sandbox", "allow_paths"] => Ok(self.sandbox.allow_paths.join(",")),
            ["logging", "level"] => Ok(self.logging.level.clone()),
            ["logging", "file"] => Ok(self.log_file().display().to_string()),
            _ => anyhow::bail!("Unknown config key: {}", key),
        }
    }

    pub fn set_value(&mut self, key: &str, value: &str) -> Result<()> {
        let parts: Vec<&str> = key.split('.').collect();

        match parts.as_slice() {
            ["backup", "dir"] => self.backup.dir = Some(value.to_string()),
            ["sandbox", "enabled"] => self.sandbox.enabled = value.parse()?,
            ["sandbox", "timeout_secs"] => self.sandbox.timeout_secs = value.parse()?,
            ["sandbox", "allow_paths"] => {
                self.sandbox.allow_paths = value
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            }
            ["logging", "level"] => self.logging.level = value.to_string(),
            ["logging", "file"] => self.logging.file = value.to_string(),
            _ => anyhow::bail!("Unknown config key: {}", key),
        }

        Ok(())
    }
}

/// Default config template with helpful comments (used for first-time setup)
pub const DEFAULT_CONFIG_TEMPLATE: &str = r#"# confguard configuration
# Auto-created on first run. Edit as needed.

[backup]
# Backup store root (shell_configs/, system_configs/, logs/ live here).
# Default: XDG data dir (~/.local/share/confguard/backups)
# Override with CONFGUARD_BACKUP_DIR=/path/to/backups
# dir = "~/.local/share/confguard/backups"

[sandbox]
enabled = true
# Kill sandboxed commands after this many seconds (0 = no limit)
timeout_secs = 120
# Additional allowed path roots (home, tool dirs, and temp dirs are always allowed)
# allow_paths = ["/srv/dotfiles"]

[logging]
level = "info"
# file = "~/.local/state/confguard/logs/confguard.log"
"#;
