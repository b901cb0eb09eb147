//! XDG Base Directory compliant path resolution.
//!
//! Every directory is resolved through a three-level fallback:
//! 1. confguard-specific env var (CONFGUARD_CONFIG_DIR, etc.)
//! 2. XDG env var (XDG_CONFIG_HOME, etc.) via `etcetera`
//! 3. Platform default (~/.config, etc.)
//!
//! All paths are absolute. Relative paths from env vars are ignored per XDG spec.

use anyhow::{Context, Result};
#[cfg(unix)]
use libc::getuid;
use std::path::{Path, PathBuf};

/// Resolved directory paths for the entire application.
///
/// Created once at startup, threaded through Config.
#[derive(Debug, Clone)]
pub struct Paths {
    /// Config directory: config.toml lives here
    pub config_dir: PathBuf,

    /// Data directory root: contains the default backup store
    pub data_dir: PathBuf,

    /// State directory: logs
    pub state_dir: PathBuf,

    /// Cache directory
    pub cache_dir: PathBuf,

    /// Backup store root: shell_configs/, system_configs/, logs/.
    /// May be overridden independently via CONFGUARD_BACKUP_DIR.
    pub backup_root: PathBuf,

    /// Runtime directory: advisory lock files.
    /// None if no suitable runtime directory is available.
    pub runtime_dir: Option<PathBuf>,
}

impl Paths {
    /// Resolve all paths using real environment variables.
    pub fn resolve() -> Result<Self> {
        Self::resolve_with_env(|key| std::env::var(key))
    }

    /// Resolve paths with a custom env var lookup (for testing).
    pub fn resolve_with_env<F>(env_fn: F) -> Result<Self>
    where
        F: Fn(&str) -> std::result::Result<String, std::env::VarError>,
    {
        use etcetera::BaseStrategy;

        let strategy = etcetera::choose_base_strategy()
            .map_err(|e| anyhow::anyhow!("Failed to determine base directories: {}", e))?;

        let config_dir = env_or(&env_fn, "CONFGUARD_CONFIG_DIR", || {
            strategy.config_dir().join("confguard")
        });

        let data_dir = env_or(&env_fn, "CONFGUARD_DATA_DIR", || {
            strategy.data_dir().join("confguard")
        });

        let state_dir = env_or(&env_fn, "CONFGUARD_STATE_DIR", || {
            let base_state = strategy.state_dir().unwrap_or_else(|| strategy.data_dir());
            base_state.join("confguard")
        });

        let cache_dir = env_or(&env_fn, "CONFGUARD_CACHE_DIR", || {
            strategy.cache_dir().join("confguard")
        });

        let backup_root = env_or(&env_fn, "CONFGUARD_BACKUP_DIR", || data_dir.join("backups"));

        let runtime_dir = resolve_runtime_dir(&env_fn);

        Ok(Self {
            config_dir,
            data_dir,
            state_dir,
            cache_dir,
            backup_root,
            runtime_dir,
        })
    }

    /// Config file: config_dir/config.toml
    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join("config.toml")
    }

    /// Logs directory
    pub fn logs_dir(&self) -> PathBuf {
        self.state_dir.join("logs")
    }

    /// Default log file: state_dir/logs/confguard.log
    pub fn log_file(&self) -> PathBuf {
        self.logs_dir().join("confguard.log")
    }

    /// Per-path lock files (in runtime_dir, falls back to state_dir)
    pub fn locks_dir(&self) -> PathBuf {
        self.runtime_dir
            .as_ref()
            .unwrap_or(&self.state_dir)
            .join("locks")
    }

    /// Create all directories with appropriate permissions.
    ///
    /// The backup root is left to `BackupCatalog::open`, which lays out its
    /// own subdirectories.
    pub fn ensure_dirs(&self) -> Result<()> {
        let dirs = [
            &self.config_dir,
            &self.data_dir,
            &self.state_dir,
            &self.cache_dir,
        ];

        for dir in &dirs {
            create_dir_with_mode(dir)?;
        }

        create_dir_with_mode(&self.logs_dir())?;

        if let Some(ref runtime) = self.runtime_dir {
            create_dir_with_mode(runtime)?;
        }

        Ok(())
    }
}

impl Default for Paths {
    fn default() -> Self {
        Self::resolve().unwrap_or_else(|_| {
            let home = etcetera::home_dir().unwrap_or_else(|_| PathBuf::from("."));
            let data_dir = home.join(".local").join("share").join("confguard");
            Self {
                config_dir: home.join(".config").join("confguard"),
                backup_root: data_dir.join("backups"),
                data_dir,
                state_dir: home.join(".local").join("state").join("confguard"),
                cache_dir: home.join(".cache").join("confguard"),
                runtime_dir: None,
            }
        })
    }
}

/// Resolve an env var with fallback. Ignores empty and relative paths per XDG spec.
fn env_or<F>(env_fn: &F, var: &str, default: impl FnOnce() -> PathBuf) -> PathBuf
where
    F: Fn(&str) -> std::result::Result<String, std::env::VarError>,
{
    env_fn(var)
        .ok()
        .filter(|v| !v.is_empty())
        .map(|v| PathBuf::from(shellexpand::tilde(&v).to_string()))
        .filter(|p| p.is_absolute())
        .unwrap_or_else(default)
}

fn resolve_runtime_dir<F>(env_fn: &F) -> Option<PathBuf>
where
    F: Fn(&str) -> std::result::Result<String, std::env::VarError>,
{
    if let Ok(dir) = env_fn("XDG_RUNTIME_DIR")
        && !dir.is_empty()
    {
        let path = PathBuf::from(&dir);
        if path.is_absolute() {
            return Some(path.join("confguard"));
        }
    }

    // Fallback: $TMPDIR/confguard-$UID on Unix
    #[cfg(unix)]
    {
        let uid = unsafe { getuid() };
        let tmpdir = env_fn("TMPDIR").unwrap_or_else(|_| "/tmp".to_string());
        Some(PathBuf::from(tmpdir).join(format!("confguard-{}", uid)))
    }

    #[cfg(not(unix))]
    {
        env_fn("TEMP").ok().map(|t| {
            let user = env_fn("USERNAME").unwrap_or_else(|_| "user".into());
            PathBuf::from(t).join(format!("confguard-{}", user))
        })
    }
}

/// Create a directory with mode 0700.
pub(crate) fn create_dir_with_mode(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path)
        .with_context(|| format!("Failed to create directory: {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))
            .with_context(|| format!("Failed to set permissions on {}", path.display()))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn make_env(
        map: HashMap<&str, &str>,
    ) -> impl Fn(&str) -> std::result::Result<String, std::env::VarError> {
        move |key: &str| {
            map.get(key)
                .map(|v| v.to_string())
                .ok_or(std::env::VarError::NotPresent)
        }
    }

    #[test]
    fn default_paths_are_xdg_compliant() {
        let paths = Paths::resolve_with_env(make_env(HashMap::new())).unwrap();

        assert!(paths.config_dir.ends_with("confguard"));
        assert!(paths.data_dir.ends_with("confguard"));
        assert!(paths.state_dir.ends_with("confguard"));
        assert!(paths.cache_dir.ends_with("confguard"));
        assert_eq!(paths.backup_root, paths.data_dir.join("backups"));
    }

    #[test]
    fn env_vars_override_xdg() {
        let mut env: HashMap<&str, &str> = HashMap::new();
        env.insert("CONFGUARD_CONFIG_DIR", "/custom/config");
        env.insert("CONFGUARD_DATA_DIR", "/custom/data");
        env.insert("CONFGUARD_STATE_DIR", "/custom/state");
        env.insert("CONFGUARD_CACHE_DIR", "/custom/cache");

        let paths = Paths::resolve_with_env(make_env(env)).unwrap();
        assert_eq!(paths.config_dir, PathBuf::from("/custom/config"));
        assert_eq!(paths.data_dir, PathBuf::from("/custom/data"));
        assert_eq!(paths.state_dir, PathBuf::from("/custom/state"));
        assert_eq!(paths.cache_dir, PathBuf::from("/custom/cache"));
        // Backup root follows the data dir unless overridden itself
        assert_eq!(paths.backup_root, PathBuf::from("/custom/data/backups"));
    }

    #[test]
    fn backup_dir_override_independent_of_data_dir() {
        let mut env: HashMap<&str, &str> = HashMap::new();
        env.insert("CONFGUARD_BACKUP_DIR", "/srv/backups");

        let paths = Paths::resolve_with_env(make_env(env)).unwrap();
        assert_eq!(paths.backup_root, PathBuf::from("/srv/backups"));
        assert!(paths.data_dir.ends_with("confguard"));
    }

    #[test]
    fn relative_and_empty_paths_are_ignored() {
        let mut env: HashMap<&str, &str> = HashMap::new();
        env.insert("CONFGUARD_CONFIG_DIR", "relative/path");
        env.insert("CONFGUARD_STATE_DIR", "");

        let paths = Paths::resolve_with_env(make_env(env)).unwrap();
        assert!(paths.config_dir.is_absolute());
        assert_ne!(paths.config_dir, PathBuf::from("relative/path"));
        assert!(paths.state_dir.is_absolute());
    }

    #[test]
    fn convenience_accessors() {
        let paths = Paths::resolve_with_env(make_env(HashMap::new())).unwrap();

        assert!(paths.config_file().ends_with("config.toml"));
        assert!(paths.logs_dir().ends_with("logs"));
        assert!(paths.log_file().ends_with("logs/confguard.log"));
        assert!(paths.locks_dir().ends_with("locks"));
    }

    #[cfg(unix)]
    #[test]
    fn ensure_dirs_creates_private_directories() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().to_path_buf();
        let paths = Paths {
            config_dir: root.join("config"),
            data_dir: root.join("data"),
            state_dir: root.join("state"),
            cache_dir: root.join("cache"),
            backup_root: root.join("data/backups"),
            runtime_dir: Some(root.join("run")),
        };
        paths.ensure_dirs().unwrap();

        for dir in [&paths.config_dir, &paths.state_dir, &paths.logs_dir()] {
            let mode = std::fs::metadata(dir).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o700, "{}", dir.display());
        }
    }
}
