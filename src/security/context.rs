//! Process-lifetime security context.
//!
//! Built once at startup and shared as `Arc<SecurityContext>`. There is no
//! mutation API: every policy check and sandbox run in the process reads the
//! same values.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::command_policy::{CommandPolicy, DEFAULT_RESTRICTED_PATTERNS};
use super::path_policy::PathPolicy;
use crate::config::Config;

/// Mode for every directory the subsystem creates.
pub const DIRECTORY_MODE: u32 = 0o700;

/// Environment variables carried into sandboxed commands, when set.
pub const FORWARDED_ENV_VARS: &[&str] = &[
    "HOME", "USER", "SHELL", "PATH", "TERM", "LANG", "LC_ALL", "EDITOR", "VISUAL", "DISPLAY",
];

/// `PATH` handed to sandboxed commands, in order. Entries that do not exist are left out.
pub const SAFE_PATH_DIRS: &[&str] = &[
    "/usr/local/bin",
    "/usr/bin",
    "/bin",
    "/usr/local/sbin",
    "/usr/sbin",
    "/sbin",
];

#[derive(Debug, Clone)]
pub struct SecurityContext {
    user: String,
    group: String,
    directory_mode: u32,
    environment: BTreeMap<String, String>,
    path_policy: PathPolicy,
    command_policy: CommandPolicy,
}

impl SecurityContext {
    pub fn builder() -> SecurityContextBuilder {
        SecurityContextBuilder::default()
    }

    /// Context for this process: real environment, roots derived from `config`.
    pub fn from_config(config: &Config) -> Self {
        Self::from_config_with_env(config, |key| std::env::var(key))
    }

    /// Like [`from_config`](Self::from_config) with a custom env lookup (for testing).
    pub fn from_config_with_env<F>(config: &Config, env_fn: F) -> Self
    where
        F: Fn(&str) -> std::result::Result<String, std::env::VarError>,
    {
        let mut builder = Self::builder();

        for key in FORWARDED_ENV_VARS {
            if let Ok(value) = env_fn(key) {
                builder = builder.env(key, value);
            }
        }

        let home = env_fn("HOME")
            .ok()
            .filter(|h| !h.is_empty())
            .map(PathBuf::from)
            .or_else(|| directories::BaseDirs::new().map(|dirs| dirs.home_dir().to_path_buf()));
        if let Some(home) = home {
            builder = builder.allow_root(home);
        }

        let paths = &config.paths;
        builder
            .allow_root(&paths.config_dir)
            .allow_root(&paths.data_dir)
            .allow_root(&paths.state_dir)
            .allow_root(&paths.backup_root)
            .allow_root(std::env::temp_dir())
            .allow_root("/tmp")
            .allow_root("/var/tmp")
            .allow_roots(config.extra_allowed_roots())
            .build()
    }

    /// Name of the user the process runs as.
    pub fn user(&self) -> &str {
        &self.user
    }

    /// Name of the process's primary group.
    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn directory_mode(&self) -> u32 {
        self.directory_mode
    }

    /// Allow-listed environment for sandboxed commands, `PATH` already pinned.
    pub fn environment(&self) -> &BTreeMap<String, String> {
        &self.environment
    }

    /// Canonical allowed roots.
    pub fn allowed_roots(&self) -> &[PathBuf] {
        self.path_policy.roots()
    }

    /// Lower-cased deny patterns.
    pub fn restricted_patterns(&self) -> &[String] {
        self.command_policy.patterns()
    }

    pub fn path_policy(&self) -> &PathPolicy {
        &self.path_policy
    }

    pub fn command_policy(&self) -> &CommandPolicy {
        &self.command_policy
    }
}

#[derive(Debug, Default)]
pub struct SecurityContextBuilder {
    user: Option<String>,
    group: Option<String>,
    environment: BTreeMap<String, String>,
    roots: Vec<PathBuf>,
    patterns: Option<Vec<String>>,
}

impl SecurityContextBuilder {
    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    /// Add an environment variable. Keys outside the forwarded set are ignored.
    pub fn env(mut self, key: &str, value: impl Into<String>) -> Self {
        if FORWARDED_ENV_VARS.contains(&key) {
            self.environment.insert(key.to_string(), value.into());
        } else {
            debug!("Not forwarding environment variable {}", key);
        }
        self
    }

    pub fn allow_root(mut self, root: impl AsRef<Path>) -> Self {
        self.roots.push(root.as_ref().to_path_buf());
        self
    }

    pub fn allow_roots<I>(mut self, roots: I) -> Self
    where
        I: IntoIterator<Item = PathBuf>,
    {
        self.roots.extend(roots);
        self
    }

    /// Replace the default deny patterns.
    pub fn restricted_patterns<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.patterns = Some(patterns.into_iter().map(Into::into).collect());
        self
    }

    pub fn build(self) -> SecurityContext {
        let mut environment = self.environment;
        environment.insert("PATH".to_string(), safe_path());

        let command_policy = match self.patterns {
            Some(patterns) => CommandPolicy::new(patterns),
            None => CommandPolicy::new(DEFAULT_RESTRICTED_PATTERNS.iter().copied()),
        };

        SecurityContext {
            user: self.user.unwrap_or_else(current_user),
            group: self.group.unwrap_or_else(current_group),
            directory_mode: DIRECTORY_MODE,
            environment,
            path_policy: PathPolicy::new(self.roots),
            command_policy,
        }
    }
}

/// The fixed `PATH`, restricted to directories present on this system.
pub fn safe_path() -> String {
    SAFE_PATH_DIRS
        .iter()
        .filter(|dir| Path::new(dir).is_dir())
        .copied()
        .collect::<Vec<_>>()
        .join(":")
}

fn current_user() -> String {
    #[cfg(unix)]
    {
        use nix::unistd::{User, geteuid};
        let uid = geteuid();
        match User::from_uid(uid) {
            Ok(Some(user)) => user.name,
            _ => uid.to_string(),
        }
    }
    #[cfg(not(unix))]
    {
        std::env::var("USERNAME").unwrap_or_default()
    }
}

fn current_group() -> String {
    #[cfg(unix)]
    {
        use nix::unistd::{Group, getegid};
        let gid = getegid();
        match Group::from_gid(gid) {
            Ok(Some(group)) => group.name,
            _ => gid.to_string(),
        }
    }
    #[cfg(not(unix))]
    {
        String::new()
    }
}
