use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::path::{Path, PathBuf};

use super::hasher::ContentHash;

/// Which category directory a backup is filed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackupCategory {
    ShellConfig,
    SystemConfig,
}

impl BackupCategory {
    pub const ALL: [BackupCategory; 2] =
        [BackupCategory::ShellConfig, BackupCategory::SystemConfig];

    /// Directory name under the backup root.
    pub fn dir_name(self) -> &'static str {
        match self {
            BackupCategory::ShellConfig => "shell_configs",
            BackupCategory::SystemConfig => "system_configs",
        }
    }

    /// Guess a category from the file name: rc and profile files are shell config.
    pub fn infer(path: &Path) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        if name.contains("rc") || name.contains("profile") {
            BackupCategory::ShellConfig
        } else {
            BackupCategory::SystemConfig
        }
    }
}

impl std::str::FromStr for BackupCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "shell" | "shell_config" | "shell_configs" => Ok(BackupCategory::ShellConfig),
            "system" | "system_config" | "system_configs" => Ok(BackupCategory::SystemConfig),
            other => Err(format!("unknown backup category '{}' (shell|system)", other)),
        }
    }
}

/// Unix permission bits (`0o644`), serialized as three octal digits (`"644"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PermissionBits(u32);

impl PermissionBits {
    pub fn from_mode(mode: u32) -> Self {
        Self(mode & 0o777)
    }

    pub fn mode(self) -> u32 {
        self.0
    }
}

impl fmt::Display for PermissionBits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:03o}", self.0)
    }
}

impl Serialize for PermissionBits {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for PermissionBits {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        u32::from_str_radix(raw.trim(), 8)
            .ok()
            .filter(|mode| *mode <= 0o777)
            .map(PermissionBits)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid permission bits '{}'", raw)))
    }
}

/// Metadata describing one snapshot of a file.
///
/// Written once as a `.meta` sidecar next to the `.bak` copy and never
/// rewritten. Unknown sidecar fields are ignored on load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupRecord {
    /// Canonical absolute path of the file that was backed up.
    pub original_path: PathBuf,
    pub category: BackupCategory,
    /// Local wall-clock time, `YYYYMMDD_HHMMSS`.
    pub timestamp: String,
    /// SHA-256 of the backed-up bytes.
    pub content_hash: ContentHash,
    pub permissions: PermissionBits,
    /// Owner user name at backup time (numeric uid when it has no name).
    pub owner: String,
    pub backup_path: PathBuf,
    /// Bytes copied.
    pub size: u64,
    /// Disambiguates backups of the same file taken within one second.
    #[serde(default)]
    pub sequence: u32,
}

impl BackupRecord {
    /// Sidecar location for a backup file: same stem, `.meta` extension.
    pub fn sidecar_path(backup_path: &Path) -> PathBuf {
        backup_path.with_extension("meta")
    }

    /// Ordering key for "most recent first" listings.
    pub(crate) fn recency_key(&self) -> (&str, u32) {
        (self.timestamp.as_str(), self.sequence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::hasher::digest_bytes;

    fn sample() -> BackupRecord {
        BackupRecord {
            original_path: PathBuf::from("/home/u/.bashrc"),
            category: BackupCategory::ShellConfig,
            timestamp: "20260101_120000".into(),
            content_hash: digest_bytes(b"export X=1"),
            permissions: PermissionBits::from_mode(0o100644),
            owner: "u".into(),
            backup_path: PathBuf::from("/b/shell_configs/.bashrc_20260101_120000.bak"),
            size: 10,
            sequence: 0,
        }
    }

    #[test]
    fn permissions_serialize_as_three_octal_digits() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["permissions"], "644");
        assert_eq!(json["category"], "shell_config");

        assert_eq!(PermissionBits::from_mode(0o600).to_string(), "600");
        assert_eq!(PermissionBits::from_mode(0o7).to_string(), "007");
    }

    #[test]
    fn invalid_permissions_rejected() {
        let mut json = serde_json::to_value(sample()).unwrap();
        json["permissions"] = "999".into();
        assert!(serde_json::from_value::<BackupRecord>(json).is_err());
    }

    #[test]
    fn sidecars_tolerate_unknown_and_missing_optional_fields() {
        let mut json = serde_json::to_value(sample()).unwrap();
        let obj = json.as_object_mut().unwrap();
        obj.remove("sequence");
        obj.insert("written_by".into(), "a future version".into());

        let record: BackupRecord = serde_json::from_value(json).unwrap();
        assert_eq!(record.sequence, 0);
        assert_eq!(record.content_hash, sample().content_hash);
    }

    #[test]
    fn sidecar_path_swaps_extension() {
        let path = Path::new("/b/shell_configs/.bashrc_20260101_120000.bak");
        assert_eq!(
            BackupRecord::sidecar_path(path),
            PathBuf::from("/b/shell_configs/.bashrc_20260101_120000.meta")
        );
    }

    #[test]
    fn category_inference_and_parsing() {
        assert_eq!(
            BackupCategory::infer(Path::new("/home/u/.zshrc")),
            BackupCategory::ShellConfig
        );
        assert_eq!(
            BackupCategory::infer(Path::new("/home/u/.bash_profile")),
            BackupCategory::ShellConfig
        );
        assert_eq!(
            BackupCategory::infer(Path::new("/home/u/.gitconfig")),
            BackupCategory::SystemConfig
        );
        assert_eq!(
            "shell".parse::<BackupCategory>().unwrap(),
            BackupCategory::ShellConfig
        );
        assert_eq!(
            "System".parse::<BackupCategory>().unwrap(),
            BackupCategory::SystemConfig
        );
        assert!("theme".parse::<BackupCategory>().is_err());
    }
}
