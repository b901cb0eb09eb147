//! Deny list for command text handed to the sandbox.
//!
//! The check is a case-insensitive substring match. It is a textual filter,
//! not a parser: `echo mkfs` is refused (over-blocking) and `sudo  rm` with
//! two spaces is let through (under-blocking). Isolation does not rest on it
//! alone; the sandbox also strips the environment and confines the working
//! directory.

use crate::error::{Error, Result};

/// Substrings that make a command unsafe, compared against the lower-cased command.
pub const DEFAULT_RESTRICTED_PATTERNS: &[&str] = &[
    "rm -rf /",
    "chmod -r 777",
    "dd if=/dev/zero",
    ":(){ :|:& };:",
    "> /dev/sda",
    "mkfs",
    "fdisk",
    "mkswap",
    "sudo rm",
    "sudo chmod",
    "sudo chown",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandPolicy {
    patterns: Vec<String>,
}

impl Default for CommandPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_RESTRICTED_PATTERNS.iter().copied())
    }
}

impl CommandPolicy {
    /// Build from raw patterns. Patterns are lower-cased; empty ones are dropped.
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut normalized: Vec<String> = Vec::new();
        for pattern in patterns {
            let pattern = pattern.as_ref().to_lowercase();
            if pattern.trim().is_empty() || normalized.contains(&pattern) {
                continue;
            }
            normalized.push(pattern);
        }
        Self {
            patterns: normalized,
        }
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    /// The first pattern `command` contains, if any.
    pub fn violation(&self, command: &str) -> Option<&str> {
        let normalized = command.trim().to_lowercase();
        self.patterns
            .iter()
            .find(|pattern| normalized.contains(pattern.as_str()))
            .map(String::as_str)
    }

    pub fn is_safe(&self, command: &str) -> bool {
        self.violation(command).is_none()
    }

    /// `Err(CommandDenied)` naming the matched pattern.
    pub fn check(&self, command: &str) -> Result<()> {
        match self.violation(command) {
            Some(pattern) => Err(Error::CommandDenied {
                command: command.to_string(),
                pattern: pattern.to_string(),
            }),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn destructive_commands_are_blocked() {
        let policy = CommandPolicy::default();
        for command in [
            "rm -rf /",
            "rm -rf /home/user",
            "  RM -RF /  ",
            "chmod -R 777 /etc",
            "dd if=/dev/zero of=/dev/sda",
            ":(){ :|:& };:",
            "cat junk > /dev/sda",
            "mkfs.ext4 /dev/sdb1",
            "fdisk -l",
            "mkswap /swapfile",
            "sudo rm /etc/hosts",
            "Sudo Chown root file",
            "ls && sudo chmod 4755 /bin/sh",
        ] {
            assert!(!policy.is_safe(command), "should block: {}", command);
        }
    }

    #[test]
    fn ordinary_commands_pass() {
        let policy = CommandPolicy::default();
        for command in [
            "echo hi",
            "ls -la",
            "git status",
            "rm -rf ./build",
            "chmod 644 ~/.bashrc",
            "",
        ] {
            assert!(policy.is_safe(command), "should allow: {}", command);
        }
    }

    #[test]
    fn substring_matching_is_approximate() {
        let policy = CommandPolicy::default();
        // Over-blocks mentions
        assert!(!policy.is_safe("echo 'never run mkfs'"));
        // Under-blocks respellings
        assert!(policy.is_safe("sudo  rm /etc/hosts"));
    }

    #[test]
    fn check_reports_matched_pattern() {
        let policy = CommandPolicy::default();
        let err = policy.check("sudo rm -f /etc/passwd").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PermissionDenied);
        assert!(err.is_security());
        match err {
            Error::CommandDenied { pattern, .. } => assert_eq!(pattern, "sudo rm"),
            other => panic!("unexpected error: {other}"),
        }
        assert!(policy.check("echo hi").is_ok());
    }

    #[test]
    fn custom_patterns_are_lowercased() {
        let policy = CommandPolicy::new(["CURL | SH", "", "curl | sh"]);
        assert_eq!(policy.patterns(), ["curl | sh"]);
        assert_eq!(policy.violation("Curl | sh"), Some("curl | sh"));
    }
}
