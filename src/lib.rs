//! confguard - trust-and-integrity core for configuration tooling
//!
//! This crate provides:
//! - Content-hashed, append-only backups of configuration files
//! - Verified, atomic restore from those backups
//! - Path allow-list and command deny-list policies
//! - Sandboxed command execution with a sanitized environment
//! - A hash-chained audit log of security events

pub mod backup;
pub mod cache;
pub mod cli;
pub mod concurrency;
pub mod config;
pub mod error;
pub mod paths;
pub mod sandbox;
pub mod security;

pub use config::Config;
pub use error::{Error, ErrorKind, Result};
