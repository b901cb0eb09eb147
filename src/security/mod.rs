//! Centralized security module for confguard.
//!
//! See [`confguard`] for the module overview, architecture diagram,
//! and public API documentation.

mod audit;
mod command_policy;
mod confguard;
mod context;
mod manager;
mod path_policy;

// The confguard.rs facade controls the entire public API surface.
pub use self::confguard::*;
