//! Policy-gated command execution in a restricted environment.
//!
//! Isolation here is not kernel-enforced. A command runs only after it
//! passes the deny list, with a cleared environment (allow-listed variables
//! and a fixed `PATH`), in a fresh 0700 scratch directory that is removed
//! afterwards, in its own process group so a timeout can kill everything it
//! started.

pub mod environment;
pub mod executor;

pub use environment::{SANDBOX_DIR_VAR, sandbox_env};
pub use executor::{SandboxExecutor, SandboxResult};
