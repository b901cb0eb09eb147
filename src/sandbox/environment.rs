//! Environment handed to sandboxed commands.

use std::collections::BTreeMap;
use std::path::Path;

use crate::security::SecurityContext;

/// Set to the sandbox working directory for every command.
pub const SANDBOX_DIR_VAR: &str = "SANDBOX_DIR";

/// The context's allow-listed environment plus `SANDBOX_DIR`.
///
/// This is the complete environment: the caller clears everything else.
pub fn sandbox_env(ctx: &SecurityContext, workdir: &Path) -> BTreeMap<String, String> {
    let mut env = ctx.environment().clone();
    env.insert(SANDBOX_DIR_VAR.to_string(), workdir.display().to_string());
    env
}
