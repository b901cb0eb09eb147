use serde::Serialize;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tracing::{debug, info, warn};

use super::environment::sandbox_env;
use crate::backup::PermissionBits;
use crate::backup::catalog::apply_mode;
use crate::error::{Error, Result};
use crate::security::SecurityContext;

const SHELL: &str = "/bin/sh";

/// Outcome of one sandboxed command. Not persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SandboxResult {
    /// Exit status, or -1 when the command was killed by a signal.
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
}

impl SandboxResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

#[derive(Debug, Clone)]
pub struct SandboxExecutor {
    ctx: Arc<SecurityContext>,
}

impl SandboxExecutor {
    pub fn new(ctx: Arc<SecurityContext>) -> Self {
        Self { ctx }
    }

    /// Run `command` through `/bin/sh -c` in a fresh scratch directory.
    ///
    /// The deny list is checked before anything is created or spawned. The
    /// scratch directory is removed on every exit path, including timeout
    /// and the returned future being dropped. On timeout or cancellation the
    /// command's whole process group is killed.
    pub async fn run_sandboxed(
        &self,
        command: &str,
        timeout: Option<Duration>,
    ) -> Result<SandboxResult> {
        if let Err(e) = self.ctx.command_policy().check(command) {
            warn!("Blocked sandboxed command: {}", e);
            return Err(e);
        }

        let (workdir, workdir_path) = self.create_workdir()?;

        let mut cmd = tokio::process::Command::new(SHELL);
        cmd.arg("-c")
            .arg(command)
            .current_dir(&workdir_path)
            .env_clear()
            .envs(sandbox_env(&self.ctx, &workdir_path))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        let started = Instant::now();
        let child = cmd.spawn().map_err(Error::Spawn)?;
        let pid = child.id();
        debug!("Spawned sandboxed command (pid {:?}) in {}", pid, workdir_path.display());
        // Declared after `workdir`, so the group is killed before the directory goes.
        let group = ProcessGroupGuard::new(pid);

        let output = match timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait_with_output()).await {
                Ok(output) => output.map_err(Error::Spawn)?,
                Err(_) => {
                    warn!(
                        "Sandboxed command timed out after {}ms: {}",
                        limit.as_millis(),
                        command
                    );
                    return Err(Error::Timeout {
                        command: command.to_string(),
                        after: limit,
                    });
                }
            },
            None => child.wait_with_output().await.map_err(Error::Spawn)?,
        };
        group.disarm();

        let result = SandboxResult {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            duration_ms: started.elapsed().as_millis() as u64,
        };
        info!(
            "Sandboxed command exited with {} in {}ms",
            result.exit_code, result.duration_ms
        );

        drop(workdir);
        Ok(result)
    }

    /// Fresh private scratch directory, plus its resolved path.
    fn create_workdir(&self) -> Result<(TempDir, PathBuf)> {
        let dir = tempfile::Builder::new()
            .prefix("confguard-sandbox-")
            .tempdir()
            .map_err(|e| Error::io("create sandbox directory in", std::env::temp_dir(), e))?;
        apply_mode(dir.path(), PermissionBits::from_mode(self.ctx.directory_mode()))?;

        let resolved = self.ctx.path_policy().check(dir.path())?;
        Ok((dir, resolved))
    }
}

/// Kills the command's process group when dropped, unless disarmed.
///
/// `kill_on_drop` only reaches the shell itself. This also catches the
/// shell's background children on every early exit, including the caller
/// dropping the future.
struct ProcessGroupGuard {
    pid: Option<u32>,
}

impl ProcessGroupGuard {
    fn new(pid: Option<u32>) -> Self {
        Self { pid }
    }

    /// The command exited on its own; leave the group alone.
    fn disarm(mut self) {
        self.pid = None;
    }
}

impl Drop for ProcessGroupGuard {
    fn drop(&mut self) {
        if let Some(pid) = self.pid.take() {
            debug!("Killing process group {}", pid);
            kill_process_group(pid);
        }
    }
}

#[cfg(unix)]
fn kill_process_group(pid: u32) {
    use nix::errno::Errno;
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    match killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(e) => warn!("Failed to kill process group {}: {}", pid, e),
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: u32) {}
