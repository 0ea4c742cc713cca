// ABOUTME: Process launcher that starts one scoring subprocess per request
// ABOUTME: Owns the child and its three pipe ends until the request's outcome is final
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2026 dravr.ai

use std::io;
use std::process::{ExitStatus, Stdio};

use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tracing::debug;

use crate::config::BridgeConfig;
use crate::sandbox::{apply_sandbox, SandboxPolicy};
use crate::types::PredictionError;

/// One live scoring subprocess
///
/// Exclusively owned by a single in-flight request. On Unix the child leads
/// its own process group, so helpers it forks are killed along with it.
/// Dropping a handle whose process has not been reaped (a cancelled caller)
/// kills the group; the child is also spawned with kill-on-drop.
#[derive(Debug)]
pub struct ProcessHandle {
    child: Child,
    pid: Option<u32>,
    stdin: Option<ChildStdin>,
    stdout: Option<ChildStdout>,
    stderr: Option<ChildStderr>,
    exit_status: Option<ExitStatus>,
}

impl ProcessHandle {
    /// OS process identifier captured at spawn time
    #[must_use]
    pub const fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Exit status, once the process has been observed to terminate
    #[must_use]
    pub const fn exit_status(&self) -> Option<ExitStatus> {
        self.exit_status
    }

    /// Move the write end of standard input out of the handle
    pub fn take_stdin(&mut self) -> Option<ChildStdin> {
        self.stdin.take()
    }

    /// Move the read end of standard output out of the handle
    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.stdout.take()
    }

    /// Move the read end of standard error out of the handle
    pub fn take_stderr(&mut self) -> Option<ChildStderr> {
        self.stderr.take()
    }

    /// Wait for the process to terminate and record its status
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error if waiting fails.
    pub async fn wait(&mut self) -> io::Result<ExitStatus> {
        let status = self.child.wait().await?;
        self.exit_status = Some(status);
        Ok(status)
    }

    /// Forcefully terminate the process group and reap the process
    ///
    /// Descendants are signalled even when the direct child has already
    /// exited, since they may still hold the output pipes open.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error if the kill signal cannot be delivered.
    pub async fn kill(&mut self) -> io::Result<()> {
        kill_process_group(self.pid);
        if self.exit_status.is_some() {
            return Ok(());
        }
        self.child.kill().await?;
        self.exit_status = self.child.try_wait()?;
        Ok(())
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        if self.exit_status.is_none() {
            kill_process_group(self.pid);
        }
    }
}

/// Send `SIGKILL` to the process group led by `pid`
#[cfg(unix)]
fn kill_process_group(pid: Option<u32>) {
    use nix::errno::Errno;
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let Some(pid) = pid.and_then(|p| i32::try_from(p).ok()) else {
        return;
    };
    match killpg(Pid::from_raw(pid), Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(e) => tracing::warn!(pid, error = %e, "Failed to kill scoring process group"),
    }
}

#[cfg(not(unix))]
const fn kill_process_group(_pid: Option<u32>) {}

/// Build the command for a configuration without spawning it
fn build_command(config: &BridgeConfig) -> Command {
    let mut cmd = Command::new(&config.program);
    cmd.args(&config.args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    cmd.process_group(0);
    apply_sandbox(&mut cmd, &SandboxPolicy::from_config(config));
    cmd
}

/// Start a fresh scoring process for one request
///
/// Returns as soon as the process is started; it never waits for output.
///
/// # Errors
///
/// Returns a launch-kind `PredictionError` carrying the OS error text if the
/// program is missing, not executable, or the system is out of processes or
/// file descriptors.
pub fn launch(config: &BridgeConfig) -> Result<ProcessHandle, PredictionError> {
    let mut child = build_command(config).spawn().map_err(|e| {
        PredictionError::launch(format!(
            "Failed to spawn scoring process '{}': {e}",
            config.program.display()
        ))
    })?;

    let pid = child.id();
    let stdin = child.stdin.take();
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    debug!(
        pid,
        program = %config.program.display(),
        args = ?config.args,
        "Scoring process spawned"
    );

    Ok(ProcessHandle {
        child,
        pid,
        stdin,
        stdout,
        stderr,
        exit_status: None,
    })
}
