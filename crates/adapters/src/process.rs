// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process spawn, inspection, and termination.
//!
//! The executor owns no policy: it spawns what it is told, captures
//! combined output into the tracing log, probes liveness by pid, and
//! terminates with a graceful-then-kill ladder.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, warn};

#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("process has no pid (already reaped)")]
    NoPid,
    #[error("wait failed: {0}")]
    Wait(#[source] std::io::Error),
    #[error("process scan unavailable on this platform")]
    ScanUnsupported,
}

/// Everything needed to spawn one process.
#[derive(Debug, Clone)]
pub struct SpawnSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    pub env: HashMap<String, String>,
    /// Prefix for captured-output log lines.
    pub log_tag: String,
}

/// A spawned process plus its output-capture task.
pub struct ProcessHandle {
    pub pid: u32,
    child: Child,
}

impl ProcessHandle {
    /// Wait for exit, returning the code when the OS reports one.
    pub async fn wait(&mut self) -> Result<Option<i32>, ProcessError> {
        let status = self.child.wait().await.map_err(ProcessError::Wait)?;
        Ok(status.code())
    }

    /// Non-blocking liveness check on the owned child.
    pub fn is_running(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// Force-kill the owned child.
    pub async fn kill(&mut self) {
        let _ = self.child.kill().await;
    }
}

/// Spawns and inspects OS processes.
#[derive(Debug, Clone, Default)]
pub struct ProcessExecutor;

impl ProcessExecutor {
    /// Spawn with combined stdout/stderr captured into the tracing log.
    ///
    /// Shell interpretation is never used; the program is executed
    /// directly with its argument vector.
    pub fn spawn(&self, spec: SpawnSpec) -> Result<ProcessHandle, ProcessError> {
        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .current_dir(&spec.cwd)
            .envs(&spec.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(false);

        let mut child = command.spawn().map_err(|source| ProcessError::Spawn {
            program: spec.program.display().to_string(),
            source,
        })?;
        let pid = child.id().ok_or(ProcessError::NoPid)?;

        if let Some(stdout) = child.stdout.take() {
            spawn_line_logger(stdout, spec.log_tag.clone(), "stdout");
        }
        if let Some(stderr) = child.stderr.take() {
            spawn_line_logger(stderr, spec.log_tag.clone(), "stderr");
        }

        debug!(pid, program = %spec.program.display(), "process spawned");
        Ok(ProcessHandle { pid, child })
    }

    /// Probe whether a pid we do not own is still alive.
    #[cfg(unix)]
    pub fn pid_alive(&self, pid: u32) -> bool {
        use nix::sys::signal::kill;
        use nix::unistd::Pid;

        // Signal 0 performs the permission/existence check only.
        kill(Pid::from_raw(pid as i32), None).is_ok()
    }

    #[cfg(not(unix))]
    pub fn pid_alive(&self, _pid: u32) -> bool {
        false
    }

    /// Terminate a pid we do not own: SIGTERM, bounded grace, SIGKILL.
    #[cfg(unix)]
    pub async fn terminate(&self, pid: u32, grace: Duration) {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        let target = Pid::from_raw(pid as i32);
        if kill(target, Signal::SIGTERM).is_err() {
            return;
        }
        let deadline = tokio::time::Instant::now() + grace;
        while tokio::time::Instant::now() < deadline {
            if !self.pid_alive(pid) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(250)).await;
        }
        warn!(pid, "grace expired, sending SIGKILL");
        let _ = kill(target, Signal::SIGKILL);
    }

    #[cfg(not(unix))]
    pub async fn terminate(&self, _pid: u32, _grace: Duration) {}

    /// Scan for a process whose command line contains `needle` and that
    /// runs under this daemon's OS user. Used to detect an interactive
    /// instance of the game binary holding the pager UI.
    #[cfg(target_os = "linux")]
    pub fn find_same_user_process(&self, needle: &str) -> Result<Option<u32>, ProcessError> {
        use std::os::unix::fs::MetadataExt;

        let my_uid = nix::unistd::getuid().as_raw();
        let my_pid = std::process::id();
        let proc_dir = std::fs::read_dir("/proc").map_err(|_| ProcessError::ScanUnsupported)?;
        for entry in proc_dir.flatten() {
            let Ok(pid) = entry.file_name().to_string_lossy().parse::<u32>() else {
                continue;
            };
            if pid == my_pid {
                continue;
            }
            let Ok(meta) = entry.metadata() else { continue };
            if meta.uid() != my_uid {
                continue;
            }
            let Ok(cmdline) = std::fs::read(entry.path().join("cmdline")) else {
                continue;
            };
            let cmdline = String::from_utf8_lossy(&cmdline);
            if cmdline.contains(needle) {
                return Ok(Some(pid));
            }
        }
        Ok(None)
    }

    #[cfg(not(target_os = "linux"))]
    pub fn find_same_user_process(&self, _needle: &str) -> Result<Option<u32>, ProcessError> {
        Err(ProcessError::ScanUnsupported)
    }
}

fn spawn_line_logger(
    pipe: impl tokio::io::AsyncRead + Unpin + Send + 'static,
    tag: String,
    stream: &'static str,
) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(pipe).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            debug!(target: "gk::process", tag = %tag, stream, "{}", line);
        }
    });
}

#[cfg(test)]
#[path = "process_tests.rs"]
mod tests;
