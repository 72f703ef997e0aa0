//! Commands on this machine through `sh -c`
//!
//! Backs `localhost` entries in a host list, the ICMP probe and the
//! secret-store program.

use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::{debug, instrument, warn};

use crate::error::ExecError;
use crate::result::CommandResult;
use crate::traits::RemoteExecutor;

const PIPE_CHUNK: usize = 4096;

/// Executor for the local machine
#[derive(Debug, Clone, Default)]
pub struct LocalExecutor;

impl LocalExecutor {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Spawn `sh -c cmd` and collect both pipes until they close
    ///
    /// `combined` receives stdout and stderr chunks in arrival order, the
    /// same stream a result file records for a remote host.
    async fn spawn_and_collect(&self, cmd: &str) -> Result<CommandResult, ExecError> {
        let started = Instant::now();

        let mut child = Command::new("sh")
            .arg("-c")
            .arg(cmd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ExecError::SpawnError(e.to_string()))?;

        let mut out_pipe = child
            .stdout
            .take()
            .ok_or_else(|| ExecError::SpawnError("stdout not captured".to_string()))?;
        let mut err_pipe = child
            .stderr
            .take()
            .ok_or_else(|| ExecError::SpawnError("stderr not captured".to_string()))?;

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let mut combined = Vec::new();
        let mut out_buf = [0u8; PIPE_CHUNK];
        let mut err_buf = [0u8; PIPE_CHUNK];
        let (mut out_open, mut err_open) = (true, true);

        while out_open || err_open {
            tokio::select! {
                read = out_pipe.read(&mut out_buf), if out_open => {
                    match read.map_err(|e| ExecError::IoError(e.to_string()))? {
                        0 => out_open = false,
                        n => {
                            stdout.extend_from_slice(&out_buf[..n]);
                            combined.extend_from_slice(&out_buf[..n]);
                        }
                    }
                }
                read = err_pipe.read(&mut err_buf), if err_open => {
                    match read.map_err(|e| ExecError::IoError(e.to_string()))? {
                        0 => err_open = false,
                        n => {
                            stderr.extend_from_slice(&err_buf[..n]);
                            combined.extend_from_slice(&err_buf[..n]);
                        }
                    }
                }
            }
        }

        let exit = child
            .wait()
            .await
            .map_err(|e| ExecError::IoError(e.to_string()))?;
        // killed by a signal
        let status = exit.code().unwrap_or(-1);

        debug!(command = %cmd, status, elapsed = ?started.elapsed(), "local command finished");

        Ok(CommandResult {
            status,
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
            combined: String::from_utf8_lossy(&combined).into_owned(),
            duration: started.elapsed(),
        })
    }
}

#[async_trait]
impl RemoteExecutor for LocalExecutor {
    #[instrument(skip(self), level = "debug")]
    async fn run(&self, cmd: &str) -> Result<CommandResult, ExecError> {
        self.spawn_and_collect(cmd).await
    }

    #[instrument(skip(self), level = "debug")]
    async fn run_with_timeout(
        &self,
        cmd: &str,
        limit: Duration,
    ) -> Result<CommandResult, ExecError> {
        // dropping the future kills the child
        tokio::time::timeout(limit, self.spawn_and_collect(cmd))
            .await
            .unwrap_or_else(|_| {
                warn!(command = %cmd, timeout = ?limit, "local command timed out");
                Err(ExecError::Timeout { timeout: limit })
            })
    }

    #[instrument(skip(self), level = "debug")]
    async fn copy_file(
        &self,
        local_path: &Path,
        remote_path: &str,
    ) -> Result<CommandResult, ExecError> {
        let started = Instant::now();

        let bytes = tokio::fs::copy(local_path, remote_path)
            .await
            .map_err(|e| ExecError::TransferFailed {
                path: remote_path.to_string(),
                reason: e.to_string(),
            })?;

        debug!(path = %remote_path, bytes, "bundle copied");

        Ok(CommandResult {
            duration: started.elapsed(),
            ..CommandResult::default()
        })
    }

    fn executor_type(&self) -> &'static str {
        "local"
    }
}
