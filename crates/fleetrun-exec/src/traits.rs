//! Remote executor trait

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::ExecError;
use crate::result::CommandResult;

/// Transport capability for one host: file transfer and command execution
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    /// Establish the session up front
    ///
    /// Executors without a session succeed immediately. Once this returns
    /// `Ok`, later calls reuse the session instead of connecting again.
    async fn connect(&self) -> Result<(), ExecError> {
        Ok(())
    }

    /// Run a shell command, returning its output and exit status
    async fn run(&self, cmd: &str) -> Result<CommandResult, ExecError>;

    /// Run a shell command bounded by `timeout`
    async fn run_with_timeout(
        &self,
        cmd: &str,
        timeout: Duration,
    ) -> Result<CommandResult, ExecError>;

    /// Copy a local file verbatim to `remote_path` on the target
    async fn copy_file(&self, local_path: &Path, remote_path: &str)
    -> Result<CommandResult, ExecError>;

    /// Close any session held by the executor
    async fn disconnect(&self) -> Result<(), ExecError> {
        Ok(())
    }

    /// Whether a session is currently established
    fn is_connected(&self) -> bool {
        true
    }

    /// Short name for logging
    fn executor_type(&self) -> &'static str;
}
