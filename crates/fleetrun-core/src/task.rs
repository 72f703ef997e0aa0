//! Per-host task: probe, transfer, execute, record
//!
//! A task always ends by writing exactly one result file. Every failure on
//! the way is rendered as text into that file; nothing is raised to the run.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use fleetrun_exec::{ExecError, ReachabilityProbe, RemoteExecutor};
use tracing::{debug, error, info, instrument, warn};

use crate::credential::CredentialContext;
use crate::registry::Host;
use crate::state::TaskState;

/// Creates the transport for one host
///
/// Allows injection of different executors per host and in tests.
#[async_trait]
pub trait TransportFactory: Send + Sync {
    /// Create a remote executor for `host` authenticating with `credential`
    async fn create(
        &self,
        host: &Host,
        credential: &CredentialContext,
    ) -> Result<Arc<dyn RemoteExecutor>, ExecError>;
}

/// Read-only state shared by every task of a run
pub struct TaskContext {
    /// Local command bundle
    pub bundle: PathBuf,
    /// Credential resolved before dispatch
    pub credential: Arc<CredentialContext>,
    /// Directory receiving result files
    pub output_dir: PathBuf,
    /// Token unique to this run
    pub run_id: String,
    /// Remote directory receiving the bundle
    pub remote_tmp_dir: String,
    /// Bound on the reachability probe
    pub probe_timeout: Duration,
    /// Reachability probe
    pub probe: Arc<dyn ReachabilityProbe>,
    /// Transport factory
    pub factory: Arc<dyn TransportFactory>,
}

impl TaskContext {
    /// Remote path the bundle is copied to
    ///
    /// Carries the run id so concurrent runs never overwrite each other's copy.
    #[must_use]
    pub fn remote_bundle_path(&self) -> String {
        let base = self
            .bundle
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "bundle".to_string());
        format!(
            "{}/{base}.{}",
            self.remote_tmp_dir.trim_end_matches('/'),
            self.run_id
        )
    }

    /// Result file path for `host`
    #[must_use]
    pub fn result_path(&self, host: &Host) -> PathBuf {
        self.output_dir.join(host.result_file_name())
    }
}

/// Outcome of one per-host task
#[derive(Debug, Clone)]
pub struct TaskResult {
    /// Host the task ran for
    pub host: Host,
    /// Whether the probe succeeded
    pub reachable: bool,
    /// Result file path
    pub output_path: PathBuf,
    /// Remote exit status, when the command ran at all
    pub exit_status: Option<i32>,
    /// Whether the result file was written
    pub recorded: bool,
    /// Wall time of the task
    pub duration: Duration,
}

impl TaskResult {
    /// Reachable, ran, and exited 0
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.reachable && self.exit_status == Some(0)
    }
}

/// Shell line that runs the transferred bundle and removes it
///
/// The bundle's exit status is propagated after cleanup.
#[must_use]
pub fn execute_command(remote_path: &str) -> String {
    let path = shell_words::quote(remote_path);
    format!("chmod +x {path}; {path}; rc=$?; rm -f {path}; exit $rc")
}

/// Unit of work for one host
pub struct HostTask {
    host: Host,
    ctx: Arc<TaskContext>,
    state: TaskState,
}

impl HostTask {
    /// Create a task owning its own copy of `host`
    #[must_use]
    pub fn new(host: Host, ctx: Arc<TaskContext>) -> Self {
        Self {
            host,
            ctx,
            state: TaskState::Pending,
        }
    }

    /// Host this task serves
    #[must_use]
    pub fn host(&self) -> &Host {
        &self.host
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> TaskState {
        self.state
    }

    fn transition_to(&mut self, next: TaskState) {
        if !self.state.can_transition_to(next) {
            // only reachable through a bug in run(); keep going, the result
            // file is still owed
            warn!(host = %self.host, from = %self.state, to = %next, "unexpected transition");
        }
        debug!(host = %self.host, from = %self.state, to = %next, "task state");
        self.state = next;
    }

    /// Run the task to completion
    #[instrument(skip(self), fields(host = %self.host))]
    pub async fn run(mut self) -> TaskResult {
        let start = Instant::now();

        self.transition_to(TaskState::Probing);
        let reachable = self
            .ctx
            .probe
            .is_reachable(self.host.as_str(), self.ctx.probe_timeout)
            .await;

        let (content, exit_status) = if reachable {
            self.transition_to(TaskState::Transferring);
            self.transfer_and_execute().await
        } else {
            self.transition_to(TaskState::Unreachable);
            info!(host = %self.host, "host unreachable");
            (format!("{} Unreachable", self.host), None)
        };

        let output_path = self.ctx.result_path(&self.host);
        let recorded = record(&output_path, &content).await;
        self.transition_to(TaskState::Recorded);

        let duration = start.elapsed();
        info!(
            host = %self.host,
            reachable,
            exit_status = ?exit_status,
            duration = ?duration,
            "task finished"
        );

        TaskResult {
            host: self.host,
            reachable,
            output_path,
            exit_status,
            recorded,
            duration,
        }
    }

    /// Create the transport and open its session, exactly once
    async fn open_transport(&self) -> Result<Arc<dyn RemoteExecutor>, ExecError> {
        let executor = self
            .ctx
            .factory
            .create(&self.host, &self.ctx.credential)
            .await?;
        executor.connect().await?;
        Ok(executor)
    }

    async fn transfer_and_execute(&mut self) -> (String, Option<i32>) {
        let executor = match self.open_transport().await {
            Ok(executor) => executor,
            Err(e) => {
                warn!(host = %self.host, error = %e, "transport unavailable");
                return (format!("{}: {e}\n", self.host), None);
            }
        };

        let remote_path = self.ctx.remote_bundle_path();
        let mut content = String::new();

        // a failed copy does not stop execution unless the session is gone;
        // otherwise the run step fails visibly in the captured output
        if let Err(e) = executor.copy_file(&self.ctx.bundle, &remote_path).await {
            warn!(host = %self.host, error = %e, "bundle transfer failed");
            if e.is_connection_error() {
                return (format!("{}: {e}\n", self.host), None);
            }
            content.push_str(&format!("{e}\n"));
        }

        self.transition_to(TaskState::Executing);
        let exit_status = match executor.run(&execute_command(&remote_path)).await {
            Ok(result) => {
                if !result.success() {
                    warn!(host = %self.host, status = result.status, "bundle exited non-zero");
                }
                content.push_str(result.output_without_banner());
                Some(result.status)
            }
            Err(e) => {
                warn!(host = %self.host, error = %e, "bundle execution failed");
                content.push_str(&format!("execution failed: {e}\n"));
                None
            }
        };

        if let Err(e) = executor.disconnect().await {
            debug!(host = %self.host, error = %e, "disconnect failed");
        }

        (content, exit_status)
    }
}

/// Write a result file, replacing any earlier one
async fn record(path: &Path, content: &str) -> bool {
    match tokio::fs::write(path, content).await {
        Ok(()) => true,
        Err(e) => {
            error!(path = %path.display(), error = %e, "failed to write result file");
            false
        }
    }
}
