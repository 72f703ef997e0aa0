//! Scripted collaborators shared by unit tests

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use fleetrun_exec::{CommandResult, ExecError, ReachabilityProbe, RemoteExecutor};

use crate::credential::{CredentialContext, Secret};
use crate::registry::Host;
use crate::task::TransportFactory;

pub(crate) fn password_credential() -> Arc<CredentialContext> {
    Arc::new(CredentialContext::PasswordAuth {
        user: "deploy".to_string(),
        secret: Secret::new("s3cret"),
    })
}

/// Probe answering from a fixed set of down hosts
#[derive(Default)]
pub(crate) struct StaticProbe {
    pub down: HashSet<String>,
}

impl StaticProbe {
    pub fn down(hosts: &[&str]) -> Self {
        Self {
            down: hosts.iter().map(ToString::to_string).collect(),
        }
    }
}

#[async_trait]
impl ReachabilityProbe for StaticProbe {
    async fn is_reachable(&self, host: &str, _timeout: Duration) -> bool {
        !self.down.contains(host)
    }
}

/// Executor replaying a canned command result
pub(crate) struct ScriptedExecutor {
    pub combined: String,
    pub status: i32,
    pub refuse_connect: bool,
    pub copy_error: Option<ExecError>,
    pub run_delay: Duration,
    pub calls: Mutex<Vec<String>>,
}

#[async_trait]
impl RemoteExecutor for ScriptedExecutor {
    async fn connect(&self) -> Result<(), ExecError> {
        self.calls.lock().unwrap().push("connect".to_string());
        if self.refuse_connect {
            return Err(ExecError::ConnectionFailed("connection refused".to_string()));
        }
        Ok(())
    }

    async fn run(&self, cmd: &str) -> Result<CommandResult, ExecError> {
        self.calls.lock().unwrap().push(format!("run {cmd}"));
        if !self.run_delay.is_zero() {
            tokio::time::sleep(self.run_delay).await;
        }
        Ok(CommandResult {
            status: self.status,
            combined: self.combined.clone(),
            ..CommandResult::default()
        })
    }

    async fn run_with_timeout(
        &self,
        cmd: &str,
        _timeout: Duration,
    ) -> Result<CommandResult, ExecError> {
        self.run(cmd).await
    }

    async fn copy_file(
        &self,
        local_path: &Path,
        remote_path: &str,
    ) -> Result<CommandResult, ExecError> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("copy {} {remote_path}", local_path.display()));
        match &self.copy_error {
            Some(e) => Err(e.clone()),
            None => Ok(CommandResult::default()),
        }
    }

    fn executor_type(&self) -> &'static str {
        "scripted"
    }
}

/// Factory handing out scripted executors per host
#[derive(Default)]
pub(crate) struct ScriptedFactory {
    pub outputs: HashMap<String, (String, i32)>,
    /// Hosts whose session cannot be opened
    pub refuse: HashSet<String>,
    pub copy_error: Option<ExecError>,
    pub run_delays: HashMap<String, Duration>,
    pub created: Mutex<Vec<(String, Arc<ScriptedExecutor>)>>,
}

impl ScriptedFactory {
    pub fn with_output(mut self, host: &str, combined: &str, status: i32) -> Self {
        self.outputs
            .insert(host.to_string(), (combined.to_string(), status));
        self
    }

    pub fn calls_for(&self, host: &str) -> Vec<String> {
        self.created
            .lock()
            .unwrap()
            .iter()
            .filter(|(h, _)| h == host)
            .flat_map(|(_, e)| e.calls.lock().unwrap().clone())
            .collect()
    }
}

#[async_trait]
impl TransportFactory for ScriptedFactory {
    async fn create(
        &self,
        host: &Host,
        _credential: &CredentialContext,
    ) -> Result<Arc<dyn RemoteExecutor>, ExecError> {
        let (combined, status) = self
            .outputs
            .get(host.as_str())
            .cloned()
            .unwrap_or_else(|| (format!("{host}-out\n"), 0));

        let executor = Arc::new(ScriptedExecutor {
            combined,
            status,
            refuse_connect: self.refuse.contains(host.as_str()),
            copy_error: self.copy_error.clone(),
            run_delay: self
                .run_delays
                .get(host.as_str())
                .copied()
                .unwrap_or_default(),
            calls: Mutex::new(Vec::new()),
        });
        self.created
            .lock()
            .unwrap()
            .push((host.to_string(), executor.clone()));

        let executor: Arc<dyn RemoteExecutor> = executor;
        Ok(executor)
    }
}
