//! SSH command execution using russh crate

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use russh::keys::ssh_key;
use russh::keys::{PrivateKeyWithHashAlg, load_secret_key};
use russh::{ChannelMsg, Disconnect, client};
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, error, info, instrument};
use zeroize::Zeroizing;

use crate::error::ExecError;
use crate::keys::ResolvedKey;
use crate::result::{CommandResult, ConnectionInfo};
use crate::traits::RemoteExecutor;

/// SSH client handler for russh
#[derive(Debug)]
struct SshClientHandler;

impl client::Handler for SshClientHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &ssh_key::PublicKey,
    ) -> Result<bool, Self::Error> {
        // Accept all server keys (like StrictHostKeyChecking=no); fleet lists
        // routinely contain freshly provisioned hosts
        Ok(true)
    }
}

/// How the session authenticates
#[derive(Clone)]
pub enum SshAuth {
    /// Password for the connection user, wiped when the last handle drops
    Password(Arc<Zeroizing<String>>),
    /// Private key shared by every host of the run
    Key(Arc<ResolvedKey>),
}

impl SshAuth {
    /// Password authentication
    pub fn password(password: impl Into<String>) -> Self {
        SshAuth::Password(Arc::new(Zeroizing::new(password.into())))
    }
}

impl std::fmt::Debug for SshAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SshAuth::Password(_) => f.write_str("Password(<redacted>)"),
            SshAuth::Key(key) => f.debug_tuple("Key").field(&key.path()).finish(),
        }
    }
}

/// SSH command executor
///
/// Manages an SSH session for remote command execution. The session is
/// opened once, by `connect` or by the first command, and reused after that.
pub struct SshExecutor {
    /// Connection configuration
    conn_info: ConnectionInfo,
    /// Authentication method
    auth: SshAuth,
    /// SSH session, `None` until connected
    session: Mutex<Option<client::Handle<SshClientHandler>>>,
}

impl std::fmt::Debug for SshExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SshExecutor")
            .field("conn_info", &self.conn_info)
            .field("auth", &self.auth)
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}

impl SshExecutor {
    /// Create a new SSH executor
    #[must_use]
    pub fn new(conn_info: ConnectionInfo, auth: SshAuth) -> Self {
        Self {
            conn_info,
            auth,
            session: Mutex::new(None),
        }
    }

    /// Get connection info
    pub fn connection_info(&self) -> &ConnectionInfo {
        &self.conn_info
    }

    /// Open and authenticate the session unless one is already held
    #[instrument(skip(self), fields(host = %self.conn_info.host))]
    async fn ensure_session(&self) -> Result<(), ExecError> {
        let mut session_lock = self.session.lock().await;

        if session_lock.is_some() {
            return Ok(());
        }

        info!(
            host = %self.conn_info.host,
            port = self.conn_info.port,
            user = %self.conn_info.user,
            "connecting to SSH"
        );

        let config = Arc::new(client::Config::default());

        let connecting = client::connect(
            config,
            (&self.conn_info.host[..], self.conn_info.port),
            SshClientHandler,
        );

        let mut session = match self.conn_info.connect_timeout {
            Some(limit) => timeout(limit, connecting)
                .await
                .map_err(|_| {
                    ExecError::ConnectionFailed(format!("connect timed out after {limit:?}"))
                })?,
            None => connecting.await,
        }
        .map_err(|e| ExecError::ConnectionFailed(e.to_string()))?;

        let auth_res = match &self.auth {
            SshAuth::Password(password) => session
                .authenticate_password(&self.conn_info.user, password.as_str())
                .await
                .map_err(|e| ExecError::AuthenticationFailed(e.to_string()))?,
            SshAuth::Key(key) => {
                let key_pair = load_secret_key(key.path(), None)
                    .map_err(|e| ExecError::SshKeyError(e.to_string()))?;

                let hash_alg = session
                    .best_supported_rsa_hash()
                    .await
                    .ok()
                    .flatten()
                    .flatten();
                session
                    .authenticate_publickey(
                        &self.conn_info.user,
                        PrivateKeyWithHashAlg::new(Arc::new(key_pair), hash_alg),
                    )
                    .await
                    .map_err(|e| ExecError::AuthenticationFailed(e.to_string()))?
            }
        };

        if !auth_res.success() {
            return Err(ExecError::AuthenticationFailed(format!(
                "{} rejected credentials for {}",
                self.conn_info.host, self.conn_info.user
            )));
        }

        info!(host = %self.conn_info.host, "SSH connected and authenticated");

        *session_lock = Some(session);
        Ok(())
    }

    /// Execute command on remote host, optionally feeding `stdin`
    #[instrument(skip(self, cmd, stdin), fields(host = %self.conn_info.host))]
    async fn execute_remote(
        &self,
        cmd: &str,
        stdin: Option<&[u8]>,
    ) -> Result<CommandResult, ExecError> {
        let mut session_lock = self.session.lock().await;

        let session = session_lock.as_mut().ok_or(ExecError::NotConnected)?;

        debug!(command = %cmd, "executing remote command");

        let start = Instant::now();

        let mut channel = session
            .channel_open_session()
            .await
            .map_err(|e| ExecError::IoError(e.to_string()))?;

        channel
            .exec(true, cmd)
            .await
            .map_err(|e| ExecError::IoError(e.to_string()))?;

        if let Some(input) = stdin {
            channel
                .data(input)
                .await
                .map_err(|e| ExecError::IoError(e.to_string()))?;
            channel
                .eof()
                .await
                .map_err(|e| ExecError::IoError(e.to_string()))?;
        }

        let mut status = -1;
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let mut combined = Vec::new();

        // exit-status may arrive after EOF, so drain until the channel closes
        while let Some(msg) = channel.wait().await {
            match msg {
                ChannelMsg::Data { data } => {
                    stdout.extend_from_slice(&data);
                    combined.extend_from_slice(&data);
                }
                ChannelMsg::ExtendedData { data, ext } => {
                    if ext == 1 {
                        stderr.extend_from_slice(&data);
                        combined.extend_from_slice(&data);
                    }
                }
                ChannelMsg::ExitStatus { exit_status } => {
                    status = exit_status.cast_signed();
                }
                _ => {}
            }
        }

        let duration = start.elapsed();

        debug!(
            command = %cmd,
            status = status,
            duration = ?duration,
            "remote command completed"
        );

        Ok(CommandResult {
            status,
            stdout: String::from_utf8_lossy(&stdout).to_string(),
            stderr: String::from_utf8_lossy(&stderr).to_string(),
            combined: String::from_utf8_lossy(&combined).to_string(),
            duration,
        })
    }
}

#[async_trait]
impl RemoteExecutor for SshExecutor {
    async fn connect(&self) -> Result<(), ExecError> {
        self.ensure_session().await
    }

    #[instrument(skip(self), fields(host = %self.conn_info.host))]
    async fn run(&self, cmd: &str) -> Result<CommandResult, ExecError> {
        self.ensure_session().await?;
        self.execute_remote(cmd, None).await
    }

    #[instrument(skip(self), fields(host = %self.conn_info.host))]
    async fn run_with_timeout(
        &self,
        cmd: &str,
        timeout_duration: Duration,
    ) -> Result<CommandResult, ExecError> {
        let start = Instant::now();

        debug!(command = %cmd, timeout = ?timeout_duration, "executing with timeout");

        // the limit covers the command, not the handshake
        self.ensure_session().await?;

        match timeout(timeout_duration, self.execute_remote(cmd, None)).await {
            Ok(result) => result,
            Err(_) => {
                error!(
                    command = %cmd,
                    timeout = ?timeout_duration,
                    elapsed = ?start.elapsed(),
                    "command timed out"
                );
                Err(ExecError::Timeout {
                    timeout: timeout_duration,
                })
            }
        }
    }

    #[instrument(skip(self), fields(host = %self.conn_info.host))]
    async fn copy_file(
        &self,
        local_path: &Path,
        remote_path: &str,
    ) -> Result<CommandResult, ExecError> {
        let content = tokio::fs::read(local_path)
            .await
            .map_err(|e| ExecError::TransferFailed {
                path: remote_path.to_string(),
                reason: format!("{}: {e}", local_path.display()),
            })?;

        self.ensure_session().await?;

        let cmd = format!("cat > {}", shell_words::quote(remote_path));
        let result = self.execute_remote(&cmd, Some(&content)).await?;

        if !result.success() {
            return Err(ExecError::TransferFailed {
                path: remote_path.to_string(),
                reason: result.stderr.trim().to_string(),
            });
        }

        debug!(path = %remote_path, bytes = content.len(), "copied file to host");
        Ok(result)
    }

    async fn disconnect(&self) -> Result<(), ExecError> {
        let mut session_lock = self.session.lock().await;

        if let Some(session) = session_lock.take() {
            session
                .disconnect(Disconnect::ByApplication, "", "English")
                .await
                .map_err(|e| ExecError::IoError(e.to_string()))?;
            info!(host = %self.conn_info.host, "SSH disconnected");
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        // try_lock fails while a command is in flight, which only happens on
        // an established session
        self.session
            .try_lock()
            .map(|s| s.is_some())
            .unwrap_or(true)
    }

    fn executor_type(&self) -> &'static str {
        "ssh"
    }
}

/// Builder for `SshExecutor`
pub struct SshExecutorBuilder {
    conn_info: ConnectionInfo,
    auth: SshAuth,
}

impl SshExecutorBuilder {
    /// Start a builder for `user@host` on the default port
    pub fn new(host: impl Into<String>, user: impl Into<String>, auth: SshAuth) -> Self {
        Self {
            conn_info: ConnectionInfo::new(host, user),
            auth,
        }
    }

    /// Replace connection info, e.g. after applying `SshOptions`
    #[must_use]
    pub fn map_connection(mut self, f: impl FnOnce(ConnectionInfo) -> ConnectionInfo) -> Self {
        self.conn_info = f(self.conn_info);
        self
    }

    /// Build the executor
    #[must_use]
    pub fn build(self) -> SshExecutor {
        SshExecutor::new(self.conn_info, self.auth)
    }
}
