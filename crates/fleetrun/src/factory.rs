//! Transport factory creating one SSH executor per host

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use fleetrun_core::{CoreError, CredentialContext, Host, TransportFactory};
use fleetrun_exec::{
    ExecError, KeySource, RemoteExecutor, ResolvedKey, SshAuth, SshExecutorBuilder, SshOptions,
};
use tracing::debug;

/// Default implementation of `TransportFactory`
///
/// Every host, `localhost` included, is reached over SSH so commands always
/// run as the credential's user.
pub struct DefaultTransportFactory {
    auth: SshAuth,
    options: SshOptions,
}

impl DefaultTransportFactory {
    /// Build the factory once per run
    ///
    /// `key` is only consulted in privileged mode.
    ///
    /// # Errors
    /// Returns `CoreError::Config` if privileged mode has no usable key
    pub fn new(
        credential: &CredentialContext,
        key: Option<&KeySource>,
        options: SshOptions,
    ) -> Result<Self, CoreError> {
        let auth = match credential {
            CredentialContext::PasswordAuth { secret, .. } => SshAuth::password(secret.expose()),
            CredentialContext::PasswordlessPrivileged { .. } => {
                let source = key
                    .cloned()
                    .or_else(default_key_source)
                    .ok_or_else(|| {
                        CoreError::Config("no SSH key found for privileged mode".to_string())
                    })?;
                let resolved: ResolvedKey = source
                    .resolve()
                    .map_err(|e| CoreError::Config(format!("SSH key: {e}")))?;
                SshAuth::Key(Arc::new(resolved))
            }
        };

        Ok(Self { auth, options })
    }
}

/// First of the usual identity files present in the home directory
fn default_key_source() -> Option<KeySource> {
    let ssh_dir = dirs::home_dir()?.join(".ssh");
    ["id_ed25519", "id_ecdsa", "id_rsa"]
        .into_iter()
        .map(|name| ssh_dir.join(name))
        .find(|path: &PathBuf| path.exists())
        .map(KeySource::Path)
}

#[async_trait]
impl TransportFactory for DefaultTransportFactory {
    async fn create(
        &self,
        host: &Host,
        credential: &CredentialContext,
    ) -> Result<Arc<dyn RemoteExecutor>, ExecError> {
        debug!(host = %host, user = credential.user(), auth = ?self.auth, "creating SSH executor");

        let executor = SshExecutorBuilder::new(host.as_str(), credential.user(), self.auth.clone())
            .map_connection(|info| self.options.apply(info))
            .build();

        Ok(Arc::new(executor))
    }
}
