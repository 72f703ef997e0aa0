//! Adapter for the external encrypted-bucket secret manager

use async_trait::async_trait;
use fleetrun_core::{CoreError, Secret, SecretStore};
use fleetrun_exec::{LocalExecutor, RemoteExecutor};
use tracing::debug;
use zeroize::Zeroize;

/// Secret store backed by an external program
///
/// The program is invoked as `<command> exists <bucket>` (exit 0 when the
/// bucket exists, 1 when it does not) and `<command> get <bucket>` (prints
/// the plaintext on stdout).
#[derive(Debug, Clone)]
pub struct CommandSecretStore {
    command: String,
    executor: LocalExecutor,
}

impl CommandSecretStore {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            executor: LocalExecutor::new(),
        }
    }

    fn invocation(&self, verb: &str, bucket: &str) -> String {
        format!(
            "{} {verb} {}",
            shell_words::quote(&self.command),
            shell_words::quote(bucket)
        )
    }
}

#[async_trait]
impl SecretStore for CommandSecretStore {
    async fn bucket_exists(&self, bucket: &str) -> Result<bool, CoreError> {
        let result = self
            .executor
            .run(&self.invocation("exists", bucket))
            .await
            .map_err(|e| CoreError::Config(format!("secret store unavailable: {e}")))?;

        debug!(bucket = %bucket, status = result.status, "bucket lookup");

        match result.status {
            0 => Ok(true),
            1 => Ok(false),
            status => Err(CoreError::Config(format!(
                "secret store exited with {status}: {}",
                result.stderr.trim()
            ))),
        }
    }

    async fn get_secret(&self, bucket: &str) -> Result<Secret, CoreError> {
        let mut result = self
            .executor
            .run(&self.invocation("get", bucket))
            .await
            .map_err(|e| CoreError::Config(format!("secret store unavailable: {e}")))?;

        let fetched = if result.success() {
            let plain = result.stdout.strip_suffix('\n').unwrap_or(&result.stdout);
            Ok(Secret::new(plain.trim_end_matches('\r')))
        } else {
            Err(CoreError::Config(format!(
                "cannot read bucket {bucket}: {}",
                result.stderr.trim()
            )))
        };

        // stdout and the combined stream both hold the plaintext
        result.stdout.zeroize();
        result.combined.zeroize();
        fetched
    }
}
