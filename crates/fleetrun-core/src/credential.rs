//! Credential context resolved once per run

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};
use zeroize::Zeroizing;

use crate::error::CoreError;

/// Identity used in passwordless privileged mode
pub const PRIVILEGED_USER: &str = "root";

/// Decrypted secret, wiped from memory on drop
#[derive(Clone)]
pub struct Secret(Zeroizing<String>);

impl Secret {
    /// Wrap a plaintext secret
    pub fn new(value: impl Into<String>) -> Self {
        Self(Zeroizing::new(value.into()))
    }

    /// Access the plaintext
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(<redacted>)")
    }
}

/// External encrypted-bucket secret manager
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Whether `bucket` exists in the store
    async fn bucket_exists(&self, bucket: &str) -> Result<bool, CoreError>;

    /// Plaintext secret held in `bucket`
    async fn get_secret(&self, bucket: &str) -> Result<Secret, CoreError>;
}

/// Reports whether the process already runs as the privileged identity
pub trait PrivilegeCheck: Send + Sync {
    fn is_privileged(&self) -> bool;
}

/// Checks the effective uid of the current process
#[derive(Debug, Clone, Copy, Default)]
pub struct EffectiveUid;

impl PrivilegeCheck for EffectiveUid {
    fn is_privileged(&self) -> bool {
        nix::unistd::geteuid().is_root()
    }
}

/// What the caller asked for
#[derive(Debug, Clone, Default)]
pub struct CredentialRequest {
    /// Passwordless privileged mode
    pub sudo_root: bool,
    /// Target user for password authentication
    pub user: Option<String>,
    /// Secret-store bucket holding the user's password
    pub bucket: Option<String>,
}

/// Identity every per-host task authenticates with
#[derive(Debug, Clone)]
pub enum CredentialContext {
    /// User and password from the secret store
    PasswordAuth { user: String, secret: Secret },
    /// Key-based login as root; the process already runs as root
    PasswordlessPrivileged { user: String },
}

impl CredentialContext {
    /// Resolve the run's credential
    ///
    /// # Errors
    /// - `CoreError::Permission` when privileged mode is requested without privilege
    /// - `CoreError::Config` for a missing user or bucket, or an unknown bucket
    pub async fn resolve(
        request: &CredentialRequest,
        store: &dyn SecretStore,
        privilege: &dyn PrivilegeCheck,
    ) -> Result<Arc<Self>, CoreError> {
        if request.sudo_root {
            if !privilege.is_privileged() {
                return Err(CoreError::Permission(format!(
                    "privileged mode requires running as {PRIVILEGED_USER}"
                )));
            }
            if request.user.is_some() || request.bucket.is_some() {
                debug!("user and bucket ignored in privileged mode");
            }
            info!(user = PRIVILEGED_USER, "using passwordless privileged mode");
            return Ok(Arc::new(Self::PasswordlessPrivileged {
                user: PRIVILEGED_USER.to_string(),
            }));
        }

        let user = non_empty(request.user.as_deref())
            .ok_or_else(|| CoreError::Config("a target user is required".to_string()))?;
        let bucket = non_empty(request.bucket.as_deref())
            .ok_or_else(|| CoreError::Config("a secret bucket is required".to_string()))?;

        if !store.bucket_exists(bucket).await? {
            return Err(CoreError::Config(format!("bucket not found: {bucket}")));
        }

        let secret = store.get_secret(bucket).await?;
        info!(user = %user, bucket = %bucket, "resolved password credential");

        Ok(Arc::new(Self::PasswordAuth {
            user: user.to_string(),
            secret,
        }))
    }

    /// Login user
    #[must_use]
    pub fn user(&self) -> &str {
        match self {
            Self::PasswordAuth { user, .. } | Self::PasswordlessPrivileged { user } => user,
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
