//! Reachability probing

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, instrument};

use crate::local::LocalExecutor;
use crate::traits::RemoteExecutor;

/// Decides whether a host answers before any transfer is attempted
#[async_trait]
pub trait ReachabilityProbe: Send + Sync {
    /// `true` when `host` answered within `timeout`
    async fn is_reachable(&self, host: &str, timeout: Duration) -> bool;
}

/// Single ICMP echo through the system `ping` binary
#[derive(Debug, Clone, Default)]
pub struct PingProbe {
    executor: LocalExecutor,
}

impl PingProbe {
    /// Create a new probe
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the ping command line for `host`
    fn command(host: &str, timeout: Duration) -> String {
        let wait = timeout.as_secs().max(1);
        format!("ping -c 1 -W {wait} {}", shell_words::quote(host))
    }
}

#[async_trait]
impl ReachabilityProbe for PingProbe {
    #[instrument(skip(self), level = "debug")]
    async fn is_reachable(&self, host: &str, timeout: Duration) -> bool {
        let cmd = Self::command(host, timeout);
        // ping's own -W only bounds the reply wait, not name resolution
        let bound = timeout + Duration::from_secs(1);

        match self.executor.run_with_timeout(&cmd, bound).await {
            Ok(result) => {
                debug!(host = %host, status = result.status, "probe finished");
                result.success()
            }
            Err(e) => {
                debug!(host = %host, error = %e, "probe failed");
                false
            }
        }
    }
}
