//! Result types for command execution

use std::time::Duration;

/// Result of a command execution
#[derive(Debug, Clone, Default)]
pub struct CommandResult {
    /// Exit status code (0 for success)
    pub status: i32,
    /// stdout output
    pub stdout: String,
    /// stderr output
    pub stderr: String,
    /// stdout and stderr interleaved in arrival order
    pub combined: String,
    /// Time taken to execute
    pub duration: Duration,
}

impl CommandResult {
    /// Check if command succeeded (exit code 0)
    #[must_use]
    pub fn success(&self) -> bool {
        self.status == 0
    }

    /// Combined output with the remote shell's leading blank line removed
    ///
    /// Login banners on some hosts emit a single empty line before any
    /// command output; only that first line is dropped.
    #[must_use]
    pub fn output_without_banner(&self) -> &str {
        let out = self.combined.as_str();
        out.strip_prefix("\r\n")
            .or_else(|| out.strip_prefix('\n'))
            .unwrap_or(out)
    }
}

/// Connection information for SSH
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    /// Host address
    pub host: String,
    /// Port (default 22)
    pub port: u16,
    /// Username
    pub user: String,
    /// Bound on establishing the TCP session
    pub connect_timeout: Option<Duration>,
}

const DEFAULT_PORT: u16 = 22;

impl ConnectionInfo {
    /// Create new connection info
    pub fn new(host: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            user: user.into(),
            connect_timeout: None,
        }
    }

    /// Set custom port
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set connect timeout
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }
}
