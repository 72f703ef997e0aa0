//! Configuration loading and types

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Top-level configuration file (`fleetrun.toml`)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Run defaults, overridden by flags
    #[serde(default)]
    pub defaults: RunDefaults,
    /// Secret store settings
    #[serde(default)]
    pub secrets: SecretsConfig,
    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Defaults applied when the matching flag is absent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunDefaults {
    /// New connections per second
    #[serde(default = "default_rate")]
    pub rate: i64,
    /// Reachability probe timeout in seconds
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,
    /// Aggregate file prefix
    #[serde(default = "default_aggregate_prefix")]
    pub aggregate_prefix: String,
    /// Remote directory receiving the bundle
    #[serde(default = "default_remote_tmp_dir")]
    pub remote_tmp_dir: String,
    /// Extra transport options
    #[serde(default)]
    pub ssh_options: Option<String>,
    /// Private key for privileged mode
    pub ssh_key: Option<PathBuf>,
    /// Environment variable holding a base64 private key for privileged mode
    pub ssh_key_env: Option<String>,
}

impl Default for RunDefaults {
    fn default() -> Self {
        Self {
            rate: default_rate(),
            probe_timeout_secs: default_probe_timeout_secs(),
            aggregate_prefix: default_aggregate_prefix(),
            remote_tmp_dir: default_remote_tmp_dir(),
            ssh_options: None,
            ssh_key: None,
            ssh_key_env: None,
        }
    }
}

fn default_rate() -> i64 {
    fleetrun_core::config::DEFAULT_RATE
}

fn default_probe_timeout_secs() -> u64 {
    fleetrun_core::config::DEFAULT_PROBE_TIMEOUT.as_secs()
}

fn default_aggregate_prefix() -> String {
    fleetrun_core::config::DEFAULT_AGGREGATE_PREFIX.to_string()
}

fn default_remote_tmp_dir() -> String {
    fleetrun_core::config::DEFAULT_REMOTE_TMP_DIR.to_string()
}

/// External secret manager settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecretsConfig {
    /// Program answering `exists <bucket>` and `get <bucket>`
    #[serde(default = "default_secret_command")]
    pub command: String,
}

impl Default for SecretsConfig {
    fn default() -> Self {
        Self {
            command: default_secret_command(),
        }
    }
}

fn default_secret_command() -> String {
    "secret-store".to_string()
}

/// Log output settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Level filter used when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,
    /// `pretty` or `json`
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Log line format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl Config {
    /// Load configuration from file
    ///
    /// # Errors
    /// Returns error if file cannot be read or parsed
    pub fn load(path: &Path) -> eyre::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load an explicit path, or the first file found on the default paths
    ///
    /// # Errors
    /// Returns error if a file exists but cannot be read or parsed
    pub fn load_default(explicit: Option<&Path>) -> eyre::Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }

        if let Ok(path) = std::env::var("FLEETRUN_CONFIG") {
            return Self::load(Path::new(&path));
        }

        let paths = [
            Some(PathBuf::from("fleetrun.toml")),
            Some(PathBuf::from("/etc/fleetrun/fleetrun.toml")),
            dirs::config_dir().map(|p| p.join("fleetrun/fleetrun.toml")),
        ];

        for path in paths.into_iter().flatten() {
            if path.exists() {
                return Self::load(&path);
            }
        }

        Ok(Config::default())
    }
}
