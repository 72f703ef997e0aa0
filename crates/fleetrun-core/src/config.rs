//! Run configuration consumed by the engine

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default launch rate in connections per second
pub const DEFAULT_RATE: i64 = 25;

/// Default reachability probe timeout
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Default aggregate file prefix
pub const DEFAULT_AGGREGATE_PREFIX: &str = "aggregate";

/// Default remote directory for transferred bundles
pub const DEFAULT_REMOTE_TMP_DIR: &str = "/tmp";

/// Where the aggregate view goes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateSinks {
    /// Write `<prefix>-<run id>.txt` into the output directory
    pub to_file: bool,
    /// Stream the aggregate to the console
    pub to_console: bool,
}

impl AggregateSinks {
    /// Whether any sink is enabled
    #[must_use]
    pub fn any(&self) -> bool {
        self.to_file || self.to_console
    }
}

/// Values the engine needs for one run
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Host-list file
    pub host_list: PathBuf,
    /// Local command bundle copied to every host
    pub bundle: PathBuf,
    /// Directory receiving `<host>.txt` result files
    pub output_dir: PathBuf,
    /// New connections per second; `<= 0` disables the launch delay
    pub rate: i64,
    /// Bound on each reachability probe
    pub probe_timeout: Duration,
    /// Aggregate sinks
    pub aggregate: AggregateSinks,
    /// Aggregate file name prefix
    pub aggregate_prefix: String,
    /// Token unique to this run, used in remote and aggregate file names
    pub run_id: String,
    /// Remote directory receiving the bundle
    pub remote_tmp_dir: String,
}

impl RunConfig {
    /// Config with defaults for everything but the three paths
    pub fn new(
        host_list: impl Into<PathBuf>,
        bundle: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            host_list: host_list.into(),
            bundle: bundle.into(),
            output_dir: output_dir.into(),
            rate: DEFAULT_RATE,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            aggregate: AggregateSinks::default(),
            aggregate_prefix: DEFAULT_AGGREGATE_PREFIX.to_string(),
            run_id: std::process::id().to_string(),
            remote_tmp_dir: DEFAULT_REMOTE_TMP_DIR.to_string(),
        }
    }
}
