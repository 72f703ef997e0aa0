//! Result aggregation in host-list order

use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::config::AggregateSinks;
use crate::error::CoreError;
use crate::registry::{Host, HostRegistry};

/// Section header preceding each host's output
#[must_use]
pub fn section_header(host: &Host) -> String {
    format!("----- {host} -----\n")
}

/// Builds the combined view of every host's result file
#[derive(Debug, Clone)]
pub struct Aggregator {
    output_dir: PathBuf,
    host_list: PathBuf,
}

impl Aggregator {
    /// Create an aggregator over `output_dir`, ordered by `host_list`
    pub fn new(output_dir: impl Into<PathBuf>, host_list: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            host_list: host_list.into(),
        }
    }

    /// Path of the aggregate file for a run
    #[must_use]
    pub fn file_path(&self, prefix: &str, run_id: &str) -> PathBuf {
        self.output_dir.join(format!("{prefix}-{run_id}.txt"))
    }

    /// Render the aggregate
    ///
    /// The host list is re-read through the registry so ordering and
    /// filtering match the dispatch exactly.
    ///
    /// # Errors
    /// Returns `CoreError::Input` if the host list can no longer be loaded
    pub fn render(&self) -> Result<String, CoreError> {
        let registry = HostRegistry::load(&self.host_list)?;
        let mut out = String::new();

        for host in &registry {
            out.push_str(&section_header(host));

            let path = self.output_dir.join(host.result_file_name());
            match std::fs::read_to_string(&path) {
                Ok(content) => {
                    out.push_str(&content);
                    if !content.is_empty() && !content.ends_with('\n') {
                        out.push('\n');
                    }
                }
                Err(e) => warn!(host = %host, path = %path.display(), error = %e, "no result file"),
            }

            out.push('\n');
        }

        Ok(out)
    }

    /// Write the aggregate file and return its path
    ///
    /// # Errors
    /// Returns `CoreError::Aggregate` if the file cannot be written
    pub fn write_file(&self, prefix: &str, run_id: &str) -> Result<PathBuf, CoreError> {
        let rendered = self.render()?;
        let path = self.file_path(prefix, run_id);

        std::fs::write(&path, rendered)
            .map_err(|e| CoreError::Aggregate(format!("{}: {e}", path.display())))?;

        info!(path = %path.display(), "wrote aggregate file");
        Ok(path)
    }

    /// Send the aggregate to the enabled sinks
    ///
    /// With both sinks on, the console gets the file's bytes read back so the
    /// two outputs are identical.
    ///
    /// # Errors
    /// Returns `CoreError::Aggregate` if writing either sink fails
    pub fn emit(
        &self,
        sinks: AggregateSinks,
        prefix: &str,
        run_id: &str,
        console: &mut dyn Write,
    ) -> Result<Option<PathBuf>, CoreError> {
        let file = if sinks.to_file {
            Some(self.write_file(prefix, run_id)?)
        } else {
            None
        };

        if sinks.to_console {
            let content = match &file {
                Some(path) => read_back(path)?,
                None => self.render()?,
            };
            console
                .write_all(content.as_bytes())
                .and_then(|()| console.flush())
                .map_err(|e| CoreError::Aggregate(format!("console: {e}")))?;
        }

        Ok(file)
    }
}

fn read_back(path: &Path) -> Result<String, CoreError> {
    std::fs::read_to_string(path)
        .map_err(|e| CoreError::Aggregate(format!("{}: {e}", path.display())))
}
