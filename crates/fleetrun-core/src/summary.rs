//! Run summary

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::dispatcher::DispatchReport;

/// Host count and dispatch wall time
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub host_count: usize,
    pub elapsed_seconds: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Hosts that failed the probe
    pub unreachable: usize,
    /// Reachable hosts whose bundle did not exit 0, plus panicked tasks
    pub failed: usize,
}

impl RunSummary {
    /// Derive the summary from a finished dispatch
    #[must_use]
    pub fn from_report(host_count: usize, report: &DispatchReport) -> Self {
        let unreachable = report.results.iter().filter(|r| !r.reachable).count();
        let failed = report
            .results
            .iter()
            .filter(|r| r.reachable && !r.succeeded())
            .count()
            + report.panicked.len();

        Self {
            host_count,
            elapsed_seconds: report.elapsed().as_secs(),
            started_at: report.started_at,
            finished_at: report.finished_at,
            unreachable,
            failed,
        }
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} hosts processed in {}s ({} unreachable, {} failed)",
            self.host_count, self.elapsed_seconds, self.unreachable, self.failed
        )
    }
}
