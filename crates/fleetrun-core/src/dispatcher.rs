//! Rate-limited dispatcher
//!
//! Launches one task per host in registry order, spacing launches by the
//! configured rate, then waits for every task. The rate caps how fast new
//! connections start, not how many run at once.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::registry::Host;
use crate::task::{HostTask, TaskResult};

/// New connection attempts per second
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchRate(i64);

impl LaunchRate {
    /// Wrap a raw rate; zero or negative disables spacing
    #[must_use]
    pub fn new(per_second: i64) -> Self {
        Self(per_second)
    }

    /// Gap between two launches, `None` when launches are unthrottled
    #[must_use]
    pub fn delay(self) -> Option<Duration> {
        let rate = u64::try_from(self.0).ok().filter(|r| *r > 0)?;
        Some(Duration::from_micros(1_000_000 / rate))
    }
}

impl Default for LaunchRate {
    fn default() -> Self {
        Self(crate::config::DEFAULT_RATE)
    }
}

/// What happened during the dispatch phase
#[derive(Debug)]
pub struct DispatchReport {
    /// Results of tasks that completed, in launch order
    pub results: Vec<TaskResult>,
    /// Instant of each launch, in launch order
    pub launches: Vec<Instant>,
    /// Hosts whose task panicked
    pub panicked: Vec<Host>,
    /// Taken before the first launch
    pub started: Instant,
    /// Taken after the global join
    pub finished: Instant,
    /// Wall clock before the first launch
    pub started_at: DateTime<Utc>,
    /// Wall clock after the global join
    pub finished_at: DateTime<Utc>,
}

impl DispatchReport {
    /// Duration of the dispatch phase
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.finished.duration_since(self.started)
    }
}

/// Launch-throttled fan-out over per-host tasks
#[derive(Debug, Clone, Copy, Default)]
pub struct Dispatcher {
    rate: LaunchRate,
}

impl Dispatcher {
    /// Create a dispatcher launching at most `rate` tasks per second
    #[must_use]
    pub fn new(rate: LaunchRate) -> Self {
        Self { rate }
    }

    /// Launch every task and wait for all of them
    pub async fn dispatch(&self, tasks: Vec<HostTask>) -> DispatchReport {
        let delay = self.rate.delay();
        let total = tasks.len();

        info!(hosts = total, delay = ?delay, "dispatch starting");

        let started_at = Utc::now();
        let started = Instant::now();

        let mut handles: Vec<(Host, JoinHandle<TaskResult>)> = Vec::with_capacity(total);
        let mut launches = Vec::with_capacity(total);

        for (index, task) in tasks.into_iter().enumerate() {
            if index > 0
                && let Some(gap) = delay
            {
                tokio::time::sleep(gap).await;
            }

            let host = task.host().clone();
            debug!(host = %host, index, "launching task");
            launches.push(Instant::now());
            handles.push((host, tokio::spawn(task.run())));
        }

        let mut results = Vec::with_capacity(total);
        let mut panicked = Vec::new();

        for (host, handle) in handles {
            match handle.await {
                Ok(result) => results.push(result),
                Err(e) => {
                    error!(host = %host, error = %e, "task panicked");
                    panicked.push(host);
                }
            }
        }

        let finished = Instant::now();
        let finished_at = Utc::now();

        info!(
            hosts = total,
            completed = results.len(),
            panicked = panicked.len(),
            elapsed = ?finished.duration_since(started),
            "dispatch finished"
        );

        DispatchReport {
            results,
            launches,
            panicked,
            started,
            finished,
            started_at,
            finished_at,
        }
    }
}
