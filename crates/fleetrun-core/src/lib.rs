//! fleetrun-core: Fleet command-execution engine
//!
//! Loads the host list, resolves the run's credential, fans one task per host
//! out at a throttled launch rate, and aggregates the per-host result files.

pub mod aggregate;
pub mod config;
pub mod credential;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod registry;
pub mod state;
pub mod summary;
pub mod task;

#[cfg(test)]
mod testing;

pub use aggregate::Aggregator;
pub use config::{AggregateSinks, DEFAULT_RATE, RunConfig};
pub use credential::{
    CredentialContext, CredentialRequest, EffectiveUid, PrivilegeCheck, Secret, SecretStore,
};
pub use dispatcher::{DispatchReport, Dispatcher, LaunchRate};
pub use engine::Engine;
pub use error::CoreError;
pub use registry::{Host, HostRegistry};
pub use state::TaskState;
pub use summary::RunSummary;
pub use task::{HostTask, TaskContext, TaskResult, TransportFactory};
