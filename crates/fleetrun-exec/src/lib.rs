//! fleetrun-exec: Remote execution abstraction
//!
//! Provides the transport capability used by the fleet engine: copying a file
//! to a host and running a command on it, over SSH or locally, plus the
//! reachability probe that gates every per-host task.

pub mod error;
pub mod keys;
pub mod local;
pub mod options;
pub mod probe;
pub mod result;
pub mod ssh;
pub mod traits;

pub use error::ExecError;
pub use keys::{KeyError, KeySource, ResolvedKey};
pub use local::LocalExecutor;
pub use options::SshOptions;
pub use probe::{PingProbe, ReachabilityProbe};
pub use result::{CommandResult, ConnectionInfo};
pub use ssh::{SshAuth, SshExecutor, SshExecutorBuilder};
pub use traits::RemoteExecutor;
