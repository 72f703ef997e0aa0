//! Core error types for fleetrun-core

use thiserror::Error;

/// Setup-phase errors that abort a run before any host work starts
///
/// Per-host failures never surface here; they are recorded as text in the
/// host's result file.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// Missing or invalid option, unknown bucket, conflicting options
    #[error("configuration error: {0}")]
    Config(String),

    /// Host list or command bundle missing, empty or unreadable
    #[error("input error: {0}")]
    Input(String),

    /// Output directory not accessible or privileged mode without privilege
    #[error("permission error: {0}")]
    Permission(String),

    /// Writing an aggregate failed after dispatch
    #[error("aggregation failed: {0}")]
    Aggregate(String),
}

impl CoreError {
    /// Process exit code for this error class
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            CoreError::Config(_) => 2,
            CoreError::Input(_) => 3,
            CoreError::Permission(_) => 4,
            CoreError::Aggregate(_) => 5,
        }
    }
}
