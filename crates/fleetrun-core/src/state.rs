//! Per-host task state machine types

use std::fmt;

/// States of a per-host task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Pending,
    Probing,
    Unreachable,
    Transferring,
    Executing,
    Recorded,
}

impl TaskState {
    /// Whether moving to `next` is a legal step
    #[must_use]
    pub fn can_transition_to(self, next: TaskState) -> bool {
        use TaskState::{Executing, Pending, Probing, Recorded, Transferring, Unreachable};

        matches!(
            (self, next),
            (Pending, Probing)
                | (Probing, Unreachable | Transferring)
                | (Transferring, Executing)
                | (Unreachable | Transferring | Executing, Recorded)
        )
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskState::Pending => "pending",
            TaskState::Probing => "probing",
            TaskState::Unreachable => "unreachable",
            TaskState::Transferring => "transferring",
            TaskState::Executing => "executing",
            TaskState::Recorded => "recorded",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reachable_path() {
        let path = [
            TaskState::Pending,
            TaskState::Probing,
            TaskState::Transferring,
            TaskState::Executing,
            TaskState::Recorded,
        ];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_unreachable_skips_transfer() {
        assert!(TaskState::Probing.can_transition_to(TaskState::Unreachable));
        assert!(TaskState::Unreachable.can_transition_to(TaskState::Recorded));
        assert!(!TaskState::Unreachable.can_transition_to(TaskState::Transferring));
    }

    #[test]
    fn test_connection_failure_records_directly() {
        assert!(TaskState::Transferring.can_transition_to(TaskState::Recorded));
        assert!(!TaskState::Probing.can_transition_to(TaskState::Recorded));
    }

    #[test]
    fn test_recorded_is_final() {
        for next in [TaskState::Pending, TaskState::Probing, TaskState::Executing] {
            assert!(!TaskState::Recorded.can_transition_to(next));
        }
    }
}
