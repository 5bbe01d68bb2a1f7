use thiserror::Error;

use agentrun_core::{CoreError, StoreError};

/// Failure of a reconciliation that could not be recorded on the object itself.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("store: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("invalid schedule {schedule:?}: {reason}")]
    InvalidSchedule { schedule: String, reason: String },
}

impl ReconcileError {
    /// Retrying the same reconciliation later may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            ReconcileError::Store(e) => e.is_transient(),
            ReconcileError::Core(e) => !e.is_permanent(),
            ReconcileError::InvalidSchedule { .. } => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_infrastructure_failures_are_transient() {
        assert!(ReconcileError::from(StoreError::Conflict("Task ns/a".into())).is_transient());
        assert!(ReconcileError::from(CoreError::from(StoreError::Unavailable("down".into()))).is_transient());
        assert!(!ReconcileError::from(CoreError::InvalidSpec("x".into())).is_transient());
        assert!(
            !ReconcileError::InvalidSchedule {
                schedule: "bad".into(),
                reason: "nope".into()
            }
            .is_transient()
        );
    }
}
