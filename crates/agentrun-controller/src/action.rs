use chrono::{DateTime, Utc};

/// What the runtime should do with an object after a reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Nothing to do until the object or one of its children changes.
    AwaitChange,
    /// Reconcile again at the given instant, or earlier on change.
    RequeueAt(DateTime<Utc>),
}

impl Action {
    pub fn requeue_after(now: DateTime<Utc>, after: std::time::Duration) -> Self {
        let after = chrono::Duration::from_std(after).unwrap_or_else(|_| chrono::Duration::zero());
        Action::RequeueAt(now + after)
    }

    pub fn deadline(&self) -> Option<DateTime<Utc>> {
        match self {
            Action::AwaitChange => None,
            Action::RequeueAt(at) => Some(*at),
        }
    }

    /// The earlier of two wake-ups.
    pub fn min(self, other: Action) -> Action {
        match (self.deadline(), other.deadline()) {
            (Some(a), Some(b)) => Action::RequeueAt(a.min(b)),
            (Some(_), None) => self,
            _ => other,
        }
    }
}
