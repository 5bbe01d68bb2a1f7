use std::sync::Arc;

use async_trait::async_trait;

use agentrun_core::{Api, Clock, ControllerConfig, Store};
use agentrun_model::Resource;

use crate::{Action, ReconcileError};

/// Collaborators every reconciler is constructed with.
#[derive(Clone)]
pub struct Deps {
    pub store: Arc<dyn Store>,
    pub clock: Arc<dyn Clock>,
    pub config: Arc<ControllerConfig>,
}

impl Deps {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>, config: ControllerConfig) -> Self {
        Self {
            store,
            clock,
            config: Arc::new(config),
        }
    }

    pub fn api<R: Resource>(&self, namespace: &str) -> Api<R> {
        Api::namespaced(Arc::clone(&self.store), namespace)
    }
}

/// Level-triggered reconciliation of one resource kind.
#[async_trait]
pub trait Reconciler: Send + Sync + 'static {
    type Object: Resource;

    /// Controller name used in logs and metric labels.
    fn name(&self) -> &'static str;

    /// Child kinds whose changes re-trigger the controlling owner.
    fn owns(&self) -> &'static [&'static str] {
        &[]
    }

    async fn reconcile(&self, object: Arc<Self::Object>) -> Result<Action, ReconcileError>;
}

/// Overwrite `current` with `next` only while it still equals `base`, the value `next` was derived
/// from. Returns `false` when another writer changed it in between.
pub(crate) fn replace_if_unchanged<T: PartialEq + Clone>(current: &mut T, base: &T, next: &T) -> bool {
    if current != base {
        return false;
    }
    current.clone_from(next);
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replace_if_unchanged_keeps_foreign_writes() {
        let mut current = vec![1];
        assert!(replace_if_unchanged(&mut current, &vec![1], &vec![1, 2]));
        assert_eq!(current, vec![1, 2]);

        assert!(!replace_if_unchanged(&mut current, &vec![1], &vec![9]));
        assert_eq!(current, vec![1, 2]);
    }
}
