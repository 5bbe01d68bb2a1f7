use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};

use agentrun_core::{Api, ControllerConfig, ManualClock, MemoryStore, Store};
use agentrun_model::{ExecutionProfile, ExecutionProfileSpec, ObjectMeta, Resource};

use crate::{Action, Deps, ReconcileError, Reconciler};

pub(crate) const NS: &str = "ns";

pub(crate) fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
}

pub(crate) struct Fixture {
    pub store: MemoryStore,
    pub clock: Arc<ManualClock>,
    pub deps: Deps,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_config(ControllerConfig::default())
    }

    pub fn with_config(config: ControllerConfig) -> Self {
        let clock = Arc::new(ManualClock::new(t0()));
        let store = MemoryStore::with_clock(clock.clone());
        let deps = Deps::new(Arc::new(store.clone()) as Arc<dyn Store>, clock.clone(), config);
        Self { store, clock, deps }
    }

    pub fn api<R: Resource>(&self) -> Api<R> {
        self.deps.api(NS)
    }

    pub async fn profile(&self, name: &str) -> ExecutionProfile {
        let mut spec = ExecutionProfileSpec::new("agent:1", "agent-sa");
        spec.command = Some(vec!["agent".into(), "run".into()]);
        self.api::<ExecutionProfile>()
            .create(&ExecutionProfile {
                metadata: ObjectMeta::new(NS, name),
                spec,
            })
            .await
            .unwrap()
    }

    /// Reconcile the stored copy of `name`.
    pub async fn step<C>(&self, reconciler: &C, name: &str) -> Result<Action, ReconcileError>
    where
        C: Reconciler,
    {
        let object = self.api::<C::Object>().get(name).await.unwrap();
        reconciler.reconcile(Arc::new(object)).await
    }
}
