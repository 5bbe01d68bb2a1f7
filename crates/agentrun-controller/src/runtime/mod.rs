//! Watch-driven runtime driving one [`Reconciler`].

mod queue;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::broadcast::error::RecvError;
use tokio::task::{Id, JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, trace, warn};

use agentrun_core::{ObjectKey, Store, StoreError, WatchEvent, WatchOp};
use agentrun_model::{ObjectMeta, Resource};

use crate::{Action, ControllerMetrics, Deps, ReconcileError, Reconciler};
use queue::WorkQueue;

type Outcome = (ObjectKey, Result<Action, ReconcileError>, Duration);

/// Runs reconciliations of one kind: distinct keys concurrently, the same key never twice at once.
pub struct Controller<R: Reconciler> {
    reconciler: Arc<R>,
    deps: Deps,
    metrics: ControllerMetrics,
}

impl<R: Reconciler> Controller<R> {
    pub fn new(reconciler: R, deps: Deps, metrics: ControllerMetrics) -> Self {
        Self {
            reconciler: Arc::new(reconciler),
            deps,
            metrics,
        }
    }

    /// Reconcile until `cancel` fires or the store's watch stream closes.
    ///
    /// Every existing object is reconciled once on start.
    #[instrument(level = "info", skip_all, fields(controller = self.reconciler.name()))]
    pub async fn run(self, cancel: CancellationToken) -> Result<(), ReconcileError> {
        let mut events = self.deps.store.watch();
        let mut queue = WorkQueue::new();
        let mut inflight: JoinSet<Outcome> = JoinSet::new();
        let mut keys: HashMap<Id, ObjectKey> = HashMap::new();
        let workers = self.deps.config.workers.max(1);

        self.enqueue_all(&mut queue).await?;
        info!(workers, "controller started");

        loop {
            while inflight.len() < workers {
                let Some(key) = queue.pop() else { break };
                let handle = inflight.spawn(reconcile_key(
                    Arc::clone(&self.reconciler),
                    Arc::clone(&self.deps.store),
                    key.clone(),
                ));
                keys.insert(handle.id(), key);
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                event = events.recv() => match event {
                    Ok(event) => self.route(&mut queue, event),
                    Err(RecvError::Lagged(missed)) => {
                        warn!(missed, "watch lagged; relisting");
                        if let Err(e) = self.enqueue_all(&mut queue).await {
                            error!(error = %e, "relist failed");
                        }
                    }
                    Err(RecvError::Closed) => {
                        info!("watch closed");
                        break;
                    }
                },
                Some(key) = queue.expired(), if queue.has_timers() => queue.push(key),
                Some(joined) = inflight.join_next_with_id(), if !inflight.is_empty() => {
                    self.finish(&mut queue, &mut keys, joined);
                }
            }
        }

        inflight.shutdown().await;
        info!("controller stopped");
        Ok(())
    }

    async fn enqueue_all(&self, queue: &mut WorkQueue) -> Result<(), ReconcileError> {
        let kind = <R::Object as Resource>::KIND;
        let objects = self.deps.store.list(kind, None).await?;
        for value in objects {
            // Only the key is needed here; a body that does not decode fails in its own reconcile.
            match serde_json::from_value::<ObjectMeta>(value["metadata"].clone()) {
                Ok(meta) => queue.push(ObjectKey::new(meta.namespace, meta.name)),
                Err(e) => warn!(kind, error = %e, "skipping stored object without usable metadata"),
            }
        }
        Ok(())
    }

    /// Map a store event to the keys it affects.
    fn route(&self, queue: &mut WorkQueue, event: WatchEvent) {
        let kind = <R::Object as Resource>::KIND;
        if event.kind == kind {
            match event.op {
                WatchOp::Applied => queue.push(event.key),
                WatchOp::Deleted => queue.cancel(&event.key),
            }
            return;
        }
        if !self.reconciler.owns().contains(&event.kind.as_str()) {
            return;
        }
        for owner in event.owners.iter().filter(|o| o.controller && o.kind == kind) {
            trace!(child = %event.key, kind = %event.kind, owner = %owner.name, "child changed");
            queue.push(ObjectKey::new(&event.key.namespace, &owner.name));
        }
    }

    fn finish(
        &self,
        queue: &mut WorkQueue,
        keys: &mut HashMap<Id, ObjectKey>,
        joined: Result<(Id, Outcome), JoinError>,
    ) {
        let name = self.reconciler.name();
        let error_requeue = self.deps.config.error_requeue();

        let (key, result, elapsed) = match joined {
            Ok((id, outcome)) => {
                keys.remove(&id);
                outcome
            }
            Err(e) => {
                error!(error = %e, "reconciliation aborted");
                if let Some(key) = keys.remove(&e.id()) {
                    queue.done(&key);
                    queue.schedule(key, error_requeue);
                }
                self.metrics.observe(name, "panic", Duration::ZERO);
                return;
            }
        };
        queue.done(&key);

        match result {
            Ok(Action::AwaitChange) => {
                self.metrics.observe(name, "ok", elapsed);
                queue.cancel(&key);
            }
            Ok(Action::RequeueAt(at)) => {
                self.metrics.observe(name, "ok", elapsed);
                let delay = (at - self.deps.clock.now()).to_std().unwrap_or(Duration::ZERO);
                debug!(%key, delay_ms = delay.as_millis() as u64, "requeue scheduled");
                queue.schedule(key, delay);
            }
            Err(e) if e.is_transient() => {
                self.metrics.observe(name, "error", elapsed);
                warn!(%key, error = %e, "reconciliation failed; retrying");
                queue.schedule(key, error_requeue);
            }
            Err(e) => {
                self.metrics.observe(name, "error", elapsed);
                error!(%key, error = %e, "reconciliation failed");
                queue.cancel(&key);
            }
        }
    }
}

async fn reconcile_key<R: Reconciler>(
    reconciler: Arc<R>,
    store: Arc<dyn Store>,
    key: ObjectKey,
) -> Outcome {
    let started = Instant::now();
    let result: Result<Action, ReconcileError> = async {
        let kind = <R::Object as Resource>::KIND;
        let Some(value) = store.get(kind, &key).await? else {
            return Ok(Action::AwaitChange);
        };
        let object: R::Object = serde_json::from_value(value).map_err(StoreError::from)?;
        reconciler.reconcile(Arc::new(object)).await
    }
    .await;
    (key, result, started.elapsed())
}
