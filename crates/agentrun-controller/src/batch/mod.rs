//! Batch fan-out: one task per variable context set, with aggregate progress and pause/resume.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument};

use agentrun_model::{
    BatchCounters, BatchPhase, BatchRun, BatchRunStatus, BatchTaskPhase, BatchTaskStatus,
    ContextItem, LABEL_BATCH, ObjectMeta, Resource, Task, TaskPhase, TaskSpec,
};

use crate::reconciler::replace_if_unchanged;
use crate::{Action, Deps, ReconcileError, Reconciler};

pub struct BatchReconciler {
    deps: Deps,
}

impl BatchReconciler {
    pub fn new(deps: Deps) -> Self {
        Self { deps }
    }

    /// Task spec of member `index`: constant contexts followed by the index's variable set.
    ///
    /// Members never expire on their own; they live until the batch is deleted, so a finished
    /// member is always observable.
    pub fn member_spec(batch: &BatchRun, index: usize) -> TaskSpec {
        let variable: &[ContextItem] = batch
            .spec
            .variable_contexts
            .get(index)
            .map(Vec::as_slice)
            .unwrap_or_default();
        TaskSpec {
            profile_ref: batch.spec.profile_ref.clone(),
            contexts: batch
                .spec
                .constant_contexts
                .iter()
                .chain(variable)
                .cloned()
                .collect(),
            description: batch.spec.description.clone(),
            keep_alive: batch.spec.keep_alive,
            ttl_seconds_after_finished: Some(0),
            ..Default::default()
        }
    }

    fn member(batch: &BatchRun, index: usize) -> Task {
        Task::new(
            ObjectMeta::new(batch.namespace(), batch.task_name(index))
                .with_label(LABEL_BATCH, batch.name())
                .with_owner(batch.owner_ref()),
            Self::member_spec(batch, index),
        )
    }

    /// Advance `status` against the observed member tasks, creating members when allowed.
    async fn step(
        &self,
        batch: &BatchRun,
        mut status: BatchRunStatus,
        now: DateTime<Utc>,
    ) -> Result<BatchRunStatus, ReconcileError> {
        let tasks = self.deps.api::<Task>(batch.namespace());
        let n = batch.spec.variable_contexts.len();

        if status.tasks.len() != n {
            status.tasks = (0..n)
                .map(|index| BatchTaskStatus {
                    index,
                    name: batch.task_name(index),
                    phase: BatchTaskPhase::Pending,
                    completion_time: None,
                })
                .collect();
            status.phase = Some(BatchPhase::Pending);
            debug!(total = n, "batch status seeded");
        }

        let owned: HashMap<String, Task> = tasks
            .list_owned_by(&batch.metadata.uid)
            .await?
            .into_iter()
            .map(|t| (t.metadata.name.clone(), t))
            .collect();

        for entry in status.tasks.iter_mut() {
            observe(entry, owned.get(&entry.name), now);
        }

        if !batch.is_paused() {
            let running = status
                .tasks
                .iter()
                .filter(|t| t.phase == BatchTaskPhase::Running)
                .count();
            let mut budget = batch
                .spec
                .parallelism
                .map_or(usize::MAX, |p| p.max(1).saturating_sub(running));

            for entry in status.tasks.iter_mut() {
                if budget == 0 {
                    break;
                }
                if entry.phase != BatchTaskPhase::Pending {
                    continue;
                }
                let (_, created) = tasks.ensure(&Self::member(batch, entry.index)).await?;
                if created {
                    debug!(task = %entry.name, "member task created");
                }
                entry.phase = BatchTaskPhase::Running;
                status.start_time.get_or_insert(now);
                budget -= 1;
            }
        }

        status.counters = BatchCounters::tally(&status.tasks);
        let c = status.counters;
        status.phase = Some(if c.is_settled() {
            status.completion_time.get_or_insert(now);
            if c.failed > 0 {
                BatchPhase::Failed
            } else {
                BatchPhase::Succeeded
            }
        } else if batch.is_paused() {
            BatchPhase::Paused
        } else if c.pending == c.total {
            BatchPhase::Pending
        } else {
            BatchPhase::Running
        });
        Ok(status)
    }
}

/// Fold the member task's phase into its batch entry. Terminal entries never move.
fn observe(entry: &mut BatchTaskStatus, task: Option<&Task>, now: DateTime<Utc>) {
    match (entry.phase, task) {
        (BatchTaskPhase::Completed | BatchTaskPhase::Failed, _) => {}
        (BatchTaskPhase::Running, None) => {
            entry.phase = BatchTaskPhase::Failed;
            entry.completion_time = Some(now);
        }
        (_, None) => {}
        (_, Some(task)) => match task.status.phase {
            Some(TaskPhase::Completed) => {
                entry.phase = BatchTaskPhase::Completed;
                entry.completion_time = Some(task.status.completion_time.unwrap_or(now));
            }
            Some(TaskPhase::Failed) => {
                entry.phase = BatchTaskPhase::Failed;
                entry.completion_time = Some(task.status.completion_time.unwrap_or(now));
            }
            _ => entry.phase = BatchTaskPhase::Running,
        },
    }
}

#[async_trait]
impl Reconciler for BatchReconciler {
    type Object = BatchRun;

    fn name(&self) -> &'static str {
        "batch"
    }

    fn owns(&self) -> &'static [&'static str] {
        &["Task"]
    }

    #[instrument(level = "info", skip_all, fields(batch = %batch.name(), ns = %batch.namespace(), phase = ?batch.status.phase))]
    async fn reconcile(&self, batch: Arc<BatchRun>) -> Result<Action, ReconcileError> {
        if batch.status.phase.is_some_and(|p| p.is_terminal()) {
            return Ok(Action::AwaitChange);
        }

        let now = self.deps.clock.now();
        let status = self.step(&batch, batch.status.clone(), now).await?;
        let phase = status.phase;
        let counters = status.counters;

        if status != batch.status {
            self.deps
                .api::<BatchRun>(batch.namespace())
                .update_with(batch.name(), self.deps.config.status_retries, |b| {
                    replace_if_unchanged(&mut b.status, &batch.status, &status);
                })
                .await?;
        }

        match phase {
            Some(p) if p.is_terminal() => {
                info!(
                    completed = counters.completed,
                    failed = counters.failed,
                    phase = ?p,
                    "batch finished"
                );
                Ok(Action::AwaitChange)
            }
            Some(BatchPhase::Paused) if counters.running == 0 => Ok(Action::AwaitChange),
            _ => Ok(Action::requeue_after(now, self.deps.config.batch_poll())),
        }
    }
}

#[cfg(test)]
mod tests;
