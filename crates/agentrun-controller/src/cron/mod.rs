//! Cron recurrence: create task instances on schedule under a concurrency policy, prune history.

mod schedule;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument};

use agentrun_model::{
    ConcurrencyPolicy, CronTask, LABEL_CRON, ObjectMeta, Resource, Task, TaskPhase,
};

use crate::reconciler::replace_if_unchanged;
use crate::{Action, Deps, ReconcileError, Reconciler};

pub struct CronReconciler {
    deps: Deps,
}

impl CronReconciler {
    pub fn new(deps: Deps) -> Self {
        Self { deps }
    }

    fn instance(cron: &CronTask, at: DateTime<Utc>) -> Task {
        Task::new(
            ObjectMeta::new(cron.namespace(), cron.task_name(at))
                .with_label(LABEL_CRON, cron.name())
                .with_owner(cron.owner_ref()),
            cron.spec.task_template.clone(),
        )
    }

    /// Delete the oldest finished instances beyond the history limits.
    async fn prune(&self, cron: &CronTask, owned: &[Task]) -> Result<(), ReconcileError> {
        let tasks = self.deps.api::<Task>(cron.namespace());
        for (phase, limit) in [
            (TaskPhase::Completed, cron.spec.successful_limit()),
            (TaskPhase::Failed, cron.spec.failed_limit()),
        ] {
            let mut finished: Vec<&Task> = owned
                .iter()
                .filter(|t| t.status.phase == Some(phase))
                .collect();
            if finished.len() <= limit {
                continue;
            }
            finished.sort_by(|a, b| {
                (a.metadata.creation_timestamp, &a.metadata.name)
                    .cmp(&(b.metadata.creation_timestamp, &b.metadata.name))
            });
            let excess = finished.len() - limit;
            for task in finished.into_iter().take(excess) {
                tasks.delete(task.name()).await?;
                debug!(task = %task.name(), ?phase, "history pruned");
            }
        }
        Ok(())
    }
}

fn is_active(task: &Task) -> bool {
    !task.status.is_terminal()
}

#[async_trait]
impl Reconciler for CronReconciler {
    type Object = CronTask;

    fn name(&self) -> &'static str {
        "cron"
    }

    fn owns(&self) -> &'static [&'static str] {
        &["Task"]
    }

    #[instrument(level = "info", skip_all, fields(cron = %cron.name(), ns = %cron.namespace()))]
    async fn reconcile(&self, cron: Arc<CronTask>) -> Result<Action, ReconcileError> {
        if cron.spec.is_suspended() {
            debug!("suspended");
            return Ok(Action::AwaitChange);
        }

        let schedule = schedule::parse(&cron.spec.schedule)?;
        let now = self.deps.clock.now();
        let tasks = self.deps.api::<Task>(cron.namespace());
        let mut owned = tasks.list_owned_by(&cron.metadata.uid).await?;
        let mut status = cron.status.clone();

        let since = status
            .last_schedule_time
            .or(cron.metadata.creation_timestamp)
            .unwrap_or(now);

        if let Some(at) = schedule::latest_due(&schedule, since, now) {
            let active: Vec<String> = owned
                .iter()
                .filter(|t| is_active(t))
                .map(|t| t.metadata.name.clone())
                .collect();

            match cron.spec.concurrency_policy {
                ConcurrencyPolicy::Forbid if !active.is_empty() => {
                    info!(%at, active = active.len(), "firing skipped; previous instance still active");
                }
                policy => {
                    if policy == ConcurrencyPolicy::Replace {
                        for name in &active {
                            tasks.delete(name).await?;
                            info!(task = %name, "active instance replaced");
                        }
                        owned.retain(|t| !active.contains(&t.metadata.name));
                    }
                    let (instance, created) = tasks.ensure(&Self::instance(&cron, at)).await?;
                    if created {
                        info!(task = %instance.name(), %at, "instance created");
                        owned.push(instance);
                    }
                    status.last_schedule_time = Some(at);
                }
            }
        }

        let mut active: Vec<String> = owned
            .iter()
            .filter(|t| is_active(t))
            .map(|t| t.metadata.name.clone())
            .collect();
        active.sort();
        status.active = active;
        let last_success = owned
            .iter()
            .filter(|t| t.status.phase == Some(TaskPhase::Completed))
            .filter_map(|t| t.status.completion_time)
            .max();
        status.last_successful_time = status.last_successful_time.max(last_success);

        if status != cron.status {
            let retries = self.deps.config.status_retries;
            self.deps
                .api::<CronTask>(cron.namespace())
                .update_with(cron.name(), retries, |c| {
                    replace_if_unchanged(&mut c.status, &cron.status, &status);
                })
                .await?;
        }

        self.prune(&cron, &owned).await?;

        let fallback = Action::requeue_after(now, self.deps.config.cron_requeue());
        Ok(match schedule::next_after(&schedule, now) {
            Some(next) => Action::RequeueAt(next).min(fallback),
            None => fallback,
        })
    }
}
