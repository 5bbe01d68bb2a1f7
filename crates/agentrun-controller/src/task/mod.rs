//! Single-task state machine: resolve inputs, submit the unit-of-work, observe it, expire it.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, info, instrument, warn};

use agentrun_core::{ContentAggregator, ContextResolver, CoreError, JobBuilder};
use agentrun_model::{
    Condition, ConditionStatus, ConfigMap, DEFAULT_WORKING_DIR, ExecutionProfile, Job, LABEL_TASK,
    ObjectMeta, Resource, Task, TaskPhase, set_condition,
};

use crate::{Action, Deps, ReconcileError, Reconciler};

/// Condition type carried by every task status.
pub const CONDITION_READY: &str = "Ready";

pub struct TaskReconciler {
    deps: Deps,
    resolver: ContextResolver,
    builder: JobBuilder,
}

impl TaskReconciler {
    pub fn new(deps: Deps) -> Self {
        Self {
            resolver: ContextResolver::new(Arc::clone(&deps.store)),
            builder: JobBuilder::new(&deps.config),
            deps,
        }
    }

    async fn start(&self, task: &Task) -> Result<Action, ReconcileError> {
        let ns = task.namespace();
        let profiles = self.deps.api::<ExecutionProfile>(ns);
        let jobs = self.deps.api::<Job>(ns);

        let Some(profile) = profiles.get_opt(&task.spec.profile_ref).await? else {
            let err = CoreError::ProfileNotFound {
                namespace: ns.to_string(),
                name: task.spec.profile_ref.clone(),
            };
            return self.fail(task, err.reason(), &err.to_string()).await;
        };

        if let Some(job) = jobs.get_opt(&task.job_name()).await? {
            debug!(job = %job.name(), "unit-of-work already exists");
            return self.mark_running(task).await;
        }

        let working_dir = working_dir(&profile);
        let items: Vec<_> = profile
            .spec
            .contexts
            .iter()
            .chain(task.spec.contexts.iter())
            .cloned()
            .collect();

        let resolved = match self.resolver.resolve(ns, working_dir, &items).await {
            Ok(resolved) => resolved,
            Err(e) if e.is_permanent() => {
                return self
                    .fail(task, "ContextResolutionFailed", &e.to_string())
                    .await;
            }
            Err(e) => return Err(e.into()),
        };
        let bundle = ContentAggregator::new(working_dir)
            .aggregate(task.spec.description.as_deref(), resolved);

        let job = match self.builder.build(task, &profile, &bundle) {
            Ok(job) => job,
            Err(e) if e.is_permanent() => return self.fail(task, e.reason(), &e.to_string()).await,
            Err(e) => return Err(e.into()),
        };

        if !bundle.files.is_empty() {
            self.write_context(task, bundle.config_data()).await?;
        }
        let (_, created) = jobs.ensure(&job).await?;
        if created {
            info!(job = %job.name(), "unit-of-work submitted");
        }
        self.mark_running(task).await
    }

    async fn write_context(
        &self,
        task: &Task,
        data: std::collections::BTreeMap<String, String>,
    ) -> Result<(), ReconcileError> {
        let api = self.deps.api::<ConfigMap>(task.namespace());
        let mut cm = ConfigMap::new(
            ObjectMeta::new(task.namespace(), task.context_name())
                .with_label(LABEL_TASK, task.name())
                .with_owner(task.owner_ref()),
        );
        cm.data = data.clone();

        let (existing, created) = api.ensure(&cm).await?;
        if !created && existing.data != data {
            api.update_with(&cm.metadata.name, self.deps.config.status_retries, |c| {
                c.data = data.clone()
            })
            .await?;
        }
        Ok(())
    }

    async fn mark_running(&self, task: &Task) -> Result<Action, ReconcileError> {
        let now = self.deps.clock.now();
        let job_name = task.job_name();
        self.update_status(task, |t| {
            t.status.phase = Some(TaskPhase::Running);
            t.status.job_name = Some(job_name.clone());
            t.status.start_time.get_or_insert(now);
            t.status.message = None;
            set_condition(
                &mut t.status.conditions,
                Condition::new(CONDITION_READY, ConditionStatus::False, "JobRunning", "", now),
            );
        })
        .await?;
        Ok(Action::requeue_after(now, self.deps.config.task_poll()))
    }

    async fn observe(&self, task: &Task) -> Result<Action, ReconcileError> {
        let jobs = self.deps.api::<Job>(task.namespace());
        let job_name = task
            .status
            .job_name
            .clone()
            .unwrap_or_else(|| task.job_name());

        let Some(job) = jobs.get_opt(&job_name).await? else {
            return self
                .fail(task, "JobNotFound", &format!("unit-of-work {job_name} disappeared"))
                .await;
        };

        if job.status.succeeded > 0 {
            let now = self.deps.clock.now();
            let updated = self
                .update_status(task, |t| {
                    t.status.phase = Some(TaskPhase::Completed);
                    t.status.completion_time.get_or_insert(now);
                    t.status.message = None;
                    set_condition(
                        &mut t.status.conditions,
                        Condition::new(CONDITION_READY, ConditionStatus::True, "JobSucceeded", "", now),
                    );
                })
                .await?;
            info!("task completed");
            return Ok(self.expiry(&updated, now));
        }
        if job.status.failed > 0 {
            return self
                .fail(task, "JobFailed", &format!("unit-of-work {job_name} failed"))
                .await;
        }
        Ok(Action::requeue_after(self.deps.clock.now(), self.deps.config.task_poll()))
    }

    async fn fail(&self, task: &Task, reason: &str, message: &str) -> Result<Action, ReconcileError> {
        let now = self.deps.clock.now();
        warn!(reason, message, "task failed");
        let updated = self
            .update_status(task, |t| {
                t.status.phase = Some(TaskPhase::Failed);
                t.status.completion_time.get_or_insert(now);
                t.status.message = Some(message.to_string());
                set_condition(
                    &mut t.status.conditions,
                    Condition::new(CONDITION_READY, ConditionStatus::False, reason, message, now),
                );
            })
            .await?;
        Ok(self.expiry(&updated, now))
    }

    async fn update_status<F>(&self, task: &Task, mut mutate: F) -> Result<Task, ReconcileError>
    where
        F: FnMut(&mut Task) + Send,
    {
        let api = self.deps.api::<Task>(task.namespace());
        let retries = self.deps.config.status_retries;
        Ok(api
            .update_with(task.name(), retries, |t| {
                if !t.status.is_terminal() {
                    mutate(t)
                }
            })
            .await?)
    }

    fn ttl(&self, task: &Task) -> u64 {
        task.spec
            .ttl_seconds_after_finished
            .unwrap_or(self.deps.config.default_ttl_seconds)
    }

    /// Wake-up for deleting a finished task, or none when it is kept forever.
    fn expiry(&self, task: &Task, now: DateTime<Utc>) -> Action {
        let ttl = self.ttl(task);
        if ttl == 0 {
            return Action::AwaitChange;
        }
        let finished = task.status.completion_time.unwrap_or(now);
        // A TTL past the representable calendar never elapses.
        i64::try_from(ttl)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .and_then(|ttl| finished.checked_add_signed(ttl))
            .map_or(Action::AwaitChange, Action::RequeueAt)
    }

    async fn expire(&self, task: &Task) -> Result<Action, ReconcileError> {
        let now = self.deps.clock.now();
        let action = self.expiry(task, now);
        match action.deadline() {
            Some(deadline) if deadline <= now => {
                let api = self.deps.api::<Task>(task.namespace());
                if api.delete(task.name()).await? {
                    info!(ttl = self.ttl(task), "finished task expired");
                }
                Ok(Action::AwaitChange)
            }
            _ => Ok(action),
        }
    }
}

fn working_dir(profile: &ExecutionProfile) -> &str {
    if profile.spec.working_dir.is_empty() {
        DEFAULT_WORKING_DIR
    } else {
        &profile.spec.working_dir
    }
}

#[async_trait]
impl Reconciler for TaskReconciler {
    type Object = Task;

    fn name(&self) -> &'static str {
        "task"
    }

    fn owns(&self) -> &'static [&'static str] {
        &["Job"]
    }

    #[instrument(level = "info", skip_all, fields(task = %task.name(), ns = %task.namespace(), phase = ?task.status.phase))]
    async fn reconcile(&self, task: Arc<Task>) -> Result<Action, ReconcileError> {
        match task.status.phase {
            None | Some(TaskPhase::Pending) => self.start(&task).await,
            Some(TaskPhase::Running) => self.observe(&task).await,
            Some(TaskPhase::Completed) | Some(TaskPhase::Failed) => self.expire(&task).await,
        }
    }
}
