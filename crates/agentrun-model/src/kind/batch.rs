use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{ANNOTATION_BATCH_PAUSED, Condition, ObjectMeta, impl_resource};
use crate::kind::ContextItem;

/// Fan-out of one template into N tasks.
///
/// Task `i` receives `constant_contexts` followed by `variable_contexts[i]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchRun {
    pub metadata: ObjectMeta,
    pub spec: BatchRunSpec,
    #[serde(default)]
    pub status: BatchRunStatus,
}

impl_resource!(BatchRun, "BatchRun");

impl BatchRun {
    pub fn new(metadata: ObjectMeta, spec: BatchRunSpec) -> Self {
        Self {
            metadata,
            spec,
            status: BatchRunStatus::default(),
        }
    }

    /// Deterministic name of the task at `index`.
    pub fn task_name(&self, index: usize) -> String {
        format!("{}-{}", self.metadata.name, index)
    }

    /// Returns `true` while the pause annotation is present and not `"false"`.
    pub fn is_paused(&self) -> bool {
        self.metadata
            .annotations
            .get(ANNOTATION_BATCH_PAUSED)
            .is_some_and(|v| !v.eq_ignore_ascii_case("false"))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchRunSpec {
    pub profile_ref: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub constant_contexts: Vec<ContextItem>,
    /// One context set per generated task.
    #[serde(default)]
    pub variable_contexts: Vec<Vec<ContextItem>>,
    /// Description shared by every generated task.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keep_alive: Option<bool>,
    /// Upper bound on member tasks running at once; `None` creates every task immediately.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parallelism: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatchPhase {
    Pending,
    Running,
    Paused,
    Succeeded,
    Failed,
}

impl BatchPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, BatchPhase::Succeeded | BatchPhase::Failed)
    }
}

/// Progress of one generated task as tracked by the batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatchTaskPhase {
    /// Not created yet.
    Pending,
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchTaskStatus {
    pub index: usize,
    pub name: String,
    pub phase: BatchTaskPhase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_time: Option<DateTime<Utc>>,
}

/// Rolled-up counters; always `total == pending + running + completed + failed`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchCounters {
    pub total: usize,
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
}

impl BatchCounters {
    /// Count the per-index records; the invariant holds by construction.
    pub fn tally(tasks: &[BatchTaskStatus]) -> Self {
        let mut c = BatchCounters {
            total: tasks.len(),
            ..Default::default()
        };
        for t in tasks {
            match t.phase {
                BatchTaskPhase::Pending => c.pending += 1,
                BatchTaskPhase::Running => c.running += 1,
                BatchTaskPhase::Completed => c.completed += 1,
                BatchTaskPhase::Failed => c.failed += 1,
            }
        }
        c
    }

    pub fn is_consistent(&self) -> bool {
        self.total == self.pending + self.running + self.completed + self.failed
    }

    /// Every task reached a terminal outcome.
    pub fn is_settled(&self) -> bool {
        self.pending == 0 && self.running == 0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchRunStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<BatchPhase>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tasks: Vec<BatchTaskStatus>,
    #[serde(default)]
    pub counters: BatchCounters,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}
