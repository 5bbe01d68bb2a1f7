use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{Condition, ObjectMeta, impl_resource};
use crate::kind::ContextItem;

/// One execution request of an AI agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub metadata: ObjectMeta,
    pub spec: TaskSpec,
    #[serde(default)]
    pub status: TaskStatus,
}

impl_resource!(Task, "Task");

impl Task {
    pub fn new(metadata: ObjectMeta, spec: TaskSpec) -> Self {
        Self {
            metadata,
            spec,
            status: TaskStatus::default(),
        }
    }

    /// Deterministic name of the task's unit-of-work.
    pub fn job_name(&self) -> String {
        format!("{}-job", self.metadata.name)
    }

    /// Deterministic name of the config object carrying the aggregated context files.
    pub fn context_name(&self) -> String {
        format!("{}-context", self.metadata.name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSpec {
    /// Name of the [`ExecutionProfile`](crate::ExecutionProfile) in the task namespace.
    pub profile_ref: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub contexts: Vec<ContextItem>,
    /// Free-text instructions; highest-priority context, always first in the task file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Keep the container alive after the agent exits.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keep_alive: Option<bool>,
    /// Keep-alive duration; `None` uses the controller default (one hour).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keep_alive_seconds: Option<u64>,
    /// Delay between completion and deletion; `None` uses the controller default, `0` disables.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl_seconds_after_finished: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskPhase {
    Pending,
    Running,
    Completed,
    Failed,
}

impl TaskPhase {
    /// Returns `true` if the task will not transition further.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskPhase::Completed | TaskPhase::Failed)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStatus {
    /// `None` until the task reconciler has seen the task.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<TaskPhase>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        self.phase.is_some_and(|p| p.is_terminal())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_phases() {
        assert!(TaskPhase::Completed.is_terminal());
        assert!(TaskPhase::Failed.is_terminal());
        assert!(!TaskPhase::Pending.is_terminal());
        assert!(!TaskPhase::Running.is_terminal());
        assert!(!TaskStatus::default().is_terminal());
    }

    #[test]
    fn child_names_are_derived_from_task_name() {
        let task = Task::new(ObjectMeta::new("ns", "fix-bug"), TaskSpec::default());
        assert_eq!(task.job_name(), "fix-bug-job");
        assert_eq!(task.context_name(), "fix-bug-context");
    }

    #[test]
    fn missing_status_deserializes_to_default() {
        let task: Task =
            serde_json::from_str(r#"{"metadata":{"name":"t"},"spec":{"profileRef":"p"}}"#)
                .unwrap();
        assert_eq!(task.status, TaskStatus::default());
        assert_eq!(task.metadata.namespace, "");
    }
}
