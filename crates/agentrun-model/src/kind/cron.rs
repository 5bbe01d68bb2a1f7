use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{ObjectMeta, impl_resource};
use crate::kind::TaskSpec;

const DEFAULT_SUCCESSFUL_HISTORY: u32 = 3;
const DEFAULT_FAILED_HISTORY: u32 = 1;

/// Task template instantiated on a cron schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CronTask {
    pub metadata: ObjectMeta,
    pub spec: CronTaskSpec,
    #[serde(default)]
    pub status: CronTaskStatus,
}

impl_resource!(CronTask, "CronTask");

impl CronTask {
    pub fn new(metadata: ObjectMeta, spec: CronTaskSpec) -> Self {
        Self {
            metadata,
            spec,
            status: CronTaskStatus::default(),
        }
    }

    /// Deterministic name of the instance scheduled at `at`.
    ///
    /// Second resolution: schedules may carry a seconds field, and every slot needs its own name.
    pub fn task_name(&self, at: DateTime<Utc>) -> String {
        format!("{}-{}", self.metadata.name, at.timestamp())
    }
}

/// Whether a new instance may start while a previous one is still active.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConcurrencyPolicy {
    #[default]
    Allow,
    Forbid,
    Replace,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CronTaskSpec {
    /// Cron expression evaluated in UTC; five-field expressions are accepted.
    pub schedule: String,
    #[serde(default)]
    pub concurrency_policy: ConcurrencyPolicy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suspend: Option<bool>,
    /// `None` keeps 3 successful instances.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub successful_history_limit: Option<u32>,
    /// `None` keeps 1 failed instance.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_history_limit: Option<u32>,
    pub task_template: TaskSpec,
}

impl CronTaskSpec {
    pub fn is_suspended(&self) -> bool {
        self.suspend.unwrap_or(false)
    }

    pub fn successful_limit(&self) -> usize {
        self.successful_history_limit
            .unwrap_or(DEFAULT_SUCCESSFUL_HISTORY) as usize
    }

    pub fn failed_limit(&self) -> usize {
        self.failed_history_limit.unwrap_or(DEFAULT_FAILED_HISTORY) as usize
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CronTaskStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_schedule_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_successful_time: Option<DateTime<Utc>>,
    /// Names of owned tasks that are not terminal yet.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub active: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn history_limits_default() {
        let spec: CronTaskSpec = serde_json::from_str(
            r#"{"schedule":"*/5 * * * *","taskTemplate":{"profileRef":"p"}}"#,
        )
        .unwrap();
        assert_eq!(spec.concurrency_policy, ConcurrencyPolicy::Allow);
        assert_eq!(spec.successful_limit(), 3);
        assert_eq!(spec.failed_limit(), 1);
        assert!(!spec.is_suspended());
    }

    #[test]
    fn instance_name_uses_scheduled_second() {
        let spec: CronTaskSpec = serde_json::from_str(
            r#"{"schedule":"* * * * *","taskTemplate":{"profileRef":"p"}}"#,
        )
        .unwrap();
        let cron = CronTask::new(ObjectMeta::new("ns", "nightly"), spec);
        let at = Utc.with_ymd_and_hms(1970, 1, 1, 1, 0, 30).unwrap();
        assert_eq!(cron.task_name(at), "nightly-3630");
        assert_ne!(cron.task_name(at), cron.task_name(at + chrono::Duration::seconds(20)));
    }
}
