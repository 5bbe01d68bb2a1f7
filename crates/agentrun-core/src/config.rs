use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Runtime settings shared by all reconcilers.
///
/// Every field has a default, so a partial JSON document is a valid configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ControllerConfig {
    /// TTL applied to tasks without `ttlSecondsAfterFinished`; `0` keeps them forever.
    pub default_ttl_seconds: u64,
    /// Keep-alive duration for tasks without `keepAliveSeconds`.
    pub keep_alive_seconds: u64,
    /// Image of the repository clone init stage.
    pub git_image: String,
    /// Fallback poll interval while a task's unit-of-work is running.
    pub task_poll_seconds: u64,
    /// Fixed requeue delay while a batch has outstanding tasks.
    pub batch_poll_seconds: u64,
    /// Requeue delay after a transient failure.
    pub error_requeue_seconds: u64,
    /// Upper bound between two cron evaluations.
    pub cron_requeue_seconds: u64,
    /// Concurrent reconciliations per controller.
    pub workers: usize,
    /// Re-read attempts after an optimistic-concurrency conflict.
    pub status_retries: usize,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            default_ttl_seconds: 0,
            keep_alive_seconds: 3600,
            git_image: "alpine/git:latest".to_string(),
            task_poll_seconds: 30,
            batch_poll_seconds: 5,
            error_requeue_seconds: 10,
            cron_requeue_seconds: 60,
            workers: 4,
            status_retries: 5,
        }
    }
}

impl ControllerConfig {
    pub fn task_poll(&self) -> Duration {
        Duration::from_secs(self.task_poll_seconds)
    }

    pub fn batch_poll(&self) -> Duration {
        Duration::from_secs(self.batch_poll_seconds)
    }

    pub fn error_requeue(&self) -> Duration {
        Duration::from_secs(self.error_requeue_seconds)
    }

    pub fn cron_requeue(&self) -> Duration {
        Duration::from_secs(self.cron_requeue_seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_document_keeps_defaults() {
        let cfg: ControllerConfig =
            serde_json::from_str(r#"{"defaultTtlSeconds":60,"workers":8}"#).unwrap();
        assert_eq!(cfg.default_ttl_seconds, 60);
        assert_eq!(cfg.workers, 8);
        assert_eq!(cfg.keep_alive_seconds, 3600);
        assert_eq!(cfg.git_image, "alpine/git:latest");
        assert_eq!(cfg.batch_poll(), Duration::from_secs(5));
    }
}
