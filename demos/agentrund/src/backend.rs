//! Stand-in execution backend: reports every unit-of-work as succeeded after a fixed runtime.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use agentrun_core::{Api, Clock};
use agentrun_model::Job;

pub async fn run(jobs: Api<Job>, clock: Arc<dyn Clock>, runtime: Duration, cancel: CancellationToken) {
    let mut tick = tokio::time::interval(Duration::from_millis(500));
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tick.tick() => {}
        }

        let listed = match jobs.list().await {
            Ok(listed) => listed,
            Err(e) => {
                warn!(error = %e, "listing jobs failed");
                continue;
            }
        };
        for job in listed {
            if job.status.succeeded > 0 || job.status.failed > 0 {
                continue;
            }
            let age = job
                .metadata
                .creation_timestamp
                .and_then(|t| (clock.now() - t).to_std().ok())
                .unwrap_or_default();
            if age < runtime {
                debug!(job = %job.metadata.name, "still running");
                continue;
            }
            match jobs.update_with(&job.metadata.name, 3, |j| j.status.succeeded = 1).await {
                Ok(_) => info!(job = %job.metadata.name, "unit-of-work succeeded"),
                Err(e) => warn!(job = %job.metadata.name, error = %e, "status report failed"),
            }
        }
    }
}
