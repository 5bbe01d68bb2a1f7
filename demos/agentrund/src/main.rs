use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use prometheus::{Encoder, Registry, TextEncoder};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use agentrun_controller::{
    BatchReconciler, Controller, ControllerMetrics, CronReconciler, Deps, TaskReconciler,
};
use agentrun_core::{Clock, MemoryStore, Store, SystemClock};
use agentrun_model::{
    BatchRun, BatchRunSpec, ContextItem, ExecutionProfile, ExecutionProfileSpec, Job, ObjectMeta,
    Task, TaskSpec,
};
use agentrun_observe::logger_init;

mod backend;
mod config;

const NAMESPACE: &str = "default";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let path = std::env::args().nth(1).map(PathBuf::from);
    let cfg = config::DaemonConfig::load(path.as_deref())?;

    logger_init(&cfg.logger)?;
    info!(config = ?path, "logger initialized");

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store: Arc<dyn Store> = Arc::new(MemoryStore::with_clock(Arc::clone(&clock)));
    let deps = Deps::new(store, Arc::clone(&clock), cfg.controller.clone());

    let registry = Registry::new();
    let metrics = ControllerMetrics::new(&registry)?;
    let cancel = CancellationToken::new();

    let mut controllers = tokio::task::JoinSet::new();
    controllers.spawn(
        Controller::new(TaskReconciler::new(deps.clone()), deps.clone(), metrics.clone())
            .run(cancel.clone()),
    );
    controllers.spawn(
        Controller::new(BatchReconciler::new(deps.clone()), deps.clone(), metrics.clone())
            .run(cancel.clone()),
    );
    controllers.spawn(
        Controller::new(CronReconciler::new(deps.clone()), deps.clone(), metrics.clone())
            .run(cancel.clone()),
    );
    tokio::spawn(backend::run(
        deps.api::<Job>(NAMESPACE),
        clock,
        Duration::from_secs(cfg.simulated_runtime_seconds),
        cancel.clone(),
    ));

    seed(&deps).await?;
    info!("controllers running; press Ctrl+C to stop");

    tokio::signal::ctrl_c().await?;
    info!("shutting down...");
    cancel.cancel();
    while let Some(joined) = controllers.join_next().await {
        if let Err(e) = joined? {
            error!(error = %e, "controller exited with error");
        }
    }

    let mut buf = Vec::new();
    TextEncoder::new().encode(&registry.gather(), &mut buf)?;
    println!("{}", String::from_utf8_lossy(&buf));
    Ok(())
}

/// Demo objects: one profile, one task and a three-way batch.
async fn seed(deps: &Deps) -> anyhow::Result<()> {
    let mut profile = ExecutionProfileSpec::new("ghcr.io/agentrun/agent:latest", "agent");
    profile.command = Some(vec!["agent".into(), "run".into()]);
    profile.contexts = vec![ContextItem::inline("Follow the repository conventions.")];
    deps.api::<ExecutionProfile>(NAMESPACE)
        .ensure(&ExecutionProfile {
            metadata: ObjectMeta::new(NAMESPACE, "default-agent"),
            spec: profile,
        })
        .await?;

    deps.api::<Task>(NAMESPACE)
        .ensure(&Task::new(
            ObjectMeta::new(NAMESPACE, "hello"),
            TaskSpec {
                profile_ref: "default-agent".into(),
                description: Some("Summarize the open issues.".into()),
                ttl_seconds_after_finished: Some(30),
                ..Default::default()
            },
        ))
        .await?;

    deps.api::<BatchRun>(NAMESPACE)
        .ensure(&BatchRun::new(
            ObjectMeta::new(NAMESPACE, "sweep"),
            BatchRunSpec {
                profile_ref: "default-agent".into(),
                constant_contexts: vec![ContextItem::inline("Report findings as a list.")],
                variable_contexts: ["api", "web", "worker"]
                    .into_iter()
                    .map(|svc| vec![ContextItem::inline(format!("Audit the {svc} service."))])
                    .collect(),
                parallelism: Some(2),
                ..Default::default()
            },
        ))
        .await?;
    Ok(())
}
