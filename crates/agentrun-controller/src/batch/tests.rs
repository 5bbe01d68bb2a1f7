use super::*;

use agentrun_core::Clock;
use agentrun_model::{ANNOTATION_BATCH_PAUSED, BatchRunSpec};
use chrono::Duration;

use crate::testutil::{Fixture, NS, t0};

async fn submit(fx: &Fixture, variable: usize, parallelism: Option<usize>) -> BatchRun {
    let spec = BatchRunSpec {
        profile_ref: "claude".into(),
        constant_contexts: vec![ContextItem::inline("shared")],
        variable_contexts: (0..variable)
            .map(|i| vec![ContextItem::inline(format!("item {i}"))])
            .collect(),
        description: Some("review".into()),
        parallelism,
        ..Default::default()
    };
    fx.api::<BatchRun>()
        .create(&BatchRun::new(ObjectMeta::new(NS, "b"), spec))
        .await
        .unwrap()
}

async fn finish(fx: &Fixture, task: &str, phase: TaskPhase) {
    let at = fx.clock.now();
    fx.api::<Task>()
        .update_with(task, 0, |t| {
            t.status.phase = Some(phase);
            t.status.completion_time = Some(at);
        })
        .await
        .unwrap();
}

async fn set_paused(fx: &Fixture, paused: bool) {
    fx.api::<BatchRun>()
        .update_with("b", 0, |b| {
            b.metadata
                .annotations
                .insert(ANNOTATION_BATCH_PAUSED.into(), paused.to_string());
        })
        .await
        .unwrap();
}

async fn status(fx: &Fixture) -> BatchRunStatus {
    let status = fx.api::<BatchRun>().get("b").await.unwrap().status;
    assert!(status.counters.is_consistent(), "{:?}", status.counters);
    status
}

#[tokio::test]
async fn members_concatenate_constant_and_variable_contexts() {
    let fx = Fixture::new();
    let batch = submit(&fx, 2, None).await;
    let r = BatchReconciler::new(fx.deps.clone());

    let action = fx.step(&r, "b").await.unwrap();
    assert_eq!(action, Action::RequeueAt(t0() + Duration::seconds(5)));

    let tasks = fx.api::<Task>().list_owned_by(&batch.metadata.uid).await.unwrap();
    assert_eq!(tasks.len(), 2);
    let second = fx.api::<Task>().get("b-1").await.unwrap();
    assert_eq!(
        second.spec.contexts,
        vec![ContextItem::inline("shared"), ContextItem::inline("item 1")]
    );
    assert_eq!(second.spec.description.as_deref(), Some("review"));
    assert_eq!(second.metadata.labels[LABEL_BATCH], "b");

    let s = status(&fx).await;
    assert_eq!(s.phase, Some(BatchPhase::Running));
    assert_eq!(s.counters.running, 2);
    assert_eq!(s.start_time, Some(t0()));
}

#[tokio::test]
async fn any_failed_member_fails_the_batch() {
    let fx = Fixture::new();
    submit(&fx, 3, None).await;
    let r = BatchReconciler::new(fx.deps.clone());
    fx.step(&r, "b").await.unwrap();

    finish(&fx, "b-0", TaskPhase::Completed).await;
    finish(&fx, "b-1", TaskPhase::Failed).await;
    fx.step(&r, "b").await.unwrap();
    let s = status(&fx).await;
    assert_eq!(s.phase, Some(BatchPhase::Running));
    assert_eq!((s.counters.completed, s.counters.failed, s.counters.running), (1, 1, 1));

    finish(&fx, "b-2", TaskPhase::Completed).await;
    assert_eq!(fx.step(&r, "b").await.unwrap(), Action::AwaitChange);
    let s = status(&fx).await;
    assert_eq!(s.phase, Some(BatchPhase::Failed));
    assert_eq!((s.counters.completed, s.counters.failed), (2, 1));
    assert!(s.completion_time.is_some());
}

#[tokio::test]
async fn all_completed_members_succeed() {
    let fx = Fixture::new();
    submit(&fx, 2, None).await;
    let r = BatchReconciler::new(fx.deps.clone());
    fx.step(&r, "b").await.unwrap();
    finish(&fx, "b-0", TaskPhase::Completed).await;
    finish(&fx, "b-1", TaskPhase::Completed).await;

    fx.step(&r, "b").await.unwrap();
    assert_eq!(status(&fx).await.phase, Some(BatchPhase::Succeeded));
}

#[tokio::test]
async fn pause_blocks_creation_not_completion() {
    let fx = Fixture::new();
    submit(&fx, 3, Some(1)).await;
    let r = BatchReconciler::new(fx.deps.clone());

    fx.step(&r, "b").await.unwrap();
    let s = status(&fx).await;
    assert_eq!((s.counters.running, s.counters.pending), (1, 2));

    set_paused(&fx, true).await;
    finish(&fx, "b-0", TaskPhase::Completed).await;
    assert_eq!(fx.step(&r, "b").await.unwrap(), Action::AwaitChange);

    let s = status(&fx).await;
    assert_eq!(s.phase, Some(BatchPhase::Paused));
    assert_eq!((s.counters.completed, s.counters.pending), (1, 2));
    assert_eq!(fx.store.count("Task"), 1);

    set_paused(&fx, false).await;
    fx.step(&r, "b").await.unwrap();
    let s = status(&fx).await;
    assert_eq!(s.phase, Some(BatchPhase::Running));
    assert_eq!((s.counters.completed, s.counters.running, s.counters.pending), (1, 1, 1));
    assert!(fx.api::<Task>().get_opt("b-1").await.unwrap().is_some());
}

#[tokio::test]
async fn paused_batch_is_seeded_without_members() {
    let fx = Fixture::new();
    submit(&fx, 4, None).await;
    set_paused(&fx, true).await;
    let r = BatchReconciler::new(fx.deps.clone());

    fx.step(&r, "b").await.unwrap();
    let s = status(&fx).await;
    assert_eq!(s.phase, Some(BatchPhase::Paused));
    assert_eq!((s.counters.total, s.counters.pending), (4, 4));
    assert_eq!(fx.store.count("Task"), 0);
}

#[tokio::test]
async fn vanished_member_counts_as_failed() {
    let fx = Fixture::new();
    submit(&fx, 2, None).await;
    let r = BatchReconciler::new(fx.deps.clone());
    fx.step(&r, "b").await.unwrap();

    fx.api::<Task>().delete("b-0").await.unwrap();
    fx.step(&r, "b").await.unwrap();

    let s = status(&fx).await;
    assert_eq!(s.tasks[0].phase, BatchTaskPhase::Failed);
    assert_eq!(s.counters.failed, 1);
}

#[tokio::test]
async fn repeated_reconciles_do_not_duplicate_members() {
    let fx = Fixture::new();
    submit(&fx, 3, None).await;
    let r = BatchReconciler::new(fx.deps.clone());

    for _ in 0..3 {
        fx.step(&r, "b").await.unwrap();
    }
    assert_eq!(fx.store.count("Task"), 3);
    assert_eq!(status(&fx).await.counters.running, 3);
}

#[tokio::test]
async fn empty_batch_succeeds_immediately() {
    let fx = Fixture::new();
    submit(&fx, 0, None).await;
    let r = BatchReconciler::new(fx.deps.clone());

    assert_eq!(fx.step(&r, "b").await.unwrap(), Action::AwaitChange);
    assert_eq!(status(&fx).await.phase, Some(BatchPhase::Succeeded));
}

#[tokio::test]
async fn members_outlive_the_default_ttl() {
    let fx = Fixture::with_config(agentrun_core::ControllerConfig {
        default_ttl_seconds: 1,
        ..Default::default()
    });
    submit(&fx, 1, None).await;
    let r = BatchReconciler::new(fx.deps.clone());
    fx.step(&r, "b").await.unwrap();

    let member = fx.api::<Task>().get("b-0").await.unwrap();
    assert_eq!(member.spec.ttl_seconds_after_finished, Some(0));

    finish(&fx, "b-0", TaskPhase::Completed).await;
    fx.clock.advance(Duration::seconds(10));
    let tasks = crate::TaskReconciler::new(fx.deps.clone());
    assert_eq!(fx.step(&tasks, "b-0").await.unwrap(), Action::AwaitChange);
    assert!(fx.api::<Task>().get_opt("b-0").await.unwrap().is_some());

    fx.step(&r, "b").await.unwrap();
    let s = status(&fx).await;
    assert_eq!(s.phase, Some(BatchPhase::Succeeded));
    assert_eq!((s.counters.completed, s.counters.failed), (1, 0));
}

#[tokio::test]
async fn stale_reconcile_does_not_clobber_a_newer_status() {
    let fx = Fixture::new();
    submit(&fx, 2, None).await;
    let stale = fx.api::<BatchRun>().get("b").await.unwrap();
    fx.api::<BatchRun>()
        .update_with("b", 0, |b| b.status.phase = Some(BatchPhase::Paused))
        .await
        .unwrap();

    let r = BatchReconciler::new(fx.deps.clone());
    r.reconcile(Arc::new(stale)).await.unwrap();

    let s = status(&fx).await;
    assert_eq!(s.phase, Some(BatchPhase::Paused));
    assert!(s.tasks.is_empty());
}
