mod common;

use std::time::Duration;

use trialmatch::db::RunStore;
use trialmatch::matching::{ProcessLock, RunLock, StopOutcome};
use trialmatch::models::{MatchingRun, RunStatus};
use trialmatch::MatchError;

use common::{create_org, engine, her2_patient, seed_sample_trials, store};

#[tokio::test]
async fn test_full_cycle_records_population_stats() {
    let store = store().await;
    seed_sample_trials(store.as_ref()).await;
    let org = create_org(store.as_ref()).await;
    her2_patient(store.as_ref(), &org.id).await;

    let engine = engine(store.clone(), "coordinator-test-cycle");
    let run = engine.run_full_cycle("manual").await.unwrap();

    assert_eq!(run.status, RunStatus::Completed);
    assert!(run.finished_at.is_some());
    assert_eq!(run.metadata.patients, Some(1));
    assert!(run.metadata.updates.unwrap_or(0) > 0);

    let stored = store.get_run(&run.id).await.unwrap().unwrap();
    assert_eq!(stored.status, RunStatus::Completed);
    assert!(store.latest_running_run().await.unwrap().is_none());
}

#[tokio::test]
async fn test_second_cycle_is_rejected_while_lock_is_held() {
    let store = store().await;
    let engine = engine(store.clone(), "coordinator-test-exclusive");

    // Simulate the worker: a running row plus the held lock.
    let running = MatchingRun::new("run-busy".to_string(), "scheduled".to_string());
    store.create_run(&running).await.unwrap();
    let holder = ProcessLock::new("coordinator-test-exclusive");
    assert!(holder.try_acquire());

    let error = engine.run_full_cycle("manual").await.unwrap_err();
    match error {
        MatchError::AlreadyRunning { running: Some(run) } => {
            assert_eq!(run.id, "run-busy");
        }
        other => panic!("expected AlreadyRunning, got {other:?}"),
    }

    // The rejected caller must not have created a second run row.
    assert_eq!(store.list_running_runs().await.unwrap().len(), 1);

    holder.release();
}

#[tokio::test]
async fn test_stale_running_rows_are_reconciled() {
    let store = store().await;
    let engine = engine(store.clone(), "coordinator-test-stale");

    // Orphaned row: the process that owned it is gone, so the lock is free.
    let orphan = MatchingRun::new("run-orphan".to_string(), "scheduled".to_string());
    store.create_run(&orphan).await.unwrap();

    let stopped = engine.reconcile_stale_runs("startup_reconcile").await.unwrap();
    assert_eq!(stopped, vec!["run-orphan".to_string()]);

    let run = store.get_run("run-orphan").await.unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Stopped);
    assert!(run.finished_at.is_some());
    assert_eq!(run.metadata.stopped_reason.as_deref(), Some("startup_reconcile"));
    assert!(run.metadata.stopped_at.is_some());

    // Idempotent: nothing left to stop.
    let again = engine.reconcile_stale_runs("startup_reconcile").await.unwrap();
    assert!(again.is_empty());
}

#[tokio::test]
async fn test_reconcile_is_a_no_op_while_lock_is_held() {
    let store = store().await;
    let engine = engine(store.clone(), "coordinator-test-noop");

    let active = MatchingRun::new("run-active".to_string(), "manual".to_string());
    store.create_run(&active).await.unwrap();
    let holder = ProcessLock::new("coordinator-test-noop");
    assert!(holder.try_acquire());

    let stopped = engine.reconcile_stale_runs("startup_reconcile").await.unwrap();
    assert!(stopped.is_empty());
    let run = store.get_run("run-active").await.unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Running);

    holder.release();
}

#[tokio::test]
async fn test_request_stop_without_running_runs() {
    let store = store().await;
    let engine = engine(store.clone(), "coordinator-test-stop-none");
    let outcome = engine
        .request_stop(0, Duration::from_millis(200))
        .await
        .unwrap();
    assert_eq!(outcome, StopOutcome::NoRunningRun);
}

#[tokio::test]
async fn test_request_stop_reconciles_orphans_immediately() {
    let store = store().await;
    let engine = engine(store.clone(), "coordinator-test-stop-orphan");

    let orphan = MatchingRun::new("run-orphan".to_string(), "scheduled".to_string());
    store.create_run(&orphan).await.unwrap();

    let outcome = engine
        .request_stop(5, Duration::from_millis(200))
        .await
        .unwrap();
    assert_eq!(outcome, StopOutcome::Stopped(vec!["run-orphan".to_string()]));

    let run = store.get_run("run-orphan").await.unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Stopped);
    assert_eq!(run.metadata.stop_requested, Some(true));
    assert!(run.metadata.stop_requested_at.is_some());
    assert_eq!(
        run.metadata.stopped_reason.as_deref(),
        Some("stop_requested_no_active_lock")
    );
}

#[tokio::test]
async fn test_request_stop_with_active_worker_is_advisory() {
    let store = store().await;
    let engine = engine(store.clone(), "coordinator-test-stop-advisory");

    let active = MatchingRun::new("run-active".to_string(), "manual".to_string());
    store.create_run(&active).await.unwrap();
    let holder = ProcessLock::new("coordinator-test-stop-advisory");
    assert!(holder.try_acquire());

    let outcome = engine
        .request_stop(0, Duration::from_millis(200))
        .await
        .unwrap();
    assert_eq!(outcome, StopOutcome::Requested(vec!["run-active".to_string()]));

    // The flag is recorded but the run keeps running.
    let run = store.get_run("run-active").await.unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Running);
    assert_eq!(run.metadata.stop_requested, Some(true));

    holder.release();
}

#[tokio::test]
async fn test_request_stop_times_out_against_stuck_worker() {
    let store = store().await;
    let engine = engine(store.clone(), "coordinator-test-stop-timeout");

    let active = MatchingRun::new("run-stuck".to_string(), "manual".to_string());
    store.create_run(&active).await.unwrap();
    let holder = ProcessLock::new("coordinator-test-stop-timeout");
    assert!(holder.try_acquire());

    let outcome = engine
        .request_stop(1, Duration::from_millis(200))
        .await
        .unwrap();
    assert_eq!(
        outcome,
        StopOutcome::StillRunning(vec!["run-stuck".to_string()])
    );

    holder.release();
}

#[tokio::test]
async fn test_request_stop_detects_worker_finishing_during_wait() {
    let store = store().await;
    let engine = engine(store.clone(), "coordinator-test-stop-finishes");

    let mut active = MatchingRun::new("run-finishing".to_string(), "manual".to_string());
    store.create_run(&active).await.unwrap();
    let holder = ProcessLock::new("coordinator-test-stop-finishes");
    assert!(holder.try_acquire());

    // Finish the run partway through the wait window, as the real worker
    // would.
    let finisher_store = store.clone();
    let finisher = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(400)).await;
        active.status = RunStatus::Completed;
        active.finished_at = Some(chrono::Utc::now());
        finisher_store.update_run(&active).await.unwrap();
    });

    let outcome = engine
        .request_stop(5, Duration::from_millis(200))
        .await
        .unwrap();
    finisher.await.unwrap();
    assert_eq!(outcome, StopOutcome::Stopped(Vec::new()));

    holder.release();
}
