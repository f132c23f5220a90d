mod common;

use std::sync::atomic::Ordering;

use radar_core::job::{CompletionReason, JobStatus};
use radar_core::record::Channel;
use radar_engine::EngineConfig;
use serde_json::json;

use common::{build, from_now, harness, settle};

#[tokio::test(start_paused = true)]
async fn resumes_a_running_scan_without_dispatching_again() {
    let first = harness();
    first.engine.dispatch(vec!["sector:legal".into()]).await.unwrap();
    assert_eq!(first.functions.dispatch_calls.load(Ordering::SeqCst), 1);

    // The page reloads while the producer keeps working.
    let mut row = first.status_row("processing", 35, from_now(1));
    row.stage = Some("searching".into());
    row.created_at = from_now(-600);
    *first.store.in_progress.lock().unwrap() = Some(row.clone());
    first.engine.shutdown().await;

    let second = build(
        EngineConfig::default(),
        first.functions.clone(),
        first.store.clone(),
    );
    let resumed = second.engine.recover().await.unwrap();
    assert_eq!(resumed, Some(row.id));
    assert_eq!(first.functions.dispatch_calls.load(Ordering::SeqCst), 1);

    let job = second.engine.snapshot().job.unwrap();
    assert_eq!(job.id, row.id);
    assert_eq!(job.status, JobStatus::Active);
    assert_eq!(job.stage, "searching");
    assert_eq!(job.progress, 35);
    assert_eq!(job.started_at, row.created_at);

    settle().await;
    assert_eq!(second.engine.running_observers(), 3);

    second
        .push_status(second.status_row("completed", 100, from_now(2)))
        .await;
    let job = second.engine.snapshot().job.unwrap();
    assert_eq!(job.completion, Some(CompletionReason::PushSignal));
    assert_eq!(first.functions.dispatch_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn recovery_loads_results_written_since_the_scan_started() {
    let h = harness();
    let mut row = h.status_row("queued", 0, from_now(0));
    row.created_at = from_now(-300);
    *h.store.in_progress.lock().unwrap() = Some(row);
    h.store.results.lock().unwrap().extend([
        h.result_row("before", json!({"name": "Old"}), from_now(-900)),
        h.result_row("during", json!({"name": "New"}), from_now(-60)),
    ]);

    h.engine.recover().await.unwrap();

    assert_eq!(h.engine.state().len(), 1);
    let record = h.engine.state().get("during").unwrap();
    assert_eq!(record.observed_via, Channel::Recovery);
}

#[tokio::test]
async fn nothing_in_progress_is_a_noop() {
    let h = harness();
    assert_eq!(h.engine.recover().await.unwrap(), None);
    assert!(h.engine.snapshot().job.is_none());
    assert_eq!(h.engine.running_observers(), 0);
}

#[tokio::test]
async fn finished_rows_are_not_resumed() {
    let h = harness();
    *h.store.in_progress.lock().unwrap() = Some(h.status_row("completed", 100, from_now(0)));
    assert_eq!(h.engine.recover().await.unwrap(), None);
}

#[tokio::test(start_paused = true)]
async fn recovery_defers_to_a_job_already_in_flight() {
    let h = harness();
    let job_id = h.engine.dispatch(vec!["q".into()]).await.unwrap();
    *h.store.in_progress.lock().unwrap() = Some(h.status_row("processing", 10, from_now(0)));

    assert_eq!(h.engine.recover().await.unwrap(), None);
    assert_eq!(h.engine.snapshot().job.unwrap().id, job_id);
}
