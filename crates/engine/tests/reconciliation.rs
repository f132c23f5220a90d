mod common;

use std::time::Duration;

use radar_core::job::{CompletionReason, JobStatus};
use radar_core::record::Channel;
use serde_json::json;

use common::{from_now, harness, settle};

#[tokio::test(start_paused = true)]
async fn push_version_survives_stale_poll_redelivery() {
    let h = harness();
    let job_id = h.engine.dispatch(vec!["sector:legal".into()]).await.unwrap();

    let pushed_at = from_now(10);
    h.push_result(h.result_row("r1", json!({"name": "Acme (push)"}), pushed_at))
        .await;
    assert_eq!(h.engine.state().len(), 1);

    // The poll re-delivers the same id with an older observation.
    h.store
        .results
        .lock()
        .unwrap()
        .push(h.result_row("r1", json!({"name": "Acme (poll)"}), from_now(5)));
    tokio::time::sleep(Duration::from_secs(21)).await;

    let snapshot = h.engine.snapshot();
    let job = snapshot.job.unwrap();
    assert_eq!(job.id, job_id);
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.completion, Some(CompletionReason::PollResults));

    assert_eq!(snapshot.records.len(), 1);
    let record = &snapshot.records[0];
    assert_eq!(record.name(), "Acme (push)");
    assert_eq!(record.observed_at, pushed_at);
    assert_eq!(record.observed_via, Channel::Push);
}

#[tokio::test(start_paused = true)]
async fn same_id_keeps_latest_observation_in_any_arrival_order() {
    let h = harness();
    let job_id = h.engine.dispatch(vec!["q".into()]).await.unwrap();

    let t3 = from_now(3);
    let t6 = from_now(6);
    let t9 = from_now(9);
    let t1 = from_now(1);

    h.push_result(h.result_row("r1", json!({"name": "three"}), t3)).await;
    h.push_result(h.result_row("r1", json!({"name": "nine"}), t9)).await;
    h.engine.reconciler().merge_row(
        &h.result_row("r1", json!({"name": "six"}), t6),
        Channel::Poll,
        Some(job_id),
    );
    h.push_result(h.result_row("r1", json!({"name": "one"}), t1)).await;

    let record = h.engine.state().get("r1").unwrap();
    assert_eq!(h.engine.state().len(), 1);
    assert_eq!(record.name(), "nine");
    assert_eq!(record.observed_at, t9);
}

#[tokio::test(start_paused = true)]
async fn updates_to_existing_rows_replace_records() {
    let h = harness();
    h.engine.dispatch(vec!["q".into()]).await.unwrap();

    h.push_result(h.result_row("row", json!({"companies": [{"name": "A"}, {"name": "B"}]}), from_now(1)))
        .await;
    h.push_result(h.result_row(
        "row",
        json!({"companies": [{"name": "A2"}, {"name": "B"}, {"name": "C"}]}),
        from_now(2),
    ))
    .await;

    let names: Vec<String> = h
        .engine
        .snapshot()
        .records
        .iter()
        .map(|r| r.name().to_string())
        .collect();
    assert_eq!(names, ["A2", "B", "C"]);
}

#[tokio::test(start_paused = true)]
async fn malformed_rows_are_dropped_and_the_job_keeps_running() {
    let h = harness();
    let job_id = h.engine.dispatch(vec!["q".into()]).await.unwrap();

    h.push_result(h.result_row("bad", serde_json::Value::Null, from_now(1)))
        .await;
    h.push_result(h.result_row("bad-list", json!([1, 2]), from_now(1)))
        .await;
    h.push_result(h.result_row("good", json!({"company_name": "Acme", "website": "acme.io"}), from_now(1)))
        .await;

    assert_eq!(h.engine.state().len(), 1);
    let record = h.engine.state().get("good").unwrap();
    assert_eq!(record.fields["url"], "https://acme.io");
    assert_eq!(h.engine.state().status_of(job_id), Some(JobStatus::Active));
}

#[tokio::test(start_paused = true)]
async fn results_for_a_finished_job_are_ignored() {
    let h = harness();
    h.engine.dispatch(vec!["q".into()]).await.unwrap();
    settle().await;
    assert!(h.engine.cancel().await);

    h.push_result(h.result_row("late", json!({"name": "Late"}), from_now(1)))
        .await;
    assert!(h.engine.state().is_empty());
}

#[tokio::test(start_paused = true)]
async fn stored_rows_sharing_a_sequence_still_keep_the_newer_copy() {
    let h = harness();
    h.engine.dispatch(vec!["q".into()]).await.unwrap();

    let pushed_at = from_now(10);
    let mut pushed = h.result_row("r1", json!({"name": "Acme (push)"}), pushed_at);
    pushed.seq = Some(7);
    h.push_result(pushed).await;

    let mut redelivered = h.result_row("r1", json!({"name": "Acme (poll)"}), from_now(5));
    redelivered.seq = Some(7);
    h.store.results.lock().unwrap().push(redelivered);
    tokio::time::sleep(Duration::from_secs(21)).await;

    let snapshot = h.engine.snapshot();
    assert_eq!(snapshot.job.unwrap().status, JobStatus::Completed);
    assert_eq!(snapshot.records.len(), 1);
    assert_eq!(snapshot.records[0].name(), "Acme (push)");
    assert_eq!(snapshot.records[0].observed_at, pushed_at);
}

#[tokio::test(start_paused = true)]
async fn one_bad_candidate_does_not_drop_its_siblings() {
    let h = harness();
    let job_id = h.engine.dispatch(vec!["q".into()]).await.unwrap();

    h.push_result(h.result_row(
        "batch",
        json!({"companies": [{"name": "Acme"}, {"name": "Beta"}, 3]}),
        from_now(1),
    ))
    .await;

    let names: Vec<String> = h
        .engine
        .snapshot()
        .records
        .iter()
        .map(|r| r.name().to_string())
        .collect();
    assert_eq!(names, ["Acme", "Beta"]);
    assert_eq!(h.engine.state().status_of(job_id), Some(JobStatus::Active));
}
