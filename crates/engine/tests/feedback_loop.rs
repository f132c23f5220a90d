mod common;

use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};

use assert_matches::assert_matches;
use radar_core::error::{EngineError, RemoteError};
use radar_core::interaction::{FeedbackAction, InteractionAction, RecalibrationMode};
use radar_core::job::JobStatus;
use radar_core::record::Channel;
use serde_json::json;

use common::{from_now, harness, ripple, Harness};

fn seed(h: &Harness, ids: &[&str]) {
    for id in ids {
        h.engine.reconciler().merge_row(
            &h.result_row(id, json!({"name": id}), from_now(0)),
            Channel::Poll,
            None,
        );
    }
}

#[tokio::test]
async fn reject_removes_rippled_records_and_never_grows_the_store() {
    let h = harness();
    seed(&h, &["a", "b", "c", "d", "e"]);
    *h.functions.ripple.lock().unwrap() = Ok(ripple(
        FeedbackAction::Reject,
        &["legal"],
        &["a", "c", "not-in-store"],
    ));

    let before = h.engine.state().len();
    let result = h
        .engine
        .submit_feedback("a", FeedbackAction::Reject)
        .await
        .unwrap();

    assert!(h.engine.state().len() <= before);
    assert_eq!(h.engine.state().len(), 3);
    assert!(!h.engine.state().contains("a"));
    assert!(!h.engine.state().contains("c"));
    assert!(result.summary().starts_with("Reducing priority of legal."));

    let snapshot = h.engine.snapshot();
    assert_eq!(snapshot.parameters.get("legal"), Some(-15.0));
    assert_eq!(snapshot.interaction_count, 1);

    let persisted = h.store.interactions.lock().unwrap();
    assert_eq!(persisted.len(), 1);
    assert_eq!(persisted[0].record_id, "a");
    assert_eq!(persisted[0].action, InteractionAction::Rejected);
}

#[tokio::test]
async fn accepted_deltas_reach_the_next_compile() {
    let h = harness();
    seed(&h, &["a"]);
    let mut accepted = ripple(FeedbackAction::Accept, &["saas"], &[]);
    accepted.parameter_deltas.insert("series-a".into(), 25.0);
    *h.functions.ripple.lock().unwrap() = Ok(accepted);

    h.engine
        .submit_feedback("a", FeedbackAction::Accept)
        .await
        .unwrap();
    assert_eq!(h.engine.state().len(), 1);

    h.engine.compile(false).await.unwrap();
    let request = h.functions.last_compile.lock().unwrap().clone().unwrap();
    assert_eq!(request.parameters.get("saas"), Some(10.0));
    assert_eq!(request.parameters.get("series-a"), Some(25.0));
}

#[tokio::test]
async fn missing_identifiers_fail_without_touching_the_store() {
    let h = harness();
    seed(&h, &["a", "b"]);
    *h.functions.ripple.lock().unwrap() = Ok(ripple(FeedbackAction::Reject, &[], &["a", "b"]));

    assert_matches!(
        h.engine.submit_feedback("  ", FeedbackAction::Reject).await,
        Err(EngineError::Feedback(_))
    );

    *h.session.user.lock().unwrap() = None;
    assert_matches!(
        h.engine.submit_feedback("a", FeedbackAction::Reject).await,
        Err(EngineError::Feedback(_))
    );

    assert_eq!(h.functions.feedback_calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.engine.state().len(), 2);
    assert_eq!(h.engine.snapshot().interaction_count, 0);
}

#[tokio::test]
async fn remote_failure_leaves_the_store_untouched() {
    let h = harness();
    seed(&h, &["a", "b"]);
    *h.functions.ripple.lock().unwrap() = Err(RemoteError::Rejected {
        status: 500,
        body: "boom".into(),
    });

    assert_matches!(
        h.engine.submit_feedback("a", FeedbackAction::Reject).await,
        Err(EngineError::Feedback(_))
    );
    assert_eq!(h.engine.state().len(), 2);
    assert!(h.engine.snapshot().parameters.is_empty());
    assert!(h.store.interactions.lock().unwrap().is_empty());
}

#[tokio::test]
async fn track_appends_to_the_audit_trail() {
    let h = harness();
    h.engine
        .track("a", InteractionAction::Viewed, Some(1200))
        .await;

    assert_eq!(h.engine.snapshot().interaction_count, 1);
    let persisted = h.store.interactions.lock().unwrap();
    assert_eq!(persisted[0].action, InteractionAction::Viewed);
    assert_eq!(persisted[0].duration_ms, Some(1200));
}

#[tokio::test(start_paused = true)]
async fn fresh_start_clears_results_before_dispatching() {
    let h = harness();
    h.engine.dispatch(vec!["q".into()]).await.unwrap();
    let companies: Vec<_> = (0..12).map(|i| json!({"name": format!("Co {i}")})).collect();
    h.push_result(h.result_row("batch", json!({"companies": companies}), from_now(1)))
        .await;
    assert_eq!(h.engine.state().len(), 12);

    let sizes_at_dispatch = Arc::new(Mutex::new(Vec::new()));
    let state = h.engine.state().clone();
    let sizes = sizes_at_dispatch.clone();
    h.functions
        .on_dispatch(move || sizes.lock().unwrap().push(state.len()));

    let report = h.engine.recalibrate(true).await.unwrap();

    assert_eq!(*sizes_at_dispatch.lock().unwrap(), [0]);
    assert_eq!(report.outcome.mode, RecalibrationMode::Pivot);
    assert_eq!(h.functions.recalibrate_calls.load(Ordering::SeqCst), 1);
    assert!(h.functions.last_compile.lock().unwrap().as_ref().unwrap().force_refresh);
    assert_eq!(h.store.cancellations.load(Ordering::SeqCst), 1);
    assert_eq!(
        h.engine.state().status_of(report.job_id),
        Some(JobStatus::Active)
    );
    assert_eq!(h.functions.dispatch_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn incremental_recalibration_keeps_results() {
    let h = harness();
    seed(&h, &["a", "b"]);

    let report = h.engine.recalibrate(false).await.unwrap();
    assert_eq!(h.engine.state().len(), 2);
    assert_eq!(h.engine.state().status_of(report.job_id), Some(JobStatus::Active));
    assert_eq!(h.store.cancellations.load(Ordering::SeqCst), 0);
}
