//! Logging engine state events from the worker.

use radar_core::radar_events::{
    EVENT_JOB_CANCELLED, EVENT_JOB_COMPLETED, EVENT_JOB_FAILED, EVENT_JOB_PROGRESS,
    EVENT_NOTICE, EVENT_RESULTS_MERGED,
};
use radar_events::{NoticeLevel, StateEvent};

/// Whether the event ends the scan being watched.
pub fn ends_scan(event: &StateEvent) -> bool {
    matches!(
        event.event_type.as_str(),
        EVENT_JOB_COMPLETED | EVENT_JOB_CANCELLED | EVENT_JOB_FAILED
    )
}

pub fn log_event(event: &StateEvent) {
    let job_id = event.job_id.map(|id| id.to_string()).unwrap_or_default();

    match event.event_type.as_str() {
        EVENT_NOTICE => {
            let message = event
                .payload
                .get("message")
                .and_then(serde_json::Value::as_str)
                .unwrap_or_default();
            match event.notice_level() {
                Some(NoticeLevel::Error) => tracing::error!(%job_id, "{message}"),
                Some(NoticeLevel::Warning) => tracing::warn!(%job_id, "{message}"),
                _ => tracing::info!(%job_id, "{message}"),
            }
        }
        EVENT_RESULTS_MERGED => {
            tracing::trace!(%job_id, payload = %event.payload, "results.merged");
        }
        EVENT_JOB_PROGRESS => {
            tracing::debug!(%job_id, payload = %event.payload, "job.progress");
        }
        other => {
            tracing::info!(%job_id, payload = %event.payload, "{other}");
        }
    }
}
