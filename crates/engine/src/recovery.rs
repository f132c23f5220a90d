//! Resuming observation of a job the producer is still running.
//!
//! Used on startup: if the durable store shows a scan still `queued` or
//! `processing`, the engine rebuilds its job from that row and starts
//! the observers against it. Nothing is dispatched.

use std::sync::Arc;

use radar_core::error::EngineError;
use radar_core::record::Channel;
use radar_core::types::JobId;
use radar_events::NoticeLevel;

use crate::context::Context;

pub(crate) async fn resume(ctx: &Arc<Context>) -> Result<Option<JobId>, EngineError> {
    let project_id = ctx.project_id;
    let Some(row) = ctx.store.find_in_progress_job(project_id).await? else {
        tracing::debug!(%project_id, "No in-progress scan to recover");
        return Ok(None);
    };
    if !row.durable_status().is_in_progress() {
        return Ok(None);
    }

    let token = ctx.shutdown.child_token();
    let job_id = match ctx.state.resume(&row, token.clone()) {
        Ok(job_id) => job_id,
        Err(EngineError::JobInFlight(_)) => {
            tracing::debug!(%project_id, "A scan is already being observed, skipping recovery");
            return Ok(None);
        }
        Err(e) => return Err(e),
    };

    match ctx.store.results_since(project_id, Some(row.created_at)).await {
        Ok(rows) => {
            ctx.reconciler.merge_rows(&rows, Channel::Recovery, Some(job_id));
        }
        Err(e) => {
            tracing::warn!(%project_id, %job_id, error = %e, "Failed to load results of recovered scan");
        }
    }

    ctx.observers.start(ctx, job_id, &token);

    let progress = row.progress_percent().unwrap_or(0);
    ctx.state.notice(
        NoticeLevel::Info,
        format!("Resumed a scan already in progress ({progress}%)."),
    );
    Ok(Some(job_id))
}
