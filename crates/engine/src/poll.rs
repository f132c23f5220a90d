//! Bounded poll on the durable store.
//!
//! Runs next to the push listener so a lost push signal cannot leave a
//! job running forever. Each tick checks, in order: the latest status
//! row, the remote job check, and whether results for this job have
//! landed. After `poll_max_attempts` ticks the job is completed as
//! degraded with whatever results were received.

use std::sync::Arc;

use radar_core::error::StoreError;
use radar_core::job::{CompletionReason, JobStatus, Terminal};
use radar_core::record::Channel;
use radar_core::rows::DurableStatus;
use radar_core::types::{JobId, Timestamp};
use radar_events::NoticeLevel;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::context::Context;
use crate::reconciler::records_from_rows;
use crate::session::call_with_session;

pub(crate) async fn run(ctx: Arc<Context>, job_id: JobId, token: CancellationToken) {
    let period = ctx.config.poll_interval;
    let max_attempts = ctx.config.poll_max_attempts;
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut attempts: u32 = 0;

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {}
        }

        match ctx.state.status_of(job_id) {
            Some(JobStatus::Active) => {}
            // Not yet acknowledged by the producer; does not count.
            Some(JobStatus::Dispatched) => continue,
            _ => break,
        }

        attempts += 1;
        tracing::debug!(project_id = %ctx.project_id, %job_id, attempts, "Polling job status");

        match tick(&ctx, job_id).await {
            Ok(true) => break,
            Ok(false) => {}
            Err(e) => {
                tracing::warn!(project_id = %ctx.project_id, %job_id, error = %e, "Poll tick failed");
            }
        }

        if attempts >= max_attempts {
            let finished = ctx
                .state
                .finish(job_id, Terminal::Completed(CompletionReason::PollCeiling));
            if finished {
                ctx.state.notice(
                    NoticeLevel::Warning,
                    format!(
                        "Scan did not report completion after {attempts} checks. \
                         Showing the {} results received so far.",
                        ctx.state.len()
                    ),
                );
            }
            break;
        }
    }
}

/// One poll tick. Returns `true` when the job ended.
async fn tick(ctx: &Context, job_id: JobId) -> Result<bool, StoreError> {
    let Some(started_at) = ctx.state.started_at(job_id) else {
        return Ok(true);
    };
    let project_id = ctx.project_id;

    if let Some(row) = ctx.store.latest_job_row(project_id).await? {
        if row.updated_at >= started_at {
            ctx.state
                .report_progress(job_id, row.stage.as_deref(), row.progress_percent());
            match row.durable_status() {
                DurableStatus::Completed => {
                    return complete_from_store(ctx, job_id, started_at, CompletionReason::PollFlag)
                        .await;
                }
                DurableStatus::Failed => {
                    ctx.state
                        .finish(job_id, Terminal::Failed("producer reported failure".into()));
                    return Ok(true);
                }
                DurableStatus::Cancelled => {
                    ctx.state.finish(job_id, Terminal::Cancelled);
                    return Ok(true);
                }
                _ => {}
            }
        }
    }

    let functions = &ctx.functions;
    let check = call_with_session(ctx.session.as_ref(), move |token| async move {
        functions.check_job_status(&token, project_id).await
    })
    .await;
    match check {
        Ok(check) if check.done => {
            tracing::debug!(%job_id, inserted = check.inserted_count, "Remote check reports done");
            return complete_from_store(ctx, job_id, started_at, CompletionReason::PollFlag).await;
        }
        Ok(_) => {}
        Err(e) => {
            tracing::warn!(%project_id, %job_id, error = %e, "Remote job check failed");
        }
    }

    let rows = ctx.store.results_since(project_id, Some(started_at)).await?;
    if rows.is_empty() {
        return Ok(false);
    }
    let records = records_from_rows(&rows, Channel::Poll, Some(job_id));
    Ok(ctx.state.complete_with(
        job_id,
        records,
        Terminal::Completed(CompletionReason::PollResults),
    ))
}

async fn complete_from_store(
    ctx: &Context,
    job_id: JobId,
    started_at: Timestamp,
    reason: CompletionReason,
) -> Result<bool, StoreError> {
    let rows = ctx.store.results_since(ctx.project_id, Some(started_at)).await?;
    let records = records_from_rows(&rows, Channel::Poll, Some(job_id));
    ctx.state
        .complete_with(job_id, records, Terminal::Completed(reason));
    Ok(true)
}
