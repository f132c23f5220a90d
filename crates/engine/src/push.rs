//! Push listener: follows the change feed for the lifetime of a job.
//!
//! Result rows are merged as they arrive. Status rows move progress
//! forward and can end the job. When the subscription drops, the
//! listener resubscribes with backoff until the job's token fires.

use std::sync::Arc;

use radar_core::job::{CompletionReason, JobStatus, Terminal};
use radar_core::ports::FeedEvent;
use radar_core::record::Channel;
use radar_core::rows::{DurableStatus, JobStatusRow};
use radar_core::types::JobId;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::context::Context;
use crate::reconnect::{resubscribe_loop, wait, Backoff};

pub(crate) async fn run(ctx: Arc<Context>, job_id: JobId, token: CancellationToken) {
    let project_id = ctx.project_id;
    let mut backoff = Backoff::new(&ctx.config.reconnect);

    loop {
        let Some(mut subscription) =
            resubscribe_loop(ctx.feed.as_ref(), project_id, &mut backoff, &token).await
        else {
            break;
        };
        let subscribed_at = Instant::now();

        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    tracing::debug!(%project_id, %job_id, "Push listener stopped");
                    return;
                }
                event = subscription.events.recv() => match event {
                    Some(event) => handle_event(&ctx, job_id, event),
                    None => break,
                }
            }
        }

        let lifetime = subscribed_at.elapsed();
        if backoff.is_stable(lifetime) {
            backoff.reset();
            tracing::warn!(%project_id, %job_id, "Change feed dropped, resubscribing");
            continue;
        }

        let delay = backoff.advance();
        tracing::warn!(
            %project_id,
            %job_id,
            lifetime_ms = lifetime.as_millis() as u64,
            delay_ms = delay.as_millis() as u64,
            "Change feed dropped soon after subscribing, backing off",
        );
        if !wait(delay, &token).await {
            break;
        }
    }
}

fn handle_event(ctx: &Context, job_id: JobId, event: FeedEvent) {
    ctx.state.touch(job_id);

    match event {
        FeedEvent::Result { row, .. } => {
            ctx.reconciler.merge_row(&row, Channel::Push, Some(job_id));
        }
        FeedEvent::Status { row, .. } => handle_status(ctx, job_id, &row),
    }
}

fn handle_status(ctx: &Context, job_id: JobId, row: &JobStatusRow) {
    // Rows last written before this job started belong to an older scan.
    let Some(started_at) = ctx.state.started_at(job_id) else {
        return;
    };
    if row.updated_at < started_at {
        tracing::trace!(row_id = %row.id, "Ignoring status row from an earlier scan");
        return;
    }

    ctx.state
        .report_progress(job_id, row.stage.as_deref(), row.progress_percent());

    match row.durable_status() {
        DurableStatus::Completed => {
            if ctx.state.status_of(job_id) == Some(JobStatus::Active) {
                ctx.state
                    .finish(job_id, Terminal::Completed(CompletionReason::PushSignal));
            }
        }
        DurableStatus::Failed => {
            let stage = row.stage.as_deref().unwrap_or("unknown");
            ctx.state.finish(
                job_id,
                Terminal::Failed(format!("producer reported failure at stage {stage}")),
            );
        }
        DurableStatus::Cancelled => {
            ctx.state.finish(job_id, Terminal::Cancelled);
        }
        DurableStatus::Queued | DurableStatus::Processing | DurableStatus::Other(_) => {}
    }
}
