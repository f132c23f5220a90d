//! Silence watchdog.
//!
//! Checks the job every `watchdog_interval`. An active job with no
//! activity for longer than `silence_threshold` is force-completed with
//! the results received so far, flagged degraded.

use std::sync::Arc;

use radar_core::job::{CompletionReason, Terminal};
use radar_core::types::JobId;
use radar_events::NoticeLevel;
use tokio_util::sync::CancellationToken;

use crate::context::Context;

pub(crate) async fn run(ctx: Arc<Context>, job_id: JobId, token: CancellationToken) {
    let threshold = ctx.config.silence_threshold;
    let mut ticker = tokio::time::interval(ctx.config.watchdog_interval);
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {}
        }

        match ctx.state.status_of(job_id) {
            Some(status) if !status.is_terminal() => {}
            _ => break,
        }
        let Some(silence) = ctx.state.silence(job_id) else {
            continue;
        };
        if silence <= threshold {
            continue;
        }

        tracing::warn!(
            project_id = %ctx.project_id,
            %job_id,
            silence_secs = silence.as_secs(),
            "Job silent past threshold",
        );
        if ctx
            .state
            .finish(job_id, Terminal::Completed(CompletionReason::Watchdog))
        {
            ctx.state.notice(
                NoticeLevel::Warning,
                format!(
                    "No activity for {} minutes. Scan completed with {} results.",
                    silence.as_secs() / 60,
                    ctx.state.len()
                ),
            );
        }
        break;
    }
}
