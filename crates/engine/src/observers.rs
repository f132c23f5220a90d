//! Spawning and stopping the per-job observer tasks.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use radar_core::types::JobId;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::context::Context;
use crate::{poll, push, watchdog};

/// How long shutdown waits for each task to exit.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Handles of the push listener, poller and watchdog of every job
/// started since the last prune.
#[derive(Default)]
pub(crate) struct JobObservers {
    handles: Mutex<Vec<(JobId, JoinHandle<()>)>>,
}

impl JobObservers {
    /// Spawn the three observers of `job_id`. They all stop when `token`
    /// is cancelled.
    pub fn start(&self, ctx: &Arc<Context>, job_id: JobId, token: &CancellationToken) {
        let mut handles = self.handles.lock().unwrap_or_else(|e| e.into_inner());
        handles.retain(|(_, handle)| !handle.is_finished());

        handles.push((job_id, tokio::spawn(push::run(ctx.clone(), job_id, token.clone()))));
        handles.push((job_id, tokio::spawn(poll::run(ctx.clone(), job_id, token.clone()))));
        handles.push((job_id, tokio::spawn(watchdog::run(ctx.clone(), job_id, token.clone()))));

        tracing::debug!(project_id = %ctx.project_id, %job_id, "Job observers started");
    }

    /// Number of observer tasks still running.
    pub fn running(&self) -> usize {
        let handles = self.handles.lock().unwrap_or_else(|e| e.into_inner());
        handles.iter().filter(|(_, h)| !h.is_finished()).count()
    }

    /// Wait for every task to exit. Callers cancel the tokens first.
    pub async fn shutdown(&self) {
        let handles: Vec<_> = {
            let mut guard = self.handles.lock().unwrap_or_else(|e| e.into_inner());
            guard.drain(..).collect()
        };

        for (job_id, handle) in handles {
            match tokio::time::timeout(SHUTDOWN_TIMEOUT, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::error!(%job_id, error = %e, "Observer task panicked"),
                Err(_) => tracing::warn!(%job_id, "Observer task did not stop in time"),
            }
        }
    }
}
