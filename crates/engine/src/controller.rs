//! Compile, dispatch, cancel and reset.
//!
//! Every remote failure is converted into an [`EngineError`] here, and
//! every terminal failure is surfaced once as a notice.

use std::sync::Arc;

use radar_core::error::{EngineError, RemoteError};
use radar_core::job::{CompletionReason, JobStatus, Terminal};
use radar_core::ports::CompileRequest;
use radar_core::record::Channel;
use radar_core::strategy::StrategyPlan;
use radar_core::types::JobId;
use radar_events::NoticeLevel;

use crate::context::Context;
use crate::reconciler::records_from_rows;
use crate::session::call_with_session;

pub(crate) struct JobController {
    ctx: Arc<Context>,
}

impl JobController {
    pub fn new(ctx: Arc<Context>) -> Self {
        Self { ctx }
    }

    /// Compile a strategy from the current parameter set and leave the
    /// job in `reviewing`.
    pub async fn compile(&self, force_refresh: bool) -> Result<StrategyPlan, EngineError> {
        let ctx = &self.ctx;
        let job_id = ctx.state.begin_compile(ctx.shutdown.child_token())?;

        let request = CompileRequest {
            project_id: ctx.project_id,
            force_refresh,
            parameters: ctx.state.parameters(),
        };
        tracing::info!(
            project_id = %ctx.project_id,
            %job_id,
            force_refresh,
            weights = request.parameters.weights().len(),
            "Compiling strategy",
        );

        let functions = &ctx.functions;
        let request = &request;
        let result = call_with_session(ctx.session.as_ref(), move |token| async move {
            functions.compile_strategy(&token, request).await
        })
        .await;

        let plan = match result {
            Ok(compiled) if !compiled.queries.is_empty() => {
                if compiled.fallback_mode {
                    StrategyPlan {
                        identity: compiled.identity,
                        queries: compiled.queries,
                        degraded: true,
                        warning: Some("Strategy compiled in fallback mode.".into()),
                    }
                } else {
                    StrategyPlan::compiled(compiled.identity, compiled.queries)
                }
            }
            Ok(_) => self.fallback_plan(job_id, "Strategy compiler returned no queries")?,
            Err(RemoteError::SessionExpired) => {
                ctx.state
                    .finish(job_id, Terminal::Failed("session expired".into()));
                ctx.state
                    .notice(NoticeLevel::Error, "Your session expired. Sign in again to scan.");
                return Err(EngineError::SessionExpired);
            }
            Err(e) => {
                tracing::warn!(project_id = %ctx.project_id, error = %e, "Strategy compiler failed");
                self.fallback_plan(job_id, &format!("Strategy compiler unavailable: {e}"))?
            }
        };

        if !ctx.state.plan_ready(job_id, plan.clone()) {
            return Err(EngineError::Strategy(
                "scan was cancelled during compilation".into(),
            ));
        }
        if let Some(warning) = &plan.warning {
            ctx.state.notice(NoticeLevel::Warning, warning.clone());
        }
        tracing::info!(
            project_id = %ctx.project_id,
            %job_id,
            queries = plan.queries.len(),
            degraded = plan.degraded,
            "Strategy ready for review",
        );
        Ok(plan)
    }

    fn fallback_plan(&self, job_id: JobId, reason: &str) -> Result<StrategyPlan, EngineError> {
        let ctx = &self.ctx;
        if ctx.config.fallback_queries.is_empty() {
            ctx.state.finish(job_id, Terminal::Failed(reason.to_string()));
            ctx.state.notice(NoticeLevel::Error, format!("{reason}."));
            return Err(EngineError::Strategy(reason.to_string()));
        }
        Ok(StrategyPlan::fallback(
            ctx.config.fallback_queries.clone(),
            format!("{reason}. Using the default search plan."),
        ))
    }

    /// Hand the approved queries to the producer and start observing the
    /// job. Returns once the producer has acknowledged.
    pub async fn dispatch(&self, queries: Vec<String>) -> Result<JobId, EngineError> {
        let ctx = &self.ctx;
        let queries: Vec<String> = queries
            .into_iter()
            .map(|q| q.trim().to_string())
            .filter(|q| !q.is_empty())
            .collect();
        if queries.is_empty() {
            ctx.state
                .notice(NoticeLevel::Warning, "Approve at least one query before scanning.");
            return Err(EngineError::NoStrategy);
        }

        let (job_id, token) = ctx.state.begin_dispatch(ctx.shutdown.child_token())?;
        ctx.observers.start(ctx, job_id, &token);
        tracing::info!(project_id = %ctx.project_id, %job_id, queries = queries.len(), "Dispatching scan");

        let project_id = ctx.project_id;
        let functions = &ctx.functions;
        let queries = &queries;
        let result = call_with_session(ctx.session.as_ref(), move |token| async move {
            functions.dispatch_job(&token, project_id, queries).await
        })
        .await;

        match result {
            Ok(ack) if ack.recovered => {
                self.complete_recovered(job_id).await;
                Ok(job_id)
            }
            Ok(ack) if ack.accepted => {
                ctx.state.set_status(job_id, JobStatus::Active);
                tracing::info!(%project_id, %job_id, "Scan accepted by producer");
                Ok(job_id)
            }
            Ok(_) => Err(self.fail_dispatch(
                job_id,
                EngineError::Dispatch("producer did not accept the scan".into()),
            )),
            Err(RemoteError::SessionExpired) => {
                Err(self.fail_dispatch(job_id, EngineError::SessionExpired))
            }
            Err(e) => Err(self.fail_dispatch(job_id, EngineError::Dispatch(e.to_string()))),
        }
    }

    fn fail_dispatch(&self, job_id: JobId, error: EngineError) -> EngineError {
        tracing::error!(project_id = %self.ctx.project_id, %job_id, error = %error, "Dispatch failed");
        self.ctx.state.abort_dispatch(job_id, &error.to_string());
        self.ctx
            .state
            .notice(NoticeLevel::Error, format!("Could not start the scan: {error}"));
        error
    }

    /// The producer already had results; load them instead of waiting.
    async fn complete_recovered(&self, job_id: JobId) {
        let ctx = &self.ctx;
        let rows = match ctx.store.results_since(ctx.project_id, None).await {
            Ok(rows) => rows,
            Err(e) => {
                tracing::warn!(project_id = %ctx.project_id, error = %e, "Failed to load recovered results");
                Vec::new()
            }
        };
        let records = records_from_rows(&rows, Channel::Recovery, Some(job_id));
        if ctx.state.complete_with(
            job_id,
            records,
            Terminal::Completed(CompletionReason::Recovered),
        ) {
            ctx.state.notice(
                NoticeLevel::Info,
                format!("Loaded {} results from a previous scan.", ctx.state.len()),
            );
        }
    }

    /// Cancel the current job. Idempotent; returns whether a job was
    /// actually cancelled.
    pub async fn cancel(&self) -> bool {
        let ctx = &self.ctx;
        let Some((job_id, from)) = ctx.state.finish_current(Terminal::Cancelled) else {
            return false;
        };

        if matches!(from, JobStatus::Dispatched | JobStatus::Active) {
            match ctx.store.mark_cancelled(ctx.project_id).await {
                Ok(rows) => {
                    tracing::debug!(project_id = %ctx.project_id, %job_id, rows, "Cancellation persisted");
                }
                Err(e) => {
                    tracing::warn!(
                        project_id = %ctx.project_id,
                        %job_id,
                        error = %e,
                        "Failed to persist cancellation",
                    );
                }
            }
        }
        ctx.state.notice(NoticeLevel::Info, "Scan cancelled.");
        true
    }

    /// Cancel, then drop the job, plan and every result, locally and in
    /// the durable store.
    pub async fn reset(&self) {
        let ctx = &self.ctx;
        self.cancel().await;
        ctx.state.reset();
        if let Err(e) = ctx.store.purge_results(ctx.project_id).await {
            tracing::warn!(project_id = %ctx.project_id, error = %e, "Failed to purge stored results");
        }
        ctx.state.notice(NoticeLevel::Info, "Radar reset.");
    }
}
