//! Accept/reject feedback and recalibration.

use std::sync::Arc;

use chrono::Utc;
use radar_core::error::{EngineError, RemoteError};
use radar_core::interaction::{
    FeedbackAction, Interaction, InteractionAction, RecalibrationOutcome, RippleResult,
};
use radar_core::ports::FeedbackRequest;
use radar_core::strategy::StrategyPlan;
use radar_core::types::JobId;
use radar_events::NoticeLevel;
use serde::Serialize;

use crate::context::Context;
use crate::controller::JobController;
use crate::session::call_with_session;

/// Result of a recalibration: what was learned and the job it started.
#[derive(Debug, Clone, Serialize)]
pub struct RecalibrationReport {
    pub outcome: RecalibrationOutcome,
    pub plan: StrategyPlan,
    pub job_id: JobId,
}

pub(crate) struct FeedbackLoop {
    ctx: Arc<Context>,
}

fn remote_to_feedback(e: RemoteError) -> EngineError {
    match e {
        RemoteError::SessionExpired => EngineError::SessionExpired,
        other => EngineError::Feedback(other.to_string()),
    }
}

impl FeedbackLoop {
    pub fn new(ctx: Arc<Context>) -> Self {
        Self { ctx }
    }

    /// Send one accept/reject signal and apply the ripple it produces.
    /// Nothing in the store changes unless the remote call succeeds.
    pub async fn submit(
        &self,
        record_id: &str,
        action: FeedbackAction,
    ) -> Result<RippleResult, EngineError> {
        let ctx = &self.ctx;
        let record_id = record_id.trim();
        if record_id.is_empty() {
            return Err(EngineError::Feedback("missing record id".into()));
        }
        if ctx.project_id.is_nil() {
            return Err(EngineError::Feedback("missing project id".into()));
        }
        let Some(user_id) = ctx.session.user_id() else {
            return Err(EngineError::Feedback("no signed-in user".into()));
        };

        let request = FeedbackRequest {
            project_id: ctx.project_id,
            record_id: record_id.to_string(),
            user_id,
            action,
        };
        let functions = &ctx.functions;
        let request_ref = &request;
        let ripple = call_with_session(ctx.session.as_ref(), move |token| async move {
            functions.submit_feedback(&token, request_ref).await
        })
        .await
        .map_err(|e| {
            let error = remote_to_feedback(e);
            ctx.state
                .notice(NoticeLevel::Error, format!("Feedback was not applied: {error}"));
            error
        })?;

        let interaction = Interaction {
            record_id: request.record_id.clone(),
            action: action.interaction(),
            duration_ms: None,
            timestamp: Utc::now(),
        };
        let removed = ctx.state.apply_ripple(&ripple, interaction.clone());
        self.persist(&interaction).await;

        tracing::info!(
            project_id = %ctx.project_id,
            record_id = %request.record_id,
            action = action.wire_name(),
            removed,
            "Feedback applied",
        );
        ctx.state.notice(NoticeLevel::Info, ripple.summary());
        Ok(ripple)
    }

    /// Log an interaction locally and in the durable audit trail.
    pub async fn track(&self, record_id: &str, action: InteractionAction, duration_ms: Option<u64>) {
        let interaction = Interaction {
            record_id: record_id.to_string(),
            action,
            duration_ms,
            timestamp: Utc::now(),
        };
        self.ctx.state.record_interaction(interaction.clone());
        self.persist(&interaction).await;
    }

    async fn persist(&self, interaction: &Interaction) {
        let ctx = &self.ctx;
        if let Err(e) = ctx
            .store
            .record_interaction(ctx.project_id, ctx.session.user_id(), interaction)
            .await
        {
            tracing::warn!(
                project_id = %ctx.project_id,
                record_id = %interaction.record_id,
                error = %e,
                "Failed to persist interaction",
            );
        }
    }

    /// Ask the remote to learn from past interactions, then compile and
    /// dispatch a new scan. With `force_fresh_start` the current job is
    /// cancelled and every result cleared before anything else happens.
    pub async fn recalibrate(
        &self,
        controller: &JobController,
        force_fresh_start: bool,
    ) -> Result<RecalibrationReport, EngineError> {
        let ctx = &self.ctx;
        let Some(user_id) = ctx.session.user_id() else {
            return Err(EngineError::Feedback("no signed-in user".into()));
        };

        if force_fresh_start {
            controller.cancel().await;
            let cleared = ctx.state.clear_results();
            tracing::info!(project_id = %ctx.project_id, cleared, "Cleared results for fresh start");
        }

        let project_id = ctx.project_id;
        let functions = &ctx.functions;
        let outcome = call_with_session(ctx.session.as_ref(), move |token| async move {
            functions
                .recalibrate(&token, project_id, user_id, force_fresh_start)
                .await
        })
        .await
        .map_err(remote_to_feedback)?;

        tracing::info!(
            %project_id,
            mode = ?outcome.mode,
            insights = outcome.learned_insights.len(),
            "Recalibration complete",
        );
        ctx.state
            .notice(NoticeLevel::Info, format!("Recalibrated: {}", outcome.mode_reason));

        let plan = controller.compile(true).await?;
        let job_id = controller.dispatch(plan.queries.clone()).await?;
        Ok(RecalibrationReport {
            outcome,
            plan,
            job_id,
        })
    }
}
