//! The engine's public face.

use std::sync::Arc;

use radar_core::error::EngineError;
use radar_core::interaction::{FeedbackAction, InteractionAction, RippleResult};
use radar_core::ports::{ChangeFeed, DurableStore, RadarFunctions, SessionProvider};
use radar_core::strategy::StrategyPlan;
use radar_core::types::{JobId, ProjectId};
use radar_events::{EventBus, StateEvent};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::config::EngineConfig;
use crate::context::Context;
use crate::controller::JobController;
use crate::feedback::{FeedbackLoop, RecalibrationReport};
use crate::observers::JobObservers;
use crate::reconciler::ResultReconciler;
use crate::recovery;
use crate::state::{JobStateStore, Snapshot};

/// External systems the engine talks to.
pub struct Collaborators {
    pub functions: Arc<dyn RadarFunctions>,
    pub session: Arc<dyn SessionProvider>,
    pub store: Arc<dyn DurableStore>,
    pub feed: Arc<dyn ChangeFeed>,
}

/// Orchestrates scans for one project.
///
/// Consumers hold the engine (usually in an `Arc`) and follow its state
/// through [`subscribe`](Self::subscribe) or [`snapshot`](Self::snapshot).
pub struct RadarEngine {
    ctx: Arc<Context>,
    controller: JobController,
    feedback: FeedbackLoop,
}

impl RadarEngine {
    pub fn new(
        config: EngineConfig,
        project_id: ProjectId,
        collaborators: Collaborators,
        bus: Arc<EventBus>,
    ) -> Self {
        let state = Arc::new(JobStateStore::new(project_id, bus.clone()));
        let ctx = Arc::new(Context {
            config,
            project_id,
            reconciler: ResultReconciler::new(state.clone()),
            state,
            functions: collaborators.functions,
            session: collaborators.session,
            store: collaborators.store,
            feed: collaborators.feed,
            bus,
            shutdown: CancellationToken::new(),
            observers: JobObservers::default(),
        });

        Self {
            controller: JobController::new(ctx.clone()),
            feedback: FeedbackLoop::new(ctx.clone()),
            ctx,
        }
    }

    pub fn project_id(&self) -> ProjectId {
        self.ctx.project_id
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StateEvent> {
        self.ctx.bus.subscribe()
    }

    pub fn snapshot(&self) -> Snapshot {
        self.ctx.state.snapshot()
    }

    pub fn state(&self) -> &Arc<JobStateStore> {
        &self.ctx.state
    }

    pub fn reconciler(&self) -> &ResultReconciler {
        &self.ctx.reconciler
    }

    /// Compile a strategy and wait for it to be reviewed.
    pub async fn compile(&self, force_refresh: bool) -> Result<StrategyPlan, EngineError> {
        self.controller.compile(force_refresh).await
    }

    /// Dispatch approved queries. Returns once the producer acknowledged.
    pub async fn dispatch(&self, queries: Vec<String>) -> Result<JobId, EngineError> {
        self.controller.dispatch(queries).await
    }

    /// Cancel the current scan. Returns whether anything was cancelled.
    pub async fn cancel(&self) -> bool {
        self.controller.cancel().await
    }

    pub async fn reset(&self) {
        self.controller.reset().await
    }

    /// Resume observing a scan the producer is still running, if any.
    pub async fn recover(&self) -> Result<Option<JobId>, EngineError> {
        recovery::resume(&self.ctx).await
    }

    pub async fn submit_feedback(
        &self,
        record_id: &str,
        action: FeedbackAction,
    ) -> Result<RippleResult, EngineError> {
        self.feedback.submit(record_id, action).await
    }

    pub async fn track(&self, record_id: &str, action: InteractionAction, duration_ms: Option<u64>) {
        self.feedback.track(record_id, action, duration_ms).await
    }

    pub async fn recalibrate(&self, force_fresh_start: bool) -> Result<RecalibrationReport, EngineError> {
        self.feedback
            .recalibrate(&self.controller, force_fresh_start)
            .await
    }

    /// Number of observer tasks still running.
    pub fn running_observers(&self) -> usize {
        self.ctx.observers.running()
    }

    /// Stop every observer and wait for them to exit.
    pub async fn shutdown(&self) {
        tracing::info!(project_id = %self.ctx.project_id, "Shutting down radar engine");
        self.ctx.shutdown.cancel();
        self.ctx.observers.shutdown().await;
        tracing::info!(project_id = %self.ctx.project_id, "Radar engine shut down");
    }
}
