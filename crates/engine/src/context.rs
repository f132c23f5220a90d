use std::sync::Arc;

use radar_core::ports::{ChangeFeed, DurableStore, RadarFunctions, SessionProvider};
use radar_core::types::ProjectId;
use radar_events::EventBus;
use tokio_util::sync::CancellationToken;

use crate::config::EngineConfig;
use crate::observers::JobObservers;
use crate::reconciler::ResultReconciler;
use crate::state::JobStateStore;

/// Everything the engine's components share.
pub(crate) struct Context {
    pub config: EngineConfig,
    pub project_id: ProjectId,
    pub state: Arc<JobStateStore>,
    pub reconciler: ResultReconciler,
    pub functions: Arc<dyn RadarFunctions>,
    pub session: Arc<dyn SessionProvider>,
    pub store: Arc<dyn DurableStore>,
    pub feed: Arc<dyn ChangeFeed>,
    pub bus: Arc<EventBus>,
    /// Parent of every job token; cancelled on shutdown.
    pub shutdown: CancellationToken,
    pub observers: JobObservers,
}
