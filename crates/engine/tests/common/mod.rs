#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use radar_core::error::{FeedError, RemoteError, StoreError};
use radar_core::interaction::{
    FeedbackAction, Interaction, RecalibrationMode, RecalibrationOutcome, RippleResult,
};
use radar_core::ports::{
    AccessToken, ChangeFeed, CompileRequest, CompiledStrategy, DispatchAck, DurableStore,
    FeedEvent, FeedKind, FeedSubscription, FeedbackRequest, JobCheck, RadarFunctions,
    SessionProvider,
};
use radar_core::rows::{JobStatusRow, ResultRow};
use radar_core::types::{ProjectId, Timestamp, UserId};
use radar_engine::{Collaborators, EngineConfig, RadarEngine};
use radar_events::{EventBus, StateEvent};
use tokio::sync::{broadcast, mpsc};

// ---------------------------------------------------------------------------
// Remote functions
// ---------------------------------------------------------------------------

type Probe = Box<dyn Fn() + Send + Sync>;

pub struct FakeFunctions {
    pub compile: Mutex<Result<CompiledStrategy, RemoteError>>,
    pub dispatch: Mutex<Result<DispatchAck, RemoteError>>,
    pub check: Mutex<Result<JobCheck, RemoteError>>,
    pub ripple: Mutex<Result<RippleResult, RemoteError>>,
    pub recalibration: Mutex<Result<RecalibrationOutcome, RemoteError>>,

    pub compile_calls: AtomicU32,
    pub dispatch_calls: AtomicU32,
    pub check_calls: AtomicU32,
    pub feedback_calls: AtomicU32,
    pub recalibrate_calls: AtomicU32,

    /// Upcoming calls (of any kind) answered with `SessionExpired`.
    pub expire_next: AtomicU32,
    pub last_compile: Mutex<Option<CompileRequest>>,
    pub last_dispatch: Mutex<Vec<String>>,
    dispatch_probe: Mutex<Option<Probe>>,
}

impl Default for FakeFunctions {
    fn default() -> Self {
        Self {
            compile: Mutex::new(Ok(CompiledStrategy {
                identity: serde_json::json!({"sector": "legal"}),
                queries: vec!["sector:legal".into(), "size:11-50".into()],
                fallback_mode: false,
            })),
            dispatch: Mutex::new(Ok(DispatchAck {
                accepted: true,
                recovered: false,
            })),
            check: Mutex::new(Ok(JobCheck {
                done: false,
                inserted_count: 0,
            })),
            ripple: Mutex::new(Ok(ripple(FeedbackAction::Reject, &[], &[]))),
            recalibration: Mutex::new(Ok(RecalibrationOutcome {
                mode: RecalibrationMode::Pivot,
                mode_reason: "most leads rejected".into(),
                learned_insights: vec!["avoid legal".into()],
            })),
            compile_calls: AtomicU32::new(0),
            dispatch_calls: AtomicU32::new(0),
            check_calls: AtomicU32::new(0),
            feedback_calls: AtomicU32::new(0),
            recalibrate_calls: AtomicU32::new(0),
            expire_next: AtomicU32::new(0),
            last_compile: Mutex::new(None),
            last_dispatch: Mutex::new(Vec::new()),
            dispatch_probe: Mutex::new(None),
        }
    }
}

impl FakeFunctions {
    /// Run `probe` at the moment `dispatch_job` is invoked.
    pub fn on_dispatch(&self, probe: impl Fn() + Send + Sync + 'static) {
        *self.dispatch_probe.lock().unwrap() = Some(Box::new(probe));
    }

    fn expired(&self) -> bool {
        self.expire_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

pub fn ripple(action: FeedbackAction, affected: &[&str], removed: &[&str]) -> RippleResult {
    RippleResult {
        action,
        affected_parameters: affected.iter().map(|s| s.to_string()).collect(),
        parameter_deltas: Default::default(),
        records_removed: removed.len() as u32,
        removed_record_ids: removed.iter().map(|s| s.to_string()).collect(),
        new_search_suggestion: None,
    }
}

#[async_trait]
impl RadarFunctions for FakeFunctions {
    async fn compile_strategy(
        &self,
        _token: &AccessToken,
        request: &CompileRequest,
    ) -> Result<CompiledStrategy, RemoteError> {
        self.compile_calls.fetch_add(1, Ordering::SeqCst);
        if self.expired() {
            return Err(RemoteError::SessionExpired);
        }
        *self.last_compile.lock().unwrap() = Some(request.clone());
        self.compile.lock().unwrap().clone()
    }

    async fn dispatch_job(
        &self,
        _token: &AccessToken,
        _project_id: ProjectId,
        approved_queries: &[String],
    ) -> Result<DispatchAck, RemoteError> {
        self.dispatch_calls.fetch_add(1, Ordering::SeqCst);
        if self.expired() {
            return Err(RemoteError::SessionExpired);
        }
        if let Some(probe) = self.dispatch_probe.lock().unwrap().as_ref() {
            probe();
        }
        *self.last_dispatch.lock().unwrap() = approved_queries.to_vec();
        self.dispatch.lock().unwrap().clone()
    }

    async fn check_job_status(
        &self,
        _token: &AccessToken,
        _project_id: ProjectId,
    ) -> Result<JobCheck, RemoteError> {
        self.check_calls.fetch_add(1, Ordering::SeqCst);
        self.check.lock().unwrap().clone()
    }

    async fn submit_feedback(
        &self,
        _token: &AccessToken,
        _request: &FeedbackRequest,
    ) -> Result<RippleResult, RemoteError> {
        self.feedback_calls.fetch_add(1, Ordering::SeqCst);
        self.ripple.lock().unwrap().clone()
    }

    async fn recalibrate(
        &self,
        _token: &AccessToken,
        _project_id: ProjectId,
        _user_id: UserId,
        _force_fresh_start: bool,
    ) -> Result<RecalibrationOutcome, RemoteError> {
        self.recalibrate_calls.fetch_add(1, Ordering::SeqCst);
        self.recalibration.lock().unwrap().clone()
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

pub struct FakeSession {
    pub user: Mutex<Option<UserId>>,
    pub refreshes: AtomicU32,
}

impl Default for FakeSession {
    fn default() -> Self {
        Self {
            user: Mutex::new(Some(uuid::Uuid::now_v7())),
            refreshes: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl SessionProvider for FakeSession {
    async fn access_token(&self) -> Result<AccessToken, RemoteError> {
        Ok(AccessToken::new("token"))
    }

    async fn force_refresh(&self) -> Result<AccessToken, RemoteError> {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        Ok(AccessToken::new("refreshed"))
    }

    fn user_id(&self) -> Option<UserId> {
        *self.user.lock().unwrap()
    }
}

// ---------------------------------------------------------------------------
// Durable store
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeStore {
    pub in_progress: Mutex<Option<JobStatusRow>>,
    pub latest: Mutex<Option<JobStatusRow>>,
    pub results: Mutex<Vec<ResultRow>>,
    pub interactions: Mutex<Vec<Interaction>>,
    pub cancellations: AtomicU32,
    pub purges: AtomicU32,
}

#[async_trait]
impl DurableStore for FakeStore {
    async fn find_in_progress_job(
        &self,
        _project_id: ProjectId,
    ) -> Result<Option<JobStatusRow>, StoreError> {
        Ok(self.in_progress.lock().unwrap().clone())
    }

    async fn latest_job_row(
        &self,
        _project_id: ProjectId,
    ) -> Result<Option<JobStatusRow>, StoreError> {
        Ok(self.latest.lock().unwrap().clone())
    }

    async fn results_since(
        &self,
        _project_id: ProjectId,
        since: Option<Timestamp>,
    ) -> Result<Vec<ResultRow>, StoreError> {
        let rows = self.results.lock().unwrap();
        Ok(rows
            .iter()
            .filter(|row| since.map_or(true, |since| row.updated_at >= since))
            .cloned()
            .collect())
    }

    async fn mark_cancelled(&self, _project_id: ProjectId) -> Result<u64, StoreError> {
        self.cancellations.fetch_add(1, Ordering::SeqCst);
        Ok(1)
    }

    async fn record_interaction(
        &self,
        _project_id: ProjectId,
        _user_id: Option<UserId>,
        interaction: &Interaction,
    ) -> Result<(), StoreError> {
        self.interactions.lock().unwrap().push(interaction.clone());
        Ok(())
    }

    async fn purge_results(&self, _project_id: ProjectId) -> Result<u64, StoreError> {
        self.purges.fetch_add(1, Ordering::SeqCst);
        let mut rows = self.results.lock().unwrap();
        let removed = rows.len() as u64;
        rows.clear();
        Ok(removed)
    }
}

// ---------------------------------------------------------------------------
// Change feed
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeFeed {
    senders: Mutex<Vec<mpsc::Sender<FeedEvent>>>,
    pub subscriptions: AtomicU32,
    /// Accept subscriptions but close them straight away.
    pub hang_up: AtomicBool,
}

#[async_trait]
impl ChangeFeed for FakeFeed {
    async fn subscribe(&self, _project_id: ProjectId) -> Result<FeedSubscription, FeedError> {
        self.subscriptions.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::channel(64);
        if !self.hang_up.load(Ordering::SeqCst) {
            self.senders.lock().unwrap().push(tx);
        }
        Ok(FeedSubscription::new(rx))
    }
}

impl FakeFeed {
    /// Deliver an event on the newest subscription, waiting for one to
    /// exist. Delivery to a listener that already stopped is a no-op.
    pub async fn send(&self, event: FeedEvent) {
        loop {
            let tx = self.senders.lock().unwrap().last().cloned();
            if let Some(tx) = tx {
                let _ = tx.send(event).await;
                return;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }

    /// Drop every subscription, as a lost socket would.
    pub fn drop_all(&self) {
        self.senders.lock().unwrap().clear();
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub struct Harness {
    pub engine: RadarEngine,
    pub project_id: ProjectId,
    pub functions: Arc<FakeFunctions>,
    pub session: Arc<FakeSession>,
    pub store: Arc<FakeStore>,
    pub feed: Arc<FakeFeed>,
    pub events: broadcast::Receiver<StateEvent>,
}

pub fn harness() -> Harness {
    harness_with(EngineConfig::default())
}

pub fn harness_with(config: EngineConfig) -> Harness {
    build(
        config,
        Arc::new(FakeFunctions::default()),
        Arc::new(FakeStore::default()),
    )
}

/// Build an engine around existing fakes, as a page reload would.
pub fn build(config: EngineConfig, functions: Arc<FakeFunctions>, store: Arc<FakeStore>) -> Harness {
    let project_id = uuid::Uuid::now_v7();
    let session = Arc::new(FakeSession::default());
    let feed = Arc::new(FakeFeed::default());
    let bus = Arc::new(EventBus::default());
    let events = bus.subscribe();

    let engine = RadarEngine::new(
        config,
        project_id,
        Collaborators {
            functions: functions.clone(),
            session: session.clone(),
            store: store.clone(),
            feed: feed.clone(),
        },
        bus,
    );

    Harness {
        engine,
        project_id,
        functions,
        session,
        store,
        feed,
        events,
    }
}

impl Harness {
    /// Event types received so far, draining the receiver.
    pub fn drain_events(&mut self) -> Vec<StateEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }

    pub fn result_row(&self, id: &str, raw: serde_json::Value, updated_at: Timestamp) -> ResultRow {
        ResultRow {
            id: id.into(),
            project_id: self.project_id,
            raw_data: raw,
            updated_at,
            seq: None,
        }
    }

    pub fn status_row(&self, status: &str, progress: i32, updated_at: Timestamp) -> JobStatusRow {
        JobStatusRow {
            id: uuid::Uuid::now_v7(),
            project_id: self.project_id,
            status: status.into(),
            stage: Some(status.into()),
            progress: Some(progress),
            created_at: updated_at,
            updated_at,
        }
    }

    pub async fn push_result(&self, row: ResultRow) {
        self.feed
            .send(FeedEvent::Result {
                kind: FeedKind::Insert,
                row,
            })
            .await;
        settle().await;
    }

    pub async fn push_status(&self, row: JobStatusRow) {
        self.feed
            .send(FeedEvent::Status {
                kind: FeedKind::Update,
                row,
            })
            .await;
        settle().await;
    }
}

/// Let spawned tasks run to their next await point.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

/// Wall-clock time `secs` from now.
pub fn from_now(secs: i64) -> Timestamp {
    Utc::now() + chrono::Duration::seconds(secs)
}
