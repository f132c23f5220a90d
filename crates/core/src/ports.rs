//! Collaborator seams the engine is wired against.
//!
//! Production implementations live in `radar-client` (remote functions,
//! session, change feed) and `radar-db` (durable store). Tests plug in
//! in-memory fakes.

use std::fmt;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::{FeedError, RemoteError, StoreError};
use crate::interaction::{FeedbackAction, Interaction, RecalibrationOutcome, RippleResult};
use crate::rows::{JobStatusRow, ResultRow};
use crate::strategy::ParameterSet;
use crate::types::{ProjectId, RecordId, Timestamp, UserId};

// ---------------------------------------------------------------------------
// Remote functions
// ---------------------------------------------------------------------------

/// Bearer token for one authenticated call. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(***)")
    }
}

#[derive(Debug, Clone)]
pub struct CompileRequest {
    pub project_id: ProjectId,
    pub force_refresh: bool,
    pub parameters: ParameterSet,
}

#[derive(Debug, Clone)]
pub struct CompiledStrategy {
    pub identity: serde_json::Value,
    pub queries: Vec<String>,
    /// The compiler itself fell back to a reduced mode.
    pub fallback_mode: bool,
}

/// Producer acknowledgement of a dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchAck {
    pub accepted: bool,
    /// Recent results already exist; no new work was queued.
    pub recovered: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobCheck {
    pub done: bool,
    pub inserted_count: u64,
}

#[derive(Debug, Clone)]
pub struct FeedbackRequest {
    pub project_id: ProjectId,
    pub record_id: RecordId,
    pub user_id: UserId,
    pub action: FeedbackAction,
}

/// The remote operations of the scan backend.
#[async_trait]
pub trait RadarFunctions: Send + Sync {
    async fn compile_strategy(
        &self,
        token: &AccessToken,
        request: &CompileRequest,
    ) -> Result<CompiledStrategy, RemoteError>;

    async fn dispatch_job(
        &self,
        token: &AccessToken,
        project_id: ProjectId,
        approved_queries: &[String],
    ) -> Result<DispatchAck, RemoteError>;

    async fn check_job_status(
        &self,
        token: &AccessToken,
        project_id: ProjectId,
    ) -> Result<JobCheck, RemoteError>;

    async fn submit_feedback(
        &self,
        token: &AccessToken,
        request: &FeedbackRequest,
    ) -> Result<RippleResult, RemoteError>;

    async fn recalibrate(
        &self,
        token: &AccessToken,
        project_id: ProjectId,
        user_id: UserId,
        force_fresh_start: bool,
    ) -> Result<RecalibrationOutcome, RemoteError>;
}

/// Source of access tokens. Sessions expire independently of the engine.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// A token valid right now, refreshing first if it is about to expire.
    async fn access_token(&self) -> Result<AccessToken, RemoteError>;

    /// Discard the cached token and obtain a new one.
    async fn force_refresh(&self) -> Result<AccessToken, RemoteError>;

    fn user_id(&self) -> Option<UserId>;
}

// ---------------------------------------------------------------------------
// Durable store
// ---------------------------------------------------------------------------

#[async_trait]
pub trait DurableStore: Send + Sync {
    /// Most recent scan still `processing` or `queued`.
    async fn find_in_progress_job(
        &self,
        project_id: ProjectId,
    ) -> Result<Option<JobStatusRow>, StoreError>;

    /// Most recently updated scan row, whatever its status.
    async fn latest_job_row(
        &self,
        project_id: ProjectId,
    ) -> Result<Option<JobStatusRow>, StoreError>;

    /// Result rows updated at or after `since`, or all rows when `None`.
    async fn results_since(
        &self,
        project_id: ProjectId,
        since: Option<Timestamp>,
    ) -> Result<Vec<ResultRow>, StoreError>;

    /// Mark every in-progress scan of the project cancelled.
    async fn mark_cancelled(&self, project_id: ProjectId) -> Result<u64, StoreError>;

    async fn record_interaction(
        &self,
        project_id: ProjectId,
        user_id: Option<UserId>,
        interaction: &Interaction,
    ) -> Result<(), StoreError>;

    /// Delete all stored results of the project.
    async fn purge_results(&self, project_id: ProjectId) -> Result<u64, StoreError>;
}

// ---------------------------------------------------------------------------
// Change feed
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedKind {
    Insert,
    Update,
}

/// One change notification, filtered to a project.
#[derive(Debug, Clone)]
pub enum FeedEvent {
    Result { kind: FeedKind, row: ResultRow },
    Status { kind: FeedKind, row: JobStatusRow },
}

/// A live subscription. The stream ending means the subscription dropped.
pub struct FeedSubscription {
    pub events: mpsc::Receiver<FeedEvent>,
}

impl FeedSubscription {
    pub fn new(events: mpsc::Receiver<FeedEvent>) -> Self {
        Self { events }
    }
}

#[async_trait]
pub trait ChangeFeed: Send + Sync {
    async fn subscribe(&self, project_id: ProjectId) -> Result<FeedSubscription, FeedError>;
}
