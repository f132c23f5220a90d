//! Single source of truth for the current job and its result set.
//!
//! Every write goes through one mutex, so a merge or a status transition
//! is a single writer transaction. Terminal transitions all funnel into
//! one function ([`JobStateStore::finish`]); the first caller wins, every
//! later caller gets `false`. Finishing a job also cancels its token
//! while the lock is held, so no observer can act on the job afterwards.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use indexmap::IndexMap;
use radar_core::error::EngineError;
use radar_core::interaction::{Interaction, RippleResult};
use radar_core::job::{Job, JobStatus, Terminal};
use radar_core::radar_events::{
    EVENT_FEEDBACK_APPLIED, EVENT_JOB_CANCELLED, EVENT_JOB_COMPLETED, EVENT_JOB_FAILED,
    EVENT_JOB_PROGRESS, EVENT_JOB_STATUS, EVENT_RESULTS_CLEARED, EVENT_RESULTS_MERGED,
    EVENT_RESULTS_REMOVED,
};
use radar_core::record::ResultRecord;
use radar_core::rows::JobStatusRow;
use radar_core::strategy::{ParameterSet, StrategyPlan};
use radar_core::types::{JobId, ProjectId, RecordId, Timestamp};
use radar_events::{EventBus, NoticeLevel, StateEvent};
use serde::Serialize;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::reconciler::{self, MergeOutcome};

/// Read-only copy of the store for consumers.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub job: Option<Job>,
    /// Records in first-observed order.
    pub records: Vec<ResultRecord>,
    pub parameters: ParameterSet,
    pub plan: Option<StrategyPlan>,
    pub interaction_count: usize,
}

impl Snapshot {
    /// An active job that has shown no activity for a few minutes.
    pub fn is_stuck(&self, now: Timestamp) -> bool {
        self.job.as_ref().is_some_and(|job| job.is_stuck(now))
    }
}

pub struct JobStateStore {
    project_id: ProjectId,
    bus: Arc<EventBus>,
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    job: Option<JobSlot>,
    records: IndexMap<RecordId, ResultRecord>,
    parameters: ParameterSet,
    plan: Option<StrategyPlan>,
    interactions: Vec<Interaction>,
}

struct JobSlot {
    job: Job,
    /// Cancelled when the job reaches a terminal state; all observers of
    /// the job run on this token.
    token: CancellationToken,
    /// Monotonic clock for the watchdog.
    last_activity: Instant,
}

impl Inner {
    fn slot(&self, job_id: JobId) -> Option<&JobSlot> {
        self.job.as_ref().filter(|slot| slot.job.id == job_id)
    }

    fn slot_mut(&mut self, job_id: JobId) -> Option<&mut JobSlot> {
        self.job.as_mut().filter(|slot| slot.job.id == job_id)
    }

    fn in_flight(&self) -> bool {
        self.job
            .as_ref()
            .is_some_and(|slot| slot.job.status.is_in_flight())
    }
}

impl JobStateStore {
    pub fn new(project_id: ProjectId, bus: Arc<EventBus>) -> Self {
        Self {
            project_id,
            bus,
            inner: Mutex::new(Inner::default()),
        }
    }

    pub fn project_id(&self) -> ProjectId {
        self.project_id
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A panic while holding the lock leaves the data consistent
        // enough to keep serving; every write is a single assignment.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ---- job lifecycle ----

    /// Start a new job in `compiling`. Fails when another job is in flight.
    /// A job still waiting in `reviewing` is superseded.
    pub fn begin_compile(&self, token: CancellationToken) -> Result<JobId, EngineError> {
        let mut inner = self.lock();
        if inner.in_flight() {
            return Err(EngineError::JobInFlight(self.project_id));
        }
        if let Some(previous) = &inner.job {
            previous.token.cancel();
        }
        let job = self.install(&mut inner, token, JobStatus::Compiling);
        Ok(job)
    }

    /// Move the job to `dispatched`, reusing the job left in `reviewing`
    /// by a compile or starting a new one. Returns the job id and the
    /// token observers must run on.
    pub fn begin_dispatch(
        &self,
        fresh_token: CancellationToken,
    ) -> Result<(JobId, CancellationToken), EngineError> {
        let mut inner = self.lock();
        if inner.in_flight() {
            return Err(EngineError::JobInFlight(self.project_id));
        }

        let reusable = inner
            .job
            .as_ref()
            .filter(|slot| slot.job.status == JobStatus::Reviewing && !slot.token.is_cancelled())
            .map(|slot| (slot.job.id, slot.token.clone()));

        let (job_id, token) = match reusable {
            Some(reused) => reused,
            None => {
                if let Some(previous) = &inner.job {
                    previous.token.cancel();
                }
                let token = fresh_token;
                let job_id = self.install(&mut inner, token.clone(), JobStatus::Idle);
                (job_id, token)
            }
        };

        let now = Utc::now();
        if let Some(slot) = inner.slot_mut(job_id) {
            slot.job.started_at = now;
            slot.job.last_activity_at = now;
            slot.last_activity = Instant::now();
        }
        self.set_status_locked(&mut inner, job_id, JobStatus::Dispatched);
        Ok((job_id, token))
    }

    /// Rebuild an active job from a durable status row without
    /// dispatching anything.
    pub fn resume(&self, row: &JobStatusRow, token: CancellationToken) -> Result<JobId, EngineError> {
        let mut inner = self.lock();
        if inner.in_flight() {
            return Err(EngineError::JobInFlight(self.project_id));
        }
        if let Some(previous) = &inner.job {
            previous.token.cancel();
        }

        let now = Utc::now();
        let mut job = Job::new(row.id, self.project_id, row.created_at);
        job.status = JobStatus::Active;
        job.last_activity_at = now;
        job.report_progress(row.stage.as_deref(), row.progress_percent());

        tracing::info!(
            project_id = %self.project_id,
            job_id = %job.id,
            stage = %job.stage,
            progress = job.progress,
            "Resumed in-progress job",
        );
        self.publish_status(&job);
        inner.job = Some(JobSlot {
            job,
            token,
            last_activity: Instant::now(),
        });
        Ok(row.id)
    }

    fn install(&self, inner: &mut Inner, token: CancellationToken, status: JobStatus) -> JobId {
        let mut job = Job::new(uuid::Uuid::now_v7(), self.project_id, Utc::now());
        job.status = status;
        job.stage = status.as_str().to_string();
        let job_id = job.id;
        self.publish_status(&job);
        inner.job = Some(JobSlot {
            job,
            token,
            last_activity: Instant::now(),
        });
        job_id
    }

    /// Non-terminal transition. No-op for stale or terminal jobs.
    pub fn set_status(&self, job_id: JobId, status: JobStatus) -> bool {
        debug_assert!(!status.is_terminal(), "terminal states go through finish()");
        let mut inner = self.lock();
        self.set_status_locked(&mut inner, job_id, status)
    }

    fn set_status_locked(&self, inner: &mut Inner, job_id: JobId, status: JobStatus) -> bool {
        let Some(slot) = inner.slot_mut(job_id) else {
            return false;
        };
        if slot.job.status.is_terminal() || slot.job.status == status {
            return false;
        }
        slot.job.status = status;
        slot.job.stage = status.as_str().to_string();
        if status == JobStatus::Active {
            slot.last_activity = Instant::now();
            slot.job.last_activity_at = Utc::now();
        }
        tracing::debug!(job_id = %job_id, status = %status, "Job status changed");
        self.publish_status(&slot.job);
        true
    }

    /// Store the compiled plan and move the job to `reviewing`.
    pub fn plan_ready(&self, job_id: JobId, plan: StrategyPlan) -> bool {
        let mut inner = self.lock();
        let current = inner
            .slot(job_id)
            .is_some_and(|slot| slot.job.status == JobStatus::Compiling);
        if !current {
            return false;
        }
        inner.plan = Some(plan);
        self.set_status_locked(&mut inner, job_id, JobStatus::Reviewing)
    }

    /// Roll a failed dispatch back to `idle` and stop its observers.
    pub fn abort_dispatch(&self, job_id: JobId, error: &str) -> bool {
        let mut inner = self.lock();
        let Some(slot) = inner.slot_mut(job_id) else {
            return false;
        };
        if slot.job.status.is_terminal() {
            return false;
        }
        slot.token.cancel();
        slot.job.status = JobStatus::Idle;
        slot.job.stage = JobStatus::Idle.as_str().to_string();
        slot.job.error = Some(error.to_string());
        self.publish_status(&slot.job);
        true
    }

    /// The single terminal transition. Returns `true` only for the call
    /// that actually moved the job into a terminal state.
    pub fn finish(&self, job_id: JobId, terminal: Terminal) -> bool {
        let mut inner = self.lock();
        self.finish_locked(&mut inner, job_id, terminal)
    }

    /// Finish the current job unless it is idle or already terminal.
    /// Returns the job id and the status it left.
    pub fn finish_current(&self, terminal: Terminal) -> Option<(JobId, JobStatus)> {
        let mut inner = self.lock();
        let (job_id, from) = inner
            .job
            .as_ref()
            .filter(|slot| slot.job.status != JobStatus::Idle)
            .map(|slot| (slot.job.id, slot.job.status))?;
        self.finish_locked(&mut inner, job_id, terminal)
            .then_some((job_id, from))
    }

    fn finish_locked(&self, inner: &mut Inner, job_id: JobId, terminal: Terminal) -> bool {
        let Some(slot) = inner.slot_mut(job_id) else {
            return false;
        };
        if slot.job.status.is_terminal() {
            return false;
        }

        slot.token.cancel();
        let from = slot.job.status;
        let job = &mut slot.job;
        job.status = terminal.status();

        let (event_type, payload) = match &terminal {
            Terminal::Completed(reason) => {
                job.completion = Some(*reason);
                job.degraded |= reason.is_degraded();
                job.report_progress(None, Some(100));
                job.stage = "done".to_string();
                (
                    EVENT_JOB_COMPLETED,
                    serde_json::json!({"reason": reason, "degraded": job.degraded}),
                )
            }
            Terminal::Cancelled => {
                job.stage = JobStatus::Cancelled.as_str().to_string();
                (EVENT_JOB_CANCELLED, serde_json::json!({}))
            }
            Terminal::Failed(error) => {
                job.error = Some(error.clone());
                job.stage = JobStatus::Failed.as_str().to_string();
                (EVENT_JOB_FAILED, serde_json::json!({"error": error}))
            }
        };

        tracing::info!(
            project_id = %self.project_id,
            job_id = %job_id,
            from = %from,
            to = %job.status,
            completion = ?job.completion,
            "Job reached terminal state",
        );

        self.publish_status(job);
        self.bus.publish(
            StateEvent::new(event_type, self.project_id)
                .with_job(job_id)
                .with_payload(payload),
        );
        true
    }

    // ---- activity and progress ----

    /// Record activity on the job. Resets the watchdog clock.
    pub fn touch(&self, job_id: JobId) {
        let mut inner = self.lock();
        if let Some(slot) = inner.slot_mut(job_id) {
            if !slot.job.status.is_terminal() {
                slot.last_activity = Instant::now();
                slot.job.last_activity_at = Utc::now();
            }
        }
    }

    /// Apply a producer progress report to a non-terminal job.
    pub fn report_progress(&self, job_id: JobId, stage: Option<&str>, progress: Option<u8>) -> bool {
        let mut inner = self.lock();
        let Some(slot) = inner.slot_mut(job_id) else {
            return false;
        };
        if slot.job.status.is_terminal() || !slot.job.report_progress(stage, progress) {
            return false;
        }
        self.bus.publish(
            StateEvent::new(EVENT_JOB_PROGRESS, self.project_id)
                .with_job(job_id)
                .with_payload(serde_json::json!({
                    "stage": slot.job.stage,
                    "progress": slot.job.progress,
                })),
        );
        true
    }

    /// Time since the last activity, only while the job is active.
    pub fn silence(&self, job_id: JobId) -> Option<Duration> {
        let inner = self.lock();
        inner
            .slot(job_id)
            .filter(|slot| slot.job.status == JobStatus::Active)
            .map(|slot| slot.last_activity.elapsed())
    }

    pub fn status_of(&self, job_id: JobId) -> Option<JobStatus> {
        self.lock().slot(job_id).map(|slot| slot.job.status)
    }

    pub fn started_at(&self, job_id: JobId) -> Option<Timestamp> {
        self.lock().slot(job_id).map(|slot| slot.job.started_at)
    }

    pub fn current_job(&self) -> Option<Job> {
        self.lock().job.as_ref().map(|slot| slot.job.clone())
    }

    // ---- results ----

    /// Merge one record. With `gate` set, the record is only accepted
    /// while that job is current and dispatched or active.
    pub fn merge(&self, record: ResultRecord, gate: Option<JobId>) -> MergeOutcome {
        let mut inner = self.lock();
        if !Self::gate_open(&inner, gate) {
            return MergeOutcome::Ignored;
        }
        self.merge_locked(&mut inner, record)
    }

    /// Merge a batch under one lock.
    pub fn merge_all(&self, records: Vec<ResultRecord>, gate: Option<JobId>) -> Vec<MergeOutcome> {
        let mut inner = self.lock();
        if !Self::gate_open(&inner, gate) {
            return vec![MergeOutcome::Ignored; records.len()];
        }
        records
            .into_iter()
            .map(|record| self.merge_locked(&mut inner, record))
            .collect()
    }

    /// Merge a batch and complete the job in one writer transaction.
    /// Returns `false` (and merges nothing) if the job is no longer
    /// accepting results.
    pub fn complete_with(
        &self,
        job_id: JobId,
        records: Vec<ResultRecord>,
        terminal: Terminal,
    ) -> bool {
        let mut inner = self.lock();
        if !Self::gate_open(&inner, Some(job_id)) {
            return false;
        }
        for record in records {
            self.merge_locked(&mut inner, record);
        }
        self.finish_locked(&mut inner, job_id, terminal)
    }

    fn gate_open(inner: &Inner, gate: Option<JobId>) -> bool {
        match gate {
            None => true,
            Some(job_id) => inner
                .slot(job_id)
                .is_some_and(|slot| slot.job.status.accepts_results()),
        }
    }

    fn merge_locked(&self, inner: &mut Inner, record: ResultRecord) -> MergeOutcome {
        let outcome = reconciler::decide(inner.records.get(&record.id), &record);
        match outcome {
            MergeOutcome::Inserted | MergeOutcome::Replaced => {
                tracing::trace!(
                    record_id = %record.id,
                    via = record.observed_via.as_str(),
                    ?outcome,
                    "Record merged",
                );
                let mut event = StateEvent::new(EVENT_RESULTS_MERGED, self.project_id)
                    .with_payload(serde_json::json!({
                        "record_id": record.id,
                        "outcome": outcome.as_str(),
                    }));
                if let Some(job_id) = record.job_id {
                    event = event.with_job(job_id);
                }
                // Replacing keeps the original insertion position.
                inner.records.insert(record.id.clone(), record);
                self.bus.publish(event);
            }
            MergeOutcome::Stale | MergeOutcome::Ignored => {
                tracing::trace!(record_id = %record.id, "Stale record discarded");
            }
        }
        outcome
    }

    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, record_id: &str) -> Option<ResultRecord> {
        self.lock().records.get(record_id).cloned()
    }

    pub fn contains(&self, record_id: &str) -> bool {
        self.lock().records.contains_key(record_id)
    }

    /// Drop every record. Returns how many were removed.
    pub fn clear_results(&self) -> usize {
        let mut inner = self.lock();
        let removed = inner.records.len();
        inner.records.clear();
        self.bus.publish(
            StateEvent::new(EVENT_RESULTS_CLEARED, self.project_id)
                .with_payload(serde_json::json!({"removed": removed})),
        );
        removed
    }

    /// Forget the job, plan and results. Parameters survive a reset.
    pub fn reset(&self) {
        let mut inner = self.lock();
        if let Some(slot) = inner.job.take() {
            slot.token.cancel();
        }
        inner.plan = None;
        inner.records.clear();
        self.bus.publish(StateEvent::new(EVENT_RESULTS_CLEARED, self.project_id));
    }

    // ---- feedback ----

    /// Apply a ripple result atomically: remove the listed records, fold
    /// the deltas into the parameter set and log the interaction.
    /// Returns the number of records actually removed.
    pub fn apply_ripple(&self, ripple: &RippleResult, interaction: Interaction) -> usize {
        let mut inner = self.lock();
        let removed: Vec<RecordId> = ripple
            .removed_record_ids
            .iter()
            .filter(|id| inner.records.shift_remove(id.as_str()).is_some())
            .cloned()
            .collect();
        inner.parameters.apply(&ripple.effective_deltas());
        inner.interactions.push(interaction);

        if !removed.is_empty() {
            self.bus.publish(
                StateEvent::new(EVENT_RESULTS_REMOVED, self.project_id)
                    .with_payload(serde_json::json!({"record_ids": removed})),
            );
        }
        self.bus.publish(
            StateEvent::new(EVENT_FEEDBACK_APPLIED, self.project_id).with_payload(
                serde_json::json!({
                    "action": ripple.action,
                    "removed": removed.len(),
                    "summary": ripple.summary(),
                }),
            ),
        );
        removed.len()
    }

    pub fn record_interaction(&self, interaction: Interaction) {
        self.lock().interactions.push(interaction);
    }

    pub fn parameters(&self) -> ParameterSet {
        self.lock().parameters.clone()
    }

    pub fn plan(&self) -> Option<StrategyPlan> {
        self.lock().plan.clone()
    }

    pub fn snapshot(&self) -> Snapshot {
        let inner = self.lock();
        Snapshot {
            job: inner.job.as_ref().map(|slot| slot.job.clone()),
            records: inner.records.values().cloned().collect(),
            parameters: inner.parameters.clone(),
            plan: inner.plan.clone(),
            interaction_count: inner.interactions.len(),
        }
    }

    // ---- events ----

    pub fn notice(&self, level: NoticeLevel, message: impl Into<String>) {
        let message = message.into();
        match level {
            NoticeLevel::Info => tracing::info!(project_id = %self.project_id, "{message}"),
            NoticeLevel::Warning => tracing::warn!(project_id = %self.project_id, "{message}"),
            NoticeLevel::Error => tracing::error!(project_id = %self.project_id, "{message}"),
        }
        self.bus
            .publish(StateEvent::notice(self.project_id, level, message));
    }

    fn publish_status(&self, job: &Job) {
        self.bus.publish(
            StateEvent::new(EVENT_JOB_STATUS, self.project_id)
                .with_job(job.id)
                .with_payload(serde_json::json!({
                    "status": job.status,
                    "stage": job.stage,
                    "progress": job.progress,
                    "degraded": job.degraded,
                })),
        );
    }
}
