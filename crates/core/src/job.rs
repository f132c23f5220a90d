//! Scan job lifecycle.
//!
//! A [`Job`] moves `idle -> compiling -> reviewing -> dispatched -> active`
//! and ends in exactly one terminal state. Terminal states are final:
//! a new scan always gets a new [`Job`].

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{JobId, ProjectId, Timestamp};

/// How long an active job may go without activity before it is reported
/// as stuck. Informational only; the watchdog threshold is much longer.
pub const STUCK_AFTER_SECS: i64 = 3 * 60;

/// Lifecycle status of a scan job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Idle,
    Compiling,
    /// Strategy compiled, waiting for the user to approve queries.
    Reviewing,
    Dispatched,
    Active,
    Completed,
    Cancelled,
    Failed,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Idle => "idle",
            JobStatus::Compiling => "compiling",
            JobStatus::Reviewing => "reviewing",
            JobStatus::Dispatched => "dispatched",
            JobStatus::Active => "active",
            JobStatus::Completed => "completed",
            JobStatus::Cancelled => "cancelled",
            JobStatus::Failed => "failed",
        }
    }

    /// Completed, cancelled and failed jobs never change again.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Cancelled | JobStatus::Failed
        )
    }

    /// At most one job per project may be in one of these states.
    pub fn is_in_flight(self) -> bool {
        matches!(
            self,
            JobStatus::Compiling | JobStatus::Dispatched | JobStatus::Active
        )
    }

    /// States in which observers may merge results into the store.
    pub fn accepts_results(self) -> bool {
        matches!(self, JobStatus::Dispatched | JobStatus::Active)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which observer (or shortcut) completed a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionReason {
    /// The status row reported completion over the change feed.
    PushSignal,
    /// The poll found the durable completion flag set.
    PollFlag,
    /// The poll found results newer than the job start.
    PollResults,
    /// The poll exhausted its attempts without a completion signal.
    PollCeiling,
    /// No activity for longer than the silence threshold.
    Watchdog,
    /// The producer reported recent results already exist.
    Recovered,
}

impl CompletionReason {
    pub fn as_str(self) -> &'static str {
        match self {
            CompletionReason::PushSignal => "push_signal",
            CompletionReason::PollFlag => "poll_flag",
            CompletionReason::PollResults => "poll_results",
            CompletionReason::PollCeiling => "poll_ceiling",
            CompletionReason::Watchdog => "watchdog",
            CompletionReason::Recovered => "recovered",
        }
    }

    /// Forced completions that did not see the producer finish.
    pub fn is_degraded(self) -> bool {
        matches!(self, CompletionReason::PollCeiling | CompletionReason::Watchdog)
    }
}

/// Requested terminal transition, applied through a single code path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Terminal {
    Completed(CompletionReason),
    Cancelled,
    Failed(String),
}

impl Terminal {
    pub fn status(&self) -> JobStatus {
        match self {
            Terminal::Completed(_) => JobStatus::Completed,
            Terminal::Cancelled => JobStatus::Cancelled,
            Terminal::Failed(_) => JobStatus::Failed,
        }
    }
}

/// One discovery scan for a project.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Job {
    pub id: JobId,
    pub project_id: ProjectId,
    pub status: JobStatus,
    pub stage: String,
    /// 0..=100, never decreases while the job is active.
    pub progress: u8,
    pub started_at: Timestamp,
    pub last_activity_at: Timestamp,
    /// Set when the job was force-completed without a producer signal.
    pub degraded: bool,
    pub completion: Option<CompletionReason>,
    pub error: Option<String>,
}

impl Job {
    /// A fresh job that has not yet left `idle`.
    pub fn new(id: JobId, project_id: ProjectId, now: Timestamp) -> Self {
        Self {
            id,
            project_id,
            status: JobStatus::Idle,
            stage: JobStatus::Idle.as_str().to_string(),
            progress: 0,
            started_at: now,
            last_activity_at: now,
            degraded: false,
            completion: None,
            error: None,
        }
    }

    /// Apply a progress report. Progress is clamped to 100 and never moves
    /// backwards; the stage label always follows the latest report.
    ///
    /// Returns `true` when anything visible changed.
    pub fn report_progress(&mut self, stage: Option<&str>, progress: Option<u8>) -> bool {
        let mut changed = false;
        if let Some(stage) = stage {
            if !stage.is_empty() && stage != self.stage {
                self.stage = stage.to_string();
                changed = true;
            }
        }
        if let Some(progress) = progress {
            let progress = progress.min(100);
            if progress > self.progress {
                self.progress = progress;
                changed = true;
            }
        }
        changed
    }

    /// Whether the job is active yet silent for longer than
    /// [`STUCK_AFTER_SECS`].
    pub fn is_stuck(&self, now: Timestamp) -> bool {
        self.status == JobStatus::Active
            && (now - self.last_activity_at).num_seconds() > STUCK_AFTER_SECS
    }
}
