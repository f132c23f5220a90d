//! Event type constants published on the engine's state bus.
//!
//! Consumed by presentation layers subscribed to `radar_events::EventBus`.

/// Job status changed (payload: status, stage, progress, degraded).
pub const EVENT_JOB_STATUS: &str = "job.status_changed";

/// Stage or progress changed without a status change.
pub const EVENT_JOB_PROGRESS: &str = "job.progress";

/// Job completed (payload: reason).
pub const EVENT_JOB_COMPLETED: &str = "job.completed";

/// Job was cancelled by the user.
pub const EVENT_JOB_CANCELLED: &str = "job.cancelled";

/// Job failed with an error.
pub const EVENT_JOB_FAILED: &str = "job.failed";

/// A record was inserted or replaced.
pub const EVENT_RESULTS_MERGED: &str = "results.merged";

/// Records were removed by feedback.
pub const EVENT_RESULTS_REMOVED: &str = "results.removed";

/// The whole result set was cleared.
pub const EVENT_RESULTS_CLEARED: &str = "results.cleared";

/// A ripple result was applied.
pub const EVENT_FEEDBACK_APPLIED: &str = "feedback.applied";

/// User-facing notice (payload: level, message).
pub const EVENT_NOTICE: &str = "notice";
