//! State bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`EventBus`] fans out [`StateEvent`]s to any number of subscribers.
//! It is shared as `Arc<EventBus>` between the engine and its consumers.

use chrono::{DateTime, Utc};
use radar_core::radar_events::EVENT_NOTICE;
use radar_core::types::{JobId, ProjectId};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

// ---------------------------------------------------------------------------
// StateEvent
// ---------------------------------------------------------------------------

/// A visible change in engine state.
///
/// Constructed via [`StateEvent::new`] and enriched with
/// [`with_job`](StateEvent::with_job) and
/// [`with_payload`](StateEvent::with_payload).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateEvent {
    /// Dot-separated event name, see `radar_core::radar_events`.
    pub event_type: String,

    pub project_id: ProjectId,

    /// Job the event belongs to, when it belongs to one.
    pub job_id: Option<JobId>,

    /// Event-specific data.
    pub payload: serde_json::Value,

    /// When the event was created (UTC).
    pub timestamp: DateTime<Utc>,
}

impl StateEvent {
    pub fn new(event_type: impl Into<String>, project_id: ProjectId) -> Self {
        Self {
            event_type: event_type.into(),
            project_id,
            job_id: None,
            payload: serde_json::Value::Object(Default::default()),
            timestamp: Utc::now(),
        }
    }

    pub fn with_job(mut self, job_id: JobId) -> Self {
        self.job_id = Some(job_id);
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    /// A user-facing notice replacing a UI toast.
    pub fn notice(project_id: ProjectId, level: NoticeLevel, message: impl Into<String>) -> Self {
        Self::new(EVENT_NOTICE, project_id).with_payload(serde_json::json!({
            "level": level,
            "message": message.into(),
        }))
    }

    /// Level of a notice event, `None` for every other event type.
    pub fn notice_level(&self) -> Option<NoticeLevel> {
        if self.event_type != EVENT_NOTICE {
            return None;
        }
        serde_json::from_value(self.payload.get("level")?.clone()).ok()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

/// In-process fan-out bus.
///
/// # Usage
///
/// ```rust
/// use radar_events::bus::{EventBus, StateEvent};
///
/// let bus = EventBus::default();
/// let mut rx = bus.subscribe();
///
/// bus.publish(StateEvent::new("job.progress", uuid::Uuid::nil()));
/// ```
pub struct EventBus {
    sender: broadcast::Sender<StateEvent>,
}

impl EventBus {
    /// Create a bus with a specific channel capacity.
    ///
    /// When the buffer is full the oldest messages are dropped and slow
    /// receivers observe `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers.
    pub fn publish(&self, event: StateEvent) {
        tracing::trace!(event_type = %event.event_type, job_id = ?event.job_id, "State event");
        // A SendError only means there are zero receivers.
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StateEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
