use crate::types::ProjectId;

/// Errors surfaced by the engine's public commands.
///
/// Network-boundary failures are converted into one of these at the
/// controller / feedback boundary. Internal reconciliation problems
/// never reach this type; they are logged and the record is dropped.
#[derive(Debug, Clone, thiserror::Error)]
pub enum EngineError {
    /// The strategy compiler failed or returned no queries and no
    /// degraded default plan is configured.
    #[error("Strategy compilation failed: {0}")]
    Strategy(String),

    /// `dispatch` was called with an empty query list.
    #[error("No approved queries to dispatch")]
    NoStrategy,

    /// The session was still rejected after one forced refresh.
    #[error("Session expired")]
    SessionExpired,

    /// Network or server failure while dispatching. The job is left idle.
    #[error("Dispatch failed: {0}")]
    Dispatch(String),

    /// Feedback could not be submitted (missing identifiers or remote failure).
    #[error("Feedback failed: {0}")]
    Feedback(String),

    /// Another job is already compiling, dispatched or active.
    #[error("A scan is already in flight for project {0}")]
    JobInFlight(ProjectId),

    /// The durable store could not be read or written.
    #[error("Store error: {0}")]
    Store(String),
}

/// Errors from calls to the remote functions and the auth endpoint.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    /// The access token was rejected. Resolved by one forced refresh.
    #[error("Session expired")]
    SessionExpired,

    /// The request never produced a response (network, DNS, TLS, timeout).
    #[error("Remote unavailable: {0}")]
    Unavailable(String),

    /// The remote answered with a failure status or a `success: false` body.
    #[error("Remote rejected the call ({status}): {body}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Error text or raw body for debugging.
        body: String,
    },

    /// The response body did not have the expected shape.
    #[error("Failed to decode remote response: {0}")]
    Decode(String),
}

/// Errors from the durable store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),
}

/// Errors from the change feed subscription.
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    /// Failed to establish the subscription.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The server refused the join or spoke an unexpected protocol.
    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        EngineError::Store(e.to_string())
    }
}
