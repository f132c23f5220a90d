/// Projects are keyed by UUID in the shared store.
pub type ProjectId = uuid::Uuid;

/// Authenticated user identifier.
pub type UserId = uuid::Uuid;

/// Identifier of one scan job.
pub type JobId = uuid::Uuid;

/// Result record identity. Derived from the producing row, e.g. `"<row>-3"`.
pub type RecordId = String;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
