//! Shapes of the two shared tables as the engine sees them, independent
//! of whether they arrived over the change feed or from a direct query.

use serde::{Deserialize, Serialize};

use crate::types::{JobId, ProjectId, Timestamp};

/// A row written by the result producer. `raw_data` holds one candidate
/// or a list of candidates in one of several envelope shapes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRow {
    pub id: String,
    pub project_id: ProjectId,
    pub raw_data: serde_json::Value,
    pub updated_at: Timestamp,
    /// Server-assigned, monotonically increasing per write when present.
    #[serde(default)]
    pub seq: Option<i64>,
}

/// A row of the durable scan status table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatusRow {
    pub id: JobId,
    pub project_id: ProjectId,
    pub status: String,
    pub stage: Option<String>,
    pub progress: Option<i32>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Status values written to the durable status table by the producer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DurableStatus {
    Queued,
    Processing,
    Completed,
    Failed,
    Cancelled,
    Other(String),
}

impl DurableStatus {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "queued" => DurableStatus::Queued,
            "processing" => DurableStatus::Processing,
            "completed" => DurableStatus::Completed,
            "failed" => DurableStatus::Failed,
            "cancelled" => DurableStatus::Cancelled,
            other => DurableStatus::Other(other.to_string()),
        }
    }

    /// Statuses ghost recovery resumes observation for.
    pub fn is_in_progress(&self) -> bool {
        matches!(self, DurableStatus::Queued | DurableStatus::Processing)
    }
}

/// Durable literals, shared by the repository and the recovery query.
pub const DURABLE_IN_PROGRESS: [&str; 2] = ["processing", "queued"];
pub const DURABLE_CANCELLED: &str = "cancelled";

impl JobStatusRow {
    pub fn durable_status(&self) -> DurableStatus {
        DurableStatus::parse(&self.status)
    }

    /// Progress as reported by the producer, clamped into `0..=100`.
    pub fn progress_percent(&self) -> Option<u8> {
        self.progress.map(|p| p.clamp(0, 100) as u8)
    }
}
