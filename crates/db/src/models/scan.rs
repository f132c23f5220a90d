//! Scan status rows (`radar_scans`).

use radar_core::rows::JobStatusRow;
use radar_core::types::{JobId, ProjectId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `radar_scans` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct RadarScan {
    pub id: JobId,
    pub project_id: ProjectId,
    pub status: String,
    pub stage: Option<String>,
    pub progress: Option<i32>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl From<RadarScan> for JobStatusRow {
    fn from(scan: RadarScan) -> Self {
        JobStatusRow {
            id: scan.id,
            project_id: scan.project_id,
            status: scan.status,
            stage: scan.stage,
            progress: scan.progress,
            created_at: scan.created_at,
            updated_at: scan.updated_at,
        }
    }
}
