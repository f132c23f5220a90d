//! Repository for the `radar_scans` table.

use radar_core::rows::{DURABLE_CANCELLED, DURABLE_IN_PROGRESS};
use radar_core::types::ProjectId;
use sqlx::PgPool;

use crate::models::scan::RadarScan;

/// Column list for `radar_scans` queries.
const COLUMNS: &str = "id, project_id, status, stage, progress, created_at, updated_at";

/// Reads and cancels scan status rows. Rows are written by the producer.
pub struct ScanRepo;

impl ScanRepo {
    /// Most recently updated scan still in progress for a project.
    pub async fn find_in_progress(
        pool: &PgPool,
        project_id: ProjectId,
    ) -> Result<Option<RadarScan>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM radar_scans \
             WHERE project_id = $1 AND status = ANY($2) \
             ORDER BY updated_at DESC \
             LIMIT 1"
        );
        sqlx::query_as::<_, RadarScan>(&query)
            .bind(project_id)
            .bind(&DURABLE_IN_PROGRESS[..])
            .fetch_optional(pool)
            .await
    }

    /// Most recently updated scan for a project, whatever its status.
    pub async fn find_latest(
        pool: &PgPool,
        project_id: ProjectId,
    ) -> Result<Option<RadarScan>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM radar_scans \
             WHERE project_id = $1 \
             ORDER BY updated_at DESC \
             LIMIT 1"
        );
        sqlx::query_as::<_, RadarScan>(&query)
            .bind(project_id)
            .fetch_optional(pool)
            .await
    }

    /// Mark all in-progress scans of a project cancelled. Returns the
    /// number of rows updated.
    pub async fn cancel_in_progress(
        pool: &PgPool,
        project_id: ProjectId,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE radar_scans SET status = $1, stage = $1, updated_at = NOW() \
             WHERE project_id = $2 AND status = ANY($3)",
        )
        .bind(DURABLE_CANCELLED)
        .bind(project_id)
        .bind(&DURABLE_IN_PROGRESS[..])
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }
}
