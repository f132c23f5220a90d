//! Repository for the `radar_catch_all` table.

use radar_core::types::{ProjectId, Timestamp};
use sqlx::PgPool;

use crate::models::catch_all::CatchAllRow;

const COLUMNS: &str = "id, project_id, raw_data, seq, created_at, updated_at";

/// Upper bound on rows returned by one read.
const MAX_ROWS: i64 = 500;

pub struct CatchAllRepo;

impl CatchAllRepo {
    /// Rows updated at or after `since`, oldest first.
    pub async fn list_since(
        pool: &PgPool,
        project_id: ProjectId,
        since: Timestamp,
    ) -> Result<Vec<CatchAllRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM radar_catch_all \
             WHERE project_id = $1 AND updated_at >= $2 \
             ORDER BY updated_at ASC, seq ASC \
             LIMIT $3"
        );
        sqlx::query_as::<_, CatchAllRow>(&query)
            .bind(project_id)
            .bind(since)
            .bind(MAX_ROWS)
            .fetch_all(pool)
            .await
    }

    /// The most recent rows for a project, oldest first.
    pub async fn list_recent(
        pool: &PgPool,
        project_id: ProjectId,
    ) -> Result<Vec<CatchAllRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM ( \
                 SELECT {COLUMNS} FROM radar_catch_all \
                 WHERE project_id = $1 \
                 ORDER BY updated_at DESC \
                 LIMIT $2 \
             ) recent \
             ORDER BY updated_at ASC, seq ASC"
        );
        sqlx::query_as::<_, CatchAllRow>(&query)
            .bind(project_id)
            .bind(MAX_ROWS)
            .fetch_all(pool)
            .await
    }

    /// Delete every row of a project. Returns the number of rows removed.
    pub async fn purge_project(pool: &PgPool, project_id: ProjectId) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM radar_catch_all WHERE project_id = $1")
            .bind(project_id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }
}
