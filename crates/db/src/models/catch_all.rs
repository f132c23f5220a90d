//! Raw producer output (`radar_catch_all`).

use radar_core::rows::ResultRow;
use radar_core::types::{ProjectId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

/// A row from the `radar_catch_all` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct CatchAllRow {
    pub id: Uuid,
    pub project_id: ProjectId,
    pub raw_data: serde_json::Value,
    pub seq: i64,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl From<CatchAllRow> for ResultRow {
    fn from(row: CatchAllRow) -> Self {
        ResultRow {
            id: row.id.to_string(),
            project_id: row.project_id,
            raw_data: row.raw_data,
            updated_at: row.updated_at,
            seq: Some(row.seq),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_to_result_row_with_sequence() {
        let now = chrono::Utc::now();
        let id = Uuid::now_v7();
        let row = CatchAllRow {
            id,
            project_id: Uuid::nil(),
            raw_data: serde_json::json!({"companies": []}),
            seq: 42,
            created_at: now,
            updated_at: now,
        };
        let result: ResultRow = row.into();
        assert_eq!(result.id, id.to_string());
        assert_eq!(result.seq, Some(42));
        assert_eq!(result.updated_at, now);
    }
}
