//! Repository for the `lead_interactions` audit table.

use sqlx::PgPool;

use crate::models::interaction::{LeadInteraction, NewLeadInteraction};

const COLUMNS: &str = "id, project_id, user_id, company_id, action, duration_ms, created_at";

/// Append-only: interactions are inserted, never updated.
pub struct InteractionRepo;

impl InteractionRepo {
    pub async fn insert(
        pool: &PgPool,
        input: &NewLeadInteraction,
    ) -> Result<LeadInteraction, sqlx::Error> {
        let query = format!(
            "INSERT INTO lead_interactions (project_id, user_id, company_id, action, duration_ms, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, LeadInteraction>(&query)
            .bind(input.project_id)
            .bind(input.user_id)
            .bind(&input.company_id)
            .bind(input.action)
            .bind(input.duration_ms)
            .bind(input.created_at)
            .fetch_one(pool)
            .await
    }
}
