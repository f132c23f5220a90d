//! [`DurableStore`] over the Postgres repositories.

use async_trait::async_trait;
use radar_core::error::StoreError;
use radar_core::interaction::Interaction;
use radar_core::ports::DurableStore;
use radar_core::rows::{JobStatusRow, ResultRow};
use radar_core::types::{ProjectId, Timestamp, UserId};

use crate::models::interaction::NewLeadInteraction;
use crate::repositories::{CatchAllRepo, InteractionRepo, ScanRepo};
use crate::DbPool;

/// Durable store backed by a shared connection pool.
#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

fn db_err(e: sqlx::Error) -> StoreError {
    StoreError::Database(e.to_string())
}

#[async_trait]
impl DurableStore for PgStore {
    async fn find_in_progress_job(
        &self,
        project_id: ProjectId,
    ) -> Result<Option<JobStatusRow>, StoreError> {
        let scan = ScanRepo::find_in_progress(&self.pool, project_id)
            .await
            .map_err(db_err)?;
        Ok(scan.map(Into::into))
    }

    async fn latest_job_row(
        &self,
        project_id: ProjectId,
    ) -> Result<Option<JobStatusRow>, StoreError> {
        let scan = ScanRepo::find_latest(&self.pool, project_id)
            .await
            .map_err(db_err)?;
        Ok(scan.map(Into::into))
    }

    async fn results_since(
        &self,
        project_id: ProjectId,
        since: Option<Timestamp>,
    ) -> Result<Vec<ResultRow>, StoreError> {
        let rows = match since {
            Some(since) => CatchAllRepo::list_since(&self.pool, project_id, since).await,
            None => CatchAllRepo::list_recent(&self.pool, project_id).await,
        }
        .map_err(db_err)?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn mark_cancelled(&self, project_id: ProjectId) -> Result<u64, StoreError> {
        let updated = ScanRepo::cancel_in_progress(&self.pool, project_id)
            .await
            .map_err(db_err)?;
        tracing::debug!(%project_id, updated, "Marked in-progress scans cancelled");
        Ok(updated)
    }

    async fn record_interaction(
        &self,
        project_id: ProjectId,
        user_id: Option<UserId>,
        interaction: &Interaction,
    ) -> Result<(), StoreError> {
        let input = NewLeadInteraction::from_interaction(project_id, user_id, interaction);
        InteractionRepo::insert(&self.pool, &input)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn purge_results(&self, project_id: ProjectId) -> Result<u64, StoreError> {
        let removed = CatchAllRepo::purge_project(&self.pool, project_id)
            .await
            .map_err(db_err)?;
        tracing::info!(%project_id, removed, "Purged stored results");
        Ok(removed)
    }
}
