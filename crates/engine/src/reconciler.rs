//! Merging records observed through push, poll and recovery into the
//! result set.

use std::sync::Arc;

use radar_core::record::{records_from_row, Channel, ResultRecord};
use radar_core::rows::ResultRow;
use radar_core::types::JobId;

use crate::state::JobStateStore;

/// What happened to one incoming record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// New id.
    Inserted,
    /// Same id, incoming observation is at least as recent.
    Replaced,
    /// Same id, existing observation is more recent.
    Stale,
    /// The owning job no longer accepts results.
    Ignored,
}

impl MergeOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            MergeOutcome::Inserted => "inserted",
            MergeOutcome::Replaced => "replaced",
            MergeOutcome::Stale => "stale",
            MergeOutcome::Ignored => "ignored",
        }
    }

    pub fn applied(self) -> bool {
        matches!(self, MergeOutcome::Inserted | MergeOutcome::Replaced)
    }
}

/// Last-write-wins decision for one id. Pure, and independent of which
/// channel delivered either observation.
pub fn decide(existing: Option<&ResultRecord>, incoming: &ResultRecord) -> MergeOutcome {
    match existing {
        None => MergeOutcome::Inserted,
        Some(current) if incoming.supersedes(current) => MergeOutcome::Replaced,
        Some(_) => MergeOutcome::Stale,
    }
}

/// Turn producer rows into records. Rows and list members that cannot be
/// read are logged with their raw payload and dropped; the rest of the
/// batch survives.
pub fn records_from_rows(rows: &[ResultRow], via: Channel, job_id: Option<JobId>) -> Vec<ResultRecord> {
    let mut records = Vec::new();
    for row in rows {
        match records_from_row(row, via, job_id) {
            Ok(mut batch) => {
                for rejected in &batch.rejected {
                    tracing::warn!(
                        row_id = %row.id,
                        via = via.as_str(),
                        error = %rejected,
                        raw_payload = %row.raw_data,
                        "Dropping malformed result candidate",
                    );
                }
                records.append(&mut batch.records);
            }
            Err(e) => {
                tracing::warn!(
                    row_id = %row.id,
                    via = via.as_str(),
                    error = %e,
                    raw_payload = %row.raw_data,
                    "Dropping malformed result row",
                );
            }
        }
    }
    records
}

/// Counts from merging a batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeSummary {
    pub inserted: usize,
    pub replaced: usize,
    pub stale: usize,
    pub ignored: usize,
}

impl MergeSummary {
    fn count(&mut self, outcome: MergeOutcome) {
        match outcome {
            MergeOutcome::Inserted => self.inserted += 1,
            MergeOutcome::Replaced => self.replaced += 1,
            MergeOutcome::Stale => self.stale += 1,
            MergeOutcome::Ignored => self.ignored += 1,
        }
    }
}

/// Entry point for records arriving from any channel.
#[derive(Clone)]
pub struct ResultReconciler {
    state: Arc<JobStateStore>,
}

impl ResultReconciler {
    pub fn new(state: Arc<JobStateStore>) -> Self {
        Self { state }
    }

    /// Merge one record, gated on its job when it carries one.
    pub fn merge(&self, record: ResultRecord) -> MergeOutcome {
        let gate = record.job_id;
        self.state.merge(record, gate)
    }

    /// Normalize a row and merge everything it contains.
    pub fn merge_row(&self, row: &ResultRow, via: Channel, job_id: Option<JobId>) -> MergeSummary {
        self.merge_rows(std::slice::from_ref(row), via, job_id)
    }

    pub fn merge_rows(&self, rows: &[ResultRow], via: Channel, job_id: Option<JobId>) -> MergeSummary {
        let records = records_from_rows(rows, via, job_id);
        let mut summary = MergeSummary::default();
        for outcome in self.state.merge_all(records, job_id) {
            summary.count(outcome);
        }
        if summary.inserted + summary.replaced > 0 {
            tracing::debug!(
                via = via.as_str(),
                inserted = summary.inserted,
                replaced = summary.replaced,
                stale = summary.stale,
                "Merged result rows",
            );
        }
        summary
    }
}
