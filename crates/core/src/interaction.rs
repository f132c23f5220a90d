//! Feedback signals and what the re-weighting operation returns for them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::{RecordId, Timestamp};

/// Weight applied to an affected parameter on reject when the remote
/// listed it without a delta.
pub const REJECT_WEIGHT_DELTA: f64 = -15.0;
/// Weight applied to an affected parameter on accept, same rule.
pub const ACCEPT_WEIGHT_DELTA: f64 = 10.0;

/// What the user did with a record. Append-only audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionAction {
    Viewed,
    Accepted,
    Rejected,
}

impl InteractionAction {
    /// Literal stored in the audit table.
    pub fn as_str(self) -> &'static str {
        match self {
            InteractionAction::Viewed => "viewed",
            InteractionAction::Accepted => "validated",
            InteractionAction::Rejected => "rejected",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Interaction {
    pub record_id: RecordId,
    pub action: InteractionAction,
    pub duration_ms: Option<u64>,
    pub timestamp: Timestamp,
}

/// Explicit feedback on one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackAction {
    Accept,
    Reject,
}

impl FeedbackAction {
    /// Name understood by the re-weighting operation.
    pub fn wire_name(self) -> &'static str {
        match self {
            FeedbackAction::Accept => "validate",
            FeedbackAction::Reject => "exclude",
        }
    }

    pub fn interaction(self) -> InteractionAction {
        match self {
            FeedbackAction::Accept => InteractionAction::Accepted,
            FeedbackAction::Reject => InteractionAction::Rejected,
        }
    }

    pub fn default_weight_delta(self) -> f64 {
        match self {
            FeedbackAction::Accept => ACCEPT_WEIGHT_DELTA,
            FeedbackAction::Reject => REJECT_WEIGHT_DELTA,
        }
    }
}

/// Outcome of the re-weighting operation for one feedback signal.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RippleResult {
    pub action: FeedbackAction,
    pub affected_parameters: Vec<String>,
    pub parameter_deltas: BTreeMap<String, f64>,
    pub records_removed: u32,
    pub removed_record_ids: Vec<RecordId>,
    pub new_search_suggestion: Option<String>,
}

impl RippleResult {
    /// Deltas to fold into the parameter set. Affected parameters the
    /// remote listed without a value get the action's default delta.
    pub fn effective_deltas(&self) -> BTreeMap<String, f64> {
        let mut deltas = self.parameter_deltas.clone();
        for param in &self.affected_parameters {
            deltas
                .entry(param.clone())
                .or_insert_with(|| self.action.default_weight_delta());
        }
        deltas
    }

    /// Short human-readable description of what changed.
    pub fn summary(&self) -> String {
        let attrs = if self.affected_parameters.is_empty() {
            "similar profiles".to_string()
        } else {
            self.affected_parameters.join(", ")
        };

        let mut summary = match self.action {
            FeedbackAction::Reject => {
                let mut s = format!("Reducing priority of {attrs}.");
                if self.records_removed > 0 {
                    s.push_str(&format!(
                        " {} similar records removed.",
                        self.records_removed
                    ));
                }
                s
            }
            FeedbackAction::Accept => format!("Increasing priority of {attrs}."),
        };

        if let Some(suggestion) = &self.new_search_suggestion {
            summary.push_str(&format!(" Suggested search: {suggestion}"));
        }
        summary
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecalibrationMode {
    Expansion,
    Pivot,
}

/// What the recalibration operation learned from past interactions.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecalibrationOutcome {
    pub mode: RecalibrationMode,
    pub mode_reason: String,
    pub learned_insights: Vec<String>,
}
