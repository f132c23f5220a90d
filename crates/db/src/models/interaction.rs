//! Interaction audit rows (`lead_interactions`).

use radar_core::interaction::Interaction;
use radar_core::types::{ProjectId, Timestamp, UserId};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `lead_interactions` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct LeadInteraction {
    pub id: i64,
    pub project_id: ProjectId,
    pub user_id: Option<UserId>,
    pub company_id: String,
    pub action: String,
    pub duration_ms: Option<i64>,
    pub created_at: Timestamp,
}

/// Insert DTO for `lead_interactions`.
#[derive(Debug, Clone)]
pub struct NewLeadInteraction {
    pub project_id: ProjectId,
    pub user_id: Option<UserId>,
    pub company_id: String,
    pub action: &'static str,
    pub duration_ms: Option<i64>,
    pub created_at: Timestamp,
}

impl NewLeadInteraction {
    pub fn from_interaction(
        project_id: ProjectId,
        user_id: Option<UserId>,
        interaction: &Interaction,
    ) -> Self {
        Self {
            project_id,
            user_id,
            company_id: interaction.record_id.clone(),
            action: interaction.action.as_str(),
            duration_ms: interaction
                .duration_ms
                .map(|ms| i64::try_from(ms).unwrap_or(i64::MAX)),
            created_at: interaction.timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use radar_core::interaction::InteractionAction;

    use super::*;

    #[test]
    fn maps_action_literal_and_duration() {
        let interaction = Interaction {
            record_id: "row-2".into(),
            action: InteractionAction::Rejected,
            duration_ms: Some(1500),
            timestamp: chrono::Utc::now(),
        };
        let dto = NewLeadInteraction::from_interaction(uuid::Uuid::nil(), None, &interaction);
        assert_eq!(dto.action, "rejected");
        assert_eq!(dto.company_id, "row-2");
        assert_eq!(dto.duration_ms, Some(1500));
    }
}
