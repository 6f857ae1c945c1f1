use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Provider response to a proposed assignment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AssignmentStatus {
    Proposed,
    Accepted,
    Rejected,
}

impl AssignmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssignmentStatus::Proposed => "PROPOSED",
            AssignmentStatus::Accepted => "ACCEPTED",
            AssignmentStatus::Rejected => "REJECTED",
        }
    }
}

impl std::fmt::Display for AssignmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AssignmentStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "PROPOSED" => Ok(AssignmentStatus::Proposed),
            "ACCEPTED" => Ok(AssignmentStatus::Accepted),
            "REJECTED" => Ok(AssignmentStatus::Rejected),
            other => Err(format!("Unknown assignment status: {}", other)),
        }
    }
}

/// One routing attempt for a ticket; the highest sequence is authoritative
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketAssignment {
    pub id: Uuid,
    pub ticket_id: Uuid,
    pub provider_id: Uuid,
    /// Starts at 1, incremented for every re-route
    pub sequence: u32,
    pub status: AssignmentStatus,
    /// Total score that won the selection
    pub score: f64,
    /// Score breakdown kept for audit
    pub explanation: String,
    pub rejection_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub responded_at: Option<DateTime<Utc>>,
}

impl TicketAssignment {
    pub fn proposed(
        ticket_id: Uuid,
        provider_id: Uuid,
        sequence: u32,
        score: f64,
        explanation: String,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            ticket_id,
            provider_id,
            sequence,
            status: AssignmentStatus::Proposed,
            score,
            explanation,
            rejection_reason: None,
            created_at,
            responded_at: None,
        }
    }

    /// Still waiting on, or held by, the provider
    pub fn is_live(&self) -> bool {
        matches!(
            self.status,
            AssignmentStatus::Proposed | AssignmentStatus::Accepted
        )
    }
}
