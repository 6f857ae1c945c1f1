use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Escalation handling state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EscalationStatus {
    Triggered,
    Acknowledged,
    Resolved,
}

impl EscalationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EscalationStatus::Triggered => "TRIGGERED",
            EscalationStatus::Acknowledged => "ACKNOWLEDGED",
            EscalationStatus::Resolved => "RESOLVED",
        }
    }

    /// Open escalations block a duplicate for the same trigger
    pub fn is_open(&self) -> bool {
        !matches!(self, EscalationStatus::Resolved)
    }

    pub fn can_transition_to(&self, next: EscalationStatus) -> bool {
        use EscalationStatus::*;
        matches!(
            (self, next),
            (Triggered, Acknowledged) | (Triggered, Resolved) | (Acknowledged, Resolved)
        )
    }
}

impl std::fmt::Display for EscalationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EscalationStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "TRIGGERED" => Ok(EscalationStatus::Triggered),
            "ACKNOWLEDGED" => Ok(EscalationStatus::Acknowledged),
            "RESOLVED" => Ok(EscalationStatus::Resolved),
            other => Err(format!("Unknown escalation status: {}", other)),
        }
    }
}

/// A recorded SLA breach for a ticket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Escalation {
    pub id: Uuid,
    pub ticket_id: Uuid,
    /// Which SLA clause fired, e.g. "Acceptance timeout exceeded"
    pub trigger_event: String,
    /// Store moderator at the time of the breach
    pub escalated_to: Option<Uuid>,
    pub status: EscalationStatus,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Escalation {
    pub fn triggered(
        ticket_id: Uuid,
        trigger_event: impl Into<String>,
        escalated_to: Option<Uuid>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            ticket_id,
            trigger_event: trigger_event.into(),
            escalated_to,
            status: EscalationStatus::Triggered,
            created_at,
            resolved_at: None,
        }
    }
}
