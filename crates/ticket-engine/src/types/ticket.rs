//! Tickets, priorities and the ticket status machine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Ticket priority assigned by classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    pub const ALL: [Priority; 3] = [Priority::High, Priority::Medium, Priority::Low];

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::High => "HIGH",
            Priority::Medium => "MEDIUM",
            Priority::Low => "LOW",
        }
    }

    /// Lenient parse used for classifier output and stored rows.
    ///
    /// Anything that is not a known label maps to `Medium`.
    pub fn from_label(label: &str) -> Self {
        label.parse().unwrap_or(Priority::Medium)
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Medium
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "HIGH" => Ok(Priority::High),
            "MEDIUM" => Ok(Priority::Medium),
            "LOW" => Ok(Priority::Low),
            other => Err(format!("Unknown priority: {}", other)),
        }
    }
}

/// Ticket lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TicketStatus {
    Open,
    Assigned,
    InProgress,
    Completed,
    RejectedByTech,
    Escalated,
}

impl TicketStatus {
    pub const ALL: [TicketStatus; 6] = [
        TicketStatus::Open,
        TicketStatus::Assigned,
        TicketStatus::InProgress,
        TicketStatus::Completed,
        TicketStatus::RejectedByTech,
        TicketStatus::Escalated,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TicketStatus::Open => "OPEN",
            TicketStatus::Assigned => "ASSIGNED",
            TicketStatus::InProgress => "IN_PROGRESS",
            TicketStatus::Completed => "COMPLETED",
            TicketStatus::RejectedByTech => "REJECTED_BY_TECH",
            TicketStatus::Escalated => "ESCALATED",
        }
    }

    /// Statuses watched by the escalation sweep
    pub const ACTIVE: [TicketStatus; 3] = [
        TicketStatus::Open,
        TicketStatus::Assigned,
        TicketStatus::InProgress,
    ];

    pub fn is_active(&self) -> bool {
        matches!(
            self,
            TicketStatus::Open | TicketStatus::Assigned | TicketStatus::InProgress
        )
    }

    /// Statuses from which a ticket may be handed to the router
    pub fn is_routable(&self) -> bool {
        matches!(self, TicketStatus::Open | TicketStatus::RejectedByTech)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TicketStatus::Completed)
    }

    /// Allowed status moves. Only `RejectedByTech` leads back to an
    /// unassigned state.
    pub fn can_transition_to(&self, next: TicketStatus) -> bool {
        use TicketStatus::*;
        matches!(
            (self, next),
            (Open, Assigned)
                | (Open, Escalated)
                | (Assigned, InProgress)
                | (Assigned, RejectedByTech)
                | (Assigned, Escalated)
                | (InProgress, Completed)
                | (InProgress, Escalated)
                | (RejectedByTech, Assigned)
                | (RejectedByTech, Open)
                | (RejectedByTech, Escalated)
                | (Escalated, InProgress)
                | (Escalated, Completed)
        )
    }
}

impl std::fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TicketStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        TicketStatus::ALL
            .iter()
            .copied()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("Unknown ticket status: {}", s))
    }
}

/// A reported issue and its routing state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: Uuid,
    pub description: String,
    pub location_in_store: String,
    /// Optional asset tag scanned from the equipment
    pub asset_tag: Option<String>,
    pub category: String,
    pub subcategory: String,
    pub priority: Priority,
    pub status: TicketStatus,
    pub store_id: Uuid,
    pub reporter_id: Uuid,
    /// Set once the ticket has been assigned
    pub assigned_provider_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Fixed at creation from the priority, never recomputed
    pub sla_deadline: DateTime<Utc>,
}

/// Incoming issue report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTicketRequest {
    pub description: String,
    pub location_in_store: String,
    pub asset_tag: Option<String>,
    pub store_id: Uuid,
    pub reporter_id: Uuid,
}

impl NewTicketRequest {
    pub fn new(
        description: impl Into<String>,
        location_in_store: impl Into<String>,
        store_id: Uuid,
        reporter_id: Uuid,
    ) -> Self {
        Self {
            description: description.into(),
            location_in_store: location_in_store.into(),
            asset_tag: None,
            store_id,
            reporter_id,
        }
    }

    pub fn with_asset_tag(mut self, tag: impl Into<String>) -> Self {
        self.asset_tag = Some(tag.into());
        self
    }

    /// Check field lengths before anything is persisted
    pub fn validate(&self) -> Result<(), String> {
        let description = self.description.trim().chars().count();
        if !(10..=1000).contains(&description) {
            return Err(format!(
                "description must be 10-1000 characters, got {}",
                description
            ));
        }

        let location = self.location_in_store.trim().chars().count();
        if !(1..=100).contains(&location) {
            return Err(format!(
                "location_in_store must be 1-100 characters, got {}",
                location
            ));
        }

        if let Some(tag) = &self.asset_tag {
            if tag.chars().count() > 100 {
                return Err("asset_tag must be at most 100 characters".to_string());
            }
        }

        Ok(())
    }
}

/// Completed-ticket counts for one provider over a time window
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionStats {
    pub completed: u32,
    /// Completed at or before their SLA deadline
    pub within_sla: u32,
}

impl CompletionStats {
    /// Share of completions that met the SLA, `None` without history
    pub fn on_time_ratio(&self) -> Option<f64> {
        if self.completed == 0 {
            None
        } else {
            Some(self.within_sla as f64 / self.completed as f64)
        }
    }
}
