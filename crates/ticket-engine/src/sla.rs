//! SLA thresholds and escalation triggers
//!
//! [`SlaPolicy`] maps a ticket priority to its assignment, acceptance and
//! resolution timeouts. The table is fixed once the policy is built; the
//! defaults are:
//!
//! | priority | assignment | acceptance | resolution |
//! |----------|-----------:|-----------:|-----------:|
//! | HIGH     | 15 min     | 30 min     | 4 h        |
//! | MEDIUM   | 30 min     | 60 min     | 12 h       |
//! | LOW      | 120 min    | 240 min    | 48 h       |
//!
//! [`SlaPolicy::evaluate`] turns a ticket snapshot into the list of
//! [`EscalationTrigger`]s that have fired. A deadline counts as exceeded only
//! once `now` is strictly past it.

use chrono::{DateTime, Duration, Utc};

use crate::config::{SlaConfig, SlaThresholds};
use crate::types::{Priority, Ticket, TicketStatus};

/// Timeouts for one priority
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlaRule {
    pub assignment_timeout: Duration,
    pub acceptance_timeout: Duration,
    pub resolution_timeout: Duration,
}

impl From<&SlaThresholds> for SlaRule {
    fn from(t: &SlaThresholds) -> Self {
        Self {
            assignment_timeout: Duration::minutes(t.assignment_timeout_minutes as i64),
            acceptance_timeout: Duration::minutes(t.acceptance_timeout_minutes as i64),
            resolution_timeout: Duration::hours(t.resolution_timeout_hours as i64),
        }
    }
}

/// Which SLA clause fired for a ticket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EscalationTrigger {
    AssignmentTimeout,
    AcceptanceTimeout,
    ResolutionTimeout,
    SlaDeadline,
}

impl EscalationTrigger {
    /// Stored trigger text, also the key for duplicate detection
    pub fn as_str(&self) -> &'static str {
        match self {
            EscalationTrigger::AssignmentTimeout => "Assignment timeout exceeded",
            EscalationTrigger::AcceptanceTimeout => "Acceptance timeout exceeded",
            EscalationTrigger::ResolutionTimeout => "Resolution timeout exceeded",
            EscalationTrigger::SlaDeadline => "SLA deadline exceeded",
        }
    }

    /// Only a missed SLA deadline changes the ticket status
    pub fn escalates_ticket(&self) -> bool {
        matches!(self, EscalationTrigger::SlaDeadline)
    }
}

impl std::fmt::Display for EscalationTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Priority to timeout table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlaPolicy {
    high: SlaRule,
    medium: SlaRule,
    low: SlaRule,
}

impl Default for SlaPolicy {
    fn default() -> Self {
        Self::from_config(&SlaConfig::default())
    }
}

impl SlaPolicy {
    pub fn from_config(config: &SlaConfig) -> Self {
        Self {
            high: SlaRule::from(&config.high),
            medium: SlaRule::from(&config.medium),
            low: SlaRule::from(&config.low),
        }
    }

    pub fn rule(&self, priority: Priority) -> &SlaRule {
        match priority {
            Priority::High => &self.high,
            Priority::Medium => &self.medium,
            Priority::Low => &self.low,
        }
    }

    /// Rule for a raw priority label, unknown labels use MEDIUM
    pub fn rule_for_label(&self, label: &str) -> &SlaRule {
        self.rule(Priority::from_label(label))
    }

    pub fn resolution_timeout(&self, priority: Priority) -> Duration {
        self.rule(priority).resolution_timeout
    }

    /// SLA deadline for a ticket created at `created_at`
    pub fn deadline_for(&self, priority: Priority, created_at: DateTime<Utc>) -> DateTime<Utc> {
        created_at + self.resolution_timeout(priority)
    }

    /// Triggers that have fired for `ticket` at `now`
    pub fn evaluate(&self, ticket: &Ticket, now: DateTime<Utc>) -> Vec<EscalationTrigger> {
        let rule = self.rule(ticket.priority);
        let mut fired = Vec::new();

        match ticket.status {
            TicketStatus::Open => {
                if now > ticket.created_at + rule.assignment_timeout {
                    fired.push(EscalationTrigger::AssignmentTimeout);
                }
            }
            TicketStatus::Assigned => {
                if let Some(assigned_at) = ticket.assigned_at {
                    if ticket.accepted_at.is_none() && now > assigned_at + rule.acceptance_timeout
                    {
                        fired.push(EscalationTrigger::AcceptanceTimeout);
                    }
                }
            }
            TicketStatus::InProgress => {
                if let Some(accepted_at) = ticket.accepted_at {
                    if ticket.completed_at.is_none()
                        && now > accepted_at + rule.resolution_timeout
                    {
                        fired.push(EscalationTrigger::ResolutionTimeout);
                    }
                }
            }
            _ => {}
        }

        if !ticket.status.is_terminal() && now > ticket.sla_deadline {
            fired.push(EscalationTrigger::SlaDeadline);
        }

        fired
    }
}
