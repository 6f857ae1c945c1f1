//! # SLA Escalation Monitor
//!
//! [`EscalationMonitor::sweep`] walks every active ticket (OPEN, ASSIGNED,
//! IN_PROGRESS), asks the [`SlaPolicy`] which timeouts have passed and records
//! one escalation per breached clause:
//!
//! | ticket status | clause checked                        | trigger text |
//! |---------------|---------------------------------------|--------------|
//! | OPEN          | `created_at + assignment timeout`     | Assignment timeout exceeded |
//! | ASSIGNED      | `assigned_at + acceptance timeout`    | Acceptance timeout exceeded |
//! | IN_PROGRESS   | `accepted_at + resolution timeout`    | Resolution timeout exceeded |
//! | any of them   | fixed `sla_deadline`                  | SLA deadline exceeded |
//!
//! Only the deadline clause changes the ticket, moving it to ESCALATED when
//! its escalation is first recorded. The move is a guarded write: a ticket
//! that was completed after the sweep read it is left alone.
//!
//! Sweeping is idempotent. While an escalation for a ticket and trigger is
//! TRIGGERED or ACKNOWLEDGED, later sweeps skip it; once RESOLVED, a fresh
//! breach of the same clause is recorded again. The repository enforces the
//! same rule on insert, so two monitors sweeping at once cannot double up.
//!
//! A failure on one ticket is logged and counted in the [`SweepReport`]; the
//! remaining tickets are still processed.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::{Result, TicketEngineError};
use crate::repository::{EscalationInsert, Repositories};
use crate::sla::{EscalationTrigger, SlaPolicy};
use crate::types::{Escalation, EscalationStatus, StoreTicketStats, Ticket, TicketStatus};

/// Counters from one sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    pub tickets_evaluated: usize,
    pub escalations_created: usize,
    /// Breaches that already had an open escalation
    pub duplicates_skipped: usize,
    /// Tickets moved to ESCALATED
    pub tickets_escalated: usize,
    /// Tickets whose evaluation failed
    pub failures: usize,
}

/// Periodic SLA checker
pub struct EscalationMonitor {
    repos: Repositories,
    sla: SlaPolicy,
    clock: Arc<dyn Clock>,
}

impl EscalationMonitor {
    pub fn new(repos: Repositories, sla: SlaPolicy, clock: Arc<dyn Clock>) -> Self {
        Self { repos, sla, clock }
    }

    /// Sweep at the clock's current time
    pub async fn sweep(&self) -> Result<SweepReport> {
        self.sweep_at(self.clock.now()).await
    }

    /// Sweep as if the time were `now`.
    ///
    /// Fails only when the active ticket set cannot be loaded.
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let tickets = self.repos.tickets.find_active().await?;
        let mut report = SweepReport::default();
        // store id -> moderator, filled lazily for this sweep only
        let mut moderators: HashMap<Uuid, Option<Uuid>> = HashMap::new();

        for ticket in &tickets {
            report.tickets_evaluated += 1;
            if let Err(e) = self
                .evaluate_ticket(ticket, now, &mut moderators, &mut report)
                .await
            {
                report.failures += 1;
                error!("❌ Escalation check failed for ticket {}: {}", ticket.id, e);
            }
        }

        if report.escalations_created > 0 || report.failures > 0 {
            info!(
                "⏰ Sweep done: {} tickets, {} escalations, {} duplicates, {} escalated, {} failures",
                report.tickets_evaluated,
                report.escalations_created,
                report.duplicates_skipped,
                report.tickets_escalated,
                report.failures
            );
        } else {
            debug!("Sweep done: {} tickets, nothing new", report.tickets_evaluated);
        }
        Ok(report)
    }

    async fn evaluate_ticket(
        &self,
        ticket: &Ticket,
        now: DateTime<Utc>,
        moderators: &mut HashMap<Uuid, Option<Uuid>>,
        report: &mut SweepReport,
    ) -> Result<()> {
        let triggers = self.sla.evaluate(ticket, now);
        if triggers.is_empty() {
            return Ok(());
        }

        let escalated_to = match moderators.get(&ticket.store_id) {
            Some(moderator) => *moderator,
            None => {
                let moderator = self.moderator_for(ticket.store_id).await?;
                moderators.insert(ticket.store_id, moderator);
                moderator
            }
        };

        for trigger in triggers {
            let created = self.raise(ticket, trigger, escalated_to, now, report).await?;
            if !(created && trigger.escalates_ticket()) {
                continue;
            }

            // Snapshot may be stale; only a still active ticket moves
            let moved = self
                .repos
                .tickets
                .transition_ticket_status(ticket.id, &TicketStatus::ACTIVE, TicketStatus::Escalated)
                .await?;
            if moved {
                report.tickets_escalated += 1;
                warn!("🚨 Ticket {} escalated: {}", ticket.id, trigger);
            } else {
                debug!("Ticket {} left the active set before it could be escalated", ticket.id);
            }
        }
        Ok(())
    }

    async fn raise(
        &self,
        ticket: &Ticket,
        trigger: EscalationTrigger,
        escalated_to: Option<Uuid>,
        now: DateTime<Utc>,
        report: &mut SweepReport,
    ) -> Result<bool> {
        if let Some(existing) = self
            .repos
            .escalations
            .find_open(ticket.id, trigger.as_str())
            .await?
        {
            report.duplicates_skipped += 1;
            debug!(
                "Escalation {} already open for ticket {} ({})",
                existing.id, ticket.id, trigger
            );
            return Ok(false);
        }

        let escalation = Escalation::triggered(ticket.id, trigger.as_str(), escalated_to, now);
        match self.repos.escalations.create_escalation(&escalation).await? {
            EscalationInsert::Created(created) => {
                report.escalations_created += 1;
                warn!(
                    "📣 Escalation {} for ticket {}: {} (to {:?})",
                    created.id, ticket.id, trigger, escalated_to
                );
                Ok(true)
            }
            EscalationInsert::Duplicate(existing) => {
                report.duplicates_skipped += 1;
                debug!(
                    "Escalation {} was opened concurrently for ticket {} ({})",
                    existing, ticket.id, trigger
                );
                Ok(false)
            }
        }
    }

    async fn moderator_for(&self, store_id: Uuid) -> Result<Option<Uuid>> {
        match self.repos.stores.find_store(store_id).await? {
            Some(store) => Ok(store.moderator_id),
            None => {
                warn!("⚠️ Store {} not found, escalating without a moderator", store_id);
                Ok(None)
            }
        }
    }

    /// TRIGGERED to ACKNOWLEDGED
    pub async fn acknowledge(&self, escalation_id: Uuid) -> Result<Escalation> {
        self.transition(escalation_id, EscalationStatus::Acknowledged)
            .await
    }

    /// TRIGGERED or ACKNOWLEDGED to RESOLVED
    pub async fn resolve(&self, escalation_id: Uuid) -> Result<Escalation> {
        self.transition(escalation_id, EscalationStatus::Resolved).await
    }

    async fn transition(&self, escalation_id: Uuid, next: EscalationStatus) -> Result<Escalation> {
        let mut escalation = self
            .repos
            .escalations
            .find_escalation(escalation_id)
            .await?
            .ok_or_else(|| TicketEngineError::not_found(format!("escalation {}", escalation_id)))?;

        if !escalation.status.can_transition_to(next) {
            return Err(TicketEngineError::invalid_transition(format!(
                "escalation {} is {} and cannot become {}",
                escalation_id, escalation.status, next
            )));
        }

        let now = self.clock.now();
        self.repos
            .escalations
            .update_escalation_status(escalation_id, next, now)
            .await?;

        escalation.status = next;
        if next == EscalationStatus::Resolved {
            escalation.resolved_at = Some(now);
        }
        info!("Escalation {} is now {}", escalation_id, next);
        Ok(escalation)
    }

    /// Every escalation of the ticket, oldest first
    pub async fn escalation_history(&self, ticket_id: Uuid) -> Result<Vec<Escalation>> {
        self.repos
            .escalations
            .list_escalations_for_ticket(ticket_id)
            .await
    }

    pub async fn open_escalations(&self) -> Result<Vec<Escalation>> {
        self.repos.escalations.list_open().await
    }

    pub async fn store_ticket_stats(&self, store_id: Uuid) -> Result<StoreTicketStats> {
        self.repos.tickets.store_ticket_stats(store_id).await
    }
}
