//! In-memory repository backend
//!
//! All state sits behind one `RwLock`, so every trait method, including the
//! multi-record commits, runs as a single critical section.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use uuid::Uuid;

use super::{
    AcceptanceCommit, AssignmentCommit, AssignmentRepository, CommitOutcome, CompletionCommit,
    EscalationInsert, EscalationRepository, ProviderRepository, RejectionCommit,
    StoreRepository, TicketHistoryRepository, TicketRepository,
};
use crate::error::{Result, TicketEngineError};
use crate::types::{
    AssignmentStatus, CompletionStats, Escalation, EscalationStatus, ServiceProvider, Store,
    StoreTicketStats, Ticket, TicketAssignment, TicketStatus,
};

#[derive(Debug, Default)]
struct MemoryState {
    providers: HashMap<Uuid, ServiceProvider>,
    stores: HashMap<Uuid, Store>,
    tickets: HashMap<Uuid, Ticket>,
    assignments: HashMap<Uuid, TicketAssignment>,
    escalations: HashMap<Uuid, Escalation>,
}

impl MemoryState {
    fn ticket_mut(&mut self, id: Uuid) -> Result<&mut Ticket> {
        self.tickets
            .get_mut(&id)
            .ok_or_else(|| TicketEngineError::not_found(format!("ticket {}", id)))
    }

    fn provider_mut(&mut self, id: Uuid) -> Result<&mut ServiceProvider> {
        self.providers
            .get_mut(&id)
            .ok_or_else(|| TicketEngineError::not_found(format!("provider {}", id)))
    }
}

/// Repository backend holding everything in process memory
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: RwLock<MemoryState>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every provider, for assertions and admin views
    pub fn providers(&self) -> Vec<ServiceProvider> {
        self.state.read().providers.values().cloned().collect()
    }

    /// Snapshot of every escalation
    pub fn escalations(&self) -> Vec<Escalation> {
        self.state.read().escalations.values().cloned().collect()
    }

    /// Replace a ticket wholesale
    pub fn put_ticket(&self, ticket: Ticket) {
        self.state.write().tickets.insert(ticket.id, ticket);
    }
}

#[async_trait]
impl ProviderRepository for InMemoryStore {
    async fn find_approved_with_capacity(&self) -> Result<Vec<ServiceProvider>> {
        let state = self.state.read();
        let mut providers: Vec<ServiceProvider> = state
            .providers
            .values()
            .filter(|p| p.is_routable())
            .cloned()
            .collect();
        // HashMap iteration order is arbitrary
        providers.sort_by_key(|p| p.id);
        Ok(providers)
    }

    async fn find_provider(&self, id: Uuid) -> Result<Option<ServiceProvider>> {
        Ok(self.state.read().providers.get(&id).cloned())
    }

    async fn save_provider(&self, provider: &ServiceProvider) -> Result<()> {
        self.state.write().providers.insert(provider.id, provider.clone());
        Ok(())
    }

    async fn increment_load(&self, id: Uuid, delta: u32) -> Result<()> {
        let mut state = self.state.write();
        let provider = state.provider_mut(id)?;
        let next = provider.current_load.saturating_add(delta);
        if next > provider.capacity_per_day {
            return Err(TicketEngineError::AssignmentConflict(id));
        }
        provider.current_load = next;
        Ok(())
    }

    async fn decrement_load(&self, id: Uuid, delta: u32) -> Result<()> {
        let mut state = self.state.write();
        let provider = state.provider_mut(id)?;
        provider.current_load = provider.current_load.saturating_sub(delta);
        Ok(())
    }
}

#[async_trait]
impl TicketRepository for InMemoryStore {
    async fn create_ticket(&self, ticket: &Ticket) -> Result<()> {
        let mut state = self.state.write();
        if state.tickets.contains_key(&ticket.id) {
            return Err(TicketEngineError::invalid_input(format!(
                "ticket {} already exists",
                ticket.id
            )));
        }
        state.tickets.insert(ticket.id, ticket.clone());
        Ok(())
    }

    async fn find_ticket(&self, id: Uuid) -> Result<Option<Ticket>> {
        Ok(self.state.read().tickets.get(&id).cloned())
    }

    async fn find_active(&self) -> Result<Vec<Ticket>> {
        let state = self.state.read();
        let mut tickets: Vec<Ticket> = state
            .tickets
            .values()
            .filter(|t| t.status.is_active())
            .cloned()
            .collect();
        tickets.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(tickets)
    }

    async fn update_ticket_status(&self, id: Uuid, status: TicketStatus) -> Result<()> {
        let mut state = self.state.write();
        state.ticket_mut(id)?.status = status;
        Ok(())
    }

    async fn transition_ticket_status(
        &self,
        id: Uuid,
        from: &[TicketStatus],
        to: TicketStatus,
    ) -> Result<bool> {
        let mut state = self.state.write();
        let ticket = state.ticket_mut(id)?;
        if !from.contains(&ticket.status) {
            return Ok(false);
        }
        ticket.status = to;
        Ok(true)
    }

    async fn store_ticket_stats(&self, store_id: Uuid) -> Result<StoreTicketStats> {
        let state = self.state.read();
        let mut stats = StoreTicketStats {
            store_id,
            ..Default::default()
        };
        for ticket in state.tickets.values().filter(|t| t.store_id == store_id) {
            *stats.by_status.entry(ticket.status).or_insert(0) += 1;
        }
        Ok(stats)
    }
}

#[async_trait]
impl TicketHistoryRepository for InMemoryStore {
    async fn completion_stats(&self, provider_id: Uuid, since: DateTime<Utc>) -> Result<CompletionStats> {
        let state = self.state.read();
        let mut stats = CompletionStats::default();
        for ticket in state.tickets.values() {
            if ticket.assigned_provider_id != Some(provider_id)
                || ticket.status != TicketStatus::Completed
            {
                continue;
            }
            if let Some(completed_at) = ticket.completed_at {
                if completed_at >= since {
                    stats.completed += 1;
                    if completed_at <= ticket.sla_deadline {
                        stats.within_sla += 1;
                    }
                }
            }
        }
        Ok(stats)
    }
}

#[async_trait]
impl AssignmentRepository for InMemoryStore {
    async fn create_assignment(&self, assignment: &TicketAssignment) -> Result<()> {
        self.state
            .write()
            .assignments
            .insert(assignment.id, assignment.clone());
        Ok(())
    }

    async fn find_latest_for_ticket(&self, ticket_id: Uuid) -> Result<Option<TicketAssignment>> {
        let state = self.state.read();
        Ok(state
            .assignments
            .values()
            .filter(|a| a.ticket_id == ticket_id)
            .max_by_key(|a| a.sequence)
            .cloned())
    }

    async fn list_assignments_for_ticket(&self, ticket_id: Uuid) -> Result<Vec<TicketAssignment>> {
        let state = self.state.read();
        let mut assignments: Vec<TicketAssignment> = state
            .assignments
            .values()
            .filter(|a| a.ticket_id == ticket_id)
            .cloned()
            .collect();
        assignments.sort_by_key(|a| a.sequence);
        Ok(assignments)
    }

    async fn update_assignment_status(
        &self,
        id: Uuid,
        status: AssignmentStatus,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let mut state = self.state.write();
        let assignment = state
            .assignments
            .get_mut(&id)
            .ok_or_else(|| TicketEngineError::not_found(format!("assignment {}", id)))?;
        assignment.status = status;
        assignment.responded_at = Some(at);
        Ok(())
    }

    async fn commit_assignment(&self, commit: &AssignmentCommit) -> Result<CommitOutcome> {
        let assignment = &commit.assignment;
        let mut state = self.state.write();

        // Validate everything before the first write
        let routable = state
            .tickets
            .get(&assignment.ticket_id)
            .map(|t| t.status.is_routable())
            .ok_or_else(|| {
                TicketEngineError::not_found(format!("ticket {}", assignment.ticket_id))
            })?;
        if !routable {
            return Ok(CommitOutcome::TicketNotRoutable);
        }
        if !state.provider_mut(assignment.provider_id)?.has_capacity() {
            return Ok(CommitOutcome::ProviderAtCapacity);
        }

        state.provider_mut(assignment.provider_id)?.current_load += 1;

        let ticket = state.ticket_mut(assignment.ticket_id)?;
        ticket.status = TicketStatus::Assigned;
        ticket.assigned_at = Some(assignment.created_at);
        ticket.assigned_provider_id = Some(assignment.provider_id);

        state.assignments.insert(assignment.id, assignment.clone());
        Ok(CommitOutcome::Committed)
    }

    async fn commit_rejection(&self, rejection: &RejectionCommit) -> Result<()> {
        let mut state = self.state.write();

        let live = state
            .assignments
            .get(&rejection.assignment_id)
            .map(|a| a.is_live() && a.provider_id == rejection.provider_id)
            .unwrap_or(false);
        let assigned = state
            .tickets
            .get(&rejection.ticket_id)
            .map(|t| {
                t.status == TicketStatus::Assigned
                    && t.assigned_provider_id == Some(rejection.provider_id)
            })
            .unwrap_or(false);
        if !live || !assigned {
            return Err(TicketEngineError::invalid_transition(format!(
                "ticket {} is not held by provider {}",
                rejection.ticket_id, rejection.provider_id
            )));
        }
        state.provider_mut(rejection.provider_id)?;

        if let Some(assignment) = state.assignments.get_mut(&rejection.assignment_id) {
            assignment.status = AssignmentStatus::Rejected;
            assignment.rejection_reason = Some(rejection.reason.clone());
            assignment.responded_at = Some(rejection.rejected_at);
        }

        let ticket = state.ticket_mut(rejection.ticket_id)?;
        ticket.status = TicketStatus::RejectedByTech;
        ticket.assigned_provider_id = None;
        ticket.assigned_at = None;

        let provider = state.provider_mut(rejection.provider_id)?;
        provider.current_load = provider.current_load.saturating_sub(1);
        Ok(())
    }

    async fn commit_acceptance(&self, acceptance: &AcceptanceCommit) -> Result<bool> {
        let mut state = self.state.write();

        let ticket = state.ticket_mut(acceptance.ticket_id)?;
        let held = matches!(ticket.status, TicketStatus::Assigned | TicketStatus::Escalated)
            && ticket.assigned_provider_id == Some(acceptance.provider_id)
            && ticket.accepted_at.is_none();
        if !held {
            return Ok(false);
        }
        ticket.status = TicketStatus::InProgress;
        ticket.accepted_at = Some(acceptance.accepted_at);

        for assignment in state.assignments.values_mut().filter(|a| {
            a.ticket_id == acceptance.ticket_id
                && a.provider_id == acceptance.provider_id
                && a.status == AssignmentStatus::Proposed
        }) {
            assignment.status = AssignmentStatus::Accepted;
            assignment.responded_at = Some(acceptance.accepted_at);
        }
        Ok(true)
    }

    async fn commit_completion(&self, completion: &CompletionCommit) -> Result<bool> {
        let mut state = self.state.write();

        let ticket = state.ticket_mut(completion.ticket_id)?;
        if !matches!(ticket.status, TicketStatus::InProgress | TicketStatus::Escalated) {
            return Ok(false);
        }
        ticket.status = TicketStatus::Completed;
        ticket.completed_at = Some(completion.completed_at);
        let provider_id = ticket.assigned_provider_id;

        if let Some(provider_id) = provider_id {
            if let Some(provider) = state.providers.get_mut(&provider_id) {
                provider.current_load = provider.current_load.saturating_sub(1);
            }
        }
        Ok(true)
    }
}

#[async_trait]
impl EscalationRepository for InMemoryStore {
    async fn find_open(&self, ticket_id: Uuid, trigger_event: &str) -> Result<Option<Escalation>> {
        let state = self.state.read();
        Ok(state
            .escalations
            .values()
            .find(|e| e.ticket_id == ticket_id && e.trigger_event == trigger_event && e.status.is_open())
            .cloned())
    }

    async fn create_escalation(&self, escalation: &Escalation) -> Result<EscalationInsert> {
        let mut state = self.state.write();
        let existing = state.escalations.values().find(|e| {
            e.ticket_id == escalation.ticket_id
                && e.trigger_event == escalation.trigger_event
                && e.status.is_open()
        });
        if let Some(existing) = existing {
            return Ok(EscalationInsert::Duplicate(existing.id));
        }
        state.escalations.insert(escalation.id, escalation.clone());
        Ok(EscalationInsert::Created(escalation.clone()))
    }

    async fn find_escalation(&self, id: Uuid) -> Result<Option<Escalation>> {
        Ok(self.state.read().escalations.get(&id).cloned())
    }

    async fn list_escalations_for_ticket(&self, ticket_id: Uuid) -> Result<Vec<Escalation>> {
        let state = self.state.read();
        let mut escalations: Vec<Escalation> = state
            .escalations
            .values()
            .filter(|e| e.ticket_id == ticket_id)
            .cloned()
            .collect();
        escalations.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(escalations)
    }

    async fn list_open(&self) -> Result<Vec<Escalation>> {
        let state = self.state.read();
        let mut escalations: Vec<Escalation> = state
            .escalations
            .values()
            .filter(|e| e.status.is_open())
            .cloned()
            .collect();
        escalations.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(escalations)
    }

    async fn update_escalation_status(
        &self,
        id: Uuid,
        status: EscalationStatus,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let mut state = self.state.write();
        let escalation = state
            .escalations
            .get_mut(&id)
            .ok_or_else(|| TicketEngineError::not_found(format!("escalation {}", id)))?;
        escalation.status = status;
        if status == EscalationStatus::Resolved {
            escalation.resolved_at = Some(at);
        }
        Ok(())
    }
}

#[async_trait]
impl StoreRepository for InMemoryStore {
    async fn find_store(&self, id: Uuid) -> Result<Option<Store>> {
        Ok(self.state.read().stores.get(&id).cloned())
    }

    async fn save_store(&self, store: &Store) -> Result<()> {
        self.state.write().stores.insert(store.id, store.clone());
        Ok(())
    }
}
