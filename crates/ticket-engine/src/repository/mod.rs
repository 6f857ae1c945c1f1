//! # Repository Contracts
//!
//! The engine reads and writes through the traits in this module and never
//! talks to a database directly. Two backends ship with the crate:
//!
//! - [`InMemoryStore`]: lock-protected maps, used by tests and embedders
//! - [`crate::database::SqliteStore`]: sqlx on SQLite
//!
//! Both implement every trait, so [`Repositories::from_backend`] can wire a
//! single backend into all the services. Individual traits can still be
//! swapped out, which is how tests inject failures:
//!
//! ```
//! use std::sync::Arc;
//! use fixdesk_ticket_engine::repository::{InMemoryStore, Repositories};
//!
//! let store = Arc::new(InMemoryStore::new());
//! let repos = Repositories::from_backend(store.clone());
//! ```
//!
//! ## Atomic writes
//!
//! The `commit_*` methods of [`AssignmentRepository`] each apply several
//! writes as one unit, guarded on the ticket status found inside the unit.
//! Implementations must re-check the provider's capacity inside
//! `commit_assignment` so that two concurrent routings can never push a
//! provider past `capacity_per_day`, and `commit_completion` must release
//! load at most once per ticket.
//!
//! Status changes made from a possibly stale snapshot go through
//! [`TicketRepository::transition_ticket_status`], which never overwrites a
//! status the caller did not expect.
//!
//! ## Escalation uniqueness
//!
//! At most one open (TRIGGERED or ACKNOWLEDGED) escalation may exist per
//! ticket and trigger text. [`EscalationRepository::create_escalation`] must
//! enforce this itself and report [`EscalationInsert::Duplicate`] rather
//! than relying on callers having checked first.

pub mod memory;

pub use memory::InMemoryStore;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::types::{
    AssignmentStatus, CompletionStats, Escalation, EscalationStatus, ServiceProvider, Store,
    StoreTicketStats, Ticket, TicketAssignment, TicketStatus,
};

/// Result of an atomic assignment commit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// Assignment, ticket and provider load were all written
    Committed,
    /// Provider reached capacity before the commit; nothing was written
    ProviderAtCapacity,
    /// Ticket was no longer OPEN or REJECTED_BY_TECH; nothing was written
    TicketNotRoutable,
}

/// Writes applied together when a ticket is assigned
#[derive(Debug, Clone, PartialEq)]
pub struct AssignmentCommit {
    /// New PROPOSED assignment; its `created_at` becomes the ticket's `assigned_at`
    pub assignment: TicketAssignment,
}

/// Writes applied together when a provider takes on a ticket
#[derive(Debug, Clone, PartialEq)]
pub struct AcceptanceCommit {
    pub ticket_id: Uuid,
    pub provider_id: Uuid,
    pub accepted_at: DateTime<Utc>,
}

/// Writes applied together when work on a ticket is finished
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionCommit {
    pub ticket_id: Uuid,
    pub completed_at: DateTime<Utc>,
}

/// Writes applied together when a provider turns a ticket down
#[derive(Debug, Clone, PartialEq)]
pub struct RejectionCommit {
    pub ticket_id: Uuid,
    pub assignment_id: Uuid,
    pub provider_id: Uuid,
    pub reason: String,
    pub rejected_at: DateTime<Utc>,
}

/// Result of inserting an escalation
#[derive(Debug, Clone, PartialEq)]
pub enum EscalationInsert {
    Created(Escalation),
    /// An open escalation with the same ticket and trigger already exists
    Duplicate(Uuid),
}

/// Service provider storage
#[async_trait]
pub trait ProviderRepository: Send + Sync {
    /// Approved providers with an active user and `current_load < capacity_per_day`
    async fn find_approved_with_capacity(&self) -> Result<Vec<ServiceProvider>>;
    async fn find_provider(&self, id: Uuid) -> Result<Option<ServiceProvider>>;
    async fn save_provider(&self, provider: &ServiceProvider) -> Result<()>;
    /// Fails with `AssignmentConflict` when the increment would exceed capacity
    async fn increment_load(&self, id: Uuid, delta: u32) -> Result<()>;
    /// Never drops below zero
    async fn decrement_load(&self, id: Uuid, delta: u32) -> Result<()>;
}

/// Ticket storage
#[async_trait]
pub trait TicketRepository: Send + Sync {
    async fn create_ticket(&self, ticket: &Ticket) -> Result<()>;
    async fn find_ticket(&self, id: Uuid) -> Result<Option<Ticket>>;
    /// Tickets in OPEN, ASSIGNED or IN_PROGRESS
    async fn find_active(&self) -> Result<Vec<Ticket>>;
    async fn update_ticket_status(&self, id: Uuid, status: TicketStatus) -> Result<()>;
    /// Set `to` only while the stored status is one of `from`.
    ///
    /// Returns whether the write applied; a missing ticket is `NotFound`.
    async fn transition_ticket_status(
        &self,
        id: Uuid,
        from: &[TicketStatus],
        to: TicketStatus,
    ) -> Result<bool>;
    async fn store_ticket_stats(&self, store_id: Uuid) -> Result<StoreTicketStats>;
}

/// Completed-ticket history used for the performance factor
#[async_trait]
pub trait TicketHistoryRepository: Send + Sync {
    /// Tickets assigned to `provider_id` and completed at or after `since`
    async fn completion_stats(&self, provider_id: Uuid, since: DateTime<Utc>) -> Result<CompletionStats>;
}

/// Assignment storage
#[async_trait]
pub trait AssignmentRepository: Send + Sync {
    async fn create_assignment(&self, assignment: &TicketAssignment) -> Result<()>;
    /// Highest sequence for the ticket
    async fn find_latest_for_ticket(&self, ticket_id: Uuid) -> Result<Option<TicketAssignment>>;
    /// Ordered by sequence
    async fn list_assignments_for_ticket(&self, ticket_id: Uuid) -> Result<Vec<TicketAssignment>>;
    async fn update_assignment_status(
        &self,
        id: Uuid,
        status: AssignmentStatus,
        at: DateTime<Utc>,
    ) -> Result<()>;
    /// Insert the assignment, mark the ticket ASSIGNED and take one unit of
    /// provider load, all or nothing
    async fn commit_assignment(&self, commit: &AssignmentCommit) -> Result<CommitOutcome>;
    /// Mark the assignment REJECTED, the ticket REJECTED_BY_TECH and release
    /// one unit of provider load, all or nothing
    async fn commit_rejection(&self, rejection: &RejectionCommit) -> Result<()>;
    /// Move the ticket to IN_PROGRESS and its PROPOSED assignment to
    /// ACCEPTED. Applies only while the provider holds a not yet accepted
    /// ticket that is ASSIGNED or ESCALATED; returns whether it applied.
    async fn commit_acceptance(&self, acceptance: &AcceptanceCommit) -> Result<bool>;
    /// Move an IN_PROGRESS or ESCALATED ticket to COMPLETED and release one
    /// unit of its provider's load, all or nothing; returns whether it applied
    async fn commit_completion(&self, completion: &CompletionCommit) -> Result<bool>;
}

/// Escalation storage
#[async_trait]
pub trait EscalationRepository: Send + Sync {
    /// Open escalation for the ticket and trigger text
    async fn find_open(&self, ticket_id: Uuid, trigger_event: &str) -> Result<Option<Escalation>>;
    async fn create_escalation(&self, escalation: &Escalation) -> Result<EscalationInsert>;
    async fn find_escalation(&self, id: Uuid) -> Result<Option<Escalation>>;
    /// Ordered by creation time
    async fn list_escalations_for_ticket(&self, ticket_id: Uuid) -> Result<Vec<Escalation>>;
    async fn list_open(&self) -> Result<Vec<Escalation>>;
    async fn update_escalation_status(
        &self,
        id: Uuid,
        status: EscalationStatus,
        at: DateTime<Utc>,
    ) -> Result<()>;
}

/// Store directory
#[async_trait]
pub trait StoreRepository: Send + Sync {
    async fn find_store(&self, id: Uuid) -> Result<Option<Store>>;
    async fn save_store(&self, store: &Store) -> Result<()>;
}

/// Every repository the engine needs
#[derive(Clone)]
pub struct Repositories {
    pub providers: Arc<dyn ProviderRepository>,
    pub tickets: Arc<dyn TicketRepository>,
    pub history: Arc<dyn TicketHistoryRepository>,
    pub assignments: Arc<dyn AssignmentRepository>,
    pub escalations: Arc<dyn EscalationRepository>,
    pub stores: Arc<dyn StoreRepository>,
}

impl Repositories {
    /// Use one backend for every repository
    pub fn from_backend<B>(backend: Arc<B>) -> Self
    where
        B: ProviderRepository
            + TicketRepository
            + TicketHistoryRepository
            + AssignmentRepository
            + EscalationRepository
            + StoreRepository
            + 'static,
    {
        Self {
            providers: backend.clone(),
            tickets: backend.clone(),
            history: backend.clone(),
            assignments: backend.clone(),
            escalations: backend.clone(),
            stores: backend,
        }
    }
}
