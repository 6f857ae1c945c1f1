//! Provider-side ticket transitions
//!
//! Accepting a ticket starts the resolution clock; completing it releases the
//! unit of provider load taken when the ticket was assigned.

use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::{Result, TicketEngineError};
use crate::repository::{AcceptanceCommit, CompletionCommit, Repositories};
use crate::types::Ticket;

/// Accept and complete handlers
pub struct TicketLifecycle {
    repos: Repositories,
    clock: Arc<dyn Clock>,
}

impl TicketLifecycle {
    pub fn new(repos: Repositories, clock: Arc<dyn Clock>) -> Self {
        Self { repos, clock }
    }

    /// ASSIGNED to IN_PROGRESS for the provider holding the ticket.
    ///
    /// A ticket escalated before anyone accepted it can still be accepted by
    /// the provider it is assigned to.
    pub async fn accept(&self, ticket_id: Uuid, provider_id: Uuid) -> Result<Ticket> {
        let applied = self
            .repos
            .assignments
            .commit_acceptance(&AcceptanceCommit {
                ticket_id,
                provider_id,
                accepted_at: self.clock.now(),
            })
            .await?;

        if !applied {
            let ticket = self.load_ticket(ticket_id).await?;
            return Err(TicketEngineError::invalid_transition(format!(
                "ticket {} is {} and cannot be accepted by provider {}",
                ticket_id, ticket.status, provider_id
            )));
        }

        info!("👷 Provider {} accepted ticket {}", provider_id, ticket_id);
        self.load_ticket(ticket_id).await
    }

    /// IN_PROGRESS or ESCALATED to COMPLETED, releasing provider load
    pub async fn complete(&self, ticket_id: Uuid) -> Result<Ticket> {
        let applied = self
            .repos
            .assignments
            .commit_completion(&CompletionCommit {
                ticket_id,
                completed_at: self.clock.now(),
            })
            .await?;

        let ticket = self.load_ticket(ticket_id).await?;
        if !applied {
            return Err(TicketEngineError::invalid_transition(format!(
                "ticket {} is {} and cannot be completed",
                ticket_id, ticket.status
            )));
        }

        match ticket.assigned_provider_id {
            Some(provider_id) => {
                info!("🏁 Ticket {} completed by provider {}", ticket_id, provider_id)
            }
            None => warn!("Ticket {} completed without an assigned provider", ticket_id),
        }
        Ok(ticket)
    }

    async fn load_ticket(&self, ticket_id: Uuid) -> Result<Ticket> {
        self.repos
            .tickets
            .find_ticket(ticket_id)
            .await?
            .ok_or_else(|| TicketEngineError::not_found(format!("ticket {}", ticket_id)))
    }
}
