//! # Ticket Routing
//!
//! [`RoutingOrchestrator`] drives a reported issue from intake to a proposed
//! assignment:
//!
//! ```text
//! NewTicketRequest
//!       │ validate, look up store
//!       ▼
//!   classify ──(failure)──► fallback General/Maintenance/MEDIUM
//!       │
//!       ▼
//!  persist ticket (OPEN, SLA deadline fixed)
//!       │
//!       ▼
//!  find candidates ──(none)──► NoCandidates, ticket stays OPEN
//!       │
//!       ▼
//!  score, pick best ──► commit assignment + ticket + provider load
//!       │                   │
//!       │             (provider full) exclude it and select again
//!       ▼
//!    Assigned
//! ```
//!
//! Running out of providers is a normal result, not an error. The escalation
//! sweep picks such tickets up through the assignment timeout.
//!
//! ## Re-routing
//!
//! [`RoutingOrchestrator::handle_rejection`] records a provider's refusal and
//! immediately calls [`RoutingOrchestrator::reroute`], which selects again
//! with every provider that already turned the ticket down excluded.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::availability::{AvailabilityFinder, ScoredProvider};
use crate::classification::{classify_or_fallback, Classifier};
use crate::clock::Clock;
use crate::config::{RoutingConfig, TicketEngineConfig};
use crate::error::{Result, TicketEngineError};
use crate::repository::{AssignmentCommit, CommitOutcome, RejectionCommit, Repositories};
use crate::scoring::{ProviderScore, ProviderScorer, TicketContext};
use crate::skills::SkillTable;
use crate::sla::SlaPolicy;
use crate::types::{
    AssignmentStatus, GeoPoint, NewTicketRequest, Priority, Ticket, TicketAssignment,
    TicketStatus,
};

/// Terminal state of one routing attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoutingStage {
    Assigned,
    /// Nobody qualified had capacity; the ticket is left unassigned
    NoCandidates,
}

/// The provider chosen by a routing attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignmentDecision {
    pub assignment_id: Uuid,
    pub provider_id: Uuid,
    pub total_score: f64,
    pub explanation: String,
    pub sequence: u32,
}

/// Result of routing a ticket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingOutcome {
    pub ticket_id: Uuid,
    pub priority: Priority,
    pub category: String,
    pub subcategory: String,
    /// Classifier confidence; `None` for re-routes, which reuse the stored
    /// classification
    pub classification_confidence: Option<f64>,
    pub used_fallback_classification: bool,
    pub stage: RoutingStage,
    pub assignment: Option<AssignmentDecision>,
    /// Candidates returned by the availability step on the first attempt
    pub candidates_considered: usize,
}

impl RoutingOutcome {
    pub fn assigned_provider_id(&self) -> Option<Uuid> {
        self.assignment.as_ref().map(|a| a.provider_id)
    }

    pub fn is_assigned(&self) -> bool {
        self.stage == RoutingStage::Assigned
    }
}

struct RouteResult {
    stage: RoutingStage,
    assignment: Option<AssignmentDecision>,
    candidates_considered: usize,
}

/// End-to-end ticket routing
pub struct RoutingOrchestrator {
    repos: Repositories,
    classifier: Arc<dyn Classifier>,
    finder: AvailabilityFinder,
    scorer: ProviderScorer,
    sla: SlaPolicy,
    skills: SkillTable,
    clock: Arc<dyn Clock>,
    config: RoutingConfig,
}

impl RoutingOrchestrator {
    pub fn new(
        repos: Repositories,
        classifier: Arc<dyn Classifier>,
        config: &TicketEngineConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let skills = SkillTable::default();
        Self {
            finder: AvailabilityFinder::new(repos.providers.clone())
                .with_band(config.routing.availability_band),
            scorer: ProviderScorer::new(repos.history.clone(), skills.clone(), config.scoring.clone()),
            sla: SlaPolicy::from_config(&config.sla),
            skills,
            config: config.routing.clone(),
            repos,
            classifier,
            clock,
        }
    }

    /// Replace the category to skill table used for filtering and scoring
    pub fn with_skill_table(mut self, skills: SkillTable) -> Self {
        self.scorer = ProviderScorer::new(
            self.repos.history.clone(),
            skills.clone(),
            self.scorer.config().clone(),
        );
        self.skills = skills;
        self
    }

    pub fn sla_policy(&self) -> &SlaPolicy {
        &self.sla
    }

    /// Create a ticket from an issue report and try to assign it.
    ///
    /// Invalid input and unusable store coordinates fail before anything is
    /// written. Classification problems never fail the call.
    pub async fn process_new_ticket(&self, request: NewTicketRequest) -> Result<RoutingOutcome> {
        request.validate().map_err(TicketEngineError::invalid_input)?;
        let store_location = self.store_location(request.store_id).await?;

        let (classification, used_fallback) =
            classify_or_fallback(self.classifier.as_ref(), &request.description).await;
        debug!(
            "🏷️ Classified as {}/{} ({}, confidence {:.2})",
            classification.category,
            classification.subcategory,
            classification.priority,
            classification.confidence
        );

        let now = self.clock.now();
        let ticket = Ticket {
            id: Uuid::new_v4(),
            description: request.description.trim().to_string(),
            location_in_store: request.location_in_store.trim().to_string(),
            asset_tag: request.asset_tag,
            category: classification.category.clone(),
            subcategory: classification.subcategory.clone(),
            priority: classification.priority,
            status: TicketStatus::Open,
            store_id: request.store_id,
            reporter_id: request.reporter_id,
            assigned_provider_id: None,
            created_at: now,
            assigned_at: None,
            accepted_at: None,
            completed_at: None,
            sla_deadline: self.sla.deadline_for(classification.priority, now),
        };
        self.repos.tickets.create_ticket(&ticket).await?;
        info!(
            "🎫 Ticket {} created ({} priority, due {})",
            ticket.id, ticket.priority, ticket.sla_deadline
        );

        let route = self.route(&ticket, &store_location, 1, HashSet::new()).await?;

        Ok(RoutingOutcome {
            ticket_id: ticket.id,
            priority: ticket.priority,
            category: ticket.category,
            subcategory: ticket.subcategory,
            classification_confidence: Some(classification.confidence),
            used_fallback_classification: used_fallback,
            stage: route.stage,
            assignment: route.assignment,
            candidates_considered: route.candidates_considered,
        })
    }

    /// Route an OPEN or REJECTED_BY_TECH ticket again.
    ///
    /// Providers that rejected the ticket before are skipped. A rejected
    /// ticket that finds nobody goes back to OPEN.
    pub async fn reroute(&self, ticket_id: Uuid) -> Result<RoutingOutcome> {
        let ticket = self.load_ticket(ticket_id).await?;
        if !ticket.status.is_routable() {
            return Err(TicketEngineError::invalid_transition(format!(
                "ticket {} is {} and cannot be routed",
                ticket.id, ticket.status
            )));
        }
        let store_location = self.store_location(ticket.store_id).await?;

        let excluded: HashSet<Uuid> = self
            .repos
            .assignments
            .list_assignments_for_ticket(ticket_id)
            .await?
            .into_iter()
            .filter(|a| a.status == AssignmentStatus::Rejected)
            .map(|a| a.provider_id)
            .collect();
        let sequence = self
            .repos
            .assignments
            .find_latest_for_ticket(ticket_id)
            .await?
            .map_or(1, |latest| latest.sequence + 1);

        info!(
            "🔄 Re-routing ticket {} (sequence {}, {} providers excluded)",
            ticket_id,
            sequence,
            excluded.len()
        );
        let route = self.route(&ticket, &store_location, sequence, excluded).await?;

        if route.stage == RoutingStage::NoCandidates && ticket.status == TicketStatus::RejectedByTech {
            let reopened = self
                .repos
                .tickets
                .transition_ticket_status(ticket_id, &[TicketStatus::RejectedByTech], TicketStatus::Open)
                .await?;
            if reopened {
                info!("Ticket {} returned to OPEN for later routing", ticket_id);
            }
        }

        Ok(RoutingOutcome {
            ticket_id,
            priority: ticket.priority,
            category: ticket.category,
            subcategory: ticket.subcategory,
            classification_confidence: None,
            used_fallback_classification: false,
            stage: route.stage,
            assignment: route.assignment,
            candidates_considered: route.candidates_considered,
        })
    }

    /// Record that `provider_id` turned the ticket down, then re-route it
    pub async fn handle_rejection(
        &self,
        ticket_id: Uuid,
        provider_id: Uuid,
        reason: &str,
    ) -> Result<RoutingOutcome> {
        let reason = reason.trim();
        let length = reason.chars().count();
        if !(5..=200).contains(&length) {
            return Err(TicketEngineError::invalid_input(format!(
                "rejection reason must be 5-200 characters, got {}",
                length
            )));
        }

        let ticket = self.load_ticket(ticket_id).await?;
        if ticket.status != TicketStatus::Assigned || ticket.assigned_provider_id != Some(provider_id) {
            return Err(TicketEngineError::invalid_transition(format!(
                "ticket {} is {} and not assigned to provider {}",
                ticket_id, ticket.status, provider_id
            )));
        }

        let latest = self
            .repos
            .assignments
            .find_latest_for_ticket(ticket_id)
            .await?
            .filter(|a| a.provider_id == provider_id && a.is_live())
            .ok_or_else(|| {
                TicketEngineError::invalid_transition(format!(
                    "ticket {} has no open assignment for provider {}",
                    ticket_id, provider_id
                ))
            })?;

        self.repos
            .assignments
            .commit_rejection(&RejectionCommit {
                ticket_id,
                assignment_id: latest.id,
                provider_id,
                reason: reason.to_string(),
                rejected_at: self.clock.now(),
            })
            .await?;
        warn!(
            "🚫 Provider {} rejected ticket {} (sequence {})",
            provider_id, ticket_id, latest.sequence
        );

        self.reroute(ticket_id).await
    }

    /// Every assignment of the ticket, oldest first
    pub async fn assignment_history(&self, ticket_id: Uuid) -> Result<Vec<TicketAssignment>> {
        self.repos
            .assignments
            .list_assignments_for_ticket(ticket_id)
            .await
    }

    async fn load_ticket(&self, ticket_id: Uuid) -> Result<Ticket> {
        self.repos
            .tickets
            .find_ticket(ticket_id)
            .await?
            .ok_or_else(|| TicketEngineError::not_found(format!("ticket {}", ticket_id)))
    }

    async fn store_location(&self, store_id: Uuid) -> Result<GeoPoint> {
        let store = self
            .repos
            .stores
            .find_store(store_id)
            .await?
            .ok_or_else(|| TicketEngineError::not_found(format!("store {}", store_id)))?;
        if !store.location.is_finite() {
            return Err(TicketEngineError::invalid_location(format!(
                "store {} has no usable coordinates",
                store_id
            )));
        }
        Ok(store.location)
    }

    /// Select and commit, retrying with the full provider excluded whenever
    /// the capacity re-check fails
    async fn route(
        &self,
        ticket: &Ticket,
        store_location: &GeoPoint,
        sequence: u32,
        mut excluded: HashSet<Uuid>,
    ) -> Result<RouteResult> {
        let required = self.skills.required_skills_for(&ticket.category, &ticket.subcategory);
        let context = TicketContext::new(ticket.priority, &ticket.category, &ticket.subcategory);
        let mut candidates_considered = None;

        for attempt in 0..=self.config.max_conflict_retries {
            let candidates: Vec<ScoredProvider> = self
                .finder
                .find_available(&required, store_location)
                .await?
                .into_iter()
                .filter(|c| !excluded.contains(&c.provider.id))
                .collect();
            let considered = *candidates_considered.get_or_insert(candidates.len());

            let now = self.clock.now();
            let Some(best) = self.select_best(&candidates, &context, now).await else {
                info!("📭 No available provider for ticket {}, leaving it unassigned", ticket.id);
                return Ok(RouteResult {
                    stage: RoutingStage::NoCandidates,
                    assignment: None,
                    candidates_considered: considered,
                });
            };

            let assignment = TicketAssignment::proposed(
                ticket.id,
                best.provider_id,
                sequence,
                best.total_score,
                best.explanation.clone(),
                now,
            );
            let assignment_id = assignment.id;

            match self
                .repos
                .assignments
                .commit_assignment(&AssignmentCommit { assignment })
                .await?
            {
                CommitOutcome::Committed => {
                    info!(
                        "✅ Ticket {} assigned to provider {} with score {:.3}",
                        ticket.id, best.provider_id, best.total_score
                    );
                    return Ok(RouteResult {
                        stage: RoutingStage::Assigned,
                        assignment: Some(AssignmentDecision {
                            assignment_id,
                            provider_id: best.provider_id,
                            total_score: best.total_score,
                            explanation: best.explanation,
                            sequence,
                        }),
                        candidates_considered: considered,
                    });
                }
                CommitOutcome::ProviderAtCapacity => {
                    warn!(
                        "⚠️ Provider {} filled up while routing ticket {} (attempt {}), selecting again",
                        best.provider_id,
                        ticket.id,
                        attempt + 1
                    );
                    excluded.insert(best.provider_id);
                }
                CommitOutcome::TicketNotRoutable => {
                    return Err(TicketEngineError::invalid_transition(format!(
                        "ticket {} changed state while being routed",
                        ticket.id
                    )));
                }
            }
        }

        warn!(
            "⚠️ Gave up routing ticket {} after {} capacity conflicts",
            ticket.id,
            self.config.max_conflict_retries + 1
        );
        Ok(RouteResult {
            stage: RoutingStage::NoCandidates,
            assignment: None,
            candidates_considered: candidates_considered.unwrap_or(0),
        })
    }

    /// Highest score wins; on a tie the earlier candidate is kept
    async fn select_best(
        &self,
        candidates: &[ScoredProvider],
        context: &TicketContext,
        now: DateTime<Utc>,
    ) -> Option<ProviderScore> {
        let mut best: Option<ProviderScore> = None;
        for candidate in candidates {
            let score = self.scorer.score(candidate, context, now).await;
            if best
                .as_ref()
                .map_or(true, |current| score.total_score > current.total_score)
            {
                best = Some(score);
            }
        }
        best
    }
}
