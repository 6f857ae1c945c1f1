//! End-to-end routing tests against the in-memory backend
//!
//! Covers intake, provider selection, capacity limits, rejection chains and
//! concurrent routing into a provider with little capacity left.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use fixdesk_ticket_engine::prelude::*;
use fixdesk_ticket_engine::lifecycle::TicketLifecycle;

/// Store in lower Manhattan
const STORE_LAT: f64 = 40.7128;
const STORE_LON: f64 = -74.0060;

/// Always returns the same classification
struct FixedClassifier(Classification);

#[async_trait]
impl Classifier for FixedClassifier {
    async fn classify(&self, _description: &str) -> Result<Classification> {
        Ok(self.0.clone())
    }
}

fn cold_storage(priority: Priority) -> Arc<dyn Classifier> {
    Arc::new(FixedClassifier(Classification::new(
        "Facilities",
        "Cold Storage",
        priority,
        0.9,
        "freezer",
    )))
}

struct Harness {
    backend: Arc<InMemoryStore>,
    shop: Store,
    orchestrator: Arc<RoutingOrchestrator>,
    lifecycle: TicketLifecycle,
}

async fn harness(classifier: Arc<dyn Classifier>) -> Harness {
    let backend = Arc::new(InMemoryStore::new());
    let shop = Store::new("Downtown", STORE_LAT, STORE_LON).with_moderator(Uuid::new_v4());
    backend.save_store(&shop).await.unwrap();

    let repos = Repositories::from_backend(backend.clone());
    let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(Utc::now()));
    let orchestrator = Arc::new(RoutingOrchestrator::new(
        repos.clone(),
        classifier,
        &TicketEngineConfig::default(),
        clock.clone(),
    ));
    let lifecycle = TicketLifecycle::new(repos, clock);

    Harness {
        backend,
        shop,
        orchestrator,
        lifecycle,
    }
}

impl Harness {
    async fn provider(&self, name: &str, lat: f64, lon: f64, capacity: u32) -> ServiceProvider {
        let provider = ServiceProvider::new(name, vec!["Refrigeration".into()], capacity)
            .with_location(lat, lon);
        self.backend.save_provider(&provider).await.unwrap();
        provider
    }

    fn request(&self) -> NewTicketRequest {
        NewTicketRequest::new(
            "Walk-in freezer is not holding temperature",
            "Back room",
            self.shop.id,
            Uuid::new_v4(),
        )
    }

    async fn load_of(&self, provider: &ServiceProvider) -> u32 {
        self.backend
            .find_provider(provider.id)
            .await
            .unwrap()
            .unwrap()
            .current_load
    }
}

#[tokio::test]
async fn test_nearest_equally_available_provider_wins() {
    let h = harness(cold_storage(Priority::Medium)).await;
    let far = h.provider("Far Cooling", 41.05, STORE_LON, 10).await;
    let near = h.provider("Near Cooling", 40.7580, -73.9855, 10).await;

    let outcome = h.orchestrator.process_new_ticket(h.request()).await.unwrap();

    assert_eq!(outcome.stage, RoutingStage::Assigned);
    assert_eq!(outcome.candidates_considered, 2);
    assert_eq!(outcome.assigned_provider_id(), Some(near.id));
    assert_eq!(outcome.classification_confidence, Some(0.9));
    assert!(!outcome.used_fallback_classification);

    let decision = outcome.assignment.unwrap();
    assert!(decision.explanation.starts_with("Provider Near Cooling scored"));
    assert!(decision.explanation.ends_with("Priority: MEDIUM"));

    let ticket = h.backend.find_ticket(outcome.ticket_id).await.unwrap().unwrap();
    assert_eq!(ticket.status, TicketStatus::Assigned);
    assert_eq!(ticket.assigned_provider_id, Some(near.id));
    assert!(ticket.assigned_at.is_some());
    assert_eq!(h.load_of(&near).await, 1);
    assert_eq!(h.load_of(&far).await, 0);
}

#[tokio::test]
async fn test_unqualified_and_unapproved_providers_are_skipped() {
    let h = harness(cold_storage(Priority::Medium)).await;

    let plumber = ServiceProvider::new("Pipes R Us", vec!["Plumbing".into()], 10)
        .with_location(STORE_LAT, STORE_LON);
    h.backend.save_provider(&plumber).await.unwrap();

    let mut pending = ServiceProvider::new("New Chill", vec!["Refrigeration".into()], 10)
        .with_location(STORE_LAT, STORE_LON);
    pending.approval_status = ApprovalStatus::Pending;
    h.backend.save_provider(&pending).await.unwrap();

    let full = ServiceProvider::new("Busy Chill", vec!["Refrigeration".into()], 2)
        .with_location(STORE_LAT, STORE_LON)
        .with_load(2);
    h.backend.save_provider(&full).await.unwrap();

    let outcome = h.orchestrator.process_new_ticket(h.request()).await.unwrap();
    assert_eq!(outcome.stage, RoutingStage::NoCandidates);
    assert_eq!(outcome.candidates_considered, 0);
    assert!(outcome.assignment.is_none());

    let ticket = h.backend.find_ticket(outcome.ticket_id).await.unwrap().unwrap();
    assert_eq!(ticket.status, TicketStatus::Open);
    assert_eq!(ticket.assigned_provider_id, None);
}

#[tokio::test]
async fn test_capacity_is_never_exceeded_sequentially() {
    let h = harness(cold_storage(Priority::Low)).await;
    let only = h.provider("Solo Chill", 40.72, -74.0, 1).await;

    let first = h.orchestrator.process_new_ticket(h.request()).await.unwrap();
    let second = h.orchestrator.process_new_ticket(h.request()).await.unwrap();

    assert_eq!(first.assigned_provider_id(), Some(only.id));
    assert_eq!(second.stage, RoutingStage::NoCandidates);
    assert_eq!(h.load_of(&only).await, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_routing_respects_capacity() {
    let h = harness(cold_storage(Priority::High)).await;
    let provider = h.provider("Two Slot Chill", 40.72, -74.0, 2).await;

    let mut handles = Vec::new();
    for _ in 0..6 {
        let orchestrator = h.orchestrator.clone();
        let request = h.request();
        handles.push(tokio::spawn(async move {
            orchestrator.process_new_ticket(request).await
        }));
    }

    let mut assigned = 0;
    for handle in handles {
        let outcome = handle.await.unwrap().unwrap();
        if outcome.is_assigned() {
            assigned += 1;
        }
    }

    assert_eq!(assigned, 2);
    assert_eq!(h.load_of(&provider).await, 2);
}

#[tokio::test]
async fn test_rejection_chain_until_no_provider_is_left() {
    let h = harness(cold_storage(Priority::Medium)).await;
    let near = h.provider("Near Cooling", 40.7580, -73.9855, 10).await;
    let far = h.provider("Far Cooling", 41.05, STORE_LON, 10).await;

    let outcome = h.orchestrator.process_new_ticket(h.request()).await.unwrap();
    let ticket_id = outcome.ticket_id;
    assert_eq!(outcome.assigned_provider_id(), Some(near.id));

    let second = h
        .orchestrator
        .handle_rejection(ticket_id, near.id, "Technician is off sick today")
        .await
        .unwrap();
    assert_eq!(second.assigned_provider_id(), Some(far.id));
    assert_eq!(second.assignment.as_ref().unwrap().sequence, 2);
    assert_eq!(second.classification_confidence, None);
    assert_eq!(h.load_of(&near).await, 0);
    assert_eq!(h.load_of(&far).await, 1);

    let third = h
        .orchestrator
        .handle_rejection(ticket_id, far.id, "No refrigerant in stock")
        .await
        .unwrap();
    assert_eq!(third.stage, RoutingStage::NoCandidates);

    let ticket = h.backend.find_ticket(ticket_id).await.unwrap().unwrap();
    assert_eq!(ticket.status, TicketStatus::Open);
    assert_eq!(h.load_of(&far).await, 0);

    let history = h.orchestrator.assignment_history(ticket_id).await.unwrap();
    let sequences: Vec<u32> = history.iter().map(|a| a.sequence).collect();
    assert_eq!(sequences, vec![1, 2]);
    assert!(history.iter().all(|a| a.status == AssignmentStatus::Rejected));
    assert_eq!(
        history[0].rejection_reason.as_deref(),
        Some("Technician is off sick today")
    );

    // Both providers stay excluded on a manual re-route
    let again = h.orchestrator.reroute(ticket_id).await.unwrap();
    assert_eq!(again.stage, RoutingStage::NoCandidates);
    assert_eq!(again.candidates_considered, 0);
}

#[tokio::test]
async fn test_rejection_by_other_provider_is_refused() {
    let h = harness(cold_storage(Priority::Medium)).await;
    let tech = h.provider("Near Cooling", 40.7580, -73.9855, 10).await;
    let outcome = h.orchestrator.process_new_ticket(h.request()).await.unwrap();

    let err = h
        .orchestrator
        .handle_rejection(outcome.ticket_id, Uuid::new_v4(), "Not my ticket at all")
        .await
        .unwrap_err();
    assert!(matches!(err, TicketEngineError::InvalidTransition(_)));

    let ticket = h.backend.find_ticket(outcome.ticket_id).await.unwrap().unwrap();
    assert_eq!(ticket.status, TicketStatus::Assigned);
    assert_eq!(h.load_of(&tech).await, 1);
}

#[tokio::test]
async fn test_accepted_ticket_cannot_be_rejected_or_rerouted() {
    let h = harness(cold_storage(Priority::Medium)).await;
    let tech = h.provider("Near Cooling", 40.7580, -73.9855, 10).await;
    let outcome = h.orchestrator.process_new_ticket(h.request()).await.unwrap();

    let accepted = h.lifecycle.accept(outcome.ticket_id, tech.id).await.unwrap();
    assert_eq!(accepted.status, TicketStatus::InProgress);

    let err = h
        .orchestrator
        .handle_rejection(outcome.ticket_id, tech.id, "Changed our minds")
        .await
        .unwrap_err();
    assert!(matches!(err, TicketEngineError::InvalidTransition(_)));

    let err = h.orchestrator.reroute(outcome.ticket_id).await.unwrap_err();
    assert!(matches!(err, TicketEngineError::InvalidTransition(_)));
}

#[tokio::test]
async fn test_unknown_store_and_bad_coordinates() {
    let h = harness(cold_storage(Priority::Medium)).await;

    let missing = NewTicketRequest::new(
        "Walk-in freezer is not holding temperature",
        "Back room",
        Uuid::new_v4(),
        Uuid::new_v4(),
    );
    let err = h.orchestrator.process_new_ticket(missing).await.unwrap_err();
    assert!(matches!(err, TicketEngineError::NotFound(_)));

    let broken = Store::new("Nowhere", f64::NAN, STORE_LON);
    h.backend.save_store(&broken).await.unwrap();
    let request = NewTicketRequest::new(
        "Walk-in freezer is not holding temperature",
        "Back room",
        broken.id,
        Uuid::new_v4(),
    );
    let err = h.orchestrator.process_new_ticket(request).await.unwrap_err();
    assert!(matches!(err, TicketEngineError::InvalidLocation(_)));

    assert!(h.backend.find_active().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_high_priority_deadline_is_four_hours() {
    let h = harness(cold_storage(Priority::High)).await;
    let outcome = h.orchestrator.process_new_ticket(h.request()).await.unwrap();

    let ticket = h.backend.find_ticket(outcome.ticket_id).await.unwrap().unwrap();
    assert_eq!(ticket.priority, Priority::High);
    assert_eq!(ticket.sla_deadline - ticket.created_at, chrono::Duration::hours(4));
}
