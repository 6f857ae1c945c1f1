//! Escalation sweep scenarios driven through the full server wiring

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use fixdesk_ticket_engine::prelude::*;
use fixdesk_ticket_engine::sla::SlaPolicy;

struct FixedClassifier(Priority);

#[async_trait]
impl Classifier for FixedClassifier {
    async fn classify(&self, _description: &str) -> Result<Classification> {
        Ok(Classification::new("Facilities", "Cold Storage", self.0, 0.85, "freezer"))
    }
}

/// Store lookups fail for one store id
struct FlakyStores {
    inner: Arc<InMemoryStore>,
    broken: Uuid,
}

#[async_trait]
impl StoreRepository for FlakyStores {
    async fn find_store(&self, id: Uuid) -> Result<Option<Store>> {
        if id == self.broken {
            return Err(TicketEngineError::internal("store directory offline"));
        }
        self.inner.find_store(id).await
    }

    async fn save_store(&self, store: &Store) -> Result<()> {
        self.inner.save_store(store).await
    }
}

struct Setup {
    t0: DateTime<Utc>,
    backend: Arc<InMemoryStore>,
    shop: Store,
    moderator: Uuid,
    server: TicketEngineServer,
}

async fn setup(priority: Priority) -> Setup {
    let t0 = Utc::now();
    let backend = Arc::new(InMemoryStore::new());
    let moderator = Uuid::new_v4();
    let shop = Store::new("Harbour Point", 40.7128, -74.0060).with_moderator(moderator);
    backend.save_store(&shop).await.unwrap();

    let server = TicketEngineServerBuilder::new()
        .with_repositories(Repositories::from_backend(backend.clone()))
        .with_classifier(Arc::new(FixedClassifier(priority)))
        .with_clock(Arc::new(ManualClock::new(t0)))
        .build()
        .await
        .unwrap();

    Setup {
        t0,
        backend,
        shop,
        moderator,
        server,
    }
}

impl Setup {
    async fn tech(&self) -> ServiceProvider {
        let tech = ServiceProvider::new("Arctic Refrigeration", vec!["Refrigeration".into()], 10)
            .with_location(40.72, -74.0);
        self.backend.save_provider(&tech).await.unwrap();
        tech
    }

    async fn report(&self) -> RoutingOutcome {
        self.server
            .orchestrator()
            .process_new_ticket(NewTicketRequest::new(
                "Walk-in freezer alarm is sounding",
                "Back room",
                self.shop.id,
                Uuid::new_v4(),
            ))
            .await
            .unwrap()
    }

    async fn sweep_after(&self, minutes: i64) -> SweepReport {
        self.server
            .monitor()
            .sweep_at(self.t0 + Duration::minutes(minutes))
            .await
            .unwrap()
    }
}

#[tokio::test]
async fn test_high_priority_acceptance_timeout() {
    let s = setup(Priority::High).await;
    s.tech().await;
    let outcome = s.report().await;
    assert!(outcome.is_assigned());

    // Exactly at the 30 minute mark nothing has fired yet
    let on_time = s.sweep_after(30).await;
    assert_eq!(on_time.tickets_evaluated, 1);
    assert_eq!(on_time.escalations_created, 0);

    let first = s.sweep_after(31).await;
    assert_eq!(first.escalations_created, 1);
    assert_eq!(first.tickets_escalated, 0);

    let second = s.sweep_after(32).await;
    assert_eq!(second.escalations_created, 0);
    assert_eq!(second.duplicates_skipped, 1);

    let history = s
        .server
        .monitor()
        .escalation_history(outcome.ticket_id)
        .await
        .unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].trigger_event, "Acceptance timeout exceeded");
    assert_eq!(history[0].escalated_to, Some(s.moderator));
    assert_eq!(history[0].status, EscalationStatus::Triggered);

    let ticket = s.backend.find_ticket(outcome.ticket_id).await.unwrap().unwrap();
    assert_eq!(ticket.status, TicketStatus::Assigned);
}

#[tokio::test]
async fn test_missed_deadline_moves_ticket_to_escalated() {
    let s = setup(Priority::High).await;
    let outcome = s.report().await;
    assert_eq!(outcome.stage, RoutingStage::NoCandidates);

    let report = s.sweep_after(4 * 60 + 1).await;
    // Assignment timeout and SLA deadline both fire on the unassigned ticket
    assert_eq!(report.escalations_created, 2);
    assert_eq!(report.tickets_escalated, 1);

    let ticket = s.backend.find_ticket(outcome.ticket_id).await.unwrap().unwrap();
    assert_eq!(ticket.status, TicketStatus::Escalated);

    // Escalated tickets are no longer swept
    let later = s.sweep_after(5 * 60).await;
    assert_eq!(later.tickets_evaluated, 0);

    let stats = s.server.monitor().store_ticket_stats(s.shop.id).await.unwrap();
    assert_eq!(stats.count(TicketStatus::Escalated), 1);
    assert_eq!(stats.total(), 1);
}

#[tokio::test]
async fn test_escalated_ticket_accepted_stays_in_progress() {
    let s = setup(Priority::High).await;
    let tech = s.tech().await;
    let outcome = s.report().await;
    assert!(outcome.is_assigned());

    // Acceptance timeout and SLA deadline have both run out
    let report = s.sweep_after(4 * 60 + 1).await;
    assert_eq!(report.escalations_created, 2);
    assert_eq!(report.tickets_escalated, 1);

    let ticket = s
        .server
        .lifecycle()
        .accept(outcome.ticket_id, tech.id)
        .await
        .unwrap();
    assert_eq!(ticket.status, TicketStatus::InProgress);

    // The open SLA escalation is a duplicate and does not pull the ticket back
    let report = s.sweep_after(4 * 60 + 5).await;
    assert_eq!(report.tickets_evaluated, 1);
    assert_eq!(report.duplicates_skipped, 1);
    assert_eq!(report.tickets_escalated, 0);

    let ticket = s.backend.find_ticket(outcome.ticket_id).await.unwrap().unwrap();
    assert_eq!(ticket.status, TicketStatus::InProgress);

    let err = s
        .server
        .lifecycle()
        .accept(outcome.ticket_id, tech.id)
        .await
        .unwrap_err();
    assert!(matches!(err, TicketEngineError::InvalidTransition(_)));
}

#[tokio::test]
async fn test_resolution_timeout_after_acceptance() {
    let s = setup(Priority::Low).await;
    let tech = s.tech().await;
    let outcome = s.report().await;
    s.server
        .lifecycle()
        .accept(outcome.ticket_id, tech.id)
        .await
        .unwrap();

    // Accepted at creation, so the 48 hour resolution budget and the SLA
    // deadline run out together
    let report = s.sweep_after(48 * 60 + 1).await;
    assert_eq!(report.escalations_created, 2);
    let triggers: Vec<String> = s
        .server
        .monitor()
        .escalation_history(outcome.ticket_id)
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.trigger_event)
        .collect();
    assert!(triggers.contains(&"Resolution timeout exceeded".to_string()));
    assert!(triggers.contains(&"SLA deadline exceeded".to_string()));
}

#[tokio::test]
async fn test_acknowledge_and_resolve_lifecycle() {
    let s = setup(Priority::Medium).await;
    s.report().await;
    s.sweep_after(31).await;

    let monitor = s.server.monitor();
    let open = monitor.open_escalations().await.unwrap();
    assert_eq!(open.len(), 1);
    let id = open[0].id;

    monitor.acknowledge(id).await.unwrap();
    // Acknowledged still blocks a duplicate
    let report = s.sweep_after(35).await;
    assert_eq!(report.duplicates_skipped, 1);

    let resolved = monitor.resolve(id).await.unwrap();
    assert_eq!(resolved.status, EscalationStatus::Resolved);
    assert!(monitor.open_escalations().await.unwrap().is_empty());

    let err = monitor.acknowledge(id).await.unwrap_err();
    assert!(matches!(err, TicketEngineError::InvalidTransition(_)));

    // The ticket is still unassigned, so the breach is recorded again
    let report = s.sweep_after(40).await;
    assert_eq!(report.escalations_created, 1);
    assert_eq!(
        monitor.escalation_history(open[0].ticket_id).await.unwrap().len(),
        2
    );
}

#[tokio::test]
async fn test_one_failing_ticket_does_not_stop_the_sweep() {
    let t0 = Utc::now();
    let backend = Arc::new(InMemoryStore::new());
    let good = Store::new("Good", 40.0, -74.0);
    let bad = Store::new("Bad", 41.0, -74.0);
    backend.save_store(&good).await.unwrap();
    backend.save_store(&bad).await.unwrap();

    let mut repos = Repositories::from_backend(backend.clone());
    repos.stores = Arc::new(FlakyStores {
        inner: backend.clone(),
        broken: bad.id,
    });

    let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(t0));
    let orchestrator = RoutingOrchestrator::new(
        repos.clone(),
        Arc::new(FixedClassifier(Priority::Medium)),
        &TicketEngineConfig::default(),
        clock.clone(),
    );
    orchestrator
        .process_new_ticket(NewTicketRequest::new(
            "Freezer door seal is torn",
            "Aisle 9",
            good.id,
            Uuid::new_v4(),
        ))
        .await
        .unwrap();
    // Created directly, the failing lookup would also break routing
    backend
        .create_ticket(&Ticket {
            id: Uuid::new_v4(),
            description: "Freezer door seal is torn".to_string(),
            location_in_store: "Aisle 2".to_string(),
            asset_tag: None,
            category: "Facilities".to_string(),
            subcategory: "Cold Storage".to_string(),
            priority: Priority::Medium,
            status: TicketStatus::Open,
            store_id: bad.id,
            reporter_id: Uuid::new_v4(),
            assigned_provider_id: None,
            created_at: t0,
            assigned_at: None,
            accepted_at: None,
            completed_at: None,
            sla_deadline: t0 + Duration::hours(12),
        })
        .await
        .unwrap();

    let monitor = EscalationMonitor::new(repos, SlaPolicy::default(), clock);
    let report = monitor.sweep_at(t0 + Duration::minutes(31)).await.unwrap();

    assert_eq!(report.tickets_evaluated, 2);
    assert_eq!(report.failures, 1);
    assert_eq!(report.escalations_created, 1);
}
