//! SQLite backend tests
//!
//! These exercise the guarded writes and the partial unique index directly,
//! plus one full routing run against a database file on disk.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tempfile::TempDir;
use uuid::Uuid;

use fixdesk_ticket_engine::prelude::*;
use fixdesk_ticket_engine::availability::AvailabilityFinder;
use fixdesk_ticket_engine::repository::{
    AcceptanceCommit, AssignmentCommit, CommitOutcome, CompletionCommit, EscalationInsert,
};
use fixdesk_ticket_engine::SqliteStore;

async fn store_with_shop() -> (SqliteStore, Store) {
    let db = SqliteStore::new_in_memory().await.unwrap();
    let shop = Store::new("Riverside", 40.7128, -74.0060).with_moderator(Uuid::new_v4());
    db.save_store(&shop).await.unwrap();
    (db, shop)
}

fn open_ticket(store_id: Uuid, created_at: DateTime<Utc>) -> Ticket {
    Ticket {
        id: Uuid::new_v4(),
        description: "Checkout lane 3 card reader is dead".to_string(),
        location_in_store: "Lane 3".to_string(),
        asset_tag: Some("POS-0003".to_string()),
        category: "IT".to_string(),
        subcategory: "POS Systems".to_string(),
        priority: Priority::Medium,
        status: TicketStatus::Open,
        store_id,
        reporter_id: Uuid::new_v4(),
        assigned_provider_id: None,
        created_at,
        assigned_at: None,
        accepted_at: None,
        completed_at: None,
        sla_deadline: created_at + Duration::hours(12),
    }
}

fn proposal(ticket: &Ticket, provider: &ServiceProvider, at: DateTime<Utc>) -> AssignmentCommit {
    AssignmentCommit {
        assignment: TicketAssignment::proposed(
            ticket.id,
            provider.id,
            1,
            0.82,
            format!("Provider {} scored 82.0%", provider.company_name),
            at,
        ),
    }
}

#[tokio::test]
async fn test_ticket_round_trip() {
    let (db, shop) = store_with_shop().await;
    let ticket = open_ticket(shop.id, Utc::now());
    db.create_ticket(&ticket).await.unwrap();

    let loaded = db.find_ticket(ticket.id).await.unwrap().unwrap();
    assert_eq!(loaded.asset_tag.as_deref(), Some("POS-0003"));
    assert_eq!(loaded.priority, Priority::Medium);
    assert_eq!(loaded.status, TicketStatus::Open);
    assert_eq!(loaded.sla_deadline, ticket.sla_deadline);
    assert_eq!(db.find_active().await.unwrap().len(), 1);

    let shop_back = db.find_store(shop.id).await.unwrap().unwrap();
    assert_eq!(shop_back.moderator_id, shop.moderator_id);
}

#[tokio::test]
async fn test_commit_guard_refuses_full_provider() {
    let (db, shop) = store_with_shop().await;
    let now = Utc::now();
    let tech = ServiceProvider::new("Till Doctors", vec!["POS Systems".into()], 1);
    db.save_provider(&tech).await.unwrap();

    let first = open_ticket(shop.id, now);
    let second = open_ticket(shop.id, now);
    db.create_ticket(&first).await.unwrap();
    db.create_ticket(&second).await.unwrap();

    let outcome = db.commit_assignment(&proposal(&first, &tech, now)).await.unwrap();
    assert_eq!(outcome, CommitOutcome::Committed);

    let outcome = db.commit_assignment(&proposal(&second, &tech, now)).await.unwrap();
    assert_eq!(outcome, CommitOutcome::ProviderAtCapacity);

    // The losing commit left nothing behind
    let second = db.find_ticket(second.id).await.unwrap().unwrap();
    assert_eq!(second.status, TicketStatus::Open);
    assert_eq!(second.assigned_provider_id, None);
    assert!(db.find_latest_for_ticket(second.id).await.unwrap().is_none());

    let tech = db.find_provider(tech.id).await.unwrap().unwrap();
    assert_eq!(tech.current_load, 1);
    assert!(db.find_approved_with_capacity().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_commit_guard_refuses_assigned_ticket() {
    let (db, shop) = store_with_shop().await;
    let now = Utc::now();
    let a = ServiceProvider::new("Till Doctors", vec!["POS Systems".into()], 5);
    let b = ServiceProvider::new("Scan Fix", vec!["POS Systems".into()], 5);
    db.save_provider(&a).await.unwrap();
    db.save_provider(&b).await.unwrap();

    let ticket = open_ticket(shop.id, now);
    db.create_ticket(&ticket).await.unwrap();
    db.commit_assignment(&proposal(&ticket, &a, now)).await.unwrap();

    let outcome = db.commit_assignment(&proposal(&ticket, &b, now)).await.unwrap();
    assert_eq!(outcome, CommitOutcome::TicketNotRoutable);
    assert_eq!(db.find_provider(b.id).await.unwrap().unwrap().current_load, 0);
}

#[tokio::test]
async fn test_increment_load_respects_capacity() {
    let (db, _) = store_with_shop().await;
    let tech = ServiceProvider::new("Till Doctors", vec!["POS Systems".into()], 2);
    db.save_provider(&tech).await.unwrap();

    db.increment_load(tech.id, 2).await.unwrap();
    let err = db.increment_load(tech.id, 1).await.unwrap_err();
    assert!(matches!(err, TicketEngineError::AssignmentConflict(id) if id == tech.id));

    db.decrement_load(tech.id, 5).await.unwrap();
    assert_eq!(db.find_provider(tech.id).await.unwrap().unwrap().current_load, 0);
}

#[tokio::test]
async fn test_inactive_and_unreadable_providers() {
    let (db, _) = store_with_shop().await;

    let mut dormant = ServiceProvider::new("Dormant Co", vec!["POS Systems".into()], 5);
    dormant.active = false;
    db.save_provider(&dormant).await.unwrap();

    let odd = ServiceProvider::new("Odd Coordinates", vec!["POS Systems".into()], 5)
        .with_location(40.0, -74.0);
    db.save_provider(&odd).await.unwrap();
    sqlx::query("UPDATE service_providers SET primary_location_coordinates = 'not json' WHERE id = ?")
        .bind(odd.id.to_string())
        .execute(db.pool())
        .await
        .unwrap();

    let pool = db.find_approved_with_capacity().await.unwrap();
    assert_eq!(pool.len(), 1);
    assert_eq!(pool[0].id, odd.id);
    assert_eq!(pool[0].location, None);
}

#[tokio::test]
async fn test_unreadable_skills_only_affect_that_provider() {
    let (db, _) = store_with_shop().await;
    let good = ServiceProvider::new("Pipes R Us", vec!["Plumbing".into()], 5).with_location(0.0, 0.0);
    let bad = ServiceProvider::new("Drain Kings", vec!["Plumbing".into()], 5).with_location(0.0, 0.0);
    db.save_provider(&good).await.unwrap();
    db.save_provider(&bad).await.unwrap();
    sqlx::query("UPDATE service_providers SET skills = 'Plumbing' WHERE id = ?")
        .bind(bad.id.to_string())
        .execute(db.pool())
        .await
        .unwrap();

    let pool = db.find_approved_with_capacity().await.unwrap();
    assert_eq!(pool.len(), 2);
    let loaded = db.find_provider(bad.id).await.unwrap().unwrap();
    assert!(loaded.skills.is_empty());

    let found = AvailabilityFinder::new(Arc::new(db))
        .find_available(&["Plumbing".to_string()], &GeoPoint::new(0.0, 0.0))
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].provider.id, good.id);
}

#[tokio::test]
async fn test_guarded_status_transition() {
    let (db, shop) = store_with_shop().await;
    let mut ticket = open_ticket(shop.id, Utc::now());
    ticket.status = TicketStatus::Completed;
    db.create_ticket(&ticket).await.unwrap();

    let moved = db
        .transition_ticket_status(ticket.id, &TicketStatus::ACTIVE, TicketStatus::Escalated)
        .await
        .unwrap();
    assert!(!moved);
    assert_eq!(
        db.find_ticket(ticket.id).await.unwrap().unwrap().status,
        TicketStatus::Completed
    );

    let moved = db
        .transition_ticket_status(ticket.id, &[TicketStatus::Completed], TicketStatus::Escalated)
        .await
        .unwrap();
    assert!(moved);

    let err = db
        .transition_ticket_status(Uuid::new_v4(), &TicketStatus::ACTIVE, TicketStatus::Escalated)
        .await
        .unwrap_err();
    assert!(matches!(err, TicketEngineError::NotFound(_)));
}

#[tokio::test]
async fn test_acceptance_and_completion_apply_once() {
    let (db, shop) = store_with_shop().await;
    let now = Utc::now();
    let tech = ServiceProvider::new("Till Doctors", vec!["POS Systems".into()], 5);
    db.save_provider(&tech).await.unwrap();

    let first = open_ticket(shop.id, now);
    let second = open_ticket(shop.id, now);
    for ticket in [&first, &second] {
        db.create_ticket(ticket).await.unwrap();
        db.commit_assignment(&proposal(ticket, &tech, now)).await.unwrap();
    }

    let acceptance = AcceptanceCommit {
        ticket_id: first.id,
        provider_id: tech.id,
        accepted_at: now,
    };
    assert!(db.commit_acceptance(&acceptance).await.unwrap());
    assert!(!db.commit_acceptance(&acceptance).await.unwrap());
    let latest = db.find_latest_for_ticket(first.id).await.unwrap().unwrap();
    assert_eq!(latest.status, AssignmentStatus::Accepted);

    let completion = CompletionCommit {
        ticket_id: first.id,
        completed_at: now + Duration::hours(1),
    };
    assert!(db.commit_completion(&completion).await.unwrap());
    assert!(!db.commit_completion(&completion).await.unwrap());

    // Only the completed ticket's unit was released
    assert_eq!(db.find_provider(tech.id).await.unwrap().unwrap().current_load, 1);
    let first = db.find_ticket(first.id).await.unwrap().unwrap();
    assert_eq!(first.status, TicketStatus::Completed);
    assert_eq!(first.completed_at, Some(now + Duration::hours(1)));
}

#[tokio::test]
async fn test_open_escalations_are_unique_per_trigger() {
    let (db, shop) = store_with_shop().await;
    let now = Utc::now();
    let ticket = open_ticket(shop.id, now);
    db.create_ticket(&ticket).await.unwrap();

    let trigger = "Assignment timeout exceeded";
    let first = Escalation::triggered(ticket.id, trigger, shop.moderator_id, now);
    let duplicate = Escalation::triggered(ticket.id, trigger, shop.moderator_id, now);
    let other = Escalation::triggered(ticket.id, "SLA deadline exceeded", None, now);

    assert!(matches!(
        db.create_escalation(&first).await.unwrap(),
        EscalationInsert::Created(_)
    ));
    assert_eq!(
        db.create_escalation(&duplicate).await.unwrap(),
        EscalationInsert::Duplicate(first.id)
    );
    assert!(matches!(
        db.create_escalation(&other).await.unwrap(),
        EscalationInsert::Created(_)
    ));

    db.update_escalation_status(first.id, EscalationStatus::Resolved, now)
        .await
        .unwrap();
    assert!(db.find_open(ticket.id, trigger).await.unwrap().is_none());
    assert!(matches!(
        db.create_escalation(&duplicate).await.unwrap(),
        EscalationInsert::Created(_)
    ));

    let history = db.list_escalations_for_ticket(ticket.id).await.unwrap();
    assert_eq!(history.len(), 3);
    assert_eq!(db.list_open().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_completion_stats_window() {
    let (db, shop) = store_with_shop().await;
    let now = Utc::now();
    let tech = ServiceProvider::new("Till Doctors", vec!["POS Systems".into()], 10);
    db.save_provider(&tech).await.unwrap();

    // (completed after creation, created how many days ago)
    let history = [
        (Duration::hours(2), 3),
        (Duration::hours(11), 5),
        (Duration::hours(20), 10),
        (Duration::hours(1), 45),
    ];
    for (took, days_ago) in history {
        let created = now - Duration::days(days_ago);
        let mut ticket = open_ticket(shop.id, created);
        ticket.status = TicketStatus::InProgress;
        ticket.assigned_provider_id = Some(tech.id);
        db.create_ticket(&ticket).await.unwrap();
        let completed = db
            .commit_completion(&CompletionCommit {
                ticket_id: ticket.id,
                completed_at: created + took,
            })
            .await
            .unwrap();
        assert!(completed);
    }

    let stats = db
        .completion_stats(tech.id, now - Duration::days(30))
        .await
        .unwrap();
    assert_eq!(stats.completed, 3);
    assert_eq!(stats.within_sla, 2);
    assert_eq!(stats.on_time_ratio(), Some(2.0 / 3.0));

    let nobody = db
        .completion_stats(Uuid::new_v4(), now - Duration::days(30))
        .await
        .unwrap();
    assert_eq!(nobody.on_time_ratio(), None);
}

#[tokio::test]
async fn test_routing_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("tickets.db");
    let shop = Store::new("Riverside", 40.7128, -74.0060);
    let tech = ServiceProvider::new("Till Doctors", vec!["POS Systems".into()], 4)
        .with_location(40.73, -73.99);

    let ticket_id = {
        let db = Arc::new(SqliteStore::open(&path).await.unwrap());
        db.save_store(&shop).await.unwrap();
        db.save_provider(&tech).await.unwrap();

        let orchestrator = RoutingOrchestrator::new(
            Repositories::from_backend(db.clone()),
            Arc::new(KeywordClassifier::new()),
            &TicketEngineConfig::default(),
            Arc::new(SystemClock),
        );
        let outcome = orchestrator
            .process_new_ticket(NewTicketRequest::new(
                "Card reader at the checkout keeps rebooting",
                "Lane 3",
                shop.id,
                Uuid::new_v4(),
            ))
            .await
            .unwrap();
        assert_eq!(outcome.subcategory, "POS Systems");
        assert_eq!(outcome.assigned_provider_id(), Some(tech.id));
        db.pool().close().await;
        outcome.ticket_id
    };

    let db = SqliteStore::open(&path).await.unwrap();
    let ticket = db.find_ticket(ticket_id).await.unwrap().unwrap();
    assert_eq!(ticket.status, TicketStatus::Assigned);
    assert_eq!(ticket.assigned_provider_id, Some(tech.id));

    let latest = db.find_latest_for_ticket(ticket_id).await.unwrap().unwrap();
    assert_eq!(latest.sequence, 1);
    assert_eq!(latest.status, AssignmentStatus::Proposed);
    assert_eq!(db.find_provider(tech.id).await.unwrap().unwrap().current_load, 1);
}
