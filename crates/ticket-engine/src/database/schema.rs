//! Database schema for the ticket engine
//!
//! Tables: stores, service providers and their user accounts, tickets,
//! ticket assignments and escalations.

use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::error::Result;

/// Create every table and index, leaving existing ones untouched
pub async fn initialize_schema(pool: &SqlitePool) -> Result<()> {
    info!("📋 Initializing ticket engine schema");

    create_stores_table(pool).await?;
    create_service_providers_table(pool).await?;
    create_provider_users_table(pool).await?;
    create_tickets_table(pool).await?;
    create_ticket_assignments_table(pool).await?;
    create_escalations_table(pool).await?;

    info!("✅ Schema initialized");
    Ok(())
}

async fn create_stores_table(pool: &SqlitePool) -> Result<()> {
    debug!("📋 Creating stores table");

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS stores (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            latitude REAL,
            longitude REAL,
            moderator_user_id TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_service_providers_table(pool: &SqlitePool) -> Result<()> {
    debug!("📋 Creating service_providers table");

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS service_providers (
            id TEXT PRIMARY KEY,
            company_name TEXT NOT NULL,
            skills TEXT NOT NULL DEFAULT '[]',
            primary_location_coordinates TEXT,
            capacity_per_day INTEGER NOT NULL DEFAULT 10,
            current_load INTEGER NOT NULL DEFAULT 0,
            approval_status TEXT NOT NULL DEFAULT 'PENDING',
            CHECK (current_load >= 0)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_provider_users_table(pool: &SqlitePool) -> Result<()> {
    debug!("📋 Creating provider_users table");

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS provider_users (
            user_id TEXT PRIMARY KEY,
            service_provider_id TEXT NOT NULL,
            is_active INTEGER NOT NULL DEFAULT 1,
            FOREIGN KEY (service_provider_id) REFERENCES service_providers(id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_provider_users_provider ON provider_users(service_provider_id, is_active)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_tickets_table(pool: &SqlitePool) -> Result<()> {
    debug!("📋 Creating tickets table");

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tickets (
            id TEXT PRIMARY KEY,
            description TEXT NOT NULL,
            location_in_store TEXT NOT NULL,
            qr_asset_id TEXT,
            category TEXT NOT NULL,
            subcategory TEXT NOT NULL,
            priority TEXT NOT NULL,
            status TEXT NOT NULL,
            store_id TEXT NOT NULL,
            reporter_user_id TEXT NOT NULL,
            assigned_service_provider_id TEXT,
            created_at TEXT NOT NULL,
            assigned_at TEXT,
            accepted_at TEXT,
            completed_at TEXT,
            sla_deadline TEXT NOT NULL,
            FOREIGN KEY (store_id) REFERENCES stores(id),
            FOREIGN KEY (assigned_service_provider_id) REFERENCES service_providers(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_tickets_status ON tickets(status)")
        .execute(pool)
        .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_tickets_provider_completed ON tickets(assigned_service_provider_id, completed_at)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_ticket_assignments_table(pool: &SqlitePool) -> Result<()> {
    debug!("📋 Creating ticket_assignments table");

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS ticket_assignments (
            id TEXT PRIMARY KEY,
            ticket_id TEXT NOT NULL,
            service_provider_id TEXT NOT NULL,
            assignment_sequence INTEGER NOT NULL,
            status TEXT NOT NULL,
            score REAL NOT NULL DEFAULT 0,
            explanation TEXT NOT NULL DEFAULT '',
            rejection_reason TEXT,
            created_at TEXT NOT NULL,
            responded_at TEXT,
            UNIQUE (ticket_id, assignment_sequence),
            FOREIGN KEY (ticket_id) REFERENCES tickets(id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_escalations_table(pool: &SqlitePool) -> Result<()> {
    debug!("📋 Creating escalations table");

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS escalations (
            id TEXT PRIMARY KEY,
            ticket_id TEXT NOT NULL,
            escalation_trigger_event TEXT NOT NULL,
            escalated_to_user_id TEXT,
            status TEXT NOT NULL DEFAULT 'TRIGGERED',
            created_at TEXT NOT NULL,
            resolved_at TEXT,
            FOREIGN KEY (ticket_id) REFERENCES tickets(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // One open escalation per ticket and trigger, even across sweepers
    sqlx::query(
        r#"
        CREATE UNIQUE INDEX IF NOT EXISTS idx_escalations_open_trigger
        ON escalations(ticket_id, escalation_trigger_event)
        WHERE status IN ('TRIGGERED', 'ACKNOWLEDGED')
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
