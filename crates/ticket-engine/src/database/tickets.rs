//! Ticket operations and completion history

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

use super::{parse_label, parse_opt_ts, parse_opt_uuid, parse_ts, parse_uuid, ts, SqliteStore};
use crate::error::{Result, TicketEngineError};
use crate::repository::{TicketHistoryRepository, TicketRepository};
use crate::types::{CompletionStats, Priority, StoreTicketStats, Ticket, TicketStatus};

pub(crate) const TICKET_COLUMNS: &str = r#"
    id, description, location_in_store, qr_asset_id, category, subcategory,
    priority, status, store_id, reporter_user_id, assigned_service_provider_id,
    created_at, assigned_at, accepted_at, completed_at, sla_deadline
"#;

/// Ticket row as stored
#[derive(sqlx::FromRow, Debug, Clone)]
pub struct DbTicket {
    pub id: String,
    pub description: String,
    pub location_in_store: String,
    pub qr_asset_id: Option<String>,
    pub category: String,
    pub subcategory: String,
    pub priority: String,
    pub status: String,
    pub store_id: String,
    pub reporter_user_id: String,
    pub assigned_service_provider_id: Option<String>,
    pub created_at: String,
    pub assigned_at: Option<String>,
    pub accepted_at: Option<String>,
    pub completed_at: Option<String>,
    pub sla_deadline: String,
}

impl DbTicket {
    pub fn into_ticket(self) -> Result<Ticket> {
        Ok(Ticket {
            id: parse_uuid(&self.id)?,
            description: self.description,
            location_in_store: self.location_in_store,
            asset_tag: self.qr_asset_id,
            category: self.category,
            subcategory: self.subcategory,
            priority: Priority::from_label(&self.priority),
            status: parse_label(&self.status)?,
            store_id: parse_uuid(&self.store_id)?,
            reporter_id: parse_uuid(&self.reporter_user_id)?,
            assigned_provider_id: parse_opt_uuid(self.assigned_service_provider_id.as_deref())?,
            created_at: parse_ts(&self.created_at)?,
            assigned_at: parse_opt_ts(self.assigned_at.as_deref())?,
            accepted_at: parse_opt_ts(self.accepted_at.as_deref())?,
            completed_at: parse_opt_ts(self.completed_at.as_deref())?,
            sla_deadline: parse_ts(&self.sla_deadline)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct StatusCount {
    status: String,
    n: i64,
}

#[derive(sqlx::FromRow)]
struct CompletionRow {
    completed: i64,
    within_sla: i64,
}

#[async_trait]
impl TicketRepository for SqliteStore {
    async fn create_ticket(&self, ticket: &Ticket) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO tickets (
                id, description, location_in_store, qr_asset_id, category, subcategory,
                priority, status, store_id, reporter_user_id, assigned_service_provider_id,
                created_at, assigned_at, accepted_at, completed_at, sla_deadline
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(ticket.id.to_string())
        .bind(&ticket.description)
        .bind(&ticket.location_in_store)
        .bind(&ticket.asset_tag)
        .bind(&ticket.category)
        .bind(&ticket.subcategory)
        .bind(ticket.priority.as_str())
        .bind(ticket.status.as_str())
        .bind(ticket.store_id.to_string())
        .bind(ticket.reporter_id.to_string())
        .bind(ticket.assigned_provider_id.map(|id| id.to_string()))
        .bind(ts(&ticket.created_at))
        .bind(ticket.assigned_at.as_ref().map(ts))
        .bind(ticket.accepted_at.as_ref().map(ts))
        .bind(ticket.completed_at.as_ref().map(ts))
        .bind(ts(&ticket.sla_deadline))
        .execute(self.pool())
        .await?;

        debug!("📝 Ticket {} stored as {}", ticket.id, ticket.status);
        Ok(())
    }

    async fn find_ticket(&self, id: Uuid) -> Result<Option<Ticket>> {
        let sql = format!("SELECT {} FROM tickets WHERE id = ?", TICKET_COLUMNS);
        let row: Option<DbTicket> = sqlx::query_as(&sql)
            .bind(id.to_string())
            .fetch_optional(self.pool())
            .await?;
        row.map(DbTicket::into_ticket).transpose()
    }

    async fn find_active(&self) -> Result<Vec<Ticket>> {
        let sql = format!(
            r#"
            SELECT {} FROM tickets
            WHERE status IN ('OPEN', 'ASSIGNED', 'IN_PROGRESS')
            ORDER BY created_at, id
            "#,
            TICKET_COLUMNS
        );
        let rows: Vec<DbTicket> = sqlx::query_as(&sql).fetch_all(self.pool()).await?;
        rows.into_iter().map(DbTicket::into_ticket).collect()
    }

    async fn update_ticket_status(&self, id: Uuid, status: TicketStatus) -> Result<()> {
        let result = sqlx::query("UPDATE tickets SET status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(id.to_string())
            .execute(self.pool())
            .await?;

        if result.rows_affected() == 0 {
            return Err(TicketEngineError::not_found(format!("ticket {}", id)));
        }
        Ok(())
    }

    async fn transition_ticket_status(
        &self,
        id: Uuid,
        from: &[TicketStatus],
        to: TicketStatus,
    ) -> Result<bool> {
        if !from.is_empty() {
            let sql = format!(
                "UPDATE tickets SET status = ? WHERE id = ? AND status IN ({})",
                vec!["?"; from.len()].join(", ")
            );
            let mut query = sqlx::query(&sql).bind(to.as_str()).bind(id.to_string());
            for status in from {
                query = query.bind(status.as_str());
            }
            if query.execute(self.pool()).await?.rows_affected() > 0 {
                debug!("Ticket {} moved to {}", id, to);
                return Ok(true);
            }
        }

        match self.find_ticket(id).await? {
            Some(_) => Ok(false),
            None => Err(TicketEngineError::not_found(format!("ticket {}", id))),
        }
    }

    async fn store_ticket_stats(&self, store_id: Uuid) -> Result<StoreTicketStats> {
        let rows: Vec<StatusCount> = sqlx::query_as(
            "SELECT status, COUNT(*) AS n FROM tickets WHERE store_id = ? GROUP BY status",
        )
        .bind(store_id.to_string())
        .fetch_all(self.pool())
        .await?;

        let mut stats = StoreTicketStats {
            store_id,
            ..Default::default()
        };
        for row in rows {
            let status: TicketStatus = parse_label(&row.status)?;
            stats.by_status.insert(status, row.n.max(0) as u64);
        }
        Ok(stats)
    }
}

#[async_trait]
impl TicketHistoryRepository for SqliteStore {
    async fn completion_stats(&self, provider_id: Uuid, since: DateTime<Utc>) -> Result<CompletionStats> {
        let row: CompletionRow = sqlx::query_as(
            r#"
            SELECT
                COUNT(*) AS completed,
                COALESCE(SUM(CASE WHEN completed_at <= sla_deadline THEN 1 ELSE 0 END), 0) AS within_sla
            FROM tickets
            WHERE assigned_service_provider_id = ?
              AND status = 'COMPLETED'
              AND completed_at IS NOT NULL
              AND completed_at >= ?
            "#,
        )
        .bind(provider_id.to_string())
        .bind(ts(&since))
        .fetch_one(self.pool())
        .await?;

        Ok(CompletionStats {
            completed: row.completed.max(0) as u32,
            within_sla: row.within_sla.max(0) as u32,
        })
    }
}
