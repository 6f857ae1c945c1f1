//! Escalation operations

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

use super::{parse_label, parse_opt_ts, parse_opt_uuid, parse_ts, parse_uuid, ts, SqliteStore};
use crate::error::{Result, TicketEngineError};
use crate::repository::{EscalationInsert, EscalationRepository};
use crate::types::{Escalation, EscalationStatus};

const ESCALATION_COLUMNS: &str = r#"
    id, ticket_id, escalation_trigger_event, escalated_to_user_id, status,
    created_at, resolved_at
"#;

/// Escalation row as stored
#[derive(sqlx::FromRow, Debug, Clone)]
pub struct DbEscalation {
    pub id: String,
    pub ticket_id: String,
    pub escalation_trigger_event: String,
    pub escalated_to_user_id: Option<String>,
    pub status: String,
    pub created_at: String,
    pub resolved_at: Option<String>,
}

impl DbEscalation {
    pub fn into_escalation(self) -> Result<Escalation> {
        Ok(Escalation {
            id: parse_uuid(&self.id)?,
            ticket_id: parse_uuid(&self.ticket_id)?,
            trigger_event: self.escalation_trigger_event,
            escalated_to: parse_opt_uuid(self.escalated_to_user_id.as_deref())?,
            status: parse_label(&self.status)?,
            created_at: parse_ts(&self.created_at)?,
            resolved_at: parse_opt_ts(self.resolved_at.as_deref())?,
        })
    }
}

impl SqliteStore {
    async fn query_escalations(&self, sql: &str, bind: Option<String>) -> Result<Vec<Escalation>> {
        let mut query = sqlx::query_as::<_, DbEscalation>(sql);
        if let Some(value) = bind {
            query = query.bind(value);
        }
        let rows = query.fetch_all(self.pool()).await?;
        rows.into_iter().map(DbEscalation::into_escalation).collect()
    }
}

#[async_trait]
impl EscalationRepository for SqliteStore {
    async fn find_open(&self, ticket_id: Uuid, trigger_event: &str) -> Result<Option<Escalation>> {
        let sql = format!(
            r#"
            SELECT {} FROM escalations
            WHERE ticket_id = ? AND escalation_trigger_event = ?
              AND status IN ('TRIGGERED', 'ACKNOWLEDGED')
            LIMIT 1
            "#,
            ESCALATION_COLUMNS
        );
        let row: Option<DbEscalation> = sqlx::query_as(&sql)
            .bind(ticket_id.to_string())
            .bind(trigger_event)
            .fetch_optional(self.pool())
            .await?;
        row.map(DbEscalation::into_escalation).transpose()
    }

    async fn create_escalation(&self, escalation: &Escalation) -> Result<EscalationInsert> {
        // The partial unique index turns a concurrent duplicate into a no-op
        let result = sqlx::query(
            r#"
            INSERT INTO escalations (
                id, ticket_id, escalation_trigger_event, escalated_to_user_id,
                status, created_at, resolved_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(escalation.id.to_string())
        .bind(escalation.ticket_id.to_string())
        .bind(&escalation.trigger_event)
        .bind(escalation.escalated_to.map(|id| id.to_string()))
        .bind(escalation.status.as_str())
        .bind(ts(&escalation.created_at))
        .bind(escalation.resolved_at.as_ref().map(ts))
        .execute(self.pool())
        .await?;

        if result.rows_affected() > 0 {
            return Ok(EscalationInsert::Created(escalation.clone()));
        }

        debug!(
            "Escalation '{}' for ticket {} already open",
            escalation.trigger_event, escalation.ticket_id
        );
        match self
            .find_open(escalation.ticket_id, &escalation.trigger_event)
            .await?
        {
            Some(existing) => Ok(EscalationInsert::Duplicate(existing.id)),
            None => Err(TicketEngineError::internal(format!(
                "escalation {} was neither inserted nor found open",
                escalation.id
            ))),
        }
    }

    async fn find_escalation(&self, id: Uuid) -> Result<Option<Escalation>> {
        let sql = format!("SELECT {} FROM escalations WHERE id = ?", ESCALATION_COLUMNS);
        let row: Option<DbEscalation> = sqlx::query_as(&sql)
            .bind(id.to_string())
            .fetch_optional(self.pool())
            .await?;
        row.map(DbEscalation::into_escalation).transpose()
    }

    async fn list_escalations_for_ticket(&self, ticket_id: Uuid) -> Result<Vec<Escalation>> {
        let sql = format!(
            "SELECT {} FROM escalations WHERE ticket_id = ? ORDER BY created_at, id",
            ESCALATION_COLUMNS
        );
        self.query_escalations(&sql, Some(ticket_id.to_string())).await
    }

    async fn list_open(&self) -> Result<Vec<Escalation>> {
        let sql = format!(
            r#"
            SELECT {} FROM escalations
            WHERE status IN ('TRIGGERED', 'ACKNOWLEDGED')
            ORDER BY created_at, id
            "#,
            ESCALATION_COLUMNS
        );
        self.query_escalations(&sql, None).await
    }

    async fn update_escalation_status(
        &self,
        id: Uuid,
        status: EscalationStatus,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let resolved_at = (status == EscalationStatus::Resolved).then(|| ts(&at));
        let result = sqlx::query(
            "UPDATE escalations SET status = ?, resolved_at = COALESCE(?, resolved_at) WHERE id = ?",
        )
        .bind(status.as_str())
        .bind(resolved_at)
        .bind(id.to_string())
        .execute(self.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(TicketEngineError::not_found(format!("escalation {}", id)));
        }
        Ok(())
    }
}
