//! Assignment operations, including the atomic assign and reject commits

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{parse_label, parse_opt_ts, parse_ts, parse_uuid, ts, SqliteStore};
use crate::error::{Result, TicketEngineError};
use crate::repository::{
    AcceptanceCommit, AssignmentCommit, AssignmentRepository, CommitOutcome, CompletionCommit,
    RejectionCommit, TicketRepository,
};
use crate::types::{AssignmentStatus, TicketAssignment};

const ASSIGNMENT_COLUMNS: &str = r#"
    id, ticket_id, service_provider_id, assignment_sequence, status, score,
    explanation, rejection_reason, created_at, responded_at
"#;

/// Assignment row as stored
#[derive(sqlx::FromRow, Debug, Clone)]
pub struct DbTicketAssignment {
    pub id: String,
    pub ticket_id: String,
    pub service_provider_id: String,
    pub assignment_sequence: i64,
    pub status: String,
    pub score: f64,
    pub explanation: String,
    pub rejection_reason: Option<String>,
    pub created_at: String,
    pub responded_at: Option<String>,
}

impl DbTicketAssignment {
    pub fn into_assignment(self) -> Result<TicketAssignment> {
        Ok(TicketAssignment {
            id: parse_uuid(&self.id)?,
            ticket_id: parse_uuid(&self.ticket_id)?,
            provider_id: parse_uuid(&self.service_provider_id)?,
            sequence: self.assignment_sequence.max(0) as u32,
            status: parse_label(&self.status)?,
            score: self.score,
            explanation: self.explanation,
            rejection_reason: self.rejection_reason,
            created_at: parse_ts(&self.created_at)?,
            responded_at: parse_opt_ts(self.responded_at.as_deref())?,
        })
    }
}

fn insert_assignment_sql() -> &'static str {
    r#"
    INSERT INTO ticket_assignments (
        id, ticket_id, service_provider_id, assignment_sequence, status, score,
        explanation, rejection_reason, created_at, responded_at
    ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
    "#
}

#[async_trait]
impl AssignmentRepository for SqliteStore {
    async fn create_assignment(&self, assignment: &TicketAssignment) -> Result<()> {
        sqlx::query(insert_assignment_sql())
            .bind(assignment.id.to_string())
            .bind(assignment.ticket_id.to_string())
            .bind(assignment.provider_id.to_string())
            .bind(assignment.sequence as i64)
            .bind(assignment.status.as_str())
            .bind(assignment.score)
            .bind(&assignment.explanation)
            .bind(&assignment.rejection_reason)
            .bind(ts(&assignment.created_at))
            .bind(assignment.responded_at.as_ref().map(ts))
            .execute(self.pool())
            .await?;
        Ok(())
    }

    async fn find_latest_for_ticket(&self, ticket_id: Uuid) -> Result<Option<TicketAssignment>> {
        let sql = format!(
            r#"
            SELECT {} FROM ticket_assignments
            WHERE ticket_id = ?
            ORDER BY assignment_sequence DESC
            LIMIT 1
            "#,
            ASSIGNMENT_COLUMNS
        );
        let row: Option<DbTicketAssignment> = sqlx::query_as(&sql)
            .bind(ticket_id.to_string())
            .fetch_optional(self.pool())
            .await?;
        row.map(DbTicketAssignment::into_assignment).transpose()
    }

    async fn list_assignments_for_ticket(&self, ticket_id: Uuid) -> Result<Vec<TicketAssignment>> {
        let sql = format!(
            "SELECT {} FROM ticket_assignments WHERE ticket_id = ? ORDER BY assignment_sequence",
            ASSIGNMENT_COLUMNS
        );
        let rows: Vec<DbTicketAssignment> = sqlx::query_as(&sql)
            .bind(ticket_id.to_string())
            .fetch_all(self.pool())
            .await?;
        rows.into_iter().map(DbTicketAssignment::into_assignment).collect()
    }

    async fn update_assignment_status(
        &self,
        id: Uuid,
        status: AssignmentStatus,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let result = sqlx::query(
            "UPDATE ticket_assignments SET status = ?, responded_at = ? WHERE id = ?",
        )
        .bind(status.as_str())
        .bind(ts(&at))
        .bind(id.to_string())
        .execute(self.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(TicketEngineError::not_found(format!("assignment {}", id)));
        }
        Ok(())
    }

    async fn commit_assignment(&self, commit: &AssignmentCommit) -> Result<CommitOutcome> {
        let assignment = &commit.assignment;
        let ticket_id = assignment.ticket_id.to_string();
        let provider_id = assignment.provider_id.to_string();

        let mut tx = self.pool().begin().await?;

        let ticket_update = sqlx::query(
            r#"
            UPDATE tickets
            SET status = 'ASSIGNED', assigned_at = ?, assigned_service_provider_id = ?
            WHERE id = ? AND status IN ('OPEN', 'REJECTED_BY_TECH')
            "#,
        )
        .bind(ts(&assignment.created_at))
        .bind(&provider_id)
        .bind(&ticket_id)
        .execute(&mut *tx)
        .await?;

        if ticket_update.rows_affected() == 0 {
            tx.rollback().await?;
            return match self.find_ticket(assignment.ticket_id).await? {
                Some(ticket) => {
                    warn!(
                        "Ticket {} is {} and can no longer be assigned",
                        ticket.id, ticket.status
                    );
                    Ok(CommitOutcome::TicketNotRoutable)
                }
                None => Err(TicketEngineError::not_found(format!("ticket {}", ticket_id))),
            };
        }

        // Capacity re-check happens here, under the write lock
        let load_update = sqlx::query(
            r#"
            UPDATE service_providers
            SET current_load = current_load + 1
            WHERE id = ? AND current_load < capacity_per_day
            "#,
        )
        .bind(&provider_id)
        .execute(&mut *tx)
        .await?;

        if load_update.rows_affected() == 0 {
            tx.rollback().await?;
            debug!("Provider {} filled up before commit", provider_id);
            return Ok(CommitOutcome::ProviderAtCapacity);
        }

        sqlx::query(insert_assignment_sql())
            .bind(assignment.id.to_string())
            .bind(&ticket_id)
            .bind(&provider_id)
            .bind(assignment.sequence as i64)
            .bind(assignment.status.as_str())
            .bind(assignment.score)
            .bind(&assignment.explanation)
            .bind(&assignment.rejection_reason)
            .bind(ts(&assignment.created_at))
            .bind(assignment.responded_at.as_ref().map(ts))
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        info!(
            "✅ Ticket {} assigned to provider {} (sequence {})",
            ticket_id, provider_id, assignment.sequence
        );
        Ok(CommitOutcome::Committed)
    }

    async fn commit_rejection(&self, rejection: &RejectionCommit) -> Result<()> {
        let ticket_id = rejection.ticket_id.to_string();
        let provider_id = rejection.provider_id.to_string();

        let mut tx = self.pool().begin().await?;

        let ticket_update = sqlx::query(
            r#"
            UPDATE tickets
            SET status = 'REJECTED_BY_TECH', assigned_service_provider_id = NULL, assigned_at = NULL
            WHERE id = ? AND status = 'ASSIGNED' AND assigned_service_provider_id = ?
            "#,
        )
        .bind(&ticket_id)
        .bind(&provider_id)
        .execute(&mut *tx)
        .await?;

        let assignment_update = sqlx::query(
            r#"
            UPDATE ticket_assignments
            SET status = 'REJECTED', rejection_reason = ?, responded_at = ?
            WHERE id = ? AND service_provider_id = ? AND status IN ('PROPOSED', 'ACCEPTED')
            "#,
        )
        .bind(&rejection.reason)
        .bind(ts(&rejection.rejected_at))
        .bind(rejection.assignment_id.to_string())
        .bind(&provider_id)
        .execute(&mut *tx)
        .await?;

        if ticket_update.rows_affected() == 0 || assignment_update.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(TicketEngineError::invalid_transition(format!(
                "ticket {} is not held by provider {}",
                ticket_id, provider_id
            )));
        }

        sqlx::query(
            "UPDATE service_providers SET current_load = MAX(0, current_load - 1) WHERE id = ?",
        )
        .bind(&provider_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn commit_acceptance(&self, acceptance: &AcceptanceCommit) -> Result<bool> {
        let ticket_id = acceptance.ticket_id.to_string();
        let provider_id = acceptance.provider_id.to_string();
        let accepted_at = ts(&acceptance.accepted_at);

        let mut tx = self.pool().begin().await?;

        let ticket_update = sqlx::query(
            r#"
            UPDATE tickets
            SET status = 'IN_PROGRESS', accepted_at = ?
            WHERE id = ? AND assigned_service_provider_id = ?
              AND accepted_at IS NULL AND status IN ('ASSIGNED', 'ESCALATED')
            "#,
        )
        .bind(&accepted_at)
        .bind(&ticket_id)
        .bind(&provider_id)
        .execute(&mut *tx)
        .await?;

        if ticket_update.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query(
            r#"
            UPDATE ticket_assignments
            SET status = 'ACCEPTED', responded_at = ?
            WHERE ticket_id = ? AND service_provider_id = ? AND status = 'PROPOSED'
            "#,
        )
        .bind(&accepted_at)
        .bind(&ticket_id)
        .bind(&provider_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn commit_completion(&self, completion: &CompletionCommit) -> Result<bool> {
        let ticket_id = completion.ticket_id.to_string();

        let mut tx = self.pool().begin().await?;

        let ticket_update = sqlx::query(
            r#"
            UPDATE tickets
            SET status = 'COMPLETED', completed_at = ?
            WHERE id = ? AND status IN ('IN_PROGRESS', 'ESCALATED')
            "#,
        )
        .bind(ts(&completion.completed_at))
        .bind(&ticket_id)
        .execute(&mut *tx)
        .await?;

        if ticket_update.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query(
            r#"
            UPDATE service_providers
            SET current_load = MAX(0, current_load - 1)
            WHERE id = (SELECT assigned_service_provider_id FROM tickets WHERE id = ?)
            "#,
        )
        .bind(&ticket_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        debug!("Ticket {} completed, provider load released", ticket_id);
        Ok(true)
    }
}
