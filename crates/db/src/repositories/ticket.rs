use chrono::{DateTime, Utc};
use sqlx::Row;

use backoffice_core::domain::category::CategoryId;
use backoffice_core::domain::ticket::{Ticket, TicketId, TicketStatus};

use super::{
    decode_payload, encode_payload, number_column, timestamp_column, Predicate, RepositoryError,
    TicketRepository,
};
use crate::DbPool;

pub struct SqlTicketRepository {
    pool: DbPool,
}

impl SqlTicketRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn clock_stopping_statuses() -> [&'static str; 3] {
    [
        TicketStatus::Resolved.as_str(),
        TicketStatus::Closed.as_str(),
        TicketStatus::Cancelled.as_str(),
    ]
}

#[async_trait::async_trait]
impl TicketRepository for SqlTicketRepository {
    async fn find_by_id(&self, id: &TicketId) -> Result<Option<Ticket>, RepositoryError> {
        let row = sqlx::query("SELECT payload_json FROM ticket WHERE id = ?")
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(decode_payload).transpose()
    }

    async fn find_by_number(&self, number: u64) -> Result<Option<Ticket>, RepositoryError> {
        let row = sqlx::query("SELECT payload_json FROM ticket WHERE number = ?")
            .bind(number_column(number)?)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(decode_payload).transpose()
    }

    async fn save(&self, ticket: Ticket) -> Result<(), RepositoryError> {
        let payload = encode_payload(&ticket)?;

        sqlx::query(
            "INSERT INTO ticket (id, number, category_id, status, priority, resolution_deadline,
                                 payload_json, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 category_id = excluded.category_id,
                 status = excluded.status,
                 priority = excluded.priority,
                 resolution_deadline = excluded.resolution_deadline,
                 payload_json = excluded.payload_json,
                 updated_at = excluded.updated_at",
        )
        .bind(&ticket.id.0)
        .bind(number_column(ticket.number)?)
        .bind(&ticket.category_id.0)
        .bind(ticket.status().as_str())
        .bind(ticket.priority.as_str())
        .bind(timestamp_column(ticket.sla().resolution_deadline))
        .bind(payload)
        .bind(timestamp_column(ticket.timestamps().created_at))
        .bind(timestamp_column(ticket.timestamps().updated_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list(&self, predicate: Predicate<'_, Ticket>) -> Result<Vec<Ticket>, RepositoryError> {
        let rows = sqlx::query("SELECT payload_json FROM ticket ORDER BY number ASC")
            .fetch_all(&self.pool)
            .await?;

        let mut tickets = Vec::with_capacity(rows.len());
        for row in &rows {
            let ticket: Ticket = decode_payload(row)?;
            if predicate(&ticket) {
                tickets.push(ticket);
            }
        }
        Ok(tickets)
    }

    async fn list_past_resolution_deadline(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<Ticket>, RepositoryError> {
        let [resolved, closed, cancelled] = clock_stopping_statuses();
        let rows = sqlx::query(
            "SELECT payload_json FROM ticket
             WHERE resolution_deadline < ? AND status NOT IN (?, ?, ?)
             ORDER BY resolution_deadline ASC, number ASC",
        )
        .bind(timestamp_column(now))
        .bind(resolved)
        .bind(closed)
        .bind(cancelled)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(decode_payload).collect()
    }

    async fn count_by_category(&self, category_id: &CategoryId) -> Result<usize, RepositoryError> {
        let count: i64 =
            sqlx::query("SELECT COUNT(*) AS count FROM ticket WHERE category_id = ?")
                .bind(&category_id.0)
                .fetch_one(&self.pool)
                .await?
                .try_get("count")
                .map_err(|e| RepositoryError::Decode(e.to_string()))?;
        usize::try_from(count).map_err(|e| RepositoryError::Decode(e.to_string()))
    }

    async fn max_number(&self) -> Result<Option<u64>, RepositoryError> {
        let max: Option<i64> = sqlx::query("SELECT MAX(number) AS max_number FROM ticket")
            .fetch_one(&self.pool)
            .await?
            .try_get("max_number")
            .map_err(|e| RepositoryError::Decode(e.to_string()))?;
        max.map(|value| u64::try_from(value).map_err(|e| RepositoryError::Decode(e.to_string())))
            .transpose()
    }
}
