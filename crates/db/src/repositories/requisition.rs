use sqlx::Row;

use backoffice_core::domain::requisition::{Requisition, RequisitionId};

use super::{
    decode_payload, encode_payload, number_column, timestamp_column, Predicate, RepositoryError,
    RequisitionRepository,
};
use crate::DbPool;

pub struct SqlRequisitionRepository {
    pool: DbPool,
}

impl SqlRequisitionRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl RequisitionRepository for SqlRequisitionRepository {
    async fn find_by_id(
        &self,
        id: &RequisitionId,
    ) -> Result<Option<Requisition>, RepositoryError> {
        let row = sqlx::query("SELECT payload_json FROM requisition WHERE id = ?")
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(decode_payload).transpose()
    }

    async fn find_by_reference(
        &self,
        reference: &str,
    ) -> Result<Option<Requisition>, RepositoryError> {
        let row = sqlx::query("SELECT payload_json FROM requisition WHERE reference = ?")
            .bind(reference)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(decode_payload).transpose()
    }

    async fn save(&self, requisition: Requisition) -> Result<(), RepositoryError> {
        let payload = encode_payload(&requisition)?;

        sqlx::query(
            "INSERT INTO requisition (id, number, reference, status, requester, department,
                                      total_value, payload_json, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 status = excluded.status,
                 requester = excluded.requester,
                 department = excluded.department,
                 total_value = excluded.total_value,
                 payload_json = excluded.payload_json,
                 updated_at = excluded.updated_at",
        )
        .bind(&requisition.id.0)
        .bind(number_column(requisition.number)?)
        .bind(&requisition.reference)
        .bind(requisition.status().as_str())
        .bind(&requisition.requester)
        .bind(&requisition.department)
        .bind(requisition.total_value().to_string())
        .bind(payload)
        .bind(timestamp_column(requisition.created_at))
        .bind(timestamp_column(requisition.updated_at()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list(
        &self,
        predicate: Predicate<'_, Requisition>,
    ) -> Result<Vec<Requisition>, RepositoryError> {
        let rows = sqlx::query("SELECT payload_json FROM requisition ORDER BY number ASC")
            .fetch_all(&self.pool)
            .await?;

        let mut requisitions = Vec::with_capacity(rows.len());
        for row in &rows {
            let requisition: Requisition = decode_payload(row)?;
            if predicate(&requisition) {
                requisitions.push(requisition);
            }
        }
        Ok(requisitions)
    }

    async fn max_number(&self) -> Result<Option<u64>, RepositoryError> {
        let max: Option<i64> = sqlx::query("SELECT MAX(number) AS max_number FROM requisition")
            .fetch_one(&self.pool)
            .await?
            .try_get("max_number")
            .map_err(|e| RepositoryError::Decode(e.to_string()))?;
        max.map(|value| u64::try_from(value).map_err(|e| RepositoryError::Decode(e.to_string())))
            .transpose()
    }
}
