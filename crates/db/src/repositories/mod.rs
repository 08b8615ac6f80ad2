use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use thiserror::Error;

use backoffice_core::domain::category::{Category, CategoryId};
use backoffice_core::domain::requisition::{Requisition, RequisitionId};
use backoffice_core::domain::ticket::{Ticket, TicketId};
use backoffice_core::errors::ApplicationError;

pub mod category;
pub mod memory;
pub mod requisition;
pub mod ticket;

pub use category::SqlCategoryRepository;
pub use memory::{
    InMemoryCategoryRepository, InMemoryRequisitionRepository, InMemoryTicketRepository,
};
pub use requisition::SqlRequisitionRepository;
pub use ticket::SqlTicketRepository;

/// Borrowed filter passed to `list` calls.
pub type Predicate<'a, T> = &'a (dyn Fn(&T) -> bool + Send + Sync);

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("encode error: {0}")]
    Encode(String),
}

impl From<RepositoryError> for ApplicationError {
    fn from(error: RepositoryError) -> Self {
        ApplicationError::Persistence(error.to_string())
    }
}

#[async_trait]
pub trait CategoryRepository: Send + Sync {
    async fn find_by_id(&self, id: &CategoryId) -> Result<Option<Category>, RepositoryError>;
    async fn save(&self, category: Category) -> Result<(), RepositoryError>;
    async fn delete(&self, id: &CategoryId) -> Result<bool, RepositoryError>;
    async fn list(
        &self,
        predicate: Predicate<'_, Category>,
    ) -> Result<Vec<Category>, RepositoryError>;
}

#[async_trait]
pub trait TicketRepository: Send + Sync {
    async fn find_by_id(&self, id: &TicketId) -> Result<Option<Ticket>, RepositoryError>;
    async fn find_by_number(&self, number: u64) -> Result<Option<Ticket>, RepositoryError>;
    async fn save(&self, ticket: Ticket) -> Result<(), RepositoryError>;
    async fn list(&self, predicate: Predicate<'_, Ticket>) -> Result<Vec<Ticket>, RepositoryError>;

    /// Tickets whose resolution deadline is before `now` and whose SLA clock is still running.
    async fn list_past_resolution_deadline(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<Ticket>, RepositoryError>;

    async fn count_by_category(&self, category_id: &CategoryId) -> Result<usize, RepositoryError>;
    async fn max_number(&self) -> Result<Option<u64>, RepositoryError>;

    /// Next sequential ticket number, never below `start`.
    async fn next_number(&self, start: u64) -> Result<u64, RepositoryError> {
        let next = self.max_number().await?.map(|max| max + 1).unwrap_or(start);
        Ok(next.max(start))
    }
}

#[async_trait]
pub trait RequisitionRepository: Send + Sync {
    async fn find_by_id(&self, id: &RequisitionId)
        -> Result<Option<Requisition>, RepositoryError>;
    async fn find_by_reference(
        &self,
        reference: &str,
    ) -> Result<Option<Requisition>, RepositoryError>;
    async fn save(&self, requisition: Requisition) -> Result<(), RepositoryError>;
    async fn list(
        &self,
        predicate: Predicate<'_, Requisition>,
    ) -> Result<Vec<Requisition>, RepositoryError>;
    async fn max_number(&self) -> Result<Option<u64>, RepositoryError>;
}

/// Fixed-width UTC timestamps so indexed text columns sort chronologically.
pub(crate) fn timestamp_column(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn encode_payload<T: serde::Serialize>(value: &T) -> Result<String, RepositoryError> {
    serde_json::to_string(value).map_err(|error| RepositoryError::Encode(error.to_string()))
}

pub(crate) fn decode_payload<T: serde::de::DeserializeOwned>(
    row: &sqlx::sqlite::SqliteRow,
) -> Result<T, RepositoryError> {
    use sqlx::Row;

    let payload: String =
        row.try_get("payload_json").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    serde_json::from_str(&payload).map_err(|e| RepositoryError::Decode(e.to_string()))
}

pub(crate) fn number_column(value: u64) -> Result<i64, RepositoryError> {
    i64::try_from(value)
        .map_err(|_| RepositoryError::Encode(format!("number {value} exceeds storage range")))
}
