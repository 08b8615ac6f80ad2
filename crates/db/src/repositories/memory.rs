use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use backoffice_core::domain::category::{Category, CategoryId};
use backoffice_core::domain::requisition::{Requisition, RequisitionId};
use backoffice_core::domain::ticket::{Ticket, TicketId};

use super::{
    CategoryRepository, Predicate, RepositoryError, RequisitionRepository, TicketRepository,
};

#[derive(Default)]
pub struct InMemoryCategoryRepository {
    categories: RwLock<HashMap<String, Category>>,
}

#[async_trait::async_trait]
impl CategoryRepository for InMemoryCategoryRepository {
    async fn find_by_id(&self, id: &CategoryId) -> Result<Option<Category>, RepositoryError> {
        let categories = self.categories.read().await;
        Ok(categories.get(&id.0).cloned())
    }

    async fn save(&self, category: Category) -> Result<(), RepositoryError> {
        let mut categories = self.categories.write().await;
        categories.insert(category.id.0.clone(), category);
        Ok(())
    }

    async fn delete(&self, id: &CategoryId) -> Result<bool, RepositoryError> {
        let mut categories = self.categories.write().await;
        Ok(categories.remove(&id.0).is_some())
    }

    async fn list(
        &self,
        predicate: Predicate<'_, Category>,
    ) -> Result<Vec<Category>, RepositoryError> {
        let categories = self.categories.read().await;
        let mut matched: Vec<Category> =
            categories.values().filter(|category| predicate(category)).cloned().collect();
        matched.sort_by(|left, right| left.id.cmp(&right.id));
        Ok(matched)
    }
}

#[derive(Default)]
pub struct InMemoryTicketRepository {
    tickets: RwLock<HashMap<String, Ticket>>,
}

#[async_trait::async_trait]
impl TicketRepository for InMemoryTicketRepository {
    async fn find_by_id(&self, id: &TicketId) -> Result<Option<Ticket>, RepositoryError> {
        let tickets = self.tickets.read().await;
        Ok(tickets.get(&id.0).cloned())
    }

    async fn find_by_number(&self, number: u64) -> Result<Option<Ticket>, RepositoryError> {
        let tickets = self.tickets.read().await;
        Ok(tickets.values().find(|ticket| ticket.number == number).cloned())
    }

    async fn save(&self, ticket: Ticket) -> Result<(), RepositoryError> {
        let mut tickets = self.tickets.write().await;
        tickets.insert(ticket.id.0.clone(), ticket);
        Ok(())
    }

    async fn list(&self, predicate: Predicate<'_, Ticket>) -> Result<Vec<Ticket>, RepositoryError> {
        let tickets = self.tickets.read().await;
        let mut matched: Vec<Ticket> =
            tickets.values().filter(|ticket| predicate(ticket)).cloned().collect();
        matched.sort_by_key(|ticket| ticket.number);
        Ok(matched)
    }

    async fn list_past_resolution_deadline(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<Ticket>, RepositoryError> {
        self.list(&|ticket: &Ticket| ticket.is_breached(now)).await
    }

    async fn count_by_category(&self, category_id: &CategoryId) -> Result<usize, RepositoryError> {
        let tickets = self.tickets.read().await;
        Ok(tickets.values().filter(|ticket| &ticket.category_id == category_id).count())
    }

    async fn max_number(&self) -> Result<Option<u64>, RepositoryError> {
        let tickets = self.tickets.read().await;
        Ok(tickets.values().map(|ticket| ticket.number).max())
    }
}

#[derive(Default)]
pub struct InMemoryRequisitionRepository {
    requisitions: RwLock<HashMap<String, Requisition>>,
}

#[async_trait::async_trait]
impl RequisitionRepository for InMemoryRequisitionRepository {
    async fn find_by_id(
        &self,
        id: &RequisitionId,
    ) -> Result<Option<Requisition>, RepositoryError> {
        let requisitions = self.requisitions.read().await;
        Ok(requisitions.get(&id.0).cloned())
    }

    async fn find_by_reference(
        &self,
        reference: &str,
    ) -> Result<Option<Requisition>, RepositoryError> {
        let requisitions = self.requisitions.read().await;
        Ok(requisitions.values().find(|requisition| requisition.reference == reference).cloned())
    }

    async fn save(&self, requisition: Requisition) -> Result<(), RepositoryError> {
        let mut requisitions = self.requisitions.write().await;
        requisitions.insert(requisition.id.0.clone(), requisition);
        Ok(())
    }

    async fn list(
        &self,
        predicate: Predicate<'_, Requisition>,
    ) -> Result<Vec<Requisition>, RepositoryError> {
        let requisitions = self.requisitions.read().await;
        let mut matched: Vec<Requisition> = requisitions
            .values()
            .filter(|requisition| predicate(requisition))
            .cloned()
            .collect();
        matched.sort_by_key(|requisition| requisition.number);
        Ok(matched)
    }

    async fn max_number(&self) -> Result<Option<u64>, RepositoryError> {
        let requisitions = self.requisitions.read().await;
        Ok(requisitions.values().map(|requisition| requisition.number).max())
    }
}
