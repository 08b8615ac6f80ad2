use std::sync::Arc;

use backoffice_core::audit::{AuditCategory, AuditContext, AuditSink};
use backoffice_core::clock::Clock;
use backoffice_core::domain::category::{Category, CategoryId, SlaTargets};
use backoffice_core::errors::{ApplicationError, DomainError};

use super::{AuditRecorder, EntityLocks};
use crate::repositories::{CategoryRepository, TicketRepository};

/// Partial edit of a category. `None` leaves the field unchanged.
#[derive(Clone, Debug, Default)]
pub struct CategoryUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub subcategories: Option<Vec<String>>,
    pub sla: Option<SlaTargets>,
}

pub struct CategoryService {
    categories: Arc<dyn CategoryRepository>,
    tickets: Arc<dyn TicketRepository>,
    clock: Arc<dyn Clock>,
    recorder: AuditRecorder,
    locks: EntityLocks,
}

impl CategoryService {
    pub fn new(
        categories: Arc<dyn CategoryRepository>,
        tickets: Arc<dyn TicketRepository>,
        clock: Arc<dyn Clock>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            categories,
            tickets,
            clock,
            recorder: AuditRecorder::new(audit, AuditCategory::Catalog),
            locks: EntityLocks::default(),
        }
    }

    /// Locks keyed by category id. Ticket opening takes the same lock.
    pub(crate) fn locks(&self) -> &EntityLocks {
        &self.locks
    }

    pub async fn create(
        &self,
        context: &AuditContext,
        category: Category,
    ) -> Result<Category, ApplicationError> {
        let _guard = self.locks.acquire(&category.id.0).await;
        let now = self.clock.now();
        let entity_ref = category.id.0.clone();

        let result: Result<Category, ApplicationError> = async {
            category.validate()?;
            if self.categories.find_by_id(&category.id).await?.is_some() {
                return Err(DomainError::InvalidState(format!(
                    "category `{}` already exists",
                    category.id.0
                ))
                .into());
            }
            self.categories.save(category.clone()).await?;
            Ok(category)
        }
        .await;

        match &result {
            Ok(category) => self.recorder.success(
                context,
                &entity_ref,
                "category.created",
                now,
                vec![
                    ("response_hours", category.sla.response_hours.to_string()),
                    ("resolution_hours", category.sla.resolution_hours.to_string()),
                ],
            ),
            Err(error) => {
                self.recorder.failure(context, &entity_ref, "category.created", now, error)
            }
        }
        result
    }

    /// Edits apply to tickets opened afterwards; existing tickets keep their SLA snapshot.
    pub async fn update(
        &self,
        context: &AuditContext,
        id: &CategoryId,
        update: CategoryUpdate,
    ) -> Result<Category, ApplicationError> {
        self.mutate(context, id, "category.updated", move |category| {
            if let Some(name) = update.name {
                category.name = name;
            }
            if let Some(description) = update.description {
                category.description = Some(description).filter(|text| !text.trim().is_empty());
            }
            if let Some(subcategories) = update.subcategories {
                category.subcategories = subcategories;
            }
            if let Some(sla) = update.sla {
                category.sla = sla;
            }
            Ok(())
        })
        .await
    }

    pub async fn deactivate(
        &self,
        context: &AuditContext,
        id: &CategoryId,
    ) -> Result<Category, ApplicationError> {
        self.mutate(context, id, "category.deactivated", |category| {
            if !category.active {
                return Err(DomainError::InvalidState(format!(
                    "category `{}` is already inactive",
                    category.id.0
                )));
            }
            category.active = false;
            Ok(())
        })
        .await
    }

    pub async fn activate(
        &self,
        context: &AuditContext,
        id: &CategoryId,
    ) -> Result<Category, ApplicationError> {
        self.mutate(context, id, "category.activated", |category| {
            category.active = true;
            Ok(())
        })
        .await
    }

    pub async fn delete(
        &self,
        context: &AuditContext,
        id: &CategoryId,
    ) -> Result<(), ApplicationError> {
        let _guard = self.locks.acquire(&id.0).await;
        let now = self.clock.now();

        let result: Result<(), ApplicationError> = async {
            let ticket_count = self.tickets.count_by_category(id).await?;
            if ticket_count > 0 {
                return Err(DomainError::CategoryInUse { category_id: id.0.clone(), ticket_count }
                    .into());
            }
            if !self.categories.delete(id).await? {
                return Err(DomainError::NotFound { entity: "category", id: id.0.clone() }.into());
            }
            Ok(())
        }
        .await;

        match &result {
            Ok(()) => self.recorder.success(context, &id.0, "category.deleted", now, Vec::new()),
            Err(error) => self.recorder.failure(context, &id.0, "category.deleted", now, error),
        }
        result
    }

    pub async fn get(&self, id: &CategoryId) -> Result<Category, ApplicationError> {
        self.categories.find_by_id(id).await?.ok_or_else(|| {
            DomainError::NotFound { entity: "category", id: id.0.clone() }.into()
        })
    }

    pub async fn list(&self, active_only: bool) -> Result<Vec<Category>, ApplicationError> {
        Ok(self.categories.list(&|category: &Category| !active_only || category.active).await?)
    }

    async fn mutate(
        &self,
        context: &AuditContext,
        id: &CategoryId,
        event_type: &'static str,
        apply: impl FnOnce(&mut Category) -> Result<(), DomainError> + Send,
    ) -> Result<Category, ApplicationError> {
        let _guard = self.locks.acquire(&id.0).await;
        let now = self.clock.now();

        let result: Result<Category, ApplicationError> = async {
            let mut working = self.get(id).await?;
            apply(&mut working)?;
            working.validate()?;
            self.categories.save(working.clone()).await?;
            Ok(working)
        }
        .await;

        match &result {
            Ok(category) => self.recorder.success(
                context,
                &id.0,
                event_type,
                now,
                vec![("active", category.active.to_string())],
            ),
            Err(error) => self.recorder.failure(context, &id.0, event_type, now, error),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{TimeZone, Utc};

    use backoffice_core::audit::{AuditContext, AuditOutcome, InMemoryAuditSink};
    use backoffice_core::clock::ManualClock;
    use backoffice_core::config::AppConfig;
    use backoffice_core::domain::category::{Category, CategoryId, SlaTargets};
    use backoffice_core::domain::priority::Priority;
    use backoffice_core::domain::ticket::{Requester, TicketType};
    use backoffice_core::errors::{ApplicationError, DomainError};
    use backoffice_core::tickets::NewTicket;

    use super::CategoryUpdate;
    use crate::services::Services;

    fn setup() -> (Services, InMemoryAuditSink) {
        let clock = ManualClock::new(
            Utc.with_ymd_and_hms(2026, 3, 9, 8, 0, 0).single().expect("valid instant"),
        );
        let audit = InMemoryAuditSink::default();
        let services =
            Services::in_memory(&AppConfig::default(), Arc::new(clock), Arc::new(audit.clone()));
        (services, audit)
    }

    fn context() -> AuditContext {
        AuditContext::new("req-cat", "admin@example.com")
    }

    fn network() -> Category {
        Category {
            id: CategoryId("network".to_string()),
            name: "Network".to_string(),
            description: None,
            subcategories: vec!["VPN".to_string()],
            sla: SlaTargets::new(4, 48),
            active: true,
        }
    }

    #[tokio::test]
    async fn create_rejects_duplicates_and_audits_both_outcomes() {
        let (services, audit) = setup();

        services.categories.create(&context(), network()).await.expect("create");
        let error =
            services.categories.create(&context(), network()).await.expect_err("duplicate id");

        assert!(matches!(error, ApplicationError::Domain(DomainError::InvalidState(_))));
        let events = audit.events_of_type("category.created");
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].outcome, AuditOutcome::Success);
        assert_eq!(events[1].outcome, AuditOutcome::Rejected);
    }

    #[tokio::test]
    async fn update_changes_targets_and_validates() {
        let (services, _) = setup();
        services.categories.create(&context(), network()).await.expect("create");

        let updated = services
            .categories
            .update(
                &context(),
                &CategoryId("network".to_string()),
                CategoryUpdate { sla: Some(SlaTargets::new(2, 24)), ..CategoryUpdate::default() },
            )
            .await
            .expect("update");
        assert_eq!(updated.sla, SlaTargets::new(2, 24));

        let error = services
            .categories
            .update(
                &context(),
                &CategoryId("network".to_string()),
                CategoryUpdate { sla: Some(SlaTargets::new(0, 24)), ..CategoryUpdate::default() },
            )
            .await
            .expect_err("zero hours are invalid");
        assert!(matches!(error, ApplicationError::Domain(DomainError::InvariantViolation(_))));
        assert_eq!(
            services.categories.get(&CategoryId("network".to_string())).await.expect("get").sla,
            SlaTargets::new(2, 24)
        );
    }

    #[tokio::test]
    async fn create_refuses_targets_beyond_the_hour_limit() {
        let (services, _) = setup();
        let mut unbounded = network();
        unbounded.sla = SlaTargets::new(4, u32::MAX);

        let error =
            services.categories.create(&context(), unbounded).await.expect_err("too many hours");

        assert!(matches!(error, ApplicationError::Domain(DomainError::InvariantViolation(_))));
        assert!(services.categories.get(&CategoryId("network".to_string())).await.is_err());
    }

    #[tokio::test]
    async fn delete_is_refused_while_tickets_reference_the_category() {
        let (services, _) = setup();
        services.categories.create(&context(), network()).await.expect("create");
        services
            .tickets
            .open(
                &context(),
                NewTicket {
                    title: "VPN drops every hour".to_string(),
                    description: String::new(),
                    ticket_type: TicketType::Incident,
                    category_id: CategoryId("network".to_string()),
                    subcategory: None,
                    priority: Priority::Normal,
                    requester: Requester {
                        name: "Rui".to_string(),
                        email: "rui@example.com".to_string(),
                        phone: None,
                    },
                },
            )
            .await
            .expect("open ticket");

        let error = services
            .categories
            .delete(&context(), &CategoryId("network".to_string()))
            .await
            .expect_err("category in use");

        assert_eq!(
            error,
            ApplicationError::Domain(DomainError::CategoryInUse {
                category_id: "network".to_string(),
                ticket_count: 1,
            })
        );
    }

    #[tokio::test]
    async fn unused_category_can_be_deleted_once() {
        let (services, _) = setup();
        services.categories.create(&context(), network()).await.expect("create");

        services.categories.delete(&context(), &CategoryId("network".to_string())).await.expect("delete");
        let error = services
            .categories
            .delete(&context(), &CategoryId("network".to_string()))
            .await
            .expect_err("already gone");

        assert!(matches!(error, ApplicationError::Domain(DomainError::NotFound { .. })));
    }

    #[tokio::test]
    async fn deactivated_categories_are_filtered_from_active_listing() {
        let (services, _) = setup();
        services.categories.create(&context(), network()).await.expect("create");

        services
            .categories
            .deactivate(&context(), &CategoryId("network".to_string()))
            .await
            .expect("deactivate");

        assert!(services.categories.list(true).await.expect("list").is_empty());
        assert_eq!(services.categories.list(false).await.expect("list").len(), 1);
    }
}
