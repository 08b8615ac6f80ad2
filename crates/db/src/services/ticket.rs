use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use backoffice_core::audit::{AuditCategory, AuditContext, AuditSink};
use backoffice_core::clock::Clock;
use backoffice_core::config::AppConfig;
use backoffice_core::domain::category::SlaTargets;
use backoffice_core::domain::priority::Priority;
use backoffice_core::domain::ticket::{
    ActivityId, Ticket, TicketId, TicketStatus, TicketView, Visibility,
};
use backoffice_core::errors::{ApplicationError, DomainError};
use backoffice_core::sla::SlaCatalog;
use backoffice_core::tickets::{NewTicket, TicketLifecycle, TransitionOutcome};

use super::{AuditRecorder, EntityLocks};
use crate::repositories::{CategoryRepository, Predicate, TicketRepository};

#[derive(Clone, Debug)]
pub struct TicketSettings {
    pub number_start: u64,
    pub allow_reopen: bool,
    pub priority_overrides: BTreeMap<Priority, SlaTargets>,
}

impl Default for TicketSettings {
    fn default() -> Self {
        Self { number_start: 1, allow_reopen: true, priority_overrides: BTreeMap::new() }
    }
}

impl TicketSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            number_start: config.tickets.number_start,
            allow_reopen: config.tickets.allow_reopen,
            priority_overrides: config.sla.priority_overrides.clone(),
        }
    }
}

pub struct TicketService {
    tickets: Arc<dyn TicketRepository>,
    categories: Arc<dyn CategoryRepository>,
    lifecycle: TicketLifecycle,
    settings: TicketSettings,
    clock: Arc<dyn Clock>,
    recorder: AuditRecorder,
    locks: EntityLocks,
    category_locks: EntityLocks,
    numbering: Mutex<()>,
}

impl TicketService {
    pub fn new(
        tickets: Arc<dyn TicketRepository>,
        categories: Arc<dyn CategoryRepository>,
        settings: TicketSettings,
        clock: Arc<dyn Clock>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            tickets,
            categories,
            lifecycle: TicketLifecycle::new(settings.allow_reopen),
            settings,
            clock,
            recorder: AuditRecorder::new(audit, AuditCategory::Ticket),
            locks: EntityLocks::default(),
            category_locks: EntityLocks::default(),
            numbering: Mutex::new(()),
        }
    }

    /// Shares the category locks so a category cannot be deleted while a ticket is opened on it.
    pub fn with_category_locks(mut self, category_locks: EntityLocks) -> Self {
        self.category_locks = category_locks;
        self
    }

    /// Opens a ticket with the next sequential number and an SLA snapshot taken now.
    pub async fn open(
        &self,
        context: &AuditContext,
        draft: NewTicket,
    ) -> Result<Ticket, ApplicationError> {
        let _numbering = self.numbering.lock().await;
        let _category = self.category_locks.acquire(&draft.category_id.0).await;
        let now = self.clock.now();
        let category_ref = draft.category_id.0.clone();

        let result: Result<Ticket, ApplicationError> = async {
            let category = self.categories.find_by_id(&draft.category_id).await?;
            let catalog =
                SlaCatalog::new(category.into_iter().collect(), self.settings.priority_overrides.clone());
            let number = self.tickets.next_number(self.settings.number_start).await?;
            let ticket = self.lifecycle.open(
                &catalog,
                TicketId(Uuid::new_v4().to_string()),
                number,
                draft,
                now,
            )?;
            self.tickets.save(ticket.clone()).await?;
            Ok(ticket)
        }
        .await;

        match &result {
            Ok(ticket) => self.recorder.success(
                context,
                &ticket_ref(ticket),
                "ticket.opened",
                now,
                vec![
                    ("category_id", ticket.category_id.0.clone()),
                    ("priority", ticket.priority.to_string()),
                    ("resolution_deadline", ticket.sla().resolution_deadline.to_rfc3339()),
                ],
            ),
            Err(error) => {
                self.recorder.failure(context, &category_ref, "ticket.opened", now, error)
            }
        }
        result
    }

    pub async fn transition(
        &self,
        context: &AuditContext,
        id: &TicketId,
        to: TicketStatus,
        comment: Option<String>,
    ) -> Result<TransitionOutcome, ApplicationError> {
        let actor = context.actor.clone();
        let (_, outcome) = self
            .mutate(context, id, "ticket.status_changed", move |lifecycle, ticket, now| {
                let outcome = lifecycle.transition(ticket, to, &actor, comment.as_deref(), now)?;
                let metadata = vec![
                    ("from", outcome.from.to_string()),
                    ("to", outcome.to.to_string()),
                    ("reopened", outcome.reopened.to_string()),
                ];
                Ok((outcome, metadata))
            })
            .await?;
        Ok(outcome)
    }

    pub async fn comment(
        &self,
        context: &AuditContext,
        id: &TicketId,
        body: &str,
        visibility: Visibility,
    ) -> Result<ActivityId, ApplicationError> {
        let author = context.actor.clone();
        let (_, activity_id) = self
            .mutate(context, id, "ticket.commented", move |lifecycle, ticket, now| {
                let activity_id = lifecycle.comment(ticket, &author, body, visibility, now)?;
                let metadata = vec![
                    ("visibility", format!("{visibility:?}").to_lowercase()),
                    ("activity_id", activity_id.0.clone()),
                ];
                Ok((activity_id, metadata))
            })
            .await?;
        Ok(activity_id)
    }

    pub async fn rate(
        &self,
        context: &AuditContext,
        id: &TicketId,
        score: u8,
        comment: Option<String>,
    ) -> Result<(), ApplicationError> {
        self.mutate(context, id, "ticket.rated", move |lifecycle, ticket, now| {
            lifecycle.rate(ticket, score, comment, now)?;
            Ok(((), vec![("score", score.to_string())]))
        })
        .await?;
        Ok(())
    }

    pub async fn get(&self, id: &TicketId) -> Result<TicketView, ApplicationError> {
        let ticket = self.load(id).await?;
        Ok(TicketView::at(ticket, self.clock.now()))
    }

    pub async fn get_by_number(&self, number: u64) -> Result<TicketView, ApplicationError> {
        let ticket = self.tickets.find_by_number(number).await?.ok_or_else(|| {
            DomainError::NotFound { entity: "ticket", id: format!("#{number}") }
        })?;
        Ok(TicketView::at(ticket, self.clock.now()))
    }

    pub async fn list(
        &self,
        predicate: Predicate<'_, Ticket>,
    ) -> Result<Vec<TicketView>, ApplicationError> {
        let now = self.clock.now();
        let tickets = self.tickets.list(predicate).await?;
        Ok(tickets.into_iter().map(|ticket| TicketView::at(ticket, now)).collect())
    }

    /// Tickets past their resolution deadline whose SLA clock is still running, evaluated now.
    pub async fn list_breached(&self) -> Result<Vec<TicketView>, ApplicationError> {
        let now = self.clock.now();
        let tickets = self.tickets.list_past_resolution_deadline(now).await?;
        Ok(tickets
            .into_iter()
            .map(|ticket| TicketView::at(ticket, now))
            .filter(|view| view.breached)
            .collect())
    }

    async fn load(&self, id: &TicketId) -> Result<Ticket, ApplicationError> {
        self.tickets
            .find_by_id(id)
            .await?
            .ok_or_else(|| DomainError::NotFound { entity: "ticket", id: id.0.clone() }.into())
    }

    async fn mutate<T>(
        &self,
        context: &AuditContext,
        id: &TicketId,
        event_type: &'static str,
        apply: impl FnOnce(
                &TicketLifecycle,
                &mut Ticket,
                DateTime<Utc>,
            ) -> Result<(T, Vec<(&'static str, String)>), DomainError>
            + Send,
    ) -> Result<(Ticket, T), ApplicationError>
    where
        T: Send,
    {
        let _guard = self.locks.acquire(&id.0).await;
        let now = self.clock.now();

        let result: Result<(Ticket, T, Vec<(&'static str, String)>), ApplicationError> = async {
            let mut working = self.load(id).await?;
            let (value, metadata) = apply(&self.lifecycle, &mut working, now)?;
            self.tickets.save(working.clone()).await?;
            Ok((working, value, metadata))
        }
        .await;

        match result {
            Ok((ticket, value, mut metadata)) => {
                metadata.push(("status", ticket.status().to_string()));
                self.recorder.success(context, &ticket_ref(&ticket), event_type, now, metadata);
                Ok((ticket, value))
            }
            Err(error) => {
                self.recorder.failure(context, &id.0, event_type, now, &error);
                Err(error)
            }
        }
    }
}

fn ticket_ref(ticket: &Ticket) -> String {
    format!("#{}", ticket.number)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{DateTime, Duration, TimeZone, Utc};

    use backoffice_core::audit::{AuditContext, AuditOutcome, InMemoryAuditSink};
    use backoffice_core::clock::ManualClock;
    use backoffice_core::config::AppConfig;
    use backoffice_core::domain::category::{Category, CategoryId, SlaTargets};
    use backoffice_core::domain::priority::Priority;
    use backoffice_core::domain::ticket::{
        Requester, Ticket, TicketStatus, TicketType, Visibility,
    };
    use backoffice_core::errors::{ApplicationError, DomainError};
    use backoffice_core::tickets::NewTicket;

    use crate::services::{CategoryUpdate, Services};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 9, 8, 0, 0).single().expect("valid instant")
    }

    fn agent() -> AuditContext {
        AuditContext::new("req-tkt", "agent@example.com")
    }

    fn requester() -> AuditContext {
        AuditContext::new("req-tkt", "ana@example.com")
    }

    async fn setup(config: AppConfig) -> (Services, ManualClock, InMemoryAuditSink) {
        let clock = ManualClock::new(t0());
        let audit = InMemoryAuditSink::default();
        let services =
            Services::in_memory(&config, Arc::new(clock.clone()), Arc::new(audit.clone()));
        services
            .categories
            .create(
                &agent(),
                Category {
                    id: CategoryId("hardware".to_string()),
                    name: "Hardware".to_string(),
                    description: None,
                    subcategories: vec!["Printer".to_string(), "Laptop".to_string()],
                    sla: SlaTargets::new(4, 48),
                    active: true,
                },
            )
            .await
            .expect("create category");
        (services, clock, audit)
    }

    fn draft(priority: Priority) -> NewTicket {
        NewTicket {
            title: "Printer offline".to_string(),
            description: "Floor 3 printer does not respond".to_string(),
            ticket_type: TicketType::Incident,
            category_id: CategoryId("hardware".to_string()),
            subcategory: Some("Printer".to_string()),
            priority,
            requester: Requester {
                name: "Ana".to_string(),
                email: "ana@example.com".to_string(),
                phone: None,
            },
        }
    }

    #[tokio::test]
    async fn open_assigns_sequential_numbers_and_deadlines() {
        let (services, _, audit) = setup(AppConfig::default()).await;

        let first = services.tickets.open(&requester(), draft(Priority::Normal)).await.expect("open");
        let second = services.tickets.open(&requester(), draft(Priority::Low)).await.expect("open");

        assert_eq!((first.number, second.number), (1, 2));
        assert_eq!(first.status(), TicketStatus::Open);
        assert_eq!(first.sla().response_deadline, t0() + Duration::hours(4));
        assert_eq!(first.sla().resolution_deadline, t0() + Duration::hours(48));
        assert_eq!(audit.events_of_type("ticket.opened").len(), 2);
    }

    #[tokio::test]
    async fn configured_number_start_and_priority_override_apply() {
        let mut config = AppConfig::default();
        config.tickets.number_start = 5000;
        config.sla.priority_overrides.insert(Priority::Urgent, SlaTargets::new(1, 8));
        let (services, _, _) = setup(config).await;

        let ticket = services.tickets.open(&requester(), draft(Priority::Urgent)).await.expect("open");

        assert_eq!(ticket.number, 5000);
        assert_eq!(ticket.sla().resolution_deadline, t0() + Duration::hours(8));
    }

    #[tokio::test]
    async fn unknown_category_is_rejected_and_audited() {
        let (services, _, audit) = setup(AppConfig::default()).await;
        let mut ticket = draft(Priority::Normal);
        ticket.category_id = CategoryId("facilities".to_string());

        let error = services.tickets.open(&requester(), ticket).await.expect_err("unknown");

        assert_eq!(
            error,
            ApplicationError::Domain(DomainError::UnknownCategory {
                category_id: "facilities".to_string()
            })
        );
        let events = audit.events_of_type("ticket.opened");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].outcome, AuditOutcome::Rejected);
        assert_eq!(events[0].metadata.get("error_kind").map(String::as_str), Some("unknown_category"));
    }

    #[tokio::test]
    async fn breach_is_computed_live_from_the_clock() {
        let (services, clock, _) = setup(AppConfig::default()).await;
        let ticket = services.tickets.open(&requester(), draft(Priority::Normal)).await.expect("open");

        clock.advance(Duration::hours(47));
        assert!(!services.tickets.get(&ticket.id).await.expect("get").breached);
        assert!(services.tickets.list_breached().await.expect("list").is_empty());

        clock.advance(Duration::hours(2));
        let view = services.tickets.get(&ticket.id).await.expect("get");
        assert!(view.breached);
        assert!(view.response_overdue);
        let breached = services.tickets.list_breached().await.expect("list");
        assert_eq!(breached.len(), 1);
        assert_eq!(breached[0].ticket.number, ticket.number);
    }

    #[tokio::test]
    async fn resolving_stops_the_sla_clock() {
        let (services, clock, _) = setup(AppConfig::default()).await;
        let ticket = services.tickets.open(&requester(), draft(Priority::Normal)).await.expect("open");

        clock.advance(Duration::hours(2));
        services
            .tickets
            .transition(&agent(), &ticket.id, TicketStatus::InProgress, None)
            .await
            .expect("start");
        clock.advance(Duration::hours(10));
        services
            .tickets
            .transition(&agent(), &ticket.id, TicketStatus::Resolved, Some("replaced toner".to_string()))
            .await
            .expect("resolve");

        clock.advance(Duration::hours(100));
        let view = services.tickets.get(&ticket.id).await.expect("get");
        assert!(!view.breached);
        assert!(!view.response_overdue);
        assert_eq!(view.ticket.sla().resolved_within_sla, Some(true));
        assert_eq!(view.ticket.timestamps().first_response_at, Some(t0() + Duration::hours(2)));
    }

    #[tokio::test]
    async fn invalid_transition_leaves_stored_ticket_untouched() {
        let (services, _, audit) = setup(AppConfig::default()).await;
        let ticket = services.tickets.open(&requester(), draft(Priority::Normal)).await.expect("open");

        let error = services
            .tickets
            .transition(&agent(), &ticket.id, TicketStatus::Resolved, None)
            .await
            .expect_err("open cannot resolve directly");

        assert_eq!(
            error,
            ApplicationError::Domain(DomainError::InvalidTransition {
                from: TicketStatus::Open,
                to: TicketStatus::Resolved,
            })
        );
        let stored = services.tickets.get(&ticket.id).await.expect("get").ticket;
        assert_eq!(stored, ticket);
        assert_eq!(
            audit.events_of_type("ticket.status_changed")[0].outcome,
            AuditOutcome::Rejected
        );
    }

    #[tokio::test]
    async fn reopen_can_be_disabled_by_configuration() {
        let mut config = AppConfig::default();
        config.tickets.allow_reopen = false;
        let (services, _, _) = setup(config).await;
        let ticket = services.tickets.open(&requester(), draft(Priority::Normal)).await.expect("open");

        for status in [TicketStatus::InProgress, TicketStatus::Resolved] {
            services.tickets.transition(&agent(), &ticket.id, status, None).await.expect("advance");
        }
        let error = services
            .tickets
            .transition(&agent(), &ticket.id, TicketStatus::InProgress, None)
            .await
            .expect_err("reopen disabled");

        assert!(matches!(error, ApplicationError::Domain(DomainError::InvalidTransition { .. })));
    }

    #[tokio::test]
    async fn staff_public_comment_stamps_first_response_but_requester_comment_does_not() {
        let (services, clock, _) = setup(AppConfig::default()).await;
        let ticket = services.tickets.open(&requester(), draft(Priority::Normal)).await.expect("open");

        clock.advance(Duration::hours(1));
        services
            .tickets
            .comment(&requester(), &ticket.id, "any news?", Visibility::Public)
            .await
            .expect("requester comment");
        services
            .tickets
            .comment(&agent(), &ticket.id, "checking logs", Visibility::Internal)
            .await
            .expect("internal note");
        assert_eq!(services.tickets.get(&ticket.id).await.expect("get").ticket.timestamps().first_response_at, None);

        clock.advance(Duration::hours(1));
        services
            .tickets
            .comment(&agent(), &ticket.id, "technician on the way", Visibility::Public)
            .await
            .expect("staff reply");
        let view = services.tickets.get(&ticket.id).await.expect("get");
        assert_eq!(view.ticket.timestamps().first_response_at, Some(t0() + Duration::hours(2)));
        assert_eq!(view.ticket.activity().len(), 4);
    }

    #[tokio::test]
    async fn rating_is_accepted_once_after_resolution() {
        let (services, _, _) = setup(AppConfig::default()).await;
        let ticket = services.tickets.open(&requester(), draft(Priority::Normal)).await.expect("open");

        let early = services.tickets.rate(&requester(), &ticket.id, 5, None).await.expect_err("open");
        assert!(matches!(early, ApplicationError::Domain(DomainError::InvalidState(_))));

        for status in [TicketStatus::InProgress, TicketStatus::Resolved] {
            services.tickets.transition(&agent(), &ticket.id, status, None).await.expect("advance");
        }
        services
            .tickets
            .rate(&requester(), &ticket.id, 4, Some("quick fix".to_string()))
            .await
            .expect("rate");
        let again = services.tickets.rate(&requester(), &ticket.id, 5, None).await.expect_err("twice");

        assert!(matches!(again, ApplicationError::Domain(DomainError::InvalidState(_))));
        let view = services.tickets.get(&ticket.id).await.expect("get");
        assert_eq!(view.ticket.rating().map(|rating| rating.score), Some(4));
    }

    #[tokio::test]
    async fn category_sla_edit_does_not_touch_existing_tickets() {
        let (services, _, _) = setup(AppConfig::default()).await;
        let before = services.tickets.open(&requester(), draft(Priority::Normal)).await.expect("open");

        services
            .categories
            .update(
                &agent(),
                &CategoryId("hardware".to_string()),
                CategoryUpdate { sla: Some(SlaTargets::new(1, 4)), ..CategoryUpdate::default() },
            )
            .await
            .expect("tighten sla");
        let after = services.tickets.open(&requester(), draft(Priority::Normal)).await.expect("open");

        let stored = services.tickets.get(&before.id).await.expect("get").ticket;
        assert_eq!(stored.sla().resolution_deadline, t0() + Duration::hours(48));
        assert_eq!(after.sla().resolution_deadline, t0() + Duration::hours(4));
    }

    #[tokio::test]
    async fn list_applies_predicate_and_missing_ticket_is_not_found() {
        let (services, _, _) = setup(AppConfig::default()).await;
        services.tickets.open(&requester(), draft(Priority::High)).await.expect("open");
        services.tickets.open(&requester(), draft(Priority::Low)).await.expect("open");

        let high = services
            .tickets
            .list(&|ticket: &Ticket| ticket.priority == Priority::High)
            .await
            .expect("list");
        assert_eq!(high.len(), 1);

        let missing = services.tickets.get_by_number(99).await.expect_err("missing");
        assert!(matches!(missing, ApplicationError::Domain(DomainError::NotFound { .. })));
    }

    #[tokio::test]
    async fn concurrent_transitions_on_one_ticket_apply_exactly_once() {
        let (services, _, _) = setup(AppConfig::default()).await;
        let services = Arc::new(services);
        let ticket = services.tickets.open(&requester(), draft(Priority::Normal)).await.expect("open");

        let mut handles = Vec::new();
        for _ in 0..8 {
            let services = services.clone();
            let id = ticket.id.clone();
            handles.push(tokio::spawn(async move {
                services.tickets.transition(&agent(), &id, TicketStatus::InProgress, None).await
            }));
        }

        let mut succeeded = 0;
        for handle in handles {
            if handle.await.expect("task").is_ok() {
                succeeded += 1;
            }
        }

        assert_eq!(succeeded, 1);
        let view = services.tickets.get(&ticket.id).await.expect("get");
        assert_eq!(view.ticket.activity().len(), 2);
    }

    #[tokio::test]
    async fn open_waits_for_the_category_lock() {
        let (services, _, _) = setup(AppConfig::default()).await;
        let services = Arc::new(services);
        let guard = services.categories.locks().acquire("hardware").await;

        let opener = services.clone();
        let opening = tokio::spawn(async move {
            opener.tickets.open(&requester(), draft(Priority::Normal)).await
        });

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!opening.is_finished());

        drop(guard);
        opening.await.expect("task").expect("open after lock release");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn racing_open_and_delete_never_orphan_a_ticket() {
        for round in 0..20 {
            let (services, _, _) = setup(AppConfig::default()).await;
            let services = Arc::new(services);
            let id = CategoryId("hardware".to_string());

            let opener = services.clone();
            let opening = tokio::spawn(async move {
                opener.tickets.open(&requester(), draft(Priority::Normal)).await
            });
            let deleter = services.clone();
            let delete_id = id.clone();
            let deleting =
                tokio::spawn(async move { deleter.categories.delete(&agent(), &delete_id).await });

            let opened = opening.await.expect("open task");
            let deleted = deleting.await.expect("delete task");

            match (&opened, &deleted) {
                (Ok(_), Err(ApplicationError::Domain(DomainError::CategoryInUse { .. }))) => {
                    assert!(services.categories.get(&id).await.is_ok(), "round {round}");
                }
                (Err(ApplicationError::Domain(DomainError::UnknownCategory { .. })), Ok(())) => {
                    let tickets = services.tickets.list(&|_: &Ticket| true).await.expect("list");
                    assert!(tickets.is_empty(), "round {round}");
                }
                other => panic!("round {round}: unexpected outcome {other:?}"),
            }
        }
    }
}
