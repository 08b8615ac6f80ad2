use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use backoffice_core::approvals::{
    ApprovalEngine, DecisionInput, DecisionOutcome, ItemChange, NewLineItem, NewRequisition,
};
use backoffice_core::audit::{AuditCategory, AuditContext, AuditSink};
use backoffice_core::clock::Clock;
use backoffice_core::config::{format_reference, AppConfig};
use backoffice_core::domain::requisition::{
    LineItemId, Requisition, RequisitionId, RequisitionStatus,
};
use backoffice_core::errors::{ApplicationError, DomainError};

use super::{AuditRecorder, EntityLocks};
use crate::repositories::{Predicate, RequisitionRepository};

#[derive(Clone, Debug)]
pub struct RequisitionSettings {
    pub number_prefix: String,
    pub max_approval_levels: u32,
}

impl Default for RequisitionSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

impl RequisitionSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            number_prefix: config.requisitions.number_prefix.clone(),
            max_approval_levels: config.requisitions.max_approval_levels,
        }
    }
}

pub struct RequisitionService {
    requisitions: Arc<dyn RequisitionRepository>,
    engine: ApprovalEngine,
    settings: RequisitionSettings,
    clock: Arc<dyn Clock>,
    recorder: AuditRecorder,
    locks: EntityLocks,
    numbering: Mutex<()>,
}

impl RequisitionService {
    pub fn new(
        requisitions: Arc<dyn RequisitionRepository>,
        settings: RequisitionSettings,
        clock: Arc<dyn Clock>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            requisitions,
            engine: ApprovalEngine::new(settings.max_approval_levels),
            settings,
            clock,
            recorder: AuditRecorder::new(audit, AuditCategory::Requisition),
            locks: EntityLocks::default(),
            numbering: Mutex::new(()),
        }
    }

    /// Creates a draft with the next reference in sequence.
    pub async fn create(
        &self,
        context: &AuditContext,
        draft: NewRequisition,
    ) -> Result<Requisition, ApplicationError> {
        let _numbering = self.numbering.lock().await;
        let now = self.clock.now();

        let result: Result<Requisition, ApplicationError> = async {
            let number = self.requisitions.max_number().await?.map_or(1, |max| max + 1);
            let requisition = self.engine.create(
                RequisitionId(Uuid::new_v4().to_string()),
                number,
                format_reference(&self.settings.number_prefix, number),
                draft,
                now,
            )?;
            self.requisitions.save(requisition.clone()).await?;
            Ok(requisition)
        }
        .await;

        match &result {
            Ok(requisition) => self.recorder.success(
                context,
                &requisition.reference,
                "requisition.created",
                now,
                vec![
                    ("department", requisition.department.clone()),
                    ("total_value", requisition.total_value().to_string()),
                    ("levels", requisition.total_levels().to_string()),
                ],
            ),
            Err(error) => {
                self.recorder.failure(context, "requisition", "requisition.created", now, error)
            }
        }
        result
    }

    pub async fn submit(
        &self,
        context: &AuditContext,
        id: &RequisitionId,
    ) -> Result<Requisition, ApplicationError> {
        let (requisition, ()) = self
            .mutate(context, id, "requisition.submitted", |engine, requisition, now| {
                engine.submit(requisition, now)?;
                Ok(((), Vec::new()))
            })
            .await?;
        Ok(requisition)
    }

    pub async fn record_decision(
        &self,
        context: &AuditContext,
        id: &RequisitionId,
        input: DecisionInput,
    ) -> Result<DecisionOutcome, ApplicationError> {
        let (_, outcome) = self
            .mutate(context, id, "requisition.decision_recorded", move |engine, requisition, now| {
                let approver = input.approver.clone();
                let outcome = engine.record_decision(requisition, input, now)?;
                let metadata = vec![
                    ("level", outcome.level.to_string()),
                    ("decision", outcome.decision.as_str().to_owned()),
                    ("approver", approver),
                    ("previous_status", outcome.previous_status.to_string()),
                ];
                Ok((outcome, metadata))
            })
            .await?;
        Ok(outcome)
    }

    pub async fn add_item(
        &self,
        context: &AuditContext,
        id: &RequisitionId,
        item: NewLineItem,
    ) -> Result<ItemChange, ApplicationError> {
        self.edit_items(context, id, "requisition.item_added", move |engine, requisition, now| {
            engine.add_item(requisition, item, now)
        })
        .await
    }

    pub async fn update_item(
        &self,
        context: &AuditContext,
        id: &RequisitionId,
        item_id: &LineItemId,
        item: NewLineItem,
    ) -> Result<ItemChange, ApplicationError> {
        self.edit_items(context, id, "requisition.item_updated", move |engine, requisition, now| {
            engine.update_item(requisition, item_id, item, now)
        })
        .await
    }

    pub async fn remove_item(
        &self,
        context: &AuditContext,
        id: &RequisitionId,
        item_id: &LineItemId,
    ) -> Result<ItemChange, ApplicationError> {
        self.edit_items(context, id, "requisition.item_removed", move |engine, requisition, now| {
            engine.remove_item(requisition, item_id, now)
        })
        .await
    }

    pub async fn cancel(
        &self,
        context: &AuditContext,
        id: &RequisitionId,
    ) -> Result<Requisition, ApplicationError> {
        let (requisition, ()) = self
            .mutate(context, id, "requisition.cancelled", |engine, requisition, now| {
                let previous = engine.cancel(requisition, now)?;
                Ok(((), vec![("previous_status", previous.to_string())]))
            })
            .await?;
        Ok(requisition)
    }

    pub async fn mark_converted(
        &self,
        context: &AuditContext,
        id: &RequisitionId,
        purchase_order_ref: &str,
    ) -> Result<Requisition, ApplicationError> {
        let (requisition, ()) = self
            .mutate(context, id, "requisition.converted", move |engine, requisition, now| {
                engine.mark_converted(requisition, purchase_order_ref, now)?;
                Ok(((), vec![("purchase_order_ref", purchase_order_ref.to_owned())]))
            })
            .await?;
        Ok(requisition)
    }

    pub async fn get(&self, id: &RequisitionId) -> Result<Requisition, ApplicationError> {
        self.requisitions.find_by_id(id).await?.ok_or_else(|| {
            DomainError::NotFound { entity: "requisition", id: id.0.clone() }.into()
        })
    }

    pub async fn get_by_reference(&self, reference: &str) -> Result<Requisition, ApplicationError> {
        self.requisitions.find_by_reference(reference).await?.ok_or_else(|| {
            DomainError::NotFound { entity: "requisition", id: reference.to_owned() }.into()
        })
    }

    pub async fn list(
        &self,
        predicate: Predicate<'_, Requisition>,
    ) -> Result<Vec<Requisition>, ApplicationError> {
        Ok(self.requisitions.list(predicate).await?)
    }

    /// Requisitions waiting on a decision from `approver` at their current level.
    pub async fn awaiting_approver(
        &self,
        approver: &str,
    ) -> Result<Vec<Requisition>, ApplicationError> {
        let approver = approver.trim().to_lowercase();
        self.list(&|requisition: &Requisition| {
            matches!(
                requisition.status(),
                RequisitionStatus::Pending | RequisitionStatus::InApproval
            ) && requisition
                .current_step()
                .is_some_and(|step| step.approver.trim().to_lowercase() == approver)
        })
        .await
    }

    async fn edit_items(
        &self,
        context: &AuditContext,
        id: &RequisitionId,
        event_type: &'static str,
        apply: impl FnOnce(&ApprovalEngine, &mut Requisition, DateTime<Utc>) -> Result<ItemChange, DomainError>
            + Send,
    ) -> Result<ItemChange, ApplicationError> {
        let (_, change) = self
            .mutate(context, id, event_type, move |engine, requisition, now| {
                let change = apply(engine, requisition, now)?;
                let metadata = vec![
                    ("item_id", change.item_id.0.clone()),
                    ("previous_total", change.previous_total.to_string()),
                    ("total", change.total.to_string()),
                    ("approvals_reset", change.approvals_reset.to_string()),
                ];
                Ok((change, metadata))
            })
            .await?;
        Ok(change)
    }

    async fn mutate<T>(
        &self,
        context: &AuditContext,
        id: &RequisitionId,
        event_type: &'static str,
        apply: impl FnOnce(
                &ApprovalEngine,
                &mut Requisition,
                DateTime<Utc>,
            ) -> Result<(T, Vec<(&'static str, String)>), DomainError>
            + Send,
    ) -> Result<(Requisition, T), ApplicationError>
    where
        T: Send,
    {
        let _guard = self.locks.acquire(&id.0).await;
        let now = self.clock.now();

        let result: Result<(Requisition, T, Vec<(&'static str, String)>), ApplicationError> =
            async {
                let mut working = self.get(id).await?;
                let (value, metadata) = apply(&self.engine, &mut working, now)?;
                self.requisitions.save(working.clone()).await?;
                Ok((working, value, metadata))
            }
            .await;

        match result {
            Ok((requisition, value, mut metadata)) => {
                metadata.push(("status", requisition.status().to_string()));
                metadata.push(("current_level", requisition.current_level().to_string()));
                self.recorder.success(context, &requisition.reference, event_type, now, metadata);
                Ok((requisition, value))
            }
            Err(error) => {
                self.recorder.failure(context, &id.0, event_type, now, &error);
                Err(error)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{TimeZone, Utc};
    use rust_decimal::Decimal;

    use backoffice_core::approvals::{
        ApproverAssignment, DecisionInput, NewLineItem, NewRequisition,
    };
    use backoffice_core::audit::{AuditContext, AuditOutcome, InMemoryAuditSink};
    use backoffice_core::clock::ManualClock;
    use backoffice_core::config::AppConfig;
    use backoffice_core::domain::priority::Priority;
    use backoffice_core::domain::requisition::{Decision, Requisition, RequisitionStatus};
    use backoffice_core::errors::{ApplicationError, DomainError};

    use crate::services::Services;

    fn setup(config: AppConfig) -> (Services, InMemoryAuditSink) {
        let clock = ManualClock::new(
            Utc.with_ymd_and_hms(2026, 6, 1, 9, 0, 0).single().expect("valid instant"),
        );
        let audit = InMemoryAuditSink::default();
        let services = Services::in_memory(&config, Arc::new(clock), Arc::new(audit.clone()));
        (services, audit)
    }

    fn context() -> AuditContext {
        AuditContext::new("req-purchase", "carla@example.com")
    }

    fn laptops() -> NewLineItem {
        NewLineItem {
            description: "Laptop".to_string(),
            quantity: Decimal::from(2),
            unit: "un".to_string(),
            unit_price: Decimal::new(1_250_00, 2),
        }
    }

    fn draft(levels: u32) -> NewRequisition {
        NewRequisition {
            requester: "carla@example.com".to_string(),
            department: "Engineering".to_string(),
            priority: Priority::Normal,
            desired_delivery: None,
            justification: "new hires".to_string(),
            items: vec![laptops()],
            approval_chain: (1..=levels)
                .map(|level| ApproverAssignment {
                    level,
                    approver: format!("approver{level}@example.com"),
                    role: format!("level {level}"),
                })
                .collect(),
        }
    }

    fn approve(level: u32) -> DecisionInput {
        DecisionInput {
            level,
            decision: Decision::Approved,
            approver: format!("approver{level}@example.com"),
            comment: None,
        }
    }

    #[tokio::test]
    async fn create_numbers_references_from_configured_prefix() {
        let mut config = AppConfig::default();
        config.requisitions.number_prefix = "PR-".to_string();
        let (services, _) = setup(config);

        let first = services.requisitions.create(&context(), draft(1)).await.expect("create");
        let second = services.requisitions.create(&context(), draft(1)).await.expect("create");

        assert_eq!(first.reference, "PR-000001");
        assert_eq!(second.reference, "PR-000002");
        assert_eq!(first.status(), RequisitionStatus::Draft);
        assert_eq!(first.total_value(), Decimal::new(2_500_00, 2));
        assert_eq!(
            services.requisitions.get_by_reference("PR-000002").await.expect("find").id,
            second.id
        );
    }

    #[tokio::test]
    async fn chain_longer_than_configured_maximum_is_rejected() {
        let mut config = AppConfig::default();
        config.requisitions.max_approval_levels = 2;
        let (services, audit) = setup(config);

        let error = services.requisitions.create(&context(), draft(3)).await.expect_err("too long");

        assert!(matches!(error, ApplicationError::Domain(DomainError::InvariantViolation(_))));
        assert_eq!(audit.events_of_type("requisition.created")[0].outcome, AuditOutcome::Rejected);
    }

    #[tokio::test]
    async fn full_chain_approval_then_conversion() {
        let (services, audit) = setup(AppConfig::default());
        let requisition = services.requisitions.create(&context(), draft(2)).await.expect("create");
        services.requisitions.submit(&context(), &requisition.id).await.expect("submit");

        let first = services
            .requisitions
            .record_decision(&context(), &requisition.id, approve(1))
            .await
            .expect("level 1");
        assert_eq!(first.status, RequisitionStatus::InApproval);
        assert_eq!(first.current_level, 2);

        let second = services
            .requisitions
            .record_decision(&context(), &requisition.id, approve(2))
            .await
            .expect("level 2");
        assert_eq!(second.status, RequisitionStatus::Approved);

        let converted = services
            .requisitions
            .mark_converted(&context(), &requisition.id, "PO-7781")
            .await
            .expect("convert");
        assert_eq!(converted.status(), RequisitionStatus::Converted);
        assert_eq!(converted.purchase_order_ref(), Some("PO-7781"));
        assert_eq!(audit.events_of_type("requisition.decision_recorded").len(), 2);
    }

    #[tokio::test]
    async fn out_of_order_decision_is_rejected_without_persisting() {
        let (services, audit) = setup(AppConfig::default());
        let requisition = services.requisitions.create(&context(), draft(3)).await.expect("create");
        services.requisitions.submit(&context(), &requisition.id).await.expect("submit");

        let error = services
            .requisitions
            .record_decision(&context(), &requisition.id, approve(2))
            .await
            .expect_err("level 1 not decided yet");

        assert!(matches!(error, ApplicationError::Domain(DomainError::OutOfOrder { .. })));
        let stored = services.requisitions.get(&requisition.id).await.expect("get");
        assert_eq!(stored.status(), RequisitionStatus::Pending);
        assert_eq!(stored.current_level(), 1);
        let events = audit.events_of_type("requisition.decision_recorded");
        assert_eq!(events[0].outcome, AuditOutcome::Rejected);
        assert_eq!(events[0].metadata.get("error_kind").map(String::as_str), Some("out_of_order"));
    }

    #[tokio::test]
    async fn rejection_locks_the_requisition() {
        let (services, _) = setup(AppConfig::default());
        let requisition = services.requisitions.create(&context(), draft(2)).await.expect("create");
        services.requisitions.submit(&context(), &requisition.id).await.expect("submit");

        let outcome = services
            .requisitions
            .record_decision(
                &context(),
                &requisition.id,
                DecisionInput { decision: Decision::Rejected, ..approve(1) },
            )
            .await
            .expect("reject");
        assert_eq!(outcome.status, RequisitionStatus::Rejected);

        let error = services
            .requisitions
            .add_item(&context(), &requisition.id, laptops())
            .await
            .expect_err("locked");
        assert_eq!(
            error,
            ApplicationError::Domain(DomainError::RequisitionLocked {
                status: RequisitionStatus::Rejected
            })
        );
    }

    #[tokio::test]
    async fn changing_total_mid_chain_resets_approvals() {
        let (services, _) = setup(AppConfig::default());
        let requisition = services.requisitions.create(&context(), draft(2)).await.expect("create");
        services.requisitions.submit(&context(), &requisition.id).await.expect("submit");
        services
            .requisitions
            .record_decision(&context(), &requisition.id, approve(1))
            .await
            .expect("level 1");

        let change = services
            .requisitions
            .add_item(
                &context(),
                &requisition.id,
                NewLineItem {
                    description: "Docking station".to_string(),
                    quantity: Decimal::ONE,
                    unit: "un".to_string(),
                    unit_price: Decimal::new(180_00, 2),
                },
            )
            .await
            .expect("add item");

        assert!(change.approvals_reset);
        assert_eq!(change.total, Decimal::new(2_680_00, 2));
        let stored = services.requisitions.get(&requisition.id).await.expect("get");
        assert_eq!(stored.status(), RequisitionStatus::Pending);
        assert_eq!(stored.current_level(), 1);
        assert!(stored.approval_chain().iter().all(|step| step.decision() == Decision::Pending));
    }

    #[tokio::test]
    async fn cancel_is_refused_once_approved() {
        let (services, _) = setup(AppConfig::default());
        let requisition = services.requisitions.create(&context(), draft(1)).await.expect("create");
        services.requisitions.submit(&context(), &requisition.id).await.expect("submit");
        services
            .requisitions
            .record_decision(&context(), &requisition.id, approve(1))
            .await
            .expect("approve");

        let error =
            services.requisitions.cancel(&context(), &requisition.id).await.expect_err("locked");

        assert!(matches!(error, ApplicationError::Domain(DomainError::RequisitionLocked { .. })));
    }

    #[tokio::test]
    async fn awaiting_approver_lists_only_current_level_assignments() {
        let (services, _) = setup(AppConfig::default());
        let requisition = services.requisitions.create(&context(), draft(2)).await.expect("create");
        services.requisitions.create(&context(), draft(2)).await.expect("draft stays unlisted");
        services.requisitions.submit(&context(), &requisition.id).await.expect("submit");

        let level_one =
            services.requisitions.awaiting_approver("Approver1@Example.com").await.expect("list");
        assert_eq!(level_one.iter().map(|r| r.id.clone()).collect::<Vec<_>>(), vec![requisition.id.clone()]);
        assert!(services.requisitions.awaiting_approver("approver2@example.com").await.expect("list").is_empty());

        let drafts = services
            .requisitions
            .list(&|r: &Requisition| r.status() == RequisitionStatus::Draft)
            .await
            .expect("list");
        assert_eq!(drafts.len(), 1);
    }

    #[tokio::test]
    async fn concurrent_decisions_on_one_level_record_exactly_one() {
        let (services, _) = setup(AppConfig::default());
        let services = Arc::new(services);
        let requisition = services.requisitions.create(&context(), draft(2)).await.expect("create");
        services.requisitions.submit(&context(), &requisition.id).await.expect("submit");

        let mut handles = Vec::new();
        for _ in 0..6 {
            let services = services.clone();
            let id = requisition.id.clone();
            handles.push(tokio::spawn(async move {
                services.requisitions.record_decision(&context(), &id, approve(1)).await
            }));
        }

        let mut accepted = 0;
        let mut already_decided = 0;
        for handle in handles {
            match handle.await.expect("task") {
                Ok(_) => accepted += 1,
                Err(ApplicationError::Domain(DomainError::AlreadyDecided { .. })) => {
                    already_decided += 1
                }
                Err(other) => panic!("unexpected error: {other}"),
            }
        }

        assert_eq!((accepted, already_decided), (1, 5));
        let stored = services.requisitions.get(&requisition.id).await.expect("get");
        assert_eq!(stored.current_level(), 2);
    }
}
