//! Application services: load an entity under its lock, run the engine on a copy, persist on
//! success, then record the outcome in the audit trail and the log.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use backoffice_core::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use backoffice_core::clock::Clock;
use backoffice_core::config::AppConfig;
use backoffice_core::errors::ApplicationError;

use crate::repositories::{
    CategoryRepository, InMemoryCategoryRepository, InMemoryRequisitionRepository,
    InMemoryTicketRepository, RequisitionRepository, SqlCategoryRepository,
    SqlRequisitionRepository, SqlTicketRepository, TicketRepository,
};
use crate::DbPool;

pub mod category;
pub mod locks;
pub mod requisition;
pub mod ticket;

pub use category::{CategoryService, CategoryUpdate};
pub use locks::EntityLocks;
pub use requisition::{RequisitionService, RequisitionSettings};
pub use ticket::{TicketService, TicketSettings};

/// Writes every audit event to the `tracing` pipeline.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn emit(&self, event: AuditEvent) {
        let metadata = serde_json::to_string(&event.metadata).unwrap_or_default();
        info!(
            event_name = "audit.event",
            correlation_id = %event.correlation_id,
            audit_event_id = %event.event_id,
            audit_event_type = %event.event_type,
            entity_ref = event.entity_ref.as_deref().unwrap_or("none"),
            actor = %event.actor,
            outcome = ?event.outcome,
            metadata = %metadata,
            "audit event recorded"
        );
    }
}

/// Emits audit events and the matching log line for one service.
#[derive(Clone)]
pub(crate) struct AuditRecorder {
    sink: Arc<dyn AuditSink>,
    category: AuditCategory,
}

impl AuditRecorder {
    pub(crate) fn new(sink: Arc<dyn AuditSink>, category: AuditCategory) -> Self {
        Self { sink, category }
    }

    pub(crate) fn success(
        &self,
        context: &AuditContext,
        entity_ref: &str,
        event_type: &str,
        now: DateTime<Utc>,
        metadata: Vec<(&'static str, String)>,
    ) {
        info!(
            event_name = event_type,
            correlation_id = %context.correlation_id,
            actor = %context.actor,
            entity_ref,
            "operation committed"
        );

        let mut event = AuditEvent::new(
            context,
            Some(entity_ref.to_owned()),
            event_type,
            self.category,
            AuditOutcome::Success,
            now,
        );
        for (key, value) in metadata {
            event = event.with_metadata(key, value);
        }
        self.sink.emit(event);
    }

    pub(crate) fn failure(
        &self,
        context: &AuditContext,
        entity_ref: &str,
        event_type: &str,
        now: DateTime<Utc>,
        error: &ApplicationError,
    ) {
        let (outcome, error_kind) = match error {
            ApplicationError::Domain(domain) => (AuditOutcome::Rejected, domain.kind()),
            ApplicationError::Persistence(_) => (AuditOutcome::Failed, "persistence"),
            ApplicationError::Configuration(_) => (AuditOutcome::Failed, "configuration"),
        };

        warn!(
            event_name = event_type,
            correlation_id = %context.correlation_id,
            actor = %context.actor,
            entity_ref,
            error_kind,
            error = %error,
            "operation rejected"
        );

        self.sink.emit(
            AuditEvent::new(context, Some(entity_ref.to_owned()), event_type, self.category, outcome, now)
                .with_metadata("error_kind", error_kind)
                .with_metadata("error", error.to_string()),
        );
    }
}

/// The three services wired over one set of repositories.
pub struct Services {
    pub categories: CategoryService,
    pub tickets: TicketService,
    pub requisitions: RequisitionService,
}

impl Services {
    pub fn new(
        category_repo: Arc<dyn CategoryRepository>,
        ticket_repo: Arc<dyn TicketRepository>,
        requisition_repo: Arc<dyn RequisitionRepository>,
        config: &AppConfig,
        clock: Arc<dyn Clock>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        let categories = CategoryService::new(
            category_repo.clone(),
            ticket_repo.clone(),
            clock.clone(),
            audit.clone(),
        );
        let tickets = TicketService::new(
            ticket_repo,
            category_repo,
            TicketSettings::from_config(config),
            clock.clone(),
            audit.clone(),
        )
        .with_category_locks(categories.locks().clone());

        Self {
            categories,
            tickets,
            requisitions: RequisitionService::new(
                requisition_repo,
                RequisitionSettings::from_config(config),
                clock,
                audit,
            ),
        }
    }

    pub fn in_memory(config: &AppConfig, clock: Arc<dyn Clock>, audit: Arc<dyn AuditSink>) -> Self {
        Self::new(
            Arc::new(InMemoryCategoryRepository::default()),
            Arc::new(InMemoryTicketRepository::default()),
            Arc::new(InMemoryRequisitionRepository::default()),
            config,
            clock,
            audit,
        )
    }

    pub fn sqlite(
        pool: DbPool,
        config: &AppConfig,
        clock: Arc<dyn Clock>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self::new(
            Arc::new(SqlCategoryRepository::new(pool.clone())),
            Arc::new(SqlTicketRepository::new(pool.clone())),
            Arc::new(SqlRequisitionRepository::new(pool)),
            config,
            clock,
            audit,
        )
    }
}
