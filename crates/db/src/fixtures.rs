use rust_decimal::Decimal;

use backoffice_core::approvals::{ApproverAssignment, DecisionInput, NewLineItem, NewRequisition};
use backoffice_core::audit::AuditContext;
use backoffice_core::domain::category::{Category, CategoryId, SlaTargets};
use backoffice_core::domain::priority::Priority;
use backoffice_core::domain::requisition::{Decision, Requisition, RequisitionStatus};
use backoffice_core::domain::ticket::{Requester, Ticket, TicketStatus, TicketType, Visibility};
use backoffice_core::errors::ApplicationError;
use backoffice_core::tickets::NewTicket;

use crate::services::Services;

const SEED_CATEGORIES: &[SeedCategory] = &[
    SeedCategory {
        id: "hardware",
        name: "Hardware",
        subcategories: &["Printer", "Laptop", "Monitor"],
        response_hours: 4,
        resolution_hours: 48,
    },
    SeedCategory {
        id: "network",
        name: "Network",
        subcategories: &["VPN", "Wi-Fi"],
        response_hours: 2,
        resolution_hours: 24,
    },
    SeedCategory {
        id: "access",
        name: "Access management",
        subcategories: &["Account unlock", "Permissions"],
        response_hours: 8,
        resolution_hours: 72,
    },
    SeedCategory {
        id: "facilities",
        name: "Facilities",
        subcategories: &[],
        response_hours: 24,
        resolution_hours: 120,
    },
];

const SEED_TICKETS: &[SeedTicket] = &[
    SeedTicket {
        title: "Printer jams on floor 3",
        category_id: "hardware",
        subcategory: Some("Printer"),
        priority: Priority::Normal,
        ticket_type: TicketType::Incident,
        path: &[],
        expected_status: TicketStatus::Open,
    },
    SeedTicket {
        title: "VPN disconnects every hour",
        category_id: "network",
        subcategory: Some("VPN"),
        priority: Priority::High,
        ticket_type: TicketType::Incident,
        path: &[TicketStatus::InProgress],
        expected_status: TicketStatus::InProgress,
    },
    SeedTicket {
        title: "Grant access to the finance share",
        category_id: "access",
        subcategory: Some("Permissions"),
        priority: Priority::Low,
        ticket_type: TicketType::Request,
        path: &[TicketStatus::InProgress, TicketStatus::Resolved],
        expected_status: TicketStatus::Resolved,
    },
];

const SEED_REQUISITIONS: &[SeedRequisition] = &[
    SeedRequisition {
        justification: "Ergonomic chairs for the support floor",
        department: "Facilities",
        item: ("Ergonomic chair", 6, 849_90),
        approvers: &["ops.manager@example.com"],
        approved_levels: 0,
        submit: false,
        purchase_order_ref: None,
        expected_status: RequisitionStatus::Draft,
    },
    SeedRequisition {
        justification: "Laptops for new engineering hires",
        department: "Engineering",
        item: ("Laptop 14in", 3, 1_450_00),
        approvers: &["eng.lead@example.com", "cfo@example.com"],
        approved_levels: 1,
        submit: true,
        purchase_order_ref: None,
        expected_status: RequisitionStatus::InApproval,
    },
    SeedRequisition {
        justification: "Replacement monitors for the service desk",
        department: "IT",
        item: ("27in monitor", 4, 289_00),
        approvers: &["it.manager@example.com"],
        approved_levels: 1,
        submit: true,
        purchase_order_ref: Some("PO-2026-0001"),
        expected_status: RequisitionStatus::Converted,
    },
];

/// Demo dataset exercising every ticket and requisition workflow path through the services.
pub struct DemoDataset;

impl DemoDataset {
    /// Seeds categories, tickets and requisitions. A second call finds the categories already
    /// present and seeds nothing.
    pub async fn load(
        services: &Services,
        context: &AuditContext,
    ) -> Result<SeedResult, ApplicationError> {
        let existing = services.categories.list(false).await?;
        if SEED_CATEGORIES
            .iter()
            .any(|seed| existing.iter().any(|category| category.id.0 == seed.id))
        {
            return Ok(SeedResult { skipped: true, ..SeedResult::default() });
        }

        let mut result = SeedResult::default();

        for seed in SEED_CATEGORIES {
            services.categories.create(context, seed.category()).await?;
            result.categories.push(seed.id);
        }

        for seed in SEED_TICKETS {
            let ticket = services.tickets.open(context, seed.draft()).await?;
            for status in seed.path {
                services.tickets.transition(context, &ticket.id, *status, None).await?;
            }
            if seed.expected_status == TicketStatus::Resolved {
                services
                    .tickets
                    .comment(context, &ticket.id, "Access granted.", Visibility::Public)
                    .await?;
            }
            result.tickets.push(ticket.number);
        }

        for seed in SEED_REQUISITIONS {
            let requisition = services.requisitions.create(context, seed.draft()).await?;
            if seed.submit {
                services.requisitions.submit(context, &requisition.id).await?;
            }
            for (index, approver) in seed.approvers.iter().take(seed.approved_levels).enumerate() {
                services
                    .requisitions
                    .record_decision(
                        context,
                        &requisition.id,
                        DecisionInput {
                            level: index as u32 + 1,
                            decision: Decision::Approved,
                            approver: (*approver).to_owned(),
                            comment: None,
                        },
                    )
                    .await?;
            }
            if let Some(purchase_order_ref) = seed.purchase_order_ref {
                services
                    .requisitions
                    .mark_converted(context, &requisition.id, purchase_order_ref)
                    .await?;
            }
            result.requisitions.push(requisition.reference);
        }

        Ok(result)
    }

    /// Checks that each seeded record exists in its expected state.
    pub async fn verify(services: &Services) -> Result<VerificationResult, ApplicationError> {
        let mut checks = Vec::new();

        let categories = services.categories.list(false).await?;
        for seed in SEED_CATEGORIES {
            let present = categories.iter().any(|category| {
                category.id.0 == seed.id
                    && category.sla == SlaTargets::new(seed.response_hours, seed.resolution_hours)
            });
            checks.push((seed.id, present));
        }

        for seed in SEED_TICKETS {
            let matching =
                services.tickets.list(&|ticket: &Ticket| ticket.title == seed.title).await?;
            let present = matching.len() == 1
                && matching.iter().all(|view| view.ticket.status() == seed.expected_status);
            checks.push((seed.title, present));
        }

        for seed in SEED_REQUISITIONS {
            let matching = services
                .requisitions
                .list(&|requisition: &Requisition| requisition.justification == seed.justification)
                .await?;
            let present = matching.len() == 1
                && matching.iter().all(|requisition| requisition.status() == seed.expected_status);
            checks.push((seed.justification, present));
        }

        let all_present = checks.iter().all(|(_, present)| *present);
        Ok(VerificationResult { all_present, checks })
    }
}

#[derive(Debug, Clone, Copy)]
struct SeedCategory {
    id: &'static str,
    name: &'static str,
    subcategories: &'static [&'static str],
    response_hours: u32,
    resolution_hours: u32,
}

impl SeedCategory {
    fn category(&self) -> Category {
        Category {
            id: CategoryId(self.id.to_owned()),
            name: self.name.to_owned(),
            description: None,
            subcategories: self.subcategories.iter().map(|name| (*name).to_owned()).collect(),
            sla: SlaTargets::new(self.response_hours, self.resolution_hours),
            active: true,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct SeedTicket {
    title: &'static str,
    category_id: &'static str,
    subcategory: Option<&'static str>,
    priority: Priority,
    ticket_type: TicketType,
    path: &'static [TicketStatus],
    expected_status: TicketStatus,
}

impl SeedTicket {
    fn draft(&self) -> NewTicket {
        NewTicket {
            title: self.title.to_owned(),
            description: format!("Seeded demo ticket: {}", self.title),
            ticket_type: self.ticket_type,
            category_id: CategoryId(self.category_id.to_owned()),
            subcategory: self.subcategory.map(str::to_owned),
            priority: self.priority,
            requester: Requester {
                name: "Demo Requester".to_owned(),
                email: "requester@example.com".to_owned(),
                phone: None,
            },
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct SeedRequisition {
    justification: &'static str,
    department: &'static str,
    /// Description, quantity and unit price in cents.
    item: (&'static str, i64, i64),
    approvers: &'static [&'static str],
    approved_levels: usize,
    submit: bool,
    purchase_order_ref: Option<&'static str>,
    expected_status: RequisitionStatus,
}

impl SeedRequisition {
    fn draft(&self) -> NewRequisition {
        let (description, quantity, unit_price_cents) = self.item;
        NewRequisition {
            requester: "buyer@example.com".to_owned(),
            department: self.department.to_owned(),
            priority: Priority::Normal,
            desired_delivery: None,
            justification: self.justification.to_owned(),
            items: vec![NewLineItem {
                description: description.to_owned(),
                quantity: Decimal::from(quantity),
                unit: "un".to_owned(),
                unit_price: Decimal::new(unit_price_cents, 2),
            }],
            approval_chain: self
                .approvers
                .iter()
                .enumerate()
                .map(|(index, approver)| ApproverAssignment {
                    level: index as u32 + 1,
                    approver: (*approver).to_owned(),
                    role: format!("level {} approver", index + 1),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Default)]
pub struct SeedResult {
    pub skipped: bool,
    pub categories: Vec<&'static str>,
    pub tickets: Vec<u64>,
    pub requisitions: Vec<String>,
}

#[derive(Debug)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use backoffice_core::audit::{AuditContext, InMemoryAuditSink};
    use backoffice_core::clock::SystemClock;
    use backoffice_core::config::AppConfig;

    use super::DemoDataset;
    use crate::services::Services;
    use crate::{connect_with_settings, migrations};

    #[tokio::test]
    async fn seed_is_verifiable_and_idempotent() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30)
            .await
            .expect("connect to test database");
        migrations::run_pending(&pool).await.expect("run migrations");
        let services = Services::sqlite(
            pool,
            &AppConfig::default(),
            Arc::new(SystemClock),
            Arc::new(InMemoryAuditSink::default()),
        );
        let context = AuditContext::system("seed-test");

        let first = DemoDataset::load(&services, &context).await.expect("load seed");
        let first_verification = DemoDataset::verify(&services).await.expect("verify seed");
        assert!(!first.skipped);
        assert_eq!(first.categories.len(), 4);
        assert_eq!(first.tickets, vec![1, 2, 3]);
        assert_eq!(first.requisitions, vec!["REQ-000001", "REQ-000002", "REQ-000003"]);
        assert!(first_verification.all_present, "{:?}", first_verification.checks);

        let second = DemoDataset::load(&services, &context).await.expect("reload seed");
        let second_verification = DemoDataset::verify(&services).await.expect("re-verify seed");
        assert!(second.skipped);
        assert!(second.tickets.is_empty());
        assert_eq!(first_verification.checks, second_verification.checks);
    }
}
