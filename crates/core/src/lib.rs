pub mod approvals;
pub mod audit;
pub mod clock;
pub mod config;
pub mod domain;
pub mod errors;
pub mod sla;
pub mod tickets;

pub use approvals::{
    ApprovalEngine, ApproverAssignment, DecisionInput, DecisionOutcome, ItemChange, NewLineItem,
    NewRequisition,
};
pub use audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink, InMemoryAuditSink};
pub use clock::{Clock, ManualClock, SystemClock};
pub use domain::category::{Category, CategoryId, SlaTargets};
pub use domain::priority::Priority;
pub use domain::requisition::{
    ApprovalStep, Decision, LineItem, LineItemId, Requisition, RequisitionId, RequisitionStatus,
};
pub use domain::ticket::{
    ActivityEntry, ActivityId, ActivityKind, Rating, Requester, SlaSnapshot, Ticket, TicketId,
    TicketStatus, TicketTimestamps, TicketType, TicketView, Visibility,
};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use sla::{Deadlines, SlaCatalog};
pub use tickets::{NewTicket, TicketLifecycle, TransitionOutcome};
