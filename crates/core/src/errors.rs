use thiserror::Error;

use crate::domain::requisition::RequisitionStatus;
use crate::domain::ticket::TicketStatus;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("invalid ticket transition from {from} to {to}")]
    InvalidTransition { from: TicketStatus, to: TicketStatus },
    #[error("approval level {level} is out of order (current level is {current_level})")]
    OutOfOrder { level: u32, current_level: u32 },
    #[error("approval level {level} has already been decided")]
    AlreadyDecided { level: u32 },
    #[error("requisition is locked in status {status}")]
    RequisitionLocked { status: RequisitionStatus },
    #[error("invalid state: {0}")]
    InvalidState(String),
    #[error("unknown category `{category_id}`")]
    UnknownCategory { category_id: String },
    #[error("subcategory `{subcategory}` does not belong to category `{category_id}`")]
    UnknownSubcategory { category_id: String, subcategory: String },
    #[error("invalid priority `{value}` (expected low|normal|high|urgent)")]
    InvalidPriority { value: String },
    #[error("{entity} `{id}` was not found")]
    NotFound { entity: &'static str, id: String },
    #[error("category `{category_id}` is still referenced by {ticket_count} ticket(s)")]
    CategoryInUse { category_id: String, ticket_count: usize },
    #[error("approval level {level} is assigned to `{expected}`, not `{actual}`")]
    ApproverMismatch { level: u32, expected: String, actual: String },
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

impl DomainError {
    /// Stable snake_case identifier for logs and structured output.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::OutOfOrder { .. } => "out_of_order",
            Self::AlreadyDecided { .. } => "already_decided",
            Self::RequisitionLocked { .. } => "requisition_locked",
            Self::InvalidState(_) => "invalid_state",
            Self::UnknownCategory { .. } => "unknown_category",
            Self::UnknownSubcategory { .. } => "unknown_subcategory",
            Self::InvalidPriority { .. } => "invalid_priority",
            Self::NotFound { .. } => "not_found",
            Self::CategoryInUse { .. } => "category_in_use",
            Self::ApproverMismatch { .. } => "approver_mismatch",
            Self::InvariantViolation(_) => "invariant_violation",
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

impl ApplicationError {
    pub fn domain(&self) -> Option<&DomainError> {
        match self {
            Self::Domain(error) => Some(error),
            _ => None,
        }
    }

    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::NotFound { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("not found: {message}")]
    NotFound { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::NotFound { .. } => "The requested record does not exist.",
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        let correlation_id = "unassigned".to_owned();
        match value {
            ApplicationError::Domain(error @ DomainError::NotFound { .. }) => {
                Self::NotFound { message: error.to_string(), correlation_id }
            }
            ApplicationError::Domain(error) => {
                Self::BadRequest { message: error.to_string(), correlation_id }
            }
            ApplicationError::Persistence(message) => {
                Self::ServiceUnavailable { message, correlation_id }
            }
            ApplicationError::Configuration(message) => Self::Internal { message, correlation_id },
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::ticket::TicketStatus;
    use crate::errors::{ApplicationError, DomainError, InterfaceError};

    #[test]
    fn domain_error_maps_to_bad_request_with_its_message() {
        let interface = ApplicationError::from(DomainError::InvalidTransition {
            from: TicketStatus::Open,
            to: TicketStatus::Resolved,
        })
        .into_interface("req-1");

        assert!(matches!(
            interface,
            InterfaceError::BadRequest { ref message, ref correlation_id }
                if message == "invalid ticket transition from open to resolved"
                    && correlation_id == "req-1"
        ));
    }

    #[test]
    fn not_found_maps_to_not_found_interface_error() {
        let interface = ApplicationError::from(DomainError::NotFound {
            entity: "ticket",
            id: "T-404".to_owned(),
        })
        .into_interface("req-2");

        assert!(matches!(interface, InterfaceError::NotFound { .. }));
        assert_eq!(interface.user_message(), "The requested record does not exist.");
    }

    #[test]
    fn persistence_error_maps_to_service_unavailable() {
        let interface =
            ApplicationError::Persistence("database lock timeout".to_owned()).into_interface("req-3");

        assert!(matches!(interface, InterfaceError::ServiceUnavailable { .. }));
        assert_eq!(
            interface.user_message(),
            "The service is temporarily unavailable. Please retry shortly."
        );
    }

    #[test]
    fn error_kinds_are_snake_case() {
        assert_eq!(DomainError::AlreadyDecided { level: 2 }.kind(), "already_decided");
        assert_eq!(
            DomainError::InvalidPriority { value: "p0".to_owned() }.kind(),
            "invalid_priority"
        );
    }
}
