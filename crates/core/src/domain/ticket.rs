use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::category::CategoryId;
use crate::domain::priority::Priority;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TicketId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActivityId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketType {
    Incident,
    Request,
    Problem,
    Change,
    Inquiry,
}

impl TicketType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Incident => "incident",
            Self::Request => "request",
            Self::Problem => "problem",
            Self::Change => "change",
            Self::Inquiry => "inquiry",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "incident" => Some(Self::Incident),
            "request" => Some(Self::Request),
            "problem" => Some(Self::Problem),
            "change" => Some(Self::Change),
            "inquiry" => Some(Self::Inquiry),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    Open,
    InProgress,
    AwaitingCustomer,
    AwaitingThirdParty,
    Resolved,
    Closed,
    Cancelled,
}

impl TicketStatus {
    pub const ALL: [TicketStatus; 7] = [
        Self::Open,
        Self::InProgress,
        Self::AwaitingCustomer,
        Self::AwaitingThirdParty,
        Self::Resolved,
        Self::Closed,
        Self::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::InProgress => "in_progress",
            Self::AwaitingCustomer => "awaiting_customer",
            Self::AwaitingThirdParty => "awaiting_third_party",
            Self::Resolved => "resolved",
            Self::Closed => "closed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "open" => Some(Self::Open),
            "in_progress" => Some(Self::InProgress),
            "awaiting_customer" => Some(Self::AwaitingCustomer),
            "awaiting_third_party" => Some(Self::AwaitingThirdParty),
            "resolved" => Some(Self::Resolved),
            "closed" => Some(Self::Closed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// No transitions and no new activity once here.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed | Self::Cancelled)
    }

    /// Statuses that stop the resolution clock.
    pub fn stops_sla_clock(&self) -> bool {
        matches!(self, Self::Resolved | Self::Closed | Self::Cancelled)
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requester {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
}

/// SLA targets and deadlines frozen when the ticket was opened.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlaSnapshot {
    pub response_hours: u32,
    pub resolution_hours: u32,
    pub response_deadline: DateTime<Utc>,
    pub resolution_deadline: DateTime<Utc>,
    /// Set the first time the ticket reaches `resolved`.
    pub resolved_within_sla: Option<bool>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketTimestamps {
    pub created_at: DateTime<Utc>,
    pub first_response_at: Option<DateTime<Utc>>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    System,
    Comment,
    StatusChange,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    Internal,
    Public,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub id: ActivityId,
    pub kind: ActivityKind,
    pub description: String,
    pub author: String,
    pub visibility: Visibility,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rating {
    pub score: u8,
    pub comment: Option<String>,
    pub rated_at: DateTime<Utc>,
}

/// A support ticket.
///
/// Status, milestones, the activity log and the rating are only changed through
/// [`crate::tickets::TicketLifecycle`]; callers read them through accessors.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: TicketId,
    pub number: u64,
    pub title: String,
    pub description: String,
    pub ticket_type: TicketType,
    pub category_id: CategoryId,
    pub subcategory: Option<String>,
    pub priority: Priority,
    pub requester: Requester,
    pub(crate) status: TicketStatus,
    pub(crate) sla: SlaSnapshot,
    pub(crate) timestamps: TicketTimestamps,
    pub(crate) activity: Vec<ActivityEntry>,
    pub(crate) rating: Option<Rating>,
}

impl Ticket {
    pub fn status(&self) -> TicketStatus {
        self.status
    }

    pub fn sla(&self) -> &SlaSnapshot {
        &self.sla
    }

    pub fn timestamps(&self) -> &TicketTimestamps {
        &self.timestamps
    }

    pub fn activity(&self) -> &[ActivityEntry] {
        &self.activity
    }

    pub fn rating(&self) -> Option<&Rating> {
        self.rating.as_ref()
    }

    /// Live breach check; never stored.
    pub fn is_breached(&self, now: DateTime<Utc>) -> bool {
        now > self.sla.resolution_deadline && !self.status.stops_sla_clock()
    }

    pub fn is_response_overdue(&self, now: DateTime<Utc>) -> bool {
        match self.timestamps.first_response_at {
            Some(responded_at) => responded_at > self.sla.response_deadline,
            None => !self.status.stops_sla_clock() && now > self.sla.response_deadline,
        }
    }
}

/// A ticket paired with its SLA state evaluated at `evaluated_at`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketView {
    pub ticket: Ticket,
    pub breached: bool,
    pub response_overdue: bool,
    pub evaluated_at: DateTime<Utc>,
}

impl TicketView {
    pub fn at(ticket: Ticket, now: DateTime<Utc>) -> Self {
        let breached = ticket.is_breached(now);
        let response_overdue = ticket.is_response_overdue(now);
        Self { ticket, breached, response_overdue, evaluated_at: now }
    }
}

#[cfg(test)]
mod tests {
    use super::{TicketStatus, TicketType};

    #[test]
    fn ticket_status_round_trips_from_storage_encoding() {
        for status in TicketStatus::ALL {
            assert_eq!(TicketStatus::parse(status.as_str()), Some(status));
        }
    }

    #[test]
    fn only_closed_and_cancelled_are_terminal() {
        let terminal: Vec<TicketStatus> =
            TicketStatus::ALL.into_iter().filter(TicketStatus::is_terminal).collect();
        assert_eq!(terminal, vec![TicketStatus::Closed, TicketStatus::Cancelled]);
        assert!(TicketStatus::Resolved.stops_sla_clock());
    }

    #[test]
    fn ticket_type_parse_rejects_unknown_values() {
        assert_eq!(TicketType::parse("Incident"), Some(TicketType::Incident));
        assert_eq!(TicketType::parse("outage"), None);
    }
}
