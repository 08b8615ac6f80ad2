use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::category::CategoryId;
use crate::domain::priority::Priority;
use crate::domain::ticket::{
    ActivityEntry, ActivityId, ActivityKind, Rating, Requester, Ticket, TicketId, TicketStatus,
    TicketTimestamps, TicketType, Visibility,
};
use crate::errors::DomainError;
use crate::sla::SlaCatalog;

pub const MIN_RATING: u8 = 1;
pub const MAX_RATING: u8 = 5;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTicket {
    pub title: String,
    pub description: String,
    pub ticket_type: TicketType,
    pub category_id: CategoryId,
    pub subcategory: Option<String>,
    pub priority: Priority,
    pub requester: Requester,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub from: TicketStatus,
    pub to: TicketStatus,
    pub activity_id: ActivityId,
    pub reopened: bool,
}

/// Statuses reachable from `from` in one step.
pub fn allowed_transitions(from: TicketStatus) -> &'static [TicketStatus] {
    use TicketStatus::{
        AwaitingCustomer, AwaitingThirdParty, Cancelled, Closed, InProgress, Open, Resolved,
    };

    match from {
        Open => &[InProgress, Cancelled],
        InProgress => &[AwaitingCustomer, AwaitingThirdParty, Resolved, Cancelled],
        AwaitingCustomer | AwaitingThirdParty => &[InProgress, Cancelled],
        Resolved => &[Closed, InProgress],
        Closed | Cancelled => &[],
    }
}

pub fn can_transition(from: TicketStatus, to: TicketStatus) -> bool {
    allowed_transitions(from).contains(&to)
}

#[derive(Clone, Debug)]
pub struct TicketLifecycle {
    allow_reopen: bool,
}

impl Default for TicketLifecycle {
    fn default() -> Self {
        Self { allow_reopen: true }
    }
}

impl TicketLifecycle {
    pub fn new(allow_reopen: bool) -> Self {
        Self { allow_reopen }
    }

    pub fn allows(&self, from: TicketStatus, to: TicketStatus) -> bool {
        if !self.allow_reopen && from == TicketStatus::Resolved && to == TicketStatus::InProgress {
            return false;
        }
        can_transition(from, to)
    }

    /// Builds a new `open` ticket with its SLA snapshot taken from `catalog` at `now`.
    pub fn open(
        &self,
        catalog: &SlaCatalog,
        id: TicketId,
        number: u64,
        draft: NewTicket,
        now: DateTime<Utc>,
    ) -> Result<Ticket, DomainError> {
        if draft.title.trim().is_empty() {
            return Err(DomainError::InvariantViolation("ticket title must not be empty".to_owned()));
        }
        if draft.requester.name.trim().is_empty() || !draft.requester.email.contains('@') {
            return Err(DomainError::InvariantViolation(
                "requester needs a name and a valid email".to_owned(),
            ));
        }

        let category = catalog.category(&draft.category_id)?;
        if !category.active {
            return Err(DomainError::InvalidState(format!(
                "category `{}` is inactive",
                category.id.0
            )));
        }
        if let Some(subcategory) = &draft.subcategory {
            if !category.has_subcategory(subcategory) {
                return Err(DomainError::UnknownSubcategory {
                    category_id: category.id.0.clone(),
                    subcategory: subcategory.clone(),
                });
            }
        }

        let sla = catalog.snapshot(&draft.category_id, draft.priority, now)?;
        let opened = activity(
            ActivityKind::System,
            format!("ticket #{number} opened with {} priority", draft.priority),
            &draft.requester.email,
            Visibility::Public,
            now,
        );

        Ok(Ticket {
            id,
            number,
            title: draft.title.trim().to_owned(),
            description: draft.description,
            ticket_type: draft.ticket_type,
            category_id: draft.category_id,
            subcategory: draft.subcategory,
            priority: draft.priority,
            requester: draft.requester,
            status: TicketStatus::Open,
            sla,
            timestamps: TicketTimestamps {
                created_at: now,
                first_response_at: None,
                resolved_at: None,
                closed_at: None,
                updated_at: now,
            },
            activity: vec![opened],
            rating: None,
        })
    }

    pub fn transition(
        &self,
        ticket: &mut Ticket,
        to: TicketStatus,
        actor: &str,
        comment: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<TransitionOutcome, DomainError> {
        let from = ticket.status;
        if !self.allows(from, to) {
            return Err(DomainError::InvalidTransition { from, to });
        }

        let reopened = from == TicketStatus::Resolved && to == TicketStatus::InProgress;
        if from == TicketStatus::Open && ticket.timestamps.first_response_at.is_none() {
            ticket.timestamps.first_response_at = Some(now);
        }
        if to == TicketStatus::Resolved && ticket.timestamps.resolved_at.is_none() {
            ticket.timestamps.resolved_at = Some(now);
            ticket.sla.resolved_within_sla = Some(now <= ticket.sla.resolution_deadline);
        }
        if to == TicketStatus::Closed {
            ticket.timestamps.closed_at = Some(now);
        }

        let mut description = format!("status changed from {from} to {to}");
        if let Some(comment) = comment.map(str::trim).filter(|comment| !comment.is_empty()) {
            description.push_str(": ");
            description.push_str(comment);
        }
        let entry = activity(ActivityKind::StatusChange, description, actor, Visibility::Public, now);
        let activity_id = entry.id.clone();

        ticket.status = to;
        ticket.activity.push(entry);
        ticket.timestamps.updated_at = now;

        Ok(TransitionOutcome { from, to, activity_id, reopened })
    }

    /// Appends a comment. A public comment from anyone but the requester counts as the first
    /// response when none has been recorded yet.
    pub fn comment(
        &self,
        ticket: &mut Ticket,
        author: &str,
        body: &str,
        visibility: Visibility,
        now: DateTime<Utc>,
    ) -> Result<ActivityId, DomainError> {
        if ticket.status.is_terminal() {
            return Err(DomainError::InvalidState(format!(
                "ticket #{} is {} and accepts no further activity",
                ticket.number, ticket.status
            )));
        }
        let body = body.trim();
        if body.is_empty() {
            return Err(DomainError::InvariantViolation("comment must not be empty".to_owned()));
        }

        let from_requester = author.trim().eq_ignore_ascii_case(ticket.requester.email.trim());
        if visibility == Visibility::Public
            && !from_requester
            && ticket.timestamps.first_response_at.is_none()
        {
            ticket.timestamps.first_response_at = Some(now);
        }

        let entry = activity(ActivityKind::Comment, body.to_owned(), author, visibility, now);
        let id = entry.id.clone();
        ticket.activity.push(entry);
        ticket.timestamps.updated_at = now;
        Ok(id)
    }

    pub fn rate(
        &self,
        ticket: &mut Ticket,
        score: u8,
        comment: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        if !matches!(ticket.status, TicketStatus::Resolved | TicketStatus::Closed) {
            return Err(DomainError::InvalidState(format!(
                "ticket #{} cannot be rated while {}",
                ticket.number, ticket.status
            )));
        }
        if ticket.rating.is_some() {
            return Err(DomainError::InvalidState(format!(
                "ticket #{} has already been rated",
                ticket.number
            )));
        }
        if !(MIN_RATING..=MAX_RATING).contains(&score) {
            return Err(DomainError::InvariantViolation(format!(
                "rating must be between {MIN_RATING} and {MAX_RATING}"
            )));
        }

        ticket.rating = Some(Rating { score, comment, rated_at: now });
        ticket.timestamps.updated_at = now;
        Ok(())
    }
}

fn activity(
    kind: ActivityKind,
    description: String,
    author: &str,
    visibility: Visibility,
    now: DateTime<Utc>,
) -> ActivityEntry {
    ActivityEntry {
        id: ActivityId(Uuid::new_v4().to_string()),
        kind,
        description,
        author: author.to_owned(),
        visibility,
        created_at: now,
    }
}
