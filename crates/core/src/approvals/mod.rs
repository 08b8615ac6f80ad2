//! Multi-level approval chain for purchase requisitions.
//!
//! Levels are decided strictly in order. A rejection at any level ends the chain; the levels
//! above it stay `pending` but are never actionable again.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::priority::Priority;
use crate::domain::requisition::{
    ApprovalStep, Decision, LineItem, LineItemId, Requisition, RequisitionId, RequisitionStatus,
};
use crate::errors::DomainError;

pub const DEFAULT_MAX_APPROVAL_LEVELS: u32 = 5;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewLineItem {
    pub description: String,
    pub quantity: Decimal,
    pub unit: String,
    pub unit_price: Decimal,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApproverAssignment {
    pub level: u32,
    pub approver: String,
    pub role: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewRequisition {
    pub requester: String,
    pub department: String,
    pub priority: Priority,
    pub desired_delivery: Option<NaiveDate>,
    pub justification: String,
    pub items: Vec<NewLineItem>,
    pub approval_chain: Vec<ApproverAssignment>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionInput {
    pub level: u32,
    pub decision: Decision,
    pub approver: String,
    pub comment: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionOutcome {
    pub level: u32,
    pub decision: Decision,
    pub previous_status: RequisitionStatus,
    pub status: RequisitionStatus,
    pub current_level: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ItemChange {
    pub item_id: LineItemId,
    pub previous_total: Decimal,
    pub total: Decimal,
    pub approvals_reset: bool,
}

#[derive(Clone, Debug)]
pub struct ApprovalEngine {
    max_levels: u32,
}

impl Default for ApprovalEngine {
    fn default() -> Self {
        Self { max_levels: DEFAULT_MAX_APPROVAL_LEVELS }
    }
}

impl ApprovalEngine {
    pub fn new(max_levels: u32) -> Self {
        Self { max_levels: max_levels.max(1) }
    }

    pub fn max_levels(&self) -> u32 {
        self.max_levels
    }

    pub fn create(
        &self,
        id: RequisitionId,
        number: u64,
        reference: String,
        draft: NewRequisition,
        now: DateTime<Utc>,
    ) -> Result<Requisition, DomainError> {
        if draft.requester.trim().is_empty() || draft.department.trim().is_empty() {
            return Err(DomainError::InvariantViolation(
                "requisition needs a requester and a department".to_owned(),
            ));
        }
        let approval_chain = self.build_chain(&draft.approval_chain)?;

        let mut requisition = Requisition {
            id,
            number,
            reference,
            requester: draft.requester,
            department: draft.department,
            priority: draft.priority,
            desired_delivery: draft.desired_delivery,
            justification: draft.justification,
            created_at: now,
            status: RequisitionStatus::Draft,
            items: Vec::new(),
            total_value: Decimal::ZERO,
            approval_chain,
            current_level: 1,
            next_item_seq: 1,
            purchase_order_ref: None,
            updated_at: now,
        };

        let mut items = Vec::with_capacity(draft.items.len());
        for item in draft.items {
            validate_item(&item)?;
            items.push(into_line_item(next_item_id(&mut requisition), item)?);
        }
        requisition.replace_items(items)?;

        Ok(requisition)
    }

    /// Moves a draft into `pending` so approvers can act on it.
    pub fn submit(
        &self,
        requisition: &mut Requisition,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        if requisition.status != RequisitionStatus::Draft {
            return Err(DomainError::InvalidState(format!(
                "requisition {} is {} and cannot be submitted",
                requisition.reference, requisition.status
            )));
        }
        if requisition.items.is_empty() {
            return Err(DomainError::InvalidState(format!(
                "requisition {} has no line items",
                requisition.reference
            )));
        }
        if requisition.approval_chain.is_empty() {
            return Err(DomainError::InvalidState(format!(
                "requisition {} has no approval chain",
                requisition.reference
            )));
        }

        requisition.status = RequisitionStatus::Pending;
        requisition.updated_at = now;
        Ok(())
    }

    pub fn record_decision(
        &self,
        requisition: &mut Requisition,
        input: DecisionInput,
        now: DateTime<Utc>,
    ) -> Result<DecisionOutcome, DomainError> {
        let previous_status = requisition.status;
        if previous_status.is_locked() {
            return Err(DomainError::RequisitionLocked { status: previous_status });
        }
        if previous_status == RequisitionStatus::Draft {
            return Err(DomainError::InvalidState(format!(
                "requisition {} must be submitted before approval decisions",
                requisition.reference
            )));
        }
        let approved = match input.decision {
            Decision::Approved => true,
            Decision::Rejected => false,
            Decision::Pending => {
                return Err(DomainError::InvariantViolation(
                    "a decision must be approved or rejected".to_owned(),
                ))
            }
        };

        let current_level = requisition.current_level;
        let Some(index) =
            requisition.approval_chain.iter().position(|step| step.level == input.level)
        else {
            return Err(DomainError::OutOfOrder { level: input.level, current_level });
        };
        if requisition.approval_chain[index].decision != Decision::Pending {
            return Err(DomainError::AlreadyDecided { level: input.level });
        }
        if input.level != current_level {
            return Err(DomainError::OutOfOrder { level: input.level, current_level });
        }

        let step = &requisition.approval_chain[index];
        if normalize_key(&step.approver) != normalize_key(&input.approver) {
            return Err(DomainError::ApproverMismatch {
                level: input.level,
                expected: step.approver.clone(),
                actual: input.approver,
            });
        }

        let total_levels = requisition.total_levels();
        let step = &mut requisition.approval_chain[index];
        step.decision = input.decision;
        step.decided_at = Some(now);
        step.comment = input.comment.filter(|comment| !comment.trim().is_empty());

        requisition.status = if !approved {
            RequisitionStatus::Rejected
        } else {
            requisition.current_level = input.level + 1;
            if input.level == total_levels {
                RequisitionStatus::Approved
            } else {
                RequisitionStatus::InApproval
            }
        };
        requisition.updated_at = now;

        Ok(DecisionOutcome {
            level: input.level,
            decision: input.decision,
            previous_status,
            status: requisition.status,
            current_level: requisition.current_level,
        })
    }

    pub fn add_item(
        &self,
        requisition: &mut Requisition,
        item: NewLineItem,
        now: DateTime<Utc>,
    ) -> Result<ItemChange, DomainError> {
        ensure_editable(requisition)?;
        validate_item(&item)?;

        let previous_total = requisition.total_value;
        let id = peek_item_id(requisition);
        let mut items = requisition.items.clone();
        items.push(into_line_item(id.clone(), item)?);
        requisition.replace_items(items)?;
        requisition.next_item_seq += 1;
        Ok(self.after_item_edit(requisition, id, previous_total, now))
    }

    pub fn update_item(
        &self,
        requisition: &mut Requisition,
        item_id: &LineItemId,
        item: NewLineItem,
        now: DateTime<Utc>,
    ) -> Result<ItemChange, DomainError> {
        ensure_editable(requisition)?;
        validate_item(&item)?;
        let index = item_index(requisition, item_id)?;

        let previous_total = requisition.total_value;
        let mut items = requisition.items.clone();
        items[index] = into_line_item(item_id.clone(), item)?;
        requisition.replace_items(items)?;
        Ok(self.after_item_edit(requisition, item_id.clone(), previous_total, now))
    }

    pub fn remove_item(
        &self,
        requisition: &mut Requisition,
        item_id: &LineItemId,
        now: DateTime<Utc>,
    ) -> Result<ItemChange, DomainError> {
        ensure_editable(requisition)?;
        let index = item_index(requisition, item_id)?;
        if requisition.status != RequisitionStatus::Draft && requisition.items.len() == 1 {
            return Err(DomainError::InvalidState(format!(
                "submitted requisition {} must keep at least one line item",
                requisition.reference
            )));
        }

        let previous_total = requisition.total_value;
        let mut items = requisition.items.clone();
        items.remove(index);
        requisition.replace_items(items)?;
        Ok(self.after_item_edit(requisition, item_id.clone(), previous_total, now))
    }

    pub fn cancel(
        &self,
        requisition: &mut Requisition,
        now: DateTime<Utc>,
    ) -> Result<RequisitionStatus, DomainError> {
        let previous = requisition.status;
        if previous.is_locked() {
            return Err(DomainError::RequisitionLocked { status: previous });
        }
        requisition.status = RequisitionStatus::Cancelled;
        requisition.updated_at = now;
        Ok(previous)
    }

    /// Records that a purchase order was raised from an approved requisition.
    pub fn mark_converted(
        &self,
        requisition: &mut Requisition,
        purchase_order_ref: &str,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        if requisition.status != RequisitionStatus::Approved {
            return Err(DomainError::InvalidState(format!(
                "requisition {} is {}; only approved requisitions can be converted",
                requisition.reference, requisition.status
            )));
        }
        let purchase_order_ref = purchase_order_ref.trim();
        if purchase_order_ref.is_empty() {
            return Err(DomainError::InvariantViolation(
                "purchase order reference must not be empty".to_owned(),
            ));
        }

        requisition.status = RequisitionStatus::Converted;
        requisition.purchase_order_ref = Some(purchase_order_ref.to_owned());
        requisition.updated_at = now;
        Ok(())
    }

    fn build_chain(
        &self,
        assignments: &[ApproverAssignment],
    ) -> Result<Vec<ApprovalStep>, DomainError> {
        if assignments.len() as u32 > self.max_levels {
            return Err(DomainError::InvariantViolation(format!(
                "approval chain has {} levels; at most {} are allowed",
                assignments.len(),
                self.max_levels
            )));
        }

        assignments
            .iter()
            .enumerate()
            .map(|(index, assignment)| {
                let expected = index as u32 + 1;
                if assignment.level != expected {
                    return Err(DomainError::InvariantViolation(format!(
                        "approval levels must be contiguous from 1; expected level {expected}, found {}",
                        assignment.level
                    )));
                }
                if assignment.approver.trim().is_empty() {
                    return Err(DomainError::InvariantViolation(format!(
                        "approval level {expected} has no approver"
                    )));
                }
                Ok(ApprovalStep::new(assignment.level, assignment.approver.trim(), &assignment.role))
            })
            .collect()
    }

    fn after_item_edit(
        &self,
        requisition: &mut Requisition,
        item_id: LineItemId,
        previous_total: Decimal,
        now: DateTime<Utc>,
    ) -> ItemChange {
        let total = requisition.total_value;

        let any_approved =
            requisition.approval_chain.iter().any(|step| step.decision == Decision::Approved);
        let approvals_reset = total != previous_total && any_approved;
        if approvals_reset {
            requisition.approval_chain.iter_mut().for_each(ApprovalStep::reset);
            requisition.current_level = 1;
            requisition.status = RequisitionStatus::Pending;
        }
        requisition.updated_at = now;

        ItemChange { item_id, previous_total, total, approvals_reset }
    }
}

fn ensure_editable(requisition: &Requisition) -> Result<(), DomainError> {
    if requisition.status.is_locked() {
        return Err(DomainError::RequisitionLocked { status: requisition.status });
    }
    Ok(())
}

fn validate_item(item: &NewLineItem) -> Result<(), DomainError> {
    if item.description.trim().is_empty() {
        return Err(DomainError::InvariantViolation(
            "line item description must not be empty".to_owned(),
        ));
    }
    if item.quantity <= Decimal::ZERO {
        return Err(DomainError::InvariantViolation(
            "line item quantity must be greater than zero".to_owned(),
        ));
    }
    if item.unit_price < Decimal::ZERO {
        return Err(DomainError::InvariantViolation(
            "line item unit price must not be negative".to_owned(),
        ));
    }
    Ok(())
}

fn item_index(requisition: &Requisition, item_id: &LineItemId) -> Result<usize, DomainError> {
    requisition
        .items
        .iter()
        .position(|item| &item.id == item_id)
        .ok_or_else(|| DomainError::NotFound { entity: "line item", id: item_id.0.clone() })
}

fn peek_item_id(requisition: &Requisition) -> LineItemId {
    LineItemId(format!("item-{}", requisition.next_item_seq))
}

fn next_item_id(requisition: &mut Requisition) -> LineItemId {
    let id = peek_item_id(requisition);
    requisition.next_item_seq += 1;
    id
}

fn into_line_item(id: LineItemId, item: NewLineItem) -> Result<LineItem, DomainError> {
    LineItem::new(id, item.description.trim(), item.quantity, item.unit, item.unit_price)
}

fn normalize_key(raw: &str) -> String {
    raw.trim().to_ascii_lowercase()
}
