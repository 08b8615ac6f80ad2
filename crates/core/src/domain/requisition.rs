use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::priority::Priority;
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequisitionId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LineItemId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequisitionStatus {
    Draft,
    Pending,
    InApproval,
    Approved,
    Rejected,
    Cancelled,
    Converted,
}

impl RequisitionStatus {
    pub const ALL: [RequisitionStatus; 7] = [
        Self::Draft,
        Self::Pending,
        Self::InApproval,
        Self::Approved,
        Self::Rejected,
        Self::Cancelled,
        Self::Converted,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Pending => "pending",
            Self::InApproval => "in_approval",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Cancelled => "cancelled",
            Self::Converted => "converted",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "draft" => Some(Self::Draft),
            "pending" => Some(Self::Pending),
            "in_approval" => Some(Self::InApproval),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            "cancelled" => Some(Self::Cancelled),
            "converted" => Some(Self::Converted),
            _ => None,
        }
    }

    /// Statuses in which no approval decision or item edit is accepted.
    pub fn is_locked(&self) -> bool {
        matches!(self, Self::Approved | Self::Rejected | Self::Cancelled | Self::Converted)
    }
}

impl fmt::Display for RequisitionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Pending,
    Approved,
    Rejected,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "approved" | "approve" => Some(Self::Approved),
            "rejected" | "reject" => Some(Self::Rejected),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub id: LineItemId,
    pub description: String,
    pub quantity: Decimal,
    pub unit: String,
    pub unit_price: Decimal,
    subtotal: Decimal,
}

impl LineItem {
    pub fn new(
        id: LineItemId,
        description: impl Into<String>,
        quantity: Decimal,
        unit: impl Into<String>,
        unit_price: Decimal,
    ) -> Result<Self, DomainError> {
        let subtotal = quantity.checked_mul(unit_price).ok_or_else(|| {
            DomainError::InvariantViolation(format!(
                "line item subtotal {quantity} x {unit_price} is out of range"
            ))
        })?;
        Ok(Self {
            id,
            description: description.into(),
            quantity,
            unit: unit.into(),
            unit_price,
            subtotal,
        })
    }

    pub fn subtotal(&self) -> Decimal {
        self.subtotal
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalStep {
    pub level: u32,
    pub approver: String,
    pub role: String,
    pub(crate) decision: Decision,
    pub(crate) decided_at: Option<DateTime<Utc>>,
    pub(crate) comment: Option<String>,
}

impl ApprovalStep {
    pub fn new(level: u32, approver: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            level,
            approver: approver.into(),
            role: role.into(),
            decision: Decision::Pending,
            decided_at: None,
            comment: None,
        }
    }

    pub fn decision(&self) -> Decision {
        self.decision
    }

    pub fn decided_at(&self) -> Option<DateTime<Utc>> {
        self.decided_at
    }

    pub fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }

    pub(crate) fn reset(&mut self) {
        self.decision = Decision::Pending;
        self.decided_at = None;
        self.comment = None;
    }
}

/// A purchase requisition and its approval chain.
///
/// Status, items, the stored total and the chain are mutated only by
/// [`crate::approvals::ApprovalEngine`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Requisition {
    pub id: RequisitionId,
    pub number: u64,
    pub reference: String,
    pub requester: String,
    pub department: String,
    pub priority: Priority,
    pub desired_delivery: Option<NaiveDate>,
    pub justification: String,
    pub created_at: DateTime<Utc>,
    pub(crate) status: RequisitionStatus,
    pub(crate) items: Vec<LineItem>,
    pub(crate) total_value: Decimal,
    pub(crate) approval_chain: Vec<ApprovalStep>,
    pub(crate) current_level: u32,
    pub(crate) next_item_seq: u32,
    pub(crate) purchase_order_ref: Option<String>,
    pub(crate) updated_at: DateTime<Utc>,
}

impl Requisition {
    pub fn status(&self) -> RequisitionStatus {
        self.status
    }

    pub fn items(&self) -> &[LineItem] {
        &self.items
    }

    pub fn total_value(&self) -> Decimal {
        self.total_value
    }

    pub fn approval_chain(&self) -> &[ApprovalStep] {
        &self.approval_chain
    }

    pub fn current_level(&self) -> u32 {
        self.current_level
    }

    pub fn total_levels(&self) -> u32 {
        self.approval_chain.len() as u32
    }

    /// The step awaiting a decision, if the chain is still actionable.
    pub fn current_step(&self) -> Option<&ApprovalStep> {
        if self.status.is_locked() {
            return None;
        }
        self.step(self.current_level)
    }

    pub fn step(&self, level: u32) -> Option<&ApprovalStep> {
        self.approval_chain.iter().find(|step| step.level == level)
    }

    pub fn purchase_order_ref(&self) -> Option<&str> {
        self.purchase_order_ref.as_deref()
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Swaps in a new item list, keeping the stored total untouched when the sum overflows.
    pub(crate) fn replace_items(&mut self, items: Vec<LineItem>) -> Result<(), DomainError> {
        self.total_value = items_total(&items)?;
        self.items = items;
        Ok(())
    }
}

pub fn items_total(items: &[LineItem]) -> Result<Decimal, DomainError> {
    items.iter().try_fold(Decimal::ZERO, |total, item| {
        total.checked_add(item.subtotal).ok_or_else(|| {
            DomainError::InvariantViolation("requisition total is out of range".to_owned())
        })
    })
}
