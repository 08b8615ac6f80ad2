//! Category SLA catalog and deadline arithmetic.
//!
//! Deadlines are plain wall-clock offsets from the supplied instant. The catalog is an explicit
//! value handed to whoever needs it, so tests can build one from fixed categories.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::category::{Category, CategoryId, SlaTargets};
use crate::domain::priority::Priority;
use crate::domain::ticket::SlaSnapshot;
use crate::errors::DomainError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deadlines {
    pub response_deadline: DateTime<Utc>,
    pub resolution_deadline: DateTime<Utc>,
}

pub fn deadlines_from(targets: SlaTargets, now: DateTime<Utc>) -> Result<Deadlines, DomainError> {
    Ok(Deadlines {
        response_deadline: offset_hours(now, targets.response_hours)?,
        resolution_deadline: offset_hours(now, targets.resolution_hours)?,
    })
}

fn offset_hours(now: DateTime<Utc>, hours: u32) -> Result<DateTime<Utc>, DomainError> {
    now.checked_add_signed(Duration::hours(i64::from(hours))).ok_or_else(|| {
        DomainError::InvariantViolation(format!(
            "sla deadline {hours}h after {now} is out of range"
        ))
    })
}

#[derive(Clone, Debug, Default)]
pub struct SlaCatalog {
    categories: HashMap<CategoryId, Category>,
    priority_overrides: BTreeMap<Priority, SlaTargets>,
}

impl SlaCatalog {
    pub fn new(
        categories: Vec<Category>,
        priority_overrides: BTreeMap<Priority, SlaTargets>,
    ) -> Self {
        let categories =
            categories.into_iter().map(|category| (category.id.clone(), category)).collect();
        Self { categories, priority_overrides }
    }

    pub fn category(&self, id: &CategoryId) -> Result<&Category, DomainError> {
        self.categories
            .get(id)
            .ok_or_else(|| DomainError::UnknownCategory { category_id: id.0.clone() })
    }

    pub fn priority_override(&self, priority: Priority) -> Option<SlaTargets> {
        self.priority_overrides.get(&priority).copied()
    }

    /// Override entry for the priority when present, otherwise the category's own targets.
    pub fn targets_for(
        &self,
        category_id: &CategoryId,
        priority: Priority,
    ) -> Result<SlaTargets, DomainError> {
        let category = self.category(category_id)?;
        Ok(self.priority_override(priority).unwrap_or(category.sla))
    }

    pub fn compute_deadlines(
        &self,
        category_id: &CategoryId,
        priority: Priority,
        now: DateTime<Utc>,
    ) -> Result<Deadlines, DomainError> {
        deadlines_from(self.targets_for(category_id, priority)?, now)
    }

    pub fn snapshot(
        &self,
        category_id: &CategoryId,
        priority: Priority,
        now: DateTime<Utc>,
    ) -> Result<SlaSnapshot, DomainError> {
        let targets = self.targets_for(category_id, priority)?;
        let deadlines = deadlines_from(targets, now)?;
        Ok(SlaSnapshot {
            response_hours: targets.response_hours,
            resolution_hours: targets.resolution_hours,
            response_deadline: deadlines.response_deadline,
            resolution_deadline: deadlines.resolution_deadline,
            resolved_within_sla: None,
        })
    }
}
