use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CategoryId(pub String);

/// Response and resolution targets, in wall-clock hours.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlaTargets {
    pub response_hours: u32,
    pub resolution_hours: u32,
}

impl SlaTargets {
    /// Ten years of wall-clock hours.
    pub const MAX_HOURS: u32 = 87_600;

    pub fn new(response_hours: u32, resolution_hours: u32) -> Self {
        Self { response_hours, resolution_hours }
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        if self.response_hours == 0 || self.resolution_hours == 0 {
            return Err(DomainError::InvariantViolation(
                "sla response_hours and resolution_hours must be greater than zero".to_owned(),
            ));
        }
        if self.response_hours > Self::MAX_HOURS || self.resolution_hours > Self::MAX_HOURS {
            return Err(DomainError::InvariantViolation(format!(
                "sla hours must not exceed {}",
                Self::MAX_HOURS
            )));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    pub description: Option<String>,
    pub subcategories: Vec<String>,
    pub sla: SlaTargets,
    pub active: bool,
}

impl Category {
    pub fn has_subcategory(&self, name: &str) -> bool {
        let wanted = name.trim().to_lowercase();
        self.subcategories.iter().any(|candidate| candidate.trim().to_lowercase() == wanted)
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        if self.id.0.trim().is_empty() {
            return Err(DomainError::InvariantViolation("category id must not be empty".to_owned()));
        }
        if self.name.trim().is_empty() {
            return Err(DomainError::InvariantViolation(
                "category name must not be empty".to_owned(),
            ));
        }
        self.sla.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::{Category, CategoryId, SlaTargets};

    fn hardware() -> Category {
        Category {
            id: CategoryId("hardware".to_owned()),
            name: "Hardware".to_owned(),
            description: None,
            subcategories: vec!["Printer".to_owned(), "Laptop".to_owned()],
            sla: SlaTargets::new(4, 48),
            active: true,
        }
    }

    #[test]
    fn subcategory_lookup_ignores_case_and_padding() {
        let category = hardware();
        assert!(category.has_subcategory(" printer "));
        assert!(!category.has_subcategory("Monitor"));
    }

    #[test]
    fn zero_hour_targets_are_invalid() {
        let mut category = hardware();
        category.sla = SlaTargets::new(0, 48);
        assert!(category.validate().is_err());
    }

    #[test]
    fn targets_are_bounded_at_ten_years() {
        let mut category = hardware();
        category.sla = SlaTargets::new(4, SlaTargets::MAX_HOURS);
        assert!(category.validate().is_ok());

        category.sla = SlaTargets::new(4, SlaTargets::MAX_HOURS + 1);
        assert!(category.validate().is_err());

        category.sla = SlaTargets::new(4, u32::MAX);
        assert!(category.validate().is_err());
    }
}
