use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::models::domain::Urgency;

/// Matching requirements for one inbound request
///
/// Immutable once constructed; validated before any I/O happens. A request
/// may carry explicit expertise tags, free-form text to extract tags from,
/// or both.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_criteria"))]
pub struct MatchCriteria {
    #[serde(rename = "requiredExpertise", default)]
    pub required_expertise: Vec<String>,
    #[serde(rename = "preferredExpertise", default)]
    pub preferred_expertise: Vec<String>,
    #[serde(rename = "budgetMin", default)]
    pub budget_min: Option<f64>,
    #[serde(rename = "budgetMax", default)]
    pub budget_max: Option<f64>,
    pub urgency: Urgency,
    /// Engagement complexity, 1 (trivial) to 10 (major project)
    #[validate(range(min = 1, max = 10))]
    pub complexity: u8,
    #[serde(default)]
    pub location: Option<String>,
    /// Free-form request description, used for keyword extraction when no
    /// explicit tags were supplied
    #[serde(rename = "requestText", default)]
    pub request_text: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: u16,
}

fn default_limit() -> u16 {
    20
}

impl Default for MatchCriteria {
    fn default() -> Self {
        Self {
            required_expertise: Vec::new(),
            preferred_expertise: Vec::new(),
            budget_min: None,
            budget_max: None,
            urgency: Urgency::Medium,
            complexity: 5,
            location: None,
            request_text: None,
            limit: default_limit(),
        }
    }
}

impl MatchCriteria {
    /// Budget midpoint, if a budget range was supplied
    pub fn budget_midpoint(&self) -> Option<f64> {
        match (self.budget_min, self.budget_max) {
            (Some(min), Some(max)) => Some((min + max) / 2.0),
            (Some(v), None) | (None, Some(v)) => Some(v),
            (None, None) => None,
        }
    }
}

fn validate_criteria(criteria: &MatchCriteria) -> Result<(), ValidationError> {
    let has_tags =
        !criteria.required_expertise.is_empty() || !criteria.preferred_expertise.is_empty();
    let has_text = criteria
        .request_text
        .as_deref()
        .is_some_and(|t| !t.trim().is_empty());

    if !has_tags && !has_text {
        return Err(ValidationError::new("missing_expertise_or_text"));
    }

    if let (Some(min), Some(max)) = (criteria.budget_min, criteria.budget_max) {
        if min > max {
            return Err(ValidationError::new("budget_min_exceeds_max"));
        }
    }

    if criteria
        .budget_min
        .or(criteria.budget_max)
        .is_some_and(|v| v < 0.0)
    {
        return Err(ValidationError::new("negative_budget"));
    }

    Ok(())
}
