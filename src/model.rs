//! # Data model
//! Decisions own ordered alternatives and weighted criteria; ratings live
//! beside them, one per `(user, decision, alternative, criterion)`.
//!
//! Write-side inputs (`*Input`) carry the request shape and know how to
//! validate themselves against the limits the service enforces.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub type UserId = String;
pub type DecisionId = u64;
pub type AlternativeId = u64;
pub type CriterionId = u64;
pub type RatingId = u64;

/// Weight applied to a criterion created without one.
pub const DEFAULT_WEIGHT: f64 = 1.0;

pub const TITLE_MIN: usize = 3;
pub const TITLE_MAX: usize = 200;
pub const DECISION_DESCRIPTION_MAX: usize = 1000;
pub const NAME_MAX: usize = 100;
pub const DESCRIPTION_MAX: usize = 500;

/// A candidate choice within a decision. `score` is written by score calculation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alternative {
    pub id: AlternativeId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub score: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A weighted dimension used to evaluate alternatives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Criterion {
    pub id: CriterionId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_weight")]
    pub weight: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_weight() -> f64 {
    DEFAULT_WEIGHT
}

/// One user's numeric assessment of one alternative against one criterion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rating {
    pub id: RatingId,
    pub user_id: UserId,
    pub decision_id: DecisionId,
    pub alternative_id: AlternativeId,
    pub criterion_id: CriterionId,
    pub value: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Rating {
    /// Uniqueness key enforced by rating stores.
    pub fn key(&self) -> RatingKey {
        RatingKey {
            user_id: self.user_id.clone(),
            decision_id: self.decision_id,
            alternative_id: self.alternative_id,
            criterion_id: self.criterion_id,
        }
    }
}

/// `(user, decision, alternative, criterion)`: at most one rating per key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RatingKey {
    pub user_id: UserId,
    pub decision_id: DecisionId,
    pub alternative_id: AlternativeId,
    pub criterion_id: CriterionId,
}

/// Top-level entity a user creates to choose among alternatives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Decision {
    pub id: DecisionId,
    pub user_id: UserId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub alternatives: Vec<Alternative>,
    #[serde(default)]
    pub criteria: Vec<Criterion>,
    #[serde(default)]
    pub overall_score: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Decision {
    pub fn is_owned_by(&self, user: &str) -> bool {
        self.user_id == user
    }

    pub fn alternative(&self, id: AlternativeId) -> Option<&Alternative> {
        self.alternatives.iter().find(|a| a.id == id)
    }

    pub fn criterion(&self, id: CriterionId) -> Option<&Criterion> {
        self.criteria.iter().find(|c| c.id == id)
    }

    pub(crate) fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Tag mapped to free-text suggestions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutcomeRule {
    pub tag: String,
    pub suggestions: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/* ----------------------------
Write-side inputs
---------------------------- */

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DecisionInput {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl DecisionInput {
    pub fn validated(self) -> Result<(String, String)> {
        let title = required_text("Decision title", &self.title, TITLE_MIN, TITLE_MAX)?;
        let description = optional_text(
            "Decision description",
            self.description.as_deref(),
            DECISION_DESCRIPTION_MAX,
        )?;
        Ok((title, description.unwrap_or_default()))
    }
}

/// Partial update: absent fields keep their stored value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DecisionPatch {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl DecisionPatch {
    pub fn apply(self, decision: &mut Decision) -> Result<()> {
        if let Some(title) = self.title.as_deref().filter(|t| !t.trim().is_empty()) {
            decision.title = required_text("Decision title", title, TITLE_MIN, TITLE_MAX)?;
        }
        if let Some(desc) = optional_text(
            "Decision description",
            self.description.as_deref(),
            DECISION_DESCRIPTION_MAX,
        )? {
            decision.description = desc;
        }
        decision.touch();
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AlternativeInput {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl AlternativeInput {
    pub fn validated(self) -> Result<(String, Option<String>)> {
        let name = required_text("Alternative name", &self.name, 1, NAME_MAX)?;
        let description = optional_text(
            "Alternative description",
            self.description.as_deref(),
            DESCRIPTION_MAX,
        )?;
        Ok((name, description))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CriterionInput {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub weight: Option<f64>,
}

impl CriterionInput {
    pub fn validated(self) -> Result<(String, Option<String>, Option<f64>)> {
        let name = required_text("Criterion name", &self.name, 1, NAME_MAX)?;
        let description = optional_text(
            "Criterion description",
            self.description.as_deref(),
            DESCRIPTION_MAX,
        )?;
        if let Some(w) = self.weight {
            if !w.is_finite() || w < 0.0 {
                return Err(Error::InvalidInput(
                    "Criterion weight must be a non-negative number.".into(),
                ));
            }
        }
        Ok((name, description, self.weight))
    }
}

/// Accepts both the single-rating shape (`alternativeId`) and the batch item
/// shape (`alternative`).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RatingInput {
    #[serde(alias = "alternative")]
    pub alternative_id: AlternativeId,
    #[serde(alias = "criterion")]
    pub criterion_id: CriterionId,
    pub value: f64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OutcomeRuleInput {
    #[serde(default)]
    pub tag: String,
    #[serde(default)]
    pub suggestions: Vec<String>,
}

fn required_text(field: &str, raw: &str, min: usize, max: usize) -> Result<String> {
    let t = raw.trim();
    if t.is_empty() {
        return Err(Error::InvalidInput(format!("{field} is required.")));
    }
    let n = t.chars().count();
    if n < min || n > max {
        return Err(Error::InvalidInput(format!(
            "{field} must be between {min} and {max} characters."
        )));
    }
    Ok(t.to_string())
}

fn optional_text(field: &str, raw: Option<&str>, max: usize) -> Result<Option<String>> {
    match raw.map(str::trim) {
        None => Ok(None),
        Some(t) if t.chars().count() > max => Err(Error::InvalidInput(format!(
            "{field} must be at most {max} characters."
        ))),
        Some(t) => Ok(Some(t.to_string())),
    }
}
