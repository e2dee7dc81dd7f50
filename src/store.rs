//! # Storage contracts
//! The service persists through these traits; a real backend plugs in behind
//! them. `MemoryStore` implements all three for the binary and the tests.
//!
//! Rating uniqueness is a storage invariant: ratings are keyed by
//! `(user, decision, alternative, criterion)` and every write is an upsert.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;

use crate::model::{
    AlternativeId, CriterionId, Decision, DecisionId, OutcomeRule, Rating, RatingKey,
};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("backend failure: {0}")]
    Backend(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Whether an upsert inserted a new rating or overwrote an existing value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Created,
    Updated,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UpsertSummary {
    pub upserted: usize,
    pub modified: usize,
}

#[async_trait]
pub trait DecisionStore: Send + Sync {
    /// Fresh id, unique across decisions and their children.
    async fn allocate_id(&self) -> StoreResult<u64>;
    async fn insert_decision(&self, decision: Decision) -> StoreResult<()>;
    async fn get_decision(&self, id: DecisionId) -> StoreResult<Option<Decision>>;
    /// Decisions owned by `user`, newest first.
    async fn decisions_for(&self, user: &str) -> StoreResult<Vec<Decision>>;
    /// Replace the stored decision with the same id.
    async fn save_decision(&self, decision: &Decision) -> StoreResult<()>;
    async fn delete_decision(&self, id: DecisionId) -> StoreResult<bool>;
}

#[async_trait]
pub trait RatingStore: Send + Sync {
    /// All ratings `user` recorded for `decision_id`.
    async fn ratings_for(&self, decision_id: DecisionId, user: &str) -> StoreResult<Vec<Rating>>;
    async fn upsert_rating(&self, key: RatingKey, value: f64) -> StoreResult<(Rating, Upsert)>;
    /// Applied as one unit: readers never see part of the batch.
    async fn upsert_ratings(&self, items: Vec<(RatingKey, f64)>) -> StoreResult<UpsertSummary>;
    async fn purge_decision(&self, decision_id: DecisionId) -> StoreResult<usize>;
    async fn purge_alternative(
        &self,
        decision_id: DecisionId,
        alternative_id: AlternativeId,
    ) -> StoreResult<usize>;
    async fn purge_criterion(
        &self,
        decision_id: DecisionId,
        criterion_id: CriterionId,
    ) -> StoreResult<usize>;
}

#[async_trait]
pub trait OutcomeRuleStore: Send + Sync {
    /// Fails with `Conflict` when the tag already exists.
    async fn create_rule(&self, tag: String, suggestions: Vec<String>) -> StoreResult<OutcomeRule>;
    async fn find_rule(&self, tag: &str) -> StoreResult<Option<OutcomeRule>>;
    async fn all_rules(&self) -> StoreResult<Vec<OutcomeRule>>;
    async fn replace_suggestions(
        &self,
        tag: &str,
        suggestions: Vec<String>,
    ) -> StoreResult<Option<OutcomeRule>>;
    async fn delete_rule(&self, tag: &str) -> StoreResult<bool>;
}

pub type DynDecisionStore = Arc<dyn DecisionStore>;
pub type DynRatingStore = Arc<dyn RatingStore>;
pub type DynOutcomeRuleStore = Arc<dyn OutcomeRuleStore>;

/// Process-local store; contents are lost on restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    next_id: AtomicU64,
    next_rating_id: AtomicU64,
    decisions: Mutex<HashMap<DecisionId, Decision>>,
    ratings: Mutex<BTreeMap<RatingKey, Rating>>,
    rules: Mutex<BTreeMap<String, OutcomeRule>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rating_count(&self) -> usize {
        self.ratings.lock().len()
    }

    fn purge_where(&self, keep: impl Fn(&RatingKey) -> bool) -> usize {
        let mut ratings = self.ratings.lock();
        let before = ratings.len();
        ratings.retain(|k, _| keep(k));
        before - ratings.len()
    }

    fn write_rating(
        &self,
        ratings: &mut BTreeMap<RatingKey, Rating>,
        key: RatingKey,
        value: f64,
    ) -> (Rating, Upsert) {
        let now = Utc::now();
        if let Some(existing) = ratings.get_mut(&key) {
            existing.value = value;
            existing.updated_at = now;
            return (existing.clone(), Upsert::Updated);
        }
        let rating = Rating {
            id: self.next_rating_id.fetch_add(1, Ordering::Relaxed) + 1,
            user_id: key.user_id.clone(),
            decision_id: key.decision_id,
            alternative_id: key.alternative_id,
            criterion_id: key.criterion_id,
            value,
            created_at: now,
            updated_at: now,
        };
        ratings.insert(key, rating.clone());
        (rating, Upsert::Created)
    }
}

#[async_trait]
impl DecisionStore for MemoryStore {
    async fn allocate_id(&self) -> StoreResult<u64> {
        Ok(self.next_id.fetch_add(1, Ordering::Relaxed) + 1)
    }

    async fn insert_decision(&self, decision: Decision) -> StoreResult<()> {
        let mut map = self.decisions.lock();
        if map.contains_key(&decision.id) {
            return Err(StoreError::Conflict(format!(
                "decision {} already exists",
                decision.id
            )));
        }
        map.insert(decision.id, decision);
        Ok(())
    }

    async fn get_decision(&self, id: DecisionId) -> StoreResult<Option<Decision>> {
        Ok(self.decisions.lock().get(&id).cloned())
    }

    async fn decisions_for(&self, user: &str) -> StoreResult<Vec<Decision>> {
        let mut out = self
            .decisions
            .lock()
            .values()
            .filter(|d| d.is_owned_by(user))
            .cloned()
            .collect::<Vec<_>>();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(out)
    }

    async fn save_decision(&self, decision: &Decision) -> StoreResult<()> {
        let mut map = self.decisions.lock();
        match map.get_mut(&decision.id) {
            Some(slot) => {
                *slot = decision.clone();
                Ok(())
            }
            None => Err(StoreError::Backend(format!(
                "decision {} no longer exists",
                decision.id
            ))),
        }
    }

    async fn delete_decision(&self, id: DecisionId) -> StoreResult<bool> {
        Ok(self.decisions.lock().remove(&id).is_some())
    }
}

#[async_trait]
impl RatingStore for MemoryStore {
    async fn ratings_for(&self, decision_id: DecisionId, user: &str) -> StoreResult<Vec<Rating>> {
        Ok(self
            .ratings
            .lock()
            .values()
            .filter(|r| r.decision_id == decision_id && r.user_id == user)
            .cloned()
            .collect())
    }

    async fn upsert_rating(&self, key: RatingKey, value: f64) -> StoreResult<(Rating, Upsert)> {
        let mut ratings = self.ratings.lock();
        Ok(self.write_rating(&mut ratings, key, value))
    }

    async fn upsert_ratings(&self, items: Vec<(RatingKey, f64)>) -> StoreResult<UpsertSummary> {
        let mut ratings = self.ratings.lock();
        let mut summary = UpsertSummary::default();
        for (key, value) in items {
            match self.write_rating(&mut ratings, key, value).1 {
                Upsert::Created => summary.upserted += 1,
                Upsert::Updated => summary.modified += 1,
            }
        }
        Ok(summary)
    }

    async fn purge_decision(&self, decision_id: DecisionId) -> StoreResult<usize> {
        Ok(self.purge_where(|k| k.decision_id != decision_id))
    }

    async fn purge_alternative(
        &self,
        decision_id: DecisionId,
        alternative_id: AlternativeId,
    ) -> StoreResult<usize> {
        Ok(self.purge_where(|k| !(k.decision_id == decision_id && k.alternative_id == alternative_id)))
    }

    async fn purge_criterion(
        &self,
        decision_id: DecisionId,
        criterion_id: CriterionId,
    ) -> StoreResult<usize> {
        Ok(self.purge_where(|k| !(k.decision_id == decision_id && k.criterion_id == criterion_id)))
    }
}

#[async_trait]
impl OutcomeRuleStore for MemoryStore {
    async fn create_rule(&self, tag: String, suggestions: Vec<String>) -> StoreResult<OutcomeRule> {
        let mut rules = self.rules.lock();
        if rules.contains_key(&tag) {
            return Err(StoreError::Conflict(
                "An outcome rule with this tag already exists. Consider updating it.".into(),
            ));
        }
        let now = Utc::now();
        let rule = OutcomeRule {
            tag: tag.clone(),
            suggestions,
            created_at: now,
            updated_at: now,
        };
        rules.insert(tag, rule.clone());
        Ok(rule)
    }

    async fn find_rule(&self, tag: &str) -> StoreResult<Option<OutcomeRule>> {
        Ok(self.rules.lock().get(tag).cloned())
    }

    async fn all_rules(&self) -> StoreResult<Vec<OutcomeRule>> {
        Ok(self.rules.lock().values().cloned().collect())
    }

    async fn replace_suggestions(
        &self,
        tag: &str,
        suggestions: Vec<String>,
    ) -> StoreResult<Option<OutcomeRule>> {
        let mut rules = self.rules.lock();
        Ok(rules.get_mut(tag).map(|rule| {
            rule.suggestions = suggestions;
            rule.updated_at = Utc::now();
            rule.clone()
        }))
    }

    async fn delete_rule(&self, tag: &str) -> StoreResult<bool> {
        Ok(self.rules.lock().remove(tag).is_some())
    }
}
