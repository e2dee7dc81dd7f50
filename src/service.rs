//! # Decision service
//! Request orchestration around the stores and the score calculator:
//! ownership checks, child CRUD with rating cascades, rating upserts, and the
//! read-calculate-write sequence that persists scores.
//!
//! Every mutation of a decision (and every score calculation) runs inside that
//! decision's lock, so a calculation never reads a rating batch mid-write and
//! a cascade never races a rating upsert.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use metrics::{counter, histogram};
use serde::Serialize;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, info};

use crate::config::RatingScale;
use crate::error::{Error, Result};
use crate::metrics::{RATINGS_PURGED, RATINGS_UPSERTED, SCORES_CALCULATED, SCORE_CALCULATION_MS};
use crate::model::{
    Alternative, AlternativeId, AlternativeInput, Criterion, CriterionId, CriterionInput,
    Decision, DecisionId, DecisionInput, DecisionPatch, Rating, RatingInput, RatingKey,
    DEFAULT_WEIGHT,
};
use crate::scoring::{self, ScoredAlternative};
use crate::store::{DynDecisionStore, DynRatingStore, Upsert, UpsertSummary};
use crate::telemetry::anon_user;

pub const NO_RATINGS_MESSAGE: &str = "No ratings found. Scores are 0.";

/// Response of a score calculation; alternatives are ranked, best first.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreSummary {
    pub decision_id: DecisionId,
    pub title: String,
    pub alternatives: Vec<ScoredAlternative>,
    pub overall_score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Per-decision async locks, created on demand.
#[derive(Debug, Default)]
struct DecisionLocks {
    inner: parking_lot::Mutex<HashMap<DecisionId, Arc<AsyncMutex<()>>>>,
}

impl DecisionLocks {
    async fn acquire(&self, id: DecisionId) -> OwnedMutexGuard<()> {
        let m = self.inner.lock().entry(id).or_default().clone();
        m.lock_owned().await
    }

    fn forget(&self, id: DecisionId) {
        self.inner.lock().remove(&id);
    }

    /// Drop the entry for `id` unless a guard or waiter still shares it.
    fn release_if_idle(&self, id: DecisionId) {
        let mut map = self.inner.lock();
        if map.get(&id).is_some_and(|m| Arc::strong_count(m) == 1) {
            map.remove(&id);
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.inner.lock().len()
    }
}

#[derive(Clone)]
pub struct DecisionService {
    decisions: DynDecisionStore,
    ratings: DynRatingStore,
    scale: RatingScale,
    locks: Arc<DecisionLocks>,
}

impl DecisionService {
    pub fn new(decisions: DynDecisionStore, ratings: DynRatingStore, scale: RatingScale) -> Self {
        Self {
            decisions,
            ratings,
            scale,
            locks: Arc::new(DecisionLocks::default()),
        }
    }

    /// Load a decision and check `user` owns it.
    async fn owned(&self, user: &str, id: DecisionId) -> Result<Decision> {
        let decision = self
            .decisions
            .get_decision(id)
            .await?
            .ok_or_else(|| Error::NotFound("Decision not found.".into()))?;
        if !decision.is_owned_by(user) {
            return Err(Error::Forbidden(
                "Not authorized to access this decision.".into(),
            ));
        }
        Ok(decision)
    }

    /// Check access, then take the decision's lock and reload it. Requests for
    /// unknown or foreign decisions never leave an entry in the lock table.
    async fn lock_decision(
        &self,
        user: &str,
        id: DecisionId,
    ) -> Result<(OwnedMutexGuard<()>, Decision)> {
        self.owned(user, id).await?;
        let guard = self.locks.acquire(id).await;
        match self.owned(user, id).await {
            Ok(decision) => Ok((guard, decision)),
            Err(e) => {
                // deleted while we waited
                drop(guard);
                self.locks.release_if_idle(id);
                Err(e)
            }
        }
    }

    /* ----------------------------
    Decisions
    ---------------------------- */

    pub async fn list_decisions(&self, user: &str) -> Result<Vec<Decision>> {
        Ok(self.decisions.decisions_for(user).await?)
    }

    pub async fn create_decision(&self, user: &str, input: DecisionInput) -> Result<Decision> {
        let (title, description) = input.validated()?;
        let now = Utc::now();
        let decision = Decision {
            id: self.decisions.allocate_id().await?,
            user_id: user.to_string(),
            title,
            description,
            alternatives: Vec::new(),
            criteria: Vec::new(),
            overall_score: 0.0,
            created_at: now,
            updated_at: now,
        };
        self.decisions.insert_decision(decision.clone()).await?;
        info!(target: "service", decision = decision.id, user = %anon_user(user), "decision created");
        Ok(decision)
    }

    pub async fn get_decision(&self, user: &str, id: DecisionId) -> Result<Decision> {
        self.owned(user, id).await
    }

    pub async fn update_decision(
        &self,
        user: &str,
        id: DecisionId,
        patch: DecisionPatch,
    ) -> Result<Decision> {
        let (_guard, mut decision) = self.lock_decision(user, id).await?;
        patch.apply(&mut decision)?;
        self.decisions.save_decision(&decision).await?;
        Ok(decision)
    }

    /// Delete the decision and every rating recorded for it.
    pub async fn delete_decision(&self, user: &str, id: DecisionId) -> Result<()> {
        let (guard, _) = self.lock_decision(user, id).await?;
        self.decisions.delete_decision(id).await?;
        let purged = self.ratings.purge_decision(id).await;
        drop(guard);
        self.locks.forget(id);

        let purged = purged?;
        counter!(RATINGS_PURGED).increment(purged as u64);
        info!(target: "service", decision = id, purged, "decision deleted");
        Ok(())
    }

    /* ----------------------------
    Alternatives
    ---------------------------- */

    pub async fn add_alternative(
        &self,
        user: &str,
        id: DecisionId,
        input: AlternativeInput,
    ) -> Result<Alternative> {
        let (name, description) = input.validated()?;
        let (_guard, mut decision) = self.lock_decision(user, id).await?;
        let now = Utc::now();
        let alternative = Alternative {
            id: self.decisions.allocate_id().await?,
            name,
            description: description.unwrap_or_default(),
            score: 0.0,
            created_at: now,
            updated_at: now,
        };
        decision.alternatives.push(alternative.clone());
        decision.touch();
        self.decisions.save_decision(&decision).await?;
        Ok(alternative)
    }

    pub async fn update_alternative(
        &self,
        user: &str,
        id: DecisionId,
        alternative_id: AlternativeId,
        input: AlternativeInput,
    ) -> Result<Alternative> {
        let (name, description) = input.validated()?;
        let (_guard, mut decision) = self.lock_decision(user, id).await?;
        let alternative = decision
            .alternatives
            .iter_mut()
            .find(|a| a.id == alternative_id)
            .ok_or_else(|| Error::NotFound("Alternative not found.".into()))?;
        alternative.name = name;
        if let Some(d) = description {
            alternative.description = d;
        }
        alternative.updated_at = Utc::now();
        let updated = alternative.clone();
        decision.touch();
        self.decisions.save_decision(&decision).await?;
        Ok(updated)
    }

    /// Remove the alternative and the ratings that reference it.
    pub async fn delete_alternative(
        &self,
        user: &str,
        id: DecisionId,
        alternative_id: AlternativeId,
    ) -> Result<()> {
        let (_guard, mut decision) = self.lock_decision(user, id).await?;
        let before = decision.alternatives.len();
        decision.alternatives.retain(|a| a.id != alternative_id);
        if decision.alternatives.len() == before {
            return Err(Error::NotFound("Alternative not found.".into()));
        }
        decision.touch();
        self.decisions.save_decision(&decision).await?;
        // Ratings left behind by a failed purge reference nothing and are
        // ignored by the calculator.
        let purged = self.ratings.purge_alternative(id, alternative_id).await?;
        counter!(RATINGS_PURGED).increment(purged as u64);
        debug!(target: "service", decision = id, alternative = alternative_id, purged, "alternative removed");
        Ok(())
    }

    /* ----------------------------
    Criteria
    ---------------------------- */

    pub async fn add_criterion(
        &self,
        user: &str,
        id: DecisionId,
        input: CriterionInput,
    ) -> Result<Criterion> {
        let (name, description, weight) = input.validated()?;
        let (_guard, mut decision) = self.lock_decision(user, id).await?;
        let now = Utc::now();
        let criterion = Criterion {
            id: self.decisions.allocate_id().await?,
            name,
            description: description.unwrap_or_default(),
            weight: weight.unwrap_or(DEFAULT_WEIGHT),
            created_at: now,
            updated_at: now,
        };
        decision.criteria.push(criterion.clone());
        decision.touch();
        self.decisions.save_decision(&decision).await?;
        Ok(criterion)
    }

    pub async fn update_criterion(
        &self,
        user: &str,
        id: DecisionId,
        criterion_id: CriterionId,
        input: CriterionInput,
    ) -> Result<Criterion> {
        let (name, description, weight) = input.validated()?;
        let (_guard, mut decision) = self.lock_decision(user, id).await?;
        let criterion = decision
            .criteria
            .iter_mut()
            .find(|c| c.id == criterion_id)
            .ok_or_else(|| Error::NotFound("Criterion not found.".into()))?;
        criterion.name = name;
        if let Some(d) = description {
            criterion.description = d;
        }
        if let Some(w) = weight {
            criterion.weight = w;
        }
        criterion.updated_at = Utc::now();
        let updated = criterion.clone();
        decision.touch();
        self.decisions.save_decision(&decision).await?;
        Ok(updated)
    }

    /// Remove the criterion and the ratings that reference it.
    pub async fn delete_criterion(
        &self,
        user: &str,
        id: DecisionId,
        criterion_id: CriterionId,
    ) -> Result<()> {
        let (_guard, mut decision) = self.lock_decision(user, id).await?;
        let before = decision.criteria.len();
        decision.criteria.retain(|c| c.id != criterion_id);
        if decision.criteria.len() == before {
            return Err(Error::NotFound("Criterion not found.".into()));
        }
        decision.touch();
        self.decisions.save_decision(&decision).await?;
        let purged = self.ratings.purge_criterion(id, criterion_id).await?;
        counter!(RATINGS_PURGED).increment(purged as u64);
        debug!(target: "service", decision = id, criterion = criterion_id, purged, "criterion removed");
        Ok(())
    }

    /* ----------------------------
    Ratings
    ---------------------------- */

    fn rating_key(&self, user: &str, decision: &Decision, input: &RatingInput) -> Result<RatingKey> {
        if !self.scale.contains(input.value) {
            return Err(Error::InvalidInput(format!(
                "Rating value must be a number between {} and {}.",
                self.scale.min, self.scale.max
            )));
        }
        if decision.alternative(input.alternative_id).is_none()
            || decision.criterion(input.criterion_id).is_none()
        {
            return Err(Error::NotFound(
                "Alternative or criterion not found within this decision.".into(),
            ));
        }
        Ok(RatingKey {
            user_id: user.to_string(),
            decision_id: decision.id,
            alternative_id: input.alternative_id,
            criterion_id: input.criterion_id,
        })
    }

    /// Create or overwrite one rating.
    pub async fn upsert_rating(
        &self,
        user: &str,
        id: DecisionId,
        input: RatingInput,
    ) -> Result<(Rating, Upsert)> {
        let (_guard, decision) = self.lock_decision(user, id).await?;
        let key = self.rating_key(user, &decision, &input)?;
        let out = self.ratings.upsert_rating(key, input.value).await?;
        counter!(RATINGS_UPSERTED).increment(1);
        Ok(out)
    }

    /// Validate the whole batch, then write it as one unit.
    pub async fn upsert_ratings(
        &self,
        user: &str,
        id: DecisionId,
        inputs: Vec<RatingInput>,
    ) -> Result<UpsertSummary> {
        if inputs.is_empty() {
            return Err(Error::InvalidInput("No ratings provided.".into()));
        }
        let (_guard, decision) = self.lock_decision(user, id).await?;
        let items = inputs
            .iter()
            .map(|r| -> Result<(RatingKey, f64)> {
                Ok((self.rating_key(user, &decision, r)?, r.value))
            })
            .collect::<Result<Vec<_>>>()?;
        let summary = self.ratings.upsert_ratings(items).await?;
        counter!(RATINGS_UPSERTED).increment((summary.upserted + summary.modified) as u64);
        debug!(target: "service", decision = id, upserted = summary.upserted, modified = summary.modified, "ratings saved");
        Ok(summary)
    }

    pub async fn ratings(&self, user: &str, id: DecisionId) -> Result<Vec<Rating>> {
        self.owned(user, id).await?;
        Ok(self.ratings.ratings_for(id, user).await?)
    }

    /* ----------------------------
    Scores
    ---------------------------- */

    /// Read ratings, compute scores, and persist them onto the decision.
    pub async fn calculate_scores(&self, user: &str, id: DecisionId) -> Result<ScoreSummary> {
        let started = Instant::now();
        let (_guard, mut decision) = self.lock_decision(user, id).await?;

        if decision.alternatives.is_empty() || decision.criteria.is_empty() {
            return Err(Error::InvalidInput(
                "Please add alternatives and criteria to calculate outcome.".into(),
            ));
        }

        let ratings = self.ratings.ratings_for(id, user).await?;
        let report = scoring::calculate(&decision.alternatives, &decision.criteria, &ratings)?;

        for alt in decision.alternatives.iter_mut() {
            alt.score = report.score_of(alt.id).unwrap_or(0.0);
        }
        decision.overall_score = report.overall;
        decision.touch();
        self.decisions.save_decision(&decision).await?;

        counter!(SCORES_CALCULATED).increment(1);
        histogram!(SCORE_CALCULATION_MS).record(started.elapsed().as_secs_f64() * 1000.0);
        info!(
            target: "scoring",
            decision = id,
            user = %anon_user(user),
            ratings = ratings.len(),
            overall = report.overall,
            "scores calculated"
        );

        Ok(ScoreSummary {
            decision_id: decision.id,
            title: decision.title,
            alternatives: report.alternatives,
            overall_score: report.overall,
            message: (!report.rated).then(|| NO_RATINGS_MESSAGE.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{DecisionStore, MemoryStore, RatingStore, StoreError, StoreResult};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn service(store: Arc<MemoryStore>) -> DecisionService {
        DecisionService::new(store.clone(), store, RatingScale::default())
    }

    async fn decision_with_rating(svc: &DecisionService) -> (DecisionId, AlternativeId) {
        let d = svc
            .create_decision(
                "owner",
                DecisionInput {
                    title: "Which bike".into(),
                    description: None,
                },
            )
            .await
            .unwrap();
        let a = svc
            .add_alternative(
                "owner",
                d.id,
                AlternativeInput {
                    name: "Road".into(),
                    description: None,
                },
            )
            .await
            .unwrap();
        let c = svc
            .add_criterion(
                "owner",
                d.id,
                CriterionInput {
                    name: "Price".into(),
                    description: None,
                    weight: None,
                },
            )
            .await
            .unwrap();
        svc.upsert_rating(
            "owner",
            d.id,
            RatingInput {
                alternative_id: a.id,
                criterion_id: c.id,
                value: 6.0,
            },
        )
        .await
        .unwrap();
        (d.id, a.id)
    }

    #[tokio::test]
    async fn unknown_or_foreign_ids_leave_no_lock_entries() {
        let svc = service(Arc::new(MemoryStore::new()));
        for id in 10_000..10_500 {
            assert!(matches!(
                svc.calculate_scores("stranger", id).await,
                Err(Error::NotFound(_))
            ));
            assert!(svc.delete_decision("stranger", id).await.is_err());
        }
        assert_eq!(svc.locks.len(), 0);

        let (d, _) = decision_with_rating(&svc).await;
        let before = svc.locks.len();
        assert!(matches!(
            svc.calculate_scores("stranger", d).await,
            Err(Error::Forbidden(_))
        ));
        assert_eq!(svc.locks.len(), before);

        svc.delete_decision("owner", d).await.unwrap();
        assert_eq!(svc.locks.len(), 0);
    }

    /// Decision store whose saves can be switched off.
    struct FlakySaves {
        inner: Arc<MemoryStore>,
        fail: AtomicBool,
    }

    #[async_trait]
    impl DecisionStore for FlakySaves {
        async fn allocate_id(&self) -> StoreResult<u64> {
            self.inner.allocate_id().await
        }
        async fn insert_decision(&self, decision: Decision) -> StoreResult<()> {
            self.inner.insert_decision(decision).await
        }
        async fn get_decision(&self, id: DecisionId) -> StoreResult<Option<Decision>> {
            self.inner.get_decision(id).await
        }
        async fn decisions_for(&self, user: &str) -> StoreResult<Vec<Decision>> {
            self.inner.decisions_for(user).await
        }
        async fn save_decision(&self, decision: &Decision) -> StoreResult<()> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(StoreError::Backend("disk full".into()));
            }
            self.inner.save_decision(decision).await
        }
        async fn delete_decision(&self, id: DecisionId) -> StoreResult<bool> {
            self.inner.delete_decision(id).await
        }
    }

    #[tokio::test]
    async fn failed_save_keeps_ratings_of_surviving_alternative() {
        let store = Arc::new(MemoryStore::new());
        let flaky = Arc::new(FlakySaves {
            inner: store.clone(),
            fail: AtomicBool::new(false),
        });
        let svc = DecisionService::new(flaky.clone(), store.clone(), RatingScale::default());
        let (d, a) = decision_with_rating(&svc).await;

        flaky.fail.store(true, Ordering::SeqCst);
        let err = svc.delete_alternative("owner", d, a).await.unwrap_err();
        assert!(matches!(err, Error::Store(_)), "got {err:?}");

        let decision = svc.get_decision("owner", d).await.unwrap();
        assert!(decision.alternative(a).is_some());
        assert_eq!(store.ratings_for(d, "owner").await.unwrap().len(), 1);
    }
}
