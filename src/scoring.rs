//! # Score Calculator
//! Pure mapping `(alternatives, criteria, ratings)` → ranked scores + overall score.
//! No I/O, no shared state; safe to call concurrently.
//!
//! score(a) = Σ_c value(a,c) * weight(c) / Σ_c weight(c), rounded to 2 decimals.
//! A missing rating contributes 0. When every weight is 0 the denominator
//! falls back to 1, so all scores resolve to 0.

use std::collections::HashMap;

use serde::Serialize;
use thiserror::Error;

use crate::model::{Alternative, AlternativeId, Criterion, CriterionId, Rating, DEFAULT_WEIGHT};

/// Inputs the calculator refuses to score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ScoringError {
    #[error("decision has no alternatives")]
    NoAlternatives,
    #[error("decision has no criteria")]
    NoCriteria,
}

/// One ranked entry of the result.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoredAlternative {
    #[serde(rename = "id")]
    pub alternative_id: AlternativeId,
    pub name: String,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoreReport {
    /// Sorted by score, highest first.
    pub alternatives: Vec<ScoredAlternative>,
    /// Score of the top-ranked alternative (0 when there is none).
    pub overall: f64,
    /// False when no ratings were supplied; every score is then 0.
    pub rated: bool,
}

impl ScoreReport {
    pub fn score_of(&self, id: AlternativeId) -> Option<f64> {
        self.alternatives
            .iter()
            .find(|s| s.alternative_id == id)
            .map(|s| s.score)
    }
}

/// Compute weighted, normalized scores for every alternative.
pub fn calculate(
    alternatives: &[Alternative],
    criteria: &[Criterion],
    ratings: &[Rating],
) -> Result<ScoreReport, ScoringError> {
    if alternatives.is_empty() {
        return Err(ScoringError::NoAlternatives);
    }
    if criteria.is_empty() {
        return Err(ScoringError::NoCriteria);
    }

    if ratings.is_empty() {
        return Ok(ScoreReport {
            alternatives: alternatives
                .iter()
                .map(|a| ScoredAlternative {
                    alternative_id: a.id,
                    name: a.name.clone(),
                    score: 0.0,
                })
                .collect(),
            overall: 0.0,
            rated: false,
        });
    }

    let total_weight: f64 = criteria.iter().map(|c| effective_weight(c.weight)).sum();
    let denom = if total_weight > 0.0 { total_weight } else { 1.0 };

    let lookup: HashMap<(AlternativeId, CriterionId), f64> = ratings
        .iter()
        .map(|r| ((r.alternative_id, r.criterion_id), r.value))
        .collect();

    let mut scored = alternatives
        .iter()
        .map(|a| {
            let weighted_sum: f64 = criteria
                .iter()
                .map(|c| {
                    let value = lookup
                        .get(&(a.id, c.id))
                        .copied()
                        .map(effective_value)
                        .unwrap_or(0.0);
                    value * effective_weight(c.weight)
                })
                .sum();
            ScoredAlternative {
                alternative_id: a.id,
                name: a.name.clone(),
                score: round2(weighted_sum / denom),
            }
        })
        .collect::<Vec<_>>();

    // Stable: ties keep input order.
    scored.sort_by(|x, y| y.score.total_cmp(&x.score));

    let overall = scored.first().map(|s| s.score).unwrap_or(0.0);

    Ok(ScoreReport {
        alternatives: scored,
        overall,
        rated: true,
    })
}

/// Non-finite weights count as unset; negative ones contribute nothing.
fn effective_weight(w: f64) -> f64 {
    if w.is_finite() {
        w.max(0.0)
    } else {
        DEFAULT_WEIGHT
    }
}

fn effective_value(v: f64) -> f64 {
    if v.is_finite() {
        v.max(0.0)
    } else {
        0.0
    }
}

/// Round half away from zero to 2 decimal places.
pub fn round2(x: f64) -> f64 {
    let r = (x * 100.0).round() / 100.0;
    if r == 0.0 {
        0.0
    } else {
        r
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn alt(id: AlternativeId, name: &str) -> Alternative {
        let now = Utc::now();
        Alternative {
            id,
            name: name.to_string(),
            description: String::new(),
            score: 0.0,
            created_at: now,
            updated_at: now,
        }
    }

    fn crit(id: CriterionId, weight: f64) -> Criterion {
        let now = Utc::now();
        Criterion {
            id,
            name: format!("C{id}"),
            description: String::new(),
            weight,
            created_at: now,
            updated_at: now,
        }
    }

    fn rating(alternative_id: AlternativeId, criterion_id: CriterionId, value: f64) -> Rating {
        let now = Utc::now();
        Rating {
            id: 0,
            user_id: "u1".into(),
            decision_id: 1,
            alternative_id,
            criterion_id,
            value,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn weighted_example_ranks_b_first() {
        let alts = vec![alt(1, "A"), alt(2, "B")];
        let crits = vec![crit(10, 2.0), crit(11, 1.0)];
        let ratings = vec![
            rating(1, 10, 8.0),
            rating(1, 11, 4.0),
            rating(2, 10, 6.0),
            rating(2, 11, 10.0),
        ];

        let r = calculate(&alts, &crits, &ratings).unwrap();
        assert_eq!(r.alternatives[0].name, "B");
        assert!((r.alternatives[0].score - 7.33).abs() < 1e-9);
        assert_eq!(r.alternatives[1].name, "A");
        assert!((r.alternatives[1].score - 6.67).abs() < 1e-9);
        assert!((r.overall - 7.33).abs() < 1e-9);
        assert!(r.rated);
    }

    #[test]
    fn missing_rating_contributes_zero() {
        let alts = vec![alt(1, "A")];
        let crits = vec![crit(10, 2.0), crit(11, 1.0)];
        let ratings = vec![rating(1, 10, 9.0)];

        let r = calculate(&alts, &crits, &ratings).unwrap();
        // 9*2 / 3
        assert!((r.overall - 6.0).abs() < 1e-9);
    }

    #[test]
    fn no_ratings_yields_zero_scores() {
        let alts = vec![alt(1, "A"), alt(2, "B")];
        let crits = vec![crit(10, 1.0)];

        let r = calculate(&alts, &crits, &[]).unwrap();
        assert!(!r.rated);
        assert_eq!(r.overall, 0.0);
        assert!(r.alternatives.iter().all(|s| s.score == 0.0));
        assert_eq!(r.alternatives.len(), 2);
    }

    #[test]
    fn all_zero_weights_do_not_divide_by_zero() {
        let alts = vec![alt(1, "A"), alt(2, "B")];
        let crits = vec![crit(10, 0.0), crit(11, 0.0)];
        let ratings = vec![rating(1, 10, 10.0), rating(2, 11, 7.0)];

        let r = calculate(&alts, &crits, &ratings).unwrap();
        assert!(r.alternatives.iter().all(|s| s.score == 0.0 && s.score.is_finite()));
        assert_eq!(r.overall, 0.0);
    }

    #[test]
    fn empty_inputs_are_rejected() {
        let crits = vec![crit(10, 1.0)];
        assert_eq!(
            calculate(&[], &crits, &[]).unwrap_err(),
            ScoringError::NoAlternatives
        );
        assert_eq!(
            calculate(&[alt(1, "A")], &[], &[]).unwrap_err(),
            ScoringError::NoCriteria
        );
    }

    #[test]
    fn unset_weight_counts_as_one() {
        let alts = vec![alt(1, "A")];
        let crits = vec![crit(10, f64::NAN), crit(11, 1.0)];
        let ratings = vec![rating(1, 10, 4.0), rating(1, 11, 8.0)];

        let r = calculate(&alts, &crits, &ratings).unwrap();
        assert!((r.overall - 6.0).abs() < 1e-9);
    }

    #[test]
    fn ratings_for_unknown_entries_are_ignored() {
        let alts = vec![alt(1, "A")];
        let crits = vec![crit(10, 1.0)];
        let ratings = vec![rating(1, 10, 5.0), rating(99, 10, 10.0), rating(1, 98, 10.0)];

        let r = calculate(&alts, &crits, &ratings).unwrap();
        assert_eq!(r.alternatives.len(), 1);
        assert!((r.overall - 5.0).abs() < 1e-9);
    }

    #[test]
    fn rounding_is_half_away_from_zero() {
        assert!((round2(2.345_000_1) - 2.35).abs() < 1e-9);
        assert!((round2(0.125) - 0.13).abs() < 1e-9);
        assert!((round2(1.0 / 3.0) - 0.33).abs() < 1e-9);
        assert_eq!(round2(0.0), 0.0);
    }

    #[test]
    fn same_input_same_output() {
        let alts = vec![alt(1, "A"), alt(2, "B"), alt(3, "C")];
        let crits = vec![crit(10, 3.0), crit(11, 0.5)];
        let ratings = vec![rating(1, 10, 3.0), rating(2, 11, 9.0), rating(3, 10, 3.0)];

        let a = calculate(&alts, &crits, &ratings).unwrap();
        let b = calculate(&alts, &crits, &ratings).unwrap();
        assert_eq!(a, b);
    }
}
