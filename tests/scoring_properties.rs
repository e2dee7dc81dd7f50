// tests/scoring_properties.rs
//
// Property checks for the score calculator over seeded random decisions.
//
// Covered:
// - empty rating set → all zeros
// - scores finite, non-negative, 2 decimals
// - overall == max(score)
// - ranking is non-increasing
// - idempotence
// - all-zero weights

use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use decision_compass::model::{Alternative, Criterion, Rating};
use decision_compass::scoring::{calculate, ScoreReport};

const ROUNDS: usize = 300;

fn alternatives(n: u64) -> Vec<Alternative> {
    let now = Utc::now();
    (1..=n)
        .map(|id| Alternative {
            id,
            name: format!("alt-{id}"),
            description: String::new(),
            score: 0.0,
            created_at: now,
            updated_at: now,
        })
        .collect()
}

fn criteria(rng: &mut StdRng, n: u64, zero_weights: bool) -> Vec<Criterion> {
    let now = Utc::now();
    (1..=n)
        .map(|i| Criterion {
            id: 1000 + i,
            name: format!("crit-{i}"),
            description: String::new(),
            weight: if zero_weights {
                0.0
            } else {
                rng.random_range(0.0..=10.0)
            },
            created_at: now,
            updated_at: now,
        })
        .collect()
}

/// Rate a random subset of (alternative, criterion) pairs.
fn ratings(rng: &mut StdRng, alts: &[Alternative], crits: &[Criterion]) -> Vec<Rating> {
    let now = Utc::now();
    let mut out = Vec::new();
    for a in alts {
        for c in crits {
            if rng.random_bool(0.7) {
                out.push(Rating {
                    id: out.len() as u64 + 1,
                    user_id: "prop".into(),
                    decision_id: 1,
                    alternative_id: a.id,
                    criterion_id: c.id,
                    value: rng.random_range(0.0..=10.0),
                    created_at: now,
                    updated_at: now,
                });
            }
        }
    }
    out
}

fn has_two_decimals(x: f64) -> bool {
    let scaled = x * 100.0;
    (scaled - scaled.round()).abs() < 1e-6
}

fn assert_report_invariants(r: &ScoreReport) {
    for s in &r.alternatives {
        assert!(s.score.is_finite(), "score must be finite: {s:?}");
        assert!(s.score >= 0.0, "score must be non-negative: {s:?}");
        assert!(has_two_decimals(s.score), "score not rounded: {s:?}");
    }
    for pair in r.alternatives.windows(2) {
        assert!(
            pair[0].score >= pair[1].score,
            "ranking must be non-increasing: {:?}",
            r.alternatives
        );
    }
    let max = r
        .alternatives
        .iter()
        .map(|s| s.score)
        .fold(0.0_f64, f64::max);
    assert_eq!(r.overall, max, "overall must equal max score");
}

#[test]
fn random_decisions_hold_invariants() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    for _ in 0..ROUNDS {
        let alts = alternatives(rng.random_range(1..=6));
        let n_crits = rng.random_range(1..=5);
        let crits = criteria(&mut rng, n_crits, false);
        let rs = ratings(&mut rng, &alts, &crits);

        let report = calculate(&alts, &crits, &rs).expect("non-empty inputs");
        assert_eq!(report.alternatives.len(), alts.len());
        assert_report_invariants(&report);

        // Scores never exceed the top of the rating scale.
        assert!(report.overall <= 10.0 + 1e-9);

        let again = calculate(&alts, &crits, &rs).expect("non-empty inputs");
        assert_eq!(report, again, "calculation must be idempotent");
    }
}

#[test]
fn empty_ratings_always_score_zero() {
    let mut rng = StdRng::seed_from_u64(7);
    for _ in 0..50 {
        let alts = alternatives(rng.random_range(1..=6));
        let n_crits = rng.random_range(1..=5);
        let crits = criteria(&mut rng, n_crits, false);

        let report = calculate(&alts, &crits, &[]).expect("non-empty inputs");
        assert!(!report.rated);
        assert_eq!(report.overall, 0.0);
        assert!(report.alternatives.iter().all(|s| s.score == 0.0));
    }
}

#[test]
fn zero_weights_resolve_to_zero_scores() {
    let mut rng = StdRng::seed_from_u64(11);
    for _ in 0..50 {
        let alts = alternatives(rng.random_range(1..=6));
        let n_crits = rng.random_range(1..=5);
        let crits = criteria(&mut rng, n_crits, true);
        let rs = ratings(&mut rng, &alts, &crits);

        let report = calculate(&alts, &crits, &rs).expect("non-empty inputs");
        assert_report_invariants(&report);
        assert!(report.alternatives.iter().all(|s| s.score == 0.0));
    }
}

#[test]
fn uniform_ratings_give_the_rating_back() {
    // Rating every pair with the same value v yields score v regardless of weights.
    let mut rng = StdRng::seed_from_u64(23);
    let alts = alternatives(3);
    let crits = criteria(&mut rng, 4, false);
    let now = Utc::now();
    let rs = alts
        .iter()
        .flat_map(|a| {
            crits.iter().map(move |c| Rating {
                id: 0,
                user_id: "prop".into(),
                decision_id: 1,
                alternative_id: a.id,
                criterion_id: c.id,
                value: 6.5,
                created_at: now,
                updated_at: now,
            })
        })
        .collect::<Vec<_>>();

    let report = calculate(&alts, &crits, &rs).expect("non-empty inputs");
    for s in &report.alternatives {
        assert!((s.score - 6.5).abs() < 1e-9, "{s:?}");
    }
}
