//! Uncertainty-based selection over the eligible pool.

use ndarray::ArrayView2;
use ordered_float::OrderedFloat;
use rand::rngs::StdRng;
use rand::{SeedableRng, seq::SliceRandom};
use serde::{Deserialize, Serialize};

use crate::ml::Classifier;

/// How uncertainty is scored from class probabilities.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryStrategy {
    /// `1 - max(p)`.
    #[default]
    #[serde(alias = "uncertainty", alias = "uncertainty_sampling", alias = "least_confidence")]
    LeastConfident,
    /// `1 - (p1 - p2)` for the two most probable classes.
    #[serde(alias = "margin_sampling")]
    Margin,
    /// Shannon entropy normalized to [0, 1].
    #[serde(alias = "entropy_sampling")]
    Entropy,
}

impl QueryStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            QueryStrategy::LeastConfident => "least_confident",
            QueryStrategy::Margin => "margin",
            QueryStrategy::Entropy => "entropy",
        }
    }

    /// Uncertainty in [0, 1]; higher means less certain.
    pub fn score(self, proba: &[f32]) -> f64 {
        if proba.is_empty() {
            return 0.0;
        }
        let score = match self {
            QueryStrategy::LeastConfident => {
                let max = proba.iter().copied().fold(f32::NEG_INFINITY, f32::max);
                1.0 - max as f64
            }
            QueryStrategy::Margin => {
                let mut sorted: Vec<f32> = proba.to_vec();
                sorted.sort_by(|a, b| b.total_cmp(a));
                let second = sorted.get(1).copied().unwrap_or(0.0);
                1.0 - (sorted[0] - second) as f64
            }
            QueryStrategy::Entropy => {
                if proba.len() < 2 {
                    return 0.0;
                }
                let entropy: f64 = proba
                    .iter()
                    .filter(|&&p| p > 0.0)
                    .map(|&p| {
                        let p = p as f64;
                        -p * p.ln()
                    })
                    .sum();
                entropy / (proba.len() as f64).ln()
            }
        };
        if score.is_finite() {
            score.clamp(0.0, 1.0)
        } else {
            0.0
        }
    }
}

/// A selected row, still in working-pool coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QueryCandidate {
    pub position: usize,
    pub score: f64,
}

/// Pick the `k` most uncertain rows of `pool`.
///
/// Ties resolve through a seeded shuffle of positions before a stable sort, so
/// the same seed always yields the same batch.
pub fn select_queries<C: Classifier + ?Sized>(
    model: &C,
    pool: ArrayView2<'_, f32>,
    k: usize,
    strategy: QueryStrategy,
    seed: u64,
) -> Vec<QueryCandidate> {
    let n = pool.nrows();
    if n == 0 || k == 0 {
        return Vec::new();
    }
    let mut positions: Vec<usize> = (0..n).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    positions.shuffle(&mut rng);

    let mut scored: Vec<QueryCandidate> = positions
        .into_iter()
        .map(|position| {
            let row = pool.row(position).to_vec();
            QueryCandidate {
                position,
                score: strategy.score(&model.predict_proba(&row)),
            }
        })
        .collect();
    scored.sort_by_key(|candidate| std::cmp::Reverse(OrderedFloat(candidate.score)));
    scored.truncate(k);
    scored
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    /// Probability of class "1" grows with the first feature.
    struct Ramp {
        classes: Vec<String>,
    }

    impl Classifier for Ramp {
        fn classes(&self) -> &[String] {
            &self.classes
        }

        fn feature_len(&self) -> usize {
            1
        }

        fn predict_proba(&self, features: &[f32]) -> Vec<f32> {
            let p = features[0].clamp(0.0, 1.0);
            vec![1.0 - p, p]
        }
    }

    fn ramp() -> Ramp {
        Ramp {
            classes: vec!["0".into(), "1".into()],
        }
    }

    #[test]
    fn picks_rows_closest_to_the_boundary() {
        let pool = array![[0.0f32], [0.45], [0.9], [0.55], [1.0]];
        let picked = select_queries(&ramp(), pool.view(), 2, QueryStrategy::LeastConfident, 7);
        let mut positions: Vec<usize> = picked.iter().map(|c| c.position).collect();
        positions.sort_unstable();
        assert_eq!(positions, vec![1, 3]);
        assert!(picked.iter().all(|c| (0.0..=1.0).contains(&c.score)));
    }

    #[test]
    fn ties_are_deterministic_for_a_seed() {
        let pool = array![[0.5f32], [0.5], [0.5], [0.5], [0.5], [0.5]];
        let first = select_queries(&ramp(), pool.view(), 3, QueryStrategy::Entropy, 11);
        let again = select_queries(&ramp(), pool.view(), 3, QueryStrategy::Entropy, 11);
        assert_eq!(first, again);
        assert_eq!(first.len(), 3);
    }

    #[test]
    fn empty_pool_yields_empty_batch() {
        let pool = ndarray::Array2::<f32>::zeros((0, 1));
        assert!(select_queries(&ramp(), pool.view(), 5, QueryStrategy::Margin, 1).is_empty());
    }

    #[test]
    fn batch_larger_than_pool_returns_whole_pool() {
        let pool = array![[0.2f32], [0.8]];
        assert_eq!(
            select_queries(&ramp(), pool.view(), 10, QueryStrategy::Margin, 1).len(),
            2
        );
    }

    #[test]
    fn scores_stay_in_unit_interval() {
        for strategy in [
            QueryStrategy::LeastConfident,
            QueryStrategy::Margin,
            QueryStrategy::Entropy,
        ] {
            assert_eq!(strategy.score(&[1.0, 0.0, 0.0]), 0.0);
            let uniform = strategy.score(&[1.0 / 3.0; 3]);
            assert!((0.0..=1.0).contains(&uniform));
        }
        assert!((QueryStrategy::Entropy.score(&[0.5, 0.5]) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn legacy_strategy_names_decode() {
        let strategy: QueryStrategy = serde_json::from_str("\"uncertainty_sampling\"").unwrap();
        assert_eq!(strategy, QueryStrategy::LeastConfident);
    }
}
