use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tracing::{debug, warn};

use super::boosting::{BoostingParams, GradientBoostedTrees};
use crate::error::SignalError;

/// Random-search bounds for boosted-tree hyperparameters.
#[derive(Debug, Clone)]
pub struct SearchSpace {
    pub max_depth: (u16, u16),
    pub learning_rate: (f64, f64),
    pub n_estimators: (usize, usize),
    pub subsample: (f64, f64),
    pub colsample: (f64, f64),
}

impl Default for SearchSpace {
    fn default() -> Self {
        Self {
            max_depth: (2, 8),
            learning_rate: (0.01, 0.3),
            n_estimators: (25, 200),
            subsample: (0.5, 1.0),
            colsample: (0.5, 1.0),
        }
    }
}

impl SearchSpace {
    pub fn sample(&self, rng: &mut StdRng) -> BoostingParams {
        let (lr_lo, lr_hi) = self.learning_rate;
        // log-uniform so small learning rates get a fair share of trials
        let learning_rate = (rng.random_range(lr_lo.ln()..=lr_hi.ln())).exp();
        BoostingParams {
            max_depth: rng.random_range(self.max_depth.0..=self.max_depth.1),
            learning_rate,
            n_estimators: rng.random_range(self.n_estimators.0..=self.n_estimators.1),
            subsample: rng.random_range(self.subsample.0..=self.subsample.1),
            colsample: rng.random_range(self.colsample.0..=self.colsample.1),
            min_samples_split: 2,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TrialResult {
    pub trial: usize,
    pub params: BoostingParams,
    pub score: f64,
}

#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub best: TrialResult,
    pub completed_trials: usize,
}

/// Shuffle row indices with a fixed seed and split them into
/// (train, holdout). The holdout gets `holdout_fraction` of the rows, at least one.
pub fn train_test_split(n: usize, holdout_fraction: f64, seed: u64) -> (Vec<usize>, Vec<usize>) {
    let mut indices: Vec<usize> = (0..n).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let holdout = if n < 2 {
        0
    } else {
        ((n as f64 * holdout_fraction).round() as usize).clamp(1, n - 1)
    };
    let train = indices.split_off(holdout);
    (train, indices)
}

/// Support-weighted mean of per-class F1 scores.
pub fn weighted_f1(actual: &[usize], predicted: &[usize], n_classes: usize) -> f64 {
    if actual.is_empty() || actual.len() != predicted.len() {
        return 0.0;
    }

    let mut total = 0.0;
    for class in 0..n_classes {
        let tp = actual.iter().zip(predicted).filter(|(a, p)| **a == class && **p == class).count();
        let fp = actual.iter().zip(predicted).filter(|(a, p)| **a != class && **p == class).count();
        let support = actual.iter().filter(|a| **a == class).count();
        let fneg = support - tp;

        if support == 0 {
            continue;
        }
        let denom = 2 * tp + fp + fneg;
        let f1 = if denom == 0 { 0.0 } else { 2.0 * tp as f64 / denom as f64 };
        total += f1 * support as f64;
    }

    total / actual.len() as f64
}

/// Run `trials` random-search trials, each fitted on `train` and scored by
/// weighted F1 on `holdout`. Failed trials are skipped.
pub fn random_search(
    x: &[Vec<f64>],
    y: &[usize],
    n_classes: usize,
    train: &[usize],
    holdout: &[usize],
    space: &SearchSpace,
    trials: usize,
    seed: u64,
) -> Result<SearchOutcome, SignalError> {
    let x_train: Vec<Vec<f64>> = train.iter().map(|&i| x[i].clone()).collect();
    let y_train: Vec<usize> = train.iter().map(|&i| y[i]).collect();
    let x_holdout: Vec<Vec<f64>> = holdout.iter().map(|&i| x[i].clone()).collect();
    let y_holdout: Vec<usize> = holdout.iter().map(|&i| y[i]).collect();

    let mut distinct = y_train.clone();
    distinct.sort_unstable();
    distinct.dedup();
    if distinct.len() < 2 {
        return Err(SignalError::Training(format!(
            "training partition holds {} class(es) after the split",
            distinct.len()
        )));
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut best: Option<TrialResult> = None;
    let mut completed = 0;

    for trial in 0..trials {
        let params = space.sample(&mut rng);
        let fitted = GradientBoostedTrees::fit(&x_train, &y_train, n_classes, &params, seed.wrapping_add(trial as u64))
            .and_then(|model| model.predict(&x_holdout));

        match fitted {
            Ok(predicted) => {
                completed += 1;
                let score = weighted_f1(&y_holdout, &predicted, n_classes);
                debug!(
                    "trial {}: depth={} lr={:.4} trees={} subsample={:.2} colsample={:.2} -> f1={:.4}",
                    trial, params.max_depth, params.learning_rate, params.n_estimators,
                    params.subsample, params.colsample, score
                );
                if best.as_ref().map_or(true, |b| score > b.score) {
                    best = Some(TrialResult { trial, params, score });
                }
            }
            Err(e) => warn!("trial {} failed: {}", trial, e),
        }
    }

    let best = best.ok_or_else(|| SignalError::Training(format!("all {} search trials failed", trials)))?;
    Ok(SearchOutcome { best, completed_trials: completed })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_is_reproducible_and_disjoint() {
        let (train_a, hold_a) = train_test_split(100, 0.2, 42);
        let (train_b, hold_b) = train_test_split(100, 0.2, 42);
        assert_eq!(train_a, train_b);
        assert_eq!(hold_a, hold_b);
        assert_eq!(hold_a.len(), 20);
        assert_eq!(train_a.len(), 80);
        assert!(hold_a.iter().all(|i| !train_a.contains(i)));
    }

    #[test]
    fn test_split_keeps_both_sides_non_empty() {
        let (train, holdout) = train_test_split(2, 0.2, 1);
        assert_eq!(train.len(), 1);
        assert_eq!(holdout.len(), 1);
    }

    #[test]
    fn test_weighted_f1_perfect_and_known_value() {
        assert_eq!(weighted_f1(&[0, 1, 2], &[0, 1, 2], 3), 1.0);

        // class 0: tp=1 fp=1 fn=1 -> f1 0.5, support 2
        // class 1: tp=1 fp=1 fn=0 -> f1 2/3, support 1
        // class 2: tp=0 fp=0 fn=1 -> f1 0, support 1
        let actual = [0, 0, 1, 2];
        let predicted = [0, 1, 1, 0];
        let expected = (0.5 * 2.0 + (2.0 / 3.0) * 1.0) / 4.0;
        assert!((weighted_f1(&actual, &predicted, 3) - expected).abs() < 1e-12);
    }

    #[test]
    fn test_search_space_samples_within_bounds() {
        let space = SearchSpace::default();
        let mut rng = StdRng::seed_from_u64(9);
        for _ in 0..50 {
            let p = space.sample(&mut rng);
            assert!((2..=8).contains(&p.max_depth));
            assert!(p.learning_rate >= 0.01 - 1e-12 && p.learning_rate <= 0.3 + 1e-12);
            assert!((25..=200).contains(&p.n_estimators));
            assert!((0.5..=1.0).contains(&p.subsample));
        }
    }

    #[test]
    fn test_search_rejects_single_class_partition() {
        let x = vec![vec![1.0], vec![2.0], vec![3.0]];
        let y = vec![0, 0, 1];
        let result = random_search(&x, &y, 2, &[0, 1], &[2], &SearchSpace::default(), 3, 1);
        assert!(matches!(result, Err(SignalError::Training(_))));
    }
}
