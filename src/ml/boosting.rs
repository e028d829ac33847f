use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use smartcore::linalg::basic::matrix::DenseMatrix;
use smartcore::tree::decision_tree_regressor::{
    DecisionTreeRegressor, DecisionTreeRegressorParameters,
};
use tracing::debug;

use crate::error::SignalError;

type RegressionTree = DecisionTreeRegressor<f64, f64, DenseMatrix<f64>, Vec<f64>>;

/// Hyperparameters searched by the tuner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoostingParams {
    pub max_depth: u16,
    pub learning_rate: f64,
    pub n_estimators: usize,
    /// Fraction of rows sampled (without replacement) for each round.
    pub subsample: f64,
    /// Fraction of feature columns sampled for each round.
    pub colsample: f64,
    pub min_samples_split: usize,
}

impl Default for BoostingParams {
    fn default() -> Self {
        Self {
            max_depth: 4,
            learning_rate: 0.1,
            n_estimators: 100,
            subsample: 0.8,
            colsample: 0.8,
            min_samples_split: 2,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct BoostingRound {
    columns: Vec<usize>,
    /// One regression tree per class.
    trees: Vec<RegressionTree>,
}

/// Multi-class gradient boosting with a softmax link. Each round fits one
/// regression tree per class to the residual `y_k - p_k`.
#[derive(Serialize, Deserialize)]
pub struct GradientBoostedTrees {
    n_classes: usize,
    n_features: usize,
    learning_rate: f64,
    base_scores: Vec<f64>,
    rounds: Vec<BoostingRound>,
}

impl GradientBoostedTrees {
    pub fn fit(
        x: &[Vec<f64>],
        y: &[usize],
        n_classes: usize,
        params: &BoostingParams,
        seed: u64,
    ) -> Result<Self, SignalError> {
        let n = x.len();
        if n == 0 || n != y.len() {
            return Err(SignalError::Training(format!(
                "bad training shape: {} rows, {} labels",
                n,
                y.len()
            )));
        }
        if n_classes < 2 {
            return Err(SignalError::Training("boosting needs at least two classes".into()));
        }
        if let Some(bad) = y.iter().find(|&&c| c >= n_classes) {
            return Err(SignalError::Training(format!("class index {} out of range", bad)));
        }

        let n_features = x[0].len();
        let mut rng = StdRng::seed_from_u64(seed);

        let mut counts = vec![0usize; n_classes];
        for &c in y {
            counts[c] += 1;
        }
        // log prior, smoothed so an absent class does not produce -inf
        let base_scores: Vec<f64> = counts
            .iter()
            .map(|&c| ((c as f64 + 1.0) / (n as f64 + n_classes as f64)).ln())
            .collect();

        let mut scores: Vec<Vec<f64>> = vec![base_scores.clone(); n];
        let row_take = ((n as f64 * params.subsample.clamp(0.05, 1.0)).round() as usize).clamp(1, n);
        let col_take = ((n_features as f64 * params.colsample.clamp(0.05, 1.0)).round() as usize)
            .clamp(1, n_features);

        let tree_params = DecisionTreeRegressorParameters::default()
            .with_max_depth(params.max_depth.max(1))
            .with_min_samples_split(params.min_samples_split.max(2));

        let mut rounds = Vec::with_capacity(params.n_estimators);
        for round in 0..params.n_estimators {
            let mut rows = sample(&mut rng, n, row_take).into_vec();
            rows.sort_unstable();
            let mut columns = sample(&mut rng, n_features, col_take).into_vec();
            columns.sort_unstable();

            let probs: Vec<Vec<f64>> = scores.iter().map(|s| softmax(s)).collect();

            let sampled = project(rows.iter().map(|&r| x[r].as_slice()), &columns);
            let sampled = DenseMatrix::from_2d_vec(&sampled)
                .map_err(|e| SignalError::Training(format!("matrix error: {}", e)))?;
            let full = DenseMatrix::from_2d_vec(&project(x.iter().map(|r| r.as_slice()), &columns))
                .map_err(|e| SignalError::Training(format!("matrix error: {}", e)))?;

            let mut trees = Vec::with_capacity(n_classes);
            for class in 0..n_classes {
                let residuals: Vec<f64> = rows
                    .iter()
                    .map(|&r| indicator(y[r] == class) - probs[r][class])
                    .collect();
                let tree = RegressionTree::fit(&sampled, &residuals, tree_params.clone())
                    .map_err(|e| SignalError::Training(format!("tree fit failed: {}", e)))?;
                let update = tree
                    .predict(&full)
                    .map_err(|e| SignalError::Training(format!("tree predict failed: {}", e)))?;
                for (score, delta) in scores.iter_mut().zip(update) {
                    score[class] += params.learning_rate * delta;
                }
                trees.push(tree);
            }

            rounds.push(BoostingRound { columns, trees });
            if round % 50 == 49 {
                debug!("boosting: {} / {} rounds", round + 1, params.n_estimators);
            }
        }

        Ok(Self {
            n_classes,
            n_features,
            learning_rate: params.learning_rate,
            base_scores,
            rounds,
        })
    }

    /// Class probabilities for each input row.
    pub fn predict_proba(&self, x: &[Vec<f64>]) -> Result<Vec<Vec<f64>>, SignalError> {
        if let Some(row) = x.iter().find(|r| r.len() != self.n_features) {
            return Err(SignalError::Prediction(format!(
                "expected {} features, got {}",
                self.n_features,
                row.len()
            )));
        }
        if x.is_empty() {
            return Ok(Vec::new());
        }

        let mut scores: Vec<Vec<f64>> = vec![self.base_scores.clone(); x.len()];
        for round in &self.rounds {
            let projected = project(x.iter().map(|r| r.as_slice()), &round.columns);
            let matrix = DenseMatrix::from_2d_vec(&projected)
                .map_err(|e| SignalError::Prediction(format!("matrix error: {}", e)))?;
            for (class, tree) in round.trees.iter().enumerate() {
                let update = tree
                    .predict(&matrix)
                    .map_err(|e| SignalError::Prediction(format!("tree predict failed: {}", e)))?;
                for (score, delta) in scores.iter_mut().zip(update) {
                    score[class] += self.learning_rate * delta;
                }
            }
        }

        Ok(scores.iter().map(|s| softmax(s)).collect())
    }

    pub fn predict(&self, x: &[Vec<f64>]) -> Result<Vec<usize>, SignalError> {
        Ok(self.predict_proba(x)?.iter().map(|p| argmax(p)).collect())
    }

    #[cfg(test)]
    pub fn n_rounds(&self) -> usize {
        self.rounds.len()
    }
}

fn project<'a>(rows: impl Iterator<Item = &'a [f64]>, columns: &[usize]) -> Vec<Vec<f64>> {
    rows.map(|row| columns.iter().map(|&c| row[c]).collect()).collect()
}

fn indicator(flag: bool) -> f64 {
    if flag {
        1.0
    } else {
        0.0
    }
}

pub(crate) fn softmax(scores: &[f64]) -> Vec<f64> {
    let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = scores.iter().map(|s| (s - max).exp()).collect();
    let sum: f64 = exps.iter().sum();
    exps.iter().map(|e| e / sum).collect()
}

pub(crate) fn argmax(values: &[f64]) -> usize {
    values
        .iter()
        .enumerate()
        .fold((0, f64::NEG_INFINITY), |(best_i, best_v), (i, &v)| {
            if v > best_v {
                (i, v)
            } else {
                (best_i, best_v)
            }
        })
        .0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn separable(n: usize) -> (Vec<Vec<f64>>, Vec<usize>) {
        let mut x = Vec::new();
        let mut y = Vec::new();
        for i in 0..n {
            let class = i % 3;
            let center = class as f64 * 10.0;
            let jitter = (i as f64 * 0.37).sin();
            x.push(vec![center + jitter, -center + jitter * 0.5, jitter]);
            y.push(class);
        }
        (x, y)
    }

    #[test]
    fn test_fits_separable_classes() {
        let (x, y) = separable(90);
        let params = BoostingParams {
            n_estimators: 30,
            colsample: 1.0,
            ..BoostingParams::default()
        };
        let model = GradientBoostedTrees::fit(&x, &y, 3, &params, 42).unwrap();
        assert_eq!(model.n_rounds(), 30);
        let predicted = model.predict(&x).unwrap();
        let correct = predicted.iter().zip(&y).filter(|(p, t)| p == t).count();
        assert!(correct as f64 / y.len() as f64 > 0.95);
    }

    #[test]
    fn test_probabilities_sum_to_one() {
        let (x, y) = separable(30);
        let params = BoostingParams {
            n_estimators: 5,
            ..BoostingParams::default()
        };
        let model = GradientBoostedTrees::fit(&x, &y, 3, &params, 7).unwrap();
        for p in model.predict_proba(&x[..3]).unwrap() {
            assert!((p.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_rejects_single_class_and_bad_width() {
        let (x, _) = separable(12);
        let y = vec![0; 12];
        assert!(GradientBoostedTrees::fit(&x, &y, 1, &BoostingParams::default(), 1).is_err());

        let (x, y) = separable(12);
        let params = BoostingParams {
            n_estimators: 2,
            ..BoostingParams::default()
        };
        let model = GradientBoostedTrees::fit(&x, &y, 3, &params, 1).unwrap();
        assert!(model.predict(&[vec![1.0, 2.0]]).is_err());
    }

    #[test]
    fn test_softmax_and_argmax() {
        let p = softmax(&[1.0, 3.0, 2.0]);
        assert_eq!(argmax(&p), 1);
        assert!((p.iter().sum::<f64>() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_serde_round_trip_keeps_predictions() {
        let (x, y) = separable(30);
        let params = BoostingParams {
            n_estimators: 4,
            ..BoostingParams::default()
        };
        let model = GradientBoostedTrees::fit(&x, &y, 3, &params, 3).unwrap();
        let json = serde_json::to_string(&model).unwrap();
        let restored: GradientBoostedTrees = serde_json::from_str(&json).unwrap();
        assert_eq!(model.predict(&x).unwrap(), restored.predict(&x).unwrap());
    }
}
