use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use smartcore::ensemble::random_forest_classifier::{
    RandomForestClassifier, RandomForestClassifierParameters,
};
use smartcore::linalg::basic::matrix::DenseMatrix;
use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use super::boosting::{argmax, BoostingParams, GradientBoostedTrees};
use super::features::{FeatureRow, FEATURE_NAMES};
use super::labels::{format_distribution, LabeledTable};
use super::tuning::{random_search, train_test_split, SearchSpace};
use crate::error::SignalError;
use crate::types::Action;

type Forest = RandomForestClassifier<f64, u32, DenseMatrix<f64>, Vec<u32>>;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainerConfig {
    /// Minimum labeled rows needed before a fit is attempted.
    pub min_train_rows: usize,
    /// Use the tuned (search + refit) strategy instead of a direct forest fit.
    pub tuning_enabled: bool,
    /// Hyperparameter search budget.
    pub trials: usize,
    pub holdout_fraction: f64,
    pub seed: u64,
    pub forest_trees: u16,
    pub forest_max_depth: Option<u16>,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            min_train_rows: 50,
            tuning_enabled: false,
            trials: 20,
            holdout_fraction: 0.2,
            seed: 42,
            forest_trees: 100,
            forest_max_depth: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrainingStrategy {
    /// Random forest with fixed hyperparameters on every labeled row.
    Direct,
    /// Boosted-tree random search on an 80/20 split, best config refitted on all rows.
    Tuned,
}

impl TrainingStrategy {
    pub fn from_tuning(enabled: bool) -> Self {
        if enabled {
            TrainingStrategy::Tuned
        } else {
            TrainingStrategy::Direct
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelType {
    RandomForest,
    GradientBoosted,
}

impl ModelType {
    pub fn as_str(&self) -> &str {
        match self {
            ModelType::RandomForest => "random_forest",
            ModelType::GradientBoosted => "gradient_boosted",
        }
    }
}

impl fmt::Display for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Training metadata stored with the artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelMetrics {
    pub train_accuracy: f64,
    /// Weighted F1 on the held-out partition (tuned strategy only).
    pub holdout_f1: Option<f64>,
    pub train_samples: usize,
    pub holdout_samples: usize,
    pub class_distribution: BTreeMap<Action, usize>,
    pub hyperparameters: Option<BoostingParams>,
}

#[derive(Serialize, Deserialize)]
enum Classifier {
    RandomForest(Forest),
    GradientBoosted(GradientBoostedTrees),
}

impl Classifier {
    fn model_type(&self) -> ModelType {
        match self {
            Classifier::RandomForest(_) => ModelType::RandomForest,
            Classifier::GradientBoosted(_) => ModelType::GradientBoosted,
        }
    }

    fn predict(&self, x: &[Vec<f64>]) -> Result<Vec<usize>, SignalError> {
        match self {
            Classifier::RandomForest(forest) => {
                let matrix = DenseMatrix::from_2d_vec(&x.to_vec())
                    .map_err(|e| SignalError::Prediction(format!("matrix error: {}", e)))?;
                let predicted = forest
                    .predict(&matrix)
                    .map_err(|e| SignalError::Prediction(e.to_string()))?;
                Ok(predicted.into_iter().map(|c| c as usize).collect())
            }
            Classifier::GradientBoosted(gbt) => gbt.predict(x),
        }
    }

    /// Class index plus its probability when the model exposes one.
    fn predict_one(&self, features: &[f64]) -> Result<(usize, Option<f64>), SignalError> {
        let x = vec![features.to_vec()];
        match self {
            Classifier::GradientBoosted(gbt) => {
                let probs = gbt
                    .predict_proba(&x)?
                    .pop()
                    .ok_or_else(|| SignalError::Prediction("no prediction returned".into()))?;
                let index = argmax(&probs);
                Ok((index, Some(probs[index])))
            }
            Classifier::RandomForest(_) => {
                let index = self
                    .predict(&x)?
                    .first()
                    .copied()
                    .ok_or_else(|| SignalError::Prediction("no prediction returned".into()))?;
                Ok((index, None))
            }
        }
    }
}

/// A trained classifier for one (symbol, interval) slot. Immutable once built;
/// retraining produces a new artifact.
#[derive(Serialize, Deserialize)]
pub struct ModelArtifact {
    pub trained_at: DateTime<Utc>,
    /// Class index -> action, fixed at training time. Empty for artifacts
    /// written before the table was stored.
    #[serde(default)]
    pub classes: Vec<Action>,
    pub n_classes: usize,
    pub feature_names: Vec<String>,
    pub metrics: ModelMetrics,
    classifier: Classifier,
}

impl ModelArtifact {
    pub fn model_type(&self) -> ModelType {
        self.classifier.model_type()
    }

    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.trained_at
    }

    /// Score one feature row, returning the raw class index and optional
    /// probability.
    pub fn score(&self, row: &FeatureRow) -> Result<(usize, Option<f64>), SignalError> {
        let features = row.to_vector();
        if features.len() != self.feature_names.len() {
            return Err(SignalError::Prediction(format!(
                "artifact expects {} features, row has {}",
                self.feature_names.len(),
                features.len()
            )));
        }
        self.classifier.predict_one(&features)
    }

    #[cfg(test)]
    pub(crate) fn without_class_table(mut self) -> Self {
        self.classes.clear();
        self
    }
}

#[derive(Debug, Clone)]
pub struct TrainingReport {
    pub samples: usize,
    pub distribution: BTreeMap<Action, usize>,
    pub strategy: TrainingStrategy,
    pub train_accuracy: f64,
    pub holdout_f1: Option<f64>,
    pub hyperparameters: Option<BoostingParams>,
    pub elapsed: Duration,
}

pub struct TrainedModel {
    pub artifact: ModelArtifact,
    pub report: TrainingReport,
}

pub struct ModelTrainer {
    config: TrainerConfig,
    search_space: SearchSpace,
}

impl ModelTrainer {
    pub fn new(config: TrainerConfig) -> Self {
        Self {
            config,
            search_space: SearchSpace::default(),
        }
    }

    pub fn config(&self) -> &TrainerConfig {
        &self.config
    }

    /// Fit a classifier on the labeled rows. Persists nothing.
    pub fn train(
        &self,
        labeled: &LabeledTable,
        strategy: TrainingStrategy,
    ) -> Result<TrainedModel, SignalError> {
        let started = Instant::now();
        let n = labeled.len();
        if n < self.config.min_train_rows {
            return Err(SignalError::insufficient(self.config.min_train_rows, n));
        }

        let distribution = labeled.distribution();
        let classes = labeled.distinct_labels();
        if classes.len() < 2 {
            return Err(SignalError::InadequateLabelDiversity { distinct: classes.len() });
        }
        debug!("label distribution: {}", format_distribution(&distribution));

        let x: Vec<Vec<f64>> = labeled.rows().iter().map(|(row, _)| row.to_vector()).collect();
        let y: Vec<usize> = labeled
            .rows()
            .iter()
            .map(|(_, label)| encode(&classes, *label))
            .collect::<Result<_, _>>()?;

        let (classifier, holdout_f1, holdout_samples, hyperparameters) = match strategy {
            TrainingStrategy::Direct => (self.fit_forest(&x, &y)?, None, 0, None),
            TrainingStrategy::Tuned => {
                let (train, holdout) = train_test_split(n, self.config.holdout_fraction, self.config.seed);
                let outcome = random_search(
                    &x,
                    &y,
                    classes.len(),
                    &train,
                    &holdout,
                    &self.search_space,
                    self.config.trials,
                    self.config.seed,
                )?;
                info!(
                    "search: best trial {} of {} completed, weighted f1 {:.4}",
                    outcome.best.trial, outcome.completed_trials, outcome.best.score
                );
                let refit = GradientBoostedTrees::fit(&x, &y, classes.len(), &outcome.best.params, self.config.seed)?;
                (
                    Classifier::GradientBoosted(refit),
                    Some(outcome.best.score),
                    holdout.len(),
                    Some(outcome.best.params),
                )
            }
        };

        let predicted = classifier.predict(&x)?;
        let correct = predicted.iter().zip(&y).filter(|(p, t)| p == t).count();
        let train_accuracy = correct as f64 / n as f64;

        let metrics = ModelMetrics {
            train_accuracy,
            holdout_f1,
            train_samples: n,
            holdout_samples,
            class_distribution: distribution.clone(),
            hyperparameters: hyperparameters.clone(),
        };

        let artifact = ModelArtifact {
            trained_at: Utc::now(),
            n_classes: classes.len(),
            classes,
            feature_names: FEATURE_NAMES.iter().map(|s| s.to_string()).collect(),
            metrics,
            classifier,
        };

        Ok(TrainedModel {
            artifact,
            report: TrainingReport {
                samples: n,
                distribution,
                strategy,
                train_accuracy,
                holdout_f1,
                hyperparameters,
                elapsed: started.elapsed(),
            },
        })
    }

    fn fit_forest(&self, x: &[Vec<f64>], y: &[usize]) -> Result<Classifier, SignalError> {
        let matrix = DenseMatrix::from_2d_vec(&x.to_vec())
            .map_err(|e| SignalError::Training(format!("matrix error: {}", e)))?;
        let targets: Vec<u32> = y.iter().map(|&c| c as u32).collect();

        let mut params = RandomForestClassifierParameters::default()
            .with_n_trees(self.config.forest_trees.into())
            .with_seed(self.config.seed);
        if let Some(depth) = self.config.forest_max_depth {
            params = params.with_max_depth(depth);
        }

        let forest = Forest::fit(&matrix, &targets, params)
            .map_err(|e| SignalError::Training(format!("random forest fit failed: {}", e)))?;
        Ok(Classifier::RandomForest(forest))
    }
}

fn encode(classes: &[Action], label: Action) -> Result<usize, SignalError> {
    classes
        .iter()
        .position(|c| *c == label)
        .ok_or_else(|| SignalError::Training(format!("label {} missing from class table", label)))
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::ml::features::compute_features;
    use crate::ml::labels::{generate_labels, LabelPolicy};
    use crate::types::fixtures::{candles_from_closes, wavy_closes};

    pub fn labeled_wavy(n: usize, drop_wait: bool) -> LabeledTable {
        let candles = candles_from_closes(&wavy_closes(n));
        let table = compute_features(&candles, &Default::default());
        let policy = LabelPolicy {
            drop_wait,
            ..LabelPolicy::default()
        };
        generate_labels(&table, &policy)
    }

    pub fn small_trainer(tuning: bool) -> ModelTrainer {
        ModelTrainer::new(TrainerConfig {
            tuning_enabled: tuning,
            trials: 3,
            forest_trees: 15,
            ..TrainerConfig::default()
        })
    }

    pub fn trained_artifact(drop_wait: bool) -> ModelArtifact {
        let labeled = labeled_wavy(200, drop_wait);
        small_trainer(false)
            .train(&labeled, TrainingStrategy::Direct)
            .expect("training on wavy series")
            .artifact
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[test]
    fn test_too_few_rows_is_insufficient_data() {
        let labeled = labeled_wavy(60, false);
        assert!(labeled.len() < 50);
        let err = small_trainer(false)
            .train(&labeled, TrainingStrategy::Direct)
            .err()
            .unwrap();
        assert!(matches!(err, SignalError::InsufficientData { needed: 50, .. }));
    }

    #[test]
    fn test_single_class_is_rejected() {
        let rows: Vec<_> = labeled_wavy(200, false)
            .rows()
            .iter()
            .map(|(row, _)| (row.clone(), Action::Wait))
            .collect();
        let labeled = LabeledTable::from_pairs(rows);
        let err = small_trainer(false)
            .train(&labeled, TrainingStrategy::Direct)
            .err()
            .unwrap();
        assert!(matches!(err, SignalError::InadequateLabelDiversity { distinct: 1 }));
    }

    #[test]
    fn test_direct_fit_stores_class_table() {
        let labeled = labeled_wavy(200, false);
        let model = small_trainer(false)
            .train(&labeled, TrainingStrategy::Direct)
            .unwrap();
        assert_eq!(model.artifact.model_type(), ModelType::RandomForest);
        assert_eq!(model.artifact.classes, labeled.distinct_labels());
        assert_eq!(model.artifact.n_classes, model.artifact.classes.len());
        assert_eq!(model.artifact.feature_names.len(), FeatureRow::NUM_FEATURES);
        assert!(model.report.holdout_f1.is_none());
        assert!(model.report.train_accuracy > 0.5);
    }

    #[test]
    fn test_drop_wait_gives_two_classes() {
        let artifact = trained_artifact(true);
        assert_eq!(artifact.classes, vec![Action::AggressiveBuy, Action::Sell]);
    }

    #[test]
    fn test_tuned_fit_reports_holdout_score() {
        let labeled = labeled_wavy(200, false);
        let model = small_trainer(true)
            .train(&labeled, TrainingStrategy::Tuned)
            .unwrap();
        assert_eq!(model.artifact.model_type(), ModelType::GradientBoosted);
        let f1 = model.report.holdout_f1.unwrap();
        assert!((0.0..=1.0).contains(&f1));
        assert!(model.report.hyperparameters.is_some());
        assert_eq!(model.artifact.metrics.train_samples, labeled.len());
        assert_eq!(model.artifact.metrics.holdout_samples, (labeled.len() as f64 * 0.2).round() as usize);
    }

    #[test]
    fn test_tuned_fit_accepts_max_seed() {
        // per-trial seeds wrap past u64::MAX
        let labeled = labeled_wavy(200, false);
        let trainer = ModelTrainer::new(TrainerConfig {
            tuning_enabled: true,
            trials: 3,
            seed: u64::MAX,
            ..TrainerConfig::default()
        });
        let model = trainer.train(&labeled, TrainingStrategy::Tuned).unwrap();
        assert!(model.report.holdout_f1.is_some());
    }

    #[test]
    fn test_artifact_scores_latest_row() {
        let labeled = labeled_wavy(200, false);
        let artifact = trained_artifact(false);
        let (row, _) = labeled.rows().last().unwrap();
        let (index, confidence) = artifact.score(row).unwrap();
        assert!(index < artifact.n_classes);
        assert!(confidence.is_none());
    }
}
