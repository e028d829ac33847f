use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::roi::{evaluate_roi, RoiSummary};
use crate::config::PipelineConfig;
use crate::error::SignalError;
use crate::exchange::MarketData;
use crate::ml::labels::format_distribution;
use crate::ml::model::{ModelArtifact, TrainedModel, TrainingReport};
use crate::ml::predictor::{fallback, predict, resolve_action};
use crate::ml::{compute_features, generate_labels, FallbackReason, ModelStore, ModelTrainer, TrainingStrategy};
use crate::types::{closes, Action, TimeFrame};

/// What one (symbol, interval) pass produced.
#[derive(Debug, Clone, Serialize)]
pub struct PredictionResult {
    pub symbol: String,
    pub timeframe: TimeFrame,
    /// Open time of the candle the prediction was made on.
    pub as_of: DateTime<Utc>,
    pub action: Action,
    pub confidence: Option<f64>,
    pub roi: Option<RoiSummary>,
    pub fallback: Option<FallbackReason>,
}

#[derive(Debug)]
pub enum PassOutcome {
    Completed(PredictionResult),
    Skipped {
        symbol: String,
        timeframe: TimeFrame,
        reason: SignalError,
    },
}

impl PassOutcome {
    pub fn prediction(&self) -> Option<&PredictionResult> {
        match self {
            PassOutcome::Completed(result) => Some(result),
            PassOutcome::Skipped { .. } => None,
        }
    }
}

#[derive(Debug)]
pub struct CycleSummary {
    pub outcomes: Vec<PassOutcome>,
    pub elapsed: Duration,
}

impl CycleSummary {
    pub fn completed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.prediction().is_some()).count()
    }

    pub fn skipped(&self) -> usize {
        self.outcomes.len() - self.completed()
    }

    pub fn actionable(&self) -> usize {
        self.outcomes
            .iter()
            .filter_map(PassOutcome::prediction)
            .filter(|p| p.action.is_actionable())
            .count()
    }

    pub fn fallbacks(&self) -> usize {
        self.outcomes
            .iter()
            .filter_map(PassOutcome::prediction)
            .filter(|p| p.fallback.is_some())
            .count()
    }
}

/// Fetch -> features -> (train) -> predict -> ROI for every instrument and
/// interval. No pass error escapes: each becomes a skip or a `WAIT`.
pub struct SignalPipeline {
    market: Arc<dyn MarketData>,
    store: Arc<dyn ModelStore>,
    trainer: Arc<ModelTrainer>,
    config: Arc<PipelineConfig>,
}

impl SignalPipeline {
    pub fn new(market: Arc<dyn MarketData>, store: Arc<dyn ModelStore>, config: PipelineConfig) -> Self {
        let trainer = Arc::new(ModelTrainer::new(config.training.clone()));
        Self {
            market,
            store,
            trainer,
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// The configured allowlist, or every tradable symbol in the quote asset.
    pub async fn resolve_symbols(&self) -> Result<Vec<String>, SignalError> {
        if !self.config.run.symbols.is_empty() {
            let mut seen = HashSet::new();
            return Ok(self
                .config
                .run
                .symbols
                .iter()
                .map(|s| s.trim().to_uppercase())
                .filter(|s| seen.insert(s.clone()))
                .collect());
        }
        self.market.get_tradable_symbols(&self.config.run.quote_asset).await
    }

    /// One job per distinct (symbol, interval) slot, in first-seen order.
    /// Symbols are matched case-insensitively so no slot gets two passes.
    fn slot_jobs(&self, symbols: &[String]) -> Vec<(String, TimeFrame)> {
        let mut seen = HashSet::new();
        symbols
            .iter()
            .map(|s| s.trim().to_uppercase())
            .flat_map(|symbol| {
                self.config
                    .run
                    .intervals
                    .iter()
                    .map(move |tf| (symbol.clone(), *tf))
            })
            .filter(|job| seen.insert(job.clone()))
            .collect()
    }

    pub async fn run_cycle(&self, symbols: &[String]) -> CycleSummary {
        let started = Instant::now();
        let jobs = self.slot_jobs(symbols);
        let workers = self.config.run.max_workers.max(1);

        info!("Cycle start: {} slots from {} symbols, {} workers", jobs.len(), symbols.len(), workers);

        let outcomes: Vec<PassOutcome> = stream::iter(jobs)
            .map(|(symbol, timeframe)| async move { self.run_pass(&symbol, timeframe).await })
            .buffer_unordered(workers)
            .collect()
            .await;

        let summary = CycleSummary {
            outcomes,
            elapsed: started.elapsed(),
        };
        info!(
            "Cycle done in {:.1}s: {} predicted ({} actionable, {} fallback), {} skipped",
            summary.elapsed.as_secs_f64(),
            summary.completed(),
            summary.actionable(),
            summary.fallbacks(),
            summary.skipped()
        );
        summary
    }

    pub async fn run_pass(&self, symbol: &str, timeframe: TimeFrame) -> PassOutcome {
        let run = &self.config.run;

        let candles = match self.market.get_candles(symbol, timeframe, run.predict_limit).await {
            Ok(candles) => candles,
            Err(e) => return skip(symbol, timeframe, e),
        };
        if candles.len() < run.min_rows_to_predict {
            return skip(symbol, timeframe, SignalError::insufficient(run.min_rows_to_predict, candles.len()));
        }

        let table = compute_features(&candles, &self.config.features);
        let latest = match table.latest() {
            Some(row) => row.clone(),
            None => {
                let needed = self.config.features.min_history();
                return skip(symbol, timeframe, SignalError::insufficient(needed, candles.len()));
            }
        };

        let mut stored = self.stored_model(symbol, timeframe);
        let mut training_error = None;
        if let Some(why) = self.retrain_reason(stored.as_ref()) {
            info!("{} [{}]: training ({})", symbol, timeframe, why);
            match self.fit_slot(symbol, timeframe).await {
                Ok(trained) => stored = Some(Ok(trained.artifact)),
                Err(e) => {
                    warn!("{} [{}]: training failed, keeping previous model: {}", symbol, timeframe, e);
                    training_error = Some(e);
                }
            }
        }

        let (prediction, fallback_reason) = match stored {
            Some(loaded) => resolve_action(loaded.and_then(|artifact| predict(&artifact, &latest))),
            None => {
                let why = training_error.map_or_else(|| "no stored model".to_string(), |e| e.to_string());
                fallback(FallbackReason::ModelUnavailable(why))
            }
        };

        if let Some(reason) = &fallback_reason {
            warn!("{} [{}]: falling back to {}: {}", symbol, timeframe, Action::Wait, reason);
        }
        match prediction.confidence {
            Some(p) => info!("Prediction for {} ({}): {} (p={:.2})", symbol, timeframe, prediction.action, p),
            None => info!("Prediction for {} ({}): {}", symbol, timeframe, prediction.action),
        }

        let roi = if prediction.action.is_actionable() {
            let summary = match evaluate_roi(&closes(&candles), prediction.action, run.roi_lookahead) {
                Ok(summary) => summary,
                Err(e) => {
                    warn!("{} [{}]: ROI not computed: {}", symbol, timeframe, e);
                    RoiSummary::zero()
                }
            };
            info!(
                "Max ROI for {} ({}) over {} bars: {}% (high {:?}, low {:?})",
                symbol,
                timeframe,
                run.roi_lookahead,
                summary.roi_percentage(),
                summary.high,
                summary.low
            );
            Some(summary)
        } else {
            None
        };

        PassOutcome::Completed(PredictionResult {
            symbol: symbol.to_string(),
            timeframe,
            as_of: latest.open_time,
            action: prediction.action,
            confidence: prediction.confidence,
            roi,
            fallback: fallback_reason,
        })
    }

    /// Fetch the training window, label it, fit off the async runtime and
    /// save the artifact. The stored artifact is untouched on failure.
    pub async fn train_slot(&self, symbol: &str, timeframe: TimeFrame) -> Result<TrainingReport, SignalError> {
        self.fit_slot(symbol, timeframe).await.map(|trained| trained.report)
    }

    async fn fit_slot(&self, symbol: &str, timeframe: TimeFrame) -> Result<TrainedModel, SignalError> {
        let candles = self
            .market
            .get_candles(symbol, timeframe, self.config.run.train_limit)
            .await?;
        let table = compute_features(&candles, &self.config.features);
        let labeled = generate_labels(&table, &self.config.labels);
        debug!(
            "{} [{}]: {} candles -> {} feature rows -> {} labeled rows",
            symbol,
            timeframe,
            candles.len(),
            table.len(),
            labeled.len()
        );

        let trainer = Arc::clone(&self.trainer);
        let strategy = TrainingStrategy::from_tuning(trainer.config().tuning_enabled);
        let trained = tokio::task::spawn_blocking(move || trainer.train(&labeled, strategy))
            .await
            .map_err(|e| SignalError::Training(format!("training task aborted: {}", e)))??;

        self.store.save(symbol, timeframe, &trained.artifact)?;

        let report = &trained.report;
        info!(
            "{} [{}]: trained {:?} on {} rows [{}] in {:.2}s, train accuracy {:.3}{}",
            symbol,
            timeframe,
            report.strategy,
            report.samples,
            format_distribution(&report.distribution),
            report.elapsed.as_secs_f64(),
            report.train_accuracy,
            report
                .holdout_f1
                .map(|f1| format!(", holdout f1 {:.3}", f1))
                .unwrap_or_default()
        );
        Ok(trained)
    }

    /// `None` when the slot has no artifact. Loaded once per pass.
    fn stored_model(&self, symbol: &str, timeframe: TimeFrame) -> Option<Result<ModelArtifact, SignalError>> {
        self.store
            .exists(symbol, timeframe)
            .then(|| self.store.load(symbol, timeframe))
    }

    fn retrain_reason(&self, stored: Option<&Result<ModelArtifact, SignalError>>) -> Option<&'static str> {
        match stored {
            None => Some("no stored model"),
            Some(Ok(artifact)) => {
                let max_age_hours = self.config.run.max_model_age_hours?;
                (artifact.age(Utc::now()) > chrono::Duration::hours(max_age_hours as i64))
                    .then_some("stored model is stale")
            }
            // an unreadable artifact is reported by the prediction step
            Some(Err(_)) => None,
        }
    }
}

fn skip(symbol: &str, timeframe: TimeFrame, reason: SignalError) -> PassOutcome {
    warn!("{} [{}]: skipped ({}): {}", symbol, timeframe, reason.kind(), reason);
    PassOutcome::Skipped {
        symbol: symbol.to_string(),
        timeframe,
        reason,
    }
}
