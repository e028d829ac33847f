use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::ml::{FeatureParams, LabelPolicy, TrainerConfig};
use crate::types::TimeFrame;

/// Environment overrides look like `SIGNAL__RUN__MAX_WORKERS=4`.
pub const ENV_PREFIX: &str = "SIGNAL";
pub const ENV_SEPARATOR: &str = "__";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub models_dir: String,
    pub run: RunSettings,
    pub features: FeatureParams,
    pub labels: LabelPolicy,
    pub training: TrainerConfig,
    pub exchange: ExchangeSettings,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            models_dir: "models".to_string(),
            run: RunSettings::default(),
            features: FeatureParams::default(),
            labels: LabelPolicy::default(),
            training: TrainerConfig::default(),
            exchange: ExchangeSettings::default(),
        }
    }
}

impl PipelineConfig {
    /// Defaults, then `path` if it exists, then `SIGNAL__*` variables.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, config::ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path.as_ref()).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator(ENV_SEPARATOR)
                    .try_parsing(true),
            )
            .build()?;

        settings.try_deserialize()
    }

    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        // Run validation
        if self.run.intervals.is_empty() {
            errors.push("run.intervals must not be empty".to_string());
        }
        if self.run.quote_asset.trim().is_empty() {
            errors.push("run.quote_asset must not be empty".to_string());
        }
        if self.run.max_workers == 0 {
            errors.push("run.max_workers must be > 0".to_string());
        }
        if self.run.min_rows_to_predict == 0 {
            errors.push("run.min_rows_to_predict must be > 0".to_string());
        }
        if (self.run.predict_limit as usize) < self.run.min_rows_to_predict {
            errors.push("run.predict_limit must be >= run.min_rows_to_predict".to_string());
        }
        if (self.run.train_limit as usize) < self.features.min_history() {
            errors.push(format!(
                "run.train_limit must cover the {} bar feature warm-up",
                self.features.min_history()
            ));
        }
        if self.run.roi_lookahead == 0 {
            errors.push("run.roi_lookahead must be > 0".to_string());
        }

        // Feature validation
        if self.features.rsi_period == 0 || self.features.lookback == 0 || self.features.macd_signal == 0 {
            errors.push("features: periods must be > 0".to_string());
        }
        if self.features.macd_fast == 0 || self.features.macd_fast >= self.features.macd_slow {
            errors.push("features: macd_fast must be > 0 and < macd_slow".to_string());
        }

        // Label validation
        if self.labels.reward_threshold <= 0.0 {
            errors.push("labels.reward_threshold must be > 0".to_string());
        }
        if self.labels.risk_threshold <= 0.0 {
            errors.push("labels.risk_threshold must be > 0".to_string());
        }
        if self.labels.horizon == 0 {
            errors.push("labels.horizon must be > 0".to_string());
        }

        // Training validation
        if self.training.min_train_rows < 2 {
            errors.push("training.min_train_rows must be >= 2".to_string());
        }
        if !(self.training.holdout_fraction > 0.0 && self.training.holdout_fraction < 1.0) {
            errors.push("training.holdout_fraction must be between 0 and 1".to_string());
        }
        if self.training.tuning_enabled && self.training.trials == 0 {
            errors.push("training.trials must be > 0 when tuning is enabled".to_string());
        }
        if self.training.forest_trees == 0 {
            errors.push("training.forest_trees must be > 0".to_string());
        }

        // Exchange validation
        if self.exchange.requests_per_second == 0 {
            errors.push("exchange.requests_per_second must be > 0".to_string());
        }
        if !self.exchange.base_url.starts_with("http") {
            errors.push("exchange.base_url must be an http(s) URL".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunSettings {
    pub intervals: Vec<TimeFrame>,
    pub quote_asset: String,
    /// Restrict the universe to these symbols. Empty means every tradable
    /// symbol quoted in `quote_asset`.
    pub symbols: Vec<String>,
    pub predict_limit: u32,
    pub train_limit: u32,
    pub min_rows_to_predict: usize,
    pub roi_lookahead: usize,
    pub max_workers: usize,
    /// Retrain artifacts older than this. Unset means train once per slot.
    pub max_model_age_hours: Option<u64>,
    /// Candle boundary the forever loop waits for between cycles.
    pub cycle_timeframe: TimeFrame,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            intervals: vec![TimeFrame::H1, TimeFrame::H4],
            quote_asset: "USDT".to_string(),
            symbols: Vec::new(),
            predict_limit: 100,
            train_limit: 150,
            min_rows_to_predict: 50,
            roi_lookahead: 6,
            max_workers: 10,
            max_model_age_hours: None,
            cycle_timeframe: TimeFrame::H1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExchangeSettings {
    pub base_url: String,
    pub requests_per_second: u32,
    pub timeout_secs: u64,
}

impl Default for ExchangeSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.binance.com".to_string(),
            requests_per_second: 10,
            timeout_secs: 10,
        }
    }
}
