use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

use crate::indicators::{MACD, RSI, RollingRange};
use crate::types::Candle;

/// Model input columns, in vector order.
pub const FEATURE_NAMES: [&str; 6] = ["rsi", "macd", "signal_line", "support", "resistance", "volume"];

/// Indicator periods used to build feature rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureParams {
    pub rsi_period: usize,
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub macd_signal: usize,
    /// Support/resistance lookback window.
    pub lookback: usize,
}

impl Default for FeatureParams {
    fn default() -> Self {
        Self {
            rsi_period: 14,
            macd_fast: 12,
            macd_slow: 26,
            macd_signal: 9,
            lookback: 20,
        }
    }
}

impl FeatureParams {
    /// Minimum number of candles before the first fully defined row exists.
    pub fn min_history(&self) -> usize {
        let rsi = self.rsi_period + 1;
        let macd = MACD::new(self.macd_fast, self.macd_slow, self.macd_signal).warm_up();
        rsi.max(macd).max(self.lookback)
    }
}

/// One fully determined feature vector. Never contains an undefined value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    pub open_time: DateTime<Utc>,
    pub close: f64,
    pub rsi: f64,
    pub macd: f64,
    pub signal_line: f64,
    pub support: f64,
    pub resistance: f64,
    pub volume: f64,
}

impl FeatureRow {
    pub const NUM_FEATURES: usize = FEATURE_NAMES.len();

    pub fn to_vector(&self) -> Vec<f64> {
        vec![
            self.rsi,
            self.macd,
            self.signal_line,
            self.support,
            self.resistance,
            self.volume,
        ]
    }
}

#[derive(Debug, Clone, Default)]
pub struct FeatureTable {
    rows: Vec<FeatureRow>,
}

impl FeatureTable {
    #[cfg(test)]
    pub fn from_rows(rows: Vec<FeatureRow>) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> &[FeatureRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn latest(&self) -> Option<&FeatureRow> {
        self.rows.last()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.rows.iter().map(|r| r.close).collect()
    }
}

/// Derive the feature table for a candle series. Rows without enough history
/// for every indicator are dropped, so a short series gives an empty table.
pub fn compute_features(candles: &[Candle], params: &FeatureParams) -> FeatureTable {
    let mut rsi = RSI::new(params.rsi_period);
    let mut macd = MACD::new(params.macd_fast, params.macd_slow, params.macd_signal);
    let mut range = RollingRange::new(params.lookback);

    let rows = candles
        .iter()
        .filter_map(|candle| {
            // every indicator must see every candle, so update before combining
            let rsi_value = rsi.update(candle.close);
            let macd_value = macd.update(candle.close);
            let range_value = range.update(candle.close);

            let (rsi_value, macd_value, range_value) = (rsi_value?, macd_value?, range_value?);
            Some(FeatureRow {
                open_time: candle.open_time,
                close: candle.close.to_f64()?,
                rsi: rsi_value.to_f64()?,
                macd: macd_value.macd_line.to_f64()?,
                signal_line: macd_value.signal_line.to_f64()?,
                support: range_value.support.to_f64()?,
                resistance: range_value.resistance.to_f64()?,
                volume: candle.volume.to_f64()?,
            })
        })
        .collect();

    FeatureTable { rows }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::fixtures::{candles_from_closes, wavy_closes};

    #[test]
    fn test_min_history_default() {
        assert_eq!(FeatureParams::default().min_history(), 34);
    }

    #[test]
    fn test_short_series_gives_empty_table() {
        let params = FeatureParams::default();
        for n in [0, 1, 20, params.min_history() - 1] {
            let candles = candles_from_closes(&wavy_closes(n));
            assert!(compute_features(&candles, &params).is_empty(), "n = {}", n);
        }
    }

    #[test]
    fn test_row_count_matches_history() {
        let params = FeatureParams::default();
        let candles = candles_from_closes(&wavy_closes(100));
        let table = compute_features(&candles, &params);
        assert_eq!(table.len(), 100 - params.min_history() + 1);
        assert_eq!(table.rows()[0].open_time, candles[params.min_history() - 1].open_time);
        assert_eq!(table.latest().unwrap().open_time, candles[99].open_time);
    }

    #[test]
    fn test_rows_are_fully_defined() {
        let candles = candles_from_closes(&wavy_closes(80));
        let table = compute_features(&candles, &FeatureParams::default());
        for row in table.rows() {
            assert!(row.to_vector().iter().all(|v| v.is_finite()));
            assert!((0.0..=100.0).contains(&row.rsi));
            assert!(row.support <= row.close && row.close <= row.resistance);
        }
    }

    #[test]
    fn test_input_is_not_mutated() {
        let candles = candles_from_closes(&wavy_closes(50));
        let before: Vec<_> = candles.iter().map(|c| c.close).collect();
        let _ = compute_features(&candles, &FeatureParams::default());
        let after: Vec<_> = candles.iter().map(|c| c.close).collect();
        assert_eq!(before, after);
    }
}
