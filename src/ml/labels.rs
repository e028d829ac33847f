use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::features::{FeatureRow, FeatureTable};
use crate::types::Action;

/// Thresholds that turn a forward price window into a ground-truth action.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LabelPolicy {
    /// Minimum best-case gain over the horizon for `AGGRESSIVE_BUY`.
    pub reward_threshold: f64,
    /// Minimum worst-case drop over the horizon for `SELL`.
    pub risk_threshold: f64,
    /// Number of bars after the labeled bar that form its window.
    pub horizon: usize,
    /// Remove every `WAIT` row from the labeled output.
    pub drop_wait: bool,
}

impl Default for LabelPolicy {
    fn default() -> Self {
        Self {
            reward_threshold: 0.0075,
            risk_threshold: 0.004,
            horizon: 3,
            drop_wait: true,
        }
    }
}

/// Label each close. Bars without a complete future window are `Wait`.
pub fn label_closes(closes: &[f64], policy: &LabelPolicy) -> Vec<Action> {
    let n = closes.len();
    (0..n)
        .map(|i| {
            if policy.horizon == 0 || i + policy.horizon >= n {
                return Action::Wait;
            }
            let current = closes[i];
            if current <= 0.0 {
                return Action::Wait;
            }

            let future = &closes[i + 1..=i + policy.horizon];
            let max = future.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let min = future.iter().copied().fold(f64::INFINITY, f64::min);
            let gain = (max - current) / current;
            let loss = (current - min) / current;

            // reward is checked first: a window that hits both thresholds is a buy
            if gain >= policy.reward_threshold {
                Action::AggressiveBuy
            } else if loss >= policy.risk_threshold {
                Action::Sell
            } else {
                Action::Wait
            }
        })
        .collect()
}

#[derive(Debug, Clone, Default)]
pub struct LabeledTable {
    rows: Vec<(FeatureRow, Action)>,
}

impl LabeledTable {
    #[cfg(test)]
    pub fn from_pairs(rows: Vec<(FeatureRow, Action)>) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> &[(FeatureRow, Action)] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    #[cfg(test)]
    pub fn labels(&self) -> Vec<Action> {
        self.rows.iter().map(|(_, label)| *label).collect()
    }

    pub fn distribution(&self) -> BTreeMap<Action, usize> {
        let mut counts = BTreeMap::new();
        for (_, label) in &self.rows {
            *counts.entry(*label).or_insert(0) += 1;
        }
        counts
    }

    /// Distinct labels in encoding order.
    pub fn distinct_labels(&self) -> Vec<Action> {
        self.distribution().into_keys().collect()
    }
}

pub fn generate_labels(table: &FeatureTable, policy: &LabelPolicy) -> LabeledTable {
    let labels = label_closes(&table.closes(), policy);
    let rows = table
        .rows()
        .iter()
        .cloned()
        .zip(labels)
        .filter(|(_, label)| !(policy.drop_wait && *label == Action::Wait))
        .collect();
    LabeledTable { rows }
}

pub fn format_distribution(counts: &BTreeMap<Action, usize>) -> String {
    counts
        .iter()
        .map(|(label, count)| format!("{}: {}", label, count))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn keep_wait() -> LabelPolicy {
        LabelPolicy {
            drop_wait: false,
            ..LabelPolicy::default()
        }
    }

    fn table_from_closes(closes: &[f64]) -> FeatureTable {
        let rows = closes
            .iter()
            .map(|&close| FeatureRow {
                open_time: Utc::now(),
                close,
                rsi: 50.0,
                macd: 0.0,
                signal_line: 0.0,
                support: close,
                resistance: close,
                volume: 1.0,
            })
            .collect();
        FeatureTable::from_rows(rows)
    }

    #[test]
    fn test_reward_wins_tie_break() {
        // +1% and -1% inside the same window
        let labels = label_closes(&[100.0, 101.0, 99.0, 100.0], &keep_wait());
        assert_eq!(labels[0], Action::AggressiveBuy);
    }

    #[test]
    fn test_risk_only_is_sell() {
        let labels = label_closes(&[100.0, 99.5, 100.2, 100.1], &keep_wait());
        assert_eq!(labels[0], Action::Sell);
    }

    #[test]
    fn test_last_horizon_rows_are_wait() {
        let closes: Vec<f64> = (0..10).map(|i| 100.0 + 5.0 * i as f64).collect();
        let policy = keep_wait();
        let labels = label_closes(&closes, &policy);
        assert!(labels[..10 - policy.horizon].iter().all(|l| *l == Action::AggressiveBuy));
        assert!(labels[10 - policy.horizon..].iter().all(|l| *l == Action::Wait));
    }

    #[test]
    fn test_increasing_series_is_all_buy() {
        let closes: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
        let table = table_from_closes(&closes);
        let labeled = generate_labels(&table, &LabelPolicy::default());
        assert_eq!(labeled.len(), 30 - 3);
        assert!(labeled.labels().iter().all(|l| *l == Action::AggressiveBuy));
    }

    #[test]
    fn test_flat_series_is_all_wait() {
        let table = table_from_closes(&[100.0; 30]);
        let labeled = generate_labels(&table, &keep_wait());
        assert_eq!(labeled.len(), 30);
        assert!(labeled.labels().iter().all(|l| *l == Action::Wait));
        assert_eq!(labeled.distinct_labels(), vec![Action::Wait]);

        let dropped = generate_labels(&table, &LabelPolicy::default());
        assert!(dropped.is_empty());
    }

    #[test]
    fn test_zero_close_is_wait() {
        let labels = label_closes(&[0.0, 1.0, 2.0, 3.0], &keep_wait());
        assert_eq!(labels[0], Action::Wait);
    }

    #[test]
    fn test_distribution_formatting() {
        let table = table_from_closes(&[100.0, 101.0, 99.0, 100.0, 100.0]);
        let labeled = generate_labels(&table, &keep_wait());
        let text = format_distribution(&labeled.distribution());
        assert!(text.starts_with("AGGRESSIVE_BUY: 1"));
        assert!(text.contains("WAIT"));
    }
}
