use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Discrete trading action. `Unknown` only comes out of an unmappable class
/// index and is never used as a training label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    AggressiveBuy,
    Sell,
    Wait,
    Unknown,
}

impl Action {
    #[cfg(test)]
    pub const LABELS: [Action; 3] = [Action::AggressiveBuy, Action::Sell, Action::Wait];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::AggressiveBuy => "AGGRESSIVE_BUY",
            Action::Sell => "SELL",
            Action::Wait => "WAIT",
            Action::Unknown => "UNKNOWN",
        }
    }

    /// Whether the action calls for a trade (and therefore an ROI evaluation).
    pub fn is_actionable(&self) -> bool {
        matches!(self, Action::AggressiveBuy | Action::Sell)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().replace(' ', "_").as_str() {
            "AGGRESSIVE_BUY" => Ok(Action::AggressiveBuy),
            "SELL" => Ok(Action::Sell),
            "WAIT" => Ok(Action::Wait),
            "UNKNOWN" => Ok(Action::Unknown),
            other => Err(format!("unknown action: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimeFrame {
    #[serde(rename = "1m")]
    M1,
    #[serde(rename = "5m")]
    M5,
    #[serde(rename = "15m")]
    M15,
    #[serde(rename = "30m")]
    M30,
    #[serde(rename = "1h")]
    H1,
    #[serde(rename = "2h")]
    H2,
    #[serde(rename = "4h")]
    H4,
    #[serde(rename = "6h")]
    H6,
    #[serde(rename = "12h")]
    H12,
    #[serde(rename = "1d")]
    D1,
}

impl TimeFrame {
    pub const ALL: [TimeFrame; 10] = [
        TimeFrame::M1,
        TimeFrame::M5,
        TimeFrame::M15,
        TimeFrame::M30,
        TimeFrame::H1,
        TimeFrame::H2,
        TimeFrame::H4,
        TimeFrame::H6,
        TimeFrame::H12,
        TimeFrame::D1,
    ];

    /// Binance interval code.
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeFrame::M1 => "1m",
            TimeFrame::M5 => "5m",
            TimeFrame::M15 => "15m",
            TimeFrame::M30 => "30m",
            TimeFrame::H1 => "1h",
            TimeFrame::H2 => "2h",
            TimeFrame::H4 => "4h",
            TimeFrame::H6 => "6h",
            TimeFrame::H12 => "12h",
            TimeFrame::D1 => "1d",
        }
    }

    pub fn to_minutes(&self) -> u64 {
        match self {
            TimeFrame::M1 => 1,
            TimeFrame::M5 => 5,
            TimeFrame::M15 => 15,
            TimeFrame::M30 => 30,
            TimeFrame::H1 => 60,
            TimeFrame::H2 => 120,
            TimeFrame::H4 => 240,
            TimeFrame::H6 => 360,
            TimeFrame::H12 => 720,
            TimeFrame::D1 => 1440,
        }
    }

    pub fn to_milliseconds(&self) -> u64 {
        self.to_minutes() * 60 * 1000
    }
}

impl fmt::Display for TimeFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TimeFrame {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        TimeFrame::ALL
            .iter()
            .copied()
            .find(|tf| tf.as_str() == wanted)
            .ok_or_else(|| format!("unsupported interval: {}", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_order_is_label_encoding_order() {
        let mut labels = vec![Action::Wait, Action::Sell, Action::AggressiveBuy];
        labels.sort();
        assert_eq!(labels, Action::LABELS.to_vec());
    }

    #[test]
    fn test_only_buy_and_sell_are_actionable() {
        assert!(!Action::Wait.is_actionable());
        assert!(!Action::Unknown.is_actionable());
        assert!(Action::AggressiveBuy.is_actionable());
        assert!(Action::Sell.is_actionable());
    }

    #[test]
    fn test_action_parsing() {
        assert_eq!("aggressive buy".parse::<Action>().unwrap(), Action::AggressiveBuy);
        assert_eq!("SELL".parse::<Action>().unwrap(), Action::Sell);
        assert!("HOLD".parse::<Action>().is_err());
    }

    #[test]
    fn test_timeframe_round_trip_through_code() {
        for tf in TimeFrame::ALL {
            assert_eq!(tf.as_str().parse::<TimeFrame>().unwrap(), tf);
        }
        assert!("7h".parse::<TimeFrame>().is_err());
    }

    #[test]
    fn test_timeframe_serde_uses_binance_codes() {
        let json = serde_json::to_string(&TimeFrame::H4).unwrap();
        assert_eq!(json, "\"4h\"");
        let action = serde_json::to_string(&Action::AggressiveBuy).unwrap();
        assert_eq!(action, "\"AGGRESSIVE_BUY\"");
    }
}
