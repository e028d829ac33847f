use rust_decimal::Decimal;
use serde::Serialize;

use crate::error::SignalError;
use crate::types::Action;

/// Best-case return of an action over the recent window, as a fraction of
/// the entry price.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RoiSummary {
    pub roi: Decimal,
    pub high: Option<Decimal>,
    pub low: Option<Decimal>,
}

impl RoiSummary {
    pub fn zero() -> Self {
        Self {
            roi: Decimal::ZERO,
            high: None,
            low: None,
        }
    }

    pub fn roi_percentage(&self) -> Decimal {
        (self.roi * Decimal::ONE_HUNDRED).round_dp(4)
    }
}

/// Entry is the last close; the window is the last `lookahead` closes,
/// entry bar included.
pub fn evaluate_roi(closes: &[Decimal], action: Action, lookahead: usize) -> Result<RoiSummary, SignalError> {
    let entry = match closes.last() {
        Some(entry) if lookahead > 0 => *entry,
        _ => return Ok(RoiSummary::zero()),
    };
    if entry.is_zero() {
        return Err(SignalError::Domain("entry price is zero".to_string()));
    }

    let window = &closes[closes.len().saturating_sub(lookahead)..];
    let high = window.iter().copied().max();
    let low = window.iter().copied().min();

    let roi = match (action, high, low) {
        (Action::AggressiveBuy, Some(high), _) => (high - entry) / entry,
        (Action::Sell, _, Some(low)) => (entry - low) / entry,
        _ => Decimal::ZERO,
    };

    Ok(RoiSummary { roi, high, low })
}
