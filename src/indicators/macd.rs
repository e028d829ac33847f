use rust_decimal::Decimal;
use super::ema::EMA;

/// MACD line (fast EMA minus slow EMA) with its EMA signal line.
#[derive(Debug, Clone)]
pub struct MACD {
    fast_ema: EMA,
    slow_ema: EMA,
    signal_ema: EMA,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MACDOutput {
    pub macd_line: Decimal,
    pub signal_line: Decimal,
    pub histogram: Decimal,
}

impl MACD {
    pub fn new(fast_period: usize, slow_period: usize, signal_period: usize) -> Self {
        Self {
            fast_ema: EMA::new(fast_period),
            slow_ema: EMA::new(slow_period),
            signal_ema: EMA::new(signal_period),
        }
    }

    /// Number of inputs consumed before the first output appears.
    pub fn warm_up(&self) -> usize {
        self.fast_ema.period().max(self.slow_ema.period()) + self.signal_ema.period() - 1
    }

    pub fn update(&mut self, price: Decimal) -> Option<MACDOutput> {
        let fast = self.fast_ema.update(price);
        let slow = self.slow_ema.update(price);

        let macd_line = fast? - slow?;
        let signal_line = self.signal_ema.update(macd_line)?;
        Some(MACDOutput {
            macd_line,
            signal_line,
            histogram: macd_line - signal_line,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_macd_first_output_index() {
        let mut macd = MACD::new(12, 26, 9);
        assert_eq!(macd.warm_up(), 34);
        let first = (0..60)
            .position(|i| macd.update(Decimal::from(100 + i)).is_some());
        assert_eq!(first, Some(33));
    }

    #[test]
    fn test_macd_flat_series_is_zero() {
        let mut macd = MACD::new(3, 5, 2);
        let mut last = None;
        for _ in 0..10 {
            last = macd.update(Decimal::from(50));
        }
        let out = last.unwrap();
        assert!(out.macd_line.is_zero());
        assert!(out.histogram.is_zero());
    }
}
