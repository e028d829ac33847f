use rust_decimal::Decimal;
use std::collections::VecDeque;

/// Rolling minimum (support) and maximum (resistance) over the last `period`
/// values.
#[derive(Debug, Clone)]
pub struct RollingRange {
    period: usize,
    window: VecDeque<Decimal>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RangeOutput {
    pub support: Decimal,
    pub resistance: Decimal,
}

impl RollingRange {
    pub fn new(period: usize) -> Self {
        let period = period.max(1);
        Self {
            period,
            window: VecDeque::with_capacity(period),
        }
    }

    pub fn update(&mut self, value: Decimal) -> Option<RangeOutput> {
        if self.window.len() == self.period {
            self.window.pop_front();
        }
        self.window.push_back(value);

        if self.window.len() < self.period {
            return None;
        }

        let support = self.window.iter().min().copied()?;
        let resistance = self.window.iter().max().copied()?;
        Some(RangeOutput { support, resistance })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_rolling_range_slides() {
        let mut range = RollingRange::new(3);
        assert_eq!(range.update(dec!(5)), None);
        assert_eq!(range.update(dec!(1)), None);
        let out = range.update(dec!(3)).unwrap();
        assert_eq!(out.support, dec!(1));
        assert_eq!(out.resistance, dec!(5));

        let out = range.update(dec!(4)).unwrap();
        assert_eq!(out.support, dec!(1));
        assert_eq!(out.resistance, dec!(4));
    }
}
