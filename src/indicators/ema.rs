use rust_decimal::Decimal;

/// Exponential moving average seeded with the simple average of the first
/// `period` inputs. Undefined until `period` values have been seen.
#[derive(Debug, Clone)]
pub struct EMA {
    period: usize,
    multiplier: Decimal,
    value: Option<Decimal>,
    count: usize,
    seed_sum: Decimal,
}

impl EMA {
    pub fn new(period: usize) -> Self {
        let period = period.max(1);
        Self {
            period,
            multiplier: Decimal::from(2) / Decimal::from(period as u32 + 1),
            value: None,
            count: 0,
            seed_sum: Decimal::ZERO,
        }
    }

    pub fn update(&mut self, price: Decimal) -> Option<Decimal> {
        self.count += 1;

        match self.value {
            None => {
                self.seed_sum += price;
                if self.count == self.period {
                    self.value = Some(self.seed_sum / Decimal::from(self.period as u32));
                }
            }
            Some(prev) => {
                self.value = Some((price - prev) * self.multiplier + prev);
            }
        }

        self.value
    }

    pub fn period(&self) -> usize {
        self.period
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_ema_seeds_with_sma() {
        let mut ema = EMA::new(3);
        assert_eq!(ema.update(dec!(1)), None);
        assert_eq!(ema.update(dec!(2)), None);
        assert_eq!(ema.update(dec!(3)), Some(dec!(2)));
        // multiplier = 0.5
        assert_eq!(ema.update(dec!(4)), Some(dec!(3)));
    }

    #[test]
    fn test_zero_period_is_clamped() {
        let mut ema = EMA::new(0);
        assert_eq!(ema.period(), 1);
        assert_eq!(ema.update(dec!(7)), Some(dec!(7)));
    }
}
