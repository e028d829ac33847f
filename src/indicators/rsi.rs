use rust_decimal::Decimal;

/// Relative strength index with Wilder smoothing. The first value is produced
/// once `period` price changes have been observed (i.e. on input `period + 1`).
#[derive(Debug, Clone)]
pub struct RSI {
    period: usize,
    avg_gain: Option<Decimal>,
    avg_loss: Option<Decimal>,
    prev_price: Option<Decimal>,
    seed_gain: Decimal,
    seed_loss: Decimal,
    changes: usize,
    value: Option<Decimal>,
}

impl RSI {
    pub fn new(period: usize) -> Self {
        Self {
            period: period.max(1),
            avg_gain: None,
            avg_loss: None,
            prev_price: None,
            seed_gain: Decimal::ZERO,
            seed_loss: Decimal::ZERO,
            changes: 0,
            value: None,
        }
    }

    pub fn update(&mut self, price: Decimal) -> Option<Decimal> {
        if let Some(prev) = self.prev_price {
            let change = price - prev;
            let gain = change.max(Decimal::ZERO);
            let loss = (-change).max(Decimal::ZERO);
            let period = Decimal::from(self.period as u32);
            self.changes += 1;

            match (self.avg_gain, self.avg_loss) {
                (Some(avg_gain), Some(avg_loss)) => {
                    self.avg_gain = Some((avg_gain * (period - Decimal::ONE) + gain) / period);
                    self.avg_loss = Some((avg_loss * (period - Decimal::ONE) + loss) / period);
                    self.value = self.calculate_rsi();
                }
                _ => {
                    self.seed_gain += gain;
                    self.seed_loss += loss;
                    if self.changes == self.period {
                        self.avg_gain = Some(self.seed_gain / period);
                        self.avg_loss = Some(self.seed_loss / period);
                        self.value = self.calculate_rsi();
                    }
                }
            }
        }

        self.prev_price = Some(price);
        self.value
    }

    fn calculate_rsi(&self) -> Option<Decimal> {
        let (avg_gain, avg_loss) = (self.avg_gain?, self.avg_loss?);
        if avg_loss.is_zero() {
            return Some(Decimal::from(100));
        }
        let rs = avg_gain / avg_loss;
        Some(Decimal::from(100) - (Decimal::from(100) / (Decimal::ONE + rs)))
    }
}
