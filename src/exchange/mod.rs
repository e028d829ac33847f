pub mod binance;

pub use binance::*;

use async_trait::async_trait;

#[cfg(test)]
use mockall::automock;

use crate::error::SignalError;
use crate::types::{Candle, TimeFrame};

/// Source of candle series and of the tradable instrument universe.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait MarketData: Send + Sync {
    /// Most recent `limit` candles, oldest first.
    async fn get_candles(&self, symbol: &str, timeframe: TimeFrame, limit: u32) -> Result<Vec<Candle>, SignalError>;

    /// Symbols currently trading on spot against `quote_asset`.
    async fn get_tradable_symbols(&self, quote_asset: &str) -> Result<Vec<String>, SignalError>;
}
