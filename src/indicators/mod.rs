pub mod ema;
pub mod rsi;
pub mod macd;
pub mod range;

pub use rsi::*;
pub use macd::*;
pub use range::*;
