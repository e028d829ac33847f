use chrono::{DateTime, TimeZone, Utc};
use tracing::{error, info};

use super::pipeline::SignalPipeline;
use crate::types::TimeFrame;

/// First epoch-aligned boundary of `timeframe` strictly after `now`.
pub fn next_candle_boundary(now: DateTime<Utc>, timeframe: TimeFrame) -> DateTime<Utc> {
    let period = timeframe.to_milliseconds() as i64;
    let now_ms = now.timestamp_millis();
    let next = (now_ms.div_euclid(period) + 1) * period;
    Utc.timestamp_millis_opt(next).single().unwrap_or(now)
}

pub async fn wait_until_next_candle(timeframe: TimeFrame) {
    let now = Utc::now();
    let boundary = next_candle_boundary(now, timeframe);
    let wait = (boundary - now).to_std().unwrap_or_default();
    info!("Waiting {}s for the next {} candle at {}", wait.as_secs(), timeframe, boundary.format("%Y-%m-%d %H:%M:%S UTC"));
    tokio::time::sleep(wait).await;
}

/// Wait for each candle close, refresh the universe, run one cycle. Never returns.
pub async fn run_forever(pipeline: &SignalPipeline) {
    let timeframe = pipeline.config().run.cycle_timeframe;
    loop {
        wait_until_next_candle(timeframe).await;

        let symbols = match pipeline.resolve_symbols().await {
            Ok(symbols) if !symbols.is_empty() => symbols,
            Ok(_) => {
                error!("No tradable symbols for quote asset {}", pipeline.config().run.quote_asset);
                continue;
            }
            Err(e) => {
                error!("Failed to refresh symbol universe: {}", e);
                continue;
            }
        };
        pipeline.run_cycle(&symbols).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 10, h, m, s).unwrap()
    }

    #[test]
    fn test_next_hour_boundary() {
        assert_eq!(next_candle_boundary(at(13, 27, 5), TimeFrame::H1), at(14, 0, 0));
    }

    #[test]
    fn test_exact_boundary_moves_forward() {
        assert_eq!(next_candle_boundary(at(14, 0, 0), TimeFrame::H1), at(15, 0, 0));
    }

    #[test]
    fn test_multi_hour_boundaries_are_epoch_aligned() {
        assert_eq!(next_candle_boundary(at(13, 27, 5), TimeFrame::H4), at(16, 0, 0));
        assert_eq!(next_candle_boundary(at(13, 27, 5), TimeFrame::M15), at(13, 30, 0));
        assert_eq!(
            next_candle_boundary(at(23, 59, 59), TimeFrame::D1),
            Utc.with_ymd_and_hms(2024, 3, 11, 0, 0, 0).unwrap()
        );
    }
}
