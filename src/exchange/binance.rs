use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::num::NonZeroU32;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::MarketData;
use crate::config::ExchangeSettings;
use crate::error::SignalError;
use crate::types::{validate_series, Candle, TimeFrame};

/// Public (unsigned) Binance spot REST client.
#[derive(Clone)]
pub struct BinanceClient {
    client: Client,
    base_url: String,
    limiter: Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>,
}

impl BinanceClient {
    pub fn new(settings: &ExchangeSettings) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .context("building HTTP client")?;
        let rate = NonZeroU32::new(settings.requests_per_second).unwrap_or(NonZeroU32::MIN);

        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            limiter: Arc::new(RateLimiter::direct(Quota::per_second(rate))),
        })
    }

    async fn get_json(&self, url: &str) -> Result<serde_json::Value> {
        self.limiter.until_ready().await;
        debug!("GET {}", url);

        let resp = self.client.get(url).send().await?;
        let status = resp.status();
        let body: serde_json::Value = resp.json().await.context("decoding response body")?;

        if let Some(err) = api_error(&body) {
            return Err(anyhow!("Binance API error ({}): {}", status, err));
        }
        if !status.is_success() {
            return Err(anyhow!("HTTP {} from {}", status, url));
        }
        Ok(body)
    }

    pub async fn fetch_candles(&self, symbol: &str, timeframe: TimeFrame, limit: u32) -> Result<Vec<Candle>> {
        let url = format!(
            "{}/api/v3/klines?symbol={}&interval={}&limit={}",
            self.base_url,
            symbol,
            timeframe.as_str(),
            limit
        );
        let body = self.get_json(&url).await?;
        parse_klines(symbol, timeframe, body)
    }

    pub async fn fetch_tradable_symbols(&self, quote_asset: &str) -> Result<Vec<String>> {
        let url = format!("{}/api/v3/exchangeInfo", self.base_url);
        let body = self.get_json(&url).await?;
        let info: ExchangeInfoResponse = serde_json::from_value(body).context("decoding exchangeInfo")?;
        Ok(filter_symbols(&info, quote_asset))
    }
}

#[async_trait]
impl MarketData for BinanceClient {
    async fn get_candles(&self, symbol: &str, timeframe: TimeFrame, limit: u32) -> Result<Vec<Candle>, SignalError> {
        self.fetch_candles(symbol, timeframe, limit)
            .await
            .map_err(|e| SignalError::DataFetch(format!("{} {}: {:#}", symbol, timeframe, e)))
    }

    async fn get_tradable_symbols(&self, quote_asset: &str) -> Result<Vec<String>, SignalError> {
        self.fetch_tradable_symbols(quote_asset)
            .await
            .map_err(|e| SignalError::DataFetch(format!("exchangeInfo: {:#}", e)))
    }
}

/// Binance reports failures as `{"code": -1121, "msg": "Invalid symbol."}`.
fn api_error(body: &serde_json::Value) -> Option<String> {
    let obj = body.as_object()?;
    let code = obj.get("code")?;
    let msg = obj.get("msg").and_then(|m| m.as_str()).unwrap_or("unknown error");
    Some(format!("{} {}", code, msg))
}

pub fn parse_klines(symbol: &str, timeframe: TimeFrame, body: serde_json::Value) -> Result<Vec<Candle>> {
    let rows: Vec<Vec<serde_json::Value>> =
        serde_json::from_value(body).context("klines payload is not an array of arrays")?;

    let candles = rows
        .into_iter()
        .map(|k| {
            let millis = |i: usize| -> Result<chrono::DateTime<Utc>> {
                let ms = k.get(i).and_then(|v| v.as_i64()).ok_or_else(|| anyhow!("kline field {} missing", i))?;
                Utc.timestamp_millis_opt(ms)
                    .single()
                    .ok_or_else(|| anyhow!("invalid timestamp {}", ms))
            };
            let decimal = |i: usize| -> Result<Decimal> {
                let raw = k.get(i).and_then(|v| v.as_str()).ok_or_else(|| anyhow!("kline field {} missing", i))?;
                Decimal::from_str(raw).with_context(|| format!("kline field {} = {:?}", i, raw))
            };

            Ok(Candle {
                symbol: symbol.to_string(),
                timeframe,
                open_time: millis(0)?,
                open: decimal(1)?,
                high: decimal(2)?,
                low: decimal(3)?,
                close: decimal(4)?,
                volume: decimal(5)?,
                close_time: millis(6)?,
                quote_volume: decimal(7)?,
                trades: k.get(8).and_then(|v| v.as_u64()).unwrap_or(0),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    validate_series(&candles).map_err(|e| anyhow!(e))?;
    Ok(candles)
}

fn filter_symbols(info: &ExchangeInfoResponse, quote_asset: &str) -> Vec<String> {
    info.symbols
        .iter()
        .filter(|s| s.quote_asset == quote_asset && s.status == "TRADING" && s.is_spot_trading_allowed)
        .map(|s| s.symbol.clone())
        .collect()
}

// API Response Types
#[derive(Debug, Deserialize)]
struct ExchangeInfoResponse {
    symbols: Vec<SymbolInfo>,
}

#[derive(Debug, Deserialize)]
struct SymbolInfo {
    symbol: String,
    status: String,
    #[serde(rename = "quoteAsset")]
    quote_asset: String,
    #[serde(rename = "isSpotTradingAllowed", default)]
    is_spot_trading_allowed: bool,
}
