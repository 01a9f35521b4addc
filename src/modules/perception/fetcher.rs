use reqwest::Client;
use async_trait::async_trait;
use futures_util::future::join_all;
use serde_json::Value;
use chrono::{DateTime, FixedOffset};
use std::sync::Arc;
use tracing::{info, warn};

use super::report::FetchReport;
use super::structs::{Event, RawTimestamp, Tick};
use crate::error::FetchError;

/// One OHLCV row as returned by a price provider. `None` means the provider left the value undefined.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceRow {
    pub timestamp: RawTimestamp,
    pub ticker: String,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
    pub volume: Option<f64>,
}

/// One call per ticker, so a bad symbol only costs its own rows.
#[async_trait]
pub trait PriceProvider: Send + Sync {
    async fn fetch(&self, ticker: &str, lookback_days: i64) -> Result<Vec<PriceRow>, FetchError>;
}

/// Yahoo v8 chart endpoint, one request per ticker.
pub struct YahooChartProvider {
    client: Client,
    base_url: String,
    interval: String,
}

impl YahooChartProvider {
    pub fn new(client: Client, base_url: impl Into<String>, interval: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            interval: interval.into(),
        }
    }
}

#[async_trait]
impl PriceProvider for YahooChartProvider {
    async fn fetch(&self, ticker: &str, lookback_days: i64) -> Result<Vec<PriceRow>, FetchError> {
        let url = format!("{}/v8/finance/chart/{}", self.base_url.trim_end_matches('/'), ticker);
        let range = format!("{}d", lookback_days);
        let params = [
            ("interval", self.interval.as_str()),
            ("range", range.as_str()),
        ];

        let resp = self.client.get(&url).query(&params).send().await?;
        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(FetchError::Status { status, body });
        }

        let json: Value = resp.json().await?;
        parse_chart(ticker, &json)
    }
}

/// Unzips the chart's parallel arrays into rows. Missing arrays mean "no bars", not an error.
pub fn parse_chart(ticker: &str, json: &Value) -> Result<Vec<PriceRow>, FetchError> {
    if let Some(err) = json["chart"]["error"].as_object() {
        let description = err.get("description").and_then(Value::as_str).unwrap_or("unknown chart error");
        return Err(FetchError::Decode(format!("{}: {}", ticker, description)));
    }

    let result = json["chart"]["result"]
        .get(0)
        .ok_or_else(|| FetchError::Decode(format!("{}: no chart result", ticker)))?;

    let offset_secs = result["meta"]["gmtoffset"].as_i64().unwrap_or(0);
    let offset = i32::try_from(offset_secs)
        .ok()
        .and_then(FixedOffset::east_opt)
        .ok_or_else(|| FetchError::Decode(format!("{}: bad gmtoffset {}", ticker, offset_secs)))?;

    let Some(stamps) = result["timestamp"].as_array() else {
        return Ok(Vec::new());
    };
    let quote = &result["indicators"]["quote"][0];
    let column = |name: &str, i: usize| quote[name].get(i).and_then(Value::as_f64);

    let mut rows = Vec::with_capacity(stamps.len());
    for (i, stamp) in stamps.iter().enumerate() {
        let Some(secs) = stamp.as_i64() else { continue };
        let Some(utc) = DateTime::from_timestamp(secs, 0) else { continue };
        rows.push(PriceRow {
            timestamp: RawTimestamp::Zoned(utc.with_timezone(&offset)),
            ticker: ticker.to_string(),
            open: column("open", i),
            high: column("high", i),
            low: column("low", i),
            close: column("close", i),
            volume: column("volume", i),
        });
    }
    Ok(rows)
}

/// Builds a tick from a row, or `None` when the close is undefined.
pub fn row_to_tick(row: PriceRow) -> Option<Tick> {
    let close = row.close.filter(|c| !c.is_nan())?;
    let or_close = |v: Option<f64>| v.filter(|x| !x.is_nan()).unwrap_or(close);
    let volume = row.volume.filter(|v| v.is_finite() && *v > 0.0).map_or(0, |v| v as u64);

    Some(Tick {
        ticker: row.ticker,
        timestamp: row.timestamp.to_utc(),
        open: or_close(row.open),
        high: or_close(row.high),
        low: or_close(row.low),
        close,
        volume,
    })
}

pub struct PriceFetcher {
    provider: Arc<dyn PriceProvider>,
}

impl PriceFetcher {
    pub fn new(provider: Arc<dyn PriceProvider>) -> Self {
        Self { provider }
    }

    /// Tickers are fetched concurrently; a failed ticker contributes nothing and lands in the report.
    pub async fn fetch_ticks(&self, tickers: &[String], lookback_days: i64) -> (Vec<Event>, FetchReport) {
        info!("📈 Downloading price data for {:?} ({}d)...", tickers, lookback_days);
        let mut report = FetchReport::default();

        let calls = tickers.iter().map(|t| self.provider.fetch(t, lookback_days));
        let results = join_all(calls).await;

        let mut ticks = Vec::new();
        for (ticker, result) in tickers.iter().zip(results) {
            report.calls += 1;
            match result {
                Ok(rows) => {
                    let total = rows.len();
                    let before = ticks.len();
                    ticks.extend(rows.into_iter().filter_map(row_to_tick).map(Event::Tick));
                    let kept = ticks.len() - before;
                    report.records += kept;
                    report.skipped += total - kept;
                }
                Err(e) => {
                    warn!("Price download failed for {}: {}", ticker, e);
                    report.record_failure(ticker.as_str(), e);
                }
            }
        }

        info!(
            "📈 {} ticks ({} rows without close skipped, {}/{} tickers failed)",
            report.records,
            report.skipped,
            report.failed_calls(),
            report.calls
        );
        (ticks, report)
    }
}
