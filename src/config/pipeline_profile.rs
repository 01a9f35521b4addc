use serde::Deserialize;
use config::{Config, Environment, File};
use anyhow::{bail, Result};
use std::time::Duration;
use chrono::Duration as ChronoDuration;

/// Ten years; keeps every date computation far from chrono's limits.
pub const MAX_LOOKBACK_DAYS: i64 = 3650;
pub const MAX_CHUNK_HOURS: i64 = 24 * MAX_LOOKBACK_DAYS;

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct BrokerConfig {
    pub url: String,
    pub tick_queue: String,
    pub news_queue: String,
    pub sentiment_queue: String,
    pub vpin_queue: String,
    pub durable: bool,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            url: "amqp://localhost:5672/%2f".to_string(),
            tick_queue: "market.ticks".to_string(),
            news_queue: "news.headlines".to_string(),
            sentiment_queue: "news.sentiment".to_string(),
            vpin_queue: "market.vpin".to_string(),
            durable: true,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ReplayConfig {
    pub tickers: Vec<String>,
    pub lookback_days: i64,
    /// Pause after every emission.
    pub interval_ms: u64,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            tickers: ["SPY", "TSLA", "NVDA", "AMD", "QQQ", "GLD", "BND", "VTI"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            lookback_days: 5,
            interval_ms: 1000,
        }
    }
}

impl ReplayConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PriceConfig {
    pub base_url: String,
    pub interval: String,
}

impl Default for PriceConfig {
    fn default() -> Self {
        Self {
            base_url: "https://query1.finance.yahoo.com".to_string(),
            interval: "1m".to_string(),
        }
    }
}

/// Ticker → company name, used both for the entity filter and for headline attribution.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct CompanyAlias {
    pub ticker: String,
    pub name: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct NewsConfig {
    pub base_url: String,
    pub chunk_hours: i64,
    pub pause_ms: u64,
    pub max_records: u32,
    pub source_country: String,
    pub themes: Vec<String>,
    pub companies: Vec<CompanyAlias>,
}

impl Default for NewsConfig {
    fn default() -> Self {
        let companies = [
            ("TSLA", "Tesla"),
            ("NVDA", "Nvidia"),
            ("AMD", "Advanced Micro Devices"),
            ("SPY", "S&P 500"),
            ("QQQ", "Nasdaq"),
            ("GLD", "Gold"),
        ]
        .iter()
        .map(|(ticker, name)| CompanyAlias { ticker: ticker.to_string(), name: name.to_string() })
        .collect();

        Self {
            base_url: "https://api.gdeltproject.org/api/v2/doc/doc".to_string(),
            chunk_hours: 6,
            pause_ms: 1000,
            max_records: 250,
            source_country: "US".to_string(),
            themes: [
                "ECON_EARNINGSREPORT",
                "TAX_FNCACT_STATEMENT",
                "ECON_STOCKMARKET",
                "ECON_ENTREPRENEURSHIP",
                "CRISISLEX_CRISISLEXREC",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            companies,
        }
    }
}

impl NewsConfig {
    /// Clamped to `1..=MAX_CHUNK_HOURS`, so an unvalidated value cannot overflow.
    pub fn chunk(&self) -> ChronoDuration {
        ChronoDuration::hours(self.chunk_hours.clamp(1, MAX_CHUNK_HOURS))
    }

    pub fn pause(&self) -> Duration {
        Duration::from_millis(self.pause_ms)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SentimentConfig {
    pub workers: usize,
    pub prefetch: u16,
    pub classifier_url: String,
    pub classifier_token: Option<String>,
}

impl Default for SentimentConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            prefetch: 1,
            classifier_url: "https://api-inference.huggingface.co/models/ProsusAI/finbert".to_string(),
            classifier_token: None,
        }
    }
}

/// Volume-synchronized buckets for the order-flow toxicity estimate.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct VpinConfig {
    pub bucket_volume: f64,
    /// Closed buckets kept in the rolling estimate.
    pub window: usize,
    pub prefetch: u16,
}

impl Default for VpinConfig {
    fn default() -> Self {
        Self {
            bucket_volume: 100_000.0,
            window: 50,
            prefetch: 50,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct PipelineProfile {
    pub broker: BrokerConfig,
    pub replay: ReplayConfig,
    pub prices: PriceConfig,
    pub news: NewsConfig,
    pub sentiment: SentimentConfig,
    pub vpin: VpinConfig,
}

impl PipelineProfile {
    /// File (optional) first, then `RISKBEACON__SECTION__KEY` overrides.
    pub fn load(path: &str) -> Result<Self> {
        let settings = Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(
                Environment::with_prefix("RISKBEACON")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("replay.tickers")
                    .with_list_parse_key("news.themes"),
            )
            .build()?;

        let profile: PipelineProfile = settings.try_deserialize()?;
        profile.validate()?;
        Ok(profile)
    }

    pub fn validate(&self) -> Result<()> {
        if self.replay.tickers.is_empty() {
            bail!("replay.tickers must not be empty");
        }
        if !(1..=MAX_LOOKBACK_DAYS).contains(&self.replay.lookback_days) {
            bail!(
                "replay.lookback_days must be in 1..={} (got {})",
                MAX_LOOKBACK_DAYS,
                self.replay.lookback_days
            );
        }
        if !(1..=MAX_CHUNK_HOURS).contains(&self.news.chunk_hours) {
            bail!("news.chunk_hours must be in 1..={} (got {})", MAX_CHUNK_HOURS, self.news.chunk_hours);
        }
        if self.sentiment.workers < 1 {
            bail!("sentiment.workers must be >= 1");
        }
        if self.sentiment.prefetch < 1 {
            bail!("sentiment.prefetch must be >= 1");
        }
        if !(self.vpin.bucket_volume.is_finite() && self.vpin.bucket_volume > 0.0) {
            bail!("vpin.bucket_volume must be a positive number (got {})", self.vpin.bucket_volume);
        }
        if self.vpin.window < 1 {
            bail!("vpin.window must be >= 1");
        }
        if self.vpin.prefetch < 1 {
            bail!("vpin.prefetch must be >= 1");
        }
        Ok(())
    }
}
