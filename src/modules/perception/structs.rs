use serde::{Serialize, Deserialize};
use chrono::{DateTime, FixedOffset, NaiveDateTime, Utc};
use serde_json::Value;

/// Ticker used when a headline cannot be attributed to any tracked company.
pub const MARKET_TICKER: &str = "MARKET";

pub const TICK_TYPE: &str = "TRADE";
pub const NEWS_TYPE: &str = "NEWS";
pub const SENTIMENT_TYPE: &str = "SENTIMENT";
pub const VPIN_TYPE: &str = "VPIN";

/// Instant as handed over by a provider, before UTC normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawTimestamp {
    Naive(NaiveDateTime),
    Zoned(DateTime<FixedOffset>),
}

impl RawTimestamp {
    /// Naive instants are taken as UTC; zoned ones are converted.
    pub fn to_utc(self) -> DateTime<Utc> {
        match self {
            RawTimestamp::Naive(naive) => naive.and_utc(),
            RawTimestamp::Zoned(zoned) => zoned.with_timezone(&Utc),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Tick {
    pub ticker: String,
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct News {
    pub ticker: String,
    pub timestamp: DateTime<Utc>,
    pub headline: String,
    pub url: String,
    pub cameo_code: String,
    pub actor_code: String,
    pub goldstein: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Tick(Tick),
    News(News),
}

impl Event {
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Event::Tick(t) => t.timestamp,
            Event::News(n) => n.timestamp,
        }
    }

    pub fn ticker(&self) -> &str {
        match self {
            Event::Tick(t) => &t.ticker,
            Event::News(n) => &n.ticker,
        }
    }

    pub fn is_tick(&self) -> bool {
        matches!(self, Event::Tick(_))
    }

    /// JSON body sent to the broker.
    pub fn to_payload(&self) -> serde_json::Result<Vec<u8>> {
        match self {
            Event::Tick(t) => serde_json::to_vec(&TickPayload {
                ticker: &t.ticker,
                price: t.close,
                open: t.open,
                high: t.high,
                low: t.low,
                close: t.close,
                volume: t.volume,
                timestamp: wire_timestamp(&t.timestamp),
                kind: TICK_TYPE,
            }),
            Event::News(n) => serde_json::to_vec(&NewsPayload {
                ticker: &n.ticker,
                headline: &n.headline,
                url: &n.url,
                timestamp: wire_timestamp(&n.timestamp),
                cameo: &n.cameo_code,
                actor: &n.actor_code,
                kind: NEWS_TYPE,
            }),
        }
    }
}

/// `2024-03-01 14:30:00+00:00`
pub fn wire_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M:%S%:z").to_string()
}

#[derive(Debug, Serialize)]
struct TickPayload<'a> {
    ticker: &'a str,
    /// Same as `close`; kept for consumers that only read the last price.
    price: f64,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: u64,
    timestamp: String,
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Serialize)]
struct NewsPayload<'a> {
    ticker: &'a str,
    headline: &'a str,
    url: &'a str,
    timestamp: String,
    cameo: &'a str,
    actor: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
}

/// Inbound news message as seen by the sentiment consumer. Only the headline is mandatory.
#[derive(Debug, Clone, Deserialize)]
pub struct InboundNews {
    pub headline: String,
    /// Absent or `null` means the headline is market-wide.
    #[serde(default)]
    pub ticker: Option<String>,
    /// Carried through untouched, whatever its JSON type.
    #[serde(default)]
    pub timestamp: Value,
}

impl InboundNews {
    pub fn ticker(&self) -> &str {
        self.ticker.as_deref().unwrap_or(MARKET_TICKER)
    }
}

/// Inbound tick for the order-flow consumer. Reads both the replay payload and bare
/// `{ticker, price, volume}` feeds.
#[derive(Debug, Clone, Deserialize)]
pub struct InboundTick {
    pub ticker: String,
    #[serde(default)]
    pub open: Option<f64>,
    #[serde(default)]
    pub close: Option<f64>,
    #[serde(default)]
    pub price: Option<f64>,
    pub volume: f64,
    #[serde(default)]
    pub timestamp: Value,
}

impl InboundTick {
    pub fn close(&self) -> Option<f64> {
        self.close.or(self.price)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.ticker.trim().is_empty() {
            return Err("blank ticker".to_string());
        }
        match self.close() {
            Some(c) if c.is_finite() => {}
            _ => return Err(format!("{}: no usable close/price", self.ticker)),
        }
        if self.open.is_some_and(|o| !o.is_finite()) {
            return Err(format!("{}: open is not a number", self.ticker));
        }
        if !(self.volume.is_finite() && self.volume >= 0.0) {
            return Err(format!("{}: bad volume {}", self.ticker, self.volume));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SentimentLabel {
    Positive,
    Negative,
    Neutral,
}

impl SentimentLabel {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "positive" => Some(SentimentLabel::Positive),
            "negative" => Some(SentimentLabel::Negative),
            "neutral" => Some(SentimentLabel::Neutral),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SentimentLabel::Positive => "positive",
            SentimentLabel::Negative => "negative",
            SentimentLabel::Neutral => "neutral",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SentimentResult {
    pub ticker: String,
    pub timestamp: Value,
    pub headline: String,
    pub sentiment_score: f64,
    pub sentiment_label: SentimentLabel,
    #[serde(rename = "type")]
    pub kind: String,
}

impl SentimentResult {
    pub fn new(news: InboundNews, label: SentimentLabel, score: f64) -> Self {
        Self {
            ticker: news.ticker().to_string(),
            timestamp: news.timestamp,
            headline: news.headline,
            sentiment_score: score,
            sentiment_label: label,
            kind: SENTIMENT_TYPE.to_string(),
        }
    }
}
