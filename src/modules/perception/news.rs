use reqwest::Client;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use chrono::{DateTime, Duration as ChronoDuration, NaiveDateTime, Utc};
use std::sync::Arc;
use tokio::time::sleep;
use tracing::{info, warn};

use super::matcher::TickerMatcher;
use super::report::FetchReport;
use super::structs::{Event, News, RawTimestamp, MARKET_TICKER};
use crate::config::NewsConfig;
use crate::error::FetchError;

const COMPACT_FORMAT: &str = "%Y%m%d%H%M%S";

/// Raw article as listed by the news provider.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Article {
    pub seendate: Option<String>,
    pub title: Option<String>,
    pub url: Option<String>,
}

impl From<&Value> for Article {
    /// Non-string fields count as absent, so one odd record never sinks its window.
    fn from(raw: &Value) -> Self {
        let text = |key: &str| raw.get(key).and_then(Value::as_str).map(str::to_string);
        Self {
            seendate: text("seendate"),
            title: text("title"),
            url: text("url"),
        }
    }
}

#[async_trait]
pub trait NewsProvider: Send + Sync {
    /// At most `max_records` articles seen in `[start, end)`.
    async fn search(
        &self,
        query: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        max_records: u32,
    ) -> Result<Vec<Article>, FetchError>;
}

pub struct GdeltDocProvider {
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct ArticleList {
    #[serde(default)]
    articles: Vec<Value>,
}

impl GdeltDocProvider {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self { client, base_url: base_url.into() }
    }
}

#[async_trait]
impl NewsProvider for GdeltDocProvider {
    async fn search(
        &self,
        query: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        max_records: u32,
    ) -> Result<Vec<Article>, FetchError> {
        let max_records = max_records.to_string();
        let start = start.format(COMPACT_FORMAT).to_string();
        let end = end.format(COMPACT_FORMAT).to_string();
        let params = [
            ("query", query),
            ("mode", "ArtList"),
            ("maxrecords", max_records.as_str()),
            ("format", "json"),
            ("sort", "DateAsc"),
            ("startdatetime", start.as_str()),
            ("enddatetime", end.as_str()),
        ];

        let resp = self.client.get(&self.base_url).query(&params).send().await?;
        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            return Err(FetchError::Status { status: status.as_u16(), body });
        }

        parse_article_list(&body)
    }
}

/// Article list body. Only an unreadable envelope fails; individual records are kept as-is.
pub fn parse_article_list(body: &str) -> Result<Vec<Article>, FetchError> {
    // GDELT answers plain text (not JSON) for rejected queries.
    let list: ArticleList = serde_json::from_str(body)
        .map_err(|e| FetchError::Decode(format!("{}: {}", e, body.chars().take(120).collect::<String>())))?;
    Ok(list.articles.iter().map(Article::from).collect())
}

/// Splits `[start, end)` into consecutive windows no longer than `chunk`.
pub fn time_windows(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    chunk: ChronoDuration,
) -> Vec<(DateTime<Utc>, DateTime<Utc>)> {
    let mut windows = Vec::new();
    if chunk <= ChronoDuration::zero() {
        return windows;
    }
    let mut cursor = start;
    while cursor < end {
        let next = cursor.checked_add_signed(chunk).map_or(end, |n| n.min(end));
        windows.push((cursor, next));
        cursor = next;
    }
    windows
}

/// `("Tesla" OR "S&P 500") (theme:A OR theme:B) sourcecountry:US`, or `None` if no ticker maps to a company.
pub fn build_query(tickers: &[String], config: &NewsConfig) -> Option<String> {
    let names: Vec<String> = tickers
        .iter()
        .filter_map(|t| config.companies.iter().find(|c| &c.ticker == t))
        .map(|c| if c.name.contains(' ') { format!("\"{}\"", c.name) } else { c.name.clone() })
        .collect();
    if names.is_empty() {
        return None;
    }

    let themes: Vec<String> = config.themes.iter().map(|t| format!("theme:{}", t)).collect();
    Some(format!(
        "({}) ({}) sourcecountry:{}",
        names.join(" OR "),
        themes.join(" OR "),
        config.source_country
    ))
}

/// `20240301T143000Z` → 2024-03-01 14:30:00 UTC. Anything shorter or unparsable is `None`.
pub fn parse_seendate(raw: &str) -> Option<DateTime<Utc>> {
    let compact: String = raw.chars().filter(|c| *c != 'T' && *c != 'Z').collect();
    let digits = compact.get(..14)?;
    NaiveDateTime::parse_from_str(digits, COMPACT_FORMAT)
        .ok()
        .map(|naive| RawTimestamp::Naive(naive).to_utc())
}

pub fn article_to_news(article: Article, matcher: &dyn TickerMatcher) -> Option<News> {
    let timestamp = parse_seendate(article.seendate.as_deref()?)?;
    let headline = article.title.unwrap_or_else(|| "No Title".to_string());
    let ticker = matcher.attribute(&headline).unwrap_or_else(|| MARKET_TICKER.to_string());

    Some(News {
        ticker,
        timestamp,
        headline,
        url: article.url.unwrap_or_default(),
        cameo_code: "010".to_string(),
        actor_code: "BUS".to_string(),
        goldstein: 0.0,
    })
}

/// Pages the news provider in fixed windows to stay under its per-query record cap.
pub struct WindowedFetcher {
    provider: Arc<dyn NewsProvider>,
    matcher: Arc<dyn TickerMatcher>,
    config: NewsConfig,
}

impl WindowedFetcher {
    pub fn new(provider: Arc<dyn NewsProvider>, matcher: Arc<dyn TickerMatcher>, config: NewsConfig) -> Self {
        Self { provider, matcher, config }
    }

    /// News events in request order (not globally sorted). A failed window contributes nothing.
    pub async fn fetch_news(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        tickers: &[String],
    ) -> (Vec<Event>, FetchReport) {
        let mut report = FetchReport::default();
        let mut events = Vec::new();

        info!("📰 Querying news for period: {} to {}", start.date_naive(), end.date_naive());
        let Some(query) = build_query(tickers, &self.config) else {
            warn!("No tracked company for {:?}; skipping news fetch.", tickers);
            return (events, report);
        };

        let windows = time_windows(start, end, self.config.chunk());
        let last = windows.len().saturating_sub(1);
        for (i, (from, to)) in windows.into_iter().enumerate() {
            info!("  - Fetching window: {} -> {}...", from, to);
            report.calls += 1;

            match self.provider.search(&query, from, to, self.config.max_records).await {
                Ok(articles) => {
                    let total = articles.len();
                    let before = events.len();
                    events.extend(
                        articles
                            .into_iter()
                            .filter_map(|a| article_to_news(a, self.matcher.as_ref()))
                            .map(Event::News),
                    );
                    let kept = events.len() - before;
                    report.records += kept;
                    report.skipped += total - kept;
                }
                Err(e) => {
                    warn!("  - Error fetching window {} -> {}: {}", from, to, e);
                    report.record_failure(format!("{} -> {}", from, to), e);
                }
            }

            if i < last {
                sleep(self.config.pause()).await;
            }
        }

        info!(
            "📰 {} news events from {} windows ({} failed, {} undated articles skipped)",
            report.records,
            report.calls,
            report.failed_calls(),
            report.skipped
        );
        (events, report)
    }
}
