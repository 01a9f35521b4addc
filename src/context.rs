use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::config::pipeline_profile::MAX_LOOKBACK_DAYS;
use crate::config::PipelineProfile;
use crate::modules::action::{AmqpBroker, MessageBroker};
use crate::modules::brain::{HttpClassifier, InferencePool};
use crate::modules::perception::{
    GdeltDocProvider, PriceFetcher, SubstringMatcher, WindowedFetcher, YahooChartProvider,
};
use crate::utils::http_client::HttpClientFactory;

// [重构] 原来散落在 main 里的全局句柄, 统一收进这里
pub struct PipelineContext {
    pub profile: PipelineProfile,
    pub http: Client,
    pub shutdown: CancellationToken,
}

impl PipelineContext {
    pub fn new(profile: PipelineProfile) -> Result<Self> {
        Ok(Self {
            profile,
            http: HttpClientFactory::create()?,
            shutdown: CancellationToken::new(),
        })
    }

    /// `[now - lookback_days, now)`.
    pub fn replay_window(&self) -> (DateTime<Utc>, DateTime<Utc>) {
        let end = Utc::now();
        let days = self.profile.replay.lookback_days.clamp(1, MAX_LOOKBACK_DAYS);
        (end - Duration::days(days), end)
    }

    pub fn price_fetcher(&self) -> PriceFetcher {
        let prices = &self.profile.prices;
        PriceFetcher::new(Arc::new(YahooChartProvider::new(
            self.http.clone(),
            prices.base_url.clone(),
            prices.interval.clone(),
        )))
    }

    pub fn news_fetcher(&self) -> WindowedFetcher {
        let news = &self.profile.news;
        WindowedFetcher::new(
            Arc::new(GdeltDocProvider::new(self.http.clone(), news.base_url.clone())),
            Arc::new(SubstringMatcher::new(&news.companies)),
            news.clone(),
        )
    }

    pub async fn connect_broker(&self) -> Result<Arc<dyn MessageBroker>> {
        let broker = &self.profile.broker;
        let amqp = AmqpBroker::connect(&broker.url, broker.durable)
            .await
            .context("Broker connection failed")?;
        Ok(Arc::new(amqp))
    }

    /// Loads the classifier once and wraps it in the worker pool.
    pub async fn inference_pool(&self) -> Result<InferencePool> {
        let sentiment = &self.profile.sentiment;
        let classifier = HttpClassifier::connect(
            HttpClientFactory::create_inference()?,
            &sentiment.classifier_url,
            sentiment.classifier_token.clone(),
        )
        .await?;
        Ok(InferencePool::new(Arc::new(classifier), sentiment.workers))
    }
}
