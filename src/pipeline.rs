use anyhow::Result;
use std::sync::Arc;
use tracing::{info, warn};

use crate::context::PipelineContext;
use crate::modules::action::{InMemoryBroker, MessageBroker, ReplayPublisher, ReplayReport};
use crate::modules::brain::{ConsumerStats, SentimentConsumer, VpinConsumer, VpinStats};
use crate::modules::perception::FetchReport;

/// Fetches history, merges it and replays it onto the broker.
///
/// `dry_run` swaps RabbitMQ for the in-process broker, so the walk only shows up in the logs.
pub async fn run_replay(ctx: &PipelineContext, dry_run: bool) -> Result<ReplayReport> {
    let broker: Arc<dyn MessageBroker> = if dry_run {
        info!("🧪 Dry run: events stay in process.");
        Arc::new(InMemoryBroker::new())
    } else {
        ctx.connect_broker().await?
    };

    let tickers = ctx.profile.replay.tickers.clone();
    let (start, end) = ctx.replay_window();
    let prices = ctx.price_fetcher();
    let news = ctx.news_fetcher();

    let inputs = async {
        info!("🚀 Building timeline for {:?} ({} -> {})", tickers, start, end);
        let ((ticks, price_report), (headlines, news_report)) = tokio::join!(
            prices.fetch_ticks(&tickers, ctx.profile.replay.lookback_days),
            news.fetch_news(start, end, &tickers)
        );
        summarize("prices", &price_report);
        summarize("news", &news_report);
        (ticks, headlines)
    };

    let mut publisher = ReplayPublisher::new(broker, &ctx.profile.broker, ctx.profile.replay.interval());
    let report = publisher.run(inputs, &ctx.shutdown).await?;
    info!(
        "🏁 Replay finished ({:?}): {} of {} events emitted",
        report.final_state,
        report.emitted,
        report.ticks + report.news
    );
    Ok(report)
}

/// Loads the model, then consumes headlines until the stream ends or shutdown fires.
pub async fn run_sentiment(ctx: &PipelineContext) -> Result<ConsumerStats> {
    let pool = ctx.inference_pool().await?;
    let broker = ctx.connect_broker().await?;

    let consumer = SentimentConsumer::new(broker, pool, &ctx.profile.broker, ctx.profile.sentiment.prefetch);
    let stats = consumer.run(&ctx.shutdown).await?;
    Ok(stats)
}

/// Folds the tick queue into per-ticker VPIN readings until the stream ends or shutdown fires.
pub async fn run_vpin(ctx: &PipelineContext) -> Result<VpinStats> {
    let broker = ctx.connect_broker().await?;
    let mut consumer = VpinConsumer::new(broker, &ctx.profile.broker, &ctx.profile.vpin);
    let stats = consumer.run(&ctx.shutdown).await?;
    Ok(stats)
}

fn summarize(source: &str, report: &FetchReport) {
    if report.is_clean() {
        return;
    }
    warn!("⚠️ {} fetch: {} of {} calls failed", source, report.failed_calls(), report.calls);
    for failure in &report.failures {
        warn!("   {} -> {}", failure.call, failure.error);
    }
}
