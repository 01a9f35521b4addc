use futures_util::future::{BoxFuture, FutureExt};
use futures_util::stream::{FuturesOrdered, StreamExt};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::pool::InferencePool;
use crate::config::BrokerConfig;
use crate::error::{BrokerError, MessageFailure};
use crate::modules::action::broker::{Delivery, MessageBroker};
use crate::modules::perception::structs::InboundNews;
use crate::modules::perception::SentimentResult;

/// Delivery tag plus the enriched result, or why the message must be rejected.
type Classified = (u64, Result<SentimentResult, MessageFailure>);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumerStats {
    pub received: usize,
    pub published: usize,
    pub acked: usize,
    pub rejected: usize,
}

impl ConsumerStats {
    fn record(&mut self, outcome: &Result<SentimentResult, MessageFailure>) {
        match outcome {
            Ok(_) => {
                self.published += 1;
                self.acked += 1;
            }
            // Published, then the ack failed and the message was rejected.
            Err(MessageFailure::Ack(_)) => {
                self.published += 1;
                self.rejected += 1;
            }
            Err(_) => self.rejected += 1,
        }
    }
}

/// Reads headlines, classifies them on the inference pool and publishes the enriched result.
///
/// Up to `prefetch` messages are classified at once; they are published and settled in the
/// order they were delivered. A message is acked only after its result is published, and any
/// failure rejects it without requeue.
pub struct SentimentConsumer {
    broker: Arc<dyn MessageBroker>,
    pool: InferencePool,
    input_queue: String,
    output_queue: String,
    prefetch: u16,
}

impl SentimentConsumer {
    pub fn new(broker: Arc<dyn MessageBroker>, pool: InferencePool, queues: &BrokerConfig, prefetch: u16) -> Self {
        Self {
            broker,
            pool,
            input_queue: queues.news_queue.clone(),
            output_queue: queues.sentiment_queue.clone(),
            prefetch: prefetch.max(1),
        }
    }

    /// Consumes until the stream ends or `stop` fires. Classifications still running at that
    /// point are abandoned: nothing is published for them and the broker redelivers them.
    pub async fn run(&self, stop: &CancellationToken) -> Result<ConsumerStats, BrokerError> {
        let result = self.consume(stop).await;
        self.pool.shutdown();
        if let Err(e) = self.broker.close().await {
            warn!("Broker close failed: {}", e);
        }
        result
    }

    async fn consume(&self, stop: &CancellationToken) -> Result<ConsumerStats, BrokerError> {
        self.broker.declare_queue(&self.input_queue).await?;
        self.broker.declare_queue(&self.output_queue).await?;
        self.broker.set_prefetch(self.prefetch).await?;

        let consumer_tag = format!("sentiment-{}", Uuid::new_v4());
        let mut deliveries = self.broker.consume(&self.input_queue, &consumer_tag).await?;
        info!(
            "👂 Listening on '{}' (prefetch {}, {} workers)",
            self.input_queue,
            self.prefetch,
            self.pool.workers()
        );

        let window = usize::from(self.prefetch);
        let mut stats = ConsumerStats::default();
        let mut in_flight: FuturesOrdered<BoxFuture<'_, Classified>> = FuturesOrdered::new();
        let mut open = true;

        loop {
            if !open && in_flight.is_empty() {
                info!("Delivery stream ended.");
                break;
            }

            tokio::select! {
                biased;

                _ = stop.cancelled() => {
                    info!("🛑 Stop requested, abandoning {} in-flight messages.", in_flight.len());
                    break;
                }

                Some((tag, classified)) = in_flight.next(), if !in_flight.is_empty() => {
                    let outcome = self.settle(tag, classified).await;
                    stats.record(&outcome);
                }

                next = deliveries.next(), if open && in_flight.len() < window => match next {
                    Some(Ok(delivery)) => {
                        stats.received += 1;
                        in_flight.push_back(self.classify(delivery).boxed());
                    }
                    Some(Err(e)) => {
                        error!("Delivery stream failed: {}", e);
                        open = false;
                    }
                    None => open = false,
                },
            }
        }

        drop(in_flight);
        info!(
            "📊 Consumer stats: {} received, {} published, {} acked, {} rejected",
            stats.received, stats.published, stats.acked, stats.rejected
        );
        Ok(stats)
    }

    async fn classify(&self, delivery: Delivery) -> Classified {
        let news: InboundNews = match serde_json::from_slice(&delivery.body) {
            Ok(news) => news,
            Err(e) => return (delivery.tag, Err(MessageFailure::Deserialize(e.to_string()))),
        };

        let outcome = self
            .pool
            .classify(news.headline.clone())
            .await
            .map(|c| SentimentResult::new(news, c.label, c.score))
            .map_err(MessageFailure::from);
        (delivery.tag, outcome)
    }

    async fn settle(
        &self,
        tag: u64,
        classified: Result<SentimentResult, MessageFailure>,
    ) -> Result<SentimentResult, MessageFailure> {
        let outcome = match classified {
            Ok(result) => self.publish_and_ack(tag, result).await,
            Err(e) => Err(e),
        };

        match &outcome {
            Ok(result) => info!(" [✓] {}", result),
            Err(failure) => {
                warn!(" [X] Error processing message {}: {}", tag, failure);
                if let Err(e) = self.broker.reject(tag).await {
                    error!("Reject of message {} failed: {}", tag, e);
                }
            }
        }
        outcome
    }

    async fn publish_and_ack(&self, tag: u64, result: SentimentResult) -> Result<SentimentResult, MessageFailure> {
        let payload = serde_json::to_vec(&result).map_err(|e| MessageFailure::Encode(e.to_string()))?;
        self.broker
            .publish(&self.output_queue, &payload)
            .await
            .map_err(MessageFailure::Publish)?;
        self.broker.ack(tag).await.map_err(MessageFailure::Ack)?;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ClassifyError;
    use crate::modules::action::broker::InMemoryBroker;
    use crate::modules::brain::classifier::{Classification, Classifier};
    use crate::modules::perception::SentimentLabel;
    use serde_json::Value;
    use std::time::Duration;

    struct Keyword;

    impl Classifier for Keyword {
        fn classify(&self, text: &str) -> Result<Classification, ClassifyError> {
            if text.contains("beats") {
                Ok(Classification { label: SentimentLabel::Positive, score: 0.91 })
            } else if text.contains("garbled") {
                Err(ClassifyError::BadResponse("garbled".into()))
            } else {
                Ok(Classification { label: SentimentLabel::Neutral, score: 0.6 })
            }
        }
    }

    async fn seeded(bodies: &[&str]) -> InMemoryBroker {
        let broker = InMemoryBroker::new();
        broker.declare_queue("news.headlines").await.unwrap();
        for body in bodies {
            broker.publish("news.headlines", body.as_bytes()).await.unwrap();
        }
        broker
    }

    fn consumer(broker: &InMemoryBroker, prefetch: u16) -> SentimentConsumer {
        let pool = InferencePool::new(Arc::new(Keyword), 4);
        SentimentConsumer::new(Arc::new(broker.clone()), pool, &BrokerConfig::default(), prefetch)
    }

    async fn run_until_settled(broker: &InMemoryBroker, consumer: SentimentConsumer, count: usize) -> ConsumerStats {
        let stop = CancellationToken::new();
        let watcher = broker.clone();
        let trigger = stop.clone();
        tokio::spawn(async move {
            watcher.wait_for_settled(count, Duration::from_secs(5)).await;
            trigger.cancel();
        });
        consumer.run(&stop).await.unwrap()
    }

    #[tokio::test]
    async fn enriches_a_headline() {
        let broker = seeded(&[r#"{"ticker":"NVDA","headline":"Nvidia beats earnings","timestamp":"2024-03-01 10:00:00+00:00"}"#]).await;
        run_until_settled(&broker, consumer(&broker, 1), 1).await;

        let out = broker.published("news.sentiment");
        assert_eq!(out.len(), 1);
        let result: Value = serde_json::from_slice(&out[0]).unwrap();
        assert_eq!(result["ticker"], "NVDA");
        assert_eq!(result["headline"], "Nvidia beats earnings");
        assert_eq!(result["sentiment_label"], "positive");
        assert_eq!(result["sentiment_score"], 0.91);
        assert_eq!(result["timestamp"], "2024-03-01 10:00:00+00:00");
        assert_eq!(result["type"], "SENTIMENT");
        assert_eq!(broker.acked().len(), 1);
    }

    #[tokio::test]
    async fn missing_ticker_defaults_to_market() {
        let broker = seeded(&[r#"{"headline":"Stocks drift"}"#]).await;
        run_until_settled(&broker, consumer(&broker, 1), 1).await;

        let result: Value = serde_json::from_slice(&broker.published("news.sentiment")[0]).unwrap();
        assert_eq!(result["ticker"], "MARKET");
        assert!(result["timestamp"].is_null());
    }

    #[tokio::test]
    async fn loose_optional_fields_are_still_processed() {
        let broker = seeded(&[
            r#"{"headline":"Nvidia beats","timestamp":1709290800}"#,
            r#"{"headline":"Gold steady","ticker":null}"#,
        ])
        .await;
        let stats = run_until_settled(&broker, consumer(&broker, 1), 2).await;
        assert_eq!(stats, ConsumerStats { received: 2, published: 2, acked: 2, rejected: 0 });

        let out: Vec<Value> = broker
            .published("news.sentiment")
            .iter()
            .map(|b| serde_json::from_slice(b).unwrap())
            .collect();
        assert_eq!(out[0]["timestamp"], 1709290800);
        assert_eq!(out[1]["ticker"], "MARKET");
    }

    #[tokio::test]
    async fn failures_are_rejected_and_the_rest_acked() {
        let broker = seeded(&[
            r#"{"headline":"Tesla beats deliveries"}"#,
            "not json",
            r#"{"ticker":"AMD"}"#,
            r#"{"headline":"garbled wire copy"}"#,
            r#"{"headline":"Gold steady"}"#,
        ])
        .await;
        let stats = run_until_settled(&broker, consumer(&broker, 1), 5).await;

        assert_eq!(stats, ConsumerStats { received: 5, published: 2, acked: 2, rejected: 3 });
        assert_eq!(broker.acked().len(), 2);
        assert_eq!(broker.rejected().len(), 3);
        assert_eq!(broker.pending("news.headlines"), 0);
        assert_eq!(broker.published("news.sentiment").len(), 2);
    }

    #[tokio::test]
    async fn publish_failure_rejects_instead_of_acking() {
        let broker = seeded(&[r#"{"headline":"Nvidia beats earnings"}"#]).await;
        broker.declare_queue("news.sentiment").await.unwrap();
        broker.fail_publishes_to("news.sentiment", true);

        let stats = run_until_settled(&broker, consumer(&broker, 1), 1).await;
        assert_eq!(stats.rejected, 1);
        assert!(broker.acked().is_empty());
        assert!(broker.published("news.sentiment").is_empty());
    }

    #[tokio::test]
    async fn results_follow_delivery_order_with_a_wide_window() {
        let bodies: Vec<String> = (0..8).map(|i| format!(r#"{{"headline":"headline {}"}}"#, i)).collect();
        let refs: Vec<&str> = bodies.iter().map(String::as_str).collect();
        let broker = seeded(&refs).await;

        run_until_settled(&broker, consumer(&broker, 4), 8).await;

        let headlines: Vec<String> = broker
            .published("news.sentiment")
            .iter()
            .map(|b| serde_json::from_slice::<Value>(b).unwrap()["headline"].as_str().unwrap().to_string())
            .collect();
        let expected: Vec<String> = (0..8).map(|i| format!("headline {}", i)).collect();
        assert_eq!(headlines, expected);
    }
}
