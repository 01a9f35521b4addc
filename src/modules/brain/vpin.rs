use futures_util::StreamExt;
use serde::Serialize;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::{BrokerConfig, VpinConfig};
use crate::error::{BrokerError, MessageFailure};
use crate::modules::action::broker::{Delivery, MessageBroker};
use crate::modules::perception::structs::{InboundTick, VPIN_TYPE};

#[derive(Debug, Default)]
struct BucketState {
    volume: f64,
    imbalance: f64,
    last_close: Option<f64>,
    imbalances: VecDeque<f64>,
    volumes: VecDeque<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VpinReading {
    pub ticker: String,
    pub vpin: f64,
    /// Closed buckets behind this reading, at most the window size.
    pub buckets: usize,
    /// Timestamp of the tick that closed the bucket.
    pub timestamp: Value,
    #[serde(rename = "type")]
    pub kind: &'static str,
}

/// Per-ticker volume-synchronized probability of informed trading.
///
/// Each tick's volume counts as buy-initiated when it closed above its open, sell-initiated
/// below it, and half of each when flat. Ticks without an open are compared to the ticker's
/// previous close. A bucket closes once its volume exceeds `bucket_volume`; the estimate is
/// the summed absolute imbalance over the summed volume of the last `window` buckets.
pub struct VpinCalculator {
    bucket_volume: f64,
    window: usize,
    states: HashMap<String, BucketState>,
}

impl VpinCalculator {
    pub fn new(config: &VpinConfig) -> Self {
        Self {
            bucket_volume: config.bucket_volume,
            window: config.window.max(1),
            states: HashMap::new(),
        }
    }

    /// Folds one validated tick in. Returns a reading when the tick closes a bucket.
    pub fn process(&mut self, tick: &InboundTick) -> Option<VpinReading> {
        let close = tick.close()?;
        let state = self.states.entry(tick.ticker.clone()).or_default();

        let reference = tick.open.or(state.last_close).unwrap_or(close);
        state.last_close = Some(close);

        let signed = if close > reference {
            tick.volume
        } else if close < reference {
            -tick.volume
        } else {
            0.0
        };
        state.volume += tick.volume;
        state.imbalance += signed;

        if state.volume <= self.bucket_volume {
            return None;
        }

        // The closing tick's overshoot stays in this bucket.
        state.imbalances.push_back(state.imbalance.abs());
        state.volumes.push_back(state.volume);
        state.volume = 0.0;
        state.imbalance = 0.0;
        while state.volumes.len() > self.window {
            state.imbalances.pop_front();
            state.volumes.pop_front();
        }

        let total_volume: f64 = state.volumes.iter().sum();
        if total_volume <= 0.0 {
            return None;
        }
        Some(VpinReading {
            ticker: tick.ticker.clone(),
            vpin: state.imbalances.iter().sum::<f64>() / total_volume,
            buckets: state.volumes.len(),
            timestamp: tick.timestamp.clone(),
            kind: VPIN_TYPE,
        })
    }

    pub fn tickers(&self) -> usize {
        self.states.len()
    }
}

/// Parses and validates one tick body.
pub fn decode_tick(body: &[u8]) -> Result<InboundTick, MessageFailure> {
    let tick: InboundTick = serde_json::from_slice(body).map_err(|e| MessageFailure::Deserialize(e.to_string()))?;
    tick.validate().map_err(MessageFailure::Invalid)?;
    Ok(tick)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VpinStats {
    pub received: usize,
    pub skipped: usize,
    pub buckets: usize,
}

/// Reads the tick queue one message at a time and publishes a reading whenever a bucket closes.
/// Malformed ticks are logged and acked so they never come back.
pub struct VpinConsumer {
    broker: Arc<dyn MessageBroker>,
    calculator: VpinCalculator,
    tick_queue: String,
    vpin_queue: String,
    prefetch: u16,
}

impl VpinConsumer {
    pub fn new(broker: Arc<dyn MessageBroker>, queues: &BrokerConfig, config: &VpinConfig) -> Self {
        Self {
            broker,
            calculator: VpinCalculator::new(config),
            tick_queue: queues.tick_queue.clone(),
            vpin_queue: queues.vpin_queue.clone(),
            prefetch: config.prefetch.max(1),
        }
    }

    pub async fn run(&mut self, stop: &CancellationToken) -> Result<VpinStats, BrokerError> {
        let result = self.consume(stop).await;
        if let Err(e) = self.broker.close().await {
            warn!("Broker close failed: {}", e);
        }
        result
    }

    async fn consume(&mut self, stop: &CancellationToken) -> Result<VpinStats, BrokerError> {
        self.broker.declare_queue(&self.tick_queue).await?;
        self.broker.declare_queue(&self.vpin_queue).await?;
        self.broker.set_prefetch(self.prefetch).await?;

        let consumer_tag = format!("vpin-{}", Uuid::new_v4());
        let mut deliveries = self.broker.consume(&self.tick_queue, &consumer_tag).await?;
        info!("👂 Listening on '{}' for order flow", self.tick_queue);

        let mut stats = VpinStats::default();
        loop {
            tokio::select! {
                biased;

                _ = stop.cancelled() => {
                    info!("🛑 Stop requested.");
                    break;
                }

                next = deliveries.next() => match next {
                    Some(Ok(delivery)) => {
                        stats.received += 1;
                        self.handle(delivery, &mut stats).await;
                    }
                    Some(Err(e)) => {
                        error!("Delivery stream failed: {}", e);
                        break;
                    }
                    None => {
                        info!("Delivery stream ended.");
                        break;
                    }
                },
            }
        }

        info!(
            "📊 VPIN stats: {} ticks, {} skipped, {} buckets closed across {} tickers",
            stats.received,
            stats.skipped,
            stats.buckets,
            self.calculator.tickers()
        );
        Ok(stats)
    }

    async fn handle(&mut self, delivery: Delivery, stats: &mut VpinStats) {
        match decode_tick(&delivery.body) {
            Ok(tick) => {
                if let Some(reading) = self.calculator.process(&tick) {
                    stats.buckets += 1;
                    info!("📊 VPIN for {}: {:.4} (Buckets: {})", reading.ticker, reading.vpin, reading.buckets);
                    self.publish(&reading).await;
                }
            }
            Err(failure) => {
                stats.skipped += 1;
                warn!("Skipping malformed tick {}: {}", delivery.tag, failure);
            }
        }

        // Already folded into the buckets; a redelivery would count it twice.
        if let Err(e) = self.broker.ack(delivery.tag).await {
            error!("Ack of tick {} failed: {}", delivery.tag, e);
        }
    }

    async fn publish(&self, reading: &VpinReading) {
        let payload = match serde_json::to_vec(reading) {
            Ok(p) => p,
            Err(e) => {
                error!("Could not encode VPIN reading for {}: {}", reading.ticker, e);
                return;
            }
        };
        if let Err(e) = self.broker.publish(&self.vpin_queue, &payload).await {
            error!("VPIN publish for {} failed: {}", reading.ticker, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::action::broker::InMemoryBroker;
    use crate::modules::perception::{Event, Tick};
    use chrono::{TimeZone, Utc};
    use std::time::Duration;

    fn calculator(bucket_volume: f64, window: usize) -> VpinCalculator {
        VpinCalculator::new(&VpinConfig { bucket_volume, window, prefetch: 1 })
    }

    fn tick(ticker: &str, open: Option<f64>, close: f64, volume: f64) -> InboundTick {
        InboundTick {
            ticker: ticker.to_string(),
            open,
            close: Some(close),
            price: None,
            volume,
            timestamp: Value::Null,
        }
    }

    #[test]
    fn bucket_closes_only_past_the_target_volume() {
        let mut calc = calculator(100.0, 50);
        assert_eq!(calc.process(&tick("NVDA", Some(10.0), 11.0, 60.0)), None);
        // Exactly at the target is not enough.
        assert_eq!(calc.process(&tick("NVDA", Some(11.0), 10.0, 40.0)), None);

        let reading = calc.process(&tick("NVDA", Some(10.0), 10.0, 10.0)).unwrap();
        // |60 - 40 + 0| / 110
        assert_eq!(reading.buckets, 1);
        assert!((reading.vpin - 20.0 / 110.0).abs() < 1e-12);
        assert_eq!(reading.kind, "VPIN");

        // The next bucket starts from zero.
        assert_eq!(calc.process(&tick("NVDA", Some(10.0), 12.0, 100.0)), None);
        let second = calc.process(&tick("NVDA", Some(12.0), 13.0, 1.0)).unwrap();
        assert_eq!(second.buckets, 2);
        assert!((second.vpin - (20.0 + 101.0) / (110.0 + 101.0)).abs() < 1e-12);
    }

    #[test]
    fn window_evicts_the_oldest_bucket() {
        let mut calc = calculator(100.0, 2);

        let one_sided = calc.process(&tick("TSLA", Some(200.0), 201.0, 110.0)).unwrap();
        assert_eq!(one_sided.vpin, 1.0);

        let flat = calc.process(&tick("TSLA", Some(201.0), 201.0, 110.0)).unwrap();
        assert_eq!(flat.buckets, 2);
        assert_eq!(flat.vpin, 0.5);

        // The one-sided bucket drops out.
        let evicted = calc.process(&tick("TSLA", Some(201.0), 201.0, 110.0)).unwrap();
        assert_eq!(evicted.buckets, 2);
        assert_eq!(evicted.vpin, 0.0);
    }

    #[test]
    fn tickers_keep_separate_buckets() {
        let mut calc = calculator(100.0, 50);
        assert_eq!(calc.process(&tick("AMD", Some(1.0), 2.0, 80.0)), None);
        assert_eq!(calc.process(&tick("SPY", Some(2.0), 1.0, 80.0)), None);

        let amd = calc.process(&tick("AMD", Some(2.0), 3.0, 30.0)).unwrap();
        assert_eq!(amd.ticker, "AMD");
        assert_eq!(amd.vpin, 1.0);
        assert_eq!(calc.tickers(), 2);
    }

    #[test]
    fn missing_open_falls_back_to_the_previous_close() {
        let mut calc = calculator(100.0, 50);
        // First print has nothing to compare against, so it splits evenly.
        assert_eq!(calc.process(&tick("GLD", None, 190.0, 50.0)), None);
        let reading = calc.process(&tick("GLD", None, 189.0, 60.0)).unwrap();
        assert!((reading.vpin - 60.0 / 110.0).abs() < 1e-12);
    }

    fn tick_body(minute: u32, open: f64, close: f64, volume: u64) -> Vec<u8> {
        Event::Tick(Tick {
            ticker: "NVDA".into(),
            timestamp: Utc.with_ymd_and_hms(2024, 3, 1, 14, minute, 0).unwrap(),
            open,
            high: open.max(close),
            low: open.min(close),
            close,
            volume,
        })
        .to_payload()
        .unwrap()
    }

    #[tokio::test]
    async fn consumer_skips_malformed_ticks_and_publishes_readings() {
        let broker = InMemoryBroker::new();
        broker.declare_queue("market.ticks").await.unwrap();
        let bodies: Vec<Vec<u8>> = vec![
            tick_body(0, 880.0, 882.0, 60),
            b"not json".to_vec(),
            br#"{"ticker":"","price":1.0,"volume":5}"#.to_vec(),
            br#"{"ticker":"AMD","price":1.0,"volume":-5}"#.to_vec(),
            br#"{"ticker":"AMD","volume":5}"#.to_vec(),
            tick_body(1, 882.0, 884.0, 50),
        ];
        for body in &bodies {
            broker.publish("market.ticks", body).await.unwrap();
        }

        let config = VpinConfig { bucket_volume: 100.0, window: 50, prefetch: 10 };
        let mut consumer = VpinConsumer::new(Arc::new(broker.clone()), &BrokerConfig::default(), &config);

        let stop = CancellationToken::new();
        let watcher = broker.clone();
        let trigger = stop.clone();
        tokio::spawn(async move {
            watcher.wait_for_settled(6, Duration::from_secs(5)).await;
            trigger.cancel();
        });
        let stats = consumer.run(&stop).await.unwrap();

        assert_eq!(stats, VpinStats { received: 6, skipped: 4, buckets: 1 });
        assert_eq!(broker.acked().len(), 6);
        assert!(broker.rejected().is_empty());

        let out = broker.published("market.vpin");
        assert_eq!(out.len(), 1);
        let reading: Value = serde_json::from_slice(&out[0]).unwrap();
        assert_eq!(reading["ticker"], "NVDA");
        assert_eq!(reading["vpin"], 1.0);
        assert_eq!(reading["buckets"], 1);
        assert_eq!(reading["timestamp"], "2024-03-01 14:01:00+00:00");
        assert_eq!(reading["type"], "VPIN");
    }
}
