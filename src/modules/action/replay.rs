use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::broker::MessageBroker;
use crate::config::BrokerConfig;
use crate::error::BrokerError;
use crate::modules::perception::Event;
use crate::modules::timeline::TimelineBuilder;

/// `Idle → Building → Replaying → {Done, Stopped}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayState {
    Idle,
    Building,
    Replaying,
    Done,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplayReport {
    pub ticks: usize,
    pub news: usize,
    pub emitted: usize,
    pub final_state: ReplayState,
}

/// Walks a freshly built timeline onto the broker, one event per interval.
pub struct ReplayPublisher {
    broker: Arc<dyn MessageBroker>,
    tick_queue: String,
    news_queue: String,
    interval: Duration,
    state: ReplayState,
}

impl ReplayPublisher {
    pub fn new(broker: Arc<dyn MessageBroker>, queues: &BrokerConfig, interval: Duration) -> Self {
        Self {
            broker,
            tick_queue: queues.tick_queue.clone(),
            news_queue: queues.news_queue.clone(),
            interval,
            state: ReplayState::Idle,
        }
    }

    pub fn state(&self) -> ReplayState {
        self.state
    }

    /// `inputs` resolves to `(ticks, news)`. The connection is closed on every exit path.
    pub async fn run<F>(&mut self, inputs: F, stop: &CancellationToken) -> Result<ReplayReport, BrokerError>
    where
        F: Future<Output = (Vec<Event>, Vec<Event>)>,
    {
        let result = self.build_and_replay(inputs, stop).await;
        if let Err(e) = self.broker.close().await {
            warn!("Broker close failed: {}", e);
        }
        result
    }

    async fn build_and_replay<F>(&mut self, inputs: F, stop: &CancellationToken) -> Result<ReplayReport, BrokerError>
    where
        F: Future<Output = (Vec<Event>, Vec<Event>)>,
    {
        self.state = ReplayState::Building;
        let mut report = ReplayReport { ticks: 0, news: 0, emitted: 0, final_state: self.state };

        let (ticks, news) = tokio::select! {
            built = inputs => built,
            _ = stop.cancelled() => {
                info!("Replay stopped while building the timeline.");
                return Ok(self.finish(report, ReplayState::Stopped));
            }
        };

        info!("Stats: {} price ticks, {} news events.", ticks.len(), news.len());
        report.ticks = ticks.len();
        report.news = news.len();

        let timeline = TimelineBuilder::merge(ticks, news);
        if timeline.is_empty() {
            info!("No data found. Nothing to replay.");
            return Ok(self.finish(report, ReplayState::Done));
        }

        self.broker.declare_queue(&self.tick_queue).await?;
        self.broker.declare_queue(&self.news_queue).await?;

        self.state = ReplayState::Replaying;
        info!(
            "▶️ Starting replay ({} events, {} ticks, 1 event every {:?})",
            timeline.len(),
            timeline.tick_count(),
            self.interval
        );

        let total = timeline.len();
        for (i, event) in timeline.into_iter().enumerate() {
            if stop.is_cancelled() {
                return Ok(self.finish(report, ReplayState::Stopped));
            }

            self.emit(&event).await?;
            report.emitted += 1;

            if i + 1 < total {
                tokio::select! {
                    _ = sleep(self.interval) => {}
                    _ = stop.cancelled() => {
                        info!("Replay stopped after {} events.", report.emitted);
                        return Ok(self.finish(report, ReplayState::Stopped));
                    }
                }
            }
        }

        info!("✅ Replay complete: {} events emitted.", report.emitted);
        Ok(self.finish(report, ReplayState::Done))
    }

    async fn emit(&self, event: &Event) -> Result<(), BrokerError> {
        let queue = if event.is_tick() { &self.tick_queue } else { &self.news_queue };
        let payload = match event.to_payload() {
            Ok(p) => p,
            Err(e) => {
                warn!("Skipping unserializable event {}: {}", event, e);
                return Ok(());
            }
        };

        if let Err(e) = self.broker.publish(queue, &payload).await {
            error!("Publish to {} failed: {}", queue, e);
            return Err(e);
        }
        info!(" {}", event);
        Ok(())
    }

    fn finish(&mut self, mut report: ReplayReport, state: ReplayState) -> ReplayReport {
        self.state = state;
        report.final_state = state;
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::action::broker::InMemoryBroker;
    use crate::modules::perception::{News, Tick};
    use chrono::{DateTime, TimeZone, Utc};
    use serde_json::Value;

    fn at_minute(m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 10, m, 0).unwrap()
    }

    fn tick(m: u32, close: f64) -> Event {
        Event::Tick(Tick {
            ticker: "SPY".into(),
            timestamp: at_minute(m),
            open: close,
            high: close,
            low: close,
            close,
            volume: 10,
        })
    }

    fn news(m: u32, headline: &str) -> Event {
        Event::News(News {
            ticker: "TSLA".into(),
            timestamp: at_minute(m),
            headline: headline.into(),
            url: String::new(),
            cameo_code: "010".into(),
            actor_code: "BUS".into(),
            goldstein: 0.0,
        })
    }

    fn publisher(broker: &InMemoryBroker, interval: Duration) -> ReplayPublisher {
        ReplayPublisher::new(Arc::new(broker.clone()), &BrokerConfig::default(), interval)
    }

    #[tokio::test(start_paused = true)]
    async fn routes_events_by_kind_in_timeline_order() {
        let broker = InMemoryBroker::new();
        let mut replay = publisher(&broker, Duration::from_secs(1));
        assert_eq!(replay.state(), ReplayState::Idle);

        let inputs = async { (vec![tick(2, 401.0), tick(0, 400.0)], vec![news(1, "Tesla misses targets")]) };
        let report = replay.run(inputs, &CancellationToken::new()).await.unwrap();

        assert_eq!(report, ReplayReport { ticks: 2, news: 1, emitted: 3, final_state: ReplayState::Done });
        assert_eq!(replay.state(), ReplayState::Done);
        assert!(broker.is_closed());

        let ticks: Vec<Value> = broker
            .published("market.ticks")
            .iter()
            .map(|b| serde_json::from_slice(b).unwrap())
            .collect();
        assert_eq!(ticks.len(), 2);
        assert_eq!(ticks[0]["price"], 400.0);
        assert_eq!(ticks[1]["price"], 401.0);

        let headlines = broker.published("news.headlines");
        assert_eq!(headlines.len(), 1);
        let headline: Value = serde_json::from_slice(&headlines[0]).unwrap();
        assert_eq!(headline["headline"], "Tesla misses targets");
    }

    #[tokio::test(start_paused = true)]
    async fn cadence_is_one_interval_between_emissions() {
        let broker = InMemoryBroker::new();
        let mut replay = publisher(&broker, Duration::from_millis(250));
        let started = tokio::time::Instant::now();

        let ticks: Vec<Event> = (0..4).map(|m| tick(m, 1.0)).collect();
        replay.run(async move { (ticks, Vec::<Event>::new()) }, &CancellationToken::new()).await.unwrap();

        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(750) && elapsed < Duration::from_millis(800));
    }

    #[tokio::test(start_paused = true)]
    async fn stop_signal_halts_after_the_current_emission() {
        let broker = InMemoryBroker::new();
        let mut replay = publisher(&broker, Duration::from_secs(10));
        let stop = CancellationToken::new();

        let trigger = stop.clone();
        tokio::spawn(async move {
            sleep(Duration::from_secs(15)).await;
            trigger.cancel();
        });

        let ticks: Vec<Event> = (0..5).map(|m| tick(m, 1.0)).collect();
        let report = replay.run(async move { (ticks, Vec::<Event>::new()) }, &stop).await.unwrap();

        assert_eq!(report.final_state, ReplayState::Stopped);
        assert_eq!(report.emitted, 2);
        assert_eq!(broker.published("market.ticks").len(), 2);
        assert!(broker.is_closed());
    }

    #[tokio::test]
    async fn empty_inputs_skip_replay() {
        let broker = InMemoryBroker::new();
        let mut replay = publisher(&broker, Duration::from_secs(1));
        let report = replay.run(async { (Vec::<Event>::new(), Vec::<Event>::new()) }, &CancellationToken::new()).await.unwrap();

        assert_eq!(report.emitted, 0);
        assert_eq!(report.final_state, ReplayState::Done);
        assert!(broker.published("market.ticks").is_empty());
        assert!(broker.is_closed());
    }

    #[tokio::test]
    async fn publish_failure_aborts_the_walk_and_closes() {
        let broker = InMemoryBroker::new();
        broker.declare_queue("market.ticks").await.unwrap();
        broker.fail_publishes_to("market.ticks", true);
        let mut replay = publisher(&broker, Duration::ZERO);

        let result = replay.run(async { (vec![tick(0, 1.0)], Vec::<Event>::new()) }, &CancellationToken::new()).await;
        assert!(result.is_err());
        assert!(broker.is_closed());
    }
}
