use tracing::info;

use crate::modules::perception::Event;

/// Events ordered by timestamp; equal timestamps keep their append order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MasterTimeline {
    events: Vec<Event>,
}

impl MasterTimeline {
    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn tick_count(&self) -> usize {
        self.events.iter().filter(|e| e.is_tick()).count()
    }
}

impl IntoIterator for MasterTimeline {
    type Item = Event;
    type IntoIter = std::vec::IntoIter<Event>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.into_iter()
    }
}

pub struct TimelineBuilder;

impl TimelineBuilder {
    /// Ticks first, then news, then a stable sort by timestamp.
    ///
    /// Events only ever hold UTC instants (providers normalize through `RawTimestamp::to_utc`),
    /// so the sort key is directly comparable across both kinds.
    pub fn merge(ticks: Vec<Event>, news: Vec<Event>) -> MasterTimeline {
        let mut events = ticks;
        events.extend(news);
        events.sort_by_key(Event::timestamp);

        info!("🧵 Master timeline built: {} events", events.len());
        MasterTimeline { events }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::perception::{News, Tick};
    use chrono::{DateTime, TimeZone, Utc};
    use proptest::prelude::*;

    fn tick(ticker: &str, ts: DateTime<Utc>) -> Event {
        Event::Tick(Tick {
            ticker: ticker.into(),
            timestamp: ts,
            open: 1.0,
            high: 1.0,
            low: 1.0,
            close: 1.0,
            volume: 0,
        })
    }

    fn news(headline: &str, ts: DateTime<Utc>) -> Event {
        Event::News(News {
            ticker: "MARKET".into(),
            timestamp: ts,
            headline: headline.into(),
            url: String::new(),
            cameo_code: "010".into(),
            actor_code: "BUS".into(),
            goldstein: 0.0,
        })
    }

    fn at_minute(m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 10, m, 0).unwrap()
    }

    #[test]
    fn interleaves_news_between_ticks() {
        let timeline = TimelineBuilder::merge(
            vec![tick("SPY", at_minute(0)), tick("SPY", at_minute(2))],
            vec![news("Tesla misses targets", at_minute(1))],
        );
        let kinds: Vec<bool> = timeline.events().iter().map(Event::is_tick).collect();
        assert_eq!(kinds, vec![true, false, true]);
        assert_eq!(timeline.tick_count(), 2);
    }

    #[test]
    fn ties_keep_ticks_ahead_of_news() {
        let timeline = TimelineBuilder::merge(
            vec![tick("SPY", at_minute(5)), tick("AMD", at_minute(5))],
            vec![news("first", at_minute(5))],
        );
        let tickers: Vec<&str> = timeline.events().iter().map(Event::ticker).collect();
        assert_eq!(tickers, vec!["SPY", "AMD", "MARKET"]);
    }

    #[test]
    fn empty_inputs_build_an_empty_timeline() {
        assert!(TimelineBuilder::merge(Vec::new(), Vec::new()).is_empty());
    }

    fn labelled(stamps: &[u32], is_tick: bool) -> Vec<Event> {
        stamps
            .iter()
            .enumerate()
            .map(|(i, m)| {
                let label = format!("{}{}", if is_tick { "t" } else { "n" }, i);
                if is_tick { tick(&label, at_minute(*m)) } else { news(&label, at_minute(*m)) }
            })
            .collect()
    }

    fn label(event: &Event) -> String {
        match event {
            Event::Tick(t) => t.ticker.clone(),
            Event::News(n) => n.headline.clone(),
        }
    }

    proptest! {
        #[test]
        fn output_is_sorted_and_stable(
            tick_minutes in prop::collection::vec(0u32..10, 0..40),
            news_minutes in prop::collection::vec(0u32..10, 0..40),
        ) {
            let ticks = labelled(&tick_minutes, true);
            let news = labelled(&news_minutes, false);
            let input_order: Vec<String> = ticks.iter().chain(news.iter()).map(label).collect();

            let timeline = TimelineBuilder::merge(ticks, news);
            prop_assert_eq!(timeline.len(), input_order.len());

            for pair in timeline.events().windows(2) {
                prop_assert!(pair[0].timestamp() <= pair[1].timestamp());
                if pair[0].timestamp() == pair[1].timestamp() {
                    let a = input_order.iter().position(|l| *l == label(&pair[0]));
                    let b = input_order.iter().position(|l| *l == label(&pair[1]));
                    prop_assert!(a < b);
                }
            }
        }

        #[test]
        fn merge_is_idempotent(
            tick_minutes in prop::collection::vec(0u32..10, 0..20),
            news_minutes in prop::collection::vec(0u32..10, 0..20),
        ) {
            let first = TimelineBuilder::merge(labelled(&tick_minutes, true), labelled(&news_minutes, false));
            let second = TimelineBuilder::merge(labelled(&tick_minutes, true), labelled(&news_minutes, false));
            prop_assert_eq!(first, second);
        }
    }
}
