use std::fmt;
use super::structs::{Event, SentimentResult};

/// Operator console line for one replayed event.
impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::Tick(t) => write!(
                f,
                "[TICK] {} @ {}: ${:.2}",
                t.ticker,
                t.timestamp.format("%H:%M:%S"),
                t.close
            ),
            Event::News(n) => {
                let short: String = n.headline.chars().take(50).collect();
                write!(f, ">>> [NEWS] {}: {}...", n.ticker, short)
            }
        }
    }
}

impl fmt::Display for SentimentResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SENTIMENT {} | {} ({:.4})",
            self.ticker,
            self.sentiment_label.as_str(),
            self.sentiment_score
        )
    }
}
