pub mod structs;
pub mod fetcher;
pub mod news;
pub mod matcher;
pub mod report;
pub mod text_serializer;

pub use structs::{Event, News, SentimentLabel, SentimentResult, Tick, MARKET_TICKER};
pub use fetcher::{PriceFetcher, PriceProvider, PriceRow, YahooChartProvider};
pub use news::{Article, GdeltDocProvider, NewsProvider, WindowedFetcher};
pub use matcher::{NoMatch, SubstringMatcher, TickerMatcher};
pub use report::FetchReport;
