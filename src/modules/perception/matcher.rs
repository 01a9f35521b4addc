use crate::config::pipeline_profile::CompanyAlias;

/// Headline → ticker attribution. Substring matching is a heuristic ("Gold" also hits
/// "Goldman Sachs"), so it sits behind this trait.
pub trait TickerMatcher: Send + Sync {
    /// Ticker the headline is about, if any.
    fn attribute(&self, headline: &str) -> Option<String>;
}

/// First alias (in configured order) whose company name occurs in the headline, ignoring case.
pub struct SubstringMatcher {
    aliases: Vec<(String, String)>,
}

impl SubstringMatcher {
    pub fn new(companies: &[CompanyAlias]) -> Self {
        let aliases = companies
            .iter()
            .map(|c| (c.ticker.clone(), c.name.to_lowercase()))
            .collect();
        Self { aliases }
    }
}

impl TickerMatcher for SubstringMatcher {
    fn attribute(&self, headline: &str) -> Option<String> {
        let lower = headline.to_lowercase();
        self.aliases
            .iter()
            .find(|(_, name)| lower.contains(name.as_str()))
            .map(|(ticker, _)| ticker.clone())
    }
}

/// Attributes nothing; every headline falls back to the market sentinel.
pub struct NoMatch;

impl TickerMatcher for NoMatch {
    fn attribute(&self, _headline: &str) -> Option<String> {
        None
    }
}
