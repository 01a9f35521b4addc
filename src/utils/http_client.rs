use reqwest::Client;
use std::time::Duration;
use anyhow::Result;
use tracing::info;

/// Yahoo rejects requests without a browser-like agent.
const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) riskbeacon/0.1";

pub struct HttpClientFactory;

impl HttpClientFactory {
    /// Shared client for the price and news providers.
    pub fn create() -> Result<Client> {
        let builder = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Some(Duration::from_secs(30)));

        info!("🌐 [Http Client] provider client ready");

        let client = builder.build()?;
        Ok(client)
    }

    /// Client for the sentiment model. Cold inference endpoints can take a while on first call.
    pub fn create_inference() -> Result<Client> {
        let builder = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(120))
            .connect_timeout(Duration::from_secs(30))
            .pool_max_idle_per_host(8);

        let client = builder.build()?;
        Ok(client)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clients_build() {
        assert!(HttpClientFactory::create().is_ok());
        assert!(HttpClientFactory::create_inference().is_ok());
    }
}
