use anyhow::{Context, Result};
use reqwest::Client;
use serde_json::{json, Value};
use tokio::runtime::Handle;
use tracing::{info, warn};

use crate::error::ClassifyError;
use crate::modules::perception::SentimentLabel;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Classification {
    pub label: SentimentLabel,
    pub score: f64,
}

/// Financial sentiment model. Blocking: callers run it on a worker thread.
pub trait Classifier: Send + Sync {
    fn classify(&self, text: &str) -> Result<Classification, ClassifyError>;
}

/// FinBERT-style text-classification endpoint (Hugging Face inference API shape).
pub struct HttpClassifier {
    client: Client,
    url: String,
    token: Option<String>,
    runtime: Handle,
}

impl HttpClassifier {
    /// Builds the adapter and runs one warm-up classification, so a dead endpoint fails startup
    /// instead of rejecting every message.
    pub async fn connect(client: Client, url: &str, token: Option<String>) -> Result<Self> {
        let classifier = Self {
            client,
            url: url.to_string(),
            token,
            runtime: Handle::current(),
        };

        info!("🧠 Loading sentiment model at {}...", url);
        let warmup = classifier
            .request("Markets opened flat this morning.")
            .await
            .context("Sentiment model warm-up failed")?;
        info!("✅ Model ready (warm-up: {} {:.2})", warmup.label.as_str(), warmup.score);
        Ok(classifier)
    }

    async fn request(&self, text: &str) -> Result<Classification, ClassifyError> {
        let body = json!({ "inputs": text });
        let mut req = self.client.post(&self.url).json(&body);
        if let Some(token) = &self.token {
            req = req.header("Authorization", format!("Bearer {}", token));
        }

        let resp = req.send().await.map_err(|e| ClassifyError::Request(e.to_string()))?;
        if !resp.status().is_success() {
            let status = resp.status();
            let err = resp.text().await.unwrap_or_default();
            warn!("⚠️ Classifier API Error ({}): {}", status, err);
            return Err(ClassifyError::Request(format!("status {}: {}", status, err)));
        }

        let json: Value = resp
            .json()
            .await
            .map_err(|e| ClassifyError::BadResponse(e.to_string()))?;
        parse_classification(&json)
    }
}

impl Classifier for HttpClassifier {
    /// Must not be called from inside an async task; the pool runs it under `spawn_blocking`.
    fn classify(&self, text: &str) -> Result<Classification, ClassifyError> {
        self.runtime.block_on(self.request(text))
    }
}

/// Picks the top-scoring label out of `[[{label, score}, ...]]`, `[{label, score}, ...]`
/// or a bare `{label, score}`.
pub fn parse_classification(json: &Value) -> Result<Classification, ClassifyError> {
    let candidates: Vec<&Value> = match json {
        Value::Array(outer) => match outer.first() {
            Some(Value::Array(inner)) => inner.iter().collect(),
            _ => outer.iter().collect(),
        },
        Value::Object(_) => vec![json],
        _ => Vec::new(),
    };

    let best = candidates
        .into_iter()
        .filter_map(|c| Some((c["label"].as_str()?, c["score"].as_f64()?)))
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .ok_or_else(|| ClassifyError::BadResponse(json.to_string()))?;

    let label = SentimentLabel::parse(best.0).ok_or_else(|| ClassifyError::UnknownLabel(best.0.to_string()))?;
    Ok(Classification { label, score: best.1 })
}
