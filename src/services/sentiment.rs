// Sentiment Inference Service
// Hosted text-classification backend; its top label feeds the heuristic scorer

use crate::models::ExternalSignal;
use reqwest::Client;
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::debug;

use super::config_store::SentimentConfig;
use super::providers::ProviderError;

/// Hosted sentiment models truncate long inputs anyway.
const SENTIMENT_MAX_CHARS: usize = 2_000;

pub trait SentimentBackend: Send + Sync {
    fn classify(
        &self,
        text: &str,
    ) -> impl Future<Output = Result<ExternalSignal, ProviderError>> + Send;
}

pub struct InferenceClient {
    client: Client,
    url: String,
    api_key: Option<String>,
}

impl InferenceClient {
    pub fn new(config: &SentimentConfig, api_key: Option<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();
        Self {
            client,
            url: format!("{}/models/{}", config.base_url.trim_end_matches('/'), config.model),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
        }
    }
}

/// Pick the highest-scoring label. Accepts `[[{label, score}]]` and `[{label, score}]`.
pub fn parse_sentiment_response(data: &serde_json::Value) -> Option<ExternalSignal> {
    let outer = data.as_array()?;
    let candidates = match outer.first() {
        Some(serde_json::Value::Array(inner)) => inner,
        _ => outer,
    };

    candidates
        .iter()
        .filter_map(|c| {
            let label = c.get("label")?.as_str()?;
            let score = c.get("score")?.as_f64()?;
            Some(ExternalSignal {
                label: label.to_string(),
                score,
            })
        })
        .max_by(|a, b| {
            a.score
                .partial_cmp(&b.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        })
}

impl SentimentBackend for InferenceClient {
    async fn classify(&self, text: &str) -> Result<ExternalSignal, ProviderError> {
        let api_key = self.api_key.as_deref().ok_or(ProviderError::MissingApiKey)?;
        let input: String = text.chars().take(SENTIMENT_MAX_CHARS).collect();

        let start = Instant::now();
        let response = self
            .client
            .post(&self.url)
            .header("Authorization", format!("Bearer {}", api_key))
            .json(&serde_json::json!({ "inputs": input }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::ApiError {
                status: status.as_u16(),
                message: body,
            });
        }

        let data: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ProviderError::JsonError(e.to_string()))?;

        let signal = parse_sentiment_response(&data).ok_or(ProviderError::MissingContent)?;
        debug!(
            label = %signal.label,
            score = signal.score,
            latency_ms = start.elapsed().as_millis() as i64,
            "[SENTIMENT] Classified"
        );
        Ok(signal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_nested_response() {
        let data = json!([[
            {"label": "negative", "score": 0.05},
            {"label": "neutral", "score": 0.87},
            {"label": "positive", "score": 0.08}
        ]]);
        let signal = parse_sentiment_response(&data).unwrap();
        assert_eq!(signal.label, "neutral");
        assert!((signal.score - 0.87).abs() < 1e-9);
    }

    #[test]
    fn test_flat_response() {
        let data = json!([{"label": "LABEL_2", "score": 0.6}, {"label": "LABEL_1", "score": 0.3}]);
        assert_eq!(parse_sentiment_response(&data).unwrap().label, "LABEL_2");
    }

    #[test]
    fn test_unusable_responses() {
        assert!(parse_sentiment_response(&json!({"error": "Model is loading"})).is_none());
        assert!(parse_sentiment_response(&json!([])).is_none());
        assert!(parse_sentiment_response(&json!([[{"label": "x"}]])).is_none());
    }

    #[test]
    fn test_model_url() {
        let client = InferenceClient::new(&SentimentConfig::default(), None);
        assert!(client.url.ends_with("/models/cardiffnlp/twitter-xlm-roberta-base-sentiment"));
    }
}
