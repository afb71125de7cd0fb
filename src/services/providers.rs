// AI Provider Service
// Generative-text backend client: Gemini generateContent and OpenAI-compatible chat completions

use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::env;
use std::future::Future;
use std::time::{Duration, Instant};
use thiserror::Error;

use super::config_store::{ApiFlavor, GenerativeConfig};

const REQUEST_TIMEOUT_SECS: u64 = 80;

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),
    #[error("API error: {status} - {message}")]
    ApiError { status: u16, message: String },
    #[error("Missing content in response")]
    MissingContent,
    #[error("JSON parse error: {0}")]
    JsonError(String),
    #[error("API key not configured")]
    MissingApiKey,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSpec {
    pub name: String,
    pub model: String,
}

/// Parse `name[:model]` as given on the command line.
pub fn parse_provider(spec: &str) -> ProviderSpec {
    let parts: Vec<&str> = spec.splitn(2, ':').collect();
    if parts.len() == 2 {
        ProviderSpec {
            name: parts[0].to_string(),
            model: parts[1].to_string(),
        }
    } else {
        ProviderSpec {
            name: spec.to_string(),
            model: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResult {
    pub content: String,
    pub latency_ms: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
}

/// A hosted model that answers a prompt with free text.
pub trait GenerativeBackend: Send + Sync {
    /// `provider:model` label recorded on verdicts.
    fn model_label(&self) -> String;

    fn generate(
        &self,
        system: &str,
        user: &str,
    ) -> impl Future<Output = Result<ChatResult, ProviderError>> + Send;
}

#[derive(Debug, Clone, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Clone, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: i32,
    temperature: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Clone, Serialize)]
struct ResponseFormat {
    r#type: String,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatResponse {
    choices: Option<Vec<ChatChoice>>,
    reasoning_content: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatChoice {
    message: Option<ChatMessageResponse>,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatMessageResponse {
    content: Option<String>,
    reasoning_content: Option<String>,
}

pub struct ProviderClient {
    client: Client,
    flavor: ApiFlavor,
    base_url: String,
    model: String,
    api_key: Option<String>,
    max_tokens: i32,
}

impl ProviderClient {
    pub fn new(config: &GenerativeConfig, api_key: Option<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .unwrap_or_default();
        Self::with_client(client, config, api_key)
    }

    pub fn with_proxy(
        config: &GenerativeConfig,
        api_key: Option<String>,
        proxy_url: &str,
    ) -> Result<Self, ProviderError> {
        let proxy = reqwest::Proxy::all(proxy_url)?;
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .proxy(proxy)
            .build()?;
        Ok(Self::with_client(client, config, api_key))
    }

    fn with_client(client: Client, config: &GenerativeConfig, api_key: Option<String>) -> Self {
        Self {
            client,
            flavor: config.flavor,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            max_tokens: config.max_tokens,
        }
    }

    fn endpoint(&self) -> String {
        match self.flavor {
            ApiFlavor::Gemini => format!("{}/models/{}:generateContent", self.base_url, self.model),
            ApiFlavor::ChatCompletions => self.base_url.clone(),
        }
    }

    async fn call_gemini_api(
        &self,
        api_key: &str,
        system: &str,
        user: &str,
    ) -> Result<ChatResult, ProviderError> {
        let combined_content = if system.is_empty() {
            user.to_string()
        } else {
            format!("{}\n\n{}", system, user)
        };

        let request = serde_json::json!({
            "contents": [{"role": "user", "parts": [{"text": combined_content}]}],
            "generationConfig": {
                "temperature": 0.0,
                "maxOutputTokens": self.max_tokens
            }
        });

        let start = Instant::now();

        let response = self
            .client
            .post(self.endpoint())
            .query(&[("key", api_key)])
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        let latency_ms = start.elapsed().as_millis() as i64;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::ApiError {
                status: status.as_u16(),
                message: body,
            });
        }

        // {"candidates":[{"content":{"parts":[{"text":"..."}]}}]}
        let data: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ProviderError::JsonError(e.to_string()))?;

        let content = data["candidates"][0]["content"]["parts"][0]["text"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or(ProviderError::MissingContent)?;

        Ok(ChatResult {
            content,
            latency_ms,
            reasoning: None,
        })
    }

    async fn call_chat_api(
        &self,
        api_key: &str,
        system: &str,
        user: &str,
    ) -> Result<ChatResult, ProviderError> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: system.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: user.to_string(),
                },
            ],
            max_tokens: self.max_tokens,
            temperature: 0.0,
            response_format: Some(ResponseFormat {
                r#type: "json_object".to_string(),
            }),
        };

        let start = Instant::now();

        let response = self
            .client
            .post(self.endpoint())
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        let latency_ms = start.elapsed().as_millis() as i64;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::ApiError {
                status: status.as_u16(),
                message: body,
            });
        }

        let data: ChatResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::JsonError(e.to_string()))?;

        let message = data
            .choices
            .as_ref()
            .and_then(|c| c.first())
            .and_then(|c| c.message.as_ref());

        let mut content = message.and_then(|m| m.content.clone()).filter(|c| !c.trim().is_empty());
        let reasoning = message
            .and_then(|m| m.reasoning_content.clone())
            .or(data.reasoning_content);

        // Reasoning models sometimes leave the JSON only in their reasoning trace.
        if content.is_none() {
            content = reasoning.as_deref().and_then(json_span);
        }

        let content = content.ok_or(ProviderError::MissingContent)?;

        Ok(ChatResult {
            content,
            latency_ms,
            reasoning,
        })
    }
}

/// Balanced JSON object spans embedded in free text, in order of appearance.
/// Each span ends at its own closing brace; whatever follows is ignored.
pub fn json_object_spans(text: &str) -> impl Iterator<Item = &str> + '_ {
    text.match_indices('{').filter_map(move |(start, _)| {
        let rest = &text[start..];
        let mut stream = serde_json::Deserializer::from_str(rest).into_iter::<serde_json::Value>();
        match stream.next() {
            Some(Ok(serde_json::Value::Object(_))) => Some(&rest[..stream.byte_offset()]),
            _ => None,
        }
    })
}

fn json_span(text: &str) -> Option<String> {
    json_object_spans(text).next().map(str::to_string)
}

impl GenerativeBackend for ProviderClient {
    fn model_label(&self) -> String {
        format!("{}:{}", self.flavor.as_str(), self.model)
    }

    async fn generate(&self, system: &str, user: &str) -> Result<ChatResult, ProviderError> {
        let api_key = self.api_key.as_deref().ok_or(ProviderError::MissingApiKey)?;
        match self.flavor {
            ApiFlavor::Gemini => self.call_gemini_api(api_key, system, user).await,
            ApiFlavor::ChatCompletions => self.call_chat_api(api_key, system, user).await,
        }
    }
}

/// Get API key from environment or config file
pub fn get_api_key(provider: &str) -> Option<String> {
    let env_keys = match provider {
        "gemini" => vec!["GEMINI_API_KEY", "VERITAS_GEMINI_API_KEY"],
        "openai" => vec!["OPENAI_API_KEY", "VERITAS_OPENAI_API_KEY"],
        "huggingface" => vec!["HF_API_TOKEN", "VERITAS_HF_API_TOKEN"],
        "search" => vec!["SEARCH_API_KEY", "VERITAS_SEARCH_API_KEY"],
        "search_engine" => vec!["SEARCH_ENGINE_ID", "VERITAS_SEARCH_ENGINE_ID"],
        _ => vec![],
    };

    for key in env_keys {
        if let Ok(val) = env::var(key) {
            let v = val.trim();
            if !v.is_empty() {
                return Some(v.to_string());
            }
        }
    }

    if let Some(config_dir) = super::ConfigStore::default_config_dir() {
        let store = super::ConfigStore::new(config_dir);
        if let Ok(Some(key)) = store.get_api_key(provider) {
            return Some(key);
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_provider() {
        let spec = parse_provider("gemini:gemini-1.5-pro");
        assert_eq!(spec.name, "gemini");
        assert_eq!(spec.model, "gemini-1.5-pro");

        let spec2 = parse_provider("openai");
        assert_eq!(spec2.name, "openai");
        assert_eq!(spec2.model, "");
    }

    #[test]
    fn test_endpoints_per_flavor() {
        let gemini = ProviderClient::new(&GenerativeConfig::default(), Some("k".to_string()));
        assert!(gemini.endpoint().ends_with("/models/gemini-1.5-flash:generateContent"));
        assert_eq!(gemini.model_label(), "gemini:gemini-1.5-flash");

        let config = GenerativeConfig {
            flavor: ApiFlavor::ChatCompletions,
            base_url: "https://api.openai.com/v1/chat/completions/".to_string(),
            model: "gpt-4o-mini".to_string(),
            ..GenerativeConfig::default()
        };
        let chat = ProviderClient::new(&config, None);
        assert_eq!(chat.endpoint(), "https://api.openai.com/v1/chat/completions");
        assert_eq!(chat.model_label(), "openai:gpt-4o-mini");
    }

    #[tokio::test]
    async fn test_missing_key_fails_before_network() {
        let client = ProviderClient::new(&GenerativeConfig::default(), Some("  ".to_string()));
        let err = client.generate("s", "u").await.unwrap_err();
        assert!(matches!(err, ProviderError::MissingApiKey));
    }

    #[test]
    fn test_json_span_from_reasoning() {
        let span = json_span("thinking...\n{\"isAI\": true,\n \"confidence\": 70}\ndone");
        assert_eq!(span.as_deref(), Some("{\"isAI\": true,\n \"confidence\": 70}"));
        assert!(json_span("no braces").is_none());
    }

    #[test]
    fn test_json_spans_stop_at_balanced_brace() {
        let text = "plan {a} then {\"x\": {\"y\": 1}} and {z}";
        let spans: Vec<&str> = json_object_spans(text).collect();
        assert_eq!(spans, vec!["{\"x\": {\"y\": 1}}", "{\"y\": 1}"]);
        assert_eq!(json_span(text).as_deref(), Some("{\"x\": {\"y\": 1}}"));
    }
}
