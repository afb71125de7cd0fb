// Web Search Service
// Looks up related content for an analyzed text (Google Custom Search JSON API)

use crate::models::RelatedItem;
use reqwest::Client;
use std::future::Future;
use std::time::Duration;

use super::config_store::SearchConfig;
use super::providers::ProviderError;

/// The search API returns at most this many results per request.
const MAX_RESULTS_PER_QUERY: usize = 10;

pub trait SearchBackend: Send + Sync {
    fn search(
        &self,
        query: &str,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<RelatedItem>, ProviderError>> + Send;
}

pub struct SearchClient {
    client: Client,
    url: String,
    api_key: Option<String>,
    engine_id: Option<String>,
}

impl SearchClient {
    pub fn new(config: &SearchConfig, api_key: Option<String>, engine_id: Option<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(20))
            .build()
            .unwrap_or_default();
        Self {
            client,
            url: config.base_url.clone(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            engine_id: engine_id.filter(|k| !k.trim().is_empty()),
        }
    }
}

pub fn parse_search_response(data: &serde_json::Value) -> Vec<RelatedItem> {
    let Some(items) = data.get("items").and_then(|i| i.as_array()) else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| {
            let title = item.get("title")?.as_str()?;
            let link = item.get("link")?.as_str()?;
            let snippet = item.get("snippet").and_then(|s| s.as_str()).unwrap_or_default();
            Some(RelatedItem {
                title: title.to_string(),
                link: link.to_string(),
                snippet: snippet.replace('\n', " "),
            })
        })
        .collect()
}

impl SearchBackend for SearchClient {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<RelatedItem>, ProviderError> {
        let (Some(api_key), Some(engine_id)) = (self.api_key.as_deref(), self.engine_id.as_deref())
        else {
            return Err(ProviderError::MissingApiKey);
        };
        let num = limit.clamp(1, MAX_RESULTS_PER_QUERY).to_string();

        let response = self
            .client
            .get(&self.url)
            .query(&[("key", api_key), ("cx", engine_id), ("q", query), ("num", num.as_str())])
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

        let mut items = parse_search_response(&data);
        items.truncate(limit);
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_items() {
        let data = json!({
            "items": [
                {"title": "A", "link": "https://a.example", "snippet": "line one\nline two"},
                {"title": "No link"},
                {"title": "B", "link": "https://b.example"}
            ]
        });
        let items = parse_search_response(&data);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].snippet, "line one line two");
        assert_eq!(items[1].snippet, "");
    }

    #[test]
    fn test_no_items() {
        assert!(parse_search_response(&json!({"searchInformation": {}})).is_empty());
    }

    #[tokio::test]
    async fn test_missing_engine_id() {
        let client = SearchClient::new(&SearchConfig::default(), Some("key".to_string()), None);
        let err = client.search("query", 3).await.unwrap_err();
        assert!(matches!(err, ProviderError::MissingApiKey));
    }
}
