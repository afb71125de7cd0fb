// Related Content
// Background web search published through a completion channel.

use crate::models::RelatedItem;
use crate::services::search::SearchBackend;
use crate::services::text_processor::split_words;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{info, warn};

const QUERY_MAX_WORDS: usize = 12;

/// Search query built from the opening words of the text.
pub fn related_query(text: &str) -> String {
    split_words(text)
        .into_iter()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()))
        .filter(|w| !w.is_empty())
        .take(QUERY_MAX_WORDS)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Handle to an in-flight related-content search. Dropping it cancels the search.
pub struct RelatedContentTask {
    handle: JoinHandle<()>,
    rx: oneshot::Receiver<Vec<RelatedItem>>,
}

impl RelatedContentTask {
    pub fn spawn<R>(search: Arc<R>, query: String, limit: usize) -> Self
    where
        R: SearchBackend + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let handle = tokio::spawn(async move {
            match search.search(&query, limit).await {
                Ok(items) => {
                    info!(results = items.len(), "[RELATED] Search completed");
                    let _ = tx.send(items);
                }
                Err(e) => warn!("[RELATED] Search failed: {}", e),
            }
        });
        Self { handle, rx }
    }

    pub fn cancel(&self) {
        self.handle.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Resolve to the search results, or `None` when the search failed or was cancelled.
    pub async fn wait(mut self) -> Option<Vec<RelatedItem>> {
        (&mut self.rx).await.ok()
    }
}

impl Drop for RelatedContentTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
