// Analysis Orchestrator
// Runs one analysis end to end:
// - validates the input length
// - extracts features and scores them (with the sentiment signal when available)
// - asks the generative backend for its own verdict
// - combines both verdicts (generative 0.6 + heuristic 0.4 by default)
// - saves the report best-effort and starts the related-content search

use crate::models::{AnalysisReport, AnalysisRequest, BackendVerdict, HistoryQuery, RelatedItem};
use crate::services::config_store::AnalysisConfig;
use crate::services::history_store::{ResultStore, StoreError};
use crate::services::providers::GenerativeBackend;
use crate::services::search::SearchBackend;
use crate::services::sentiment::SentimentBackend;
use crate::services::text_processor::{extract_features, text_preview};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{info, warn};

use super::aggregation::{combine_available, CombineError};
use super::heuristic::score;
use super::llm_analyzer::request_verdict;
use super::related::{related_query, RelatedContentTask};

const PREVIEW_CHARS: usize = 200;

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("text is empty")]
    Empty,
    #[error("text is too short: {actual} characters (minimum {min})")]
    TooShort { min: usize, actual: usize },
    #[error("text is too long: {actual} characters (maximum {max})")]
    TooLong { max: usize, actual: usize },
    #[error("another analysis is already in progress, try again when it finishes")]
    Busy,
    #[error(transparent)]
    Combine(#[from] CombineError),
}

/// Tunables for one analyzer instance.
#[derive(Debug, Clone)]
pub struct AnalysisSettings {
    pub min_chars: usize,
    pub max_chars: usize,
    pub generative_weight: f64,
    pub heuristic_weight: f64,
    pub related_results: usize,
    pub backend_timeout: Duration,
    pub use_generative: bool,
    pub use_sentiment: bool,
    pub use_search: bool,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self::from_config(&AnalysisConfig::default())
    }
}

impl AnalysisSettings {
    pub fn from_config(config: &AnalysisConfig) -> Self {
        Self {
            min_chars: config.min_chars,
            max_chars: config.max_chars,
            generative_weight: config.generative_weight,
            heuristic_weight: config.heuristic_weight,
            related_results: config.related_results,
            backend_timeout: Duration::from_secs(config.backend_timeout_secs),
            use_generative: true,
            use_sentiment: true,
            use_search: true,
        }
    }
}

/// Report plus the still-running related-content search, if one was started.
pub struct AnalysisOutcome {
    pub report: AnalysisReport,
    pub related: Option<RelatedContentTask>,
}

impl AnalysisOutcome {
    /// Wait for related content and attach it to the report.
    pub async fn with_related(mut self) -> AnalysisReport {
        if let Some(task) = self.related.take() {
            if let Some(items) = task.wait().await {
                self.report.attach_related(items);
            }
        }
        self.report
    }

    pub fn related_items(&self) -> &[RelatedItem] {
        &self.report.related
    }
}

/// Clears the in-flight flag when the analysis ends, however it ends.
struct InFlightGuard<'a>(&'a AtomicBool);

impl<'a> InFlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct Analyzer<G, S, R, P> {
    generative: G,
    sentiment: S,
    search: Arc<R>,
    store: P,
    settings: AnalysisSettings,
    in_flight: AtomicBool,
}

impl<G, S, R, P> Analyzer<G, S, R, P>
where
    G: GenerativeBackend,
    S: SentimentBackend,
    R: SearchBackend + 'static,
    P: ResultStore,
{
    pub fn new(generative: G, sentiment: S, search: R, store: P, settings: AnalysisSettings) -> Self {
        Self {
            generative,
            sentiment,
            search: Arc::new(search),
            store,
            settings,
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn settings(&self) -> &AnalysisSettings {
        &self.settings
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    fn validate(&self, text: &str) -> Result<(), AnalysisError> {
        let actual = text.trim().chars().count();
        if actual == 0 {
            return Err(AnalysisError::Empty);
        }
        if actual < self.settings.min_chars {
            return Err(AnalysisError::TooShort { min: self.settings.min_chars, actual });
        }
        if actual > self.settings.max_chars {
            return Err(AnalysisError::TooLong { max: self.settings.max_chars, actual });
        }
        Ok(())
    }

    /// Run one analysis. A second call while one is in flight is rejected with
    /// `AnalysisError::Busy`.
    pub async fn analyze(&self, request: AnalysisRequest) -> Result<AnalysisOutcome, AnalysisError> {
        let _guard = InFlightGuard::acquire(&self.in_flight).ok_or(AnalysisError::Busy)?;
        self.validate(&request.text)?;

        let started = Instant::now();
        let text = request.text.trim();
        info!(
            chars = text.chars().count(),
            kind = ?request.kind,
            "[ANALYZER] Starting analysis"
        );

        let features = extract_features(text);

        let signal = if self.settings.use_sentiment {
            match tokio::time::timeout(self.settings.backend_timeout, self.sentiment.classify(text)).await {
                Ok(Ok(signal)) => Some(signal),
                Ok(Err(e)) => {
                    warn!("[ANALYZER] Sentiment backend unavailable: {}", e);
                    None
                }
                Err(_) => {
                    warn!(
                        "[ANALYZER] Sentiment backend timed out after {:?}",
                        self.settings.backend_timeout
                    );
                    None
                }
            }
        } else {
            None
        };

        let heuristic = score(&features, signal.as_ref());

        let generative = if self.settings.use_generative {
            request_verdict(&self.generative, text, self.settings.backend_timeout).await
        } else {
            None
        };

        let result = combine_available(
            generative.as_ref().map(|v| v.result().clone()),
            Some(heuristic.clone()),
            self.settings.generative_weight,
            self.settings.heuristic_weight,
        )?;

        let mut verdicts = vec![BackendVerdict::Heuristic { result: heuristic, sentiment: signal }];
        verdicts.extend(generative);

        let report = AnalysisReport {
            id: uuid::Uuid::new_v4().to_string(),
            created_at: chrono::Utc::now(),
            kind: request.kind,
            user_id: request.user_id,
            source_name: request.source_name,
            text_preview: text_preview(text, PREVIEW_CHARS),
            features,
            verdicts,
            result,
            related: Vec::new(),
        };

        if let Err(e) = self.store.save(&report) {
            warn!("[ANALYZER] Could not save report {}: {}", report.id, e);
        }

        let related = if self.settings.use_search && request.find_related && self.settings.related_results > 0 {
            let query = related_query(text);
            (!query.is_empty()).then(|| {
                RelatedContentTask::spawn(Arc::clone(&self.search), query, self.settings.related_results)
            })
        } else {
            None
        };

        info!(
            id = %report.id,
            is_ai = report.result.is_ai,
            probability_ai = report.result.probability_ai,
            confidence = report.result.confidence,
            backends = report.verdicts.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "[ANALYZER] Analysis completed"
        );

        Ok(AnalysisOutcome { report, related })
    }

    pub fn history(&self, query: &HistoryQuery) -> Result<Vec<AnalysisReport>, StoreError> {
        self.store.query(query)
    }

    pub fn report(&self, id: &str) -> Result<Option<AnalysisReport>, StoreError> {
        self.store.get(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ExternalSignal, ScoredResult};
    use crate::services::history_store::JsonFileStore;
    use crate::services::providers::{ChatResult, ProviderError};
    use std::sync::Mutex;

    const SAMPLE: &str = "Furthermore, the cat sat on the mat. The cat sat on the mat. The cat sat on the mat again.";

    struct MockGenerative {
        answer: Result<String, ()>,
        delay: Duration,
    }

    impl GenerativeBackend for MockGenerative {
        fn model_label(&self) -> String {
            "mock:model".to_string()
        }

        async fn generate(&self, _system: &str, _user: &str) -> Result<ChatResult, ProviderError> {
            tokio::time::sleep(self.delay).await;
            match &self.answer {
                Ok(content) => Ok(ChatResult { content: content.clone(), latency_ms: 3, reasoning: None }),
                Err(()) => Err(ProviderError::ApiError { status: 503, message: "unavailable".to_string() }),
            }
        }
    }

    struct MockSentiment(Option<ExternalSignal>);

    impl SentimentBackend for MockSentiment {
        async fn classify(&self, _text: &str) -> Result<ExternalSignal, ProviderError> {
            self.0.clone().ok_or(ProviderError::MissingApiKey)
        }
    }

    struct SlowSentiment(Duration);

    impl SentimentBackend for SlowSentiment {
        async fn classify(&self, _text: &str) -> Result<ExternalSignal, ProviderError> {
            tokio::time::sleep(self.0).await;
            Ok(ExternalSignal { label: "neutral".to_string(), score: 0.99 })
        }
    }

    struct MockSearch;

    impl SearchBackend for MockSearch {
        async fn search(&self, query: &str, limit: usize) -> Result<Vec<RelatedItem>, ProviderError> {
            Ok(vec![RelatedItem {
                title: format!("{} ({})", query, limit),
                link: "https://example.com".to_string(),
                snippet: String::new(),
            }])
        }
    }

    #[derive(Default)]
    struct MemoryStore {
        reports: Mutex<Vec<AnalysisReport>>,
        fail: bool,
    }

    impl ResultStore for MemoryStore {
        fn save(&self, report: &AnalysisReport) -> Result<(), StoreError> {
            if self.fail {
                return Err(StoreError::InvalidId("readonly".to_string()));
            }
            self.reports.lock().unwrap().push(report.clone());
            Ok(())
        }

        fn get(&self, id: &str) -> Result<Option<AnalysisReport>, StoreError> {
            Ok(self.reports.lock().unwrap().iter().find(|r| r.id == id).cloned())
        }

        fn query(&self, query: &HistoryQuery) -> Result<Vec<AnalysisReport>, StoreError> {
            Ok(self.reports.lock().unwrap().iter().take(query.limit).cloned().collect())
        }
    }

    fn generative(answer: Result<&str, ()>) -> MockGenerative {
        MockGenerative { answer: answer.map(str::to_string), delay: Duration::ZERO }
    }

    fn settings() -> AnalysisSettings {
        AnalysisSettings { min_chars: 20, ..AnalysisSettings::default() }
    }

    #[tokio::test]
    async fn test_combines_both_backends() {
        let analyzer = Analyzer::new(
            generative(Ok(r#"{"isAI": false, "confidence": 70, "probabilityAI": 30, "probabilityHuman": 70}"#)),
            MockSentiment(None),
            MockSearch,
            MemoryStore::default(),
            settings(),
        );
        let outcome = analyzer.analyze(AnalysisRequest::text(SAMPLE)).await.unwrap();
        let report = &outcome.report;

        assert_eq!(report.verdicts.len(), 2);
        let heuristic = report.verdicts[0].result().clone();
        assert_eq!(report.verdicts[1].backend_name(), "generative");

        let expected = (30.0 * 0.6 + heuristic.probability_ai as f64 * 0.4).round() as u8;
        assert_eq!(report.result.probability_ai, expected);
        assert_eq!(report.result.probability_ai + report.result.probability_human, 100);

        assert_eq!(analyzer.history(&HistoryQuery::default()).unwrap().len(), 1);
        assert!(analyzer.report(&report.id).unwrap().is_some());
    }

    #[tokio::test]
    async fn test_generative_failure_passes_heuristic_through() {
        let analyzer = Analyzer::new(
            generative(Err(())),
            MockSentiment(None),
            MockSearch,
            MemoryStore::default(),
            settings(),
        );
        let report = analyzer.analyze(AnalysisRequest::text(SAMPLE)).await.unwrap().report;
        assert_eq!(report.verdicts.len(), 1);
        assert_eq!(&report.result, report.verdicts[0].result());
    }

    #[tokio::test]
    async fn test_malformed_answer_uses_neutral_fallback() {
        let analyzer = Analyzer::new(
            generative(Ok("Lo siento, no puedo ayudar con eso.")),
            MockSentiment(None),
            MockSearch,
            MemoryStore::default(),
            settings(),
        );
        let report = analyzer.analyze(AnalysisRequest::text(SAMPLE)).await.unwrap().report;
        match &report.verdicts[1] {
            BackendVerdict::Generative { fallback, result, .. } => {
                assert!(fallback);
                assert_eq!(result, &ScoredResult::neutral_fallback());
            }
            other => panic!("unexpected verdict {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_timeout_omits_generative_backend() {
        let mut s = settings();
        s.backend_timeout = Duration::from_millis(10);
        let analyzer = Analyzer::new(
            MockGenerative { answer: Ok("{}".to_string()), delay: Duration::from_secs(5) },
            MockSentiment(None),
            MockSearch,
            MemoryStore::default(),
            s,
        );
        let report = analyzer.analyze(AnalysisRequest::text(SAMPLE)).await.unwrap().report;
        assert_eq!(report.verdicts.len(), 1);
    }

    #[tokio::test]
    async fn test_slow_sentiment_is_omitted() {
        let mut s = settings();
        s.backend_timeout = Duration::from_millis(10);
        let analyzer = Analyzer::new(
            generative(Err(())),
            SlowSentiment(Duration::from_secs(5)),
            MockSearch,
            MemoryStore::default(),
            s,
        );
        let started = Instant::now();
        let report = analyzer.analyze(AnalysisRequest::text(SAMPLE)).await.unwrap().report;
        assert!(started.elapsed() < Duration::from_secs(2));
        match &report.verdicts[0] {
            BackendVerdict::Heuristic { sentiment, .. } => assert!(sentiment.is_none()),
            other => panic!("unexpected verdict {:?}", other),
        }
        assert!(!analyzer.is_busy());
    }

    #[tokio::test]
    async fn test_sentiment_signal_recorded() {
        let signal = ExternalSignal { label: "neutral".to_string(), score: 0.95 };
        let analyzer = Analyzer::new(
            generative(Err(())),
            MockSentiment(Some(signal.clone())),
            MockSearch,
            MemoryStore::default(),
            settings(),
        );
        let report = analyzer.analyze(AnalysisRequest::text(SAMPLE)).await.unwrap().report;
        match &report.verdicts[0] {
            BackendVerdict::Heuristic { sentiment, .. } => assert_eq!(sentiment.as_ref(), Some(&signal)),
            other => panic!("unexpected verdict {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_input_validation() {
        let analyzer = Analyzer::new(
            generative(Err(())),
            MockSentiment(None),
            MockSearch,
            MemoryStore::default(),
            AnalysisSettings { min_chars: 20, max_chars: 100, ..AnalysisSettings::default() },
        );
        assert!(matches!(analyzer.analyze(AnalysisRequest::text("   ")).await, Err(AnalysisError::Empty)));
        assert!(matches!(
            analyzer.analyze(AnalysisRequest::text("short text")).await,
            Err(AnalysisError::TooShort { min: 20, actual: 10 })
        ));
        assert!(matches!(
            analyzer.analyze(AnalysisRequest::text("x".repeat(101))).await,
            Err(AnalysisError::TooLong { max: 100, actual: 101 })
        ));
        // Rejections release the guard.
        assert!(!analyzer.is_busy());
    }

    #[tokio::test]
    async fn test_concurrent_request_rejected() {
        let analyzer = Analyzer::new(
            MockGenerative { answer: Err(()), delay: Duration::from_millis(200) },
            MockSentiment(None),
            MockSearch,
            MemoryStore::default(),
            settings(),
        );
        let (first, second) = tokio::join!(
            analyzer.analyze(AnalysisRequest::text(SAMPLE)),
            async {
                tokio::time::sleep(Duration::from_millis(20)).await;
                analyzer.analyze(AnalysisRequest::text(SAMPLE)).await
            }
        );
        assert!(first.is_ok());
        assert!(matches!(second, Err(AnalysisError::Busy)));
        assert!(!analyzer.is_busy());
    }

    #[tokio::test]
    async fn test_related_content_attached() {
        let analyzer = Analyzer::new(
            generative(Err(())),
            MockSentiment(None),
            MockSearch,
            MemoryStore::default(),
            settings(),
        );
        let outcome = analyzer.analyze(AnalysisRequest::text(SAMPLE)).await.unwrap();
        assert!(outcome.related.is_some());
        assert!(outcome.related_items().is_empty());
        let report = outcome.with_related().await;
        assert_eq!(report.related.len(), 1);
        assert!(report.related[0].title.starts_with("Furthermore the cat sat"));

        let mut request = AnalysisRequest::text(SAMPLE);
        request.find_related = false;
        assert!(analyzer.analyze(request).await.unwrap().related.is_none());
    }

    #[tokio::test]
    async fn test_store_failure_does_not_fail_analysis() {
        let analyzer = Analyzer::new(
            generative(Err(())),
            MockSentiment(None),
            MockSearch,
            MemoryStore { fail: true, ..MemoryStore::default() },
            settings(),
        );
        assert!(analyzer.analyze(AnalysisRequest::text(SAMPLE)).await.is_ok());
    }

    #[tokio::test]
    async fn test_reports_persist_to_json_store() {
        let dir = tempfile::tempdir().unwrap();
        let analyzer = Analyzer::new(
            generative(Err(())),
            MockSentiment(None),
            MockSearch,
            JsonFileStore::new(dir.path().to_path_buf()),
            settings(),
        );
        let mut request = AnalysisRequest::text(SAMPLE);
        request.user_id = Some("u1".to_string());
        let id = analyzer.analyze(request).await.unwrap().report.id;

        let query = HistoryQuery { user_id: Some("u1".to_string()), ..HistoryQuery::default() };
        let history = analyzer.history(&query).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].id, id);
    }
}
