// Veritas Data Models
// Plain value types shared by the scoring core and its collaborators

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============ Text Features ============

/// Statistical features of a text sample. Ratios are 0 when their denominator is 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct TextFeatures {
    pub word_count: usize,
    pub sentence_count: usize,
    pub paragraph_count: usize,
    pub average_words_per_sentence: f64,
    pub average_sentences_per_paragraph: f64,
    pub unique_word_count: usize,
    pub vocabulary_diversity: f64,
    pub average_word_length: f64,
    pub punctuation_density: f64,
    pub capitalization_ratio: f64,
    pub has_repetitive_patterns: bool,
    pub has_unusual_transitions: bool,
    pub complexity_score: f64,
}

/// Label/score pair returned by the sentiment backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalSignal {
    pub label: String,
    pub score: f64,
}

// ============ Scored Results ============

#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FactorImpact {
    Positive,
    Negative,
    Neutral,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Factor {
    pub name: String,
    /// Share of the overall verdict, in [0,1].
    pub weight: f64,
    /// Feature reading on a 0-100 scale.
    pub value: f64,
    pub description: String,
    pub impact: FactorImpact,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoredResult {
    #[serde(rename = "isAI")]
    pub is_ai: bool,
    pub confidence: u8,
    #[serde(rename = "probabilityAI")]
    pub probability_ai: u8,
    pub probability_human: u8,
    pub explanation: String,
    #[serde(default)]
    pub factors: Vec<Factor>,
}

/// Result of merging two scored results; same shape as its inputs.
pub type CombinedResult = ScoredResult;

impl ScoredResult {
    /// Neutral verdict substituted when a backend answer cannot be interpreted.
    pub fn neutral_fallback() -> Self {
        Self {
            is_ai: false,
            confidence: 50,
            probability_ai: 50,
            probability_human: 50,
            explanation: "No se pudo interpretar la respuesta del modelo; resultado neutral.".to_string(),
            factors: Vec::new(),
        }
    }
}

/// Discretized confidence used in explanations.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceLevel {
    Alta,
    Moderada,
    Baja,
}

impl ConfidenceLevel {
    pub fn from_confidence(confidence: u8) -> Self {
        if confidence > 80 {
            Self::Alta
        } else if confidence > 60 {
            Self::Moderada
        } else {
            Self::Baja
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Alta => "alta",
            Self::Moderada => "moderada",
            Self::Baja => "baja",
        }
    }
}

// ============ Backend Verdicts ============

/// Per-backend verdict, tagged once where the backend response is parsed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "camelCase")]
pub enum BackendVerdict {
    Heuristic {
        result: ScoredResult,
        #[serde(skip_serializing_if = "Option::is_none")]
        sentiment: Option<ExternalSignal>,
    },
    #[serde(rename_all = "camelCase")]
    Generative {
        model: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        methodology: Option<String>,
        /// True when the model answer was unreadable and the neutral fallback was used.
        fallback: bool,
        latency_ms: i64,
        result: ScoredResult,
    },
}

impl BackendVerdict {
    pub fn result(&self) -> &ScoredResult {
        match self {
            Self::Heuristic { result, .. } => result,
            Self::Generative { result, .. } => result,
        }
    }

    pub fn backend_name(&self) -> &'static str {
        match self {
            Self::Heuristic { .. } => "heuristic",
            Self::Generative { .. } => "generative",
        }
    }
}

// ============ Related Content ============

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelatedItem {
    pub title: String,
    pub link: String,
    #[serde(default)]
    pub snippet: String,
}

// ============ Analysis Report ============

#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    #[default]
    Text,
    Document,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRequest {
    pub text: String,
    #[serde(default)]
    pub kind: ContentKind,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub source_name: Option<String>,
    #[serde(default = "default_true")]
    pub find_related: bool,
}

impl AnalysisRequest {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            kind: ContentKind::Text,
            user_id: None,
            source_name: None,
            find_related: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisReport {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub kind: ContentKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_name: Option<String>,
    pub text_preview: String,
    pub features: TextFeatures,
    pub verdicts: Vec<BackendVerdict>,
    pub result: CombinedResult,
    #[serde(default)]
    pub related: Vec<RelatedItem>,
}

impl AnalysisReport {
    pub fn attach_related(&mut self, items: Vec<RelatedItem>) {
        self.related = items;
    }
}

// ============ History ============

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryQuery {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default, rename = "isAI")]
    pub is_ai: Option<bool>,
    #[serde(default = "default_history_limit")]
    pub limit: usize,
}

impl Default for HistoryQuery {
    fn default() -> Self {
        Self {
            user_id: None,
            is_ai: None,
            limit: default_history_limit(),
        }
    }
}

// ============ Default Value Functions ============

fn default_true() -> bool { true }
fn default_history_limit() -> usize { 20 }

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confidence_levels() {
        assert_eq!(ConfidenceLevel::from_confidence(95), ConfidenceLevel::Alta);
        assert_eq!(ConfidenceLevel::from_confidence(81), ConfidenceLevel::Alta);
        assert_eq!(ConfidenceLevel::from_confidence(80), ConfidenceLevel::Moderada);
        assert_eq!(ConfidenceLevel::from_confidence(61), ConfidenceLevel::Moderada);
        assert_eq!(ConfidenceLevel::from_confidence(60), ConfidenceLevel::Baja);
    }

    #[test]
    fn test_neutral_fallback_shape() {
        let r = ScoredResult::neutral_fallback();
        assert!(!r.is_ai);
        assert_eq!(r.confidence, 50);
        assert_eq!(r.probability_ai + r.probability_human, 100);
        assert!(r.factors.is_empty());
    }

    #[test]
    fn test_verdict_serializes_with_backend_tag() {
        let verdict = BackendVerdict::Generative {
            model: "gemini:gemini-1.5-flash".to_string(),
            methodology: None,
            fallback: true,
            latency_ms: 12,
            result: ScoredResult::neutral_fallback(),
        };
        let json = serde_json::to_value(&verdict).unwrap();
        assert_eq!(json["backend"], "generative");
        assert_eq!(json["result"]["isAI"], false);
        assert_eq!(json["result"]["probabilityAI"], 50);
        assert_eq!(verdict.backend_name(), "generative");
    }
}
