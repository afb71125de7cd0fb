// Detection Module
// Scoring core plus the orchestration around it:
// - heuristic: fixed-rule scoring of extracted text features
// - aggregation: weighted merge of two scored results
// - llm_analyzer: structured verdicts from the generative backend (with neutral fallback)
// - related: background related-content search
// - orchestrator: single-flight end-to-end analysis

pub mod heuristic;
pub mod aggregation;
pub mod llm_analyzer;
pub mod related;
pub mod orchestrator;

pub use heuristic::score;
pub use aggregation::{combine, combine_available, CombineError};
pub use llm_analyzer::{build_detection_prompt, parse_verdict, request_verdict, ParsedVerdict};
pub use related::{related_query, RelatedContentTask};
pub use orchestrator::{AnalysisError, AnalysisOutcome, AnalysisSettings, Analyzer};
