// Veritas Core Services

pub mod text_processor;
pub mod config_store;
pub mod providers;
pub mod sentiment;
pub mod search;
pub mod history_store;
pub mod document_loader;
pub mod detection;

pub use text_processor::*;
pub use config_store::*;
pub use providers::*;
pub use sentiment::*;
pub use search::*;
pub use history_store::*;
pub use document_loader::*;

pub use detection::{
    combine,
    combine_available,
    parse_verdict,
    score,
    AnalysisError,
    AnalysisOutcome,
    AnalysisSettings,
    Analyzer,
    CombineError,
    RelatedContentTask,
};
