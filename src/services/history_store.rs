// History Storage Service
// Persists analysis reports as one JSON document per record

use crate::models::{AnalysisReport, HistoryQuery};
use std::fs;
use std::path::PathBuf;
use thiserror::Error;
use tracing::warn;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid record id: {0}")]
    InvalidId(String),
}

/// Document store for analysis reports, keyed by report id.
pub trait ResultStore: Send + Sync {
    fn save(&self, report: &AnalysisReport) -> Result<(), StoreError>;
    fn get(&self, id: &str) -> Result<Option<AnalysisReport>, StoreError>;
    fn query(&self, query: &HistoryQuery) -> Result<Vec<AnalysisReport>, StoreError>;
}

pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn record_path(&self, id: &str) -> Result<PathBuf, StoreError> {
        let valid = !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(StoreError::InvalidId(id.to_string()));
        }
        Ok(self.dir.join(format!("{}.json", id)))
    }

    fn load_all(&self) -> Result<Vec<AnalysisReport>, StoreError> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let mut reports = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().is_none_or(|ext| ext != "json") {
                continue;
            }
            let parsed = fs::read_to_string(&path)
                .map_err(StoreError::from)
                .and_then(|content| serde_json::from_str::<AnalysisReport>(&content).map_err(StoreError::from));
            match parsed {
                Ok(report) => reports.push(report),
                Err(e) => warn!("[HISTORY] Skipping unreadable record {}: {}", path.display(), e),
            }
        }
        Ok(reports)
    }
}

impl ResultStore for JsonFileStore {
    fn save(&self, report: &AnalysisReport) -> Result<(), StoreError> {
        let path = self.record_path(&report.id)?;
        fs::create_dir_all(&self.dir)?;
        let content = serde_json::to_string_pretty(report)?;
        fs::write(path, content)?;
        Ok(())
    }

    fn get(&self, id: &str) -> Result<Option<AnalysisReport>, StoreError> {
        let path = self.record_path(id)?;
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(path)?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    fn query(&self, query: &HistoryQuery) -> Result<Vec<AnalysisReport>, StoreError> {
        let mut reports: Vec<AnalysisReport> = self
            .load_all()?
            .into_iter()
            .filter(|r| query.user_id.is_none() || r.user_id == query.user_id)
            .filter(|r| query.is_ai.is_none_or(|is_ai| r.result.is_ai == is_ai))
            .collect();

        reports.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        reports.truncate(query.limit);
        Ok(reports)
    }
}
