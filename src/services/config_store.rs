// Configuration Storage Service
// Handles config file read/write, version backup and env overrides

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

const GEMINI_DEFAULT_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const INFERENCE_DEFAULT_URL: &str = "https://api-inference.huggingface.co";
const SEARCH_DEFAULT_URL: &str = "https://www.googleapis.com/customsearch/v1";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    pub version: String,
    pub proxy: Option<ProxyConfig>,
    #[serde(default)]
    pub backends: BackendsConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub api_keys: HashMap<String, String>,
    pub history_dir: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProxyConfig {
    pub enabled: bool,
    pub https: Option<String>,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum ApiFlavor {
    #[default]
    Gemini,
    ChatCompletions,
}

impl ApiFlavor {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gemini => "gemini",
            Self::ChatCompletions => "openai",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "gemini" => Some(Self::Gemini),
            "openai" | "chat" => Some(Self::ChatCompletions),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct BackendsConfig {
    #[serde(default)]
    pub generative: GenerativeConfig,
    #[serde(default)]
    pub sentiment: SentimentConfig,
    #[serde(default)]
    pub search: SearchConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerativeConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub flavor: ApiFlavor,
    #[serde(default = "default_gemini_url")]
    pub base_url: String,
    #[serde(default = "default_gemini_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: i32,
}

impl Default for GenerativeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            flavor: ApiFlavor::Gemini,
            base_url: default_gemini_url(),
            model: default_gemini_model(),
            max_tokens: default_max_tokens(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SentimentConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_inference_url")]
    pub base_url: String,
    #[serde(default = "default_sentiment_model")]
    pub model: String,
}

impl Default for SentimentConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: default_inference_url(),
            model: default_sentiment_model(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_search_url")]
    pub base_url: String,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: default_search_url(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisConfig {
    #[serde(default = "default_min_chars")]
    pub min_chars: usize,
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
    #[serde(default = "default_generative_weight")]
    pub generative_weight: f64,
    #[serde(default = "default_heuristic_weight")]
    pub heuristic_weight: f64,
    #[serde(default = "default_related_results")]
    pub related_results: usize,
    #[serde(default = "default_backend_timeout")]
    pub backend_timeout_secs: u64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            min_chars: default_min_chars(),
            max_chars: default_max_chars(),
            generative_weight: default_generative_weight(),
            heuristic_weight: default_heuristic_weight(),
            related_results: default_related_results(),
            backend_timeout_secs: default_backend_timeout(),
        }
    }
}

fn default_true() -> bool { true }
fn default_gemini_url() -> String { GEMINI_DEFAULT_URL.to_string() }
fn default_gemini_model() -> String { "gemini-1.5-flash".to_string() }
fn default_max_tokens() -> i32 { 2048 }
fn default_inference_url() -> String { INFERENCE_DEFAULT_URL.to_string() }
fn default_sentiment_model() -> String { "cardiffnlp/twitter-xlm-roberta-base-sentiment".to_string() }
fn default_search_url() -> String { SEARCH_DEFAULT_URL.to_string() }
fn default_min_chars() -> usize { 50 }
fn default_max_chars() -> usize { 10_000 }
fn default_generative_weight() -> f64 { 0.6 }
fn default_heuristic_weight() -> f64 { 0.4 }
fn default_related_results() -> usize { 5 }
fn default_backend_timeout() -> u64 { 60 }

impl AppConfig {
    /// Apply backend URL overrides from the environment.
    pub fn apply_env_overrides(&mut self) {
        if let Some(url) = env_value("VERITAS_GENERATIVE_URL") {
            self.backends.generative.base_url = url;
        }
        if let Some(model) = env_value("VERITAS_GENERATIVE_MODEL") {
            self.backends.generative.model = model;
        }
        if let Some(flavor) = env_value("VERITAS_GENERATIVE_FLAVOR").and_then(|f| ApiFlavor::from_name(&f)) {
            self.backends.generative.flavor = flavor;
        }
        if let Some(url) = env_value("VERITAS_INFERENCE_URL") {
            self.backends.sentiment.base_url = url;
        }
        if let Some(url) = env_value("VERITAS_SEARCH_URL") {
            self.backends.search.base_url = url;
        }
    }

    /// Directory for persisted analysis history.
    pub fn history_path(&self) -> Option<PathBuf> {
        match self.history_dir.as_deref() {
            Some(dir) if !dir.trim().is_empty() => Some(PathBuf::from(dir)),
            _ => ConfigStore::default_config_dir().map(|d| d.join("history")),
        }
    }
}

fn env_value(key: &str) -> Option<String> {
    env::var(key).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

pub struct ConfigStore {
    config_dir: PathBuf,
    config_file: PathBuf,
}

impl ConfigStore {
    pub fn new(config_dir: PathBuf) -> Self {
        let config_file = config_dir.join("config.json");
        Self { config_dir, config_file }
    }

    /// Get default config directory
    pub fn default_config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("veritas"))
    }

    /// Ensure config directory exists
    pub fn ensure_dir(&self) -> Result<(), String> {
        fs::create_dir_all(&self.config_dir)
            .map_err(|e| format!("Failed to create config dir: {}", e))
    }

    /// Load configuration from file
    pub fn load(&self) -> Result<AppConfig, String> {
        if !self.config_file.exists() {
            return Ok(AppConfig::default());
        }

        let content = fs::read_to_string(&self.config_file)
            .map_err(|e| format!("Failed to read config: {}", e))?;

        serde_json::from_str(&content)
            .map_err(|e| format!("Failed to parse config: {}", e))
    }

    /// Save configuration to file
    pub fn save(&self, config: &AppConfig) -> Result<(), String> {
        self.ensure_dir()?;

        if self.config_file.exists() {
            self.create_backup()?;
        }

        let content = serde_json::to_string_pretty(config)
            .map_err(|e| format!("Failed to serialize config: {}", e))?;

        fs::write(&self.config_file, content)
            .map_err(|e| format!("Failed to write config: {}", e))
    }

    fn create_backup(&self) -> Result<(), String> {
        let backup_dir = self.config_dir.join("backups");
        fs::create_dir_all(&backup_dir)
            .map_err(|e| format!("Failed to create backup dir: {}", e))?;

        let timestamp = chrono::Utc::now().format("%Y%m%d_%H%M%S%3f");
        let backup_file = backup_dir.join(format!("config_{}.json", timestamp));

        fs::copy(&self.config_file, &backup_file)
            .map_err(|e| format!("Failed to create backup: {}", e))?;

        self.cleanup_old_backups(&backup_dir, 10)
    }

    /// Remove old backups, keeping only the most recent N
    fn cleanup_old_backups(&self, backup_dir: &Path, keep: usize) -> Result<(), String> {
        let mut entries: Vec<_> = fs::read_dir(backup_dir)
            .map_err(|e| format!("Failed to read backup dir: {}", e))?
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().is_some_and(|ext| ext == "json"))
            .collect();

        if entries.len() <= keep {
            return Ok(());
        }

        // Names embed the timestamp, so lexical order is age order.
        entries.sort_by_key(|e| e.file_name());

        for entry in entries.iter().take(entries.len() - keep) {
            let _ = fs::remove_file(entry.path());
        }

        Ok(())
    }

    pub fn get_api_key(&self, provider: &str) -> Result<Option<String>, String> {
        let config = self.load()?;
        Ok(config.api_keys.get(provider).cloned())
    }

    pub fn set_api_key(&self, provider: &str, key: &str) -> Result<(), String> {
        let mut config = self.load()?;
        config.api_keys.insert(provider.to_string(), key.to_string());
        self.save(&config)
    }

    pub fn delete_api_key(&self, provider: &str) -> Result<(), String> {
        let mut config = self.load()?;
        config.api_keys.remove(provider);
        self.save(&config)
    }
}
