//! Pipeline configuration.
//!
//! Everything the sync run and the retriever need is carried by one
//! [`PipelineConfig`] value handed to their constructors. It is read from TOML
//! (every field has a default) and then patched from environment variables for
//! credentials and endpoints.

use crate::chunking::ChunkingConfig;
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_OPENAI_ENDPOINT: &str = "https://api.openai.com/v1/embeddings";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    pub paths: PathsConfig,
    pub chunking: ChunkingConfig,
    pub embedding: EmbeddingConfig,
    pub ocr: OcrConfig,
    pub store: StoreConfig,
    pub retrieval: RetrievalConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PathsConfig {
    pub source_dir: PathBuf,
    pub artifact_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            source_dir: PathBuf::from("storage/original_papers"),
            artifact_dir: PathBuf::from("storage/texts"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProviderKind {
    OpenAi,
    Hashed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: EmbeddingProviderKind,
    pub model: String,
    pub dimensions: usize,
    pub endpoint: String,
    pub api_key: Option<String>,
    pub batch_size: usize,
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProviderKind::OpenAi,
            model: "text-embedding-3-small".to_string(),
            dimensions: 1536,
            endpoint: DEFAULT_OPENAI_ENDPOINT.to_string(),
            api_key: None,
            batch_size: 100,
            max_retries: 3,
            initial_backoff_ms: 500,
            max_backoff_ms: 8_000,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum OcrProviderKind {
    TextLayer,
    Http,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct OcrConfig {
    pub provider: OcrProviderKind,
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
    pub language: String,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            provider: OcrProviderKind::TextLayer,
            endpoint: None,
            api_key: None,
            timeout_secs: 120,
            language: "en".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    Qdrant,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub url: String,
    pub collection: String,
    pub api_key: Option<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Qdrant,
            url: "http://localhost:6333".to_string(),
            collection: "paper_embeddings".to_string(),
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetrievalConfig {
    pub top_k: usize,
    pub similarity_threshold: f32,
    pub fallback_threshold_factor: f32,
    pub recency_boost_years: i32,
    pub recency_boost_factor: f32,
    pub section_match_boost: f32,
    pub paper_match_boost: f32,
    pub max_context_chars: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            similarity_threshold: 0.5,
            fallback_threshold_factor: 0.7,
            recency_boost_years: 3,
            recency_boost_factor: 1.1,
            section_match_boost: 1.15,
            paper_match_boost: 1.05,
            max_context_chars: 1_500,
        }
    }
}

impl PipelineConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Patch credentials and endpoints from a key lookup. Blank values are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        if let Some(key) = get("OPENAI_API_KEY") {
            self.embedding.api_key = Some(key);
        }
        if let Some(model) = get("EMBEDDING_MODEL") {
            self.embedding.model = model;
        }
        if let Some(endpoint) = get("LLM_OCR_ENDPOINT") {
            self.ocr.endpoint = Some(endpoint);
        }
        if let Some(key) = get("LLM_OCR_API_KEY") {
            self.ocr.api_key = Some(key);
        }
        if let Some(url) = get("QDRANT_URL") {
            self.store.url = url;
        }
        if let Some(key) = get("QDRANT_API_KEY") {
            self.store.api_key = Some(key);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunking.max_chars == 0 {
            return Err(invalid("chunking.max_chars", "must be greater than zero"));
        }
        if self.embedding.dimensions == 0 {
            return Err(invalid("embedding.dimensions", "must be greater than zero"));
        }
        if self.embedding.batch_size == 0 {
            return Err(invalid("embedding.batch_size", "must be greater than zero"));
        }
        if self.embedding.timeout_secs == 0 || self.ocr.timeout_secs == 0 {
            return Err(invalid("timeout_secs", "timeouts must be greater than zero"));
        }
        if self.embedding.provider == EmbeddingProviderKind::OpenAi
            && self.embedding.api_key.is_none()
        {
            return Err(ConfigError::Missing("embedding.api_key (OPENAI_API_KEY)".into()));
        }
        if self.ocr.provider == OcrProviderKind::Http && self.ocr.endpoint.is_none() {
            return Err(ConfigError::Missing("ocr.endpoint (LLM_OCR_ENDPOINT)".into()));
        }
        if self.store.backend == StoreBackend::Qdrant && self.store.url.trim().is_empty() {
            return Err(ConfigError::Missing("store.url (QDRANT_URL)".into()));
        }
        if self.retrieval.top_k == 0 {
            return Err(invalid("retrieval.top_k", "must be greater than zero"));
        }
        if !(0.0..=1.0).contains(&self.retrieval.similarity_threshold) {
            return Err(invalid("retrieval.similarity_threshold", "must be within 0..=1"));
        }
        Ok(())
    }
}

fn invalid(key: &str, details: &str) -> ConfigError {
    ConfigError::Invalid {
        key: key.to_string(),
        details: details.to_string(),
    }
}
