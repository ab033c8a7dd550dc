//! Embedding providers and the batching/retrying [`Embedder`] in front of them.
//!
//! Providers make exactly one attempt per call. [`Embedder`] splits input into
//! provider-sized batches, applies a per-call timeout, and retries transient
//! failures with bounded exponential backoff.

use crate::config::{EmbeddingConfig, EmbeddingProviderKind};
use crate::error::{ConfigError, EmbeddingError};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const DEFAULT: usize = 128;
const WIDTH_CHECK_TEXT: &str = "dimension check";

pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = DEFAULT;

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    fn model(&self) -> &str;
    fn dimensions(&self) -> usize;
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;
}

/// Deterministic local vectors built from hashed character trigrams.
#[derive(Debug, Clone, Copy)]
pub struct HashedNgramProvider {
    pub dimensions: usize,
}

impl Default for HashedNgramProvider {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
        }
    }
}

impl HashedNgramProvider {
    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimensions.max(1)];
        let lowered = text.to_lowercase();
        let chars: Vec<char> = lowered.chars().collect();

        if chars.is_empty() {
            return vector;
        }

        for window in chars.windows(3) {
            let mut hash = 1469598103934665603u64;
            for ch in window {
                let mut buffer = [0u8; 4];
                for byte in ch.encode_utf8(&mut buffer).bytes() {
                    hash ^= byte as u64;
                    hash = hash.wrapping_mul(1099511628211);
                }
            }
            let bucket = (hash % vector.len() as u64) as usize;
            vector[bucket] += 1.0;
        }

        let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for value in &mut vector {
                *value /= magnitude;
            }
        }

        vector
    }
}

#[async_trait]
impl EmbeddingProvider for HashedNgramProvider {
    fn model(&self) -> &str {
        "hashed-trigram"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(texts.iter().map(|text| self.embed_text(text)).collect())
    }
}

/// OpenAI-compatible `/v1/embeddings` endpoint.
pub struct OpenAiEmbeddingProvider {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
    dimensions: usize,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingDatum {
    #[serde(default)]
    index: Option<usize>,
    embedding: Vec<f32>,
}

impl OpenAiEmbeddingProvider {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        dimensions: usize,
    ) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            model: model.into(),
            dimensions,
        }
    }

    /// Only the v3 embedding models accept a requested output width.
    fn supports_dimensions(&self) -> bool {
        self.model.starts_with("text-embedding-3")
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbeddingProvider {
    fn model(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let mut body = json!({ "model": self.model, "input": texts });
        if self.supports_dimensions() {
            body["dimensions"] = json!(self.dimensions);
        }

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::RateLimited(body));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::Provider {
                status: status.as_u16(),
                body,
            });
        }

        let mut payload: EmbeddingResponse = response
            .json()
            .await
            .map_err(|error| EmbeddingError::MalformedResponse(error.to_string()))?;
        payload
            .data
            .sort_by_key(|datum| datum.index.unwrap_or(usize::MAX));

        Ok(payload.data.into_iter().map(|datum| datum.embedding).collect())
    }
}

/// Build the embedding provider named by the configuration.
pub fn provider_from_config(
    config: &EmbeddingConfig,
) -> Result<Arc<dyn EmbeddingProvider>, ConfigError> {
    match config.provider {
        EmbeddingProviderKind::Hashed => Ok(Arc::new(HashedNgramProvider {
            dimensions: config.dimensions,
        })),
        EmbeddingProviderKind::OpenAi => {
            let api_key = config
                .api_key
                .clone()
                .ok_or_else(|| ConfigError::Missing("embedding.api_key".into()))?;
            Ok(Arc::new(OpenAiEmbeddingProvider::new(
                config.endpoint.clone(),
                api_key,
                config.model.clone(),
                config.dimensions,
            )))
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub batch_size: usize,
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub timeout: Duration,
}

impl RetryPolicy {
    fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.saturating_sub(1).min(16);
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

impl From<&EmbeddingConfig> for RetryPolicy {
    fn from(config: &EmbeddingConfig) -> Self {
        Self {
            batch_size: config.batch_size.max(1),
            max_retries: config.max_retries,
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&EmbeddingConfig::default())
    }
}

pub struct Embedder {
    provider: Arc<dyn EmbeddingProvider>,
    policy: RetryPolicy,
}

impl Embedder {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, policy: RetryPolicy) -> Self {
        Self { provider, policy }
    }

    pub fn dimensions(&self) -> usize {
        self.provider.dimensions()
    }

    pub fn model(&self) -> &str {
        self.provider.model()
    }

    pub fn batch_size(&self) -> usize {
        self.policy.batch_size.max(1)
    }

    /// Fails fast when the configured provider width and the vector store disagree.
    pub fn ensure_dimensions(&self, store_dimensions: usize) -> Result<(), ConfigError> {
        if self.dimensions() != store_dimensions {
            return Err(ConfigError::DimensionMismatch {
                embedder: self.dimensions(),
                store: store_dimensions,
            });
        }
        Ok(())
    }

    /// Embed every text, batch by batch. The first batch that exhausts its
    /// retries fails the whole call.
    pub async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size()) {
            vectors.extend(self.embed_batch(batch).await?);
        }
        Ok(vectors)
    }

    pub async fn embed_query(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.embed_batch(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::MalformedResponse("no query vector returned".into()))
    }

    /// Width of the vectors the provider actually returns, measured with one
    /// short embedding call.
    pub async fn observed_dimensions(&self) -> Result<usize, EmbeddingError> {
        self.request(&[WIDTH_CHECK_TEXT.to_string()], None)
            .await?
            .first()
            .map(Vec::len)
            .ok_or_else(|| EmbeddingError::MalformedResponse("no vector returned".into()))
    }

    /// Embed one provider-sized batch with timeout and retry.
    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        self.request(texts, Some(self.dimensions())).await
    }

    async fn request(
        &self,
        texts: &[String],
        expected_dimensions: Option<usize>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut attempt = 0u32;
        loop {
            if attempt > 0 {
                tokio::time::sleep(self.policy.backoff(attempt)).await;
            }

            let outcome =
                match tokio::time::timeout(self.policy.timeout, self.provider.embed_batch(texts))
                    .await
                {
                    Ok(result) => result
                        .and_then(|vectors| validate(texts, vectors, expected_dimensions)),
                    Err(_) => Err(EmbeddingError::Timeout(self.policy.timeout.as_secs())),
                };

            match outcome {
                Ok(vectors) => {
                    debug!(batch = texts.len(), attempt, model = self.model(), "embedded batch");
                    return Ok(vectors);
                }
                Err(error) if error.is_transient() && attempt < self.policy.max_retries => {
                    attempt += 1;
                    warn!(%error, attempt, "transient embedding failure, retrying");
                }
                Err(error) if error.is_transient() => {
                    return Err(EmbeddingError::RetriesExhausted {
                        attempts: attempt + 1,
                        last: error.to_string(),
                    });
                }
                Err(error) => return Err(error),
            }
        }
    }
}

fn validate(
    texts: &[String],
    vectors: Vec<Vec<f32>>,
    expected_dimensions: Option<usize>,
) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    if vectors.len() != texts.len() {
        return Err(EmbeddingError::MalformedResponse(format!(
            "{} vectors returned for {} texts",
            vectors.len(),
            texts.len()
        )));
    }
    if let Some(expected) = expected_dimensions {
        if let Some(vector) = vectors.iter().find(|vector| vector.len() != expected) {
            return Err(EmbeddingError::MalformedResponse(format!(
                "vector has {} dimensions, expected {expected}",
                vector.len()
            )));
        }
    }
    Ok(vectors)
}
