use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("pdf parse error: {0}")]
    PdfParse(String),

    #[error("pdf has no pages: {0}")]
    NoPages(String),

    #[error("no extractable text in {0}")]
    EmptyText(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("ocr failed: {0}")]
    OcrFailed(String),

    #[error("ocr timed out after {seconds}s on page {page}")]
    Timeout { page: u32, seconds: u64 },
}

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("embedding provider rate limited the request: {0}")]
    RateLimited(String),

    #[error("embedding request timed out after {0}s")]
    Timeout(u64),

    #[error("embedding provider returned {status}: {body}")]
    Provider { status: u16, body: String },

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("malformed embedding response: {0}")]
    MalformedResponse(String),

    #[error("embedding batch failed after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: String },
}

impl EmbeddingError {
    /// Whether a retry has a chance of succeeding.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::RateLimited(_) | Self::Timeout(_) | Self::Network(_) => true,
            Self::Provider { status, .. } => *status >= 500,
            Self::MalformedResponse(_) | Self::RetriesExhausted { .. } => false,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing configuration value: {0}")]
    Missing(String),

    #[error("invalid configuration value for {key}: {details}")]
    Invalid { key: String, details: String },

    #[error("embedding dimensions {embedder} do not match vector store dimensions {store}")]
    DimensionMismatch { embedder: usize, store: usize },

    #[error("could not read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("could not parse config file: {0}")]
    Toml(#[from] toml::de::Error),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("vector dimension {actual} does not match store dimension {expected}")]
    Dimension { expected: usize, actual: usize },

    #[error("store request failed: {0}")]
    Request(String),
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("source directory not found: {0}")]
    SourceDirectory(String),

    #[error("artifact directory error: {0}")]
    ArtifactDirectory(String),

    #[error("extraction failed: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("vector store error: {0}")]
    VectorStore(#[from] StoreError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid file filter: {0}")]
    Filter(#[from] globset::Error),

    #[error("embedding provider unavailable: {0}")]
    ProviderUnavailable(EmbeddingError),

    #[error("vector store not ready: {0}")]
    StoreUnavailable(StoreError),
}

impl SyncError {
    /// Errors that would recur for every file and must stop the run.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Configuration(_)
                | Self::SourceDirectory(_)
                | Self::ArtifactDirectory(_)
                | Self::Filter(_)
                | Self::ProviderUnavailable(_)
                | Self::StoreUnavailable(_)
        )
    }
}

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("query embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("vector store query failed: {0}")]
    Store(#[from] StoreError),
}

pub type Result<T, E = SyncError> = std::result::Result<T, E>;
