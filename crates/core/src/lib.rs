pub mod artifacts;
pub mod chunking;
pub mod classifier;
pub mod config;
pub mod discovery;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod models;
pub mod orchestrator;
pub mod retriever;
pub mod store;
pub mod stores;
pub mod traits;

#[cfg(test)]
pub(crate) mod testing;

pub use artifacts::{Artifact, ArtifactStore};
pub use chunking::{build_chunks, normalize_whitespace, split_text, ChunkingConfig};
pub use classifier::{classify, detect_section};
pub use config::{
    EmbeddingConfig, EmbeddingProviderKind, OcrConfig, OcrProviderKind, PathsConfig,
    PipelineConfig, RetrievalConfig, StoreBackend, StoreConfig,
};
pub use discovery::{discover_pdf_files, FileFilter};
pub use embeddings::{
    provider_from_config, Embedder, EmbeddingProvider, HashedNgramProvider,
    OpenAiEmbeddingProvider, RetryPolicy, DEFAULT_EMBEDDING_DIMENSIONS,
};
pub use error::{
    ConfigError, EmbeddingError, ExtractionError, RetrievalError, StoreError, SyncError,
};
pub use extractor::{
    engine_from_config, HttpOcr, OcrEngine, PageImage, TextExtractor, TextLayerOcr,
};
pub use models::{
    Classification, Difficulty, EmbeddedChunk, ExtractedText, PaperChunk, PaperFormat, PaperType,
    QueryFilters, RequestSection, RetrievalRequest, ScoredChunk, Section, SkipReason, SourceKind,
    StoreStats, SyncFileResult, SyncOptions, SyncRunSummary, SyncStatus, SyncStatusReport,
};
pub use orchestrator::SyncOrchestrator;
pub use retriever::{build_query, format_context, RankedChunk, Retriever};
pub use store::{SearchRequest, SourceLocks};
pub use stores::{store_from_config, InMemoryVectorStore, QdrantStore};
pub use traits::VectorStore;
