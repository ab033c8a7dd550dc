use crate::error::StoreError;
use crate::models::{EmbeddedChunk, ScoredChunk, StoreStats};
use crate::store::SearchRequest;
use async_trait::async_trait;

/// Persistence for embedded chunks keyed by `(source_file, chunk_index)`.
#[async_trait]
pub trait VectorStore: Send + Sync {
    fn dimensions(&self) -> usize;

    /// Prepare the backing collection. Called once before a run writes.
    async fn ensure_ready(&self) -> Result<(), StoreError> {
        Ok(())
    }

    /// Insert or replace rows by key. Never duplicates a key.
    async fn upsert(&self, chunks: &[EmbeddedChunk]) -> Result<(), StoreError>;

    async fn delete_source(&self, source_file: &str) -> Result<usize, StoreError>;

    async fn delete_all(&self) -> Result<usize, StoreError>;

    async fn count_for_source(&self, source_file: &str) -> Result<usize, StoreError>;

    /// Best matches first; equal scores ordered by ascending key.
    async fn query(&self, request: &SearchRequest<'_>) -> Result<Vec<ScoredChunk>, StoreError>;

    async fn stats(&self) -> Result<StoreStats, StoreError>;
}
