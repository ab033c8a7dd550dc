use crate::error::StoreError;
use crate::models::{EmbeddedChunk, ScoredChunk, StoreStats};
use crate::store::{rank, summarize, SearchRequest};
use crate::traits::VectorStore;
use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

type RowKey = (String, u64);

/// Process-local store ranking by cosine similarity.
pub struct InMemoryVectorStore {
    dimensions: usize,
    rows: RwLock<BTreeMap<RowKey, EmbeddedChunk>>,
}

impl InMemoryVectorStore {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            rows: RwLock::new(BTreeMap::new()),
        }
    }

    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }

    pub async fn get(&self, source_file: &str, chunk_index: u64) -> Option<EmbeddedChunk> {
        self.rows
            .read()
            .await
            .get(&(source_file.to_string(), chunk_index))
            .cloned()
    }
}

pub(crate) fn cosine_similarity(left: &[f32], right: &[f32]) -> f32 {
    let mut dot = 0.0;
    let mut left_norm = 0.0;
    let mut right_norm = 0.0;
    for (a, b) in left.iter().zip(right) {
        dot += a * b;
        left_norm += a * a;
        right_norm += b * b;
    }
    if left_norm == 0.0 || right_norm == 0.0 {
        return 0.0;
    }
    dot / (left_norm.sqrt() * right_norm.sqrt())
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn upsert(&self, chunks: &[EmbeddedChunk]) -> Result<(), StoreError> {
        if let Some(bad) = chunks.iter().find(|row| row.vector.len() != self.dimensions) {
            return Err(StoreError::Dimension {
                expected: self.dimensions,
                actual: bad.vector.len(),
            });
        }

        let mut rows = self.rows.write().await;
        for row in chunks {
            let key = (row.chunk.source_file.clone(), row.chunk.chunk_index);
            rows.insert(key, row.clone());
        }
        Ok(())
    }

    async fn delete_source(&self, source_file: &str) -> Result<usize, StoreError> {
        let mut rows = self.rows.write().await;
        let before = rows.len();
        rows.retain(|(source, _), _| source != source_file);
        Ok(before - rows.len())
    }

    async fn delete_all(&self) -> Result<usize, StoreError> {
        let mut rows = self.rows.write().await;
        let removed = rows.len();
        rows.clear();
        Ok(removed)
    }

    async fn count_for_source(&self, source_file: &str) -> Result<usize, StoreError> {
        let rows = self.rows.read().await;
        Ok(rows
            .keys()
            .filter(|(source, _)| source == source_file)
            .count())
    }

    async fn query(&self, request: &SearchRequest<'_>) -> Result<Vec<ScoredChunk>, StoreError> {
        request.check_dimensions(self.dimensions)?;
        let rows = self.rows.read().await;
        let hits = rows
            .values()
            .filter(|row| request.filters.matches(&row.chunk))
            .map(|row| ScoredChunk {
                chunk: row.chunk.clone(),
                score: cosine_similarity(request.vector, &row.vector),
            })
            .filter(|hit| request.admits(hit.score))
            .collect();
        Ok(rank(hits, request.top_k))
    }

    async fn stats(&self) -> Result<StoreStats, StoreError> {
        let rows = self.rows.read().await;
        Ok(summarize(rows.values().map(|row| {
            (
                row.chunk.source_file.as_str(),
                row.chunk.paper_type,
                row.chunk.section,
            )
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PaperChunk, PaperType, QueryFilters, Section};

    fn row(source_file: &str, chunk_index: u64, text: &str, vector: Vec<f32>) -> EmbeddedChunk {
        EmbeddedChunk {
            chunk: PaperChunk {
                source_file: source_file.to_string(),
                chunk_index,
                text: text.to_string(),
                paper_type: PaperType::Paper1,
                section: None,
                year: Some("2016".to_string()),
            },
            vector,
        }
    }

    #[tokio::test]
    async fn upsert_replaces_rows_with_the_same_key() {
        let store = InMemoryVectorStore::new(2);
        store
            .upsert(&[row("a.pdf", 0, "first", vec![1.0, 0.0])])
            .await
            .expect("upsert");
        store
            .upsert(&[row("a.pdf", 0, "second", vec![0.0, 1.0])])
            .await
            .expect("upsert");

        assert_eq!(store.len().await, 1);
        let stored = store.get("a.pdf", 0).await.expect("row exists");
        assert_eq!(stored.chunk.text, "second");
    }

    #[tokio::test]
    async fn delete_counts_removed_rows() {
        let store = InMemoryVectorStore::new(2);
        store
            .upsert(&[
                row("a.pdf", 0, "a0", vec![1.0, 0.0]),
                row("a.pdf", 1, "a1", vec![1.0, 0.0]),
                row("b.pdf", 0, "b0", vec![1.0, 0.0]),
            ])
            .await
            .expect("upsert");

        assert_eq!(store.count_for_source("a.pdf").await.expect("count"), 2);
        assert_eq!(store.delete_source("a.pdf").await.expect("delete"), 2);
        assert_eq!(store.count_for_source("a.pdf").await.expect("count"), 0);
        assert_eq!(store.delete_all().await.expect("delete"), 1);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn query_filters_ranks_and_breaks_ties_by_key() {
        let store = InMemoryVectorStore::new(2);
        let mut sectioned = row("c.pdf", 0, "c0", vec![1.0, 0.0]);
        sectioned.chunk.section = Some(Section::SectionB);
        store
            .upsert(&[
                row("b.pdf", 0, "b0", vec![1.0, 0.0]),
                row("a.pdf", 2, "a2", vec![1.0, 0.0]),
                row("a.pdf", 1, "a1", vec![0.0, 1.0]),
                sectioned,
            ])
            .await
            .expect("upsert");

        let filters = QueryFilters::default();
        let query = [1.0, 0.0];
        let hits = store
            .query(&SearchRequest::new(&query, &filters, 3))
            .await
            .expect("query");
        let keys: Vec<_> = hits.iter().map(|hit| hit.chunk.key()).collect();
        assert_eq!(keys, vec![("a.pdf", 2), ("b.pdf", 0), ("c.pdf", 0)]);

        let section_b = QueryFilters {
            section: Some(Section::SectionB),
            ..QueryFilters::default()
        };
        let hits = store
            .query(&SearchRequest::new(&query, &section_b, 5))
            .await
            .expect("query");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk.source_file, "c.pdf");

        let strict = store
            .query(&SearchRequest::new(&query, &filters, 5).with_min_score(0.5))
            .await
            .expect("query");
        assert_eq!(strict.len(), 3);
    }

    #[tokio::test]
    async fn wrong_dimensions_are_rejected() {
        let store = InMemoryVectorStore::new(3);
        let error = store
            .upsert(&[row("a.pdf", 0, "a0", vec![1.0])])
            .await
            .expect_err("dimension mismatch");
        assert!(matches!(error, StoreError::Dimension { expected: 3, actual: 1 }));
    }

    #[tokio::test]
    async fn stats_count_files_and_buckets() {
        let store = InMemoryVectorStore::new(2);
        store
            .upsert(&[
                row("a.pdf", 0, "a0", vec![1.0, 0.0]),
                row("b.pdf", 0, "b0", vec![1.0, 0.0]),
            ])
            .await
            .expect("upsert");
        let stats = store.stats().await.expect("stats");
        assert_eq!(stats.total_chunks, 2);
        assert_eq!(stats.total_files, 2);
        assert_eq!(stats.breakdown.len(), 1);
    }
}
