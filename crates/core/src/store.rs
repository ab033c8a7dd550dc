use crate::error::StoreError;
use crate::models::{PaperType, QueryFilters, ScoredChunk, Section, StatsBucket, StoreStats};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex};
use tokio::sync::OwnedMutexGuard;

#[derive(Debug, Clone, Copy)]
pub struct SearchRequest<'a> {
    pub vector: &'a [f32],
    pub filters: &'a QueryFilters,
    pub top_k: usize,
    pub min_score: Option<f32>,
}

impl<'a> SearchRequest<'a> {
    pub fn new(vector: &'a [f32], filters: &'a QueryFilters, top_k: usize) -> Self {
        Self {
            vector,
            filters,
            top_k,
            min_score: None,
        }
    }

    pub fn with_min_score(mut self, min_score: f32) -> Self {
        self.min_score = Some(min_score);
        self
    }

    pub(crate) fn check_dimensions(&self, expected: usize) -> Result<(), StoreError> {
        if self.vector.len() != expected {
            return Err(StoreError::Dimension {
                expected,
                actual: self.vector.len(),
            });
        }
        Ok(())
    }

    pub(crate) fn admits(&self, score: f32) -> bool {
        self.min_score.map_or(true, |min| score >= min)
    }
}

/// Order by descending score, then ascending `(source_file, chunk_index)`, and keep `top_k`.
pub fn rank(mut hits: Vec<ScoredChunk>, top_k: usize) -> Vec<ScoredChunk> {
    hits.sort_by(|left, right| {
        right
            .score
            .partial_cmp(&left.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| left.chunk.key().cmp(&right.chunk.key()))
    });
    hits.truncate(top_k);
    hits
}

/// Fold `(source_file, paper_type, section)` rows into store statistics.
pub fn summarize<'a>(
    rows: impl IntoIterator<Item = (&'a str, PaperType, Option<Section>)>,
) -> StoreStats {
    let mut files = BTreeSet::new();
    let mut buckets: BTreeMap<(PaperType, Option<Section>), usize> = BTreeMap::new();
    let mut total_chunks = 0;

    for (source_file, paper_type, section) in rows {
        total_chunks += 1;
        files.insert(source_file);
        *buckets.entry((paper_type, section)).or_default() += 1;
    }

    StoreStats {
        total_chunks,
        total_files: files.len(),
        breakdown: buckets
            .into_iter()
            .map(|((paper_type, section), count)| StatsBucket {
                paper_type,
                section,
                count,
            })
            .collect(),
    }
}

/// Per-`source_file` locks so concurrent runs never interleave a file's delete-then-upsert.
/// Entries nobody holds or waits on are dropped on the next `acquire`.
#[derive(Debug, Default)]
pub struct SourceLocks {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl SourceLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, source_file: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self
                .locks
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks
                .entry(source_file.to_string())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}
