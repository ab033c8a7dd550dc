//! The sync run: discover, classify, then extract, chunk, embed and upsert
//! each file with its failures contained to that file's result.

use crate::artifacts::ArtifactStore;
use crate::chunking::build_chunks;
use crate::classifier::classify;
use crate::config::PipelineConfig;
use crate::discovery::{discover_pdf_files, file_name, file_stem, FileFilter};
use crate::embeddings::Embedder;
use crate::error::{ConfigError, StoreError, SyncError};
use crate::extractor::TextExtractor;
use crate::models::{
    Classification, EmbeddedChunk, PaperChunk, PaperType, SyncFileResult, SyncOptions,
    SyncRunSummary, SyncStatusReport,
};
use crate::store::SourceLocks;
use crate::traits::VectorStore;
use chrono::Utc;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

const NO_CHUNKS: &str = "No chunks produced from extracted text";

pub struct SyncOrchestrator {
    config: PipelineConfig,
    extractor: TextExtractor,
    embedder: Arc<Embedder>,
    store: Arc<dyn VectorStore>,
    artifacts: ArtifactStore,
    locks: Arc<SourceLocks>,
}

impl SyncOrchestrator {
    pub fn new(
        config: PipelineConfig,
        extractor: TextExtractor,
        embedder: Arc<Embedder>,
        store: Arc<dyn VectorStore>,
    ) -> Self {
        let artifacts = ArtifactStore::new(config.paths.artifact_dir.clone());
        Self {
            config,
            extractor,
            embedder,
            store,
            artifacts,
            locks: Arc::new(SourceLocks::new()),
        }
    }

    /// Share a lock registry with other orchestrators writing the same store.
    pub fn with_locks(mut self, locks: Arc<SourceLocks>) -> Self {
        self.locks = locks;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run one sync over the source directory. Only errors that would recur
    /// for every file are returned; everything else lands in a file result.
    pub async fn run(&self, options: &SyncOptions) -> Result<SyncRunSummary, SyncError> {
        let started_at = Utc::now();
        let clock = Instant::now();

        let filter = self.preflight(options).await?;
        let files = discover_pdf_files(&self.config.paths.source_dir, filter.as_ref());
        info!(
            files = files.len(),
            force = options.force_reprocess,
            source_dir = %self.config.paths.source_dir.display(),
            "sync started"
        );

        let mut results = Vec::with_capacity(files.len());
        for path in &files {
            results.push(self.sync_file(path, options).await);
        }

        let summary = SyncRunSummary::aggregate(started_at, clock.elapsed(), results);
        info!(
            total = summary.total_files,
            processed = summary.processed_files,
            skipped = summary.skipped_files,
            failed = summary.failed_files,
            chunks = summary.total_chunks,
            embeddings = summary.total_embeddings,
            seconds = summary.duration_seconds,
            "sync finished"
        );
        Ok(summary)
    }

    pub async fn status(&self) -> Result<SyncStatusReport, SyncError> {
        let source_dir = &self.config.paths.source_dir;
        let source_pdf_count = if source_dir.is_dir() {
            discover_pdf_files(source_dir, None).len()
        } else {
            0
        };

        Ok(SyncStatusReport {
            source_pdf_count,
            artifact_count: self.artifacts.count().await?,
            store: self.store.stats().await?,
        })
    }

    /// Remove one file's chunks, or every chunk when `source_file` is `None`.
    pub async fn clear(&self, source_file: Option<&str>) -> Result<usize, SyncError> {
        let removed = match source_file {
            Some(source_file) => {
                let _guard = self.locks.acquire(source_file).await;
                self.store.delete_source(source_file).await?
            }
            None => self.store.delete_all().await?,
        };
        info!(source_file = source_file.unwrap_or("*"), removed, "cleared vector store");
        Ok(removed)
    }

    async fn preflight(&self, options: &SyncOptions) -> Result<Option<FileFilter>, SyncError> {
        self.config.validate()?;
        self.embedder.ensure_dimensions(self.store.dimensions())?;

        let source_dir = &self.config.paths.source_dir;
        if !source_dir.is_dir() {
            return Err(SyncError::SourceDirectory(source_dir.display().to_string()));
        }

        let filter = options
            .file_filter
            .as_deref()
            .map(FileFilter::new)
            .transpose()?;

        self.artifacts.ensure_dir().await.map_err(|error| {
            SyncError::ArtifactDirectory(format!("{}: {error}", self.artifacts.dir().display()))
        })?;
        self.store.ensure_ready().await.map_err(|error| match error {
            StoreError::Dimension { expected, actual } => {
                SyncError::Configuration(ConfigError::DimensionMismatch {
                    embedder: expected,
                    store: actual,
                })
            }
            other => SyncError::StoreUnavailable(other),
        })?;

        let observed = self
            .embedder
            .observed_dimensions()
            .await
            .map_err(SyncError::ProviderUnavailable)?;
        if observed != self.store.dimensions() {
            return Err(ConfigError::DimensionMismatch {
                embedder: observed,
                store: self.store.dimensions(),
            }
            .into());
        }
        Ok(filter)
    }

    async fn sync_file(&self, path: &Path, options: &SyncOptions) -> SyncFileResult {
        let classification = classify(&file_name(path));

        if let Some(reason) = classification.skip_reason {
            info!(file = %classification.filename, %reason, "skipping file");
            return SyncFileResult::skipped(&classification, reason.to_string());
        }

        let Some(paper_type) = classification.paper_type else {
            return SyncFileResult::skipped(&classification, "No paper type");
        };

        match self.process(path, &classification, paper_type, options).await {
            Ok(result) => {
                info!(
                    file = %result.filename,
                    status = ?result.status,
                    chunks = result.chunks_created,
                    embeddings = result.embeddings_written,
                    reused = result.reused_artifact,
                    "file synced"
                );
                result
            }
            Err(error) => {
                warn!(file = %classification.filename, %error, "file failed");
                SyncFileResult::failed(&classification, error)
            }
        }
    }

    async fn process(
        &self,
        path: &Path,
        classification: &Classification,
        paper_type: PaperType,
        options: &SyncOptions,
    ) -> Result<SyncFileResult, SyncError> {
        let source_file = classification.filename.as_str();
        let stem = file_stem(path);
        let _guard = self.locks.acquire(source_file).await;

        if !options.force_reprocess {
            if let Some(artifact) = self.artifacts.latest(&stem).await? {
                if self.artifacts.is_fresh(&artifact, path).await? {
                    let text = self.artifacts.read(&artifact).await?;
                    let chunks = self.chunk(classification, paper_type, &text);
                    let stored = self.store.count_for_source(source_file).await?;

                    if !chunks.is_empty() && stored == chunks.len() {
                        return Ok(SyncFileResult::success(classification, chunks.len(), 0, true));
                    }

                    debug!(
                        file = source_file,
                        stored,
                        expected = chunks.len(),
                        "stored chunks out of date, re-embedding from artifact"
                    );
                    return self.replace(classification, chunks, true).await;
                }
            }
        }

        let extracted = self.extractor.extract_path(path).await?;
        let artifact = self.artifacts.write(&stem, &extracted.text).await?;
        debug!(
            file = source_file,
            pages = extracted.page_count,
            characters = extracted.character_count,
            artifact = %artifact.display(),
            "text extracted"
        );

        let chunks = self.chunk(classification, paper_type, &extracted.text);
        self.replace(classification, chunks, false).await
    }

    fn chunk(
        &self,
        classification: &Classification,
        paper_type: PaperType,
        text: &str,
    ) -> Vec<PaperChunk> {
        build_chunks(
            &classification.filename,
            paper_type,
            classification.year.as_deref(),
            text,
            self.config.chunking,
        )
    }

    /// Delete every stored row for the file, then embed and upsert batch by
    /// batch. Batches written before a failure stay in the store.
    async fn replace(
        &self,
        classification: &Classification,
        chunks: Vec<PaperChunk>,
        reused_artifact: bool,
    ) -> Result<SyncFileResult, SyncError> {
        let removed = self.store.delete_source(&classification.filename).await?;
        if removed > 0 {
            debug!(file = %classification.filename, removed, "removed previous chunks");
        }

        if chunks.is_empty() {
            return Ok(SyncFileResult::skipped(classification, NO_CHUNKS));
        }

        let mut written = 0;
        for batch in chunks.chunks(self.embedder.batch_size()) {
            let texts: Vec<String> = batch.iter().map(|chunk| chunk.text.clone()).collect();
            let vectors = self.embedder.embed_batch(&texts).await?;
            let rows: Vec<EmbeddedChunk> = batch
                .iter()
                .cloned()
                .zip(vectors)
                .map(|(chunk, vector)| EmbeddedChunk { chunk, vector })
                .collect();
            self.store.upsert(&rows).await?;
            written += rows.len();
        }

        Ok(SyncFileResult::success(
            classification,
            chunks.len(),
            written,
            reused_artifact,
        ))
    }
}
