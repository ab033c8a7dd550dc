//! Context retrieval for paper generation.
//!
//! A request is turned into a descriptive query, embedded, and searched with
//! equality filters. When the filtered search comes back short the search is
//! broadened (section dropped, then threshold lowered), and the candidates are
//! rescored with recency, section and paper boosts before the top `k` are kept.

use crate::config::RetrievalConfig;
use crate::embeddings::Embedder;
use crate::error::RetrievalError;
use crate::models::{
    PaperChunk, PaperFormat, QueryFilters, RequestSection, RetrievalRequest, ScoredChunk, Section,
};
use crate::store::SearchRequest;
use crate::traits::VectorStore;
use chrono::{Datelike, Utc};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RankedChunk {
    pub chunk: PaperChunk,
    pub similarity: f32,
    pub adjusted_similarity: f32,
    pub recency_boost: bool,
    pub section_match_boost: bool,
    pub paper_match_boost: bool,
}

pub struct Retriever {
    embedder: Arc<Embedder>,
    store: Arc<dyn VectorStore>,
    config: RetrievalConfig,
    current_year: i32,
}

impl Retriever {
    pub fn new(embedder: Arc<Embedder>, store: Arc<dyn VectorStore>, config: RetrievalConfig) -> Self {
        Self {
            embedder,
            store,
            config,
            current_year: Utc::now().year(),
        }
    }

    /// Pin the year recency boosts are measured from.
    pub fn with_current_year(mut self, year: i32) -> Self {
        self.current_year = year;
        self
    }

    pub async fn retrieve(
        &self,
        request: &RetrievalRequest,
    ) -> Result<Vec<RankedChunk>, RetrievalError> {
        let limit = request.top_k.unwrap_or(self.config.top_k).max(1);
        let query = build_query(request);
        info!(query = %query, limit, "retrieving context");

        let vector = self.embedder.embed_query(&query).await?;
        let filters = request.filters();
        let threshold = self.config.similarity_threshold;
        let broader = QueryFilters {
            section: None,
            ..filters.clone()
        };

        let fetch = limit.saturating_mul(2);
        let mut candidates = Candidates::default();
        candidates.extend(self.search(&vector, &filters, fetch, threshold).await?);

        if candidates.len() < limit && filters.section.is_some() {
            debug!(found = candidates.len(), "broadening search beyond the section");
            candidates.extend(self.search(&vector, &broader, fetch, threshold).await?);
        }

        if candidates.len() < limit {
            let lowered = threshold * self.config.fallback_threshold_factor;
            debug!(found = candidates.len(), threshold = lowered, "lowering similarity threshold");
            candidates.extend(self.search(&vector, &broader, fetch, lowered).await?);
        }

        let mut ranked: Vec<RankedChunk> = candidates
            .hits
            .into_iter()
            .map(|hit| self.rescore(hit, request))
            .collect();
        ranked.sort_by(|left, right| {
            right
                .adjusted_similarity
                .partial_cmp(&left.adjusted_similarity)
                .unwrap_or(Ordering::Equal)
                .then_with(|| left.chunk.key().cmp(&right.chunk.key()))
        });
        ranked.truncate(limit);

        match ranked.first() {
            Some(best) => info!(
                chunks = ranked.len(),
                best = best.adjusted_similarity,
                "retrieved context"
            ),
            None => info!("no context chunks matched"),
        }
        Ok(ranked)
    }

    /// Like [`Retriever::retrieve`], but a collaborator failure means "no context".
    pub async fn retrieve_or_empty(&self, request: &RetrievalRequest) -> Vec<RankedChunk> {
        match self.retrieve(request).await {
            Ok(chunks) => chunks,
            Err(error) => {
                warn!(%error, "context unavailable, continuing without it");
                Vec::new()
            }
        }
    }

    pub async fn context_for(&self, request: &RetrievalRequest) -> String {
        format_context(
            &self.retrieve_or_empty(request).await,
            self.config.max_context_chars,
        )
    }

    async fn search(
        &self,
        vector: &[f32],
        filters: &QueryFilters,
        top_k: usize,
        min_score: f32,
    ) -> Result<Vec<ScoredChunk>, RetrievalError> {
        let request = SearchRequest::new(vector, filters, top_k).with_min_score(min_score);
        Ok(self.store.query(&request).await?)
    }

    fn rescore(&self, hit: ScoredChunk, request: &RetrievalRequest) -> RankedChunk {
        let mut adjusted = hit.score;

        let recency_cutoff = self.current_year - self.config.recency_boost_years;
        let recency_boost = hit
            .chunk
            .year
            .as_deref()
            .and_then(|year| year.trim().parse::<i32>().ok())
            .is_some_and(|year| year >= recency_cutoff);
        if recency_boost {
            adjusted *= self.config.recency_boost_factor;
        }

        let target_section = request.section.and_then(RequestSection::written);
        let section_match_boost = target_section.is_some() && hit.chunk.section == target_section;
        if section_match_boost {
            adjusted *= self.config.section_match_boost;
        }

        let paper_match_boost = request.paper_format.paper_type() == Some(hit.chunk.paper_type);
        if paper_match_boost {
            adjusted *= self.config.paper_match_boost;
        }

        RankedChunk {
            similarity: hit.score,
            adjusted_similarity: adjusted.min(1.0),
            chunk: hit.chunk,
            recency_boost,
            section_match_boost,
            paper_match_boost,
        }
    }
}

#[derive(Default)]
struct Candidates {
    seen: HashSet<(String, u64)>,
    hits: Vec<ScoredChunk>,
}

impl Candidates {
    fn len(&self) -> usize {
        self.hits.len()
    }

    fn extend(&mut self, hits: Vec<ScoredChunk>) {
        for hit in hits {
            let key = (hit.chunk.source_file.clone(), hit.chunk.chunk_index);
            if self.seen.insert(key) {
                self.hits.push(hit);
            }
        }
    }
}

/// Descriptive query text for a generation request.
pub fn build_query(request: &RetrievalRequest) -> String {
    let mut parts: Vec<String> = Vec::new();
    let section = request.section;

    let (intro, focus) = match request.paper_format {
        PaperFormat::Paper1 => (
            "GCE O-Level English Paper 1 Writing examination",
            match section.and_then(RequestSection::written) {
                Some(Section::SectionA) => "Section A Editing grammatical errors passage proofreading spelling punctuation verb tense",
                Some(Section::SectionB) => "Section B Situational Writing formal email letter report speech proposal audience purpose register",
                Some(Section::SectionC) => "Section C Continuous Writing composition essay narrative descriptive argumentative expository reflective",
                None => "Writing skills grammar situational continuous",
            },
        ),
        PaperFormat::Paper2 => (
            "GCE O-Level English Paper 2 Comprehension reading",
            match section.and_then(RequestSection::written) {
                Some(Section::SectionA) => "Section A Visual Text comprehension advertisement poster infographic inference persuasive technique",
                Some(Section::SectionB) => "Section B Reading Comprehension passage questions inference vocabulary writer's craft language effect",
                Some(Section::SectionC) => "Section C Summary guided comprehension paraphrasing key points own words",
                None => "Comprehension inference summary vocabulary analysis",
            },
        ),
        PaperFormat::Oral => (
            "GCE O-Level English Oral Communication spoken",
            match section {
                Some(RequestSection::ReadingAloud) => "Reading Aloud passage pronunciation fluency expression articulation",
                Some(RequestSection::Sbc) => "Stimulus-Based Conversation discussion visual prompt opinion analysis",
                Some(RequestSection::Conversation) => "General Conversation themes topics personal experience opinion",
                _ => "Speaking oral reading conversation discussion",
            },
        ),
    };
    parts.push(intro.to_string());
    parts.push(focus.to_string());

    if !request.topics.is_empty() {
        parts.push(format!("Topics and themes: {}", request.topics.join(", ")));
    }

    parts.push(format!(
        "Difficulty: {} {}",
        request.difficulty.as_str(),
        request.difficulty.descriptors()
    ));

    parts.join(" ")
}

/// Render ranked chunks as a reference block for a generation prompt.
/// Returns an empty string when there is nothing to show.
pub fn format_context(chunks: &[RankedChunk], max_chars: usize) -> String {
    if chunks.is_empty() {
        return String::new();
    }

    let mut lines = vec![
        "## Reference Examples from Past Papers".to_string(),
        "Use the following excerpts as reference for tone, structure, and style.".to_string(),
        "Do NOT copy content directly; use them as guidance only.".to_string(),
        "These are ranked by relevance to your current task.".to_string(),
        String::new(),
    ];

    for (position, ranked) in chunks.iter().enumerate() {
        let chunk = &ranked.chunk;
        let mut meta = Vec::new();
        if let Some(year) = chunk.year.as_deref().filter(|year| !year.is_empty()) {
            meta.push(year.to_string());
        }
        meta.push(title_case(chunk.paper_type.as_str()));
        if let Some(section) = chunk.section {
            meta.push(title_case(section.as_str()));
        }
        lines.push(format!("### Reference {} ({})", position + 1, meta.join(", ")));

        let mut relevance = format!("Relevance: {:.0}%", ranked.adjusted_similarity * 100.0);
        let boosts: Vec<&str> = [
            (ranked.recency_boost, "recent"),
            (ranked.section_match_boost, "section match"),
            (ranked.paper_match_boost, "paper match"),
        ]
        .into_iter()
        .filter_map(|(applied, label)| applied.then_some(label))
        .collect();
        if !boosts.is_empty() {
            relevance.push_str(&format!(" ({})", boosts.join(", ")));
        }
        lines.push(relevance);
        lines.push(String::new());

        lines.push(truncate_at_sentence(&chunk.text, max_chars));
        lines.push(String::new());
        lines.push("---".to_string());
        lines.push(String::new());
    }

    lines.join("\n")
}

fn title_case(value: &str) -> String {
    value
        .split('_')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

/// Cut to `max_chars`, preferring a full stop in the last 30% of the budget.
fn truncate_at_sentence(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }

    let truncated: String = text.chars().take(max_chars).collect();
    let sentence_end = truncated
        .char_indices()
        .filter(|(_, ch)| *ch == '.')
        .last()
        .map(|(byte, _)| byte)
        .filter(|byte| truncated[..*byte].chars().count() as f32 > max_chars as f32 * 0.7);

    match sentence_end {
        Some(byte) => format!("{}...", &truncated[..=byte]),
        None => format!("{truncated}..."),
    }
}
