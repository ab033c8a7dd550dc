use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PaperType {
    #[serde(rename = "paper_1")]
    Paper1,
    #[serde(rename = "paper_2")]
    Paper2,
}

impl PaperType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Paper1 => "paper_1",
            Self::Paper2 => "paper_2",
        }
    }

    pub fn from_number(number: u32) -> Option<Self> {
        match number {
            1 => Some(Self::Paper1),
            2 => Some(Self::Paper2),
            _ => None,
        }
    }
}

impl fmt::Display for PaperType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaperType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "paper_1" | "paper1" | "1" => Ok(Self::Paper1),
            "paper_2" | "paper2" | "2" => Ok(Self::Paper2),
            other => Err(format!("unknown paper type: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Section {
    SectionA,
    SectionB,
    SectionC,
}

impl Section {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SectionA => "section_a",
            Self::SectionB => "section_b",
            Self::SectionC => "section_c",
        }
    }

    pub fn letter(self) -> char {
        match self {
            Self::SectionA => 'A',
            Self::SectionB => 'B',
            Self::SectionC => 'C',
        }
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Section {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "section_a" | "a" => Ok(Self::SectionA),
            "section_b" | "b" => Ok(Self::SectionB),
            "section_c" | "c" => Ok(Self::SectionC),
            other => Err(format!("unknown section: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    GceOfficial,
    SchoolPaper,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    AnswerSheet,
    NoPaperDesignation,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AnswerSheet => f.write_str("Answer sheet"),
            Self::NoPaperDesignation => f.write_str("No clear Paper1/Paper2 designation"),
        }
    }
}

/// Metadata inferred from a source filename, or the reason it is not synced.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Classification {
    pub filename: String,
    pub paper_type: Option<PaperType>,
    pub section: Option<Section>,
    pub year: Option<String>,
    pub is_answer_sheet: bool,
    pub skip_reason: Option<SkipReason>,
    pub source_kind: Option<SourceKind>,
    pub exam_code: Option<String>,
    pub school: Option<String>,
    pub term: Option<String>,
}

impl Classification {
    pub fn is_skip(&self) -> bool {
        self.skip_reason.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExtractedText {
    pub text: String,
    pub page_count: u32,
    pub character_count: usize,
    pub language: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PaperChunk {
    pub source_file: String,
    pub chunk_index: u64,
    pub text: String,
    pub paper_type: PaperType,
    pub section: Option<Section>,
    pub year: Option<String>,
}

impl PaperChunk {
    pub fn key(&self) -> (&str, u64) {
        (self.source_file.as_str(), self.chunk_index)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbeddedChunk {
    pub chunk: PaperChunk,
    pub vector: Vec<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub struct QueryFilters {
    pub paper_type: Option<PaperType>,
    pub section: Option<Section>,
    pub year: Option<String>,
}

impl QueryFilters {
    pub fn matches(&self, chunk: &PaperChunk) -> bool {
        self.paper_type.map_or(true, |paper_type| chunk.paper_type == paper_type)
            && self.section.map_or(true, |section| chunk.section == Some(section))
            && self
                .year
                .as_ref()
                .map_or(true, |year| chunk.year.as_ref() == Some(year))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoredChunk {
    pub chunk: PaperChunk,
    pub score: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatsBucket {
    pub paper_type: PaperType,
    pub section: Option<Section>,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct StoreStats {
    pub total_chunks: usize,
    pub total_files: usize,
    pub breakdown: Vec<StatsBucket>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Success,
    Skipped,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SyncFileResult {
    pub filename: String,
    pub status: SyncStatus,
    pub paper_type: Option<PaperType>,
    pub year: Option<String>,
    pub chunks_created: usize,
    pub embeddings_written: usize,
    pub reused_artifact: bool,
    pub skip_reason: Option<String>,
    pub error_message: Option<String>,
}

impl SyncFileResult {
    pub fn skipped(classification: &Classification, reason: impl Into<String>) -> Self {
        Self {
            filename: classification.filename.clone(),
            status: SyncStatus::Skipped,
            paper_type: classification.paper_type,
            year: classification.year.clone(),
            chunks_created: 0,
            embeddings_written: 0,
            reused_artifact: false,
            skip_reason: Some(reason.into()),
            error_message: None,
        }
    }

    pub fn failed(classification: &Classification, error: impl fmt::Display) -> Self {
        Self {
            filename: classification.filename.clone(),
            status: SyncStatus::Failed,
            paper_type: classification.paper_type,
            year: classification.year.clone(),
            chunks_created: 0,
            embeddings_written: 0,
            reused_artifact: false,
            skip_reason: None,
            error_message: Some(error.to_string()),
        }
    }

    pub fn success(
        classification: &Classification,
        chunks_created: usize,
        embeddings_written: usize,
        reused_artifact: bool,
    ) -> Self {
        Self {
            filename: classification.filename.clone(),
            status: SyncStatus::Success,
            paper_type: classification.paper_type,
            year: classification.year.clone(),
            chunks_created,
            embeddings_written,
            reused_artifact,
            skip_reason: None,
            error_message: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SyncRunSummary {
    pub total_files: usize,
    pub processed_files: usize,
    pub skipped_files: usize,
    pub failed_files: usize,
    pub total_chunks: usize,
    pub total_embeddings: usize,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_seconds: f64,
    pub file_results: Vec<SyncFileResult>,
}

impl SyncRunSummary {
    pub fn aggregate(
        started_at: DateTime<Utc>,
        elapsed: std::time::Duration,
        file_results: Vec<SyncFileResult>,
    ) -> Self {
        let mut summary = Self {
            total_files: file_results.len(),
            processed_files: 0,
            skipped_files: 0,
            failed_files: 0,
            total_chunks: 0,
            total_embeddings: 0,
            started_at,
            completed_at: Utc::now(),
            duration_seconds: elapsed.as_secs_f64(),
            file_results: Vec::new(),
        };

        for result in &file_results {
            match result.status {
                SyncStatus::Success => {
                    summary.processed_files += 1;
                    summary.total_chunks += result.chunks_created;
                    summary.total_embeddings += result.embeddings_written;
                }
                SyncStatus::Skipped => summary.skipped_files += 1,
                SyncStatus::Failed => summary.failed_files += 1,
            }
        }

        summary.file_results = file_results;
        summary
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SyncOptions {
    pub force_reprocess: bool,
    pub file_filter: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SyncStatusReport {
    pub source_pdf_count: usize,
    pub artifact_count: usize,
    pub store: StoreStats,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PaperFormat {
    #[serde(rename = "paper_1")]
    Paper1,
    #[serde(rename = "paper_2")]
    Paper2,
    Oral,
}

impl PaperFormat {
    /// Equality filter applied to stored chunks. Oral has no stored counterpart.
    pub fn paper_type(self) -> Option<PaperType> {
        match self {
            Self::Paper1 => Some(PaperType::Paper1),
            Self::Paper2 => Some(PaperType::Paper2),
            Self::Oral => None,
        }
    }
}

impl FromStr for PaperFormat {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "oral" => Ok(Self::Oral),
            other => other
                .parse::<PaperType>()
                .map(|paper_type| match paper_type {
                    PaperType::Paper1 => Self::Paper1,
                    PaperType::Paper2 => Self::Paper2,
                })
                .map_err(|_| format!("unknown paper format: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Foundational,
    #[default]
    Standard,
    Advanced,
}

impl Difficulty {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Foundational => "foundational",
            Self::Standard => "standard",
            Self::Advanced => "advanced",
        }
    }

    pub fn descriptors(self) -> &'static str {
        match self {
            Self::Foundational => "basic straightforward accessible",
            Self::Standard => "moderate balanced typical",
            Self::Advanced => "challenging complex sophisticated",
        }
    }
}

impl FromStr for Difficulty {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "foundational" => Ok(Self::Foundational),
            "standard" => Ok(Self::Standard),
            "advanced" => Ok(Self::Advanced),
            other => Err(format!("unknown difficulty: {other}")),
        }
    }
}

/// Section requested by a generation call. Oral components have no stored chunks.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RequestSection {
    Written(Section),
    ReadingAloud,
    Sbc,
    Conversation,
}

impl RequestSection {
    pub fn written(self) -> Option<Section> {
        match self {
            Self::Written(section) => Some(section),
            _ => None,
        }
    }
}

impl FromStr for RequestSection {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "reading_aloud" => Ok(Self::ReadingAloud),
            "sbc" => Ok(Self::Sbc),
            "conversation" => Ok(Self::Conversation),
            other => other
                .parse::<Section>()
                .map(Self::Written)
                .map_err(|_| format!("unknown section: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct RetrievalRequest {
    pub difficulty: Difficulty,
    pub paper_format: PaperFormat,
    pub section: Option<RequestSection>,
    pub topics: Vec<String>,
    pub top_k: Option<usize>,
}

impl RetrievalRequest {
    pub fn new(paper_format: PaperFormat) -> Self {
        Self {
            difficulty: Difficulty::default(),
            paper_format,
            section: None,
            topics: Vec::new(),
            top_k: None,
        }
    }

    pub fn filters(&self) -> QueryFilters {
        QueryFilters {
            paper_type: self.paper_format.paper_type(),
            section: self.section.and_then(RequestSection::written),
            year: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(paper_type: PaperType, section: Option<Section>, year: &str) -> PaperChunk {
        PaperChunk {
            source_file: "a.pdf".to_string(),
            chunk_index: 0,
            text: "text".to_string(),
            paper_type,
            section,
            year: Some(year.to_string()),
        }
    }

    #[test]
    fn filters_match_on_every_supplied_field() {
        let filters = QueryFilters {
            paper_type: Some(PaperType::Paper1),
            section: Some(Section::SectionB),
            year: None,
        };

        assert!(filters.matches(&chunk(PaperType::Paper1, Some(Section::SectionB), "2019")));
        assert!(!filters.matches(&chunk(PaperType::Paper1, None, "2019")));
        assert!(!filters.matches(&chunk(PaperType::Paper2, Some(Section::SectionB), "2019")));
        assert!(QueryFilters::default().matches(&chunk(PaperType::Paper2, None, "2019")));
    }

    #[test]
    fn oral_requests_do_not_filter_by_paper_type() {
        let mut request = RetrievalRequest::new(PaperFormat::Oral);
        request.section = Some(RequestSection::ReadingAloud);
        assert_eq!(request.filters(), QueryFilters::default());

        let mut written = RetrievalRequest::new(PaperFormat::Paper2);
        written.section = Some("section_c".parse().expect("section parses"));
        assert_eq!(written.filters().paper_type, Some(PaperType::Paper2));
        assert_eq!(written.filters().section, Some(Section::SectionC));
    }

    #[test]
    fn summary_counts_by_status() {
        let classification = Classification {
            filename: "x.pdf".to_string(),
            paper_type: Some(PaperType::Paper1),
            section: None,
            year: Some("2016".to_string()),
            is_answer_sheet: false,
            skip_reason: None,
            source_kind: Some(SourceKind::GceOfficial),
            exam_code: None,
            school: None,
            term: None,
        };
        let results = vec![
            SyncFileResult::success(&classification, 4, 4, false),
            SyncFileResult::skipped(&classification, SkipReason::AnswerSheet.to_string()),
            SyncFileResult::failed(&classification, "boom"),
            SyncFileResult::success(&classification, 3, 0, true),
        ];

        let summary =
            SyncRunSummary::aggregate(Utc::now(), std::time::Duration::from_millis(5), results);
        assert_eq!(summary.total_files, 4);
        assert_eq!(summary.processed_files, 2);
        assert_eq!(summary.skipped_files, 1);
        assert_eq!(summary.failed_files, 1);
        assert_eq!(summary.total_chunks, 7);
        assert_eq!(summary.total_embeddings, 4);
        assert_eq!(summary.file_results[2].error_message.as_deref(), Some("boom"));
        assert!(summary.file_results[1].error_message.is_none());
    }
}
