use crate::classifier::detect_section;
use crate::models::{PaperChunk, PaperType};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::ops::Range;
use std::sync::LazyLock;
use tracing::warn;

pub const DEFAULT_MAX_CHUNK_CHARS: usize = 1_000;

static PARAGRAPH_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n\s*\n").expect("paragraph break pattern is valid"));

static SENTENCE_END: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"[.!?]+["')\]]*\s+"#).expect("sentence end pattern is valid")
});

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ChunkingConfig {
    pub max_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chars: DEFAULT_MAX_CHUNK_CHARS,
        }
    }
}

pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .replace('\u{a0}', " ")
}

/// Split `text` into ordered, non-overlapping pieces of at most `max_chars`
/// characters. Pieces break at sentence or paragraph ends; a sentence longer
/// than the budget is cut at the budget.
pub fn split_text(text: &str, config: ChunkingConfig) -> Vec<String> {
    let max_chars = config.max_chars.max(1);
    let mut pieces = Vec::new();
    let mut current: Option<Range<usize>> = None;

    for span in sentence_spans(text) {
        let span_chars = text[span.clone()].chars().count();

        if span_chars > max_chars {
            if let Some(range) = current.take() {
                pieces.push(text[range].to_string());
            }
            warn!(
                chars = span_chars,
                max_chars, "sentence exceeds chunk budget, hard-splitting"
            );
            pieces.extend(hard_split(&text[span], max_chars));
            continue;
        }

        current = match current.take() {
            None => Some(span),
            Some(range) if text[range.start..span.end].chars().count() <= max_chars => {
                Some(range.start..span.end)
            }
            Some(range) => {
                pieces.push(text[range].to_string());
                Some(span)
            }
        };
    }

    if let Some(range) = current {
        pieces.push(text[range].to_string());
    }

    pieces
}

/// Chunk one source file's extracted text, tagging each chunk with the file's
/// metadata and a content-derived section.
pub fn build_chunks(
    source_file: &str,
    paper_type: PaperType,
    year: Option<&str>,
    text: &str,
    config: ChunkingConfig,
) -> Vec<PaperChunk> {
    split_text(text, config)
        .into_iter()
        .enumerate()
        .map(|(index, piece)| PaperChunk {
            source_file: source_file.to_string(),
            chunk_index: index as u64,
            section: detect_section(&piece),
            text: piece,
            paper_type,
            year: year.map(str::to_string),
        })
        .collect()
}

fn sentence_spans(text: &str) -> Vec<Range<usize>> {
    let mut spans = Vec::new();
    let mut paragraph_start = 0;

    let breaks = PARAGRAPH_BREAK
        .find_iter(text)
        .map(|found| (found.start(), found.end()))
        .chain(std::iter::once((text.len(), text.len())));

    for (paragraph_end, next_start) in breaks {
        let paragraph = &text[paragraph_start..paragraph_end];
        let mut cursor = 0;

        for found in SENTENCE_END.find_iter(paragraph) {
            push_trimmed(&mut spans, text, paragraph_start + cursor..paragraph_start + found.end());
            cursor = found.end();
        }
        push_trimmed(&mut spans, text, paragraph_start + cursor..paragraph_end);

        paragraph_start = next_start;
    }

    spans
}

fn push_trimmed(spans: &mut Vec<Range<usize>>, text: &str, range: Range<usize>) {
    let slice = &text[range.clone()];
    let leading = slice.len() - slice.trim_start().len();
    let trailing = slice.len() - slice.trim_end().len();
    if leading + trailing < slice.len() {
        spans.push(range.start + leading..range.end - trailing);
    }
}

fn hard_split(sentence: &str, max_chars: usize) -> Vec<String> {
    let chars: Vec<char> = sentence.chars().collect();
    chars
        .chunks(max_chars)
        .map(|piece| piece.iter().collect())
        .collect()
}
