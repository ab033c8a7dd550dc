//! Filename classification for source papers.
//!
//! Two filename families are recognised, tried in order:
//!
//! * official papers: `2016_GCE-O-LEVEL-ENGLISH-1128-Paper-1.pdf`
//! * school papers: `Sec4_English_2021_SA2_Admiralty_Paper1.pdf`
//!
//! Anything else, answer sheets included, becomes a skip decision.

use crate::models::{Classification, PaperType, Section, SkipReason, SourceKind};
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::LazyLock;

const ANSWER_SHEET_MARKER: &str = "_ans";

static OFFICIAL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?P<year>\d{4})_GCE-O-LEVEL-ENGLISH-(?P<code>\d+)-Paper-(?P<paper>\d+)")
        .expect("official filename pattern is valid")
});

static SCHOOL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^Sec(?P<level>\d)_English_(?P<year>\d{4})_(?P<term>[^_]+)_(?P<school>.+?)_Paper(?P<paper>\d+)",
    )
    .expect("school filename pattern is valid")
});

static PAPER_DESIGNATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)paper[-_ ]?(\d+)").expect("paper designation pattern is valid")
});

/// Classify a filename. Pure and infallible: the worst outcome is a skip.
pub fn classify(filename: &str) -> Classification {
    let mut result = Classification {
        filename: filename.to_string(),
        paper_type: None,
        section: None,
        year: None,
        is_answer_sheet: false,
        skip_reason: None,
        source_kind: None,
        exam_code: None,
        school: None,
        term: None,
    };

    if filename.to_lowercase().contains(ANSWER_SHEET_MARKER) {
        result.is_answer_sheet = true;
        result.skip_reason = Some(SkipReason::AnswerSheet);
        return result;
    }

    let paper_number = if let Some(captures) = OFFICIAL_PATTERN.captures(filename) {
        result.source_kind = Some(SourceKind::GceOfficial);
        result.year = Some(captures["year"].to_string());
        result.exam_code = Some(captures["code"].to_string());
        captures["paper"].parse::<u32>().ok()
    } else if let Some(captures) = SCHOOL_PATTERN.captures(filename) {
        result.source_kind = Some(SourceKind::SchoolPaper);
        result.year = Some(captures["year"].to_string());
        result.term = Some(captures["term"].to_uppercase());
        result.school = Some(captures["school"].to_lowercase());
        captures["paper"].parse::<u32>().ok()
    } else {
        None
    };

    result.paper_type = paper_number
        .filter(|_| has_single_designation(filename))
        .and_then(PaperType::from_number);

    if result.paper_type.is_none() {
        result.skip_reason = Some(SkipReason::NoPaperDesignation);
    }

    result
}

fn has_single_designation(filename: &str) -> bool {
    let numbers = PAPER_DESIGNATION
        .captures_iter(filename)
        .map(|captures| captures[1].to_string())
        .collect::<BTreeSet<_>>();
    numbers.len() == 1
}

/// Assign a section from the content of a chunk, if it says which one it is.
pub fn detect_section(text: &str) -> Option<Section> {
    static EXPLICIT: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?i)section\s*([abc])\s*[\[(]").expect("section marker pattern is valid")
    });

    if let Some(captures) = EXPLICIT.captures(text) {
        return captures[1].parse().ok();
    }

    let lowered = text.to_lowercase();
    if lowered.contains("editing") && lowered.contains("grammatical") {
        return Some(Section::SectionA);
    }
    if lowered.contains("situational writing") || lowered.contains("write an email") {
        return Some(Section::SectionB);
    }
    if lowered.contains("continuous writing") || lowered.contains("write a composition") {
        return Some(Section::SectionC);
    }
    if lowered.contains("visual text") || lowered.contains("advertisement") {
        return Some(Section::SectionA);
    }
    if lowered.contains("summary") && lowered.contains("words") {
        return Some(Section::SectionC);
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn official_pattern_extracts_year_and_paper() {
        let result = classify("2016_GCE-O-LEVEL-ENGLISH-1128-Paper-1.pdf");
        assert!(!result.is_skip());
        assert_eq!(result.paper_type, Some(PaperType::Paper1));
        assert_eq!(result.year.as_deref(), Some("2016"));
        assert_eq!(result.exam_code.as_deref(), Some("1128"));
        assert_eq!(result.source_kind, Some(SourceKind::GceOfficial));
        assert_eq!(result.section, None);
    }

    #[test]
    fn official_pattern_covers_every_encoded_year_and_paper() {
        for year in 2010..2025 {
            for paper in [1u32, 2] {
                let name = format!("{year}_GCE-O-LEVEL-ENGLISH-1128-Paper-{paper}.pdf");
                let result = classify(&name);
                assert_eq!(result.year, Some(year.to_string()), "{name}");
                assert_eq!(result.paper_type, PaperType::from_number(paper), "{name}");
            }
        }
    }

    #[test]
    fn official_pattern_tolerates_timestamp_suffix() {
        let result = classify("2015_GCE-O-LEVEL-ENGLISH-1128-Paper-2-20251107-164330.txt");
        assert_eq!(result.paper_type, Some(PaperType::Paper2));
        assert_eq!(result.year.as_deref(), Some("2015"));
    }

    #[test]
    fn school_pattern_extracts_metadata() {
        let result = classify("Sec4_English_2021_SA2_Admiralty_Paper2.pdf");
        assert!(!result.is_skip());
        assert_eq!(result.paper_type, Some(PaperType::Paper2));
        assert_eq!(result.year.as_deref(), Some("2021"));
        assert_eq!(result.school.as_deref(), Some("admiralty"));
        assert_eq!(result.term.as_deref(), Some("SA2"));
        assert_eq!(result.source_kind, Some(SourceKind::SchoolPaper));
    }

    #[test]
    fn multi_word_school_names_are_kept_whole() {
        let result = classify("Sec4_English_2021_SA2_St_Andrews_Paper1.pdf");
        assert_eq!(result.paper_type, Some(PaperType::Paper1));
        assert_eq!(result.school.as_deref(), Some("st_andrews"));
        assert_eq!(result.term.as_deref(), Some("SA2"));
    }

    #[test]
    fn answer_sheets_are_always_skipped() {
        for name in [
            "Sec4_English_2021_SA2_Admiralty_Ans.pdf",
            "Sec4_English_2021_SA2_Admiralty_Paper1_ANS.pdf",
            "2016_GCE-O-LEVEL-ENGLISH-1128-Paper-1_Answers.pdf",
        ] {
            let result = classify(name);
            assert!(result.is_answer_sheet, "{name}");
            assert_eq!(result.skip_reason, Some(SkipReason::AnswerSheet), "{name}");
            assert_eq!(result.skip_reason.map(|r| r.to_string()).as_deref(), Some("Answer sheet"));
        }
    }

    #[test]
    fn unrecognised_or_ambiguous_names_are_skipped() {
        for name in [
            "random_scan.pdf",
            "Sec4_English_2021_SA2_Admiralty.pdf",
            "2016_GCE-O-LEVEL-ENGLISH-1128-Paper-3.pdf",
            "Sec4_English_2021_SA2_Admiralty_Paper1_Paper2.pdf",
        ] {
            let result = classify(name);
            assert_eq!(result.skip_reason, Some(SkipReason::NoPaperDesignation), "{name}");
            assert_eq!(result.paper_type, None, "{name}");
        }
    }

    #[test]
    fn sections_come_from_markers_before_cues() {
        assert_eq!(detect_section("SECTION B [30 marks]"), Some(Section::SectionB));
        assert_eq!(
            detect_section("Section C (Continuous Writing) write an email"),
            Some(Section::SectionC)
        );
        assert_eq!(
            detect_section("Editing: find the grammatical errors."),
            Some(Section::SectionA)
        );
        assert_eq!(detect_section("Write a summary in 80 words."), Some(Section::SectionC));
        assert_eq!(detect_section("An ordinary sentence."), None);
    }
}
