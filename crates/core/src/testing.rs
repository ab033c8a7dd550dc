//! Fixtures shared by unit tests across modules.

use crate::error::ExtractionError;
use crate::extractor::{OcrEngine, PageImage};
use async_trait::async_trait;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Build a PDF with one page per entry, each carrying its text in a text layer.
pub fn sample_pdf(pages: &[&str]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
        "Encoding" => "WinAnsiEncoding",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => font_id,
        },
    });

    let mut kids: Vec<Object> = Vec::new();
    for text in pages {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 12.into()]),
                Operation::new("Td", vec![72.into(), 720.into()]),
                Operation::new("Tj", vec![Object::string_literal(*text)]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(
            dictionary! {},
            content.encode().expect("content encodes"),
        ));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer).expect("pdf saves");
    buffer
}

/// OCR fake that returns a fixed paragraph per page and fails for chosen sources.
#[derive(Default)]
pub struct ScriptedOcr {
    pub failing_sources: HashSet<String>,
    pub calls: AtomicUsize,
}

impl ScriptedOcr {
    pub fn failing(sources: &[&str]) -> Self {
        Self {
            failing_sources: sources.iter().map(|source| source.to_string()).collect(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OcrEngine for ScriptedOcr {
    async fn recognize(&self, page: &PageImage) -> Result<String, ExtractionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing_sources.contains(&page.source) {
            return Err(ExtractionError::OcrFailed(format!(
                "engine rejected {}",
                page.source
            )));
        }
        Ok(format!(
            "Page {} of the paper. Read the passage and answer the questions that follow.\n\n\
             Write your answers in the spaces provided on page {}.",
            page.number, page.number
        ))
    }
}
