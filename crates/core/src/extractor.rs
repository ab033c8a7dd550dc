use crate::config::{OcrConfig, OcrProviderKind};
use crate::error::{ConfigError, ExtractionError};
use crate::models::ExtractedText;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use lopdf::Document;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct PageText {
    pub number: u32,
    pub text: String,
}

/// One page of a source PDF, re-serialized as a standalone single-page PDF.
#[derive(Debug, Clone)]
pub struct PageImage {
    pub source: String,
    pub number: u32,
    pub pdf: Vec<u8>,
}

#[async_trait]
pub trait OcrEngine: Send + Sync {
    async fn recognize(&self, page: &PageImage) -> Result<String, ExtractionError>;
}

/// Reads the text layer embedded in the page.
#[derive(Debug, Default)]
pub struct TextLayerOcr;

#[async_trait]
impl OcrEngine for TextLayerOcr {
    async fn recognize(&self, page: &PageImage) -> Result<String, ExtractionError> {
        let document = Document::load_mem(&page.pdf)
            .map_err(|error| ExtractionError::PdfParse(error.to_string()))?;
        let numbers = document.get_pages().keys().copied().collect::<Vec<_>>();
        document
            .extract_text(&numbers)
            .map_err(|error| ExtractionError::PdfParse(error.to_string()))
    }
}

#[derive(Debug, Clone, Serialize)]
struct LlmOcrRequest<'a> {
    pdf_base64: String,
    source_path: &'a str,
    page: u32,
    language: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
struct LlmOcrResponse {
    pages: Option<Vec<LlmOcrPage>>,
    text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct LlmOcrPage {
    #[serde(default)]
    text: Option<String>,
}

/// Posts each page to a multimodal OCR endpoint.
pub struct HttpOcr {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
    language: String,
}

impl HttpOcr {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: Option<String>,
        language: impl Into<String>,
    ) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.into(),
            api_key,
            language: language.into(),
        }
    }
}

#[async_trait]
impl OcrEngine for HttpOcr {
    async fn recognize(&self, page: &PageImage) -> Result<String, ExtractionError> {
        let payload = LlmOcrRequest {
            pdf_base64: STANDARD.encode(&page.pdf),
            source_path: &page.source,
            page: page.number,
            language: &self.language,
        };

        let mut request = self.client.post(&self.endpoint).json(&payload);
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(ExtractionError::OcrFailed(format!(
                "OCR request to {} returned {}",
                self.endpoint,
                response.status()
            )));
        }

        let payload: LlmOcrResponse = response.json().await?;
        Ok(payload_text(&payload))
    }
}

fn payload_text(payload: &LlmOcrResponse) -> String {
    if let Some(listed) = &payload.pages {
        let joined = listed
            .iter()
            .filter_map(|page| page.text.as_deref().map(str::trim))
            .filter(|text| !text.is_empty())
            .collect::<Vec<_>>()
            .join("\n");
        if !joined.is_empty() {
            return joined;
        }
    }

    payload
        .text
        .as_deref()
        .map(|raw| {
            raw.split('\u{000c}')
                .map(str::trim)
                .filter(|chunk| !chunk.is_empty())
                .collect::<Vec<_>>()
                .join("\n")
        })
        .unwrap_or_default()
}

/// Build the OCR engine named by the configuration.
pub fn engine_from_config(config: &OcrConfig) -> Result<Arc<dyn OcrEngine>, ConfigError> {
    match config.provider {
        OcrProviderKind::TextLayer => Ok(Arc::new(TextLayerOcr)),
        OcrProviderKind::Http => {
            let endpoint = config
                .endpoint
                .clone()
                .ok_or_else(|| ConfigError::Missing("ocr.endpoint".into()))?;
            Ok(Arc::new(HttpOcr::new(
                endpoint,
                config.api_key.clone(),
                config.language.clone(),
            )))
        }
    }
}

/// Page iteration, per-page OCR with a timeout, and text assembly.
pub struct TextExtractor {
    engine: Arc<dyn OcrEngine>,
    timeout: Duration,
    language: String,
}

impl TextExtractor {
    pub fn new(engine: Arc<dyn OcrEngine>, config: &OcrConfig) -> Self {
        Self {
            engine,
            timeout: Duration::from_secs(config.timeout_secs),
            language: config.language.clone(),
        }
    }

    pub async fn extract_path(&self, path: &Path) -> Result<ExtractedText, ExtractionError> {
        let bytes = tokio::fs::read(path).await?;
        let source = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or_default()
            .to_string();
        self.extract(&source, bytes).await
    }

    pub async fn extract(
        &self,
        source: &str,
        bytes: Vec<u8>,
    ) -> Result<ExtractedText, ExtractionError> {
        let pages = tokio::task::spawn_blocking(move || split_pages(&bytes))
            .await
            .map_err(|error| ExtractionError::PdfParse(error.to_string()))??;

        if pages.is_empty() {
            return Err(ExtractionError::NoPages(source.to_string()));
        }

        let page_count = pages.len() as u32;
        let mut texts = Vec::with_capacity(pages.len());
        for (number, pdf) in pages {
            let page = PageImage {
                source: source.to_string(),
                number,
                pdf,
            };
            debug!(source, page = number, "recognizing page");

            let text = tokio::time::timeout(self.timeout, self.engine.recognize(&page))
                .await
                .map_err(|_| ExtractionError::Timeout {
                    page: number,
                    seconds: self.timeout.as_secs(),
                })??;
            texts.push(PageText { number, text });
        }

        let text = join_pages(&texts);
        if text.is_empty() {
            return Err(ExtractionError::EmptyText(source.to_string()));
        }

        let character_count = text.chars().count();
        info!(source, page_count, character_count, "extraction complete");

        Ok(ExtractedText {
            text,
            page_count,
            character_count,
            language: self.language.clone(),
        })
    }
}

/// Trimmed page texts separated by a single newline; blank pages contribute nothing.
pub fn join_pages(pages: &[PageText]) -> String {
    pages
        .iter()
        .map(|page| page.text.trim())
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn split_pages(bytes: &[u8]) -> Result<Vec<(u32, Vec<u8>)>, ExtractionError> {
    let document =
        Document::load_mem(bytes).map_err(|error| ExtractionError::PdfParse(error.to_string()))?;
    let numbers = document.get_pages().keys().copied().collect::<Vec<_>>();

    let mut pages = Vec::with_capacity(numbers.len());
    for &number in &numbers {
        let others = numbers
            .iter()
            .copied()
            .filter(|other| *other != number)
            .collect::<Vec<_>>();

        let mut single = document.clone();
        single.delete_pages(&others);
        single.prune_objects();

        let mut buffer = Vec::new();
        single
            .save_to(&mut buffer)
            .map_err(|error| ExtractionError::PdfParse(error.to_string()))?;
        pages.push((number, buffer));
    }

    Ok(pages)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{sample_pdf, ScriptedOcr};
    use httpmock::prelude::*;
    use serde_json::json;

    struct SlowOcr;

    #[async_trait]
    impl OcrEngine for SlowOcr {
        async fn recognize(&self, _page: &PageImage) -> Result<String, ExtractionError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(String::new())
        }
    }

    struct BlankOcr;

    #[async_trait]
    impl OcrEngine for BlankOcr {
        async fn recognize(&self, _page: &PageImage) -> Result<String, ExtractionError> {
            Ok("   \n ".to_string())
        }
    }

    fn extractor(engine: Arc<dyn OcrEngine>) -> TextExtractor {
        TextExtractor::new(engine, &OcrConfig::default())
    }

    #[test]
    fn pages_join_with_a_single_newline() {
        let pages = vec![
            PageText { number: 1, text: "  First page\n".to_string() },
            PageText { number: 2, text: "\n\n".to_string() },
            PageText { number: 3, text: "Third page".to_string() },
        ];
        assert_eq!(join_pages(&pages), "First page\nThird page");
    }

    #[tokio::test]
    async fn extract_iterates_every_page_and_counts() {
        let engine = Arc::new(ScriptedOcr::default());
        let pdf = sample_pdf(&["one", "two", "three"]);

        let extracted = extractor(engine.clone())
            .extract("paper.pdf", pdf)
            .await
            .expect("extraction succeeds");

        assert_eq!(extracted.page_count, 3);
        assert_eq!(engine.calls(), 3);
        assert!(extracted.text.starts_with("Page 1 of the paper."));
        assert!(extracted.text.contains("on page 1.\nPage 2 of the paper."));
        assert_eq!(extracted.character_count, extracted.text.chars().count());
        assert_eq!(extracted.language, "en");
    }

    #[tokio::test]
    async fn invalid_pdf_is_an_extraction_error() {
        let error = extractor(Arc::new(ScriptedOcr::default()))
            .extract("broken.pdf", b"%PDF-1.4\n%broken".to_vec())
            .await
            .expect_err("broken pdf");
        assert!(matches!(error, ExtractionError::PdfParse(_)));
    }

    #[tokio::test]
    async fn blank_recognition_is_an_extraction_error() {
        let error = extractor(Arc::new(BlankOcr))
            .extract("blank.pdf", sample_pdf(&["x"]))
            .await
            .expect_err("nothing recognized");
        assert!(matches!(error, ExtractionError::EmptyText(_)));
    }

    #[tokio::test]
    async fn slow_pages_time_out() {
        let config = OcrConfig {
            timeout_secs: 1,
            ..OcrConfig::default()
        };
        let error = TextExtractor::new(Arc::new(SlowOcr), &config)
            .extract("slow.pdf", sample_pdf(&["x"]))
            .await
            .expect_err("timed out");
        assert!(matches!(error, ExtractionError::Timeout { page: 1, seconds: 1 }));
    }

    #[tokio::test]
    async fn text_layer_reads_embedded_text() {
        let text = TextLayerOcr
            .recognize(&PageImage {
                source: "layer.pdf".to_string(),
                number: 1,
                pdf: sample_pdf(&["Hello examiner"]),
            })
            .await
            .expect("text layer readable");
        assert!(text.contains("Hello examiner"));
    }

    #[tokio::test]
    async fn http_ocr_posts_page_and_reads_listed_pages() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/ocr")
                    .header("authorization", "Bearer ocr-key")
                    .json_body_partial(r#"{ "source_path": "scan.pdf", "page": 1 }"#);
                then.status(200).json_body(json!({
                    "pages": [
                        { "page": 1, "text": "  " },
                        { "page": 1, "text": "Recognised line" }
                    ]
                }));
            })
            .await;

        let ocr = HttpOcr::new(server.url("/ocr"), Some("ocr-key".to_string()), "en");
        let text = ocr
            .recognize(&PageImage {
                source: "scan.pdf".to_string(),
                number: 1,
                pdf: sample_pdf(&["x"]),
            })
            .await
            .expect("ocr succeeds");

        mock.assert_async().await;
        assert_eq!(text, "Recognised line");
    }

    #[test]
    fn ocr_payload_fallback_text_split_by_form_feed() {
        let response = LlmOcrResponse {
            pages: None,
            text: Some("First\u{000C}Second\n".to_string()),
        };
        assert_eq!(payload_text(&response), "First\nSecond");
    }
}
