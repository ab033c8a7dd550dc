use crate::error::StoreError;
use crate::models::{EmbeddedChunk, PaperChunk, PaperType, QueryFilters, ScoredChunk, Section, StoreStats};
use crate::store::{rank, summarize, SearchRequest};
use crate::traits::VectorStore;
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tracing::debug;
use url::Url;
use uuid::Uuid;

const BACKEND: &str = "qdrant";
const SCROLL_PAGE: usize = 256;
const TIE_MARGIN: usize = 16;

/// Qdrant collection over HTTP. Each chunk is one point whose id is derived from its key.
pub struct QdrantStore {
    base_url: String,
    collection: String,
    api_key: Option<String>,
    client: Client,
    vector_size: usize,
}

#[derive(Deserialize)]
struct Envelope<T> {
    result: T,
}

#[derive(Deserialize)]
struct SearchHit {
    score: f32,
    payload: PaperChunk,
}

#[derive(Deserialize)]
struct CountResult {
    count: usize,
}

#[derive(Deserialize)]
struct ScrollResult {
    points: Vec<ScrollPoint>,
    next_page_offset: Option<Value>,
}

#[derive(Deserialize)]
struct ScrollPoint {
    payload: StatsRow,
}

#[derive(Deserialize)]
struct StatsRow {
    source_file: String,
    paper_type: PaperType,
    section: Option<Section>,
}

impl QdrantStore {
    pub fn new(
        endpoint: &str,
        collection: impl Into<String>,
        api_key: Option<String>,
        vector_size: usize,
    ) -> Result<Self, StoreError> {
        let parsed = Url::parse(endpoint)?;
        Ok(Self {
            base_url: parsed.as_str().trim_end_matches('/').to_string(),
            collection: collection.into(),
            api_key: api_key.filter(|key| !key.is_empty()),
            client: Client::new(),
            vector_size,
        })
    }

    /// Point id for a chunk key; stable across runs so re-upserts overwrite.
    pub fn point_id(source_file: &str, chunk_index: u64) -> Uuid {
        let digest = Sha256::digest(format!("{source_file}:{chunk_index}").as_bytes());
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&digest[..16]);
        Uuid::from_bytes(bytes)
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}/collections/{}{}", self.base_url, self.collection, path);
        let mut request = self.client.request(method, url);
        if let Some(api_key) = &self.api_key {
            request = request.header("api-key", api_key);
        }
        request
    }

    async fn check(response: Response) -> Result<Response, StoreError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(StoreError::BackendResponse {
            backend: BACKEND.to_string(),
            details: format!("{status}: {body}"),
        })
    }

    async fn count(&self, filter: Value) -> Result<usize, StoreError> {
        let response = self
            .request(Method::POST, "/points/count")
            .json(&json!({ "filter": filter, "exact": true }))
            .send()
            .await?;
        let parsed: Envelope<CountResult> = Self::check(response).await?.json().await?;
        Ok(parsed.result.count)
    }

    async fn delete_matching(&self, filter: Value) -> Result<usize, StoreError> {
        let existing = self.count(filter.clone()).await?;
        if existing == 0 {
            return Ok(0);
        }
        let response = self
            .request(Method::POST, "/points/delete")
            .query(&[("wait", true)])
            .json(&json!({ "filter": filter }))
            .send()
            .await?;
        Self::check(response).await?;
        Ok(existing)
    }
}

fn source_filter(source_file: &str) -> Value {
    json!({ "must": [{ "key": "source_file", "match": { "value": source_file } }] })
}

fn query_filter(filters: &QueryFilters) -> Option<Value> {
    let mut must = Vec::new();
    if let Some(paper_type) = filters.paper_type {
        must.push(json!({ "key": "paper_type", "match": { "value": paper_type.as_str() } }));
    }
    if let Some(section) = filters.section {
        must.push(json!({ "key": "section", "match": { "value": section.as_str() } }));
    }
    if let Some(year) = &filters.year {
        must.push(json!({ "key": "year", "match": { "value": year } }));
    }
    (!must.is_empty()).then(|| json!({ "must": must }))
}

#[async_trait]
impl VectorStore for QdrantStore {
    fn dimensions(&self) -> usize {
        self.vector_size
    }

    async fn ensure_ready(&self) -> Result<(), StoreError> {
        let response = self.request(Method::GET, "").send().await?;
        match response.status() {
            StatusCode::OK => {
                let info: Value = response.json().await?;
                let size = info
                    .pointer("/result/config/params/vectors/size")
                    .and_then(Value::as_u64);
                match size {
                    Some(size) if size as usize != self.vector_size => Err(StoreError::Dimension {
                        expected: self.vector_size,
                        actual: size as usize,
                    }),
                    _ => Ok(()),
                }
            }
            StatusCode::NOT_FOUND => {
                debug!(collection = %self.collection, size = self.vector_size, "creating collection");
                let response = self
                    .request(Method::PUT, "")
                    .json(&json!({
                        "vectors": { "size": self.vector_size, "distance": "Cosine" }
                    }))
                    .send()
                    .await?;
                Self::check(response).await.map(|_| ())
            }
            _ => Self::check(response).await.map(|_| ()),
        }
    }

    async fn upsert(&self, chunks: &[EmbeddedChunk]) -> Result<(), StoreError> {
        if chunks.is_empty() {
            return Ok(());
        }

        let points = chunks
            .iter()
            .map(|row| {
                if row.vector.len() != self.vector_size {
                    return Err(StoreError::Dimension {
                        expected: self.vector_size,
                        actual: row.vector.len(),
                    });
                }
                Ok(json!({
                    "id": Self::point_id(&row.chunk.source_file, row.chunk.chunk_index).to_string(),
                    "vector": row.vector,
                    "payload": serde_json::to_value(&row.chunk)?,
                }))
            })
            .collect::<Result<Vec<_>, StoreError>>()?;

        let response = self
            .request(Method::PUT, "/points")
            .query(&[("wait", true)])
            .json(&json!({ "points": points }))
            .send()
            .await?;
        Self::check(response).await?;
        debug!(collection = %self.collection, points = chunks.len(), "points upserted");
        Ok(())
    }

    async fn delete_source(&self, source_file: &str) -> Result<usize, StoreError> {
        self.delete_matching(source_filter(source_file)).await
    }

    async fn delete_all(&self) -> Result<usize, StoreError> {
        self.delete_matching(json!({ "must": [] })).await
    }

    async fn count_for_source(&self, source_file: &str) -> Result<usize, StoreError> {
        self.count(source_filter(source_file)).await
    }

    /// Qdrant cuts results at `limit` in its own order, so a few extra hits are
    /// fetched and the key tie-break is applied locally. Ties wider than
    /// `TIE_MARGIN` at the cutoff are still chosen by the server.
    async fn query(&self, request: &SearchRequest<'_>) -> Result<Vec<ScoredChunk>, StoreError> {
        request.check_dimensions(self.vector_size)?;

        let mut body = json!({
            "vector": request.vector,
            "limit": request.top_k.saturating_add(TIE_MARGIN),
            "with_payload": true,
        });
        if let Some(filter) = query_filter(request.filters) {
            body["filter"] = filter;
        }
        if let Some(min_score) = request.min_score {
            body["score_threshold"] = json!(min_score);
        }

        let response = self
            .request(Method::POST, "/points/search")
            .json(&body)
            .send()
            .await?;
        let parsed: Envelope<Vec<SearchHit>> = Self::check(response).await?.json().await?;
        let hits = parsed
            .result
            .into_iter()
            .map(|hit| ScoredChunk {
                chunk: hit.payload,
                score: hit.score,
            })
            .collect();
        Ok(rank(hits, request.top_k))
    }

    async fn stats(&self) -> Result<StoreStats, StoreError> {
        let mut rows = Vec::new();
        let mut offset: Option<Value> = None;
        loop {
            let mut body = json!({
                "limit": SCROLL_PAGE,
                "with_payload": ["source_file", "paper_type", "section"],
                "with_vector": false,
            });
            if let Some(offset) = offset.take() {
                body["offset"] = offset;
            }

            let response = self
                .request(Method::POST, "/points/scroll")
                .json(&body)
                .send()
                .await?;
            let page: Envelope<ScrollResult> = Self::check(response).await?.json().await?;
            rows.extend(page.result.points.into_iter().map(|point| point.payload));

            match page.result.next_page_offset {
                Some(next) if !next.is_null() => offset = Some(next),
                _ => break,
            }
        }

        Ok(summarize(rows.iter().map(|row| {
            (row.source_file.as_str(), row.paper_type, row.section)
        })))
    }
}
