//! Pinecone vector store backend.
//!
//! Provides [`PineconeVectorStore`] which implements [`VectorStore`] against
//! the Pinecone data-plane REST API using [reqwest](https://docs.rs/reqwest).
//! Every user gets their own Pinecone namespace.
//!
//! # Example
//!
//! ```rust,ignore
//! use docqa_rag::pinecone::PineconeVectorStore;
//!
//! let store = PineconeVectorStore::new("pc-...", "my-index-abc123.svc.pinecone.io")?;
//! store.upsert("user-1", &records).await?;
//! let matches = store.query("user-1", &query_embedding, 10, None).await?;
//! ```

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, error};

use crate::document::{MetadataFilter, VectorMatch, VectorMetadata, VectorRecord};
use crate::error::{RagError, Result};
use crate::vectorstore::VectorStore;

const BACKEND: &str = "Pinecone";
const API_VERSION: &str = "2024-07";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// A [`VectorStore`] backed by a [Pinecone](https://www.pinecone.io/) serverless index.
pub struct PineconeVectorStore {
    client: reqwest::Client,
    api_key: String,
    host: String,
}

impl PineconeVectorStore {
    /// Create a store for the index served at `index_host`.
    ///
    /// A host without a scheme is reached over `https://`.
    pub fn new(api_key: impl Into<String>, index_host: impl AsRef<str>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(RagError::InvalidConfiguration(
                "Pinecone API key must not be empty".to_string(),
            ));
        }
        let host = normalize_host(index_host.as_ref())?;
        Ok(Self { client: build_client(DEFAULT_TIMEOUT)?, api_key, host })
    }

    /// Create a store from `PINECONE_API_KEY` and `PINECONE_INDEX_HOST`.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("PINECONE_API_KEY").map_err(|_| {
            RagError::InvalidConfiguration("PINECONE_API_KEY environment variable not set".into())
        })?;
        let host = std::env::var("PINECONE_INDEX_HOST").map_err(|_| {
            RagError::InvalidConfiguration(
                "PINECONE_INDEX_HOST environment variable not set".into(),
            )
        })?;
        Self::new(api_key, host)
    }

    /// Set the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self> {
        self.client = build_client(timeout)?;
        Ok(self)
    }

    /// The base URL requests are sent to.
    pub fn host(&self) -> &str {
        &self.host
    }

    async fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<reqwest::Response> {
        let response = self
            .client
            .post(format!("{}{path}", self.host))
            .header("Api-Key", &self.api_key)
            .header("X-Pinecone-API-Version", API_VERSION)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                error!(backend = BACKEND, path, error = %e, "request failed");
                RagError::retrieval(BACKEND, format!("request to {path} failed: {e}"))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!(backend = BACKEND, path, %status, "API error");
            return Err(RagError::retrieval(BACKEND, format!("{path} returned {status}: {body}")));
        }
        Ok(response)
    }
}

fn build_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder().timeout(timeout).build().map_err(|e| {
        RagError::InvalidConfiguration(format!("failed to build Pinecone HTTP client: {e}"))
    })
}

fn normalize_host(host: &str) -> Result<String> {
    let host = host.trim().trim_end_matches('/');
    if host.is_empty() {
        return Err(RagError::InvalidConfiguration(
            "Pinecone index host must not be empty".to_string(),
        ));
    }
    if host.starts_with("http://") || host.starts_with("https://") {
        Ok(host.to_string())
    } else {
        Ok(format!("https://{host}"))
    }
}

// ── Pinecone API request/response types ────────────────────────────

#[derive(Serialize)]
struct UpsertRequest<'a> {
    vectors: &'a [VectorRecord],
    namespace: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    namespace: &'a str,
    vector: &'a [f32],
    top_k: usize,
    include_metadata: bool,
    include_values: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    filter: Option<serde_json::Value>,
}

#[derive(Serialize)]
struct DeleteRequest<'a> {
    ids: &'a [String],
    namespace: &'a str,
}

#[derive(Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<PineconeMatch>,
}

#[derive(Deserialize)]
struct PineconeMatch {
    id: String,
    score: f32,
    metadata: Option<PineconeMetadata>,
}

/// Metadata as Pinecone returns it: every number comes back as a float.
#[derive(Deserialize)]
struct PineconeMetadata {
    document_id: String,
    user_id: String,
    filename: String,
    page_num: f64,
    chunk_index: f64,
    text: String,
    timestamp: DateTime<Utc>,
}

fn filter_json(filter: &MetadataFilter) -> serde_json::Value {
    json!({ "document_id": { "$eq": filter.document_id } })
}

fn whole_number<T: TryFrom<u64>>(value: f64, field: &str) -> std::result::Result<T, String> {
    if value < 0.0 || value.fract() != 0.0 || value > u64::MAX as f64 {
        return Err(format!("{field} is not a non-negative integer: {value}"));
    }
    T::try_from(value as u64).map_err(|_| format!("{field} out of range: {value}"))
}

impl PineconeMatch {
    fn into_vector_match(self) -> Result<VectorMatch> {
        let id = self.id;
        let invalid = |message: String| RagError::retrieval(BACKEND, format!("match '{id}': {message}"));
        let metadata = self.metadata.ok_or_else(|| invalid("missing metadata".to_string()))?;
        let page_num = whole_number(metadata.page_num, "page_num").map_err(&invalid)?;
        let chunk_index = whole_number(metadata.chunk_index, "chunk_index").map_err(&invalid)?;
        Ok(VectorMatch {
            score: self.score,
            metadata: VectorMetadata {
                document_id: metadata.document_id,
                user_id: metadata.user_id,
                filename: metadata.filename,
                page_num,
                chunk_index,
                text: metadata.text,
                timestamp: metadata.timestamp,
            },
            id,
        })
    }
}

#[async_trait]
impl VectorStore for PineconeVectorStore {
    fn name(&self) -> &str {
        BACKEND
    }

    async fn upsert(&self, namespace: &str, records: &[VectorRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        self.post("/vectors/upsert", &UpsertRequest { vectors: records, namespace }).await?;
        debug!(backend = BACKEND, namespace, count = records.len(), "upserted vectors");
        Ok(())
    }

    async fn query(
        &self,
        namespace: &str,
        embedding: &[f32],
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<VectorMatch>> {
        let request = QueryRequest {
            namespace,
            vector: embedding,
            top_k,
            include_metadata: true,
            include_values: false,
            filter: filter.map(filter_json),
        };
        let response: QueryResponse = self.post("/query", &request).await?.json().await.map_err(|e| {
            error!(backend = BACKEND, error = %e, "failed to parse query response");
            RagError::retrieval(BACKEND, format!("failed to parse query response: {e}"))
        })?;

        let matches = response
            .matches
            .into_iter()
            .map(PineconeMatch::into_vector_match)
            .collect::<Result<Vec<_>>>()?;
        debug!(backend = BACKEND, namespace, match_count = matches.len(), "queried vectors");
        Ok(matches)
    }

    async fn delete(&self, namespace: &str, ids: &[String]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        self.post("/vectors/delete", &DeleteRequest { ids, namespace }).await?;
        debug!(backend = BACKEND, namespace, count = ids.len(), "deleted vectors");
        Ok(())
    }
}
