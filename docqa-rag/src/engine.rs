//! Question-answering engine.
//!
//! The [`QaEngine`] coordinates document ingestion (chunk → embed → persist
//! → index) and question answering (context → embed → retrieve → rank →
//! answer → persist) by composing injected collaborators.
//!
//! # Example
//!
//! ```rust,ignore
//! use docqa_rag::{AnswerRequest, QaEngine, RagConfig};
//!
//! let engine = QaEngine::builder()
//!     .config(RagConfig::default())
//!     .embedding_provider(Arc::new(embedder))
//!     .vector_store(Arc::new(InMemoryVectorStore::new()))
//!     .chunk_store(Arc::new(InMemoryChunkStore::new()))
//!     .dialogue_store(Arc::new(InMemoryDialogueStore::new()))
//!     .chunker(Arc::new(chunker))
//!     .answering_model(Arc::new(model))
//!     .build()?;
//!
//! let report = engine.ingest_document("user-1", "report.pdf", &pages).await?;
//! let answer = engine.answer_query(AnswerRequest::new("What changed?", "user-1")).await?;
//! ```

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::chunking::Chunker;
use crate::config::RagConfig;
use crate::context::{ContextBuilder, format_conversation};
use crate::dialogue::{Dialogue, DialogueStore, NewDialogue};
use crate::docstore::ChunkStore;
use crate::document::{
    DeletionReport, DocumentSummary, IngestReport, MetadataFilter, Reference, StoredChunk,
    VectorMatch, VectorRecord, vector_id,
};
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::llm::AnsweringModel;
use crate::prompt::{NO_RESULTS_RESPONSE, SYSTEM_PROMPT, search_input, user_prompt};
use crate::vectorstore::VectorStore;

/// A question to answer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AnswerRequest {
    pub query: String,
    pub user_id: String,
    /// Restrict retrieval to these documents; empty searches all of the user's documents.
    #[serde(default)]
    pub document_ids: Vec<String>,
    /// The dialogue this question follows up on.
    #[serde(default)]
    pub previous_dialogue_id: Option<String>,
}

impl AnswerRequest {
    pub fn new(query: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            user_id: user_id.into(),
            document_ids: Vec::new(),
            previous_dialogue_id: None,
        }
    }

    /// Scope retrieval to the given documents.
    pub fn with_document_ids(mut self, document_ids: Vec<String>) -> Self {
        self.document_ids = document_ids;
        self
    }

    /// Mark the question as a follow-up to an earlier dialogue.
    pub fn following(mut self, dialogue_id: impl Into<String>) -> Self {
        self.previous_dialogue_id = Some(dialogue_id.into());
        self
    }
}

/// The answer to an [`AnswerRequest`], as persisted in the dialogue store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnswerResult {
    pub dialogue_id: String,
    pub query: String,
    pub response: String,
    pub references: Vec<Reference>,
    #[serde(rename = "context_chunks_count")]
    pub reference_count: usize,
    pub searched_document_ids: Vec<String>,
}

/// The document question-answering engine.
///
/// Construct one via [`QaEngine::builder()`]. All collaborators are shared
/// handles, so one engine can serve concurrent requests.
pub struct QaEngine {
    config: RagConfig,
    embedding_provider: Arc<dyn EmbeddingProvider>,
    vector_store: Arc<dyn VectorStore>,
    chunk_store: Arc<dyn ChunkStore>,
    dialogue_store: Arc<dyn DialogueStore>,
    chunker: Arc<dyn Chunker>,
    answering_model: Arc<dyn AnsweringModel>,
    context_builder: ContextBuilder,
}

impl QaEngine {
    /// Create a new [`QaEngineBuilder`].
    pub fn builder() -> QaEngineBuilder {
        QaEngineBuilder::default()
    }

    /// Return a reference to the engine configuration.
    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    /// Return a reference to the context builder.
    pub fn context_builder(&self) -> &ContextBuilder {
        &self.context_builder
    }

    /// Ingest one document: chunk → embed → persist chunks → upsert vectors.
    ///
    /// Vectors are written to the namespace `user_id` with ids
    /// `{document_id}_chunk_{i}`. A document whose pages yield no chunks is
    /// reported with zero counts and nothing is written.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::EmbeddingError`] if embedding fails, times out, or
    /// returns the wrong number of vectors, and the store's error if
    /// persisting or indexing fails.
    /// When indexing fails after the chunks were stored, the chunks and any
    /// vectors already written are removed before the error is returned.
    pub async fn ingest_document(
        &self,
        user_id: &str,
        filename: &str,
        pages: &[String],
    ) -> Result<IngestReport> {
        require_non_blank("user_id", user_id)?;

        let document_id = Uuid::new_v4().to_string();
        let chunks = self.chunker.chunk(pages)?;
        let mut report = IngestReport {
            document_id: document_id.clone(),
            filename: filename.to_string(),
            page_count: pages.len(),
            chunk_count: 0,
            vector_count: 0,
        };
        if chunks.is_empty() {
            info!(
                document.id = %document_id,
                user.id = user_id,
                chunk_count = 0,
                "ingested document (empty)"
            );
            return Ok(report);
        }

        let provider = self.embedding_provider.name();
        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        let embeddings = bounded(
            self.config.embedding_timeout(),
            self.embedding_provider.embed_batch(&texts),
            || RagError::embedding(provider, "embedding request timed out"),
        )
        .await
        .inspect_err(|e| {
            error!(document.id = %document_id, error = %e, "embedding failed during ingestion");
        })?;

        if embeddings.len() != chunks.len() {
            return Err(RagError::embedding(
                provider,
                format!("expected {} embeddings, got {}", chunks.len(), embeddings.len()),
            ));
        }
        if embeddings.iter().any(Vec::is_empty) {
            return Err(RagError::embedding(provider, "provider returned an empty embedding"));
        }

        let stored: Vec<StoredChunk> = chunks
            .into_iter()
            .zip(embeddings)
            .enumerate()
            .map(|(chunk_index, (chunk, embedding))| StoredChunk {
                document_id: document_id.clone(),
                user_id: user_id.to_string(),
                filename: filename.to_string(),
                chunk_index,
                text: chunk.text,
                metadata: chunk.metadata,
                embedding: Some(embedding),
            })
            .collect();

        self.chunk_store.insert_many(&stored).await.inspect_err(|e| {
            error!(document.id = %document_id, error = %e, "chunk insert failed during ingestion");
        })?;

        let timestamp = Utc::now();
        let records: Vec<VectorRecord> =
            stored.iter().filter_map(|c| VectorRecord::from_stored_chunk(c, timestamp)).collect();

        if let Err(e) = self.index_records(user_id, &document_id, &records).await {
            error!(document.id = %document_id, error = %e, "vector upsert failed during ingestion");
            self.discard_partial_ingest(user_id, &document_id, &records).await;
            return Err(e);
        }

        report.chunk_count = stored.len();
        report.vector_count = records.len();
        info!(
            document.id = %document_id,
            user.id = user_id,
            chunk_count = report.chunk_count,
            vector_count = report.vector_count,
            "ingested document"
        );
        Ok(report)
    }

    /// Answer a question from the user's indexed documents.
    ///
    /// A follow-up question is embedded together with the rebuilt
    /// conversation so retrieval stays on topic, while the answering model
    /// sees the literal question. The exchange is always persisted as a new
    /// dialogue; when nothing relevant is found the fixed fallback response
    /// is stored and the model is not called.
    ///
    /// # Errors
    ///
    /// Returns the matching collaborator error if embedding, retrieval,
    /// answering, or persistence fails. A `previous_dialogue_id` that does
    /// not resolve for the caller is not an error: the question is answered
    /// without history and stored without a predecessor.
    pub async fn answer_query(&self, request: AnswerRequest) -> Result<AnswerResult> {
        let AnswerRequest { query, user_id, document_ids, previous_dialogue_id } = request;
        require_non_blank("user_id", &user_id)?;
        require_non_blank("query", &query)?;

        let document_ids: Vec<String> =
            document_ids.into_iter().filter(|id| !id.trim().is_empty()).collect();

        // An unresolved predecessor is dropped: no history, no stored link.
        let (conversation, previous_dialogue_id) = match previous_dialogue_id {
            Some(previous) => {
                let chain =
                    self.dialogue_store.chain(&previous, &user_id, self.config.max_chain_depth).await;
                if chain.last().is_some_and(|d| d.id == previous) {
                    (format_conversation(&chain), Some(previous))
                } else {
                    warn!(
                        user.id = %user_id,
                        dialogue.id = %previous,
                        "previous dialogue unavailable, answering without history"
                    );
                    (String::new(), None)
                }
            }
            None => (String::new(), None),
        };
        debug!(
            user.id = %user_id,
            query_len = query.len(),
            context_len = conversation.len(),
            scoped_documents = document_ids.len(),
            "answering query"
        );

        let embedding = self.embed_query(&search_input(&conversation, &query)).await?;

        let matches = if document_ids.is_empty() {
            self.search(&user_id, &embedding, self.config.unscoped_top_k, None).await?
        } else {
            let searches = document_ids.iter().map(|document_id| {
                let filter = MetadataFilter::document(document_id.clone());
                let embedding = &embedding;
                let user_id = &user_id;
                async move {
                    self.search(user_id, embedding, self.config.scoped_top_k, Some(&filter)).await
                }
            });
            try_join_all(searches).await?.into_iter().flatten().collect()
        };

        let ranked = rank_matches(matches, self.config.context_limit);
        let (response, references) = if ranked.is_empty() {
            info!(user.id = %user_id, "no relevant chunks found");
            (NO_RESULTS_RESPONSE.to_string(), Vec::new())
        } else {
            let (context, references) = assemble_context(&ranked);
            let response = self
                .answering_model
                .complete(
                    SYSTEM_PROMPT,
                    &user_prompt(&context, &query),
                    self.config.answer_max_tokens,
                    self.config.temperature,
                )
                .await
                .inspect_err(|e| error!(user.id = %user_id, error = %e, "answer generation failed"))?;
            (response, references)
        };

        let dialogue_id = self
            .dialogue_store
            .create(NewDialogue {
                user_id: user_id.clone(),
                query: query.clone(),
                references: references.clone(),
                response: response.clone(),
                document_ids: document_ids.clone(),
                previous_dialogue_id,
            })
            .await
            .inspect_err(|e| error!(user.id = %user_id, error = %e, "failed to persist dialogue"))?;

        info!(
            dialogue.id = %dialogue_id,
            user.id = %user_id,
            match_count = references.len(),
            "answered query"
        );

        Ok(AnswerResult {
            dialogue_id,
            query,
            response,
            reference_count: references.len(),
            references,
            searched_document_ids: document_ids,
        })
    }

    async fn index_records(
        &self,
        user_id: &str,
        document_id: &str,
        records: &[VectorRecord],
    ) -> Result<()> {
        let backend = self.vector_store.name();
        for batch in records.chunks(self.config.upsert_batch_size) {
            bounded(self.config.retrieval_timeout(), self.vector_store.upsert(user_id, batch), || {
                RagError::retrieval(backend, "vector upsert timed out")
            })
            .await?;
            debug!(document.id = document_id, batch_size = batch.len(), "upserted vector batch");
        }
        Ok(())
    }

    /// Best-effort removal of a document whose vectors could not all be indexed.
    async fn discard_partial_ingest(&self, user_id: &str, document_id: &str, records: &[VectorRecord]) {
        if let Err(e) = self.chunk_store.delete_by_document(document_id, user_id).await {
            warn!(document.id = document_id, error = %e, "failed to discard chunks of partial ingest");
        }
        let ids: Vec<String> = records.iter().map(|r| r.id.clone()).collect();
        for batch in ids.chunks(self.config.delete_batch_size) {
            let deleted = bounded(
                self.config.retrieval_timeout(),
                self.vector_store.delete(user_id, batch),
                || RagError::retrieval(self.vector_store.name(), "vector delete timed out"),
            )
            .await;
            if let Err(e) = deleted {
                warn!(document.id = document_id, error = %e, "failed to discard vectors of partial ingest");
                break;
            }
        }
    }

    /// Delete a document's chunks and vectors.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::NotFound`] unless the caller owns the document.
    pub async fn delete_document(
        &self,
        document_id: &str,
        user_id: &str,
    ) -> Result<DeletionReport> {
        let summary = self
            .chunk_store
            .find_document(document_id, user_id)
            .await?
            .ok_or_else(|| RagError::NotFound(format!("document '{document_id}'")))?;

        let chunks_deleted = self.chunk_store.delete_by_document(document_id, user_id).await?;

        let ids: Vec<String> =
            (0..chunks_deleted as usize).map(|i| vector_id(document_id, i)).collect();
        let backend = self.vector_store.name();
        for batch in ids.chunks(self.config.delete_batch_size) {
            bounded(self.config.retrieval_timeout(), self.vector_store.delete(user_id, batch), || {
                RagError::retrieval(backend, "vector delete timed out")
            })
            .await
            .inspect_err(|e| error!(document.id = document_id, error = %e, "vector delete failed"))?;
        }

        info!(document.id = document_id, user.id = user_id, chunks_deleted, "deleted document");
        Ok(DeletionReport {
            document_id: document_id.to_string(),
            filename: summary.filename,
            chunks_deleted,
            vectors_deleted: ids.len() as u64,
        })
    }

    /// The user's documents, one summary each.
    pub async fn list_documents(&self, user_id: &str) -> Result<Vec<DocumentSummary>> {
        self.chunk_store.list_documents(user_id).await
    }

    /// The user's most recent dialogues, newest first.
    pub async fn list_dialogues(&self, user_id: &str, limit: usize) -> Result<Vec<Dialogue>> {
        self.dialogue_store.list_recent(user_id, limit).await
    }

    /// Delete one dialogue. Follow-ups that point at it keep their link.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::NotFound`] if the dialogue is absent or not owned.
    pub async fn delete_dialogue(&self, dialogue_id: &str, user_id: &str) -> Result<()> {
        if !self.dialogue_store.delete(dialogue_id, user_id).await? {
            return Err(RagError::NotFound(format!("dialogue '{dialogue_id}'")));
        }
        info!(dialogue.id = dialogue_id, user.id = user_id, "deleted dialogue");
        Ok(())
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let provider = self.embedding_provider.name();
        let embedding = bounded(
            self.config.embedding_timeout(),
            self.embedding_provider.embed(text),
            || RagError::embedding(provider, "embedding request timed out"),
        )
        .await
        .inspect_err(|e| error!(error = %e, "embedding failed during query"))?;

        if embedding.is_empty() {
            return Err(RagError::embedding(provider, "provider returned an empty embedding"));
        }
        Ok(embedding)
    }

    async fn search(
        &self,
        user_id: &str,
        embedding: &[f32],
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<VectorMatch>> {
        let backend = self.vector_store.name();
        let matches = bounded(
            self.config.retrieval_timeout(),
            self.vector_store.query(user_id, embedding, top_k, filter),
            || RagError::retrieval(backend, "vector query timed out"),
        )
        .await
        .inspect_err(|e| error!(user.id = user_id, error = %e, "vector store query failed"))?;

        debug!(
            user.id = user_id,
            document.id = filter.map(|f| f.document_id.as_str()),
            match_count = matches.len(),
            "vector query completed"
        );
        Ok(matches)
    }
}

/// Sort matches by descending score and keep the best `limit`.
///
/// The sort is stable, so equal scores keep their input order. NaN scores
/// rank last.
pub fn rank_matches(mut matches: Vec<VectorMatch>, limit: usize) -> Vec<VectorMatch> {
    matches.sort_by(|a, b| rank_key(b.score).total_cmp(&rank_key(a.score)));
    matches.truncate(limit);
    matches
}

fn rank_key(score: f32) -> f32 {
    if score.is_nan() { f32::NEG_INFINITY } else { score }
}

/// Format ranked matches into the answering model's context block and the
/// parallel list of references.
pub fn assemble_context(matches: &[VectorMatch]) -> (String, Vec<Reference>) {
    let context = matches
        .iter()
        .map(|m| {
            format!("[From {}, Page {}]: {}", m.metadata.filename, m.metadata.page_num, m.metadata.text)
        })
        .collect::<Vec<_>>()
        .join("\n\n");
    let references = matches.iter().map(Reference::from).collect();
    (context, references)
}

fn require_non_blank(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(RagError::InvalidConfiguration(format!("{field} must not be empty")));
    }
    Ok(())
}

/// Await `future`, failing with `on_timeout()` once `limit` elapses.
async fn bounded<T>(
    limit: Duration,
    future: impl Future<Output = Result<T>>,
    on_timeout: impl FnOnce() -> RagError,
) -> Result<T> {
    tokio::time::timeout(limit, future).await.unwrap_or_else(|_| Err(on_timeout()))
}

/// Builder for constructing a [`QaEngine`].
///
/// Every collaborator is required. Call [`build()`](QaEngineBuilder::build)
/// to validate and produce the engine.
#[derive(Default)]
pub struct QaEngineBuilder {
    config: Option<RagConfig>,
    embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    vector_store: Option<Arc<dyn VectorStore>>,
    chunk_store: Option<Arc<dyn ChunkStore>>,
    dialogue_store: Option<Arc<dyn DialogueStore>>,
    chunker: Option<Arc<dyn Chunker>>,
    answering_model: Option<Arc<dyn AnsweringModel>>,
}

impl QaEngineBuilder {
    /// Set the engine configuration.
    pub fn config(mut self, config: RagConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the embedding provider.
    pub fn embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedding_provider = Some(provider);
        self
    }

    /// Set the vector store backend.
    pub fn vector_store(mut self, store: Arc<dyn VectorStore>) -> Self {
        self.vector_store = Some(store);
        self
    }

    /// Set the chunk store.
    pub fn chunk_store(mut self, store: Arc<dyn ChunkStore>) -> Self {
        self.chunk_store = Some(store);
        self
    }

    /// Set the dialogue store.
    pub fn dialogue_store(mut self, store: Arc<dyn DialogueStore>) -> Self {
        self.dialogue_store = Some(store);
        self
    }

    /// Set the page chunker.
    pub fn chunker(mut self, chunker: Arc<dyn Chunker>) -> Self {
        self.chunker = Some(chunker);
        self
    }

    /// Set the answering model.
    pub fn answering_model(mut self, model: Arc<dyn AnsweringModel>) -> Self {
        self.answering_model = Some(model);
        self
    }

    /// Build the [`QaEngine`], validating the configuration and that all
    /// collaborators are set.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidConfiguration`] if anything is missing or
    /// the configuration is invalid.
    pub fn build(self) -> Result<QaEngine> {
        let config = required(self.config, "config")?;
        config.validate()?;
        let embedding_provider = required(self.embedding_provider, "embedding_provider")?;
        let vector_store = required(self.vector_store, "vector_store")?;
        let chunk_store = required(self.chunk_store, "chunk_store")?;
        let dialogue_store = required(self.dialogue_store, "dialogue_store")?;
        let chunker = required(self.chunker, "chunker")?;
        let answering_model = required(self.answering_model, "answering_model")?;

        let context_builder = ContextBuilder::new(dialogue_store.clone(), config.max_chain_depth);
        Ok(QaEngine {
            config,
            embedding_provider,
            vector_store,
            chunk_store,
            dialogue_store,
            chunker,
            answering_model,
            context_builder,
        })
    }
}

fn required<T>(value: Option<T>, name: &str) -> Result<T> {
    value.ok_or_else(|| RagError::InvalidConfiguration(format!("{name} is required")))
}
