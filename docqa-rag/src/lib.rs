//! # docqa-rag
//!
//! Retrieval-augmented question answering over a user's uploaded documents.
//!
//! ## Overview
//!
//! - [`TokenWindowChunker`] splits extracted pages into overlapping token windows.
//! - [`QaEngine`] ingests documents and answers questions with cited sources.
//! - [`ContextBuilder`] rebuilds the history of a follow-up conversation.
//! - [`DialogueStore`], [`ChunkStore`], and [`VectorStore`] persist dialogues,
//!   chunks, and embeddings.
//!
//! In-memory collaborators are always available. Remote ones sit behind
//! features:
//!
//! | Feature | Collaborators |
//! |---------|---------------|
//! | `openai` | [`openai::OpenAIEmbeddingProvider`], [`openai::OpenAIChatModel`] |
//! | `pinecone` | [`pinecone::PineconeVectorStore`] |
//! | `postgres` | [`postgres::PgChunkStore`], [`postgres::PgDialogueStore`] |
//! | `tokenizers` | [`tokenizer::HfTokenizer`] |
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use docqa_rag::*;
//!
//! let config = RagConfig::default();
//! let chunker = TokenWindowChunker::new(
//!     Arc::new(WordTokenizer),
//!     config.chunk_max_tokens,
//!     config.chunk_overlap,
//! )?;
//! let engine = QaEngine::builder()
//!     .config(config)
//!     .embedding_provider(Arc::new(embedder))
//!     .vector_store(Arc::new(InMemoryVectorStore::new()))
//!     .chunk_store(Arc::new(InMemoryChunkStore::new()))
//!     .dialogue_store(Arc::new(InMemoryDialogueStore::new()))
//!     .chunker(Arc::new(chunker))
//!     .answering_model(Arc::new(model))
//!     .build()?;
//!
//! let report = engine.ingest_document("user-1", "notes.pdf", &pages).await?;
//! let first = engine.answer_query(AnswerRequest::new("What is covered?", "user-1")).await?;
//! let follow_up = engine
//!     .answer_query(AnswerRequest::new("And on page two?", "user-1").following(first.dialogue_id))
//!     .await?;
//! ```

pub mod chunking;
pub mod config;
pub mod context;
pub mod dialogue;
pub mod docstore;
pub mod document;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod inmemory;
pub mod llm;
pub mod prompt;
pub mod tokenizer;
pub mod vectorstore;

#[cfg(feature = "openai")]
pub mod openai;

#[cfg(feature = "pinecone")]
pub mod pinecone;

#[cfg(feature = "postgres")]
pub mod postgres;

pub use chunking::{Chunker, TokenWindowChunker, window_ranges};
pub use config::{RagConfig, RagConfigBuilder};
pub use context::{ContextBuilder, dedup_references, format_conversation};
pub use dialogue::{Dialogue, DialogueStore, NewDialogue};
pub use docstore::ChunkStore;
pub use document::{
    Chunk, ChunkMetadata, DeletionReport, DocumentSummary, IngestReport, MetadataFilter,
    Reference, StoredChunk, VectorMatch, VectorMetadata, VectorRecord, vector_id,
};
pub use embedding::EmbeddingProvider;
pub use engine::{
    AnswerRequest, AnswerResult, QaEngine, QaEngineBuilder, assemble_context, rank_matches,
};
pub use error::{RagError, Result};
pub use inmemory::{InMemoryChunkStore, InMemoryDialogueStore, InMemoryVectorStore};
pub use llm::AnsweringModel;
pub use tokenizer::{TokenSpan, Tokenizer, WordTokenizer};
pub use vectorstore::VectorStore;
