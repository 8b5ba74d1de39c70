//! Error types for the `docqa-rag` crate.

use thiserror::Error;

/// Errors that can occur while ingesting documents or answering queries.
#[derive(Debug, Error)]
pub enum RagError {
    /// Chunking or engine parameters are inconsistent.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The embedding call failed or returned no vector.
    #[error("Embedding error ({provider}): {message}")]
    EmbeddingError {
        /// The embedding provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// The vector index could not be reached or returned an unusable response.
    #[error("Retrieval error ({backend}): {message}")]
    RetrievalError {
        /// The vector store backend that produced the error.
        backend: String,
        /// A description of the failure.
        message: String,
    },

    /// The language model call failed.
    #[error("Answer generation error ({model}): {message}")]
    AnswerGenerationError {
        /// The answering model that produced the error.
        model: String,
        /// A description of the failure.
        message: String,
    },

    /// A chunk or dialogue store read or write failed.
    #[error("Persistence error ({store}): {message}")]
    PersistenceError {
        /// The store that produced the error.
        store: String,
        /// A description of the failure.
        message: String,
    },

    /// The document or dialogue does not exist or is not owned by the caller.
    #[error("Not found: {0}")]
    NotFound(String),
}

impl RagError {
    pub(crate) fn embedding(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::EmbeddingError { provider: provider.into(), message: message.into() }
    }

    pub(crate) fn retrieval(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Self::RetrievalError { backend: backend.into(), message: message.into() }
    }

    pub(crate) fn answer(model: impl Into<String>, message: impl Into<String>) -> Self {
        Self::AnswerGenerationError { model: model.into(), message: message.into() }
    }

    pub(crate) fn persistence(store: impl Into<String>, message: impl Into<String>) -> Self {
        Self::PersistenceError { store: store.into(), message: message.into() }
    }
}

/// A convenience result type for RAG operations.
pub type Result<T> = std::result::Result<T, RagError>;
