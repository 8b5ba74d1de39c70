//! Chunk store trait for persisted document chunks.

use async_trait::async_trait;

use crate::document::{DocumentSummary, StoredChunk};
use crate::error::Result;

/// Persistence for [`StoredChunk`]s, scoped by owning user.
///
/// Implementations map backend failures to
/// [`RagError::PersistenceError`](crate::RagError::PersistenceError).
#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// A short name for logs and error messages.
    fn name(&self) -> &str;

    /// Insert chunks, returning how many were written.
    async fn insert_many(&self, chunks: &[StoredChunk]) -> Result<u64>;

    /// One summary per document owned by the user.
    async fn list_documents(&self, user_id: &str) -> Result<Vec<DocumentSummary>>;

    /// The document's summary, if it exists and belongs to the user.
    async fn find_document(
        &self,
        document_id: &str,
        user_id: &str,
    ) -> Result<Option<DocumentSummary>>;

    /// Delete every chunk of the document owned by the user, returning the count.
    async fn delete_by_document(&self, document_id: &str, user_id: &str) -> Result<u64>;
}
