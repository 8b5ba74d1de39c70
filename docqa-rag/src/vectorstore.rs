//! Vector store trait for namespaced similarity search.

use async_trait::async_trait;

use crate::document::{MetadataFilter, VectorMatch, VectorRecord};
use crate::error::Result;

/// A similarity-search index partitioned into per-user namespaces.
///
/// Implementations map backend failures to
/// [`RagError::RetrievalError`](crate::RagError::RetrievalError).
///
/// # Example
///
/// ```rust,ignore
/// use docqa_rag::{InMemoryVectorStore, MetadataFilter, VectorStore};
///
/// let store = InMemoryVectorStore::new();
/// store.upsert("user-1", &records).await?;
/// let filter = MetadataFilter::document("doc-1");
/// let matches = store.query("user-1", &query_embedding, 5, Some(&filter)).await?;
/// ```
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// A short name for logs and error messages.
    fn name(&self) -> &str;

    /// Insert or overwrite records by id within a namespace.
    async fn upsert(&self, namespace: &str, records: &[VectorRecord]) -> Result<()>;

    /// Return up to `top_k` nearest records, ordered by descending score.
    ///
    /// An empty or unknown namespace yields no matches.
    async fn query(
        &self,
        namespace: &str,
        embedding: &[f32],
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<VectorMatch>>;

    /// Delete records by id from a namespace. Unknown ids are ignored.
    async fn delete(&self, namespace: &str, ids: &[String]) -> Result<()>;
}
