//! In-memory collaborators for development and tests.
//!
//! [`InMemoryVectorStore`], [`InMemoryChunkStore`], and
//! [`InMemoryDialogueStore`] keep their data behind `tokio::sync::RwLock`s
//! and have no external dependencies.

use std::cmp::Ordering;
use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::dialogue::{Dialogue, DialogueStore, NewDialogue};
use crate::docstore::ChunkStore;
use crate::document::{DocumentSummary, MetadataFilter, StoredChunk, VectorMatch, VectorRecord};
use crate::error::Result;
use crate::vectorstore::VectorStore;

/// An in-memory vector store using cosine similarity for search.
///
/// Namespaces are stored as nested `HashMap`s: namespace → record id → record.
///
/// # Example
///
/// ```rust,ignore
/// use docqa_rag::{InMemoryVectorStore, VectorStore};
///
/// let store = InMemoryVectorStore::new();
/// store.upsert("user-1", &records).await?;
/// ```
#[derive(Debug, Default)]
pub struct InMemoryVectorStore {
    namespaces: RwLock<HashMap<String, HashMap<String, VectorRecord>>>,
}

impl InMemoryVectorStore {
    /// Create a new empty in-memory vector store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records held in a namespace.
    pub async fn len(&self, namespace: &str) -> usize {
        self.namespaces.read().await.get(namespace).map_or(0, HashMap::len)
    }

    /// Ids held in a namespace, sorted.
    pub async fn ids(&self, namespace: &str) -> Vec<String> {
        let namespaces = self.namespaces.read().await;
        let mut ids: Vec<String> =
            namespaces.get(namespace).map(|ns| ns.keys().cloned().collect()).unwrap_or_default();
        ids.sort();
        ids
    }
}

/// Compute cosine similarity between two vectors.
///
/// Returns 0.0 if either vector has zero magnitude.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    fn name(&self) -> &str {
        "InMemory"
    }

    async fn upsert(&self, namespace: &str, records: &[VectorRecord]) -> Result<()> {
        let mut namespaces = self.namespaces.write().await;
        let store = namespaces.entry(namespace.to_string()).or_default();
        for record in records {
            store.insert(record.id.clone(), record.clone());
        }
        Ok(())
    }

    async fn query(
        &self,
        namespace: &str,
        embedding: &[f32],
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<VectorMatch>> {
        let namespaces = self.namespaces.read().await;
        let Some(store) = namespaces.get(namespace) else {
            return Ok(Vec::new());
        };

        let mut scored: Vec<VectorMatch> = store
            .values()
            .filter(|record| filter.is_none_or(|f| f.matches(&record.metadata)))
            .map(|record| VectorMatch {
                id: record.id.clone(),
                score: cosine_similarity(&record.values, embedding),
                metadata: record.metadata.clone(),
            })
            .collect();

        // Id order breaks score ties so results do not depend on hash order.
        scored.sort_by(|a, b| {
            b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal).then_with(|| a.id.cmp(&b.id))
        });
        scored.truncate(top_k);
        Ok(scored)
    }

    async fn delete(&self, namespace: &str, ids: &[String]) -> Result<()> {
        let mut namespaces = self.namespaces.write().await;
        if let Some(store) = namespaces.get_mut(namespace) {
            for id in ids {
                store.remove(id);
            }
        }
        Ok(())
    }
}

/// An in-memory [`ChunkStore`].
#[derive(Debug, Default)]
pub struct InMemoryChunkStore {
    chunks: RwLock<Vec<StoredChunk>>,
}

impl InMemoryChunkStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All chunks of one document owned by the user, in chunk order.
    pub async fn chunks_for(&self, document_id: &str, user_id: &str) -> Vec<StoredChunk> {
        let mut chunks: Vec<StoredChunk> = self
            .chunks
            .read()
            .await
            .iter()
            .filter(|c| c.document_id == document_id && c.user_id == user_id)
            .cloned()
            .collect();
        chunks.sort_by_key(|c| c.chunk_index);
        chunks
    }
}

fn summary(chunk: &StoredChunk) -> DocumentSummary {
    DocumentSummary {
        document_id: chunk.document_id.clone(),
        filename: chunk.filename.clone(),
        user_id: chunk.user_id.clone(),
    }
}

#[async_trait]
impl ChunkStore for InMemoryChunkStore {
    fn name(&self) -> &str {
        "InMemory"
    }

    async fn insert_many(&self, chunks: &[StoredChunk]) -> Result<u64> {
        self.chunks.write().await.extend_from_slice(chunks);
        Ok(chunks.len() as u64)
    }

    async fn list_documents(&self, user_id: &str) -> Result<Vec<DocumentSummary>> {
        let chunks = self.chunks.read().await;
        let mut documents: Vec<DocumentSummary> = Vec::new();
        for chunk in chunks.iter().filter(|c| c.user_id == user_id) {
            if !documents.iter().any(|d| d.document_id == chunk.document_id) {
                documents.push(summary(chunk));
            }
        }
        Ok(documents)
    }

    async fn find_document(
        &self,
        document_id: &str,
        user_id: &str,
    ) -> Result<Option<DocumentSummary>> {
        let chunks = self.chunks.read().await;
        Ok(chunks
            .iter()
            .find(|c| c.document_id == document_id && c.user_id == user_id)
            .map(summary))
    }

    async fn delete_by_document(&self, document_id: &str, user_id: &str) -> Result<u64> {
        let mut chunks = self.chunks.write().await;
        let before = chunks.len();
        chunks.retain(|c| !(c.document_id == document_id && c.user_id == user_id));
        Ok((before - chunks.len()) as u64)
    }
}

/// An in-memory [`DialogueStore`] keeping dialogues in creation order.
#[derive(Debug, Default)]
pub struct InMemoryDialogueStore {
    dialogues: RwLock<Vec<Dialogue>>,
}

impl InMemoryDialogueStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DialogueStore for InMemoryDialogueStore {
    fn name(&self) -> &str {
        "InMemory"
    }

    async fn create(&self, dialogue: NewDialogue) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        self.dialogues.write().await.push(Dialogue {
            id: id.clone(),
            user_id: dialogue.user_id,
            query: dialogue.query,
            references: dialogue.references,
            response: dialogue.response,
            document_ids: dialogue.document_ids,
            previous_dialogue_id: dialogue.previous_dialogue_id,
            timestamp: Utc::now(),
        });
        Ok(id)
    }

    async fn get(&self, dialogue_id: &str, user_id: &str) -> Result<Option<Dialogue>> {
        let dialogues = self.dialogues.read().await;
        Ok(dialogues.iter().find(|d| d.id == dialogue_id && d.user_id == user_id).cloned())
    }

    async fn list_recent(&self, user_id: &str, limit: usize) -> Result<Vec<Dialogue>> {
        let dialogues = self.dialogues.read().await;
        Ok(dialogues.iter().rev().filter(|d| d.user_id == user_id).take(limit).cloned().collect())
    }

    async fn delete(&self, dialogue_id: &str, user_id: &str) -> Result<bool> {
        let mut dialogues = self.dialogues.write().await;
        match dialogues.iter().position(|d| d.id == dialogue_id && d.user_id == user_id) {
            Some(index) => {
                dialogues.remove(index);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
