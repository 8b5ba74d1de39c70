//! Shared fixtures for engine integration tests.
#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use docqa_rag::{
    AnsweringModel, EmbeddingProvider, InMemoryChunkStore, InMemoryDialogueStore,
    InMemoryVectorStore, MetadataFilter, QaEngine, RagConfig, RagError, TokenWindowChunker,
    VectorMatch, VectorRecord, VectorStore, WordTokenizer,
};

/// Deterministic hash-based embeddings that remember every input.
pub struct MockEmbeddingProvider {
    dimensions: usize,
    inputs: Mutex<Vec<String>>,
}

impl MockEmbeddingProvider {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions, inputs: Mutex::new(Vec::new()) }
    }

    pub fn inputs(&self) -> Vec<String> {
        self.inputs.lock().unwrap().clone()
    }

    pub fn last_input(&self) -> Option<String> {
        self.inputs.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbeddingProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn embed(&self, text: &str) -> docqa_rag::Result<Vec<f32>> {
        self.inputs.lock().unwrap().push(text.to_string());
        let hash = text.bytes().fold(0u64, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u64));
        let mut emb = vec![0.0f32; self.dimensions];
        for (i, v) in emb.iter_mut().enumerate() {
            *v = ((hash.wrapping_add(i as u64)) as f32).sin();
        }
        let norm: f32 = emb.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            emb.iter_mut().for_each(|x| *x /= norm);
        }
        Ok(emb)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

/// An embedding provider that never answers.
pub struct StalledEmbeddingProvider;

#[async_trait]
impl EmbeddingProvider for StalledEmbeddingProvider {
    fn name(&self) -> &str {
        "stalled"
    }

    async fn embed(&self, _text: &str) -> docqa_rag::Result<Vec<f32>> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(vec![1.0])
    }

    fn dimensions(&self) -> usize {
        1
    }
}

/// An in-memory vector store that records upsert batch sizes and can be
/// told to reject every upsert after the first `accepted_batches`.
pub struct BatchRecordingStore {
    pub inner: InMemoryVectorStore,
    batches: Mutex<Vec<usize>>,
    accepted_batches: Option<usize>,
}

impl BatchRecordingStore {
    pub fn new() -> Self {
        Self { inner: InMemoryVectorStore::new(), batches: Mutex::new(Vec::new()), accepted_batches: None }
    }

    pub fn failing_after(accepted_batches: usize) -> Self {
        Self { accepted_batches: Some(accepted_batches), ..Self::new() }
    }

    pub fn batches(&self) -> Vec<usize> {
        self.batches.lock().unwrap().clone()
    }
}

#[async_trait]
impl VectorStore for BatchRecordingStore {
    fn name(&self) -> &str {
        "batch-recording"
    }

    async fn upsert(&self, namespace: &str, records: &[VectorRecord]) -> docqa_rag::Result<()> {
        {
            let mut batches = self.batches.lock().unwrap();
            if self.accepted_batches.is_some_and(|limit| batches.len() >= limit) {
                return Err(RagError::RetrievalError {
                    backend: "batch-recording".to_string(),
                    message: "index unavailable".to_string(),
                });
            }
            batches.push(records.len());
        }
        self.inner.upsert(namespace, records).await
    }

    async fn query(
        &self,
        namespace: &str,
        embedding: &[f32],
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> docqa_rag::Result<Vec<VectorMatch>> {
        self.inner.query(namespace, embedding, top_k, filter).await
    }

    async fn delete(&self, namespace: &str, ids: &[String]) -> docqa_rag::Result<()> {
        self.inner.delete(namespace, ids).await
    }
}

/// A model that records its prompts and answers with a counter.
#[derive(Default)]
pub struct RecordingModel {
    prompts: Mutex<Vec<(String, String)>>,
    fail: bool,
}

impl RecordingModel {
    pub fn failing() -> Self {
        Self { prompts: Mutex::new(Vec::new()), fail: true }
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn last_user_prompt(&self) -> Option<String> {
        self.prompts.lock().unwrap().last().map(|(_, user)| user.clone())
    }

    pub fn last_system_prompt(&self) -> Option<String> {
        self.prompts.lock().unwrap().last().map(|(system, _)| system.clone())
    }
}

#[async_trait]
impl AnsweringModel for RecordingModel {
    fn name(&self) -> &str {
        "recording-model"
    }

    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        _max_tokens: u32,
        _temperature: f32,
    ) -> docqa_rag::Result<String> {
        if self.fail {
            return Err(RagError::AnswerGenerationError {
                model: "recording-model".to_string(),
                message: "upstream unavailable".to_string(),
            });
        }
        let mut prompts = self.prompts.lock().unwrap();
        prompts.push((system_prompt.to_string(), user_prompt.to_string()));
        Ok(format!("answer {} [a.pdf, Page 1]", prompts.len()))
    }
}

/// An engine wired to in-memory collaborators, with handles kept for inspection.
pub struct Harness {
    pub engine: QaEngine,
    pub embedder: Arc<MockEmbeddingProvider>,
    pub model: Arc<RecordingModel>,
    pub vectors: Arc<InMemoryVectorStore>,
    pub chunks: Arc<InMemoryChunkStore>,
    pub dialogues: Arc<InMemoryDialogueStore>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(RagConfig::default())
    }

    pub fn with_config(config: RagConfig) -> Self {
        Self::build(config, Arc::new(RecordingModel::default()))
    }

    pub fn with_model(model: RecordingModel) -> Self {
        Self::build(RagConfig::default(), Arc::new(model))
    }

    fn build(config: RagConfig, model: Arc<RecordingModel>) -> Self {
        let embedder = Arc::new(MockEmbeddingProvider::new(32));
        let vectors = Arc::new(InMemoryVectorStore::new());
        let chunks = Arc::new(InMemoryChunkStore::new());
        let dialogues = Arc::new(InMemoryDialogueStore::new());
        let chunker = TokenWindowChunker::new(
            Arc::new(WordTokenizer),
            config.chunk_max_tokens,
            config.chunk_overlap,
        )
        .unwrap();

        let engine = QaEngine::builder()
            .config(config)
            .embedding_provider(embedder.clone())
            .vector_store(vectors.clone())
            .chunk_store(chunks.clone())
            .dialogue_store(dialogues.clone())
            .chunker(Arc::new(chunker))
            .answering_model(model.clone())
            .build()
            .unwrap();

        Self { engine, embedder, model, vectors, chunks, dialogues }
    }
}

/// `n` whitespace-separated words `w0 w1 ...`.
pub fn words(n: usize) -> String {
    (0..n).map(|i| format!("w{i}")).collect::<Vec<_>>().join(" ")
}
