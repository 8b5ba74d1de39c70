//! Environment-driven configuration and backend selection.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use docqa_rag::openai::{OpenAIChatModel, OpenAIEmbeddingProvider};
use docqa_rag::pinecone::PineconeVectorStore;
use docqa_rag::postgres::{PgChunkStore, PgDialogueStore, connect};
use docqa_rag::tokenizer::HfTokenizer;
use docqa_rag::{
    ChunkStore, DialogueStore, InMemoryChunkStore, InMemoryDialogueStore, InMemoryVectorStore,
    QaEngine, RagConfig, TokenWindowChunker, Tokenizer, VectorStore, WordTokenizer,
};
use tracing::info;

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: "127.0.0.1".to_string(), port: 8000 }
    }
}

impl ServerConfig {
    /// Read `DOCQA_HOST` and `DOCQA_PORT`, falling back to the defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let host = env_value("DOCQA_HOST").unwrap_or(defaults.host);
        let port = env_value("DOCQA_PORT")
            .and_then(|value| value.parse::<u16>().ok())
            .unwrap_or(defaults.port);
        Self { host, port }
    }
}

/// Pinecone connection settings.
#[derive(Clone)]
pub struct PineconeSettings {
    pub api_key: String,
    pub index_host: String,
}

impl std::fmt::Debug for PineconeSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PineconeSettings")
            .field("api_key", &"<redacted>")
            .field("index_host", &self.index_host)
            .finish()
    }
}

/// Which collaborators back the engine.
///
/// OpenAI is required. Pinecone and PostgreSQL are used when configured,
/// otherwise the in-memory stores stand in for them.
#[derive(Clone)]
pub struct BackendConfig {
    pub openai_api_key: String,
    pub embedding_model: String,
    pub chat_model: String,
    pub pinecone: Option<PineconeSettings>,
    pub database_url: Option<String>,
    /// A HuggingFace `tokenizer.json` used to count chunk tokens; whitespace
    /// words are counted when unset.
    pub tokenizer_path: Option<PathBuf>,
    pub rag: RagConfig,
}

impl std::fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendConfig")
            .field("embedding_model", &self.embedding_model)
            .field("chat_model", &self.chat_model)
            .field("pinecone", &self.pinecone)
            .field("database", &self.database_url.is_some())
            .field("tokenizer_path", &self.tokenizer_path)
            .field("rag", &self.rag)
            .finish()
    }
}

impl BackendConfig {
    /// Read the backend settings from the environment.
    ///
    /// # Errors
    ///
    /// Fails if `OPENAI_API_KEY` is missing, only one of the two Pinecone
    /// variables is set, or `DOCQA_MAX_CHAIN_DEPTH` is not a positive integer.
    pub fn from_env() -> anyhow::Result<Self> {
        let openai_api_key = env_value("OPENAI_API_KEY")
            .context("OPENAI_API_KEY must be set to embed documents and answer questions")?;
        let embedding_model = env_value("OPENAI_EMBEDDING_MODEL")
            .unwrap_or_else(|| "text-embedding-3-large".to_string());
        let chat_model =
            env_value("OPENAI_CHAT_MODEL").unwrap_or_else(|| "gpt-3.5-turbo".to_string());

        let pinecone = match (env_value("PINECONE_API_KEY"), env_value("PINECONE_INDEX_HOST")) {
            (Some(api_key), Some(index_host)) => Some(PineconeSettings { api_key, index_host }),
            (None, None) => None,
            _ => anyhow::bail!("PINECONE_API_KEY and PINECONE_INDEX_HOST must be set together"),
        };

        let mut rag = RagConfig::default();
        if let Some(depth) = env_value("DOCQA_MAX_CHAIN_DEPTH") {
            rag.max_chain_depth = depth
                .parse()
                .with_context(|| format!("invalid DOCQA_MAX_CHAIN_DEPTH '{depth}'"))?;
        }
        rag.validate()?;

        Ok(Self {
            openai_api_key,
            embedding_model,
            chat_model,
            pinecone,
            database_url: env_value("DATABASE_URL"),
            tokenizer_path: env_value("DOCQA_TOKENIZER_PATH").map(PathBuf::from),
            rag,
        })
    }

    /// Connect the configured collaborators and assemble the engine.
    pub async fn build_engine(&self) -> anyhow::Result<QaEngine> {
        let embedder = OpenAIEmbeddingProvider::new(self.openai_api_key.clone())?
            .with_model(self.embedding_model.clone());
        let model =
            OpenAIChatModel::new(self.openai_api_key.clone())?.with_model(self.chat_model.clone());

        let vector_store: Arc<dyn VectorStore> = match &self.pinecone {
            Some(settings) => {
                Arc::new(PineconeVectorStore::new(settings.api_key.clone(), &settings.index_host)?)
            }
            None => Arc::new(InMemoryVectorStore::new()),
        };

        let (chunk_store, dialogue_store) = match &self.database_url {
            Some(url) => {
                let pool = connect(url).await.context("failed to connect to DATABASE_URL")?;
                let chunks = PgChunkStore::from_pool(pool.clone());
                let dialogues = PgDialogueStore::from_pool(pool);
                chunks.migrate().await?;
                dialogues.migrate().await?;
                (Arc::new(chunks) as Arc<dyn ChunkStore>, Arc::new(dialogues) as Arc<dyn DialogueStore>)
            }
            None => (
                Arc::new(InMemoryChunkStore::new()) as Arc<dyn ChunkStore>,
                Arc::new(InMemoryDialogueStore::new()) as Arc<dyn DialogueStore>,
            ),
        };

        let tokenizer = self.tokenizer()?;
        let chunker = TokenWindowChunker::new(
            tokenizer.clone(),
            self.rag.chunk_max_tokens,
            self.rag.chunk_overlap,
        )?;

        info!(
            embedding_model = %self.embedding_model,
            chat_model = %self.chat_model,
            vector_store = vector_store.name(),
            chunk_store = chunk_store.name(),
            dialogue_store = dialogue_store.name(),
            tokenizer = tokenizer.name(),
            "configured backends"
        );

        let engine = QaEngine::builder()
            .config(self.rag.clone())
            .embedding_provider(Arc::new(embedder))
            .vector_store(vector_store)
            .chunk_store(chunk_store)
            .dialogue_store(dialogue_store)
            .chunker(Arc::new(chunker))
            .answering_model(Arc::new(model))
            .build()?;
        Ok(engine)
    }

    /// The chunking tokenizer: `DOCQA_TOKENIZER_PATH` when set, else whitespace words.
    pub fn tokenizer(&self) -> anyhow::Result<Arc<dyn Tokenizer>> {
        let tokenizer: Arc<dyn Tokenizer> = match &self.tokenizer_path {
            Some(path) => Arc::new(HfTokenizer::from_file(path)?),
            None => Arc::new(WordTokenizer),
        };
        Ok(tokenizer)
    }
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().map(|value| value.trim().to_string()).filter(|value| !value.is_empty())
}
