//! Configuration for the question-answering engine.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};

/// Configuration parameters for ingestion, retrieval, and answering.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RagConfig {
    /// Maximum number of tokens per chunk window.
    pub chunk_max_tokens: usize,
    /// Number of tokens shared by consecutive chunk windows.
    pub chunk_overlap: usize,
    /// Matches requested per document when a query is scoped to documents.
    pub scoped_top_k: usize,
    /// Matches requested when a query searches all of a user's documents.
    pub unscoped_top_k: usize,
    /// Matches kept after merging and ranking.
    pub context_limit: usize,
    /// Token budget for the generated answer.
    pub answer_max_tokens: u32,
    /// Sampling temperature for the generated answer.
    pub temperature: f32,
    /// Maximum number of dialogues walked when rebuilding conversation context.
    pub max_chain_depth: usize,
    /// Timeout applied to every embedding call, in seconds.
    pub embedding_timeout_secs: u64,
    /// Timeout applied to every vector store call, in seconds.
    pub retrieval_timeout_secs: u64,
    /// Number of vector records sent per upsert call.
    pub upsert_batch_size: usize,
    /// Number of vector ids sent per delete call.
    pub delete_batch_size: usize,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            chunk_max_tokens: 500,
            chunk_overlap: 50,
            scoped_top_k: 5,
            unscoped_top_k: 10,
            context_limit: 8,
            answer_max_tokens: 1000,
            temperature: 0.7,
            max_chain_depth: 50,
            embedding_timeout_secs: 30,
            retrieval_timeout_secs: 30,
            upsert_batch_size: 100,
            delete_batch_size: 1000,
        }
    }
}

impl RagConfig {
    /// Create a new builder for constructing a [`RagConfig`].
    pub fn builder() -> RagConfigBuilder {
        RagConfigBuilder::default()
    }

    /// The embedding timeout as a [`Duration`].
    pub fn embedding_timeout(&self) -> Duration {
        Duration::from_secs(self.embedding_timeout_secs)
    }

    /// The vector store timeout as a [`Duration`].
    pub fn retrieval_timeout(&self) -> Duration {
        Duration::from_secs(self.retrieval_timeout_secs)
    }

    /// Check that the parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidConfiguration`] if:
    /// - `chunk_max_tokens == 0` or `chunk_overlap >= chunk_max_tokens`
    /// - any top-k, limit, batch size, depth, or timeout is zero
    /// - `temperature` is outside `0.0..=2.0`
    pub fn validate(&self) -> Result<()> {
        if self.chunk_max_tokens == 0 {
            return Err(invalid("chunk_max_tokens must be greater than zero"));
        }
        if self.chunk_overlap >= self.chunk_max_tokens {
            return Err(RagError::InvalidConfiguration(format!(
                "chunk_overlap ({}) must be less than chunk_max_tokens ({})",
                self.chunk_overlap, self.chunk_max_tokens
            )));
        }
        let positive = [
            ("scoped_top_k", self.scoped_top_k),
            ("unscoped_top_k", self.unscoped_top_k),
            ("context_limit", self.context_limit),
            ("max_chain_depth", self.max_chain_depth),
            ("upsert_batch_size", self.upsert_batch_size),
            ("delete_batch_size", self.delete_batch_size),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(RagError::InvalidConfiguration(format!(
                    "{name} must be greater than zero"
                )));
            }
        }
        if self.answer_max_tokens == 0 {
            return Err(invalid("answer_max_tokens must be greater than zero"));
        }
        if self.embedding_timeout_secs == 0 || self.retrieval_timeout_secs == 0 {
            return Err(invalid("timeouts must be greater than zero"));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(RagError::InvalidConfiguration(format!(
                "temperature ({}) must be between 0.0 and 2.0",
                self.temperature
            )));
        }
        Ok(())
    }
}

fn invalid(message: &str) -> RagError {
    RagError::InvalidConfiguration(message.to_string())
}

/// Builder for constructing a validated [`RagConfig`].
#[derive(Debug, Clone, Default)]
pub struct RagConfigBuilder {
    config: RagConfig,
}

impl RagConfigBuilder {
    /// Set the maximum number of tokens per chunk.
    pub fn chunk_max_tokens(mut self, tokens: usize) -> Self {
        self.config.chunk_max_tokens = tokens;
        self
    }

    /// Set the token overlap between consecutive chunks.
    pub fn chunk_overlap(mut self, overlap: usize) -> Self {
        self.config.chunk_overlap = overlap;
        self
    }

    /// Set the per-document `top_k` used for scoped queries.
    pub fn scoped_top_k(mut self, k: usize) -> Self {
        self.config.scoped_top_k = k;
        self
    }

    /// Set the `top_k` used for unscoped queries.
    pub fn unscoped_top_k(mut self, k: usize) -> Self {
        self.config.unscoped_top_k = k;
        self
    }

    /// Set how many ranked matches are kept as answer context.
    pub fn context_limit(mut self, limit: usize) -> Self {
        self.config.context_limit = limit;
        self
    }

    /// Set the token budget for generated answers.
    pub fn answer_max_tokens(mut self, tokens: u32) -> Self {
        self.config.answer_max_tokens = tokens;
        self
    }

    /// Set the sampling temperature for generated answers.
    pub fn temperature(mut self, temperature: f32) -> Self {
        self.config.temperature = temperature;
        self
    }

    /// Set the maximum dialogue chain depth walked for follow-up questions.
    pub fn max_chain_depth(mut self, depth: usize) -> Self {
        self.config.max_chain_depth = depth;
        self
    }

    /// Set the embedding call timeout.
    pub fn embedding_timeout(mut self, timeout: Duration) -> Self {
        self.config.embedding_timeout_secs = timeout.as_secs();
        self
    }

    /// Set the vector store call timeout.
    pub fn retrieval_timeout(mut self, timeout: Duration) -> Self {
        self.config.retrieval_timeout_secs = timeout.as_secs();
        self
    }

    /// Set the vector upsert batch size.
    pub fn upsert_batch_size(mut self, size: usize) -> Self {
        self.config.upsert_batch_size = size;
        self
    }

    /// Set the vector delete batch size.
    pub fn delete_batch_size(mut self, size: usize) -> Self {
        self.config.delete_batch_size = size;
        self
    }

    /// Build the [`RagConfig`], validating that parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidConfiguration`] as described in
    /// [`RagConfig::validate`].
    pub fn build(self) -> Result<RagConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
