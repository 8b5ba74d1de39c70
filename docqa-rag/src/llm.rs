//! Answering model trait for turning retrieved context into a cited answer.

use async_trait::async_trait;

use crate::error::Result;

/// A language model that completes a single system + user exchange.
#[async_trait]
pub trait AnsweringModel: Send + Sync {
    /// The model name, used in logs and errors.
    fn name(&self) -> &str;

    /// Generate a completion.
    ///
    /// Implementations map upstream failures to
    /// [`RagError::AnswerGenerationError`](crate::RagError::AnswerGenerationError).
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        max_tokens: u32,
        temperature: f32,
    ) -> Result<String>;
}
