//! Page chunking into overlapping token windows.
//!
//! [`TokenWindowChunker`] tokenizes each page, slides a window of
//! `max_tokens` tokens forward by `max_tokens - overlap`, and decodes every
//! window back to text tagged with its 1-indexed page number.

use std::ops::Range;
use std::sync::Arc;

use tracing::debug;

use crate::document::{Chunk, ChunkMetadata};
use crate::error::{RagError, Result};
use crate::tokenizer::{Tokenizer, decode};

/// A strategy for splitting extracted pages into chunks.
///
/// Implementations produce [`Chunk`]s without embeddings.
/// Embeddings are attached later by the engine.
pub trait Chunker: Send + Sync {
    /// Split pages (in page order) into chunks.
    fn chunk(&self, pages: &[String]) -> Result<Vec<Chunk>>;
}

/// Splits pages into fixed-size token windows with configurable overlap.
///
/// # Example
///
/// ```rust,ignore
/// use std::sync::Arc;
/// use docqa_rag::{TokenWindowChunker, WordTokenizer};
///
/// let chunker = TokenWindowChunker::new(Arc::new(WordTokenizer), 500, 50)?;
/// let chunks = chunker.chunk(&pages)?;
/// ```
#[derive(Clone)]
pub struct TokenWindowChunker {
    tokenizer: Arc<dyn Tokenizer>,
    max_tokens: usize,
    overlap: usize,
}

impl TokenWindowChunker {
    /// Create a new `TokenWindowChunker`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidConfiguration`] if `max_tokens` is zero or
    /// `overlap >= max_tokens`, since the window would never advance.
    pub fn new(tokenizer: Arc<dyn Tokenizer>, max_tokens: usize, overlap: usize) -> Result<Self> {
        window_step(max_tokens, overlap)?;
        Ok(Self { tokenizer, max_tokens, overlap })
    }

    pub fn max_tokens(&self) -> usize {
        self.max_tokens
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }
}

impl std::fmt::Debug for TokenWindowChunker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenWindowChunker")
            .field("tokenizer", &self.tokenizer.name())
            .field("max_tokens", &self.max_tokens)
            .field("overlap", &self.overlap)
            .finish()
    }
}

fn window_step(max_tokens: usize, overlap: usize) -> Result<usize> {
    if max_tokens == 0 {
        return Err(RagError::InvalidConfiguration(
            "max_tokens must be greater than zero".to_string(),
        ));
    }
    if overlap >= max_tokens {
        return Err(RagError::InvalidConfiguration(format!(
            "overlap ({overlap}) must be less than max_tokens ({max_tokens})"
        )));
    }
    Ok(max_tokens - overlap)
}

/// Token windows for a sequence of `len` tokens.
///
/// Windows start at `0, step, 2 * step, ...` while the start is `< len`, with
/// `step = max_tokens - overlap`; each runs to `min(start + max_tokens, len)`.
///
/// # Errors
///
/// Returns [`RagError::InvalidConfiguration`] under the same conditions as
/// [`TokenWindowChunker::new`].
pub fn window_ranges(len: usize, max_tokens: usize, overlap: usize) -> Result<Vec<Range<usize>>> {
    let step = window_step(max_tokens, overlap)?;
    Ok((0..len).step_by(step).map(|start| start..(start + max_tokens).min(len)).collect())
}

impl Chunker for TokenWindowChunker {
    fn chunk(&self, pages: &[String]) -> Result<Vec<Chunk>> {
        let mut chunks = Vec::new();

        for (index, page_text) in pages.iter().enumerate() {
            let page = u32::try_from(index + 1).map_err(|_| {
                RagError::InvalidConfiguration(format!("page count {} exceeds u32", pages.len()))
            })?;
            let tokens = self.tokenizer.encode(page_text)?;

            for range in window_ranges(tokens.len(), self.max_tokens, self.overlap)? {
                chunks.push(Chunk {
                    text: decode(page_text, &tokens[range]).to_string(),
                    metadata: ChunkMetadata { page },
                    embedding: None,
                });
            }
        }

        debug!(
            tokenizer = self.tokenizer.name(),
            page_count = pages.len(),
            chunk_count = chunks.len(),
            "chunked pages"
        );
        Ok(chunks)
    }
}
