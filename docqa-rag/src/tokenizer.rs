//! Tokenizers used to measure and cut chunk windows.
//!
//! A [`Tokenizer`] returns byte spans that tile its input, so a window of
//! tokens decodes to a plain slice of the original text.

use crate::error::Result;

/// A byte range of one token within the encoded text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenSpan {
    pub start: usize,
    pub end: usize,
}

impl TokenSpan {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }
}

/// A deterministic tokenizer.
///
/// Implementations must return spans in order, each starting where the
/// previous one ended, the first at `0` and the last at `text.len()`.
/// Text without any token yields an empty `Vec`.
pub trait Tokenizer: Send + Sync {
    /// A short name for logs.
    fn name(&self) -> &str;

    /// Split `text` into token spans.
    fn encode(&self, text: &str) -> Result<Vec<TokenSpan>>;
}

/// Decode a window of tokens back into text.
///
/// Returns an empty string for an empty window.
pub fn decode<'a>(text: &'a str, window: &[TokenSpan]) -> &'a str {
    match (window.first(), window.last()) {
        (Some(first), Some(last)) => &text[first.start..last.end],
        _ => "",
    }
}

/// Splits text into whitespace-delimited words.
///
/// Each token is one word plus the whitespace that follows it. Whitespace
/// before the first word belongs to the first token.
#[derive(Debug, Clone, Copy, Default)]
pub struct WordTokenizer;

impl Tokenizer for WordTokenizer {
    fn name(&self) -> &str {
        "word"
    }

    fn encode(&self, text: &str) -> Result<Vec<TokenSpan>> {
        // Byte offsets where a word begins (non-whitespace after whitespace or at start).
        let mut starts: Vec<usize> = Vec::new();
        let mut prev_ws = true;
        for (i, c) in text.char_indices() {
            let ws = c.is_whitespace();
            if !ws && prev_ws {
                starts.push(i);
            }
            prev_ws = ws;
        }
        if starts.is_empty() {
            return Ok(Vec::new());
        }
        starts[0] = 0;
        Ok(tile(&starts, text.len()))
    }
}

/// Build tiling spans from sorted token start offsets.
fn tile(starts: &[usize], len: usize) -> Vec<TokenSpan> {
    starts
        .iter()
        .enumerate()
        .map(|(i, &start)| {
            let end = starts.get(i + 1).copied().unwrap_or(len);
            TokenSpan::new(start, end)
        })
        .collect()
}

#[cfg(feature = "tokenizers")]
pub use hf::HfTokenizer;

#[cfg(feature = "tokenizers")]
mod hf {
    use std::path::Path;

    use super::{TokenSpan, Tokenizer, tile};
    use crate::error::{RagError, Result};

    /// A [`Tokenizer`] backed by a HuggingFace `tokenizer.json`.
    ///
    /// Model offsets may skip whitespace; each span is widened to reach the
    /// next token's start so the spans still tile the text.
    pub struct HfTokenizer {
        inner: tokenizers::Tokenizer,
        name: String,
    }

    impl HfTokenizer {
        /// Load a tokenizer from a `tokenizer.json` file.
        pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
            let path = path.as_ref();
            let inner = tokenizers::Tokenizer::from_file(path).map_err(|e| {
                RagError::InvalidConfiguration(format!(
                    "failed to load tokenizer '{}': {e}",
                    path.display()
                ))
            })?;
            Ok(Self { inner, name: path.display().to_string() })
        }

        /// Load a tokenizer from the contents of a `tokenizer.json` file.
        pub fn from_bytes(bytes: impl AsRef<[u8]>) -> Result<Self> {
            let inner = tokenizers::Tokenizer::from_bytes(bytes).map_err(|e| {
                RagError::InvalidConfiguration(format!("failed to load tokenizer: {e}"))
            })?;
            Ok(Self { inner, name: "huggingface".to_string() })
        }
    }

    impl Tokenizer for HfTokenizer {
        fn name(&self) -> &str {
            &self.name
        }

        fn encode(&self, text: &str) -> Result<Vec<TokenSpan>> {
            let encoding = self.inner.encode(text, false).map_err(|e| {
                RagError::InvalidConfiguration(format!("tokenizer failed to encode text: {e}"))
            })?;

            let mut starts: Vec<usize> = Vec::with_capacity(encoding.len());
            for &(start, _) in encoding.get_offsets() {
                // Byte-fallback pieces of one character share a start offset.
                if starts.last().is_none_or(|&last| start > last) && text.is_char_boundary(start) {
                    starts.push(start);
                }
            }
            if starts.is_empty() {
                return Ok(Vec::new());
            }
            starts[0] = 0;
            Ok(tile(&starts, text.len()))
        }
    }
}
