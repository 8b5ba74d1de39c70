//! Conversation context reconstruction.
//!
//! A follow-up question is answered with the whole prior conversation in
//! view: every earlier exchange, plus every document excerpt cited along
//! the way, deduplicated by `(filename, page)`.

use std::collections::HashSet;
use std::sync::Arc;

use crate::dialogue::{Dialogue, DialogueStore};
use crate::document::Reference;

const FULL_CONTEXT_INSTRUCTION: &str = "Please provide a comprehensive answer using all available information \
from the conversation history and current references. If referencing previous information, please mention \
the source document and page.";

/// Builds the textual context of a dialogue chain.
#[derive(Clone)]
pub struct ContextBuilder {
    store: Arc<dyn DialogueStore>,
    max_depth: usize,
}

impl std::fmt::Debug for ContextBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextBuilder")
            .field("store", &self.store.name())
            .field("max_depth", &self.max_depth)
            .finish()
    }
}

impl ContextBuilder {
    pub fn new(store: Arc<dyn DialogueStore>, max_depth: usize) -> Self {
        Self { store, max_depth }
    }

    /// The formatted history ending at `previous_dialogue_id`.
    ///
    /// Empty when no id is given or the chain resolves to nothing.
    pub async fn build_conversation_context(
        &self,
        previous_dialogue_id: Option<&str>,
        user_id: &str,
    ) -> String {
        let Some(id) = previous_dialogue_id else {
            return String::new();
        };
        let chain = self.store.chain(id, user_id, self.max_depth).await;
        format_conversation(&chain)
    }

    /// The history block followed by the current question and its references.
    pub async fn build_full_context(
        &self,
        current_query: &str,
        previous_dialogue_id: Option<&str>,
        user_id: &str,
        current_references: &[Reference],
    ) -> String {
        let conversation = self.build_conversation_context(previous_dialogue_id, user_id).await;
        compose_full_context(&conversation, current_query, current_references)
    }
}

/// Format a chronological chain. Returns an empty string for an empty chain.
pub fn format_conversation(chain: &[Dialogue]) -> String {
    if chain.is_empty() {
        return String::new();
    }

    let mut parts = vec!["=== CONVERSATION HISTORY ===".to_string()];
    for (i, dialogue) in chain.iter().enumerate() {
        parts.push(format!("\n--- Previous Exchange {} ---", i + 1));
        parts.push(format!("Question: {}", dialogue.query));
        parts.push(format!("Answer: {}", dialogue.response));
    }

    let references = dedup_references(chain);
    if !references.is_empty() {
        parts.push("\n=== ALL REFERENCE DOCUMENTS FROM CONVERSATION ===".to_string());
        parts.push(format!("Total Documents Referenced: {}", references.len()));
        for (i, reference) in references.iter().enumerate() {
            parts.push(format!("\n--- Reference {} ---", i + 1));
            push_reference_body(&mut parts, reference);
        }
    }

    parts.push("\n=== END CONVERSATION HISTORY ===".to_string());
    parts.join("\n")
}

/// Every reference across the chain, first occurrence per `(filename, page_num)`.
///
/// References with empty text are skipped and do not claim their key.
pub fn dedup_references(chain: &[Dialogue]) -> Vec<Reference> {
    let mut seen: HashSet<(&str, u32)> = HashSet::new();
    let mut pool = Vec::new();
    for reference in chain.iter().flat_map(|d| d.references.iter()) {
        if reference.text.is_empty() {
            continue;
        }
        if seen.insert((reference.filename.as_str(), reference.page_num)) {
            pool.push(reference.clone());
        }
    }
    pool
}

fn compose_full_context(conversation: &str, current_query: &str, references: &[Reference]) -> String {
    let mut parts = Vec::new();
    if !conversation.is_empty() {
        parts.push(conversation.to_string());
        parts.push(format!("\n{}", "=".repeat(50)));
    }
    parts.push(format!("CURRENT QUESTION: {current_query}"));

    if !references.is_empty() {
        parts.push("\nCURRENT REFERENCES:".to_string());
        for (i, reference) in references.iter().enumerate() {
            parts.push(format!("\n--- Current Reference {} ---", i + 1));
            push_reference_body(&mut parts, reference);
        }
    }

    parts.push(format!("\n{FULL_CONTEXT_INSTRUCTION}"));
    parts.join("\n")
}

fn push_reference_body(parts: &mut Vec<String>, reference: &Reference) {
    parts.push(format!("Source: {} (Page {})", reference.filename, reference.page_num));
    parts.push(format!("Content: {}", reference.text));
    if reference.similarity_score != 0.0 {
        parts.push(format!("Relevance: {:.1}%", reference.similarity_score * 100.0));
    }
}
