//! Dialogue records and the store that threads them into conversations.
//!
//! Every answered query becomes one immutable [`Dialogue`]. A follow-up
//! points at its predecessor through `previous_dialogue_id`, so a
//! conversation is a singly-linked chain walked backwards from its newest
//! node by [`DialogueStore::chain`].

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::document::Reference;
use crate::error::Result;

/// One persisted query/answer exchange.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Dialogue {
    pub id: String,
    pub user_id: String,
    pub query: String,
    /// Citations in ranked order.
    pub references: Vec<Reference>,
    pub response: String,
    /// The document scope the query was searched in; empty means all documents.
    pub document_ids: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_dialogue_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// The fields of a [`Dialogue`] supplied by the caller; the store assigns id and timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct NewDialogue {
    pub user_id: String,
    pub query: String,
    pub references: Vec<Reference>,
    pub response: String,
    pub document_ids: Vec<String>,
    pub previous_dialogue_id: Option<String>,
}

/// Persistence for [`Dialogue`]s.
///
/// Every read is ownership-checked: a dialogue belonging to another user is
/// reported exactly like a missing one. Implementations map backend
/// failures to [`RagError::PersistenceError`](crate::RagError::PersistenceError).
#[async_trait]
pub trait DialogueStore: Send + Sync {
    /// A short name for logs and error messages.
    fn name(&self) -> &str;

    /// Append a dialogue and return its id.
    async fn create(&self, dialogue: NewDialogue) -> Result<String>;

    /// The dialogue, if it exists and belongs to the user.
    async fn get(&self, dialogue_id: &str, user_id: &str) -> Result<Option<Dialogue>>;

    /// The user's most recent dialogues, newest first.
    async fn list_recent(&self, user_id: &str, limit: usize) -> Result<Vec<Dialogue>>;

    /// Delete one dialogue. Returns `false` if it was absent or not owned.
    ///
    /// Successors are left untouched; their chains end at the gap.
    async fn delete(&self, dialogue_id: &str, user_id: &str) -> Result<bool>;

    /// Walk the conversation ending at `dialogue_id`, oldest first.
    ///
    /// The walk stops without error at the first node that is missing, owned
    /// by someone else, fails to load, or was already visited, and after at
    /// most `max_depth` nodes. Whatever was collected up to that point is
    /// returned.
    async fn chain(&self, dialogue_id: &str, user_id: &str, max_depth: usize) -> Vec<Dialogue> {
        let mut chain = Vec::new();
        let mut visited = HashSet::new();
        let mut next = Some(dialogue_id.to_string());

        while let Some(id) = next.take() {
            if chain.len() >= max_depth {
                warn!(dialogue.id = %id, max_depth, "dialogue chain truncated at depth limit");
                break;
            }
            if !visited.insert(id.clone()) {
                warn!(dialogue.id = %id, "dialogue chain revisits a node");
                break;
            }
            match self.get(&id, user_id).await {
                Ok(Some(dialogue)) => {
                    next = dialogue.previous_dialogue_id.clone();
                    chain.push(dialogue);
                }
                Ok(None) => {
                    debug!(dialogue.id = %id, "dialogue chain ends at missing or foreign node");
                    break;
                }
                Err(e) => {
                    warn!(dialogue.id = %id, error = %e, "dialogue chain truncated by store error");
                    break;
                }
            }
        }

        chain.reverse();
        chain
    }
}
