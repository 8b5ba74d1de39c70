//! End-to-end tests for ingestion, question answering, and deletion.

mod common;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use common::{
    BatchRecordingStore, Harness, MockEmbeddingProvider, RecordingModel, StalledEmbeddingProvider,
    words,
};
use docqa_rag::prompt::{NO_RESULTS_RESPONSE, SYSTEM_PROMPT};
use docqa_rag::{
    AnswerRequest, DialogueStore, InMemoryChunkStore, InMemoryDialogueStore, InMemoryVectorStore,
    NewDialogue, QaEngine, RagConfig, RagError, Reference, TokenWindowChunker, WordTokenizer,
};

fn reference(filename: &str, page_num: u32, text: &str) -> Reference {
    Reference {
        text: text.to_string(),
        filename: filename.to_string(),
        page_num,
        document_id: "d1".to_string(),
        similarity_score: 0.5,
    }
}

fn new_dialogue(
    user_id: &str,
    query: &str,
    references: Vec<Reference>,
    previous: Option<String>,
) -> NewDialogue {
    NewDialogue {
        user_id: user_id.to_string(),
        query: query.to_string(),
        references,
        response: format!("answer to {query}"),
        document_ids: Vec::new(),
        previous_dialogue_id: previous,
    }
}

#[tokio::test]
async fn single_page_document_is_chunked_indexed_and_scoped() {
    let h = Harness::new();

    let report = h.engine.ingest_document("u1", "report.pdf", &[words(1200)]).await.unwrap();
    assert_eq!(report.page_count, 1);
    assert_eq!(report.chunk_count, 3);
    assert_eq!(report.vector_count, 3);

    let doc = report.document_id.clone();
    let expected_ids: Vec<String> = (0..3).map(|i| format!("{doc}_chunk_{i}")).collect();
    assert_eq!(h.vectors.ids("u1").await, expected_ids);

    let stored = h.chunks.chunks_for(&doc, "u1").await;
    assert_eq!(stored.len(), 3);
    assert!(stored[0].text.starts_with("w0 "));
    assert!(stored[1].text.starts_with("w450 "));
    assert!(stored[2].text.starts_with("w900 "));
    assert!(stored[2].text.ends_with("w1199"));
    assert!(stored.iter().all(|c| c.embedding.as_ref().is_some_and(|e| e.len() == 32)));

    let other = h.engine.ingest_document("u1", "other.pdf", &[words(300)]).await.unwrap();
    assert_eq!(other.chunk_count, 1);

    let answer = h
        .engine
        .answer_query(AnswerRequest::new("what is w42?", "u1").with_document_ids(vec![doc.clone()]))
        .await
        .unwrap();

    assert_eq!(answer.searched_document_ids, vec![doc.clone()]);
    assert_eq!(answer.reference_count, 3);
    assert!(answer.references.iter().all(|r| r.document_id == doc && r.filename == "report.pdf"));
    assert_eq!(h.model.calls(), 1);
    assert_eq!(h.model.last_system_prompt().as_deref(), Some(SYSTEM_PROMPT));
}

#[tokio::test]
async fn user_without_vectors_gets_fallback_and_dialogue_is_kept() {
    let h = Harness::new();

    let answer = h.engine.answer_query(AnswerRequest::new("anything?", "nobody")).await.unwrap();

    assert_eq!(answer.response, NO_RESULTS_RESPONSE);
    assert!(answer.references.is_empty());
    assert_eq!(answer.reference_count, 0);
    assert_eq!(h.model.calls(), 0);

    let history = h.engine.list_dialogues("nobody", 50).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].id, answer.dialogue_id);
    assert_eq!(history[0].response, NO_RESULTS_RESPONSE);
}

#[tokio::test]
async fn answer_result_serializes_reference_count_as_context_chunks_count() {
    let h = Harness::new();
    let answer = h.engine.answer_query(AnswerRequest::new("anything?", "u1")).await.unwrap();

    let json = serde_json::to_value(&answer).unwrap();
    assert_eq!(json["context_chunks_count"], 0);
    assert!(json.get("reference_count").is_none());
}

#[tokio::test]
async fn unscoped_query_ranks_across_documents_and_limits_context() {
    let config = RagConfig::builder().chunk_max_tokens(10).chunk_overlap(0).build().unwrap();
    let h = Harness::with_config(config);

    h.engine.ingest_document("u1", "a.pdf", &[words(60)]).await.unwrap();
    h.engine.ingest_document("u1", "b.pdf", &[words(60)]).await.unwrap();

    let answer = h.engine.answer_query(AnswerRequest::new("w3", "u1")).await.unwrap();

    assert_eq!(answer.reference_count, 8);
    assert!(answer.searched_document_ids.is_empty());
    for pair in answer.references.windows(2) {
        assert!(pair[0].similarity_score >= pair[1].similarity_score);
    }

    let prompt = h.model.last_user_prompt().unwrap();
    assert!(prompt.starts_with("Context from documents:\n[From "));
    assert_eq!(prompt.matches("[From ").count(), 8);
    assert!(prompt.contains("User question: w3"));
}

#[tokio::test]
async fn fan_out_represents_every_scoped_document() {
    let config = RagConfig::builder()
        .chunk_max_tokens(5)
        .chunk_overlap(0)
        .scoped_top_k(1)
        .build()
        .unwrap();
    let h = Harness::with_config(config);

    let a = h.engine.ingest_document("u1", "a.pdf", &[words(50)]).await.unwrap().document_id;
    let b = h.engine.ingest_document("u1", "b.pdf", &[words(50)]).await.unwrap().document_id;
    h.engine.ingest_document("u1", "c.pdf", &[words(50)]).await.unwrap();

    let answer = h
        .engine
        .answer_query(
            AnswerRequest::new("w7", "u1").with_document_ids(vec![a.clone(), "  ".into(), b.clone()]),
        )
        .await
        .unwrap();

    assert_eq!(answer.searched_document_ids, vec![a.clone(), b.clone()]);
    assert_eq!(answer.reference_count, 2);
    let cited: HashSet<&str> = answer.references.iter().map(|r| r.document_id.as_str()).collect();
    assert_eq!(cited, HashSet::from([a.as_str(), b.as_str()]));

    let stored = h.dialogues.get(&answer.dialogue_id, "u1").await.unwrap().unwrap();
    assert_eq!(stored.document_ids, vec![a, b]);
}

#[tokio::test]
async fn follow_up_searches_with_history_but_prompts_with_literal_query() {
    let h = Harness::new();
    h.engine.ingest_document("u1", "a.pdf", &[words(80)]).await.unwrap();

    let first = h.engine.answer_query(AnswerRequest::new("what is w1?", "u1")).await.unwrap();
    let second = h
        .engine
        .answer_query(AnswerRequest::new("and w2?", "u1").following(first.dialogue_id.clone()))
        .await
        .unwrap();

    let search_input = h.embedder.last_input().unwrap();
    assert!(search_input.starts_with("=== CONVERSATION HISTORY ==="));
    assert!(search_input.contains("Question: what is w1?"));
    assert!(search_input.contains(&format!("Answer: {}", first.response)));
    assert!(search_input.ends_with("\n\nCurrent Question: and w2?"));

    let prompt = h.model.last_user_prompt().unwrap();
    assert!(prompt.contains("User question: and w2?"));
    assert!(!prompt.contains("CONVERSATION HISTORY"));
    assert!(!prompt.contains("Current Question:"));

    let stored = h.dialogues.get(&second.dialogue_id, "u1").await.unwrap().unwrap();
    assert_eq!(stored.previous_dialogue_id.as_deref(), Some(first.dialogue_id.as_str()));

    let chain = h.dialogues.chain(&second.dialogue_id, "u1", 50).await;
    let queries: Vec<&str> = chain.iter().map(|d| d.query.as_str()).collect();
    assert_eq!(queries, vec!["what is w1?", "and w2?"]);
}

#[tokio::test]
async fn first_question_is_embedded_verbatim() {
    let h = Harness::new();
    h.engine.answer_query(AnswerRequest::new("plain question", "u1")).await.unwrap();
    assert_eq!(h.embedder.inputs(), vec!["plain question".to_string()]);
}

#[tokio::test]
async fn follow_up_to_unavailable_dialogue_answers_without_history() {
    let h = Harness::new();
    h.engine.ingest_document("u1", "a.pdf", &[words(50)]).await.unwrap();

    let first = h.engine.answer_query(AnswerRequest::new("what is w1?", "u1")).await.unwrap();
    h.engine.delete_dialogue(&first.dialogue_id, "u1").await.unwrap();

    let after_delete = h
        .engine
        .answer_query(AnswerRequest::new("and w2?", "u1").following(first.dialogue_id))
        .await
        .unwrap();
    assert_eq!(h.embedder.last_input().as_deref(), Some("and w2?"));
    assert_eq!(after_delete.reference_count, 1);
    let stored = h.dialogues.get(&after_delete.dialogue_id, "u1").await.unwrap().unwrap();
    assert_eq!(stored.previous_dialogue_id, None);

    let theirs = h.engine.answer_query(AnswerRequest::new("secret", "u2")).await.unwrap();
    let peek = h
        .engine
        .answer_query(AnswerRequest::new("peek", "u1").following(theirs.dialogue_id))
        .await
        .unwrap();
    assert_eq!(h.embedder.last_input().as_deref(), Some("peek"));
    assert!(!h.model.last_user_prompt().unwrap().contains("secret"));
    let stored = h.dialogues.get(&peek.dialogue_id, "u1").await.unwrap().unwrap();
    assert_eq!(stored.previous_dialogue_id, None);

    let orphan = h
        .engine
        .answer_query(AnswerRequest::new("anything?", "u1").following("missing"))
        .await
        .unwrap();
    assert_eq!(h.embedder.last_input().as_deref(), Some("anything?"));
    assert_eq!(h.engine.list_dialogues("u1", 50).await.unwrap()[0].id, orphan.dialogue_id);
}

#[tokio::test]
async fn history_stops_at_foreign_ancestor() {
    let h = Harness::new();
    let oldest = h.dialogues.create(new_dialogue("u1", "oldest", Vec::new(), None)).await.unwrap();
    let foreign =
        h.dialogues.create(new_dialogue("u2", "foreign", Vec::new(), Some(oldest))).await.unwrap();
    let newest =
        h.dialogues.create(new_dialogue("u1", "newest", Vec::new(), Some(foreign))).await.unwrap();

    let context = h.engine.context_builder().build_conversation_context(Some(newest.as_str()), "u1").await;
    assert!(context.contains("Question: newest"));
    assert!(!context.contains("foreign"));
    assert!(!context.contains("oldest"));
    assert!(context.contains("--- Previous Exchange 1 ---"));
    assert!(!context.contains("--- Previous Exchange 2 ---"));

    h.engine.answer_query(AnswerRequest::new("next", "u1").following(newest)).await.unwrap();
    let search_input = h.embedder.last_input().unwrap();
    assert!(!search_input.contains("oldest"));
}

#[tokio::test]
async fn history_cites_each_page_once() {
    let h = Harness::new();
    let first = h
        .dialogues
        .create(new_dialogue("u1", "q1", vec![reference("x.pdf", 3, "first text")], None))
        .await
        .unwrap();
    let second = h
        .dialogues
        .create(new_dialogue(
            "u1",
            "q2",
            vec![reference("x.pdf", 3, "second text"), reference("x.pdf", 4, "page four")],
            Some(first),
        ))
        .await
        .unwrap();

    let context = h.engine.context_builder().build_conversation_context(Some(second.as_str()), "u1").await;
    assert!(context.contains("Total Documents Referenced: 2"));
    assert!(context.contains("Content: first text"));
    assert!(!context.contains("second text"));
    assert!(context.contains("Source: x.pdf (Page 4)"));
}

#[tokio::test]
async fn full_context_appends_current_turn() {
    let h = Harness::new();
    let previous = h.dialogues.create(new_dialogue("u1", "q1", Vec::new(), None)).await.unwrap();

    let text = h
        .engine
        .context_builder()
        .build_full_context("q2", Some(previous.as_str()), "u1", &[reference("y.pdf", 1, "fresh")])
        .await;
    assert!(text.starts_with("=== CONVERSATION HISTORY ==="));
    assert!(text.contains("CURRENT QUESTION: q2"));
    assert!(text.contains("--- Current Reference 1 ---\nSource: y.pdf (Page 1)\nContent: fresh"));
}

#[tokio::test]
async fn model_failure_propagates_and_nothing_is_persisted() {
    let h = Harness::with_model(RecordingModel::failing());
    h.engine.ingest_document("u1", "a.pdf", &[words(20)]).await.unwrap();

    let err = h.engine.answer_query(AnswerRequest::new("w1", "u1")).await.unwrap_err();
    assert!(matches!(err, RagError::AnswerGenerationError { .. }));
    assert!(h.engine.list_dialogues("u1", 50).await.unwrap().is_empty());
}

#[tokio::test]
async fn blank_query_or_user_is_rejected() {
    let h = Harness::new();
    let err = h.engine.answer_query(AnswerRequest::new("  ", "u1")).await.unwrap_err();
    assert!(matches!(err, RagError::InvalidConfiguration(_)));
    let err = h.engine.ingest_document("", "a.pdf", &[words(3)]).await.unwrap_err();
    assert!(matches!(err, RagError::InvalidConfiguration(_)));
}

#[tokio::test]
async fn empty_document_writes_nothing() {
    let h = Harness::new();
    let report = h.engine.ingest_document("u1", "blank.pdf", &["".into(), " \n ".into()]).await.unwrap();
    assert_eq!(report.page_count, 2);
    assert_eq!(report.chunk_count, 0);
    assert_eq!(report.vector_count, 0);
    assert_eq!(h.vectors.len("u1").await, 0);
    assert!(h.engine.list_documents("u1").await.unwrap().is_empty());
}

#[tokio::test]
async fn delete_document_removes_chunks_and_vectors() {
    let config = RagConfig::builder()
        .chunk_max_tokens(10)
        .chunk_overlap(2)
        .delete_batch_size(2)
        .build()
        .unwrap();
    let h = Harness::with_config(config);

    let doc = h.engine.ingest_document("u1", "a.pdf", &[words(40)]).await.unwrap();
    let keep = h.engine.ingest_document("u1", "b.pdf", &[words(10)]).await.unwrap();
    assert_eq!(doc.chunk_count, 5);

    let err = h.engine.delete_document(&doc.document_id, "u2").await.unwrap_err();
    assert!(matches!(err, RagError::NotFound(_)));

    let report = h.engine.delete_document(&doc.document_id, "u1").await.unwrap();
    assert_eq!(report.filename, "a.pdf");
    assert_eq!(report.chunks_deleted, 5);
    assert_eq!(report.vectors_deleted, 5);
    assert_eq!(h.vectors.ids("u1").await, vec![format!("{}_chunk_0", keep.document_id)]);

    let docs = h.engine.list_documents("u1").await.unwrap();
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].filename, "b.pdf");

    let err = h.engine.delete_document(&doc.document_id, "u1").await.unwrap_err();
    assert!(matches!(err, RagError::NotFound(_)));
}

#[tokio::test]
async fn dialogues_are_listed_newest_first_and_deleted_by_owner() {
    let h = Harness::new();
    let first = h.engine.answer_query(AnswerRequest::new("q1", "u1")).await.unwrap();
    let second = h.engine.answer_query(AnswerRequest::new("q2", "u1")).await.unwrap();

    let listed = h.engine.list_dialogues("u1", 1).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, second.dialogue_id);

    let err = h.engine.delete_dialogue(&first.dialogue_id, "u2").await.unwrap_err();
    assert!(matches!(err, RagError::NotFound(_)));
    h.engine.delete_dialogue(&first.dialogue_id, "u1").await.unwrap();

    let remaining = h.engine.list_dialogues("u1", 50).await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, second.dialogue_id);
}

#[tokio::test(start_paused = true)]
async fn stalled_embedding_times_out() {
    let config =
        RagConfig::builder().embedding_timeout(Duration::from_secs(2)).build().unwrap();
    let engine = QaEngine::builder()
        .config(config)
        .embedding_provider(Arc::new(StalledEmbeddingProvider))
        .vector_store(Arc::new(InMemoryVectorStore::new()))
        .chunk_store(Arc::new(InMemoryChunkStore::new()))
        .dialogue_store(Arc::new(InMemoryDialogueStore::new()))
        .chunker(Arc::new(TokenWindowChunker::new(Arc::new(WordTokenizer), 500, 50).unwrap()))
        .answering_model(Arc::new(RecordingModel::default()))
        .build()
        .unwrap();

    let err = engine.answer_query(AnswerRequest::new("hello", "u1")).await.unwrap_err();
    assert!(matches!(err, RagError::EmbeddingError { ref provider, .. } if provider == "stalled"));

    let err = engine.ingest_document("u1", "a.pdf", &[words(5)]).await.unwrap_err();
    assert!(matches!(err, RagError::EmbeddingError { .. }));
}

fn engine_over(vectors: Arc<BatchRecordingStore>, chunks: Arc<InMemoryChunkStore>) -> QaEngine {
    let config = RagConfig::builder()
        .chunk_max_tokens(10)
        .chunk_overlap(2)
        .upsert_batch_size(2)
        .build()
        .unwrap();
    QaEngine::builder()
        .config(config)
        .embedding_provider(Arc::new(MockEmbeddingProvider::new(8)))
        .vector_store(vectors)
        .chunk_store(chunks)
        .dialogue_store(Arc::new(InMemoryDialogueStore::new()))
        .chunker(Arc::new(TokenWindowChunker::new(Arc::new(WordTokenizer), 10, 2).unwrap()))
        .answering_model(Arc::new(RecordingModel::default()))
        .build()
        .unwrap()
}

#[tokio::test]
async fn ingest_upserts_vectors_in_batches() {
    let vectors = Arc::new(BatchRecordingStore::new());
    let engine = engine_over(vectors.clone(), Arc::new(InMemoryChunkStore::new()));

    let report = engine.ingest_document("u1", "a.pdf", &[words(40)]).await.unwrap();
    assert_eq!(report.chunk_count, 5);
    assert_eq!(report.vector_count, 5);
    assert_eq!(vectors.batches(), vec![2, 2, 1]);

    let expected: Vec<String> =
        (0..5).map(|i| format!("{}_chunk_{i}", report.document_id)).collect();
    assert_eq!(vectors.inner.ids("u1").await, expected);
}

#[tokio::test]
async fn failed_indexing_discards_the_document() {
    let vectors = Arc::new(BatchRecordingStore::failing_after(1));
    let chunks = Arc::new(InMemoryChunkStore::new());
    let engine = engine_over(vectors.clone(), chunks.clone());

    let err = engine.ingest_document("u1", "a.pdf", &[words(40)]).await.unwrap_err();
    assert!(matches!(err, RagError::RetrievalError { .. }));
    assert_eq!(vectors.batches(), vec![2]);

    assert!(engine.list_documents("u1").await.unwrap().is_empty());
    assert!(vectors.inner.ids("u1").await.is_empty());
}

