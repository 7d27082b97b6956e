//! # Question Answering Tests

mod common;

use common::setup_tracing;
use ctfrag::ask::{Answer, QuestionAnswerer, ANSWER_FAILED_MESSAGE};
use ctfrag::providers::db::{DocumentStore, TursoDocumentStore};
use ctfrag::types::WriteupRecord;
use ctfrag::vector::{EmbeddingEntry, TursoVectorIndex, VectorIndex};
use ctfrag_test_utils::{MockAiProvider, MockEmbedder, TestSetup};

const ENDPOINT: &str = "detailed-endpoint";
const QUESTION: &str = "How do I leak libc with a format string?";

fn chunk(document: &str, index: usize, embedding: Vec<f32>) -> EmbeddingEntry {
    EmbeddingEntry {
        id: format!("{document}_chunk_{index}"),
        embedding,
        document_id: Some(document.to_string()),
        chunk_index: Some(index),
    }
}

/// Two stored write-ups; document 6 is closer to the question than document 5.
async fn populated(setup: &TestSetup) -> (TursoDocumentStore, TursoVectorIndex) {
    let store = setup.document_store().await.unwrap();
    store
        .upsert(&WriteupRecord {
            ctftime_id: 5,
            original_writeup_url: "https://blog.example/fmt".to_string(),
            task_name: "fmt-leak".to_string(),
            rag_summary: "Leak with %p, then overwrite the GOT.".to_string(),
            rewritten_full_text: "Step 1: send %p...".to_string(),
            ..WriteupRecord::default()
        })
        .await
        .unwrap();
    store
        .upsert(&WriteupRecord {
            ctftime_id: 6,
            task_name: "printf-party".to_string(),
            rag_summary: "Format string to leak a libc pointer.".to_string(),
            rewritten_full_text: "Use %3$p to read __libc_start_main.".to_string(),
            ..WriteupRecord::default()
        })
        .await
        .unwrap();

    let index = setup.vector_index().await.unwrap();
    index
        .update_embeddings(
            "detailed",
            &[
                chunk("6", 0, vec![1.0, 0.0]),
                chunk("5", 0, vec![0.8, 0.2]),
                chunk("5", 1, vec![0.0, 1.0]),
            ],
            true,
        )
        .await
        .unwrap();
    index.deploy("detailed", ENDPOINT).await.unwrap();
    (store, index)
}

#[tokio::test]
async fn test_answer_uses_retrieved_writeups_as_context() {
    // --- 1. Arrange ---
    setup_tracing();
    let setup = TestSetup::new().await.unwrap();
    let (store, index) = populated(&setup).await;
    let embedder = MockEmbedder::new(vec![0.0, 0.0]);
    embedder.add_vector(QUESTION, vec![1.0, 0.0]);
    let ai = MockAiProvider::new();
    ai.add_response("Question: How do I leak libc", "Leak a libc pointer with %3$p.");
    let answerer = QuestionAnswerer {
        embedder: &embedder,
        index: &index,
        store: &store,
        ai: &ai,
        endpoint: ENDPOINT,
        neighbors: 3,
    };

    // --- 2. Act ---
    let answer = answerer.ask(QUESTION).await.unwrap();

    // --- 3. Assert ---
    assert_eq!(
        answer,
        Answer::Answered {
            text: "Leak a libc pointer with %3$p.".to_string(),
            sources: vec![
                "printf-party".to_string(),
                "https://blog.example/fmt".to_string()
            ],
        }
    );

    let calls = ai.get_calls();
    assert_eq!(calls.len(), 1);
    let (system, user) = &calls[0];
    assert!(system.is_empty());
    let closest = user.find("Title: printf-party").unwrap();
    let further = user.find("Title: fmt-leak").unwrap();
    assert!(closest < further);
    assert!(user.contains("Source: N/A"));
    assert!(user.contains("Full Write-up:\nUse %3$p to read __libc_start_main.\n---"));
    assert!(user.trim_end().ends_with(&format!("Question: {QUESTION}")));
}

#[tokio::test]
async fn test_neighbors_limit_the_documents() {
    // --- 1. Arrange ---
    let setup = TestSetup::new().await.unwrap();
    let (store, index) = populated(&setup).await;
    let embedder = MockEmbedder::new(vec![1.0, 0.0]);
    let ai = MockAiProvider::new();
    let answerer = QuestionAnswerer {
        embedder: &embedder,
        index: &index,
        store: &store,
        ai: &ai,
        endpoint: ENDPOINT,
        neighbors: 1,
    };

    // --- 2. Act ---
    let records = answerer.retrieve(QUESTION).await.unwrap();

    // --- 3. Assert ---
    let ids: Vec<u64> = records.iter().map(|r| r.ctftime_id).collect();
    assert_eq!(ids, vec![6]);
}

#[tokio::test]
async fn test_no_context_skips_the_model() {
    // --- 1. Arrange ---
    let setup = TestSetup::new().await.unwrap();
    let store = setup.document_store().await.unwrap();
    let index = setup.vector_index().await.unwrap();
    index
        .update_embeddings(
            "detailed",
            &[EmbeddingEntry {
                id: "notes".to_string(),
                embedding: vec![1.0, 0.0],
                document_id: None,
                chunk_index: None,
            }],
            true,
        )
        .await
        .unwrap();
    index.deploy("detailed", ENDPOINT).await.unwrap();
    let embedder = MockEmbedder::new(vec![1.0, 0.0]);
    let ai = MockAiProvider::new();
    let answerer = QuestionAnswerer {
        embedder: &embedder,
        index: &index,
        store: &store,
        ai: &ai,
        endpoint: ENDPOINT,
        neighbors: 5,
    };

    // --- 2. Act ---
    let answer = answerer.ask(QUESTION).await.unwrap();

    // --- 3. Assert ---
    assert_eq!(answer, Answer::NoContext);
    assert!(ai.get_calls().is_empty());
}

#[tokio::test]
async fn test_model_failure_still_lists_sources() {
    // --- 1. Arrange ---
    let setup = TestSetup::new().await.unwrap();
    let (store, index) = populated(&setup).await;
    let embedder = MockEmbedder::new(vec![0.0, 1.0]);
    let ai = MockAiProvider::new();
    let answerer = QuestionAnswerer {
        embedder: &embedder,
        index: &index,
        store: &store,
        ai: &ai,
        endpoint: ENDPOINT,
        neighbors: 1,
    };

    // --- 2. Act ---
    let answer = answerer.ask(QUESTION).await.unwrap();

    // --- 3. Assert ---
    assert_eq!(
        answer,
        Answer::Answered {
            text: ANSWER_FAILED_MESSAGE.to_string(),
            sources: vec!["https://blog.example/fmt".to_string()],
        }
    );
}

#[tokio::test]
async fn test_unknown_endpoint_is_an_error() {
    // --- 1. Arrange ---
    let setup = TestSetup::new().await.unwrap();
    let (store, index) = populated(&setup).await;
    let embedder = MockEmbedder::new(vec![1.0, 0.0]);
    let ai = MockAiProvider::new();
    let answerer = QuestionAnswerer {
        embedder: &embedder,
        index: &index,
        store: &store,
        ai: &ai,
        endpoint: "nowhere",
        neighbors: 3,
    };

    // --- 2. Act ---
    let result = answerer.ask(QUESTION).await;

    // --- 3. Assert ---
    assert!(result.is_err());
    assert!(ai.get_calls().is_empty());
}
