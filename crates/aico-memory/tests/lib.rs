// Copyright 2026 - developers of the AICO project.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.
//! End-to-end exercises of `spec.md` §8 scenario 4 ("ingest -> recall")
//! and scenario 5 ("per-user isolation"), against a fake downstream
//! standing in for the external embedding/NER model runtime.
use aico_memory::{
    FactType, MemoryPipeline, PipelineConfig, SegmentationConfig, Turn, VectorStore,
};
use aico_queue::{Downstream, DownstreamError, QueueConfig, RequestQueue};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

const EMBED_DIM: usize = 64;

fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_string())
        .collect()
}

fn bag_of_words_embedding(text: &str) -> Vec<f32> {
    let mut buckets = vec![0f32; EMBED_DIM];
    for word in tokenize(text) {
        let mut hash: u64 = 5381;
        for byte in word.bytes() {
            hash = hash.wrapping_mul(33).wrapping_add(byte as u64);
        }
        buckets[(hash as usize) % EMBED_DIM] += 1.0;
    }
    buckets
}

/// Stands in for the real model runtime: `embedding` returns a
/// deterministic bag-of-words vector (so textually-related sentences
/// score higher, without pulling in a live model), `ner` does a literal
/// "Whiskers" lookup matching the NER prompt's JSON contract.
struct FakeModelDownstream;

#[async_trait]
impl Downstream for FakeModelDownstream {
    async fn call(&self, operation: &str, items: Vec<Vec<u8>>) -> Result<Vec<Vec<u8>>, DownstreamError> {
        match operation {
            "embedding" => Ok(items
                .into_iter()
                .map(|item| {
                    let text = String::from_utf8_lossy(&item).to_string();
                    let embedding = bag_of_words_embedding(&text);
                    embedding.iter().flat_map(|v| v.to_le_bytes()).collect()
                })
                .collect()),
            "ner" => Ok(items
                .into_iter()
                .map(|item| {
                    let text = String::from_utf8_lossy(&item).to_string();
                    let body = if text.to_lowercase().contains("whiskers") {
                        r#"[{"text":"Whiskers","label":"ANIMAL"}]"#
                    } else {
                        "[]"
                    };
                    body.as_bytes().to_vec()
                })
                .collect()),
            other => Err(DownstreamError::Fatal(format!("unsupported op {other}"))),
        }
    }
}

fn turn(speaker: &str, text: &str, ts: i64) -> Turn {
    Turn {
        speaker: speaker.into(),
        text: text.into(),
        timestamp_ms: ts,
    }
}

async fn build_pipeline() -> (MemoryPipeline, Arc<RequestQueue>) {
    let downstream = Arc::new(FakeModelDownstream);
    let queue = Arc::new(RequestQueue::new(
        downstream,
        QueueConfig {
            rate_limit_per_second: 1000.0,
            batch_size: 4,
            batch_timeout: Duration::from_millis(50),
            batch_tick: Duration::from_millis(5),
            ..QueueConfig::default()
        },
    ));
    queue.start(2);
    let store = Arc::new(VectorStore::open_temporary().unwrap());
    let config = PipelineConfig {
        segmentation: SegmentationConfig {
            max_gap_ms: i64::MAX,
            max_turns: 10,
        },
        ..PipelineConfig::default()
    };
    let pipeline = MemoryPipeline::new(queue.clone(), store, config);
    (pipeline, queue)
}

#[tokio::test]
async fn ingest_then_recall_surfaces_the_right_fact() {
    let (pipeline, queue) = build_pipeline().await;

    let turns = vec![
        turn("user", "My cat is named Whiskers.", 0),
        turn("user", "He is 3 years old.", 1000),
    ];
    let outcome = pipeline.ingest(&turns, "conv-1", "u1").await.unwrap();
    assert!(outcome.segments_stored >= 1);
    assert!(outcome.facts_stored >= 1);

    let results = pipeline
        .recall("What is my cat's name?", "u1", None, 5)
        .await
        .unwrap();
    assert!(!results.is_empty());
    assert!(results.iter().any(|r| r.content.contains("Whiskers")));
    for r in &results {
        assert_eq!(
            r.metadata.get("user_id").and_then(|v| v.as_str()),
            Some("u1")
        );
    }

    queue.stop(Duration::from_secs(1)).await;
}

#[tokio::test]
async fn ingest_is_idempotent_per_conversation_and_turn_range() {
    let (pipeline, queue) = build_pipeline().await;
    let turns = vec![turn("user", "I like hiking every weekend.", 0)];

    let first = pipeline.ingest(&turns, "conv-2", "u1").await.unwrap();
    let second = pipeline.ingest(&turns, "conv-2", "u1").await.unwrap();

    assert!(first.segments_stored >= 1);
    assert_eq!(second.segments_stored, 0);
    assert_eq!(second.facts_stored, 0);

    queue.stop(Duration::from_secs(1)).await;
}

#[tokio::test]
async fn per_user_isolation_and_deletion() {
    let (pipeline, queue) = build_pipeline().await;

    pipeline
        .ingest(&[turn("user", "My favorite color is blue.", 0)], "conv-3", "u1")
        .await
        .unwrap();
    pipeline
        .ingest(&[turn("user", "My favorite color is red.", 0)], "conv-4", "u2")
        .await
        .unwrap();

    let u1_results = pipeline.recall("What is my favorite color?", "u1", None, 10).await.unwrap();
    assert!(u1_results.iter().all(|r| r.metadata.get("user_id").and_then(|v| v.as_str()) == Some("u1")));

    let removed = pipeline.delete_user_data("u1").unwrap();
    assert!(removed > 0);

    let after_delete = pipeline.recall("What is my favorite color?", "u1", None, 10).await.unwrap();
    assert!(after_delete.is_empty());

    let u2_results = pipeline.recall("What is my favorite color?", "u2", None, 10).await.unwrap();
    assert!(!u2_results.is_empty());

    queue.stop(Duration::from_secs(1)).await;
}

#[tokio::test]
async fn vector_store_persists_across_reopen() {
    let dir = tempfile::tempdir().unwrap();

    {
        let store = aico_memory::VectorStore::open(dir.path()).unwrap();
        let record = aico_memory::VectorRecord {
            id: "persisted-1".into(),
            embedding: vec![0.1, 0.2, 0.3],
            document: "durable fact".into(),
            metadata: Default::default(),
        };
        store.put(aico_memory::COLLECTION_USER_FACTS, &record).unwrap();
        store.flush().unwrap();
    }

    let reopened = aico_memory::VectorStore::open(dir.path()).unwrap();
    let fetched = reopened
        .get(aico_memory::COLLECTION_USER_FACTS, "persisted-1")
        .unwrap()
        .unwrap();
    assert_eq!(fetched.document, "durable fact");
}

#[tokio::test]
async fn curate_fact_stores_with_full_confidence() {
    let (pipeline, queue) = build_pipeline().await;
    let fact = pipeline
        .curate_fact("u1", "msg-1", "identity", "Prefers to be called Ali.", FactType::Identity, 0)
        .await
        .unwrap();
    assert_eq!(fact.confidence, 1.0);
    assert!(!fact.immutable);

    let results = pipeline.recall("What should I call the user?", "u1", None, 5).await.unwrap();
    assert!(results.iter().any(|r| r.content.contains("Ali")));

    queue.stop(Duration::from_secs(1)).await;
}
