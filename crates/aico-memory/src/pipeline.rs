// Copyright 2026 - developers of the AICO project.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.
//! `spec.md` §4.5: the orchestrator tying segmentation, extraction, the
//! embedding queue, and the vector store into `ingest`/`recall`/
//! `curate_fact`/`delete_user_data`.
use crate::cache::QueryEmbeddingCache;
use crate::errors::MemoryError;
use crate::extract::{extract_facts, parse_ner_response};
use crate::segment::{segment_turns, SegmentationConfig};
use crate::store::{cosine_similarity, VectorStore, COLLECTION_CONVERSATION_SEGMENTS, COLLECTION_USER_FACTS};
use crate::types::{put_json_field, ConversationSegment, FactType, Metadata, MetadataValue, Turn, UserFact, VectorRecord};
use aico_queue::{QueueError, RequestQueue};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

const EMBEDDING_OPERATION: &str = "embedding";
const NER_OPERATION: &str = "ner";
const PRIORITY_NORMAL: i32 = 0;

/// Queue/segmentation/retrieval tuning, the `memory.semantic.*` and
/// related options of `spec.md` §6.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    pub segmentation: SegmentationConfig,
    /// Facts below this confidence are discarded (`spec.md` §4.5 stage 3,
    /// typical 0.4).
    pub fact_confidence_floor: f32,
    /// Entity-match boost multiplier, capped at 1.0 after application
    /// (`spec.md` §4.5 "Retrieval algorithm", typical 2.5).
    pub entity_boost_factor: f32,
    /// Retention horizon for non-immutable facts, in milliseconds
    /// (`spec.md` §4.5 stage 6, typical 90 days).
    pub retention_horizon_ms: i64,
    pub embedding_timeout: Duration,
    pub ner_timeout: Duration,
    pub query_cache_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            segmentation: SegmentationConfig::default(),
            fact_confidence_floor: 0.4,
            entity_boost_factor: 2.5,
            retention_horizon_ms: 90 * 24 * 60 * 60 * 1000,
            embedding_timeout: Duration::from_secs(5),
            ner_timeout: Duration::from_secs(120),
            query_cache_capacity: 256,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct IngestOutcome {
    pub segments_stored: usize,
    pub facts_stored: usize,
}

#[derive(Clone, Debug)]
pub struct RecalledRecord {
    pub content: String,
    pub similarity: f32,
    pub metadata: Metadata,
}

/// Equality filters applied alongside the mandatory `user_id` filter.
pub type RecallFilters = BTreeMap<String, MetadataValue>;

pub struct MemoryPipeline {
    queue: Arc<RequestQueue>,
    store: Arc<VectorStore>,
    config: PipelineConfig,
    query_cache: QueryEmbeddingCache,
}

fn bytes_to_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

impl MemoryPipeline {
    pub fn new(queue: Arc<RequestQueue>, store: Arc<VectorStore>, config: PipelineConfig) -> Self {
        let query_cache = QueryEmbeddingCache::new(config.query_cache_capacity);
        Self {
            queue,
            store,
            config,
            query_cache,
        }
    }

    async fn embed(&self, text: &str) -> Result<(Vec<f32>, bool), QueueError> {
        let (data, degraded) = self
            .queue
            .submit(
                EMBEDDING_OPERATION,
                text.as_bytes().to_vec(),
                PRIORITY_NORMAL,
                Some(self.config.embedding_timeout),
            )
            .await?;
        Ok((bytes_to_embedding(&data), degraded))
    }

    async fn extract_entities(&self, text: &str) -> Vec<crate::types::Entity> {
        match self
            .queue
            .submit(
                NER_OPERATION,
                text.as_bytes().to_vec(),
                PRIORITY_NORMAL,
                Some(self.config.ner_timeout),
            )
            .await
        {
            Ok((data, _degraded)) => parse_ner_response(&data),
            Err(error) => {
                log::warn!("entity extraction failed, continuing without entities: {error}");
                Vec::new()
            }
        }
    }

    /// `spec.md` §4.5 public contract: idempotent per
    /// `(conversation_id, turn_range)`. A segment whose id already exists
    /// in the store is skipped entirely — including its fact candidates —
    /// so a repeated `ingest` call is a no-op.
    pub async fn ingest(
        &self,
        turns: &[Turn],
        conversation_id: &str,
        user_id: &str,
    ) -> Result<IngestOutcome, MemoryError> {
        let mut outcome = IngestOutcome::default();
        let segments = segment_turns(turns, conversation_id, user_id, &self.config.segmentation);

        for mut segment in segments {
            if self.store.exists(COLLECTION_CONVERSATION_SEGMENTS, &segment.id)? {
                log::debug!("segment {} already ingested, skipping", segment.id);
                continue;
            }

            segment.entities = self.extract_entities(&segment.text).await;

            let segment_embedding = match self.embed(&segment.text).await {
                Ok((embedding, degraded)) => {
                    if degraded {
                        log::warn!("segment {} embedded in degraded mode", segment.id);
                    }
                    embedding
                }
                Err(error) => {
                    log::error!(
                        "segment {} embedding failed entirely, skipping storage (turn not lost, source remains): {error}",
                        segment.id
                    );
                    continue;
                }
            };

            if let Err(error) = self.store_segment(&segment, segment_embedding) {
                log::error!("segment {} storage failed: {error}", segment.id);
                continue;
            }
            outcome.segments_stored += 1;

            let candidates = extract_facts(&segment.text, self.config.fact_confidence_floor);
            for candidate in candidates {
                match self.embed(&candidate.content).await {
                    Ok((embedding, degraded)) => {
                        if degraded {
                            log::warn!("fact embedding degraded for segment {}", segment.id);
                        }
                        let entity_texts: Vec<String> =
                            segment.entities.iter().map(|e| e.text.clone()).collect();
                        let fact = UserFact::new(
                            user_id,
                            candidate.content,
                            candidate.fact_type,
                            candidate.category,
                            candidate.confidence,
                            segment.id.clone(),
                            entity_texts,
                            segment.timestamp_ms,
                        );
                        match self.store_fact(&fact, embedding) {
                            Ok(()) => outcome.facts_stored += 1,
                            Err(error) => log::error!("fact {} storage failed: {error}", fact.fact_id),
                        }
                    }
                    Err(error) => {
                        log::warn!("fact embedding failed, skipping that fact only: {error}");
                    }
                }
            }
        }

        Ok(outcome)
    }

    fn store_segment(&self, segment: &ConversationSegment, embedding: Vec<f32>) -> Result<(), MemoryError> {
        let mut metadata = Metadata::new();
        metadata.insert("user_id".into(), segment.user_id.clone().into());
        metadata.insert("conversation_id".into(), segment.conversation_id.clone().into());
        metadata.insert("turn_start".into(), (segment.turn_start as f64).into());
        metadata.insert("turn_end".into(), (segment.turn_end as f64).into());
        metadata.insert("timestamp_ms".into(), (segment.timestamp_ms as f64).into());
        put_json_field(&mut metadata, "entities", &segment.entities)
            .map_err(|e| MemoryError::Serialization(e.to_string()))?;

        let record = VectorRecord {
            id: segment.id.clone(),
            embedding,
            document: segment.text.clone(),
            metadata,
        };
        self.retry_store_write(COLLECTION_CONVERSATION_SEGMENTS, &record)
    }

    fn store_fact(&self, fact: &UserFact, embedding: Vec<f32>) -> Result<(), MemoryError> {
        let mut metadata = Metadata::new();
        metadata.insert("user_id".into(), fact.user_id.clone().into());
        metadata.insert("fact_type".into(), fact.fact_type.as_str().into());
        metadata.insert("category".into(), fact.category.clone().into());
        metadata.insert("confidence".into(), (fact.confidence as f64).into());
        metadata.insert("source_segment_id".into(), fact.source_segment_id.clone().into());
        metadata.insert("created_at".into(), (fact.created_at as f64).into());
        metadata.insert("immutable".into(), fact.immutable.into());
        metadata.insert("deleted".into(), fact.deleted.into());
        if let Some(valid_until) = fact.valid_until {
            metadata.insert("valid_until".into(), (valid_until as f64).into());
        }
        put_json_field(&mut metadata, "entities", &fact.entities)
            .map_err(|e| MemoryError::Serialization(e.to_string()))?;

        let record = VectorRecord {
            id: fact.fact_id.to_string(),
            embedding,
            document: fact.content.clone(),
            metadata,
        };
        self.retry_store_write(COLLECTION_USER_FACTS, &record)
    }

    /// `spec.md` §4.5 "Failure semantics": storage failures are retried
    /// once inline, then surfaced.
    fn retry_store_write(&self, collection: &str, record: &VectorRecord) -> Result<(), MemoryError> {
        match self.store.put(collection, record) {
            Ok(()) => Ok(()),
            Err(_) => self.store.put(collection, record),
        }
    }

    /// `spec.md` §4.5 "Retrieval algorithm".
    pub async fn recall(
        &self,
        query_text: &str,
        user_id: &str,
        filters: Option<RecallFilters>,
        max_results: usize,
    ) -> Result<Vec<RecalledRecord>, MemoryError> {
        self.recall_in(COLLECTION_USER_FACTS, query_text, user_id, filters, max_results)
            .await
    }

    /// Recall scoped to a specific collection; `recall` is the
    /// `user_facts`-scoped default the public contract describes, this is
    /// the generalization used by tests and by anyone who also wants to
    /// search `conversation_segments`.
    pub async fn recall_in(
        &self,
        collection: &str,
        query_text: &str,
        user_id: &str,
        filters: Option<RecallFilters>,
        max_results: usize,
    ) -> Result<Vec<RecalledRecord>, MemoryError> {
        let query_embedding = match self.query_cache.get(query_text) {
            Some(embedding) => embedding,
            None => {
                let (embedding, _degraded) = self
                    .embed(query_text)
                    .await
                    .map_err(|e| MemoryError::Store(format!("query embedding failed: {e}")))?;
                self.query_cache.put(query_text, embedding.clone());
                embedding
            }
        };

        let query_lower = query_text.to_lowercase();
        let mut scored: Vec<(f32, VectorRecord)> = self
            .store
            .scan(collection)?
            .into_iter()
            .filter(|record| {
                record
                    .metadata
                    .get("user_id")
                    .and_then(|v| v.as_str())
                    .map(|v| v == user_id)
                    .unwrap_or(false)
            })
            .filter(|record| matches_filters(&record.metadata, filters.as_ref()))
            .map(|record| {
                let mut score = cosine_similarity(&query_embedding, &record.embedding);
                if entity_matches(&record.metadata, &query_lower) {
                    score = (score * self.config.entity_boost_factor).min(1.0);
                }
                (score, record)
            })
            .collect();

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(max_results);

        Ok(scored
            .into_iter()
            .map(|(similarity, record)| RecalledRecord {
                content: record.document,
                similarity,
                metadata: record.metadata,
            })
            .collect())
    }

    /// `spec.md` §4.5 public contract: a user-curated fact, stored with
    /// elevated confidence and no source segment (it did not come from
    /// extraction).
    pub async fn curate_fact(
        &self,
        user_id: &str,
        source_message: &str,
        category: &str,
        content: &str,
        fact_type: FactType,
        created_at: i64,
    ) -> Result<UserFact, MemoryError> {
        if content.trim().is_empty() {
            return Err(MemoryError::InvalidFact("content must not be empty".into()));
        }
        let fact = UserFact::new(
            user_id,
            content,
            fact_type,
            category,
            1.0,
            format!("curated:{source_message}"),
            Vec::new(),
            created_at,
        );
        let (embedding, _degraded) = self
            .embed(content)
            .await
            .map_err(|e| MemoryError::Store(format!("fact embedding failed: {e}")))?;
        self.store_fact(&fact, embedding)?;
        Ok(fact)
    }

    /// `spec.md` §4.5 public contract: GDPR-style erasure across both
    /// collections. Returns the total number of records removed.
    pub fn delete_user_data(&self, user_id: &str) -> Result<usize, MemoryError> {
        let facts = self.store.delete_by_user(COLLECTION_USER_FACTS, user_id)?;
        let segments = self.store.delete_by_user(COLLECTION_CONVERSATION_SEGMENTS, user_id)?;
        Ok(facts + segments)
    }

    /// `spec.md` §4.5 stage 6: non-immutable facts older than the
    /// retention horizon become eligible for cleanup. `now_ms` is passed
    /// in rather than read from the clock, so callers control the cutoff
    /// deterministically (tests, scheduled jobs).
    pub fn cleanup_expired_facts(&self, now_ms: i64) -> Result<usize, MemoryError> {
        let mut removed = 0;
        for record in self.store.scan(COLLECTION_USER_FACTS)? {
            let immutable = record
                .metadata
                .get("immutable")
                .map(|v| matches!(v, MetadataValue::Bool(true)))
                .unwrap_or(false);
            if immutable {
                continue;
            }
            let created_at = record
                .metadata
                .get("created_at")
                .and_then(|v| match v {
                    MetadataValue::Num(n) => Some(*n as i64),
                    _ => None,
                })
                .unwrap_or(now_ms);
            if now_ms - created_at > self.config.retention_horizon_ms {
                self.store.delete(COLLECTION_USER_FACTS, &record.id)?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}

fn matches_filters(metadata: &Metadata, filters: Option<&RecallFilters>) -> bool {
    let Some(filters) = filters else {
        return true;
    };
    filters.iter().all(|(key, value)| metadata.get(key) == Some(value))
}

/// `spec.md` §4.5 "entity-match boost": any entity value (via the
/// `entities_json` field or a raw `entities` field, case-insensitive)
/// occurring literally in the query text.
fn entity_matches(metadata: &Metadata, query_lower: &str) -> bool {
    let Some(MetadataValue::Str(json)) = metadata.get("entities_json") else {
        return false;
    };
    let Ok(entities) = serde_json::from_str::<Vec<crate::types::Entity>>(json) else {
        return false;
    };
    entities
        .iter()
        .any(|entity| !entity.text.is_empty() && query_lower.contains(&entity.text.to_lowercase()))
}
