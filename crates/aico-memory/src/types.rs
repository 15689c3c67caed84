// Copyright 2026 - developers of the AICO project.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.
//! The entities of `spec.md` §3: conversation turns/segments, typed
//! user facts, and the flattened vector-store record shape.
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// UTC millisecond timestamp, matching `aico_envelope::TimestampMs`
/// (this crate does not depend on `aico-envelope` to avoid a cross-budget
/// dependency the teacher's own crate graph doesn't have).
pub type TimestampMs = i64;

/// One turn of a conversation, as handed to [`crate::pipeline::MemoryPipeline::ingest`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Turn {
    pub speaker: String,
    pub text: String,
    pub timestamp_ms: TimestampMs,
}

/// A named entity recognized in a segment or query, `{text, label}` as
/// produced by the NER capability behind C4 (`spec.md` §4.5 stage 2).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Entity {
    pub text: String,
    pub label: String,
}

/// `spec.md` §3 `ConversationSegment`: a contiguous run of turns, immutable
/// once produced.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConversationSegment {
    pub id: String,
    pub conversation_id: String,
    pub user_id: String,
    pub turn_start: usize,
    pub turn_end: usize,
    pub text: String,
    pub entities: Vec<Entity>,
    pub sentiment: Option<f32>,
    pub timestamp_ms: TimestampMs,
}

impl ConversationSegment {
    /// `spec.md` §4.5 stage 1: id derived from `(conversation_id,
    /// turn_range, timestamp_ms)`, so identical segmentation of the same
    /// turns produces the same id (the backbone of `ingest` idempotence).
    pub fn derive_id(conversation_id: &str, turn_start: usize, turn_end: usize, timestamp_ms: TimestampMs) -> String {
        format!("{conversation_id}:{turn_start}-{turn_end}:{timestamp_ms}")
    }
}

/// `spec.md` §4.5 stage 3: the classification a fact candidate falls under.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum FactType {
    Identity,
    Preference,
    Relationship,
    Temporal,
    Context,
}

impl FactType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Identity => "identity",
            Self::Preference => "preference",
            Self::Relationship => "relationship",
            Self::Temporal => "temporal",
            Self::Context => "context",
        }
    }
}

impl std::fmt::Display for FactType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// `spec.md` §3 `UserFact`. Soft-deleted (`deleted`), never silently
/// overwritten; if `immutable` then `valid_until` is always `None`
/// (`spec.md` invariant 8, enforced in [`UserFact::new`] and
/// [`UserFact::mark_immutable`]).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UserFact {
    pub fact_id: Uuid,
    pub user_id: String,
    pub content: String,
    pub fact_type: FactType,
    pub category: String,
    pub confidence: f32,
    pub source_segment_id: String,
    pub entities: Vec<String>,
    pub created_at: TimestampMs,
    pub valid_until: Option<TimestampMs>,
    pub immutable: bool,
    pub deleted: bool,
}

impl UserFact {
    pub fn new(
        user_id: impl Into<String>,
        content: impl Into<String>,
        fact_type: FactType,
        category: impl Into<String>,
        confidence: f32,
        source_segment_id: impl Into<String>,
        entities: Vec<String>,
        created_at: TimestampMs,
    ) -> Self {
        Self {
            fact_id: Uuid::new_v4(),
            user_id: user_id.into(),
            content: content.into(),
            fact_type,
            category: category.into(),
            confidence,
            source_segment_id: source_segment_id.into(),
            entities,
            created_at,
            valid_until: None,
            immutable: false,
            deleted: false,
        }
    }

    /// `spec.md` invariant 8: `immutable => valid_until.is_none()`.
    pub fn mark_immutable(&mut self) {
        self.immutable = true;
        self.valid_until = None;
    }
}

/// A scalar metadata value; the vector store only accepts scalars
/// (`spec.md` §3 `VectorRecord`). Lists/maps are JSON-serialized by the
/// caller into a `<name>_json` field before being wrapped here.
///
/// Externally tagged (not `#[serde(untagged)]`): `VectorRecord` is
/// encoded with `bincode`, which is not self-describing and cannot drive
/// an untagged enum's `deserialize_any` — every variant needs its own
/// tag on the wire.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub enum MetadataValue {
    Str(String),
    Num(f64),
    Bool(bool),
}

impl MetadataValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}
impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}
impl From<f64> for MetadataValue {
    fn from(value: f64) -> Self {
        Self::Num(value)
    }
}
impl From<bool> for MetadataValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

pub type Metadata = BTreeMap<String, MetadataValue>;

/// `spec.md` §3 `VectorRecord`: one per `UserFact` and per
/// `ConversationSegment`, held in a named collection of the vector store.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: String,
    pub embedding: Vec<f32>,
    pub document: String,
    pub metadata: Metadata,
}

/// Serializes a JSON-able value into a metadata map entry under
/// `<name>_json`, per the vector-store scalar constraint.
pub fn put_json_field(metadata: &mut Metadata, name: &str, value: &impl Serialize) -> Result<(), serde_json::Error> {
    let encoded = serde_json::to_string(value)?;
    metadata.insert(format!("{name}_json"), MetadataValue::Str(encoded));
    Ok(())
}
