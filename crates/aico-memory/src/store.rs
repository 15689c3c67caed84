// Copyright 2026 - developers of the AICO project.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.
//! The persisted vector store: an embedded `sled` database holding one
//! entry per [`VectorRecord`], keyed by `collection/id`, with a
//! brute-force cosine-similarity scan per collection on `recall`
//! (`SPEC_FULL.md` §4.5 — acceptable at single-user data volumes; no ANN
//! index is specified or implied, per the open similarity-metric
//! question in `spec.md` §9).
use crate::errors::MemoryError;
use crate::types::VectorRecord;

/// Well-known collection names from `spec.md` §4.5 stage 5 / §6.
pub const COLLECTION_USER_FACTS: &str = "user_facts";
pub const COLLECTION_CONVERSATION_SEGMENTS: &str = "conversation_segments";

/// The store itself provides single-writer-per-collection semantics
/// (`SPEC_FULL.md` §5): `sled` serializes writes internally, and callers
/// (the pipeline) never issue concurrent writes to the same record id.
pub struct VectorStore {
    db: sled::Db,
}

fn key(collection: &str, id: &str) -> Vec<u8> {
    format!("{collection}/{id}").into_bytes()
}

impl VectorStore {
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self, MemoryError> {
        Ok(Self {
            db: sled::open(path)?,
        })
    }

    /// Opens a purely in-memory store (useful for tests and the demo
    /// binary's non-durable runs).
    pub fn open_temporary() -> Result<Self, MemoryError> {
        Ok(Self {
            db: sled::Config::new().temporary(true).open()?,
        })
    }

    pub fn put(&self, collection: &str, record: &VectorRecord) -> Result<(), MemoryError> {
        let bytes = bincode::serialize(record)?;
        self.db.insert(key(collection, &record.id), bytes)?;
        Ok(())
    }

    pub fn get(&self, collection: &str, id: &str) -> Result<Option<VectorRecord>, MemoryError> {
        match self.db.get(key(collection, id))? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn delete(&self, collection: &str, id: &str) -> Result<(), MemoryError> {
        self.db.remove(key(collection, id))?;
        Ok(())
    }

    pub fn exists(&self, collection: &str, id: &str) -> Result<bool, MemoryError> {
        Ok(self.db.contains_key(key(collection, id))?)
    }

    /// All records in `collection`, unordered. Used by `recall`'s
    /// brute-force scan and by `delete_user_data`.
    pub fn scan(&self, collection: &str) -> Result<Vec<VectorRecord>, MemoryError> {
        let prefix = format!("{collection}/");
        let mut records = Vec::new();
        for entry in self.db.scan_prefix(prefix.as_bytes()) {
            let (_key, bytes) = entry?;
            records.push(bincode::deserialize(&bytes)?);
        }
        Ok(records)
    }

    /// Removes every record in `collection` whose `user_id` metadata field
    /// equals `user_id`. Returns the number of records removed.
    pub fn delete_by_user(&self, collection: &str, user_id: &str) -> Result<usize, MemoryError> {
        let mut removed = 0;
        for record in self.scan(collection)? {
            let matches = record
                .metadata
                .get("user_id")
                .and_then(|value| value.as_str())
                .map(|value| value == user_id)
                .unwrap_or(false);
            if matches {
                self.delete(collection, &record.id)?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    pub fn flush(&self) -> Result<(), MemoryError> {
        self.db.flush()?;
        Ok(())
    }
}

/// Cosine similarity mapped monotonically into `[0, 1]`
/// (`cos ∈ [-1, 1] ↦ (cos + 1) / 2`), satisfying `spec.md` §9's
/// "implementation-defined but monotonic and in [0,1]" requirement.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || b.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    let cos = (dot / (norm_a * norm_b)).clamp(-1.0, 1.0);
    (cos + 1.0) / 2.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Metadata, MetadataValue};

    fn record(id: &str, embedding: Vec<f32>, user_id: &str) -> VectorRecord {
        let mut metadata = Metadata::new();
        metadata.insert("user_id".into(), MetadataValue::Str(user_id.into()));
        VectorRecord {
            id: id.into(),
            embedding,
            document: format!("doc-{id}"),
            metadata,
        }
    }

    #[test]
    fn put_get_roundtrip() {
        let store = VectorStore::open_temporary().unwrap();
        let r = record("a", vec![1.0, 0.0], "u1");
        store.put(COLLECTION_USER_FACTS, &r).unwrap();
        let fetched = store.get(COLLECTION_USER_FACTS, "a").unwrap().unwrap();
        assert_eq!(fetched.document, "doc-a");
    }

    #[test]
    fn delete_by_user_only_removes_matching() {
        let store = VectorStore::open_temporary().unwrap();
        store.put(COLLECTION_USER_FACTS, &record("a", vec![1.0], "u1")).unwrap();
        store.put(COLLECTION_USER_FACTS, &record("b", vec![1.0], "u2")).unwrap();
        let removed = store.delete_by_user(COLLECTION_USER_FACTS, "u1").unwrap();
        assert_eq!(removed, 1);
        assert!(store.get(COLLECTION_USER_FACTS, "a").unwrap().is_none());
        assert!(store.get(COLLECTION_USER_FACTS, "b").unwrap().is_some());
    }

    #[test]
    fn cosine_similarity_identical_is_one() {
        assert!((cosine_similarity(&[1.0, 2.0, 3.0], &[1.0, 2.0, 3.0]) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn cosine_similarity_orthogonal_is_half() {
        assert!((cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]) - 0.5).abs() < 1e-5);
    }
}
