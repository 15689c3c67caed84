// Copyright 2026 - developers of the AICO project.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.
//! `spec.md` §4.5 "Retrieval algorithm": cache the last N query embeddings
//! keyed by a truncation of the query text, to cut round trips on
//! repeated queries. A lock-striped concurrent map
//! (`dashmap`, `SPEC_FULL.md` §4.5), since `recall` is stateless and
//! re-entrant and may run from several tasks at once.
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::Mutex;

const TRUNCATE_CHARS: usize = 64;

fn cache_key(query_text: &str) -> String {
    query_text
        .to_lowercase()
        .chars()
        .take(TRUNCATE_CHARS)
        .collect()
}

/// A bounded FIFO cache of query-text-prefix to embedding. Eviction is
/// FIFO rather than LRU; the expected access pattern (a handful of
/// repeated stock questions) doesn't reward anything fancier.
pub struct QueryEmbeddingCache {
    entries: DashMap<String, Vec<f32>>,
    order: Mutex<VecDeque<String>>,
    capacity: usize,
}

impl QueryEmbeddingCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: DashMap::new(),
            order: Mutex::new(VecDeque::new()),
            capacity: capacity.max(1),
        }
    }

    pub fn get(&self, query_text: &str) -> Option<Vec<f32>> {
        self.entries.get(&cache_key(query_text)).map(|v| v.clone())
    }

    pub fn put(&self, query_text: &str, embedding: Vec<f32>) {
        let key = cache_key(query_text);
        if self.entries.insert(key.clone(), embedding).is_some() {
            return;
        }
        let mut order = self.order.lock().expect("cache order mutex poisoned");
        order.push_back(key);
        if order.len() > self.capacity {
            if let Some(oldest) = order.pop_front() {
                self.entries.remove(&oldest);
            }
        }
    }
}

impl Default for QueryEmbeddingCache {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_then_get_hits() {
        let cache = QueryEmbeddingCache::new(4);
        cache.put("What is my cat's name?", vec![1.0, 2.0]);
        assert_eq!(cache.get("WHAT IS MY CAT'S NAME?"), Some(vec![1.0, 2.0]));
    }

    #[test]
    fn evicts_oldest_past_capacity() {
        let cache = QueryEmbeddingCache::new(2);
        cache.put("a", vec![1.0]);
        cache.put("b", vec![2.0]);
        cache.put("c", vec![3.0]);
        assert!(cache.get("a").is_none());
        assert!(cache.get("c").is_some());
    }
}
