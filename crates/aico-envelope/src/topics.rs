// Copyright 2026 - developers of the AICO project.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.
//! The static request-topic -> response-topic bijection from `spec.md` §6.
use std::collections::HashMap;
use std::sync::OnceLock;

/// Representative entries from `spec.md` §6's topic mapping table. A real
/// deployment extends this list; the mapping itself must stay a bijection
/// (`spec.md` invariant 3).
const TOPIC_PAIRS: &[(&str, &str)] = &[
    (
        "modelservice/health/request",
        "modelservice/health/response",
    ),
    (
        "modelservice/completions/request",
        "modelservice/completions/response",
    ),
    (
        "modelservice/embeddings/request",
        "modelservice/embeddings/response",
    ),
    (
        "modelservice/models/request",
        "modelservice/models/response",
    ),
    ("modelservice/ner/request", "modelservice/ner/response"),
    ("ollama/status/request", "ollama/status/response"),
    (
        "ollama/models/pull/request",
        "ollama/models/pull/response",
    ),
];

fn forward_map() -> &'static HashMap<&'static str, &'static str> {
    static MAP: OnceLock<HashMap<&'static str, &'static str>> = OnceLock::new();
    MAP.get_or_init(|| TOPIC_PAIRS.iter().copied().collect())
}

/// Resolves a request topic to its unique response topic.
///
/// Returns `None` for an unmapped request topic; callers surface that as
/// `UnmappedTopic` (`spec.md` §4.3).
pub fn response_topic(request_topic: &str) -> Option<&'static str> {
    forward_map().get(request_topic).copied()
}

/// `true` if `topic` is a known request topic in the mapping.
pub fn is_request_topic(topic: &str) -> bool {
    forward_map().contains_key(topic)
}
