// Copyright 2026 - developers of the AICO project.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.
//! `spec.md` §4.5 stages 2-3: parse the NER capability's response and
//! classify candidate fact strings out of segment text.
use crate::types::{Entity, FactType};
use serde::Deserialize;

/// `aico_queue::OllamaDownstream`'s `ner` operation returns the raw
/// completion text; the prompt asks for a JSON array of
/// `{"text":...,"label":...}` objects. Malformed output (the model didn't
/// follow the instruction) yields an empty entity list rather than an
/// error — entity extraction degrades gracefully, per `spec.md` §4.5
/// "Failure semantics".
#[derive(Deserialize)]
struct RawEntity {
    text: String,
    label: String,
}

pub fn parse_ner_response(bytes: &[u8]) -> Vec<Entity> {
    let text = match std::str::from_utf8(bytes) {
        Ok(text) => text,
        Err(_) => return Vec::new(),
    };
    let start = text.find('[');
    let end = text.rfind(']');
    let (Some(start), Some(end)) = (start, end) else {
        return Vec::new();
    };
    if end < start {
        return Vec::new();
    }
    match serde_json::from_str::<Vec<RawEntity>>(&text[start..=end]) {
        Ok(entities) => entities
            .into_iter()
            .map(|e| Entity {
                text: e.text,
                label: e.label,
            })
            .collect(),
        Err(_) => Vec::new(),
    }
}

/// A fact candidate before the confidence floor / length filter has run.
pub struct CandidateFact {
    pub content: String,
    pub fact_type: FactType,
    pub category: String,
    pub confidence: f32,
}

const KINSHIP_WORDS: &[&str] = &[
    "wife", "husband", "mother", "father", "mom", "dad", "friend", "son", "daughter", "brother",
    "sister", "partner", "cat", "dog", "pet",
];

/// Rule-based classifier over one sentence of segment text. This stands
/// in for a model-backed classifier per `spec.md` §4.5 stage 3 (the
/// classification model itself is out of scope, per `spec.md` §1); it
/// looks for the same lexical cues a companion's fact extractor checks
/// before ever calling a model, so cheap and unambiguous turns short
/// circuit without a downstream round trip.
fn classify_sentence(sentence: &str) -> Option<CandidateFact> {
    let lower = sentence.to_lowercase();
    let trimmed = sentence.trim();
    if trimmed.is_empty() {
        return None;
    }

    if lower.contains("my name is") || lower.contains("i'm called") || lower.contains("i am called") {
        return Some(CandidateFact {
            content: trimmed.to_string(),
            fact_type: FactType::Identity,
            category: "name".into(),
            confidence: 0.9,
        });
    }
    if lower.starts_with("i am ") || lower.starts_with("i'm ") {
        return Some(CandidateFact {
            content: trimmed.to_string(),
            fact_type: FactType::Identity,
            category: "self_description".into(),
            confidence: 0.6,
        });
    }
    if lower.contains("i like") || lower.contains("i love") || lower.contains("i prefer") || lower.contains("my favorite") {
        return Some(CandidateFact {
            content: trimmed.to_string(),
            fact_type: FactType::Preference,
            category: "likes".into(),
            confidence: 0.75,
        });
    }
    if lower.contains("i hate") || lower.contains("i dislike") {
        return Some(CandidateFact {
            content: trimmed.to_string(),
            fact_type: FactType::Preference,
            category: "dislikes".into(),
            confidence: 0.75,
        });
    }
    if KINSHIP_WORDS.iter().any(|word| lower.contains(word)) && lower.contains(" is ") {
        return Some(CandidateFact {
            content: trimmed.to_string(),
            fact_type: FactType::Relationship,
            category: "relationship".into(),
            confidence: 0.65,
        });
    }
    if lower.contains("years old") || lower.contains("born in") || lower.contains("born on") {
        return Some(CandidateFact {
            content: trimmed.to_string(),
            fact_type: FactType::Temporal,
            category: "date".into(),
            confidence: 0.6,
        });
    }
    if trimmed.split_whitespace().count() >= 4 {
        return Some(CandidateFact {
            content: trimmed.to_string(),
            fact_type: FactType::Context,
            category: "general".into(),
            confidence: 0.35,
        });
    }
    None
}

/// Splits segment text into sentences and classifies each, dropping
/// anything below `confidence_floor` or shorter than two meaningful
/// tokens (`spec.md` §4.5 stage 3).
pub fn extract_facts(segment_text: &str, confidence_floor: f32) -> Vec<CandidateFact> {
    segment_text
        .split(|c| c == '.' || c == '!' || c == '?' || c == '\n')
        .filter_map(classify_sentence)
        .filter(|f| f.confidence >= confidence_floor)
        .filter(|f| {
            f.content
                .split_whitespace()
                .filter(|tok| tok.len() > 1)
                .count()
                >= 2
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_ner_json() {
        let body = br#"Sure, here it is: [{"text":"Whiskers","label":"ANIMAL"}] done"#;
        let entities = parse_ner_response(body);
        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0].text, "Whiskers");
    }

    #[test]
    fn malformed_ner_json_yields_empty() {
        assert!(parse_ner_response(b"not json at all").is_empty());
    }

    #[test]
    fn classifies_identity_fact() {
        let facts = extract_facts("user: My name is Alex.", 0.4);
        assert!(facts.iter().any(|f| f.fact_type == FactType::Identity));
    }

    #[test]
    fn classifies_preference_fact() {
        let facts = extract_facts("user: I like hiking on weekends.", 0.4);
        assert!(facts.iter().any(|f| f.fact_type == FactType::Preference));
    }

    #[test]
    fn discards_short_fragments() {
        let facts = extract_facts("ok", 0.4);
        assert!(facts.is_empty());
    }
}
