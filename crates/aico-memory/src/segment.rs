// Copyright 2026 - developers of the AICO project.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.
//! `spec.md` §4.5 stage 1: group consecutive turns into segments by
//! temporal proximity, each with an id derived from
//! `(conversation_id, turn_range, timestamp_ms)`.
use crate::types::{ConversationSegment, Entity, Turn};

#[derive(Clone, Debug)]
pub struct SegmentationConfig {
    /// A gap between two turns larger than this starts a new segment.
    pub max_gap_ms: i64,
    /// A segment never spans more turns than this, even with no gap.
    pub max_turns: usize,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            max_gap_ms: 5 * 60 * 1000,
            max_turns: 6,
        }
    }
}

/// Splits `turns` into contiguous segments. Entities/sentiment are left
/// empty; the pipeline fills them in after the NER call.
pub fn segment_turns(
    turns: &[Turn],
    conversation_id: &str,
    user_id: &str,
    config: &SegmentationConfig,
) -> Vec<ConversationSegment> {
    if turns.is_empty() {
        return Vec::new();
    }

    let mut segments = Vec::new();
    let mut start = 0usize;
    for i in 1..turns.len() {
        let gap = turns[i].timestamp_ms - turns[i - 1].timestamp_ms;
        let span = i - start;
        if gap > config.max_gap_ms || span >= config.max_turns {
            segments.push(build_segment(turns, conversation_id, user_id, start, i - 1));
            start = i;
        }
    }
    segments.push(build_segment(turns, conversation_id, user_id, start, turns.len() - 1));
    segments
}

fn build_segment(
    turns: &[Turn],
    conversation_id: &str,
    user_id: &str,
    turn_start: usize,
    turn_end: usize,
) -> ConversationSegment {
    let slice = &turns[turn_start..=turn_end];
    let text = slice
        .iter()
        .map(|t| format!("{}: {}", t.speaker, t.text))
        .collect::<Vec<_>>()
        .join("\n");
    let timestamp_ms = slice.last().map(|t| t.timestamp_ms).unwrap_or(0);
    let id = ConversationSegment::derive_id(conversation_id, turn_start, turn_end, timestamp_ms);

    ConversationSegment {
        id,
        conversation_id: conversation_id.to_string(),
        user_id: user_id.to_string(),
        turn_start,
        turn_end,
        text,
        entities: Vec::<Entity>::new(),
        sentiment: None,
        timestamp_ms,
    }
}
