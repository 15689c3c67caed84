// Copyright 2026 - developers of the AICO project.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.
//! Per-operation batch accumulation: a pending batch fires when it reaches
//! `batch_size` items or `batch_timeout` wall time elapses, whichever comes
//! first. A batch failure fails every member's future with the same error.
use tokio::sync::oneshot;

/// One submission waiting inside a batch.
pub struct BatchMember {
    pub data: Vec<u8>,
    pub responder: oneshot::Sender<super::queue::PendingResult>,
}

pub struct BatchAccumulator {
    pub members: Vec<BatchMember>,
    pub opened_at: std::time::Instant,
}

impl BatchAccumulator {
    pub fn new() -> Self {
        Self {
            members: Vec::new(),
            opened_at: std::time::Instant::now(),
        }
    }

    pub fn push(&mut self, member: BatchMember) {
        self.members.push(member);
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn age(&self) -> std::time::Duration {
        self.opened_at.elapsed()
    }

    pub fn take(&mut self) -> Vec<BatchMember> {
        self.opened_at = std::time::Instant::now();
        std::mem::take(&mut self.members)
    }
}

impl Default for BatchAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

/// Operations declared batchable; everything else is dispatched singly and
/// immediately.
pub fn is_batchable(operation: &str) -> bool {
    matches!(operation, "embedding" | "ner")
}
