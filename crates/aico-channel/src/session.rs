// Copyright 2026 - developers of the AICO project.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.
//! The `Session` state machine of `spec.md` §4.2:
//!
//! ```text
//! [NEW] --accept-> [ACTIVE] --idle_timeout-> [EXPIRED]
//! [ACTIVE] --close-> [CLOSED]
//! [ACTIVE] --auth_failure-> [REVOKED]
//! ```
use std::time::{Duration, Instant};
use uuid::Uuid;
use zeroize::Zeroize;

/// Which side of the channel a message is traveling, bound into every
/// AEAD's associated data so a ciphertext from one direction can never be
/// replayed as if it came from the other.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    ClientToServer,
    ServerToClient,
}

impl Direction {
    pub(crate) fn reversed(self) -> Self {
        match self {
            Self::ClientToServer => Self::ServerToClient,
            Self::ServerToClient => Self::ClientToServer,
        }
    }

    fn tag(self) -> u8 {
        match self {
            Self::ClientToServer => 0,
            Self::ServerToClient => 1,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    New,
    Active,
    Expired,
    Closed,
    Revoked,
}

/// A shared symmetric key plus a per-direction nonce counter, tying a
/// client identity to a server identity for a limited time.
pub struct Session {
    pub id: Uuid,
    key: [u8; 32],
    send_nonce: u64,
    recv_nonce: u64,
    state: SessionState,
    last_activity: Instant,
    idle_timeout: Duration,
}

impl Session {
    pub(crate) fn new(id: Uuid, key: [u8; 32], idle_timeout: Duration) -> Self {
        Self {
            id,
            key,
            send_nonce: 0,
            recv_nonce: 0,
            state: SessionState::Active,
            last_activity: Instant::now(),
            idle_timeout,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Associated data bound into every AEAD call: session id, direction,
    /// and the nonce counter for that direction.
    pub(crate) fn associated_data(&self, direction: Direction, nonce: u64) -> Vec<u8> {
        let mut ad = Vec::with_capacity(16 + 1 + 8);
        ad.extend_from_slice(self.id.as_bytes());
        ad.push(direction.tag());
        ad.extend_from_slice(&nonce.to_be_bytes());
        ad
    }

    pub(crate) fn key(&self) -> &[u8; 32] {
        &self.key
    }

    /// Advances and returns the next nonce to use for `direction`. The
    /// counter is advanced before encryption, per `spec.md` §3's session
    /// invariant.
    pub(crate) fn next_send_nonce(&mut self) -> u64 {
        let nonce = self.send_nonce;
        self.send_nonce += 1;
        self.last_activity = Instant::now();
        nonce
    }

    /// Accepts an inbound nonce if it is strictly greater than every nonce
    /// already observed for this direction; refuses reuse/replay otherwise.
    pub(crate) fn observe_recv_nonce(&mut self, nonce: u64) -> bool {
        if nonce < self.recv_nonce {
            return false;
        }
        self.recv_nonce = nonce + 1;
        self.last_activity = Instant::now();
        true
    }

    pub fn touch_idle(&mut self) {
        if self.state == SessionState::Active && self.last_activity.elapsed() > self.idle_timeout
        {
            self.state = SessionState::Expired;
            self.key.zeroize();
        }
    }

    pub fn revoke(&mut self) {
        self.state = SessionState::Revoked;
        self.key.zeroize();
    }

    /// Zeroes key material and transitions to `CLOSED`.
    pub fn close(&mut self) {
        self.state = SessionState::Closed;
        self.key.zeroize();
    }

    pub fn is_active(&self) -> bool {
        self.state == SessionState::Active
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}
