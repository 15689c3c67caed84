// Copyright 2026 - developers of the AICO project.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.
//! The single-round-trip handshake of `spec.md` §4.2 / §6.
use crate::errors::HandshakeRejected;
use crate::session::Session;
use aico_envelope::ClientIdentity;
use ed25519_dalek::Signature;
use hkdf::Hkdf;
use rand::RngCore;
use sha2::Sha256;
use std::collections::{HashSet, VecDeque};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;
use x25519_dalek::PublicKey as X25519PublicKey;

/// Sent by the client to open a session. `spec.md` §6's JSON shape maps
/// field-for-field onto this struct.
#[derive(Clone, Debug)]
pub struct HandshakeRequest {
    pub component_name: String,
    pub identity_public_key: [u8; 32],
    pub ephemeral_public_key: [u8; 32],
    pub timestamp: i64,
    pub random_challenge: [u8; 32],
    pub signature_over_challenge: Signature,
}

/// Returned by the server on a successful handshake.
#[derive(Clone, Debug)]
pub struct HandshakeResponse {
    pub ephemeral_public_key: [u8; 32],
}

/// Builds a [`HandshakeRequest`] proving possession of `identity`'s
/// long-term signing key and contributing a fresh ephemeral agreement key.
/// Rotates `identity`'s ephemeral keypair first, so each call uses new
/// forward-secret material.
pub fn initiate_handshake(
    identity: &mut ClientIdentity,
    component_name: impl Into<String>,
) -> HandshakeRequest {
    identity.rotate_ephemeral();

    let mut random_challenge = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut random_challenge);

    let signature = identity.sign(&random_challenge);

    HandshakeRequest {
        component_name: component_name.into(),
        identity_public_key: identity.verifying_key().to_bytes(),
        ephemeral_public_key: identity.ephemeral_public().to_bytes(),
        timestamp: unix_seconds(),
        random_challenge,
        signature_over_challenge: signature,
    }
}

/// Bounded set of recently seen challenges, preventing handshake replay.
/// Mirrors the bounded deduplication set C3 keeps for `correlation_id`s.
pub struct ReplayGuard {
    seen: HashSet<[u8; 32]>,
    order: VecDeque<[u8; 32]>,
    capacity: usize,
}

impl ReplayGuard {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            seen: HashSet::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Returns `true` if `challenge` had not been seen before (and records
    /// it), `false` if it is a replay.
    fn observe(&mut self, challenge: [u8; 32]) -> bool {
        if !self.seen.insert(challenge) {
            return false;
        }
        self.order.push_back(challenge);
        if self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
        true
    }
}

impl Default for ReplayGuard {
    fn default() -> Self {
        Self::with_capacity(1000)
    }
}

/// Validates `request`, derives a session key via X25519 + HKDF-SHA256, and
/// returns the response to send back along with the freshly established
/// [`Session`].
pub fn accept_handshake(
    identity: &mut ClientIdentity,
    request: &HandshakeRequest,
    replay_guard: &mut ReplayGuard,
    max_clock_skew_seconds: i64,
    session_idle_timeout_seconds: u64,
) -> Result<(HandshakeResponse, Session), HandshakeRejected> {
    if !aico_envelope::verify_signature(
        &request.identity_public_key,
        &request.random_challenge,
        &request.signature_over_challenge,
    ) {
        return Err(HandshakeRejected::BadSignature);
    }

    let skew = (unix_seconds() - request.timestamp).abs();
    if skew > max_clock_skew_seconds {
        return Err(HandshakeRejected::StaleTimestamp {
            skew_seconds: skew,
            max_skew_seconds: max_clock_skew_seconds,
        });
    }

    if !replay_guard.observe(request.random_challenge) {
        return Err(HandshakeRejected::ReplayedChallenge);
    }

    identity.rotate_ephemeral();
    let server_ephemeral_public = identity.ephemeral_public().to_bytes();

    let client_ephemeral = X25519PublicKey::from(request.ephemeral_public_key);
    let shared_secret = identity
        .diffie_hellman(&client_ephemeral)
        .ok_or(HandshakeRejected::InvalidKeyMaterial)?;

    let session_id = Uuid::new_v4();
    let key = derive_session_key(
        &shared_secret,
        &server_ephemeral_public,
        &request.ephemeral_public_key,
        session_id,
    );

    let session = Session::new(
        session_id,
        key,
        std::time::Duration::from_secs(session_idle_timeout_seconds),
    );

    Ok((
        HandshakeResponse {
            ephemeral_public_key: server_ephemeral_public,
        },
        session,
    ))
}

/// Completes the handshake on the client side once `response` has arrived,
/// deriving the same session key the server derived in [`accept_handshake`].
///
/// `session_id` must be the id the server assigned to the new session (for
/// example, delivered alongside the HTTP response envelope out of band of
/// this crate); the two sides only agree on a session if they agree on this
/// id, since it is mixed into the HKDF salt.
pub fn finish_handshake(
    identity: &mut ClientIdentity,
    request: &HandshakeRequest,
    response: &HandshakeResponse,
    session_id: Uuid,
    session_idle_timeout_seconds: u64,
) -> Result<Session, HandshakeRejected> {
    let server_ephemeral = X25519PublicKey::from(response.ephemeral_public_key);
    let shared_secret = identity
        .diffie_hellman(&server_ephemeral)
        .ok_or(HandshakeRejected::InvalidKeyMaterial)?;

    let key = derive_session_key(
        &shared_secret,
        &response.ephemeral_public_key,
        &request.ephemeral_public_key,
        session_id,
    );

    Ok(Session::new(
        session_id,
        key,
        std::time::Duration::from_secs(session_idle_timeout_seconds),
    ))
}

fn derive_session_key(
    shared_secret: &[u8; 32],
    server_ephemeral_public: &[u8; 32],
    client_ephemeral_public: &[u8; 32],
    session_id: Uuid,
) -> [u8; 32] {
    let mut salt = Vec::with_capacity(16 + 32 + 32);
    salt.extend_from_slice(session_id.as_bytes());
    salt.extend_from_slice(server_ephemeral_public);
    salt.extend_from_slice(client_ephemeral_public);

    let hk = Hkdf::<Sha256>::new(Some(&salt), shared_secret);
    let mut key = [0u8; 32];
    hk.expand(b"aico-channel-session-key-v1", &mut key)
        .expect("32 bytes is a valid HKDF-SHA256 output length");
    key
}

fn unix_seconds() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system time is before epoch")
        .as_secs() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use aico_envelope::generate_identity;

    #[test]
    fn handshake_establishes_matching_session_keys() {
        let mut client_identity = generate_identity();
        let mut server_identity = generate_identity();
        let mut replay_guard = ReplayGuard::default();

        let request = initiate_handshake(&mut client_identity, "cli");
        let (response, server_session) =
            accept_handshake(&mut server_identity, &request, &mut replay_guard, 60, 3600).unwrap();

        let client_session =
            finish_handshake(&mut client_identity, &request, &response, server_session.id, 3600)
                .unwrap();

        assert_eq!(client_session.id, server_session.id);
    }

    #[test]
    fn stale_timestamp_is_rejected() {
        let mut client_identity = generate_identity();
        let mut server_identity = generate_identity();
        let mut replay_guard = ReplayGuard::default();

        let mut request = initiate_handshake(&mut client_identity, "cli");
        request.timestamp -= 120;

        let err = accept_handshake(&mut server_identity, &request, &mut replay_guard, 60, 3600)
            .unwrap_err();
        assert!(matches!(err, HandshakeRejected::StaleTimestamp { .. }));
    }

    #[test]
    fn replayed_challenge_is_rejected() {
        let mut client_identity = generate_identity();
        let mut server_identity = generate_identity();
        let mut replay_guard = ReplayGuard::default();

        let request = initiate_handshake(&mut client_identity, "cli");
        accept_handshake(&mut server_identity, &request, &mut replay_guard, 60, 3600).unwrap();

        let err = accept_handshake(&mut server_identity, &request, &mut replay_guard, 60, 3600)
            .unwrap_err();
        assert_eq!(err, HandshakeRejected::ReplayedChallenge);
    }

    #[test]
    fn bad_signature_is_rejected() {
        let mut client_identity = generate_identity();
        let mut server_identity = generate_identity();
        let mut replay_guard = ReplayGuard::default();

        let mut request = initiate_handshake(&mut client_identity, "cli");
        request.random_challenge[0] ^= 0xff;

        let err = accept_handshake(&mut server_identity, &request, &mut replay_guard, 60, 3600)
            .unwrap_err();
        assert_eq!(err, HandshakeRejected::BadSignature);
    }
}
