// Copyright 2026 - developers of the AICO project.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.
use std::fmt;

/// Why a handshake was rejected (`spec.md` §4.2).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandshakeRejected {
    BadSignature,
    StaleTimestamp { skew_seconds: i64, max_skew_seconds: i64 },
    ReplayedChallenge,
    InvalidKeyMaterial,
}

impl std::error::Error for HandshakeRejected {}

impl fmt::Display for HandshakeRejected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadSignature => write!(f, "handshake rejected: bad signature"),
            Self::StaleTimestamp {
                skew_seconds,
                max_skew_seconds,
            } => write!(
                f,
                "handshake rejected: timestamp skew {skew_seconds}s exceeds {max_skew_seconds}s"
            ),
            Self::ReplayedChallenge => write!(f, "handshake rejected: replayed challenge"),
            Self::InvalidKeyMaterial => write!(f, "handshake rejected: invalid key material"),
        }
    }
}

/// Failures from the per-message encrypt/decrypt path (`spec.md` §4.2).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChannelError {
    /// The session is not in a state that can encrypt/decrypt
    /// (expired, closed, or revoked).
    SessionNotActive,
    /// A nonce was about to be reused for this session/direction; refused.
    NonceReuse,
    /// Authenticated decryption failed (wrong key, tampered ciphertext, or
    /// mismatched associated data).
    DecryptionFailed,
    /// The plaintext did not (de)serialize as JSON.
    Serialization(String),
    /// A protected endpoint refused a request that did not carry
    /// `encrypted: true` (`spec.md` §4.2: "no silent downgrade").
    EncryptionRequired,
}

impl std::error::Error for ChannelError {}

impl fmt::Display for ChannelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SessionNotActive => write!(f, "session is not active"),
            Self::NonceReuse => write!(f, "nonce reuse refused"),
            Self::DecryptionFailed => write!(f, "authenticated decryption failed"),
            Self::Serialization(err) => write!(f, "serialization failed: {err}"),
            Self::EncryptionRequired => write!(f, "encryption required, refusing plaintext"),
        }
    }
}

impl From<serde_json::Error> for ChannelError {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization(error.to_string())
    }
}
