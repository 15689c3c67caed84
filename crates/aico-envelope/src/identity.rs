// Copyright 2026 - developers of the AICO project.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.
//! Long-term signing identity plus short-term key-agreement material for a
//! single client process. The private halves never leave this module; only
//! [`PublicIdentity`] is meant to cross a process boundary.
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use x25519_dalek::{EphemeralSecret, PublicKey as X25519PublicKey};
use zeroize::Zeroize;

/// A long-term signing keypair plus a short-term key-agreement keypair.
///
/// Created once per client process via [`generate_identity`]. The ephemeral
/// agreement key is rotated per handshake with [`ClientIdentity::rotate_ephemeral`]
/// so every session gets fresh forward-secret material, while the long-term
/// signing key (the identity's actual fingerprint) stays fixed for the life
/// of the process.
pub struct ClientIdentity {
    signing_key: SigningKey,
    ephemeral_secret: Option<EphemeralSecret>,
    ephemeral_public: X25519PublicKey,
}

/// The public halves of a [`ClientIdentity`], safe to transmit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PublicIdentity {
    pub signing_public_key: [u8; 32],
    pub ephemeral_public_key: [u8; 32],
}

impl ClientIdentity {
    /// A 16-hex-char truncated fingerprint of the long-term signing key,
    /// used as `client_id` on the encrypted HTTP request shape (`spec.md` §6).
    pub fn fingerprint(&self) -> String {
        let bytes = self.signing_key.verifying_key().to_bytes();
        bytes[..8].iter().map(|b| format!("{b:02x}")).collect()
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    pub fn ephemeral_public(&self) -> X25519PublicKey {
        self.ephemeral_public
    }

    /// Signs `challenge` with the long-term key, proving possession of it.
    pub fn sign(&self, challenge: &[u8]) -> Signature {
        self.signing_key.sign(challenge)
    }

    /// Draws a fresh ephemeral X25519 keypair, consuming the previous one.
    /// Must be called before each handshake so the agreement key is never
    /// reused across sessions.
    pub fn rotate_ephemeral(&mut self) {
        let secret = EphemeralSecret::random_from_rng(OsRng);
        self.ephemeral_public = X25519PublicKey::from(&secret);
        self.ephemeral_secret = Some(secret);
    }

    /// Consumes this identity's current ephemeral secret to perform a
    /// Diffie-Hellman agreement with `their_public`. Can only be called once
    /// per [`ClientIdentity::rotate_ephemeral`] call, matching the "ephemeral
    /// secret" contract of `x25519_dalek::EphemeralSecret`.
    pub fn diffie_hellman(&mut self, their_public: &X25519PublicKey) -> Option<[u8; 32]> {
        let secret = self.ephemeral_secret.take()?;
        Some(secret.diffie_hellman(their_public).to_bytes())
    }

    pub fn public_view(&self) -> PublicIdentity {
        PublicIdentity {
            signing_public_key: self.signing_key.verifying_key().to_bytes(),
            ephemeral_public_key: self.ephemeral_public.to_bytes(),
        }
    }
}

impl Drop for ClientIdentity {
    fn drop(&mut self) {
        let mut key_bytes = self.signing_key.to_bytes();
        key_bytes.zeroize();
    }
}

/// Verifies that `signature` over `challenge` was produced by the signing
/// key whose public bytes are `signing_public_key`.
pub fn verify_signature(
    signing_public_key: &[u8; 32],
    challenge: &[u8],
    signature: &Signature,
) -> bool {
    match VerifyingKey::from_bytes(signing_public_key) {
        Ok(key) => key.verify(challenge, signature).is_ok(),
        Err(_) => false,
    }
}

/// Generates a new [`ClientIdentity`] with a fresh long-term signing key and
/// an initial ephemeral agreement keypair ready for a first handshake.
pub fn generate_identity() -> ClientIdentity {
    let signing_key = SigningKey::generate(&mut OsRng);
    let secret = EphemeralSecret::random_from_rng(OsRng);
    let ephemeral_public = X25519PublicKey::from(&secret);
    ClientIdentity {
        signing_key,
        ephemeral_secret: Some(secret),
        ephemeral_public,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_sixteen_hex_chars() {
        let identity = generate_identity();
        assert_eq!(identity.fingerprint().len(), 16);
    }

    #[test]
    fn signature_round_trips() {
        let identity = generate_identity();
        let challenge = b"hello";
        let signature = identity.sign(challenge);
        let public = identity.public_view();
        assert!(verify_signature(
            &public.signing_public_key,
            challenge,
            &signature
        ));
    }

    #[test]
    fn diffie_hellman_agrees_both_ways() {
        let mut alice = generate_identity();
        let mut bob = generate_identity();

        let alice_pub = alice.ephemeral_public();
        let bob_pub = bob.ephemeral_public();

        let alice_secret = alice.diffie_hellman(&bob_pub).unwrap();
        let bob_secret = bob.diffie_hellman(&alice_pub).unwrap();
        assert_eq!(alice_secret, bob_secret);

        // the ephemeral secret is consumed; a second call fails until rotated
        assert!(alice.diffie_hellman(&bob_pub).is_none());
    }
}
