// Copyright 2026 - developers of the AICO project.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.
use crate::errors::ChannelError;
use crate::session::{Direction, Session};
use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{ChaCha20Poly1305, Nonce};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Authenticated-encrypts `value` under `session` for a message traveling
/// `direction`, returning the opaque bytes an envelope's `payload` field
/// carries. A fresh nonce is drawn for every call; reuse is a hard error.
pub fn encrypt<T: Serialize>(
    session: &mut Session,
    direction: Direction,
    value: &T,
) -> Result<Vec<u8>, ChannelError> {
    if !session.is_active() {
        return Err(ChannelError::SessionNotActive);
    }

    let plaintext = serde_json::to_vec(value)?;
    let nonce_counter = session.next_send_nonce();
    let nonce_bytes = nonce_bytes(nonce_counter);
    let aad = session.associated_data(direction, nonce_counter);

    let cipher = ChaCha20Poly1305::new(session.key().into());
    let ciphertext = cipher
        .encrypt(
            Nonce::from_slice(&nonce_bytes),
            Payload {
                msg: &plaintext,
                aad: &aad,
            },
        )
        .map_err(|_| ChannelError::DecryptionFailed)?;

    let mut framed = Vec::with_capacity(8 + ciphertext.len());
    framed.extend_from_slice(&nonce_counter.to_be_bytes());
    framed.extend_from_slice(&ciphertext);
    Ok(framed)
}

/// Decrypts bytes produced by [`encrypt`] on the peer side of `session`
/// (hence `direction` is the direction the message traveled, not the
/// direction this call is made from). Rejects nonce reuse/replay and any
/// tampering of the ciphertext or associated data.
pub fn decrypt<T: DeserializeOwned>(
    session: &mut Session,
    direction: Direction,
    envelope_payload: &[u8],
) -> Result<T, ChannelError> {
    if !session.is_active() {
        return Err(ChannelError::SessionNotActive);
    }
    if envelope_payload.len() < 8 {
        return Err(ChannelError::DecryptionFailed);
    }

    let (nonce_counter_bytes, ciphertext) = envelope_payload.split_at(8);
    let nonce_counter = u64::from_be_bytes(nonce_counter_bytes.try_into().unwrap());

    if !session.observe_recv_nonce(nonce_counter) {
        return Err(ChannelError::NonceReuse);
    }

    let nonce_bytes = nonce_bytes(nonce_counter);
    let aad = session.associated_data(direction, nonce_counter);

    let cipher = ChaCha20Poly1305::new(session.key().into());
    let plaintext = cipher
        .decrypt(
            Nonce::from_slice(&nonce_bytes),
            Payload {
                msg: ciphertext,
                aad: &aad,
            },
        )
        .map_err(|_| ChannelError::DecryptionFailed)?;

    Ok(serde_json::from_slice(&plaintext)?)
}

fn nonce_bytes(counter: u64) -> [u8; 12] {
    let mut nonce = [0u8; 12];
    nonce[4..].copy_from_slice(&counter.to_be_bytes());
    nonce
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::time::Duration;
    use uuid::Uuid;

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct Ping {
        n: u32,
    }

    fn new_session() -> Session {
        Session::new(Uuid::new_v4(), [7u8; 32], Duration::from_secs(60))
    }

    #[test]
    fn encrypt_decrypt_round_trips() {
        let mut client_session = new_session();
        let ciphertext =
            encrypt(&mut client_session, Direction::ClientToServer, &Ping { n: 1 }).unwrap();

        let mut server_session = Session::new(
            client_session.id,
            *client_session.key(),
            Duration::from_secs(60),
        );
        let decrypted: Ping =
            decrypt(&mut server_session, Direction::ClientToServer, &ciphertext).unwrap();
        assert_eq!(decrypted, Ping { n: 1 });
    }

    #[test]
    fn replayed_ciphertext_is_rejected() {
        let mut client_session = new_session();
        let ciphertext =
            encrypt(&mut client_session, Direction::ClientToServer, &Ping { n: 1 }).unwrap();

        let mut server_session = Session::new(
            client_session.id,
            *client_session.key(),
            Duration::from_secs(60),
        );
        let _: Ping = decrypt(&mut server_session, Direction::ClientToServer, &ciphertext).unwrap();
        let replayed: Result<Ping, _> =
            decrypt(&mut server_session, Direction::ClientToServer, &ciphertext);
        assert_eq!(replayed.unwrap_err(), ChannelError::NonceReuse);
    }

    #[test]
    fn wrong_direction_fails_authentication() {
        let mut client_session = new_session();
        let ciphertext =
            encrypt(&mut client_session, Direction::ClientToServer, &Ping { n: 1 }).unwrap();

        let mut server_session = Session::new(
            client_session.id,
            *client_session.key(),
            Duration::from_secs(60),
        );
        let result: Result<Ping, _> =
            decrypt(&mut server_session, Direction::ServerToClient, &ciphertext);
        assert_eq!(result.unwrap_err(), ChannelError::DecryptionFailed);
    }
}
