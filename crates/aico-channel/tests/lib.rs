// Copyright 2026 - developers of the AICO project.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.
use aico_channel::{accept_handshake, decrypt, encrypt, finish_handshake, initiate_handshake};
use aico_channel::{Direction, ReplayGuard};
use aico_envelope::generate_identity;
use serde_json::{json, Value};

/// `spec.md` §8 end-to-end scenario 1: handshake, then an encrypted ping
/// that the peer echoes back with an extra field.
#[test]
fn handshake_then_encrypted_echo() {
    let mut client_identity = generate_identity();
    let mut server_identity = generate_identity();
    let mut replay_guard = ReplayGuard::default();

    let request = initiate_handshake(&mut client_identity, "cli");
    let (response, mut server_session) =
        accept_handshake(&mut server_identity, &request, &mut replay_guard, 60, 3600).unwrap();
    let mut client_session =
        finish_handshake(&mut client_identity, &request, &response, server_session.id, 3600)
            .unwrap();

    let ping = json!({ "n": 1 });
    let ciphertext = encrypt(&mut client_session, Direction::ClientToServer, &ping).unwrap();

    let received: Value = decrypt(&mut server_session, Direction::ClientToServer, &ciphertext)
        .unwrap();
    assert_eq!(received["n"], 1);

    let pong = json!({ "n": received["n"], "pong": true });
    let ciphertext = encrypt(&mut server_session, Direction::ServerToClient, &pong).unwrap();

    let received: Value = decrypt(&mut client_session, Direction::ServerToClient, &ciphertext)
        .unwrap();
    assert_eq!(received["n"], 1);
    assert_eq!(received["pong"], true);
}

/// `spec.md` §3 session invariant: each nonce used at most once per
/// direction, even across many consecutive messages.
#[test]
fn nonces_never_repeat_across_many_messages() {
    let mut client_identity = generate_identity();
    let mut server_identity = generate_identity();
    let mut replay_guard = ReplayGuard::default();

    let request = initiate_handshake(&mut client_identity, "cli");
    let (response, mut server_session) =
        accept_handshake(&mut server_identity, &request, &mut replay_guard, 60, 3600).unwrap();
    let mut client_session =
        finish_handshake(&mut client_identity, &request, &response, server_session.id, 3600)
            .unwrap();

    for i in 0..50u32 {
        let ciphertext =
            encrypt(&mut client_session, Direction::ClientToServer, &json!({ "i": i })).unwrap();
        let received: Value =
            decrypt(&mut server_session, Direction::ClientToServer, &ciphertext).unwrap();
        assert_eq!(received["i"], i);
    }
}

#[test]
fn closing_a_session_refuses_further_use() {
    let mut client_identity = generate_identity();
    let mut server_identity = generate_identity();
    let mut replay_guard = ReplayGuard::default();

    let request = initiate_handshake(&mut client_identity, "cli");
    let (_response, mut server_session) =
        accept_handshake(&mut server_identity, &request, &mut replay_guard, 60, 3600).unwrap();

    server_session.close();
    let result = encrypt(&mut server_session, Direction::ServerToClient, &json!({}));
    assert!(result.is_err());
}
