// Copyright 2026 - developers of the AICO project.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.
use aico_envelope::{decode, encode, pack_payload, unpack_payload, EnvelopeBuilder};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, PartialEq, Debug)]
struct HealthRequest {
    probe_id: u32,
}

/// `spec.md` §8 invariant 1: for all envelopes `e`, `decode(encode(e)) == e`.
#[test]
fn envelope_round_trip_identity() {
    let (type_url, bytes) =
        pack_payload("aico.modelservice.v1.HealthRequest", &HealthRequest { probe_id: 7 }).unwrap();
    let envelope = EnvelopeBuilder::default()
        .source("gateway")
        .message_type("modelservice/health/request")
        .payload(type_url, bytes)
        .build()
        .unwrap();

    let wire = encode(&envelope).unwrap();
    let decoded = decode(&wire).unwrap();
    assert_eq!(envelope, decoded);

    let request: HealthRequest = unpack_payload(
        &decoded.payload_type_url,
        &decoded.payload_bytes,
        "aico.modelservice.v1.HealthRequest",
    )
    .unwrap();
    assert_eq!(request, HealthRequest { probe_id: 7 });
}

#[test]
fn correlation_id_ties_response_to_request() {
    let (type_url, bytes) =
        pack_payload("aico.modelservice.v1.HealthRequest", &HealthRequest { probe_id: 1 }).unwrap();
    let request = EnvelopeBuilder::default()
        .source("gateway")
        .message_type("modelservice/health/request")
        .payload(type_url, bytes)
        .build()
        .unwrap();

    let (type_url, bytes) = pack_payload("aico.modelservice.v1.HealthResponse", &true).unwrap();
    let response = EnvelopeBuilder::default()
        .source("modelservice")
        .message_type("modelservice/health/response")
        .correlation_id(request.message_id)
        .payload(type_url, bytes)
        .build()
        .unwrap();

    assert_eq!(response.correlation_id, Some(request.message_id));
}

#[test]
fn decode_of_malformed_bytes_is_local_failure_only() {
    // A bad decode must fail without panicking and without touching any
    // shared state -- the channel it arrived on stays open.
    assert!(decode(&[0xff, 0x00, 0x01]).is_err());
    // The crate is still usable afterwards.
    let (type_url, bytes) = pack_payload("aico.test.v1.Ping", &1u8).unwrap();
    let envelope = EnvelopeBuilder::default()
        .source("test")
        .message_type("test/ping")
        .payload(type_url, bytes)
        .build()
        .unwrap();
    assert!(encode(&envelope).is_ok());
}
