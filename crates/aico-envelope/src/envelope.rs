// Copyright 2026 - developers of the AICO project.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.
use crate::errors::{EncodingError, MalformedEnvelope, PayloadError};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// UTC, millisecond-precision timestamp. Monotonic within a process.
pub type TimestampMs = i64;

/// A globally unique message identifier.
pub type MessageId = Uuid;

/// A stable, dotted message-type string, e.g. `modelservice/embeddings/request`.
pub type MessageType = String;

/// The discriminated-union tag carried alongside a payload's opaque bytes.
pub type TypeUrl = String;

/// The single on-wire record carried over every channel in the system.
///
/// Envelopes are created by the sender and never mutated afterwards. See
/// `spec.md` §3 / `SPEC_FULL.md` §3 for the full invariant list.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Envelope {
    pub message_id: MessageId,
    pub timestamp_utc_ms: TimestampMs,
    pub source: String,
    pub message_type: MessageType,
    pub version: u32,
    pub correlation_id: Option<MessageId>,
    pub payload_type_url: TypeUrl,
    pub payload_bytes: Vec<u8>,
}

/// Fields required to build an [`Envelope`] before it is encoded.
///
/// Splitting this from `Envelope` keeps `message_id`/`timestamp_utc_ms`
/// generation in one place (`Envelope::new`) instead of letting every
/// caller invent its own id/clock source.
pub struct EnvelopeBuilder {
    source: Option<String>,
    message_type: Option<MessageType>,
    version: u32,
    correlation_id: Option<MessageId>,
    payload_type_url: Option<TypeUrl>,
    payload_bytes: Option<Vec<u8>>,
}

impl Default for EnvelopeBuilder {
    fn default() -> Self {
        Self {
            source: None,
            message_type: None,
            version: 1,
            correlation_id: None,
            payload_type_url: None,
            payload_bytes: None,
        }
    }
}

impl EnvelopeBuilder {
    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn message_type(mut self, message_type: impl Into<MessageType>) -> Self {
        self.message_type = Some(message_type.into());
        self
    }

    pub fn version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    pub fn correlation_id(mut self, correlation_id: MessageId) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }

    pub fn payload(mut self, type_url: impl Into<TypeUrl>, bytes: Vec<u8>) -> Self {
        self.payload_type_url = Some(type_url.into());
        self.payload_bytes = Some(bytes);
        self
    }

    pub fn build(self) -> Result<Envelope, EncodingError> {
        Ok(Envelope {
            message_id: Uuid::new_v4(),
            timestamp_utc_ms: now_ms(),
            source: self.source.ok_or(EncodingError::MissingField("source"))?,
            message_type: self
                .message_type
                .ok_or(EncodingError::MissingField("message_type"))?,
            version: self.version,
            correlation_id: self.correlation_id,
            payload_type_url: self
                .payload_type_url
                .ok_or(EncodingError::MissingField("payload_type_url"))?,
            payload_bytes: self
                .payload_bytes
                .ok_or(EncodingError::MissingField("payload_bytes"))?,
        })
    }
}

fn now_ms() -> TimestampMs {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system time is before epoch")
        .as_millis() as TimestampMs
}

/// Serializes an envelope deterministically. Identical envelopes (identical
/// field values, including `message_id`) always produce identical bytes, so
/// signatures and test fixtures computed over the encoding are stable.
pub fn encode(envelope: &Envelope) -> Result<Vec<u8>, EncodingError> {
    Ok(bincode::serialize(envelope)?)
}

/// Strictly decodes bytes produced by [`encode`]. Malformed input fails with
/// [`MalformedEnvelope`]; this never tears down the channel the bytes came
/// from.
pub fn decode(bytes: &[u8]) -> Result<Envelope, MalformedEnvelope> {
    Ok(bincode::deserialize(bytes)?)
}

/// Serializes `value` and tags it with `type_url`, producing the
/// `(type_url, bytes)` pair an [`Envelope`]'s payload fields hold.
pub fn pack_payload<T: Serialize>(
    type_url: impl Into<TypeUrl>,
    value: &T,
) -> Result<(TypeUrl, Vec<u8>), EncodingError> {
    let bytes = bincode::serialize(value)?;
    Ok((type_url.into(), bytes))
}

/// Decodes `bytes` as `T`, failing with [`PayloadError::TypeMismatch`] if
/// `type_url` is not `expected_type`.
pub fn unpack_payload<'a, T: Deserialize<'a>>(
    type_url: &str,
    bytes: &'a [u8],
    expected_type: &str,
) -> Result<T, PayloadError> {
    if type_url != expected_type {
        return Err(PayloadError::TypeMismatch {
            expected: expected_type.to_string(),
            got: type_url.to_string(),
        });
    }
    Ok(bincode::deserialize(bytes)?)
}
