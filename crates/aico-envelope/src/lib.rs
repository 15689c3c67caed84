// Copyright 2026 - developers of the AICO project.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.
//! Canonical envelope encoding and client identity material (component C1).
//!
//! This is the only crate in the workspace that defines the on-wire
//! envelope shape; every other component passes `Envelope` values around
//! without ever looking past `payload_type_url`.

pub mod envelope;
pub mod errors;
pub mod identity;
pub mod topics;

pub use envelope::{
    decode, encode, pack_payload, unpack_payload, Envelope, EnvelopeBuilder, MessageId,
    MessageType, TimestampMs, TypeUrl,
};
pub use errors::{EncodingError, MalformedEnvelope, PayloadError};
pub use identity::{generate_identity, verify_signature, ClientIdentity, PublicIdentity};
pub use topics::{is_request_topic, response_topic};
