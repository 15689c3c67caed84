// Copyright 2026 - developers of the AICO project.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.
use std::fmt;

/// Raised by [`crate::encode`] when an envelope cannot be produced.
///
/// Encoding failures are always a programmer error (a required field was
/// left unset); they are never caused by the data a peer sent us.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EncodingError {
    /// A field that is required on the wire was missing.
    MissingField(&'static str),
    /// The underlying binary serializer rejected the value.
    Serializer(String),
}

impl std::error::Error for EncodingError {}

impl fmt::Display for EncodingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingField(field) => write!(f, "encoding error, missing field: {field}"),
            Self::Serializer(err) => write!(f, "encoding error, serializer failed: {err}"),
        }
    }
}

/// Raised by [`crate::decode`] when the input bytes are not a valid envelope.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MalformedEnvelope {
    pub reason: String,
}

impl std::error::Error for MalformedEnvelope {}

impl fmt::Display for MalformedEnvelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "malformed envelope: {}", self.reason)
    }
}

/// Raised by [`crate::unpack_payload`] when the envelope's type tag does not
/// match what the caller expected, or the payload bytes do not decode as
/// that type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PayloadError {
    /// The envelope's `type_url` did not match the type the caller asked for.
    TypeMismatch { expected: String, got: String },
    /// The payload bytes did not decode as the expected type.
    Malformed(String),
}

impl std::error::Error for PayloadError {}

impl fmt::Display for PayloadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TypeMismatch { expected, got } => {
                write!(f, "payload type mismatch: expected {expected}, got {got}")
            }
            Self::Malformed(err) => write!(f, "payload did not decode: {err}"),
        }
    }
}

impl From<bincode::Error> for EncodingError {
    fn from(error: bincode::Error) -> Self {
        Self::Serializer(error.to_string())
    }
}

impl From<bincode::Error> for MalformedEnvelope {
    fn from(error: bincode::Error) -> Self {
        Self {
            reason: error.to_string(),
        }
    }
}

impl From<bincode::Error> for PayloadError {
    fn from(error: bincode::Error) -> Self {
        Self::Malformed(error.to_string())
    }
}
