// Copyright 2026 - developers of the AICO project.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.
//! The shared error-kind taxonomy of `spec.md` §7, plus [`Classify`] impls
//! that map each component crate's own error enum into a [`CoreErrorKind`]
//! without that crate depending on `aico-runtime` — `Classify` is a local
//! trait implemented here for foreign types, which the orphan rules allow
//! and which keeps the dependency graph acyclic (`SPEC_FULL.md` §0).
use std::fmt;

/// `spec.md` §7 error taxonomy, by kind rather than by concrete type, so
/// an (out-of-scope) HTTP gateway can map any core error to a status code
/// without depending on every component crate's concrete error type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CoreErrorKind {
    Transport,
    Protocol,
    Unauthorized,
    Forbidden,
    RateLimited,
    CircuitOpen,
    QueueStopped,
    Timeout,
    Logic,
    Degraded,
}

impl CoreErrorKind {
    /// The HTTP status `spec.md` §7 "User-visible behavior" mirrors this
    /// kind to at the (out-of-scope) API surface.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Transport => 503,
            Self::Protocol => 400,
            Self::Unauthorized => 401,
            Self::Forbidden => 403,
            Self::RateLimited => 429,
            Self::CircuitOpen => 503,
            Self::QueueStopped => 503,
            Self::Timeout => 408,
            Self::Logic => 500,
            Self::Degraded => 200,
        }
    }
}

impl fmt::Display for CoreErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Transport => "transport",
            Self::Protocol => "protocol",
            Self::Unauthorized => "unauthorized",
            Self::Forbidden => "forbidden",
            Self::RateLimited => "rate_limited",
            Self::CircuitOpen => "circuit_open",
            Self::QueueStopped => "queue_stopped",
            Self::Timeout => "timeout",
            Self::Logic => "logic",
            Self::Degraded => "degraded",
        };
        write!(f, "{label}")
    }
}

/// Classifies a concrete component error into the shared taxonomy.
pub trait Classify {
    fn kind(&self) -> CoreErrorKind;
}

impl Classify for aico_envelope::MalformedEnvelope {
    fn kind(&self) -> CoreErrorKind {
        CoreErrorKind::Protocol
    }
}

impl Classify for aico_envelope::EncodingError {
    fn kind(&self) -> CoreErrorKind {
        CoreErrorKind::Logic
    }
}

impl Classify for aico_envelope::PayloadError {
    fn kind(&self) -> CoreErrorKind {
        CoreErrorKind::Protocol
    }
}

impl Classify for aico_channel::HandshakeRejected {
    fn kind(&self) -> CoreErrorKind {
        CoreErrorKind::Unauthorized
    }
}

impl Classify for aico_channel::ChannelError {
    fn kind(&self) -> CoreErrorKind {
        match self {
            Self::SessionNotActive | Self::NonceReuse => CoreErrorKind::Forbidden,
            Self::DecryptionFailed => CoreErrorKind::Unauthorized,
            Self::Serialization(_) => CoreErrorKind::Protocol,
            Self::EncryptionRequired => CoreErrorKind::Forbidden,
        }
    }
}

impl Classify for aico_bus::BusError {
    fn kind(&self) -> CoreErrorKind {
        match self {
            Self::PublishFailed | Self::Zmq(_) => CoreErrorKind::Transport,
            Self::UnmappedTopic(_) | Self::Encoding(_) => CoreErrorKind::Protocol,
            Self::Timeout => CoreErrorKind::Timeout,
        }
    }
}

impl Classify for aico_queue::QueueError {
    fn kind(&self) -> CoreErrorKind {
        match self {
            Self::CircuitOpen => CoreErrorKind::CircuitOpen,
            Self::RateLimited => CoreErrorKind::RateLimited,
            Self::QueueStopped => CoreErrorKind::QueueStopped,
            Self::Timeout => CoreErrorKind::Timeout,
            Self::Retriable(_) => CoreErrorKind::Transport,
            Self::Fatal(_) => CoreErrorKind::Logic,
            Self::Cancelled => CoreErrorKind::Logic,
        }
    }
}

impl Classify for aico_memory::MemoryError {
    fn kind(&self) -> CoreErrorKind {
        match self {
            Self::Store(_) => CoreErrorKind::Transport,
            Self::Serialization(_) => CoreErrorKind::Logic,
            Self::InvalidFact(_) => CoreErrorKind::Logic,
        }
    }
}

/// Errors this crate itself can produce assembling a [`crate::Runtime`].
#[derive(Debug)]
pub enum RuntimeError {
    Config(toml::de::Error),
    Store(aico_memory::MemoryError),
}

impl std::error::Error for RuntimeError {}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(err) => write!(f, "invalid configuration: {err}"),
            Self::Store(err) => write!(f, "failed to open vector store: {err}"),
        }
    }
}

impl From<toml::de::Error> for RuntimeError {
    fn from(error: toml::de::Error) -> Self {
        Self::Config(error)
    }
}

impl From<aico_memory::MemoryError> for RuntimeError {
    fn from(error: aico_memory::MemoryError) -> Self {
        Self::Store(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_error_kinds_map_to_taxonomy() {
        assert_eq!(aico_queue::QueueError::CircuitOpen.kind(), CoreErrorKind::CircuitOpen);
        assert_eq!(aico_queue::QueueError::RateLimited.kind(), CoreErrorKind::RateLimited);
    }

    #[test]
    fn http_status_covers_flow_control_kinds() {
        assert_eq!(CoreErrorKind::RateLimited.http_status(), 429);
        assert_eq!(CoreErrorKind::Timeout.http_status(), 408);
    }
}
