// Copyright 2026 - developers of the AICO project.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.
use std::fmt;

#[derive(Debug)]
pub enum BusError {
    /// The underlying broker socket is closed; `publish`/`request` cannot
    /// reach it.
    PublishFailed,
    /// `request` was called on a topic with no entry in the static
    /// request/response topic mapping.
    UnmappedTopic(String),
    /// No response carrying the matching `correlation_id` arrived before
    /// the caller's timeout.
    Timeout,
    /// The underlying ZeroMQ socket reported an error.
    Zmq(zmq::Error),
    /// The envelope codec rejected the payload.
    Encoding(aico_envelope::EncodingError),
}

impl std::error::Error for BusError {}

impl fmt::Display for BusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PublishFailed => write!(f, "publish failed: socket closed"),
            Self::UnmappedTopic(topic) => write!(f, "unmapped request topic: {topic}"),
            Self::Timeout => write!(f, "request timed out"),
            Self::Zmq(err) => write!(f, "zmq error: {err}"),
            Self::Encoding(err) => write!(f, "envelope encoding error: {err}"),
        }
    }
}

impl From<zmq::Error> for BusError {
    fn from(error: zmq::Error) -> Self {
        Self::Zmq(error)
    }
}

impl From<aico_envelope::EncodingError> for BusError {
    fn from(error: aico_envelope::EncodingError) -> Self {
        Self::Encoding(error)
    }
}
