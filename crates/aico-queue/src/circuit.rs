// Copyright 2026 - developers of the AICO project.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.
//! The three-state circuit breaker of `spec.md` §4.4 / §3's `CircuitState`.
use std::time::{Duration, Instant};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

pub struct CircuitBreaker {
    state: CircuitState,
    failure_count: u32,
    last_failure_time: Option<Instant>,
    failure_threshold: u32,
    circuit_timeout: Duration,
    /// Set while a single `HALF_OPEN` probe is in flight, so concurrent
    /// callers don't all slip through as "the" probe.
    probe_in_flight: bool,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, circuit_timeout: Duration) -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            last_failure_time: None,
            failure_threshold,
            circuit_timeout,
            probe_in_flight: false,
        }
    }

    pub fn state(&self) -> CircuitState {
        self.state
    }

    pub fn failure_count(&self) -> u32 {
        self.failure_count
    }

    /// Call before issuing a downstream call. Returns `true` if the call may
    /// proceed (transitioning `OPEN` -> `HALF_OPEN` after the cooldown has
    /// elapsed and admitting exactly one probe), `false` if it must fail
    /// immediately with `CircuitOpen`.
    pub fn try_acquire(&mut self) -> bool {
        match self.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let cooled_down = self
                    .last_failure_time
                    .map(|t| t.elapsed() >= self.circuit_timeout)
                    .unwrap_or(false);
                if cooled_down && !self.probe_in_flight {
                    self.state = CircuitState::HalfOpen;
                    self.probe_in_flight = true;
                    true
                } else {
                    false
                }
            }
            CircuitState::HalfOpen => false,
        }
    }

    pub fn on_success(&mut self) {
        match self.state {
            CircuitState::Closed => {
                self.failure_count = self.failure_count.saturating_sub(1);
            }
            CircuitState::HalfOpen => {
                self.state = CircuitState::Closed;
                self.failure_count = 0;
                self.probe_in_flight = false;
            }
            CircuitState::Open => {}
        }
    }

    pub fn on_failure(&mut self) {
        self.last_failure_time = Some(Instant::now());
        match self.state {
            CircuitState::Closed => {
                self.failure_count += 1;
                if self.failure_count >= self.failure_threshold {
                    self.state = CircuitState::Open;
                }
            }
            CircuitState::HalfOpen => {
                self.state = CircuitState::Open;
                self.probe_in_flight = false;
            }
            CircuitState::Open => {}
        }
    }
}
