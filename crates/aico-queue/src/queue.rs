// Copyright 2026 - developers of the AICO project.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.
//! The request queue itself: a priority heap for single submissions, a
//! per-operation batch accumulator for batchable ones, both gated by a
//! shared rate limiter and circuit breaker in front of the downstream call.
use crate::batch::{is_batchable, BatchAccumulator, BatchMember};
use crate::circuit::{CircuitBreaker, CircuitState};
use crate::downstream::Downstream;
use crate::errors::QueueError;
use crate::rate_limit::TokenBucket;
use crate::stats::{QueueSnapshot, Stats};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::{oneshot, Notify, Semaphore};
use tokio::task::JoinHandle;

#[derive(Clone, Debug)]
pub struct QueueConfig {
    pub rate_limit_per_second: f64,
    pub batch_size: usize,
    pub batch_timeout: Duration,
    pub circuit_failure_threshold: u32,
    pub circuit_timeout: Duration,
    pub max_retries: u32,
    pub max_concurrent: usize,
    pub default_timeout: Duration,
    /// Poll interval for the batch-firing background task.
    pub batch_tick: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            rate_limit_per_second: 10.0,
            batch_size: 10,
            batch_timeout: Duration::from_millis(500),
            circuit_failure_threshold: 5,
            circuit_timeout: Duration::from_secs(30),
            max_retries: 3,
            max_concurrent: 8,
            default_timeout: Duration::from_secs(30),
            batch_tick: Duration::from_millis(25),
        }
    }
}

#[derive(Clone, Debug)]
pub struct QueueOutcome {
    pub data: Vec<u8>,
    pub degraded: bool,
}

pub(crate) type PendingResult = Result<QueueOutcome, QueueError>;

struct QueueEntry {
    seq: u64,
    priority: i32,
    operation: String,
    data: Vec<u8>,
    retries: u32,
    responder: oneshot::Sender<PendingResult>,
}

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}
impl Eq for QueueEntry {}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap: higher priority pops first, and among
        // equal priorities the lower sequence number (submitted earlier)
        // pops first, so we invert the seq comparison.
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}
impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

struct State {
    heap: Mutex<BinaryHeap<QueueEntry>>,
    heap_notify: Notify,
    batches: Mutex<HashMap<String, BatchAccumulator>>,
    circuit: Mutex<CircuitBreaker>,
    rate_limiter: Mutex<TokenBucket>,
    stats: Mutex<Stats>,
    shutdown: AtomicBool,
    seq: AtomicU64,
    downstream: Arc<dyn Downstream>,
    config: QueueConfig,
    semaphore: Semaphore,
}

/// The protected queue in front of the external model runtime: bounded
/// concurrency, a token-bucket rate limit, a three-state circuit breaker,
/// per-operation batching, and retry-with-backoff for retriable failures.
pub struct RequestQueue {
    state: Arc<State>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl RequestQueue {
    pub fn new(downstream: Arc<dyn Downstream>, config: QueueConfig) -> Self {
        let state = Arc::new(State {
            heap: Mutex::new(BinaryHeap::new()),
            heap_notify: Notify::new(),
            batches: Mutex::new(HashMap::new()),
            circuit: Mutex::new(CircuitBreaker::new(
                config.circuit_failure_threshold,
                config.circuit_timeout,
            )),
            rate_limiter: Mutex::new(TokenBucket::new(config.rate_limit_per_second)),
            stats: Mutex::new(Stats::default()),
            shutdown: AtomicBool::new(false),
            seq: AtomicU64::new(0),
            downstream,
            config,
            semaphore: Semaphore::new(0),
        });
        Self {
            state,
            workers: Mutex::new(Vec::new()),
        }
    }

    /// Spawns `num_workers` single-item workers plus one batch-firing task.
    pub fn start(&self, num_workers: usize) {
        let state = &self.state;
        state.semaphore.add_permits(state.config.max_concurrent);

        let mut handles = self.workers.lock().unwrap();
        for _ in 0..num_workers {
            let state = Arc::clone(&self.state);
            handles.push(tokio::spawn(run_worker(state)));
        }
        handles.push(tokio::spawn(run_batch_ticker(Arc::clone(&self.state))));
    }

    /// Signals shutdown, wakes anything waiting on the heap, and joins
    /// every worker, aborting the ones that don't finish within `timeout`.
    pub async fn stop(&self, timeout: Duration) {
        self.state.shutdown.store(true, AtomicOrdering::SeqCst);
        self.state.heap_notify.notify_waiters();

        let handles: Vec<_> = std::mem::take(&mut *self.workers.lock().unwrap());
        let join_all = async {
            for handle in handles {
                let _ = handle.await;
            }
        };
        if tokio::time::timeout(timeout, join_all).await.is_err() {
            log::warn!("queue shutdown timed out after {timeout:?}; workers left running");
        }

        self.fail_all_pending(QueueError::Cancelled);
    }

    fn fail_all_pending(&self, error: QueueError) {
        let mut heap = self.state.heap.lock().unwrap();
        while let Some(entry) = heap.pop() {
            let _ = entry.responder.send(Err(error.clone()));
        }
        let mut batches = self.state.batches.lock().unwrap();
        for (_, accumulator) in batches.iter_mut() {
            for member in accumulator.take() {
                let _ = member.responder.send(Err(error.clone()));
            }
        }
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        let stats = self.state.stats.lock().unwrap();
        let circuit = self.state.circuit.lock().unwrap();
        let mut rate_limiter = self.state.rate_limiter.lock().unwrap();
        let heap_depth = self.state.heap.lock().unwrap().len();
        let batch_depth: usize = self
            .state
            .batches
            .lock()
            .unwrap()
            .values()
            .map(|accumulator| accumulator.len())
            .sum();

        QueueSnapshot {
            queue_depth: heap_depth + batch_depth,
            active_count: self.state.config.max_concurrent - self.state.semaphore.available_permits(),
            processed: stats.processed,
            failed: stats.failed,
            circuit_broken: stats.circuit_broken,
            rate_limited: stats.rate_limited,
            fallback_used: stats.fallback_used,
            ema_processing_time_ms: stats.ema_processing_time_ms(),
            circuit_state: circuit.state(),
            token_balance: rate_limiter.available(),
            batch_efficiency: stats.batch_efficiency(self.state.config.batch_size),
        }
    }

    /// Submits one request and waits for its outcome (or `timeout`,
    /// whichever is sooner). Returns `(data, degraded)` on success.
    pub async fn submit(
        &self,
        operation: &str,
        data: Vec<u8>,
        priority: i32,
        timeout: Option<Duration>,
    ) -> Result<(Vec<u8>, bool), QueueError> {
        if self.state.shutdown.load(AtomicOrdering::SeqCst) {
            return Err(QueueError::QueueStopped);
        }

        let (tx, rx) = oneshot::channel();
        if is_batchable(operation) {
            // Batched operations draw their rate-limit token once per
            // batch at fire time (`fire_batch`), not per member here.
            let mut batches = self.state.batches.lock().unwrap();
            batches
                .entry(operation.to_string())
                .or_insert_with(BatchAccumulator::new)
                .push(BatchMember {
                    data,
                    responder: tx,
                });
        } else {
            // `spec.md` §4.4: a single submission draws exactly one
            // rate-limit token immediately and fails fast if none is
            // available, rather than waiting in the heap for a worker to
            // discover that later.
            if !self.state.rate_limiter.lock().unwrap().try_acquire() {
                self.state.stats.lock().unwrap().rate_limited += 1;
                return Err(QueueError::RateLimited);
            }
            let seq = self.state.seq.fetch_add(1, AtomicOrdering::SeqCst);
            let mut heap = self.state.heap.lock().unwrap();
            heap.push(QueueEntry {
                seq,
                priority,
                operation: operation.to_string(),
                data,
                retries: 0,
                responder: tx,
            });
            drop(heap);
            self.state.heap_notify.notify_one();
        }

        let wait = timeout.unwrap_or(self.state.config.default_timeout);
        match tokio::time::timeout(wait, rx).await {
            Ok(Ok(outcome)) => outcome.map(|o| (o.data, o.degraded)),
            Ok(Err(_)) => Err(QueueError::Cancelled),
            Err(_) => Err(QueueError::Timeout),
        }
    }
}

async fn run_worker(state: Arc<State>) {
    loop {
        let entry = {
            let mut heap = state.heap.lock().unwrap();
            heap.pop()
        };
        let Some(entry) = entry else {
            if state.shutdown.load(AtomicOrdering::SeqCst) {
                return;
            }
            tokio::select! {
                _ = state.heap_notify.notified() => {}
                _ = tokio::time::sleep(Duration::from_millis(50)) => {}
            }
            continue;
        };

        process_single(&state, entry).await;
    }
}

async fn process_single(state: &Arc<State>, mut entry: QueueEntry) {
    loop {
        // The rate-limit token for this entry was already drawn
        // synchronously in `submit`; only the circuit breaker gates
        // dispatch here.
        if let Some(reason) = circuit_blocked_reason(state) {
            let response = fallback_or_error(state, &entry.operation, &entry.data, reason);
            let _ = entry.responder.send(response);
            return;
        }

        let permit = state.semaphore.acquire().await.expect("semaphore closed");
        let started = Instant::now();
        let result = state
            .downstream
            .call(&entry.operation, vec![entry.data.clone()])
            .await;
        drop(permit);

        match result {
            Ok(mut items) => {
                state.circuit.lock().unwrap().on_success();
                let mut stats = state.stats.lock().unwrap();
                stats.processed += 1;
                stats.record_processing_time(started.elapsed().as_secs_f64() * 1000.0);
                drop(stats);
                let data = items.pop().unwrap_or_default();
                let _ = entry.responder.send(Ok(QueueOutcome {
                    data,
                    degraded: false,
                }));
                return;
            }
            Err(crate::errors::DownstreamError::Retriable(reason)) => {
                state.circuit.lock().unwrap().on_failure();
                if entry.retries < state.config.max_retries {
                    let delay = backoff_for(entry.retries);
                    entry.retries += 1;
                    tokio::time::sleep(delay).await;
                    continue;
                }
                state.stats.lock().unwrap().failed += 1;
                let response = fallback_or_error(state, &entry.operation, &entry.data, QueueError::Retriable(reason));
                let _ = entry.responder.send(response);
                return;
            }
            Err(crate::errors::DownstreamError::Fatal(reason)) => {
                state.circuit.lock().unwrap().on_failure();
                state.stats.lock().unwrap().failed += 1;
                let response = fallback_or_error(state, &entry.operation, &entry.data, QueueError::Fatal(reason));
                let _ = entry.responder.send(response);
                return;
            }
        }
    }
}

/// Checks only the circuit breaker. Used on the single-submission path,
/// where the rate-limit token was already drawn synchronously in `submit`.
fn circuit_blocked_reason(state: &Arc<State>) -> Option<QueueError> {
    if !state.circuit.lock().unwrap().try_acquire() {
        state.stats.lock().unwrap().circuit_broken += 1;
        return Some(QueueError::CircuitOpen);
    }
    None
}

/// Checks circuit breaker and rate limiter before a downstream call.
/// `Some(err)` means the call must not proceed; callers turn `err` into a
/// fallback or a terminal response per submission. Used on the batch path,
/// which draws its rate-limit token once per batch at fire time.
fn blocked_reason(state: &Arc<State>, operation: &str) -> Option<QueueError> {
    // Rate limiter first: admitting a HALF_OPEN circuit probe only to then
    // fail it on the rate limiter would strand the breaker in HALF_OPEN
    // with no downstream call ever running to release the probe.
    if !state.rate_limiter.lock().unwrap().try_acquire() {
        state.stats.lock().unwrap().rate_limited += 1;
        return Some(QueueError::RateLimited);
    }
    if !state.circuit.lock().unwrap().try_acquire() {
        state.stats.lock().unwrap().circuit_broken += 1;
        return Some(QueueError::CircuitOpen);
    }
    let _ = operation;
    None
}

fn fallback_or_error(state: &Arc<State>, operation: &str, item: &[u8], error: QueueError) -> PendingResult {
    if state.downstream.supports_fallback(operation) {
        if let Some(data) = state.downstream.fallback(operation, item) {
            state.stats.lock().unwrap().fallback_used += 1;
            return Ok(QueueOutcome {
                data,
                degraded: true,
            });
        }
    }
    Err(error)
}

fn backoff_for(retries: u32) -> Duration {
    let secs = 2u64.saturating_pow(retries).min(30);
    Duration::from_secs(secs)
}

async fn run_batch_ticker(state: Arc<State>) {
    loop {
        if state.shutdown.load(AtomicOrdering::SeqCst) {
            let ready: Vec<(String, Vec<BatchMember>)> = {
                let mut batches = state.batches.lock().unwrap();
                batches
                    .iter_mut()
                    .filter(|(_, accumulator)| !accumulator.is_empty())
                    .map(|(op, accumulator)| (op.clone(), accumulator.take()))
                    .collect()
            };
            for (operation, members) in ready {
                fire_batch(&state, operation, members).await;
            }
            return;
        }

        tokio::time::sleep(state.config.batch_tick).await;

        let ready: Vec<(String, Vec<BatchMember>)> = {
            let mut batches = state.batches.lock().unwrap();
            batches
                .iter_mut()
                .filter_map(|(op, accumulator)| {
                    if accumulator.is_empty() {
                        return None;
                    }
                    if accumulator.len() >= state.config.batch_size
                        || accumulator.age() >= state.config.batch_timeout
                    {
                        Some((op.clone(), accumulator.take()))
                    } else {
                        None
                    }
                })
                .collect()
        };
        for (operation, members) in ready {
            let state = Arc::clone(&state);
            tokio::spawn(async move {
                fire_batch(&state, operation, members).await;
            });
        }
    }
}

async fn fire_batch(state: &Arc<State>, operation: String, mut members: Vec<BatchMember>) {
    if members.is_empty() {
        return;
    }
    if let Some(reason) = blocked_reason(state, &operation) {
        for member in members {
            let outcome = fallback_or_error(state, &operation, &member.data, reason.clone());
            let _ = member.responder.send(outcome);
        }
        return;
    }

    let permit = state.semaphore.acquire().await.expect("semaphore closed");
    let started = Instant::now();
    let items: Vec<Vec<u8>> = members.iter().map(|m| m.data.clone()).collect();
    let batch_len = items.len();
    let result = state.downstream.call(&operation, items).await;
    drop(permit);

    state.stats.lock().unwrap().record_batch(batch_len);

    match result {
        Ok(mut outputs) => {
            state.circuit.lock().unwrap().on_success();
            let mut stats = state.stats.lock().unwrap();
            stats.processed += batch_len as u64;
            stats.record_processing_time(started.elapsed().as_secs_f64() * 1000.0);
            drop(stats);
            outputs.reverse();
            for member in members.drain(..) {
                let data = outputs.pop().unwrap_or_default();
                let _ = member.responder.send(Ok(QueueOutcome {
                    data,
                    degraded: false,
                }));
            }
        }
        Err(downstream_err) => {
            state.circuit.lock().unwrap().on_failure();
            state.stats.lock().unwrap().failed += batch_len as u64;
            let error: QueueError = downstream_err.into();
            for member in members {
                let outcome = fallback_or_error(state, &operation, &member.data, error.clone());
                let _ = member.responder.send(outcome);
            }
        }
    }
}
