// Copyright 2026 - developers of the AICO project.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.
//! `BusClient` is a cheap, `Clone`-able handle to a single background task
//! that owns the ZeroMQ socket, the same "one owner thread, many client
//! handles talking to it over channels" shape `grammers-mtsender`'s
//! `SenderPool`/`SenderPoolHandle` uses for its TCP connections.
use crate::dedup::DedupSet;
use crate::errors::BusError;
use aico_envelope::{self as envelope, Envelope, MessageId};
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

type Handler = Arc<dyn Fn(Envelope) + Send + Sync>;

enum Command {
    Send(Vec<u8>),
    Shutdown,
}

struct Inner {
    component_id: String,
    out_tx: mpsc::UnboundedSender<Command>,
    handlers: DashMap<String, Vec<Handler>>,
    pending: DashMap<MessageId, oneshot::Sender<Envelope>>,
    connected: AtomicBool,
    worker: Mutex<Option<std::thread::JoinHandle<()>>>,
}

/// A publish/subscribe and request/reply client over a ZeroMQ broker
/// socket. See `spec.md` §4.3.
#[derive(Clone)]
pub struct BusClient {
    inner: Arc<Inner>,
}

impl BusClient {
    /// Connects a ZMQ `DEALER` socket identified as `component_id` to
    /// `broker_endpoint` (e.g. `tcp://127.0.0.1:5555`), spawning the single
    /// reader/writer task that owns the socket for the life of this client.
    pub fn connect(component_id: impl Into<String>, broker_endpoint: &str) -> Result<Self, BusError> {
        let component_id = component_id.into();
        let context = zmq::Context::new();
        let socket = context.socket(zmq::DEALER)?;
        socket.set_identity(component_id.as_bytes())?;
        socket.connect(broker_endpoint)?;
        socket.set_rcvtimeo(50)?;

        let (out_tx, out_rx) = mpsc::unbounded_channel::<Command>();
        let handlers: DashMap<String, Vec<Handler>> = DashMap::new();
        let pending: DashMap<MessageId, oneshot::Sender<Envelope>> = DashMap::new();

        let inner = Arc::new(Inner {
            component_id: component_id.clone(),
            out_tx,
            handlers,
            pending,
            connected: AtomicBool::new(true),
            worker: Mutex::new(None),
        });

        let worker_inner = inner.clone();
        let handle = std::thread::Builder::new()
            .name(format!("aico-bus-{component_id}"))
            .spawn(move || run_dispatcher(socket, out_rx, worker_inner))
            .expect("failed to spawn bus dispatcher thread");
        *inner.worker.lock().unwrap() = Some(handle);

        Ok(Self { inner })
    }

    pub fn component_id(&self) -> &str {
        &self.inner.component_id
    }

    /// Fire-and-forget publication of an envelope. Never blocks
    /// indefinitely; fails with [`BusError::PublishFailed`] if the
    /// underlying socket has been closed.
    pub fn publish(
        &self,
        topic: &str,
        payload: (envelope::TypeUrl, Vec<u8>),
        correlation_id: Option<MessageId>,
    ) -> Result<MessageId, BusError> {
        if !self.inner.connected.load(Ordering::Acquire) {
            return Err(BusError::PublishFailed);
        }

        let mut builder = envelope::EnvelopeBuilder::default()
            .source(self.inner.component_id.clone())
            .message_type(topic)
            .payload(payload.0, payload.1);
        if let Some(id) = correlation_id {
            builder = builder.correlation_id(id);
        }
        let message = builder.build()?;
        let message_id = message.message_id;
        let bytes = envelope::encode(&message)?;

        self.inner
            .out_tx
            .send(Command::Send(bytes))
            .map_err(|_| BusError::PublishFailed)?;
        Ok(message_id)
    }

    /// Registers `handler` to run once per envelope received on `topic`, in
    /// arrival order. Handlers run on the dispatcher thread and must
    /// tolerate overlapping invocations across different topics.
    pub fn subscribe<F>(&self, topic: impl Into<String>, handler: F)
    where
        F: Fn(Envelope) + Send + Sync + 'static,
    {
        self.inner
            .handlers
            .entry(topic.into())
            .or_default()
            .push(Arc::new(handler));
    }

    /// Publishes `payload` on `request_topic`, subscribes to its mapped
    /// response topic, and awaits the first envelope whose `correlation_id`
    /// matches. Cancelling the returned future (dropping it) unregisters the
    /// pending correlation before the timeout; late responses are then
    /// dropped silently.
    pub async fn request(
        &self,
        request_topic: &str,
        payload: (envelope::TypeUrl, Vec<u8>),
        timeout: Duration,
    ) -> Result<Envelope, BusError> {
        if aico_envelope::response_topic(request_topic).is_none() {
            return Err(BusError::UnmappedTopic(request_topic.to_string()));
        }

        let (tx, rx) = oneshot::channel();
        let message_id = self.publish(request_topic, payload, None)?;
        self.inner.pending.insert(message_id, tx);

        let result = tokio::time::timeout(timeout, rx).await;
        // Unregister regardless of outcome: a timeout must not leave a
        // dangling entry, and a late duplicate response must find nothing
        // to resolve.
        self.inner.pending.remove(&message_id);

        match result {
            Ok(Ok(envelope)) => Ok(envelope),
            Ok(Err(_)) | Err(_) => Err(BusError::Timeout),
        }
    }

    pub fn disconnect(&self) {
        self.inner.connected.store(false, Ordering::Release);
        let _ = self.inner.out_tx.send(Command::Shutdown);
        if let Some(handle) = self.inner.worker.lock().unwrap().take() {
            let _ = handle.join();
        }
    }
}

fn run_dispatcher(
    socket: zmq::Socket,
    mut out_rx: mpsc::UnboundedReceiver<Command>,
    inner: Arc<Inner>,
) {
    let mut dedup = DedupSet::default();

    loop {
        match out_rx.try_recv() {
            Ok(Command::Send(bytes)) => {
                if let Err(err) = socket.send(bytes, 0) {
                    log::warn!("aico-bus: send failed: {err}");
                }
            }
            Ok(Command::Shutdown) => break,
            Err(mpsc::error::TryRecvError::Empty) => {}
            Err(mpsc::error::TryRecvError::Disconnected) => break,
        }

        match socket.recv_bytes(0) {
            Ok(bytes) => match envelope::decode(&bytes) {
                Ok(message) => dispatch(&inner, &mut dedup, message),
                Err(err) => log::warn!("aico-bus: dropping malformed envelope: {err}"),
            },
            Err(zmq::Error::EAGAIN) => {}
            Err(err) => {
                log::warn!("aico-bus: recv failed: {err}");
                break;
            }
        }
    }

    inner.connected.store(false, Ordering::Release);
}

fn dispatch(inner: &Arc<Inner>, dedup: &mut DedupSet, message: Envelope) {
    if !dedup.observe(message.message_id) {
        log::debug!("aico-bus: dropping redelivered message {}", message.message_id);
        return;
    }

    if let Some(correlation_id) = message.correlation_id {
        if let Some((_, sender)) = inner.pending.remove(&correlation_id) {
            let _ = sender.send(message);
            return;
        }
    }

    if let Some(handlers) = inner.handlers.get(&message.message_type) {
        for handler in handlers.iter() {
            handler(message.clone());
        }
    }
}
