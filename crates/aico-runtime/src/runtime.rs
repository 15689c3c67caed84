// Copyright 2026 - developers of the AICO project.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.
//! Assembles the long-lived, process-wide subsystems (the protected
//! queue and the memory pipeline) behind one handle, replacing the
//! "global module state" pattern flagged in `spec.md` §9 with an
//! explicitly constructed and passed context object.
//!
//! `aico-envelope` and `aico-channel` are deliberately **not** carried on
//! `Runtime`: C1 is pure/stateless and C2 holds per-session state the
//! caller owns (`SPEC_FULL.md` §5), so both are constructed directly by
//! whatever handles one client connection, not held as a singleton here.
use crate::config::Config;
use crate::error::RuntimeError;
use aico_memory::{MemoryPipeline, PipelineConfig, VectorStore};
use aico_queue::{Downstream, OllamaDownstream, RequestQueue};
use std::sync::Arc;
use std::time::Duration;

pub struct Runtime {
    pub config: Config,
    pub queue: Arc<RequestQueue>,
    pub memory: Arc<MemoryPipeline>,
}

impl Runtime {
    /// Builds a `Runtime` wired to the real `ollama`-shaped external model
    /// runtime (`spec.md` §6) and a caller-supplied vector store.
    pub fn bootstrap(config: Config, store: Arc<VectorStore>) -> Result<Self, RuntimeError> {
        let downstream = OllamaDownstream::new(
            config.modelservice.ollama.url.clone(),
            "nomic-embed-text",
            "llama3",
        );
        Self::bootstrap_with_downstream(config, store, Arc::new(downstream))
    }

    /// Builds a `Runtime` against an arbitrary [`Downstream`] — the seam
    /// tests and the demo binary use to avoid a live model runtime
    /// process.
    pub fn bootstrap_with_downstream(
        config: Config,
        store: Arc<VectorStore>,
        downstream: Arc<dyn Downstream>,
    ) -> Result<Self, RuntimeError> {
        let queue_config = config.queue.to_queue_config();
        let queue = Arc::new(RequestQueue::new(downstream, queue_config));
        let memory = Arc::new(MemoryPipeline::new(
            queue.clone(),
            store,
            PipelineConfig::default(),
        ));
        Ok(Self { config, queue, memory })
    }

    /// Starts the protected queue's worker pool. No other component in
    /// this crate spawns detached work that reaches the external model
    /// endpoint (`SPEC_FULL.md` §5).
    pub fn start(&self, num_workers: usize) {
        self.queue.start(num_workers);
    }

    pub async fn shutdown(&self, grace: Duration) {
        self.queue.stop(grace).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use aico_queue::DownstreamError;

    struct EchoDownstream;

    #[async_trait]
    impl Downstream for EchoDownstream {
        async fn call(&self, _operation: &str, items: Vec<Vec<u8>>) -> Result<Vec<Vec<u8>>, DownstreamError> {
            Ok(items)
        }
    }

    #[tokio::test]
    async fn bootstrap_starts_and_shuts_down_cleanly() {
        let store = Arc::new(VectorStore::open_temporary().unwrap());
        let runtime = Runtime::bootstrap_with_downstream(Config::default(), store, Arc::new(EchoDownstream)).unwrap();
        runtime.start(2);
        runtime.shutdown(Duration::from_millis(100)).await;
    }
}
