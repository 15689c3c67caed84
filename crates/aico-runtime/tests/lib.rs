// Copyright 2026 - developers of the AICO project.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.
use aico_memory::VectorStore;
use aico_queue::{Downstream, DownstreamError};
use aico_runtime::{Classify, Config, CoreErrorKind, Runtime};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

struct EchoDownstream;

#[async_trait]
impl Downstream for EchoDownstream {
    async fn call(&self, _operation: &str, items: Vec<Vec<u8>>) -> Result<Vec<Vec<u8>>, DownstreamError> {
        Ok(items)
    }
}

#[test]
fn config_loads_recognized_toml_options() {
    let toml_source = r#"
        [modelservice.ollama]
        host = "ollama.local"
        port = 12345
        url = "http://ollama.local:12345"

        [modelservice.tts]
        engine = "xtts"

        [memory.semantic.collections]
        user_facts = "facts"
        conversation_segments = "segments"

        [queue]
        rate_limit_per_second = 25.0
        batch_size = 20

        [handshake]
        max_clock_skew_seconds = 30
    "#;

    let config = Config::from_toml_str(toml_source).unwrap();
    assert_eq!(config.modelservice.ollama.port, 12345);
    assert_eq!(config.memory.semantic.collections.user_facts, "facts");
    assert_eq!(config.queue.rate_limit_per_second, 25.0);
    assert_eq!(config.handshake.max_clock_skew_seconds, 30);
}

#[tokio::test]
async fn runtime_assembles_queue_and_memory_from_config() {
    let store = Arc::new(VectorStore::open_temporary().unwrap());
    let runtime = Runtime::bootstrap_with_downstream(Config::default(), store, Arc::new(EchoDownstream)).unwrap();
    runtime.start(1);

    let ingested = runtime
        .memory
        .ingest(
            &[aico_memory::Turn {
                speaker: "user".into(),
                text: "I like quiet mornings with coffee.".into(),
                timestamp_ms: 0,
            }],
            "conv-rt-1",
            "u1",
        )
        .await
        .unwrap();
    assert!(ingested.segments_stored >= 1);

    runtime.shutdown(Duration::from_millis(200)).await;
}

#[test]
fn queue_errors_classify_into_flow_control_kinds() {
    assert_eq!(aico_queue::QueueError::RateLimited.kind(), CoreErrorKind::RateLimited);
    assert_eq!(aico_queue::QueueError::CircuitOpen.kind(), CoreErrorKind::CircuitOpen);
}
