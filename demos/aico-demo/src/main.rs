// Copyright 2026 - developers of the AICO project.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.
//! Exercises `spec.md` §8 scenario 1 ("handshake + echo") and scenario 4
//! ("ingest -> recall") against the in-process client/server and memory
//! pipeline, without a live broker or model runtime process.
use aico_channel::{accept_handshake, decrypt, encrypt, finish_handshake, initiate_handshake, Direction, ReplayGuard};
use aico_envelope::generate_identity;
use aico_memory::{Turn, VectorStore};
use aico_queue::{Downstream, DownstreamError};
use aico_runtime::Config;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime;

type Result<T> = std::result::Result<T, Box<dyn std::error::Error>>;

#[derive(Serialize, Deserialize, Debug)]
struct Ping {
    n: u32,
}

#[derive(Serialize, Deserialize, Debug)]
struct Pong {
    n: u32,
    pong: bool,
}

/// Scenario 1: client generates identity, handshakes with the server,
/// then sends an encrypted `ping` and checks the decrypted `pong`.
fn handshake_and_echo() -> Result<()> {
    let mut client_identity = generate_identity();
    let mut server_identity = generate_identity();
    let mut replay_guard = ReplayGuard::default();

    let request = initiate_handshake(&mut client_identity, "aico-demo-cli");
    let (response, mut server_session) = accept_handshake(&mut server_identity, &request, &mut replay_guard, 60, 3600)
        .map_err(|err| format!("handshake rejected: {err}"))?;
    log::info!("server: session_established (id={})", server_session.id);

    let mut client_session = finish_handshake(&mut client_identity, &request, &response, server_session.id, 3600)
        .map_err(|err| format!("client failed to finish handshake: {err}"))?;

    let payload = encrypt(&mut client_session, Direction::ClientToServer, &Ping { n: 1 })?;
    let ping: Ping = decrypt(&mut server_session, Direction::ClientToServer, &payload)?;
    log::info!("server received ping: {{\"n\":{}}}", ping.n);

    let reply = Pong {
        n: ping.n,
        pong: true,
    };
    let reply_payload = encrypt(&mut server_session, Direction::ServerToClient, &reply)?;
    let decrypted: Pong = decrypt(&mut client_session, Direction::ServerToClient, &reply_payload)?;

    assert_eq!(decrypted.n, 1);
    assert!(decrypted.pong);
    println!("handshake + echo: client observed {{\"n\":{}, \"pong\":{}}}", decrypted.n, decrypted.pong);
    Ok(())
}

/// A deterministic bag-of-words embedding/NER stand-in for the external
/// model runtime, so the demo runs without a live `ollama` process. The
/// real path (`aico_queue::OllamaDownstream`) is what `Runtime::bootstrap`
/// wires up against a live deployment.
struct DemoDownstream;

const EMBED_DIM: usize = 64;

fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_string())
        .collect()
}

fn bag_of_words_embedding(text: &str) -> Vec<u8> {
    let mut buckets = vec![0f32; EMBED_DIM];
    for word in tokenize(text) {
        let mut hash: u64 = 5381;
        for byte in word.bytes() {
            hash = hash.wrapping_mul(33).wrapping_add(byte as u64);
        }
        buckets[(hash as usize) % EMBED_DIM] += 1.0;
    }
    buckets.iter().flat_map(|v| v.to_le_bytes()).collect()
}

#[async_trait]
impl Downstream for DemoDownstream {
    async fn call(&self, operation: &str, items: Vec<Vec<u8>>) -> std::result::Result<Vec<Vec<u8>>, DownstreamError> {
        match operation {
            "embedding" => Ok(items
                .into_iter()
                .map(|item| bag_of_words_embedding(&String::from_utf8_lossy(&item)))
                .collect()),
            "ner" => Ok(items
                .into_iter()
                .map(|item| {
                    let text = String::from_utf8_lossy(&item).to_string();
                    let body = if text.to_lowercase().contains("whiskers") {
                        r#"[{"text":"Whiskers","label":"ANIMAL"}]"#
                    } else {
                        "[]"
                    };
                    body.as_bytes().to_vec()
                })
                .collect()),
            other => Err(DownstreamError::Fatal(format!("unsupported operation {other}"))),
        }
    }
}

/// Scenario 4: ingest a short conversation, then recall a question about it.
async fn ingest_and_recall() -> Result<()> {
    let store = Arc::new(VectorStore::open_temporary()?);
    let runtime = aico_runtime::Runtime::bootstrap_with_downstream(Config::default(), store, Arc::new(DemoDownstream))
        .map_err(|err| format!("runtime bootstrap failed: {err}"))?;
    runtime.start(3);

    let turns = vec![
        Turn {
            speaker: "user".into(),
            text: "My cat is named Whiskers.".into(),
            timestamp_ms: 0,
        },
        Turn {
            speaker: "user".into(),
            text: "He is 3 years old.".into(),
            timestamp_ms: 1000,
        },
    ];
    let outcome = runtime.memory.ingest(&turns, "demo-conversation", "demo-user").await?;
    log::info!(
        "ingested {} segments, {} facts",
        outcome.segments_stored,
        outcome.facts_stored
    );

    let results = runtime
        .memory
        .recall("What is my cat's name?", "demo-user", None, 5)
        .await?;
    for record in &results {
        println!(
            "recall: similarity={:.3} content={:?}",
            record.similarity, record.content
        );
    }

    runtime.shutdown(Duration::from_secs(1)).await;
    Ok(())
}

async fn async_main() -> Result<()> {
    simple_logger::SimpleLogger::new()
        .with_level(log::LevelFilter::Info)
        .init()
        .unwrap();

    println!("=== scenario 1: handshake + echo ===");
    handshake_and_echo()?;

    println!("=== scenario 4: ingest -> recall ===");
    ingest_and_recall().await?;

    Ok(())
}

fn main() -> Result<()> {
    runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(async_main())
}
