// Copyright 2026 - developers of the AICO project.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.
//! The external model runtime this queue protects. `Downstream` is the
//! seam between the queue's scheduling machinery and whatever actually
//! serves `embedding`/`ner`/`completions` calls, so tests can swap in a
//! fake without a live model runtime process.
use crate::errors::DownstreamError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::Duration;

/// A batch-capable downstream call: `items` are the raw request bodies for
/// one operation, and the returned vector has exactly one entry per item,
/// in the same order.
#[async_trait]
pub trait Downstream: Send + Sync {
    async fn call(&self, operation: &str, items: Vec<Vec<u8>>) -> Result<Vec<Vec<u8>>, DownstreamError>;

    /// Whether `operation` supports a deterministic fallback result when
    /// the real call is blocked or fails. Only `embedding` does by default.
    fn supports_fallback(&self, operation: &str) -> bool {
        operation == "embedding"
    }

    /// Produces the fallback result for a single item, used when the real
    /// call is blocked (circuit open, rate limited) or fails.
    fn fallback(&self, operation: &str, item: &[u8]) -> Option<Vec<u8>> {
        if operation == "embedding" {
            Some(hash_embedding(item))
        } else {
            None
        }
    }
}

/// A deterministic, content-addressed pseudo-embedding of fixed
/// dimensionality, used in degraded mode. Two calls on identical input
/// bytes always produce identical output.
pub const FALLBACK_EMBEDDING_DIM: usize = 32;

pub fn hash_embedding(content: &[u8]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(content);
    let digest = hasher.finalize();

    let mut embedding = Vec::with_capacity(FALLBACK_EMBEDDING_DIM);
    for i in 0..FALLBACK_EMBEDDING_DIM {
        let byte = digest[i % digest.len()];
        // Map into [-1.0, 1.0] so it behaves like a real unit-ish embedding.
        embedding.extend_from_slice(&(((byte as f32) / 127.5) - 1.0).to_le_bytes());
    }
    embedding
}

#[derive(Serialize)]
struct OllamaEmbeddingsRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct OllamaEmbeddingsResponse {
    embedding: Vec<f32>,
}

#[derive(Serialize)]
struct OllamaGenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Deserialize)]
struct OllamaGenerateResponse {
    response: String,
}

const NER_PROMPT_PREFIX: &str = "List the named entities in the following text as a JSON array \
of {\"text\":...,\"label\":...} objects and nothing else.\n\nText: ";

/// Hits the external model runtime's HTTP surface: `embedding` calls go
/// against `/api/embeddings` and carry a 5s timeout; `ner` rides the
/// general-purpose completion model through `/api/generate` with a
/// structured-extraction prompt, at the 120s completion timeout.
pub struct OllamaDownstream {
    client: reqwest::Client,
    base_url: String,
    embedding_model: String,
    completion_model: String,
}

impl OllamaDownstream {
    pub fn new(
        base_url: impl Into<String>,
        embedding_model: impl Into<String>,
        completion_model: impl Into<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            embedding_model: embedding_model.into(),
            completion_model: completion_model.into(),
        }
    }

    async fn embed_one(&self, text: &str) -> Result<Vec<u8>, DownstreamError> {
        let response = self
            .client
            .post(format!("{}/api/embeddings", self.base_url))
            .json(&OllamaEmbeddingsRequest {
                model: &self.embedding_model,
                prompt: text,
            })
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .map_err(|err| DownstreamError::Retriable(err.to_string()))?;

        if response.status().is_server_error() {
            return Err(DownstreamError::Retriable(format!(
                "embeddings endpoint returned {}",
                response.status()
            )));
        }
        if !response.status().is_success() {
            return Err(DownstreamError::Fatal(format!(
                "embeddings endpoint returned {}",
                response.status()
            )));
        }

        let body: OllamaEmbeddingsResponse = response
            .json()
            .await
            .map_err(|err| DownstreamError::Fatal(err.to_string()))?;

        let mut bytes = Vec::with_capacity(body.embedding.len() * 4);
        for value in body.embedding {
            bytes.extend_from_slice(&value.to_le_bytes());
        }
        Ok(bytes)
    }

    async fn ner_one(&self, text: &str) -> Result<Vec<u8>, DownstreamError> {
        let prompt = format!("{NER_PROMPT_PREFIX}{text}");
        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&OllamaGenerateRequest {
                model: &self.completion_model,
                prompt: &prompt,
                stream: false,
            })
            .timeout(Duration::from_secs(120))
            .send()
            .await
            .map_err(|err| DownstreamError::Retriable(err.to_string()))?;

        if response.status().is_server_error() {
            return Err(DownstreamError::Retriable(format!(
                "generate endpoint returned {}",
                response.status()
            )));
        }
        if !response.status().is_success() {
            return Err(DownstreamError::Fatal(format!(
                "generate endpoint returned {}",
                response.status()
            )));
        }

        let body: OllamaGenerateResponse = response
            .json()
            .await
            .map_err(|err| DownstreamError::Fatal(err.to_string()))?;
        Ok(body.response.into_bytes())
    }
}

#[async_trait]
impl Downstream for OllamaDownstream {
    async fn call(&self, operation: &str, items: Vec<Vec<u8>>) -> Result<Vec<Vec<u8>>, DownstreamError> {
        match operation {
            "embedding" => {
                let mut results = Vec::with_capacity(items.len());
                for item in items {
                    let text = String::from_utf8(item)
                        .map_err(|err| DownstreamError::Fatal(err.to_string()))?;
                    results.push(self.embed_one(&text).await?);
                }
                Ok(results)
            }
            "ner" => {
                let mut results = Vec::with_capacity(items.len());
                for item in items {
                    let text = String::from_utf8(item)
                        .map_err(|err| DownstreamError::Fatal(err.to_string()))?;
                    results.push(self.ner_one(&text).await?);
                }
                Ok(results)
            }
            other => Err(DownstreamError::Fatal(format!(
                "unsupported operation: {other}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_embedding_is_deterministic() {
        let a = hash_embedding(b"hello world");
        let b = hash_embedding(b"hello world");
        assert_eq!(a, b);
        assert_eq!(a.len(), FALLBACK_EMBEDDING_DIM * 4);
    }

    #[test]
    fn hash_embedding_varies_with_content() {
        assert_ne!(hash_embedding(b"hello"), hash_embedding(b"world"));
    }
}
