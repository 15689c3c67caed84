// Copyright 2026 - developers of the AICO project.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.
//! The typed mirror of `spec.md` §6 "Configuration (recognized options)".
//! Loading is limited to a single `toml::from_str` call — the
//! file-watching / hierarchical-merge loader a full AICO gateway has is
//! an explicit non-goal (`SPEC_FULL.md` §1.1); everything below is just
//! the shape the core reads once it has a `Config` in hand.
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OllamaConfig {
    pub host: String,
    pub port: u16,
    pub url: String,
    pub auto_install: bool,
    pub auto_start: bool,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 11434,
            url: "http://127.0.0.1:11434".into(),
            auto_install: false,
            auto_start: true,
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TtsEngine {
    Xtts,
    Piper,
    Kokoro,
}

impl Default for TtsEngine {
    fn default() -> Self {
        Self::Piper
    }
}

/// Not consumed by any core component (`spec.md` §6: "consumed by TTS,
/// not by the core"); retained on the struct so a full AICO deployment's
/// TTS layer has somewhere to read it from.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TtsConfig {
    pub engine: TtsEngine,
    pub voices: BTreeMap<String, String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ModelserviceConfig {
    pub ollama: OllamaConfig,
    pub tts: TtsConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CollectionsConfig {
    pub user_facts: String,
    pub conversation_segments: String,
}

impl Default for CollectionsConfig {
    fn default() -> Self {
        Self {
            user_facts: aico_memory::COLLECTION_USER_FACTS.to_string(),
            conversation_segments: aico_memory::COLLECTION_CONVERSATION_SEGMENTS.to_string(),
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SemanticConfig {
    pub collections: CollectionsConfig,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MemoryConfig {
    pub semantic: SemanticConfig,
}

/// Mirrors `spec.md` §6 "queue tuning". Kept as plain numbers (not
/// `std::time::Duration`) so it round-trips through TOML directly; see
/// [`QueueTuningConfig::to_queue_config`] for the conversion into
/// `aico_queue::QueueConfig`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct QueueTuningConfig {
    pub max_concurrent: usize,
    pub rate_limit_per_second: f64,
    pub circuit_failure_threshold: u32,
    pub circuit_timeout_seconds: f64,
    pub batch_size: usize,
    pub batch_timeout_seconds: f64,
    pub max_retries: u32,
    pub default_timeout_seconds: f64,
}

impl Default for QueueTuningConfig {
    fn default() -> Self {
        let defaults = aico_queue::QueueConfig::default();
        Self {
            max_concurrent: defaults.max_concurrent,
            rate_limit_per_second: defaults.rate_limit_per_second,
            circuit_failure_threshold: defaults.circuit_failure_threshold,
            circuit_timeout_seconds: defaults.circuit_timeout.as_secs_f64(),
            batch_size: defaults.batch_size,
            batch_timeout_seconds: defaults.batch_timeout.as_secs_f64(),
            max_retries: defaults.max_retries,
            default_timeout_seconds: defaults.default_timeout.as_secs_f64(),
        }
    }
}

impl QueueTuningConfig {
    pub fn to_queue_config(&self) -> aico_queue::QueueConfig {
        aico_queue::QueueConfig {
            rate_limit_per_second: self.rate_limit_per_second,
            batch_size: self.batch_size,
            batch_timeout: Duration::from_secs_f64(self.batch_timeout_seconds),
            circuit_failure_threshold: self.circuit_failure_threshold,
            circuit_timeout: Duration::from_secs_f64(self.circuit_timeout_seconds),
            max_retries: self.max_retries,
            max_concurrent: self.max_concurrent,
            default_timeout: Duration::from_secs_f64(self.default_timeout_seconds),
            ..aico_queue::QueueConfig::default()
        }
    }
}

/// Mirrors `spec.md` §6 "handshake" options.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HandshakeConfig {
    pub max_clock_skew_seconds: i64,
    pub session_idle_timeout_seconds: i64,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            max_clock_skew_seconds: 60,
            session_idle_timeout_seconds: 3600,
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub modelservice: ModelserviceConfig,
    pub memory: MemoryConfig,
    pub queue: QueueTuningConfig,
    pub handshake: HandshakeConfig,
}

impl Config {
    pub fn from_toml_str(source: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(source)
    }

    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_round_trip_through_toml() {
        let config = Config::default();
        let encoded = config.to_toml_string().unwrap();
        let decoded = Config::from_toml_str(&encoded).unwrap();
        assert_eq!(config, decoded);
    }

    #[test]
    fn partial_toml_falls_back_to_defaults() {
        let decoded = Config::from_toml_str(
            r#"
            [modelservice.ollama]
            port = 9999
            "#,
        )
        .unwrap();
        assert_eq!(decoded.modelservice.ollama.port, 9999);
        assert_eq!(decoded.modelservice.ollama.host, "127.0.0.1");
        assert_eq!(decoded.handshake.max_clock_skew_seconds, 60);
    }

    #[test]
    fn queue_tuning_converts_to_queue_config() {
        let tuning = QueueTuningConfig {
            rate_limit_per_second: 7.0,
            batch_size: 12,
            ..QueueTuningConfig::default()
        };
        let queue_config = tuning.to_queue_config();
        assert_eq!(queue_config.rate_limit_per_second, 7.0);
        assert_eq!(queue_config.batch_size, 12);
    }
}
