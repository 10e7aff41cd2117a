// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Mnemo memory system.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use mnemo_core::types::ResearchOptions;
use serde::{Deserialize, Serialize};

/// Top-level Mnemo configuration.
///
/// Loaded from TOML files following the XDG hierarchy, with environment
/// variable overrides. All sections are optional and default to sensible
/// values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MnemoConfig {
    /// Storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Embedding provider settings.
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Research loop defaults.
    #[serde(default)]
    pub research: ResearchConfig,

    /// Ingest (memory agent) settings.
    #[serde(default)]
    pub ingest: IngestConfig,
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
        }
    }
}

fn default_database_path() -> String {
    "mnemo.db".to_string()
}

fn default_wal_mode() -> bool {
    true
}

/// Embedding provider configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EmbeddingConfig {
    /// Dimension of stored embedding vectors. Must match the provider.
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            dimensions: default_dimensions(),
        }
    }
}

fn default_dimensions() -> usize {
    384
}

/// Research loop defaults, overridable per request.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ResearchConfig {
    /// Hard bound on loop iterations.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Per-retriever result cap per iteration.
    #[serde(default = "default_max_pages_per_iteration")]
    pub max_pages_per_iteration: usize,

    /// Token budget for the assembled context.
    #[serde(default = "default_max_context_tokens")]
    pub max_context_tokens: i64,

    /// Score floor passed to every retriever.
    #[serde(default = "default_min_relevance_score")]
    pub min_relevance_score: f32,
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            max_pages_per_iteration: default_max_pages_per_iteration(),
            max_context_tokens: default_max_context_tokens(),
            min_relevance_score: default_min_relevance_score(),
        }
    }
}

impl ResearchConfig {
    /// Convert into the per-request options struct used by the research agent.
    pub fn to_options(&self) -> ResearchOptions {
        ResearchOptions {
            max_iterations: self.max_iterations,
            max_pages_per_iteration: self.max_pages_per_iteration,
            max_context_tokens: self.max_context_tokens,
            min_relevance_score: self.min_relevance_score,
        }
    }
}

fn default_max_iterations() -> u32 {
    5
}

fn default_max_pages_per_iteration() -> usize {
    10
}

fn default_max_context_tokens() -> i64 {
    8000
}

fn default_min_relevance_score() -> f32 {
    0.3
}

/// Ingest (memory agent) configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct IngestConfig {
    /// Model used for abstract generation. `None` uses the provider default.
    #[serde(default)]
    pub abstract_model: Option<String>,

    /// Sampling temperature for abstract generation.
    #[serde(default = "default_abstract_temperature")]
    pub abstract_temperature: f32,

    /// Output token cap for abstract generation.
    #[serde(default = "default_abstract_max_tokens")]
    pub abstract_max_tokens: u32,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            abstract_model: None,
            abstract_temperature: default_abstract_temperature(),
            abstract_max_tokens: default_abstract_max_tokens(),
        }
    }
}

fn default_abstract_temperature() -> f32 {
    0.3
}

fn default_abstract_max_tokens() -> u32 {
    1000
}
