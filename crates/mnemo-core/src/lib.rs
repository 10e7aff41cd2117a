// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core types, errors, and capability traits for the Mnemo memory system.
//!
//! Mnemo provides just-in-time long-term memory for conversational agents:
//! turns are indexed verbatim at ingest, and a bounded research loop
//! assembles a relevance-ordered [`types::MemoryContext`] at recall time.

pub mod error;
pub mod traits;
pub mod types;

pub use error::MnemoError;
pub use traits::{EmbeddingProvider, LlmProvider, Retriever};
