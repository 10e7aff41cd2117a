// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Capability traits the Mnemo agents are wired with.
//!
//! The research agent receives its collaborators as an explicit record of
//! these capabilities; all traits use `#[async_trait]` for dynamic dispatch.

pub mod embedding;
pub mod provider;
pub mod retriever;

pub use embedding::EmbeddingProvider;
pub use provider::LlmProvider;
pub use retriever::Retriever;
