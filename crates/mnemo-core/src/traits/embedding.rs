// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Embedding provider trait for vector embedding generation.

use async_trait::async_trait;

use crate::error::MnemoError;

/// A vector embedding backend.
///
/// `dimensions` is constant per provider instance; callers must ensure the
/// store's vector columns were populated with the same dimension.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// The fixed dimension of vectors this provider produces.
    fn dimensions(&self) -> usize;

    /// Generates an embedding for a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, MnemoError>;

    /// Generates embeddings for a batch of texts, in input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, MnemoError>;
}
