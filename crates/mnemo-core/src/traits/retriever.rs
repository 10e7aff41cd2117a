// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Retriever trait: the uniform contract of the hybrid retrieval substrate.

use async_trait::async_trait;

use crate::error::MnemoError;
use crate::types::{RetrievalQuery, RetrievalResult};

/// Maps an owner-scoped query to ranked page-id results.
///
/// Implementations must honor the query's exclusion set, result cap, and
/// minimum score floor, and normalize scores so that higher is better.
#[async_trait]
pub trait Retriever: Send + Sync {
    /// The public name of this retriever (e.g. `keyword_bm25`).
    fn name(&self) -> &'static str;

    /// Runs the retrieval and returns results sorted by score, descending.
    async fn retrieve(
        &self,
        query: &RetrievalQuery,
    ) -> Result<Vec<RetrievalResult>, MnemoError>;
}
