// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The hybrid retrieval substrate of the Mnemo memory system.
//!
//! Three retrievers implement the common [`mnemo_core::Retriever`] contract:
//!
//! - [`KeywordRetriever`]: lexical ranking with backend auto-detection
//! - [`VectorRetriever`]: cosine similarity over page embeddings
//! - [`HeaderIndexRetriever`]: substring match over abstract headers

pub mod header;
pub mod keyword;
pub mod vector;

use std::sync::Arc;

use mnemo_core::Retriever;
use mnemo_store::MemoryStore;

pub use header::{HeaderIndexRetriever, HEADER_RETRIEVER_NAME};
pub use keyword::{KeywordRetriever, KEYWORD_RETRIEVER_NAME};
pub use vector::{VectorRetriever, VECTOR_RETRIEVER_NAME};

/// The full set of retrievers the research agent fans out to.
#[derive(Clone)]
pub struct RetrieverSet {
    pub keyword: Arc<dyn Retriever>,
    pub vector: Arc<dyn Retriever>,
    pub header: Arc<dyn Retriever>,
}

impl RetrieverSet {
    /// Build the standard retriever set over one store.
    pub fn over_store(store: Arc<MemoryStore>) -> Self {
        Self {
            keyword: Arc::new(KeywordRetriever::new(store.clone())),
            vector: Arc::new(VectorRetriever::new(store.clone())),
            header: Arc::new(HeaderIndexRetriever::new(store)),
        }
    }
}
