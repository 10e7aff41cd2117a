// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Cosine-similarity nearest-neighbour retrieval over page embeddings.

use std::sync::Arc;

use async_trait::async_trait;
use mnemo_core::types::{cosine_similarity, RetrievalQuery, RetrievalResult};
use mnemo_core::{MnemoError, Retriever};
use mnemo_store::MemoryStore;

/// Public name of the vector retriever.
pub const VECTOR_RETRIEVER_NAME: &str = "vector_semantic";

/// Semantic retriever scoring pages by `1 - cosine_distance` between the
/// query embedding and the stored page embedding.
///
/// Pages without an embedding, or with an embedding of a different
/// dimension, are ignored.
pub struct VectorRetriever {
    store: Arc<MemoryStore>,
}

impl VectorRetriever {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Retriever for VectorRetriever {
    fn name(&self) -> &'static str {
        VECTOR_RETRIEVER_NAME
    }

    async fn retrieve(
        &self,
        query: &RetrievalQuery,
    ) -> Result<Vec<RetrievalResult>, MnemoError> {
        let query_embedding = query.query_embedding.as_ref().ok_or_else(|| {
            MnemoError::InvalidArgument(
                "vector retrieval requires a query embedding".to_string(),
            )
        })?;

        let candidates = self
            .store
            .page_embeddings(&query.owner_id, &query.exclude_page_ids)
            .await?;

        let mut results: Vec<RetrievalResult> = candidates
            .into_iter()
            .filter(|(_, embedding)| embedding.len() == query_embedding.len())
            .filter_map(|(page_id, embedding)| {
                let score = cosine_similarity(query_embedding, &embedding);
                if score >= query.min_score {
                    Some(RetrievalResult {
                        page_id,
                        score,
                        retriever: VECTOR_RETRIEVER_NAME.to_string(),
                        matched_header: None,
                        matched_snippet: None,
                    })
                } else {
                    None
                }
            })
            .collect();

        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        results.truncate(query.max_results);
        Ok(results)
    }
}
