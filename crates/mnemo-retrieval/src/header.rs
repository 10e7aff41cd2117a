// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Substring matching over the header keywords of abstracts.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use mnemo_core::types::{RetrievalQuery, RetrievalResult};
use mnemo_core::{MnemoError, Retriever};
use mnemo_store::MemoryStore;

/// Public name of the header-index retriever.
pub const HEADER_RETRIEVER_NAME: &str = "page_index";

/// Score assigned to every header match. The match is deterministic, not a
/// similarity.
const HEADER_MATCH_SCORE: f32 = 1.0;

/// Retriever scanning abstract headers for any header containing the query
/// text as a case-insensitive substring. The first matching header is
/// attached to each result.
pub struct HeaderIndexRetriever {
    store: Arc<MemoryStore>,
}

impl HeaderIndexRetriever {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Retriever for HeaderIndexRetriever {
    fn name(&self) -> &'static str {
        HEADER_RETRIEVER_NAME
    }

    async fn retrieve(
        &self,
        query: &RetrievalQuery,
    ) -> Result<Vec<RetrievalResult>, MnemoError> {
        let needle = query.query_text.trim();
        if needle.is_empty() || HEADER_MATCH_SCORE < query.min_score {
            return Ok(vec![]);
        }

        // Over-fetch so first-header-per-page dedup can still fill the cap.
        let fetch = query.max_results.saturating_mul(4).max(query.max_results);
        let hits = self
            .store
            .header_matches(&query.owner_id, needle, &query.exclude_page_ids, fetch)
            .await?;

        let mut seen: HashSet<String> = HashSet::new();
        let mut results = Vec::new();
        for (page_id, header) in hits {
            if !seen.insert(page_id.clone()) {
                continue;
            }
            results.push(RetrievalResult {
                page_id,
                score: HEADER_MATCH_SCORE,
                retriever: HEADER_RETRIEVER_NAME.to_string(),
                matched_header: Some(header),
                matched_snippet: None,
            });
            if results.len() >= query.max_results {
                break;
            }
        }
        Ok(results)
    }
}
