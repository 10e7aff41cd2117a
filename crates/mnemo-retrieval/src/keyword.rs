// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Lexical ranking over page content with backend auto-detection.
//!
//! On first use the retriever probes the store for available scoring
//! implementations in priority order and caches the choice for the life of
//! the retriever instance: FTS5 `bm25()`, FTS4 `matchinfo` tf-idf, BM25 over
//! the pre-tokenized `content_tokens` column, and finally a native LIKE
//! tf-idf variant that is always available. Scores are normalized so that
//! higher is better and comparable across backends within a single request.
//!
//! A runtime error from the chosen backend's query is caught and yields the
//! empty list, so the research loop can still make progress through the
//! other retrievers. One bad query does not trigger re-detection.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use mnemo_core::types::{RetrievalQuery, RetrievalResult};
use mnemo_core::{MnemoError, Retriever};
use mnemo_store::{tokenize, MemoryStore};
use tokio::sync::OnceCell;
use tracing::{debug, warn};

/// Public name of the keyword retriever.
pub const KEYWORD_RETRIEVER_NAME: &str = "keyword_bm25";

/// BM25 term saturation parameter.
const BM25_K1: f32 = 1.2;
/// BM25 length normalization parameter.
const BM25_B: f32 = 0.75;

/// The scoring implementations, in probe priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeywordBackend {
    /// FTS5 `bm25()`. Raw scores are negative (lower = better) and are
    /// negated to match the "higher is better" convention.
    Fts5Bm25,
    /// FTS4 `matchinfo('pcnx')` scored as tf-idf, non-negative, descending.
    Fts4Tfidf,
    /// BM25 over the pre-tokenized `content_tokens` column.
    TokenBm25,
    /// Native LIKE-based term-frequency ranking (a tf-idf variant, not true
    /// BM25), descending.
    NativeLike,
}

impl KeywordBackend {
    /// Per-result name suffix, so callers can audit which backend matched.
    fn tag(&self) -> &'static str {
        match self {
            KeywordBackend::Fts5Bm25 => "_fts5_bm25",
            KeywordBackend::Fts4Tfidf => "_fts4_tfidf",
            KeywordBackend::TokenBm25 => "_token_bm25",
            KeywordBackend::NativeLike => "_native_like",
        }
    }

    fn result_name(&self) -> String {
        format!("{KEYWORD_RETRIEVER_NAME}{}", self.tag())
    }
}

/// Lexical retriever over page content, owner-scoped.
pub struct KeywordRetriever {
    store: Arc<MemoryStore>,
    /// Sticky backend choice, probed on first use.
    backend: OnceCell<KeywordBackend>,
}

impl KeywordRetriever {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self {
            store,
            backend: OnceCell::new(),
        }
    }

    /// Probe for the best available backend, caching the result.
    async fn backend(&self) -> Result<KeywordBackend, MnemoError> {
        self.backend
            .get_or_try_init(|| async {
                let backend = if self.store.table_exists("pages_fts").await? {
                    KeywordBackend::Fts5Bm25
                } else if self.store.table_exists("pages_fts4").await? {
                    KeywordBackend::Fts4Tfidf
                } else if self.store.column_exists("pages", "content_tokens").await? {
                    KeywordBackend::TokenBm25
                } else {
                    KeywordBackend::NativeLike
                };
                debug!(backend = ?backend, "keyword backend detected");
                Ok(backend)
            })
            .await
            .copied()
    }

    async fn run_backend(
        &self,
        backend: KeywordBackend,
        query: &RetrievalQuery,
        tokens: &[String],
    ) -> Result<Vec<RetrievalResult>, MnemoError> {
        let name = backend.result_name();
        let scored = match backend {
            KeywordBackend::Fts5Bm25 => {
                let expr = fts_match_expr(tokens);
                let hits = self
                    .store
                    .search_fts5(
                        &query.owner_id,
                        &expr,
                        &query.exclude_page_ids,
                        query.max_results,
                    )
                    .await?;
                hits.into_iter()
                    // Raw bm25() is negative; negate so higher is better.
                    .map(|h| (h.page_id, -h.raw_score as f32, h.snippet))
                    .collect()
            }
            KeywordBackend::Fts4Tfidf => {
                let expr = fts_match_expr(tokens);
                let rows = self
                    .store
                    .search_fts4(
                        &query.owner_id,
                        &expr,
                        &query.exclude_page_ids,
                        query.max_results,
                    )
                    .await?;
                let mut scored: Vec<(String, f32, Option<String>)> = rows
                    .into_iter()
                    .map(|(id, matchinfo)| (id, fts4_tfidf_score(&matchinfo), None))
                    .collect();
                sort_descending(&mut scored);
                scored
            }
            KeywordBackend::TokenBm25 => {
                let docs = self
                    .store
                    .token_candidates(&query.owner_id, &query.exclude_page_ids)
                    .await?;
                let mut scored = token_bm25_scores(tokens, &docs);
                sort_descending(&mut scored);
                scored.truncate(query.max_results);
                scored
            }
            KeywordBackend::NativeLike => {
                let docs = self
                    .store
                    .like_candidates(&query.owner_id, tokens, &query.exclude_page_ids)
                    .await?;
                let mut scored = like_tfidf_scores(tokens, &docs);
                sort_descending(&mut scored);
                scored.truncate(query.max_results);
                scored
            }
        };

        Ok(scored
            .into_iter()
            .filter(|(_, score, _)| *score >= query.min_score)
            .map(|(page_id, score, snippet)| RetrievalResult {
                page_id,
                score,
                retriever: name.clone(),
                matched_header: None,
                matched_snippet: snippet,
            })
            .collect())
    }
}

#[async_trait]
impl Retriever for KeywordRetriever {
    fn name(&self) -> &'static str {
        KEYWORD_RETRIEVER_NAME
    }

    async fn retrieve(
        &self,
        query: &RetrievalQuery,
    ) -> Result<Vec<RetrievalResult>, MnemoError> {
        let tokens = tokenize(&query.query_text);
        if tokens.is_empty() {
            return Ok(vec![]);
        }

        let backend = match self.backend().await {
            Ok(b) => b,
            Err(e) => {
                warn!(error = %e, "keyword backend detection failed, returning no results");
                return Ok(vec![]);
            }
        };

        match self.run_backend(backend, query, &tokens).await {
            Ok(results) => Ok(results),
            Err(e) => {
                // Degraded backend: absorb and let the other retrievers carry
                // the iteration. The cached choice stays.
                warn!(backend = ?backend, error = %e, "keyword backend query failed, returning no results");
                Ok(vec![])
            }
        }
    }
}

/// Build an FTS MATCH expression from sanitized tokens (OR-joined, quoted so
/// user text cannot inject FTS syntax).
fn fts_match_expr(tokens: &[String]) -> String {
    tokens
        .iter()
        .map(|t| format!("\"{t}\""))
        .collect::<Vec<_>>()
        .join(" OR ")
}

fn sort_descending(scored: &mut [(String, f32, Option<String>)]) {
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
}

/// Score an FTS4 `matchinfo('pcnx')` blob as tf-idf.
///
/// Layout (32-bit LE integers): phrase count `p`, column count `c`, total
/// row count `n`, then for each (phrase, column) a triple of
/// (hits this row, hits all rows, rows with hits).
fn fts4_tfidf_score(matchinfo: &[u8]) -> f32 {
    let ints: Vec<u32> = matchinfo
        .chunks_exact(4)
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect();
    if ints.len() < 3 {
        return 0.0;
    }
    let phrases = ints[0] as usize;
    let columns = ints[1] as usize;
    let total_rows = ints[2] as f32;
    let mut score = 0.0;
    for phrase in 0..phrases {
        for column in 0..columns {
            let base = 3 + 3 * (phrase * columns + column);
            if base + 2 >= ints.len() {
                return score;
            }
            let tf = ints[base] as f32;
            let rows_with_hits = ints[base + 2] as f32;
            if tf > 0.0 && rows_with_hits > 0.0 {
                score += tf * (1.0 + total_rows / rows_with_hits).ln();
            }
        }
    }
    score
}

/// BM25 over pre-tokenized documents: `docs` is (page_id, space-joined
/// tokens) as stored in the `content_tokens` column.
fn token_bm25_scores(
    query_tokens: &[String],
    docs: &[(String, String)],
) -> Vec<(String, f32, Option<String>)> {
    if docs.is_empty() {
        return vec![];
    }
    let tokenized: Vec<(&str, Vec<&str>)> = docs
        .iter()
        .map(|(id, toks)| (id.as_str(), toks.split(' ').filter(|t| !t.is_empty()).collect()))
        .collect();
    let total_docs = tokenized.len() as f32;
    let avg_len: f32 =
        tokenized.iter().map(|(_, t)| t.len() as f32).sum::<f32>() / total_docs;

    // Document frequency per query token.
    let mut df: HashMap<&str, f32> = HashMap::new();
    for token in query_tokens {
        let count = tokenized
            .iter()
            .filter(|(_, toks)| toks.iter().any(|t| *t == token.as_str()))
            .count();
        df.insert(token.as_str(), count as f32);
    }

    tokenized
        .iter()
        .filter_map(|(id, toks)| {
            let doc_len = toks.len() as f32;
            let mut score = 0.0;
            for token in query_tokens {
                let tf = toks.iter().filter(|&&t| t == token.as_str()).count() as f32;
                if tf == 0.0 {
                    continue;
                }
                let n = df[token.as_str()];
                let idf = (1.0 + (total_docs - n + 0.5) / (n + 0.5)).ln();
                let denom = tf + BM25_K1 * (1.0 - BM25_B + BM25_B * doc_len / avg_len.max(1.0));
                score += idf * tf * (BM25_K1 + 1.0) / denom;
            }
            if score > 0.0 {
                Some((id.to_string(), score, None))
            } else {
                None
            }
        })
        .collect()
}

/// Native fallback ranking: term-frequency times inverse document frequency
/// over the LIKE-prefiltered candidates. Not true BM25.
fn like_tfidf_scores(
    query_tokens: &[String],
    docs: &[(String, String)],
) -> Vec<(String, f32, Option<String>)> {
    if docs.is_empty() {
        return vec![];
    }
    let lowered: Vec<(&str, String)> = docs
        .iter()
        .map(|(id, content)| (id.as_str(), content.to_lowercase()))
        .collect();
    let total_docs = lowered.len() as f32;

    let mut df: HashMap<&str, f32> = HashMap::new();
    for token in query_tokens {
        let count = lowered
            .iter()
            .filter(|(_, content)| content.contains(token.as_str()))
            .count();
        df.insert(token.as_str(), count as f32);
    }

    lowered
        .iter()
        .filter_map(|(id, content)| {
            let mut score = 0.0;
            for token in query_tokens {
                let tf = content.matches(token.as_str()).count() as f32;
                if tf == 0.0 {
                    continue;
                }
                let n = df[token.as_str()];
                score += tf * (1.0 + total_docs / n).ln();
            }
            if score > 0.0 {
                Some((id.to_string(), score, None))
            } else {
                None
            }
        })
        .collect()
}
