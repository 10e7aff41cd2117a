// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The memory agent: converts one conversation turn into a durable
//! (page, abstract) pair. Runs off the user-critical path.
//!
//! The page preserves the turn verbatim under a fixed, deterministic
//! formatting; the abstract is derived by a low-temperature LLM call and is
//! written even when the response cannot be parsed (empty summary and
//! headers), so a bad completion never loses the turn.

use std::sync::Arc;

use chrono::Utc;
use mnemo_config::model::IngestConfig;
use mnemo_core::types::{
    ChatMessage, CompletionRequest, ConversationTurn, Page, PageAbstract,
};
use mnemo_core::{EmbeddingProvider, LlmProvider, MnemoError};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::grammar::parse_abstract;
use crate::prompts::{build_abstract_prompt, ABSTRACT_SYSTEM_PROMPT};

/// Creates pages and abstracts from conversation turns.
pub struct MemoryAgent {
    llm: Arc<dyn LlmProvider>,
    embedder: Arc<dyn EmbeddingProvider>,
    config: IngestConfig,
}

impl MemoryAgent {
    pub fn new(
        llm: Arc<dyn LlmProvider>,
        embedder: Arc<dyn EmbeddingProvider>,
        config: IngestConfig,
    ) -> Self {
        Self {
            llm,
            embedder,
            config,
        }
    }

    /// Format a turn into a page: deterministic content, estimated token
    /// count, and a content embedding. A fresh id is generated per call.
    pub async fn create_page(&self, turn: &ConversationTurn) -> Result<Page, MnemoError> {
        let content = format_page_content(turn);
        let token_count = estimate_tokens(&content);
        let embedding = self.embedder.embed(&content).await?;

        Ok(Page {
            id: Uuid::new_v4().to_string(),
            owner_id: turn.owner_id.clone(),
            content,
            token_count,
            embedding: Some(embedding),
            metadata: turn.metadata.clone(),
            created_at: Utc::now(),
        })
    }

    /// Ask the LLM for a summary and headers of the turn.
    ///
    /// Parse failures are absorbed: the abstract is emitted with an empty
    /// summary and headers so the paired page write still proceeds. The id
    /// is fresh; the service facade rewrites it to the page's id before the
    /// atomic write.
    pub async fn create_abstract(
        &self,
        turn: &ConversationTurn,
    ) -> Result<PageAbstract, MnemoError> {
        let content = format_page_content(turn);
        let request = CompletionRequest {
            messages: vec![
                ChatMessage::system(ABSTRACT_SYSTEM_PROMPT),
                ChatMessage::user(build_abstract_prompt(&content)),
            ],
            temperature: self.config.abstract_temperature,
            max_tokens: Some(self.config.abstract_max_tokens),
            model: self.config.abstract_model.clone(),
        };

        let response = self.llm.complete(request).await?;
        let parsed = parse_abstract(&response.content);
        if parsed.summary.is_empty() {
            warn!(
                owner_id = %turn.owner_id,
                "abstract response did not parse; writing empty abstract"
            );
        } else {
            debug!(
                owner_id = %turn.owner_id,
                headers = parsed.headers.len(),
                "abstract generated"
            );
        }

        let summary_embedding = if parsed.summary.is_empty() {
            None
        } else {
            Some(self.embedder.embed(&parsed.summary).await?)
        };

        Ok(PageAbstract {
            page_id: Uuid::new_v4().to_string(),
            owner_id: turn.owner_id.clone(),
            summary: parsed.summary,
            headers: parsed.headers,
            summary_embedding,
            created_at: Utc::now(),
        })
    }
}

/// Estimate token count as `len / 4` (English-text approximation).
pub fn estimate_tokens(content: &str) -> i64 {
    (content.len() / 4) as i64
}

/// Render a turn as page content.
///
/// The layout is fixed: a timestamped header line, labelled user and
/// assistant blocks, then a tool-calls block when any were recorded. The
/// same turn always yields byte-identical content.
pub fn format_page_content(turn: &ConversationTurn) -> String {
    let mut content = String::new();
    let stamp = turn.timestamp.format("%Y-%m-%d %H:%M:%S UTC");
    match turn.turn_number {
        Some(n) => content.push_str(&format!("[{stamp}] Conversation turn {n}\n")),
        None => content.push_str(&format!("[{stamp}] Conversation turn\n")),
    }
    content.push_str(&format!("User:\n{}\n", turn.user_message));
    content.push_str(&format!("\nAssistant:\n{}\n", turn.assistant_message));
    if !turn.tool_calls.is_empty() {
        content.push_str("\nTool calls:\n");
        for call in &turn.tool_calls {
            content.push_str(&format!(
                "- {}({}) -> {}\n",
                call.tool, call.arguments, call.result
            ));
        }
    }
    content
}
