// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The service facade: a thin composition of the ingest agent, the research
//! agent, and the store behind three verbs (memorize, research, forget)
//! plus owner statistics.

use std::pin::Pin;
use std::sync::Arc;

use futures_core::Stream;
use mnemo_agents::research::{ResearchAgent, ResearchCapabilities};
use mnemo_agents::MemoryAgent;
use mnemo_config::MnemoConfig;
use mnemo_core::types::{
    ConversationTurn, MemoryContext, OwnerStats, ResearchQuery, ResearchStep,
};
use mnemo_core::{EmbeddingProvider, LlmProvider, MnemoError};
use mnemo_retrieval::RetrieverSet;
use mnemo_store::MemoryStore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::requests::{ForgetRequest, ResearchRequest};

fn ensure_live(cancel: &CancellationToken) -> Result<(), MnemoError> {
    if cancel.is_cancelled() {
        Err(MnemoError::Cancelled)
    } else {
        Ok(())
    }
}

/// The only caller of the ingest and research agents.
pub struct MemoryService {
    agent: MemoryAgent,
    research: ResearchAgent,
    store: Arc<MemoryStore>,
    config: MnemoConfig,
}

impl MemoryService {
    /// Wire the service from its four capabilities and configuration.
    pub fn new(
        llm: Arc<dyn LlmProvider>,
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<MemoryStore>,
        config: MnemoConfig,
    ) -> Self {
        let retrievers = RetrieverSet::over_store(store.clone());
        let capabilities = ResearchCapabilities {
            llm: llm.clone(),
            embedder: embedder.clone(),
            store: store.clone(),
            retrievers,
        };
        Self {
            agent: MemoryAgent::new(llm, embedder, config.ingest.clone()),
            research: ResearchAgent::new(capabilities),
            store,
            config,
        }
    }

    /// Memorize one conversation turn: create the page, create the abstract,
    /// rewrite the abstract's page id to the page's (the page id is
    /// authoritative), then write both atomically. A failed memorize leaves
    /// no partial state.
    pub async fn memorize(
        &self,
        turn: &ConversationTurn,
        cancel: &CancellationToken,
    ) -> Result<(), MnemoError> {
        ensure_live(cancel)?;
        let page = self.agent.create_page(turn).await?;

        ensure_live(cancel)?;
        let mut abstract_record = self.agent.create_abstract(turn).await?;
        abstract_record.page_id = page.id.clone();

        ensure_live(cancel)?;
        self.store
            .store_page_with_abstract(&page, &abstract_record)
            .await?;

        info!(
            owner_id = %turn.owner_id,
            page_id = %page.id,
            token_count = page.token_count,
            "turn memorized"
        );
        Ok(())
    }

    /// Assemble a memory context for a query via the research loop.
    pub async fn research(
        &self,
        request: ResearchRequest,
        cancel: CancellationToken,
    ) -> Result<MemoryContext, MnemoError> {
        let options = request
            .options
            .unwrap_or_else(|| self.config.research.to_options());
        let query = ResearchQuery {
            owner_id: request.owner_id,
            query_text: request.query_text,
        };
        self.research.research(query, options, cancel).await
    }

    /// Streaming variant of [`Self::research`], emitting one step per loop
    /// phase.
    pub fn research_stream(
        &self,
        request: ResearchRequest,
        cancel: CancellationToken,
    ) -> Pin<Box<dyn Stream<Item = Result<ResearchStep, MnemoError>> + Send>> {
        let options = request
            .options
            .unwrap_or_else(|| self.config.research.to_options());
        let query = ResearchQuery {
            owner_id: request.owner_id,
            query_text: request.query_text,
        };
        self.research.research_stream(query, options, cancel)
    }

    /// Delete memories. Selector precedence: everything, then explicit page
    /// ids (independent deletes, no transaction), then a creation-time
    /// cutoff.
    pub async fn forget(
        &self,
        request: ForgetRequest,
        cancel: &CancellationToken,
    ) -> Result<(), MnemoError> {
        ensure_live(cancel)?;
        if request.all {
            self.store.delete_by_owner(&request.owner_id).await?;
            info!(owner_id = %request.owner_id, "forgot all memories");
            return Ok(());
        }
        if !request.page_ids.is_empty() {
            for page_id in &request.page_ids {
                ensure_live(cancel)?;
                self.store.delete_page(page_id).await?;
                debug!(owner_id = %request.owner_id, page_id = %page_id, "page forgotten");
            }
            return Ok(());
        }
        if let Some(before) = request.before {
            let deleted = self
                .store
                .delete_before(before, Some(&request.owner_id))
                .await?;
            info!(owner_id = %request.owner_id, deleted, "forgot memories before cutoff");
            return Ok(());
        }
        Err(MnemoError::InvalidArgument(
            "forget requires one of: all, page_ids, before".to_string(),
        ))
    }

    /// Aggregate statistics for one owner's stored pages.
    pub async fn stats(&self, owner_id: &str) -> Result<OwnerStats, MnemoError> {
        self.store.stats_by_owner(owner_id).await
    }
}
