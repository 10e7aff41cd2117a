// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock LLM provider for deterministic testing.
//!
//! `MockLlm` implements `LlmProvider` with pre-configured responses, enabling
//! fast, CI-runnable tests without external API calls.

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream;
use futures_core::Stream;
use tokio::sync::Mutex;

use mnemo_core::types::{CompletionChunk, CompletionRequest, CompletionResponse};
use mnemo_core::{LlmProvider, MnemoError};

/// A mock LLM provider that returns pre-configured responses.
///
/// Responses are popped from a FIFO queue. When the queue is empty, a
/// default "mock response" text is returned. Every request is captured for
/// later inspection.
pub struct MockLlm {
    responses: Arc<Mutex<VecDeque<String>>>,
    requests: Arc<Mutex<Vec<CompletionRequest>>>,
}

impl MockLlm {
    /// Create a mock provider with an empty response queue.
    pub fn new() -> Self {
        Self {
            responses: Arc::new(Mutex::new(VecDeque::new())),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Create a mock provider pre-loaded with the given responses.
    pub fn with_responses(responses: Vec<&str>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(
                responses.into_iter().map(str::to_string).collect(),
            )),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Add a response to the end of the queue.
    pub async fn add_response(&self, text: impl Into<String>) {
        self.responses.lock().await.push_back(text.into());
    }

    /// All requests received so far, in order.
    pub async fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().await.clone()
    }

    async fn next_response(&self) -> String {
        self.responses
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| "mock response".to_string())
    }
}

impl Default for MockLlm {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmProvider for MockLlm {
    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionResponse, MnemoError> {
        let prompt_tokens: usize = request
            .messages
            .iter()
            .map(|m| m.content.len() / 4)
            .sum();
        self.requests.lock().await.push(request.clone());
        let content = self.next_response().await;
        Ok(CompletionResponse {
            completion_tokens: (content.len() / 4) as u32,
            content,
            prompt_tokens: prompt_tokens as u32,
            model: request.model.unwrap_or_else(|| "mock-model".to_string()),
        })
    }

    async fn stream(
        &self,
        request: CompletionRequest,
    ) -> Result<
        Pin<Box<dyn Stream<Item = Result<CompletionChunk, MnemoError>> + Send>>,
        MnemoError,
    > {
        self.requests.lock().await.push(request);
        let content = self.next_response().await;
        Ok(Box::pin(stream::iter(vec![Ok(CompletionChunk { content })])))
    }
}
