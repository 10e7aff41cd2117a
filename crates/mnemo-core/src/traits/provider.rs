// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! LLM provider trait for completion backends (Anthropic, OpenAI, etc.).

use std::pin::Pin;

use async_trait::async_trait;
use futures_core::Stream;

use crate::error::MnemoError;
use crate::types::{CompletionChunk, CompletionRequest, CompletionResponse};

/// A language-model completion backend.
///
/// Providers handle communication with language model APIs, supporting both
/// single-shot completion and streaming responses. All calls may fail with
/// provider-transport errors, which are surfaced unmodified.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Sends a completion request and returns the full response.
    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionResponse, MnemoError>;

    /// Sends a completion request and returns a stream of content chunks.
    async fn stream(
        &self,
        request: CompletionRequest,
    ) -> Result<
        Pin<Box<dyn Stream<Item = Result<CompletionChunk, MnemoError>> + Send>>,
        MnemoError,
    >;
}
