// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Request types for the service facade.

use chrono::{DateTime, Utc};
use mnemo_core::types::ResearchOptions;

/// A recall request: assemble a memory context for a query.
#[derive(Debug, Clone)]
pub struct ResearchRequest {
    /// Owner scope of the search.
    pub owner_id: String,
    /// What to recall.
    pub query_text: String,
    /// Per-request option overrides. `None` uses the configured defaults.
    pub options: Option<ResearchOptions>,
}

/// A deletion request. Exactly one of the three selectors is honored, in
/// this precedence order: `all`, then `page_ids`, then `before`.
#[derive(Debug, Clone, Default)]
pub struct ForgetRequest {
    /// Owner whose memories are being deleted.
    pub owner_id: String,
    /// Delete everything the owner has stored.
    pub all: bool,
    /// Delete these pages. Each delete is independent; a failure may leave
    /// earlier deletions applied.
    pub page_ids: Vec<String>,
    /// Delete pages created strictly before this cutoff.
    pub before: Option<DateTime<Utc>>,
}
