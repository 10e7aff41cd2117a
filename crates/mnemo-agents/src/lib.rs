// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The two agents of the Mnemo memory system.
//!
//! - [`MemoryAgent`] (ingest): formats a conversation turn into a page,
//!   derives an abstract via the LLM, and embeds both.
//! - [`ResearchAgent`] (recall): the bounded plan/search/integrate/reflect
//!   loop that assembles a `MemoryContext` over the retrieval substrate.

pub mod grammar;
pub mod ingest;
pub mod prompts;
pub mod research;

pub use grammar::{ParsedAbstract, ResearchPlan, DEFAULT_SEARCH_QUERY};
pub use ingest::{estimate_tokens, format_page_content, MemoryAgent};
pub use research::{ResearchAgent, ResearchCapabilities};
