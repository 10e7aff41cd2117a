// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistence for the Mnemo memory system.
//!
//! Provides the transactional [`MemoryStore`] over the (page, abstract)
//! entity pair, the schema migrations, and the owner-scoped queries the
//! keyword, vector, and header retrievers are built on.

pub mod database;
pub mod migrations;
pub mod store;

pub use store::{tokenize, KeywordHit, MemoryStore};
