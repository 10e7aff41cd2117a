// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Service facade for the Mnemo memory system.

pub mod requests;
pub mod service;

pub use requests::{ForgetRequest, ResearchRequest};
pub use service::MemoryService;
