// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain types for the Mnemo long-term memory system.
//!
//! A [`Page`] is the verbatim, formatted record of one conversation turn; an
//! [`Abstract`] is its derived index record (summary + header keywords). The
//! retrieval types ([`RetrievalQuery`], [`RetrievalResult`]) form the uniform
//! contract all retrievers implement, and [`MemoryContext`] is the bounded,
//! relevance-ordered bundle the research loop returns to callers.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Timestamp format used for SQLite TEXT columns.
///
/// Fixed-width ISO 8601 UTC, so lexical ordering equals chronological ordering.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

/// A persisted memory record: the verbatim formatted text of one conversation
/// turn for one owner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page {
    /// Unique identifier (UUID v4), assigned at creation and immutable.
    pub id: String,
    /// Owner scope; memories never cross owner boundaries. Immutable.
    pub owner_id: String,
    /// Verbatim formatted turn content.
    pub content: String,
    /// Estimated token count (non-negative).
    pub token_count: i64,
    /// Dense embedding of the content. `None` during partial ingest.
    #[serde(skip)]
    pub embedding: Option<Vec<f32>>,
    /// Optional key/value string metadata.
    pub metadata: Option<HashMap<String, String>>,
    /// UTC creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// The index-side record paired 1:1 with a page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageAbstract {
    /// Shares the owning page's id (primary key; deletion cascades).
    pub page_id: String,
    /// Must equal the owning page's owner.
    pub owner_id: String,
    /// Short summary of the page. Empty when abstract parsing failed.
    pub summary: String,
    /// Ordered set of short keyword headers (typically 3-7).
    pub headers: Vec<String>,
    /// Dense embedding of the summary. `None` during partial ingest.
    #[serde(skip)]
    pub summary_embedding: Option<Vec<f32>>,
    /// UTC creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// A recorded tool invocation within a conversation turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Tool name.
    pub tool: String,
    /// Serialized arguments as passed to the tool.
    pub arguments: String,
    /// Serialized tool result.
    pub result: String,
}

/// One conversation turn submitted for memorization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    /// Owner scope for the resulting page.
    pub owner_id: String,
    /// What the user said.
    pub user_message: String,
    /// What the assistant replied.
    pub assistant_message: String,
    /// When the turn happened (UTC).
    pub timestamp: DateTime<Utc>,
    /// Conversation this turn belongs to, if tracked by the caller.
    pub conversation_id: Option<String>,
    /// Position within the conversation, if tracked by the caller.
    pub turn_number: Option<u32>,
    /// Tool invocations made during the turn, in order.
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
    /// Optional key/value string metadata carried onto the page.
    pub metadata: Option<HashMap<String, String>>,
}

/// The uniform input contract for all retrievers.
#[derive(Debug, Clone)]
pub struct RetrievalQuery {
    /// Owner scope (required).
    pub owner_id: String,
    /// Query text.
    pub query_text: String,
    /// Query embedding. Required only by the vector retriever.
    pub query_embedding: Option<Vec<f32>>,
    /// Result cap.
    pub max_results: usize,
    /// Minimum score floor; rows scoring below it are dropped.
    pub min_score: f32,
    /// Page ids to exclude from results.
    pub exclude_page_ids: HashSet<String>,
}

/// The uniform output contract for all retrievers.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievalResult {
    /// Id of the matched page.
    pub page_id: String,
    /// Relevance score; higher is better after normalization.
    pub score: f32,
    /// Name of the retriever (and backend, where applicable) that matched.
    pub retriever: String,
    /// The header that matched, for header-index results.
    pub matched_header: Option<String>,
    /// A content snippet around the match, where the backend provides one.
    pub matched_snippet: Option<String>,
}

/// A hydrated page admitted into the research context.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievedPage {
    /// Id of the page.
    pub page_id: String,
    /// Full page content.
    pub content: String,
    /// Stored token estimate for the content.
    pub token_count: i64,
    /// Relevance score from the retriever that surfaced the page.
    pub relevance_score: f32,
    /// Name of the retriever that surfaced the page.
    pub retriever: String,
    /// Page creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// The immutable bundle a research call returns: relevance-ordered pages
/// under a token budget, with loop accounting.
#[derive(Debug, Clone, Serialize)]
pub struct MemoryContext {
    /// Pages sorted by relevance score, descending.
    pub pages: Vec<RetrievedPage>,
    /// Sum of admitted pages' token counts.
    pub total_tokens: i64,
    /// Number of loop iterations performed.
    pub iterations_performed: u32,
    /// Wall-clock duration of the research call.
    pub duration: Duration,
}

impl MemoryContext {
    /// An empty context (no pages, zero iterations).
    pub fn empty() -> Self {
        Self {
            pages: Vec::new(),
            total_tokens: 0,
            iterations_performed: 0,
            duration: Duration::ZERO,
        }
    }
}

/// An owner-scoped research request, as handed to the research agent.
#[derive(Debug, Clone)]
pub struct ResearchQuery {
    /// Owner scope.
    pub owner_id: String,
    /// What the caller wants to recall.
    pub query_text: String,
}

/// Tunable bounds for a research call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchOptions {
    /// Hard bound on loop iterations.
    pub max_iterations: u32,
    /// Per-retriever result cap per iteration.
    pub max_pages_per_iteration: usize,
    /// Token budget for the assembled context.
    pub max_context_tokens: i64,
    /// Score floor passed to every retriever.
    pub min_relevance_score: f32,
}

impl Default for ResearchOptions {
    fn default() -> Self {
        Self {
            max_iterations: 5,
            max_pages_per_iteration: 10,
            max_context_tokens: 8000,
            min_relevance_score: 0.3,
        }
    }
}

/// Phase tag for a [`ResearchStep`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ResearchPhase {
    Plan,
    Search,
    Integrate,
    Reflect,
}

impl ResearchPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResearchPhase::Plan => "plan",
            ResearchPhase::Search => "search",
            ResearchPhase::Integrate => "integrate",
            ResearchPhase::Reflect => "reflect",
        }
    }
}

/// Phase-specific payload attached to a [`ResearchStep`].
#[derive(Debug, Clone, Serialize)]
pub enum StepDetail {
    /// The plan's strategy line.
    Plan { strategy: String },
    /// The merged raw retrieval results of the search fan-out.
    Search { results: Vec<RetrievalResult> },
    /// How many pages were admitted this iteration.
    Integrate { pages_added: usize },
    /// Whether the loop decided to continue.
    Reflect { continue_search: bool },
}

/// One emitted step of the streaming research entry point.
#[derive(Debug, Clone, Serialize)]
pub struct ResearchStep {
    /// 1-based iteration number.
    pub iteration: u32,
    /// Which phase produced this step.
    pub phase: ResearchPhase,
    /// Human-readable summary of what the phase did.
    pub summary: String,
    /// Wall-clock duration of the phase.
    pub duration: Duration,
    /// Phase-specific payload.
    pub detail: StepDetail,
    /// Snapshot of the accumulated context after this phase.
    pub current_context: MemoryContext,
}

/// Aggregate statistics for one owner's stored pages.
#[derive(Debug, Clone, Serialize)]
pub struct OwnerStats {
    /// Total number of pages.
    pub page_count: i64,
    /// Sum of page token counts.
    pub total_tokens: i64,
    /// Creation timestamp of the oldest page, if any.
    pub oldest_page_at: Option<DateTime<Utc>>,
    /// Creation timestamp of the newest page, if any.
    pub newest_page_at: Option<DateTime<Utc>>,
}

// --- LLM completion types ---

/// Message role for LLM completion requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatRole::System => "system",
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
        }
    }
}

/// A single message in a completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// A request to an LLM provider.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    /// Sampling temperature.
    pub temperature: f32,
    /// Output token cap. `None` leaves the provider default in place.
    pub max_tokens: Option<u32>,
    /// Model override. `None` uses the provider's configured model.
    pub model: Option<String>,
}

/// A full response from an LLM provider.
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub content: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub model: String,
}

/// A single chunk of a streaming completion.
#[derive(Debug, Clone)]
pub struct CompletionChunk {
    pub content: String,
}

// --- Vector helpers ---

/// Convert an f32 vector to bytes for SQLite BLOB storage.
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    vec.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Convert a SQLite BLOB back to an f32 vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes(chunk.try_into().unwrap()))
        .collect()
}

/// Compute cosine similarity between two vectors.
///
/// Equivalent to `1 - cosine_distance`. Returns 0.0 when either vector has
/// zero magnitude or the lengths differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Format a timestamp for SQLite TEXT storage.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Parse a stored SQLite TEXT timestamp back to UTC.
pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(s).map(|dt| dt.with_timezone(&Utc))
}
