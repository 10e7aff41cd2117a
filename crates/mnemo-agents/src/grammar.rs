// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Line-oriented response grammars for the plan, abstract, and reflect
//! LLM calls.
//!
//! Parsing is tolerant: field prefixes are case-insensitive, unknown lines
//! are ignored, and missing fields take their zero values. A response that
//! violates the grammar entirely still parses to a usable default; the
//! caller never fails on a malformed LLM reply.

/// Sentinel query used when the plan response leaves `SEARCH_QUERY` unset,
/// so the search phase never issues an empty query.
pub const DEFAULT_SEARCH_QUERY: &str = "general search";

/// A parsed plan directive from the research loop's Plan phase.
#[derive(Debug, Clone, PartialEq)]
pub struct ResearchPlan {
    /// Free-text strategy line.
    pub strategy: String,
    /// Optimized query for this iteration's search fan-out.
    pub search_query: String,
    /// Run the keyword retriever this iteration.
    pub use_keyword: bool,
    /// Run the vector retriever this iteration.
    pub use_vector: bool,
    /// Run the header-index retriever this iteration.
    pub use_index: bool,
    /// Headers to look up when `use_index` is set.
    pub target_headers: Vec<String>,
    /// Terminate the loop immediately, skipping all further phases.
    pub complete: bool,
}

impl Default for ResearchPlan {
    fn default() -> Self {
        Self {
            strategy: String::new(),
            search_query: DEFAULT_SEARCH_QUERY.to_string(),
            use_keyword: false,
            use_vector: false,
            use_index: false,
            target_headers: Vec::new(),
            complete: false,
        }
    }
}

/// A parsed abstract from the ingest agent's summarization call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedAbstract {
    /// One-line summary; empty when the response was unparseable.
    pub summary: String,
    /// Header keywords; empty when the response was unparseable.
    pub headers: Vec<String>,
}

/// Strip a case-insensitive `prefix` from the start of `line`.
fn strip_prefix_ci<'a>(line: &'a str, prefix: &str) -> Option<&'a str> {
    // `get` keeps multibyte garbage from panicking on a non-char boundary.
    let head = line.get(..prefix.len())?;
    if head.eq_ignore_ascii_case(prefix) {
        Some(&line[prefix.len()..])
    } else {
        None
    }
}

fn parse_bool(value: &str) -> bool {
    value.trim().eq_ignore_ascii_case("true")
}

/// Parse a plan response.
///
/// ```text
/// STRATEGY: <free text>
/// SEARCH_QUERY: <free text>
/// USE_KEYWORD: true|false
/// USE_VECTOR: true|false
/// USE_INDEX: true|false
/// TARGET_HEADERS: <comma-separated list, or "none">
/// COMPLETE: true|false
/// ```
pub fn parse_plan(response: &str) -> ResearchPlan {
    let mut plan = ResearchPlan::default();
    for line in response.lines() {
        let line = line.trim();
        if let Some(value) = strip_prefix_ci(line, "strategy:") {
            plan.strategy = value.trim().to_string();
        } else if let Some(value) = strip_prefix_ci(line, "search_query:") {
            let value = value.trim();
            if !value.is_empty() {
                plan.search_query = value.to_string();
            }
        } else if let Some(value) = strip_prefix_ci(line, "use_keyword:") {
            plan.use_keyword = parse_bool(value);
        } else if let Some(value) = strip_prefix_ci(line, "use_vector:") {
            plan.use_vector = parse_bool(value);
        } else if let Some(value) = strip_prefix_ci(line, "use_index:") {
            plan.use_index = parse_bool(value);
        } else if let Some(value) = strip_prefix_ci(line, "target_headers:") {
            plan.target_headers = value
                .split(',')
                .map(str::trim)
                .filter(|h| !h.is_empty() && !h.eq_ignore_ascii_case("none"))
                .map(str::to_string)
                .collect();
        } else if let Some(value) = strip_prefix_ci(line, "complete:") {
            plan.complete = parse_bool(value);
        }
    }
    plan
}

/// Parse an abstract response.
///
/// ```text
/// SUMMARY: <one line of text>
/// HEADERS:
/// - <header 1>
/// - <header 2>
/// ```
///
/// Header bullets require a leading `-`. Returns empty fields on garbage
/// input; callers write the abstract regardless.
pub fn parse_abstract(response: &str) -> ParsedAbstract {
    let mut parsed = ParsedAbstract::default();
    let mut in_headers = false;
    for line in response.lines() {
        let line = line.trim();
        if let Some(value) = strip_prefix_ci(line, "summary:") {
            parsed.summary = value.trim().to_string();
            in_headers = false;
        } else if strip_prefix_ci(line, "headers:").is_some() {
            in_headers = true;
        } else if in_headers {
            if let Some(header) = line.strip_prefix('-') {
                let header = header.trim();
                if !header.is_empty() {
                    parsed.headers.push(header.to_string());
                }
            }
        }
    }
    parsed
}

/// Whether a reflect response asks the loop to keep going: the literal token
/// `CONTINUE`, matched case-insensitively anywhere in the text.
pub fn wants_continue(response: &str) -> bool {
    response.to_lowercase().contains("continue")
}
