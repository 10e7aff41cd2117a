// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Prompt templates for the ingest and research agents.

use mnemo_core::types::RetrievedPage;

/// System prompt for abstract generation during ingest.
pub const ABSTRACT_SYSTEM_PROMPT: &str = "\
You index conversation turns for later retrieval. Given one conversation \
turn, produce a one-line summary and 3-7 short keyword headers that someone \
searching their memory later would use.

Respond in exactly this format:

SUMMARY: <one line summarizing the turn>
HEADERS:
- <header 1>
- <header 2>
- <header 3>

Headers are short noun phrases (1-4 words). No other output.";

/// System prompt for the research loop's Plan phase.
pub const PLAN_SYSTEM_PROMPT: &str = "\
You direct one iteration of a memory search. Given the research question and \
the memories found so far, decide what to search next and with which \
retrievers. When the found memories already answer the question, set \
COMPLETE to true.

Respond in exactly this format:

STRATEGY: <one line describing this iteration's approach>
SEARCH_QUERY: <optimized search query>
USE_KEYWORD: true|false
USE_VECTOR: true|false
USE_INDEX: true|false
TARGET_HEADERS: <comma-separated headers to look up, or none>
COMPLETE: true|false";

/// Build the user prompt for abstract generation.
pub fn build_abstract_prompt(page_content: &str) -> String {
    format!("Conversation turn to index:\n\n{page_content}")
}

/// Build the user prompt for the Plan phase from the accumulated context.
pub fn build_plan_prompt(query_text: &str, pages: &[RetrievedPage]) -> String {
    let mut prompt = format!("Research question: {query_text}\n\n");
    if pages.is_empty() {
        prompt.push_str("No memories found yet.\n");
    } else {
        prompt.push_str(&format!("Memories found so far ({}):\n", pages.len()));
        for page in pages {
            let first_line = page.content.lines().next().unwrap_or_default();
            prompt.push_str(&format!(
                "- [{:.2}] {}\n",
                page.relevance_score, first_line
            ));
        }
    }
    prompt.push_str("\nPlan the next search iteration.");
    prompt
}

/// Build the prompt for the Reflect phase.
pub fn build_reflect_prompt(query_text: &str, pages_found: usize, total_tokens: i64) -> String {
    format!(
        "Research question: {query_text}\n\
         Memories collected: {pages_found} ({total_tokens} tokens).\n\
         Reply with the single word CONTINUE to search further, or STOP if \
         the collected memories are sufficient."
    )
}
