// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The research agent: an iterative plan/search/integrate/reflect loop that
//! assembles a bounded, relevance-ordered [`MemoryContext`] for a query.
//!
//! The loop is bounded in three dimensions at once: iteration count, token
//! budget, and the reflect gate. Phases advance strictly
//! Plan -> Search -> Integrate -> Reflect; only a plan with `complete=true`
//! may short-circuit, jumping directly to termination. The streaming entry
//! point emits one [`ResearchStep`] per phase; the plain entry point drains
//! the stream and returns the last step's context snapshot.

use std::collections::{HashMap, HashSet};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use futures::stream;
use futures_core::Stream;
use mnemo_core::types::{
    ChatMessage, CompletionRequest, MemoryContext, ResearchOptions, ResearchPhase, ResearchQuery,
    ResearchStep, RetrievalQuery, RetrievalResult, RetrievedPage, StepDetail,
};
use mnemo_core::{EmbeddingProvider, LlmProvider, MnemoError, Retriever};
use mnemo_retrieval::RetrieverSet;
use mnemo_store::MemoryStore;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::grammar::{parse_plan, wants_continue, ResearchPlan};
use crate::prompts::{build_plan_prompt, build_reflect_prompt, PLAN_SYSTEM_PROMPT};

/// Fraction of the token budget at which Reflect stops without asking the LLM.
const REFLECT_BUDGET_FRACTION: f64 = 0.9;
/// Output cap for the reflect completion.
const REFLECT_MAX_TOKENS: u32 = 50;
/// Output cap for the plan completion.
const PLAN_MAX_TOKENS: u32 = 300;
/// Sampling temperature for plan and reflect calls.
const LOOP_TEMPERATURE: f32 = 0.3;

/// The four capabilities the research loop is wired with, passed as an
/// explicit record.
#[derive(Clone)]
pub struct ResearchCapabilities {
    pub llm: Arc<dyn LlmProvider>,
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub store: Arc<MemoryStore>,
    pub retrievers: RetrieverSet,
}

/// Loop-internal accumulator for one research call.
struct ResearchContext {
    query: ResearchQuery,
    options: ResearchOptions,
    retrieved_page_ids: HashSet<String>,
    pages: Vec<RetrievedPage>,
    total_tokens: i64,
}

impl ResearchContext {
    fn new(query: ResearchQuery, options: ResearchOptions) -> Self {
        Self {
            query,
            options,
            retrieved_page_ids: HashSet::new(),
            pages: Vec::new(),
            total_tokens: 0,
        }
    }

    /// Freeze the current state into a caller-facing context: pages
    /// re-sorted by relevance score descending.
    fn snapshot(&self, iterations_performed: u32, started: Instant) -> MemoryContext {
        let mut pages = self.pages.clone();
        pages.sort_by(|a, b| {
            b.relevance_score
                .partial_cmp(&a.relevance_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        MemoryContext {
            pages,
            total_tokens: self.total_tokens,
            iterations_performed,
            duration: started.elapsed(),
        }
    }
}

/// Iterative recall agent over the hybrid retrieval substrate.
pub struct ResearchAgent {
    caps: ResearchCapabilities,
}

impl ResearchAgent {
    pub fn new(caps: ResearchCapabilities) -> Self {
        Self { caps }
    }

    /// Run the research loop to completion and return the assembled context.
    ///
    /// Defined as: drain the step stream and return the context attached to
    /// the last emitted step, or the empty context if none was emitted.
    pub async fn research(
        &self,
        query: ResearchQuery,
        options: ResearchOptions,
        cancel: CancellationToken,
    ) -> Result<MemoryContext, MnemoError> {
        use futures::StreamExt;

        let mut steps = self.research_stream(query, options, cancel);
        let mut last: Option<MemoryContext> = None;
        while let Some(step) = steps.next().await {
            last = Some(step?.current_context);
        }
        Ok(last.unwrap_or_else(MemoryContext::empty))
    }

    /// Streaming entry point: a finite, in-order, non-restartable stream of
    /// one [`ResearchStep`] per executed phase.
    pub fn research_stream(
        &self,
        query: ResearchQuery,
        options: ResearchOptions,
        cancel: CancellationToken,
    ) -> Pin<Box<dyn Stream<Item = Result<ResearchStep, MnemoError>> + Send>> {
        let caps = self.caps.clone();
        let (tx, rx) = mpsc::channel::<Result<ResearchStep, MnemoError>>(8);

        tokio::spawn(async move {
            if let Err(e) = run_loop(caps, query, options, cancel, &tx).await {
                let _ = tx.send(Err(e)).await;
            }
        });

        Box::pin(stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        }))
    }
}

/// Abort with `Cancelled` when the token has been triggered.
fn ensure_live(cancel: &CancellationToken) -> Result<(), MnemoError> {
    if cancel.is_cancelled() {
        Err(MnemoError::Cancelled)
    } else {
        Ok(())
    }
}

async fn emit(
    tx: &mpsc::Sender<Result<ResearchStep, MnemoError>>,
    step: ResearchStep,
) -> Result<(), MnemoError> {
    tx.send(Ok(step))
        .await
        .map_err(|_| MnemoError::Internal("research step receiver dropped".to_string()))
}

async fn run_loop(
    caps: ResearchCapabilities,
    query: ResearchQuery,
    options: ResearchOptions,
    cancel: CancellationToken,
    tx: &mpsc::Sender<Result<ResearchStep, MnemoError>>,
) -> Result<(), MnemoError> {
    let started = Instant::now();
    let max_iterations = options.max_iterations.max(1);
    let mut ctx = ResearchContext::new(query, options);

    for iteration in 1..=max_iterations {
        // --- Plan ---
        ensure_live(&cancel)?;
        let phase_started = Instant::now();
        let plan = plan_phase(&caps, &ctx).await?;
        let summary = if plan.complete {
            "research complete".to_string()
        } else if plan.strategy.is_empty() {
            "no strategy given".to_string()
        } else {
            plan.strategy.clone()
        };
        emit(
            tx,
            ResearchStep {
                iteration,
                phase: ResearchPhase::Plan,
                summary,
                duration: phase_started.elapsed(),
                detail: StepDetail::Plan {
                    strategy: plan.strategy.clone(),
                },
                current_context: ctx.snapshot(iteration, started),
            },
        )
        .await?;
        if plan.complete {
            debug!(iteration, "plan declared research complete");
            break;
        }

        // --- Search ---
        ensure_live(&cancel)?;
        let phase_started = Instant::now();
        let merged = search_phase(&caps, &ctx, &plan).await?;
        emit(
            tx,
            ResearchStep {
                iteration,
                phase: ResearchPhase::Search,
                summary: format!("{} candidate pages", merged.len()),
                duration: phase_started.elapsed(),
                detail: StepDetail::Search {
                    results: merged.clone(),
                },
                current_context: ctx.snapshot(iteration, started),
            },
        )
        .await?;

        // --- Integrate ---
        ensure_live(&cancel)?;
        let phase_started = Instant::now();
        let pages_added = integrate_phase(&caps, &mut ctx, &merged).await?;
        emit(
            tx,
            ResearchStep {
                iteration,
                phase: ResearchPhase::Integrate,
                summary: format!(
                    "admitted {pages_added} pages ({} tokens total)",
                    ctx.total_tokens
                ),
                duration: phase_started.elapsed(),
                detail: StepDetail::Integrate { pages_added },
                current_context: ctx.snapshot(iteration, started),
            },
        )
        .await?;

        // --- Reflect ---
        ensure_live(&cancel)?;
        let phase_started = Instant::now();
        let continue_search = reflect_phase(&caps, &ctx).await?;
        emit(
            tx,
            ResearchStep {
                iteration,
                phase: ResearchPhase::Reflect,
                summary: if continue_search {
                    "continuing".to_string()
                } else {
                    "stopping".to_string()
                },
                duration: phase_started.elapsed(),
                detail: StepDetail::Reflect { continue_search },
                current_context: ctx.snapshot(iteration, started),
            },
        )
        .await?;
        if !continue_search {
            break;
        }
    }

    Ok(())
}

/// Ask the LLM for this iteration's directive. Grammar violations degrade to
/// field defaults inside the parser; transport errors surface.
async fn plan_phase(
    caps: &ResearchCapabilities,
    ctx: &ResearchContext,
) -> Result<ResearchPlan, MnemoError> {
    let request = CompletionRequest {
        messages: vec![
            ChatMessage::system(PLAN_SYSTEM_PROMPT),
            ChatMessage::user(build_plan_prompt(&ctx.query.query_text, &ctx.pages)),
        ],
        temperature: LOOP_TEMPERATURE,
        max_tokens: Some(PLAN_MAX_TOKENS),
        model: None,
    };
    let response = caps.llm.complete(request).await?;
    Ok(parse_plan(&response.content))
}

/// Embed the plan query once, fan out to the selected retrievers
/// concurrently, and merge first-occurrence-wins sorted by score descending.
async fn search_phase(
    caps: &ResearchCapabilities,
    ctx: &ResearchContext,
    plan: &ResearchPlan,
) -> Result<Vec<RetrievalResult>, MnemoError> {
    let query_embedding = caps.embedder.embed(&plan.search_query).await?;

    let base = RetrievalQuery {
        owner_id: ctx.query.owner_id.clone(),
        query_text: plan.search_query.clone(),
        query_embedding: Some(query_embedding),
        max_results: ctx.options.max_pages_per_iteration,
        min_score: ctx.options.min_relevance_score,
        exclude_page_ids: ctx.retrieved_page_ids.clone(),
    };

    let mut invocations: Vec<(Arc<dyn Retriever>, RetrievalQuery)> = Vec::new();
    if plan.use_keyword {
        invocations.push((caps.retrievers.keyword.clone(), base.clone()));
    }
    if plan.use_vector {
        invocations.push((caps.retrievers.vector.clone(), base.clone()));
    }
    if plan.use_index {
        for header in &plan.target_headers {
            let mut query = base.clone();
            query.query_text = header.clone();
            invocations.push((caps.retrievers.header.clone(), query));
        }
    }
    if invocations.is_empty() {
        // Nothing was scheduled (toggles all unset, or index with no
        // headers): fall back to keyword + vector.
        invocations.push((caps.retrievers.keyword.clone(), base.clone()));
        invocations.push((caps.retrievers.vector.clone(), base));
    }

    let outcomes = join_all(
        invocations
            .into_iter()
            .map(|(retriever, query)| async move { retriever.retrieve(&query).await }),
    )
    .await;

    // First occurrence wins per page id, in fixed retriever order; the
    // stable sort then ranks by score while preserving that order on ties.
    let mut seen: HashSet<String> = HashSet::new();
    let mut merged: Vec<RetrievalResult> = Vec::new();
    for outcome in outcomes {
        for result in outcome? {
            if seen.insert(result.page_id.clone()) {
                merged.push(result);
            }
        }
    }
    merged.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    Ok(merged)
}

/// Hydrate fresh pages and admit them greedily head-first under the token
/// budget. Hydration misses (page deleted mid-request) are dropped silently.
async fn integrate_phase(
    caps: &ResearchCapabilities,
    ctx: &mut ResearchContext,
    merged: &[RetrievalResult],
) -> Result<usize, MnemoError> {
    let fresh: Vec<&RetrievalResult> = merged
        .iter()
        .filter(|r| !ctx.retrieved_page_ids.contains(&r.page_id))
        .collect();
    if fresh.is_empty() {
        return Ok(0);
    }

    let ids: Vec<String> = fresh.iter().map(|r| r.page_id.clone()).collect();
    let hydrated = caps.store.get_pages_by_ids(&ids).await?;
    let mut by_id: HashMap<String, _> = hydrated
        .into_iter()
        .map(|page| (page.id.clone(), page))
        .collect();

    let mut pages_added = 0;
    for result in fresh {
        let Some(page) = by_id.remove(&result.page_id) else {
            debug!(page_id = %result.page_id, "page vanished before hydration, skipping");
            continue;
        };
        if ctx.total_tokens + page.token_count > ctx.options.max_context_tokens {
            // Greedy head-first: the first overflow ends admission for this
            // iteration.
            break;
        }
        ctx.total_tokens += page.token_count;
        ctx.retrieved_page_ids.insert(page.id.clone());
        ctx.pages.push(RetrievedPage {
            page_id: page.id,
            content: page.content,
            token_count: page.token_count,
            relevance_score: result.score,
            retriever: result.retriever.clone(),
            created_at: page.created_at,
        });
        pages_added += 1;
    }
    Ok(pages_added)
}

/// Decide whether to run another iteration.
///
/// Hard gate first: at or above 90% of the token budget the loop stops. An
/// empty context forces at least a second attempt. Otherwise a bounded
/// low-temperature completion is scanned for the CONTINUE token.
async fn reflect_phase(
    caps: &ResearchCapabilities,
    ctx: &ResearchContext,
) -> Result<bool, MnemoError> {
    if ctx.total_tokens as f64 >= REFLECT_BUDGET_FRACTION * ctx.options.max_context_tokens as f64 {
        debug!(
            total_tokens = ctx.total_tokens,
            budget = ctx.options.max_context_tokens,
            "token budget nearly exhausted, stopping"
        );
        return Ok(false);
    }
    if ctx.pages.is_empty() {
        return Ok(true);
    }

    let request = CompletionRequest {
        messages: vec![ChatMessage::user(build_reflect_prompt(
            &ctx.query.query_text,
            ctx.pages.len(),
            ctx.total_tokens,
        ))],
        temperature: LOOP_TEMPERATURE,
        max_tokens: Some(REFLECT_MAX_TOKENS),
        model: None,
    };
    match caps.llm.complete(request).await {
        Ok(response) => Ok(wants_continue(&response.content)),
        Err(e) => {
            // A reflect failure is not worth losing the accumulated context
            // over; treat it as a stop signal.
            warn!(error = %e, "reflect completion failed, stopping loop");
            Ok(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use mnemo_core::types::{Page, PageAbstract};
    use mnemo_test_utils::{HashEmbedder, MockLlm};

    const DIMS: usize = 64;

    async fn seed_page(
        caps: &ResearchCapabilities,
        id: &str,
        owner: &str,
        content: &str,
        headers: &[&str],
        token_count: i64,
    ) {
        let embedding = caps.embedder.embed(content).await.unwrap();
        let created_at = chrono::Utc::now();
        let page = Page {
            id: id.to_string(),
            owner_id: owner.to_string(),
            content: content.to_string(),
            token_count,
            embedding: Some(embedding),
            metadata: None,
            created_at,
        };
        let abs = PageAbstract {
            page_id: id.to_string(),
            owner_id: owner.to_string(),
            summary: content.chars().take(40).collect(),
            headers: headers.iter().map(|h| h.to_string()).collect(),
            summary_embedding: None,
            created_at,
        };
        caps.store.store_page_with_abstract(&page, &abs).await.unwrap();
    }

    async fn make_caps(llm: MockLlm) -> ResearchCapabilities {
        let store = Arc::new(MemoryStore::open_in_memory().await.unwrap());
        ResearchCapabilities {
            llm: Arc::new(llm),
            embedder: Arc::new(HashEmbedder::new(DIMS)),
            store: store.clone(),
            retrievers: RetrieverSet::over_store(store),
        }
    }

    fn query(owner: &str, text: &str) -> ResearchQuery {
        ResearchQuery {
            owner_id: owner.to_string(),
            query_text: text.to_string(),
        }
    }

    fn options(max_iterations: u32, max_tokens: i64) -> ResearchOptions {
        ResearchOptions {
            max_iterations,
            max_pages_per_iteration: 10,
            max_context_tokens: max_tokens,
            min_relevance_score: 0.0,
        }
    }

    const PLAN_KEYWORD: &str = "STRATEGY: keyword pass\n\
                                SEARCH_QUERY: kubernetes container orchestration\n\
                                USE_KEYWORD: true\n\
                                COMPLETE: false";

    #[tokio::test]
    async fn finds_relevant_pages_and_sorts_by_score() {
        let llm = MockLlm::with_responses(vec![PLAN_KEYWORD, "STOP, we have enough"]);
        let caps = make_caps(llm).await;
        seed_page(
            &caps,
            "p1",
            "u1",
            "Kubernetes is a container orchestration platform",
            &["kubernetes"],
            20,
        )
        .await;
        seed_page(&caps, "p2", "u1", "Sourdough baking notes", &["baking"], 20).await;

        let agent = ResearchAgent::new(caps);
        let context = agent
            .research(
                query("u1", "container orchestration"),
                options(5, 8000),
                CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(context.pages.len(), 1);
        assert!(context.pages[0].content.contains("Kubernetes"));
        assert_eq!(context.iterations_performed, 1);
        assert!(context.total_tokens <= 8000);
        for window in context.pages.windows(2) {
            assert!(window[0].relevance_score >= window[1].relevance_score);
        }
    }

    #[tokio::test]
    async fn complete_plan_short_circuits() {
        let llm = MockLlm::with_responses(vec!["COMPLETE: true"]);
        let caps = make_caps(llm).await;
        let agent = ResearchAgent::new(caps);
        let context = agent
            .research(query("u1", "anything"), options(5, 8000), CancellationToken::new())
            .await
            .unwrap();

        assert!(context.pages.is_empty());
        assert_eq!(context.iterations_performed, 1);
    }

    #[tokio::test]
    async fn streaming_emits_phases_in_order() {
        let llm = MockLlm::with_responses(vec![PLAN_KEYWORD, "stop"]);
        let caps = make_caps(llm).await;
        seed_page(&caps, "p1", "u1", "kubernetes notes", &["kubernetes"], 10).await;

        let agent = ResearchAgent::new(caps);
        let steps: Vec<ResearchStep> = agent
            .research_stream(
                query("u1", "kubernetes"),
                options(5, 8000),
                CancellationToken::new(),
            )
            .map(|s| s.unwrap())
            .collect()
            .await;

        let phases: Vec<ResearchPhase> = steps.iter().map(|s| s.phase).collect();
        assert_eq!(
            phases,
            vec![
                ResearchPhase::Plan,
                ResearchPhase::Search,
                ResearchPhase::Integrate,
                ResearchPhase::Reflect
            ]
        );
        assert!(steps.iter().all(|s| s.iteration == 1));
        let last = steps.last().unwrap();
        assert_eq!(last.current_context.pages.len(), 1);
        assert!(matches!(
            last.detail,
            StepDetail::Reflect {
                continue_search: false
            }
        ));
    }

    #[tokio::test]
    async fn no_page_appears_twice_across_iterations() {
        // Three searching iterations, then a terminal plan.
        let llm = MockLlm::with_responses(vec![
            PLAN_KEYWORD,
            "CONTINUE",
            PLAN_KEYWORD,
            "CONTINUE",
            PLAN_KEYWORD,
            "CONTINUE",
            "COMPLETE: true",
        ]);
        let caps = make_caps(llm).await;
        for i in 0..6 {
            seed_page(
                &caps,
                &format!("p{i}"),
                "u1",
                &format!("kubernetes container orchestration notes volume {i}"),
                &["kubernetes"],
                10,
            )
            .await;
        }

        let agent = ResearchAgent::new(caps);
        let context = agent
            .research(query("u1", "kubernetes"), options(10, 8000), CancellationToken::new())
            .await
            .unwrap();

        let mut ids: Vec<&str> = context.pages.iter().map(|p| p.page_id.as_str()).collect();
        let total = ids.len();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), total, "no page id may be retrieved twice");
        assert_eq!(total, 6, "all pages retrievable across iterations");
    }

    #[tokio::test]
    async fn token_budget_halts_admission() {
        let llm = MockLlm::with_responses(vec![PLAN_KEYWORD, "stop"]);
        let caps = make_caps(llm).await;
        for i in 0..4 {
            seed_page(
                &caps,
                &format!("p{i}"),
                "u1",
                &format!("kubernetes container orchestration entry {i}"),
                &[],
                80,
            )
            .await;
        }

        let agent = ResearchAgent::new(caps);
        let context = agent
            .research(query("u1", "kubernetes"), options(5, 100), CancellationToken::new())
            .await
            .unwrap();

        assert!(context.pages.len() <= 2);
        assert!(context.total_tokens <= 100);
        assert!(!context.pages.is_empty());
    }

    #[tokio::test]
    async fn zero_token_budget_returns_empty_after_one_iteration() {
        let llm = MockLlm::with_responses(vec![PLAN_KEYWORD]);
        let caps = make_caps(llm).await;
        seed_page(&caps, "p1", "u1", "kubernetes notes", &[], 80).await;

        let agent = ResearchAgent::new(caps);
        let context = agent
            .research(query("u1", "kubernetes"), options(5, 0), CancellationToken::new())
            .await
            .unwrap();

        assert!(context.pages.is_empty());
        assert_eq!(context.iterations_performed, 1);
    }

    #[tokio::test]
    async fn empty_store_runs_all_iterations_and_returns_empty() {
        // Plans keep searching; the empty context forces the loop to
        // continue until the iteration bound.
        let llm = MockLlm::with_responses(vec![PLAN_KEYWORD, PLAN_KEYWORD]);
        let caps = make_caps(llm).await;

        let agent = ResearchAgent::new(caps);
        let context = agent
            .research(query("u1", "kubernetes"), options(2, 8000), CancellationToken::new())
            .await
            .unwrap();

        assert!(context.pages.is_empty());
        assert_eq!(context.iterations_performed, 2);
    }

    #[tokio::test]
    async fn all_toggles_false_falls_back_to_keyword_and_vector() {
        let plan = "STRATEGY: nothing selected\n\
                    SEARCH_QUERY: kubernetes container orchestration\n\
                    USE_KEYWORD: false\n\
                    USE_VECTOR: false\n\
                    USE_INDEX: false\n\
                    COMPLETE: false";
        let llm = MockLlm::with_responses(vec![plan, "stop"]);
        let caps = make_caps(llm).await;
        seed_page(
            &caps,
            "p1",
            "u1",
            "Kubernetes is a container orchestration platform",
            &[],
            20,
        )
        .await;

        let agent = ResearchAgent::new(caps);
        let context = agent
            .research(query("u1", "kubernetes"), options(5, 8000), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(context.pages.len(), 1, "fallback must still search");
    }

    #[tokio::test]
    async fn header_plan_routes_through_page_index() {
        let plan = "STRATEGY: look up headers\n\
                    SEARCH_QUERY: deployments\n\
                    USE_INDEX: true\n\
                    TARGET_HEADERS: kubernetes\n\
                    COMPLETE: false";
        let llm = MockLlm::with_responses(vec![plan, "stop"]);
        let caps = make_caps(llm).await;
        seed_page(&caps, "p1", "u1", "notes about clusters", &["kubernetes deployment"], 10).await;

        let agent = ResearchAgent::new(caps);
        let context = agent
            .research(query("u1", "deployments"), options(5, 8000), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(context.pages.len(), 1);
        assert_eq!(context.pages[0].retriever, "page_index");
    }

    #[tokio::test]
    async fn owner_isolation() {
        let llm = MockLlm::with_responses(vec![PLAN_KEYWORD, PLAN_KEYWORD]);
        let caps = make_caps(llm).await;
        seed_page(&caps, "p1", "u1", "kubernetes container orchestration", &[], 10).await;

        let agent = ResearchAgent::new(caps);
        let context = agent
            .research(query("u2", "kubernetes"), options(2, 8000), CancellationToken::new())
            .await
            .unwrap();
        assert!(context.pages.is_empty());
    }

    #[tokio::test]
    async fn single_iteration_still_runs_all_four_phases() {
        // Even with the reflect response asking to continue, one iteration
        // is the bound; all four phases must still have executed.
        let llm = MockLlm::with_responses(vec![PLAN_KEYWORD, "CONTINUE"]);
        let caps = make_caps(llm).await;
        seed_page(&caps, "p1", "u1", "kubernetes container orchestration", &[], 10).await;

        let agent = ResearchAgent::new(caps);
        let steps: Vec<ResearchStep> = agent
            .research_stream(
                query("u1", "kubernetes"),
                options(1, 8000),
                CancellationToken::new(),
            )
            .map(|s| s.unwrap())
            .collect()
            .await;

        assert_eq!(steps.len(), 4);
        assert_eq!(steps.last().unwrap().phase, ResearchPhase::Reflect);
        assert_eq!(steps.last().unwrap().current_context.iterations_performed, 1);
    }

    #[tokio::test]
    async fn cancellation_aborts_with_cancelled_error() {
        let caps = make_caps(MockLlm::new()).await;
        let agent = ResearchAgent::new(caps);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = agent
            .research(query("u1", "anything"), options(5, 8000), cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, MnemoError::Cancelled));
    }

    #[tokio::test]
    async fn reflect_requests_are_bounded() {
        let llm = Arc::new(MockLlm::with_responses(vec![PLAN_KEYWORD, "stop"]));
        let store = Arc::new(MemoryStore::open_in_memory().await.unwrap());
        let caps = ResearchCapabilities {
            llm: llm.clone(),
            embedder: Arc::new(HashEmbedder::new(DIMS)),
            store: store.clone(),
            retrievers: RetrieverSet::over_store(store),
        };
        seed_page(&caps, "p1", "u1", "kubernetes container orchestration", &[], 10).await;

        let agent = ResearchAgent::new(caps);
        agent
            .research(query("u1", "kubernetes"), options(5, 8000), CancellationToken::new())
            .await
            .unwrap();

        let requests = llm.requests().await;
        assert_eq!(requests.len(), 2, "one plan and one reflect call");
        let reflect = &requests[1];
        assert_eq!(reflect.max_tokens, Some(REFLECT_MAX_TOKENS));
        assert!(reflect.temperature <= 0.3);
    }
}
