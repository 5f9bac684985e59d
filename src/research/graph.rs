//! C6 — directed node-graph runtime: sequential/conditional edges, declared
//! field reducers, bounded parallel fan-out at `web_research`, and a
//! streaming driver the orchestrator subscribes to.
//!
//! Grounded on `original_source/app/services/deepsearch_engine.py`'s graph
//! assembly (`StateGraph`/`add_conditional_edges`/`Send`). SPEC_FULL.md §9
//! picks an enum-dispatch node registry over the source's string-keyed one
//! — more idiomatic Rust for a fixed, small node set — and models
//! `astream` as an `mpsc` channel fed by a spawned driver task.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{info, warn};

use super::errors::GraphError;
use super::nodes;
use super::session_registry::SessionRegistry;
use super::types::{
    FactVerification, OverallState, QualityAssessment, RelevanceAssessment, ResearchPlan,
    SearchQuery, Source, SummaryOptimization, WebResearchResult,
};

/// Every node the graph can dispatch, in declaration order. `EvaluateResearch`
/// is the router — it never runs as a node and never appears in a stream
/// item; it only decides what runs next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeName {
    GenerateResearchPlan,
    GenerateQuery,
    WebResearch,
    Reflection,
    AssessContentQuality,
    VerifyFacts,
    AssessRelevance,
    OptimizeSummary,
    GenerateVerificationReport,
    FinalizeAnswer,
}

impl NodeName {
    pub fn as_str(self) -> &'static str {
        match self {
            NodeName::GenerateResearchPlan => "generate_research_plan",
            NodeName::GenerateQuery => "generate_query",
            NodeName::WebResearch => "web_research",
            NodeName::Reflection => "reflection",
            NodeName::AssessContentQuality => "assess_content_quality",
            NodeName::VerifyFacts => "verify_facts",
            NodeName::AssessRelevance => "assess_relevance",
            NodeName::OptimizeSummary => "optimize_summary",
            NodeName::GenerateVerificationReport => "generate_verification_report",
            NodeName::FinalizeAnswer => "finalize_answer",
        }
    }
}

/// A partial state contribution from one node run. Append-class fields are
/// plain `Vec`s (an empty vec is a no-op contribution); replace-class
/// fields are `Option` so "untouched" is distinguishable from "set to a
/// default value" (SPEC_FULL.md §3's reducer classes).
#[derive(Debug, Clone, Default)]
pub struct StateDelta {
    // --- append fields ---
    pub messages: Vec<String>,
    pub search_query: Vec<SearchQuery>,
    pub web_research_results: Vec<WebResearchResult>,
    pub sources_gathered: Vec<Source>,
    pub all_sources_gathered: Vec<Source>,

    // --- replace fields ---
    pub research_plan: Option<ResearchPlan>,
    pub research_loop_count: Option<u32>,
    pub knowledge_gap: Option<String>,
    pub unanswered_questions: Option<Vec<String>>,
    pub new_search_query: Option<Vec<String>>,
    pub new_search_query_display: Option<Vec<String>>,
    pub content_quality: Option<QualityAssessment>,
    pub fact_verification: Option<FactVerification>,
    pub relevance_assessment: Option<RelevanceAssessment>,
    pub summary_optimization: Option<SummaryOptimization>,
    pub final_confidence_score: Option<f64>,
    pub verification_report: Option<String>,
    pub answer: Option<String>,
    pub markdown_report: Option<String>,
    pub final_cited_sources: Option<Vec<Source>>,
}

impl StateDelta {
    pub fn web_research(result: WebResearchResult) -> Self {
        StateDelta {
            sources_gathered: result.sources_gathered.clone(),
            all_sources_gathered: result.all_sources_gathered.clone(),
            search_query: vec![result.query.clone()],
            web_research_results: vec![result],
            ..Default::default()
        }
    }
}

/// Applies one node's `StateDelta` to the running `OverallState` using the
/// per-field reducer declared in SPEC_FULL.md §3: append-class fields
/// concatenate, replace-class fields take the delta's value when present.
/// Both the graph driver and the orchestrator's `accumulated_state` mirror
/// call this, so they merge identically (SPEC_FULL.md §4.8 step 4).
pub fn apply_delta(state: &mut OverallState, delta: StateDelta) {
    state.messages.extend(delta.messages);
    state.search_query.extend(delta.search_query);
    state.web_research_results.extend(delta.web_research_results);
    state.sources_gathered.extend(delta.sources_gathered);
    state.all_sources_gathered.extend(delta.all_sources_gathered);

    if let Some(v) = delta.research_plan {
        state.research_plan = Some(v);
    }
    if let Some(v) = delta.research_loop_count {
        state.research_loop_count = v;
    }
    if let Some(v) = delta.knowledge_gap {
        state.knowledge_gap = v;
    }
    if let Some(v) = delta.unanswered_questions {
        state.unanswered_questions = v;
    }
    if let Some(v) = delta.new_search_query {
        state.new_search_query = v;
    }
    if let Some(v) = delta.new_search_query_display {
        state.new_search_query_display = v;
    }
    if let Some(v) = delta.content_quality {
        state.content_quality = Some(v);
    }
    if let Some(v) = delta.fact_verification {
        state.fact_verification = Some(v);
    }
    if let Some(v) = delta.relevance_assessment {
        state.relevance_assessment = Some(v);
    }
    if let Some(v) = delta.summary_optimization {
        state.summary_optimization = Some(v);
    }
    if let Some(v) = delta.final_confidence_score {
        state.final_confidence_score = Some(v);
    }
    if let Some(v) = delta.verification_report {
        state.verification_report = Some(v);
    }
    if let Some(v) = delta.answer {
        state.answer = Some(v);
    }
    if let Some(v) = delta.markdown_report {
        state.markdown_report = Some(v);
    }
    if let Some(v) = delta.final_cited_sources {
        state.final_cited_sources = v;
    }
}

/// Everything a node needs beyond the running state: the session id to
/// forward to C3, the request's tunables, and the shared service handles.
/// Held behind an `Arc` so fan-out tasks can clone it cheaply.
pub struct GraphConfig {
    pub session_id: String,
    pub max_loops: u32,
    pub initial_query_count: usize,
    pub model_override: Option<String>,
    pub report_format: super::types::ReportFormat,
    pub deps: Arc<nodes::NodeDeps>,
}

impl GraphConfig {
    fn checkpoint(&self) -> Result<(), GraphError> {
        if self.deps.registry.is_cancelled(&self.session_id) {
            return Err(GraphError::Cancelled);
        }
        Ok(())
    }
}

/// One item the streaming driver yields: a node's name and its delta, or
/// the terminal error that stopped the run (cancellation included).
pub type StreamItem = Result<(NodeName, StateDelta), GraphError>;

/// Drives the graph to completion over an `mpsc` channel; the orchestrator
/// holds the `Receiver` side and maps each item to SSE events as it arrives
/// (SPEC_FULL.md §4.6 "astream").
pub fn astream(initial_state: OverallState, config: GraphConfig) -> mpsc::Receiver<StreamItem> {
    let (tx, rx) = mpsc::channel(64);
    tokio::spawn(async move {
        if let Err(e) = drive(initial_state, &config, &tx).await {
            let _ = tx.send(Err(e)).await;
        }
    });
    rx
}

/// Runs the graph to completion in one call, discarding the intermediate
/// stream — convenient for the non-streaming `/deepsearch/run` entry point.
pub async fn ainvoke(initial_state: OverallState, config: GraphConfig) -> Result<OverallState, GraphError> {
    let mut rx = astream(initial_state.clone(), config);
    let mut state = initial_state;
    while let Some(item) = rx.recv().await {
        let (_, delta) = item?;
        apply_delta(&mut state, delta);
    }
    Ok(state)
}

async fn drive(
    mut state: OverallState,
    config: &GraphConfig,
    tx: &mpsc::Sender<StreamItem>,
) -> Result<(), GraphError> {
    config.checkpoint()?;
    let plan_delta = nodes::generate_research_plan(&state, config).await?;
    apply_delta(&mut state, plan_delta.clone());
    tx.send(Ok((NodeName::GenerateResearchPlan, plan_delta))).await.ok();

    loop {
        config.checkpoint()?;
        let query_delta = nodes::generate_query(&state, config).await?;
        apply_delta(&mut state, query_delta.clone());
        tx.send(Ok((NodeName::GenerateQuery, query_delta))).await.ok();

        // Fan-out: one `web_research` task per new query, dispatched
        // concurrently and fanned back in before `reflection` runs
        // (SPEC_FULL.md §5 "all arrive before reflection").
        let queries = state.new_search_query.clone();
        let displays = state.new_search_query_display.clone();
        let mut handles = Vec::with_capacity(queries.len());
        for (idx, query) in queries.into_iter().enumerate() {
            let display = displays.get(idx).cloned().unwrap_or_else(|| query.clone());
            let deps = Arc::clone(&config.deps);
            let session_id = config.session_id.clone();
            handles.push(tokio::spawn(async move {
                nodes::web_research(&deps, &session_id, idx as u32, &query, &display).await
            }));
        }

        for handle in handles {
            config.checkpoint()?;
            match handle.await {
                Ok(Ok(result)) => {
                    let delta = StateDelta::web_research(result);
                    apply_delta(&mut state, delta.clone());
                    tx.send(Ok((NodeName::WebResearch, delta))).await.ok();
                }
                Ok(Err(e)) => return Err(e),
                Err(join_err) => {
                    warn!(error = %join_err, "web_research task panicked");
                    return Err(GraphError::NodeFailed {
                        node: "web_research",
                        source: anyhow::anyhow!(join_err),
                    });
                }
            }
        }

        config.checkpoint()?;
        let reflection_delta = nodes::reflection(&state, config).await?;
        apply_delta(&mut state, reflection_delta.clone());
        tx.send(Ok((NodeName::Reflection, reflection_delta))).await.ok();

        // `evaluate_research` router (§4.7.5): force-exit at the loop
        // bound regardless of sufficiency.
        let is_sufficient = state
            .unanswered_questions
            .is_empty();
        if is_sufficient || state.research_loop_count >= config.max_loops {
            break;
        }
    }

    config.checkpoint()?;
    let quality_delta = nodes::assess_content_quality(&state, config).await?;
    apply_delta(&mut state, quality_delta.clone());
    tx.send(Ok((NodeName::AssessContentQuality, quality_delta))).await.ok();

    config.checkpoint()?;
    let facts_delta = nodes::verify_facts(&state, config).await?;
    apply_delta(&mut state, facts_delta.clone());
    tx.send(Ok((NodeName::VerifyFacts, facts_delta))).await.ok();

    config.checkpoint()?;
    let relevance_delta = nodes::assess_relevance(&state, config).await?;
    apply_delta(&mut state, relevance_delta.clone());
    tx.send(Ok((NodeName::AssessRelevance, relevance_delta))).await.ok();

    config.checkpoint()?;
    let optimize_delta = nodes::optimize_summary(&state, config).await?;
    apply_delta(&mut state, optimize_delta.clone());
    tx.send(Ok((NodeName::OptimizeSummary, optimize_delta))).await.ok();

    config.checkpoint()?;
    let report_delta = nodes::generate_verification_report(&state, config);
    apply_delta(&mut state, report_delta.clone());
    tx.send(Ok((NodeName::GenerateVerificationReport, report_delta))).await.ok();

    config.checkpoint()?;
    let finalize_delta = nodes::finalize_answer(&state, config).await?;
    apply_delta(&mut state, finalize_delta.clone());
    tx.send(Ok((NodeName::FinalizeAnswer, finalize_delta))).await.ok();

    info!(session_id = %config.session_id, loops = state.research_loop_count, "graph run complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_fields_concatenate_across_deltas() {
        let mut state = OverallState::new("q");
        apply_delta(&mut state, StateDelta { messages: vec!["a".into()], ..Default::default() });
        apply_delta(&mut state, StateDelta { messages: vec!["b".into()], ..Default::default() });
        assert_eq!(state.messages, vec!["q".to_string(), "a".to_string(), "b".to_string()]);
    }

    #[test]
    fn replace_fields_take_latest_and_ignore_none() {
        let mut state = OverallState::new("q");
        apply_delta(&mut state, StateDelta { research_loop_count: Some(1), ..Default::default() });
        apply_delta(&mut state, StateDelta { ..Default::default() });
        assert_eq!(state.research_loop_count, 1);
        apply_delta(&mut state, StateDelta { research_loop_count: Some(2), ..Default::default() });
        assert_eq!(state.research_loop_count, 2);
    }
}
