//! C7 — the domain nodes run by the graph (§4.7).
//!
//! Each node is an `async fn(&OverallState, &GraphConfig) -> Result<StateDelta, GraphError>`
//! (`generate_verification_report` is pure and synchronous). Grounded on
//! `original_source/app/services/deepsearch_engine.py`'s node functions of
//! the same names.

use std::sync::Arc;

use serde::Deserialize;
use tracing::warn;

use super::citation;
use super::config::ResearchConfig;
use super::errors::GraphError;
use super::fetcher;
use super::graph::{GraphConfig, StateDelta};
use super::llm::LlmInvoker;
use super::prompts::{self, QueryMode};
use super::report;
use super::search_client::{self, SearchClient};
use super::session_registry::SessionRegistry;
use super::types::{
    ConfidenceLevel, DisputedClaim, FactVerification, OverallState, QualityAssessment,
    RelevanceAssessment, ReportFormat, ResearchPlan, ScrapedPage, SearchQuery, Source,
    SummaryOptimization, VerifiedFact, WebResearchResult,
};

/// Shared handles every node needs. Built once per process and cloned
/// (cheaply, via `Arc`) into each fan-out task.
pub struct NodeDeps {
    pub llm: LlmInvoker,
    pub search: SearchClient,
    pub http_client: reqwest::Client,
    pub config: Arc<ResearchConfig>,
    pub registry: Arc<SessionRegistry>,
}

#[derive(Deserialize)]
struct RawPlan {
    research_topic: Option<String>,
    sub_topics: Vec<String>,
    research_questions: Vec<String>,
    rationale: Option<String>,
}

pub async fn generate_research_plan(state: &OverallState, config: &GraphConfig) -> Result<StateDelta, GraphError> {
    let topic = state.messages.first().cloned().unwrap_or_default();
    let messages = prompts::research_plan_prompt(&topic);

    let raw: RawPlan = config
        .deps
        .llm
        .invoke(&config.session_id, "generate_research_plan", config.model_override.as_deref(), 0.3, |handle| {
            let client = config.deps.llm.client.clone();
            let messages = messages.clone();
            async move { handle.complete_structured(&client, &messages).await }
        })
        .await?;

    let research_topic = raw.research_topic.unwrap_or(topic);
    let sub_topic_count = raw.sub_topics.len().max(1);
    let rationale = match raw.rationale {
        Some(r) if r.chars().count() >= 100 => r,
        _ => ResearchPlan::synthesize_rationale(&research_topic, sub_topic_count),
    };

    let plan = ResearchPlan {
        research_topic,
        sub_topics: raw.sub_topics,
        research_questions: raw.research_questions,
        rationale,
    };

    Ok(StateDelta { research_plan: Some(plan), ..Default::default() })
}

#[derive(Deserialize)]
struct RawQueries {
    #[serde(default)]
    query: Vec<String>,
    #[serde(default)]
    query_display: Vec<String>,
}

pub async fn generate_query(state: &OverallState, config: &GraphConfig) -> Result<StateDelta, GraphError> {
    let plan = state
        .research_plan
        .clone()
        .ok_or_else(|| GraphError::NodeFailed { node: "generate_query", source: anyhow::anyhow!("no research plan in state") })?;

    let unanswered = state.unanswered_questions.clone();
    let mode = if unanswered.is_empty() {
        QueryMode::Initial
    } else {
        QueryMode::Targeted { unanswered_questions: &unanswered }
    };

    // Targeted mode caps at min(2 * |unanswered|, initial_search_query_count)
    // per SPEC_FULL.md §8 testable property 10.
    let max_queries = if unanswered.is_empty() {
        config.initial_query_count
    } else {
        (2 * unanswered.len()).min(config.initial_query_count)
    };

    let messages = prompts::query_writer_prompt(&plan, mode, max_queries);

    let raw: RawQueries = config
        .deps
        .llm
        .invoke(&config.session_id, "generate_query", config.model_override.as_deref(), 0.7, |handle| {
            let client = config.deps.llm.client.clone();
            let messages = messages.clone();
            async move { handle.complete_structured(&client, &messages).await }
        })
        .await?;

    let mut query = raw.query;
    query.truncate(max_queries.max(1));
    let mut query_display = raw.query_display;
    if query_display.len() != query.len() {
        query_display = query.clone();
    }

    Ok(StateDelta {
        new_search_query: Some(query),
        new_search_query_display: Some(query_display),
        ..Default::default()
    })
}

/// Runs outside the graph's sequential driver — dispatched once per new
/// query by `graph::drive`'s fan-out wave (§4.7.3).
pub async fn web_research(
    deps: &NodeDeps,
    session_id: &str,
    search_id: u32,
    query: &str,
    display_query: &str,
) -> Result<WebResearchResult, GraphError> {
    if deps.registry.is_cancelled(session_id) {
        return Err(GraphError::Cancelled);
    }

    let (pages, preformatted) = search_client::search_or_empty(&deps.search, query, 10).await;

    if deps.registry.is_cancelled(session_id) {
        return Err(GraphError::Cancelled);
    }

    let top_k = deps.config.web_scrape_top_k.min(pages.len());
    let candidate_urls: Vec<String> = pages.iter().take(top_k).map(|p| p.url.clone()).collect();

    let scraped = fetcher::fetch_many(
        &deps.http_client,
        &candidate_urls,
        std::time::Duration::from_secs(deps.config.web_scrape_timeout_secs),
        deps.config.web_scrape_concurrency,
        deps.config.web_scrape_max_per_doc_chars,
        &deps.config.web_scrape_user_agent,
    )
    .await;

    if deps.registry.is_cancelled(session_id) {
        return Err(GraphError::Cancelled);
    }

    let scraped_pages: Vec<ScrapedPage> = scraped
        .iter()
        .enumerate()
        .map(|(idx, page)| ScrapedPage {
            index: idx,
            title: pages
                .iter()
                .find(|p| p.url == page.url)
                .map(|p| p.title.clone())
                .unwrap_or_default(),
            url: page.url.clone(),
            text: page.text.clone(),
        })
        .collect();

    let context = if !scraped_pages.is_empty() {
        let mut total = 0usize;
        let mut blocks = Vec::new();
        for page in &scraped_pages {
            let block = format!("[{}] {}\nurl: {}\n{}", page.index + 1, page.title, page.url, page.text);
            if total + block.len() > deps.config.web_scrape_max_total_chars {
                break;
            }
            total += block.len();
            blocks.push(block);
        }
        blocks.join("\n\n")
    } else {
        preformatted
    };

    let messages = prompts::web_summary_prompt(display_query, &context);
    let summary_text: String = deps
        .llm
        .invoke(session_id, "web_research", None, 0.2, |handle| {
            let client = deps.llm.client.clone();
            let messages = messages.clone();
            async move { handle.complete(&client, &messages).await }
        })
        .await?;

    // Citations are resolved against the deep-scraped subset when it's
    // non-empty, otherwise against every candidate page (§4.7.3 step 5).
    let candidate_pages = if !scraped_pages.is_empty() {
        pages
            .iter()
            .filter(|p| scraped_pages.iter().any(|s| s.url == p.url))
            .cloned()
            .collect::<Vec<_>>()
    } else {
        pages.clone()
    };

    let resolved = citation::resolve_urls(&candidate_pages, search_id, &deps.config.short_url_prefix);
    let citations = citation::get_citations(&candidate_pages, &resolved, &summary_text);
    let cited_summary = citation::insert_citation_markers(&summary_text, &citations);

    let sources_gathered: Vec<Source> = citations.into_iter().flat_map(|c| c.segments).collect();
    let all_sources_gathered: Vec<Source> = candidate_pages
        .iter()
        .filter_map(|p| {
            resolved.get(&p.url).map(|short_url| Source {
                label: if !p.title.is_empty() { Source::truncated_label(&p.title) } else { Source::truncated_label(&p.site_name) },
                short_url: short_url.clone(),
                real_url: p.url.clone(),
            })
        })
        .collect();

    Ok(WebResearchResult {
        search_id,
        query: SearchQuery { search_form: query.to_string(), display_form: display_query.to_string() },
        scraped_pages,
        cited_summary,
        sources_gathered,
        all_sources_gathered,
    })
}

#[derive(Deserialize)]
struct RawReflection {
    is_sufficient: bool,
    #[serde(default)]
    knowledge_gap: String,
    #[serde(default)]
    unanswered_questions: Vec<String>,
}

pub async fn reflection(state: &OverallState, config: &GraphConfig) -> Result<StateDelta, GraphError> {
    let plan = state
        .research_plan
        .clone()
        .ok_or_else(|| GraphError::NodeFailed { node: "reflection", source: anyhow::anyhow!("no research plan in state") })?;

    // Loop count increments as reflection's first action (§4.7.4).
    let loop_count = state.research_loop_count + 1;

    let summaries = state.cited_summaries_text();
    let messages = prompts::reflection_prompt(&plan, loop_count, &summaries);

    let raw: RawReflection = config
        .deps
        .llm
        .invoke(&config.session_id, "reflection", config.model_override.as_deref(), 0.1, |handle| {
            let client = config.deps.llm.client.clone();
            let messages = messages.clone();
            async move { handle.complete_structured(&client, &messages).await }
        })
        .await?;

    let unanswered = if raw.is_sufficient { Vec::new() } else { raw.unanswered_questions };

    Ok(StateDelta {
        research_loop_count: Some(loop_count),
        unanswered_questions: Some(unanswered),
        knowledge_gap: Some(raw.knowledge_gap),
        ..Default::default()
    })
}

#[derive(Deserialize)]
struct RawQuality {
    quality_score: f64,
    #[serde(default)]
    assessment: String,
    #[serde(default)]
    gaps: Vec<String>,
}

pub async fn assess_content_quality(state: &OverallState, config: &GraphConfig) -> Result<StateDelta, GraphError> {
    let summaries = state.cited_summaries_text();
    let messages = prompts::content_quality_prompt(&summaries);

    let raw: RawQuality = config
        .deps
        .llm
        .invoke(&config.session_id, "assess_content_quality", config.model_override.as_deref(), 0.1, |handle| {
            let client = config.deps.llm.client.clone();
            let messages = messages.clone();
            async move { handle.complete_structured(&client, &messages).await }
        })
        .await?;

    Ok(StateDelta {
        content_quality: Some(QualityAssessment { quality_score: raw.quality_score, assessment: raw.assessment, gaps: raw.gaps }),
        ..Default::default()
    })
}

#[derive(Deserialize)]
struct RawFacts {
    fact_confidence: f64,
    #[serde(default)]
    assessment: String,
    #[serde(default)]
    verified_facts: Vec<String>,
    #[serde(default)]
    verified_facts_sources: Vec<String>,
    #[serde(default)]
    disputed_claims: Vec<String>,
    #[serde(default)]
    disputed_claims_reasons: Vec<String>,
}

pub async fn verify_facts(state: &OverallState, config: &GraphConfig) -> Result<StateDelta, GraphError> {
    let summaries = state.cited_summaries_text();
    let messages = prompts::fact_verification_prompt(&summaries);

    let raw: RawFacts = config
        .deps
        .llm
        .invoke(&config.session_id, "verify_facts", config.model_override.as_deref(), 0.1, |handle| {
            let client = config.deps.llm.client.clone();
            let messages = messages.clone();
            async move { handle.complete_structured(&client, &messages).await }
        })
        .await?;

    let verified_facts: Vec<VerifiedFact> = raw
        .verified_facts
        .into_iter()
        .zip(raw.verified_facts_sources.into_iter().chain(std::iter::repeat(String::new())))
        .map(|(fact, source)| VerifiedFact { fact, source })
        .collect();

    let disputed_claims: Vec<DisputedClaim> = raw
        .disputed_claims
        .into_iter()
        .zip(raw.disputed_claims_reasons.into_iter().chain(std::iter::repeat(String::new())))
        .map(|(claim, reason)| DisputedClaim { claim, reason })
        .collect();

    Ok(StateDelta {
        fact_verification: Some(FactVerification { fact_confidence: raw.fact_confidence, assessment: raw.assessment, verified_facts, disputed_claims }),
        ..Default::default()
    })
}

#[derive(Deserialize)]
struct RawRelevance {
    relevance_score: f64,
    #[serde(default)]
    content_alignment: String,
    #[serde(default)]
    off_topic: Vec<String>,
}

pub async fn assess_relevance(state: &OverallState, config: &GraphConfig) -> Result<StateDelta, GraphError> {
    let topic = state.research_plan.as_ref().map(|p| p.research_topic.clone()).unwrap_or_default();
    let summaries = state.cited_summaries_text();
    let messages = prompts::relevance_assessment_prompt(&topic, &summaries);

    let raw: RawRelevance = config
        .deps
        .llm
        .invoke(&config.session_id, "assess_relevance", config.model_override.as_deref(), 0.1, |handle| {
            let client = config.deps.llm.client.clone();
            let messages = messages.clone();
            async move { handle.complete_structured(&client, &messages).await }
        })
        .await?;

    Ok(StateDelta {
        relevance_assessment: Some(RelevanceAssessment { relevance_score: raw.relevance_score, content_alignment: raw.content_alignment, off_topic: raw.off_topic }),
        ..Default::default()
    })
}

#[derive(Deserialize)]
struct RawOptimization {
    #[serde(default)]
    key_insights: Vec<String>,
    #[serde(default)]
    actionable_items: Vec<String>,
    #[serde(default)]
    confidence_level: ConfidenceLevel,
}

pub async fn optimize_summary(state: &OverallState, config: &GraphConfig) -> Result<StateDelta, GraphError> {
    let quality = state.content_quality.clone().unwrap_or_default();
    let facts = state.fact_verification.clone().unwrap_or_default();
    let relevance = state.relevance_assessment.clone().unwrap_or_default();
    let summaries = state.cited_summaries_text();

    let messages = prompts::optimize_summary_prompt(&quality.assessment, &facts.assessment, &relevance.content_alignment, &summaries);

    let raw: RawOptimization = config
        .deps
        .llm
        .invoke(&config.session_id, "optimize_summary", config.model_override.as_deref(), 0.3, |handle| {
            let client = config.deps.llm.client.clone();
            let messages = messages.clone();
            async move { handle.complete_structured(&client, &messages).await }
        })
        .await?;

    // Mean of three independently produced scores, per SPEC_FULL.md §9's
    // "record the formula verbatim" open question.
    let final_confidence = (quality.quality_score + facts.fact_confidence + relevance.relevance_score) / 3.0;

    Ok(StateDelta {
        summary_optimization: Some(SummaryOptimization { key_insights: raw.key_insights, actionable_items: raw.actionable_items, confidence_level: raw.confidence_level }),
        final_confidence_score: Some(final_confidence),
        ..Default::default()
    })
}

/// Pure template — no LLM call (§4.7.8).
pub fn generate_verification_report(state: &OverallState, _config: &GraphConfig) -> StateDelta {
    let quality = state.content_quality.clone().unwrap_or_default();
    let facts = state.fact_verification.clone().unwrap_or_default();
    let relevance = state.relevance_assessment.clone().unwrap_or_default();
    let optimization = state.summary_optimization.clone().unwrap_or_default();

    let mut report = String::from("## Verification Report\n\n");
    report.push_str(&format!("**Content quality** ({:.2}): {}\n\n", quality.quality_score, quality.assessment));
    report.push_str(&format!("**Fact verification** ({:.2}): {}\n\n", facts.fact_confidence, facts.assessment));
    report.push_str(&format!("**Relevance** ({:.2}): {}\n\n", relevance.relevance_score, relevance.content_alignment));
    report.push_str(&format!("**Confidence level**: {:?}\n", optimization.confidence_level));

    StateDelta { verification_report: Some(report), ..Default::default() }
}

pub async fn finalize_answer(state: &OverallState, config: &GraphConfig) -> Result<StateDelta, GraphError> {
    let topic = state.research_plan.as_ref().map(|p| p.research_topic.clone()).unwrap_or_default();
    let summaries = state.cited_summaries_text();
    let optimization = state.summary_optimization.clone().unwrap_or_default();

    let messages = prompts::answer_prompt(&topic, &summaries, &optimization.key_insights, &optimization.actionable_items);

    let raw_answer: String = config
        .deps
        .llm
        .invoke(&config.session_id, "finalize_answer", config.model_override.as_deref(), 0.4, |handle| {
            let client = config.deps.llm.client.clone();
            let messages = messages.clone();
            async move { handle.complete(&client, &messages).await }
        })
        .await?;

    let all_sources = citation::dedup_sources(state.all_sources_gathered.clone());
    let (answer, cited_sources) = citation::finalize_references(&raw_answer, &all_sources);

    let markdown_report = report::render(state, &answer, &cited_sources, config.report_format);

    if cited_sources.is_empty() && !state.all_sources_gathered.is_empty() {
        warn!(session_id = %config.session_id, "finalize_answer produced no citations despite gathered sources");
    }

    Ok(StateDelta {
        answer: Some(answer),
        markdown_report: Some(markdown_report),
        final_cited_sources: Some(cited_sources),
        ..Default::default()
    })
}
