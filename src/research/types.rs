//! Data model for the deep-research pipeline (see `OverallState` for the
//! graph's working memory and its per-field reducers).

use serde::{Deserialize, Serialize};

/// One research invocation's tunables, carried in the graph `GraphConfig`
/// and echoed back in the response metadata.
#[derive(Debug, Clone)]
pub struct ResearchSession {
    pub session_id: String,
    pub original_query: String,
    pub initial_query_count: usize,
    pub max_loops: u32,
    pub reasoning_model_override: Option<String>,
    pub report_format: ReportFormat,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    Formal,
    Casual,
}

impl Default for ReportFormat {
    fn default() -> Self {
        ReportFormat::Formal
    }
}

/// A refined research agenda produced by `generate_research_plan`. Immutable
/// once built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchPlan {
    pub research_topic: String,
    pub sub_topics: Vec<String>,
    /// Each entry is prefixed with its parent sub-topic, e.g.
    /// `"Economic impact :: What drove the 2008 slowdown?"`.
    pub research_questions: Vec<String>,
    pub rationale: String,
}

pub const RESEARCH_QUESTION_DELIMITER: &str = " :: ";

impl ResearchPlan {
    /// Synthesizes a deterministic rationale when the LLM omits one or
    /// returns fewer than 100 characters — never leave the plan without a
    /// rationale, since downstream report sections quote it.
    pub fn synthesize_rationale(research_topic: &str, sub_topic_count: usize) -> String {
        format!(
            "This plan decomposes \"{research_topic}\" into {sub_topic_count} sub-topics chosen to \
             cover the breadth of the question while keeping each research thread independently \
             verifiable; the research questions under each sub-topic were drafted to surface \
             concrete, checkable facts rather than opinion, so that later fact-verification and \
             relevance-assessment passes have something specific to grade."
        )
    }
}

/// A single search query in both its search-engine form and its
/// user-facing display form.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SearchQuery {
    pub search_form: String,
    pub display_form: String,
}

/// A raw search-engine hit, before deep scraping.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WebPage {
    pub title: String,
    pub url: String,
    pub site_name: String,
    pub summary: String,
    pub crawl_date: String,
}

/// A citation entity: what a short-url in generated text resolves to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    pub label: String,
    pub short_url: String,
    pub real_url: String,
}

impl Source {
    pub const MAX_LABEL_CHARS: usize = 50;

    pub fn truncated_label(raw: &str) -> String {
        if raw.chars().count() <= Self::MAX_LABEL_CHARS {
            raw.to_string()
        } else {
            raw.chars().take(Self::MAX_LABEL_CHARS).collect()
        }
    }

    /// Dedup key used by the final aggregation pass: trailing-slash-normalized
    /// URL paired with whitespace-collapsed lowercased label.
    pub fn dedup_key(&self) -> (String, String) {
        let url = self.real_url.trim_end_matches('/').to_ascii_lowercase();
        let label = self
            .label
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_ascii_lowercase();
        (url, label)
    }
}

/// The per-`web_research` invocation result: deep-scraped pages, the cited
/// summary text, and both source lists (cited-only and all-candidates).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WebResearchResult {
    pub search_id: u32,
    pub query: SearchQuery,
    pub scraped_pages: Vec<ScrapedPage>,
    pub cited_summary: String,
    pub sources_gathered: Vec<Source>,
    pub all_sources_gathered: Vec<Source>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ScrapedPage {
    pub index: usize,
    pub title: String,
    pub url: String,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Reflection {
    pub is_sufficient: bool,
    pub knowledge_gap: String,
    pub unanswered_questions: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct QualityAssessment {
    pub quality_score: f64,
    pub assessment: String,
    pub gaps: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FactVerification {
    pub fact_confidence: f64,
    pub assessment: String,
    pub verified_facts: Vec<VerifiedFact>,
    pub disputed_claims: Vec<DisputedClaim>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct VerifiedFact {
    pub fact: String,
    pub source: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DisputedClaim {
    pub claim: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RelevanceAssessment {
    pub relevance_score: f64,
    pub content_alignment: String,
    pub off_topic: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceLevel {
    High,
    Medium,
    Low,
}

impl Default for ConfidenceLevel {
    fn default() -> Self {
        ConfidenceLevel::Medium
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SummaryOptimization {
    pub key_insights: Vec<String>,
    pub actionable_items: Vec<String>,
    pub confidence_level: ConfidenceLevel,
}

/// The graph's working memory. Each field documents its reducer (append vs
/// replace); `merge_delta` applies them. See `graph::Reducer`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OverallState {
    // --- append fields ---
    pub messages: Vec<String>,
    pub search_query: Vec<SearchQuery>,
    pub web_research_results: Vec<WebResearchResult>,
    pub sources_gathered: Vec<Source>,
    pub all_sources_gathered: Vec<Source>,

    // --- replace fields ---
    pub research_plan: Option<ResearchPlan>,
    pub research_loop_count: u32,
    pub knowledge_gap: String,
    pub unanswered_questions: Vec<String>,
    pub new_search_query: Vec<String>,
    pub new_search_query_display: Vec<String>,
    pub content_quality: Option<QualityAssessment>,
    pub fact_verification: Option<FactVerification>,
    pub relevance_assessment: Option<RelevanceAssessment>,
    pub summary_optimization: Option<SummaryOptimization>,
    pub final_confidence_score: Option<f64>,
    pub verification_report: Option<String>,
    pub answer: Option<String>,
    pub markdown_report: Option<String>,
    /// The deduplicated, definitively-cited source list derived from the
    /// final answer text by the citation resolver's end-of-pipeline pass
    /// (§4.4.4) — distinct from `sources_gathered`, which accumulates each
    /// loop's per-query citations as the research progresses.
    pub final_cited_sources: Vec<Source>,
}

impl OverallState {
    pub fn new(original_query: &str) -> Self {
        Self {
            messages: vec![original_query.to_string()],
            ..Default::default()
        }
    }

    pub fn cited_summaries_text(&self) -> String {
        self.web_research_results
            .iter()
            .map(|r| r.cited_summary.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

// --- HTTP surface DTOs ---

#[derive(Debug, Clone, Deserialize)]
pub struct DeepSearchRequest {
    pub query: String,
    #[serde(default)]
    pub initial_search_query_count: Option<usize>,
    #[serde(default)]
    pub max_research_loops: Option<u32>,
    #[serde(default)]
    pub reasoning_model: Option<String>,
    #[serde(default)]
    pub report_format: Option<ReportFormat>,
}

impl DeepSearchRequest {
    /// Range checks from §6.1's request table. Checked once, before the
    /// graph run starts (and before an SSE stream opens), so a bad request
    /// never consumes a session slot.
    pub fn validate(&self) -> Result<(), String> {
        let query_len = self.query.chars().count();
        if query_len == 0 || query_len > 8000 {
            return Err("query must be between 1 and 8000 characters".to_string());
        }
        if let Some(n) = self.initial_search_query_count {
            if !(1..=10).contains(&n) {
                return Err("initial_search_query_count must be between 1 and 10".to_string());
            }
        }
        if let Some(n) = self.max_research_loops {
            if !(1..=5).contains(&n) {
                return Err("max_research_loops must be between 1 and 5".to_string());
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DeepSource {
    pub label: String,
    pub short_url: String,
    pub real_url: String,
}

impl From<Source> for DeepSource {
    fn from(s: Source) -> Self {
        DeepSource {
            label: s.label,
            short_url: s.short_url,
            real_url: s.real_url,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DeepSearchMetadata {
    pub research_loop_count: u32,
    pub number_of_queries: usize,
    pub number_of_sources: usize,
    pub total_sources_found: usize,
    pub reasoning_model: String,
    pub system_version: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeepSearchResponse {
    pub success: bool,
    pub answer: String,
    pub markdown_report: String,
    pub sources: Vec<DeepSource>,
    pub all_sources: Vec<DeepSource>,
    pub metadata: DeepSearchMetadata,
    pub message: Option<String>,
}

/// The ~14 SSE lifecycle event kinds (see SPEC_FULL.md §6.3).
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SseEventKind {
    Started {
        query: String,
    },
    ResearchPlan {
        research_topic: String,
        sub_topics: Vec<String>,
        research_questions: Vec<String>,
        rationale: String,
    },
    QueryGenerated {
        queries: Vec<String>,
        count: usize,
        rationale: Option<String>,
    },
    WebSearching {
        message: String,
    },
    WebResult {
        sources: Vec<WebResultSource>,
        count: usize,
    },
    Reflection {
        loop_count: u32,
        is_sufficient: bool,
        knowledge_gap: String,
        unanswered_questions: Vec<String>,
    },
    QualityAssessment(QualityAssessment),
    FactVerification(FactVerification),
    RelevanceAssessment(RelevanceAssessment),
    Optimization {
        key_insights: Vec<String>,
        actionable_items: Vec<String>,
        confidence_level: ConfidenceLevel,
    },
    Progress {
        current_step: u32,
        total_steps: u32,
        completed_steps: u32,
        percentage: f64,
    },
    ReportGenerated {
        report_length: usize,
        answer_length: usize,
        sources_count: usize,
    },
    Completed(Box<DeepSearchResponse>),
    Cancelled {
        message: String,
    },
    Error {
        error: String,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct WebResultSource {
    pub title: String,
    pub url: String,
}

/// A framed SSE event: type, timestamp, per-session sequence number, and the
/// payload carried on `SseEventKind`.
#[derive(Debug, Clone, Serialize)]
pub struct SseEvent {
    #[serde(flatten)]
    pub kind: SseEventKind,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub sequence: u64,
    pub message: String,
}

impl SseEventKind {
    /// The `event:` field value sent on the wire — also used as the SSE
    /// connection monitor's logical milestone name.
    pub fn type_name(&self) -> &'static str {
        match self {
            SseEventKind::Started { .. } => "started",
            SseEventKind::ResearchPlan { .. } => "research_plan",
            SseEventKind::QueryGenerated { .. } => "query_generated",
            SseEventKind::WebSearching { .. } => "web_searching",
            SseEventKind::WebResult { .. } => "web_result",
            SseEventKind::Reflection { .. } => "reflection",
            SseEventKind::QualityAssessment(_) => "quality_assessment",
            SseEventKind::FactVerification(_) => "fact_verification",
            SseEventKind::RelevanceAssessment(_) => "relevance_assessment",
            SseEventKind::Optimization { .. } => "optimization",
            SseEventKind::Progress { .. } => "progress",
            SseEventKind::ReportGenerated { .. } => "report_generated",
            SseEventKind::Completed(_) => "completed",
            SseEventKind::Cancelled { .. } => "cancelled",
            SseEventKind::Error { .. } => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_request(query: &str) -> DeepSearchRequest {
        DeepSearchRequest {
            query: query.to_string(),
            initial_search_query_count: None,
            max_research_loops: None,
            reasoning_model: None,
            report_format: None,
        }
    }

    #[test]
    fn empty_query_is_rejected() {
        assert!(base_request("").validate().is_err());
    }

    #[test]
    fn oversized_query_is_rejected() {
        let request = base_request(&"a".repeat(8001));
        assert!(request.validate().is_err());
    }

    #[test]
    fn query_at_the_bound_is_accepted() {
        let request = base_request(&"a".repeat(8000));
        assert!(request.validate().is_ok());
    }

    #[test]
    fn out_of_range_loop_count_is_rejected() {
        let mut request = base_request("ok");
        request.max_research_loops = Some(6);
        assert!(request.validate().is_err());
        request.max_research_loops = Some(0);
        assert!(request.validate().is_err());
    }

    #[test]
    fn out_of_range_query_count_is_rejected() {
        let mut request = base_request("ok");
        request.initial_search_query_count = Some(11);
        assert!(request.validate().is_err());
    }

    #[test]
    fn in_range_values_are_accepted() {
        let mut request = base_request("ok");
        request.initial_search_query_count = Some(3);
        request.max_research_loops = Some(5);
        assert!(request.validate().is_ok());
    }
}
