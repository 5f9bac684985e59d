//! Prompt templates for each LLM-calling node.
//!
//! These are inputs to the pipeline, not the object of this spec (§1
//! Non-goals: "authoring new prompts"). The structure below — what each
//! node asks for and in what output shape — mirrors
//! `original_source/app/services/deepsearch_prompts.py`'s
//! `research_plan_instructions`, `query_writer_instructions`,
//! `reflection_instructions`, `answer_instructions`, and the three QA
//! instruction blocks; the English wording is freshly authored, not a
//! translation.

use chrono::Utc;

use super::llm::ChatMessage;
use super::types::ResearchPlan;

fn current_date() -> String {
    Utc::now().format("%B %-d, %Y").to_string()
}

pub fn research_plan_prompt(research_topic: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(
            "You are a senior research analyst. Decompose the given topic into a structured \
             research agenda: 3-5 sub-topics, each with 3-4 specific research questions that \
             would let a later fact-check pass verify concrete claims. Respond with strict JSON: \
             {\"research_topic\": string, \"sub_topics\": [string], \"research_questions\": \
             [\"<sub-topic>: <question>\", ...], \"rationale\": string (at least 100 characters, \
             explaining why these sub-topics and questions give full coverage)}.",
        ),
        ChatMessage::user(format!("Research topic:\n{research_topic}")),
    ]
}

pub enum QueryMode<'a> {
    Initial,
    Targeted { unanswered_questions: &'a [String] },
}

pub fn query_writer_prompt(plan: &ResearchPlan, mode: QueryMode<'_>, max_queries: usize) -> Vec<ChatMessage> {
    let mode_instruction = match mode {
        QueryMode::Initial => {
            "Generate up to the requested number of diverse web-search queries that together \
             cover the full research plan. Prefer a single well-targeted query unless the topic \
             genuinely needs more than one angle."
                .to_string()
        }
        QueryMode::Targeted { unanswered_questions } => format!(
            "The previous round left these research questions unanswered:\n{}\n\
             Generate 1-2 queries per unanswered question, and do not generate queries outside \
             this list.",
            unanswered_questions
                .iter()
                .map(|q| format!("- {q}"))
                .collect::<Vec<_>>()
                .join("\n")
        ),
    };

    vec![
        ChatMessage::system(format!(
            "You generate web-search queries for an automated research tool. {mode_instruction}\n\
             Do not produce more than {max_queries} queries. The current date is {date}.\n\
             Respond with strict JSON: {{\"rationale\": string, \"query\": [string], \
             \"query_display\": [string]}} — \"query\" holds the search-engine form (English \
             preferred), \"query_display\" the user-facing form; both lists must be the same \
             length.",
            date = current_date()
        )),
        ChatMessage::user(format!(
            "Research plan:\nTopic: {}\nSub-topics: {}\nQuestions: {}",
            plan.research_topic,
            plan.sub_topics.join("; "),
            plan.research_questions.join("; ")
        )),
    ]
}

pub fn web_summary_prompt(query: &str, context: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(
            "Write a grounded summary of the search results below. Cite every fact with its \
             source index in brackets, e.g. [1], matching the numbering in the context. Only \
             state what the sources actually say — never invent information.",
        ),
        ChatMessage::user(format!("Query: {query}\n\nSources:\n{context}")),
    ]
}

pub fn reflection_prompt(plan: &ResearchPlan, loop_count: u32, summaries: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(format!(
            "You are a rigorous research evaluator. Compare the collected summaries against \
             every research question in the plan below and decide whether they are sufficient \
             to write a complete, well-supported report. This is research loop {loop_count}: at \
             loop 1, lean toward insufficient unless the topic is trivial; from loop 2 onward, \
             lean toward sufficient once the core questions are covered with concrete detail. \
             List any research question (verbatim, exactly as written in the plan) that remains \
             inadequately answered.\n\
             Research plan questions:\n{questions}\n\
             Respond with strict JSON: {{\"is_sufficient\": bool, \"knowledge_gap\": string, \
             \"unanswered_questions\": [string]}}.",
            questions = plan.research_questions.join("\n")
        )),
        ChatMessage::user(format!("Collected summaries:\n{summaries}")),
    ]
}

pub fn content_quality_prompt(summaries: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(
            "Assess the overall quality and reliability of the research content below. Respond \
             with strict JSON: {\"quality_score\": number in [0,1], \"assessment\": string, \
             \"gaps\": [string]}.",
        ),
        ChatMessage::user(summaries.to_string()),
    ]
}

pub fn fact_verification_prompt(summaries: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(
            "Verify the factual claims in the research content below against the sources cited \
             in it. Respond with strict JSON: {\"fact_confidence\": number in [0,1], \
             \"assessment\": string, \"verified_facts\": [string], \"verified_facts_sources\": \
             [string], \"disputed_claims\": [string], \"disputed_claims_reasons\": [string]} — \
             the two verified-facts lists and the two disputed-claims lists are parallel arrays \
             of equal length.",
        ),
        ChatMessage::user(summaries.to_string()),
    ]
}

pub fn relevance_assessment_prompt(research_topic: &str, summaries: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(format!(
            "Assess how well the research content below stays on-topic for \"{research_topic}\". \
             Respond with strict JSON: {{\"relevance_score\": number in [0,1], \
             \"content_alignment\": string, \"off_topic\": [string]}}."
        )),
        ChatMessage::user(summaries.to_string()),
    ]
}

pub fn optimize_summary_prompt(
    quality_assessment: &str,
    fact_assessment: &str,
    relevance_assessment: &str,
    summaries: &str,
) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(
            "Given the quality, fact-verification, and relevance assessments below, extract the \
             most important takeaways from the research. Respond with strict JSON: \
             {\"key_insights\": [string] (5 to 10 items), \"actionable_items\": [string] (3 to 5 \
             items), \"confidence_level\": \"high\"|\"medium\"|\"low\"}.",
        ),
        ChatMessage::user(format!(
            "Quality assessment:\n{quality_assessment}\n\nFact verification:\n{fact_assessment}\n\n\
             Relevance assessment:\n{relevance_assessment}\n\nResearch summaries:\n{summaries}"
        )),
    ]
}

pub fn answer_prompt(research_topic: &str, summaries: &str, key_insights: &[String], actionable_items: &[String]) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(format!(
            "You are a senior analyst writing a professional, data-driven research report. Tone: \
             formal, objective, third person — never \"I\" or \"we\". Organize the findings so \
             every section is self-contained and every claim in the body is backed by a cited \
             source using [N] markers that match the numbering already present in the research \
             material. The current date is {date}.",
            date = current_date()
        )),
        ChatMessage::user(format!(
            "Research topic:\n{research_topic}\n\n\
             Research material (summaries with citations):\n{summaries}\n\n\
             Key insights to weave in:\n{insights}\n\n\
             Actionable recommendations to weave in:\n{items}\n\n\
             Write the full report now.",
            insights = key_insights.join("\n- "),
            items = actionable_items.join("\n- ")
        )),
    ]
}
