//! Ambient §4.10 — renders the ~nine-section formal Markdown report (or,
//! for `casual` format, just the cited answer plus references).
//!
//! Grounded on `original_source/app/services/report_generator.py`'s
//! `generate_formal_report` and its `_format_*` helpers: the section
//! structure, numbered headings, and the quality-metrics derivation
//! formula are preserved; the section prose below is freshly authored
//! English, not a translation.

use chrono::Utc;

use super::types::{OverallState, ReportFormat, Source};

pub fn render(state: &OverallState, answer: &str, sources: &[Source], format: ReportFormat) -> String {
    match format {
        ReportFormat::Casual => render_casual(answer, sources),
        ReportFormat::Formal => render_formal(state, answer, sources),
    }
}

fn render_casual(answer: &str, sources: &[Source]) -> String {
    let mut out = answer.to_string();
    if !out.contains("## References") && !sources.is_empty() {
        out.push_str("\n\n## References\n\n");
        for (idx, source) in sources.iter().enumerate() {
            out.push_str(&format!("{}. [{}]({})\n", idx + 1, source.label, source.real_url));
        }
    }
    out
}

fn render_formal(state: &OverallState, answer: &str, sources: &[Source]) -> String {
    let topic = state.research_plan.as_ref().map(|p| p.research_topic.as_str()).unwrap_or("Untitled research");
    let generated_at = Utc::now().format("%Y-%m-%d %H:%M:%S UTC");
    let optimization = state.summary_optimization.clone().unwrap_or_default();
    let quality = state.content_quality.clone().unwrap_or_default();
    let facts = state.fact_verification.clone().unwrap_or_default();
    let relevance = state.relevance_assessment.clone().unwrap_or_default();

    let mut md = String::new();

    // 1. Title block
    md.push_str(&format!("# {topic} — Research Report\n\n"));
    md.push_str(&format!(
        "**Report ID**: DR-{}  \n**Generated**: {generated_at}  \n**Confidence level**: {:?}\n\n---\n\n",
        Utc::now().format("%Y%m%d"),
        optimization.confidence_level
    ));

    // 2. Executive summary
    md.push_str("## Executive Summary\n\n");
    md.push_str(&executive_summary(answer, &optimization));
    md.push_str("\n\n---\n\n");

    // 3. Background & objectives
    md.push_str("## 1. Background & Objectives\n\n");
    md.push_str(&format!(
        "This report addresses \"{topic}\" through systematic collection and analysis of \
         publicly available sources, aiming to provide a thorough and verifiable answer.\n\n"
    ));
    md.push_str("### Scope\n\n");
    md.push_str(&format_sub_topics(state));
    md.push_str("\n\n---\n\n");

    // 4. Research approach
    md.push_str("## 2. Research Approach\n\n");
    md.push_str("### Research Areas\n\n");
    md.push_str(&format_research_areas(state));
    md.push_str("\n\n### Research Questions\n\n");
    md.push_str(&format_research_questions(state));
    md.push_str("\n\n---\n\n");

    // 5. Findings
    md.push_str("## 3. Findings\n\n");
    md.push_str(answer);
    md.push_str("\n\n---\n\n");

    // 6. Evaluation
    md.push_str("## 4. Evaluation\n\n");
    md.push_str("### Key Insights\n\n");
    md.push_str(&format_bullet_block(&optimization.key_insights, "No key insights were extracted."));
    md.push_str("\n\n### Recommended Actions\n\n");
    md.push_str(&format_bullet_block(&optimization.actionable_items, "No actionable items were extracted."));
    md.push_str("\n\n---\n\n");

    // 7. Quality assurance
    md.push_str("## 5. Quality Assurance\n\n");
    md.push_str(&quality_metrics_table(quality.quality_score, relevance.relevance_score, &quality.assessment, &relevance.content_alignment));
    md.push_str("\n\n### Fact Verification\n\n");
    md.push_str(&format_fact_verification(&facts));
    md.push_str("\n\n### Confidence Rating\n\n");
    md.push_str(&confidence_rating(optimization.confidence_level, quality.quality_score));
    md.push_str("\n\n---\n\n");

    // 8. References
    md.push_str("## 6. References\n\n");
    md.push_str(&format_references(sources));
    md.push_str("\n\n---\n\n");

    // 9. Appendix
    md.push_str("## Appendix: Research Process\n\n");
    md.push_str(&format!(
        "- Research loops completed: {}\n- Search queries issued: {}\n- Sources consulted: {}\n",
        state.research_loop_count,
        state.search_query.len(),
        state.all_sources_gathered.len(),
    ));

    md
}

fn executive_summary(answer: &str, optimization: &super::types::SummaryOptimization) -> String {
    let base: String = answer.chars().take(200).collect();
    if let Some(first) = optimization.key_insights.first() {
        format!("{base}... Key finding: {first}")
    } else {
        base
    }
}

fn format_sub_topics(state: &OverallState) -> String {
    match state.research_plan.as_ref().filter(|p| !p.sub_topics.is_empty()) {
        Some(plan) => plan.sub_topics.iter().enumerate().map(|(i, t)| format!("{}. {t}", i + 1)).collect::<Vec<_>>().join("\n"),
        None => "(no sub-topics were generated)".to_string(),
    }
}

fn format_research_areas(state: &OverallState) -> String {
    match state.research_plan.as_ref().filter(|p| !p.sub_topics.is_empty()) {
        Some(plan) => plan
            .sub_topics
            .iter()
            .enumerate()
            .map(|(i, t)| format!("**Area {}: {t}**\n\nInvestigated through multi-source search and cross-verification.", i + 1))
            .collect::<Vec<_>>()
            .join("\n\n"),
        None => "(no research areas were generated)".to_string(),
    }
}

fn format_research_questions(state: &OverallState) -> String {
    match state.research_plan.as_ref().filter(|p| !p.research_questions.is_empty()) {
        Some(plan) => plan.research_questions.iter().enumerate().map(|(i, q)| format!("{}. {q}", i + 1)).collect::<Vec<_>>().join("\n"),
        None => "(no research questions were generated)".to_string(),
    }
}

fn format_bullet_block(items: &[String], empty_message: &str) -> String {
    if items.is_empty() {
        return format!("({empty_message})");
    }
    items.iter().map(|item| format!("- {item}")).collect::<Vec<_>>().join("\n")
}

/// Derives completeness/reliability from the quality score and averages
/// all four into an overall score — the exact formula from
/// `report_generator.py`'s `_format_quality_metrics`
/// (`completeness = quality * 0.9`, `reliability = quality * 0.95`).
fn quality_metrics_table(quality_score: f64, relevance_score: f64, quality_note: &str, relevance_note: &str) -> String {
    let completeness_score = quality_score * 0.9;
    let reliability_score = quality_score * 0.95;
    let overall_score = (quality_score + relevance_score + completeness_score + reliability_score) / 4.0;

    format!(
        "| Dimension | Score | Note |\n|---|---|---|\n\
         | Content quality | {quality_score:.2} | {quality_note} |\n\
         | Information completeness | {completeness_score:.2} | Derived from content quality |\n\
         | Source reliability | {reliability_score:.2} | Derived from content quality |\n\
         | Relevance | {relevance_score:.2} | {relevance_note} |\n\n\
         **Overall score**: {overall_score:.2}/1.0"
    )
}

fn format_fact_verification(facts: &super::types::FactVerification) -> String {
    let mut out = String::from("**Verified facts**:\n\n");
    if facts.verified_facts.is_empty() {
        out.push_str("(no facts were independently verified)\n");
    } else {
        for (idx, fact) in facts.verified_facts.iter().take(5).enumerate() {
            out.push_str(&format!("{}. {} ({})\n", idx + 1, fact.fact, fact.source));
        }
    }
    out.push_str("\n**Disputed or unverified claims**:\n\n");
    if facts.disputed_claims.is_empty() {
        out.push_str("(no disputed claims were identified)\n");
    } else {
        for (idx, claim) in facts.disputed_claims.iter().take(3).enumerate() {
            out.push_str(&format!("{}. {} — {}\n", idx + 1, claim.claim, claim.reason));
        }
    }
    out.trim_end().to_string()
}

fn confidence_rating(level: super::types::ConfidenceLevel, quality_score: f64) -> String {
    let rationale = if quality_score >= 0.8 {
        "The research draws on multiple reliable sources with cross-verified findings; core conclusions carry high confidence."
    } else if quality_score >= 0.6 {
        "The research covers the primary sources and its core conclusions are verified, though some details would benefit from further confirmation."
    } else {
        "The research offers a preliminary answer from a limited set of sources; further investigation is recommended before acting on it."
    };
    format!("- **Overall confidence**: {level:?}\n- **Rationale**: {rationale}")
}

fn format_references(sources: &[Source]) -> String {
    if sources.is_empty() {
        return "(no external sources were cited in this research)".to_string();
    }
    sources.iter().enumerate().map(|(idx, s)| format!("{}. [{}]({})", idx + 1, s.label, s.real_url)).collect::<Vec<_>>().join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::research::types::{ConfidenceLevel, SummaryOptimization};

    #[test]
    fn formal_report_includes_all_nine_sections() {
        let mut state = OverallState::new("test query");
        state.summary_optimization = Some(SummaryOptimization {
            key_insights: vec!["insight one".into()],
            actionable_items: vec!["do this".into()],
            confidence_level: ConfidenceLevel::High,
        });
        let sources = vec![Source { label: "Src".into(), short_url: "ref/1-0".into(), real_url: "https://example.com".into() }];
        let report = render(&state, "The answer body.", &sources, ReportFormat::Formal);

        for heading in ["Executive Summary", "Background & Objectives", "Research Approach", "Findings", "Evaluation", "Quality Assurance", "References", "Appendix"] {
            assert!(report.contains(heading), "missing section: {heading}");
        }
    }

    #[test]
    fn casual_report_has_no_section_scaffolding() {
        let sources = vec![Source { label: "Src".into(), short_url: "ref/1-0".into(), real_url: "https://example.com".into() }];
        let report = render_casual("The cited answer [1].", &sources);
        assert!(!report.contains("## 1. Background"));
        assert!(report.contains("## References"));
    }

    #[test]
    fn quality_metrics_formula_matches_spec() {
        let table = quality_metrics_table(0.8, 0.6, "q", "r");
        assert!(table.contains("0.72")); // completeness = 0.8 * 0.9
        assert!(table.contains("0.76")); // reliability = 0.8 * 0.95
    }
}
