//! C4 — short-url allocation, citation extraction/insertion, and the final
//! reference-list pass.
//!
//! Grounded on `original_source/app/services/deepsearch_utils.py`'s
//! `resolve_urls`, `get_citations_from_bocha`, `insert_citation_markers`.
//! The scanner pattern order and the end-of-text fallback are preserved
//! verbatim per SPEC_FULL.md §9's open question.

use std::collections::HashMap;

use regex::Regex;

use super::types::{Source, WebPage};

/// One citation anchor found in LLM text: an offset range plus the source
/// segments that should be rendered there.
#[derive(Debug, Clone)]
pub struct CitationRecord {
    pub start: usize,
    pub end: usize,
    pub segments: Vec<Source>,
}

/// Allocates a synthetic short-url for each candidate page, keyed by its
/// real url. Stable within one web-research invocation (`search_id`).
pub fn resolve_urls(pages: &[WebPage], search_id: u32, short_url_prefix: &str) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for (idx, page) in pages.iter().enumerate() {
        if page.url.is_empty() || map.contains_key(&page.url) {
            continue;
        }
        map.insert(page.url.clone(), format!("{short_url_prefix}/{search_id}-{idx}"));
    }
    map
}

/// Scans `text` for a reference to each candidate page — `[N]`,
/// `[citation N]`, `citation N`, `source N`, the raw url, or the title —
/// in that priority order. A page with no match anchors at end-of-text so
/// it still appears in the references (SPEC_FULL.md §9 open question:
/// this can anchor an uncited-looking marker at the very end).
pub fn get_citations(pages: &[WebPage], resolved_urls: &HashMap<String, String>, text: &str) -> Vec<CitationRecord> {
    let mut citations = Vec::new();
    if pages.is_empty() || text.is_empty() {
        return citations;
    }

    for (idx, page) in pages.iter().enumerate() {
        let n = idx + 1;
        let Some(short_url) = resolved_urls.get(&page.url) else {
            continue;
        };
        if page.url.is_empty() {
            continue;
        }

        let patterns = [
            format!(r"\[{n}\]"),
            format!(r"\[citation\s*{n}\]"),
            format!(r"citation\s*{n}\b"),
            format!(r"source\s*{n}\b"),
        ];

        let mut found: Option<(usize, usize)> = None;
        for pat in &patterns {
            if let Ok(re) = Regex::new(&format!("(?i){pat}")) {
                if let Some(m) = re.find(text) {
                    found = Some((m.start(), m.end()));
                    break;
                }
            }
        }

        if found.is_none() {
            if let Some(pos) = text.rfind(&page.url) {
                found = Some((pos, pos + page.url.len()));
            } else if !page.title.is_empty() {
                let lower_text = text.to_lowercase();
                let lower_title = page.title.to_lowercase();
                if let Some(pos) = lower_text.rfind(&lower_title) {
                    found = Some((pos, pos + page.title.len()));
                }
            }
        }

        let (start, end) = found.unwrap_or((text.len(), text.len()));

        let label = if !page.title.is_empty() {
            Source::truncated_label(&page.title)
        } else if !page.site_name.is_empty() {
            Source::truncated_label(&page.site_name)
        } else {
            format!("source {n}")
        };

        citations.push(CitationRecord {
            start,
            end,
            segments: vec![Source {
                label,
                short_url: short_url.clone(),
                real_url: page.url.clone(),
            }],
        });
    }

    citations
}

/// Re-scans `text` and inserts ` [label](short_url)` at each citation's
/// end offset, processing in descending `(end, start)` order so earlier
/// offsets stay valid as the string grows.
pub fn insert_citation_markers(text: &str, citations: &[CitationRecord]) -> String {
    let mut sorted: Vec<&CitationRecord> = citations.iter().collect();
    sorted.sort_by(|a, b| b.end.cmp(&a.end).then(b.start.cmp(&a.start)));

    let mut modified = text.to_string();
    for citation in sorted {
        let marker: String = citation
            .segments
            .iter()
            .map(|s| format!(" [{}]({})", s.label, s.short_url))
            .collect();
        let end = citation.end.min(modified.len());
        modified.insert_str(end, &marker);
    }
    modified
}

/// Matches a references/sources heading in any of the languages the
/// original engine's reports could be generated in.
fn references_heading_regex() -> Regex {
    Regex::new(r"(?im)^#{1,6}\s*(references|参考|来源|引用|参考资料)").unwrap()
}

/// Scans `[N]` markers in `report` and returns the deduped, ordered list
/// of cited sources (matched by the numeric suffix of their short-url
/// against `all_sources`), rewriting the report's short-urls to real-urls
/// and appending a references section if one isn't already present.
///
/// Idempotent: running this twice on its own output is a no-op — the
/// second pass finds no short-urls left to rewrite and a references
/// heading already present, so it does not duplicate the section.
pub fn finalize_references(report: &str, all_sources: &[Source]) -> (String, Vec<Source>) {
    let n_marker = Regex::new(r"\[(\d+)\]").unwrap();
    let by_suffix: HashMap<u64, &Source> = all_sources
        .iter()
        .filter_map(|s| short_url_suffix(&s.short_url).map(|n| (n, s)))
        .collect();

    let mut seen = std::collections::HashSet::new();
    let mut cited: Vec<Source> = Vec::new();
    for cap in n_marker.captures_iter(report) {
        if let Ok(n) = cap[1].parse::<u64>() {
            if let Some(source) = by_suffix.get(&n) {
                let key = source.dedup_key();
                if seen.insert(key) {
                    cited.push((*source).clone());
                }
            }
        }
    }

    let mut rewritten = report.to_string();
    for source in all_sources {
        rewritten = rewritten.replace(&source.short_url, &source.real_url);
    }

    if !references_heading_regex().is_match(&rewritten) && !cited.is_empty() {
        let mut section = String::from("\n\n## References\n\n");
        for (idx, source) in cited.iter().enumerate() {
            section.push_str(&format!("{}. [{}]({})\n", idx + 1, source.label, source.real_url));
        }
        rewritten.push_str(&section);
    }

    (rewritten, cited)
}

/// Extracts the trailing integer from `<prefix>/<search_id>-<idx>` short-urls.
/// This is a citation *display* number, not `search_id`/`idx` directly — the
/// caller is responsible for assigning those display numbers before they
/// appear as `[N]` in LLM text; here we just parse back out whatever
/// trailing digits are present.
fn short_url_suffix(short_url: &str) -> Option<u64> {
    short_url
        .rsplit(|c: char| !c.is_ascii_digit())
        .next()
        .filter(|s| !s.is_empty())
        .and_then(|s| s.parse().ok())
}

/// Deduplicates a source list by (normalized url, normalized label),
/// keeping the first occurrence — used for both `sources` and
/// `all_sources` in the final HTTP response.
pub fn dedup_sources(sources: impl IntoIterator<Item = Source>) -> Vec<Source> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for source in sources {
        if seen.insert(source.dedup_key()) {
            out.push(source);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(title: &str, url: &str) -> WebPage {
        WebPage {
            title: title.to_string(),
            url: url.to_string(),
            site_name: "example.com".to_string(),
            summary: "summary".to_string(),
            crawl_date: "2026-01-01".to_string(),
        }
    }

    #[test]
    fn resolve_urls_assigns_stable_indices() {
        let pages = vec![page("A", "https://a.example"), page("B", "https://b.example")];
        let map = resolve_urls(&pages, 3, "ref");
        assert_eq!(map.get("https://a.example").unwrap(), "ref/3-0");
        assert_eq!(map.get("https://b.example").unwrap(), "ref/3-1");
    }

    #[test]
    fn get_citations_matches_bracket_number() {
        let pages = vec![page("Paris facts", "https://a.example")];
        let map = resolve_urls(&pages, 1, "ref");
        let text = "Paris is the capital of France [1].";
        let citations = get_citations(&pages, &map, text);
        assert_eq!(citations.len(), 1);
        assert!(citations[0].start < citations[0].end);
    }

    #[test]
    fn uncited_page_anchors_at_end_of_text() {
        let pages = vec![page("Unrelated", "https://c.example")];
        let map = resolve_urls(&pages, 1, "ref");
        let text = "Nothing here mentions the source.";
        let citations = get_citations(&pages, &map, text);
        assert_eq!(citations[0].start, text.len());
        assert_eq!(citations[0].end, text.len());
    }

    #[test]
    fn insert_citation_markers_descending_order_keeps_offsets_valid() {
        let pages = vec![page("First", "https://a.example"), page("Second", "https://b.example")];
        let map = resolve_urls(&pages, 1, "ref");
        let text = "First fact [1]. Second fact [2].";
        let citations = get_citations(&pages, &map, text);
        let result = insert_citation_markers(text, &citations);
        assert!(result.contains("[First](ref/1-0)"));
        assert!(result.contains("[Second](ref/1-1)"));
    }

    #[test]
    fn finalize_references_dedupes_and_appends_section() {
        let sources = vec![
            Source { label: "Foo — Wikipedia".into(), short_url: "ref/1-0".into(), real_url: "https://en.wikipedia.org/foo".into() },
            Source { label: "foo   —  wikipedia".into(), short_url: "ref/2-0".into(), real_url: "https://en.wikipedia.org/foo/".into() },
        ];
        let report = "Some facts [1]. More facts [1].";
        let (rewritten, cited) = finalize_references(report, &sources);
        assert_eq!(cited.len(), 1);
        assert!(rewritten.contains("## References"));
        assert!(!rewritten.contains("ref/1-0"));
    }

    #[test]
    fn finalize_references_is_idempotent() {
        let sources = vec![Source { label: "A".into(), short_url: "ref/1-0".into(), real_url: "https://a.example".into() }];
        let report = "fact [1].";
        let (once, _) = finalize_references(report, &sources);
        let (twice, cited_twice) = finalize_references(&once, &sources);
        assert_eq!(once, twice);
        assert_eq!(cited_twice.len(), 1);
    }

    #[test]
    fn dedup_sources_suppresses_case_and_slash_variants() {
        let sources = vec![
            Source { label: "Foo — Wikipedia".into(), short_url: "a".into(), real_url: "https://en.wikipedia.org/foo".into() },
            Source { label: "foo   —  wikipedia".into(), short_url: "b".into(), real_url: "https://en.wikipedia.org/foo/".into() },
        ];
        let deduped = dedup_sources(sources);
        assert_eq!(deduped.len(), 1);
    }
}
