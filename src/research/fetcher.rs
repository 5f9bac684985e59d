//! C1 — concurrent web-page fetch + main-content extraction + truncation.
//!
//! Grounded on `original_source/app/services/web_scraper.py`'s
//! `fetch_html_batch`/`extract_main_text`/`clean_and_truncate`, expressed
//! with the teacher's `reqwest` + `scraper`/`readability` stack.

use std::sync::Arc;
use std::time::Duration;

use scraper::{Html, Selector};
use tokio::sync::Semaphore;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub url: String,
    pub text: String,
}

/// Fetches every URL with `concurrency` in-flight requests at a time.
/// Individual failures are silent (warning-level); the batch never fails
/// as a whole. Returns entries in input order for the caller that
/// preserved them, filtering out URLs whose text extraction is empty.
pub async fn fetch_many(
    client: &reqwest::Client,
    urls: &[String],
    timeout: Duration,
    concurrency: usize,
    per_doc_char_cap: usize,
    user_agent: &str,
) -> Vec<FetchedPage> {
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut tasks = Vec::with_capacity(urls.len());

    for (index, url) in urls.iter().cloned().enumerate() {
        let client = client.clone();
        let semaphore = Arc::clone(&semaphore);
        let user_agent = user_agent.to_string();
        tasks.push(tokio::spawn(async move {
            let _permit = semaphore.acquire().await.expect("semaphore closed");
            let text = fetch_one(&client, &url, timeout, &user_agent, per_doc_char_cap).await;
            (index, url, text)
        }));
    }

    let mut slots: Vec<Option<FetchedPage>> = vec![None; tasks.len()];
    for task in tasks {
        match task.await {
            Ok((index, url, Some(text))) => slots[index] = Some(FetchedPage { url, text }),
            Ok((_, url, None)) => warn!(url, "fetch yielded no usable text"),
            Err(e) => warn!(error = %e, "fetch task panicked"),
        }
    }

    slots.into_iter().flatten().collect()
}

async fn fetch_one(
    client: &reqwest::Client,
    url: &str,
    timeout: Duration,
    user_agent: &str,
    per_doc_char_cap: usize,
) -> Option<String> {
    let resp = match client
        .get(url)
        .timeout(timeout)
        .header("User-Agent", user_agent)
        .send()
        .await
    {
        Ok(r) => r,
        Err(e) => {
            warn!(url, error = %e, "fetch request failed");
            return None;
        }
    };

    if !resp.status().is_success() {
        warn!(url, status = %resp.status(), "fetch returned non-2xx");
        return None;
    }

    let content_type = resp
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    if !content_type.contains("text/html") {
        warn!(url, content_type, "skipping non-HTML content-type");
        return None;
    }

    let body = match resp.text().await {
        Ok(b) => b,
        Err(e) => {
            warn!(url, error = %e, "failed reading response body");
            return None;
        }
    };

    let extracted = extract_main_text(&body, url);
    if extracted.trim().is_empty() {
        return None;
    }

    Some(clean_and_truncate(&extracted, per_doc_char_cap))
}

/// Readability-first extraction with an `<article>`/`<p>` fallback when the
/// readability result is under 100 characters.
fn extract_main_text(html: &str, url: &str) -> String {
    if let Ok(parsed_url) = url::Url::parse(url) {
        if let Ok(mut readable) = readability::extractor::extract(&mut std::io::Cursor::new(html), &parsed_url) {
            let text = readable.text.trim().to_string();
            if text.chars().count() >= 100 {
                return text;
            }
            readable.text = text;
        }
    }

    let document = Html::parse_document(html);
    if let Ok(article_selector) = Selector::parse("article") {
        let article_text: String = document
            .select(&article_selector)
            .flat_map(|el| el.text())
            .collect::<Vec<_>>()
            .join(" ");
        if article_text.chars().count() >= 100 {
            return article_text;
        }
    }

    if let Ok(p_selector) = Selector::parse("p") {
        document
            .select(&p_selector)
            .flat_map(|el| el.text())
            .collect::<Vec<_>>()
            .join(" ")
    } else {
        String::new()
    }
}

/// Collapses whitespace, drops blank lines, and truncates to `cap`
/// characters, preferring to cut at the last sentence-ending punctuation
/// or whitespace within the tail 20% of the cap.
pub fn clean_and_truncate(text: &str, cap: usize) -> String {
    let collapsed = text
        .lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n");

    let char_count = collapsed.chars().count();
    if char_count <= cap {
        return collapsed;
    }

    let truncated: String = collapsed.chars().take(cap).collect();
    let tail_start = cap.saturating_sub(cap / 5); // last 20% of the cap

    let chars: Vec<char> = truncated.chars().collect();
    for i in (tail_start..chars.len()).rev() {
        let c = chars[i];
        if matches!(c, '.' | '!' | '?' | ' ' | '\n') {
            return chars[..=i].iter().collect::<String>().trim_end().to_string();
        }
    }

    truncated
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncation_respects_cap() {
        let text = "Sentence one. Sentence two. Sentence three. Sentence four. Sentence five.";
        let truncated = clean_and_truncate(text, 40);
        assert!(truncated.chars().count() <= 40);
    }

    #[test]
    fn truncation_prefers_sentence_boundary_in_tail() {
        let text = "A".repeat(30) + ". " + &"B".repeat(30);
        let truncated = clean_and_truncate(&text, 40);
        // Cutting at 40 chars lands inside the "B" run; the tail-20% search
        // (chars 32..40) should find the ". " boundary at index 31 instead.
        assert!(truncated.ends_with('.'));
    }

    #[test]
    fn short_text_is_untouched() {
        let text = "short text";
        assert_eq!(clean_and_truncate(text, 1000), "short text");
    }

    #[test]
    fn collapses_blank_lines_and_internal_whitespace() {
        let text = "line one   has   gaps\n\n\nline two";
        let cleaned = clean_and_truncate(text, 1000);
        assert_eq!(cleaned, "line one has gaps\nline two");
    }
}
