//! C2 — search provider client.
//!
//! Wire shape grounded on `bocha_web_search` in the original engine:
//! `POST {query, freshness: "noLimit", summary: true, count}`, response
//! `{code, msg, data: {webPages: {value: [...]}}}`.

use tracing::warn;

use super::config::ResearchConfig;
use super::errors::SearchError;
use super::types::WebPage;

#[derive(serde::Serialize)]
struct SearchRequestBody<'a> {
    query: &'a str,
    freshness: &'static str,
    summary: bool,
    count: usize,
}

#[derive(serde::Deserialize)]
struct SearchResponseBody {
    code: i64,
    msg: Option<String>,
    data: Option<SearchResponseData>,
}

#[derive(serde::Deserialize)]
struct SearchResponseData {
    #[serde(rename = "webPages")]
    web_pages: Option<WebPagesEnvelope>,
}

#[derive(serde::Deserialize)]
struct WebPagesEnvelope {
    value: Vec<RawWebPage>,
}

#[derive(serde::Deserialize)]
struct RawWebPage {
    #[serde(rename = "name")]
    name: Option<String>,
    url: Option<String>,
    #[serde(alias = "summary")]
    snippet: Option<String>,
    #[serde(rename = "siteName")]
    site_name: Option<String>,
    #[serde(rename = "dateLastCrawled")]
    date_last_crawled: Option<String>,
}

impl From<RawWebPage> for WebPage {
    fn from(raw: RawWebPage) -> Self {
        WebPage {
            title: raw.name.unwrap_or_default(),
            url: raw.url.unwrap_or_default(),
            summary: raw.snippet.unwrap_or_default(),
            site_name: raw.site_name.unwrap_or_default(),
            crawl_date: raw.date_last_crawled.unwrap_or_default(),
        }
    }
}

pub struct SearchClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl SearchClient {
    pub fn new(client: reqwest::Client, config: &ResearchConfig) -> Self {
        Self {
            client,
            base_url: config.search_provider_base_url.clone(),
            api_key: config.search_provider_api_key.clone(),
        }
    }

    /// Returns candidate pages plus a preformatted fallback text (each page
    /// rendered as a `[citation N]` block) used when deep scraping yields
    /// nothing for this query.
    pub async fn search(&self, query: &str, count: usize) -> Result<(Vec<WebPage>, String), SearchError> {
        let Some(api_key) = self.api_key.as_ref().filter(|k| !k.is_empty()) else {
            return Err(SearchError::ConfigMissing);
        };

        let body = SearchRequestBody {
            query,
            freshness: "noLimit",
            summary: true,
            count,
        };

        let resp = self
            .client
            .post(&self.base_url)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| SearchError::Network(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(SearchError::UpstreamNon200(status.as_u16()));
        }

        let parsed: SearchResponseBody = resp
            .json()
            .await
            .map_err(|e| SearchError::Network(e.to_string()))?;

        if parsed.code != 200 {
            return Err(SearchError::UpstreamErrorCode {
                code: parsed.code,
                message: parsed.msg.unwrap_or_default(),
            });
        }

        let pages: Vec<WebPage> = parsed
            .data
            .and_then(|d| d.web_pages)
            .map(|w| w.value.into_iter().map(WebPage::from).collect())
            .unwrap_or_default();

        let preformatted = render_preformatted_context(&pages);
        Ok((pages, preformatted))
    }
}

fn render_preformatted_context(pages: &[WebPage]) -> String {
    pages
        .iter()
        .enumerate()
        .map(|(idx, p)| {
            format!(
                "[citation {n}] {title}\nurl: {url}\nsite: {site}\ncrawled: {date}\n{summary}",
                n = idx + 1,
                title = p.title,
                url = p.url,
                site = p.site_name,
                date = p.crawl_date,
                summary = p.summary,
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Logs search-provider failures at warning level and returns an empty
/// result set — §7: "None; return empty result set from the single node".
pub async fn search_or_empty(client: &SearchClient, query: &str, count: usize) -> (Vec<WebPage>, String) {
    match client.search(query, count).await {
        Ok(result) => result,
        Err(e) => {
            warn!(query, error = %e, "search provider call failed, continuing with empty results");
            (Vec::new(), String::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preformatted_context_enumerates_citations() {
        let pages = vec![
            WebPage { title: "A".into(), url: "https://a".into(), site_name: "a.com".into(), summary: "sa".into(), crawl_date: "2024".into() },
            WebPage { title: "B".into(), url: "https://b".into(), site_name: "b.com".into(), summary: "sb".into(), crawl_date: "2024".into() },
        ];
        let text = render_preformatted_context(&pages);
        assert!(text.contains("[citation 1]"));
        assert!(text.contains("[citation 2]"));
    }
}
