//! File → env-var → hardcoded-default configuration for the deep-research
//! pipeline, in the same resolution chain as [`crate::core::config::ShadowConfig`].

use std::path::PathBuf;

/// Deep-research sub-config, mirrored from a `research.config.json` file.
#[derive(serde::Deserialize, Default, Clone, Debug)]
pub struct DeepResearchFileConfig {
    pub initial_search_query_count: Option<usize>,
    pub max_research_loops: Option<u32>,
    pub primary_llm_base_url: Option<String>,
    pub primary_llm_api_key: Option<String>,
    pub primary_llm_model: Option<String>,
    pub secondary_llm_base_url: Option<String>,
    pub secondary_llm_api_key: Option<String>,
    pub secondary_llm_model: Option<String>,
    pub search_provider_base_url: Option<String>,
    pub search_provider_api_key: Option<String>,
    pub llm_timeout_secs: Option<u64>,
    pub web_scrape_top_k: Option<usize>,
    pub web_scrape_concurrency: Option<usize>,
    pub web_scrape_timeout_secs: Option<u64>,
    pub web_scrape_max_total_chars: Option<usize>,
    pub web_scrape_max_per_doc_chars: Option<usize>,
    pub web_scrape_user_agent: Option<String>,
    pub short_url_prefix: Option<String>,
    pub sse_heartbeat_secs: Option<u64>,
    pub sse_connection_check_secs: Option<u64>,
    pub sse_session_timeout_secs: Option<u64>,
    pub api_key_header_name: Option<String>,
    pub api_key_header_value: Option<String>,
}

/// Fully resolved configuration, immutable for the process lifetime once
/// built by [`ResearchConfig::load`]. Every getter here is a pure function
/// of the loaded file plus environment variables — no further env lookups
/// happen once this struct exists.
#[derive(Debug, Clone)]
pub struct ResearchConfig {
    pub initial_search_query_count: usize,
    pub max_research_loops: u32,
    pub primary_llm_base_url: String,
    pub primary_llm_api_key: Option<String>,
    pub primary_llm_model: String,
    pub secondary_llm_base_url: String,
    pub secondary_llm_api_key: Option<String>,
    pub secondary_llm_model: String,
    pub search_provider_base_url: String,
    pub search_provider_api_key: Option<String>,
    pub llm_timeout_secs: u64,
    pub web_scrape_top_k: usize,
    pub web_scrape_concurrency: usize,
    pub web_scrape_timeout_secs: u64,
    pub web_scrape_max_total_chars: usize,
    pub web_scrape_max_per_doc_chars: usize,
    pub web_scrape_user_agent: String,
    pub short_url_prefix: String,
    pub sse_heartbeat_secs: u64,
    pub sse_connection_check_secs: u64,
    pub sse_session_timeout_secs: u64,
    pub api_key_header_name: String,
    pub api_key_header_value: Option<String>,
}

fn env_str(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_parsed<T: std::str::FromStr>(key: &str) -> Option<T> {
    env_str(key).and_then(|v| v.parse().ok())
}

impl ResearchConfig {
    /// Resolution order per field: JSON file value → env var → hardcoded
    /// default. A missing or unparseable file is logged and skipped, never
    /// a hard error — see SPEC_FULL.md §4.11.
    pub fn load() -> Self {
        let file = load_deep_research_file_config();

        Self {
            initial_search_query_count: file
                .initial_search_query_count
                .or_else(|| env_parsed("DEEPSEARCH_INITIAL_QUERY_COUNT"))
                .unwrap_or(3),
            max_research_loops: file
                .max_research_loops
                .or_else(|| env_parsed("DEEPSEARCH_MAX_RESEARCH_LOOPS"))
                .unwrap_or(5),
            primary_llm_base_url: file
                .primary_llm_base_url
                .or_else(|| env_str("DEEPSEARCH_PRIMARY_LLM_BASE_URL"))
                .unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            primary_llm_api_key: file
                .primary_llm_api_key
                .or_else(|| env_str("DEEPSEARCH_PRIMARY_LLM_API_KEY")),
            primary_llm_model: file
                .primary_llm_model
                .or_else(|| env_str("DEEPSEARCH_PRIMARY_LLM_MODEL"))
                .unwrap_or_else(|| "gpt-4o".to_string()),
            secondary_llm_base_url: file
                .secondary_llm_base_url
                .or_else(|| env_str("DEEPSEARCH_SECONDARY_LLM_BASE_URL"))
                .unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            secondary_llm_api_key: file
                .secondary_llm_api_key
                .or_else(|| env_str("DEEPSEARCH_SECONDARY_LLM_API_KEY")),
            secondary_llm_model: file
                .secondary_llm_model
                .or_else(|| env_str("DEEPSEARCH_SECONDARY_LLM_MODEL"))
                .unwrap_or_else(|| "gpt-4o-mini".to_string()),
            search_provider_base_url: file
                .search_provider_base_url
                .or_else(|| env_str("DEEPSEARCH_SEARCH_BASE_URL"))
                .unwrap_or_else(|| "https://api.bochaai.com/v1/web-search".to_string()),
            search_provider_api_key: file
                .search_provider_api_key
                .or_else(|| env_str("DEEPSEARCH_SEARCH_API_KEY")),
            llm_timeout_secs: file
                .llm_timeout_secs
                .or_else(|| env_parsed("DEEPSEARCH_LLM_TIMEOUT_SECS"))
                .unwrap_or(600),
            web_scrape_top_k: file
                .web_scrape_top_k
                .or_else(|| env_parsed("DEEPSEARCH_SCRAPE_TOP_K"))
                .unwrap_or(5),
            web_scrape_concurrency: file
                .web_scrape_concurrency
                .or_else(|| env_parsed("DEEPSEARCH_SCRAPE_CONCURRENCY"))
                .unwrap_or(5),
            web_scrape_timeout_secs: file
                .web_scrape_timeout_secs
                .or_else(|| env_parsed("DEEPSEARCH_SCRAPE_TIMEOUT_SECS"))
                .unwrap_or(20),
            web_scrape_max_total_chars: file
                .web_scrape_max_total_chars
                .or_else(|| env_parsed("DEEPSEARCH_SCRAPE_MAX_TOTAL_CHARS"))
                .unwrap_or(80_000),
            web_scrape_max_per_doc_chars: file
                .web_scrape_max_per_doc_chars
                .or_else(|| env_parsed("DEEPSEARCH_SCRAPE_MAX_PER_DOC_CHARS"))
                .unwrap_or(20_000),
            web_scrape_user_agent: file
                .web_scrape_user_agent
                .or_else(|| env_str("DEEPSEARCH_SCRAPE_USER_AGENT"))
                .unwrap_or_else(|| {
                    format!(
                        "Mozilla/5.0 (compatible; deepsearch-bot/{})",
                        env!("CARGO_PKG_VERSION")
                    )
                }),
            short_url_prefix: file
                .short_url_prefix
                .or_else(|| env_str("DEEPSEARCH_SHORT_URL_PREFIX"))
                .unwrap_or_else(|| "ref".to_string()),
            sse_heartbeat_secs: file
                .sse_heartbeat_secs
                .or_else(|| env_parsed("DEEPSEARCH_SSE_HEARTBEAT_SECS"))
                .unwrap_or(30),
            sse_connection_check_secs: file
                .sse_connection_check_secs
                .or_else(|| env_parsed("DEEPSEARCH_SSE_CONNECTION_CHECK_SECS"))
                .unwrap_or(10),
            sse_session_timeout_secs: file
                .sse_session_timeout_secs
                .or_else(|| env_parsed("DEEPSEARCH_SSE_SESSION_TIMEOUT_SECS"))
                .unwrap_or(1800),
            api_key_header_name: file
                .api_key_header_name
                .or_else(|| env_str("DEEPSEARCH_API_KEY_HEADER"))
                .unwrap_or_else(|| "X-API-Key".to_string()),
            api_key_header_value: file
                .api_key_header_value
                .or_else(|| env_str("DEEPSEARCH_API_KEY")),
        }
    }

    /// Config missing for the two providers that are hard requirements
    /// (§7: "Config missing (critical)" → refuse to run). The HTTP-surface
    /// auth gate key is not included here — a missing gate key simply
    /// means the endpoints are unauthenticated, which is a deployment
    /// choice, not a startup failure.
    pub fn critical_config_missing(&self) -> Option<String> {
        if self.primary_llm_api_key.is_none() && !self.primary_llm_base_url.contains("localhost") {
            return Some("primary LLM API key is not configured".to_string());
        }
        if self.search_provider_api_key.is_none() {
            return Some("search provider API key is not configured".to_string());
        }
        None
    }
}

fn load_deep_research_file_config() -> DeepResearchFileConfig {
    let candidates: Vec<PathBuf> = {
        let mut v = vec![
            PathBuf::from("research.config.json"),
            PathBuf::from("../research.config.json"),
        ];
        if let Ok(env_path) = std::env::var("DEEPSEARCH_CONFIG_PATH") {
            v.push(PathBuf::from(env_path));
        }
        v
    };

    for path in &candidates {
        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str::<DeepResearchFileConfig>(&contents) {
                Ok(cfg) => {
                    tracing::info!("research.config.json loaded from {}", path.display());
                    return cfg;
                }
                Err(e) => {
                    tracing::warn!(
                        "research.config.json parse error at {}: {} — using env/defaults",
                        path.display(),
                        e
                    );
                    return DeepResearchFileConfig::default();
                }
            },
            Err(_) => continue,
        }
    }

    DeepResearchFileConfig::default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_nothing_configured() {
        // No file on disk in the test sandbox, and these env vars are not
        // expected to be set by the test harness.
        let cfg = ResearchConfig::load();
        assert_eq!(cfg.max_research_loops, 5);
        assert_eq!(cfg.initial_search_query_count, 3);
        assert_eq!(cfg.web_scrape_top_k, 5);
        assert_eq!(cfg.sse_session_timeout_secs, 1800);
    }
}
