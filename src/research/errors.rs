//! Domain error taxonomy for the deep-research pipeline.
//!
//! Each subsystem gets its own `thiserror` enum so handlers can match on
//! failure kind instead of string-sniffing; orchestration code collapses
//! these into `anyhow::Error` once a message string is all that's needed.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("search provider not configured")]
    ConfigMissing,
    #[error("search provider returned HTTP {0}")]
    UpstreamNon200(u16),
    #[error("search provider reported error code {code}: {message}")]
    UpstreamErrorCode { code: i64, message: String },
    #[error("network error contacting search provider: {0}")]
    Network(String),
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("non-HTML content-type: {0}")]
    NotHtml(String),
    #[error("upstream HTTP {0}")]
    UpstreamStatus(u16),
    #[error("request error: {0}")]
    Request(String),
    #[error("extracted text too short")]
    EmptyExtraction,
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("request was cancelled")]
    Cancelled,
    #[error("primary model failed: {0}")]
    PrimaryFailed(String),
    #[error("secondary model failed: {0}")]
    SecondaryFailed(String),
    #[error("failed to parse structured output: {0}")]
    StructuredParse(String),
    #[error("transport error: {0}")]
    Transport(String),
}

#[derive(Debug, Error)]
pub enum CitationError {
    #[error("short-url {0} does not resolve to a known source")]
    UnknownShortUrl(String),
}

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("cancelled")]
    Cancelled,
    #[error("node {node} failed: {source}")]
    NodeFailed {
        node: &'static str,
        #[source]
        source: anyhow::Error,
    },
    #[error("loop count exceeded max_research_loops")]
    LoopBoundExceeded,
}

impl From<LlmError> for GraphError {
    fn from(e: LlmError) -> Self {
        match e {
            LlmError::Cancelled => GraphError::Cancelled,
            other => GraphError::NodeFailed {
                node: "llm",
                source: anyhow::anyhow!(other),
            },
        }
    }
}

#[derive(Debug, Error)]
pub enum ResearchError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("unauthorized")]
    Unauthorized,
    #[error("configuration error: {0}")]
    ConfigMissing(String),
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
