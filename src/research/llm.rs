//! C3 — LLM invocation with per-session retry and failover.
//!
//! `invoke_with_fallback` is a direct port of the original engine's
//! `invoke_llm_with_fallback`: up to two attempts on the primary model,
//! then a one-way failover to the secondary that flips the session's
//! degradation flag for every later call in the same session.

use std::future::Future;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use tracing::{info, warn};

use super::config::ResearchConfig;
use super::errors::LlmError;
use super::session_registry::SessionRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelTier {
    Primary,
    Secondary,
}

/// A resolved handle to one of the two configured chat-completion
/// endpoints. Constructing one is cheap; it borrows the shared
/// `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct LlmHandle {
    pub tier: ModelTier,
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub timeout_secs: u64,
}

impl LlmHandle {
    fn for_tier(config: &ResearchConfig, tier: ModelTier, model_override: Option<&str>, temperature: f32) -> Self {
        match tier {
            ModelTier::Primary => LlmHandle {
                tier,
                base_url: config.primary_llm_base_url.clone(),
                api_key: config.primary_llm_api_key.clone(),
                model: model_override
                    .map(str::to_string)
                    .unwrap_or_else(|| config.primary_llm_model.clone()),
                temperature,
                timeout_secs: config.llm_timeout_secs,
            },
            ModelTier::Secondary => LlmHandle {
                tier,
                base_url: config.secondary_llm_base_url.clone(),
                api_key: config.secondary_llm_api_key.clone(),
                model: model_override
                    .map(str::to_string)
                    .unwrap_or_else(|| config.secondary_llm_model.clone()),
                temperature,
                timeout_secs: config.llm_timeout_secs,
            },
        }
    }

    /// Sends a chat-completions-shaped request and returns the first
    /// choice's text. See SPEC_FULL.md §6.2 for the assumed wire format.
    pub async fn complete(&self, client: &reqwest::Client, messages: &[ChatMessage]) -> Result<String, LlmError> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let mut req = client
            .post(&url)
            .timeout(std::time::Duration::from_secs(self.timeout_secs))
            .json(&serde_json::json!({
                "model": self.model,
                "messages": messages,
                "temperature": self.temperature,
            }));
        if let Some(key) = &self.api_key {
            if !key.is_empty() {
                req = req.bearer_auth(key);
            }
        }

        let resp = req
            .send()
            .await
            .map_err(|e| LlmError::Transport(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(LlmError::Transport(format!("HTTP {status}: {body}")));
        }

        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| LlmError::Transport(e.to_string()))?;

        body["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| LlmError::Transport("response had no choices[0].message.content".to_string()))
    }

    pub async fn complete_structured<T: DeserializeOwned>(
        &self,
        client: &reqwest::Client,
        messages: &[ChatMessage],
    ) -> Result<T, LlmError> {
        let text = self.complete(client, messages).await?;
        parse_structured_output(&text)
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ChatMessage {
    pub role: &'static str,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        ChatMessage { role: "system", content: content.into() }
    }
    pub fn user(content: impl Into<String>) -> Self {
        ChatMessage { role: "user", content: content.into() }
    }
}

/// Tolerates a JSON-mode response wrapped in a markdown code fence, which
/// some providers emit even when asked for strict JSON.
fn parse_structured_output<T: DeserializeOwned>(text: &str) -> Result<T, LlmError> {
    let trimmed = text.trim();
    let candidate = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .map(|s| s.trim())
        .and_then(|s| s.strip_suffix("```"))
        .map(|s| s.trim())
        .unwrap_or(trimmed);
    serde_json::from_str(candidate).map_err(|e| LlmError::StructuredParse(e.to_string()))
}

/// Shared invoker used by every node. Holds the pieces that are constant
/// across a whole process: the HTTP client, resolved config, and the
/// session registry.
pub struct LlmInvoker {
    pub client: reqwest::Client,
    pub config: Arc<ResearchConfig>,
    pub registry: Arc<SessionRegistry>,
}

impl LlmInvoker {
    pub fn new(client: reqwest::Client, config: Arc<ResearchConfig>, registry: Arc<SessionRegistry>) -> Self {
        Self { client, config, registry }
    }

    /// Implements SPEC_FULL.md §4.3's algorithm verbatim:
    /// 1. Check cancellation.
    /// 2. If already degraded, run once on secondary.
    /// 3. Else up to two attempts on primary.
    /// 4. If both primary attempts fail, flip degraded and recurse into (2).
    pub async fn invoke<F, Fut, T>(
        &self,
        session_id: &str,
        node_name: &'static str,
        model_override: Option<&str>,
        temperature: f32,
        f: F,
    ) -> Result<T, LlmError>
    where
        F: Fn(LlmHandle) -> Fut,
        Fut: Future<Output = Result<T, LlmError>>,
    {
        if self.registry.is_cancelled(session_id) {
            return Err(LlmError::Cancelled);
        }

        if self.registry.is_degraded(session_id) {
            return self.invoke_secondary_once(session_id, node_name, model_override, temperature, f).await;
        }

        let mut last_err = None;
        for attempt in 1..=2 {
            if self.registry.is_cancelled(session_id) {
                return Err(LlmError::Cancelled);
            }
            let handle = LlmHandle::for_tier(&self.config, ModelTier::Primary, model_override, temperature);
            match f(handle).await {
                Ok(value) => {
                    if self.registry.is_cancelled(session_id) {
                        return Err(LlmError::Cancelled);
                    }
                    return Ok(value);
                }
                Err(e) => {
                    warn!(node = node_name, attempt, error = %e, "primary LLM attempt failed");
                    last_err = Some(e);
                }
            }
        }

        info!(session_id, node = node_name, "primary exhausted, degrading session to secondary model");
        self.registry.set_degraded(session_id);
        let _ = last_err; // superseded by the secondary attempt's own error, if any
        self.invoke_secondary_once(session_id, node_name, model_override, temperature, f).await
    }

    async fn invoke_secondary_once<F, Fut, T>(
        &self,
        session_id: &str,
        node_name: &'static str,
        model_override: Option<&str>,
        temperature: f32,
        f: F,
    ) -> Result<T, LlmError>
    where
        F: Fn(LlmHandle) -> Fut,
        Fut: Future<Output = Result<T, LlmError>>,
    {
        if self.registry.is_cancelled(session_id) {
            return Err(LlmError::Cancelled);
        }
        let handle = LlmHandle::for_tier(&self.config, ModelTier::Secondary, model_override, temperature);
        let result = f(handle).await;
        if let Err(ref e) = result {
            warn!(node = node_name, error = %e, "secondary LLM attempt failed");
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn test_invoker() -> LlmInvoker {
        LlmInvoker::new(
            reqwest::Client::new(),
            Arc::new(ResearchConfig::load()),
            Arc::new(SessionRegistry::new()),
        )
    }

    #[tokio::test]
    async fn degrades_after_two_primary_failures() {
        let invoker = test_invoker();
        invoker.registry.create("s1");
        let calls = AtomicUsize::new(0);

        let result: Result<&'static str, LlmError> = invoker
            .invoke("s1", "plan", None, 0.0, |handle| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    match handle.tier {
                        ModelTier::Primary => Err(LlmError::Transport(format!("boom {n}"))),
                        ModelTier::Secondary => Ok("secondary-ok"),
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "secondary-ok");
        assert!(invoker.registry.is_degraded("s1"));
        // Two primary attempts, then one secondary attempt.
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn once_degraded_skips_primary_entirely() {
        let invoker = test_invoker();
        invoker.registry.create("s1");
        invoker.registry.set_degraded("s1");

        let result: Result<&'static str, LlmError> = invoker
            .invoke("s1", "reflection", None, 0.0, |handle| async move {
                match handle.tier {
                    ModelTier::Primary => panic!("must not call primary once degraded"),
                    ModelTier::Secondary => Ok("ok"),
                }
            })
            .await;

        assert_eq!(result.unwrap(), "ok");
    }

    #[tokio::test]
    async fn cancellation_short_circuits_before_any_call() {
        let invoker = test_invoker();
        invoker.registry.create("s1");
        invoker.registry.set_cancelled("s1");

        let result: Result<(), LlmError> = invoker
            .invoke("s1", "plan", None, 0.0, |_handle| async { Ok(()) })
            .await;

        assert!(matches!(result, Err(LlmError::Cancelled)));
    }

    #[test]
    fn parses_code_fenced_json() {
        #[derive(serde::Deserialize, PartialEq, Debug)]
        struct Payload {
            ok: bool,
        }
        let text = "```json\n{\"ok\": true}\n```";
        let parsed: Payload = parse_structured_output(text).unwrap();
        assert_eq!(parsed, Payload { ok: true });
    }
}
