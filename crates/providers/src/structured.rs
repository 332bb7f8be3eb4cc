//! Structured (JSON) completions.
//!
//! Every LLM-backed component asks for a JSON document and gets back the
//! parsed value, any `<think>` reasoning the model emitted, and the raw text
//! for tracing. Models wrap JSON in prose or markdown fences often enough
//! that the outermost `{...}` span is extracted before parsing.

use std::sync::{Arc, LazyLock};
use std::time::Duration;

use regex_lite::Regex;
use serde_json::Value;
use sopilot_core::error::ProviderError;
use sopilot_core::provider::{Provider, ProviderRequest};
use tracing::{debug, warn};

/// A parsed JSON reply.
#[derive(Debug, Clone)]
pub struct StructuredReply {
    pub data: Value,
    pub reasoning: Option<String>,
    pub raw: String,
}

/// Why a structured completion failed.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LlmError {
    #[error("completion failed: {0}")]
    Provider(#[from] ProviderError),

    #[error("reply is not valid JSON: {reason}")]
    Parse { reason: String, raw: String },
}

impl LlmError {
    /// The model's text, when there was one.
    pub fn raw(&self) -> Option<&str> {
        match self {
            LlmError::Provider(_) => None,
            LlmError::Parse { raw, .. } => Some(raw),
        }
    }
}

impl From<LlmError> for sopilot_core::Error {
    fn from(e: LlmError) -> Self {
        match e {
            LlmError::Provider(p) => sopilot_core::Error::Provider(p),
            other => sopilot_core::Error::Internal(other.to_string()),
        }
    }
}

/// How often to re-issue a failed completion.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay: Duration::from_secs(2),
        }
    }
}

/// JSON-mode completion client bound to one provider and model.
#[derive(Clone)]
pub struct LlmClient {
    provider: Arc<dyn Provider>,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
}

impl LlmClient {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature: 0.1,
            max_tokens: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// One JSON-mode completion.
    pub async fn fetch_json(&self, prompt: &str) -> Result<StructuredReply, LlmError> {
        let mut request = ProviderRequest::json_prompt(&self.model, prompt);
        request.temperature = self.temperature;
        request.max_tokens = self.max_tokens;

        let response = self.provider.complete(request).await?;
        let raw = response.message.content;
        if let Some(usage) = response.usage {
            debug!(
                model = %response.model,
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "Structured completion"
            );
        }
        parse_reply(raw)
    }

    /// Re-issue the completion until it parses or attempts run out.
    ///
    /// `inspect` sees every attempt, successful or not.
    pub async fn fetch_json_with_retry<F>(
        &self,
        prompt: &str,
        policy: RetryPolicy,
        mut inspect: F,
    ) -> Result<StructuredReply, LlmError>
    where
        F: FnMut(u32, &Result<StructuredReply, LlmError>) + Send,
    {
        let attempts = policy.attempts.max(1);
        let mut attempt = 1;
        loop {
            let result = self.fetch_json(prompt).await;
            inspect(attempt, &result);
            match result {
                Ok(reply) => return Ok(reply),
                Err(e) if attempt >= attempts => return Err(e),
                Err(e) => {
                    warn!(attempt, error = %e, "Structured completion failed, retrying");
                    tokio::time::sleep(policy.delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

/// Split reasoning off, extract the JSON span and parse it.
pub fn parse_reply(raw: String) -> Result<StructuredReply, LlmError> {
    let (reasoning, body) = extract_reasoning(&raw);
    let span = extract_json(&body);
    match serde_json::from_str::<Value>(span.trim()) {
        Ok(data) => Ok(StructuredReply { data, reasoning, raw }),
        Err(e) => Err(LlmError::Parse {
            reason: e.to_string(),
            raw,
        }),
    }
}

static THINK_BLOCK: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"(?s)<think>(.*?)</think>").ok());

/// Pull `<think>...</think>` out of the text; returns (reasoning, remainder).
pub fn extract_reasoning(text: &str) -> (Option<String>, String) {
    let Some(re) = THINK_BLOCK.as_ref() else {
        return (None, text.to_string());
    };
    let Some(caps) = re.captures(text) else {
        return (None, text.to_string());
    };
    let reasoning = caps.get(1).map(|m| m.as_str().trim().to_string());
    let clean = re.replace_all(text, "").trim().to_string();
    (reasoning, clean)
}

/// The outermost `{...}` span, or the whole text when there is none.
pub fn extract_json(text: &str) -> &str {
    match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if end > start => &text[start..=end],
        _ => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::SequentialMockProvider;

    #[test]
    fn reasoning_is_split_off() {
        let (reasoning, body) = extract_reasoning("<think>\nfill Risk first\n</think>\n{\"a\": 1}");
        assert_eq!(reasoning.as_deref(), Some("fill Risk first"));
        assert_eq!(body, "{\"a\": 1}");

        let (none, same) = extract_reasoning("{\"a\": 1}");
        assert!(none.is_none());
        assert_eq!(same, "{\"a\": 1}");
    }

    #[test]
    fn json_span_survives_fences_and_prose() {
        let text = "Here you go:\n```json\n{\"concrete_steps\": [{\"x\": {}}]}\n```";
        assert_eq!(extract_json(text), "{\"concrete_steps\": [{\"x\": {}}]}");
        assert_eq!(extract_json("\"NOT_FOUND\""), "\"NOT_FOUND\"");
    }

    #[test]
    fn parse_reply_keeps_raw_on_failure() {
        let err = parse_reply("{not json}".into()).unwrap_err();
        assert_eq!(err.raw(), Some("{not json}"));

        let ok = parse_reply("<think>t</think>[1, 2]".into()).unwrap();
        assert_eq!(ok.data, serde_json::json!([1, 2]));
        assert_eq!(ok.reasoning.as_deref(), Some("t"));
    }

    #[tokio::test]
    async fn fetch_json_parses() {
        let provider = Arc::new(SequentialMockProvider::replying(&["{\"MISSION_INTENT\": \"CREATE\"}"]));
        let client = LlmClient::new(provider.clone(), "m");
        let reply = client.fetch_json("analyze").await.unwrap();
        assert_eq!(reply.data["MISSION_INTENT"], "CREATE");
        assert_eq!(provider.json_modes(), [true]);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_until_parse_succeeds() {
        let provider = Arc::new(SequentialMockProvider::new(vec![
            Err(ProviderError::Network("reset".into())),
            Ok("garbage".into()),
            Ok("{\"ok\": true}".into()),
        ]));
        let client = LlmClient::new(provider.clone(), "m");
        let mut seen = Vec::new();
        let reply = client
            .fetch_json_with_retry("p", RetryPolicy::default(), |attempt, result| {
                seen.push((attempt, result.is_ok()));
            })
            .await
            .unwrap();
        assert_eq!(reply.data["ok"], true);
        assert_eq!(seen, [(1, false), (2, false), (3, true)]);
        assert_eq!(provider.call_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_gives_up_after_attempts() {
        let provider = Arc::new(SequentialMockProvider::new(vec![
            Ok("x".into()),
            Ok("y".into()),
            Ok("{\"never\": 1}".into()),
        ]));
        let client = LlmClient::new(provider.clone(), "m");
        let policy = RetryPolicy {
            attempts: 2,
            delay: Duration::from_millis(10),
        };
        let err = client.fetch_json_with_retry("p", policy, |_, _| {}).await.unwrap_err();
        assert!(matches!(err, LlmError::Parse { .. }));
        assert_eq!(provider.call_count(), 2);
    }
}
