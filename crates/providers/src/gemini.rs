//! Google Gemini provider (Generative Language REST API).
//!
//! Uses `models/{model}:generateContent` with the `x-goog-api-key` header.
//! System messages become `systemInstruction`; JSON mode sets
//! `generationConfig.responseMimeType = "application/json"`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sopilot_core::error::ProviderError;
use sopilot_core::message::{Message, Role};
use sopilot_core::provider::*;
use tracing::debug;

use crate::http::{build_client, check_status};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

pub struct GeminiProvider {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl GeminiProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.into(),
            api_key: api_key.into(),
            client: build_client(),
        }
    }

    /// Point at a different endpoint (proxies, tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request_body(request: &ProviderRequest) -> GenerateRequest {
        let system: Vec<Part> = request
            .messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| Part { text: m.content.clone() })
            .collect();

        let contents = request
            .messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(|m| Content {
                role: Some(match m.role {
                    Role::Assistant => "model".into(),
                    _ => "user".into(),
                }),
                parts: vec![Part { text: m.content.clone() }],
            })
            .collect();

        GenerateRequest {
            contents,
            system_instruction: if system.is_empty() {
                None
            } else {
                Some(Content { role: None, parts: system })
            },
            generation_config: GenerationConfig {
                temperature: request.temperature,
                max_output_tokens: request.max_tokens,
                response_mime_type: request.json_mode.then(|| "application/json".to_string()),
                stop_sequences: request.stop.clone(),
            },
        }
    }

    /// Concatenate the text parts of the first candidate.
    fn candidate_text(response: &GenerateResponse) -> Option<String> {
        let candidate = response.candidates.first()?;
        let content = candidate.content.as_ref()?;
        Some(
            content
                .parts
                .iter()
                .map(|p| p.text.as_str())
                .collect::<Vec<_>>()
                .join(""),
        )
    }
}

#[async_trait]
impl Provider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ProviderResponse, ProviderError> {
        if self.api_key.is_empty() {
            return Err(ProviderError::NotConfigured(
                "gemini api_key is empty".into(),
            ));
        }

        let url = format!("{}/models/{}:generateContent", self.base_url, request.model);
        let body = Self::request_body(&request);

        debug!(model = %request.model, json_mode = request.json_mode, "Sending Gemini request");

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(e.to_string())
                } else {
                    ProviderError::Network(e.to_string())
                }
            })?;

        let response = check_status(response).await?;

        let api_response: GenerateResponse =
            response.json().await.map_err(|e| ProviderError::ApiError {
                status_code: 200,
                message: format!("Failed to parse response: {e}"),
            })?;

        let text = Self::candidate_text(&api_response).ok_or_else(|| ProviderError::ApiError {
            status_code: 200,
            message: "No candidates in response".into(),
        })?;

        let usage = api_response.usage_metadata.map(|u| Usage {
            prompt_tokens: u.prompt_token_count,
            completion_tokens: u.candidates_token_count,
            total_tokens: u.total_token_count,
        });

        Ok(ProviderResponse {
            message: Message::assistant(text),
            usage,
            model: api_response.model_version.unwrap_or(request.model),
        })
    }

    async fn health_check(&self) -> std::result::Result<bool, ProviderError> {
        let url = format!("{}/models", self.base_url);
        let response = self
            .client
            .get(&url)
            .header("x-goog-api-key", &self.api_key)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        Ok(response.status().is_success())
    }
}

// --- Gemini API types (internal) ---

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    stop_sequences: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    usage_metadata: Option<UsageMetadata>,
    model_version: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
    #[serde(default)]
    total_token_count: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_mode_sets_mime_type() {
        let request = ProviderRequest::json_prompt("gemini-2.5-flash", "Return {}");
        let body = serde_json::to_value(GeminiProvider::request_body(&request)).unwrap();
        assert_eq!(body["generationConfig"]["responseMimeType"], "application/json");
        assert_eq!(body["contents"][0]["role"], "user");
        assert_eq!(body["contents"][0]["parts"][0]["text"], "Return {}");
        assert!(body.get("systemInstruction").is_none());
    }

    #[test]
    fn system_messages_become_instruction() {
        let mut request = ProviderRequest::json_prompt("m", "hi");
        request.messages.insert(0, Message::system("Be terse"));
        request.messages.push(Message::assistant("ok"));
        let body = serde_json::to_value(GeminiProvider::request_body(&request)).unwrap();
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "Be terse");
        assert_eq!(body["contents"].as_array().unwrap().len(), 2);
        assert_eq!(body["contents"][1]["role"], "model");
    }

    #[test]
    fn candidate_parts_are_joined() {
        let json = r#"{
            "candidates": [{"content": {"role": "model", "parts": [{"text": "{\"a\":"}, {"text": "1}"}]}}],
            "usageMetadata": {"promptTokenCount": 7, "candidatesTokenCount": 3, "totalTokenCount": 10},
            "modelVersion": "gemini-2.5-flash-001"
        }"#;
        let parsed: GenerateResponse = serde_json::from_str(json).unwrap();
        assert_eq!(GeminiProvider::candidate_text(&parsed).as_deref(), Some("{\"a\":1}"));
        assert_eq!(parsed.usage_metadata.unwrap().total_token_count, 10);
    }

    #[test]
    fn no_candidates_yields_none() {
        let parsed: GenerateResponse = serde_json::from_str(r#"{"candidates": []}"#).unwrap();
        assert!(GeminiProvider::candidate_text(&parsed).is_none());
    }

    #[tokio::test]
    async fn empty_key_is_not_configured() {
        let provider = GeminiProvider::new("");
        let err = provider
            .complete(ProviderRequest::json_prompt("gemini-2.5-flash", "x"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::NotConfigured(_)));
    }
}
