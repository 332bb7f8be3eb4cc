//! HTTP bridge to a BrowserGym environment.
//!
//! The bridge is a small service that owns the Playwright browser and the
//! WorkArena task. It exposes three endpoints:
//!
//! - `POST /reset {task_id, seed, headless, retry_with_force, env}` →
//!   `{observation, info}`
//! - `POST /step {action}` → `{observation, reward, terminated, truncated, info}`
//! - `POST /close`
//!
//! plus `GET /health` for diagnostics.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use sopilot_config::AppConfig;
use sopilot_core::browser::{BrowserEnv, Observation, StepOutcome};
use sopilot_core::error::BrowserError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Deserialize)]
struct ResetReply {
    observation: Observation,
    #[serde(default)]
    info: Map<String, Value>,
}

/// A [`BrowserEnv`] served by a remote bridge.
pub struct RemoteBrowserEnv {
    base_url: String,
    client: reqwest::Client,
    headless: bool,
    retry_with_force: bool,
    /// Environment variables the bridge sets before starting the task
    env: Map<String, Value>,
    started: AtomicBool,
}

impl RemoteBrowserEnv {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            headless: false,
            retry_with_force: true,
            env: Map::new(),
            started: AtomicBool::new(false),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        let browser = &config.browser;
        let mut env = Self::new(&browser.bridge_url, Duration::from_secs(browser.request_timeout_secs));
        env.headless = browser.headless;
        env.retry_with_force = browser.retry_with_force;
        if let Some(token) = &config.hugging_face_hub_token {
            env.env
                .insert("HUGGING_FACE_HUB_TOKEN".into(), Value::String(token.clone()));
        }
        env
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn reset_body(&self, task_id: &str, seed: u64) -> Value {
        json!({
            "task_id": task_id,
            "seed": seed,
            "headless": self.headless,
            "retry_with_force": self.retry_with_force,
            "env": self.env,
        })
    }

    async fn post(&self, path: &str, body: &Value) -> Result<reqwest::Response, BrowserError> {
        let url = format!("{}/{path}", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| BrowserError::Unreachable(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), body = %message, "Bridge returned error");
            return Err(BrowserError::Bridge {
                status_code: status.as_u16(),
                message,
            });
        }
        Ok(response)
    }

    /// Whether the bridge answers its health endpoint.
    pub async fn health_check(&self) -> Result<bool, BrowserError> {
        let response = self
            .client
            .get(format!("{}/health", self.base_url))
            .send()
            .await
            .map_err(|e| BrowserError::Unreachable(e.to_string()))?;
        Ok(response.status().is_success())
    }
}

fn parse_reset(value: Value) -> Result<(Observation, Map<String, Value>), BrowserError> {
    let reply: ResetReply =
        serde_json::from_value(value).map_err(|e| BrowserError::InvalidPayload(e.to_string()))?;
    Ok((reply.observation, reply.info))
}

fn parse_step(value: Value) -> Result<StepOutcome, BrowserError> {
    serde_json::from_value(value).map_err(|e| BrowserError::InvalidPayload(e.to_string()))
}

async fn read_json(response: reqwest::Response) -> Result<Value, BrowserError> {
    response
        .json()
        .await
        .map_err(|e| BrowserError::InvalidPayload(e.to_string()))
}

#[async_trait]
impl BrowserEnv for RemoteBrowserEnv {
    async fn reset(&self, task_id: &str, seed: u64) -> Result<(Observation, Map<String, Value>), BrowserError> {
        info!(task_id, seed, bridge = %self.base_url, "Resetting browser environment");
        let response = self.post("reset", &self.reset_body(task_id, seed)).await?;
        let reply = parse_reset(read_json(response).await?)?;
        self.started.store(true, Ordering::SeqCst);
        Ok(reply)
    }

    async fn step(&self, action_code: &str) -> Result<StepOutcome, BrowserError> {
        if !self.started.load(Ordering::SeqCst) {
            return Err(BrowserError::NotStarted);
        }
        debug!(action = action_code, "Stepping browser environment");
        let response = self.post("step", &json!({ "action": action_code })).await?;
        parse_step(read_json(response).await?)
    }

    async fn close(&self) -> Result<(), BrowserError> {
        if !self.started.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        self.post("close", &json!({})).await?;
        info!("Browser environment closed");
        Ok(())
    }
}
