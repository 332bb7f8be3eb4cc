//! BrowserEnv trait: the single seam to the browser.
//!
//! The environment is stateful and single-session: `reset` opens a task,
//! `step` executes one BrowserGym action string, `close` tears it down.
//! Observations carry the raw DOM snapshot, accessibility tree and layout
//! properties; fusing them into an element table happens elsewhere.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use crate::error::BrowserError;

/// One raw observation of the page.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Observation {
    #[serde(default)]
    pub goal: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dom_object: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub axtree_object: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra_element_properties: Option<Value>,
    #[serde(default)]
    pub focused_element_bid: Option<String>,
    #[serde(default)]
    pub open_pages_titles: Vec<String>,
    #[serde(default)]
    pub url: Option<String>,
    /// PNG, base64 encoded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<String>,
    #[serde(default)]
    pub last_action_error: Option<String>,
    /// Anything else the environment reports
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Observation {
    pub fn page_title(&self) -> &str {
        self.open_pages_titles
            .first()
            .map(String::as_str)
            .unwrap_or("Unknown Page")
    }

    /// A copy without the heavy payloads, suitable for step metadata.
    pub fn metadata(&self) -> Observation {
        Observation {
            dom_object: None,
            axtree_object: None,
            extra_element_properties: None,
            screenshot: None,
            ..self.clone()
        }
    }

    pub fn action_failed(&self) -> bool {
        self.last_action_error
            .as_deref()
            .is_some_and(|e| !e.trim().is_empty())
    }
}

/// Result of executing one action.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StepOutcome {
    pub observation: Observation,
    #[serde(default)]
    pub reward: f64,
    #[serde(default)]
    pub terminated: bool,
    #[serde(default)]
    pub truncated: bool,
    #[serde(default)]
    pub info: Map<String, Value>,
}

impl StepOutcome {
    pub fn is_done(&self) -> bool {
        self.terminated || self.truncated
    }
}

/// A browser session that executes BrowserGym action code.
#[async_trait]
pub trait BrowserEnv: Send + Sync {
    /// Open `task_id` and return the first observation and info.
    async fn reset(
        &self,
        task_id: &str,
        seed: u64,
    ) -> std::result::Result<(Observation, Map<String, Value>), BrowserError>;

    /// Execute one action string.
    async fn step(&self, action_code: &str) -> std::result::Result<StepOutcome, BrowserError>;

    async fn close(&self) -> std::result::Result<(), BrowserError>;
}
