//! Data model for recorded steps, the task history and the run summary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

// ── Step record ───────────────────────────────────────────────────────────

/// What was done at one step, and what the page looked like afterwards.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    /// Step label, e.g. `0`, `L2_3_1` or `L2_PERCEIVE`.
    pub step: String,
    /// Action code sent to the browser, or a description of a read step.
    #[serde(default)]
    pub action_taken: Option<String>,
    #[serde(default)]
    pub reward: f64,
    #[serde(default)]
    pub terminated: bool,
    #[serde(default)]
    pub truncated: bool,
    /// The observation without its heavy payloads.
    #[serde(default)]
    pub observation_metadata: Value,
    #[serde(default)]
    pub info_data: Map<String, Value>,
    /// Payload name → file name, relative to the task directory.
    #[serde(default)]
    pub saved_files: BTreeMap<String, String>,
}

impl StepRecord {
    /// `info_data.task_info.message`, where the environment reports how the
    /// task went.
    pub fn task_message(&self) -> Option<&str> {
        self.info_data
            .get("task_info")
            .and_then(|t| t.get("message"))
            .and_then(Value::as_str)
    }
}

// ── Task history ──────────────────────────────────────────────────────────

pub const HISTORY_FILE: &str = "task_execution_history.json";

/// Every step recorded for one task, in order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskHistory {
    pub task_id: String,
    pub started_at: DateTime<Utc>,
    pub steps: Vec<StepRecord>,
}

impl TaskHistory {
    pub fn new(task_id: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            started_at: Utc::now(),
            steps: Vec::new(),
        }
    }

    pub fn push(&mut self, record: StepRecord) {
        self.steps.push(record);
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn last(&self) -> Option<&StepRecord> {
        self.steps.last()
    }

    /// Outcome as reported by the last recorded step.
    pub fn summary(&self, output_dir: impl Into<String>) -> RunSummary {
        let last = self.last();
        RunSummary {
            task_id: self.task_id.clone(),
            reward: last.map(|s| s.reward).unwrap_or(0.0),
            message: match last {
                Some(step) => step.task_message().unwrap_or("N/A").to_string(),
                None => "No message found.".to_string(),
            },
            steps: self.len(),
            output_dir: output_dir.into(),
        }
    }
}

// ── Run summary ───────────────────────────────────────────────────────────

/// The final word on one task run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub task_id: String,
    pub reward: f64,
    pub message: String,
    pub steps: usize,
    pub output_dir: String,
}

impl RunSummary {
    /// Only a full reward counts.
    pub fn succeeded(&self) -> bool {
        self.reward == 1.0
    }

    pub fn status(&self) -> &'static str {
        if self.succeeded() { "SUCCESS" } else { "FAILED" }
    }
}

impl std::fmt::Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "task    : {}", self.task_id)?;
        writeln!(f, "status  : {}", self.status())?;
        writeln!(f, "reward  : {}", self.reward)?;
        writeln!(f, "message : {}", self.message)?;
        writeln!(f, "steps   : {}", self.steps)?;
        write!(f, "logs    : {}", self.output_dir)
    }
}
