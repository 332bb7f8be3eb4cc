//! Task manifests: the structured form of a natural-language goal.
//!
//! The goal analyzer produces one manifest per task. The planner reads the
//! `specification.FIELDS` map (field label → target value) to index the page
//! and to audit progress.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Top-level mission category as written by the goal analyzer.
///
/// Synonyms are folded so downstream logic only sees the canonical names.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MissionIntent(String);

impl MissionIntent {
    pub const GENERAL: &'static str = "GENERAL";

    /// Upper-case, trim and map synonyms onto canonical intents.
    pub fn normalize(raw: &str) -> Self {
        let upper = raw.trim().to_uppercase();
        let canonical = match upper.as_str() {
            "FIND" | "QUERY" | "LOOK FOR" | "SEARCH" | "GET" => "SEARCH_ANSWER",
            "MAKE" | "NEW" | "INSERT" | "ADD" => "CREATE",
            "EDIT" | "MODIFY" | "CHANGE" | "FIX" => "UPDATE",
            "VIEW" | "READ" | "DISPLAY" | "CHECK" => "SHOW",
            "" => Self::GENERAL,
            other => other,
        };
        Self(canonical.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Intents that look information up rather than change records.
    pub fn is_search(&self) -> bool {
        matches!(self.0.as_str(), "SEARCH_ANSWER" | "SHOW" | "ANALYZE")
    }

    /// Intents that end in a submit/save of some kind.
    pub fn is_mutating(&self) -> bool {
        ["CREATE", "UPDATE", "ORDER", "ADMIN", "INSERT"]
            .iter()
            .any(|k| self.0.contains(k))
    }
}

impl std::fmt::Display for MissionIntent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskMetadata {
    pub task_id: String,
    /// Intent exactly as the analyzer reported it
    pub mission_intent: String,
    pub language: String,
    pub raw_goal: String,
}

/// The structured task description.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskManifest {
    pub task_metadata: TaskMetadata,
    #[serde(default)]
    pub abstract_plan: Value,
    /// Holds `FIELDS` plus whatever else the analyzer chose to emit
    #[serde(default)]
    pub specification: Map<String, Value>,
    #[serde(default)]
    pub success_criteria: Value,
    /// Intent-specific rules loaded from disk
    #[serde(default)]
    pub runtime_hints: Value,
    #[serde(default)]
    pub reasoning: Option<String>,
}

impl TaskManifest {
    pub fn intent(&self) -> MissionIntent {
        MissionIntent::normalize(&self.task_metadata.mission_intent)
    }

    /// Requested field values in the order the goal listed them.
    ///
    /// Values are rendered as text: `null` becomes empty, booleans become
    /// `true`/`false`.
    pub fn fields(&self) -> Vec<(String, String)> {
        match self.specification.get("FIELDS") {
            Some(Value::Object(map)) => map
                .iter()
                .map(|(k, v)| (k.clone(), value_text(v)))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Target value for one field, if the manifest names it.
    pub fn field(&self, name: &str) -> Option<String> {
        match self.specification.get("FIELDS") {
            Some(Value::Object(map)) => map.get(name).map(value_text),
            _ => None,
        }
    }
}

/// Plain text for a JSON scalar; strings are not quoted.
pub fn value_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
