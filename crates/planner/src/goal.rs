//! Goal analysis: natural-language goal → [`TaskManifest`].

use crate::prompts::{GOAL_ANALYZER, PromptTemplates};
use serde_json::{Map, Value};
use sopilot_core::error::PlanError;
use sopilot_core::manifest::{MissionIntent, TaskManifest, TaskMetadata};
use sopilot_providers::LlmClient;
use std::path::PathBuf;
use tracing::{info, warn};

pub struct GoalAnalyzer {
    client: LlmClient,
    prompts: PromptTemplates,
    rules_dir: PathBuf,
}

impl GoalAnalyzer {
    pub fn new(client: LlmClient, prompts: PromptTemplates, rules_dir: impl Into<PathBuf>) -> Self {
        Self {
            client,
            prompts,
            rules_dir: rules_dir.into(),
        }
    }

    /// Intent-specific hints from `<rules_dir>/intent_rules_<lang>.json`.
    ///
    /// A missing file means no hints; an unreadable one is logged and also
    /// yields none.
    pub fn intent_rules(&self, intent: &str) -> Value {
        let path = self
            .rules_dir
            .join(format!("intent_rules_{}.json", self.prompts.lang()));
        if !path.exists() {
            return Value::Object(Map::new());
        }
        let parsed = std::fs::read_to_string(&path)
            .map_err(|e| e.to_string())
            .and_then(|text| serde_json::from_str::<Map<String, Value>>(&text).map_err(|e| e.to_string()));
        match parsed {
            Ok(mut rules) => rules.remove(intent).unwrap_or_else(|| Value::Object(Map::new())),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "intent rules not loadable");
                Value::Object(Map::new())
            }
        }
    }

    pub async fn analyze(&self, raw_goal: &str, task_id: &str) -> Result<TaskManifest, PlanError> {
        let prompt = self
            .prompts
            .render(GOAL_ANALYZER, &[("goal", raw_goal), ("task_id", task_id)]);
        let reply = self
            .client
            .fetch_json(&prompt)
            .await
            .map_err(|e| PlanError::GoalAnalysis(e.to_string()))?;

        let Value::Object(mut data) = reply.data else {
            return Err(PlanError::GoalAnalysis("analyzer reply is not a JSON object".into()));
        };

        let intent = data
            .get("MISSION_INTENT")
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(MissionIntent::GENERAL)
            .to_string();
        let runtime_hints = self.intent_rules(&intent);

        let specification = match data.remove("SPECIFICATION") {
            Some(Value::Object(map)) => map,
            _ => Map::new(),
        };
        let manifest = TaskManifest {
            task_metadata: TaskMetadata {
                task_id: task_id.to_string(),
                mission_intent: intent,
                language: self.prompts.lang().to_string(),
                raw_goal: raw_goal.to_string(),
            },
            abstract_plan: data.remove("ABSTRACT_PLAN").unwrap_or_else(|| Value::Array(Vec::new())),
            specification,
            success_criteria: data
                .remove("SUCCESS_CRITERIA")
                .unwrap_or_else(|| Value::Object(Map::new())),
            runtime_hints,
            reasoning: reply.reasoning,
        };

        info!(
            task_id,
            intent = %manifest.intent(),
            fields = manifest.fields().len(),
            "goal analyzed"
        );
        Ok(manifest)
    }
}
