//! Prompt templates.
//!
//! Every prompt has a built-in English default. A file named
//! `<template_dir>/<name>_<lang>.txt` replaces it, which is how other
//! languages are supported. Placeholders are written `{{name}}`.

use std::path::{Path, PathBuf};
use tracing::debug;

pub const GOAL_ANALYZER: &str = "goal_analyzer";
pub const CONCRETE_PLANNER: &str = "concrete_planner";
pub const REFINE_INDEX: &str = "refine_bid_index";
pub const EXTRACTOR: &str = "extractor";

const BUILTIN_GOAL_ANALYZER: &str = r#"You analyse web automation goals for a ServiceNow instance.
Task id: {{task_id}}

Goal:
{{goal}}

Answer with a single JSON object:
{
  "MISSION_INTENT": "CREATE | UPDATE | SEARCH_ANSWER | SHOW | ORDER | ADMIN | GENERAL",
  "ABSTRACT_PLAN": ["short imperative steps, no element ids"],
  "SPECIFICATION": {"FIELDS": {"<field label exactly as on screen>": "<target value, \"\" to leave empty, true/false for checkboxes>"}},
  "SUCCESS_CRITERIA": {"description": "how to tell the task is done"}
}
Copy field labels and values verbatim from the goal. Do not invent fields."#;

const BUILTIN_CONCRETE_PLANNER: &str = r#"You turn a task manifest into concrete browser actions for the page below.

## Page
Title: {{page_title}}
Focused element: {{focused_bid}}

## Task manifest
{{manifest}}

## Physical index (field -> element currently implementing it)
{{bid_index}}
{{sop_section}}
## UI observation (CSV)
{{observation_csv}}
{{original_plan_section}}{{refine_section}}
## Rules
- Use only BIDs that appear in the CSV or the physical index. Never invent one.
- If an element is not on the page yet, give "target": {"role": "...", "label": "..."} instead of a bid.
- Allowed action_type values: fill, click, focus, select_option, scroll, hover, extractLLM, send_msg_to_user.
- Every action that serves a manifest field sets "logic_ref" to that field name.
- extractLLM needs "instruction"; scroll needs "dx"/"dy" or "direction".
- Write extractValue wherever the last extracted value should be inserted.

Answer with a single JSON object:
{"thought": "...", "concrete_steps": [{"step_id": 1, "logical_intent": "...", "actions": [{"action_type": "fill", "bid": "...", "value": "...", "logic_ref": "..."}]}]}"#;

const BUILTIN_REFINE_INDEX: &str = r#"You are a UI analysis specialist.
Some entries of the index below are "NOT_FOUND". Find the correct BID for each of them in the CSV.
Return the complete index as a JSON object with the same keys; keep entries you cannot resolve as "NOT_FOUND".
Each resolved entry is {"bid": "...", "role": "...", "label": "...", "is_visible": true}.

## Index to complete
{{bid_index}}

## UI observation (CSV)
{{observation_csv}}"#;

const BUILTIN_EXTRACTOR: &str = r#"### UI perception
You read values off a web page exactly as displayed.
Current page: {{page_title}}

Instruction:
{{instruction}}

Find the value the instruction asks for in the UI observation below.

## UI observation (CSV)
{{observation_csv}}

## Rules
1. Return the value verbatim: no summarising, rephrasing or interpretation.
2. Return only the value.
3. No preamble and no explanation.
4. If the value is not on the page, return "NOT_FOUND".
Answer with a JSON object {"value": "..."}."#;

fn builtin(name: &str) -> &'static str {
    match name {
        GOAL_ANALYZER => BUILTIN_GOAL_ANALYZER,
        CONCRETE_PLANNER => BUILTIN_CONCRETE_PLANNER,
        REFINE_INDEX => BUILTIN_REFINE_INDEX,
        _ => BUILTIN_EXTRACTOR,
    }
}

/// Replace every `{{key}}` with its value. Unknown placeholders stay.
pub fn fill_template(template: &str, vars: &[(&str, &str)]) -> String {
    vars.iter().fold(template.to_string(), |text, (key, value)| {
        text.replace(&format!("{{{{{key}}}}}"), value)
    })
}

#[derive(Debug, Clone)]
pub struct PromptTemplates {
    dir: Option<PathBuf>,
    lang: String,
}

impl PromptTemplates {
    pub fn new(dir: impl Into<PathBuf>, lang: impl Into<String>) -> Self {
        Self {
            dir: Some(dir.into()),
            lang: lang.into(),
        }
    }

    /// Built-in templates only.
    pub fn builtin(lang: impl Into<String>) -> Self {
        Self {
            dir: None,
            lang: lang.into(),
        }
    }

    pub fn lang(&self) -> &str {
        &self.lang
    }

    fn override_path(&self, name: &str) -> Option<PathBuf> {
        self.dir
            .as_deref()
            .map(|d: &Path| d.join(format!("{name}_{}.txt", self.lang)))
    }

    /// The raw template for `name`.
    pub fn template(&self, name: &str) -> String {
        if let Some(path) = self.override_path(name) {
            if let Ok(text) = std::fs::read_to_string(&path) {
                debug!(path = %path.display(), "using prompt override");
                return text;
            }
        }
        builtin(name).to_string()
    }

    pub fn render(&self, name: &str, vars: &[(&str, &str)]) -> String {
        fill_template(&self.template(name), vars)
    }

    /// Write the built-in templates into `dir` for editing. Existing files
    /// are left alone. Returns the files written.
    pub fn write_defaults(dir: &Path, lang: &str) -> std::io::Result<Vec<PathBuf>> {
        std::fs::create_dir_all(dir)?;
        let mut written = Vec::new();
        for name in [GOAL_ANALYZER, CONCRETE_PLANNER, REFINE_INDEX, EXTRACTOR] {
            let path = dir.join(format!("{name}_{lang}.txt"));
            if !path.exists() {
                std::fs::write(&path, builtin(name))?;
                written.push(path);
            }
        }
        Ok(written)
    }
}
