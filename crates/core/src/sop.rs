//! Standard Operating Procedures.
//!
//! An SOP describes how to finish a task in terms of logical roles and
//! purposes, never live element identifiers, so it survives UI revisions.
//! Structured steps can be grounded against a page; free-text lines are
//! only ever shown to the planner.

use serde::{Deserialize, Serialize};
use crate::plan::{ActionType, TargetRef};

/// One abstract, identifier-free action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SopStep {
    pub action: ActionType,
    /// Logical role of the element to operate ("textbox", "button", ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Purpose or visible label the element carries
    #[serde(default, alias = "purpose", alias = "label")]
    pub target: String,
    /// Booleans and numbers are read as their text
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "scalar_string")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

fn scalar_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error;
    match Option::<serde_json::Value>::deserialize(deserializer)? {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(s)) => Ok(Some(s)),
        Some(v @ (serde_json::Value::Bool(_) | serde_json::Value::Number(_))) => Ok(Some(v.to_string())),
        Some(other) => Err(D::Error::custom(format!("expected a scalar value, got {other}"))),
    }
}

impl SopStep {
    pub fn new(action: ActionType, role: Option<&str>, target: impl Into<String>) -> Self {
        Self {
            action,
            role: role.map(str::to_string),
            target: target.into(),
            value: None,
            description: None,
        }
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn target_ref(&self) -> TargetRef {
        TargetRef {
            role: self.role.clone(),
            label: self.target.clone(),
        }
    }
}

impl std::fmt::Display for SopStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.action)?;
        if let Some(role) = &self.role {
            write!(f, " [{role}]")?;
        }
        if !self.target.is_empty() {
            write!(f, " \"{}\"", self.target)?;
        }
        if let Some(value) = &self.value {
            write!(f, " = \"{value}\"")?;
        }
        if let Some(description) = &self.description {
            write!(f, " ({description})")?;
        }
        Ok(())
    }
}

/// A line of an SOP as found in the library.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SopEntry {
    Step(SopStep),
    Note(String),
    Freeform(serde_json::Value),
}

/// An ordered procedure for one task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Sop {
    pub task_id: String,
    pub entries: Vec<SopEntry>,
}

impl Sop {
    pub fn new(task_id: impl Into<String>, entries: Vec<SopEntry>) -> Self {
        Self {
            task_id: task_id.into(),
            entries,
        }
    }

    /// The groundable steps, in order.
    pub fn steps(&self) -> impl Iterator<Item = &SopStep> {
        self.entries.iter().filter_map(|e| match e {
            SopEntry::Step(step) => Some(step),
            _ => None,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Numbered text for inclusion in a prompt.
    pub fn render(&self) -> String {
        self.entries
            .iter()
            .enumerate()
            .map(|(i, entry)| {
                let line = match entry {
                    SopEntry::Step(step) => step.to_string(),
                    SopEntry::Note(text) => text.clone(),
                    SopEntry::Freeform(value) => value.to_string(),
                };
                format!("{}. {}", i + 1, line)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_accept_steps_notes_and_freeform() {
        let json = r#"[
            {"action": "fill", "role": "textbox", "purpose": "Short description", "value": "Reboot"},
            "Open the Closure Information tab",
            {"step": 3, "note": "save"}
        ]"#;
        let entries: Vec<SopEntry> = serde_json::from_str(json).unwrap();
        assert!(matches!(entries[0], SopEntry::Step(_)));
        assert!(matches!(entries[1], SopEntry::Note(_)));
        assert!(matches!(entries[2], SopEntry::Freeform(_)));

        let sop = Sop::new("create-change-request", entries);
        let steps: Vec<_> = sop.steps().collect();
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].target, "Short description");
    }

    #[test]
    fn bool_and_number_values_stay_steps() {
        let json = r#"[
            {"action": "click", "role": "checkbox", "target": "Urgent", "value": true},
            {"action": "select_option", "role": "combobox", "target": "Priority", "value": 2}
        ]"#;
        let entries: Vec<SopEntry> = serde_json::from_str(json).unwrap();
        let sop = Sop::new("t", entries);
        let values: Vec<_> = sop.steps().map(|s| s.value.as_deref()).collect();
        assert_eq!(values, [Some("true"), Some("2")]);
    }

    #[test]
    fn render_numbers_lines() {
        let sop = Sop::new(
            "t",
            vec![
                SopEntry::Step(SopStep::new(ActionType::Click, Some("button"), "Submit")),
                SopEntry::Note("Wait for the list".into()),
            ],
        );
        let text = sop.render();
        assert!(text.starts_with("1. click [button] \"Submit\""));
        assert!(text.contains("2. Wait for the list"));
    }
}
