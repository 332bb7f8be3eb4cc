//! Concrete plans: the planner's output, executed one action at a time.
//!
//! Plans arrive as JSON from the LLM, so most fields are optional and the
//! action type is kept as the raw string until verification parses it.

use serde::{Deserialize, Serialize};
use crate::error::PlanError;

/// The action vocabulary the browser bridge understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionType {
    #[serde(rename = "fill")]
    Fill,
    #[serde(rename = "click")]
    Click,
    #[serde(rename = "focus")]
    Focus,
    #[serde(rename = "select_option")]
    SelectOption,
    #[serde(rename = "scroll")]
    Scroll,
    #[serde(rename = "hover")]
    Hover,
    /// Read a value off the page with the LLM; never sent to the browser
    #[serde(rename = "extractLLM")]
    ExtractLlm,
    #[serde(rename = "send_msg_to_user")]
    SendMsgToUser,
}

impl ActionType {
    pub const ALL: [ActionType; 8] = [
        ActionType::Fill,
        ActionType::Click,
        ActionType::Focus,
        ActionType::SelectOption,
        ActionType::Scroll,
        ActionType::Hover,
        ActionType::ExtractLlm,
        ActionType::SendMsgToUser,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::Fill => "fill",
            ActionType::Click => "click",
            ActionType::Focus => "focus",
            ActionType::SelectOption => "select_option",
            ActionType::Scroll => "scroll",
            ActionType::Hover => "hover",
            ActionType::ExtractLlm => "extractLLM",
            ActionType::SendMsgToUser => "send_msg_to_user",
        }
    }

    /// Whether the action operates on a specific element.
    pub fn targets_element(&self) -> bool {
        !matches!(
            self,
            ActionType::Scroll | ActionType::ExtractLlm | ActionType::SendMsgToUser
        )
    }
}

impl std::str::FromStr for ActionType {
    type Err = PlanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ActionType::ALL
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| PlanError::UnknownAction(s.to_string()))
    }
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An identifier-free element reference, resolved at execution time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TargetRef {
    /// Logical role ("textbox", "button", ...)
    #[serde(default)]
    pub role: Option<String>,
    /// Purpose or visible label text
    #[serde(default)]
    pub label: String,
}

/// One action of a concrete step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlannedAction {
    pub action_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "id_string")]
    pub bid: Option<String>,
    /// String, number, bool or list as the model wrote it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "option")]
    pub options: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instruction: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dx: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dy: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<String>,
    /// Manifest field (or SOP purpose) this action serves
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logic_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<TargetRef>,
}

impl PlannedAction {
    pub fn new(action_type: ActionType) -> Self {
        Self {
            action_type: action_type.as_str().to_string(),
            ..Default::default()
        }
    }

    pub fn on(action_type: ActionType, bid: impl Into<String>) -> Self {
        Self {
            action_type: action_type.as_str().to_string(),
            bid: Some(bid.into()),
            ..Default::default()
        }
    }

    pub fn with_value(mut self, value: impl Into<serde_json::Value>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn with_logic_ref(mut self, logic_ref: impl Into<String>) -> Self {
        self.logic_ref = Some(logic_ref.into());
        self
    }

    /// The parsed action type, if it is one we know.
    pub fn kind(&self) -> Option<ActionType> {
        self.action_type.parse().ok()
    }

    pub fn is(&self, action_type: ActionType) -> bool {
        self.kind() == Some(action_type)
    }
}

/// Models emit bids as strings or bare numbers; accept both.
fn id_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(serde_json::Value::Null) => None,
        Some(serde_json::Value::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
    })
}

/// A logical step grouping one or more actions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConcreteStep {
    #[serde(default, deserialize_with = "step_id_string")]
    pub step_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logical_intent: Option<String>,
    #[serde(default)]
    pub actions: Vec<PlannedAction>,
}

fn step_id_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(id_string(deserializer)?.unwrap_or_default())
}

/// The planner's full answer for one loop iteration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConcretePlan {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thought: Option<String>,
    #[serde(default)]
    pub concrete_steps: Vec<ConcreteStep>,
}

impl ConcretePlan {
    /// Every action across every step, in execution order.
    pub fn actions(&self) -> impl Iterator<Item = &PlannedAction> {
        self.concrete_steps.iter().flat_map(|s| s.actions.iter())
    }

    pub fn is_empty(&self) -> bool {
        self.concrete_steps.is_empty()
    }
}
