//! Planned actions → BrowserGym action code.
//!
//! The bridge evaluates the code with BrowserGym's high-level action set,
//! so literals are written the way Python's `repr` writes them.

use serde_json::Value;
use sopilot_core::plan::{ActionType, PlannedAction};
use thiserror::Error;

/// Placeholder a plan uses for the most recently extracted value.
pub const EXTRACT_PLACEHOLDER: &str = "extractValue";

const SCROLL_STEP: i64 = 500;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ActionCodeError {
    #[error("unknown action type '{0}'")]
    UnknownAction(String),

    #[error("{0} needs a bid")]
    MissingBid(ActionType),

    #[error("select_option needs options or a value")]
    MissingOptions,
}

/// A Python string literal with the same quoting `repr` picks.
pub fn py_str(s: &str) -> String {
    let quote = if s.contains('\'') && !s.contains('"') { '"' } else { '\'' };
    let mut out = String::with_capacity(s.len() + 2);
    out.push(quote);
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c if (c as u32) < 0x20 || c == '\x7f' => out.push_str(&format!("\\x{:02x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push(quote);
    out
}

/// A Python literal for a JSON value.
pub fn py_literal(value: &Value) -> String {
    match value {
        Value::Null => "None".into(),
        Value::Bool(true) => "True".into(),
        Value::Bool(false) => "False".into(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => py_str(s),
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().map(py_literal).collect();
            format!("[{}]", parts.join(", "))
        }
        Value::Object(map) => {
            let parts: Vec<String> = map
                .iter()
                .map(|(k, v)| format!("{}: {}", py_str(k), py_literal(v)))
                .collect();
            format!("{{{}}}", parts.join(", "))
        }
    }
}

/// Substitute the last extracted value into every string of `value`.
fn bind(value: &Value, extracted: Option<&str>) -> Value {
    let Some(extracted) = extracted else {
        return value.clone();
    };
    match value {
        Value::String(s) if s.contains(EXTRACT_PLACEHOLDER) => Value::String(s.replace(EXTRACT_PLACEHOLDER, extracted)),
        Value::Array(items) => Value::Array(items.iter().map(|v| bind(v, Some(extracted))).collect()),
        other => other.clone(),
    }
}

/// Scalars as text; strings unquoted.
fn text_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn non_empty(value: Option<&Value>) -> Option<&Value> {
    value.filter(|v| match v {
        Value::Null => false,
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        _ => true,
    })
}

/// Render one action. `extractLLM` runs inside the agent and has no code,
/// so it renders as `None`.
pub fn render_action(action: &PlannedAction, extracted: Option<&str>) -> Result<Option<String>, ActionCodeError> {
    let kind = action
        .kind()
        .ok_or_else(|| ActionCodeError::UnknownAction(action.action_type.clone()))?;
    let bid = || {
        action
            .bid
            .as_deref()
            .filter(|b| !b.trim().is_empty())
            .map(py_str)
            .ok_or(ActionCodeError::MissingBid(kind))
    };

    let code = match kind {
        ActionType::ExtractLlm => return Ok(None),
        ActionType::SelectOption => {
            let options = non_empty(action.options.as_ref())
                .or(non_empty(action.value.as_ref()))
                .ok_or(ActionCodeError::MissingOptions)?;
            format!("select_option(bid={}, options={})", bid()?, py_literal(&bind(options, extracted)))
        }
        ActionType::SendMsgToUser => {
            let message = action
                .message
                .as_ref()
                .filter(|m| !m.is_empty())
                .map(|m| Value::String(m.clone()))
                .or_else(|| non_empty(action.value.as_ref()).cloned())
                .unwrap_or_else(|| Value::String("Done.".into()));
            format!("send_msg_to_user({})", py_str(&text_of(&bind(&message, extracted))))
        }
        ActionType::Fill => {
            let value = bind(action.value.as_ref().unwrap_or(&Value::Null), extracted);
            let text = text_of(&value);
            if matches!(text.trim().to_lowercase().as_str(), "true" | "false") {
                format!("click(bid={})", bid()?)
            } else {
                format!("fill(bid={}, value={})", bid()?, py_str(&text))
            }
        }
        ActionType::Scroll => {
            let dx = action.dx.unwrap_or(0);
            let mut dy = action.dy.unwrap_or(0);
            if dy == 0 {
                dy = match action.direction.as_deref().unwrap_or("down") {
                    "down" => SCROLL_STEP,
                    "up" => -SCROLL_STEP,
                    _ => 0,
                };
            }
            format!("scroll({dx}, {dy})")
        }
        ActionType::Click | ActionType::Hover | ActionType::Focus => format!("{kind}({})", bid()?),
    };
    Ok(Some(code))
}
