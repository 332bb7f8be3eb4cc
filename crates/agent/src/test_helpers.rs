//! Shared test helpers: a scripted browser and a page builder that
//! produces real DOM/AX/layout observations.

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use sopilot_core::browser::{BrowserEnv, Observation, StepOutcome};
use sopilot_core::error::BrowserError;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

/// A browser that replays scripted step outcomes and logs the action code
/// it was sent.
pub struct ScriptedEnv {
    first: Observation,
    outcomes: Mutex<Vec<StepOutcome>>,
    actions: Mutex<Vec<String>>,
    closed: AtomicBool,
}

impl ScriptedEnv {
    pub fn new(first: Observation, outcomes: Vec<StepOutcome>) -> Self {
        Self {
            first,
            outcomes: Mutex::new(outcomes),
            actions: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }

    pub fn actions(&self) -> Vec<String> {
        self.actions.lock().unwrap().clone()
    }

    pub fn was_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BrowserEnv for ScriptedEnv {
    async fn reset(&self, _task_id: &str, _seed: u64) -> Result<(Observation, Map<String, Value>), BrowserError> {
        Ok((self.first.clone(), Map::new()))
    }

    async fn step(&self, action_code: &str) -> Result<StepOutcome, BrowserError> {
        self.actions.lock().unwrap().push(action_code.to_string());
        let mut outcomes = self.outcomes.lock().unwrap();
        if outcomes.is_empty() {
            return Err(BrowserError::Bridge {
                status_code: 500,
                message: "no more scripted outcomes".into(),
            });
        }
        Ok(outcomes.remove(0))
    }

    async fn close(&self) -> Result<(), BrowserError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// A change form with a "Short description" textbox and a "Submit" button.
/// `prefix` is prepended to every bid so two pages can differ only in
/// their identifiers.
pub fn form_page(prefix: &str) -> Observation {
    let input = format!("{prefix}12");
    let button = format!("{prefix}20");
    let strings = vec!["HTML", "INPUT", "BUTTON", "bid", input.as_str(), button.as_str()];

    let dom = json!({
        "documents": [{"nodes": {
            "backendNodeId": [1, 12, 20],
            "nodeName": [0, 1, 2],
            "attributes": [[], [3, 4], [3, 5]],
        }}],
        "strings": strings,
    });
    let node = |id: &str, backend: Option<i64>, role: &str, name: &str, parent: Option<&str>, children: &[&str]| {
        json!({
            "nodeId": id,
            "backendDOMNodeId": backend,
            "role": {"type": "role", "value": role},
            "name": {"type": "computedString", "value": name},
            "parentId": parent,
            "childIds": children,
            "properties": [],
        })
    };
    let axtree = json!({"nodes": [
        node("1", None, "RootWebArea", "Change Request", None, &["12", "20"]),
        node("12", Some(12), "textbox", "Short description", Some("1"), &[]),
        node("20", Some(20), "button", "Submit", Some("1"), &[]),
    ]});
    let mut props = Map::new();
    props.insert(
        input.clone(),
        json!({"visibility": 1.0, "bbox": [240.0, 200.0, 300.0, 24.0], "clickable": true}),
    );
    props.insert(
        button.clone(),
        json!({"visibility": 1.0, "bbox": [900.0, 60.0, 80.0, 30.0], "clickable": true}),
    );

    Observation {
        goal: "Create a change request with \"Reboot\" as short description".into(),
        dom_object: Some(dom),
        axtree_object: Some(axtree),
        extra_element_properties: Some(Value::Object(props)),
        open_pages_titles: vec!["Change Request | ServiceNow".into()],
        ..Default::default()
    }
}

pub fn outcome(observation: Observation, reward: f64, terminated: bool) -> StepOutcome {
    let mut info = Map::new();
    if terminated {
        info.insert("task_info".into(), json!({"message": "Task completed"}));
    }
    StepOutcome {
        observation,
        reward,
        terminated,
        truncated: false,
        info,
    }
}
