//! End-to-end tests for the sopilot agent.
//!
//! A page is recorded to disk the way a live run records it, then replayed:
//! through fusion and grounding on its own, and through a full SOP-guided
//! task with a scripted model and a scripted browser.

use std::sync::{Arc, Mutex};

use serde_json::{Map, Value, json};
use sopilot_agent::TaskRunner;
use sopilot_browser::render_action;
use sopilot_config::AppConfig;
use sopilot_core::browser::{BrowserEnv, Observation, StepOutcome};
use sopilot_core::error::BrowserError;
use sopilot_core::event::{DomainEvent, EventBus};
use sopilot_grounding::Grounder;
use sopilot_observe::{FilterMode, element_table, prompt_table};
use sopilot_planner::SopLibrary;
use sopilot_providers::test_helpers::SequentialMockProvider;
use sopilot_telemetry::{HISTORY_FILE, StepRecorder, StepState, load_observation};

const TASK: &str = "workarena.servicenow.create-incident";

const SOPS: &str = r#"
create-incident:
  target_task_id: workarena.servicenow.create-incident
  template_output_format:
    sop_content:
      - {action: fill, role: textbox, target: Short description, value: Printer jam}
      - {action: select_option, role: combobox, target: Impact, value: 2 - Medium}
      - {action: click, role: button, purpose: Submit}
"#;

// ── Scripted browser ─────────────────────────────────────────────────────

/// Replays the same page after every action; the last action ends the task.
struct ReplayEnv {
    page: Observation,
    remaining: Mutex<usize>,
    actions: Mutex<Vec<String>>,
}

#[async_trait::async_trait]
impl BrowserEnv for ReplayEnv {
    async fn reset(&self, _task_id: &str, _seed: u64) -> Result<(Observation, Map<String, Value>), BrowserError> {
        Ok((self.page.clone(), Map::new()))
    }

    async fn step(&self, action_code: &str) -> Result<StepOutcome, BrowserError> {
        self.actions.lock().unwrap().push(action_code.to_string());
        let mut remaining = self.remaining.lock().unwrap();
        *remaining = remaining.saturating_sub(1);
        let done = *remaining == 0;
        let mut info = Map::new();
        if done {
            info.insert("task_info".into(), json!({"message": "Incident created"}));
        }
        Ok(StepOutcome {
            observation: self.page.clone(),
            reward: if done { 1.0 } else { 0.0 },
            terminated: done,
            truncated: false,
            info,
        })
    }

    async fn close(&self) -> Result<(), BrowserError> {
        Ok(())
    }
}

// ── Recorded page ────────────────────────────────────────────────────────

fn ax(id: &str, backend: Option<i64>, role: &str, name: &str, children: &[&str]) -> Value {
    json!({
        "nodeId": id,
        "backendDOMNodeId": backend,
        "role": {"type": "role", "value": role},
        "name": {"type": "computedString", "value": name},
        "parentId": if id == "1" { Value::Null } else { json!("1") },
        "childIds": children,
        "properties": [],
    })
}

/// An incident form: a short description textbox, an impact select and a
/// submit button.
fn incident_page() -> Observation {
    let dom = json!({
        "documents": [{"nodes": {
            "backendNodeId": [1, 51, 57, 80],
            "nodeName": [0, 1, 2, 3],
            "attributes": [[], [4, 5], [4, 6], [4, 7]],
        }}],
        "strings": ["HTML", "INPUT", "SELECT", "BUTTON", "bid", "a51", "a57", "a80"],
    });
    let axtree = json!({"nodes": [
        ax("1", None, "RootWebArea", "New Incident", &["51", "57", "80"]),
        ax("51", Some(51), "textbox", "Short description", &[]),
        ax("57", Some(57), "combobox", "Impact", &[]),
        ax("80", Some(80), "button", "Submit", &[]),
    ]});
    let props = json!({
        "a51": {"visibility": 1.0, "bbox": [240.0, 220.0, 320.0, 24.0], "clickable": true},
        "a57": {"visibility": 1.0, "bbox": [240.0, 260.0, 200.0, 24.0], "clickable": true},
        "a80": {"visibility": 1.0, "bbox": [920.0, 70.0, 80.0, 30.0], "clickable": true},
    });
    Observation {
        goal: "Create an incident for a printer jam with impact 2 - Medium".into(),
        dom_object: Some(dom),
        axtree_object: Some(axtree),
        extra_element_properties: Some(props),
        open_pages_titles: vec!["New Incident | ServiceNow".into()],
        ..Default::default()
    }
}

/// Record the page to disk and read it back, the way `sopilot observe`
/// and `sopilot ground` see it.
fn recorded_page(dir: &std::path::Path) -> Observation {
    let recorder = StepRecorder::for_task(dir, TASK).unwrap();
    let page = incident_page();
    let (_, path) = recorder.save_step("0", StepState::initial(&page, &Map::new())).unwrap();
    load_observation(path).unwrap()
}

// ── E2E: recorded page → fusion → SOP grounding ──────────────────────────

#[test]
fn e2e_recorded_page_grounds_every_sop_step() {
    let dir = tempfile::tempdir().unwrap();
    let observation = recorded_page(dir.path());
    let table = element_table(&observation).unwrap();
    assert!(table.contains("a51") && table.contains("a57") && table.contains("a80"));

    let (csv, stats) = prompt_table(&table, FilterMode::Aggressive).unwrap();
    assert!(csv.contains("Short description"));
    assert!(stats.after <= stats.before);

    let sop_path = dir.path().join("sops.yaml");
    std::fs::write(&sop_path, SOPS).unwrap();
    let sop = SopLibrary::new(&sop_path, true).lookup(TASK).unwrap();

    let codes: Vec<String> = sop
        .steps()
        .map(|step| {
            let grounding = Grounder::ground_step(step, &table).unwrap();
            let action = grounding.to_action(None).unwrap();
            render_action(&action, None).unwrap().unwrap()
        })
        .collect();
    assert_eq!(
        codes,
        [
            "fill(bid='a51', value='Printer jam')",
            "select_option(bid='a57', options='2 - Medium')",
            "click('a80')",
        ]
    );
}

// ── E2E: SOP-guided task from config to history ──────────────────────────

#[tokio::test(start_paused = true)]
async fn e2e_sop_guided_task_succeeds() {
    let dir = tempfile::tempdir().unwrap();
    let page = recorded_page(&dir.path().join("recorded"));
    let sop_path = dir.path().join("sops.yaml");
    std::fs::write(&sop_path, SOPS).unwrap();

    let mut config = AppConfig::default();
    config.sop.enabled = true;
    config.sop.library_path = sop_path.display().to_string();
    config.agent.output_dir = dir.path().join("runs").display().to_string();
    config.prompts.template_dir = dir.path().join("prompts").display().to_string();
    config.prompts.rules_dir = dir.path().join("rules").display().to_string();
    config.browser.settle_delay_ms = 0;
    config.browser.extract_wait_ms = 0;
    config.agent.llm_retry_delay_ms = 1;

    let goal = r#"{"MISSION_INTENT": "CREATE",
        "SPECIFICATION": {"FIELDS": {"Short description": "Printer jam", "Impact": "2 - Medium"}}}"#;
    let plan = r#"{"thought": "follow the SOP", "concrete_steps": [{"step_id": 1, "actions": [
        {"action_type": "fill", "bid": "a51", "value": "Printer jam", "logic_ref": "Short description"},
        {"action_type": "select_option", "bid": "a57", "options": "2 - Medium", "logic_ref": "Impact"},
        {"action_type": "click", "bid": "a80"}]}]}"#;
    let provider = Arc::new(SequentialMockProvider::replying(&[goal, plan]));
    let env = Arc::new(ReplayEnv {
        page,
        remaining: Mutex::new(4),
        actions: Mutex::new(Vec::new()),
    });
    let events = Arc::new(EventBus::default());
    let mut rx = events.subscribe();

    let runner = TaskRunner::from_config(&config, env.clone(), provider.clone(), events);
    let summary = runner.run(TASK).await.expect("run should complete");

    assert_eq!(summary.status(), "SUCCESS");
    assert_eq!(summary.message, "Incident created");
    assert_eq!(
        *env.actions.lock().unwrap(),
        [
            "fill(bid='a51', value='Printer jam')",
            "select_option(bid='a57', options='2 - Medium')",
            "focus('a80')",
            "click('a80')",
        ]
    );

    let prompts = provider.prompts();
    assert_eq!(prompts.len(), 2);
    assert!(prompts[1].contains("Standard operating procedure"));
    assert!(prompts[1].contains("Printer jam"));

    let history: Value =
        serde_json::from_str(&std::fs::read_to_string(std::path::Path::new(&summary.output_dir).join(HISTORY_FILE)).unwrap())
            .unwrap();
    let steps = history.as_array().unwrap();
    assert_eq!(steps.len(), 5);
    assert_eq!(steps[4]["action_taken"], "click('a80')");
    assert_eq!(steps[4]["reward"], 1.0);

    let mut plans = 0;
    while let Ok(event) = rx.try_recv() {
        if let DomainEvent::PlanGenerated { steps, attempts, .. } = event.as_ref() {
            assert_eq!((*steps, *attempts), (1, 1));
            plans += 1;
        }
    }
    assert_eq!(plans, 1);
}
