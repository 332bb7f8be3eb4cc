//! The autonomous task loop.
//!
//! One task, one browser session, one action at a time:
//!
//! 1. **Reset** the environment and record the opening page
//! 2. **Analyze** the goal into a manifest
//! 3. **Observe**: fuse the latest observation and audit progress
//! 4. **Plan** against the page, with verification and repair
//! 5. **Act**: ground, render and execute each action, recording every step
//!
//! Steps 3 to 5 repeat until the task ends, the planner gives up, or the loop
//! budget runs out. The environment is always closed and the history always
//! written, whatever happened.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde_json::{Map, Value};
use sopilot_browser::render_action;
use sopilot_config::AppConfig;
use sopilot_core::browser::{BrowserEnv, Observation};
use sopilot_core::element::ElementTable;
use sopilot_core::event::{DomainEvent, EventBus};
use sopilot_core::plan::{ActionType, ConcreteStep, PlannedAction};
use sopilot_core::provider::Provider;
use sopilot_grounding::Grounder;
use sopilot_planner::{ConcretePlanner, GoalAnalyzer, ObservationExtractor, PromptTemplates, SopLibrary};
use sopilot_providers::{LlmClient, RetryPolicy};
use sopilot_telemetry::{LlmTraceWriter, RunSummary, StepRecorder, StepState, TaskHistory};
use tracing::{debug, error, info, warn};

use crate::progress::Progress;

const LAST_ACTION_ERROR: &str = "last_action_error";

/// Loop budgets and delays.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub seed: u64,
    pub max_loops: u32,
    pub output_dir: PathBuf,
    /// Pause after every executed action
    pub settle_delay: Duration,
    /// Pause before reading a value off the page
    pub extract_wait: Duration,
    pub llm_policy: RetryPolicy,
    pub repair_attempts: u32,
}

impl RunSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            seed: config.browser.seed,
            max_loops: config.agent.max_loops,
            output_dir: PathBuf::from(&config.agent.output_dir),
            settle_delay: Duration::from_millis(config.browser.settle_delay_ms),
            extract_wait: Duration::from_millis(config.browser.extract_wait_ms),
            llm_policy: RetryPolicy {
                attempts: config.agent.llm_attempts,
                delay: Duration::from_millis(config.agent.llm_retry_delay_ms),
            },
            repair_attempts: config.agent.repair_attempts,
        }
    }
}

/// Insert a `focus` on the target of a trailing click so the last edited
/// field commits before the click fires. Skipped when the click follows
/// another click.
pub fn insert_focus_before_final_click(steps: &mut [ConcreteStep]) {
    let Some(step) = steps.last_mut() else { return };
    let Some(last) = step.actions.last() else { return };
    if !last.is(ActionType::Click) {
        return;
    }
    let n = step.actions.len();
    if n >= 2 && step.actions[n - 2].is(ActionType::Click) {
        return;
    }
    let focus = PlannedAction {
        bid: last.bid.clone(),
        target: last.target.clone(),
        logic_ref: Some("Safety focus-out before final click".into()),
        ..PlannedAction::new(ActionType::Focus)
    };
    step.actions.insert(n - 1, focus);
}

fn preview(text: &str) -> String {
    text.chars().take(80).collect()
}

/// Drives tasks end to end against one browser environment.
pub struct TaskRunner {
    env: Arc<dyn BrowserEnv>,
    client: LlmClient,
    prompts: PromptTemplates,
    rules_dir: PathBuf,
    sops: Arc<SopLibrary>,
    events: Arc<EventBus>,
    settings: RunSettings,
}

/// Per-task components, rooted in the task's output directory.
struct TaskContext {
    recorder: StepRecorder,
    planner: ConcretePlanner,
    extractor: ObservationExtractor,
}

impl TaskRunner {
    pub fn new(env: Arc<dyn BrowserEnv>, client: LlmClient, events: Arc<EventBus>, settings: RunSettings) -> Self {
        Self {
            env,
            client,
            prompts: PromptTemplates::builtin("en"),
            rules_dir: PathBuf::from("rules"),
            sops: Arc::new(SopLibrary::disabled()),
            events,
            settings,
        }
    }

    /// Everything from the loaded configuration.
    pub fn from_config(
        config: &AppConfig,
        env: Arc<dyn BrowserEnv>,
        provider: Arc<dyn Provider>,
        events: Arc<EventBus>,
    ) -> Self {
        let client = LlmClient::new(provider, &config.default_model)
            .with_temperature(config.default_temperature)
            .with_max_tokens(config.default_max_tokens);
        Self::new(env, client, events, RunSettings::from_config(config))
            .with_prompts(PromptTemplates::new(&config.prompts.template_dir, &config.language))
            .with_rules_dir(&config.prompts.rules_dir)
            .with_sops(Arc::new(SopLibrary::new(&config.sop.library_path, config.sop.enabled)))
    }

    pub fn with_prompts(mut self, prompts: PromptTemplates) -> Self {
        self.prompts = prompts;
        self
    }

    pub fn with_rules_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.rules_dir = dir.into();
        self
    }

    pub fn with_sops(mut self, sops: Arc<SopLibrary>) -> Self {
        self.sops = sops;
        self
    }

    fn context(&self, task_id: &str) -> Result<TaskContext, sopilot_core::Error> {
        let recorder = StepRecorder::for_task(&self.settings.output_dir, task_id)?;
        let planner = ConcretePlanner::new(
            self.client.clone(),
            self.prompts.clone(),
            self.sops.clone(),
            LlmTraceWriter::new(recorder.dir(), "planner_logs")?,
        )
        .with_policy(self.settings.llm_policy)
        .with_repair_attempts(self.settings.repair_attempts);
        let extractor = ObservationExtractor::new(
            self.client.clone(),
            self.prompts.clone(),
            LlmTraceWriter::new(recorder.dir(), "extractor_logs")?,
        );
        Ok(TaskContext {
            recorder,
            planner,
            extractor,
        })
    }

    /// Run one task to completion and return its summary.
    ///
    /// Only a failure to set up the output directory is an error; anything
    /// that goes wrong during the task ends it, is logged, and shows in the
    /// summary as a failed run.
    pub async fn run(&self, task_id: &str) -> Result<RunSummary, sopilot_core::Error> {
        let ctx = self.context(task_id)?;
        let mut history = TaskHistory::new(task_id);
        info!(task_id, dir = %ctx.recorder.dir().display(), "Mission started");

        if let Err(e) = self.drive(task_id, &ctx, &mut history).await {
            error!(task_id, error = %e, "Task aborted");
            self.events.publish(DomainEvent::ErrorOccurred {
                context: task_id.to_string(),
                error_message: e.to_string(),
                timestamp: Utc::now(),
            });
        }

        if let Err(e) = self.env.close().await {
            warn!(error = %e, "Closing the browser environment failed");
        }
        if let Err(e) = ctx.recorder.write_history(&history) {
            warn!(error = %e, "Task history not written");
        }

        let summary = history.summary(ctx.recorder.dir().display().to_string());
        info!(
            task_id,
            status = summary.status(),
            reward = summary.reward,
            message = %summary.message,
            steps = summary.steps,
            logs = %summary.output_dir,
            "Mission over"
        );
        self.events.publish(DomainEvent::TaskFinished {
            task_id: task_id.to_string(),
            reward: summary.reward,
            timestamp: Utc::now(),
        });
        Ok(summary)
    }

    async fn drive(&self, task_id: &str, ctx: &TaskContext, history: &mut TaskHistory) -> Result<(), sopilot_core::Error> {
        let (mut observation, mut info) = self.env.reset(task_id, self.settings.seed).await?;
        record_step(&ctx.recorder, history, "0", StepState::initial(&observation, &info));
        self.events.publish(DomainEvent::TaskStarted {
            task_id: task_id.to_string(),
            goal_preview: preview(&observation.goal),
            timestamp: Utc::now(),
        });

        let analyzer = GoalAnalyzer::new(self.client.clone(), self.prompts.clone(), &self.rules_dir);
        let manifest = analyzer.analyze(&observation.goal, task_id).await?;

        let mut progress = Progress::default();
        let mut extracted: Option<String> = None;

        for loop_index in 1..=self.settings.max_loops {
            info!(loop_index, max = self.settings.max_loops, "Autonomous loop");
            let table = page_table(&observation);

            progress.audit(&manifest, &table);
            let instruction = progress.refine_instruction(extracted.as_deref());

            let outcome = ctx
                .planner
                .run_repair_loop(&manifest, &table, Some(&instruction))
                .await;
            self.events.publish(DomainEvent::PlanGenerated {
                task_id: task_id.to_string(),
                loop_index,
                steps: outcome.steps.len(),
                attempts: outcome.attempts,
                timestamp: Utc::now(),
            });
            if outcome.steps.is_empty() {
                match &outcome.error {
                    None => {
                        info!(loop_index, "Planner returned no steps, giving up");
                        break;
                    }
                    Some(e) => {
                        warn!(loop_index, error = %e, "Planning failed");
                        continue;
                    }
                }
            }
            if let Some(thought) = &outcome.thought {
                debug!(loop_index, %thought, "Plan thought");
            }

            let mut steps = outcome.steps;
            insert_focus_before_final_click(&mut steps);

            let mut finished = false;
            'steps: for step in &steps {
                let step_label = if step.step_id.is_empty() { "step" } else { step.step_id.as_str() };
                for (action_index, planned) in step.actions.iter().enumerate() {
                    if planned.is(ActionType::ExtractLlm) {
                        let instruction = planned.instruction.clone().unwrap_or_default();
                        tokio::time::sleep(self.settings.extract_wait).await;
                        let value = ctx.extractor.extract(&instruction, &table).await;
                        self.events.publish(DomainEvent::ValueExtracted {
                            instruction: instruction.clone(),
                            value: value.clone(),
                            timestamp: Utc::now(),
                        });
                        let taken = format!("extractLLM: {value}");
                        record_step(
                            &ctx.recorder,
                            history,
                            &format!("L{loop_index}_PERCEIVE"),
                            StepState::initial(&observation, &info).with_action(&taken),
                        );
                        extracted = Some(value);
                        break 'steps;
                    }

                    let mut action = planned.clone();
                    match Grounder::reground(&action, &table) {
                        Ok(Some(grounding)) => {
                            let target = action.target.clone().unwrap_or_default();
                            info!(label = %target.label, bid = %grounding.bid, "Target grounded");
                            self.events.publish(DomainEvent::TargetGrounded {
                                role: target.role.unwrap_or_default(),
                                label: target.label,
                                bid: grounding.bid.clone(),
                                timestamp: Utc::now(),
                            });
                            action.bid = Some(grounding.bid);
                        }
                        Ok(None) => {}
                        Err(e) => {
                            warn!(error = %e, "Grounding failed");
                            info.insert(LAST_ACTION_ERROR.into(), Value::String(e.to_string()));
                            break 'steps;
                        }
                    }

                    let code = match render_action(&action, extracted.as_deref()) {
                        Ok(Some(code)) => code,
                        Ok(None) => continue,
                        Err(e) => {
                            warn!(error = %e, "Action not renderable");
                            info.insert(LAST_ACTION_ERROR.into(), Value::String(e.to_string()));
                            break 'steps;
                        }
                    };
                    info!(action = %code, "Executing");

                    let started = Instant::now();
                    let (reward, terminated, truncated) = match self.env.step(&code).await {
                        Ok(outcome) => {
                            observation = outcome.observation;
                            info = outcome.info;
                            (outcome.reward, outcome.terminated, outcome.truncated)
                        }
                        Err(e) => {
                            warn!(error = %e, "Step failed");
                            info.insert(LAST_ACTION_ERROR.into(), Value::String(e.to_string()));
                            (0.0, false, false)
                        }
                    };
                    tokio::time::sleep(self.settings.settle_delay).await;

                    let failed = has_action_error(&info) || observation.action_failed();
                    self.events.publish(DomainEvent::ActionExecuted {
                        action_code: code.clone(),
                        success: !failed,
                        duration_ms: started.elapsed().as_millis() as u64,
                        timestamp: Utc::now(),
                    });

                    let state = StepState {
                        observation: &observation,
                        info: &info,
                        action: Some(&code),
                        reward,
                        terminated,
                        truncated,
                    };
                    let label = format!("L{loop_index}_{step_label}_{}", action_index + 1);
                    record_step(&ctx.recorder, history, &label, state);

                    if terminated || truncated {
                        finished = true;
                        break 'steps;
                    }
                    if failed {
                        warn!(loop_index, "Last action failed, replanning");
                        break 'steps;
                    }
                }
            }
            if finished {
                break;
            }
        }
        Ok(())
    }
}

/// Record a step into the history. A step that cannot be written is
/// logged and left out; recording never ends a task.
fn record_step(recorder: &StepRecorder, history: &mut TaskHistory, label: &str, state: StepState<'_>) {
    match recorder.save_step(label, state) {
        Ok((record, _)) => history.push(record),
        Err(e) => warn!(step = label, error = %e, "Step not recorded"),
    }
}

/// The element table for an observation. A malformed observation yields an
/// empty table so the loop can still plan (and usually scroll or wait).
fn page_table(observation: &Observation) -> ElementTable {
    match sopilot_observe::element_table(observation) {
        Ok(table) => table,
        Err(e) => {
            warn!(error = %e, "Observation not fusable, planning on an empty page");
            ElementTable::new(
                observation.page_title(),
                observation.focused_element_bid.clone().unwrap_or_default(),
                Vec::new(),
            )
        }
    }
}

fn has_action_error(info: &Map<String, Value>) -> bool {
    info.get(LAST_ACTION_ERROR)
        .and_then(Value::as_str)
        .is_some_and(|e| !e.trim().is_empty())
}
