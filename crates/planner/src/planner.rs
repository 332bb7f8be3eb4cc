//! The concrete planner.
//!
//! Turns a manifest plus the current page into a [`ConcretePlan`], verifying
//! the result and re-prompting with the problems found until the plan is
//! clean or the repair budget is spent.

use crate::prompts::{CONCRETE_PLANNER, PromptTemplates, REFINE_INDEX};
use crate::sop_library::SopLibrary;
use crate::verify::{PlanIssue, issue_report, verify_plan};
use serde::Serialize;
use serde_json::{Value, json};
use sopilot_core::element::ElementTable;
use sopilot_core::error::PlanError;
use sopilot_core::manifest::TaskManifest;
use sopilot_core::plan::{ConcretePlan, ConcreteStep};
use sopilot_grounding::BidIndex;
use sopilot_observe::{FilterMode, prompt_table};
use sopilot_providers::{LlmClient, LlmError, RetryPolicy, StructuredReply};
use sopilot_telemetry::LlmTraceWriter;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of one planning round.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PlanOutcome {
    pub steps: Vec<ConcreteStep>,
    pub thought: Option<String>,
    pub bid_index: BidIndex,
    /// Verification rounds used
    pub attempts: u32,
    /// Issues left when the repair budget ran out
    pub verification_errors: Vec<PlanIssue>,
    /// Set when no plan could be produced at all
    pub error: Option<String>,
}

impl PlanOutcome {
    fn failed(bid_index: BidIndex, error: PlanError) -> Self {
        Self {
            bid_index,
            error: Some(error.to_string()),
            ..Default::default()
        }
    }

    pub fn plan(&self) -> ConcretePlan {
        ConcretePlan {
            thought: self.thought.clone(),
            concrete_steps: self.steps.clone(),
        }
    }

    pub fn is_verified(&self) -> bool {
        self.error.is_none() && self.verification_errors.is_empty()
    }
}

pub struct ConcretePlanner {
    client: LlmClient,
    prompts: PromptTemplates,
    sops: Arc<SopLibrary>,
    traces: LlmTraceWriter,
    policy: RetryPolicy,
    repair_attempts: u32,
}

fn trace_payload(result: &Result<StructuredReply, LlmError>) -> Value {
    match result {
        Ok(reply) => json!({"parsed_data": reply.data, "reasoning": reply.reasoning, "error": null}),
        Err(e) => json!({"parsed_data": null, "reasoning": null, "error": e.to_string()}),
    }
}

fn section(title: &str, body: &str) -> String {
    format!("\n## {title}\n{body}\n")
}

impl ConcretePlanner {
    pub fn new(client: LlmClient, prompts: PromptTemplates, sops: Arc<SopLibrary>, traces: LlmTraceWriter) -> Self {
        Self {
            client,
            prompts,
            sops,
            traces,
            policy: RetryPolicy::default(),
            repair_attempts: 3,
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_repair_attempts(mut self, attempts: u32) -> Self {
        self.repair_attempts = attempts;
        self
    }

    /// Ask the model to resolve `NOT_FOUND` index entries. Does nothing when
    /// every entry is already located. Failures leave the index untouched.
    pub async fn refine_index(&self, table: &ElementTable, index: &mut BidIndex) {
        if !index.has_missing() {
            return;
        }
        let csv = match prompt_table(table, FilterMode::Light) {
            Ok((csv, _)) => csv,
            Err(e) => {
                warn!(error = %e, "cannot render observation for index refinement");
                return;
            }
        };
        let index_json = index.to_json_pretty();
        let prompt = self
            .prompts
            .render(REFINE_INDEX, &[("bid_index", index_json.as_str()), ("observation_csv", csv.as_str())]);

        let result = self.client.fetch_json(&prompt).await;
        let payload = match &result {
            Ok(reply) => json!({"parsed_data": reply.data, "error": null}),
            Err(e) => json!({"parsed_data": null, "error": e.to_string()}),
        };
        self.traces.record(REFINE_INDEX, &prompt, &payload);

        match result {
            Ok(StructuredReply {
                data: Value::Object(update),
                ..
            }) => {
                let changed = index.merge_refinement(&update);
                info!(changed, still_missing = index.missing_fields().len(), "bid index refined");
            }
            Ok(_) => warn!("index refinement reply is not an object"),
            Err(e) => warn!(error = %e, "index refinement failed"),
        }
    }

    fn plan_prompt(
        &self,
        manifest: &TaskManifest,
        table: &ElementTable,
        index: &BidIndex,
        instruction: Option<&str>,
        original: Option<&ConcretePlan>,
    ) -> Result<String, PlanError> {
        let (csv, stats) =
            prompt_table(table, FilterMode::Aggressive).map_err(|e| PlanError::Generation(e.to_string()))?;
        debug!(%stats, "observation filtered for planning");

        let manifest_json =
            serde_json::to_string_pretty(manifest).map_err(|e| PlanError::Generation(e.to_string()))?;
        let sop_section = self
            .sops
            .lookup(&manifest.task_metadata.task_id)
            .filter(|sop| !sop.is_empty())
            .map(|sop| {
                section(
                    "Standard operating procedure",
                    &format!(
                        "Follow these steps in order. They name roles and labels, not BIDs; \
                         find the matching element in the CSV.\n{}",
                        sop.render()
                    ),
                )
            })
            .unwrap_or_default();
        let original_section = match original {
            Some(plan) => section(
                "Previous plan",
                &serde_json::to_string_pretty(&plan.concrete_steps).map_err(|e| PlanError::Generation(e.to_string()))?,
            ),
            None => String::new(),
        };
        let refine_section = instruction
            .filter(|i| !i.trim().is_empty())
            .map(|i| section("Instructions for this round", i))
            .unwrap_or_default();

        let index_json = index.to_json_pretty();
        Ok(self.prompts.render(
            CONCRETE_PLANNER,
            &[
                ("page_title", table.page_title.as_str()),
                ("focused_bid", table.focused_bid.as_str()),
                ("manifest", manifest_json.as_str()),
                ("bid_index", index_json.as_str()),
                ("sop_section", sop_section.as_str()),
                ("observation_csv", csv.as_str()),
                ("original_plan_section", original_section.as_str()),
                ("refine_section", refine_section.as_str()),
            ],
        ))
    }

    async fn complete_plan(&self, prompt: &str, mode: &str) -> Result<ConcretePlan, PlanError> {
        let traces = &self.traces;
        let reply = self
            .client
            .fetch_json_with_retry(prompt, self.policy, |_, result| {
                traces.record(mode, prompt, &trace_payload(result))
            })
            .await
            .map_err(|e| PlanError::Generation(e.to_string()))?;

        let mut plan: ConcretePlan =
            serde_json::from_value(reply.data).map_err(|e| PlanError::Generation(format!("plan shape: {e}")))?;
        if plan.thought.is_none() {
            plan.thought = reply.reasoning;
        }
        Ok(plan)
    }

    /// The first plan for the current page.
    pub async fn generate(
        &self,
        manifest: &TaskManifest,
        table: &ElementTable,
        index: &BidIndex,
        refine_instruction: Option<&str>,
    ) -> Result<ConcretePlan, PlanError> {
        let prompt = self.plan_prompt(manifest, table, index, refine_instruction, None)?;
        self.complete_plan(&prompt, "initial").await
    }

    /// Re-plan with the verification report in front of everything else.
    pub async fn refine(
        &self,
        original: &ConcretePlan,
        issues: &[PlanIssue],
        manifest: &TaskManifest,
        table: &ElementTable,
        index: &BidIndex,
        refine_instruction: Option<&str>,
    ) -> Result<ConcretePlan, PlanError> {
        let combined = format!(
            "{}\n\n### Fix these problems first\n{}\n\nNever invent BIDs. After expanding a tab or section, finish the fields inside it.",
            refine_instruction.unwrap_or_default(),
            issue_report(issues)
        );
        let prompt = self.plan_prompt(manifest, table, index, Some(&combined), Some(original))?;
        self.complete_plan(&prompt, "refine").await
    }

    /// Index, plan, verify and repair.
    pub async fn run_repair_loop(
        &self,
        manifest: &TaskManifest,
        table: &ElementTable,
        refine_instruction: Option<&str>,
    ) -> PlanOutcome {
        let mut index = BidIndex::build(manifest, table);
        self.refine_index(table, &mut index).await;

        let mut plan = match self.generate(manifest, table, &index, refine_instruction).await {
            Ok(plan) => plan,
            Err(e) => return PlanOutcome::failed(index, e),
        };

        let rounds = self.repair_attempts.max(1);
        let mut issues = Vec::new();
        for round in 1..=rounds {
            issues = verify_plan(&plan, manifest, &index, table);
            if issues.is_empty() {
                info!(round, actions = plan.actions().count(), "plan passed verification");
                return PlanOutcome {
                    steps: plan.concrete_steps,
                    thought: plan.thought,
                    bid_index: index,
                    attempts: round,
                    ..Default::default()
                };
            }
            warn!(round, issues = issues.len(), report = %issue_report(&issues), "plan failed verification");
            if round == rounds {
                break;
            }
            plan = match self
                .refine(&plan, &issues, manifest, table, &index, refine_instruction)
                .await
            {
                Ok(plan) => plan,
                Err(e) => return PlanOutcome::failed(index, e),
            };
        }

        PlanOutcome {
            steps: plan.concrete_steps,
            thought: plan.thought,
            bid_index: index,
            attempts: rounds,
            verification_errors: issues,
            error: None,
        }
    }
}
