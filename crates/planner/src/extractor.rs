//! Read-only perception: ask the model for one value shown on the page.

use crate::prompts::{EXTRACTOR, PromptTemplates};
use serde_json::{Value, json};
use sopilot_core::element::ElementTable;
use sopilot_observe::{FilterMode, prompt_table};
use sopilot_providers::LlmClient;
use sopilot_telemetry::LlmTraceWriter;
use tracing::{error, info};

pub const NOT_FOUND: &str = "NOT_FOUND";

pub struct ObservationExtractor {
    client: LlmClient,
    prompts: PromptTemplates,
    traces: LlmTraceWriter,
}

/// Reduce a reply to a bare value string.
pub fn normalize_value(data: &Value) -> String {
    let text = match data {
        Value::Object(map) if map.len() == 1 => match map.values().next() {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => String::new(),
        },
        Value::Object(_) | Value::Array(_) => data.to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    text.trim().trim_matches('"').trim_matches('\'').to_string()
}

impl ObservationExtractor {
    pub fn new(client: LlmClient, prompts: PromptTemplates, traces: LlmTraceWriter) -> Self {
        Self { client, prompts, traces }
    }

    /// The value `instruction` asks for, `NOT_FOUND`, or `ERROR: ...` when
    /// the model could not be asked.
    pub async fn extract(&self, instruction: &str, table: &ElementTable) -> String {
        let csv = match prompt_table(table, FilterMode::Light) {
            Ok((csv, _)) => csv,
            Err(e) => return format!("ERROR: {e}"),
        };
        let prompt = self.prompts.render(
            EXTRACTOR,
            &[
                ("page_title", table.page_title.as_str()),
                ("instruction", instruction),
                ("observation_csv", csv.as_str()),
            ],
        );

        let result = self.client.fetch_json(&prompt).await;
        let trace = match &result {
            Ok(reply) => json!({
                "instruction": instruction,
                "page_title": table.page_title,
                "extracted_data": reply.data,
                "reasoning": reply.reasoning,
                "error": null,
            }),
            Err(e) => json!({
                "instruction": instruction,
                "page_title": table.page_title,
                "extracted_data": null,
                "reasoning": null,
                "error": e.to_string(),
            }),
        };
        self.traces.record("extractLLM", &prompt, &trace);

        match result {
            Ok(reply) => {
                let value = normalize_value(&reply.data);
                info!(instruction, value = %value, "value extracted");
                value
            }
            Err(e) => {
                error!(instruction, error = %e, "extraction failed");
                format!("ERROR: {e}")
            }
        }
    }
}
