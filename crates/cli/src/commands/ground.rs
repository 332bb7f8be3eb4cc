//! `sopilot ground`: resolve one step against a recorded page.

use std::path::Path;

use sopilot_core::plan::{ActionType, TargetRef};
use sopilot_grounding::Grounder;
use sopilot_observe::element_table;
use sopilot_telemetry::load_observation;

pub fn run(metadata: &Path, role: &str, label: &str, action: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    let action = action.map(str::parse::<ActionType>).transpose()?;
    let observation = load_observation(metadata)?;
    let table = element_table(&observation)?;

    let target = TargetRef {
        role: Some(role.to_string()),
        label: label.to_string(),
    };
    let grounding = Grounder::ground_target(&target, action, &table)?;
    println!("{}", serde_json::to_string_pretty(&grounding)?);
    if let Some(element) = table.find(&grounding.bid) {
        eprintln!(
            "{} <{}> role={} label={:?}",
            element.bid, element.tag, element.role, element.label_ax
        );
    }
    Ok(())
}
