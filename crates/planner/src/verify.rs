//! Planning-time verification.
//!
//! A plan is checked against the manifest, the physical index and the page
//! it will run on before any action executes. Issues go back to the model as
//! a repair report; a plan with no issues is executed as is.

use serde::Serialize;
use sopilot_core::element::{ElementTable, UiElement};
use sopilot_core::manifest::TaskManifest;
use sopilot_core::plan::{ActionType, ConcretePlan};
use sopilot_grounding::{BidIndex, LABEL_ROLES};
use std::collections::BTreeSet;

const EMPTY_MARKERS: [&str; 3] = ["none", "-- none --", "null"];
const CHECKED_VALUES: [&str; 6] = ["YES", "TRUE", "ON", "CHECKED", "1", "SELECTED"];
const CHECKED_CLASSES: [&str; 5] = ["CHECKED", "IS-CHECKED", "CHECKBOX-ACTIVE", "RADIO-ACTIVE", "CHECKED-TRUE"];

/// One problem found in a plan.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PlanIssue {
    /// Indexed fields that are neither done nor referenced by any action
    Uncovered { fields: Vec<String> },
    UnknownAction { step_id: String, action_type: String },
    MissingInstruction { step_id: String },
    MissingScrollArgs { step_id: String },
    /// An element action with neither a bid nor a target
    MissingBid { step_id: String, action_type: String },
    /// A bid that is not on the current page
    FabricatedBid { step_id: String, bid: String },
    /// Operating a text label instead of the control it describes
    LabelTarget {
        step_id: String,
        bid: String,
        suggestion: Option<String>,
    },
    /// Clicking a checkbox field that already has the wanted state
    RedundantClick { step_id: String, field: String },
}

impl std::fmt::Display for PlanIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlanIssue::Uncovered { fields } => write!(
                f,
                "[Incomplete] The plan does not cover these fields: {fields:?}. If an action only \
                 prepares access to them (expanding a section, opening a tab), set its 'logic_ref' \
                 to the most related field name (e.g. {fields:?}) so the intent is recognised."
            ),
            PlanIssue::UnknownAction { step_id, action_type } => {
                write!(f, "[Invalid action] {step_id}: '{action_type}' is not a supported action type.")
            }
            PlanIssue::MissingInstruction { step_id } => {
                write!(f, "[Missing argument] {step_id}: extractLLM requires 'instruction'.")
            }
            PlanIssue::MissingScrollArgs { step_id } => {
                write!(f, "[Missing argument] {step_id}: scroll requires 'dx'/'dy' or 'direction'.")
            }
            PlanIssue::MissingBid { step_id, action_type } => write!(
                f,
                "[Missing target] {step_id}: {action_type} needs a 'bid' from the CSV or a 'target' with role and label."
            ),
            PlanIssue::FabricatedBid { step_id, bid } => write!(
                f,
                "[Unknown BID] {step_id}: BID '{bid}' is not on the current page. Use a BID from the CSV \
                 or give a 'target' with role and label."
            ),
            PlanIssue::LabelTarget { step_id, bid, suggestion } => {
                write!(
                    f,
                    "[Check element] {step_id}: BID '{bid}' is a label. Find the control next to it in the \
                     CSV (role radio, checkbox or textbox, or an input-group class) and operate that instead."
                )?;
                if let Some(s) = suggestion {
                    write!(f, " The physical index suggests '{s}', which may also be a heading.")?;
                }
                Ok(())
            }
            PlanIssue::RedundantClick { step_id, field } => write!(
                f,
                "[Unneeded action] {step_id}: {field} already has the requested state. Remove this click from the plan."
            ),
        }
    }
}

/// The repair report sent back to the model.
pub fn issue_report(issues: &[PlanIssue]) -> String {
    issues
        .iter()
        .map(|i| format!("- {i}"))
        .collect::<Vec<_>>()
        .join("\n")
}

fn is_bool_target(target: &str) -> bool {
    matches!(target.trim().to_lowercase().as_str(), "true" | "false")
}

fn currently_checked(e: &UiElement) -> bool {
    let value = e.value.trim().to_uppercase();
    let class = e.class_name.to_uppercase();
    e.checked
        || CHECKED_VALUES.contains(&value.as_str())
        || CHECKED_CLASSES.iter().any(|c| class.contains(c))
}

/// Whether the page already shows `target` for the field element `e`.
fn field_satisfied(e: &UiElement, target: &str) -> bool {
    let target = target.trim();
    let value = e.value.trim();
    if target.is_empty() {
        return value.is_empty() || EMPTY_MARKERS.contains(&value.to_lowercase().as_str());
    }
    if is_bool_target(target) {
        return currently_checked(e) == target.eq_ignore_ascii_case("true");
    }
    target == value || target == e.inner_text.trim()
}

/// Manifest fields the page already satisfies, judged on the indexed
/// element of each field.
pub fn completed_fields(manifest: &TaskManifest, index: &BidIndex, table: &ElementTable) -> BTreeSet<String> {
    manifest
        .fields()
        .into_iter()
        .filter(|(field, target)| {
            index
                .get(field)
                .and_then(|entry| entry.bid())
                .and_then(|bid| table.find(bid))
                .is_some_and(|e| field_satisfied(e, target))
        })
        .map(|(field, _)| field)
        .collect()
}

/// Check a plan before it runs.
pub fn verify_plan(plan: &ConcretePlan, manifest: &TaskManifest, index: &BidIndex, table: &ElementTable) -> Vec<PlanIssue> {
    let mut issues = Vec::new();
    let completed = completed_fields(manifest, index, table);

    let planned: BTreeSet<&str> = plan.actions().filter_map(|a| a.logic_ref.as_deref()).collect();
    let reports = plan
        .actions()
        .any(|a| a.is(ActionType::SendMsgToUser) || a.is(ActionType::ExtractLlm));
    let uncovered: Vec<String> = manifest
        .fields()
        .into_iter()
        .map(|(field, _)| field)
        .filter(|f| !completed.contains(f) && !planned.contains(f.as_str()))
        .filter(|f| index.get(f).and_then(|e| e.bid()).is_some())
        .collect();
    if !uncovered.is_empty() && !reports {
        issues.push(PlanIssue::Uncovered { fields: uncovered });
    }

    for step in &plan.concrete_steps {
        let step_id = if step.step_id.is_empty() { "Unknown" } else { step.step_id.as_str() };
        for action in &step.actions {
            let Some(kind) = action.kind() else {
                issues.push(PlanIssue::UnknownAction {
                    step_id: step_id.into(),
                    action_type: action.action_type.clone(),
                });
                continue;
            };

            match kind {
                ActionType::ExtractLlm => {
                    if action.instruction.as_deref().is_none_or(|i| i.trim().is_empty()) {
                        issues.push(PlanIssue::MissingInstruction { step_id: step_id.into() });
                    }
                    continue;
                }
                ActionType::SendMsgToUser => continue,
                ActionType::Scroll => {
                    if action.dx.is_none() && action.dy.is_none() && action.direction.is_none() {
                        issues.push(PlanIssue::MissingScrollArgs { step_id: step_id.into() });
                    }
                    continue;
                }
                _ => {}
            }

            let bid = action.bid.as_deref().map(str::trim).filter(|b| !b.is_empty());
            let element = match bid {
                None => {
                    if action.target.is_none() {
                        issues.push(PlanIssue::MissingBid {
                            step_id: step_id.into(),
                            action_type: kind.to_string(),
                        });
                    }
                    None
                }
                Some(bid) => match table.find(bid) {
                    Some(e) => Some(e),
                    None => {
                        if action.target.is_none() {
                            issues.push(PlanIssue::FabricatedBid {
                                step_id: step_id.into(),
                                bid: bid.into(),
                            });
                        }
                        None
                    }
                },
            };

            if let Some(e) = element {
                let role = e.role.to_lowercase();
                let is_label = LABEL_ROLES.contains(&role.as_str()) || e.tag.eq_ignore_ascii_case("LABEL");
                if is_label && !e.is_interactive_tag() {
                    let suggestion = action
                        .logic_ref
                        .as_deref()
                        .and_then(|r| index.get(r))
                        .and_then(|entry| entry.bid())
                        .map(str::to_string);
                    issues.push(PlanIssue::LabelTarget {
                        step_id: step_id.into(),
                        bid: e.bid.clone(),
                        suggestion,
                    });
                }
            }

            if kind == ActionType::Click {
                if let Some(field) = action.logic_ref.as_deref().filter(|r| completed.contains(*r)) {
                    if manifest.field(field).is_some_and(|t| is_bool_target(&t)) {
                        issues.push(PlanIssue::RedundantClick {
                            step_id: step_id.into(),
                            field: field.into(),
                        });
                    }
                }
            }
        }
    }

    issues
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use sopilot_core::plan::{ConcreteStep, PlannedAction, TargetRef};

    fn manifest() -> TaskManifest {
        serde_json::from_value(json!({
            "task_metadata": {"task_id": "t", "mission_intent": "CREATE", "language": "en", "raw_goal": ""},
            "specification": {"FIELDS": {
                "Short description": "Reboot",
                "Urgent": "true",
                "Service": "",
                "Impact": "3 - Low"
            }}
        }))
        .unwrap()
    }

    fn el(bid: &str, role: &str, tag: &str, label: &str) -> UiElement {
        UiElement {
            bid: bid.into(),
            role: role.into(),
            tag: tag.into(),
            label_left: label.into(),
            visibility: 1.0,
            ..Default::default()
        }
    }

    fn page() -> ElementTable {
        let mut urgent = el("a14", "checkbox", "INPUT", "Urgent");
        urgent.checked = true;
        let mut service = el("a16", "textbox", "INPUT", "Service");
        service.value = "-- None --".into();
        ElementTable::new(
            "Change Request",
            "",
            vec![
                el("a10", "LabelText", "LABEL", ""),
                el("a12", "textbox", "INPUT", "Short description"),
                urgent,
                service,
                el("a18", "combobox", "SELECT", "Impact"),
            ],
        )
    }

    fn plan(actions: Vec<PlannedAction>) -> ConcretePlan {
        ConcretePlan {
            thought: None,
            concrete_steps: vec![ConcreteStep {
                step_id: "1".into(),
                logical_intent: None,
                actions,
            }],
        }
    }

    fn setup() -> (TaskManifest, ElementTable, BidIndex) {
        let m = manifest();
        let t = page();
        let index = BidIndex::build(&m, &t);
        (m, t, index)
    }

    #[test]
    fn already_satisfied_fields_count_as_done() {
        let (m, t, index) = setup();
        let done = completed_fields(&m, &index, &t);
        assert!(done.contains("Urgent"));
        assert!(done.contains("Service"));
        assert!(!done.contains("Short description"));
    }

    #[test]
    fn complete_plan_passes() {
        let (m, t, index) = setup();
        let p = plan(vec![
            PlannedAction::on(ActionType::Fill, "a12").with_value("Reboot").with_logic_ref("Short description"),
            PlannedAction::on(ActionType::SelectOption, "a18").with_value("3 - Low").with_logic_ref("Impact"),
        ]);
        assert_eq!(verify_plan(&p, &m, &index, &t), vec![]);
    }

    #[test]
    fn uncovered_fields_are_reported_unless_plan_reports() {
        let (m, t, index) = setup();
        let p = plan(vec![
            PlannedAction::on(ActionType::Fill, "a12").with_value("Reboot").with_logic_ref("Short description"),
        ]);
        let issues = verify_plan(&p, &m, &index, &t);
        assert_eq!(issues, vec![PlanIssue::Uncovered { fields: vec!["Impact".into()] }]);
        assert!(issue_report(&issues).starts_with("- [Incomplete]"));

        let mut extract = PlannedAction::new(ActionType::ExtractLlm);
        extract.instruction = Some("Read the number".into());
        let p = plan(vec![extract]);
        assert!(verify_plan(&p, &m, &index, &t).is_empty());
    }

    #[test]
    fn structural_problems() {
        let (m, t, index) = setup();
        let bogus = PlannedAction {
            action_type: "dblclick".into(),
            ..Default::default()
        };
        let p = plan(vec![
            bogus,
            PlannedAction::new(ActionType::ExtractLlm),
            PlannedAction::new(ActionType::Scroll),
            PlannedAction::new(ActionType::Click),
            PlannedAction::on(ActionType::Fill, "zz99").with_value("x").with_logic_ref("Short description"),
            PlannedAction::on(ActionType::Click, "a10").with_logic_ref("Impact"),
            PlannedAction::new(ActionType::SendMsgToUser),
        ]);
        let issues = verify_plan(&p, &m, &index, &t);
        assert_eq!(issues.len(), 6);
        assert!(matches!(&issues[0], PlanIssue::UnknownAction { action_type, .. } if action_type == "dblclick"));
        assert!(matches!(issues[1], PlanIssue::MissingInstruction { .. }));
        assert!(matches!(issues[2], PlanIssue::MissingScrollArgs { .. }));
        assert!(matches!(issues[3], PlanIssue::MissingBid { .. }));
        assert!(matches!(&issues[4], PlanIssue::FabricatedBid { bid, .. } if bid == "zz99"));
        assert_eq!(
            issues[5],
            PlanIssue::LabelTarget {
                step_id: "1".into(),
                bid: "a10".into(),
                suggestion: Some("a18".into()),
            }
        );
    }

    #[test]
    fn static_text_is_not_a_target() {
        let m = manifest();
        let mut elements: Vec<UiElement> = page().iter().cloned().collect();
        elements.push(el("s3", "StaticText", "SPAN", "Impact"));
        let t = ElementTable::new("Change Request", "", elements);
        let index = BidIndex::build(&m, &t);
        let p = plan(vec![
            PlannedAction::on(ActionType::Fill, "a12").with_value("Reboot").with_logic_ref("Short description"),
            PlannedAction::on(ActionType::SelectOption, "a18").with_value("3 - Low").with_logic_ref("Impact"),
            PlannedAction::on(ActionType::Click, "s3").with_logic_ref("Impact"),
        ]);
        assert_eq!(
            verify_plan(&p, &m, &index, &t),
            vec![PlanIssue::LabelTarget {
                step_id: "1".into(),
                bid: "s3".into(),
                suggestion: Some("a18".into()),
            }]
        );
    }

    #[test]
    fn stale_bid_with_target_is_left_for_grounding() {
        let (m, t, index) = setup();
        let mut action = PlannedAction::on(ActionType::Fill, "gone").with_value("Reboot").with_logic_ref("Short description");
        action.target = Some(TargetRef {
            role: Some("textbox".into()),
            label: "Short description".into(),
        });
        let p = plan(vec![
            action,
            PlannedAction::on(ActionType::SelectOption, "a18").with_value("3 - Low").with_logic_ref("Impact"),
        ]);
        assert!(verify_plan(&p, &m, &index, &t).is_empty());
    }

    #[test]
    fn clicking_a_correct_checkbox_is_redundant() {
        let (m, t, index) = setup();
        let p = plan(vec![
            PlannedAction::on(ActionType::Fill, "a12").with_value("Reboot").with_logic_ref("Short description"),
            PlannedAction::on(ActionType::SelectOption, "a18").with_value("3 - Low").with_logic_ref("Impact"),
            PlannedAction::on(ActionType::Click, "a14").with_logic_ref("Urgent"),
        ]);
        assert_eq!(
            verify_plan(&p, &m, &index, &t),
            vec![PlanIssue::RedundantClick {
                step_id: "1".into(),
                field: "Urgent".into(),
            }]
        );
    }
}
