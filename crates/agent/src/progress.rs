//! Progress audit between loops.
//!
//! Before each planning round the page is checked for fields that already
//! show their target value and for sections that are already expanded. The
//! result is handed to the planner as the round's instruction so it does not
//! redo finished work.

use sopilot_core::element::{ElementTable, UiElement};
use sopilot_core::manifest::TaskManifest;
use sopilot_planner::NOT_FOUND;
use std::collections::BTreeSet;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Progress {
    pub filled: BTreeSet<String>,
    pub expanded: BTreeSet<String>,
}

fn mentions(e: &UiElement, field: &str) -> bool {
    e.label_left.to_lowercase().contains(field) || e.inner_text.to_lowercase().contains(field)
}

/// Whether the page shows `target` for `field`: on a row labelled with the
/// field, or in the value of the row right after it.
fn shows_target(table: &ElementTable, field: &str, target: &str) -> bool {
    let field = field.to_lowercase();
    table
        .iter()
        .enumerate()
        .filter(|(_, e)| mentions(e, &field))
        .any(|(i, e)| {
            if e.value.trim().contains(target) || e.inner_text.trim().contains(target) {
                return true;
            }
            !target.is_empty()
                && table
                    .elements
                    .get(i + 1)
                    .is_some_and(|next| next.value.trim().contains(target))
        })
}

impl Progress {
    /// Re-check every manifest field against the page. A field that no
    /// longer shows its target is dropped from the filled set.
    pub fn audit(&mut self, manifest: &TaskManifest, table: &ElementTable) {
        for (field, target) in manifest.fields() {
            if shows_target(table, &field, target.trim()) {
                self.filled.insert(field);
            } else {
                self.filled.remove(&field);
            }
        }
        for e in table.iter().filter(|e| e.expanded) {
            let area = if e.label_left.is_empty() { &e.inner_text } else { &e.label_left };
            if !area.is_empty() {
                self.expanded.insert(area.clone());
            }
        }
    }

    /// The instruction for the next planning round.
    pub fn refine_instruction(&self, extracted: Option<&str>) -> String {
        let mut text = format!(
            "### Progress\n- Filled: {:?}\n- Expanded: {:?}",
            self.filled, self.expanded
        );
        if let Some(value) = extracted.filter(|v| !v.eq_ignore_ascii_case(NOT_FOUND)) {
            text.push_str(&format!(
                "\nWARNING: extractValue already holds '{value}'. Do not extract it again; \
                 use it and finish with send_msg_to_user."
            ));
        }
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(label: &str, inner: &str, value: &str) -> UiElement {
        UiElement {
            bid: format!("b{}", label.len() + inner.len()),
            label_left: label.into(),
            inner_text: inner.into(),
            value: value.into(),
            ..Default::default()
        }
    }

    fn manifest() -> TaskManifest {
        serde_json::from_value(json!({
            "task_metadata": {"task_id": "t", "mission_intent": "CREATE", "language": "en", "raw_goal": ""},
            "specification": {"FIELDS": {"Short description": "Reboot", "Impact": "3 - Low", "Risk": "High"}}
        }))
        .unwrap()
    }

    #[test]
    fn audit_finds_values_on_label_row_and_next_row() {
        let table = ElementTable::new(
            "Change",
            "",
            vec![
                row("Short description", "", "Reboot server"),
                row("", "Impact", ""),
                row("", "", "3 - Low"),
                row("Risk", "", ""),
            ],
        );
        let mut progress = Progress::default();
        progress.audit(&manifest(), &table);
        assert_eq!(
            progress.filled,
            BTreeSet::from(["Impact".to_string(), "Short description".to_string()])
        );
    }

    #[test]
    fn cleared_fields_drop_out() {
        let mut progress = Progress::default();
        progress.filled.insert("Risk".into());
        let table = ElementTable::new("Change", "", vec![row("Risk", "", "Low")]);
        progress.audit(&manifest(), &table);
        assert!(!progress.filled.contains("Risk"));
    }

    #[test]
    fn expanded_sections_are_remembered() {
        let mut tab = row("", "Closure Information", "");
        tab.expanded = true;
        let mut unnamed = row("", "", "");
        unnamed.expanded = true;
        let mut progress = Progress::default();
        progress.audit(&manifest(), &ElementTable::new("Change", "", vec![tab, unnamed]));
        assert_eq!(progress.expanded, BTreeSet::from(["Closure Information".to_string()]));
    }

    #[test]
    fn instruction_mentions_extracted_value() {
        let mut progress = Progress::default();
        progress.filled.insert("Impact".into());
        let text = progress.refine_instruction(Some("CHG0000028"));
        assert!(text.contains("Filled: {\"Impact\"}"));
        assert!(text.contains("already holds 'CHG0000028'"));
        assert!(!progress.refine_instruction(Some("not_found")).contains("WARNING"));
        assert!(!progress.refine_instruction(None).contains("WARNING"));
    }
}
