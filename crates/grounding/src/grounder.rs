//! Just-in-time grounding.
//!
//! Resolves an identifier-free reference (role + purpose) to the live `bid`
//! of the current page. Nothing here caches identifiers: a step grounded on
//! one page state is grounded again on the next.

use serde::Serialize;
use sopilot_core::element::{ElementTable, UiElement};
use sopilot_core::error::GroundingError;
use sopilot_core::plan::{ActionType, PlannedAction, TargetRef};
use sopilot_core::sop::SopStep;
use tracing::debug;

use crate::roles::RoleConstraint;

const EXACT: i64 = 100;
const PREFIX: i64 = 60;
const CONTAINS: i64 = 30;
const VISIBLE_BONUS: i64 = 10;
const ROLE_BONUS: i64 = 15;

/// A resolved step.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Grounding {
    pub bid: String,
    pub action: Option<ActionType>,
    pub value: Option<String>,
    pub score: i64,
    /// Label column that carried the match, if any
    pub matched_on: Option<&'static str>,
}

impl Grounding {
    /// The grounded step as an executable action.
    pub fn to_action(&self, logic_ref: Option<&str>) -> Option<PlannedAction> {
        let action = self.action?;
        let mut planned = PlannedAction::on(action, &self.bid);
        if let Some(value) = &self.value {
            planned = planned.with_value(value.as_str());
        }
        if let Some(logic_ref) = logic_ref {
            planned = planned.with_logic_ref(logic_ref);
        }
        Some(planned)
    }
}

struct Candidate<'a> {
    index: usize,
    element: &'a UiElement,
    evidence: i64,
    matched_on: Option<&'static str>,
}

impl Candidate<'_> {
    fn score(&self, wanted_role: Option<&str>) -> i64 {
        let mut score = self.evidence;
        if self.element.is_visible() {
            score += VISIBLE_BONUS;
        }
        if wanted_role.is_some_and(|r| self.element.role.eq_ignore_ascii_case(r)) {
            score += ROLE_BONUS;
        }
        score
    }
}

/// Best label evidence an element carries for `label`.
fn label_evidence(element: &UiElement, label: &str) -> (i64, Option<&'static str>) {
    let needle = label.trim().to_lowercase();
    if needle.is_empty() {
        return (0, None);
    }
    let mut best = (0, None);
    for (column, text) in element.labels() {
        let hay = text.trim().to_lowercase();
        if hay.is_empty() {
            continue;
        }
        let score = if hay == needle {
            EXACT
        } else if hay.starts_with(&needle) {
            PREFIX
        } else if hay.contains(&needle) {
            CONTAINS
        } else {
            0
        };
        if score > best.0 {
            best = (score, Some(column));
        }
    }
    best
}

pub struct Grounder;

impl Grounder {
    /// Resolve an SOP step against the current page.
    pub fn ground_step(step: &SopStep, table: &ElementTable) -> Result<Grounding, GroundingError> {
        let mut grounding = Self::ground_target(&step.target_ref(), Some(step.action), table)?;
        grounding.value = step.value.clone();
        Ok(grounding)
    }

    /// Resolve a target reference for an (optional) action.
    ///
    /// The role constraint comes from the reference, or else from the
    /// action. A named role is matched exactly first and widened to its
    /// family only when no element carries it. A single candidate wins
    /// outright; several need label evidence, with ties broken on
    /// visibility and then document order.
    pub fn ground_target(
        target: &TargetRef,
        action: Option<ActionType>,
        table: &ElementTable,
    ) -> Result<Grounding, GroundingError> {
        let named = target.role.as_deref().filter(|r| !r.trim().is_empty());
        let constraint = match (named, action) {
            (Some(role), _) => RoleConstraint::for_role(role),
            (None, Some(action)) => RoleConstraint::implied_by(action).ok_or(GroundingError::Unconstrained)?,
            _ => return Err(GroundingError::Unconstrained),
        };

        let in_family: Vec<(usize, &UiElement)> =
            table.iter().enumerate().filter(|(_, e)| constraint.matches(e)).collect();
        let exact: Vec<(usize, &UiElement)> = match named {
            Some(role) => in_family
                .iter()
                .copied()
                .filter(|(_, e)| constraint.matches_exactly(e, role))
                .collect(),
            None => Vec::new(),
        };
        let pool = if exact.is_empty() { in_family } else { exact };

        let candidates: Vec<Candidate<'_>> = pool
            .into_iter()
            .map(|(index, element)| {
                let (evidence, matched_on) = label_evidence(element, &target.label);
                Candidate {
                    index,
                    element,
                    evidence,
                    matched_on,
                }
            })
            .collect();

        let wanted_role = target.role.as_deref();
        let chosen = match candidates.len() {
            0 => {
                return Err(GroundingError::NoCandidate {
                    role: constraint.name().to_string(),
                });
            }
            1 => &candidates[0],
            count => {
                if candidates.iter().all(|c| c.evidence == 0) {
                    return Err(GroundingError::Ambiguous {
                        role: constraint.name().to_string(),
                        label: target.label.clone(),
                        count,
                    });
                }
                candidates
                    .iter()
                    .filter(|c| c.evidence > 0)
                    .max_by(|a, b| {
                        a.score(wanted_role)
                            .cmp(&b.score(wanted_role))
                            .then(a.element.is_visible().cmp(&b.element.is_visible()))
                            .then(b.index.cmp(&a.index))
                    })
                    .ok_or(GroundingError::Unconstrained)?
            }
        };

        debug!(
            role = constraint.name(),
            label = %target.label,
            bid = %chosen.element.bid,
            candidates = candidates.len(),
            "grounded target"
        );

        Ok(Grounding {
            bid: chosen.element.bid.clone(),
            action,
            value: None,
            score: chosen.score(wanted_role),
            matched_on: chosen.matched_on,
        })
    }

    /// Re-ground a planned action whose bid is missing or no longer on the
    /// page. Returns `Ok(None)` when the action needs no grounding or has no
    /// target to ground from.
    pub fn reground(action: &PlannedAction, table: &ElementTable) -> Result<Option<Grounding>, GroundingError> {
        let kind = action.kind();
        if kind.is_some_and(|k| !k.targets_element()) {
            return Ok(None);
        }
        let stale = action.bid.as_deref().is_none_or(|bid| !table.contains(bid));
        match (&action.target, stale) {
            (Some(target), true) => Self::ground_target(target, kind, table).map(Some),
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn el(bid: &str, role: &str, tag: &str, label: &str) -> UiElement {
        UiElement {
            bid: bid.into(),
            role: role.into(),
            tag: tag.into(),
            label_ax: label.into(),
            visibility: 1.0,
            ..Default::default()
        }
    }

    fn page(elements: Vec<UiElement>) -> ElementTable {
        ElementTable::new("Incident", "", elements)
    }

    #[test]
    fn same_role_resolves_in_each_tree_regardless_of_ids() {
        let step = SopStep::new(ActionType::Fill, Some("textbox"), "Short description").with_value("Reboot");
        let before = page(vec![
            el("a51", "button", "BUTTON", "Submit"),
            el("a57", "textbox", "INPUT", ""),
        ]);
        let after = page(vec![
            el("b3", "textbox", "INPUT", ""),
            el("b9", "link", "A", "Home"),
        ]);

        let first = Grounder::ground_step(&step, &before).unwrap();
        let second = Grounder::ground_step(&step, &after).unwrap();
        assert_eq!(first.bid, "a57");
        assert_eq!(second.bid, "b3");
        assert_eq!(second.value.as_deref(), Some("Reboot"));
        assert_eq!(second.action, Some(ActionType::Fill));
    }

    #[test]
    fn search_box_does_not_compete_with_the_only_textbox() {
        let step = SopStep::new(ActionType::Fill, Some("textbox"), "Short description");
        let table = page(vec![
            el("g1", "searchbox", "INPUT", "Search"),
            el("a57", "textbox", "INPUT", ""),
        ]);
        assert_eq!(Grounder::ground_step(&step, &table).unwrap().bid, "a57");
    }

    #[test]
    fn navigation_link_does_not_compete_with_the_only_button() {
        let step = SopStep::new(ActionType::Click, Some("button"), "Submit");
        let table = page(vec![el("n1", "link", "A", "Home"), el("b9", "button", "BUTTON", "")]);
        assert_eq!(Grounder::ground_step(&step, &table).unwrap().bid, "b9");
    }

    #[test]
    fn family_widens_when_the_exact_role_is_absent() {
        let step = SopStep::new(ActionType::Fill, Some("textbox"), "Search");
        let table = page(vec![
            el("g1", "searchbox", "INPUT", "Search"),
            el("b2", "button", "BUTTON", "Go"),
        ]);
        let g = Grounder::ground_step(&step, &table).unwrap();
        assert_eq!(g.bid, "g1");
        assert_eq!(g.matched_on, Some("label_ax"));
    }

    #[test]
    fn no_element_of_the_role_is_a_failure_signal() {
        let step = SopStep::new(ActionType::Click, Some("checkbox"), "Urgent");
        let err = Grounder::ground_step(&step, &page(vec![el("1", "button", "BUTTON", "Urgent")])).unwrap_err();
        assert_eq!(
            err,
            GroundingError::NoCandidate {
                role: "checkbox".into()
            }
        );
    }

    #[test]
    fn label_evidence_picks_among_several() {
        let table = page(vec![
            el("1", "textbox", "INPUT", "Caller"),
            el("2", "textbox", "INPUT", "Short description"),
            el("3", "textbox", "INPUT", "Description"),
        ]);
        let target = TargetRef {
            role: Some("textbox".into()),
            label: "description".into(),
        };
        let g = Grounder::ground_target(&target, Some(ActionType::Fill), &table).unwrap();
        assert_eq!(g.bid, "3");
        assert_eq!(g.matched_on, Some("label_ax"));
    }

    #[test]
    fn several_without_evidence_is_ambiguous() {
        let table = page(vec![el("1", "button", "BUTTON", "Save"), el("2", "button", "BUTTON", "Cancel")]);
        let target = TargetRef {
            role: Some("button".into()),
            label: "Submit".into(),
        };
        let err = Grounder::ground_target(&target, Some(ActionType::Click), &table).unwrap_err();
        assert!(matches!(err, GroundingError::Ambiguous { count: 2, .. }));
    }

    #[test]
    fn ties_prefer_visible_then_document_order() {
        let mut hidden = el("1", "button", "BUTTON", "Save");
        hidden.visibility = 0.0;
        let table = page(vec![
            hidden,
            el("2", "button", "BUTTON", "Save"),
            el("3", "button", "BUTTON", "Save"),
        ]);
        let target = TargetRef {
            role: Some("button".into()),
            label: "Save".into(),
        };
        assert_eq!(Grounder::ground_target(&target, None, &table).unwrap().bid, "2");
    }

    #[test]
    fn action_implies_role_when_missing() {
        let table = page(vec![el("1", "button", "BUTTON", "Impact"), el("2", "combobox", "SELECT", "Impact")]);
        let target = TargetRef {
            role: None,
            label: "Impact".into(),
        };
        let g = Grounder::ground_target(&target, Some(ActionType::SelectOption), &table).unwrap();
        assert_eq!(g.bid, "2");
        assert_eq!(
            Grounder::ground_target(&target, Some(ActionType::Scroll), &table).unwrap_err(),
            GroundingError::Unconstrained
        );
    }

    #[test]
    fn reground_only_replaces_stale_bids() {
        let table = page(vec![el("7", "textbox", "INPUT", "Caller")]);
        let mut action = PlannedAction::on(ActionType::Fill, "7").with_value("Abel");
        action.target = Some(TargetRef {
            role: Some("textbox".into()),
            label: "Caller".into(),
        });
        assert!(Grounder::reground(&action, &table).unwrap().is_none());

        action.bid = Some("99".into());
        assert_eq!(Grounder::reground(&action, &table).unwrap().unwrap().bid, "7");

        action.target = None;
        assert!(Grounder::reground(&action, &table).unwrap().is_none());
    }

    #[test]
    fn grounding_converts_to_action() {
        let g = Grounding {
            bid: "4".into(),
            action: Some(ActionType::Fill),
            value: Some("x".into()),
            score: 100,
            matched_on: None,
        };
        let action = g.to_action(Some("Caller")).unwrap();
        assert_eq!(action.bid.as_deref(), Some("4"));
        assert_eq!(action.logic_ref.as_deref(), Some("Caller"));
    }
}
