//! Row reduction before an element table goes into a prompt.
//!
//! Enterprise SPAs hide real inputs behind styled wrappers, so the filter
//! never drops focused, valued or popup-bearing rows, and treats input-like
//! tags as interactive whatever their role says.

use serde::{Deserialize, Serialize};
use sopilot_core::element::{ElementTable, UiElement};

const INTERACTIVE_ROLES: [&str; 13] = [
    "button", "link", "textbox", "combobox", "checkbox", "radio", "menuitem", "searchbox",
    "listbox", "tab", "treeitem", "option", "LabelText",
];

const INPUT_TAGS: [&str; 6] = ["input", "select", "textarea", "button", "a", "label"];

/// How hard to cut.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterMode {
    /// Keep everything
    Off,
    /// Keep anything with meaning: critical, interactive, or carrying text
    #[default]
    Light,
    /// Keep only critical, interactive and short label rows
    Aggressive,
}

impl std::str::FromStr for FilterMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "off" => Ok(FilterMode::Off),
            "light" => Ok(FilterMode::Light),
            "aggressive" => Ok(FilterMode::Aggressive),
            other => Err(format!("unknown filter mode '{other}' (expected off, light or aggressive)")),
        }
    }
}

impl std::fmt::Display for FilterMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            FilterMode::Off => "off",
            FilterMode::Light => "light",
            FilterMode::Aggressive => "aggressive",
        })
    }
}

fn is_critical(e: &UiElement) -> bool {
    e.focused || !e.value.is_empty() || e.has_popup
}

fn is_interactive(e: &UiElement) -> bool {
    INTERACTIVE_ROLES.contains(&e.role.as_str())
        || e.clickable
        || INPUT_TAGS.contains(&e.tag.to_ascii_lowercase().as_str())
}

fn has_text(e: &UiElement) -> bool {
    !e.inner_text.trim().is_empty()
}

fn is_label(e: &UiElement) -> bool {
    let len = e.inner_text.trim().chars().count();
    (e.role == "StaticText" || e.tag == "SPAN") && len > 1 && len < 100
}

pub struct ObservationFilter;

impl ObservationFilter {
    /// Rows of `table` that survive `mode`, in their original order.
    pub fn apply(table: &ElementTable, mode: FilterMode) -> ElementTable {
        let keep: fn(&UiElement) -> bool = match mode {
            FilterMode::Off => return table.clone(),
            FilterMode::Light => |e| is_critical(e) || is_interactive(e) || has_text(e),
            FilterMode::Aggressive => |e| is_critical(e) || is_interactive(e) || is_label(e),
        };
        table.with_elements(table.iter().filter(|e| keep(e)).cloned().collect())
    }
}

/// What a filter pass removed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilterStats {
    pub before: usize,
    pub after: usize,
    /// Percentage of rows removed
    pub reduction_rate: f64,
    pub areas_before: usize,
    pub areas_after: usize,
}

impl FilterStats {
    pub fn compute(before: &ElementTable, after: &ElementTable) -> Self {
        let (b, a) = (before.len(), after.len());
        let reduction_rate = if b > 0 {
            (b.saturating_sub(a)) as f64 / b as f64 * 100.0
        } else {
            0.0
        };
        Self {
            before: b,
            after: a,
            reduction_rate,
            areas_before: before.area_count(),
            areas_after: after.area_count(),
        }
    }

    pub fn areas_preserved(&self) -> String {
        format!("{}/{}", self.areas_after, self.areas_before)
    }
}

impl std::fmt::Display for FilterStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} -> {} rows ({:.1}% reduced, areas {})",
            self.before,
            self.after,
            self.reduction_rate,
            self.areas_preserved()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(bid: &str, role: &str, tag: &str, text: &str, area: &str) -> UiElement {
        UiElement {
            bid: bid.into(),
            role: role.into(),
            tag: tag.into(),
            inner_text: text.into(),
            area: area.into(),
            visibility: 1.0,
            ..Default::default()
        }
    }

    fn table() -> ElementTable {
        let mut valued = row("v", "generic", "DIV", "", "Form");
        valued.value = "3 - Low".into();
        ElementTable::new(
            "p",
            "",
            vec![
                row("btn", "button", "BUTTON", "Save", "Header"),
                row("lbl", "StaticText", "SPAN", "Impact", "Form"),
                row("para", "paragraph", "P", "A long explanatory paragraph", "Help"),
                row("empty", "generic", "DIV", "", "Help"),
                row("hidden", "generic", "SELECT", "", "Form"),
                valued,
            ],
        )
    }

    fn bids(t: &ElementTable) -> Vec<&str> {
        t.iter().map(|e| e.bid.as_str()).collect()
    }

    #[test]
    fn off_keeps_everything() {
        assert_eq!(ObservationFilter::apply(&table(), FilterMode::Off).len(), 6);
    }

    #[test]
    fn light_keeps_text_rows() {
        let out = ObservationFilter::apply(&table(), FilterMode::Light);
        assert_eq!(bids(&out), ["btn", "lbl", "para", "hidden", "v"]);
    }

    #[test]
    fn aggressive_keeps_only_short_labels() {
        let out = ObservationFilter::apply(&table(), FilterMode::Aggressive);
        assert_eq!(bids(&out), ["btn", "lbl", "hidden", "v"]);
    }

    #[test]
    fn stats_report_reduction_and_areas() {
        let before = table();
        let after = ObservationFilter::apply(&before, FilterMode::Aggressive);
        let stats = FilterStats::compute(&before, &after);
        assert_eq!(stats.before, 6);
        assert_eq!(stats.after, 4);
        assert!((stats.reduction_rate - 33.333).abs() < 0.01);
        assert_eq!(stats.areas_preserved(), "2/3");
    }

    #[test]
    fn mode_parsing() {
        assert_eq!("Aggressive".parse::<FilterMode>().unwrap(), FilterMode::Aggressive);
        assert!("heavy".parse::<FilterMode>().is_err());
        assert_eq!(FilterMode::default(), FilterMode::Light);
    }
}
