//! The physical element index.
//!
//! Maps each manifest field (plus a couple of intent-driven landmarks) to
//! the element that implements it on the current page. Built by heuristics
//! first; fields the heuristics miss stay `NOT_FOUND` until the planner asks
//! the LLM to fill them in.

use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use sopilot_core::element::{ElementTable, UiElement};
use sopilot_core::manifest::TaskManifest;
use tracing::{debug, info};

pub const NOT_FOUND: &str = "NOT_FOUND";
pub const PRIMARY_SEARCH_INPUT: &str = "PRIMARY_SEARCH_INPUT";
pub const SUBMIT_BUTTON: &str = "SUBMIT_BUTTON";

const INPUT_ROLES: [&str; 8] = [
    "input", "textarea", "select", "combobox", "checkbox", "radio", "searchbox", "textbox",
];
const INPUT_TAGS: [&str; 4] = ["input", "select", "textarea", "button"];
/// Lowercased roles of elements that only describe another element.
pub const LABEL_ROLES: [&str; 5] = ["none", "label", "text", "labeltext", "statictext"];
const MIN_FIELD_SCORE: i64 = 50;

const EXEC_WORDS: [&str; 8] = ["submit", "save", "create", "insert", "order", "send", "confirm", "update"];
const INFO_WORDS: [&str; 11] = [
    "view", "show", "detail", "list", "linked", "account", "subscription", "history", "log", "info",
    "help",
];
const PRIMARY_CLASS_HINTS: [&str; 5] = ["primary", "success", "action", "submit", "main"];

/// Where a field lives on the page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Located {
    pub bid: String,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub label: String,
    #[serde(default = "default_true")]
    pub is_visible: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage_hint: Option<String>,
}

fn default_true() -> bool {
    true
}

impl Located {
    fn from_element(e: &UiElement) -> Self {
        let label = if e.label_left.is_empty() {
            e.inner_text.clone()
        } else {
            e.label_left.clone()
        };
        Self {
            bid: e.bid.clone(),
            role: e.role.clone(),
            label,
            is_visible: e.is_visible(),
            usage_hint: None,
        }
    }
}

/// One slot of the index: an element, or the `NOT_FOUND` marker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IndexEntry {
    Found(Located),
    Missing(String),
}

impl IndexEntry {
    pub fn missing() -> Self {
        IndexEntry::Missing(NOT_FOUND.to_string())
    }

    pub fn located(&self) -> Option<&Located> {
        match self {
            IndexEntry::Found(located) => Some(located),
            IndexEntry::Missing(_) => None,
        }
    }

    pub fn bid(&self) -> Option<&str> {
        self.located().map(|l| l.bid.as_str())
    }
}

/// Field name → element, in manifest order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BidIndex {
    entries: Vec<(String, IndexEntry)>,
}

impl Serialize for BidIndex {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.entries.iter().map(|(k, v)| (k, v)))
    }
}

fn lower(s: &str) -> String {
    s.to_lowercase()
}

fn field_score(e: &UiElement, needle: &str) -> i64 {
    let role = lower(&e.role);
    let tag = lower(&e.tag);
    let mut score = 0;
    if INPUT_ROLES.contains(&role.as_str()) || INPUT_TAGS.contains(&tag.as_str()) {
        score += 150;
    }
    if LABEL_ROLES.contains(&role.as_str()) || tag == "label" {
        score -= 20;
    }
    if e.is_visible() {
        score += 50;
    }
    if lower(&e.label_left) == needle {
        score += 20;
    }
    score
}

fn mentions_field(e: &UiElement, needle: &str) -> bool {
    [&e.label_left, &e.label_above, &e.label_ax, &e.inner_text, &e.placeholder]
        .iter()
        .any(|text| lower(text).contains(needle))
}

fn geometry(e: &UiElement) -> (f64, f64, f64) {
    e.bbox.map(|b| (b.x, b.y, b.width)).unwrap_or((0.0, 0.0, 0.0))
}

fn search_input(table: &ElementTable) -> Option<Located> {
    table
        .iter()
        .filter(|e| e.is_visible())
        .filter(|e| {
            let placeholder = lower(&e.placeholder);
            placeholder.contains("search")
                || placeholder.contains("minimum")
                || lower(&e.inner_text).contains("search")
                || lower(&e.role).contains("search")
        })
        .map(|e| {
            let (_, y, w) = geometry(e);
            let mut score = 100;
            if y > 150.0 {
                score += 400;
            }
            if w > 250.0 {
                score += 150;
            }
            if lower(&e.placeholder).contains("minimum") {
                score += 300;
            }
            (score, e)
        })
        .fold(None, |best: Option<(i64, &UiElement)>, (score, e)| match best {
            Some((s, _)) if s >= score => best,
            _ => Some((score, e)),
        })
        .map(|(_, e)| Located {
            bid: e.bid.clone(),
            role: "searchbox".into(),
            label: "Main Search Bar".into(),
            is_visible: true,
            usage_hint: Some("Use this input for searching articles or records.".into()),
        })
}

fn submit_button(table: &ElementTable) -> Option<Located> {
    table
        .iter()
        .filter(|e| e.is_visible() && matches!(e.tag.to_ascii_uppercase().as_str(), "BUTTON" | "A"))
        .filter(|e| {
            let text = format!("{} {}", lower(&e.inner_text), lower(&e.label_above));
            EXEC_WORDS.iter().any(|w| text.contains(w))
        })
        .map(|e| {
            let (x, y, _) = geometry(e);
            let text = lower(&e.inner_text);
            let class = lower(&e.class_name);
            let mut score: i64 = 100;
            if INFO_WORDS.iter().any(|w| text.contains(w)) {
                score -= 1500;
            }
            if y < 150.0 && x > 800.0 {
                score += 1000;
            }
            if PRIMARY_CLASS_HINTS.iter().any(|h| class.contains(h)) {
                score += 500;
            }
            if EXEC_WORDS.contains(&text.trim()) {
                score += 300;
            }
            (score, e)
        })
        .filter(|(score, _)| *score > 0)
        .fold(None, |best: Option<(i64, &UiElement)>, (score, e)| match best {
            Some((s, _)) if s >= score => best,
            _ => Some((score, e)),
        })
        .map(|(_, e)| Located {
            bid: e.bid.clone(),
            role: e.role.clone(),
            label: if e.inner_text.is_empty() {
                "Submit".into()
            } else {
                e.inner_text.clone()
            },
            is_visible: true,
            usage_hint: Some("Finalize your action by clicking this button.".into()),
        })
}

impl BidIndex {
    /// Index every manifest field against the page, then add the search and
    /// submit landmarks the intent calls for.
    pub fn build(manifest: &TaskManifest, table: &ElementTable) -> Self {
        let mut index = BidIndex::default();

        for (field, _) in manifest.fields() {
            let needle = lower(&field).replace('_', " ");
            let best = table
                .iter()
                .filter(|e| mentions_field(e, &needle))
                .map(|e| (field_score(e, &needle), e))
                .fold(None, |best: Option<(i64, &UiElement)>, (score, e)| match best {
                    Some((s, _)) if s >= score => best,
                    _ => Some((score, e)),
                });
            let entry = match best {
                Some((score, e)) if score >= MIN_FIELD_SCORE => IndexEntry::Found(Located::from_element(e)),
                _ => IndexEntry::missing(),
            };
            debug!(field = %field, bid = entry.bid().unwrap_or(NOT_FOUND), "indexed field");
            index.insert(field, entry);
        }

        let intent = manifest.intent();
        if intent.is_search() {
            if let Some(located) = search_input(table) {
                index.insert(PRIMARY_SEARCH_INPUT.into(), IndexEntry::Found(located));
            }
        }
        if intent.is_mutating() {
            if let Some(located) = submit_button(table) {
                index.insert(SUBMIT_BUTTON.into(), IndexEntry::Found(located));
            }
        }

        info!(
            entries = index.len(),
            missing = index.missing_fields().len(),
            "physical index built"
        );
        index
    }

    pub fn insert(&mut self, key: String, entry: IndexEntry) {
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = entry,
            None => self.entries.push((key, entry)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&IndexEntry> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &IndexEntry)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn missing_fields(&self) -> Vec<&str> {
        self.iter()
            .filter(|(_, v)| v.located().is_none())
            .map(|(k, _)| k)
            .collect()
    }

    pub fn has_missing(&self) -> bool {
        self.entries.iter().any(|(_, v)| v.located().is_none())
    }

    /// Apply a corrected index from the LLM. Only keys already present are
    /// touched, and only with values that parse as entries. Returns how many
    /// entries changed.
    pub fn merge_refinement(&mut self, update: &Map<String, Value>) -> usize {
        let mut changed = 0;
        for (key, slot) in self.entries.iter_mut() {
            let Some(raw) = update.get(key.as_str()) else {
                continue;
            };
            match serde_json::from_value::<IndexEntry>(raw.clone()) {
                Ok(entry) if entry != *slot => {
                    *slot = entry;
                    changed += 1;
                }
                Ok(_) => {}
                Err(e) => debug!(field = %key, error = %e, "ignoring unparseable index entry"),
            }
        }
        changed
    }

    pub fn to_json_pretty(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".into())
    }
}
