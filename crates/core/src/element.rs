//! Fused UI element rows: the agent's view of one page state.
//!
//! An [`ElementTable`] is produced by the observation extractor from the DOM
//! snapshot and accessibility tree. Rows are kept in document order, which
//! matters: a field's input frequently follows its label row.

use serde::{Deserialize, Serialize};

/// Tags that are always worth keeping, whatever their visibility says.
pub const INTERACTIVE_TAGS: [&str; 5] = ["INPUT", "SELECT", "TEXTAREA", "BUTTON", "A"];

/// An element bounding box in page pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BBox {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    /// Both dimensions are at least one pixel.
    pub fn has_physical_size(&self) -> bool {
        self.width >= 1.0 && self.height >= 1.0
    }

    pub fn center_x(&self) -> f64 {
        self.x + self.width / 2.0
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }
}

impl std::fmt::Display for BBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {}, {}, {}]", self.x, self.y, self.width, self.height)
    }
}

/// One element of the current page, fused from DOM, AX tree and layout data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UiElement {
    /// Live BrowserGym identifier; only valid for this page state
    pub bid: String,
    /// Landmark path, e.g. "Change Request > Closure Information"
    pub area: String,
    pub page: String,
    /// Accessibility role ("textbox", "button", "generic", ...)
    pub role: String,
    /// Upper-case DOM tag name
    pub tag: String,
    /// Short text immediately to the left on the same row
    pub label_left: String,
    /// Short text immediately above
    pub label_above: String,
    /// Accessible name
    pub label_ax: String,
    pub placeholder: String,
    pub inner_text: String,
    pub value: String,
    pub focused: bool,
    pub required: bool,
    pub checked: bool,
    pub has_popup: bool,
    pub expanded: bool,
    /// Has a JS click handler
    pub clickable: bool,
    pub visibility: f64,
    pub z_index: i64,
    pub bbox: Option<BBox>,
    pub in_view: bool,
    pub background_color: String,
    pub border_color: String,
    pub text_color: String,
    pub class_name: String,
}

impl UiElement {
    /// Pipe-joined state flags, or "Active" when none apply.
    pub fn status(&self) -> String {
        let mut parts = Vec::new();
        if self.required {
            parts.push("Required");
        }
        if self.checked {
            parts.push("Checked");
        }
        if parts.is_empty() {
            "Active".into()
        } else {
            parts.join("|")
        }
    }

    pub fn hover_strategy(&self) -> &'static str {
        if self.has_popup { "Investigate" } else { "None" }
    }

    pub fn is_visible(&self) -> bool {
        self.visibility > 0.0
    }

    pub fn is_interactive_tag(&self) -> bool {
        INTERACTIVE_TAGS.contains(&self.tag.to_ascii_uppercase().as_str())
    }

    /// All human-readable label columns, in matching priority order.
    pub fn labels(&self) -> [(&'static str, &str); 5] {
        [
            ("label_left", self.label_left.as_str()),
            ("label_above", self.label_above.as_str()),
            ("label_ax", self.label_ax.as_str()),
            ("placeholder", self.placeholder.as_str()),
            ("inner_text", self.inner_text.as_str()),
        ]
    }

    /// The best single label for display: left label, else inner text.
    pub fn display_label(&self) -> &str {
        if !self.label_left.is_empty() {
            &self.label_left
        } else if !self.label_ax.is_empty() {
            &self.label_ax
        } else {
            &self.inner_text
        }
    }
}

/// The fused elements of one page state, in document order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ElementTable {
    pub page_title: String,
    pub focused_bid: String,
    pub elements: Vec<UiElement>,
}

impl ElementTable {
    pub fn new(page_title: impl Into<String>, focused_bid: impl Into<String>, elements: Vec<UiElement>) -> Self {
        Self {
            page_title: page_title.into(),
            focused_bid: focused_bid.into(),
            elements,
        }
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, UiElement> {
        self.elements.iter()
    }

    /// Look up an element by its live identifier.
    pub fn find(&self, bid: &str) -> Option<&UiElement> {
        self.elements.iter().find(|e| e.bid == bid)
    }

    pub fn contains(&self, bid: &str) -> bool {
        self.find(bid).is_some()
    }

    pub fn position(&self, bid: &str) -> Option<usize> {
        self.elements.iter().position(|e| e.bid == bid)
    }

    /// The row that follows `bid` in document order.
    pub fn next_after(&self, bid: &str) -> Option<&UiElement> {
        self.position(bid).and_then(|i| self.elements.get(i + 1))
    }

    /// A table with the same page metadata but only the given rows.
    pub fn with_elements(&self, elements: Vec<UiElement>) -> Self {
        Self {
            page_title: self.page_title.clone(),
            focused_bid: self.focused_bid.clone(),
            elements,
        }
    }

    /// Number of distinct areas present.
    pub fn area_count(&self) -> usize {
        let mut areas: Vec<&str> = self.elements.iter().map(|e| e.area.as_str()).collect();
        areas.sort_unstable();
        areas.dedup();
        areas.len()
    }
}

impl<'a> IntoIterator for &'a ElementTable {
    type Item = &'a UiElement;
    type IntoIter = std::slice::Iter<'a, UiElement>;

    fn into_iter(self) -> Self::IntoIter {
        self.elements.iter()
    }
}
