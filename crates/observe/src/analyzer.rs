//! Observation fusion.
//!
//! Every DOM node carrying a `bid` attribute becomes one record, joined to its
//! accessibility node by backend node id and to its layout data by bid.
//! [`FusedPage::analyze`] then drops layout noise, attaches spatial labels and
//! landmark paths, and produces the [`ElementTable`] the planner reads.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde_json::{Map, Value};
use sopilot_core::element::{BBox, ElementTable, INTERACTIVE_TAGS, UiElement};
use sopilot_core::error::ObservationError;
use sopilot_core::Observation;
use tracing::debug;

use crate::snapshot::{AxNode, AxTree, DomSnapshot, ExtraProperties};

/// AX roles whose names form the area path.
const LANDMARK_ROLES: [&str; 5] = ["form", "region", "navigation", "main", "banner"];

const MAX_INNER_TEXT: usize = 500;
const MAX_CLASS: usize = 100;
const MAX_LABEL_TEXT: usize = 40;
const VIEWPORT_HEIGHT: f64 = 1080.0;

/// One bid-carrying DOM node with everything known about it.
#[derive(Debug, Clone, Default)]
pub struct FusedNode {
    pub bid: String,
    pub backend_id: i64,
    pub tag: String,
    pub role: String,
    pub ax_name: String,
    pub inner_text: String,
    pub value: String,
    pub bbox: Option<Vec<f64>>,
    pub visibility: f64,
    pub z_index: i64,
    pub clickable: bool,
    pub attributes: BTreeMap<String, String>,
    pub ax_props: Map<String, Value>,
    ax_node_id: Option<String>,
}

impl FusedNode {
    fn physical_bbox(&self) -> Option<BBox> {
        match self.bbox.as_deref() {
            Some([x, y, w, h, ..]) => Some(BBox::new(*x, *y, *w, *h)),
            _ => None,
        }
    }

    fn is_interactive(&self) -> bool {
        INTERACTIVE_TAGS.contains(&self.tag.as_str()) || self.clickable
    }

    fn attr(&self, name: &str) -> &str {
        self.attributes.get(name).map(String::as_str).unwrap_or("")
    }

    /// Attribute or AX property mentions `needle` with a value other than false.
    fn mentions(&self, needle: &str) -> bool {
        let attr_hit = self.attributes.iter().any(|(k, v)| {
            let (k, v) = (k.to_lowercase(), v.to_lowercase());
            (k.contains(needle) || v.contains(needle)) && v != "false"
        });
        let prop_hit = self.ax_props.iter().any(|(k, v)| {
            k.to_lowercase().contains(needle) && !matches!(v, Value::Bool(false) | Value::Null)
        });
        attr_hit || prop_hit
    }

    fn prop_is_true(&self, name: &str) -> bool {
        match self.ax_props.get(name) {
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
            _ => false,
        }
    }
}

/// Counts from the DOM/AX join.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FusionStats {
    pub total_bids: usize,
    pub ax_matched: usize,
}

impl FusionStats {
    pub fn match_rate(&self) -> f64 {
        if self.total_bids == 0 {
            0.0
        } else {
            self.ax_matched as f64 / self.total_bids as f64 * 100.0
        }
    }
}

impl std::fmt::Display for FusionStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} bids, {:.1}% AX match", self.total_bids, self.match_rate())
    }
}

/// The fused view of one observation, before row filtering.
#[derive(Debug, Clone, Default)]
pub struct FusedPage {
    pub page_title: String,
    pub focused_bid: String,
    /// Document order
    pub nodes: Vec<FusedNode>,
    pub stats: FusionStats,
    ax_nodes: HashMap<String, AxNode>,
    attrs_by_backend: HashMap<i64, BTreeMap<String, String>>,
}

/// Builds [`FusedPage`]s from raw observations.
pub struct ObservationAnalyzer;

impl ObservationAnalyzer {
    /// Fuse the heavy parts of an observation.
    pub fn fuse(observation: &Observation) -> Result<FusedPage, ObservationError> {
        let dom = observation
            .dom_object
            .as_ref()
            .ok_or(ObservationError::Missing("dom_object"))?;
        let ax = observation
            .axtree_object
            .as_ref()
            .ok_or(ObservationError::Missing("axtree_object"))?;
        let props = observation
            .extra_element_properties
            .as_ref()
            .ok_or(ObservationError::Missing("extra_element_properties"))?;

        Self::fuse_parts(
            dom,
            ax,
            props,
            observation.focused_element_bid.as_deref().unwrap_or(""),
            observation.page_title(),
        )
    }

    pub fn fuse_parts(
        dom: &Value,
        ax: &Value,
        props: &Value,
        focused_bid: &str,
        page_title: &str,
    ) -> Result<FusedPage, ObservationError> {
        let dom: DomSnapshot = parse_part(dom, "dom_object")?;
        let ax: AxTree = parse_part(ax, "axtree_object")?;
        let props: ExtraProperties = parse_part(props, "extra_element_properties")?;

        let ax_nodes: HashMap<String, AxNode> =
            ax.nodes.into_iter().map(|n| (n.node_id.clone(), n)).collect();
        let ax_by_backend: HashMap<i64, &AxNode> = ax_nodes
            .values()
            .filter_map(|n| n.backend_dom_node_id.map(|id| (id, n)))
            .collect();

        let mut nodes = Vec::new();
        let mut attrs_by_backend = HashMap::new();
        let mut stats = FusionStats::default();

        for doc in &dom.documents {
            let tree = &doc.nodes;
            for (i, backend_id) in tree.backend_node_id.iter().copied().enumerate() {
                let attributes = read_attributes(&dom, tree.attributes.get(i));
                let Some(bid) = attributes.get("bid").cloned() else {
                    if !attributes.is_empty() {
                        attrs_by_backend.insert(backend_id, attributes);
                    }
                    continue;
                };

                stats.total_bids += 1;
                let ax_node = ax_by_backend.get(&backend_id).copied();
                if ax_node.is_some() {
                    stats.ax_matched += 1;
                }

                let layout = props.get(&bid).cloned().unwrap_or_default();
                let tag = tree
                    .node_name
                    .get(i)
                    .and_then(|idx| dom.string(*idx))
                    .unwrap_or("")
                    .to_string();

                let node = FusedNode {
                    bid,
                    backend_id,
                    tag,
                    role: ax_node
                        .map(|n| n.role())
                        .filter(|r| !r.is_empty())
                        .unwrap_or("generic")
                        .to_string(),
                    ax_name: ax_node.map(|n| n.name().to_string()).unwrap_or_default(),
                    inner_text: ax_node
                        .map(|n| recursive_text(&ax_nodes, &n.node_id))
                        .unwrap_or_default(),
                    value: ax_node.map(AxNode::value_text).unwrap_or_default(),
                    bbox: layout.bbox,
                    visibility: layout.visibility,
                    z_index: layout.z_index,
                    clickable: layout.clickable,
                    ax_props: ax_node.map(AxNode::property_map).unwrap_or_default(),
                    ax_node_id: ax_node.map(|n| n.node_id.clone()),
                    attributes: attributes.clone(),
                };
                attrs_by_backend.insert(backend_id, attributes);
                nodes.push(node);
            }
        }

        debug!(%stats, title = page_title, "Fused observation");

        Ok(FusedPage {
            page_title: page_title.to_string(),
            focused_bid: focused_bid.to_string(),
            nodes,
            stats,
            ax_nodes,
            attrs_by_backend,
        })
    }
}

fn parse_part<T: serde::de::DeserializeOwned>(
    value: &Value,
    part: &'static str,
) -> Result<T, ObservationError> {
    T::deserialize(value).map_err(|e| ObservationError::Malformed {
        part,
        reason: e.to_string(),
    })
}

fn read_attributes(dom: &DomSnapshot, indexes: Option<&Vec<i64>>) -> BTreeMap<String, String> {
    let mut attributes = BTreeMap::new();
    let Some(indexes) = indexes else {
        return attributes;
    };
    for pair in indexes.chunks_exact(2) {
        if let (Some(k), Some(v)) = (dom.string(pair[0]), dom.string(pair[1])) {
            attributes.insert(k.to_string(), v.to_string());
        }
    }
    attributes
}

/// Space-joined `StaticText` names below `node_id`, in tree order.
fn recursive_text(ax_nodes: &HashMap<String, AxNode>, node_id: &str) -> String {
    let mut texts = Vec::new();
    let mut stack = vec![node_id.to_string()];
    let mut seen = HashSet::new();

    while let Some(id) = stack.pop() {
        if !seen.insert(id.clone()) {
            continue;
        }
        let Some(node) = ax_nodes.get(&id) else {
            continue;
        };
        if node.role() == "StaticText" {
            if !node.name().is_empty() {
                texts.push(node.name().to_string());
            }
            continue;
        }
        stack.extend(node.child_ids.iter().rev().cloned());
    }

    texts.join(" ").trim().to_string()
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

impl FusedPage {
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Filtered, labelled rows for the planner.
    ///
    /// Drops elements without physical size and invisible elements that are
    /// neither focused nor interactive.
    pub fn analyze(&self) -> ElementTable {
        let mut elements = Vec::new();

        for node in &self.nodes {
            let focused = node.bid == self.focused_bid;
            let bbox = node.physical_bbox();
            let has_size = bbox.is_some_and(|b| b.has_physical_size());

            if !has_size && !focused {
                continue;
            }
            if node.visibility == 0.0 && !focused && !node.is_interactive() {
                continue;
            }

            let (label_left, label_above) = self.spatial_labels(node);
            let placeholder = node
                .ax_props
                .get("placeholder")
                .and_then(Value::as_str)
                .unwrap_or_else(|| node.attr("placeholder"))
                .to_string();

            elements.push(UiElement {
                bid: node.bid.clone(),
                area: self.area_path(node),
                page: self.page_title.clone(),
                role: node.role.clone(),
                tag: node.tag.clone(),
                label_left,
                label_above,
                label_ax: node.ax_name.clone(),
                placeholder,
                inner_text: truncate_chars(&node.inner_text, MAX_INNER_TEXT),
                value: node.value.clone(),
                focused,
                required: node.mentions("required"),
                checked: node.prop_is_true("checked"),
                has_popup: node.mentions("haspopup"),
                expanded: node.prop_is_true("expanded")
                    || node.attr("aria-expanded").eq_ignore_ascii_case("true"),
                clickable: node.clickable,
                visibility: node.visibility,
                z_index: node.z_index,
                bbox,
                in_view: bbox.is_some_and(|b| (0.0..=VIEWPORT_HEIGHT).contains(&b.y)),
                background_color: node.attr("background_color").to_string(),
                border_color: node.attr("border_color").to_string(),
                text_color: node.attr("text_color").to_string(),
                class_name: truncate_chars(node.attr("class"), MAX_CLASS),
            });
        }

        ElementTable::new(self.page_title.clone(), self.focused_bid.clone(), elements)
    }

    /// Nearest short text to the left on the same row, and directly above.
    fn spatial_labels(&self, target: &FusedNode) -> (String, String) {
        let Some(t) = target.physical_bbox() else {
            return (String::new(), String::new());
        };
        if t.x == 0.0 && t.y == 0.0 && t.width == 0.0 && t.height == 0.0 {
            return (String::new(), String::new());
        }

        let mut left: Option<(f64, &str)> = None;
        let mut above: Option<(f64, &str)> = None;

        for other in &self.nodes {
            if other.bid == target.bid {
                continue;
            }
            let Some(s) = other.physical_bbox() else {
                continue;
            };
            let text = other.inner_text.as_str();
            if text.is_empty() || text.chars().count() > MAX_LABEL_TEXT {
                continue;
            }

            let left_gap = t.x - s.right();
            if (t.y - s.y).abs() < 15.0
                && left_gap > 0.0
                && left_gap < 160.0
                && left.is_none_or(|(gap, _)| left_gap < gap)
            {
                left = Some((left_gap, text));
            }

            let above_gap = t.y - s.bottom();
            if (t.center_x() - s.center_x()).abs() < 50.0
                && above_gap > 0.0
                && above_gap < 60.0
                && above.is_none_or(|(gap, _)| above_gap < gap)
            {
                above = Some((above_gap, text));
            }
        }

        (
            left.map(|(_, t)| t.to_string()).unwrap_or_default(),
            above.map(|(_, t)| t.to_string()).unwrap_or_default(),
        )
    }

    /// Landmark names from the outermost ancestor down, joined by " > ".
    fn area_path(&self, node: &FusedNode) -> String {
        let mut path: Vec<String> = Vec::new();
        let mut current = node.ax_node_id.clone();
        let mut seen = HashSet::new();

        while let Some(id) = current {
            if !seen.insert(id.clone()) {
                break;
            }
            let Some(ax) = self.ax_nodes.get(&id) else {
                break;
            };
            if LANDMARK_ROLES.contains(&ax.role()) {
                let name = if ax.name().is_empty() {
                    ax.backend_dom_node_id
                        .and_then(|b| self.attrs_by_backend.get(&b))
                        .and_then(|a| a.get("aria-label"))
                        .map(String::as_str)
                        .unwrap_or("")
                } else {
                    ax.name()
                };
                if !name.is_empty() && !path.iter().any(|p| p == name) {
                    path.push(name.to_string());
                }
            }
            current = ax.parent_id.clone();
        }

        if path.is_empty() {
            "Main Content".into()
        } else {
            path.reverse();
            path.join(" > ")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::form_page;

    fn analyzed() -> ElementTable {
        let obs = form_page();
        ObservationAnalyzer::fuse(&obs).unwrap().analyze()
    }

    #[test]
    fn fusion_joins_dom_and_ax() {
        let page = ObservationAnalyzer::fuse(&form_page()).unwrap();
        assert_eq!(page.stats.total_bids, 8);
        assert_eq!(page.stats.ax_matched, 7);
        let input = page.nodes.iter().find(|n| n.bid == "a12").unwrap();
        assert_eq!(input.tag, "INPUT");
        assert_eq!(input.role, "textbox");
        assert_eq!(input.value, "Reboot");
        let unmatched = page.nodes.iter().find(|n| n.bid == "a99").unwrap();
        assert_eq!(unmatched.role, "generic");
    }

    #[test]
    fn inner_text_collects_static_text() {
        let page = ObservationAnalyzer::fuse(&form_page()).unwrap();
        let button = page.nodes.iter().find(|n| n.bid == "a20").unwrap();
        assert_eq!(button.inner_text, "Submit");
    }

    #[test]
    fn analyze_drops_sizeless_and_hidden_noise() {
        let table = analyzed();
        // a30: zero-size; a99: invisible div
        assert!(!table.contains("a30"));
        assert!(!table.contains("a99"));
        // a40: invisible but an INPUT
        assert!(table.contains("a40"));
    }

    #[test]
    fn focused_element_survives_without_size() {
        let mut obs = form_page();
        obs.focused_element_bid = Some("a30".into());
        let table = ObservationAnalyzer::fuse(&obs).unwrap().analyze();
        let row = table.find("a30").unwrap();
        assert!(row.focused);
    }

    #[test]
    fn spatial_label_is_nearest_left_text() {
        let table = analyzed();
        let input = table.find("a12").unwrap();
        assert_eq!(input.label_left, "Short description");
        assert_eq!(input.label_above, "Change details");
    }

    #[test]
    fn area_walks_landmark_ancestors() {
        let table = analyzed();
        assert_eq!(table.find("a12").unwrap().area, "Change Request > Planning");
        assert_eq!(table.find("a40").unwrap().area, "Main Content");
    }

    #[test]
    fn flags_from_attributes_and_props() {
        let table = analyzed();
        let input = table.find("a12").unwrap();
        assert!(input.required);
        assert_eq!(input.status(), "Required");
        let checkbox = table.find("a14").unwrap();
        assert!(checkbox.checked);
        assert!(!checkbox.required);
        let menu = table.find("a20").unwrap();
        assert!(menu.has_popup);
        assert!(menu.expanded);
        assert_eq!(menu.hover_strategy(), "Investigate");
    }

    #[test]
    fn missing_parts_are_reported() {
        let err = ObservationAnalyzer::fuse(&Observation::default()).unwrap_err();
        assert!(matches!(err, ObservationError::Missing("dom_object")));
    }

    #[test]
    fn match_rate_handles_empty() {
        assert_eq!(FusionStats::default().match_rate(), 0.0);
        let stats = FusionStats { total_bids: 4, ax_matched: 3 };
        assert_eq!(stats.to_string(), "4 bids, 75.0% AX match");
    }
}
