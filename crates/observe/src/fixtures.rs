//! A small recorded-style form page for tests.

use serde_json::{Value, json};
use sopilot_core::Observation;

struct DomBuilder {
    strings: Vec<String>,
    backend: Vec<i64>,
    names: Vec<i64>,
    attributes: Vec<Vec<i64>>,
}

impl DomBuilder {
    fn new() -> Self {
        Self {
            strings: Vec::new(),
            backend: Vec::new(),
            names: Vec::new(),
            attributes: Vec::new(),
        }
    }

    fn intern(&mut self, s: &str) -> i64 {
        if let Some(i) = self.strings.iter().position(|x| x == s) {
            return i as i64;
        }
        self.strings.push(s.to_string());
        (self.strings.len() - 1) as i64
    }

    fn node(&mut self, tag: &str, backend: i64, attrs: &[(&str, &str)]) {
        let name = self.intern(tag);
        let flat = attrs
            .iter()
            .flat_map(|(k, v)| [self.intern(k), self.intern(v)])
            .collect();
        self.backend.push(backend);
        self.names.push(name);
        self.attributes.push(flat);
    }

    fn build(self) -> Value {
        json!({
            "documents": [{"nodes": {
                "backendNodeId": self.backend,
                "nodeName": self.names,
                "attributes": self.attributes,
            }}],
            "strings": self.strings,
        })
    }
}

fn ax(id: &str, backend: Option<i64>, role: &str, name: &str, parent: Option<&str>, children: &[&str]) -> Value {
    json!({
        "nodeId": id,
        "backendDOMNodeId": backend,
        "role": {"type": "role", "value": role},
        "name": {"type": "computedString", "value": name},
        "parentId": parent,
        "childIds": children,
        "properties": [],
    })
}

/// A change-request form: label + required textbox, checked checkbox, a
/// popup button, a zero-size div, a hidden input and an unmatched div.
pub(crate) fn form_page() -> Observation {
    let mut dom = DomBuilder::new();
    dom.node("HTML", 1, &[]);
    dom.node("FORM", 500, &[]);
    dom.node("DIV", 501, &[("aria-label", "Planning")]);
    dom.node("LABEL", 10, &[("bid", "a10")]);
    dom.node("SPAN", 11, &[("bid", "a11")]);
    dom.node("INPUT", 12, &[("bid", "a12"), ("required", ""), ("class", "form-control")]);
    dom.node("INPUT", 14, &[("bid", "a14"), ("type", "checkbox")]);
    dom.node(
        "BUTTON",
        20,
        &[("bid", "a20"), ("aria-haspopup", "true"), ("aria-expanded", "true"), ("class", "btn btn-primary")],
    );
    dom.node("DIV", 30, &[("bid", "a30")]);
    dom.node("INPUT", 40, &[("bid", "a40")]);
    dom.node("DIV", 99, &[("bid", "a99")]);

    let mut textbox = ax("12", Some(12), "textbox", "Short description", Some("3"), &[]);
    textbox["value"] = json!({"type": "string", "value": "Reboot"});
    let mut checkbox = ax("14", Some(14), "checkbox", "Urgent", Some("3"), &[]);
    checkbox["properties"] = json!([{"name": "checked", "value": {"type": "tristate", "value": true}}]);
    let mut button = ax("9", Some(20), "button", "Submit", Some("1"), &["20t"]);
    button["properties"] = json!([
        {"name": "hasPopup", "value": {"type": "token", "value": "menu"}},
        {"name": "expanded", "value": {"type": "booleanOrUndefined", "value": true}}
    ]);

    let axtree = json!({"nodes": [
        ax("1", None, "RootWebArea", "Change Request", None, &["2", "9", "30", "40"]),
        ax("2", Some(500), "form", "Change Request", Some("1"), &["3"]),
        ax("3", Some(501), "region", "", Some("2"), &["10", "11", "12", "14"]),
        ax("10", Some(10), "LabelText", "", Some("3"), &["10t"]),
        ax("10t", None, "StaticText", "Short description", Some("10"), &[]),
        ax("11", Some(11), "heading", "Change details", Some("3"), &["11t"]),
        ax("11t", None, "StaticText", "Change details", Some("11"), &[]),
        textbox,
        checkbox,
        button,
        ax("20t", None, "StaticText", "Submit", Some("9"), &[]),
        ax("30", Some(30), "generic", "", Some("1"), &[]),
        ax("40", Some(40), "textbox", "Hidden", Some("1"), &[]),
    ]});

    let props = json!({
        "a10": {"visibility": 1.0, "bbox": [100.0, 200.0, 120.0, 20.0], "clickable": false},
        "a11": {"visibility": 1.0, "bbox": [340.0, 150.0, 100.0, 20.0], "clickable": false},
        "a12": {"visibility": 1.0, "bbox": [240.0, 200.0, 300.0, 24.0], "clickable": true},
        "a14": {"visibility": 1.0, "bbox": [240.0, 240.0, 16.0, 16.0], "clickable": true},
        "a20": {"visibility": 1.0, "bbox": [900.0, 60.0, 80.0, 30.0], "clickable": true},
        "a30": {"visibility": 1.0, "bbox": [0.0, 0.0, 0.0, 0.0], "clickable": false},
        "a40": {"visibility": 0.0, "bbox": [10.0, 900.0, 100.0, 20.0], "clickable": false},
        "a99": {"visibility": 0.0, "bbox": [5.0, 5.0, 50.0, 50.0], "clickable": false},
    });

    Observation {
        goal: "Create a change request".into(),
        dom_object: Some(dom.build()),
        axtree_object: Some(axtree),
        extra_element_properties: Some(props),
        focused_element_bid: Some("a12".into()),
        open_pages_titles: vec!["Change Request | ServiceNow".into()],
        ..Default::default()
    }
}
