//! Wire shapes of the raw observation parts.
//!
//! `dom_object` is a CDP `DOMSnapshot.captureSnapshot` result, `axtree_object`
//! a CDP `Accessibility.getFullAXTree` result, and `extra_element_properties`
//! the BrowserGym per-bid layout map. Only the fields fusion needs are typed.

use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};
use std::collections::HashMap;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DomSnapshot {
    #[serde(default)]
    pub documents: Vec<DocumentSnapshot>,
    /// String table referenced by index from every document
    #[serde(default)]
    pub strings: Vec<String>,
}

impl DomSnapshot {
    pub fn string(&self, index: i64) -> Option<&str> {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.strings.get(i))
            .map(String::as_str)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DocumentSnapshot {
    #[serde(default)]
    pub nodes: NodeTreeSnapshot,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeTreeSnapshot {
    #[serde(default)]
    pub backend_node_id: Vec<i64>,
    /// Flat `[name, value, name, value, ...]` string indexes per node
    #[serde(default)]
    pub attributes: Vec<Vec<i64>>,
    #[serde(default)]
    pub node_name: Vec<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AxTree {
    #[serde(default)]
    pub nodes: Vec<AxNode>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AxNode {
    #[serde(deserialize_with = "id_text")]
    pub node_id: String,
    #[serde(default, rename = "backendDOMNodeId")]
    pub backend_dom_node_id: Option<i64>,
    #[serde(default)]
    pub role: Option<AxValue>,
    #[serde(default)]
    pub name: Option<AxValue>,
    #[serde(default)]
    pub value: Option<AxValue>,
    #[serde(default)]
    pub properties: Vec<AxProperty>,
    #[serde(default, deserialize_with = "id_list")]
    pub child_ids: Vec<String>,
    #[serde(default, deserialize_with = "optional_id_text")]
    pub parent_id: Option<String>,
}

impl AxNode {
    pub fn role(&self) -> &str {
        self.role.as_ref().and_then(AxValue::as_str).unwrap_or("")
    }

    pub fn name(&self) -> &str {
        self.name.as_ref().and_then(AxValue::as_str).unwrap_or("")
    }

    /// The value as display text; non-string values are rendered as JSON.
    pub fn value_text(&self) -> String {
        match self.value.as_ref().and_then(|v| v.value.as_ref()) {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        }
    }

    /// `properties` flattened to name → raw value.
    pub fn property_map(&self) -> Map<String, Value> {
        self.properties
            .iter()
            .map(|p| (p.name.clone(), p.value.value.clone().unwrap_or(Value::Null)))
            .collect()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AxValue {
    #[serde(default)]
    pub value: Option<Value>,
}

impl AxValue {
    pub fn as_str(&self) -> Option<&str> {
        self.value.as_ref().and_then(Value::as_str)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AxProperty {
    pub name: String,
    #[serde(default)]
    pub value: AxValue,
}

/// Layout data for one bid.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ElementProps {
    #[serde(default)]
    pub visibility: f64,
    /// `[x, y, width, height]`
    #[serde(default)]
    pub bbox: Option<Vec<f64>>,
    #[serde(default)]
    pub clickable: bool,
    #[serde(default)]
    pub z_index: i64,
}

pub type ExtraProperties = HashMap<String, ElementProps>;

fn value_to_id(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

// CDP sends AX ids as strings, recorded fixtures sometimes as numbers.
fn id_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(value_to_id(Value::deserialize(deserializer)?).unwrap_or_default())
}

fn optional_id_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(value_to_id(Value::deserialize(deserializer)?))
}

fn id_list<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    let values = Vec::<Value>::deserialize(deserializer)?;
    Ok(values.into_iter().filter_map(value_to_id).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn ax_ids_accept_strings_and_numbers() {
        let node: AxNode = serde_json::from_value(json!({
            "nodeId": 12,
            "backendDOMNodeId": 40,
            "role": {"type": "role", "value": "textbox"},
            "name": {"type": "computedString", "value": "Short description"},
            "childIds": ["13", 14],
            "parentId": "3",
            "properties": [{"name": "required", "value": {"type": "boolean", "value": true}}]
        }))
        .unwrap();
        assert_eq!(node.node_id, "12");
        assert_eq!(node.child_ids, ["13", "14"]);
        assert_eq!(node.parent_id.as_deref(), Some("3"));
        assert_eq!(node.role(), "textbox");
        assert_eq!(node.property_map().get("required"), Some(&json!(true)));
    }

    #[test]
    fn value_text_renders_scalars() {
        let node: AxNode = serde_json::from_value(json!({
            "nodeId": "1",
            "value": {"type": "integer", "value": 3}
        }))
        .unwrap();
        assert_eq!(node.value_text(), "3");
        assert_eq!(AxNode::default().value_text(), "");
    }

    #[test]
    fn dom_string_table_lookup() {
        let dom: DomSnapshot = serde_json::from_value(json!({
            "documents": [{"nodes": {"backendNodeId": [1], "attributes": [[0, 1]], "nodeName": [2]}}],
            "strings": ["bid", "a1", "INPUT"]
        }))
        .unwrap();
        assert_eq!(dom.string(2), Some("INPUT"));
        assert_eq!(dom.string(-1), None);
        assert_eq!(dom.string(9), None);
    }
}
