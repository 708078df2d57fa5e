//! JSON dumps of document subtrees, for debugging and snapshot tests.
//!
//! Node-valued fields are expanded in place, so a bound child that was never
//! appended still shows up under its owner.

use crate::document::Document;
use crate::err::Result;
use crate::node::{Field, Node};
use crate::value::Value;
use indextree::NodeId;
use serde::Serialize;
use serde_json::{Map, Value as JsonValue};

#[derive(Debug, Serialize)]
pub struct NodeSnapshot {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub attributes: Map<String, JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub fields: Map<String, JsonValue>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NodeSnapshot>,
}

impl NodeSnapshot {
    /// `None` when `id` is not a live node of `doc`.
    pub fn capture(doc: &Document, id: NodeId) -> Option<Self> {
        let node = doc.node(id)?;
        Some(NodeSnapshot {
            name: node.name().map(str::to_string),
            attributes: attributes(node),
            text: node.text().map(str::to_string),
            fields: fields(doc, node),
            errors: node.errors().to_vec(),
            children: doc
                .children(id)
                .filter_map(|child| NodeSnapshot::capture(doc, child))
                .collect(),
        })
    }
}

fn attributes(node: &Node) -> Map<String, JsonValue> {
    node.attributes()
        .iter()
        .map(|(k, v)| (k.clone(), JsonValue::String(v.clone())))
        .collect()
}

fn fields(doc: &Document, node: &Node) -> Map<String, JsonValue> {
    let mut out = Map::new();
    for (name, field) in node.fields() {
        let value = match field {
            Field::Single(value) => value_to_json(doc, value),
            Field::List(values) => {
                JsonValue::Array(values.iter().map(|v| value_to_json(doc, v)).collect())
            }
        };
        out.insert(name.to_string(), value);
    }
    out
}

fn value_to_json(doc: &Document, value: &Value) -> JsonValue {
    match value {
        Value::Node(id) => to_json_value(doc, *id),
        other => serde_json::to_value(other).unwrap_or(JsonValue::Null),
    }
}

/// Snapshot of `id` as a JSON value; `null` for a stale id.
pub fn to_json_value(doc: &Document, id: NodeId) -> JsonValue {
    NodeSnapshot::capture(doc, id)
        .and_then(|snapshot| serde_json::to_value(snapshot).ok())
        .unwrap_or(JsonValue::Null)
}

pub fn to_json_string_pretty(doc: &Document, id: NodeId) -> Result<String> {
    Ok(serde_json::to_string_pretty(&to_json_value(doc, id))?)
}
