//! Conversion of embedded workflow JSON into the canonical graph model.
//!
//! Two document shapes are accepted. The editor ("array") shape carries a
//! `nodes` array plus an optional `links` array of 6-tuples. The execution
//! ("keyed") shape maps numeric node ids to `{class_type, inputs}` objects and
//! expresses connections only as `[source_id, source_slot]` input values.

use crate::error::{GraphFormatError, Result};
use crate::model::{
    inferred_link_id, InputBinding, InputSlot, Link, LinkTarget, Node, OutputSlot, WorkflowGraph,
};
use serde_json::{Map, Value};
use tracing::{debug, warn};

/// Number of leading keys inspected when detecting the keyed shape.
const KEYED_PROBE: usize = 5;

const UNKNOWN_TYPE: &str = "Unknown";
const UNKNOWN_TAG: &str = "unknown";
const INFERRED_TAG: &str = "inferred";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowShape {
    Array,
    Keyed,
}

/// Parse workflow JSON text and normalize it.
pub fn parse_workflow(text: &str) -> Result<WorkflowGraph> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(GraphFormatError::NoMetadata);
    }
    let doc: Value =
        serde_json::from_str(trimmed).map_err(|e| GraphFormatError::ParseFailure(e.to_string()))?;
    normalize(&doc)
}

/// `nodes` wins over keyed detection; an empty object counts as keyed.
pub fn detect_shape(doc: &Map<String, Value>) -> Option<WorkflowShape> {
    if doc.contains_key("nodes") {
        return Some(WorkflowShape::Array);
    }
    let keyed = doc
        .keys()
        .take(KEYED_PROBE)
        .all(|key| !key.is_empty() && key.chars().all(|c| c.is_ascii_digit()));
    keyed.then_some(WorkflowShape::Keyed)
}

pub fn normalize(doc: &Value) -> Result<WorkflowGraph> {
    let obj = doc.as_object().ok_or_else(|| {
        GraphFormatError::UnsupportedShape("top-level value is not an object".to_string())
    })?;

    let mut graph = WorkflowGraph::new();
    match detect_shape(obj) {
        Some(WorkflowShape::Array) => {
            match obj.get("nodes") {
                Some(Value::Array(nodes)) => {
                    for raw in nodes {
                        add_array_node(&mut graph, raw);
                    }
                }
                Some(Value::Object(nodes)) => add_keyed_nodes(&mut graph, nodes),
                _ => {
                    return Err(GraphFormatError::UnsupportedShape(
                        "`nodes` is neither an array nor an object".to_string(),
                    ))
                }
            }
            if let Some(Value::Array(links)) = obj.get("links") {
                for raw in links {
                    add_declared_link(&mut graph, raw);
                }
            }
        }
        Some(WorkflowShape::Keyed) => add_keyed_nodes(&mut graph, obj),
        None => {
            return Err(GraphFormatError::UnsupportedShape(
                "document has no `nodes` key and non-numeric top-level keys".to_string(),
            ))
        }
    }

    debug!(
        "Normalized workflow: {} nodes, {} links",
        graph.node_count(),
        graph.link_count()
    );
    Ok(graph)
}

fn add_array_node(graph: &mut WorkflowGraph, raw: &Value) {
    let Some(obj) = raw.as_object() else {
        warn!("Skipping non-object node entry");
        return;
    };
    let id = obj.get("id").map(id_string).unwrap_or_default();
    let type_name = str_field(obj, "type").unwrap_or(UNKNOWN_TYPE).to_string();
    let mut node = base_node(id, type_name, obj);
    let inferred = parse_inputs(&mut node, obj.get("inputs"));
    node.outputs = parse_outputs(obj.get("outputs"));
    graph.push_node(node);
    push_inferred(graph, inferred);
}

fn add_keyed_nodes(graph: &mut WorkflowGraph, nodes: &Map<String, Value>) {
    for (id, raw) in nodes {
        let Some(obj) = raw.as_object() else {
            warn!("Skipping non-object node entry {}", id);
            continue;
        };
        let type_name = str_field(obj, "class_type")
            .unwrap_or(UNKNOWN_TYPE)
            .to_string();
        let mut node = base_node(id.clone(), type_name, obj);
        let inferred = parse_inputs(&mut node, obj.get("inputs"));
        node.outputs = parse_outputs(obj.get("outputs"));
        graph.push_node(node);
        push_inferred(graph, inferred);
    }
}

/// Inferred ids are deterministic, so an already-present id is the same edge.
fn push_inferred(graph: &mut WorkflowGraph, links: Vec<Link>) {
    for link in links {
        let id = link.id.clone();
        if !graph.push_link(link) {
            debug!("Inferred link {} already present", id);
        }
    }
}

fn base_node(id: String, type_name: String, obj: &Map<String, Value>) -> Node {
    Node {
        id,
        type_name,
        pos: pair_field(obj.get("pos")),
        size: pair_field(obj.get("size")),
        widgets_values: match obj.get("widgets_values") {
            Some(Value::Array(values)) => values.clone(),
            _ => Vec::new(),
        },
        order: obj.get("order").and_then(Value::as_i64).unwrap_or(0),
        mode: obj.get("mode").and_then(Value::as_i64).unwrap_or(0),
        inputs: Vec::new(),
        outputs: Vec::new(),
    }
}

/// Fills `node.inputs`; returns links inferred from `[source, slot]` pairs.
fn parse_inputs(node: &mut Node, raw: Option<&Value>) -> Vec<Link> {
    let mut inferred = Vec::new();
    match raw {
        Some(Value::Object(inputs)) => {
            for (name, value) in inputs {
                let (slot, link) = keyed_input(&node.id, name, value);
                node.inputs.push(slot);
                inferred.extend(link);
            }
        }
        Some(Value::Array(inputs)) => {
            for (i, value) in inputs.iter().enumerate() {
                let obj = value.as_object();
                let name = obj
                    .and_then(|o| str_field(o, "name"))
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("input_{}", i));
                let type_tag = obj
                    .and_then(|o| o.get("type"))
                    .map(tag_string)
                    .unwrap_or_else(|| UNKNOWN_TAG.to_string());
                let binding = match obj.and_then(|o| o.get("link")) {
                    Some(link) if !link.is_null() => InputBinding::Link(id_string(link)),
                    _ => InputBinding::Unbound,
                };
                node.inputs.push(InputSlot {
                    name,
                    type_tag,
                    binding,
                });
            }
        }
        _ => {}
    }
    inferred
}

fn keyed_input(target: &str, name: &str, value: &Value) -> (InputSlot, Option<Link>) {
    match value {
        Value::Object(descriptor) => {
            let slot = InputSlot {
                name: name.to_string(),
                type_tag: descriptor
                    .get("type")
                    .map(tag_string)
                    .unwrap_or_else(|| UNKNOWN_TAG.to_string()),
                binding: match descriptor.get("link") {
                    Some(link) if !link.is_null() => InputBinding::Link(id_string(link)),
                    _ => InputBinding::Unbound,
                },
            };
            (slot, None)
        }
        Value::Array(pair) => match connection_pair(pair) {
            Some((source, source_slot)) => {
                let id = inferred_link_id(&source, source_slot, target, name);
                let link = Link {
                    id: id.clone(),
                    source,
                    source_slot,
                    target: target.to_string(),
                    target_input: LinkTarget::Name(name.to_string()),
                    type_tag: INFERRED_TAG.to_string(),
                    inferred: true,
                };
                let slot = InputSlot {
                    name: name.to_string(),
                    type_tag: UNKNOWN_TAG.to_string(),
                    binding: InputBinding::Link(id),
                };
                (slot, Some(link))
            }
            None => (literal_input(name, value), None),
        },
        literal => (literal_input(name, literal), None),
    }
}

fn literal_input(name: &str, value: &Value) -> InputSlot {
    InputSlot {
        name: name.to_string(),
        type_tag: literal_tag(value).to_string(),
        binding: InputBinding::Value(value.clone()),
    }
}

fn parse_outputs(raw: Option<&Value>) -> Vec<OutputSlot> {
    let slot = |name: String, value: &Value| {
        let obj = value.as_object();
        OutputSlot {
            name,
            type_tag: obj
                .and_then(|o| o.get("type"))
                .map(tag_string)
                .unwrap_or_else(|| UNKNOWN_TAG.to_string()),
            links: match obj.and_then(|o| o.get("links")) {
                Some(Value::Array(ids)) => ids.iter().filter(|v| !v.is_null()).map(id_string).collect(),
                _ => Vec::new(),
            },
        }
    };
    match raw {
        Some(Value::Object(outputs)) => outputs
            .iter()
            .map(|(name, value)| slot(name.clone(), value))
            .collect(),
        Some(Value::Array(outputs)) => outputs
            .iter()
            .enumerate()
            .map(|(i, value)| {
                let name = value
                    .as_object()
                    .and_then(|o| str_field(o, "name"))
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("output_{}", i));
                slot(name, value)
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// `[link_id, src_node, src_slot, dst_node, dst_slot, type]`
fn add_declared_link(graph: &mut WorkflowGraph, raw: &Value) {
    let Some(tuple) = raw.as_array().filter(|t| t.len() >= 6) else {
        debug!("Skipping malformed link entry: {}", raw);
        return;
    };
    let target_input = match &tuple[4] {
        Value::String(name) => LinkTarget::Name(name.clone()),
        other => LinkTarget::Index(other.as_i64().unwrap_or(0)),
    };
    let link = Link {
        id: id_string(&tuple[0]),
        source: id_string(&tuple[1]),
        source_slot: tuple[2].as_i64().unwrap_or(0),
        target: id_string(&tuple[3]),
        target_input,
        type_tag: tag_string(&tuple[5]),
        inferred: false,
    };
    if !graph.push_link(link) {
        debug!("Duplicate link id {} ignored", id_string(&tuple[0]));
    }
}

fn connection_pair(pair: &[Value]) -> Option<(String, i64)> {
    if pair.len() < 2 {
        return None;
    }
    let source = match &pair[0] {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    let slot = pair[1].as_i64()?;
    Some((source, slot))
}

fn str_field<'a>(obj: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    obj.get(key).and_then(Value::as_str)
}

fn id_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn tag_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => UNKNOWN_TAG.to_string(),
        other => other.to_string(),
    }
}

fn literal_tag(value: &Value) -> &'static str {
    match value {
        Value::String(_) => "STRING",
        Value::Number(n) if n.is_f64() => "FLOAT",
        Value::Number(_) => "INT",
        Value::Bool(_) => "BOOLEAN",
        _ => "value",
    }
}

/// `[x, y]` or `{"0": x, "1": y}`; anything else is the origin.
fn pair_field(raw: Option<&Value>) -> [f64; 2] {
    match raw {
        Some(Value::Array(items)) if items.len() >= 2 => [
            items[0].as_f64().unwrap_or(0.0),
            items[1].as_f64().unwrap_or(0.0),
        ],
        Some(Value::Object(obj)) => [
            obj.get("0").and_then(Value::as_f64).unwrap_or(0.0),
            obj.get("1").and_then(Value::as_f64).unwrap_or(0.0),
        ],
        _ => [0.0, 0.0],
    }
}
