//! Derived views over a normalized workflow: prompt chains, auxiliary model
//! loaders and capability flags.

use crate::model::{InputBinding, Link, Node, WorkflowGraph};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;
use tracing::debug;

const CONDITIONING_TAG: &str = "CONDITIONING";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Polarity {
    Positive,
    Negative,
}

impl Polarity {
    fn from_input_name(name: &str) -> Option<Self> {
        let lower = name.to_lowercase();
        if lower.contains("positive") {
            Some(Polarity::Positive)
        } else if lower.contains("negative") {
            Some(Polarity::Negative)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PromptEntry {
    pub text: String,
    /// Originating node ids, `", "`-joined when merged.
    pub node_id: String,
    pub node_type: String,
    pub polarity: Polarity,
    pub order: i64,
    /// Nodes the chain reaches, sorted by their execution order.
    pub downstream: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PromptSet {
    pub positive: Vec<PromptEntry>,
    pub negative: Vec<PromptEntry>,
}

impl PromptSet {
    pub fn len(&self) -> usize {
        self.positive.len() + self.negative.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuxiliaryModel {
    pub node_id: String,
    pub node_type: String,
    pub name: String,
    pub model_strength: f64,
    pub clip_strength: f64,
    pub order: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CapabilityFlags {
    pub uses_controlnet: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SemanticViews {
    pub prompts: PromptSet,
    pub auxiliary_models: Vec<AuxiliaryModel>,
    pub capabilities: CapabilityFlags,
}

/// Build every semantic view for `graph`.
pub fn build_views(graph: &WorkflowGraph) -> SemanticViews {
    SemanticViews {
        prompts: extract_prompts(graph),
        auxiliary_models: auxiliary_models(graph),
        capabilities: capability_flags(graph),
    }
}

/// Combiners and conditioning modifiers pass text through rather than author it.
pub fn is_combiner(type_name: &str) -> bool {
    let lower = type_name.to_lowercase();
    lower.contains("combine")
        || lower.contains("concat")
        || (lower.contains("condition") && !lower.contains("encode"))
}

/// A node produces conditioning if it declares a CONDITIONING output, or, for
/// documents without declared outputs, if any outgoing edge carries that tag or
/// feeds a conditioning-named input.
pub fn is_conditioning(graph: &WorkflowGraph, node: &Node) -> bool {
    if node.has_output_type(CONDITIONING_TAG) {
        return true;
    }
    if !node.outputs.is_empty() {
        return false;
    }
    graph.outgoing(&node.id).any(|link| {
        link.type_tag.eq_ignore_ascii_case(CONDITIONING_TAG)
            || graph
                .target_input_name(link)
                .map(|name| {
                    let lower = name.to_lowercase();
                    lower.contains("conditioning")
                        || lower.contains("positive")
                        || lower.contains("negative")
                })
                .unwrap_or(false)
    })
}

pub fn extract_prompts(graph: &WorkflowGraph) -> PromptSet {
    let mut raw = Vec::new();
    for node in graph.nodes() {
        if !is_conditioning(graph, node) || is_combiner(&node.type_name) {
            continue;
        }
        let mut visited = HashSet::new();
        let Some((polarity, reached)) = trace_polarity(graph, &node.id, &mut visited) else {
            debug!("No polarity for conditioning node {}", node.id);
            continue;
        };
        let mut seen = HashSet::new();
        let Some(text) = prompt_text(graph, node, &mut seen) else {
            continue;
        };
        raw.push(PromptEntry {
            text,
            node_id: node.id.clone(),
            node_type: node.type_name.clone(),
            polarity,
            order: node.order,
            downstream: vec![reached],
        });
    }

    let mut set = PromptSet::default();
    for entry in raw {
        let bucket = match entry.polarity {
            Polarity::Positive => &mut set.positive,
            Polarity::Negative => &mut set.negative,
        };
        bucket.push(entry);
    }
    set.positive = dedupe_prompts(graph, set.positive);
    set.negative = dedupe_prompts(graph, set.negative);
    set
}

/// Depth-first walk over outgoing links until an input named positive or
/// negative is reached. Returns the polarity and the node that decided it.
fn trace_polarity(
    graph: &WorkflowGraph,
    node_id: &str,
    visited: &mut HashSet<String>,
) -> Option<(Polarity, String)> {
    if !visited.insert(node_id.to_string()) {
        return None;
    }
    let outgoing: Vec<&Link> = graph.outgoing(node_id).collect();
    for link in outgoing {
        if let Some(polarity) = graph
            .target_input_name(link)
            .as_deref()
            .and_then(Polarity::from_input_name)
        {
            return Some((polarity, link.target.clone()));
        }
        if let Some(next) = graph.node(&link.target) {
            if is_conditioning(graph, next) {
                if let Some(found) = trace_polarity(graph, &next.id, visited) {
                    return Some(found);
                }
            }
        }
    }
    None
}

/// Literal text among the node's configuration values, otherwise the first
/// literal found upstream through a linked text input.
fn prompt_text(graph: &WorkflowGraph, node: &Node, visited: &mut HashSet<String>) -> Option<String> {
    if !visited.insert(node.id.clone()) {
        return None;
    }
    let literal = node
        .config_values()
        .into_iter()
        .find_map(|value| match value {
            Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
            _ => None,
        });
    if literal.is_some() {
        return literal;
    }

    for slot in &node.inputs {
        let is_text = slot.type_tag.eq_ignore_ascii_case("STRING")
            || slot.name.to_lowercase().contains("text");
        let InputBinding::Link(link_id) = &slot.binding else {
            continue;
        };
        if !is_text {
            continue;
        }
        let Some(upstream) = graph.link(link_id).and_then(|l| graph.node(&l.source)) else {
            continue;
        };
        if let Some(text) = prompt_text(graph, upstream, visited) {
            return Some(text);
        }
    }
    None
}

/// Merge entries with identical text, keeping encounter order of first sight.
pub fn dedupe_prompts(graph: &WorkflowGraph, entries: Vec<PromptEntry>) -> Vec<PromptEntry> {
    let mut merged: Vec<PromptEntry> = Vec::new();
    for entry in entries {
        match merged.iter_mut().find(|m| m.text == entry.text) {
            Some(existing) => {
                existing.node_id = format!("{}, {}", existing.node_id, entry.node_id);
                existing.node_type = format!("{}, {}", existing.node_type, entry.node_type);
                existing.order = existing.order.min(entry.order);
                for id in entry.downstream {
                    if !existing.downstream.contains(&id) {
                        existing.downstream.push(id);
                    }
                }
            }
            None => merged.push(entry),
        }
    }
    for entry in &mut merged {
        entry
            .downstream
            .sort_by_key(|id| graph.node(id).map(|n| n.order).unwrap_or(i64::MAX));
    }
    merged.sort_by_key(|entry| entry.order);
    merged
}

/// LoRA-style loaders: identifier, model strength, clip strength.
pub fn auxiliary_models(graph: &WorkflowGraph) -> Vec<AuxiliaryModel> {
    let mut models: Vec<AuxiliaryModel> = graph
        .nodes()
        .iter()
        .filter(|node| {
            let lower = node.type_name.to_lowercase();
            lower.contains("lora") && lower.contains("load")
        })
        .map(|node| {
            let values = node.config_values();
            let name = values
                .first()
                .map(|v| match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .unwrap_or_else(|| "Unknown".to_string());
            let strength = |idx: usize| values.get(idx).and_then(|v| v.as_f64()).unwrap_or(1.0);
            AuxiliaryModel {
                node_id: node.id.clone(),
                node_type: node.type_name.clone(),
                name,
                model_strength: strength(1),
                clip_strength: strength(2),
                order: node.order,
            }
        })
        .collect();
    models.sort_by_key(|m| m.order);
    models
}

pub fn capability_flags(graph: &WorkflowGraph) -> CapabilityFlags {
    let uses_controlnet = graph.nodes().iter().any(|node| {
        let lower = node.type_name.to_lowercase();
        lower.contains("controlnet") || lower.contains("control_net") || lower.contains("control net")
    });
    CapabilityFlags { uses_controlnet }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::parse_workflow;

    #[test]
    fn combiner_heuristic() {
        assert!(is_combiner("ConditioningCombine"));
        assert!(is_combiner("ConditioningSetArea"));
        assert!(is_combiner("StringConcatenate"));
        assert!(!is_combiner("CLIPTextEncode"));
        assert!(!is_combiner("ConditioningTextEncodeSDXL"));
        assert!(!is_combiner("KSampler"));
    }

    #[test]
    fn cycle_among_conditioning_nodes_terminates() {
        let doc = r#"{
            "nodes": [
                {"id": 1, "type": "CLIPTextEncode", "widgets_values": ["loop"],
                 "outputs": [{"name": "CONDITIONING", "type": "CONDITIONING", "links": [1]}]},
                {"id": 2, "type": "ConditioningZeroOut",
                 "inputs": [{"name": "conditioning", "type": "CONDITIONING", "link": 1}],
                 "outputs": [{"name": "CONDITIONING", "type": "CONDITIONING", "links": [2]}]},
                {"id": 3, "type": "ConditioningSetMask",
                 "inputs": [{"name": "conditioning", "type": "CONDITIONING", "link": 2}],
                 "outputs": [{"name": "CONDITIONING", "type": "CONDITIONING", "links": [3]}]}
            ],
            "links": [
                [1, 1, 0, 2, 0, "CONDITIONING"],
                [2, 2, 0, 3, 0, "CONDITIONING"],
                [3, 3, 0, 2, 0, "CONDITIONING"]
            ]
        }"#;
        let graph = parse_workflow(doc).unwrap();
        let prompts = extract_prompts(&graph);
        assert!(prompts.is_empty());
    }

    #[test]
    fn polarity_found_through_modifier() {
        let doc = r#"{
            "nodes": [
                {"id": 1, "type": "CLIPTextEncode", "order": 2, "widgets_values": ["a red fox"],
                 "outputs": [{"name": "CONDITIONING", "type": "CONDITIONING", "links": [1]}]},
                {"id": 2, "type": "ConditioningSetArea", "order": 3,
                 "inputs": [{"name": "conditioning", "type": "CONDITIONING", "link": 1}],
                 "outputs": [{"name": "CONDITIONING", "type": "CONDITIONING", "links": [2]}]},
                {"id": 3, "type": "KSampler", "order": 4,
                 "inputs": [{"name": "model", "type": "MODEL", "link": null},
                            {"name": "negative", "type": "CONDITIONING", "link": 2}]}
            ],
            "links": [[1, 1, 0, 2, 0, "CONDITIONING"], [2, 2, 0, 3, 1, "CONDITIONING"]]
        }"#;
        let graph = parse_workflow(doc).unwrap();
        let prompts = extract_prompts(&graph);
        assert!(prompts.positive.is_empty());
        assert_eq!(prompts.negative.len(), 1);
        assert_eq!(prompts.negative[0].text, "a red fox");
        assert_eq!(prompts.negative[0].downstream, vec!["3"]);
    }

    #[test]
    fn text_traced_through_linked_input() {
        let doc = r#"{
            "nodes": [
                {"id": 7, "type": "PrimitiveString", "widgets_values": ["upstream words"],
                 "outputs": [{"name": "STRING", "type": "STRING", "links": [10]}]},
                {"id": 8, "type": "CLIPTextEncode", "widgets_values": [],
                 "inputs": [{"name": "text", "type": "STRING", "link": 10}],
                 "outputs": [{"name": "CONDITIONING", "type": "CONDITIONING", "links": [11]}]},
                {"id": 9, "type": "KSampler",
                 "inputs": [{"name": "positive", "type": "CONDITIONING", "link": 11}]}
            ],
            "links": [[10, 7, 0, 8, 0, "STRING"], [11, 8, 0, 9, 0, "CONDITIONING"]]
        }"#;
        let graph = parse_workflow(doc).unwrap();
        let prompts = extract_prompts(&graph);
        assert_eq!(prompts.positive.len(), 1);
        assert_eq!(prompts.positive[0].text, "upstream words");
        assert_eq!(prompts.positive[0].node_id, "8");
    }

    #[test]
    fn dedupe_merges_identical_text() {
        let doc = r#"{
            "nodes": [
                {"id": 1, "type": "KSampler", "order": 9},
                {"id": 2, "type": "KSampler", "order": 5}
            ]
        }"#;
        let graph = parse_workflow(doc).unwrap();
        let entry = |id: &str, order: i64, downstream: &[&str]| PromptEntry {
            text: "same".to_string(),
            node_id: id.to_string(),
            node_type: "CLIPTextEncode".to_string(),
            polarity: Polarity::Positive,
            order,
            downstream: downstream.iter().map(|s| s.to_string()).collect(),
        };
        let merged = dedupe_prompts(&graph, vec![entry("4", 3, &["1"]), entry("6", 1, &["1", "2"])]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].node_id, "4, 6");
        assert_eq!(merged[0].order, 1);
        assert_eq!(merged[0].downstream, vec!["2", "1"]);
    }

    #[test]
    fn lora_loaders_use_positional_defaults() {
        let doc = r#"{
            "nodes": [
                {"id": 1, "type": "LoraLoader", "order": 4,
                 "widgets_values": ["detail.safetensors", 0.8]},
                {"id": 2, "type": "LoraLoaderModelOnly", "order": 1,
                 "widgets_values": ["style.safetensors", 0.5, 0.25]},
                {"id": 3, "type": "ControlNetApply"}
            ]
        }"#;
        let graph = parse_workflow(doc).unwrap();
        let views = build_views(&graph);
        assert_eq!(views.auxiliary_models.len(), 2);
        assert_eq!(views.auxiliary_models[0].name, "style.safetensors");
        assert_eq!(views.auxiliary_models[1].model_strength, 0.8);
        assert_eq!(views.auxiliary_models[1].clip_strength, 1.0);
        assert!(views.capabilities.uses_controlnet);
    }
}
