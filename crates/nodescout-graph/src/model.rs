use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

/// How an input slot receives its value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum InputBinding {
    /// Fed by the link with this id.
    Link(String),
    /// Literal configuration value.
    Value(Value),
    /// Declared but not connected.
    Unbound,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputSlot {
    pub name: String,
    pub type_tag: String,
    pub binding: InputBinding,
}

impl InputSlot {
    pub fn link_id(&self) -> Option<&str> {
        match &self.binding {
            InputBinding::Link(id) => Some(id),
            _ => None,
        }
    }

    pub fn literal(&self) -> Option<&Value> {
        match &self.binding {
            InputBinding::Value(v) => Some(v),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputSlot {
    pub name: String,
    pub type_tag: String,
    pub links: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub type_name: String,
    pub pos: [f64; 2],
    pub size: [f64; 2],
    pub widgets_values: Vec<Value>,
    pub order: i64,
    pub mode: i64,
    pub inputs: Vec<InputSlot>,
    pub outputs: Vec<OutputSlot>,
}

impl Node {
    pub fn input(&self, name: &str) -> Option<&InputSlot> {
        self.inputs.iter().find(|slot| slot.name == name)
    }

    /// Ordered configuration values: widget values when present, otherwise
    /// the literal input values in declaration order.
    pub fn config_values(&self) -> Vec<&Value> {
        if !self.widgets_values.is_empty() {
            return self.widgets_values.iter().collect();
        }
        self.inputs.iter().filter_map(InputSlot::literal).collect()
    }

    pub fn has_output_type(&self, tag: &str) -> bool {
        self.outputs
            .iter()
            .any(|slot| slot.type_tag.eq_ignore_ascii_case(tag))
    }
}

/// Destination input of a link, by position or by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LinkTarget {
    Index(i64),
    Name(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Link {
    pub id: String,
    pub source: String,
    pub source_slot: i64,
    pub target: String,
    pub target_input: LinkTarget,
    pub type_tag: String,
    pub inferred: bool,
}

/// Composite id for a connection recovered from an input's `[source, slot]` pair.
pub fn inferred_link_id(source: &str, slot: i64, target: &str, input: &str) -> String {
    format!("{}_{}_to_{}_{}", source, slot, target, input)
}

/// Canonical node/slot/link model of one workflow.
#[derive(Debug, Clone, Default, Serialize)]
pub struct WorkflowGraph {
    nodes: Vec<Node>,
    links: Vec<Link>,
    #[serde(skip)]
    node_index: HashMap<String, usize>,
    #[serde(skip)]
    link_index: HashMap<String, usize>,
}

impl WorkflowGraph {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Later nodes with a duplicate id replace earlier ones.
    pub(crate) fn push_node(&mut self, node: Node) {
        if let Some(&idx) = self.node_index.get(&node.id) {
            self.nodes[idx] = node;
        } else {
            self.node_index.insert(node.id.clone(), self.nodes.len());
            self.nodes.push(node);
        }
    }

    /// Returns false when a link with the same id already exists.
    pub(crate) fn push_link(&mut self, link: Link) -> bool {
        if self.link_index.contains_key(&link.id) {
            return false;
        }
        self.link_index.insert(link.id.clone(), self.links.len());
        self.links.push(link);
        true
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.node_index.get(id).map(|&idx| &self.nodes[idx])
    }

    pub fn link(&self, id: &str) -> Option<&Link> {
        self.link_index.get(id).map(|&idx| &self.links[idx])
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    /// Links leaving `node_id`, in link order.
    pub fn outgoing<'a>(&'a self, node_id: &'a str) -> impl Iterator<Item = &'a Link> + 'a {
        self.links.iter().filter(move |link| link.source == node_id)
    }

    /// Links with a missing source or target node.
    pub fn orphaned_links(&self) -> Vec<&Link> {
        self.links
            .iter()
            .filter(|link| {
                !self.node_index.contains_key(&link.source)
                    || !self.node_index.contains_key(&link.target)
            })
            .collect()
    }

    /// Logical name of the input a link feeds.
    pub fn target_input_name(&self, link: &Link) -> Option<String> {
        match &link.target_input {
            LinkTarget::Name(name) => Some(name.clone()),
            LinkTarget::Index(idx) => {
                let node = self.node(&link.target)?;
                let idx = usize::try_from(*idx).ok()?;
                node.inputs.get(idx).map(|slot| slot.name.clone())
            }
        }
    }

    /// Distinct type names with the ids of the nodes using them.
    pub fn type_usage(&self) -> BTreeMap<String, Vec<String>> {
        let mut usage: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for node in &self.nodes {
            usage
                .entry(node.type_name.clone())
                .or_default()
                .push(node.id.clone());
        }
        usage
    }

    /// Distinct type names in first-seen order.
    pub fn type_names(&self) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        self.nodes
            .iter()
            .filter(|node| seen.insert(node.type_name.as_str()))
            .map(|node| node.type_name.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str, type_name: &str) -> Node {
        Node {
            id: id.to_string(),
            type_name: type_name.to_string(),
            pos: [0.0, 0.0],
            size: [0.0, 0.0],
            widgets_values: Vec::new(),
            order: 0,
            mode: 0,
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    fn link(id: &str, source: &str, target: &str) -> Link {
        Link {
            id: id.to_string(),
            source: source.to_string(),
            source_slot: 0,
            target: target.to_string(),
            target_input: LinkTarget::Index(0),
            type_tag: "IMAGE".to_string(),
            inferred: false,
        }
    }

    #[test]
    fn duplicate_link_ids_are_rejected() {
        let mut graph = WorkflowGraph::new();
        graph.push_node(node("1", "LoadImage"));
        graph.push_node(node("2", "SaveImage"));
        assert!(graph.push_link(link("7", "1", "2")));
        assert!(!graph.push_link(link("7", "1", "2")));
        assert_eq!(graph.link_count(), 1);
    }

    #[test]
    fn orphaned_links_are_reported() {
        let mut graph = WorkflowGraph::new();
        graph.push_node(node("1", "LoadImage"));
        graph.push_link(link("1", "1", "99"));
        graph.push_link(link("2", "1", "1"));

        let orphans = graph.orphaned_links();
        assert_eq!(orphans.len(), 1);
        assert_eq!(orphans[0].id, "1");
    }

    #[test]
    fn type_usage_groups_ids() {
        let mut graph = WorkflowGraph::new();
        graph.push_node(node("1", "CLIPTextEncode"));
        graph.push_node(node("2", "KSampler"));
        graph.push_node(node("3", "CLIPTextEncode"));

        let usage = graph.type_usage();
        assert_eq!(usage["CLIPTextEncode"], vec!["1", "3"]);
        assert_eq!(graph.type_names(), vec!["CLIPTextEncode", "KSampler"]);
    }

    #[test]
    fn config_values_fall_back_to_literal_inputs() {
        let mut n = node("4", "LoraLoader");
        n.inputs.push(InputSlot {
            name: "model".into(),
            type_tag: "unknown".into(),
            binding: InputBinding::Link("x".into()),
        });
        n.inputs.push(InputSlot {
            name: "lora_name".into(),
            type_tag: "value".into(),
            binding: InputBinding::Value(Value::from("detail.safetensors")),
        });
        assert_eq!(n.config_values(), vec![&Value::from("detail.safetensors")]);

        n.widgets_values.push(Value::from("other.safetensors"));
        assert_eq!(n.config_values(), vec![&Value::from("other.safetensors")]);
    }
}
