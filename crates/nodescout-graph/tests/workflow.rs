use nodescout_graph::{
    build_views, load_workflow, parse_workflow, GraphFormatError, InputBinding, JsonFileSource,
    LinkTarget, MetadataSource, Polarity,
};
use std::path::Path;
use tempfile::TempDir;

#[test]
fn keyed_document_infers_links_and_prompt() {
    let doc = r#"{"3": {"class_type": "CLIPTextEncode", "inputs": {"text": "a cat"}},
                  "5": {"class_type": "KSampler", "inputs": {"positive": ["3", 0]}}}"#;
    let graph = parse_workflow(doc).unwrap();

    assert_eq!(graph.node_count(), 2);
    let encoder = graph.node("3").unwrap();
    assert_eq!(
        encoder.input("text").unwrap().binding,
        InputBinding::Value("a cat".into())
    );

    assert_eq!(graph.link_count(), 1);
    let link = &graph.links()[0];
    assert_eq!(link.id, "3_0_to_5_positive");
    assert!(link.inferred);
    assert_eq!(link.target_input, LinkTarget::Name("positive".into()));

    let views = build_views(&graph);
    assert_eq!(views.prompts.positive.len(), 1);
    let prompt = &views.prompts.positive[0];
    assert_eq!(prompt.text, "a cat");
    assert_eq!(prompt.polarity, Polarity::Positive);
    assert_eq!(prompt.downstream, vec!["5"]);
}

#[test]
fn identical_texts_merge_into_one_prompt() {
    let doc = r#"{
        "1": {"class_type": "CLIPTextEncode", "inputs": {"text": "masterpiece, best quality"}},
        "2": {"class_type": "CLIPTextEncode", "inputs": {"text": "masterpiece, best quality"}},
        "3": {"class_type": "KSampler", "inputs": {"positive": ["1", 0]}},
        "4": {"class_type": "KSampler", "inputs": {"positive": ["2", 0]}}
    }"#;
    let graph = parse_workflow(doc).unwrap();
    let views = build_views(&graph);

    assert_eq!(views.prompts.positive.len(), 1);
    let prompt = &views.prompts.positive[0];
    assert_eq!(prompt.node_id, "1, 2");
    assert_eq!(prompt.downstream, vec!["3", "4"]);
    assert!(views.prompts.negative.is_empty());
}

#[test]
fn both_shapes_yield_the_same_logical_graph() {
    let keyed = r#"{"3": {"class_type": "CLIPTextEncode", "inputs": {"text": "a cat"}},
                    "5": {"class_type": "KSampler", "inputs": {"positive": ["3", 0]}}}"#;
    let array = r#"{
        "nodes": [
            {"id": 3, "type": "CLIPTextEncode", "widgets_values": ["a cat"],
             "outputs": [{"name": "CONDITIONING", "type": "CONDITIONING", "links": [1]}]},
            {"id": 5, "type": "KSampler",
             "inputs": [{"name": "positive", "type": "CONDITIONING", "link": 1}]}
        ],
        "links": [[1, 3, 0, 5, 0, "CONDITIONING"]]
    }"#;
    let a = parse_workflow(keyed).unwrap();
    let b = parse_workflow(array).unwrap();

    let ids = |g: &nodescout_graph::WorkflowGraph| {
        g.nodes()
            .iter()
            .map(|n| (n.id.clone(), n.type_name.clone()))
            .collect::<Vec<_>>()
    };
    assert_eq!(ids(&a), ids(&b));

    let edges = |g: &nodescout_graph::WorkflowGraph| {
        g.links()
            .iter()
            .map(|l| {
                (
                    l.source.clone(),
                    l.source_slot,
                    l.target.clone(),
                    g.target_input_name(l),
                )
            })
            .collect::<Vec<_>>()
    };
    assert_eq!(edges(&a), edges(&b));

    let pa = build_views(&a).prompts;
    let pb = build_views(&b).prompts;
    assert_eq!(pa.positive[0].text, pb.positive[0].text);
}

#[test]
fn declared_links_are_not_duplicated() {
    let doc = r#"{
        "nodes": [
            {"id": 1, "type": "LoadImage"},
            {"id": 2, "type": "SaveImage", "inputs": [{"name": "images", "type": "IMAGE", "link": 4}]}
        ],
        "links": [[4, 1, 0, 2, 0, "IMAGE"], [4, 1, 0, 2, 0, "IMAGE"]]
    }"#;
    let first = parse_workflow(doc).unwrap();
    let second = parse_workflow(doc).unwrap();
    assert_eq!(first.link_count(), 1);
    assert_eq!(second.link_count(), 1);
    assert!(!first.links()[0].inferred);
}

#[test]
fn defaults_fill_missing_fields() {
    let doc = r#"{"nodes": [{"id": 12, "inputs": [{"type": "MODEL"}], "outputs": [{"type": "LATENT"}]}]}"#;
    let graph = parse_workflow(doc).unwrap();
    let node = graph.node("12").unwrap();
    assert_eq!(node.type_name, "Unknown");
    assert_eq!(node.pos, [0.0, 0.0]);
    assert_eq!(node.order, 0);
    assert_eq!(node.inputs[0].name, "input_0");
    assert_eq!(node.inputs[0].binding, InputBinding::Unbound);
    assert_eq!(node.outputs[0].name, "output_0");
}

#[test]
fn orphaned_links_survive_normalization() {
    let doc = r#"{"nodes": [{"id": 1, "type": "LoadImage"}], "links": [[9, 1, 0, 42, 0, "IMAGE"]]}"#;
    let graph = parse_workflow(doc).unwrap();
    assert_eq!(graph.orphaned_links().len(), 1);
}

#[test]
fn malformed_inputs_are_typed_errors() {
    assert!(matches!(
        parse_workflow("{not json"),
        Err(GraphFormatError::ParseFailure(_))
    ));
    assert!(matches!(parse_workflow("   "), Err(GraphFormatError::NoMetadata)));
    assert!(matches!(
        parse_workflow(r#"{"version": 1}"#),
        Err(GraphFormatError::UnsupportedShape(_))
    ));
    assert!(matches!(
        parse_workflow("[1, 2]"),
        Err(GraphFormatError::UnsupportedShape(_))
    ));
}

struct EmptySource;

impl MetadataSource for EmptySource {
    fn workflow_text(&self, _path: &Path) -> nodescout_graph::Result<Option<String>> {
        Ok(None)
    }
}

#[test]
fn missing_metadata_is_reported() {
    let result = load_workflow(&EmptySource, Path::new("image.png"));
    assert!(matches!(result, Err(GraphFormatError::NoMetadata)));
}

#[test]
fn json_file_source_loads_exported_documents() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("workflow.json");
    std::fs::write(&path, r#"{"1": {"class_type": "SaveImage", "inputs": {}}}"#).unwrap();

    let graph = load_workflow(&JsonFileSource, &path).unwrap();
    assert_eq!(graph.type_names(), vec!["SaveImage"]);
}
