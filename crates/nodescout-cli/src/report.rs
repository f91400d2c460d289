use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::ValueEnum;
use nodescout_core::NodeClass;
use nodescout_graph::{
    AuxiliaryModel, CapabilityFlags, InputBinding, Link, LinkTarget, Node, PromptEntry, PromptSet,
    SemanticViews, WorkflowGraph,
};
use nodescout_resolver::{BatchResolution, InstallPlan, Resolution};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;

const BANNER_WIDTH: usize = 80;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
    Json,
    Text,
}

impl ReportFormat {
    /// `.txt` outputs are rendered as text, everything else as JSON.
    pub fn for_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("txt") => ReportFormat::Text,
            _ => ReportFormat::Json,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ReportSummary {
    pub total_nodes: usize,
    pub total_links: usize,
    pub orphaned_links: usize,
    pub positive_prompts: usize,
    pub negative_prompts: usize,
    pub auxiliary_models: usize,
    pub builtin_types: usize,
    pub custom_types: usize,
    pub unknown_types: usize,
}

/// Everything learned about one workflow, ready to render.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub source: String,
    pub generated_at: DateTime<Utc>,
    pub summary: ReportSummary,
    pub nodes: Vec<Node>,
    pub links: Vec<Link>,
    pub orphaned_links: Vec<String>,
    pub prompts: PromptSet,
    pub auxiliary_models: Vec<AuxiliaryModel>,
    pub capabilities: CapabilityFlags,
    pub type_usage: BTreeMap<String, Vec<String>>,
    pub classification: BTreeMap<String, NodeClass>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution: Option<BatchResolution>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub install_plan: Option<InstallPlan>,
}

impl AnalysisReport {
    pub fn new(
        source: &Path,
        graph: &WorkflowGraph,
        views: SemanticViews,
        classification: BTreeMap<String, NodeClass>,
    ) -> Self {
        let count = |wanted: fn(&NodeClass) -> bool| {
            classification.values().filter(|c| wanted(*c)).count()
        };
        let summary = ReportSummary {
            total_nodes: graph.node_count(),
            total_links: graph.link_count(),
            orphaned_links: graph.orphaned_links().len(),
            positive_prompts: views.prompts.positive.len(),
            negative_prompts: views.prompts.negative.len(),
            auxiliary_models: views.auxiliary_models.len(),
            builtin_types: count(|c| matches!(c, NodeClass::Builtin)),
            custom_types: count(|c| matches!(c, NodeClass::Custom { .. })),
            unknown_types: count(|c| matches!(c, NodeClass::Unknown)),
        };

        Self {
            source: source.display().to_string(),
            generated_at: Utc::now(),
            summary,
            nodes: graph.nodes().to_vec(),
            links: graph.links().to_vec(),
            orphaned_links: graph.orphaned_links().iter().map(|l| l.id.clone()).collect(),
            prompts: views.prompts,
            auxiliary_models: views.auxiliary_models,
            capabilities: views.capabilities,
            type_usage: graph.type_usage(),
            classification,
            resolution: None,
            install_plan: None,
        }
    }

    pub fn with_resolution(mut self, batch: BatchResolution, plan: InstallPlan) -> Self {
        self.resolution = Some(batch);
        self.install_plan = Some(plan);
        self
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize report")
    }

    pub fn render(&self, format: ReportFormat) -> Result<String> {
        match format {
            ReportFormat::Json => self.to_json(),
            ReportFormat::Text => Ok(self.to_text()),
        }
    }

    pub fn write(&self, path: &Path, format: ReportFormat) -> Result<()> {
        let text = self.render(format)?;
        std::fs::write(path, text)
            .with_context(|| format!("Failed to write report to {}", path.display()))
    }

    pub fn to_text(&self) -> String {
        let mut out = String::new();

        banner(&mut out, "WORKFLOW ANALYSIS");
        let _ = writeln!(out, "Source: {}", self.source);
        let _ = writeln!(out, "Generated: {}", self.generated_at.to_rfc3339());
        let _ = writeln!(out, "Total Nodes: {}", self.summary.total_nodes);
        let _ = writeln!(out, "Total Links: {}", self.summary.total_links);
        if self.summary.orphaned_links > 0 {
            let _ = writeln!(
                out,
                "Orphaned Links: {} ({})",
                self.summary.orphaned_links,
                self.orphaned_links.join(", ")
            );
        }
        if self.capabilities.uses_controlnet {
            let _ = writeln!(out, "ControlNet: detected");
        }
        out.push('\n');

        banner(&mut out, "POSITIVE PROMPTS");
        write_prompts(&mut out, &self.prompts.positive);
        banner(&mut out, "NEGATIVE PROMPTS");
        write_prompts(&mut out, &self.prompts.negative);

        banner(&mut out, "AUXILIARY MODELS");
        if self.auxiliary_models.is_empty() {
            out.push_str("(none)\n");
        }
        for model in &self.auxiliary_models {
            let _ = writeln!(
                out,
                "{} [node {}, {}] model={} clip={}",
                model.name, model.node_id, model.node_type, model.model_strength, model.clip_strength
            );
        }
        out.push('\n');

        banner(&mut out, "NODE CLASSIFICATION");
        for (name, class) in &self.classification {
            let uses = self.type_usage.get(name).map(Vec::len).unwrap_or(0);
            let _ = writeln!(out, "{:<40} {} (x{})", name, class, uses);
        }
        out.push('\n');

        if let Some(batch) = &self.resolution {
            banner(&mut out, "RESOLUTION");
            for (name, resolution) in &batch.results {
                let _ = writeln!(out, "{:<40} {}", name, describe_resolution(resolution));
            }
            if batch.cancelled {
                out.push_str("(cancelled before every name was resolved)\n");
            }
            out.push('\n');
        }

        if let Some(plan) = &self.install_plan {
            banner(&mut out, "INSTALL PLAN");
            if plan.is_empty() {
                out.push_str("(nothing to install)\n");
            }
            for planned in &plan.packages {
                let _ = writeln!(out, "{} ({} stars)", planned.package, planned.stars);
                let _ = writeln!(out, "  {}", planned.description);
                let _ = writeln!(out, "  Nodes: {}", planned.nodes.join(", "));
            }
            out.push('\n');
        }

        banner(&mut out, "NODES");
        for node in &self.nodes {
            let _ = writeln!(out, "Node {}: {}", node.id, node.type_name);
            let _ = writeln!(
                out,
                "  order={} mode={} pos=[{}, {}]",
                node.order, node.mode, node.pos[0], node.pos[1]
            );
            for input in &node.inputs {
                let binding = match &input.binding {
                    InputBinding::Link(id) => format!("link {}", id),
                    InputBinding::Value(value) => value.to_string(),
                    InputBinding::Unbound => "unbound".to_string(),
                };
                let _ = writeln!(out, "  in  {} ({}): {}", input.name, input.type_tag, binding);
            }
            for output in &node.outputs {
                let _ = writeln!(
                    out,
                    "  out {} ({}): {} link(s)",
                    output.name,
                    output.type_tag,
                    output.links.len()
                );
            }
        }
        out.push('\n');

        banner(&mut out, "CONNECTIONS");
        for link in &self.links {
            let target = match &link.target_input {
                LinkTarget::Index(i) => i.to_string(),
                LinkTarget::Name(name) => name.clone(),
            };
            let _ = writeln!(
                out,
                "{}: {}[{}] -> {}[{}] ({}){}",
                link.id,
                link.source,
                link.source_slot,
                link.target,
                target,
                link.type_tag,
                if link.inferred { " inferred" } else { "" }
            );
        }
        out
    }
}

pub fn describe_resolution(resolution: &Resolution) -> String {
    match resolution {
        Resolution::Builtin => "builtin".to_string(),
        Resolution::Local { package } => format!("installed ({})", package),
        Resolution::Found(located) => format!("{} [{}]", located.package, located.tier),
        Resolution::NotFound => "not found".to_string(),
    }
}

fn banner(out: &mut String, title: &str) {
    let rule = "=".repeat(BANNER_WIDTH);
    let _ = writeln!(out, "{}\n{}\n{}\n", rule, title, rule);
}

fn write_prompts(out: &mut String, prompts: &[PromptEntry]) {
    if prompts.is_empty() {
        out.push_str("(none)\n\n");
        return;
    }
    for prompt in prompts {
        let _ = writeln!(
            out,
            "[node {}, {}, order {}] -> {}",
            prompt.node_id,
            prompt.node_type,
            prompt.order,
            prompt.downstream.join(", ")
        );
        let _ = writeln!(out, "{}\n", prompt.text);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nodescout_graph::{build_views, normalize};
    use nodescout_core::PackageRef;
    use nodescout_resolver::{LocatedPackage, ResolutionTier};
    use serde_json::json;

    fn report() -> AnalysisReport {
        let graph = normalize(&json!({
            "3": {"class_type": "CLIPTextEncode", "inputs": {"text": "a cat"}},
            "5": {"class_type": "KSampler", "inputs": {"positive": ["3", 0]}},
            "7": {"class_type": "FancyUpscale", "inputs": {}}
        }))
        .unwrap();
        let views = build_views(&graph);
        let mut classification = BTreeMap::new();
        classification.insert("CLIPTextEncode".to_string(), NodeClass::Builtin);
        classification.insert("KSampler".to_string(), NodeClass::Builtin);
        classification.insert("FancyUpscale".to_string(), NodeClass::Unknown);
        AnalysisReport::new(Path::new("cat.png"), &graph, views, classification)
    }

    #[test]
    fn summary_counts() {
        let report = report();
        assert_eq!(report.summary.total_nodes, 3);
        assert_eq!(report.summary.total_links, 1);
        assert_eq!(report.summary.positive_prompts, 1);
        assert_eq!(report.summary.builtin_types, 2);
        assert_eq!(report.summary.unknown_types, 1);
    }

    #[test]
    fn text_has_sections() {
        let mut batch = BatchResolution::default();
        let package = PackageRef::new("https://github.com/someone/comfy-upscale");
        batch.results.insert(
            "FancyUpscale".to_string(),
            Resolution::Found(LocatedPackage {
                class_name: "FancyUpscale".into(),
                repo_name: package.name().to_string(),
                author: package.author().map(str::to_string),
                package,
                description: "Upscalers".into(),
                stars: 7,
                file_path: None,
                file_url: None,
                tier: ResolutionTier::StaticMap,
            }),
        );
        let plan = InstallPlan::from_resolutions(&batch.results);
        let text = report().with_resolution(batch, plan).to_text();

        for section in [
            "WORKFLOW ANALYSIS",
            "POSITIVE PROMPTS",
            "NODE CLASSIFICATION",
            "RESOLUTION",
            "INSTALL PLAN",
            "CONNECTIONS",
        ] {
            assert!(text.contains(section), "missing {}", section);
        }
        assert!(text.contains("a cat"));
        assert!(text.contains("3_0_to_5_positive"));
        assert!(text.contains("https://github.com/someone/comfy-upscale [static-map]"));
    }

    #[test]
    fn json_omits_resolution_when_absent() {
        let value: serde_json::Value = serde_json::from_str(&report().to_json().unwrap()).unwrap();
        assert_eq!(value["summary"]["total_nodes"], 3);
        assert_eq!(value["prompts"]["positive"][0]["text"], "a cat");
        assert!(value.get("resolution").is_none());
        assert_eq!(value["classification"]["FancyUpscale"]["kind"], "unknown");
    }

    #[test]
    fn format_follows_extension() {
        assert_eq!(ReportFormat::for_path(Path::new("out.TXT")), ReportFormat::Text);
        assert_eq!(ReportFormat::for_path(Path::new("out.json")), ReportFormat::Json);
        assert_eq!(ReportFormat::for_path(Path::new("out")), ReportFormat::Json);
    }

    #[test]
    fn write_creates_text_report() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("report.txt");
        report()
            .write(&path, ReportFormat::for_path(&path))
            .unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.starts_with(&"=".repeat(80)));
        assert!(written.contains("FancyUpscale"));
    }
}
