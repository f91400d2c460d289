mod report;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use nodescout_census::{CensusCache, CensusReport, NodeCensus, NodeClassifier};
use nodescout_core::{ConfigManager, NodeClass, NodeScoutConfig};
use nodescout_graph::{build_views, load_workflow, source_for_path, WorkflowGraph};
use nodescout_resolver::{
    FileRegistrySource, GitInstaller, GithubCodeSearch, HttpRegistrySource, InstallPlan,
    Installer, NodeRegistry, RegistrySource, RepositoryResolver, Resolution, ResolverSettings,
    SearchTransport,
};
use report::{describe_resolution, AnalysisReport, ReportFormat};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, EnvFilter, Registry};

#[derive(Parser)]
#[command(name = "nodescout")]
#[command(about = "Find the node packages a workflow needs", long_about = None)]
#[command(version)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Installation root (overrides COMFYUI_LOCATION and the config file)
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the graph, prompts and models embedded in an image or workflow file
    Inspect {
        /// PNG with embedded workflow, or an exported workflow .json
        image: PathBuf,

        /// Print the canonical graph as JSON
        #[arg(long)]
        json: bool,
    },

    /// Inventory the node types available in an installation
    Census {
        /// Ignore the cached census
        #[arg(short, long)]
        force: bool,

        /// Write the census as JSON
        #[arg(short, long)]
        export: Option<PathBuf>,
    },

    /// Classify every node type of a workflow and locate missing packages
    Analyze {
        /// PNG with embedded workflow, or an exported workflow .json
        image: PathBuf,

        /// Look up packages for unknown node types
        #[arg(long)]
        resolve: bool,

        /// Clone located packages into the custom nodes directory (implies --resolve)
        #[arg(long)]
        install: bool,

        /// Use a local registry document instead of fetching it
        #[arg(long)]
        registry_file: Option<PathBuf>,

        /// Ignore the cached census
        #[arg(long)]
        force_scan: bool,

        /// Write the report to a file
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Report format (defaults to the output extension: .txt is text)
        #[arg(long, value_enum)]
        format: Option<ReportFormat>,
    },

    /// Census cache maintenance
    #[command(subcommand)]
    Cache(CacheCommands),

    /// Configuration management
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand)]
enum CacheCommands {
    /// Delete the cached census of the installation
    Clear,

    /// Show what the cache holds
    Info,
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Write a default config file
    Init {
        /// Destination (defaults to ~/.nodescout/config.toml)
        path: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Print the effective configuration
    Show,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut manager = ConfigManager::load().context("Failed to load configuration")?;
    if let Some(root) = &cli.root {
        manager.config_mut().installation.root = Some(root.clone());
    }
    init_tracing(manager.config(), cli.verbose);
    manager.log_summary();

    if let Err(e) = run(&cli, &manager).await {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
    Ok(())
}

fn init_tracing(config: &NodeScoutConfig, verbose: bool) {
    let default_level = if verbose {
        "debug".to_string()
    } else {
        config.logging.level.clone()
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&default_level));

    if config.logging.format == "json" {
        let subscriber = Registry::default()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr));
        tracing::subscriber::set_global_default(subscriber).ok();
    } else {
        let subscriber = Registry::default()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr));
        tracing::subscriber::set_global_default(subscriber).ok();
    }
}

async fn run(cli: &Cli, manager: &ConfigManager) -> Result<()> {
    let config = manager.config();
    match &cli.command {
        Commands::Inspect { image, json } => handle_inspect(image, *json),
        Commands::Census { force, export } => handle_census(config, *force, export.as_deref()),
        Commands::Analyze {
            image,
            resolve,
            install,
            registry_file,
            force_scan,
            output,
            format,
        } => {
            let options = AnalyzeOptions {
                resolve: *resolve || *install,
                install: *install,
                registry_file: registry_file.clone(),
                force_scan: *force_scan,
                output: output.clone(),
                format: *format,
            };
            handle_analyze(config, image, options).await
        }
        Commands::Cache(CacheCommands::Clear) => handle_cache_clear(config),
        Commands::Cache(CacheCommands::Info) => handle_cache_info(config),
        Commands::Config(ConfigCommands::Init { path, force }) => {
            handle_config_init(path.clone(), *force)
        }
        Commands::Config(ConfigCommands::Show) => handle_config_show(manager),
    }
}

fn installation_root(config: &NodeScoutConfig) -> Result<PathBuf> {
    match &config.installation.root {
        Some(root) => Ok(root.clone()),
        None => bail!("No installation root; pass --root or set COMFYUI_LOCATION"),
    }
}

fn load_graph(image: &Path) -> Result<WorkflowGraph> {
    let source = source_for_path(image);
    load_workflow(source.as_ref(), image)
        .with_context(|| format!("Failed to read workflow from {}", image.display()))
}

fn handle_inspect(image: &Path, json: bool) -> Result<()> {
    let graph = load_graph(image)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&graph)?);
        return Ok(());
    }

    let views = build_views(&graph);
    println!("{}", "Workflow".cyan().bold());
    println!("  Source: {}", image.display());
    println!("  Nodes: {}", graph.node_count());
    println!("  Links: {}", graph.link_count());
    let orphaned = graph.orphaned_links();
    if !orphaned.is_empty() {
        println!(
            "  {} {}",
            "Orphaned links:".yellow(),
            orphaned
                .iter()
                .map(|l| l.id.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );
    }
    if views.capabilities.uses_controlnet {
        println!("  {}", "ControlNet detected".yellow().bold());
    }

    println!();
    println!("{}", "Node types".cyan().bold());
    for (type_name, ids) in graph.type_usage() {
        println!("  {:<40} x{} [{}]", type_name, ids.len(), ids.join(", "));
    }

    for (title, prompts) in [
        ("Positive prompts", &views.prompts.positive),
        ("Negative prompts", &views.prompts.negative),
    ] {
        println!();
        println!("{}", title.cyan().bold());
        if prompts.is_empty() {
            println!("  (none)");
        }
        for prompt in prompts {
            println!("  [{}] {}", prompt.node_id.dimmed(), prompt.text);
        }
    }

    if !views.auxiliary_models.is_empty() {
        println!();
        println!("{}", "Auxiliary models".cyan().bold());
        for model in &views.auxiliary_models {
            println!(
                "  {} (model {}, clip {})",
                model.name, model.model_strength, model.clip_strength
            );
        }
    }
    Ok(())
}

fn run_census(config: &NodeScoutConfig, force: bool) -> Result<CensusReport> {
    let root = installation_root(config)?;
    let census = NodeCensus::new(config);
    census
        .scan(&root, force)
        .with_context(|| format!("Census of {} failed", root.display()))
}

fn handle_census(config: &NodeScoutConfig, force: bool, export: Option<&Path>) -> Result<()> {
    let report = run_census(config, force)?;
    let summary = report.snapshot.summary();

    println!(
        "{} {} builtin, {} custom nodes from {} packages{}",
        "Census:".green().bold(),
        summary.total_builtin,
        summary.total_custom,
        summary.total_repos,
        if report.from_cache { " (cached)" } else { "" }
    );
    for skipped in &report.skipped_packages {
        println!("  {} {}: {}", "skipped".yellow(), skipped.package, skipped.reason);
    }
    for (package, names) in report.snapshot.packages() {
        println!("  {} ({})", package.bold(), names.len());
    }

    if let Some(path) = export {
        report
            .snapshot
            .write_json(path)
            .with_context(|| format!("Failed to export census to {}", path.display()))?;
        println!("{} {}", "Exported:".green(), path.display());
    }
    Ok(())
}

struct AnalyzeOptions {
    resolve: bool,
    install: bool,
    registry_file: Option<PathBuf>,
    force_scan: bool,
    output: Option<PathBuf>,
    format: Option<ReportFormat>,
}

async fn handle_analyze(
    config: &NodeScoutConfig,
    image: &Path,
    options: AnalyzeOptions,
) -> Result<()> {
    let graph = load_graph(image)?;
    let views = build_views(&graph);

    let census = match &config.installation.root {
        Some(_) => Some(run_census(config, options.force_scan)?),
        None => {
            println!(
                "{}",
                "No installation root configured; every type is treated as unknown".yellow()
            );
            None
        }
    };
    let classifier = census.as_ref().map(|c| NodeClassifier::new(&c.snapshot));

    let type_names = graph.type_names();
    let classification: BTreeMap<String, NodeClass> = type_names
        .iter()
        .map(|name| {
            let class = classifier
                .as_ref()
                .map(|c| c.classify(name))
                .unwrap_or(NodeClass::Unknown);
            (name.clone(), class)
        })
        .collect();

    println!("{}", "Node classification".cyan().bold());
    for (name, class) in &classification {
        let label = match class {
            NodeClass::Builtin => class.to_string().green(),
            NodeClass::Custom { .. } => class.to_string().blue(),
            NodeClass::Unknown => class.to_string().red(),
        };
        println!("  {:<40} {}", name, label);
    }

    let mut report = AnalysisReport::new(image, &graph, views, classification.clone());

    if options.resolve {
        let resolver = build_resolver(config, options.registry_file.as_deref())?;
        let names: Vec<(String, NodeClass)> = classification.into_iter().collect();

        let cancel = CancellationToken::new();
        let ctrl_c = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                ctrl_c.cancel();
            }
        });

        let batch = resolver
            .resolve_batch(&names, &cancel)
            .await
            .context("Package resolution aborted")?;
        let plan = InstallPlan::from_resolutions(&batch.results);

        println!();
        println!("{}", "Resolution".cyan().bold());
        for (name, resolution) in &batch.results {
            if matches!(resolution, Resolution::Builtin) {
                continue;
            }
            println!("  {:<40} {}", name, describe_resolution(resolution));
        }
        if batch.cancelled {
            println!("  {}", "Cancelled; results are partial".yellow());
        }

        if options.install {
            install_plan(config, &plan)?;
        } else if !plan.is_empty() {
            println!();
            println!(
                "{} {} package(s) to install; rerun with --install to clone them",
                "Plan:".green().bold(),
                plan.len()
            );
        }
        report = report.with_resolution(batch, plan);
    }

    if let Some(path) = &options.output {
        let format = options.format.unwrap_or_else(|| ReportFormat::for_path(path));
        report.write(path, format)?;
        println!("{} {}", "Report written:".green(), path.display());
    } else if let Some(format) = options.format {
        println!("{}", report.render(format)?);
    }
    Ok(())
}

fn build_resolver(
    config: &NodeScoutConfig,
    registry_file: Option<&Path>,
) -> Result<RepositoryResolver> {
    let settings = &config.resolver;
    let source: Arc<dyn RegistrySource> = match registry_file {
        Some(path) => Arc::new(FileRegistrySource::new(path)),
        None => Arc::new(HttpRegistrySource::new(
            settings.registry_url.clone(),
            Duration::from_secs(settings.registry_timeout_secs),
        )?),
    };

    let search: Option<Arc<dyn SearchTransport>> = match &settings.github_token {
        Some(token) => Some(Arc::new(GithubCodeSearch::new(
            settings.search_api_base.clone(),
            token.clone(),
            Duration::from_secs(settings.search_timeout_secs),
        )?)),
        None => {
            println!(
                "{}",
                "GITHUB_TOKEN not set; live code search is disabled".yellow()
            );
            None
        }
    };

    Ok(RepositoryResolver::new(
        Arc::new(NodeRegistry::new(source)),
        search,
        ResolverSettings::from_config(settings),
    ))
}

fn install_plan(config: &NodeScoutConfig, plan: &InstallPlan) -> Result<()> {
    if plan.is_empty() {
        println!("{}", "Nothing to install".green());
        return Ok(());
    }
    let custom_nodes = config
        .custom_nodes_path()
        .context("Installing requires an installation root")?;
    if !custom_nodes.is_dir() {
        bail!("{} does not exist", custom_nodes.display());
    }

    println!();
    println!("{}", "Installing".cyan().bold());
    let items = plan.install_items(&custom_nodes);
    let outcomes = GitInstaller::new().install(&items);
    for outcome in &outcomes {
        match &outcome.result {
            Ok(()) => println!("  {} {}", "cloned".green(), outcome.destination.display()),
            Err(e) => println!("  {} {}", "failed".red(), e),
        }
    }
    let installed = outcomes.iter().filter(|o| o.succeeded()).count();
    if installed > 0 {
        println!(
            "{} {} package(s) installed; the next census will pick them up",
            "Done:".green().bold(),
            installed
        );
    }
    Ok(())
}

fn handle_cache_clear(config: &NodeScoutConfig) -> Result<()> {
    let root = installation_root(config)?;
    let cache = NodeCensus::new(config).cache_for(&root);
    cache.clear().context("Failed to clear the census cache")?;
    println!("{} {}", "Cleared:".green(), cache.dir().display());
    Ok(())
}

fn handle_cache_info(config: &NodeScoutConfig) -> Result<()> {
    let root = installation_root(config)?;
    let census = NodeCensus::new(config);
    let cache = census.cache_for(&root);
    println!("Cache directory: {}", cache.dir().display());
    if !cache.exists() {
        println!("{}", "No census cached".yellow());
        return Ok(());
    }
    if let Some(meta) = cache.metadata() {
        println!(
            "Scanned {}: {} builtin, {} custom nodes from {} packages",
            meta.scanned_at.to_rfc3339(),
            meta.builtin_count,
            meta.custom_count,
            meta.total_repos
        );
    }
    let current = CensusCache::fingerprint(&census.custom_nodes_path(&root));
    let fresh = current.is_some() && current == cache.stored_fingerprint();
    println!(
        "Status: {}",
        if fresh { "current".green() } else { "stale".yellow() }
    );
    Ok(())
}

fn handle_config_init(path: Option<PathBuf>, force: bool) -> Result<()> {
    let path = match path {
        Some(path) => path,
        None => dirs_config_path()?,
    };
    if path.exists() && !force {
        bail!("{} already exists; pass --force to overwrite", path.display());
    }
    ConfigManager::create_default_config(&path)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    println!(
        "{} {}",
        "Configuration initialized successfully!".green().bold(),
        path.display()
    );
    Ok(())
}

fn dirs_config_path() -> Result<PathBuf> {
    nodescout_core::default_config_path().context("Cannot locate the home directory")
}

fn handle_config_show(manager: &ConfigManager) -> Result<()> {
    match manager.config_path() {
        Some(path) => println!("# loaded from {}", path.display()),
        None => println!("# defaults (no config file found)"),
    }
    println!("{}", redacted_config(manager.config())?);
    Ok(())
}

fn redacted_config(config: &NodeScoutConfig) -> Result<String> {
    let mut value = serde_json::to_value(config)?;
    if let Some(resolver) = value.get_mut("resolver").and_then(|v| v.as_object_mut()) {
        resolver.insert(
            "github_token".to_string(),
            serde_json::Value::String(
                if config.resolver.github_token.is_some() {
                    "(set)"
                } else {
                    "(unset)"
                }
                .to_string(),
            ),
        );
    }
    Ok(serde_json::to_string_pretty(&value)?)
}
