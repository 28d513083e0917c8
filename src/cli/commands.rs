use crate::core::context_generator::{format_document, summarize};
use crate::core::export::ExportPipeline;
use crate::core::extract::ExtractorRegistry;
use crate::core::file_selector::run_tui;
use crate::core::ignore::IgnoreRules;
use crate::core::selection::Session;
use crate::core::tree::Tree;
use crate::core::walker::{extension_counts, walk_all};
use crate::domain::models::{
    ContextConfig, ContextDocument, IgnoreConfig, ListingEntry, RunMode, SortOrder,
};
use crate::infra::file_system::{DiskReader, list_directory, load_ignore_patterns};
use crate::infra::logger::setup_logger;
use crate::infra::output::{
    print_export_summary, print_extension_counts, resolve_output_path, write_output,
};
use anyhow::{Context, bail};
use chrono::Local;
use clap::{Args, Parser, Subcommand, ValueEnum};
use log::{debug, info};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "getcontext", version)]
#[command(
    about = "Pick files and documents from a directory and flatten them into one context file",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Browse the directory tree and choose what to export
    Select {
        #[arg(default_value = ".")]
        path: PathBuf,

        #[command(flatten)]
        options: SharedOptions,
    },
    /// Export every processable file under PATH without prompting
    Auto {
        path: PathBuf,

        #[command(flatten)]
        options: SharedOptions,
    },
}

#[derive(Args, Debug, Clone)]
pub struct SharedOptions {
    /// Comma-separated file and directory names to leave out
    #[arg(
        long,
        default_value = "__pycache__,node_modules,.git,.venv,venv,env,build,dist,.pytest_cache,.mypy_cache,target,bin,obj,out"
    )]
    pub exclude: String,

    /// Include dot-files and dot-directories
    #[arg(long)]
    pub hidden: bool,

    #[arg(long, value_enum, default_value_t = SortArg::Name)]
    pub sort: SortArg,

    /// Write the context here instead of `<dir>_context_<timestamp>.txt`
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Also copy the context to the clipboard
    #[arg(long)]
    pub clipboard: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SortArg {
    Name,
    DirsFirst,
}

impl From<SortArg> for SortOrder {
    fn from(arg: SortArg) -> Self {
        match arg {
            SortArg::Name => SortOrder::Name,
            SortArg::DirsFirst => SortOrder::DirectoriesFirst,
        }
    }
}

pub fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logger(cli.verbose)?;

    let config = match cli.command {
        Commands::Select { path, options } => build_config(RunMode::Interactive, &path, &options)?,
        Commands::Auto { path, options } => build_config(RunMode::Automatic, &path, &options)?,
    };
    debug!("Configuration: {:?}", config);

    match config.mode {
        RunMode::Interactive => run_interactive(&config),
        RunMode::Automatic => run_automatic(&config),
    }
}

fn build_config(
    mode: RunMode,
    path: &Path,
    options: &SharedOptions,
) -> anyhow::Result<ContextConfig> {
    if !path.is_dir() {
        bail!("Invalid path or not a directory: {}", path.display());
    }
    let root_path = path
        .canonicalize()
        .with_context(|| format!("Failed to resolve {}", path.display()))?;

    let names = options
        .exclude
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();
    let patterns = load_ignore_patterns(&root_path)?;

    Ok(ContextConfig {
        root_path,
        mode,
        ignore: IgnoreConfig {
            names,
            include_hidden: options.hidden,
            patterns,
        },
        sort: options.sort.into(),
        output_path: options.output.clone(),
        clipboard: options.clipboard,
    })
}

fn load_listing(config: &ContextConfig) -> anyhow::Result<(ListingEntry, IgnoreRules)> {
    let rules = IgnoreRules::new(&config.ignore);
    let listing = list_directory(&config.root_path, &rules)?;
    Ok((listing, rules))
}

/// Exports the selection of `tree` and writes it out. Nothing is written
/// when the export fails as a whole.
fn export_and_write(
    tree: &Tree,
    pipeline: &ExportPipeline<'_>,
    config: &ContextConfig,
) -> anyhow::Result<(ContextDocument, PathBuf)> {
    let doc = pipeline.export(tree)?;

    let path = resolve_output_path(config.output_path.as_deref(), &doc.root_name, Local::now());
    write_output(&format_document(&doc), &path, config.clipboard)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok((doc, path))
}

fn run_interactive(config: &ContextConfig) -> anyhow::Result<()> {
    info!("Scanning {}", config.root_path.display());
    let (listing, rules) = load_listing(config)?;
    let tree = Tree::build(&config.root_path, listing, rules, config.sort);
    let registry = ExtractorRegistry::with_defaults();
    let pipeline = ExportPipeline::new(&registry, &DiskReader);

    let mut last_export: Option<(ContextDocument, PathBuf)> = None;
    run_tui(Session::new(tree), &pipeline, |tree| {
        let (doc, path) = export_and_write(tree, &pipeline, config)?;
        let message = format!("{} to {}", summarize(&doc), path.display());
        last_export = Some((doc, path));
        Ok(message)
    })?;

    match last_export {
        Some((doc, path)) => print_export_summary(&doc, &path)?,
        None => info!("Closed without exporting"),
    }
    Ok(())
}

fn run_automatic(config: &ContextConfig) -> anyhow::Result<()> {
    info!("Walking {}", config.root_path.display());
    let (listing, rules) = load_listing(config)?;
    let tree = walk_all(&config.root_path, listing, rules, config.sort);

    print_extension_counts(&extension_counts(&tree))?;

    let registry = ExtractorRegistry::with_defaults();
    let pipeline = ExportPipeline::new(&registry, &DiskReader);
    let (doc, path) = export_and_write(&tree, &pipeline, config)?;
    print_export_summary(&doc, &path)?;
    Ok(())
}
