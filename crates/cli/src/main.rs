use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::ArgAction;
use clap::{Args, Parser, Subcommand, ValueEnum};
use modsweep_core::{
    format_size, render_clean_markdown, render_markdown_summary, resolve_config, run_clean,
    run_scan, status_label, CleanOptions, CleanOutcome, CleanSummary, ScanOptions, ScanReport,
    SweepConfig, TargetOrder,
};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "modsweep",
    version,
    about = "Find node_modules directories under a root, measure them, and delete the ones you pick."
)]
struct Cli {
    /// JSON config file. Falls back to $MODSWEEP_CONFIG, then built-in defaults.
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Discover target directories under a root.
    Scan(ScanArgs),
    /// Delete target directories, reporting one outcome per path.
    Clean(CleanArgs),
    /// Print the effective configuration as JSON.
    Config,
}

#[derive(Debug, Copy, Clone, ValueEnum)]
enum CliOrder {
    Traversal,
    #[value(alias = "size-desc")]
    Size,
}

impl From<CliOrder> for TargetOrder {
    fn from(value: CliOrder) -> Self {
        match value {
            CliOrder::Traversal => TargetOrder::Traversal,
            CliOrder::Size => TargetOrder::SizeDesc,
        }
    }
}

#[derive(Debug, Args)]
struct ScanArgs {
    /// Root directory to scan.
    #[arg(value_name = "ROOT", default_value = ".")]
    root: PathBuf,

    /// Measure each target. Can be slow on large trees.
    #[arg(long)]
    sizes: bool,

    /// Directory name to look for (repeatable). Replaces the configured names.
    #[arg(long = "target-name", value_name = "NAME", action = ArgAction::Append)]
    target_names: Vec<String>,

    /// Exclude glob patterns or path substrings (repeatable).
    #[arg(long = "exclude", value_name = "GLOB", num_args = 1.., action = ArgAction::Append)]
    exclude: Vec<String>,

    /// Maximum traversal depth (root is depth 0).
    #[arg(long)]
    max_depth: Option<usize>,

    /// Do not descend into hidden directories.
    #[arg(long)]
    skip_hidden: bool,

    /// Parallel size workers (0 = one per CPU).
    #[arg(long, value_name = "N")]
    workers: Option<usize>,

    /// Output order.
    #[arg(long, default_value = "traversal")]
    sort: CliOrder,

    /// Hide measured targets that hold no bytes.
    #[arg(long)]
    omit_empty: bool,

    /// Write the JSON report here.
    #[arg(long, value_name = "FILE")]
    json: Option<PathBuf>,

    /// Write a Markdown summary here.
    #[arg(long, value_name = "FILE")]
    md: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct CleanArgs {
    /// Directories to delete.
    #[arg(value_name = "PATH")]
    paths: Vec<PathBuf>,

    /// Delete every target listed in a saved scan report.
    #[arg(long, value_name = "FILE")]
    from_report: Option<PathBuf>,

    /// Only delete paths under this directory (repeatable).
    #[arg(long = "allow-root", value_name = "DIR", action = ArgAction::Append)]
    allow_roots: Vec<PathBuf>,

    /// Allow deleting directories whose name is not a target name.
    #[arg(long)]
    any_name: bool,

    /// Parallel delete workers (0 = one per CPU).
    #[arg(long, value_name = "N")]
    workers: Option<usize>,

    /// Measure each directory before deleting it.
    #[arg(long)]
    measure: bool,

    /// Write the JSON outcomes here.
    #[arg(long, value_name = "FILE")]
    json: Option<PathBuf>,

    /// Write a Markdown summary here.
    #[arg(long, value_name = "FILE")]
    md: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct CleanOutput<'a> {
    outcomes: &'a [CleanOutcome],
    summary: &'a CleanSummary,
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = resolve_config(cli.config.as_deref())?;
    tracing::debug!("effective config: {:?}", config);

    match cli.command {
        Commands::Scan(args) => run_scan_command(args, config),
        Commands::Clean(args) => run_clean_command(args, config),
        Commands::Config => {
            let payload =
                serde_json::to_string_pretty(&config).context("failed to serialize config")?;
            println!("{payload}");
            Ok(())
        }
    }
}

fn run_scan_command(args: ScanArgs, mut config: SweepConfig) -> Result<()> {
    let ScanArgs {
        root,
        sizes,
        target_names,
        exclude,
        max_depth,
        skip_hidden,
        workers,
        sort,
        omit_empty,
        json,
        md,
    } = args;

    if !target_names.is_empty() {
        config.target_names = target_names;
    }
    config.excludes.extend(exclude);
    if max_depth.is_some() {
        config.max_depth = max_depth;
    }
    config.skip_hidden |= skip_hidden;
    if let Some(workers) = workers {
        config.size_workers = workers;
    }

    let options = ScanOptions {
        root,
        compute_sizes: sizes,
        config,
        order: sort.into(),
        omit_empty,
        ..ScanOptions::default()
    };

    let report = run_scan(&options)?;
    print_scan_report(&report);

    if let Some(path) = json {
        write_json(&path, &report)?;
        println!("Report written to {}", path.display());
    }
    if let Some(path) = md {
        fs::write(&path, render_markdown_summary(&report))
            .with_context(|| format!("failed to write markdown summary to {}", path.display()))?;
        println!("Markdown summary written to {}", path.display());
    }

    Ok(())
}

fn print_scan_report(report: &ScanReport) {
    if report.targets.is_empty() {
        println!("No target directories under {}", report.root);
    }
    for target in &report.targets {
        match &target.size {
            Some(size) => println!(
                "{:>12}{}  {}  {}",
                size,
                if target.size_partial { "*" } else { " " },
                target.display_name,
                target.path
            ),
            None => println!("{}  {}", target.display_name, target.path),
        }
    }
    if let Some(total) = &report.total_size {
        println!("Total: {} in {} target(s)", total, report.targets.len());
    }
    println!(
        "Visited {} director(ies) in {} ms, {} warning(s).",
        report.metrics.directories_visited,
        report.metrics.elapsed_ms,
        report.warnings.len()
    );
    if !report.complete {
        println!("Report is incomplete; see warnings.");
    }
}

fn run_clean_command(args: CleanArgs, mut config: SweepConfig) -> Result<()> {
    let cwd = std::env::current_dir().context("failed to resolve current directory")?;
    let mut paths: Vec<PathBuf> = args
        .paths
        .iter()
        .map(|path| cwd.join(path).components().collect::<PathBuf>())
        .collect();
    if let Some(report_path) = &args.from_report {
        let report = load_report(report_path)?;
        paths.extend(report.targets.into_iter().map(|target| PathBuf::from(target.path)));
    }
    if paths.is_empty() {
        anyhow::bail!("no paths to clean; pass PATH arguments or --from-report");
    }

    config.allowed_roots.extend(
        args.allow_roots
            .iter()
            .map(|root| cwd.join(root).components().collect::<PathBuf>()),
    );
    if args.any_name {
        config.require_target_name = false;
    }
    if let Some(workers) = args.workers {
        config.clean_workers = workers;
    }

    let options = CleanOptions {
        paths,
        config,
        measure_freed: args.measure,
        ..CleanOptions::default()
    };
    let outcomes = run_clean(&options);
    let summary = CleanSummary::from_outcomes(&outcomes);

    for outcome in &outcomes {
        match &outcome.detail {
            Some(detail) => println!(
                "- [{}] {}: {}",
                status_label(outcome.status),
                outcome.path,
                detail
            ),
            None => println!(
                "- [{}] {}",
                status_label(outcome.status),
                outcome.path
            ),
        }
    }
    println!(
        "Deleted {}/{} | not found {} | permission denied {} | other failures {}",
        summary.deleted,
        summary.requested,
        summary.not_found,
        summary.permission_denied,
        summary.other_failure
    );
    if args.measure {
        println!("Freed {}", format_size(summary.bytes_freed));
    }

    if let Some(path) = &args.json {
        write_json(
            path,
            &CleanOutput {
                outcomes: &outcomes,
                summary: &summary,
            },
        )?;
        println!("Outcomes written to {}", path.display());
    }
    if let Some(path) = &args.md {
        fs::write(path, render_clean_markdown(&outcomes))
            .with_context(|| format!("failed to write markdown summary to {}", path.display()))?;
        println!("Markdown summary written to {}", path.display());
    }

    if summary.has_failures() {
        anyhow::bail!(
            "{} path(s) could not be deleted",
            summary.permission_denied + summary.other_failure
        );
    }
    Ok(())
}

fn load_report(path: &Path) -> Result<ScanReport> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&data).with_context(|| format!("failed to parse {}", path.display()))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let payload = serde_json::to_string_pretty(value).context("failed to serialize output")?;
    fs::write(path, payload).with_context(|| format!("failed to write {}", path.display()))
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
