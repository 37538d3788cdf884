//! cadmigrate CLI - upgrade libraries, projects and workspace data from the command line.

use cadmigrate::migration::registered_steps;
use cadmigrate::{
    CommitPolicy, FileSetKind, MigrationCore, UpgradeError, UpgradeOptions, UpgradeReport,
    UpgradeStatus,
};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::error::Error;
use std::path::{Path, PathBuf};
use std::process;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "cadmigrate")]
#[command(about = "File format upgrade tool for EDA libraries and projects", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show kind and file format version of a directory
    Detect {
        /// Library, project or workspace data directory
        #[arg(value_name = "DIR")]
        dir: PathBuf,

        /// Output format
        #[arg(short, long, value_enum, default_value = "human")]
        format: OutputFormat,
    },

    /// Upgrade a directory to the latest file format
    Upgrade {
        /// Library, project or workspace data directory
        #[arg(value_name = "DIR")]
        dir: PathBuf,

        /// Kind of file set (detected from the version marker if omitted)
        #[arg(short, long, value_enum)]
        kind: Option<KindArg>,

        /// Run all steps without writing anything
        #[arg(long)]
        dry_run: bool,

        /// Commit each library element on its own instead of all at once
        #[arg(long)]
        per_element: bool,

        /// Preferred locale for element names, may be repeated
        #[arg(short, long = "locale", value_name = "LOCALE")]
        locales: Vec<String>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "human")]
        format: OutputFormat,
    },

    /// List the registered migration steps
    Steps,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Human-readable output
    Human,
    /// JSON output for scripts
    Json,
}

#[derive(Clone, Copy, ValueEnum)]
enum KindArg {
    Library,
    Project,
    WorkspaceData,
}

impl From<KindArg> for FileSetKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Library => FileSetKind::Library,
            KindArg::Project => FileSetKind::Project,
            KindArg::WorkspaceData => FileSetKind::WorkspaceData,
        }
    }
}

fn main() {
    init_logging();
    let cli = Cli::parse();

    let exit_code = match cli.command {
        Commands::Detect { dir, format } => handle_detect(&dir, format),
        Commands::Upgrade {
            dir,
            kind,
            dry_run,
            per_element,
            locales,
            format,
        } => {
            let options = UpgradeOptions {
                commit_policy: if per_element {
                    CommitPolicy::PerElement
                } else {
                    CommitPolicy::AllOrNothing
                },
                locale_order: locales,
                dry_run,
            };
            handle_upgrade(&dir, kind.map(FileSetKind::from), &options, format)
        }
        Commands::Steps => {
            handle_steps();
            0
        }
    };

    process::exit(exit_code);
}

/// Log to stderr so stdout stays machine readable.
fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("cadmigrate=info"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}

fn handle_detect(dir: &Path, format: OutputFormat) -> i32 {
    let detected = MigrationCore::detect_kind(dir)
        .and_then(|kind| MigrationCore::detect_version(dir, kind).map(|version| (kind, version)));
    match detected {
        Ok((kind, version)) => {
            match format {
                OutputFormat::Human => {
                    println!("Directory: {}", dir.display());
                    println!("Kind:      {}", kind);
                    println!("Version:   {}", version);
                }
                OutputFormat::Json => {
                    let output = serde_json::json!({
                        "dir": dir.display().to_string(),
                        "kind": kind,
                        "version": version,
                    });
                    print_json(&output);
                }
            }
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn handle_upgrade(
    dir: &Path,
    kind: Option<FileSetKind>,
    options: &UpgradeOptions,
    format: OutputFormat,
) -> i32 {
    tracing::debug!(?options, "Starting upgrade of {}", dir.display());
    let result = kind
        .map(Ok)
        .unwrap_or_else(|| MigrationCore::detect_kind(dir))
        .and_then(|kind| MigrationCore::upgrade(dir, kind, options));

    match result {
        Ok(report) => {
            match format {
                OutputFormat::Human => output_human(&report),
                OutputFormat::Json => print_json(&report),
            }
            0
        }
        Err(e) => {
            print_error(&e);
            1
        }
    }
}

fn print_error(error: &UpgradeError) {
    eprintln!("Error: {}", error);
    let mut source = error.source();
    while let Some(cause) = source {
        eprintln!("  caused by: {}", cause);
        source = cause.source();
    }
}

fn output_human(report: &UpgradeReport) {
    println!("\n{}: {}", report.kind, report.root.display());
    println!("{}", "─".repeat(60));

    match report.status {
        UpgradeStatus::AlreadyCurrent => {
            println!("  Already at file format {}", report.to);
            return;
        }
        UpgradeStatus::DryRun => println!("  Dry run, nothing was written"),
        UpgradeStatus::Migrated => {}
    }

    println!("  File format: {} -> {}", report.from, report.to);
    println!("\n  Upgraded:");
    for element in &report.elements {
        match &element.name {
            Some(name) => println!(
                "    - {} {} \"{}\" ({} -> {})",
                element.category, element.path, name, element.from, element.to
            ),
            None => println!(
                "    - {} {} ({} -> {})",
                element.category, element.path, element.from, element.to
            ),
        }
    }

    if !report.warnings.is_empty() {
        println!("\n  Warnings:");
        for warning in &report.warnings {
            println!("    - {}", warning);
        }
    }

    println!("\n  Summary:");
    println!("    Units:    {}", report.elements.len());
    println!("    Warnings: {}", report.warnings.len());
    println!(
        "    Duration: {} ms",
        (report.finished_at - report.started_at).num_milliseconds()
    );
}

fn print_json<T: Serialize + ?Sized>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{}", text),
        Err(e) => eprintln!("Error: {}", e),
    }
}

fn handle_steps() {
    println!("Registered migration steps:\n");
    for step in registered_steps() {
        println!("  {} -> {}", step.from, step.to);
    }
}
