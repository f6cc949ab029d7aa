//! classmetrics CLI - ingest analyzed JVM classes into a four-level metrics database

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use classmetrics_core::catalog::ScopeKind;
use classmetrics_core::config::{self, ResolvedConfig};
use classmetrics_core::store::{
    InMemoryMetricStore, MetricStore, SqliteMetricStore, SqliteStoreConfig,
};
use classmetrics_core::{input, report, RunSummary};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "classmetrics")]
#[command(about = "Roll per-class and per-method metrics up to file and package scope")]
#[command(version)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Aggregate analyzed-class records into the metrics database
    Ingest {
        /// JSON array or JSON Lines file of analyzed classes
        input: PathBuf,

        /// Output database (overrides config `database`)
        #[arg(long)]
        db: Option<PathBuf>,

        /// Path to config file (default: auto-discover from current directory)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Aggregate in memory without touching the database
        #[arg(long)]
        dry_run: bool,

        /// Summary format
        #[arg(long, default_value = "text")]
        format: OutputFormat,
    },
    /// Print stored rows for one scope
    Report {
        /// Metrics database to read
        #[arg(long)]
        db: PathBuf,

        #[arg(long, default_value = "package")]
        scope: ScopeArg,

        #[arg(long, default_value = "text")]
        format: OutputFormat,
    },
    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Validate a config file without ingesting
    Validate {
        /// Path to config file (default: auto-discover from current directory)
        #[arg(long)]
        path: Option<PathBuf>,
    },
    /// Show the resolved configuration (merged defaults + config file)
    Show {
        /// Path to config file (default: auto-discover from current directory)
        #[arg(long)]
        path: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum ScopeArg {
    Package,
    File,
    Class,
    Method,
}

impl From<ScopeArg> for ScopeKind {
    fn from(scope: ScopeArg) -> Self {
        match scope {
            ScopeArg::Package => ScopeKind::Package,
            ScopeArg::File => ScopeKind::File,
            ScopeArg::Class => ScopeKind::Class,
            ScopeArg::Method => ScopeKind::Method,
        }
    }
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Ingest {
            input: input_path,
            db,
            config: config_path,
            dry_run,
            format,
        } => {
            let working_dir = std::env::current_dir()?;
            let mut resolved = config::load_and_resolve(&working_dir, config_path.as_deref())
                .context("failed to load configuration")?;
            if let Some(ref path) = resolved.config_path {
                info!("using config: {}", path.display());
            }
            if let Some(db) = db {
                resolved.database = db;
            }

            let classes = input::load_classes(&input_path)?;
            info!(
                "loaded {} class record(s) from {}",
                classes.len(),
                input_path.display()
            );

            let summary = if dry_run {
                let mut store = InMemoryMetricStore::new();
                run_ingest(&classes, &mut store, &resolved)?
            } else {
                if resolved.overwrite {
                    remove_database(&resolved.database)?;
                }
                let mut store = SqliteMetricStore::open(&resolved.sqlite_config())
                    .with_context(|| format!("failed to open {}", resolved.database.display()))?;
                run_ingest(&classes, &mut store, &resolved)?
            };

            match format {
                OutputFormat::Text => print!("{}", report::render_summary_text(&summary)),
                OutputFormat::Json => println!("{}", report::render_summary_json(&summary)?),
            }
        }
        Commands::Report { db, scope, format } => {
            if !db.exists() {
                anyhow::bail!("database not found: {}", db.display());
            }
            // No journal mode: reading must leave the database as written
            let store = SqliteMetricStore::open(&SqliteStoreConfig::new(&db))
                .with_context(|| format!("failed to open {}", db.display()))?;
            let rows = store.rows(scope.into())?;

            match format {
                OutputFormat::Text => print!("{}", report::render_rows_text(&rows)),
                OutputFormat::Json => println!("{}", report::render_rows_json(&rows)?),
            }
        }
        Commands::Config { action } => match action {
            ConfigAction::Validate { path } => {
                let working_dir = std::env::current_dir()?;
                match config::load_and_resolve(&working_dir, path.as_deref()) {
                    Ok(resolved) => {
                        if let Some(ref p) = resolved.config_path {
                            println!("Config valid: {}", p.display());
                        } else {
                            println!("No config file found. Using defaults.");
                        }
                    }
                    Err(e) => {
                        eprintln!("Config validation failed: {:#}", e);
                        std::process::exit(1);
                    }
                }
            }
            ConfigAction::Show { path } => {
                let working_dir = std::env::current_dir()?;
                let resolved = config::load_and_resolve(&working_dir, path.as_deref())
                    .context("failed to load configuration")?;
                print_config(&resolved);
            }
        },
    }

    Ok(())
}

/// Schema setup plus aggregation against any store
fn run_ingest<S: MetricStore>(
    classes: &[classmetrics_core::AnalyzedClass],
    store: &mut S,
    resolved: &ResolvedConfig,
) -> Result<RunSummary> {
    store.init_schema().context("failed to create metric tables")?;
    let summary = classmetrics_core::ingest(classes, store, Some(resolved))?;
    if summary.duplicate_rows > 0 {
        warn!(
            "{} class/method row(s) were already present and kept their first value",
            summary.duplicate_rows
        );
    }
    Ok(summary)
}

/// Delete a database and its SQLite side files so the run starts fresh
fn remove_database(path: &Path) -> Result<()> {
    let mut targets = vec![path.to_path_buf()];
    for suffix in ["-wal", "-shm", "-journal"] {
        let mut side = path.as_os_str().to_owned();
        side.push(suffix);
        targets.push(PathBuf::from(side));
    }
    for target in targets {
        if target.exists() {
            std::fs::remove_file(&target)
                .with_context(|| format!("failed to remove {}", target.display()))?;
            info!("removed {}", target.display());
        }
    }
    Ok(())
}

fn print_config(resolved: &ResolvedConfig) {
    println!("Configuration:");
    if let Some(ref p) = resolved.config_path {
        println!("  Source: {}", p.display());
    } else {
        println!("  Source: defaults (no config file found)");
    }
    println!();
    println!("Database:");
    println!("  path: {}", resolved.database.display());
    println!("  overwrite: {}", resolved.overwrite);
    println!("  busy_timeout_ms: {}", resolved.busy_timeout_ms);
    println!("  journal_mode: {}", resolved.journal_mode.pragma_value());
    println!();
    println!("Filters:");
    println!(
        "  include: {}",
        if resolved.include.is_some() {
            "custom"
        } else {
            "all"
        }
    );
    println!("  exclude patterns: {}", resolved.exclude.len());
}
