//! # Ferry CLI
//!
//! Command-line definition and the main entry point.

use super::modes;
use crate::attachment::RawRoute;
use crate::config::load_config;
use crate::output::CollisionPolicy;
use crate::utils::logging::init_logging;
use anyhow::{Context, Result, bail};
use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::{Path, PathBuf};

/// Ferry: route local attachments to prompt destinations and retrieve
/// sandbox artifacts.
#[derive(Parser, Debug, Clone)]
#[command(
    author,
    version,
    about,
    long_about = "ferry has two subcommands:

1. plan: parse, resolve and route attachments, then print the plan as JSON.
   Example: ferry plan --file data=./in.csv --dir ci:src ./src --recursive --ext py

2. fetch: download the artifacts listed in a manifest.
   Example: ferry fetch artifacts.json --output-dir ./out --on-collision rename"
)]
pub struct Cli {
    /// Path to a ferry.toml configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Log to stderr instead of file
    #[arg(long, global = true)]
    pub log_to_stderr: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Resolve and route attachments, print the plan as JSON
    Plan(PlanArgs),
    /// Download sandbox artifacts listed in a JSON manifest
    Fetch(FetchArgs),
}

#[derive(Args, Debug, Clone, Default)]
pub struct PlanArgs {
    /// Attach a file: EXPR, or ALIAS PATH (repeatable)
    #[arg(
        long = "file",
        num_args = 1..=2,
        action = ArgAction::Append,
        value_names = ["EXPR", "PATH"]
    )]
    pub files: Vec<Vec<String>>,

    /// Attach a directory: EXPR, or ALIAS PATH (repeatable)
    #[arg(
        long = "dir",
        num_args = 1..=2,
        action = ArgAction::Append,
        value_names = ["EXPR", "PATH"]
    )]
    pub dirs: Vec<Vec<String>>,

    /// Attach a collection (glob pattern or @list-file): EXPR, or ALIAS SOURCE (repeatable)
    #[arg(
        long = "collect",
        num_args = 1..=2,
        action = ArgAction::Append,
        value_names = ["EXPR", "SOURCE"]
    )]
    pub collections: Vec<Vec<String>>,

    /// Walk --dir routes recursively
    #[arg(long)]
    pub recursive: bool,

    /// Extension allow-list for --dir and --collect routes
    #[arg(long = "ext", value_delimiter = ',')]
    pub extensions: Vec<String>,

    /// Directory attachments may come from (repeatable; default: current directory)
    #[arg(long = "allowed-root")]
    pub allowed_roots: Vec<PathBuf>,

    /// File listing allowed roots, one per line
    #[arg(long)]
    pub allowed_roots_file: Option<PathBuf>,

    /// Fail when any destination limit is exceeded instead of reducing routing
    #[arg(long)]
    pub strict_limits: bool,
}

#[derive(Args, Debug, Clone)]
pub struct FetchArgs {
    /// JSON manifest: {"sessions": [...], "artifacts": [...]}
    #[arg(value_name = "MANIFEST")]
    pub manifest: PathBuf,

    /// Directory downloaded artifacts are written to
    #[arg(long, default_value = ".")]
    pub output_dir: PathBuf,

    /// What to do when an output file already exists
    #[arg(long, value_enum, default_value_t = CollisionPolicy::Rename)]
    pub on_collision: CollisionPolicy,
}

impl PlanArgs {
    /// Raw routes in command-line group order: files, directories, collections.
    pub fn routes(&self) -> Vec<RawRoute> {
        let files = self.files.iter().map(|tokens| RawRoute::file(tokens.clone()));
        let dirs = self.dirs.iter().map(|tokens| {
            RawRoute::dir(tokens.clone())
                .recursive(self.recursive)
                .extensions(self.extensions.clone())
        });
        let collections = self.collections.iter().map(|tokens| {
            RawRoute::collection(tokens.clone()).extensions(self.extensions.clone())
        });
        files.chain(dirs).chain(collections).collect()
    }

    /// Merge `--allowed-root`, `--allowed-roots-file` and the default.
    pub fn allowed_roots(&self) -> Result<Vec<PathBuf>> {
        let mut roots = self.allowed_roots.clone();
        if let Some(file) = &self.allowed_roots_file {
            roots.extend(read_roots_file(file)?);
        }
        if roots.is_empty() {
            let cwd = std::env::current_dir()
                .context("Failed to get current working directory for allowed roots")?;
            roots.push(cwd);
        }
        Ok(roots)
    }

    pub fn strict_limits(&self) -> bool {
        self.strict_limits || env_flag_enabled("FERRY_STRICT_LIMITS")
    }
}

/// One root per line; blank lines and `#` comments are ignored. Relative
/// entries resolve against the file's directory.
pub fn read_roots_file(path: &Path) -> Result<Vec<PathBuf>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read allowed roots file {}", path.display()))?;
    let base = path.parent().unwrap_or(Path::new("."));
    Ok(contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| base.join(line))
        .collect())
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.debug { "debug" } else { "info" };
    init_logging(log_level, !cli.log_to_stderr)?;

    let config = load_config(cli.config.as_deref())
        .await
        .context("Failed to load configuration")?;

    match &cli.command {
        Command::Plan(args) => {
            if args.files.is_empty() && args.dirs.is_empty() && args.collections.is_empty() {
                bail!("Nothing to plan: give at least one --file, --dir or --collect route");
            }
            tracing::info!("Running in plan mode");
            modes::run_plan_mode(args, &config).await
        }
        Command::Fetch(args) => {
            tracing::info!("Running in fetch mode");
            modes::run_fetch_mode(args, &config).await
        }
    }
}

fn env_flag_enabled(name: &str) -> bool {
    std::env::var(name)
        .map(|value| {
            matches!(
                value.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            )
        })
        .unwrap_or(false)
}
