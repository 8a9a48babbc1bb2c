//! Command line surface.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use crate::app::batch::{BatchOptions, read_rows, run_batch};
use crate::app::boundary::ScopeResolver;
use crate::app::context::ContextMode;
use crate::app::extract::{ExtractOptions, extract_scoped};
use crate::app::filter::FileFilter;
use crate::app::job::JobSettings;
use crate::domain::model::ChangedLines;
use crate::infra::config::Config;
use crate::infra::outline::OutlineOracle;
use crate::infra::patch::parse_patch;

/// unitminer: extract minimal code units from vulnerability-fix commits
#[derive(Parser, Debug)]
#[command(name = "unitminer", version)]
#[command(about = "Extract minimal code units touched by vulnerability-fix commits", long_about = None)]
pub struct Cli {
    /// Increase log verbosity (-v debug, -vv trace); RUST_LOG takes precedence
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Mine code units for every commit row of a JSON Lines file
    Mine(MineArgs),
    /// Resolve the unit of changed lines in a local file
    Unit(UnitArgs),
    /// Print the removed and added line numbers of a patch
    PatchLines {
        /// Unified diff to inspect
        patch: PathBuf,
    },
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(clap::Args, Debug)]
pub struct MineArgs {
    /// JSON Lines file with one commit row per line
    #[arg(long)]
    pub input: PathBuf,

    /// Directory holding repository clones
    #[arg(long)]
    pub repos_dir: Option<PathBuf>,

    /// Directory receiving code_units/, context/ and summary.json
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Worker threads (0 picks one per core)
    #[arg(long)]
    pub jobs: Option<usize>,

    /// Skip commits that already have output
    #[arg(long)]
    pub resume: bool,

    /// Stop at the first failed commit
    #[arg(long)]
    pub fail_fast: bool,

    /// Also collect cross-file context
    #[arg(long)]
    pub context: bool,

    /// How context resolution failures are handled
    #[arg(long, value_enum)]
    pub context_mode: Option<ContextMode>,
}

#[derive(clap::Args, Debug)]
pub struct UnitArgs {
    /// Python source file
    pub file: PathBuf,

    /// Changed lines, e.g. `3,7-9`
    #[arg(long, value_parser = parse_line_set)]
    pub lines: ChangedLines,

    /// Project root used for module names and imports (defaults to the current directory)
    #[arg(long)]
    pub project: Option<PathBuf>,

    /// Also print referenced definitions
    #[arg(long)]
    pub context: bool,

    /// How context resolution failures are handled
    #[arg(long, value_enum)]
    pub context_mode: Option<ContextMode>,

    /// Keep comments in the printed unit
    #[arg(long)]
    pub keep_comments: bool,
}

impl Cli {
    /// Parse CLI arguments from the environment
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }
}

/// Parse `3,7-9` into a line set.
pub fn parse_line_set(value: &str) -> Result<ChangedLines, String> {
    let mut lines = ChangedLines::new();
    for part in value.split(',').map(str::trim).filter(|part| !part.is_empty()) {
        let number = |text: &str| -> Result<usize, String> {
            match text.trim().parse::<usize>() {
                Ok(0) => Err("line numbers start at 1".to_string()),
                Ok(line) => Ok(line),
                Err(_) => Err(format!("invalid line number '{text}'")),
            }
        };
        match part.split_once('-') {
            Some((start, end)) => {
                let (start, end) = (number(start)?, number(end)?);
                if start > end {
                    return Err(format!("empty range '{part}'"));
                }
                lines.extend(start..=end);
            }
            None => {
                lines.insert(number(part)?);
            }
        }
    }
    if lines.is_empty() {
        return Err("no lines given".to_string());
    }
    Ok(lines)
}

/// Execute `command`, writing results to `out`.
pub fn run(command: Command, out: &mut impl Write) -> Result<()> {
    match command {
        Command::Mine(args) => mine(args, out),
        Command::Unit(args) => unit(args, out),
        Command::PatchLines { patch } => patch_lines(&patch, out),
        Command::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "unitminer", out);
            Ok(())
        }
    }
}

fn mine(args: MineArgs, out: &mut impl Write) -> Result<()> {
    let mut config = Config::load()?;
    if let Some(dir) = args.repos_dir {
        config.paths.set_repos_dir(dir);
    }
    if let Some(dir) = args.output_dir {
        config.paths.set_output_dir(dir);
    }
    if let Some(jobs) = args.jobs {
        config.batch.jobs = jobs;
    }
    config.batch.resume |= args.resume;
    config.batch.fail_fast |= args.fail_fast;
    if args.context {
        config.context.set_enabled(true);
    }
    if let Some(mode) = args.context_mode {
        config.context.set_mode(mode);
    }

    let filter = FileFilter::from_config(&config)?;
    let settings = JobSettings {
        repos_dir: config.paths.repos_dir(),
        output_dir: config.paths.output_dir(),
        extract: ExtractOptions {
            strip_comments: config.normalize.strip_comments(),
            context: config.context.enabled().then(|| config.context.mode()),
        },
        resume: config.batch.resume,
    };
    let options = BatchOptions {
        jobs: config.batch.jobs,
        fail_fast: config.batch.fail_fast,
    };

    let rows = read_rows(&args.input)?;
    let summary = run_batch(rows, &filter, &settings, options)?;
    writeln!(out, "{}", serde_json::to_string_pretty(&summary)?)?;
    Ok(())
}

fn unit(args: UnitArgs, out: &mut impl Write) -> Result<()> {
    let root = match &args.project {
        Some(project) => project.clone(),
        None => std::env::current_dir()?,
    };
    let root = fs::canonicalize(&root)
        .with_context(|| format!("project root not found: {}", root.display()))?;
    let file = fs::canonicalize(&args.file)
        .with_context(|| format!("file not found: {}", args.file.display()))?;
    let Ok(relative) = file.strip_prefix(&root) else {
        bail!("{} is outside the project {}", file.display(), root.display());
    };
    let relative = relative.to_string_lossy().into_owned();

    let options = ExtractOptions {
        strip_comments: !args.keep_comments,
        context: (args.context || args.context_mode.is_some())
            .then(|| args.context_mode.unwrap_or_default()),
    };
    let mut resolver = ScopeResolver::new(OutlineOracle::new(&root));
    let extraction = extract_scoped(&mut resolver, &root, &relative, &args.lines, &options)
        .with_context(|| format!("failed to resolve {relative}"))?;

    if extraction.context.is_empty() {
        writeln!(out, "{}", extraction.text)?;
        return Ok(());
    }
    writeln!(out, "== {relative} ==\n{}", extraction.text)?;
    for (path, text) in &extraction.context {
        writeln!(out, "\n== {path} ==\n{text}")?;
    }
    Ok(())
}

fn patch_lines(path: &Path, out: &mut impl Write) -> Result<()> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read patch: {}", path.display()))?;
    let files = parse_patch(&text).with_context(|| format!("invalid patch: {}", path.display()))?;
    for file in files {
        let old = file.old_path.as_deref().unwrap_or("/dev/null");
        let new = file.new_path.as_deref().unwrap_or("/dev/null");
        writeln!(out, "{old} -> {new}")?;
        writeln!(out, "  removed: {}", join_lines(&file.removed))?;
        writeln!(out, "  added: {}", join_lines(&file.added))?;
    }
    Ok(())
}

fn join_lines(lines: &ChangedLines) -> String {
    lines
        .iter()
        .map(usize::to_string)
        .collect::<Vec<_>>()
        .join(",")
}
