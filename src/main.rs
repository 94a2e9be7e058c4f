use anchor_patcher::anchor::nearest_line;
use anchor_patcher::block::{extract_block, BlockError};
use anchor_patcher::config::{
    apply_patches, check_file, load_from_path, load_inline, resolve_target, AppliedOperation,
    ApplicationError, ApplyOptions, BoundaryKind, ConfigError, OperationStatus, PatchConfig,
};
use anchor_patcher::document::SourceDocument;
use anchor_patcher::edit::content_hash;
use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use colored::Colorize;
use similar::{ChangeTag, TextDiff};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Exit code for malformed patch specs and invalid command lines
const USAGE_EXIT: u8 = 5;

#[derive(Parser)]
#[command(name = "anchor-patcher")]
#[command(about = "Idempotent anchor-based text patching", long_about = None)]
#[command(version)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug); RUST_LOG overrides
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply a patch spec to its target file
    Apply {
        /// File to patch (defaults to meta.target of the patch spec)
        target: Option<PathBuf>,

        #[command(flatten)]
        spec: SpecArgs,

        /// Dry run - show what would be changed without writing
        #[arg(short = 'n', long)]
        dry_run: bool,

        /// Show unified diff of changes
        #[arg(short, long)]
        diff: bool,
    },

    /// Report which operations are applied or pending, without writing
    Check {
        /// File to inspect (defaults to meta.target of the patch spec)
        target: Option<PathBuf>,

        #[command(flatten)]
        spec: SpecArgs,
    },

    /// Print the range and xxh3 hash of a declaration block
    Extract {
        /// File to inspect
        target: PathBuf,

        /// Text identifying the declaration line
        #[arg(long, value_name = "ANCHOR")]
        declaration: String,

        /// Text of the line that opens the next member
        #[arg(long, value_name = "MARKER")]
        next_marker: Option<String>,

        /// Boundary detection strategy
        #[arg(long, value_enum, default_value_t = StrategyArg::NextMarker)]
        strategy: StrategyArg,

        /// Also print the block text
        #[arg(long)]
        show: bool,
    },
}

#[derive(Args)]
#[group(required = true, multiple = false)]
struct SpecArgs {
    /// Patch spec file (TOML, or JSON with a .json extension)
    #[arg(short, long, value_name = "FILE")]
    patches: Option<PathBuf>,

    /// Patch spec given inline, TOML or JSON
    #[arg(long, value_name = "SPEC")]
    inline: Option<String>,
}

#[derive(Clone, Copy, ValueEnum)]
enum StrategyArg {
    NextMarker,
    BraceDepth,
}

impl From<StrategyArg> for BoundaryKind {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::NextMarker => BoundaryKind::NextMarker,
            StrategyArg::BraceDepth => BoundaryKind::BraceDepth,
        }
    }
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let code = if err.use_stderr() { USAGE_EXIT } else { 0 };
            let _ = err.print();
            return ExitCode::from(code);
        }
    };

    init_tracing(cli.verbose);

    match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{} {:#}", "error:".red().bold(), err);
            ExitCode::from(exit_code_for(&err))
        }
    }
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run(cli: Cli) -> Result<ExitCode> {
    match cli.command {
        Commands::Apply {
            target,
            spec,
            dry_run,
            diff,
        } => cmd_apply(target, &spec, dry_run, diff),

        Commands::Check { target, spec } => cmd_check(target, &spec),

        Commands::Extract {
            target,
            declaration,
            next_marker,
            strategy,
            show,
        } => cmd_extract(&target, &declaration, next_marker.as_deref(), strategy, show),
    }
}

/// Map an error that escaped a command to a stable exit code.
///
/// Untyped errors count as usage errors; `1` is reserved for `check`.
fn exit_code_for(err: &anyhow::Error) -> u8 {
    for cause in err.chain() {
        if let Some(e) = cause.downcast_ref::<ApplicationError>() {
            return e.exit_code();
        }
        if let Some(e) = cause.downcast_ref::<ConfigError>() {
            return e.exit_code();
        }
        if cause.downcast_ref::<std::io::Error>().is_some() {
            return 4;
        }
    }
    USAGE_EXIT
}

/// Load the patch spec and the directory its relative target resolves against.
fn load_spec(spec: &SpecArgs) -> Result<(PatchConfig, PathBuf)> {
    if let Some(path) = &spec.patches {
        let config = load_from_path(path)?;
        let base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        debug!(path = %path.display(), operations = config.operations.len(), "loaded patch spec");
        return Ok((config, base_dir));
    }
    if let Some(inline) = &spec.inline {
        let config = load_inline(inline)?;
        debug!(operations = config.operations.len(), "loaded inline patch spec");
        return Ok((config, PathBuf::new()));
    }
    anyhow::bail!("one of --patches or --inline is required")
}

/// Helper: Show unified diff between original and modified content
fn display_diff(file: &Path, original: &str, modified: &str) {
    println!(
        "\n{}",
        format!("--- {} (original)", file.display()).dimmed()
    );
    println!("{}", format!("+++ {} (patched)", file.display()).dimmed());

    let diff = TextDiff::from_lines(original, modified);

    for hunk in diff.unified_diff().context_radius(3).iter_hunks() {
        println!("{}", hunk.header().to_string().cyan());
        for change in hunk.iter_changes() {
            let line = match change.tag() {
                ChangeTag::Delete => format!("-{}", change).red(),
                ChangeTag::Insert => format!("+{}", change).green(),
                ChangeTag::Equal => format!(" {}", change).normal(),
            };
            print!("{}", line);
            if change.missing_newline() {
                println!();
            }
        }
    }
}

fn print_header(config: &PatchConfig, target: &Path) {
    if !config.meta.name.is_empty() {
        println!("Patch: {}", config.meta.name.bold());
    }
    if let Some(description) = &config.meta.description {
        println!("{}", description.dimmed());
    }
    println!("Target: {}", target.display());
    println!();
}

fn print_operation(op: &AppliedOperation, dry_run: bool) {
    match op.status {
        OperationStatus::AlreadyApplied => println!("{} {}", "⊙".yellow(), op),
        _ if dry_run => println!("{} {} {}", "✓".green(), op, "(dry run)".dimmed()),
        _ => println!("{} {}", "✓".green(), op),
    }
}

/// Print the failure with conflict diagnostics and return its exit code.
fn report_failure(config: &PatchConfig, err: &ApplicationError) -> ExitCode {
    eprintln!("{} {}", "✗".red(), err);

    if let Some(op) = err.operation_index().and_then(|i| config.operations.get(i)) {
        eprintln!("  Operation kind: {}", op.kind());
    }

    match err {
        ApplicationError::AnchorNotFound {
            anchor, nearest, ..
        }
        | ApplicationError::DeclarationNotFound {
            anchor, nearest, ..
        } => {
            eprintln!("  {}", "CONFLICT: Anchor matched no line".red());
            eprintln!("  Anchor: {}", anchor);
            if let Some(line) = nearest {
                eprintln!("  Nearest: {}", line);
            }
            eprintln!("  Possible causes:");
            eprintln!("    - Target file was updated and the anchor text changed");
            eprintln!("    - Spec points at the wrong file");
        }
        ApplicationError::BoundaryNotFound {
            declaration_line,
            reason,
            ..
        } => {
            eprintln!("  {}", "CONFLICT: Block boundary not found".red());
            eprintln!("  Declaration: line {}", declaration_line + 1);
            eprintln!("  Reason: {}", reason);
            eprintln!("  Action: Check next_marker, or try strategy = \"brace-depth\"");
        }
        ApplicationError::VerificationFailed {
            range, found_hash, ..
        } => {
            eprintln!(
                "  {}",
                "CONFLICT: Block changed since the patch was written".red()
            );
            eprintln!("  Block: {}", range);
            eprintln!("  Found: xxh3 0x{:016x}", found_hash);
        }
        ApplicationError::Edit { source, .. } => {
            eprintln!("  Edit error: {}", source);
        }
        _ => {}
    }

    eprintln!("  {}", "No changes were written".dimmed());
    ExitCode::from(err.exit_code())
}

fn cmd_apply(
    target: Option<PathBuf>,
    spec: &SpecArgs,
    dry_run: bool,
    show_diff: bool,
) -> Result<ExitCode> {
    // 1. Load spec and resolve the target file
    let (config, base_dir) = load_spec(spec)?;
    let target = resolve_target(&config, target.as_deref(), &base_dir)?;

    print_header(&config, &target);
    if dry_run {
        println!("{}", "[DRY RUN - nothing will be written]".cyan());
    }

    // 2. Apply all operations as one unit
    let outcome = match apply_patches(&config, &target, ApplyOptions { dry_run }) {
        Ok(outcome) => outcome,
        Err(err) => return Ok(report_failure(&config, &err)),
    };

    // 3. Report results
    for op in &outcome.result.operations {
        print_operation(op, dry_run);
    }

    if show_diff && outcome.result.changed() {
        display_diff(
            &outcome.path,
            &outcome.original,
            &outcome.result.document.to_text(),
        );
    }

    // 4. Summary
    println!();
    println!("{}", "Summary:".bold());
    println!(
        "  {} applied",
        format!("{}", outcome.result.applied_count()).green()
    );
    println!(
        "  {} already applied",
        format!("{}", outcome.result.already_applied_count()).yellow()
    );
    if outcome.written {
        println!("  wrote {}", outcome.path.display());
    } else {
        println!("  {}", "file unchanged".dimmed());
    }

    Ok(ExitCode::SUCCESS)
}

fn cmd_check(target: Option<PathBuf>, spec: &SpecArgs) -> Result<ExitCode> {
    let (config, base_dir) = load_spec(spec)?;
    let target = resolve_target(&config, target.as_deref(), &base_dir)?;

    println!("{}", "Patch Status Report".bold());
    print_header(&config, &target);

    let outcome = match check_file(&target, &config.operations) {
        Ok(outcome) => outcome,
        Err(err) => return Ok(report_failure(&config, &err)),
    };

    let mut pending = 0;
    for op in &outcome.result.operations {
        if op.status == OperationStatus::AlreadyApplied {
            println!(
                "{} #{} {}: {}",
                "✓".green(),
                op.index + 1,
                op.kind,
                "APPLIED".green()
            );
        } else {
            println!("{} {} {}", "⊙".yellow(), op, "(PENDING)".yellow());
            pending += 1;
        }
    }

    println!();
    if pending > 0 {
        println!(
            "{} of {} operation(s) pending",
            pending,
            outcome.result.operations.len()
        );
        Ok(ExitCode::from(1))
    } else {
        println!("{}", "All operations applied".green());
        Ok(ExitCode::SUCCESS)
    }
}

fn cmd_extract(
    target: &Path,
    declaration: &str,
    next_marker: Option<&str>,
    strategy: StrategyArg,
    show: bool,
) -> Result<ExitCode> {
    let kind = BoundaryKind::from(strategy);
    let Some(boundary) = kind.strategy(next_marker) else {
        eprintln!(
            "{} {} strategy requires --next-marker",
            "error:".red().bold(),
            kind
        );
        return Ok(ExitCode::from(USAGE_EXIT));
    };

    let document = SourceDocument::load(target)
        .with_context(|| format!("failed to read {}", target.display()))?;

    match extract_block(&document, declaration, boundary.as_ref()) {
        Ok(range) => {
            let text = range.text(&document);
            println!("{} {}", "Block:".bold(), range);
            println!("Strategy: {}", kind);
            println!("Lines: {}", range.len());
            println!("xxh3: 0x{:016x}", content_hash(&text));
            if show {
                println!();
                print!("{}", text);
                if !text.ends_with('\n') {
                    println!();
                }
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            eprintln!("{} {}", "✗".red(), err);
            let code = match &err {
                BlockError::DeclarationNotFound { anchor } => {
                    if let Some(line) = nearest_line(&document, anchor) {
                        eprintln!("  Nearest: {}", line);
                    }
                    2
                }
                BlockError::BoundaryNotFound { .. } => 3,
            };
            Ok(ExitCode::from(code))
        }
    }
}
