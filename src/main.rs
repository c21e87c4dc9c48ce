use std::io::IsTerminal;
use std::path::{Path, PathBuf};

use clap::{CommandFactory, Parser, Subcommand};
use miette::{IntoDiagnostic, Result};
use scry_core::{OutputFormat, RankedResult, ScryConfig, ScryError};
use scry_engine::Scry;
use scry_index::{ChangeType, IndexStats, SyncReport};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "scry",
    version,
    about = "Ask natural-language questions about a codebase",
    long_about = "Scry keeps a symbol-level index of a codebase in a vector store and answers\n\
                   natural-language questions with a hybrid of vector search and\n\
                   symbol-aware reranking.\n\n\
                   Examples:\n  \
                     scry init                          Create a .scry.toml config file\n  \
                     scry sync --path .                 Index (or re-index) a project\n  \
                     scry sync-file src/ui/toast.ts     Re-index one changed file\n  \
                     scry query 'how do I show a toast' Search the index\n  \
                     scry stats                         Show index counts"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to configuration file (default: .scry.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Project name (default: name of the project directory)
    #[arg(long, short, global = true)]
    project: Option<String>,

    /// Output format
    #[arg(
        long,
        global = true,
        default_value = "text",
        long_help = "Output format for command results.\n\n\
                       Formats:\n  \
                         text      Human-readable summaries (default)\n  \
                         json      Machine-readable JSON with camelCase keys\n  \
                         markdown  GitHub-flavored Markdown"
    )]
    format: OutputFormat,

    /// Enable verbose output (debug logging)
    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Create a default .scry.toml in the current directory
    #[command(long_about = "Create a default .scry.toml configuration file.\n\n\
        Generates a commented-out template with all available options.\n\
        Fails if .scry.toml already exists.")]
    Init,
    /// Index every supported source file under a directory
    #[command(long_about = "Index every supported source file under a directory.\n\n\
        Walks the project respecting .gitignore, skips dependency trees and\n\
        binary files, and syncs changed chunks into the vector store. Chunks\n\
        whose code is unchanged (ignoring comments, debug prints, and whitespace)\n\
        are not re-embedded.\n\n\
        Examples:\n  scry sync\n  scry sync --path ../shop --prune")]
    Sync {
        /// Project root (default: current directory)
        #[arg(long, default_value = ".")]
        path: PathBuf,

        /// Also remove indexed files that no longer exist on disk
        #[arg(long)]
        prune: bool,
    },
    /// Re-index a single file after it changed
    SyncFile {
        /// File to re-index, relative to the project root
        file: PathBuf,

        /// Project root (default: current directory)
        #[arg(long, default_value = ".")]
        root: PathBuf,
    },
    /// Remove a deleted file from the index
    RemoveFile {
        /// File that was removed, relative to the project root
        file: PathBuf,

        /// Project root (default: current directory)
        #[arg(long, default_value = ".")]
        root: PathBuf,
    },
    /// Search the index with a natural-language question
    #[command(long_about = "Search the index with a natural-language question.\n\n\
        Extracts keywords from the question, embeds an expanded query, and\n\
        reranks vector hits by how well their symbols match the keywords.\n\n\
        Examples:\n  scry query 'how do I show a toast'\n  scry query 'cart total' --limit 3 --format json")]
    Query {
        /// The question to ask
        text: String,

        /// Project root, used to derive the default project name
        #[arg(long, default_value = ".")]
        root: PathBuf,

        /// Maximum results to show (default: 10)
        #[arg(long, default_value = "10")]
        limit: usize,
    },
    /// Show point, chunk, and file counts for a project
    Stats {
        /// Project root, used to derive the default project name
        #[arg(long, default_value = ".")]
        root: PathBuf,
    },
    /// Delete a project's vector collection and ledger
    Drop {
        /// Project root, used to derive the default project name
        #[arg(long, default_value = ".")]
        root: PathBuf,
    },
    /// Generate shell completion scripts
    #[command(hide = true)]
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

const DEFAULT_CONFIG: &str = r#"# Scry Configuration

[embedding]
# provider = "openai"          # any OpenAI-compatible endpoint
# model = "text-embedding-3-small"
# dimensions = 1536
# api_key = "..."               # or set OPENAI_API_KEY
# base_url = "https://api.openai.com/v1"
# batch_size = 64

[vector_store]
# backend = "sqlite"            # "sqlite" (local file) or "qdrant"
# path = ".scry/vectors.db"
# url = "http://localhost:6333" # qdrant only
# api_key = "..."               # qdrant only, or set QDRANT_API_KEY

[keywords]
# enabled = true                # false uses the local keyword fallback only
# model = "gpt-4o-mini"
# api_key = "..."               # or set OPENAI_API_KEY

[ledger]
# dir = ".scry/ledgers"
# mode = "keyed"                # "keyed" or "single-active"

[search]
# candidate_limit = 50
# threshold = 0.5
# deadline_ms = 10000
"#;

fn init_tracing(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let default = ["scry", "scry_core", "scry_analyzer", "scry_index", "scry_engine"]
        .iter()
        .map(|target| format!("{target}={level}"))
        .collect::<Vec<_>>()
        .join(",");
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_config(explicit: Option<&Path>) -> Result<ScryConfig> {
    match explicit {
        Some(path) => ScryConfig::from_file(path).map_err(diagnose),
        None => {
            let default_path = Path::new(".scry.toml");
            if default_path.exists() {
                ScryConfig::from_file(default_path).map_err(diagnose)
            } else {
                Ok(ScryConfig::default())
            }
        }
    }
}

/// Convert a library error into a diagnostic with a hint where one helps.
fn diagnose(err: ScryError) -> miette::Report {
    match &err {
        ScryError::Config(msg) if msg.contains("API key") => miette::miette!(
            help = "Set OPENAI_API_KEY or add api_key in your .scry.toml under [embedding]",
            "{err}"
        ),
        ScryError::Config(_) | ScryError::Toml(_) => miette::miette!(
            help = "Check .scry.toml, or run 'scry init' to create a default one",
            "{err}"
        ),
        ScryError::NoActiveProject(_) => miette::miette!(
            help = "Run 'scry sync' to index the project first, or pass --project <name>",
            "{err}"
        ),
        ScryError::CollectionNotFound(_) => miette::miette!(
            help = "The vector collection is missing; run 'scry sync' to rebuild it",
            "{err}"
        ),
        ScryError::VectorStore(_) => miette::miette!(
            help = "Check [vector_store] in .scry.toml; for qdrant, make sure the server is reachable",
            "{err}"
        ),
        ScryError::Embedding(_) => miette::miette!(
            help = "Check the embedding API key, model, and base_url under [embedding]",
            "{err}"
        ),
        ScryError::DeadlineExceeded(_) => miette::miette!(
            help = "Raise search.deadline_ms in .scry.toml",
            "{err}"
        ),
        _ => miette::miette!("{err}"),
    }
}

/// Project name from `--project`, else the root directory's name.
fn project_name(explicit: Option<&str>, root: &Path) -> Result<String> {
    if let Some(name) = explicit {
        return Ok(name.to_string());
    }
    let canonical = root
        .canonicalize()
        .map_err(|_| diagnose(ScryError::FileNotFound(root.to_path_buf())))?;
    canonical
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| {
            miette::miette!(
                help = "Pass --project <name> explicitly",
                "cannot derive a project name from {}",
                canonical.display()
            )
        })
}

/// `file` as a `/`-separated path relative to `root`.
fn relative_path(file: &Path, root: &Path) -> Result<String> {
    let relative = if file.is_absolute() {
        let root = root.canonicalize().into_diagnostic()?;
        file.strip_prefix(&root)
            .map_err(|_| {
                miette::miette!(
                    help = "Pass --root <dir> pointing at the project that contains the file",
                    "{} is outside the project root {}",
                    file.display(),
                    root.display()
                )
            })?
            .to_path_buf()
    } else {
        file.to_path_buf()
    };
    Ok(scry_analyzer::normalize_path(&relative.to_string_lossy()))
}

fn spinner(message: &str) -> Option<indicatif::ProgressBar> {
    if !std::io::stderr().is_terminal() {
        return None;
    }
    let pb = indicatif::ProgressBar::new_spinner();
    if let Ok(style) = indicatif::ProgressStyle::with_template("{spinner:.cyan} {msg} ({elapsed})")
    {
        pb.set_style(style);
    }
    pb.set_message(message.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(120));
    Some(pb)
}

fn finish(spinner: Option<indicatif::ProgressBar>, ok: bool) {
    if let Some(pb) = spinner {
        if ok {
            pb.finish_and_clear();
        } else {
            pb.finish_with_message("Failed");
        }
    }
}

fn print_report(report: &SyncReport, format: OutputFormat, verbose: bool) -> Result<()> {
    let created = report.count(ChangeType::Created);
    let updated = report.count(ChangeType::Updated);
    let deleted = report.count(ChangeType::Deleted);
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(report).into_diagnostic()?);
        }
        OutputFormat::Markdown => {
            println!("## Sync: {}\n", report.project);
            println!("| Created | Updated | Deleted | Unchanged |");
            println!("|---|---|---|---|");
            println!("| {created} | {updated} | {deleted} | {} |", report.unchanged);
            if !report.transitions.is_empty() {
                println!("\n| Change | Symbol | Kind | File |");
                println!("|---|---|---|---|");
                for t in &report.transitions {
                    println!(
                        "| {} | `{}` | {} | `{}` |",
                        change_label(t.change),
                        t.symbol,
                        t.kind,
                        t.file_path
                    );
                }
            }
            for path in &report.skipped_files {
                println!("\n> Skipped `{path}` (failed to parse)");
            }
        }
        OutputFormat::Text => {
            println!(
                "{}: {created} created, {updated} updated, {deleted} deleted, {} unchanged",
                report.project, report.unchanged
            );
            if verbose {
                for t in &report.transitions {
                    println!(
                        "  {:<8} {} ({}) {}",
                        change_label(t.change),
                        t.symbol,
                        t.kind,
                        t.file_path
                    );
                }
            }
            if report.orphans_removed > 0 {
                println!("  removed {} orphaned points", report.orphans_removed);
            }
            for path in &report.skipped_files {
                println!("  skipped {path} (failed to parse)");
            }
        }
    }
    Ok(())
}

fn change_label(change: ChangeType) -> &'static str {
    match change {
        ChangeType::Created => "created",
        ChangeType::Updated => "updated",
        ChangeType::Deleted => "deleted",
    }
}

fn print_results(
    project: &str,
    query: &str,
    results: &[RankedResult],
    format: OutputFormat,
    verbose: bool,
) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(results).into_diagnostic()?);
        }
        OutputFormat::Markdown => {
            println!("## Results for \"{query}\" in {project}\n");
            if results.is_empty() {
                println!("_No matches._");
            }
            for (i, r) in results.iter().enumerate() {
                let p = &r.payload;
                println!(
                    "{}. `{}` ({}) `{}:{}-{}` score {:.2}",
                    i + 1,
                    p.symbol,
                    p.kind,
                    p.file_path,
                    p.line_range.start,
                    p.line_range.end,
                    r.score
                );
            }
        }
        OutputFormat::Text => {
            if results.is_empty() {
                println!("No matches for \"{query}\" in {project}.");
                return Ok(());
            }
            for (i, r) in results.iter().enumerate() {
                let p = &r.payload;
                println!(
                    "{:>2}. {:.2}  {} ({})  {}:{}-{}",
                    i + 1,
                    r.score,
                    p.symbol,
                    p.kind,
                    p.file_path,
                    p.line_range.start,
                    p.line_range.end
                );
                if verbose {
                    println!(
                        "      similarity {:.3}, boosted {:.3}",
                        r.similarity, r.raw_score
                    );
                    if !r.reasons.is_empty() {
                        println!("      {}", r.reasons.join("; "));
                    }
                }
            }
        }
    }
    Ok(())
}

fn print_stats(project: &str, stats: &IndexStats, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            let json = serde_json::json!({ "project": project, "stats": stats });
            println!("{}", serde_json::to_string_pretty(&json).into_diagnostic()?);
        }
        OutputFormat::Markdown => {
            println!("## Index: {project}\n");
            println!("| Points | Chunks | Files |");
            println!("|---|---|---|");
            println!(
                "| {} | {} | {} |",
                stats.point_count, stats.chunk_count, stats.file_count
            );
        }
        OutputFormat::Text => {
            println!("{project}");
            println!("  points: {}", stats.point_count);
            println!("  chunks: {}", stats.chunk_count);
            println!("  files:  {}", stats.file_count);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .build(),
        )
    }))
    .into_diagnostic()?;
    human_panic::setup_panic!();

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let Some(command) = cli.command else {
        let mut cmd = Cli::command();
        cmd.print_help().into_diagnostic()?;
        return Ok(());
    };

    match command {
        Command::Init => {
            let path = Path::new(".scry.toml");
            if path.exists() {
                miette::bail!(".scry.toml already exists");
            }
            std::fs::write(path, DEFAULT_CONFIG).into_diagnostic()?;
            println!("Created .scry.toml with default configuration");
        }
        Command::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "scry", &mut std::io::stdout());
        }
        Command::Sync { path, prune } => {
            let config = load_config(cli.config.as_deref())?;
            let project = project_name(cli.project.as_deref(), &path)?;
            let scry = Scry::from_config(&config).map_err(diagnose)?;

            let root = path
                .canonicalize()
                .map_err(|_| diagnose(ScryError::FileNotFound(path.clone())))?;
            let files = scry_analyzer::walker::walk_project(&root).map_err(diagnose)?;
            tracing::info!(project = %project, files = files.len(), "walked project");

            let pb = spinner(&format!("Indexing {} files...", files.len()));
            let result = scry
                .sync_full(&project, &root.to_string_lossy(), &files)
                .await;
            finish(pb, result.is_ok());
            let report = result.map_err(diagnose)?;
            print_report(&report, cli.format, cli.verbose)?;

            if prune {
                let on_disk: std::collections::HashSet<&str> =
                    files.iter().map(|f| f.path.as_str()).collect();
                let stale: Vec<String> = match scry.ledgers().load(&project).map_err(diagnose)? {
                    Some(ledger) => ledger
                        .files()
                        .into_iter()
                        .filter(|f| !on_disk.contains(f) && !root.join(f).exists())
                        .map(str::to_string)
                        .collect(),
                    None => Vec::new(),
                };
                for file in stale {
                    let report = scry
                        .sync_file_removed(&project, &file)
                        .await
                        .map_err(diagnose)?;
                    print_report(&report, cli.format, cli.verbose)?;
                }
            }
        }
        Command::SyncFile { file, root } => {
            let config = load_config(cli.config.as_deref())?;
            let project = project_name(cli.project.as_deref(), &root)?;
            let relative = relative_path(&file, &root)?;
            let content = std::fs::read_to_string(root.join(&relative))
                .map_err(|_| diagnose(ScryError::FileNotFound(root.join(&relative))))?;

            let scry = Scry::from_config(&config).map_err(diagnose)?;
            let report = scry
                .sync_file(&project, &relative, &content)
                .await
                .map_err(diagnose)?;
            print_report(&report, cli.format, cli.verbose)?;
        }
        Command::RemoveFile { file, root } => {
            let config = load_config(cli.config.as_deref())?;
            let project = project_name(cli.project.as_deref(), &root)?;
            let relative = relative_path(&file, &root)?;

            let scry = Scry::from_config(&config).map_err(diagnose)?;
            let report = scry
                .sync_file_removed(&project, &relative)
                .await
                .map_err(diagnose)?;
            print_report(&report, cli.format, cli.verbose)?;
        }
        Command::Query { text, root, limit } => {
            let config = load_config(cli.config.as_deref())?;
            let project = project_name(cli.project.as_deref(), &root)?;
            let scry = Scry::from_config(&config).map_err(diagnose)?;

            let pb = spinner("Searching...");
            let result = scry.query(&project, &text).await;
            finish(pb, result.is_ok());
            let mut results = result.map_err(diagnose)?;
            results.truncate(limit);
            print_results(&project, &text, &results, cli.format, cli.verbose)?;
        }
        Command::Stats { root } => {
            let config = load_config(cli.config.as_deref())?;
            let project = project_name(cli.project.as_deref(), &root)?;
            let scry = Scry::from_config(&config).map_err(diagnose)?;
            let stats = scry.stats(&project).await.map_err(diagnose)?;
            print_stats(&project, &stats, cli.format)?;
        }
        Command::Drop { root } => {
            let config = load_config(cli.config.as_deref())?;
            let project = project_name(cli.project.as_deref(), &root)?;
            let scry = Scry::from_config(&config).map_err(diagnose)?;
            let existed = scry
                .delete_project_index(&project)
                .await
                .map_err(diagnose)?;
            if existed {
                println!("Deleted index for {project}");
            } else {
                println!("No index found for {project}; collection dropped if present");
            }
        }
    }

    Ok(())
}
