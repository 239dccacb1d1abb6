//! npdi-search CLI - search officers, units and agencies

mod dataset;

use anyhow::anyhow;
use clap::{Parser, Subcommand};
use futures_util::StreamExt;
use npdi_search_core::Error;
use npdi_search_core::config::Config;
use npdi_search_core::domain::search::{
    AggregatedResult, SearchOrchestrator, SnapshotKind, clients_for_records,
};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Parser)]
#[command(name = "npdi-search")]
#[command(author, version, about = "Search officers, units and agencies", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    /// Quiet mode (minimal output)
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Search every category; with several queries, later ones supersede earlier ones
    Search {
        /// Queries, in the order they are typed
        #[arg(required = true)]
        queries: Vec<String>,
        /// JSON dataset of records (defaults to the built-in sample)
        #[arg(short, long)]
        dataset: Option<PathBuf>,
    },

    /// Search line by line
    Interactive {
        /// JSON dataset of records (defaults to the built-in sample)
        #[arg(short, long)]
        dataset: Option<PathBuf>,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Get a configuration value
    Get { key: String },
    /// Set a configuration value
    Set { key: String, value: String },
    /// List all configuration values
    List,
    /// Reset configuration to defaults
    Reset,
    /// Show configuration file path
    Path,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let directive = if cli.verbose {
        "npdi_search=debug"
    } else {
        "npdi_search=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(directive.parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Search { queries, dataset } => {
            cmd_search(&queries, dataset.as_deref(), cli.format, cli.quiet).await
        }
        Commands::Interactive { dataset } => {
            cmd_interactive(dataset.as_deref(), cli.format, cli.quiet).await
        }
        Commands::Config { action } => cmd_config(action, cli.quiet),
    };

    if let Err(err) = &result
        && let Some(suggestion) = hint(err)
    {
        eprintln!("Hint: {}", suggestion);
    }
    result
}

/// Suggestion attached to the first npdi-search error in the chain
fn hint(err: &anyhow::Error) -> Option<String> {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<Error>())
        .and_then(Error::suggestion)
}

// ============================================================================
// Command Implementations
// ============================================================================

fn build_orchestrator(config: &Config, dataset: Option<&Path>) -> anyhow::Result<SearchOrchestrator> {
    let records = dataset::load(dataset)?;
    debug!(records = records.len(), "Loaded search dataset");

    let orchestrator = SearchOrchestrator::builder()
        .clients(clients_for_records(&records, &config.index))
        .settings(config.search.clone())
        .build()?;
    Ok(orchestrator)
}

async fn cmd_search(
    queries: &[String],
    dataset: Option<&Path>,
    format: OutputFormat,
    quiet: bool,
) -> anyhow::Result<()> {
    let config = Config::load()?;
    let orchestrator = build_orchestrator(&config, dataset)?;

    // Each new query supersedes the previous one, exactly like typing.
    let mut latest = None;
    for query in queries {
        latest = Some(orchestrator.search_all(query).await?);
    }
    let subscription = latest.ok_or_else(|| anyhow!("No query given"))?;
    let display = subscription.query().display().to_string();

    let result = subscription
        .wait_final()
        .await
        .ok_or_else(|| anyhow!("Search for '{}' was superseded", display))?;

    println!("{}", render(&result, format, quiet)?);
    Ok(())
}

async fn cmd_interactive(
    dataset: Option<&Path>,
    format: OutputFormat,
    quiet: bool,
) -> anyhow::Result<()> {
    let config = Config::load()?;
    let orchestrator = build_orchestrator(&config, dataset)?;
    let mut editor = DefaultEditor::new()?;

    if !quiet {
        println!("Search officers, units and agencies. Ctrl-D to exit.");
    }

    loop {
        let line = match editor.readline("search> ") {
            Ok(line) => line,
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => break,
            Err(err) => return Err(err.into()),
        };
        editor.add_history_entry(line.as_str())?;

        let mut snapshots = orchestrator.search_all(&line).await?.into_stream();
        while let Some(snapshot) = snapshots.next().await {
            match snapshot.kind {
                SnapshotKind::Progressive => {}
                SnapshotKind::Cached => {
                    if !quiet {
                        println!("(cached, refreshing...)");
                        println!("{}", render(&snapshot.result, format, quiet)?);
                    }
                }
                SnapshotKind::Final | SnapshotKind::Cleared => {
                    println!("{}", render(&snapshot.result, format, quiet)?);
                }
            }
        }
    }

    if !quiet {
        let stats = orchestrator.cache().stats();
        println!(
            "Cache: {} of {} entries, {} hits, {} misses ({:.0}% hit rate)",
            stats.entries,
            stats.capacity,
            stats.hits,
            stats.misses,
            stats.hit_rate()
        );
    }
    Ok(())
}

fn render(result: &AggregatedResult, format: OutputFormat, quiet: bool) -> anyhow::Result<String> {
    if format == OutputFormat::Json {
        return Ok(serde_json::to_string_pretty(result)?);
    }

    let mut lines = Vec::new();

    if quiet {
        for entry in &result.entries {
            lines.push(format!("{}\t{}\t{}", entry.category, entry.id, entry.label));
        }
        return Ok(lines.join("\n"));
    }

    if result.query.is_empty() {
        return Ok("Search cleared.".to_string());
    }

    if result.entries.is_empty() {
        lines.push(format!(
            "No results found matching \"{}\".",
            result.query.display()
        ));
    } else {
        lines.push(format!(
            "Results for \"{}\" (showing {} of {})",
            result.query.display(),
            result.entries.len(),
            result.total_matches
        ));
        for entry in &result.entries {
            lines.push(String::new());
            lines.push(format!(
                "  {:<8} {}",
                entry.category.display_name(),
                entry.label
            ));
            if let Some(subtitle) = &entry.subtitle {
                lines.push(format!("           {}", subtitle));
            }
            for detail in &entry.details {
                lines.push(format!("           {}", detail));
            }
            match (&entry.source, entry.last_updated) {
                (Some(source), Some(updated)) => lines.push(format!(
                    "           {}, updated {}",
                    source,
                    updated.format("%Y-%m-%d")
                )),
                (Some(source), None) => lines.push(format!("           {}", source)),
                _ => {}
            }
            lines.push(format!("           {}", entry.link()));
        }
    }

    for failure in &result.failures {
        lines.push(String::new());
        lines.push(format!(
            "Partial results: {} search unavailable ({})",
            failure.category, failure.reason
        ));
    }
    if result.deadline_exceeded {
        lines.push(String::new());
        lines.push("Partial results: search deadline exceeded".to_string());
    }

    Ok(lines.join("\n"))
}

fn cmd_config(action: ConfigAction, quiet: bool) -> anyhow::Result<()> {
    match action {
        ConfigAction::Get { key } => {
            let config = Config::load()?;
            println!("{}", config.get(&key)?);
        }
        ConfigAction::Set { key, value } => {
            let mut config = Config::load()?;
            config.set(&key, &value)?;
            config.save()?;
            if !quiet {
                println!("Set {} = {}", key, value);
            }
        }
        ConfigAction::List => {
            let config = Config::load()?;
            for (key, value) in config.list()? {
                println!("{} = {}", key, value);
            }
        }
        ConfigAction::Reset => {
            Config::reset()?;
            if !quiet {
                println!("Configuration reset to defaults.");
            }
        }
        ConfigAction::Path => {
            println!("{}", Config::config_path()?.display());
        }
    }
    Ok(())
}
