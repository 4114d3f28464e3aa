//! Contractgraph CLI
//!
//! Command-line interface for:
//! - Ingesting extraction JSON (file or directory) into the clause graph
//! - Structured queries (by id, party, clause type)
//! - Excerpt similarity search and free-form questions
//! - Corpus statistics
//!
//! The graph lives in a snapshot file (`--store`); each command loads it,
//! works on the in-memory store, and ingestion saves it back.

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use contractgraph_graph::{GraphStore, MemoryGraph};
use std::path::{Path, PathBuf};
use std::sync::Arc;

mod ingest;
mod query;

#[derive(Parser)]
#[command(name = "contractgraph")]
#[command(author, version, about = "Contract clause knowledge graph")]
struct Cli {
    /// Snapshot file holding the graph.
    #[arg(long, global = true, env = "CONTRACTGRAPH_STORE", default_value = "contractgraph.snapshot")]
    store: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest one extraction JSON file, or every *.json under a directory.
    ///
    /// Quarantined payloads are written aside for operator inspection;
    /// one bad document never blocks its siblings.
    Ingest {
        /// Input file or directory.
        input: PathBuf,
        /// Directory for quarantined payloads (default: <store>.quarantine/).
        #[arg(long)]
        quarantine_dir: Option<PathBuf>,
    },

    /// Structured queries against the graph.
    Query {
        #[command(subcommand)]
        command: QueryCommands,
    },

    /// Ranked excerpt similarity search.
    Similar {
        text: String,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },

    /// Free-form question, routed to the right strategy automatically.
    Ask { question: String },

    /// Corpus statistics.
    Stats,
}

#[derive(Subcommand)]
enum QueryCommands {
    /// One agreement by its source document id, with all excerpts.
    GetById { id: String },
    /// Agreements naming this party (exact name, case-insensitive).
    ByParty { name: String },
    /// Agreements where this clause exists, with excerpts.
    ByClauseType { clause_type: String },
    /// Agreements where this clause is absent.
    WithoutClauseType { clause_type: String },
}

fn load_store(path: &Path) -> Result<MemoryGraph> {
    if path.exists() {
        MemoryGraph::load(path).map_err(|e| anyhow!("loading snapshot {}: {e}", path.display()))
    } else {
        Ok(MemoryGraph::new())
    }
}

fn require_store(path: &Path) -> Result<Arc<MemoryGraph>> {
    if !path.exists() {
        return Err(anyhow!(
            "no snapshot at {}; run `contractgraph ingest` first",
            path.display()
        ));
    }
    Ok(Arc::new(load_store(path)?))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Ingest {
            input,
            quarantine_dir,
        } => {
            let quarantine = quarantine_dir.unwrap_or_else(|| {
                let mut p = cli.store.clone().into_os_string();
                p.push(".quarantine");
                PathBuf::from(p)
            });
            ingest::cmd_ingest(&cli.store, &input, &quarantine)
        }
        Commands::Query { command } => {
            let store = require_store(&cli.store)?;
            let rt = tokio::runtime::Runtime::new().context("tokio runtime")?;
            match command {
                QueryCommands::GetById { id } => rt.block_on(query::cmd_get_by_id(store, &id)),
                QueryCommands::ByParty { name } => rt.block_on(query::cmd_by_party(store, &name)),
                QueryCommands::ByClauseType { clause_type } => {
                    rt.block_on(query::cmd_by_clause_type(store, &clause_type, true))
                }
                QueryCommands::WithoutClauseType { clause_type } => {
                    rt.block_on(query::cmd_by_clause_type(store, &clause_type, false))
                }
            }
        }
        Commands::Similar { text, limit } => {
            let store = require_store(&cli.store)?;
            let rt = tokio::runtime::Runtime::new().context("tokio runtime")?;
            rt.block_on(query::cmd_similar(store, &text, limit))
        }
        Commands::Ask { question } => {
            let store = require_store(&cli.store)?;
            let rt = tokio::runtime::Runtime::new().context("tokio runtime")?;
            rt.block_on(query::cmd_ask(store, &question))
        }
        Commands::Stats => {
            let store = require_store(&cli.store)?;
            let stats = store.stats();
            println!("{}", "Corpus statistics".bold());
            println!("  agreements:       {}", stats.agreements);
            println!("  parties:          {}", stats.parties);
            println!("  clause instances: {}", stats.clause_instances);
            println!("  clauses present:  {}", stats.clauses_present);
            println!("  excerpts:         {}", stats.excerpts);
            println!("  countries:        {}", stats.countries);
            Ok(())
        }
    }
}
