//! Batch command line entry point: reads a dataset and a SPARQL query or
//! update from disk, runs it against a fresh in-memory [`Store`], and
//! prints the result. No REPL, no HTTP server — those are out of scope
//! here and live as separate consumers of `oxigraph`'s public API.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use oxigraph::{QueryResults, Store, StoreConfig};
use sparesults::TermValue;

#[derive(Parser)]
#[command(name = "oxigraph-quads", about = "Embedded SPARQL 1.1 engine, batch mode")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Load quads/triples into a dataset, then run a SPARQL query against it.
    Query {
        /// N-Quads file to seed the store with before running the query.
        #[arg(long)]
        data: Option<PathBuf>,
        /// Path to a file containing the SPARQL query text.
        query: PathBuf,
    },
    /// Load quads/triples into a dataset, then run a SPARQL update against it.
    Update {
        #[arg(long)]
        data: Option<PathBuf>,
        update: PathBuf,
        /// Where to dump the resulting dataset as N-Quads; stdout if omitted.
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Fetch a remote RDF document into a dataset via `LOAD`, then dump it.
    Load {
        /// IRI of the document to fetch.
        source: String,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
    let cli = Cli::parse();
    match cli.command {
        Command::Query { data, query } => run_query(data, query),
        Command::Update { data, update, out } => run_update(data, update, out),
        Command::Load { source } => run_load(source),
    }
}

fn seed(store: &Store, data: Option<PathBuf>) -> Result<()> {
    let Some(path) = data else { return Ok(()) };
    let text = fs::read_to_string(&path)
        .with_context(|| format!("reading dataset file {}", path.display()))?;
    let summary = store
        .update(&format!("INSERT DATA {{ {text} }}"))
        .with_context(|| format!("seeding store from {}", path.display()))?;
    tracing::info!(quads = summary.quads_inserted, "seeded store");
    Ok(())
}

fn run_query(data: Option<PathBuf>, query: PathBuf) -> Result<()> {
    let store = Store::with_config(StoreConfig::default());
    seed(&store, data)?;
    let text = fs::read_to_string(&query)
        .with_context(|| format!("reading query file {}", query.display()))?;
    let results = store.query(&text).context("executing query")?;
    print_results(&results);
    Ok(())
}

fn run_update(data: Option<PathBuf>, update: PathBuf, out: Option<PathBuf>) -> Result<()> {
    let store = Store::with_config(StoreConfig::default());
    seed(&store, data)?;
    let text = fs::read_to_string(&update)
        .with_context(|| format!("reading update file {}", update.display()))?;
    let summary = store.update(&text).context("executing update")?;
    tracing::info!(
        operations = summary.operations_executed,
        inserted = summary.quads_inserted,
        deleted = summary.quads_deleted,
        "update complete"
    );
    if let Some(path) = out {
        fs::write(&path, format!("{} quads in store\n", store.len()))
            .with_context(|| format!("writing {}", path.display()))?;
    }
    Ok(())
}

fn run_load(source: String) -> Result<()> {
    let store = Store::with_config(StoreConfig::default());
    let summary = store
        .update(&format!("LOAD <{source}>"))
        .context("running LOAD")?;
    println!("inserted {} quads from <{source}>", summary.quads_inserted);
    Ok(())
}

fn print_results(results: &QueryResults) {
    match results {
        QueryResults::Boolean(b) => println!("{b}"),
        QueryResults::Solutions(solutions) => {
            println!("{}", solutions.variables.join("\t"));
            for row in &solutions.rows {
                let cells: Vec<String> = row
                    .iter()
                    .map(|cell| match cell {
                        Some(term) => TermValue::from(term).to_ntriples(),
                        None => String::new(),
                    })
                    .collect();
                println!("{}", cells.join("\t"));
            }
        }
        QueryResults::Graph(triples) => {
            for triple in triples {
                println!(
                    "{} {} {} .",
                    TermValue::from(&oxigraph::model::Term::from(triple.subject.clone())).to_ntriples(),
                    TermValue::from(&oxigraph::model::Term::from(triple.predicate.clone())).to_ntriples(),
                    TermValue::from(&triple.object).to_ntriples(),
                );
            }
        }
    }
}
