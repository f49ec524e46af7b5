use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use pathix::compiler::{Compiler, JsonHost};
use pathix::index::{IndexConfiguration, IndexSchema, MemoryIndex, SearchBackend};
use pathix::query::{SortField, parse_query};
use pathix::xpath::Expr;
use rayon::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "pathix")]
#[command(about = "Index-aware path query optimizer")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Schema configuration file (defaults to the user config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Optimize JSON expression trees and print the rewritten queries
    Optimize {
        /// Files holding one JSON-encoded tree each
        #[arg(required = true)]
        trees: Vec<PathBuf>,

        /// Print the rewritten tree as JSON instead of XQuery
        #[arg(long)]
        json: bool,
    },
    /// Parse a textual predicate and show its normalized forms
    Explain {
        predicate: String,
    },
    /// Index XML documents in memory and run a predicate against them
    Search {
        #[arg(long, required = true, num_args = 1..)]
        docs: Vec<PathBuf>,

        predicate: String,

        /// Sort specification, e.g. "title descending"
        #[arg(long)]
        sort: Option<String>,
    },
    /// List the distinct terms of a field
    Terms {
        #[arg(long, required = true, num_args = 1..)]
        docs: Vec<PathBuf>,

        #[arg(long)]
        field: Option<String>,

        #[arg(long)]
        start: Option<String>,
    },
    /// Show the active field schema
    Schema,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = IndexConfiguration::load(cli.config.as_deref())?;
    let schema = Arc::new(IndexSchema::from_config(&config).context("Invalid schema configuration")?);

    match cli.command {
        Commands::Optimize { trees, json } => optimize(schema, &trees, json)?,
        Commands::Explain { predicate } => explain(&predicate)?,
        Commands::Search {
            docs,
            predicate,
            sort,
        } => {
            let index = build_index(schema, &docs)?;
            let query = parse_query(&predicate).context("Failed to parse predicate")?;
            let sort = match sort {
                Some(spec) => SortField::parse_spec(&spec)?,
                None => Vec::new(),
            };
            for doc in index.search(&query, &sort, None)? {
                println!("{}", index.uri(doc).unwrap_or_default());
            }
        }
        Commands::Terms { docs, field, start } => {
            let index = build_index(schema, &docs)?;
            for term in index.field_terms(field.as_deref(), start.as_deref())? {
                println!("{}", term);
            }
        }
        Commands::Schema => {
            println!("indexing enabled: {}", schema.is_indexing_enabled());
            println!("max path depth: {}", schema.max_path_depth());
            for field in schema.fields() {
                let role = field.role.map(|r| format!(" ({:?})", r)).unwrap_or_default();
                println!("  {:<20} {:?}{}", field.name, field.field_type, role);
            }
        }
    }

    Ok(())
}

fn optimize(schema: Arc<IndexSchema>, trees: &[PathBuf], json: bool) -> Result<()> {
    let compiler = Compiler::new(JsonHost::default(), schema);

    let outputs: Vec<Result<String>> = trees
        .par_iter()
        .map(|path| {
            let source = fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let compiled = compiler
                .compile(&source)
                .with_context(|| format!("Failed to compile {}", path.display()))?;
            for diagnostic in &compiled.diagnostics {
                eprintln!("{}: {}: {}", path.display(), diagnostic.kind, diagnostic.message);
            }
            render(&compiled.executable, json)
        })
        .collect();

    let mut failed = 0;
    for (path, output) in trees.iter().zip(outputs) {
        match output {
            Ok(text) => {
                if trees.len() > 1 {
                    println!("# {}", path.display());
                }
                println!("{}", text);
            }
            Err(e) => {
                eprintln!("{:#}", e);
                failed += 1;
            }
        }
    }
    if failed > 0 {
        bail!("{} of {} trees failed to compile", failed, trees.len());
    }
    Ok(())
}

fn render(tree: &Expr, json: bool) -> Result<String> {
    if json {
        serde_json::to_string_pretty(tree).context("Failed to serialize tree")
    } else {
        Ok(tree.to_string())
    }
}

fn explain(predicate: &str) -> Result<()> {
    let query = parse_query(predicate).context("Failed to parse predicate")?;
    println!("query:  {}", query.to_query_string());
    println!("xml:    {}", query.to_xml_node());
    println!("fields: {}", query.fields().join(", "));
    Ok(())
}

fn build_index(schema: Arc<IndexSchema>, docs: &[PathBuf]) -> Result<MemoryIndex> {
    let mut index = MemoryIndex::new(schema);
    for path in docs {
        let xml = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        index
            .add_document(&uri(path), &xml)
            .with_context(|| format!("Failed to index {}", path.display()))?;
    }
    Ok(index)
}

fn uri(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}
