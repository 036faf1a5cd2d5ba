use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{anyhow, Result};
use arbor_core::Scope;
use clap::{ArgGroup, Parser, Subcommand};

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[cfg(target_env = "msvc")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

/// Inspect, query, and re-save merger-tree catalogs in any supported dialect.
#[derive(Parser, Debug)]
#[command(
    name = "arbor",
    about = "arbor: read, traverse, and analyze cosmological merger-tree catalogs",
    version,
    group = ArgGroup::new("input").required(true).args(["path", "dir"])
)]
pub struct Cli {
    /// Path to a single catalog file (its dialect is sniffed, unless --method is given)
    #[arg(long, value_name = "PATH", conflicts_with = "dir")]
    path: Option<String>,

    /// A directory holding the catalog; the first regular file found inside is used as input
    #[arg(long, value_name = "DIR", conflicts_with = "path")]
    dir: Option<String>,

    /// Skip dialect sniffing and open with this named backend
    #[arg(long, value_name = "DIALECT")]
    method: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Plant the catalog and print a one-line summary: tree count, field list, backend name.
    Load,
    /// Evaluate a predicate expression and print the matching nodes as a table.
    Select {
        /// Predicate expression, e.g. "mass > 1e12"
        predicate: String,
        /// Which array the predicate walks: "tree", "prog", or "forest"
        #[arg(long, default_value = "tree")]
        scope: String,
        /// Extra fields to print alongside uid/desc_uid (repeatable)
        #[arg(long = "field", value_name = "FIELD", num_args = 1.., action = clap::ArgAction::Append)]
        fields: Vec<String>,
    },
    /// Write the catalog out in the canonical sharded format.
    Save {
        /// Output path stem; `<stem>.json` and `<stem>_NNNN.bin` shards are written alongside it
        stem: String,
        /// Field subset to save (repeatable); defaults to every field the backend exposes
        #[arg(long = "field", value_name = "FIELD", num_args = 1.., action = clap::ArgAction::Append)]
        fields: Vec<String>,
        /// Upper bound on halos per shard file
        #[arg(long, default_value_t = 100_000)]
        max_shard_nodes: usize,
    },
}

/// Resolves `--path`/`--dir` (mutually exclusive, enforced by the `input` group)
/// down to one concrete file to hand to `arbor_formats::load`.
fn resolve_input(cli: &Cli) -> Result<PathBuf> {
    if let Some(path) = &cli.path {
        return Ok(PathBuf::from(path));
    }
    let dir = cli.dir.as_ref().expect("clap enforces path xor dir");
    first_regular_file(Path::new(dir))
}

fn first_regular_file(dir: &Path) -> Result<PathBuf> {
    let mut entries: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
        .map(|entry| entry.path())
        .collect();
    entries.sort();
    entries.into_iter().next().ok_or_else(|| anyhow!("no regular file found in {}", dir.display()))
}

fn run_load(arbor: &arbor_core::Arbor) -> Result<()> {
    arbor.plant_trees()?;
    let fields = arbor.field_registry().read().field_list().to_vec();
    println!("trees:   {}", arbor.size());
    println!("backend: {}", arbor.dialect(0));
    println!("fields:  {}", fields.join(", "));
    Ok(())
}

fn run_select(arbor: &arbor_core::Arbor, predicate: &str, scope: &str, fields: &[String]) -> Result<()> {
    arbor.plant_trees()?;
    let scope = Scope::parse(scope)?;
    let matches = arbor.select(predicate, scope, Some(fields))?;

    let mut header = vec!["uid".to_string(), "desc_uid".to_string()];
    header.extend(fields.iter().cloned());
    println!("{}", header.join("\t"));

    for node in &matches {
        let mut row = vec![node.uid()?.to_string(), node.desc_uid()?.to_string()];
        for field in fields {
            row.push(node.field_scalar(field)?.to_string());
        }
        println!("{}", row.join("\t"));
    }
    println!("{} matches", matches.len());
    Ok(())
}

fn run_save(arbor: &arbor_core::Arbor, stem: &str, fields: &[String], max_shard_nodes: usize) -> Result<()> {
    arbor.plant_trees()?;
    let field_subset = if fields.is_empty() { None } else { Some(fields.to_vec()) };
    let header_path = arbor_writer::save_arbor(arbor, stem, field_subset.as_deref(), None, max_shard_nodes)?;
    println!("wrote {header_path}");
    Ok(())
}

pub fn run(cli: Cli) -> Result<()> {
    let total_start = Instant::now();

    if std::env::var("RUST_LOG").is_ok() {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_writer(std::io::stderr)
            .init();
    }

    let result = (|| -> Result<()> {
        let path = resolve_input(&cli)?;
        let arbor = arbor_formats::load(&path, cli.method.as_deref())?;
        match &cli.command {
            Command::Load => run_load(&arbor),
            Command::Select { predicate, scope, fields } => run_select(&arbor, predicate, scope, fields),
            Command::Save { stem, fields, max_shard_nodes } => run_save(&arbor, stem, fields, *max_shard_nodes),
        }
    })();

    if let Err(e) = &result {
        // eprintln! ensures the message flushes before the process exits.
        eprintln!("Error: {e}");
        tracing::error!("Error: {}", e);
    }

    let total_secs = total_start.elapsed().as_secs_f64();
    tracing::info!("Total time: {:.2}s", total_secs);
    result
}

pub fn main() -> Result<()> {
    let cli = Cli::parse();
    run(cli)
}
