mod commands;

use crate::commands::{build_index, index_info, query};
use clap::Parser;
use pique::error::{ErrorClass, PiqueError};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Quantize a raw dataset and write an EQUALITY-encoded index file.
    BuildIndex(build_index::BuildIndexArgs),
    /// Print an index file's global and per-partition metadata.
    IndexInfo(index_info::IndexInfoArgs),
    /// Evaluate an AND of value-range constraints against a catalog.
    Query(query::QueryArgs),
}

fn run() -> Result<(), PiqueError> {
    let cli = Cli::parse();
    match cli.command {
        Commands::BuildIndex(args) => build_index::run(args),
        Commands::IndexInfo(args) => index_info::run(args),
        Commands::Query(args) => query::run(args),
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        let code = match e.class() {
            ErrorClass::Configuration => 1,
            _ => 2,
        };
        std::process::exit(code);
    }
}
