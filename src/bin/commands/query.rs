// bin/commands/query.rs
//
// Evaluates an AND of value-range constraints against a catalog's variables
// and prints, per partition, the matching record count and cumulative I/O
// stats. A thin CLI-level query builder; the `--constraint` syntax isn't a
// general RPN query language, just enough to exercise `QueryEngine` end to
// end.

use clap::Args;
use pique::error::PiqueError;
use pique::{and, constraint, ComplementMode, EngineConfig, Query};
use std::path::PathBuf;
use std::time::Instant;

#[derive(Args, Debug)]
pub struct QueryArgs {
    /// Catalog file listing variables and their dataset/index paths.
    pub catalog: PathBuf,

    /// Constraint in the form "variable:lower:upper"; either bound may be
    /// "-" for an open bound. Repeatable; multiple constraints are ANDed.
    #[arg(long = "constraint", required = true)]
    pub constraints: Vec<String>,

    /// Complement-plan policy: auto, never, always.
    #[arg(long, default_value = "auto")]
    pub complement_mode: String,
}

fn parse_bound(s: &str) -> Result<Option<f64>, PiqueError> {
    if s == "-" {
        Ok(None)
    } else {
        Ok(Some(s.parse::<f64>().map_err(|e| PiqueError::from(e.to_string()))?))
    }
}

fn parse_constraint(s: &str) -> Result<Query, PiqueError> {
    let mut parts = s.splitn(3, ':');
    let varname = parts.next().ok_or_else(|| PiqueError::from(format!("malformed --constraint: {s:?}")))?;
    let lower = parts.next().ok_or_else(|| PiqueError::from(format!("malformed --constraint: {s:?}")))?;
    let upper = parts.next().ok_or_else(|| PiqueError::from(format!("malformed --constraint: {s:?}")))?;
    Ok(constraint(varname, parse_bound(lower)?, parse_bound(upper)?))
}

fn parse_complement_mode(s: &str) -> Result<ComplementMode, PiqueError> {
    match s {
        "auto" => Ok(ComplementMode::Auto),
        "never" => Ok(ComplementMode::Never),
        "always" => Ok(ComplementMode::Always),
        other => Err(PiqueError::from(format!("unknown --complement-mode: {other:?}"))),
    }
}

pub fn run(args: QueryArgs) -> Result<(), PiqueError> {
    let start = Instant::now();
    let db = pique::Database::open_catalog(&args.catalog)?;

    let mut query: Option<Query> = None;
    for spec in &args.constraints {
        let c = parse_constraint(spec)?;
        query = Some(match query {
            None => c,
            Some(existing) => and(existing, c),
        });
    }
    let query = query.expect("clap enforces at least one --constraint");

    let config = EngineConfig::builder().complement_mode(parse_complement_mode(&args.complement_mode)?).build();
    let engine = pique::QueryEngine::open(db, config)?;
    let cursor = engine.evaluate(query)?;

    let mut total_matches: u64 = 0;
    let mut cursor = cursor;
    for result in &mut cursor {
        let result = result?;
        let count = result.region.len();
        total_matches += count as u64;
        println!(
            "partition {:>3}  rids [{}, {})  matches={}",
            result.partition_id, result.begin_rid, result.end_rid, count
        );
    }

    let stats = cursor.stats();
    eprintln!(
        "{} partitions visited, {} skipped, {} matches total, {} region reads ({} bytes), elapsed {:.2?}",
        stats.partitions_visited,
        stats.partitions_skipped_arithmetic_error,
        total_matches,
        stats.io.region_reads,
        stats.io.bytes_read,
        start.elapsed()
    );
    Ok(())
}
