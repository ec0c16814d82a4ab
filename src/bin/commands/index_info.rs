// bin/commands/index_info.rs
//
// Prints a built index file's global and per-partition metadata without
// evaluating any query against it.

use clap::Args;
use pique::error::PiqueError;
use pique::io::file::FileIndexIo;
use pique::io::IndexIo;
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct IndexInfoArgs {
    /// Path to an index file written by `build-index`.
    pub index: PathBuf,
}

pub fn run(args: IndexInfoArgs) -> Result<(), PiqueError> {
    let io = FileIndexIo::open(&args.index)?;
    let global = io.global_metadata()?;
    println!("partitions: {}", global.partition_count);
    println!("consistent: {}", global.is_consistent());
    for extent in &global.extents {
        let partition = io.get_partition(extent.partition_id)?;
        let meta = partition.partition_metadata();
        println!(
            "  partition {:>3}  rids [{}, {})  domain_size={}  nbins={}  nregions={}  region_encoding={:?}",
            extent.partition_id, extent.begin_rid, extent.end_rid, meta.domain_size, meta.nbins, meta.nregions, meta.region_encoding_id
        );
    }
    Ok(())
}
