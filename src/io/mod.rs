// io/mod.rs
//
// The seam between the query engine and on-disk index files. `IndexIo`/
// `IndexPartitionIo` are the only interface the core depends on; `file`
// implements them against the bit-exact wire format, `cache` wraps them in
// strong/weak reference-counted handles.

pub mod cache;
pub mod file;

use crate::error::PiqueError;
use crate::region::{RegionEncoding, RegionEncodingType};

/// A quantized bin key. Signed so `binning::BinningSpecification`'s SIGBITS
/// quantizer (which biases negative values) has somewhere to put them
/// without a separate sign flag.
pub type BinKey = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct PartitionExtent {
    pub partition_id: u32,
    pub begin_rid: u64,
    pub end_rid: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GlobalMetadata {
    pub partition_count: u32,
    /// Sorted by `begin_rid`, monotone, non-overlapping.
    pub extents: Vec<PartitionExtent>,
}

impl GlobalMetadata {
    pub fn extent_of(&self, partition_id: u32) -> Option<&PartitionExtent> {
        self.extents.iter().find(|e| e.partition_id == partition_id)
    }

    /// `true` iff extents are internally valid (`begin <= end`), sorted by
    /// `begin_rid`, and no two overlap.
    pub fn is_consistent(&self) -> bool {
        self.extents.iter().all(|e| e.begin_rid <= e.end_rid)
            && self.extents.windows(2).all(|w| w[0].end_rid <= w[1].begin_rid)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PartitionMetadata {
    pub domain_size: u64,
    pub nbins: u32,
    pub index_encoding_id: u8,
    pub region_encoding_id: RegionEncodingType,
    pub nregions: u32,
    /// The partition's persisted `BinningSpecification`, serialized via
    /// `BinningSpecification::to_blob`. The query engine reconstructs the
    /// quantizer from this at query time rather than trusting any runtime
    /// configuration, so the same partition always answers the same
    /// predicate the same way regardless of how it's queried.
    pub binning_spec_blob: Vec<u8>,
}

pub trait IndexIo {
    fn global_metadata(&self) -> Result<GlobalMetadata, PiqueError>;
    fn get_partition(&self, partition_id: u32) -> Result<Box<dyn IndexPartitionIo>, PiqueError>;
}

pub trait IndexPartitionIo {
    fn partition_metadata(&self) -> &PartitionMetadata;
    fn read_region(&self, region_id: u32) -> Result<RegionEncoding, PiqueError>;
    /// Byte size of region payloads `[begin, end)`, for cost estimation
    /// without decoding them.
    fn regions_size_in_bytes(&self, begin: u32, end: u32) -> Result<u64, PiqueError>;
    fn bin_keys(&self) -> Result<&[BinKey], PiqueError>;
}
