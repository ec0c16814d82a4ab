pub mod binning;
pub mod config;
pub mod dataset;
pub mod error;
pub mod index_encoding;
pub mod io;
pub mod query;
pub mod region;
pub mod region_math;
pub mod stats;

pub use binning::BinningSpecification;
pub use config::{ComplementMode, EngineConfig};
pub use dataset::{Dataset, DatasetStream, IndexableDatatypeId};
pub use error::{ErrorClass, PiqueError};
pub use index_encoding::IndexEncodingId;
pub use query::{and, and_not, constraint, not, or, xor, ConstraintTerm, Database, Query, QueryCursor, QueryEngine, QueryTerm};
pub use region::{RegionEncoding, RegionEncodingType, SetOp};

#[cfg(test)]
pub(crate) mod test_utils;
