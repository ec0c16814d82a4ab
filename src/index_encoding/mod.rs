// index_encoding/mod.rs
//
// Index-encoding schemes: each maps `nbins` bins to a fixed set of stored
// regions and a function from a bin range to a `RegionMath` expression over
// those regions. Grounded on PIQUE's original eq/range/hier/binarycomp
// encodings (see submodules); INTERVAL has no original counterpart and is
// designed fresh per spec, noted in its own module doc.

pub mod binary_component;
pub mod equality;
pub mod hierarchical;
pub mod interval;
pub mod range;

use crate::error::PiqueError;
use crate::region_math::RegionMath;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexEncodingId {
    Equality,
    Range,
    Hierarchical,
    BinaryComponent,
    Interval,
}

impl IndexEncodingId {
    pub fn wire_tag(self) -> u8 {
        match self {
            IndexEncodingId::Equality => 0,
            IndexEncodingId::Range => 1,
            IndexEncodingId::Hierarchical => 2,
            IndexEncodingId::BinaryComponent => 3,
            IndexEncodingId::Interval => 4,
        }
    }

    pub fn from_wire_tag(tag: u8) -> Result<Self, PiqueError> {
        match tag {
            0 => Ok(IndexEncodingId::Equality),
            1 => Ok(IndexEncodingId::Range),
            2 => Ok(IndexEncodingId::Hierarchical),
            3 => Ok(IndexEncodingId::BinaryComponent),
            4 => Ok(IndexEncodingId::Interval),
            other => Err(PiqueError::UnknownRegionEncoding(format!(
                "index encoding tag {other}"
            ))),
        }
    }

    pub fn scheme(self) -> &'static dyn IndexEncodingScheme {
        match self {
            IndexEncodingId::Equality => &equality::EqualityEncoding,
            IndexEncodingId::Range => &range::RangeEncoding,
            IndexEncodingId::Hierarchical => &hierarchical::HierarchicalEncoding,
            IndexEncodingId::BinaryComponent => &binary_component::BinaryComponentEncoding,
            IndexEncodingId::Interval => &interval::IntervalEncoding,
        }
    }
}

/// A scheme defining, for `nbins` bins, how many regions are stored and how
/// a bin range `[lb_bin, ub_bin)` is expressed as set algebra over them.
///
/// `range_query` callers must already have excluded the two trivial cases
/// the query engine special-cases before ever reaching a scheme:
/// `lb_bin == 0 && ub_bin == nbins` (uniform FILLED) and `lb_bin == ub_bin`
/// (uniform EMPTY). Schemes may assume `0 <= lb_bin < ub_bin <= nbins` and
/// not both bounds open.
pub trait IndexEncodingScheme {
    fn nregions(&self, nbins: u32) -> u32;

    /// Whether the engine should additionally try `prefer_complement=true`
    /// and cost both plans. Schemes for which complement never helps (or
    /// isn't generated) return `false` and ignore the flag.
    fn supports_dual_plan(&self) -> bool {
        false
    }

    fn range_query(
        &self,
        nbins: u32,
        lb_bin: u32,
        ub_bin: u32,
        prefer_complement: bool,
    ) -> Result<RegionMath, PiqueError>;
}

/// Generates every candidate plan for `[lb_bin, ub_bin)`: always the primary
/// plan, plus the complement plan when the scheme supports one and it
/// differs from the primary. The query engine costs each and picks the
/// cheapest, tie-breaking to the non-complement plan (see §4.H).
pub fn generate_alternatives(
    scheme: &dyn IndexEncodingScheme,
    nbins: u32,
    lb_bin: u32,
    ub_bin: u32,
) -> Result<Vec<(RegionMath, bool)>, PiqueError> {
    let primary = scheme.range_query(nbins, lb_bin, ub_bin, false)?;
    let mut plans = vec![(primary.clone(), false)];
    if scheme.supports_dual_plan() {
        let alt = scheme.range_query(nbins, lb_bin, ub_bin, true)?;
        if alt != primary {
            plans.push((alt, true));
        }
    }
    Ok(plans)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_tag_roundtrip() {
        for id in [
            IndexEncodingId::Equality,
            IndexEncodingId::Range,
            IndexEncodingId::Hierarchical,
            IndexEncodingId::BinaryComponent,
            IndexEncodingId::Interval,
        ] {
            assert_eq!(IndexEncodingId::from_wire_tag(id.wire_tag()).unwrap(), id);
        }
    }
}
