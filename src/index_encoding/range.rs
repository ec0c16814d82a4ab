// index_encoding/range.rs
//
// region i = bins [0, i+1); nregions = nbins-1. Grounded on
// original_source/src/encoding/range/range-encoding.cpp. Complement is never
// cheaper than the direct difference, so only one plan is ever generated
// (matching the original, which ignores `prefer_complement` entirely).

use super::IndexEncodingScheme;
use crate::error::PiqueError;
use crate::region::SetOp;
use crate::region_math::{binary, complement, region_term, RegionMath};

pub struct RangeEncoding;

impl IndexEncodingScheme for RangeEncoding {
    fn nregions(&self, nbins: u32) -> u32 {
        nbins.saturating_sub(1)
    }

    fn range_query(
        &self,
        nbins: u32,
        lb_bin: u32,
        ub_bin: u32,
        _prefer_complement: bool,
    ) -> Result<RegionMath, PiqueError> {
        if ub_bin < nbins {
            let hi = region_term(ub_bin - 1);
            Ok(if lb_bin > 0 {
                binary(SetOp::Difference, hi, region_term(lb_bin - 1))
            } else {
                hi
            })
        } else {
            // ub_bin == nbins; lb_bin > 0 is guaranteed by the caller (else
            // this would be the uniform-FILLED case handled upstream).
            Ok(complement(region_term(lb_bin - 1)))
        }
    }
}
