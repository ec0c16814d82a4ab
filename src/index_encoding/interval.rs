// index_encoding/interval.rs
//
// region i covers bins [i, i + h) where h = ceil(nbins/2); nregions =
// nbins - h + 1. No original implementation exists for this scheme (only a
// generic `Interval` utility struct, unrelated to region-math generation),
// so this is a fresh design against the specification's formula: answer a
// query by a union of up to two regions and, when the range spans more than
// half the domain, by complementing the (necessarily short) excluded range
// instead.

use super::IndexEncodingScheme;
use crate::error::PiqueError;
use crate::region::SetOp;
use crate::region_math::{binary, complement, nary, region_term, RegionMath};

pub struct IntervalEncoding;

fn window_len(nbins: u32) -> u32 {
    nbins.div_ceil(2)
}

/// Expresses the single bin `b` as set algebra over window regions.
/// Window `i` covers `[i, i+h)`; `DIFFERENCE(region(i), region(i+1))`
/// isolates window `i`'s leftmost bin (`i`), and
/// `DIFFERENCE(region(i), region(i-1))` isolates window `i`'s rightmost
/// bin (`i+h-1`). Every bin is the leftmost bin of some window or the
/// rightmost bin of some other, so one of the two always applies.
fn bin_term(b: u32, h: u32, nregions: u32) -> RegionMath {
    if h == 1 {
        return region_term(b);
    }
    if nregions >= 2 && b + 1 < nregions {
        binary(SetOp::Difference, region_term(b), region_term(b + 1))
    } else {
        let i = b + 1 - h;
        binary(SetOp::Difference, region_term(i), region_term(i - 1))
    }
}

/// Handles a range already known to be `<= h` bins long.
fn short_range_query(lb_bin: u32, ub_bin: u32, nbins: u32, h: u32, nregions: u32) -> RegionMath {
    let len = ub_bin - lb_bin;
    if len == h && lb_bin + h <= nbins {
        return region_term(lb_bin);
    }
    if let Some(i_right) = ub_bin.checked_sub(h) {
        let i_left = lb_bin;
        if i_left + h <= nbins && i_right + h <= nbins {
            return if i_left == i_right {
                region_term(i_left)
            } else {
                binary(SetOp::Intersection, region_term(i_left), region_term(i_right))
            };
        }
    }
    nary(SetOp::Union, (lb_bin..ub_bin).map(|b| bin_term(b, h, nregions)).collect())
}

impl IndexEncodingScheme for IntervalEncoding {
    fn nregions(&self, nbins: u32) -> u32 {
        nbins - window_len(nbins) + 1
    }

    fn range_query(
        &self,
        nbins: u32,
        lb_bin: u32,
        ub_bin: u32,
        _prefer_complement: bool,
    ) -> Result<RegionMath, PiqueError> {
        let h = window_len(nbins);
        let nregions = self.nregions(nbins);
        if ub_bin - lb_bin > h {
            let mut pieces = Vec::new();
            if lb_bin > 0 {
                pieces.push(short_range_query(0, lb_bin, nbins, h, nregions));
            }
            if ub_bin < nbins {
                pieces.push(short_range_query(ub_bin, nbins, nbins, h, nregions));
            }
            let combined = if pieces.len() == 1 {
                pieces.pop().unwrap()
            } else {
                nary(SetOp::Union, pieces)
            };
            return Ok(complement(combined));
        }
        Ok(short_range_query(lb_bin, ub_bin, nbins, h, nregions))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::ii::IiRegion;
    use crate::region::setops::SameTypeSetOperations;
    use crate::region::RegionEncoding;
    use crate::region_math::{evaluate, RegionSource};
    use std::collections::HashMap;

    struct MapSource(HashMap<u32, RegionEncoding>);
    impl RegionSource for MapSource {
        fn read_region(&self, region_id: u32) -> Result<RegionEncoding, PiqueError> {
            Ok(self.0[&region_id].clone())
        }
    }

    fn window_regions(nbins: u32) -> MapSource {
        let h = window_len(nbins);
        let nregions = nbins - h + 1;
        let mut map = HashMap::new();
        for i in 0..nregions {
            map.insert(i, RegionEncoding::Ii(IiRegion::from_sorted_rids(nbins as u64, (i as u64..(i + h) as u64).collect())));
        }
        MapSource(map)
    }

    #[test]
    fn test_interval_query_matches_expected_bins_all_lengths() {
        let nbins = 9;
        let source = window_regions(nbins);
        let enc = IntervalEncoding;
        for lb in 0..nbins {
            for ub in (lb + 1)..=nbins {
                if lb == 0 && ub == nbins {
                    continue;
                }
                let math = enc.range_query(nbins, lb, ub, false).unwrap();
                let result = evaluate(&math, &source, &SameTypeSetOperations).unwrap();
                assert_eq!(
                    result.to_rids(0),
                    (lb as u64..ub as u64).collect::<Vec<_>>(),
                    "mismatch for [{lb},{ub})"
                );
            }
        }
    }
}
