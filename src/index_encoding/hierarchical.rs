// index_encoding/hierarchical.rs
//
// region i covers bins [i - lowbit(i+1) + 1, i+1); nregions = nbins-1.
// Grounded on original_source/src/encoding/hier/hier-encoding.cpp: a prefix
// [0, bound) decomposes into a Fenwick-style sum of these regions by
// repeatedly peeling off the lowest set bit of `bound`; the query result is
// the symmetric difference of the ub- and lb-decompositions, split back into
// an additive union and a subtractive union.

use super::IndexEncodingScheme;
use crate::error::PiqueError;
use crate::region::SetOp;
use crate::region_math::{complement, nary, region_term, RegionMath};
use std::collections::BTreeSet;

pub struct HierarchicalEncoding;

/// Decomposes the prefix `[0, bound)` into the set of region IDs whose union
/// equals it, via repeated peeling of `bound`'s lowest set bit.
fn decompose_prefix(bound: u32) -> BTreeSet<u32> {
    let mut regions = BTreeSet::new();
    let mut remaining = bound;
    let mut bitmask = 1u32;
    while remaining != 0 {
        if remaining & bitmask != 0 {
            regions.insert(remaining - 1);
            remaining -= bitmask;
        }
        bitmask <<= 1;
    }
    regions
}

impl IndexEncodingScheme for HierarchicalEncoding {
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
        let has_additive = ub_bin < nbins;
        let has_subtractive = lb_bin > 0;

        let mut additive = if has_additive { decompose_prefix(ub_bin) } else { BTreeSet::new() };
        let mut subtractive = if has_subtractive { decompose_prefix(lb_bin) } else { BTreeSet::new() };

        if has_additive && has_subtractive {
            let common: Vec<u32> = additive.intersection(&subtractive).copied().collect();
            for r in common {
                additive.remove(&r);
                subtractive.remove(&r);
            }
        }

        if has_additive {
            let add_union = nary(SetOp::Union, additive.iter().copied().map(region_term).collect());
            if has_subtractive {
                let mut operands = vec![add_union];
                operands.extend(subtractive.iter().copied().map(region_term));
                Ok(nary(SetOp::Difference, operands))
            } else {
                Ok(add_union)
            }
        } else {
            // ub_bin == nbins; has_subtractive is guaranteed by the caller.
            let sub_union = nary(SetOp::Union, subtractive.iter().copied().map(region_term).collect());
            Ok(complement(sub_union))
        }
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

    fn lowbit(x: u32) -> u32 {
        x & x.wrapping_neg()
    }

    fn hierarchical_regions(nbins: u32) -> MapSource {
        let mut map = HashMap::new();
        for i in 0..nbins - 1 {
            let lo = i + 1 - lowbit(i + 1);
            map.insert(i, RegionEncoding::Ii(IiRegion::from_sorted_rids(nbins as u64, (lo..=i).collect())));
        }
        MapSource(map)
    }

    #[test]
    fn test_hierarchical_query_matches_expected_bins() {
        let nbins = 8;
        let source = hierarchical_regions(nbins);
        let h = HierarchicalEncoding;
        for (lb, ub) in [(1u32, 4u32), (0, 3), (2, 8), (3, 5)] {
            let math = h.range_query(nbins, lb, ub, false).unwrap();
            let result = evaluate(&math, &source, &SameTypeSetOperations).unwrap();
            assert_eq!(result.to_rids(0), (lb as u64..ub as u64).collect::<Vec<_>>());
        }
    }
}
