// index_encoding/equality.rs
//
// region i = bin i; nregions = nbins. Grounded on
// original_source/src/encoding/eq/eq-encoding.cpp: the primary plan unions
// the requested bin range directly, the complement plan unions the two
// excluded ranges and complements the result.

use super::IndexEncodingScheme;
use crate::error::PiqueError;
use crate::region::SetOp;
use crate::region_math::{complement, nary, region_term, RegionMath};

pub struct EqualityEncoding;

fn region_range(lo: u32, hi: u32) -> Vec<RegionMath> {
    (lo..hi).map(region_term).collect()
}

impl IndexEncodingScheme for EqualityEncoding {
    fn nregions(&self, nbins: u32) -> u32 {
        nbins
    }

    fn supports_dual_plan(&self) -> bool {
        true
    }

    fn range_query(
        &self,
        nbins: u32,
        lb_bin: u32,
        ub_bin: u32,
        prefer_complement: bool,
    ) -> Result<RegionMath, PiqueError> {
        if prefer_complement {
            let mut terms = region_range(0, lb_bin);
            terms.extend(region_range(ub_bin, nbins));
            Ok(complement(nary(SetOp::Union, terms)))
        } else {
            Ok(nary(SetOp::Union, region_range(lb_bin, ub_bin)))
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

    fn bin_regions(nbins: u32) -> MapSource {
        let mut map = HashMap::new();
        for i in 0..nbins {
            map.insert(i, RegionEncoding::Ii(IiRegion::from_sorted_rids(nbins as u64, vec![i])));
        }
        MapSource(map)
    }

    #[test]
    fn test_primary_and_complement_agree() {
        let nbins = 6;
        let source = bin_regions(nbins);
        let eq = EqualityEncoding;
        for (lb, ub) in [(1u32, 4u32), (0, 3), (2, 6)] {
            let primary = eq.range_query(nbins, lb, ub, false).unwrap();
            let alt = eq.range_query(nbins, lb, ub, true).unwrap();
            let r1 = evaluate(&primary, &source, &SameTypeSetOperations).unwrap();
            let r2 = evaluate(&alt, &source, &SameTypeSetOperations).unwrap();
            assert_eq!(r1.to_rids(0), r2.to_rids(0));
            assert_eq!(r1.to_rids(0), (lb as u64..ub as u64).collect::<Vec<_>>());
        }
    }
}
