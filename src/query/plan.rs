// query/plan.rs
//
// Turns a constraint's bin range into the cheapest `RegionMath` plan for a
// given partition, per the `ComplementMode` policy. Grounded on
// original_source/include/pique/query/simple-query-engine.hpp's
// `compute_constraint_evaluation_cost` and
// `compute_optimal_region_math_for_bin_range`.

use crate::config::ComplementMode;
use crate::error::PiqueError;
use crate::index_encoding::{self, IndexEncodingId};
use crate::io::IndexPartitionIo;
use crate::region_math::{RegionMath, RegionMathTerm};

/// A plan chosen for one constraint at one partition: the math to evaluate,
/// whether it was the complement alternative, and the costs of every
/// alternative considered (primary first), for `stats::ConstraintTermEvalStats`.
#[derive(Debug, Clone)]
pub struct ConstraintPlan {
    pub math: RegionMath,
    pub is_complement: bool,
    pub candidate_costs: Vec<u64>,
}

/// Sum of the serialized sizes of every region a plan's `RegionTerm`s name,
/// the same proxy the original uses before any region is actually decoded:
/// bytes on disk approximate bytes of work to decode and combine.
fn estimate_cost(math: &RegionMath, partition: &dyn IndexPartitionIo) -> Result<u64, PiqueError> {
    let mut total = 0u64;
    for term in math {
        if let RegionMathTerm::RegionTerm(id) = term {
            total += partition.regions_size_in_bytes(*id, *id + 1)?;
        }
    }
    Ok(total)
}

/// Builds the cheapest plan for bin range `[lb_bin, ub_bin)` under
/// `scheme`, honoring `complement_mode`:
/// - `Never` never even generates the complement alternative.
/// - `Always` takes the complement alternative whenever the scheme offers
///   one, regardless of cost.
/// - `Auto` costs every alternative and picks the cheapest, tie-breaking to
///   the non-complement plan (first generated).
pub fn compute_optimal_region_math_for_bin_range(
    index_encoding_id: IndexEncodingId,
    nbins: u32,
    lb_bin: u32,
    ub_bin: u32,
    complement_mode: ComplementMode,
    partition: &dyn IndexPartitionIo,
) -> Result<ConstraintPlan, PiqueError> {
    let scheme = index_encoding_id.scheme();
    let want_complement = complement_mode != ComplementMode::Never;
    let alternatives = if want_complement {
        index_encoding::generate_alternatives(scheme, nbins, lb_bin, ub_bin)?
    } else {
        vec![(scheme.range_query(nbins, lb_bin, ub_bin, false)?, false)]
    };

    if complement_mode == ComplementMode::Always {
        if let Some((math, is_complement)) = alternatives.iter().find(|(_, c)| *c) {
            return Ok(ConstraintPlan {
                math: math.clone(),
                is_complement: *is_complement,
                candidate_costs: Vec::new(),
            });
        }
    }

    let mut costs = Vec::with_capacity(alternatives.len());
    let mut best: Option<(usize, u64)> = None;
    for (i, (math, _)) in alternatives.iter().enumerate() {
        let cost = estimate_cost(math, partition)?;
        costs.push(cost);
        if best.map(|(_, b)| cost < b).unwrap_or(true) {
            best = Some((i, cost));
        }
    }
    let (best_idx, _) = best.expect("generate_alternatives always yields at least the primary plan");
    let (math, is_complement) = alternatives[best_idx].clone();
    Ok(ConstraintPlan {
        math,
        is_complement,
        candidate_costs: costs,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binning::BinningSpecification;
    use crate::io::{BinKey, PartitionMetadata};
    use crate::region::{make_null_region, RegionEncoding, RegionEncodingType};

    struct FakePartition {
        metadata: PartitionMetadata,
        sizes: Vec<u64>,
    }

    impl IndexPartitionIo for FakePartition {
        fn partition_metadata(&self) -> &PartitionMetadata {
            &self.metadata
        }
        fn read_region(&self, _region_id: u32) -> Result<RegionEncoding, PiqueError> {
            Ok(make_null_region(RegionEncodingType::Ii, 100))
        }
        fn regions_size_in_bytes(&self, begin: u32, _end: u32) -> Result<u64, PiqueError> {
            Ok(self.sizes[begin as usize])
        }
        fn bin_keys(&self) -> Result<&[BinKey], PiqueError> {
            Ok(&[])
        }
    }

    fn fake_partition(nregions: u32) -> FakePartition {
        FakePartition {
            metadata: PartitionMetadata {
                domain_size: 100,
                nbins: 5,
                index_encoding_id: IndexEncodingId::Equality.wire_tag(),
                region_encoding_id: RegionEncodingType::Ii,
                nregions,
                binning_spec_blob: BinningSpecification::precision(0).to_blob().unwrap(),
            },
            sizes: vec![10; nregions as usize],
        }
    }

    #[test]
    fn test_equality_never_mode_has_single_candidate() {
        let partition = fake_partition(5);
        let plan = compute_optimal_region_math_for_bin_range(
            IndexEncodingId::Equality,
            5,
            1,
            3,
            ComplementMode::Never,
            &partition,
        )
        .unwrap();
        assert_eq!(plan.candidate_costs.len(), 1);
        assert!(!plan.is_complement);
    }

    #[test]
    fn test_equality_always_mode_prefers_complement_when_available() {
        let partition = fake_partition(5);
        let plan = compute_optimal_region_math_for_bin_range(
            IndexEncodingId::Equality,
            5,
            1,
            2,
            ComplementMode::Always,
            &partition,
        )
        .unwrap();
        assert!(plan.is_complement);
    }

    #[test]
    fn test_auto_mode_picks_cheapest_candidate() {
        let mut partition = fake_partition(5);
        // Make the direct range [1, 4) (3 regions) pricier than its
        // complement (2 regions: bin 0 and bin 4) so AUTO should switch.
        partition.sizes = vec![1, 1000, 1000, 1000, 1];
        let plan = compute_optimal_region_math_for_bin_range(
            IndexEncodingId::Equality,
            5,
            1,
            4,
            ComplementMode::Auto,
            &partition,
        )
        .unwrap();
        assert_eq!(plan.candidate_costs.len(), 2);
        let min = *plan.candidate_costs.iter().min().unwrap();
        let chosen = if plan.is_complement {
            plan.candidate_costs[1]
        } else {
            plan.candidate_costs[0]
        };
        assert_eq!(chosen, min);
        assert!(plan.is_complement);
    }
}
