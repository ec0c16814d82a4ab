// index_encoding/binary_component.rs
//
// region i (layer i) = every bin whose bit i is 0; nregions = ceil(log2(nbins)).
// Grounded on original_source/src/encoding/binarycomp/binarycomp-encoding.cpp:
// `fold_bound` walks `bound`'s bits from the MSB down, the standard
// bit-sliced decomposition of a prefix range into per-bit-plane terms.
//
// The original ignores `prefer_complement` for this scheme; this
// implementation honors it per the specification's call for a dual plan,
// generalizing EQUALITY's complement-of-excluded-ranges shape onto
// BINARY_COMPONENT's own prefix primitive.

use super::IndexEncodingScheme;
use crate::error::PiqueError;
use crate::region::SetOp;
use crate::region_math::{binary, complement, region_term, RegionMath};

pub struct BinaryComponentEncoding;

fn num_bit_levels(nbins: u32) -> u32 {
    let mut binbits = nbins.saturating_sub(1);
    let mut levels = 0;
    while binbits != 0 {
        binbits >>= 1;
        levels += 1;
    }
    levels
}

/// Builds the expression for prefix `[0, bound)` by walking `bound`'s bits
/// from the MSB down, matching the standard bit-sliced range decomposition:
/// at each 1-bit, every value whose higher bits match `bound` so far and
/// whose bit at this position is clear is entirely below `bound`, so that
/// layer is unioned into the result (intersected first with whatever
/// higher-bit match is still in effect); matching then continues with this
/// bit set to 1, narrowing by the layer's complement. At each 0-bit, only
/// the narrowing continues (intersect the layer in), since no value with a
/// 1 here and matching higher bits can be below `bound`.
fn fold_bound(bound: u32, levels: u32) -> RegionMath {
    let mut result: Option<RegionMath> = None;
    let mut matched: Option<RegionMath> = None;
    for i in (0..levels).rev() {
        let bit_set = bound & (1 << i) != 0;
        let layer = region_term(i);
        if bit_set {
            let contribution = match &matched {
                None => layer.clone(),
                Some(m) => binary(SetOp::Intersection, m.clone(), layer.clone()),
            };
            result = Some(match result {
                None => contribution,
                Some(r) => binary(SetOp::Union, r, contribution),
            });
            let not_layer = complement(layer);
            matched = Some(match matched {
                None => not_layer,
                Some(m) => binary(SetOp::Intersection, m, not_layer),
            });
        } else {
            matched = Some(match matched {
                None => layer,
                Some(m) => binary(SetOp::Intersection, m, layer),
            });
        }
    }
    result.unwrap_or_default()
}

impl IndexEncodingScheme for BinaryComponentEncoding {
    fn nregions(&self, nbins: u32) -> u32 {
        num_bit_levels(nbins)
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
        let levels = num_bit_levels(nbins);
        let has_additive = ub_bin < nbins;
        let has_subtractive = lb_bin > 0;

        if prefer_complement && has_additive && has_subtractive {
            // COMPLEMENT(prefix(lb) UNION complement(prefix(ub))), i.e. the
            // complement of [0,lb) ∪ [ub,nbins) — same shape as EQUALITY's
            // complement plan, built from this scheme's own prefix primitive.
            let lb_prefix = fold_bound(lb_bin, levels);
            let ub_tail = complement(fold_bound(ub_bin, levels));
            return Ok(complement(binary(SetOp::Union, lb_prefix, ub_tail)));
        }

        if has_additive {
            let prefix_ub = fold_bound(ub_bin, levels);
            Ok(if has_subtractive {
                binary(SetOp::Difference, prefix_ub, fold_bound(lb_bin, levels))
            } else {
                prefix_ub
            })
        } else {
            // ub_bin == nbins; has_subtractive is guaranteed by the caller.
            Ok(complement(fold_bound(lb_bin, levels)))
        }
    }
}
