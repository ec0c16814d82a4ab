// region/setops.rs
//
// Dispatch wrappers over RegionEncoding's per-variant binary/nary ops, plus
// the uniformity short-circuit rules that let the evaluator skip decoding
// entire subexpressions.

use super::{RegionEncoding, RegionEncodingType, SetOp, Uniformity};
use crate::error::PiqueError;

pub trait SetOperations: Send + Sync {
    fn accepts(&self, types: &[RegionEncodingType]) -> bool;
    fn unary_not(&self, r: &RegionEncoding) -> Result<RegionEncoding, PiqueError>;
    fn binary(&self, l: &RegionEncoding, r: &RegionEncoding, op: SetOp) -> Result<RegionEncoding, PiqueError>;
    fn nary(&self, regions: &[RegionEncoding], op: SetOp) -> Result<RegionEncoding, PiqueError>;

    fn inplace_unary_not(&self, r: RegionEncoding) -> Result<RegionEncoding, PiqueError> {
        self.unary_not(&r)
    }

    fn inplace_binary(&self, l: RegionEncoding, r: &RegionEncoding, op: SetOp) -> Result<RegionEncoding, PiqueError> {
        self.binary(&l, r, op)
    }

    fn inplace_nary(&self, regions: Vec<RegionEncoding>, op: SetOp) -> Result<RegionEncoding, PiqueError> {
        self.nary(&regions, op)
    }
}

/// Handles operands that all share the same concrete `RegionEncodingType`.
/// Symmetric N-ary ops (UNION/INTERSECTION/SYMMETRIC_DIFFERENCE) use a
/// min-heap over `serialized_size` to fold smallest-first; DIFFERENCE folds
/// left to right. CII gets its specialized k-way-merge N-ary UNION.
pub struct SameTypeSetOperations;

impl SetOperations for SameTypeSetOperations {
    fn accepts(&self, types: &[RegionEncodingType]) -> bool {
        !types.is_empty() && types.windows(2).all(|w| w[0] == w[1])
    }

    fn unary_not(&self, r: &RegionEncoding) -> Result<RegionEncoding, PiqueError> {
        Ok(r.not())
    }

    fn binary(&self, l: &RegionEncoding, r: &RegionEncoding, op: SetOp) -> Result<RegionEncoding, PiqueError> {
        l.binary_same_type(r, op)
    }

    fn nary(&self, regions: &[RegionEncoding], op: SetOp) -> Result<RegionEncoding, PiqueError> {
        if regions.is_empty() {
            return Err(PiqueError::UnsupportedOperandCombination(
                "nary requires at least one operand".into(),
            ));
        }
        if regions.len() == 1 {
            return Ok(regions[0].clone());
        }
        if op == SetOp::Union && regions.iter().all(|r| matches!(r, RegionEncoding::Cii(_))) {
            let ciis: Vec<super::CiiRegion> = regions
                .iter()
                .map(|r| match r {
                    RegionEncoding::Cii(c) => c.clone(),
                    _ => unreachable!(),
                })
                .collect();
            return Ok(RegionEncoding::Cii(super::CiiRegion::nary_union(&ciis)));
        }
        match op {
            SetOp::Difference => {
                let mut acc = regions[0].clone();
                for r in &regions[1..] {
                    acc = acc.binary_same_type(r, op)?;
                }
                Ok(acc)
            }
            _ => {
                // Huffman-style balancing: repeatedly combine the two
                // smallest-by-serialized-size operands.
                use std::cmp::Reverse;
                use std::collections::BinaryHeap;
                let mut heap: BinaryHeap<Reverse<(usize, usize)>> = BinaryHeap::new();
                let mut pool: Vec<Option<RegionEncoding>> = regions.iter().cloned().map(Some).collect();
                for (i, r) in regions.iter().enumerate() {
                    heap.push(Reverse((r.serialized_size(), i)));
                }
                loop {
                    let Reverse((_, i)) = heap.pop().unwrap();
                    if heap.is_empty() {
                        return Ok(pool[i].take().unwrap());
                    }
                    let Reverse((_, j)) = heap.pop().unwrap();
                    let a = pool[i].take().unwrap();
                    let b = pool[j].take().unwrap();
                    let combined = a.binary_same_type(&b, op)?;
                    let size = combined.serialized_size();
                    pool[i] = Some(combined);
                    heap.push(Reverse((size, i)));
                    let _ = j;
                }
            }
        }
    }
}

/// Wraps an ordered list of `SetOperations` impls; the first that accepts
/// the operand types handles the call.
pub struct PreferenceListSetOperations {
    impls: Vec<Box<dyn SetOperations>>,
}

impl PreferenceListSetOperations {
    pub fn new(impls: Vec<Box<dyn SetOperations>>) -> Self {
        Self { impls }
    }

    pub fn default_pipeline() -> Self {
        Self::new(vec![Box::new(SameTypeSetOperations)])
    }

    fn select(&self, types: &[RegionEncodingType]) -> Result<&dyn SetOperations, PiqueError> {
        self.impls
            .iter()
            .map(|b| b.as_ref())
            .find(|i| i.accepts(types))
            .ok_or_else(|| {
                PiqueError::UnsupportedOperandCombination(format!(
                    "no SetOperations impl accepts operand types {types:?}"
                ))
            })
    }
}

impl SetOperations for PreferenceListSetOperations {
    fn accepts(&self, types: &[RegionEncodingType]) -> bool {
        self.impls.iter().any(|i| i.accepts(types))
    }

    fn unary_not(&self, r: &RegionEncoding) -> Result<RegionEncoding, PiqueError> {
        self.select(&[r.encoding_type()])?.unary_not(r)
    }

    fn binary(&self, l: &RegionEncoding, r: &RegionEncoding, op: SetOp) -> Result<RegionEncoding, PiqueError> {
        self.select(&[l.encoding_type(), r.encoding_type()])?.binary(l, r, op)
    }

    fn nary(&self, regions: &[RegionEncoding], op: SetOp) -> Result<RegionEncoding, PiqueError> {
        let types: Vec<_> = regions.iter().map(|r| r.encoding_type()).collect();
        self.select(&types)?.nary(regions, op)
    }

    fn inplace_binary(&self, l: RegionEncoding, r: &RegionEncoding, op: SetOp) -> Result<RegionEncoding, PiqueError> {
        // The selected implementation is invoked and its result returned —
        // a prior dispatch implementation discarded this return value.
        let selected = self.select(&[l.encoding_type(), r.encoding_type()])?;
        selected.inplace_binary(l, r, op)
    }

    fn inplace_nary(&self, regions: Vec<RegionEncoding>, op: SetOp) -> Result<RegionEncoding, PiqueError> {
        let types: Vec<_> = regions.iter().map(|r| r.encoding_type()).collect();
        let selected = self.select(&types)?;
        selected.inplace_nary(regions, op)
    }
}

/// Routes to one of two implementations based on operand count relative to
/// a threshold (e.g. switch to an N-ary-optimized impl above some arity).
pub struct ArityThresholdSetOperations {
    threshold: usize,
    below: Box<dyn SetOperations>,
    at_or_above: Box<dyn SetOperations>,
}

impl ArityThresholdSetOperations {
    pub fn new(threshold: usize, below: Box<dyn SetOperations>, at_or_above: Box<dyn SetOperations>) -> Self {
        Self {
            threshold,
            below,
            at_or_above,
        }
    }

    fn pick(&self, arity: usize) -> &dyn SetOperations {
        if arity >= self.threshold {
            self.at_or_above.as_ref()
        } else {
            self.below.as_ref()
        }
    }
}

impl SetOperations for ArityThresholdSetOperations {
    fn accepts(&self, types: &[RegionEncodingType]) -> bool {
        self.pick(types.len()).accepts(types)
    }

    fn unary_not(&self, r: &RegionEncoding) -> Result<RegionEncoding, PiqueError> {
        self.pick(1).unary_not(r)
    }

    fn binary(&self, l: &RegionEncoding, r: &RegionEncoding, op: SetOp) -> Result<RegionEncoding, PiqueError> {
        self.pick(2).binary(l, r, op)
    }

    fn nary(&self, regions: &[RegionEncoding], op: SetOp) -> Result<RegionEncoding, PiqueError> {
        self.pick(regions.len()).nary(regions, op)
    }

    fn inplace_binary(&self, l: RegionEncoding, r: &RegionEncoding, op: SetOp) -> Result<RegionEncoding, PiqueError> {
        self.pick(2).inplace_binary(l, r, op)
    }

    fn inplace_nary(&self, regions: Vec<RegionEncoding>, op: SetOp) -> Result<RegionEncoding, PiqueError> {
        let arity = regions.len();
        self.pick(arity).inplace_nary(regions, op)
    }
}

/// Result of applying the uniformity short-circuit rules to an operand
/// list before invoking the general engine.
#[derive(Debug, Clone, PartialEq)]
pub enum Reduction {
    /// The whole op reduces to a uniform region; `true` = FILLED.
    Uniform(bool),
    /// Only the operands at these original indices (all MIXED) need to be
    /// materialized and combined with `op`; `complement_result` says whether
    /// the final combined region must then be complemented.
    Reduced {
        op: SetOp,
        operand_indices: Vec<usize>,
        complement_result: bool,
    },
}

pub fn simplify(op: SetOp, uniformities: &[Uniformity]) -> Reduction {
    match op {
        SetOp::Union => {
            if uniformities.iter().any(|u| *u == Uniformity::Filled) {
                return Reduction::Uniform(true);
            }
            let mixed = mixed_indices(uniformities);
            if mixed.is_empty() {
                return Reduction::Uniform(false);
            }
            Reduction::Reduced {
                op,
                operand_indices: mixed,
                complement_result: false,
            }
        }
        SetOp::Intersection => {
            if uniformities.is_empty() {
                return Reduction::Uniform(true);
            }
            if uniformities.iter().any(|u| *u == Uniformity::Empty) {
                return Reduction::Uniform(false);
            }
            let mixed = mixed_indices(uniformities);
            if mixed.is_empty() {
                return Reduction::Uniform(true);
            }
            Reduction::Reduced {
                op,
                operand_indices: mixed,
                complement_result: false,
            }
        }
        SetOp::Difference => {
            if uniformities.is_empty() {
                return Reduction::Uniform(false);
            }
            if uniformities[0] == Uniformity::Empty {
                return Reduction::Uniform(false);
            }
            if uniformities[0] == Uniformity::Filled {
                let tail = &uniformities[1..];
                if tail.iter().any(|u| *u == Uniformity::Filled) {
                    return Reduction::Uniform(false);
                }
                let mixed_tail: Vec<usize> = tail
                    .iter()
                    .enumerate()
                    .filter(|(_, u)| **u == Uniformity::Mixed)
                    .map(|(i, _)| i + 1)
                    .collect();
                if mixed_tail.is_empty() {
                    return Reduction::Uniform(true);
                }
                return Reduction::Reduced {
                    op: SetOp::Union,
                    operand_indices: mixed_tail,
                    complement_result: true,
                };
            }
            // First operand is MIXED: later EMPTY operands drop out, a
            // later FILLED operand forces the whole difference to EMPTY.
            let mut indices = vec![0usize];
            for (i, u) in uniformities.iter().enumerate().skip(1) {
                match u {
                    Uniformity::Empty => {}
                    Uniformity::Filled => return Reduction::Uniform(false),
                    Uniformity::Mixed => indices.push(i),
                }
            }
            Reduction::Reduced {
                op,
                operand_indices: indices,
                complement_result: false,
            }
        }
        SetOp::SymmetricDifference => {
            let mut complement = false;
            let mut mixed = Vec::new();
            for (i, u) in uniformities.iter().enumerate() {
                match u {
                    Uniformity::Filled => complement = !complement,
                    Uniformity::Empty => {}
                    Uniformity::Mixed => mixed.push(i),
                }
            }
            if mixed.is_empty() {
                return Reduction::Uniform(complement);
            }
            Reduction::Reduced {
                op,
                operand_indices: mixed,
                complement_result: complement,
            }
        }
    }
}

fn mixed_indices(uniformities: &[Uniformity]) -> Vec<usize> {
    uniformities
        .iter()
        .enumerate()
        .filter(|(_, u)| **u == Uniformity::Mixed)
        .map(|(i, _)| i)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::ii::IiRegion;

    #[test]
    fn test_union_with_filled_shortcircuits() {
        let r = simplify(
            SetOp::Union,
            &[Uniformity::Mixed, Uniformity::Filled, Uniformity::Empty],
        );
        assert_eq!(r, Reduction::Uniform(true));
    }

    #[test]
    fn test_intersection_empty_input_is_filled() {
        assert_eq!(simplify(SetOp::Intersection, &[]), Reduction::Uniform(true));
    }

    #[test]
    fn test_sym_diff_counts_filled_parity() {
        let r = simplify(
            SetOp::SymmetricDifference,
            &[Uniformity::Filled, Uniformity::Filled, Uniformity::Mixed],
        );
        assert_eq!(
            r,
            Reduction::Reduced {
                op: SetOp::SymmetricDifference,
                operand_indices: vec![2],
                complement_result: false,
            }
        );
    }

    #[test]
    fn test_nary_fold_equals_pairwise() {
        let a = RegionEncoding::Ii(IiRegion::from_sorted_rids(30, vec![1, 2, 3]));
        let b = RegionEncoding::Ii(IiRegion::from_sorted_rids(30, vec![2, 3, 4]));
        let c = RegionEncoding::Ii(IiRegion::from_sorted_rids(30, vec![10]));
        let ops = SameTypeSetOperations;
        let nary = ops.nary(&[a.clone(), b.clone(), c.clone()], SetOp::Union).unwrap();
        let folded = a.binary_same_type(&b, SetOp::Union).unwrap().binary_same_type(&c, SetOp::Union).unwrap();
        assert_eq!(nary.to_rids(0), folded.to_rids(0));
    }
}
