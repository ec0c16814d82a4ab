// region/cblq.rs
//
// Hierarchical 2^d-ary tree over the (already-linear, for this crate's RID
// domain) space. Each node is one of four states: empty, filled, mixed (an
// internal node with 2^d children), or mixed-dense (a node one level above
// the bit-granular leaves, holding an explicit bitmask of its 2^d children
// instead of recursing further). Encoded as a flat sequence of 2-bit codes
// in breadth-first order plus a side array of dense bitmasks.

use super::{RegionEncoder, SetOp, Uniformity};
use crate::error::PiqueError;

#[derive(Clone, Debug)]
enum CblqNode {
    Empty,
    Filled,
    Mixed(Vec<CblqNode>),
    MixedDense(u32),
}

fn fanout_of(d: u8) -> u32 {
    1u32 << d
}

/// Smallest depth such that fanout^depth >= domain_size, depth >= 1.
fn depth_for(domain_size: u64, fanout: u32) -> u32 {
    let mut depth = 1u32;
    let mut span = fanout as u64;
    while span < domain_size.max(1) {
        span *= fanout as u64;
        depth += 1;
    }
    depth
}

fn padded_size(fanout: u32, depth: u32) -> u64 {
    (fanout as u64).pow(depth)
}

fn build_node(
    level: u32,
    start: u64,
    span: u64,
    fanout: u32,
    depth: u32,
    member: &impl Fn(u64) -> bool,
) -> CblqNode {
    if level == depth - 1 {
        let mut mask = 0u32;
        let mut all_false = true;
        let mut all_true = true;
        for i in 0..fanout as u64 {
            if member(start + i) {
                mask |= 1 << i;
                all_false = false;
            } else {
                all_true = false;
            }
        }
        if all_false {
            CblqNode::Empty
        } else if all_true {
            CblqNode::Filled
        } else {
            CblqNode::MixedDense(mask)
        }
    } else {
        let child_span = span / fanout as u64;
        let mut children = Vec::with_capacity(fanout as usize);
        for c in 0..fanout as u64 {
            children.push(build_node(
                level + 1,
                start + c * child_span,
                child_span,
                fanout,
                depth,
                member,
            ));
        }
        if children.iter().all(|c| matches!(c, CblqNode::Empty)) {
            CblqNode::Empty
        } else if children.iter().all(|c| matches!(c, CblqNode::Filled)) {
            CblqNode::Filled
        } else {
            CblqNode::Mixed(children)
        }
    }
}

fn linearize(root: &CblqNode) -> (Vec<u8>, Vec<u32>) {
    let mut codes = Vec::new();
    let mut dense = Vec::new();
    let mut queue: std::collections::VecDeque<&CblqNode> = std::collections::VecDeque::new();
    queue.push_back(root);
    while let Some(node) = queue.pop_front() {
        match node {
            CblqNode::Empty => codes.push(0u8),
            CblqNode::Filled => codes.push(1u8),
            CblqNode::Mixed(children) => {
                codes.push(2u8);
                for c in children {
                    queue.push_back(c);
                }
            }
            CblqNode::MixedDense(mask) => {
                codes.push(3u8);
                dense.push(*mask);
            }
        }
    }
    (codes, dense)
}

/// Reconstructs the tree from its breadth-first code/dense arrays.
///
/// The codes for level L+1 are exactly the concatenation, in order, of the
/// child-code groups contributed by every Mixed node in level L (this is
/// what breadth-first production guarantees). So a first linear pass can
/// bucket the flat arrays by level without knowing the tree shape yet, and a
/// second, ordinary depth-first recursion over those per-level buckets
/// reconstructs the tree: a node's own code comes from its level's bucket in
/// left-to-right order, and a Mixed node's children come from the next
/// level's bucket, also in left-to-right order, which lines up exactly
/// because siblings are visited left-to-right at every level.
fn materialize(codes: &[u8], dense: &[u32], fanout: u32, _depth: u32) -> Result<CblqNode, PiqueError> {
    let trunc = || PiqueError::TruncatedRegion {
        expected: 1,
        got: 0,
    };

    let mut level_codes: Vec<&[u8]> = Vec::new();
    let mut level_dense: Vec<&[u32]> = Vec::new();
    let mut pos = 0usize;
    let mut dense_pos = 0usize;
    let mut count = 1usize;
    while count > 0 {
        if pos + count > codes.len() {
            return Err(trunc());
        }
        let slice = &codes[pos..pos + count];
        pos += count;
        let mixed_count = slice.iter().filter(|&&c| c == 2).count();
        let dense_count = slice.iter().filter(|&&c| c == 3).count();
        if dense_pos + dense_count > dense.len() {
            return Err(trunc());
        }
        level_dense.push(&dense[dense_pos..dense_pos + dense_count]);
        dense_pos += dense_count;
        level_codes.push(slice);
        count = mixed_count * fanout as usize;
    }

    let mut code_cursors = vec![0usize; level_codes.len()];
    let mut dense_cursors = vec![0usize; level_codes.len()];

    fn build(
        level: usize,
        level_codes: &[&[u8]],
        level_dense: &[&[u32]],
        code_cursors: &mut [usize],
        dense_cursors: &mut [usize],
        fanout: u32,
    ) -> Result<CblqNode, PiqueError> {
        let trunc = || PiqueError::TruncatedRegion {
            expected: 1,
            got: 0,
        };
        let bucket = level_codes.get(level).ok_or_else(trunc)?;
        let idx = code_cursors[level];
        let code = *bucket.get(idx).ok_or_else(trunc)?;
        code_cursors[level] += 1;
        match code {
            0 => Ok(CblqNode::Empty),
            1 => Ok(CblqNode::Filled),
            3 => {
                let didx = dense_cursors[level];
                let mask = *level_dense[level].get(didx).ok_or_else(trunc)?;
                dense_cursors[level] += 1;
                Ok(CblqNode::MixedDense(mask))
            }
            2 => {
                let mut children = Vec::with_capacity(fanout as usize);
                for _ in 0..fanout {
                    children.push(build(
                        level + 1,
                        level_codes,
                        level_dense,
                        code_cursors,
                        dense_cursors,
                        fanout,
                    )?);
                }
                Ok(CblqNode::Mixed(children))
            }
            _ => Err(trunc()),
        }
    }

    build(
        0,
        &level_codes,
        &level_dense,
        &mut code_cursors,
        &mut dense_cursors,
        fanout,
    )
}

fn uniform_of(v: bool) -> CblqNode {
    if v {
        CblqNode::Filled
    } else {
        CblqNode::Empty
    }
}

fn as_uniform(node: &CblqNode) -> Option<bool> {
    match node {
        CblqNode::Empty => Some(false),
        CblqNode::Filled => Some(true),
        _ => None,
    }
}

fn apply_op(op: SetOp, a: bool, b: bool) -> bool {
    match op {
        SetOp::Union => a || b,
        SetOp::Intersection => a && b,
        SetOp::Difference => a && !b,
        SetOp::SymmetricDifference => a != b,
    }
}

fn apply_op_mask(op: SetOp, a: u32, b: u32) -> u32 {
    match op {
        SetOp::Union => a | b,
        SetOp::Intersection => a & b,
        SetOp::Difference => a & !b,
        SetOp::SymmetricDifference => a ^ b,
    }
}

fn classify_mask(mask: u32, fanout: u32) -> CblqNode {
    let full = if fanout >= 32 { u32::MAX } else { (1u32 << fanout) - 1 };
    if mask == 0 {
        CblqNode::Empty
    } else if mask == full {
        CblqNode::Filled
    } else {
        CblqNode::MixedDense(mask)
    }
}

fn combine(a: &CblqNode, b: &CblqNode, level: u32, depth: u32, fanout: u32, op: SetOp) -> CblqNode {
    let is_dense_level = level == depth - 1;
    if let (Some(va), Some(vb)) = (as_uniform(a), as_uniform(b)) {
        return uniform_of(apply_op(op, va, vb));
    }
    if let Some(va) = as_uniform(a) {
        return combine_uniform(va, b, true, level, depth, fanout, op);
    }
    if let Some(vb) = as_uniform(b) {
        return combine_uniform(vb, a, false, level, depth, fanout, op);
    }
    if is_dense_level {
        let (ma, mb) = match (a, b) {
            (CblqNode::MixedDense(ma), CblqNode::MixedDense(mb)) => (*ma, *mb),
            _ => unreachable!("dense level must hold MixedDense nodes when not uniform"),
        };
        classify_mask(apply_op_mask(op, ma, mb), fanout)
    } else {
        let (ca, cb) = match (a, b) {
            (CblqNode::Mixed(ca), CblqNode::Mixed(cb)) => (ca, cb),
            _ => unreachable!("non-dense level must hold Mixed nodes when not uniform"),
        };
        let children: Vec<CblqNode> = ca
            .iter()
            .zip(cb.iter())
            .map(|(x, y)| combine(x, y, level + 1, depth, fanout, op))
            .collect();
        collapse(children)
    }
}

fn combine_uniform(
    v: bool,
    node: &CblqNode,
    uniform_is_left: bool,
    level: u32,
    depth: u32,
    fanout: u32,
    op: SetOp,
) -> CblqNode {
    let is_dense_level = level == depth - 1;
    if is_dense_level {
        let mask = match node {
            CblqNode::MixedDense(m) => *m,
            _ => unreachable!(),
        };
        let full = if fanout >= 32 { u32::MAX } else { (1u32 << fanout) - 1 };
        let vmask = if v { full } else { 0 };
        let combined = if uniform_is_left {
            apply_op_mask(op, vmask, mask)
        } else {
            apply_op_mask(op, mask, vmask)
        };
        classify_mask(combined, fanout)
    } else {
        let children = match node {
            CblqNode::Mixed(c) => c,
            _ => unreachable!(),
        };
        let out: Vec<CblqNode> = children
            .iter()
            .map(|c| combine_uniform(v, c, uniform_is_left, level + 1, depth, fanout, op))
            .collect();
        collapse(out)
    }
}

fn collapse(children: Vec<CblqNode>) -> CblqNode {
    if children.iter().all(|c| matches!(c, CblqNode::Empty)) {
        CblqNode::Empty
    } else if children.iter().all(|c| matches!(c, CblqNode::Filled)) {
        CblqNode::Filled
    } else {
        CblqNode::Mixed(children)
    }
}

fn not_node(node: &CblqNode) -> CblqNode {
    match node {
        CblqNode::Empty => CblqNode::Filled,
        CblqNode::Filled => CblqNode::Empty,
        CblqNode::MixedDense(mask) => CblqNode::MixedDense(!mask),
        CblqNode::Mixed(children) => CblqNode::Mixed(children.iter().map(not_node).collect()),
    }
}

fn collect_rids(node: &CblqNode, start: u64, span: u64, fanout: u32, depth: u32, level: u32, out: &mut Vec<u64>) {
    match node {
        CblqNode::Empty => {}
        CblqNode::Filled => out.extend(start..start + span),
        CblqNode::MixedDense(mask) => {
            for i in 0..fanout as u64 {
                if (mask >> i) & 1 == 1 {
                    out.push(start + i);
                }
            }
        }
        CblqNode::Mixed(children) => {
            let child_span = span / fanout as u64;
            for (c, child) in children.iter().enumerate() {
                collect_rids(
                    child,
                    start + c as u64 * child_span,
                    child_span,
                    fanout,
                    depth,
                    level + 1,
                    out,
                );
            }
        }
    }
}

#[derive(Clone, Debug)]
pub struct CblqRegion {
    pub(crate) domain_size: u64,
    pub(crate) d: u8,
    depth: u32,
    codes: Vec<u8>,
    dense: Vec<u32>,
}

impl PartialEq for CblqRegion {
    fn eq(&self, other: &Self) -> bool {
        self.domain_size == other.domain_size && self.d == other.d && self.to_rids(0) == other.to_rids(0)
    }
}

impl CblqRegion {
    pub fn domain_size(&self) -> u64 {
        self.domain_size
    }

    pub fn arity(&self) -> u8 {
        self.d
    }

    fn fanout(&self) -> u32 {
        fanout_of(self.d)
    }

    fn root(&self) -> Result<CblqNode, PiqueError> {
        materialize(&self.codes, &self.dense, self.fanout(), self.depth)
    }

    /// Raw breadth-first wire arrays, for converters that want to walk the
    /// tree without reconstructing a `CblqNode`.
    pub(crate) fn raw_parts(&self) -> (&[u8], &[u32], u32, u32) {
        (&self.codes, &self.dense, self.fanout(), self.depth)
    }

    pub fn from_rids(d: u8, domain_size: u64, rids: &[u32]) -> Self {
        let fanout = fanout_of(d);
        let depth = depth_for(domain_size, fanout);
        let span = padded_size(fanout, depth);
        let set: std::collections::HashSet<u64> = rids.iter().map(|&r| r as u64).collect();
        let member = |i: u64| i < domain_size && set.contains(&i);
        let root = build_node(0, 0, span, fanout, depth, &member);
        let (codes, dense) = linearize(&root);
        Self {
            domain_size,
            d,
            depth,
            codes,
            dense,
        }
    }

    pub fn empty(d: u8, domain_size: u64) -> Self {
        Self::from_rids(d, domain_size, &[])
    }

    pub fn filled(d: u8, domain_size: u64) -> Self {
        let all: Vec<u32> = (0..domain_size as u32).collect();
        Self::from_rids(d, domain_size, &all)
    }

    pub fn to_rids(&self, offset: u64) -> Vec<u64> {
        let root = self.root().expect("corrupt CBLQ tree");
        let fanout = self.fanout();
        let span = padded_size(fanout, self.depth);
        let mut out = Vec::new();
        collect_rids(&root, 0, span, fanout, self.depth, 0, &mut out);
        out.retain(|&r| r < self.domain_size);
        out.into_iter().map(|r| r + offset).collect()
    }

    pub fn uniformity(&self) -> Uniformity {
        let len = self.to_rids(0).len() as u64;
        if len == 0 {
            Uniformity::Empty
        } else if len == self.domain_size {
            Uniformity::Filled
        } else {
            Uniformity::Mixed
        }
    }

    pub fn not(&self) -> Self {
        let root = self.root().expect("corrupt CBLQ tree");
        let flipped = not_node(&root);
        let (codes, dense) = linearize(&flipped);
        Self {
            domain_size: self.domain_size,
            d: self.d,
            depth: self.depth,
            codes,
            dense,
        }
    }

    fn binary(&self, other: &Self, op: SetOp) -> Self {
        debug_assert_eq!(self.domain_size, other.domain_size);
        debug_assert_eq!(self.d, other.d);
        let fanout = self.fanout();
        let a = self.root().expect("corrupt CBLQ tree");
        let b = other.root().expect("corrupt CBLQ tree");
        let result = combine(&a, &b, 0, self.depth, fanout, op);
        let (codes, dense) = linearize(&result);
        Self {
            domain_size: self.domain_size,
            d: self.d,
            depth: self.depth,
            codes,
            dense,
        }
    }

    pub fn union(&self, other: &Self) -> Self {
        self.binary(other, SetOp::Union)
    }

    pub fn intersection(&self, other: &Self) -> Self {
        self.binary(other, SetOp::Intersection)
    }

    pub fn difference(&self, other: &Self) -> Self {
        self.binary(other, SetOp::Difference)
    }

    pub fn symmetric_difference(&self, other: &Self) -> Self {
        self.binary(other, SetOp::SymmetricDifference)
    }

    pub fn serialized_size(&self) -> usize {
        1 + 1 + 8 + 8 + self.codes.len() + 4 * self.dense.len()
    }

    pub fn serialize(&self, out: &mut Vec<u8>) {
        out.push(self.d);
        out.extend_from_slice(&self.domain_size.to_le_bytes());
        out.extend_from_slice(&(self.codes.len() as u64).to_le_bytes());
        out.extend_from_slice(&self.codes);
        out.extend_from_slice(&(self.dense.len() as u64).to_le_bytes());
        for &m in &self.dense {
            out.extend_from_slice(&m.to_le_bytes());
        }
    }

    pub fn deserialize(buf: &[u8]) -> Result<(Self, usize), PiqueError> {
        if buf.len() < 1 + 8 + 8 {
            return Err(PiqueError::TruncatedRegion {
                expected: 17,
                got: buf.len(),
            });
        }
        let d = buf[0];
        let domain_size = u64::from_le_bytes(buf[1..9].try_into().unwrap());
        let ncodes = u64::from_le_bytes(buf[9..17].try_into().unwrap()) as usize;
        let mut off = 17;
        if buf.len() < off + ncodes {
            return Err(PiqueError::TruncatedRegion {
                expected: off + ncodes,
                got: buf.len(),
            });
        }
        let codes = buf[off..off + ncodes].to_vec();
        off += ncodes;
        if buf.len() < off + 8 {
            return Err(PiqueError::TruncatedRegion {
                expected: off + 8,
                got: buf.len(),
            });
        }
        let ndense = u64::from_le_bytes(buf[off..off + 8].try_into().unwrap()) as usize;
        off += 8;
        let need = off + 4 * ndense;
        if buf.len() < need {
            return Err(PiqueError::TruncatedRegion {
                expected: need,
                got: buf.len(),
            });
        }
        let mut dense = Vec::with_capacity(ndense);
        for i in 0..ndense {
            let o = off + 4 * i;
            dense.push(u32::from_le_bytes(buf[o..o + 4].try_into().unwrap()));
        }
        let depth = depth_for(domain_size, fanout_of(d));
        Ok((
            Self {
                domain_size,
                d,
                depth,
                codes,
                dense,
            },
            need,
        ))
    }
}

#[derive(Debug)]
pub struct CblqEncoder {
    d: u8,
    domain_size: u64,
    current: u64,
    rids: Vec<u32>,
}

impl CblqEncoder {
    pub fn new(d: u8, domain_size: u64) -> Self {
        Self {
            d,
            domain_size,
            current: 0,
            rids: Vec::new(),
        }
    }
}

impl RegionEncoder for CblqEncoder {
    fn current_position(&self) -> u64 {
        self.current
    }

    fn push_bits(&mut self, count: u64, bitval: bool) {
        if bitval {
            for r in self.current..self.current + count {
                self.rids.push(r as u32);
            }
        }
        self.current += count;
    }

    fn finalize(&mut self, total_elements: u64) {
        if self.current < total_elements {
            self.push_bits(total_elements - self.current, false);
        }
    }

    fn into_encoding(self) -> super::RegionEncoding {
        super::RegionEncoding::Cblq(CblqRegion::from_rids(self.d, self.domain_size, &self.rids))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        for d in 1..=4u8 {
            let rids: Vec<u32> = vec![0, 3, 7, 8, 15, 16, 63];
            let r = CblqRegion::from_rids(d, 80, &rids);
            let mut sorted = rids.clone();
            sorted.sort_unstable();
            assert_eq!(r.to_rids(0), sorted.into_iter().map(|x| x as u64).collect::<Vec<_>>());
        }
    }

    #[test]
    fn test_not_involution() {
        let r = CblqRegion::from_rids(2, 64, &[1, 2, 3, 40]);
        assert_eq!(r.not().not(), r);
    }

    #[test]
    fn test_set_ops_against_naive() {
        let a = CblqRegion::from_rids(2, 64, &[1, 2, 5, 9, 40]);
        let b = CblqRegion::from_rids(2, 64, &[2, 3, 5, 10, 40]);
        let union: std::collections::BTreeSet<u64> = a.to_rids(0).into_iter().chain(b.to_rids(0)).collect();
        assert_eq!(
            a.union(&b).to_rids(0),
            union.into_iter().collect::<Vec<_>>()
        );
        let inter: std::collections::BTreeSet<u64> = a
            .to_rids(0)
            .into_iter()
            .filter(|x| b.to_rids(0).contains(x))
            .collect();
        assert_eq!(
            a.intersection(&b).to_rids(0),
            inter.into_iter().collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_serialize_roundtrip() {
        let r = CblqRegion::from_rids(3, 512, &(0..512).step_by(5).collect::<Vec<_>>());
        let mut buf = Vec::new();
        r.serialize(&mut buf);
        let (decoded, used) = CblqRegion::deserialize(&buf).unwrap();
        assert_eq!(used, buf.len());
        assert_eq!(decoded.to_rids(0), r.to_rids(0));
    }
}
