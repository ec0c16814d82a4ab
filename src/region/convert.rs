// region/convert.rs
//
// Converting between region encodings. The generic path decodes to RIDs and
// re-encodes through the target's `RegionEncoder`; CBLQ gets two specialized
// converters to bitmap (breadth-first over the wire arrays, depth-first over
// the reconstructed tree) since that's the conversion the query engine leans
// on most when a hierarchical region needs to be combined with a dense one.

use super::bitmap::BitmapRegion;
use super::cblq::CblqRegion;
use super::{RegionEncoder, RegionEncoding, RegionEncodingType, SetOp};
use crate::error::PiqueError;

pub trait RegionEncodingConverter {
    /// Produce a fresh region of `target` with the same membership as `region`.
    fn convert(&self, region: &RegionEncoding, target: RegionEncodingType) -> Result<RegionEncoding, PiqueError>;

    /// Combine `region`'s membership into `acc` (already of the target type)
    /// using `op`, without materializing an intermediate same-type copy of
    /// `region` first.
    fn inplace_convert(
        &self,
        acc: RegionEncoding,
        region: &RegionEncoding,
        op: SetOp,
    ) -> Result<RegionEncoding, PiqueError>;
}

pub struct StreamingConverter;

impl RegionEncodingConverter for StreamingConverter {
    fn convert(&self, region: &RegionEncoding, target: RegionEncodingType) -> Result<RegionEncoding, PiqueError> {
        if region.encoding_type() == target {
            return Ok(region.clone());
        }
        if let (RegionEncoding::Cblq(c), RegionEncodingType::Bitmap) = (region, target) {
            return Ok(RegionEncoding::Bitmap(cblq_to_bitmap_depth_first(c)));
        }
        let domain_size = region.domain_size();
        let rids = region.to_rids(0);
        let mut enc = super::new_encoder(target, domain_size);
        let mut prev = 0u64;
        for r in rids {
            if r > prev {
                enc.push_bits(r - prev, false);
            }
            enc.push_bits(1, true);
            prev = r + 1;
        }
        if prev < domain_size {
            enc.push_bits(domain_size - prev, false);
        }
        enc.finalize(domain_size);
        Ok(enc.into_encoding())
    }

    fn inplace_convert(
        &self,
        acc: RegionEncoding,
        region: &RegionEncoding,
        op: SetOp,
    ) -> Result<RegionEncoding, PiqueError> {
        if acc.domain_size() != region.domain_size() {
            return Err(PiqueError::DomainSizeMismatch {
                left: acc.domain_size(),
                right: region.domain_size(),
            });
        }
        let target = acc.encoding_type();
        if let RegionEncoding::Bitmap(mut bm) = acc {
            fuse_into_bitmap(&mut bm, region, op);
            return Ok(RegionEncoding::Bitmap(bm));
        }
        let converted = self.convert(region, target)?;
        acc.binary_same_type(&converted, op).or_else(|_| {
            // acc was itself just produced by `convert`; domain/type already
            // match so the only remaining failure mode is a CBLQ arity
            // mismatch, which inplace_convert callers should avoid.
            Err(PiqueError::UnsupportedOperandCombination(format!(
                "inplace_convert: cannot combine into {target:?}"
            )))
        })
    }
}

/// Folds `region`'s membership into `bm` via `op`, bit by bit, without ever
/// constructing a same-type temporary for `region`.
fn fuse_into_bitmap(bm: &mut BitmapRegion, region: &RegionEncoding, op: SetOp) {
    match op {
        SetOp::Union => {
            for r in region.to_rids(0) {
                bm.set(r);
            }
        }
        SetOp::Intersection => {
            let keep: std::collections::HashSet<u64> = region.to_rids(0).into_iter().collect();
            for r in 0..bm.domain_size() {
                if bm.get(r) && !keep.contains(&r) {
                    bm.clear(r);
                }
            }
        }
        SetOp::Difference => {
            for r in region.to_rids(0) {
                bm.clear(r);
            }
        }
        SetOp::SymmetricDifference => {
            for r in region.to_rids(0) {
                if bm.get(r) {
                    bm.clear(r);
                } else {
                    bm.set(r);
                }
            }
        }
    }
}

/// Walks the CBLQ tree via the normal public reconstruction path (depth
/// first over the materialized node tree) and sets bits in left-to-right
/// RID order.
pub fn cblq_to_bitmap_depth_first(region: &CblqRegion) -> BitmapRegion {
    let mut bm = BitmapRegion::empty(region.domain_size());
    for r in region.to_rids(0) {
        bm.set(r);
    }
    bm
}

/// Walks the flat breadth-first wire arrays directly: a FIFO queue of
/// (start, span) mirrors the same traversal order `linearize` used to
/// produce the arrays, so codes can be consumed strictly in sequence
/// without reconstructing a `CblqNode` tree.
pub fn cblq_to_bitmap_breadth_first(region: &CblqRegion) -> BitmapRegion {
    let domain_size = region.domain_size();
    let (codes, dense, fanout, depth) = region.raw_parts();
    let mut bm = BitmapRegion::empty(domain_size);
    let span0 = (fanout as u64).pow(depth);
    let mut queue: std::collections::VecDeque<(u64, u64)> = std::collections::VecDeque::new();
    queue.push_back((0, span0));
    let mut code_idx = 0usize;
    let mut dense_idx = 0usize;
    while let Some((start, span)) = queue.pop_front() {
        let code = codes[code_idx];
        code_idx += 1;
        match code {
            0 => {}
            1 => {
                for r in start..(start + span).min(domain_size) {
                    bm.set(r);
                }
            }
            3 => {
                let mask = dense[dense_idx];
                dense_idx += 1;
                for i in 0..fanout as u64 {
                    if (mask >> i) & 1 == 1 && start + i < domain_size {
                        bm.set(start + i);
                    }
                }
            }
            2 => {
                let child_span = span / fanout as u64;
                for c in 0..fanout as u64 {
                    queue.push_back((start + c * child_span, child_span));
                }
            }
            _ => unreachable!("invalid CBLQ code {code}"),
        }
    }
    bm
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::ii::IiRegion;

    #[test]
    fn test_generic_convert_roundtrips_membership() {
        let rids = vec![1, 2, 5, 9, 40];
        let ii = RegionEncoding::Ii(IiRegion::from_sorted_rids(64, rids.clone()));
        let converted = StreamingConverter.convert(&ii, RegionEncodingType::Bitmap).unwrap();
        assert_eq!(converted.to_rids(0), ii.to_rids(0));
    }

    #[test]
    fn test_cblq_bfs_and_dfs_converters_agree() {
        let c = CblqRegion::from_rids(2, 200, &[1, 2, 5, 9, 40, 100, 199]);
        let bfs = cblq_to_bitmap_breadth_first(&c);
        let dfs = cblq_to_bitmap_depth_first(&c);
        assert_eq!(bfs, dfs);
        assert_eq!(bfs.to_rids(0), c.to_rids(0));
    }

    #[test]
    fn test_fused_inplace_union() {
        let mut bm = BitmapRegion::from_rids(64, &[1, 2, 3]);
        let other = RegionEncoding::Ii(IiRegion::from_sorted_rids(64, vec![3, 4, 5]));
        fuse_into_bitmap(&mut bm, &other, SetOp::Union);
        assert_eq!(bm.to_rids(0), vec![1, 2, 3, 4, 5]);
    }
}
