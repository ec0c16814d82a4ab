// region/bitmap.rs
//
// Packed 64-bit-block bitmap. Binary ops are word-parallel; tail bits beyond
// domain_size are don't-care for output but masked before equality checks.

use super::{RegionEncoder, Uniformity};
use crate::error::PiqueError;

const BLOCK_BITS: u64 = 64;

#[derive(Clone, Debug)]
pub struct BitmapRegion {
    pub(crate) domain_size: u64,
    pub(crate) blocks: Vec<u64>,
}

impl PartialEq for BitmapRegion {
    fn eq(&self, other: &Self) -> bool {
        if self.domain_size != other.domain_size {
            return false;
        }
        self.masked_blocks() == other.masked_blocks()
    }
}

fn nblocks(domain_size: u64) -> usize {
    ((domain_size + BLOCK_BITS - 1) / BLOCK_BITS) as usize
}

fn tail_mask(domain_size: u64) -> u64 {
    let rem = domain_size % BLOCK_BITS;
    if rem == 0 {
        u64::MAX
    } else {
        (1u64 << rem) - 1
    }
}

impl BitmapRegion {
    pub fn domain_size(&self) -> u64 {
        self.domain_size
    }

    pub fn empty(domain_size: u64) -> Self {
        Self {
            domain_size,
            blocks: vec![0u64; nblocks(domain_size)],
        }
    }

    pub fn filled(domain_size: u64) -> Self {
        let mut r = Self::empty(domain_size);
        for b in r.blocks.iter_mut() {
            *b = u64::MAX;
        }
        r.mask_tail();
        r
    }

    fn mask_tail(&mut self) {
        if let Some(last) = self.blocks.last_mut() {
            *last &= tail_mask(self.domain_size);
        }
    }

    fn masked_blocks(&self) -> Vec<u64> {
        let mut b = self.blocks.clone();
        if let Some(last) = b.last_mut() {
            *last &= tail_mask(self.domain_size);
        }
        b
    }

    pub fn from_rids(domain_size: u64, rids: &[u32]) -> Self {
        let mut r = Self::empty(domain_size);
        for &rid in rids {
            r.set(rid as u64);
        }
        r
    }

    #[inline]
    pub fn get(&self, pos: u64) -> bool {
        (self.blocks[(pos / BLOCK_BITS) as usize] >> (pos % BLOCK_BITS)) & 1 == 1
    }

    #[inline]
    pub fn set(&mut self, pos: u64) {
        self.blocks[(pos / BLOCK_BITS) as usize] |= 1u64 << (pos % BLOCK_BITS);
    }

    #[inline]
    pub fn clear(&mut self, pos: u64) {
        self.blocks[(pos / BLOCK_BITS) as usize] &= !(1u64 << (pos % BLOCK_BITS));
    }

    pub fn popcount(&self) -> u64 {
        // 24-word unrolled popcount with a scalar tail, per the on-wire
        // contract; functionally equivalent to a plain fold but matches the
        // batch size the format calls out.
        let mut total = 0u64;
        let masked = self.masked_blocks();
        let mut chunks = masked.chunks_exact(24);
        for chunk in &mut chunks {
            for w in chunk {
                total += w.count_ones() as u64;
            }
        }
        for w in chunks.remainder() {
            total += w.count_ones() as u64;
        }
        total
    }

    pub fn uniformity(&self) -> Uniformity {
        let pc = self.popcount();
        if pc == 0 {
            Uniformity::Empty
        } else if pc == self.domain_size {
            Uniformity::Filled
        } else {
            Uniformity::Mixed
        }
    }

    pub fn to_rids(&self, offset: u64) -> Vec<u64> {
        let mut out = Vec::with_capacity(self.popcount() as usize);
        for i in 0..self.domain_size {
            if self.get(i) {
                out.push(i + offset);
            }
        }
        out
    }

    pub fn not(&self) -> Self {
        let mut out = self.clone();
        for b in out.blocks.iter_mut() {
            *b = !*b;
        }
        out.mask_tail();
        out
    }

    fn zip_with(&self, other: &Self, f: impl Fn(u64, u64) -> u64) -> Self {
        let mut out = Self::empty(self.domain_size);
        for i in 0..out.blocks.len() {
            out.blocks[i] = f(self.blocks[i], other.blocks[i]);
        }
        out.mask_tail();
        out
    }

    pub fn union(&self, other: &Self) -> Self {
        self.zip_with(other, |a, b| a | b)
    }

    pub fn intersection(&self, other: &Self) -> Self {
        self.zip_with(other, |a, b| a & b)
    }

    pub fn difference(&self, other: &Self) -> Self {
        self.zip_with(other, |a, b| a & !b)
    }

    pub fn symmetric_difference(&self, other: &Self) -> Self {
        self.zip_with(other, |a, b| a ^ b)
    }

    pub fn serialized_size(&self) -> usize {
        8 + 8 + 8 * self.blocks.len()
    }

    pub fn serialize(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.domain_size.to_le_bytes());
        out.extend_from_slice(&(self.blocks.len() as u64).to_le_bytes());
        for &b in &self.blocks {
            out.extend_from_slice(&b.to_le_bytes());
        }
    }

    pub fn deserialize(buf: &[u8]) -> Result<(Self, usize), PiqueError> {
        if buf.len() < 16 {
            return Err(PiqueError::TruncatedRegion {
                expected: 16,
                got: buf.len(),
            });
        }
        let domain_size = u64::from_le_bytes(buf[0..8].try_into().unwrap());
        let n = u64::from_le_bytes(buf[8..16].try_into().unwrap()) as usize;
        let need = 16 + 8 * n;
        if buf.len() < need {
            return Err(PiqueError::TruncatedRegion {
                expected: need,
                got: buf.len(),
            });
        }
        let mut blocks = Vec::with_capacity(n);
        for i in 0..n {
            let off = 16 + 8 * i;
            blocks.push(u64::from_le_bytes(buf[off..off + 8].try_into().unwrap()));
        }
        Ok((Self { domain_size, blocks }, need))
    }
}

#[derive(Debug)]
pub struct BitmapEncoder {
    region: BitmapRegion,
    current: u64,
}

impl BitmapEncoder {
    pub fn new(domain_size: u64) -> Self {
        Self {
            region: BitmapRegion::empty(domain_size),
            current: 0,
        }
    }
}

impl RegionEncoder for BitmapEncoder {
    fn current_position(&self) -> u64 {
        self.current
    }

    fn push_bits(&mut self, count: u64, bitval: bool) {
        if bitval {
            for p in self.current..self.current + count {
                self.region.set(p);
            }
        }
        self.current += count;
    }

    fn finalize(&mut self, total_elements: u64) {
        if self.current < total_elements {
            self.push_bits(total_elements - self.current, false);
        }
        self.region.mask_tail();
    }

    fn into_encoding(self) -> super::RegionEncoding {
        super::RegionEncoding::Bitmap(self.region)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_ops() {
        let a = BitmapRegion::from_rids(10, &[1, 2, 5]);
        let b = BitmapRegion::from_rids(10, &[2, 3, 5]);
        assert_eq!(a.union(&b).to_rids(0), vec![1, 2, 3, 5]);
        assert_eq!(a.intersection(&b).to_rids(0), vec![2, 5]);
        assert_eq!(a.difference(&b).to_rids(0), vec![1]);
        assert_eq!(a.symmetric_difference(&b).to_rids(0), vec![1, 3]);
    }

    #[test]
    fn test_not_involution_and_tail_mask() {
        let a = BitmapRegion::from_rids(70, &[0, 69]);
        assert_eq!(a.not().not(), a);
        assert_eq!(a.not().popcount(), 68);
    }

    #[test]
    fn test_popcount_matches_rid_count() {
        let a = BitmapRegion::from_rids(200, &(0..200).step_by(3).collect::<Vec<_>>());
        assert_eq!(a.popcount() as usize, a.to_rids(0).len());
    }
}
