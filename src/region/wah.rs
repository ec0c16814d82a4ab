// region/wah.rs
//
// Word-aligned hybrid run-length bitmap. Wire format is this crate's own
// (the upstream format is tied to a specific C++ library's internal layout
// and isn't reusable, see DESIGN.md): 32-bit words, MSB tags a word as
// literal (0, low 31 bits are data) or fill (1, bit 30 is the fill value,
// bits 29..0 are a run length in 31-bit groups).

use super::bitmap::BitmapRegion;
use super::{RegionEncoder, Uniformity};
use crate::error::PiqueError;

const GROUP_BITS: u32 = 31;
const MAX_RUN: u64 = 0x3FFF_FFFF;

#[inline]
fn is_fill(word: u32) -> bool {
    word & 0x8000_0000 != 0
}

#[inline]
fn fill_value(word: u32) -> bool {
    word & 0x4000_0000 != 0
}

#[inline]
fn fill_run(word: u32) -> u64 {
    (word & 0x3FFF_FFFF) as u64
}

#[inline]
fn literal_bits(word: u32) -> u32 {
    word & 0x7FFF_FFFF
}

#[inline]
fn make_literal(bits: u32) -> u32 {
    bits & 0x7FFF_FFFF
}

#[inline]
fn make_fill(bitval: bool, run: u64) -> u32 {
    debug_assert!(run <= MAX_RUN);
    0x8000_0000 | ((bitval as u32) << 30) | (run as u32 & 0x3FFF_FFFF)
}

#[derive(Clone, Debug, PartialEq)]
pub struct WahRegion {
    pub(crate) domain_size: u64,
    pub(crate) words: Vec<u32>,
    pub(crate) nset: u64,
}

impl WahRegion {
    pub fn domain_size(&self) -> u64 {
        self.domain_size
    }

    pub fn empty(domain_size: u64) -> Self {
        let mut enc = WahEncoder::new(domain_size);
        enc.finalize(domain_size);
        match enc.into_encoding() {
            super::RegionEncoding::Wah(r) => r,
            _ => unreachable!(),
        }
    }

    pub fn filled(domain_size: u64) -> Self {
        let mut enc = WahEncoder::new(domain_size);
        enc.push_bits(domain_size, true);
        enc.finalize(domain_size);
        match enc.into_encoding() {
            super::RegionEncoding::Wah(r) => r,
            _ => unreachable!(),
        }
    }

    pub fn from_rids(domain_size: u64, rids: &[u32]) -> Self {
        let bm = BitmapRegion::from_rids(domain_size, rids);
        Self::from_bitmap(&bm)
    }

    pub fn to_bitmap(&self) -> BitmapRegion {
        let mut bm = BitmapRegion::empty(self.domain_size);
        let mut pos = 0u64;
        for &w in &self.words {
            if is_fill(w) {
                let run_bits = fill_run(w) * GROUP_BITS as u64;
                if fill_value(w) {
                    let end = (pos + run_bits).min(self.domain_size);
                    for p in pos..end {
                        bm.set(p);
                    }
                }
                pos += run_bits;
            } else {
                let bits = literal_bits(w);
                for b in 0..GROUP_BITS {
                    if pos + b as u64 >= self.domain_size {
                        break;
                    }
                    if (bits >> b) & 1 == 1 {
                        bm.set(pos + b as u64);
                    }
                }
                pos += GROUP_BITS as u64;
            }
        }
        bm
    }

    pub fn from_bitmap(bm: &BitmapRegion) -> Self {
        let mut enc = WahEncoder::new(bm.domain_size());
        let rids = bm.to_rids(0);
        let mut prev = 0u64;
        for r in rids {
            if r > prev {
                enc.push_bits(r - prev, false);
            }
            enc.push_bits(1, true);
            prev = r + 1;
        }
        if prev < bm.domain_size() {
            enc.push_bits(bm.domain_size() - prev, false);
        }
        enc.finalize(bm.domain_size());
        match enc.into_encoding() {
            super::RegionEncoding::Wah(r) => r,
            _ => unreachable!(),
        }
    }

    pub fn to_rids(&self, offset: u64) -> Vec<u64> {
        self.to_bitmap().to_rids(offset)
    }

    pub fn len(&self) -> usize {
        self.nset as usize
    }

    pub fn uniformity(&self) -> Uniformity {
        if self.nset == 0 {
            Uniformity::Empty
        } else if self.nset == self.domain_size {
            Uniformity::Filled
        } else {
            Uniformity::Mixed
        }
    }

    pub fn not(&self) -> Self {
        Self::from_bitmap(&self.to_bitmap().not())
    }

    pub fn union(&self, other: &Self) -> Self {
        Self::from_bitmap(&self.to_bitmap().union(&other.to_bitmap()))
    }

    pub fn intersection(&self, other: &Self) -> Self {
        Self::from_bitmap(&self.to_bitmap().intersection(&other.to_bitmap()))
    }

    pub fn difference(&self, other: &Self) -> Self {
        Self::from_bitmap(&self.to_bitmap().difference(&other.to_bitmap()))
    }

    pub fn symmetric_difference(&self, other: &Self) -> Self {
        Self::from_bitmap(&self.to_bitmap().symmetric_difference(&other.to_bitmap()))
    }

    pub fn serialized_size(&self) -> usize {
        8 + 8 + 4 * self.words.len()
    }

    pub fn serialize(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.domain_size.to_le_bytes());
        out.extend_from_slice(&(self.words.len() as u64).to_le_bytes());
        for &w in &self.words {
            out.extend_from_slice(&w.to_le_bytes());
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
        let need = 16 + 4 * n;
        if buf.len() < need {
            return Err(PiqueError::TruncatedRegion {
                expected: need,
                got: buf.len(),
            });
        }
        let mut words = Vec::with_capacity(n);
        let mut nset = 0u64;
        for i in 0..n {
            let off = 16 + 4 * i;
            let w = u32::from_le_bytes(buf[off..off + 4].try_into().unwrap());
            nset += if is_fill(w) {
                if fill_value(w) {
                    fill_run(w) * GROUP_BITS as u64
                } else {
                    0
                }
            } else {
                literal_bits(w).count_ones() as u64
            };
            words.push(w);
        }
        let region = Self {
            domain_size,
            words,
            nset: nset.min(domain_size),
        };
        Ok((region, need))
    }
}

#[derive(Debug)]
pub struct WahEncoder {
    domain_size: u64,
    words: Vec<u32>,
    group_buf: u32,
    group_len: u32,
    fill_value: Option<bool>,
    fill_run_count: u64,
    current: u64,
    nset: u64,
}

impl WahEncoder {
    pub fn new(domain_size: u64) -> Self {
        Self {
            domain_size,
            words: Vec::new(),
            group_buf: 0,
            group_len: 0,
            fill_value: None,
            fill_run_count: 0,
            current: 0,
            nset: 0,
        }
    }

    fn flush_fill(&mut self) {
        if let Some(v) = self.fill_value.take() {
            let mut remaining = self.fill_run_count;
            while remaining > 0 {
                let chunk = remaining.min(MAX_RUN);
                self.words.push(make_fill(v, chunk));
                remaining -= chunk;
            }
            self.fill_run_count = 0;
        }
    }

    fn flush_group(&mut self) {
        if self.group_len == 0 {
            return;
        }
        if self.group_len < GROUP_BITS {
            // Final partial group: always a literal (padding bits are 0).
            self.flush_fill();
            self.words.push(make_literal(self.group_buf));
        } else if self.group_buf == 0 || self.group_buf == (1u32 << GROUP_BITS) - 1 {
            let gv = self.group_buf != 0;
            match self.fill_value {
                Some(v) if v == gv => self.fill_run_count += 1,
                _ => {
                    self.flush_fill();
                    self.fill_value = Some(gv);
                    self.fill_run_count = 1;
                }
            }
        } else {
            self.flush_fill();
            self.words.push(make_literal(self.group_buf));
        }
        self.group_buf = 0;
        self.group_len = 0;
    }
}

impl RegionEncoder for WahEncoder {
    fn current_position(&self) -> u64 {
        self.current
    }

    fn push_bits(&mut self, mut count: u64, bitval: bool) {
        self.current += count;
        if bitval {
            self.nset += count;
        }
        // Fill any partial group first.
        if self.group_len > 0 {
            let space = (GROUP_BITS - self.group_len) as u64;
            let take = count.min(space);
            if bitval {
                let mask = ((1u64 << take) - 1) as u32;
                self.group_buf |= mask << self.group_len;
            }
            self.group_len += take as u32;
            count -= take;
            if self.group_len == GROUP_BITS {
                self.flush_group();
            }
        }
        // Bulk-handle whole groups directly as fill runs.
        let whole_groups = count / GROUP_BITS as u64;
        if whole_groups > 0 {
            match self.fill_value {
                Some(v) if v == bitval => self.fill_run_count += whole_groups,
                _ => {
                    self.flush_fill();
                    self.fill_value = Some(bitval);
                    self.fill_run_count = whole_groups;
                }
            }
            count -= whole_groups * GROUP_BITS as u64;
        }
        // Remainder starts a new partial group.
        if count > 0 {
            if bitval {
                let mask = ((1u64 << count) - 1) as u32;
                self.group_buf |= mask;
            }
            self.group_len = count as u32;
        }
    }

    fn finalize(&mut self, total_elements: u64) {
        if self.current < total_elements {
            self.push_bits(total_elements - self.current, false);
        }
        self.flush_group();
        self.flush_fill();
    }

    fn into_encoding(self) -> super::RegionEncoding {
        super::RegionEncoding::Wah(WahRegion {
            domain_size: self.domain_size,
            words: self.words,
            nset: self.nset,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip_via_bitmap() {
        let rids = vec![0, 1, 2, 40, 41, 99];
        let w = WahRegion::from_rids(100, &rids);
        assert_eq!(w.to_rids(0), rids);
    }

    #[test]
    fn test_long_runs_compress() {
        let mut enc = WahEncoder::new(10_000);
        enc.push_bits(5_000, false);
        enc.push_bits(3_000, true);
        enc.push_bits(2_000, false);
        enc.finalize(10_000);
        let super::super::RegionEncoding::Wah(region) = enc.into_encoding() else {
            panic!()
        };
        assert!(region.words.len() < 20);
        assert_eq!(region.nset, 3_000);
    }

    #[test]
    fn test_set_ops_against_bitmap() {
        let a = WahRegion::from_rids(50, &[1, 2, 3, 40]);
        let b = WahRegion::from_rids(50, &[2, 3, 4, 40]);
        assert_eq!(a.union(&b).to_rids(0), vec![1, 2, 3, 4, 40]);
        assert_eq!(a.intersection(&b).to_rids(0), vec![2, 3, 40]);
    }

    #[test]
    fn test_not_involution() {
        let a = WahRegion::from_rids(64, &[0, 10, 63]);
        assert_eq!(a.not().not(), a);
    }
}
