// region/ii.rs
//
// Plain inverted-index region: a sorted array of present RIDs. The simplest
// encoding, and the one every other encoding's binary ops fall back to
// after decoding.

use super::{RegionEncoder, Uniformity};
use crate::error::PiqueError;

#[derive(Clone, Debug, PartialEq)]
pub struct IiRegion {
    pub(crate) domain_size: u64,
    pub(crate) rids: Vec<u32>,
}

impl IiRegion {
    pub fn domain_size(&self) -> u64 {
        self.domain_size
    }

    pub fn len(&self) -> usize {
        self.rids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rids.is_empty()
    }

    pub fn rids(&self) -> &[u32] {
        &self.rids
    }

    pub fn empty(domain_size: u64) -> Self {
        Self {
            domain_size,
            rids: Vec::new(),
        }
    }

    pub fn filled(domain_size: u64) -> Self {
        Self {
            domain_size,
            rids: (0..domain_size as u32).collect(),
        }
    }

    /// Build directly from an already-sorted, deduplicated RID list. Debug
    /// builds verify the precondition; release builds trust the caller.
    pub fn from_sorted_rids(domain_size: u64, rids: Vec<u32>) -> Self {
        debug_assert!(rids.windows(2).all(|w| w[0] < w[1]));
        debug_assert!(rids.last().map_or(true, |&r| (r as u64) < domain_size));
        Self { domain_size, rids }
    }

    pub fn uniformity(&self) -> Uniformity {
        if self.rids.is_empty() {
            Uniformity::Empty
        } else if self.rids.len() as u64 == self.domain_size {
            Uniformity::Filled
        } else {
            Uniformity::Mixed
        }
    }

    pub fn to_rids(&self, offset: u64) -> Vec<u64> {
        self.rids.iter().map(|&r| r as u64 + offset).collect()
    }

    pub fn not(&self) -> Self {
        let mut out = Vec::with_capacity((self.domain_size as usize).saturating_sub(self.rids.len()));
        let mut next = 0u32;
        for &r in &self.rids {
            while next < r {
                out.push(next);
                next += 1;
            }
            next = r + 1;
        }
        while (next as u64) < self.domain_size {
            out.push(next);
            next += 1;
        }
        Self {
            domain_size: self.domain_size,
            rids: out,
        }
    }

    pub fn union(&self, other: &Self) -> Self {
        let mut out = Vec::with_capacity(self.rids.len() + other.rids.len());
        let (mut i, mut j) = (0, 0);
        while i < self.rids.len() && j < other.rids.len() {
            match self.rids[i].cmp(&other.rids[j]) {
                std::cmp::Ordering::Less => {
                    out.push(self.rids[i]);
                    i += 1;
                }
                std::cmp::Ordering::Greater => {
                    out.push(other.rids[j]);
                    j += 1;
                }
                std::cmp::Ordering::Equal => {
                    out.push(self.rids[i]);
                    i += 1;
                    j += 1;
                }
            }
        }
        out.extend_from_slice(&self.rids[i..]);
        out.extend_from_slice(&other.rids[j..]);
        Self {
            domain_size: self.domain_size,
            rids: out,
        }
    }

    pub fn intersection(&self, other: &Self) -> Self {
        let mut out = Vec::with_capacity(self.rids.len().min(other.rids.len()));
        let (mut i, mut j) = (0, 0);
        while i < self.rids.len() && j < other.rids.len() {
            match self.rids[i].cmp(&other.rids[j]) {
                std::cmp::Ordering::Less => i += 1,
                std::cmp::Ordering::Greater => j += 1,
                std::cmp::Ordering::Equal => {
                    out.push(self.rids[i]);
                    i += 1;
                    j += 1;
                }
            }
        }
        Self {
            domain_size: self.domain_size,
            rids: out,
        }
    }

    pub fn difference(&self, other: &Self) -> Self {
        let mut out = Vec::with_capacity(self.rids.len());
        let (mut i, mut j) = (0, 0);
        while i < self.rids.len() && j < other.rids.len() {
            match self.rids[i].cmp(&other.rids[j]) {
                std::cmp::Ordering::Less => {
                    out.push(self.rids[i]);
                    i += 1;
                }
                std::cmp::Ordering::Greater => j += 1,
                std::cmp::Ordering::Equal => {
                    i += 1;
                    j += 1;
                }
            }
        }
        out.extend_from_slice(&self.rids[i..]);
        Self {
            domain_size: self.domain_size,
            rids: out,
        }
    }

    pub fn symmetric_difference(&self, other: &Self) -> Self {
        let mut out = Vec::with_capacity(self.rids.len() + other.rids.len());
        let (mut i, mut j) = (0, 0);
        while i < self.rids.len() && j < other.rids.len() {
            match self.rids[i].cmp(&other.rids[j]) {
                std::cmp::Ordering::Less => {
                    out.push(self.rids[i]);
                    i += 1;
                }
                std::cmp::Ordering::Greater => {
                    out.push(other.rids[j]);
                    j += 1;
                }
                std::cmp::Ordering::Equal => {
                    i += 1;
                    j += 1;
                }
            }
        }
        out.extend_from_slice(&self.rids[i..]);
        out.extend_from_slice(&other.rids[j..]);
        Self {
            domain_size: self.domain_size,
            rids: out,
        }
    }

    pub fn serialized_size(&self) -> usize {
        8 + 8 + 4 * self.rids.len()
    }

    pub fn serialize(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.domain_size.to_le_bytes());
        out.extend_from_slice(&(self.rids.len() as u64).to_le_bytes());
        for &r in &self.rids {
            out.extend_from_slice(&r.to_le_bytes());
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
        let mut rids = Vec::with_capacity(n);
        for i in 0..n {
            let off = 16 + 4 * i;
            rids.push(u32::from_le_bytes(buf[off..off + 4].try_into().unwrap()));
        }
        Ok((Self { domain_size, rids }, need))
    }
}

#[derive(Debug)]
pub struct IiEncoder {
    domain_size: u64,
    current: u64,
    rids: Vec<u32>,
}

impl IiEncoder {
    pub fn new(domain_size: u64) -> Self {
        Self {
            domain_size,
            current: 0,
            rids: Vec::new(),
        }
    }
}

impl RegionEncoder for IiEncoder {
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
        super::RegionEncoding::Ii(IiRegion {
            domain_size: self.domain_size,
            rids: self.rids,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_involution() {
        let r = IiRegion::from_sorted_rids(10, vec![1, 3, 5, 7]);
        assert_eq!(r.not().not(), r);
    }

    #[test]
    fn test_set_ops_against_naive() {
        let a = IiRegion::from_sorted_rids(20, vec![1, 2, 5, 9, 15]);
        let b = IiRegion::from_sorted_rids(20, vec![2, 3, 5, 10, 15, 19]);

        let union: std::collections::BTreeSet<_> =
            a.rids.iter().chain(b.rids.iter()).cloned().collect();
        assert_eq!(a.union(&b).rids, union.into_iter().collect::<Vec<_>>());

        let inter: std::collections::BTreeSet<_> = a
            .rids
            .iter()
            .filter(|r| b.rids.contains(r))
            .cloned()
            .collect();
        assert_eq!(
            a.intersection(&b).rids,
            inter.into_iter().collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_encoder_roundtrip() {
        let mut enc = IiEncoder::new(16);
        enc.push_bits(2, false);
        enc.push_bits(3, true);
        enc.push_bits(11, false);
        enc.finalize(16);
        let super::super::RegionEncoding::Ii(region) = enc.into_encoding() else {
            panic!()
        };
        assert_eq!(region.rids, vec![2, 3, 4]);
    }
}
