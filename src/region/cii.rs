// region/cii.rs
//
// Compressed inverted index: sorted RIDs packed into fixed-size PForDelta
// chunks, plus an `is_inverted` flag so NOT is O(1). Binary ops normalize
// the invert flags via De Morgan's laws before running the sorted-merge
// list algorithm on the decompressed stored sets.

use super::{RegionEncoder, Uniformity};
use crate::error::PiqueError;
use std::collections::BinaryHeap;

pub const CII_CHUNK_SIZE: usize = 128;

#[inline]
fn bits_needed(v: u32) -> u8 {
    32 - v.leading_zeros() as u8
}

fn pack_values(values: &[u32], bits: u8) -> Vec<u8> {
    if bits == 0 {
        return Vec::new();
    }
    let total_bits = values.len() * bits as usize;
    let mut out = vec![0u8; (total_bits + 7) / 8];
    let mut bit_pos = 0usize;
    for &v in values {
        let v = v as u64;
        for b in 0..bits {
            if (v >> b) & 1 == 1 {
                out[bit_pos / 8] |= 1 << (bit_pos % 8);
            }
            bit_pos += 1;
        }
    }
    out
}

fn unpack_values(buf: &[u8], bits: u8, count: usize) -> Vec<u32> {
    if bits == 0 {
        return vec![0u32; count];
    }
    let mut out = Vec::with_capacity(count);
    let mut bit_pos = 0usize;
    for _ in 0..count {
        let mut v = 0u32;
        for b in 0..bits {
            let byte = buf[bit_pos / 8];
            if (byte >> (bit_pos % 8)) & 1 == 1 {
                v |= 1 << b;
            }
            bit_pos += 1;
        }
        out.push(v);
    }
    out
}

#[derive(Clone, Debug, PartialEq)]
struct PforChunk {
    count: u16,
    bits: u8,
    packed: Vec<u8>,
    exceptions: Vec<(u16, u32)>,
}

impl PforChunk {
    fn encode(deltas: &[u32]) -> Self {
        let mut sorted = deltas.to_vec();
        sorted.sort_unstable();
        let frame_idx = (sorted.len() * 9 / 10).min(sorted.len().saturating_sub(1));
        let frame_max = sorted.get(frame_idx).copied().unwrap_or(0);
        let bits = bits_needed(frame_max).max(1).min(32);
        let cap = if bits >= 32 { u32::MAX } else { (1u32 << bits) - 1 };

        let mut exceptions = Vec::new();
        let mut frame = Vec::with_capacity(deltas.len());
        for (i, &d) in deltas.iter().enumerate() {
            if d > cap {
                exceptions.push((i as u16, d));
                frame.push(0);
            } else {
                frame.push(d);
            }
        }
        Self {
            count: deltas.len() as u16,
            bits,
            packed: pack_values(&frame, bits),
            exceptions,
        }
    }

    fn decode(&self) -> Vec<u32> {
        let mut values = unpack_values(&self.packed, self.bits, self.count as usize);
        for &(idx, val) in &self.exceptions {
            values[idx as usize] = val;
        }
        values
    }

    fn serialize(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.count.to_le_bytes());
        out.push(self.bits);
        out.extend_from_slice(&(self.packed.len() as u32).to_le_bytes());
        out.extend_from_slice(&self.packed);
        out.extend_from_slice(&(self.exceptions.len() as u16).to_le_bytes());
        for &(idx, val) in &self.exceptions {
            out.extend_from_slice(&idx.to_le_bytes());
            out.extend_from_slice(&val.to_le_bytes());
        }
    }

    fn deserialize(buf: &[u8]) -> Result<(Self, usize), PiqueError> {
        let need = |n: usize| -> Result<(), PiqueError> {
            if buf.len() < n {
                Err(PiqueError::TruncatedRegion {
                    expected: n,
                    got: buf.len(),
                })
            } else {
                Ok(())
            }
        };
        need(3)?;
        let count = u16::from_le_bytes(buf[0..2].try_into().unwrap());
        let bits = buf[2];
        let mut off = 3;
        need(off + 4)?;
        let packed_len = u32::from_le_bytes(buf[off..off + 4].try_into().unwrap()) as usize;
        off += 4;
        need(off + packed_len)?;
        let packed = buf[off..off + packed_len].to_vec();
        off += packed_len;
        need(off + 2)?;
        let nexc = u16::from_le_bytes(buf[off..off + 2].try_into().unwrap()) as usize;
        off += 2;
        let mut exceptions = Vec::with_capacity(nexc);
        for _ in 0..nexc {
            need(off + 6)?;
            let idx = u16::from_le_bytes(buf[off..off + 2].try_into().unwrap());
            let val = u32::from_le_bytes(buf[off + 2..off + 6].try_into().unwrap());
            exceptions.push((idx, val));
            off += 6;
        }
        Ok((
            Self {
                count,
                bits,
                packed,
                exceptions,
            },
            off,
        ))
    }
}

fn chunks_from_sorted(rids: &[u32]) -> Vec<PforChunk> {
    let mut chunks = Vec::new();
    let mut prev = 0u32;
    for group in rids.chunks(CII_CHUNK_SIZE) {
        let deltas: Vec<u32> = group
            .iter()
            .map(|&r| {
                let d = r - prev;
                prev = r;
                d
            })
            .collect();
        chunks.push(PforChunk::encode(&deltas));
    }
    chunks
}

fn sorted_from_chunks(chunks: &[PforChunk]) -> Vec<u32> {
    let mut out = Vec::new();
    let mut prev = 0u32;
    for chunk in chunks {
        for d in chunk.decode() {
            prev += d;
            out.push(prev);
        }
    }
    out
}

#[derive(Clone, Debug, PartialEq)]
enum CiiForm {
    Compressed(Vec<PforChunk>),
    Decompressed(Vec<u32>),
}

#[derive(Clone, Debug, PartialEq)]
pub struct CiiRegion {
    pub(crate) domain_size: u64,
    pub(crate) is_inverted: bool,
    form: CiiForm,
}

impl CiiRegion {
    pub fn domain_size(&self) -> u64 {
        self.domain_size
    }

    pub fn is_inverted(&self) -> bool {
        self.is_inverted
    }

    pub fn empty(domain_size: u64) -> Self {
        Self {
            domain_size,
            is_inverted: false,
            form: CiiForm::Decompressed(Vec::new()),
        }
    }

    pub fn filled(domain_size: u64) -> Self {
        Self {
            domain_size,
            is_inverted: true,
            form: CiiForm::Decompressed(Vec::new()),
        }
    }

    pub fn from_sorted_rids(domain_size: u64, rids: Vec<u32>) -> Self {
        Self {
            domain_size,
            is_inverted: false,
            form: CiiForm::Decompressed(rids),
        }
    }

    /// The stored set, decoded if necessary (not complemented).
    fn stored(&self) -> Vec<u32> {
        match &self.form {
            CiiForm::Decompressed(v) => v.clone(),
            CiiForm::Compressed(chunks) => sorted_from_chunks(chunks),
        }
    }

    pub fn is_compressed(&self) -> bool {
        matches!(self.form, CiiForm::Compressed(_))
    }

    pub fn compress(&mut self) {
        if let CiiForm::Decompressed(v) = &self.form {
            self.form = CiiForm::Compressed(chunks_from_sorted(v));
        }
    }

    pub fn decompress(&mut self) {
        if let CiiForm::Compressed(chunks) = &self.form {
            self.form = CiiForm::Decompressed(sorted_from_chunks(chunks));
        }
    }

    /// The represented RID set, applying the invert flag.
    pub fn to_rids(&self, offset: u64) -> Vec<u64> {
        let stored = self.stored();
        if !self.is_inverted {
            stored.iter().map(|&r| r as u64 + offset).collect()
        } else {
            let mut out = Vec::with_capacity((self.domain_size as usize).saturating_sub(stored.len()));
            let mut next = 0u32;
            for &r in &stored {
                while next < r {
                    out.push(next as u64 + offset);
                    next += 1;
                }
                next = r + 1;
            }
            while (next as u64) < self.domain_size {
                out.push(next as u64 + offset);
                next += 1;
            }
            out
        }
    }

    pub fn len(&self) -> usize {
        let stored_len = match &self.form {
            CiiForm::Decompressed(v) => v.len(),
            CiiForm::Compressed(chunks) => chunks.iter().map(|c| c.count as usize).sum(),
        };
        if self.is_inverted {
            self.domain_size as usize - stored_len
        } else {
            stored_len
        }
    }

    pub fn uniformity(&self) -> Uniformity {
        let len = self.len() as u64;
        if len == 0 {
            Uniformity::Empty
        } else if len == self.domain_size {
            Uniformity::Filled
        } else {
            Uniformity::Mixed
        }
    }

    pub fn not(&self) -> Self {
        Self {
            domain_size: self.domain_size,
            is_inverted: !self.is_inverted,
            form: self.form.clone(),
        }
    }

    fn binary(&self, other: &Self, op: super::SetOp) -> Self {
        debug_assert_eq!(self.domain_size, other.domain_size);
        let a = self.stored();
        let b = other.stored();
        let (stored, inverted) = match op {
            super::SetOp::Union => match (self.is_inverted, other.is_inverted) {
                (false, false) => (sorted_union(&a, &b), false),
                (true, true) => (sorted_intersection(&a, &b), true),
                (true, false) => (sorted_difference(&a, &b), true),
                (false, true) => (sorted_difference(&b, &a), true),
            },
            super::SetOp::Intersection => match (self.is_inverted, other.is_inverted) {
                (false, false) => (sorted_intersection(&a, &b), false),
                (true, true) => (sorted_union(&a, &b), true),
                (true, false) => (sorted_difference(&b, &a), false),
                (false, true) => (sorted_difference(&a, &b), false),
            },
            super::SetOp::Difference => match (self.is_inverted, other.is_inverted) {
                (false, false) => (sorted_difference(&a, &b), false),
                (true, false) => (sorted_union(&a, &b), true),
                (false, true) => (sorted_intersection(&a, &b), false),
                (true, true) => (sorted_difference(&b, &a), false),
            },
            super::SetOp::SymmetricDifference => {
                let stored = sorted_symmetric_difference(&a, &b);
                let inverted = self.is_inverted != other.is_inverted;
                (stored, inverted)
            }
        };
        Self {
            domain_size: self.domain_size,
            is_inverted: inverted,
            form: CiiForm::Decompressed(stored),
        }
    }

    pub fn union(&self, other: &Self) -> Self {
        self.binary(other, super::SetOp::Union)
    }

    pub fn intersection(&self, other: &Self) -> Self {
        self.binary(other, super::SetOp::Intersection)
    }

    pub fn difference(&self, other: &Self) -> Self {
        self.binary(other, super::SetOp::Difference)
    }

    pub fn symmetric_difference(&self, other: &Self) -> Self {
        self.binary(other, super::SetOp::SymmetricDifference)
    }

    /// k-way merge union via a min-heap of (next_rid, operand_index),
    /// dropping repeats. Falls back to a pairwise fold if any operand is
    /// inverted (De Morgan normalization across N operands is not worth the
    /// complexity here; two-operand binary() already handles that case).
    pub fn nary_union(regions: &[Self]) -> Self {
        if regions.is_empty() {
            return Self::empty(0);
        }
        if regions.iter().any(|r| r.is_inverted) {
            let mut acc = regions[0].clone();
            for r in &regions[1..] {
                acc = acc.union(r);
            }
            return acc;
        }
        let domain_size = regions[0].domain_size;
        let stored: Vec<Vec<u32>> = regions.iter().map(|r| r.stored()).collect();
        let mut heap: BinaryHeap<std::cmp::Reverse<(u32, usize)>> = BinaryHeap::new();
        let mut cursors = vec![0usize; stored.len()];
        for (i, s) in stored.iter().enumerate() {
            if let Some(&v) = s.first() {
                heap.push(std::cmp::Reverse((v, i)));
            }
        }
        let mut out = Vec::new();
        while let Some(std::cmp::Reverse((v, i))) = heap.pop() {
            if out.last() != Some(&v) {
                out.push(v);
            }
            cursors[i] += 1;
            if let Some(&next) = stored[i].get(cursors[i]) {
                heap.push(std::cmp::Reverse((next, i)));
            }
        }
        Self {
            domain_size,
            is_inverted: false,
            form: CiiForm::Decompressed(out),
        }
    }

    pub fn serialized_size(&self) -> usize {
        match &self.form {
            CiiForm::Decompressed(v) => 1 + 4 + 8 + 4 * v.len(),
            CiiForm::Compressed(chunks) => {
                1 + 4
                    + 8
                    + chunks
                        .iter()
                        .map(|c| 3 + 4 + c.packed.len() + 2 + 6 * c.exceptions.len())
                        .sum::<usize>()
            }
        }
    }

    pub fn serialize(&self, out: &mut Vec<u8>) {
        let compressed = self.is_compressed();
        let flags = (compressed as u8) | ((self.is_inverted as u8) << 1);
        out.push(flags);
        out.extend_from_slice(&(self.domain_size as u32).to_le_bytes());
        let mut payload = Vec::new();
        match &self.form {
            CiiForm::Decompressed(v) => {
                payload.extend_from_slice(&(v.len() as u64).to_le_bytes());
                for &r in v {
                    payload.extend_from_slice(&r.to_le_bytes());
                }
            }
            CiiForm::Compressed(chunks) => {
                payload.extend_from_slice(&(chunks.len() as u64).to_le_bytes());
                for c in chunks {
                    c.serialize(&mut payload);
                }
            }
        }
        out.extend_from_slice(&(payload.len() as u64).to_le_bytes());
        out.extend_from_slice(&payload);
    }

    pub fn deserialize(buf: &[u8]) -> Result<(Self, usize), PiqueError> {
        if buf.len() < 1 + 4 + 8 {
            return Err(PiqueError::TruncatedRegion {
                expected: 13,
                got: buf.len(),
            });
        }
        let flags = buf[0];
        let compressed = flags & 1 != 0;
        let is_inverted = flags & 2 != 0;
        let domain_size = u32::from_le_bytes(buf[1..5].try_into().unwrap()) as u64;
        let payload_len = u64::from_le_bytes(buf[5..13].try_into().unwrap()) as usize;
        let need = 13 + payload_len;
        if buf.len() < need {
            return Err(PiqueError::TruncatedRegion {
                expected: need,
                got: buf.len(),
            });
        }
        let payload = &buf[13..need];
        let form = if compressed {
            let n = u64::from_le_bytes(payload[0..8].try_into().unwrap()) as usize;
            let mut off = 8;
            let mut chunks = Vec::with_capacity(n);
            for _ in 0..n {
                let (chunk, used) = PforChunk::deserialize(&payload[off..])?;
                chunks.push(chunk);
                off += used;
            }
            CiiForm::Compressed(chunks)
        } else {
            let n = u64::from_le_bytes(payload[0..8].try_into().unwrap()) as usize;
            let mut rids = Vec::with_capacity(n);
            for i in 0..n {
                let off = 8 + 4 * i;
                rids.push(u32::from_le_bytes(payload[off..off + 4].try_into().unwrap()));
            }
            CiiForm::Decompressed(rids)
        };
        Ok((
            Self {
                domain_size,
                is_inverted,
                form,
            },
            need,
        ))
    }
}

fn sorted_union(a: &[u32], b: &[u32]) -> Vec<u32> {
    let mut out = Vec::with_capacity(a.len() + b.len());
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            std::cmp::Ordering::Less => {
                out.push(a[i]);
                i += 1;
            }
            std::cmp::Ordering::Greater => {
                out.push(b[j]);
                j += 1;
            }
            std::cmp::Ordering::Equal => {
                out.push(a[i]);
                i += 1;
                j += 1;
            }
        }
    }
    out.extend_from_slice(&a[i..]);
    out.extend_from_slice(&b[j..]);
    out
}

fn sorted_intersection(a: &[u32], b: &[u32]) -> Vec<u32> {
    let mut out = Vec::new();
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                out.push(a[i]);
                i += 1;
                j += 1;
            }
        }
    }
    out
}

fn sorted_difference(a: &[u32], b: &[u32]) -> Vec<u32> {
    let mut out = Vec::new();
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            std::cmp::Ordering::Less => {
                out.push(a[i]);
                i += 1;
            }
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                i += 1;
                j += 1;
            }
        }
    }
    out.extend_from_slice(&a[i..]);
    out
}

fn sorted_symmetric_difference(a: &[u32], b: &[u32]) -> Vec<u32> {
    let mut out = Vec::new();
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            std::cmp::Ordering::Less => {
                out.push(a[i]);
                i += 1;
            }
            std::cmp::Ordering::Greater => {
                out.push(b[j]);
                j += 1;
            }
            std::cmp::Ordering::Equal => {
                i += 1;
                j += 1;
            }
        }
    }
    out.extend_from_slice(&a[i..]);
    out.extend_from_slice(&b[j..]);
    out
}

#[derive(Debug)]
pub struct CiiEncoder {
    domain_size: u64,
    current: u64,
    rids: Vec<u32>,
}

impl CiiEncoder {
    pub fn new(domain_size: u64) -> Self {
        Self {
            domain_size,
            current: 0,
            rids: Vec::new(),
        }
    }
}

impl RegionEncoder for CiiEncoder {
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
        let mut region = CiiRegion {
            domain_size: self.domain_size,
            is_inverted: false,
            form: CiiForm::Decompressed(self.rids),
        };
        region.compress();
        super::RegionEncoding::Cii(region)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_roundtrip() {
        let rids: Vec<u32> = (0..500).step_by(3).collect();
        let chunks = chunks_from_sorted(&rids);
        assert_eq!(sorted_from_chunks(&chunks), rids);
    }

    #[test]
    fn test_invert_is_o1_flag_flip() {
        let r = CiiRegion::from_sorted_rids(20, vec![1, 2, 3]);
        let not_r = r.not();
        assert!(not_r.is_inverted);
        assert_eq!(not_r.to_rids(0), (0..20u64).filter(|x| ![1, 2, 3].contains(&(*x as u32))).collect::<Vec<_>>());
    }

    #[test]
    fn test_not_and_identity() {
        let a = CiiRegion::from_sorted_rids(30, vec![1, 5, 9, 20]);
        let b = CiiRegion::from_sorted_rids(30, vec![5, 9, 15, 20]);
        let and_direct = a.intersection(&b);
        let and_via_demorgan = a.not().union(&b.not()).not();
        assert_eq!(and_direct.to_rids(0), and_via_demorgan.to_rids(0));
    }

    #[test]
    fn test_nary_union_matches_fold() {
        let a = CiiRegion::from_sorted_rids(40, vec![1, 2, 3]);
        let b = CiiRegion::from_sorted_rids(40, vec![2, 3, 4]);
        let c = CiiRegion::from_sorted_rids(40, vec![10, 20]);
        let via_heap = CiiRegion::nary_union(&[a.clone(), b.clone(), c.clone()]);
        let via_fold = a.union(&b).union(&c);
        assert_eq!(via_heap.to_rids(0), via_fold.to_rids(0));
    }

    #[test]
    fn test_serialize_roundtrip_both_forms() {
        let mut r = CiiRegion::from_sorted_rids(300, (0..300).step_by(7).collect());
        let mut buf = Vec::new();
        r.serialize(&mut buf);
        let (decoded, used) = CiiRegion::deserialize(&buf).unwrap();
        assert_eq!(used, buf.len());
        assert_eq!(decoded.to_rids(0), r.to_rids(0));

        r.compress();
        let mut buf2 = Vec::new();
        r.serialize(&mut buf2);
        let (decoded2, _) = CiiRegion::deserialize(&buf2).unwrap();
        assert_eq!(decoded2.to_rids(0), r.to_rids(0));
    }
}
