// region/mod.rs
//
// Region encodings: II, CII, WAH, BITMAP, CBLQ{d}. A `Region` is not its own
// struct; it's realized entirely by the `RegionEncoding` tagged variant,
// whose variants are the concrete kernel types below. All dispatch is a
// single match in this module; there is no dynamic/virtual dispatch.

pub mod bitmap;
pub mod cblq;
pub mod cii;
pub mod convert;
pub mod ii;
pub mod registry;
pub mod setops;
pub mod wah;

pub use bitmap::BitmapRegion;
pub use cblq::CblqRegion;
pub use cii::CiiRegion;
pub use ii::IiRegion;
pub use wah::WahRegion;

use crate::error::PiqueError;

/// Empty, completely full, or neither. `complement()` swaps Empty/Filled and
/// fixes Mixed (Mixed is its own complement).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Uniformity {
    Empty,
    Filled,
    Mixed,
}

impl Uniformity {
    pub fn complement(self) -> Self {
        match self {
            Uniformity::Empty => Uniformity::Filled,
            Uniformity::Filled => Uniformity::Empty,
            Uniformity::Mixed => Uniformity::Mixed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOp {
    Union,
    Intersection,
    Difference,
    SymmetricDifference,
}

/// The concrete encoding kind, independent of any particular region's data —
/// used by the registry, converters, and on-disk format to identify which
/// variant a stored region payload belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegionEncodingType {
    Ii,
    Cii,
    Wah,
    Bitmap,
    Cblq(u8),
}

impl RegionEncodingType {
    pub fn wire_tag(self) -> u8 {
        match self {
            RegionEncodingType::Ii => 0,
            RegionEncodingType::Cii => 1,
            RegionEncodingType::Wah => 2,
            RegionEncodingType::Bitmap => 3,
            RegionEncodingType::Cblq(d) => 4 + d,
        }
    }

    pub fn from_wire_tag(tag: u8) -> Result<Self, PiqueError> {
        match tag {
            0 => Ok(RegionEncodingType::Ii),
            1 => Ok(RegionEncodingType::Cii),
            2 => Ok(RegionEncodingType::Wah),
            3 => Ok(RegionEncodingType::Bitmap),
            4..=8 => Ok(RegionEncodingType::Cblq(tag - 4)),
            other => Err(PiqueError::UnknownRegionEncoding(format!("tag {other}"))),
        }
    }
}

/// Push-mode sequential builder, shared by every encoding. A default
/// `insert_bits` is provided in terms of `push_bits`; only `push_bits`,
/// `finalize`, `current_position`, and `into_encoding` need a concrete body.
pub trait RegionEncoder {
    fn current_position(&self) -> u64;

    /// Append a run of `count` equal bits at the end of the domain.
    fn push_bits(&mut self, count: u64, bitval: bool);

    /// Pad with 0s to `total_elements` and perform any encoder-specific
    /// closing work (e.g. compressing CII chunks).
    fn finalize(&mut self, total_elements: u64);

    fn into_encoding(self) -> RegionEncoding;

    /// Logically equivalent to `push_bits(pos - current, false)` then
    /// `push_bits(count, true)`. Precondition: `pos >= current_position()`.
    fn insert_bits(&mut self, pos: u64, count: u64) {
        let cur = self.current_position();
        debug_assert!(pos >= cur, "insert_bits: pos must be >= current position");
        self.push_bits(pos.saturating_sub(cur), false);
        self.push_bits(count, true);
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum RegionEncoding {
    Ii(IiRegion),
    Cii(CiiRegion),
    Wah(WahRegion),
    Bitmap(BitmapRegion),
    Cblq(CblqRegion),
}

impl RegionEncoding {
    pub fn encoding_type(&self) -> RegionEncodingType {
        match self {
            RegionEncoding::Ii(_) => RegionEncodingType::Ii,
            RegionEncoding::Cii(_) => RegionEncodingType::Cii,
            RegionEncoding::Wah(_) => RegionEncodingType::Wah,
            RegionEncoding::Bitmap(_) => RegionEncodingType::Bitmap,
            RegionEncoding::Cblq(r) => RegionEncodingType::Cblq(r.arity()),
        }
    }

    pub fn domain_size(&self) -> u64 {
        match self {
            RegionEncoding::Ii(r) => r.domain_size(),
            RegionEncoding::Cii(r) => r.domain_size(),
            RegionEncoding::Wah(r) => r.domain_size(),
            RegionEncoding::Bitmap(r) => r.domain_size(),
            RegionEncoding::Cblq(r) => r.domain_size(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            RegionEncoding::Ii(r) => r.len(),
            RegionEncoding::Cii(r) => r.len(),
            RegionEncoding::Wah(r) => r.len(),
            RegionEncoding::Bitmap(r) => r.popcount() as usize,
            RegionEncoding::Cblq(r) => r.to_rids(0).len(),
        }
    }

    pub fn uniformity(&self) -> Uniformity {
        match self {
            RegionEncoding::Ii(r) => r.uniformity(),
            RegionEncoding::Cii(r) => r.uniformity(),
            RegionEncoding::Wah(r) => r.uniformity(),
            RegionEncoding::Bitmap(r) => r.uniformity(),
            RegionEncoding::Cblq(r) => r.uniformity(),
        }
    }

    pub fn to_rids(&self, offset: u64) -> Vec<u64> {
        match self {
            RegionEncoding::Ii(r) => r.to_rids(offset),
            RegionEncoding::Cii(r) => r.to_rids(offset),
            RegionEncoding::Wah(r) => r.to_rids(offset),
            RegionEncoding::Bitmap(r) => r.to_rids(offset),
            RegionEncoding::Cblq(r) => r.to_rids(offset),
        }
    }

    pub fn not(&self) -> Self {
        match self {
            RegionEncoding::Ii(r) => RegionEncoding::Ii(r.not()),
            RegionEncoding::Cii(r) => RegionEncoding::Cii(r.not()),
            RegionEncoding::Wah(r) => RegionEncoding::Wah(r.not()),
            RegionEncoding::Bitmap(r) => RegionEncoding::Bitmap(r.not()),
            RegionEncoding::Cblq(r) => RegionEncoding::Cblq(r.not()),
        }
    }

    /// Binary op between two regions of the *same* concrete encoding.
    /// Cross-encoding operands must go through `setops::PreferenceListSetOperations`.
    pub fn binary_same_type(&self, other: &Self, op: SetOp) -> Result<Self, PiqueError> {
        if self.domain_size() != other.domain_size() {
            return Err(PiqueError::DomainSizeMismatch {
                left: self.domain_size(),
                right: other.domain_size(),
            });
        }
        use RegionEncoding::*;
        match (self, other) {
            (Ii(a), Ii(b)) => Ok(Ii(match op {
                SetOp::Union => a.union(b),
                SetOp::Intersection => a.intersection(b),
                SetOp::Difference => a.difference(b),
                SetOp::SymmetricDifference => a.symmetric_difference(b),
            })),
            (Cii(a), Cii(b)) => Ok(Cii(match op {
                SetOp::Union => a.union(b),
                SetOp::Intersection => a.intersection(b),
                SetOp::Difference => a.difference(b),
                SetOp::SymmetricDifference => a.symmetric_difference(b),
            })),
            (Wah(a), Wah(b)) => Ok(Wah(match op {
                SetOp::Union => a.union(b),
                SetOp::Intersection => a.intersection(b),
                SetOp::Difference => a.difference(b),
                SetOp::SymmetricDifference => a.symmetric_difference(b),
            })),
            (Bitmap(a), Bitmap(b)) => Ok(Bitmap(match op {
                SetOp::Union => a.union(b),
                SetOp::Intersection => a.intersection(b),
                SetOp::Difference => a.difference(b),
                SetOp::SymmetricDifference => a.symmetric_difference(b),
            })),
            (Cblq(a), Cblq(b)) if a.arity() == b.arity() => Ok(Cblq(match op {
                SetOp::Union => a.union(b),
                SetOp::Intersection => a.intersection(b),
                SetOp::Difference => a.difference(b),
                SetOp::SymmetricDifference => a.symmetric_difference(b),
            })),
            _ => Err(PiqueError::UnsupportedOperandCombination(format!(
                "binary_same_type: {:?} vs {:?}",
                self.encoding_type(),
                other.encoding_type()
            ))),
        }
    }

    pub fn serialized_size(&self) -> usize {
        match self {
            RegionEncoding::Ii(r) => r.serialized_size(),
            RegionEncoding::Cii(r) => r.serialized_size(),
            RegionEncoding::Wah(r) => r.serialized_size(),
            RegionEncoding::Bitmap(r) => r.serialized_size(),
            RegionEncoding::Cblq(r) => r.serialized_size(),
        }
    }

    pub fn serialize(&self, out: &mut Vec<u8>) {
        out.push(self.encoding_type().wire_tag());
        match self {
            RegionEncoding::Ii(r) => r.serialize(out),
            RegionEncoding::Cii(r) => r.serialize(out),
            RegionEncoding::Wah(r) => r.serialize(out),
            RegionEncoding::Bitmap(r) => r.serialize(out),
            RegionEncoding::Cblq(r) => r.serialize(out),
        }
    }

    pub fn deserialize(buf: &[u8]) -> Result<(Self, usize), PiqueError> {
        if buf.is_empty() {
            return Err(PiqueError::TruncatedRegion {
                expected: 1,
                got: 0,
            });
        }
        let tag = RegionEncodingType::from_wire_tag(buf[0])?;
        let rest = &buf[1..];
        let (region, used) = match tag {
            RegionEncodingType::Ii => {
                let (r, u) = IiRegion::deserialize(rest)?;
                (RegionEncoding::Ii(r), u)
            }
            RegionEncodingType::Cii => {
                let (r, u) = CiiRegion::deserialize(rest)?;
                (RegionEncoding::Cii(r), u)
            }
            RegionEncodingType::Wah => {
                let (r, u) = WahRegion::deserialize(rest)?;
                (RegionEncoding::Wah(r), u)
            }
            RegionEncodingType::Bitmap => {
                let (r, u) = BitmapRegion::deserialize(rest)?;
                (RegionEncoding::Bitmap(r), u)
            }
            RegionEncodingType::Cblq(_) => {
                let (r, u) = CblqRegion::deserialize(rest)?;
                (RegionEncoding::Cblq(r), u)
            }
        };
        Ok((region, used + 1))
    }
}

pub fn make_null_region(ty: RegionEncodingType, domain_size: u64) -> RegionEncoding {
    make_uniform_region(ty, domain_size, false)
}

pub fn make_uniform_region(ty: RegionEncodingType, domain_size: u64, filled: bool) -> RegionEncoding {
    match ty {
        RegionEncodingType::Ii => RegionEncoding::Ii(if filled {
            IiRegion::filled(domain_size)
        } else {
            IiRegion::empty(domain_size)
        }),
        RegionEncodingType::Cii => RegionEncoding::Cii(if filled {
            CiiRegion::filled(domain_size)
        } else {
            CiiRegion::empty(domain_size)
        }),
        RegionEncodingType::Wah => RegionEncoding::Wah(if filled {
            WahRegion::filled(domain_size)
        } else {
            WahRegion::empty(domain_size)
        }),
        RegionEncodingType::Bitmap => RegionEncoding::Bitmap(if filled {
            BitmapRegion::filled(domain_size)
        } else {
            BitmapRegion::empty(domain_size)
        }),
        RegionEncodingType::Cblq(d) => RegionEncoding::Cblq(if filled {
            CblqRegion::filled(d, domain_size)
        } else {
            CblqRegion::empty(d, domain_size)
        }),
    }
}

/// Builds a `RegionEncoding` of the given type from a run stream.
pub fn new_encoder(ty: RegionEncodingType, domain_size: u64) -> Box<dyn RegionEncoder> {
    match ty {
        RegionEncodingType::Ii => Box::new(ii::IiEncoder::new(domain_size)),
        RegionEncodingType::Cii => Box::new(cii::CiiEncoder::new(domain_size)),
        RegionEncodingType::Wah => Box::new(wah::WahEncoder::new(domain_size)),
        RegionEncodingType::Bitmap => Box::new(bitmap::BitmapEncoder::new(domain_size)),
        RegionEncodingType::Cblq(d) => Box::new(cblq::CblqEncoder::new(d, domain_size)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_make_uniform_matches_type() {
        for ty in [
            RegionEncodingType::Ii,
            RegionEncodingType::Cii,
            RegionEncodingType::Wah,
            RegionEncodingType::Bitmap,
            RegionEncodingType::Cblq(2),
        ] {
            let empty = make_null_region(ty, 50);
            assert_eq!(empty.uniformity(), Uniformity::Empty);
            let filled = make_uniform_region(ty, 50, true);
            assert_eq!(filled.uniformity(), Uniformity::Filled);
        }
    }

    #[test]
    fn test_wire_tag_roundtrip() {
        for ty in [
            RegionEncodingType::Ii,
            RegionEncodingType::Cii,
            RegionEncodingType::Wah,
            RegionEncodingType::Bitmap,
            RegionEncodingType::Cblq(1),
            RegionEncodingType::Cblq(3),
            RegionEncodingType::Cblq(4),
        ] {
            assert_eq!(RegionEncodingType::from_wire_tag(ty.wire_tag()).unwrap(), ty);
        }
    }

    #[test]
    fn test_serialize_deserialize_all_variants() {
        let rids = vec![1u32, 2, 5, 9, 40];
        let variants = vec![
            RegionEncoding::Ii(IiRegion::from_sorted_rids(64, rids.clone())),
            RegionEncoding::Cii(CiiRegion::from_sorted_rids(64, rids.clone())),
            RegionEncoding::Wah(WahRegion::from_rids(64, &rids)),
            RegionEncoding::Bitmap(BitmapRegion::from_rids(64, &rids)),
            RegionEncoding::Cblq(CblqRegion::from_rids(2, 64, &rids)),
        ];
        for v in variants {
            let mut buf = Vec::new();
            v.serialize(&mut buf);
            let (decoded, used) = RegionEncoding::deserialize(&buf).unwrap();
            assert_eq!(used, buf.len());
            assert_eq!(decoded.to_rids(0), v.to_rids(0));
        }
    }
}
