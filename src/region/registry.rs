// region/registry.rs
//
// Name <-> type lookups for region encodings, used by the on-disk format
// (which stores a wire tag, not a name) and by config/CLI surfaces (which
// take a human-readable encoding name).

use super::RegionEncodingType;
use crate::error::PiqueError;

/// Coarse family a concrete encoding belongs to, used by the planner to
/// decide e.g. whether converting between two encodings is likely to pay
/// for itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepresentationClass {
    /// Explicit sorted RID list.
    Sparse,
    /// Delta/frame-of-reference compressed RID list.
    Compressed,
    /// Dense bit-per-RID.
    Bitmap,
    /// Tree-structured quadrant/octant encoding.
    Hierarchical,
}

pub fn representation_class(ty: RegionEncodingType) -> RepresentationClass {
    match ty {
        RegionEncodingType::Ii => RepresentationClass::Sparse,
        RegionEncodingType::Cii => RepresentationClass::Compressed,
        RegionEncodingType::Wah | RegionEncodingType::Bitmap => RepresentationClass::Bitmap,
        RegionEncodingType::Cblq(_) => RepresentationClass::Hierarchical,
    }
}

pub fn name_of(ty: RegionEncodingType) -> String {
    match ty {
        RegionEncodingType::Ii => "II".to_string(),
        RegionEncodingType::Cii => "CII".to_string(),
        RegionEncodingType::Wah => "WAH".to_string(),
        RegionEncodingType::Bitmap => "BITMAP".to_string(),
        RegionEncodingType::Cblq(d) => format!("CBLQ{d}"),
    }
}

pub fn type_by_name(name: &str) -> Result<RegionEncodingType, PiqueError> {
    match name.to_ascii_uppercase().as_str() {
        "II" => Ok(RegionEncodingType::Ii),
        "CII" => Ok(RegionEncodingType::Cii),
        "WAH" => Ok(RegionEncodingType::Wah),
        "BITMAP" => Ok(RegionEncodingType::Bitmap),
        other if other.starts_with("CBLQ") => {
            let d: u8 = other[4..]
                .parse()
                .map_err(|_| PiqueError::UnknownRegionEncoding(name.to_string()))?;
            if (1..=4).contains(&d) {
                Ok(RegionEncodingType::Cblq(d))
            } else {
                Err(PiqueError::UnknownRegionEncoding(name.to_string()))
            }
        }
        _ => Err(PiqueError::UnknownRegionEncoding(name.to_string())),
    }
}

pub const ALL_TYPES: &[RegionEncodingType] = &[
    RegionEncodingType::Ii,
    RegionEncodingType::Cii,
    RegionEncodingType::Wah,
    RegionEncodingType::Bitmap,
    RegionEncodingType::Cblq(1),
    RegionEncodingType::Cblq(2),
    RegionEncodingType::Cblq(3),
    RegionEncodingType::Cblq(4),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_roundtrip() {
        for ty in ALL_TYPES.iter().copied() {
            let name = name_of(ty);
            assert_eq!(type_by_name(&name).unwrap(), ty);
        }
    }

    #[test]
    fn test_rejects_out_of_range_cblq() {
        assert!(type_by_name("CBLQ0").is_err());
        assert!(type_by_name("CBLQ5").is_err());
    }

    #[test]
    fn test_unknown_name() {
        assert!(type_by_name("NOPE").is_err());
    }
}
