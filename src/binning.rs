// binning.rs
//
// Quantizers mapping a scalar value to a totally-ordered bin key, and the
// bin-range lookup the query engine uses to turn a value predicate into a
// bin-id range. A partition persists its `BinningSpecification` (serialized
// via bincode, as the teacher serializes its own index structures) so the
// engine can reproduce the same quantizer at query time.

use crate::error::PiqueError;
use crate::io::BinKey;
use serde::{Deserialize, Serialize};

/// Bit-reinterprets a float so that unsigned integer order matches numeric
/// order: flip all bits for negatives, set the sign bit for non-negatives.
fn float_to_sortable_u64(v: f64) -> u64 {
    let bits = v.to_bits();
    if bits & (1u64 << 63) != 0 {
        !bits
    } else {
        bits | (1u64 << 63)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub enum BinningSpecification {
    /// Keep the top `bits` bits of the value's sortable bit pattern.
    SigBits { bits: u8 },
    /// Round to `digits` decimal digits.
    Precision { digits: u8 },
    /// Bin `i` covers `[boundaries[i], boundaries[i+1])`; the first and last
    /// bins are half-open to -inf/+inf.
    ExplicitBins { boundaries: Vec<f64> },
}

impl BinningSpecification {
    pub fn sigbits(bits: u8) -> Result<Self, PiqueError> {
        if bits == 0 || bits > 63 {
            return Err(PiqueError::QuantizerOverflow(format!(
                "SIGBITS({bits}) out of range: must be 1..=63"
            )));
        }
        Ok(Self::SigBits { bits })
    }

    pub fn precision(digits: u8) -> Self {
        Self::Precision { digits }
    }

    pub fn explicit_bins(boundaries: Vec<f64>) -> Result<Self, PiqueError> {
        if boundaries.is_empty() {
            return Err(PiqueError::EmptyBinArray);
        }
        Ok(Self::ExplicitBins { boundaries })
    }

    pub fn to_blob(&self) -> Result<Vec<u8>, PiqueError> {
        Ok(bincode::serialize(self)?)
    }

    pub fn from_blob(blob: &[u8]) -> Result<Self, PiqueError> {
        Ok(bincode::deserialize(blob)?)
    }

    /// Maps a value to its bin key. Pure function: same value, same key,
    /// regardless of which bins happen to exist in a given partition.
    pub fn quantize(&self, value: f64) -> Result<BinKey, PiqueError> {
        match self {
            BinningSpecification::SigBits { bits } => {
                let sortable = float_to_sortable_u64(value);
                let shift = 64 - *bits as u32;
                Ok((sortable >> shift) as i64)
            }
            BinningSpecification::Precision { digits } => {
                let scale = 10f64.powi(*digits as i32);
                let scaled = (value * scale).round();
                if !scaled.is_finite() || scaled.abs() > i64::MAX as f64 {
                    return Err(PiqueError::QuantizerOverflow(format!(
                        "PRECISION({digits}) overflowed for value {value}"
                    )));
                }
                Ok(scaled as i64)
            }
            BinningSpecification::ExplicitBins { boundaries } => {
                if boundaries.is_empty() {
                    return Err(PiqueError::EmptyBinArray);
                }
                // partition_point finds the first boundary > value, so the
                // containing bin is one less; bin 0 covers (-inf, boundaries[0]).
                let idx = boundaries.partition_point(|&b| b <= value);
                Ok(idx as i64)
            }
        }
    }

    /// Maps a half-open value predicate `lb_value <= x < ub_value` to the
    /// exclusive-upper bin range `[lb_bin, ub_bin)` against a partition's
    /// persisted (sorted, ascending) bin-key array. `None` bounds mean an
    /// open `-inf`/`+inf` constraint.
    pub fn compute_bin_range(
        &self,
        bin_keys: &[BinKey],
        lb_value: Option<f64>,
        ub_value: Option<f64>,
    ) -> Result<(u32, u32), PiqueError> {
        if bin_keys.is_empty() {
            return Err(PiqueError::EmptyBinArray);
        }
        let nbins = bin_keys.len() as u32;
        let lb_bin = match lb_value {
            None => 0,
            Some(v) => {
                let key = self.quantize(v)?;
                bin_keys.partition_point(|&bk| bk < key) as u32
            }
        };
        let ub_bin = match ub_value {
            None => nbins,
            Some(v) => {
                let key = self.quantize(v)?;
                bin_keys.partition_point(|&bk| bk < key) as u32
            }
        };
        Ok((lb_bin, ub_bin.max(lb_bin)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_sigbits_preserves_float_order() {
        let spec = BinningSpecification::sigbits(16).unwrap();
        let values = [-100.0, -1.5, -0.001, 0.0, 0.001, 1.5, 100.0];
        let keys: Vec<i64> = values.iter().map(|&v| spec.quantize(v).unwrap()).collect();
        let mut sorted_keys = keys.clone();
        sorted_keys.sort_unstable();
        assert_eq!(keys, sorted_keys);
    }

    #[test]
    fn test_sigbits_rejects_out_of_range() {
        assert!(BinningSpecification::sigbits(0).is_err());
        assert!(BinningSpecification::sigbits(64).is_err());
    }

    #[test]
    fn test_precision_rounds_to_digits() {
        let spec = BinningSpecification::precision(2);
        assert_eq!(spec.quantize(1.005).unwrap(), spec.quantize(1.004).unwrap());
        assert_ne!(spec.quantize(1.00).unwrap(), spec.quantize(1.01).unwrap());
    }

    #[test]
    fn test_explicit_bins_half_open_ends() {
        let spec = BinningSpecification::explicit_bins(vec![0.0, 10.0, 20.0]).unwrap();
        assert_eq!(spec.quantize(-1000.0).unwrap(), 0);
        assert_eq!(spec.quantize(5.0).unwrap(), 1);
        assert_eq!(spec.quantize(15.0).unwrap(), 2);
        assert_eq!(spec.quantize(1000.0).unwrap(), 3);
    }

    #[test]
    fn test_compute_bin_range_open_bounds_cover_everything() {
        let spec = BinningSpecification::precision(0);
        let bin_keys: Vec<BinKey> = (0..10).collect();
        let (lb, ub) = spec.compute_bin_range(&bin_keys, None, None).unwrap();
        assert_eq!((lb, ub), (0, 10));
    }

    #[test]
    fn test_compute_bin_range_matches_quantize() {
        let spec = BinningSpecification::precision(0);
        let bin_keys: Vec<BinKey> = vec![0, 5, 10, 15, 20];
        let (lb, ub) = spec.compute_bin_range(&bin_keys, Some(5.0), Some(15.0)).unwrap();
        assert_eq!((lb, ub), (1, 3));
    }

    #[test]
    fn test_blob_roundtrip() {
        let spec = BinningSpecification::explicit_bins(vec![1.0, 2.0, 3.0]).unwrap();
        let blob = spec.to_blob().unwrap();
        let decoded = BinningSpecification::from_blob(&blob).unwrap();
        assert_eq!(spec, decoded);
    }

    proptest! {
        #[test]
        fn test_sigbits_quantize_monotone(a in -1.0e6f64..1.0e6, b in -1.0e6f64..1.0e6) {
            let spec = BinningSpecification::sigbits(32).unwrap();
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(spec.quantize(lo).unwrap() <= spec.quantize(hi).unwrap());
        }
    }
}
