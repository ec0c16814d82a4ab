// dataset.rs
//
// The seam between the core and raw scientific data, per spec §6's dataset
// metadata file and dataset-stream contract. `Dataset`/`DatasetStream` are
// the only interface the core (and the CLI's `build-index`) depend on;
// `RawDataset` is the one concrete, in-scope implementation (a flat
// row-major binary file of a single fixed-width numeric type, spec's `RAW`
// variant). No HDF5 reader is implemented — out of scope per spec §1.
//
// Grounded on original_source/include/pique/data/dataset.hpp and
// dataset-raw.hpp; `Datatypes::CTypeToDatatypeID` templates become the
// `IndexableDatatypeId` match spec §9 asks for.

use crate::error::PiqueError;
use memmap2::Mmap;
use std::fs::File;
use std::path::{Path, PathBuf};

/// Concrete numeric element types the core can quantize. Mirrors the
/// original's `CTypeToDatatypeID` dispatch as a plain enum match, per
/// spec §9's re-architecture note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexableDatatypeId {
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    F32,
    F64,
}

impl IndexableDatatypeId {
    pub fn byte_width(self) -> usize {
        match self {
            IndexableDatatypeId::I8 | IndexableDatatypeId::U8 => 1,
            IndexableDatatypeId::I16 | IndexableDatatypeId::U16 => 2,
            IndexableDatatypeId::I32 | IndexableDatatypeId::U32 | IndexableDatatypeId::F32 => 4,
            IndexableDatatypeId::I64 | IndexableDatatypeId::U64 | IndexableDatatypeId::F64 => 8,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            IndexableDatatypeId::I8 => "i8",
            IndexableDatatypeId::U8 => "u8",
            IndexableDatatypeId::I16 => "i16",
            IndexableDatatypeId::U16 => "u16",
            IndexableDatatypeId::I32 => "i32",
            IndexableDatatypeId::U32 => "u32",
            IndexableDatatypeId::I64 => "i64",
            IndexableDatatypeId::U64 => "u64",
            IndexableDatatypeId::F32 => "f32",
            IndexableDatatypeId::F64 => "f64",
        }
    }

    pub fn from_name(name: &str) -> Result<Self, PiqueError> {
        Ok(match name {
            "i8" => IndexableDatatypeId::I8,
            "u8" => IndexableDatatypeId::U8,
            "i16" => IndexableDatatypeId::I16,
            "u16" => IndexableDatatypeId::U16,
            "i32" => IndexableDatatypeId::I32,
            "u32" => IndexableDatatypeId::U32,
            "i64" => IndexableDatatypeId::I64,
            "u64" => IndexableDatatypeId::U64,
            "f32" => IndexableDatatypeId::F32,
            "f64" => IndexableDatatypeId::F64,
            other => return Err(PiqueError::UnknownDatasetFormat(other.to_string())),
        })
    }

    /// Widens a little-endian element at `bytes` to `f64` for quantization.
    /// Lossy for `i64`/`u64`/`f64` magnitudes beyond 2^53, matching any
    /// double-precision quantizer; callers needing exact integer bins
    /// should use `SIGBITS` on the raw bit pattern instead.
    fn widen(self, bytes: &[u8]) -> f64 {
        match self {
            IndexableDatatypeId::I8 => bytes[0] as i8 as f64,
            IndexableDatatypeId::U8 => bytes[0] as f64,
            IndexableDatatypeId::I16 => i16::from_le_bytes(bytes.try_into().unwrap()) as f64,
            IndexableDatatypeId::U16 => u16::from_le_bytes(bytes.try_into().unwrap()) as f64,
            IndexableDatatypeId::I32 => i32::from_le_bytes(bytes.try_into().unwrap()) as f64,
            IndexableDatatypeId::U32 => u32::from_le_bytes(bytes.try_into().unwrap()) as f64,
            IndexableDatatypeId::I64 => i64::from_le_bytes(bytes.try_into().unwrap()) as f64,
            IndexableDatatypeId::U64 => u64::from_le_bytes(bytes.try_into().unwrap()) as f64,
            IndexableDatatypeId::F32 => f32::from_le_bytes(bytes.try_into().unwrap()) as f64,
            IndexableDatatypeId::F64 => f64::from_le_bytes(bytes.try_into().unwrap()),
        }
    }
}

/// Row-major (C) or column-major (Fortran) element ordering of the grid's
/// dimensions, per spec §6's `datatype c_or_fortran_order dim1 dim2 ...`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementOrder {
    RowMajor,
    ColumnMajor,
}

/// The shape of a dataset's domain. `element_count()` is the product of
/// `dims`; a 1-D dataset has `dims = [n]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grid {
    pub dims: Vec<u64>,
    pub order: ElementOrder,
}

impl Grid {
    pub fn element_count(&self) -> u64 {
        self.dims.iter().product()
    }
}

/// A contiguous, flattened subset of a dataset's linearized elements —
/// `open_stream` yields elements `[offset, offset+length)` in the grid's
/// row-major order, per spec §6's stream contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridSubset {
    pub offset: u64,
    pub length: u64,
}

impl GridSubset {
    pub fn whole(grid: &Grid) -> Self {
        Self {
            offset: 0,
            length: grid.element_count(),
        }
    }
}

/// Cumulative read-time/byte counters a stream exposes, per spec §6.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StreamIoStats {
    pub bytes_read: u64,
    pub read_time_nanos: u64,
}

pub trait DatasetStream {
    fn element_count(&self) -> u64;
    fn datatype(&self) -> IndexableDatatypeId;

    /// Reads up to `max` elements (widened to `f64`) into `out`, returning
    /// the count actually read (less than `max` only at end of stream).
    fn next(&mut self, max: u64, out: &mut Vec<f64>) -> Result<u64, PiqueError>;

    /// Reads exactly `count` elements (or until exhausted), looping `next`
    /// as the original's `next_fully` does.
    fn next_fully(&mut self, count: u64, out: &mut Vec<f64>) -> Result<u64, PiqueError> {
        let mut read = 0;
        while read < count {
            let got = self.next(count - read, out)?;
            if got == 0 {
                break;
            }
            read += got;
        }
        Ok(read)
    }

    fn stats(&self) -> StreamIoStats;
}

pub trait Dataset {
    fn element_count(&self) -> u64;
    fn datatype(&self) -> IndexableDatatypeId;
    fn grid(&self) -> &Grid;
    fn open_stream(&self, subset: GridSubset) -> Result<Box<dyn DatasetStream>, PiqueError>;

    fn open_stream_full(&self) -> Result<Box<dyn DatasetStream>, PiqueError> {
        self.open_stream(GridSubset::whole(self.grid()))
    }
}

/// A flat row-major binary file of one fixed-width numeric type, memory-
/// mapped for the same zero-copy-read reason `io::file::FileIndexIo` maps
/// index files.
pub struct RawDataset {
    mmap: Mmap,
    datatype: IndexableDatatypeId,
    grid: Grid,
}

impl RawDataset {
    pub fn open(path: impl AsRef<Path>, datatype: IndexableDatatypeId, dims: Vec<u64>, order: ElementOrder) -> Result<Self, PiqueError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(PiqueError::MissingIndexFile(path.to_path_buf()));
        }
        let file = File::open(path)?;
        let mmap = unsafe { Mmap::map(&file)? };
        let grid = Grid { dims, order };
        let expected = grid.element_count() as usize * datatype.byte_width();
        if mmap.len() < expected {
            return Err(PiqueError::TruncatedRegion {
                expected,
                got: mmap.len(),
            });
        }
        Ok(Self { mmap, datatype, grid })
    }

    pub fn path_hint(&self) -> Option<PathBuf> {
        None
    }
}

impl Dataset for RawDataset {
    fn element_count(&self) -> u64 {
        self.grid.element_count()
    }

    fn datatype(&self) -> IndexableDatatypeId {
        self.datatype
    }

    fn grid(&self) -> &Grid {
        &self.grid
    }

    fn open_stream(&self, subset: GridSubset) -> Result<Box<dyn DatasetStream>, PiqueError> {
        let width = self.datatype.byte_width();
        let start = subset.offset as usize * width;
        let end = start + subset.length as usize * width;
        if end > self.mmap.len() {
            return Err(PiqueError::TruncatedRegion {
                expected: end,
                got: self.mmap.len(),
            });
        }
        Ok(Box::new(RawDatasetStream {
            bytes: self.mmap[start..end].to_vec(),
            datatype: self.datatype,
            pos: 0,
            stats: StreamIoStats::default(),
        }))
    }
}

pub struct RawDatasetStream {
    bytes: Vec<u8>,
    datatype: IndexableDatatypeId,
    pos: usize,
    stats: StreamIoStats,
}

impl DatasetStream for RawDatasetStream {
    fn element_count(&self) -> u64 {
        (self.bytes.len() / self.datatype.byte_width()) as u64
    }

    fn datatype(&self) -> IndexableDatatypeId {
        self.datatype
    }

    fn next(&mut self, max: u64, out: &mut Vec<f64>) -> Result<u64, PiqueError> {
        let width = self.datatype.byte_width();
        let start = std::time::Instant::now();
        let mut count = 0u64;
        while count < max && self.pos + width <= self.bytes.len() {
            out.push(self.datatype.widen(&self.bytes[self.pos..self.pos + width]));
            self.pos += width;
            count += 1;
        }
        self.stats.bytes_read += count * width as u64;
        self.stats.read_time_nanos += start.elapsed().as_nanos() as u64;
        Ok(count)
    }

    fn stats(&self) -> StreamIoStats {
        self.stats
    }
}

/// Parses a spec §6 dataset metadata file's RAW variant body:
/// `datatype c_or_fortran_order dim1 dim2 ...`.
pub fn parse_raw_metadata(body: &str) -> Result<(IndexableDatatypeId, ElementOrder, Vec<u64>), PiqueError> {
    let mut tokens = body.split_whitespace();
    let datatype = IndexableDatatypeId::from_name(
        tokens
            .next()
            .ok_or_else(|| PiqueError::MalformedQuery("empty RAW dataset metadata".into()))?,
    )?;
    let order = match tokens.next() {
        Some("c") => ElementOrder::RowMajor,
        Some("fortran") => ElementOrder::ColumnMajor,
        Some(other) => return Err(PiqueError::UnknownDatasetFormat(other.to_string())),
        None => return Err(PiqueError::MalformedQuery("missing element order".into())),
    };
    let dims: Vec<u64> = tokens
        .map(|t| t.parse::<u64>().map_err(PiqueError::from))
        .collect::<Result<_, _>>()?;
    if dims.is_empty() {
        return Err(PiqueError::EmptyBinArray);
    }
    Ok((datatype, order, dims))
}

/// A parsed spec §6 dataset metadata file, before its referenced data file
/// is actually opened.
#[derive(Debug, Clone)]
pub struct DatasetMetaDescriptor {
    pub file_path: PathBuf,
    pub format: DatasetFormatDescriptor,
}

#[derive(Debug, Clone)]
pub enum DatasetFormatDescriptor {
    Raw {
        datatype: IndexableDatatypeId,
        order: ElementOrder,
        dims: Vec<u64>,
    },
    /// Parsed but never openable — no HDF5 reader is implemented, per
    /// spec §1's explicit out-of-scope list.
    Hdf5 { internal_path: String },
}

/// Parses a whole dataset metadata file: `RAW|HDF5`, then a file path,
/// then the format-specific remainder (§6). Tokens may be split across
/// lines or packed on one; only whitespace separates them.
pub fn parse_dataset_metadata(contents: &str) -> Result<DatasetMetaDescriptor, PiqueError> {
    let mut tokens = contents.split_whitespace();
    let variant = tokens
        .next()
        .ok_or_else(|| PiqueError::MalformedQuery("empty dataset metadata file".into()))?;
    let file_path = PathBuf::from(
        tokens
            .next()
            .ok_or_else(|| PiqueError::MalformedQuery("missing dataset file path".into()))?,
    );
    let rest: String = tokens.collect::<Vec<_>>().join(" ");
    let format = match variant {
        "RAW" => {
            let (datatype, order, dims) = parse_raw_metadata(&rest)?;
            DatasetFormatDescriptor::Raw { datatype, order, dims }
        }
        "HDF5" => {
            let internal_path = rest
                .split_whitespace()
                .next()
                .ok_or_else(|| PiqueError::MalformedQuery("missing HDF5 internal dataset path".into()))?
                .to_string();
            DatasetFormatDescriptor::Hdf5 { internal_path }
        }
        other => return Err(PiqueError::UnknownDatasetFormat(other.to_string())),
    };
    Ok(DatasetMetaDescriptor { file_path, format })
}

/// Opens the dataset a descriptor describes, resolved relative to
/// `base_dir` (the catalog file's own directory, per spec §6). HDF5
/// descriptors parse successfully but can never be opened.
pub fn open_described_dataset(descriptor: &DatasetMetaDescriptor, base_dir: &Path) -> Result<Box<dyn Dataset>, PiqueError> {
    let path = base_dir.join(&descriptor.file_path);
    match &descriptor.format {
        DatasetFormatDescriptor::Raw { datatype, order, dims } => {
            Ok(Box::new(RawDataset::open(path, *datatype, dims.clone(), *order)?))
        }
        DatasetFormatDescriptor::Hdf5 { .. } => Err(PiqueError::UnknownDatasetFormat(
            "HDF5 (reader not implemented; out of scope)".into(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_raw_dataset_roundtrip_i32() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.raw");
        let values: Vec<i32> = (0..100).collect();
        let mut file = File::create(&path).unwrap();
        for v in &values {
            file.write_all(&v.to_le_bytes()).unwrap();
        }
        drop(file);

        let ds = RawDataset::open(&path, IndexableDatatypeId::I32, vec![100], ElementOrder::RowMajor).unwrap();
        assert_eq!(ds.element_count(), 100);
        let mut stream = ds.open_stream_full().unwrap();
        let mut out = Vec::new();
        let read = stream.next_fully(100, &mut out).unwrap();
        assert_eq!(read, 100);
        assert_eq!(out, values.iter().map(|&v| v as f64).collect::<Vec<_>>());
    }

    #[test]
    fn test_raw_dataset_partial_subset() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.raw");
        let values: Vec<f32> = (0..50).map(|i| i as f32 * 0.5).collect();
        let mut file = File::create(&path).unwrap();
        for v in &values {
            file.write_all(&v.to_le_bytes()).unwrap();
        }
        drop(file);

        let ds = RawDataset::open(&path, IndexableDatatypeId::F32, vec![50], ElementOrder::RowMajor).unwrap();
        let mut stream = ds.open_stream(GridSubset { offset: 10, length: 5 }).unwrap();
        let mut out = Vec::new();
        stream.next_fully(5, &mut out).unwrap();
        assert_eq!(out, values[10..15].iter().map(|&v| v as f64).collect::<Vec<_>>());
    }

    #[test]
    fn test_parse_raw_metadata() {
        let (dt, order, dims) = parse_raw_metadata("f64 c 100 200").unwrap();
        assert_eq!(dt, IndexableDatatypeId::F64);
        assert_eq!(order, ElementOrder::RowMajor);
        assert_eq!(dims, vec![100, 200]);
    }

    #[test]
    fn test_truncated_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.raw");
        std::fs::write(&path, [0u8; 4]).unwrap();
        let err = RawDataset::open(&path, IndexableDatatypeId::I64, vec![10], ElementOrder::RowMajor).unwrap_err();
        assert!(matches!(err, PiqueError::TruncatedRegion { .. }));
    }

    #[test]
    fn test_parse_dataset_metadata_raw_multiline() {
        let descriptor = parse_dataset_metadata("RAW\ndata.raw\nf64 c 10 20\n").unwrap();
        assert_eq!(descriptor.file_path, PathBuf::from("data.raw"));
        match descriptor.format {
            DatasetFormatDescriptor::Raw { datatype, dims, .. } => {
                assert_eq!(datatype, IndexableDatatypeId::F64);
                assert_eq!(dims, vec![10, 20]);
            }
            _ => panic!("expected RAW"),
        }
    }

    #[test]
    fn test_parse_dataset_metadata_hdf5_parses_but_cannot_open() {
        let descriptor = parse_dataset_metadata("HDF5 data.h5 /group/temperature").unwrap();
        let err = open_described_dataset(&descriptor, Path::new(".")).unwrap_err();
        assert!(matches!(err, PiqueError::UnknownDatasetFormat(_)));
    }

    #[test]
    fn test_parse_dataset_metadata_unknown_variant_errors() {
        assert!(parse_dataset_metadata("XML foo.xml").is_err());
    }
}
