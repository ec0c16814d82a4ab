// io/file.rs
//
// Bit-exact on-disk index format: a header of per-partition extents and
// offsets, followed by each partition's body at its declared offset. All
// integers little-endian; every variable-length field is `u64`-length-
// prefixed. Region payloads reuse `RegionEncoding::serialize`'s own
// self-delimited framing, concatenated into one blob per partition with a
// parallel offset array so a region can be sliced out without touching its
// neighbors.

use super::{BinKey, GlobalMetadata, IndexIo, IndexPartitionIo, PartitionExtent, PartitionMetadata};
use crate::error::PiqueError;
use crate::region::{RegionEncoding, RegionEncodingType};
use memmap2::Mmap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

const MAGIC: [u8; 4] = *b"PIQX";
const FORMAT_VERSION: u32 = 1;

/// Everything needed to write one partition's body. `regions[i]`'s wire tag
/// must equal `region_encoding`'s for every `i` (a partition is written with
/// one uniform region encoding).
pub struct PartitionBuildData {
    pub partition_id: u32,
    pub begin_rid: u64,
    pub end_rid: u64,
    pub domain_size: u64,
    pub nbins: u32,
    pub bin_keys: Vec<BinKey>,
    pub binning_spec_blob: Vec<u8>,
    pub index_encoding_id: u8,
    pub region_encoding: RegionEncodingType,
    pub regions: Vec<RegionEncoding>,
}

struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], PiqueError> {
        if self.pos + n > self.buf.len() {
            return Err(PiqueError::TruncatedRegion {
                expected: self.pos + n,
                got: self.buf.len(),
            });
        }
        let s = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(s)
    }

    fn u8(&mut self) -> Result<u8, PiqueError> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> Result<u32, PiqueError> {
        Ok(u32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    fn u64(&mut self) -> Result<u64, PiqueError> {
        Ok(u64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }

    fn i64(&mut self) -> Result<i64, PiqueError> {
        Ok(i64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }

    fn bytes(&mut self) -> Result<Vec<u8>, PiqueError> {
        let n = self.u64()? as usize;
        Ok(self.take(n)?.to_vec())
    }
}

fn write_bytes_field(out: &mut Vec<u8>, data: &[u8]) {
    out.extend_from_slice(&(data.len() as u64).to_le_bytes());
    out.extend_from_slice(data);
}

fn serialize_partition_body(p: &PartitionBuildData) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&p.domain_size.to_le_bytes());
    out.extend_from_slice(&p.nbins.to_le_bytes());
    out.extend_from_slice(&(p.bin_keys.len() as u64).to_le_bytes());
    for k in &p.bin_keys {
        out.extend_from_slice(&k.to_le_bytes());
    }
    write_bytes_field(&mut out, &p.binning_spec_blob);
    out.push(p.index_encoding_id);
    out.push(p.region_encoding.wire_tag());
    out.extend_from_slice(&(p.regions.len() as u32).to_le_bytes());

    let mut blob = Vec::new();
    let mut offsets = Vec::with_capacity(p.regions.len() + 1);
    for r in &p.regions {
        offsets.push(blob.len() as u64);
        r.serialize(&mut blob);
    }
    offsets.push(blob.len() as u64);

    out.extend_from_slice(&(offsets.len() as u64).to_le_bytes());
    for o in &offsets {
        out.extend_from_slice(&o.to_le_bytes());
    }
    write_bytes_field(&mut out, &blob);
    out
}

pub fn write_index_file(path: impl AsRef<Path>, partitions: &[PartitionBuildData]) -> Result<(), PiqueError> {
    let bodies: Vec<Vec<u8>> = partitions.iter().map(serialize_partition_body).collect();

    let header_fixed = 4 + 4 + 4;
    let header_per_partition = 4 + 8 + 8 + 8;
    let header_len = header_fixed + header_per_partition * partitions.len();

    let mut out = Vec::with_capacity(header_len + bodies.iter().map(|b| b.len()).sum::<usize>());
    out.extend_from_slice(&MAGIC);
    out.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    out.extend_from_slice(&(partitions.len() as u32).to_le_bytes());

    let mut offset = header_len as u64;
    for (p, body) in partitions.iter().zip(&bodies) {
        out.extend_from_slice(&p.partition_id.to_le_bytes());
        out.extend_from_slice(&p.begin_rid.to_le_bytes());
        out.extend_from_slice(&p.end_rid.to_le_bytes());
        out.extend_from_slice(&offset.to_le_bytes());
        offset += body.len() as u64;
    }
    for body in &bodies {
        out.extend_from_slice(body);
    }

    fs::write(path, out)?;
    Ok(())
}

struct HeaderEntry {
    partition_id: u32,
    begin_rid: u64,
    end_rid: u64,
    offset: u64,
}

fn parse_header(buf: &[u8]) -> Result<(Vec<HeaderEntry>, usize), PiqueError> {
    let mut c = Cursor::new(buf);
    let magic = c.take(4)?;
    if magic != MAGIC {
        return Err(PiqueError::TruncatedRegion {
            expected: 0,
            got: 0,
        });
    }
    let version = c.u32()?;
    if version != FORMAT_VERSION {
        return Err(PiqueError::VersionMismatch {
            expected: FORMAT_VERSION,
            found: version,
        });
    }
    let n = c.u32()? as usize;
    let mut entries = Vec::with_capacity(n);
    for _ in 0..n {
        let partition_id = c.u32()?;
        let begin_rid = c.u64()?;
        let end_rid = c.u64()?;
        let offset = c.u64()?;
        entries.push(HeaderEntry {
            partition_id,
            begin_rid,
            end_rid,
            offset,
        });
    }
    Ok((entries, c.pos))
}

pub struct FileIndexIo {
    #[allow(dead_code)]
    mmap: Mmap,
    global: GlobalMetadata,
    entries: Vec<HeaderEntry>,
}

impl FileIndexIo {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PiqueError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(PiqueError::MissingIndexFile(path.to_path_buf()));
        }
        let file = File::open(path)?;
        let mmap = unsafe { Mmap::map(&file)? };
        let (entries, _) = parse_header(&mmap)?;
        let mut extents: Vec<PartitionExtent> = entries
            .iter()
            .map(|e| PartitionExtent {
                partition_id: e.partition_id,
                begin_rid: e.begin_rid,
                end_rid: e.end_rid,
            })
            .collect();
        extents.sort_by_key(|e| e.begin_rid);
        let global = GlobalMetadata {
            partition_count: entries.len() as u32,
            extents,
        };
        Ok(Self { mmap, global, entries })
    }
}

impl IndexIo for FileIndexIo {
    fn global_metadata(&self) -> Result<GlobalMetadata, PiqueError> {
        Ok(self.global.clone())
    }

    fn get_partition(&self, partition_id: u32) -> Result<Box<dyn IndexPartitionIo>, PiqueError> {
        let entry = self
            .entries
            .iter()
            .find(|e| e.partition_id == partition_id)
            .ok_or_else(|| PiqueError::MalformedQuery(format!("no such partition: {partition_id}")))?;
        let mut c = Cursor::new(&self.mmap);
        c.pos = entry.offset as usize;
        let domain_size = c.u64()?;
        let nbins = c.u32()?;
        let nbin_keys = c.u64()? as usize;
        let mut bin_keys = Vec::with_capacity(nbin_keys);
        for _ in 0..nbin_keys {
            bin_keys.push(c.i64()?);
        }
        let binning_spec_blob = c.bytes()?;
        let index_encoding_id = c.u8()?;
        let region_wire_tag = c.u8()?;
        let region_encoding_id = RegionEncodingType::from_wire_tag(region_wire_tag)?;
        let nregions = c.u32()?;
        let noffsets = c.u64()? as usize;
        let mut region_offsets = Vec::with_capacity(noffsets);
        for _ in 0..noffsets {
            region_offsets.push(c.u64()?);
        }
        let region_blob = c.bytes()?;

        let metadata = PartitionMetadata {
            domain_size,
            nbins,
            index_encoding_id,
            region_encoding_id,
            nregions,
            binning_spec_blob,
        };
        Ok(Box::new(FilePartitionIo {
            metadata,
            bin_keys,
            region_offsets,
            region_blob,
        }))
    }
}

pub struct FilePartitionIo {
    metadata: PartitionMetadata,
    bin_keys: Vec<BinKey>,
    region_offsets: Vec<u64>,
    region_blob: Vec<u8>,
}

impl IndexPartitionIo for FilePartitionIo {
    fn partition_metadata(&self) -> &PartitionMetadata {
        &self.metadata
    }

    fn read_region(&self, region_id: u32) -> Result<RegionEncoding, PiqueError> {
        let i = region_id as usize;
        if i + 1 >= self.region_offsets.len() {
            return Err(PiqueError::MalformedQuery(format!("no such region: {region_id}")));
        }
        let start = self.region_offsets[i] as usize;
        let end = self.region_offsets[i + 1] as usize;
        let (region, _used) = RegionEncoding::deserialize(&self.region_blob[start..end])?;
        Ok(region)
    }

    fn regions_size_in_bytes(&self, begin: u32, end: u32) -> Result<u64, PiqueError> {
        let b = begin as usize;
        let e = end as usize;
        if e >= self.region_offsets.len() || b > e {
            return Err(PiqueError::MalformedQuery(format!(
                "region range out of bounds: [{begin}, {end})"
            )));
        }
        Ok(self.region_offsets[e] - self.region_offsets[b])
    }

    fn bin_keys(&self) -> Result<&[BinKey], PiqueError> {
        Ok(&self.bin_keys)
    }
}
