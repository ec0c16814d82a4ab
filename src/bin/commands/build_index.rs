// bin/commands/build_index.rs
//
// Builds a single-partition EQUALITY-encoded index from a RAW dataset file.
// Grounded on commands/pack.rs's progress-bar/timing texture (deleted during
// this crate's conversion, preserved here in spirit) and on
// binning::BinningSpecification / region::new_encoder for the actual
// quantize-then-bucket work.

use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use pique::dataset::{Dataset, ElementOrder, IndexableDatatypeId, RawDataset};
use pique::error::PiqueError;
use pique::io::file::{write_index_file, PartitionBuildData};
use pique::region::{new_encoder, RegionEncodingType};
use pique::{BinningSpecification, IndexEncodingId};
use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::PathBuf;
use std::time::Instant;

#[derive(Args, Debug)]
pub struct BuildIndexArgs {
    /// Path to the raw, flat binary dataset file to index.
    #[arg(long)]
    pub input: PathBuf,

    /// Element type of the input file: i8, u8, i16, u16, i32, u32, i64, u64, f32, f64.
    #[arg(long)]
    pub datatype: String,

    /// Comma-separated dimension sizes, e.g. "1000" or "100,100".
    #[arg(long, value_delimiter = ',')]
    pub dims: Vec<u64>,

    /// Element order of the input file.
    #[arg(long, default_value = "c")]
    pub order: String,

    /// Quantizer: "sigbits:N", "precision:N", or "explicit:b0,b1,...".
    #[arg(long)]
    pub binning: String,

    /// Region encoding for the stored bitmaps: ii, cii, wah, bitmap, cblq2, cblq3, cblq4.
    #[arg(long, default_value = "wah")]
    pub region_encoding: String,

    /// Where to write the resulting index file.
    #[arg(long)]
    pub output: PathBuf,

    /// Variable name this index is registered under.
    #[arg(long)]
    pub variable: String,

    /// Optional catalog file to append (or create) an entry in, pointing at
    /// `--output` for `--variable`.
    #[arg(long)]
    pub catalog: Option<PathBuf>,

    /// Optional dataset metadata file path recorded in the catalog entry
    /// (not written by this command; pass a path you've prepared already).
    #[arg(long)]
    pub dataset_meta: Option<PathBuf>,
}

fn parse_order(s: &str) -> Result<ElementOrder, PiqueError> {
    match s {
        "c" => Ok(ElementOrder::RowMajor),
        "fortran" => Ok(ElementOrder::ColumnMajor),
        other => Err(PiqueError::UnknownDatasetFormat(other.to_string())),
    }
}

fn parse_binning(s: &str) -> Result<BinningSpecification, PiqueError> {
    let (kind, rest) = s
        .split_once(':')
        .ok_or_else(|| PiqueError::from(format!("malformed --binning spec: {s:?}")))?;
    match kind {
        "sigbits" => {
            let bits: u8 = rest.parse()?;
            BinningSpecification::sigbits(bits)
        }
        "precision" => {
            let digits: u8 = rest.parse()?;
            Ok(BinningSpecification::precision(digits))
        }
        "explicit" => {
            let boundaries: Vec<f64> = rest
                .split(',')
                .map(|t| t.parse::<f64>().map_err(|e| PiqueError::from(e.to_string())))
                .collect::<Result<_, _>>()?;
            BinningSpecification::explicit_bins(boundaries)
        }
        other => Err(PiqueError::from(format!("unknown binning kind: {other:?}"))),
    }
}

fn parse_region_encoding(s: &str) -> Result<RegionEncodingType, PiqueError> {
    match s {
        "ii" => Ok(RegionEncodingType::Ii),
        "cii" => Ok(RegionEncodingType::Cii),
        "wah" => Ok(RegionEncodingType::Wah),
        "bitmap" => Ok(RegionEncodingType::Bitmap),
        "cblq2" => Ok(RegionEncodingType::Cblq(2)),
        "cblq3" => Ok(RegionEncodingType::Cblq(3)),
        "cblq4" => Ok(RegionEncodingType::Cblq(4)),
        other => Err(PiqueError::UnknownRegionEncoding(other.to_string())),
    }
}

/// Builds one region per distinct bin key from a rid-ordered stream of bin
/// indices (`bin_of[rid]` is the position of that record's key in the sorted
/// distinct-key array). Rids arrive in ascending order within each bin
/// bucket, so `insert_bits` suffices without a separate sort.
fn build_equality_regions(ty: RegionEncodingType, domain_size: u64, bin_of: &[u32], nbins: usize) -> Vec<pique::region::RegionEncoding> {
    let mut encoders: Vec<Box<dyn pique::region::RegionEncoder>> = (0..nbins).map(|_| new_encoder(ty, domain_size)).collect();
    for (rid, &bin) in bin_of.iter().enumerate() {
        encoders[bin as usize].insert_bits(rid as u64, 1);
    }
    encoders
        .into_iter()
        .map(|mut enc| {
            enc.finalize(domain_size);
            enc.into_encoding()
        })
        .collect()
}

pub fn run(args: BuildIndexArgs) -> Result<(), PiqueError> {
    let start = Instant::now();
    let datatype = IndexableDatatypeId::from_name(&args.datatype)?;
    let order = parse_order(&args.order)?;
    let binning_spec = parse_binning(&args.binning)?;
    let region_ty = parse_region_encoding(&args.region_encoding)?;

    eprintln!("opening dataset {}", args.input.display());
    let dataset = RawDataset::open(&args.input, datatype, args.dims.clone(), order)?;
    let domain_size = dataset.element_count();

    let bar = ProgressBar::new(domain_size);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} values quantized")
            .map_err(PiqueError::from)?
            .progress_chars("##-"),
    );

    let mut stream = dataset.open_stream_full()?;
    let mut values = Vec::with_capacity(domain_size as usize);
    let mut chunk = Vec::new();
    loop {
        chunk.clear();
        let got = stream.next(65536, &mut chunk)?;
        if got == 0 {
            break;
        }
        values.extend_from_slice(&chunk);
        bar.inc(got);
    }
    bar.finish_and_clear();

    let mut bin_keys: Vec<i64> = Vec::with_capacity(values.len());
    for &v in &values {
        bin_keys.push(binning_spec.quantize(v)?);
    }
    let mut distinct: Vec<i64> = bin_keys.clone();
    distinct.sort_unstable();
    distinct.dedup();
    let nbins = distinct.len();

    let bin_of: Vec<u32> = bin_keys
        .iter()
        .map(|k| distinct.partition_point(|&d| d < *k) as u32)
        .collect();

    eprintln!("building {nbins} EQUALITY regions over {domain_size} records");
    let regions = build_equality_regions(region_ty, domain_size, &bin_of, nbins);

    let partition = PartitionBuildData {
        partition_id: 0,
        begin_rid: 0,
        end_rid: domain_size,
        domain_size,
        nbins: nbins as u32,
        bin_keys: distinct,
        binning_spec_blob: binning_spec.to_blob()?,
        index_encoding_id: IndexEncodingId::Equality.wire_tag(),
        region_encoding: region_ty,
        regions,
    };
    write_index_file(&args.output, &[partition])?;

    if let Some(catalog) = &args.catalog {
        let mut file = OpenOptions::new().create(true).append(true).open(catalog)?;
        let meta_field = args
            .dataset_meta
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "-".to_string());
        writeln!(file, "{} {} {}", args.variable, meta_field, args.output.display())?;
    }

    eprintln!(
        "wrote {} ({} bins, {} records) in {:.2?}",
        args.output.display(),
        nbins,
        domain_size,
        start.elapsed()
    );
    Ok(())
}
