// tests/scenarios.rs
//
// End-to-end scenarios exercising the real on-disk wire format, the
// reference-counted partition cache, and the full query engine together,
// rather than any one module in isolation. Grounded on the teacher's own
// `tests/` integration style (round-tripping through `tempfile::TempDir` and
// asserting on real file contents rather than in-memory fixtures).

use pique::error::PiqueError;
use pique::io::cache::IndexIoCache;
use pique::io::file::{write_index_file, FileIndexIo, PartitionBuildData};
use pique::io::{IndexIo, IndexPartitionIo};
use pique::query::database::DataVariable;
use pique::query::plan::compute_optimal_region_math_for_bin_range;
use pique::region::cii::CiiRegion;
use pique::region::setops::{PreferenceListSetOperations, SetOperations};
use pique::region::{make_null_region, new_encoder, RegionEncoding, RegionEncodingType, SetOp};
use pique::{constraint, or, BinningSpecification, ComplementMode, Database, EngineConfig, IndexEncodingId};
use std::collections::BTreeMap;
use std::path::PathBuf;

fn quantize_domain(domain: &[f64], spec: &BinningSpecification) -> (Vec<i64>, Vec<Vec<u64>>) {
    let mut by_key: BTreeMap<i64, Vec<u64>> = BTreeMap::new();
    for (rid, &v) in domain.iter().enumerate() {
        let key = spec.quantize(v).unwrap();
        by_key.entry(key).or_default().push(rid as u64);
    }
    let bin_keys: Vec<i64> = by_key.keys().copied().collect();
    let bin_rids: Vec<Vec<u64>> = by_key.into_values().collect();
    (bin_keys, bin_rids)
}

fn region_from_rids(ty: RegionEncodingType, domain_size: u64, rids: &[u64]) -> RegionEncoding {
    let mut enc = new_encoder(ty, domain_size);
    for &r in rids {
        enc.insert_bits(r, 1);
    }
    enc.finalize(domain_size);
    enc.into_encoding()
}

fn union_rids(sets: impl IntoIterator<Item = Vec<u64>>) -> Vec<u64> {
    let mut acc: std::collections::BTreeSet<u64> = std::collections::BTreeSet::new();
    for s in sets {
        acc.extend(s);
    }
    acc.into_iter().collect()
}

fn lowbit(x: u32) -> u32 {
    x & x.wrapping_neg()
}

fn num_bit_levels(nbins: u32) -> u32 {
    let mut binbits = nbins.saturating_sub(1);
    let mut levels = 0;
    while binbits != 0 {
        binbits >>= 1;
        levels += 1;
    }
    levels
}

/// Builds each scheme's region layout directly from per-bin RID membership,
/// independent of the index_encoding modules' own internal helpers, so the
/// engine's traversal of `range_query` is the only thing under test.
fn equality_regions(bin_rids: &[Vec<u64>]) -> Vec<Vec<u64>> {
    bin_rids.to_vec()
}

fn range_regions(bin_rids: &[Vec<u64>]) -> Vec<Vec<u64>> {
    let nbins = bin_rids.len();
    (0..nbins - 1).map(|i| union_rids(bin_rids[0..=i].iter().cloned())).collect()
}

fn hierarchical_regions(bin_rids: &[Vec<u64>]) -> Vec<Vec<u64>> {
    let nbins = bin_rids.len() as u32;
    (0..nbins - 1)
        .map(|i| {
            let lo = i + 1 - lowbit(i + 1);
            union_rids(bin_rids[lo as usize..=i as usize].iter().cloned())
        })
        .collect()
}

fn binary_component_regions(bin_rids: &[Vec<u64>]) -> Vec<Vec<u64>> {
    let nbins = bin_rids.len() as u32;
    let levels = num_bit_levels(nbins);
    (0..levels)
        .map(|layer| union_rids((0..nbins).filter(|b| b & (1 << layer) == 0).map(|b| bin_rids[b as usize].clone())))
        .collect()
}

fn interval_regions(bin_rids: &[Vec<u64>]) -> Vec<Vec<u64>> {
    let nbins = bin_rids.len() as u32;
    let h = nbins.div_ceil(2);
    let nregions = nbins - h + 1;
    (0..nregions)
        .map(|i| union_rids(bin_rids[i as usize..(i + h) as usize].iter().cloned()))
        .collect()
}

fn build_partition(
    bin_keys: Vec<i64>,
    region_rids: Vec<Vec<u64>>,
    domain_size: u64,
    spec_blob: Vec<u8>,
    index_encoding_id: IndexEncodingId,
    region_ty: RegionEncodingType,
) -> PartitionBuildData {
    let regions = region_rids.iter().map(|rids| region_from_rids(region_ty, domain_size, rids)).collect();
    PartitionBuildData {
        partition_id: 0,
        begin_rid: 0,
        end_rid: domain_size,
        domain_size,
        nbins: bin_keys.len() as u32,
        bin_keys,
        binning_spec_blob: spec_blob,
        index_encoding_id: index_encoding_id.wire_tag(),
        region_encoding: region_ty,
        regions,
    }
}

fn write_single_variable_db(dir: &std::path::Path, name: &str, partition: PartitionBuildData) -> Database {
    let file_name = format!("{name}.idx");
    write_index_file(dir.join(&file_name), &[partition]).unwrap();
    let mut db = Database::new();
    db.add_variable(DataVariable::new(name, dir, None, Some(PathBuf::from(file_name))));
    db
}

const DOMAIN: [f64; 16] = [0.0, 0.0, 0.0, 2.0, 1.0, 1.0, 1.0, 0.0, 2.0, 2.0, 2.0, 1.0, 0.0, 0.0, 1.0, 0.0];
const EXPECTED_ZERO_OR_TWO: [u64; 11] = [0, 1, 2, 3, 7, 8, 9, 10, 12, 13, 15];

fn zero_or_two_query() -> pique::Query {
    or(constraint("var", Some(0.0), Some(0.5)), constraint("var", Some(2.0), Some(2.5)))
}

fn run_single_partition_query(db: Database, query: pique::Query) -> Vec<u64> {
    let engine = pique::QueryEngine::open(db, EngineConfig::default()).unwrap();
    let mut cursor = engine.evaluate(query).unwrap();
    let mut rids = Vec::new();
    for result in &mut cursor {
        let result = result.unwrap();
        rids.extend(result.region.to_rids(result.begin_rid));
    }
    rids.sort_unstable();
    rids
}

#[test]
fn s1_equality_small_dataset() {
    let spec = BinningSpecification::sigbits(31).unwrap();
    let (bin_keys, bin_rids) = quantize_domain(&DOMAIN, &spec);
    assert_eq!(bin_keys.len(), 3, "domain has exactly three distinct values");

    let dir = tempfile::tempdir().unwrap();
    let partition = build_partition(
        bin_keys,
        equality_regions(&bin_rids),
        DOMAIN.len() as u64,
        spec.to_blob().unwrap(),
        IndexEncodingId::Equality,
        RegionEncodingType::Wah,
    );
    let db = write_single_variable_db(dir.path(), "var", partition);

    let rids = run_single_partition_query(db, zero_or_two_query());
    assert_eq!(rids, EXPECTED_ZERO_OR_TWO);
}

#[test]
fn s2_cross_encoding_parity() {
    let spec = BinningSpecification::sigbits(31).unwrap();
    let (bin_keys, bin_rids) = quantize_domain(&DOMAIN, &spec);
    let domain_size = DOMAIN.len() as u64;

    let cases: Vec<(IndexEncodingId, Vec<Vec<u64>>)> = vec![
        (IndexEncodingId::Range, range_regions(&bin_rids)),
        (IndexEncodingId::Hierarchical, hierarchical_regions(&bin_rids)),
        (IndexEncodingId::BinaryComponent, binary_component_regions(&bin_rids)),
        (IndexEncodingId::Interval, interval_regions(&bin_rids)),
    ];

    for (scheme_id, region_rids) in cases {
        let dir = tempfile::tempdir().unwrap();
        let partition = build_partition(
            bin_keys.clone(),
            region_rids,
            domain_size,
            spec.to_blob().unwrap(),
            scheme_id,
            RegionEncodingType::Ii,
        );
        let db = write_single_variable_db(dir.path(), "var", partition);
        let rids = run_single_partition_query(db, zero_or_two_query());
        assert_eq!(rids, EXPECTED_ZERO_OR_TWO, "{scheme_id:?} disagreed with the equality baseline");
    }
}

struct FakePartition {
    metadata: pique::io::PartitionMetadata,
    sizes: Vec<u64>,
}

impl IndexPartitionIo for FakePartition {
    fn partition_metadata(&self) -> &pique::io::PartitionMetadata {
        &self.metadata
    }
    fn read_region(&self, _region_id: u32) -> Result<RegionEncoding, PiqueError> {
        Ok(make_null_region(RegionEncodingType::Ii, 100))
    }
    fn regions_size_in_bytes(&self, begin: u32, _end: u32) -> Result<u64, PiqueError> {
        Ok(self.sizes[begin as usize])
    }
    fn bin_keys(&self) -> Result<&[pique::io::BinKey], PiqueError> {
        Ok(&[])
    }
}

#[test]
fn s3_complement_selection_under_every_mode() {
    let nbins = 8u32;
    let partition = FakePartition {
        metadata: pique::io::PartitionMetadata {
            domain_size: 100,
            nbins,
            index_encoding_id: IndexEncodingId::Equality.wire_tag(),
            region_encoding_id: RegionEncodingType::Ii,
            nregions: nbins,
            binning_spec_blob: BinningSpecification::precision(0).to_blob().unwrap(),
        },
        sizes: vec![10; nbins as usize],
    };

    let never = compute_optimal_region_math_for_bin_range(IndexEncodingId::Equality, nbins, 1, 7, ComplementMode::Never, &partition).unwrap();
    assert_eq!(never.candidate_costs.len(), 1);
    assert!(!never.is_complement);

    let auto = compute_optimal_region_math_for_bin_range(IndexEncodingId::Equality, nbins, 1, 7, ComplementMode::Auto, &partition).unwrap();
    assert_eq!(auto.candidate_costs, vec![60, 20]);
    assert!(auto.is_complement, "AUTO must prefer the 2-region complement over the 6-region direct plan");

    let always = compute_optimal_region_math_for_bin_range(IndexEncodingId::Equality, nbins, 1, 7, ComplementMode::Always, &partition).unwrap();
    assert!(always.is_complement);
}

#[test]
fn s4_cii_not_and_de_morgan_identity() {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    let domain_size = 500u64;
    let mut rng = StdRng::seed_from_u64(7);
    let a_rids: Vec<u32> = (0..domain_size as u32).filter(|_| rng.gen::<f64>() < 0.3).collect();
    let b_rids: Vec<u32> = (0..domain_size as u32).filter(|_| rng.gen::<f64>() < 0.3).collect();

    let a = RegionEncoding::Cii(CiiRegion::from_sorted_rids(domain_size, a_rids));
    let b = RegionEncoding::Cii(CiiRegion::from_sorted_rids(domain_size, b_rids));

    let ops = PreferenceListSetOperations::default_pipeline();
    let direct = ops.binary(&a, &b, SetOp::Intersection).unwrap();

    let not_a = a.not();
    let not_b = b.not();
    let via_de_morgan = ops.binary(&not_a, &not_b, SetOp::Union).unwrap().not();

    assert_eq!(direct.to_rids(0), via_de_morgan.to_rids(0));
}

#[test]
fn s5_cache_release_unused_keeps_held_handles_alive() {
    let spec = BinningSpecification::precision(0);
    let (bin_keys, bin_rids) = quantize_domain(&DOMAIN, &spec);
    let dir = tempfile::tempdir().unwrap();
    let partition = build_partition(
        bin_keys,
        equality_regions(&bin_rids),
        DOMAIN.len() as u64,
        spec.to_blob().unwrap(),
        IndexEncodingId::Equality,
        RegionEncodingType::Ii,
    );
    let path = dir.path().join("var.idx");
    write_index_file(&path, &[partition]).unwrap();

    let cache = IndexIoCache::new(Box::new(move |_name: &str| Ok(Box::new(FileIndexIo::open(&path)?) as Box<dyn IndexIo>)));

    let held = cache.open_index_partition_io("var", 0).unwrap();
    cache.release_unused().unwrap();
    assert_eq!(held.partition_metadata().domain_size, DOMAIN.len() as u64);

    drop(held);
    cache.release_unused().unwrap();
    let reopened = cache.open_index_partition_io("var", 0).unwrap();
    assert_eq!(reopened.partition_metadata().domain_size, DOMAIN.len() as u64);
}

#[test]
fn s6_empty_and_filled_short_circuit_without_decoding_regions() {
    let spec = BinningSpecification::sigbits(31).unwrap();
    let (bin_keys, bin_rids) = quantize_domain(&DOMAIN, &spec);
    let domain_size = DOMAIN.len() as u64;

    let dir = tempfile::tempdir().unwrap();
    let partition = build_partition(
        bin_keys,
        equality_regions(&bin_rids),
        domain_size,
        spec.to_blob().unwrap(),
        IndexEncodingId::Equality,
        RegionEncodingType::Wah,
    );
    let db = write_single_variable_db(dir.path(), "var", partition);
    let engine = pique::QueryEngine::open(db, EngineConfig::default()).unwrap();

    // A constraint below every bin key: lb_bin == ub_bin == 0, EMPTY.
    let empty_query = constraint("var", Some(-1.0e9), Some(-1.0e9));
    let mut cursor = engine.evaluate(empty_query).unwrap();
    let result = cursor.next().unwrap().unwrap();
    assert_eq!(result.region.len(), 0);
    assert!(result.stats.constraints[0].short_circuited);
    assert_eq!(result.stats.total_io().region_reads, 0);

    // A fully open constraint: lb_bin == 0, ub_bin == nbins, FILLED.
    let filled_query = constraint("var", None, None);
    let mut cursor = engine.evaluate(filled_query).unwrap();
    let result = cursor.next().unwrap().unwrap();
    assert_eq!(result.region.len(), domain_size as usize);
    assert!(result.stats.constraints[0].short_circuited);
    assert_eq!(result.stats.total_io().region_reads, 0);
}
