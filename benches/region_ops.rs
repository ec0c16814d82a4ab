// benches/region_ops.rs
//
// Compares set-operation cost across region encodings, replacing the
// teacher's external-process tabix-vs-hgidx comparisons (benches/bench.rs,
// benches/query_benchmark.rs) with an in-process comparison across this
// crate's own encodings.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use pique::region::bitmap::BitmapRegion;
use pique::region::cblq::CblqRegion;
use pique::region::cii::CiiRegion;
use pique::region::ii::IiRegion;
use pique::region::wah::WahRegion;
use pique::region::{RegionEncoding, SetOp};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const DOMAIN_SIZE: u64 = 1_000_000;

fn random_sorted_rids(seed: u64, domain_size: u64, density: f64) -> Vec<u32> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut rids: Vec<u32> = (0..domain_size as u32).filter(|_| rng.gen::<f64>() < density).collect();
    rids.sort_unstable();
    rids
}

fn encodings_at(density: f64) -> Vec<(&'static str, RegionEncoding, RegionEncoding)> {
    let a = random_sorted_rids(1, DOMAIN_SIZE, density);
    let b = random_sorted_rids(2, DOMAIN_SIZE, density);
    vec![
        (
            "ii",
            RegionEncoding::Ii(IiRegion::from_sorted_rids(DOMAIN_SIZE, a.clone())),
            RegionEncoding::Ii(IiRegion::from_sorted_rids(DOMAIN_SIZE, b.clone())),
        ),
        (
            "cii",
            RegionEncoding::Cii(CiiRegion::from_sorted_rids(DOMAIN_SIZE, a.clone())),
            RegionEncoding::Cii(CiiRegion::from_sorted_rids(DOMAIN_SIZE, b.clone())),
        ),
        (
            "wah",
            RegionEncoding::Wah(WahRegion::from_rids(DOMAIN_SIZE, &a)),
            RegionEncoding::Wah(WahRegion::from_rids(DOMAIN_SIZE, &b)),
        ),
        (
            "bitmap",
            RegionEncoding::Bitmap(BitmapRegion::from_rids(DOMAIN_SIZE, &a)),
            RegionEncoding::Bitmap(BitmapRegion::from_rids(DOMAIN_SIZE, &b)),
        ),
        (
            "cblq2",
            RegionEncoding::Cblq(CblqRegion::from_rids(2, DOMAIN_SIZE, &a)),
            RegionEncoding::Cblq(CblqRegion::from_rids(2, DOMAIN_SIZE, &b)),
        ),
    ]
}

fn bench_intersection(c: &mut Criterion) {
    let mut group = c.benchmark_group("region_intersection");
    for density in [0.001, 0.05, 0.3] {
        for (name, a, b) in encodings_at(density) {
            group.bench_with_input(BenchmarkId::new(name, density), &(a, b), |bencher, (a, b)| {
                bencher.iter(|| black_box(a.binary_same_type(black_box(b), SetOp::Intersection).unwrap()));
            });
        }
    }
    group.finish();
}

fn bench_union(c: &mut Criterion) {
    let mut group = c.benchmark_group("region_union");
    for density in [0.001, 0.05, 0.3] {
        for (name, a, b) in encodings_at(density) {
            group.bench_with_input(BenchmarkId::new(name, density), &(a, b), |bencher, (a, b)| {
                bencher.iter(|| black_box(a.binary_same_type(black_box(b), SetOp::Union).unwrap()));
            });
        }
    }
    group.finish();
}

fn bench_not(c: &mut Criterion) {
    let mut group = c.benchmark_group("region_not");
    for density in [0.001, 0.05, 0.3] {
        for (name, a, _b) in encodings_at(density) {
            group.bench_with_input(BenchmarkId::new(name, density), &a, |bencher, a| {
                bencher.iter(|| black_box(a.not()));
            });
        }
    }
    group.finish();
}

criterion_group!(benches, bench_intersection, bench_union, bench_not);
criterion_main!(benches);
