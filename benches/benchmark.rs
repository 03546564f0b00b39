//! Run with:
//! ```bash
//! RUSTFLAGS="-C target-cpu=native" cargo bench --bench benchmark
//! ```

use annix::{new_index, Flavor, IvfOptions, PqOptions};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::{rngs::StdRng, Rng, SeedableRng};

/// OpenAI text-embedding-ada-002 / text-embedding-3-small output dimension.
const DIM: usize = 1536;
/// Number of vectors in the index for the main benchmarks.
const N_VECS: usize = 10_000;
/// Fixed RNG seed for reproducible benchmarks.
const SEED: u64 = 0xDEAD_BEEF_CAFE_BABE;

/// Generates `n * dim` random `f32`s, row-major. A seeded RNG keeps
/// benchmark data identical across runs, so comparisons are valid.
fn generate_random_vectors(n: usize, dim: usize, seed: u64) -> Vec<f32> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n * dim).map(|_| rng.gen::<f32>() * 2.0 - 1.0).collect()
}

/// Measures exhaustive Flat search: the baseline every other index family
/// is an approximation of.
fn bench_flat_search(c: &mut Criterion) {
    let data = generate_random_vectors(N_VECS, DIM, SEED);
    let mut idx = new_index(DIM, Flavor::Flat).unwrap();
    idx.add(&data).unwrap();
    let query = generate_random_vectors(1, DIM, SEED + 1);

    let mut group = c.benchmark_group("flat_search");
    group.throughput(Throughput::Elements(N_VECS as u64));
    group.bench_function(BenchmarkId::new("exhaustive", format!("{N_VECS}vecs_dim{DIM}")), |b| {
        b.iter(|| black_box(idx.search(black_box(&query), black_box(10))))
    });
    group.finish();
}

/// Measures PQ search: asymmetric distance computation against an 8-subspace,
/// 256-cluster-per-subspace codebook — the configuration that trades recall
/// for a 1536-float vector shrinking to 8 code bytes.
fn bench_pq_search(c: &mut Criterion) {
    let data = generate_random_vectors(N_VECS, DIM, SEED);
    let mut idx = new_index(
        DIM,
        Flavor::Pq {
            num_subspaces: 8,
            num_clusters: 256,
            options: PqOptions::default(),
        },
    )
    .unwrap();
    idx.train(&data).unwrap();
    idx.add(&data).unwrap();
    let query = generate_random_vectors(1, DIM, SEED + 1);

    let mut group = c.benchmark_group("pq_search");
    group.throughput(Throughput::Elements(N_VECS as u64));
    group.bench_function(BenchmarkId::new("adc_m8_c256", format!("{N_VECS}vecs_dim{DIM}")), |b| {
        b.iter(|| black_box(idx.search(black_box(&query), black_box(10))))
    });
    group.finish();
}

/// Measures IVF-Flat search: coarse routing to one of 100 partitions, each
/// searched exhaustively.
fn bench_ivf_flat_search(c: &mut Criterion) {
    let data = generate_random_vectors(N_VECS, DIM, SEED);
    let mut idx = new_index(
        DIM,
        Flavor::IvfFlat {
            num_clusters: 100,
            options: IvfOptions::default(),
        },
    )
    .unwrap();
    idx.train(&data).unwrap();
    idx.add(&data).unwrap();
    let query = generate_random_vectors(1, DIM, SEED + 1);

    let mut group = c.benchmark_group("ivf_flat_search");
    group.throughput(Throughput::Elements(N_VECS as u64));
    group.bench_function(BenchmarkId::new("nprobe1_c100", format!("{N_VECS}vecs_dim{DIM}")), |b| {
        b.iter(|| black_box(idx.search(black_box(&query), black_box(10))))
    });
    group.finish();
}

/// Measures how Flat search latency scales from 100 to 10,000 vectors.
/// Expected: roughly linear — each added vector costs one distance
/// computation. Super-linear behavior points at cache pressure.
fn bench_scaling(c: &mut Criterion) {
    let query = generate_random_vectors(1, DIM, SEED + 99);

    let mut group = c.benchmark_group("flat_scaling_by_n_vecs");
    for n in [100usize, 500, 1_000, 5_000, 10_000] {
        let data = generate_random_vectors(n, DIM, SEED);
        let mut idx = new_index(DIM, Flavor::Flat).unwrap();
        idx.add(&data).unwrap();
        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _n| {
            b.iter(|| black_box(idx.search(black_box(&query), black_box(10))))
        });
    }
    group.finish();
}

/// Measures how fast vectors can be added to an already-trained PQ index:
/// this bounds ingestion rate once training is amortized.
fn bench_pq_add(c: &mut Criterion) {
    let train_data = generate_random_vectors(N_VECS, DIM, SEED);
    let one_vec = generate_random_vectors(1, DIM, SEED + 2);

    let mut group = c.benchmark_group("pq_add_throughput");
    group.throughput(Throughput::Elements(1));
    group.bench_function("add_single_vector", |b| {
        b.iter_batched(
            || {
                let mut idx = new_index(
                    DIM,
                    Flavor::Pq {
                        num_subspaces: 8,
                        num_clusters: 256,
                        options: PqOptions::default(),
                    },
                )
                .unwrap();
                idx.train(&train_data).unwrap();
                idx
            },
            |mut idx| {
                idx.add(black_box(&one_vec)).unwrap();
                idx
            },
            criterion::BatchSize::SmallInput,
        )
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_flat_search,
    bench_pq_search,
    bench_ivf_flat_search,
    bench_scaling,
    bench_pq_add,
);
criterion_main!(benches);
