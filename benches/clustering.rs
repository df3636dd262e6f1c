use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use dbscan_index::cluster::{DbscanEngine, NeighborFinder, Strategy};
use dbscan_index::index::{KdTree, QuadTree, SpatialIndex};
use dbscan_index::PointSet;
use rand::prelude::*;

fn random_points(n: usize, seed: u64) -> PointSet {
    let mut rng = StdRng::seed_from_u64(seed);
    let coords = (0..n)
        .map(|_| vec![rng.random_range(0..10_000), rng.random_range(0..10_000)])
        .collect();
    PointSet::from_coords(coords).unwrap()
}

fn bench_neighbors(c: &mut Criterion) {
    let mut group = c.benchmark_group("neighbors");
    group.sample_size(10);

    let base = random_points(4_000, 42);
    for strategy in Strategy::ALL {
        group.bench_with_input(BenchmarkId::new(strategy.name(), base.len()), &strategy, |b, &s| {
            let finder = NeighborFinder::new(s);
            b.iter_batched(
                || base.clone(),
                |mut points| {
                    finder.find(&mut points, 150).unwrap();
                    black_box(points)
                },
                criterion::BatchSize::LargeInput,
            )
        });
    }

    group.finish();
}

fn bench_range_queries(c: &mut Criterion) {
    let mut group = c.benchmark_group("range_query");

    let points = random_points(20_000, 7);
    let kd = KdTree::build(&points).unwrap();
    let quad = QuadTree::balanced(&points).unwrap();
    let probe = points.coords(dbscan_index::PointId(123)).to_vec();

    group.bench_function("kd_tree_r200", |b| b.iter(|| black_box(kd.range_search(&probe, 200, None))));
    group.bench_function("quadtree_r200", |b| b.iter(|| black_box(quad.range_search(&probe, 200, None))));
    group.bench_function("quadtree_concurrent_r200", |b| {
        b.iter(|| black_box(quad.range_search_concurrent(&probe, 200, None).unwrap()))
    });
    group.bench_function("kd_tree_nearest_16", |b| b.iter(|| black_box(kd.nearest(&probe, 16, None))));

    group.finish();
}

fn bench_cluster(c: &mut Criterion) {
    let mut points = random_points(20_000, 3);
    NeighborFinder::new(Strategy::KdTree).find(&mut points, 100).unwrap();

    c.bench_function("dbscan_engine_n20000_min4", |b| {
        let engine = DbscanEngine::new(4).unwrap();
        b.iter(|| black_box(engine.cluster(&mut points).unwrap()))
    });
}

criterion_group!(benches, bench_neighbors, bench_range_queries, bench_cluster);
criterion_main!(benches);
