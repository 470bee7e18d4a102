use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use quadtile::{MemoryOffsetStore, QuadTree, Region, Result, SearchHit};
use std::sync::Arc;

fn build_tree(n: u32) -> QuadTree {
    let world = Region::new(0.0, 0.0, 1000.0, 1000.0);
    let offsets = Arc::new(MemoryOffsetStore::new((0..u64::from(n)).map(|i| i * 32).collect()));
    let mut tree = QuadTree::new(n, 0, world, offsets).unwrap();
    let side = (n as f64).sqrt().ceil() as u32;
    let spacing = 1000.0 / side as f64;
    for i in 0..n {
        let x = (i % side) as f64 * spacing;
        let y = (i / side) as f64 * spacing;
        tree.insert(i, Region::new(x, y, x + 2.0, y + 2.0)).unwrap();
    }
    tree.trim().unwrap();
    tree
}

fn benchmark_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("tree_build");

    for &n in &[1_000u32, 10_000] {
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, &n| {
            b.iter(|| build_tree(black_box(n)))
        });
    }

    group.finish();
}

fn benchmark_search(c: &mut Criterion) {
    let mut group = c.benchmark_group("tree_search");

    let tree = build_tree(10_000);

    group.bench_function("window_1pct", |b| {
        b.iter(|| {
            tree.search(black_box(Region::new(400.0, 400.0, 500.0, 500.0)))
                .unwrap()
                .collect::<Result<Vec<SearchHit>>>()
                .unwrap()
        })
    });

    group.bench_function("window_full", |b| {
        b.iter(|| {
            tree.search(black_box(Region::new(0.0, 0.0, 1000.0, 1000.0)))
                .unwrap()
                .collect::<Result<Vec<SearchHit>>>()
                .unwrap()
        })
    });

    group.finish();
}

criterion_group!(benches, benchmark_build, benchmark_search);
criterion_main!(benches);
