//! Build a small index, run a windowed search, then serve features through
//! the cache.
//!
//! Run with: cargo run --example getting_started

use quadtile::{
    Feature, FeatureCache, FeatureSource, MemoryFeatureSource, MemoryOffsetStore, QuadTree,
    QuadtileError, Region, SearchHit,
};
use bytes::Bytes;
use std::sync::Arc;

fn main() -> Result<(), QuadtileError> {
    env_logger::init();

    let world = Region::new(0.0, 0.0, 100.0, 100.0);

    // Index 100 records laid out on a grid.
    let offsets = Arc::new(MemoryOffsetStore::new((0..100u64).map(|i| i * 64).collect()));
    let mut tree = QuadTree::new(100, 0, world, offsets)?;
    for i in 0..100u32 {
        let x = (i % 10) as f64 * 10.0;
        let y = (i / 10) as f64 * 10.0;
        tree.insert(i, Region::new(x, y, x + 1.0, y + 1.0))?;
    }
    tree.trim()?;

    let window = Region::new(0.0, 0.0, 30.0, 30.0);
    let hits = tree
        .search(window)?
        .collect::<quadtile::Result<Vec<SearchHit>>>()?;
    println!("window search: {} candidate records", hits.len());
    for hit in hits.iter().take(3) {
        println!("  record #{} at byte offset {}", hit.record_number, hit.offset);
    }

    // Cache features over a slow backing source.
    let features: Vec<Feature> = (0..100u32)
        .map(|i| {
            let x = (i % 10) as f64 * 10.0;
            let y = (i / 10) as f64 * 10.0;
            Feature::new(
                format!("feat-{i}"),
                Region::new(x, y, x + 1.0, y + 1.0),
                Bytes::from(format!("payload {i}")),
            )
        })
        .collect();

    let source = Arc::new(MemoryFeatureSource::new(features));
    let cache = FeatureCache::builder()
        .source(source.clone())
        .bounds(source.bounds()?)
        .grid(10, 10)
        .build()?;

    let first = cache.get(&window)?;
    let second = cache.get(&window)?;
    println!(
        "cache: {} features, stats after two reads: {:?}",
        first.len(),
        cache.stats()
    );
    assert_eq!(first.id_set(), second.id_set());

    tree.close()?;
    cache.dispose()?;
    Ok(())
}
