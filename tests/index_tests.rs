use quadtile::{
    FileOffsetStore, MemoryOffsetStore, QuadTree, QuadtileError, Region, Result, SearchHit,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use tempfile::NamedTempFile;

fn random_boxes(n: usize, seed: u64) -> Vec<Region> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|_| {
            let x = rng.gen_range(0.0..990.0);
            let y = rng.gen_range(0.0..990.0);
            let w = rng.gen_range(0.1..10.0);
            let h = rng.gen_range(0.1..10.0);
            Region::new(x, y, x + w, y + h)
        })
        .collect()
}

#[test]
fn test_randomized_search_matches_brute_force() {
    let boxes = random_boxes(500, 42);
    let world = Region::new(0.0, 0.0, 1000.0, 1000.0);
    let offsets = Arc::new(MemoryOffsetStore::new(
        (0..boxes.len() as u64).map(|i| i * 32).collect(),
    ));

    let mut tree = QuadTree::new(boxes.len() as u32, 0, world, offsets).unwrap();
    for (i, b) in boxes.iter().enumerate() {
        tree.insert(i as u32, *b).unwrap();
    }
    tree.trim().unwrap();

    let mut rng = StdRng::seed_from_u64(7);
    for _ in 0..20 {
        let x = rng.gen_range(0.0..900.0);
        let y = rng.gen_range(0.0..900.0);
        let query = Region::new(x, y, x + 100.0, y + 100.0);

        // Candidate supersets still have to include every true match.
        let mut found: Vec<u32> = tree
            .search_with_batch_size(query, 16)
            .unwrap()
            .collect::<Result<Vec<SearchHit>>>()
            .unwrap()
            .iter()
            .map(|h| h.record_number)
            .collect();
        found.sort_unstable();
        found.dedup();

        for (i, b) in boxes.iter().enumerate() {
            if b.intersects(&query) {
                assert!(
                    found.contains(&(i as u32 + 1)),
                    "record {} intersecting {:?} missing from candidates",
                    i + 1,
                    query
                );
            }
        }
    }
}

#[test]
fn test_search_resolves_offsets_from_disk() {
    let temp = NamedTempFile::new().unwrap();
    let offsets: Vec<u64> = (0..100u64).map(|i| i * 50 + 100).collect();
    FileOffsetStore::write(temp.path(), &offsets).unwrap();
    let store = Arc::new(FileOffsetStore::open(temp.path()).unwrap());

    let world = Region::new(0.0, 0.0, 100.0, 100.0);
    let mut tree = QuadTree::new(100, 0, world, store).unwrap();
    for i in 0..100u32 {
        let x = (i % 10) as f64 * 10.0;
        let y = (i / 10) as f64 * 10.0;
        tree.insert(i, Region::new(x, y, x + 1.0, y + 1.0)).unwrap();
    }

    let hits: Vec<SearchHit> = tree
        .search(world)
        .unwrap()
        .collect::<Result<Vec<_>>>()
        .unwrap();
    assert_eq!(hits.len(), 100);
    for hit in &hits {
        let id = hit.record_number - 1;
        assert_eq!(hit.offset, u64::from(id) * 50 + 100);
    }
}

#[test]
fn test_trim_preserves_results() {
    let boxes = random_boxes(200, 9);
    let world = Region::new(0.0, 0.0, 1000.0, 1000.0);
    let offsets = Arc::new(MemoryOffsetStore::new(
        (0..boxes.len() as u64).collect(),
    ));

    let mut tree = QuadTree::new(boxes.len() as u32, 6, world, offsets).unwrap();
    for (i, b) in boxes.iter().enumerate() {
        tree.insert(i as u32, *b).unwrap();
    }

    let collect = |tree: &QuadTree| -> Vec<u32> {
        let mut ids: Vec<u32> = tree
            .search(world)
            .unwrap()
            .collect::<Result<Vec<SearchHit>>>()
            .unwrap()
            .iter()
            .map(|h| h.record_number)
            .collect();
        ids.sort_unstable();
        ids
    };

    let before = collect(&tree);
    tree.trim().unwrap();
    let after = collect(&tree);
    assert_eq!(before, after);
}

#[test]
fn test_concurrent_searches_from_threads() {
    let world = Region::new(0.0, 0.0, 100.0, 100.0);
    let offsets = Arc::new(MemoryOffsetStore::new((0..400u64).map(|i| i * 8).collect()));

    let mut tree = QuadTree::new(400, 0, world, offsets).unwrap();
    for i in 0..400u32 {
        let x = (i % 20) as f64 * 5.0;
        let y = (i / 20) as f64 * 5.0;
        tree.insert(i, Region::new(x, y, x + 1.0, y + 1.0)).unwrap();
    }
    let tree = Arc::new(tree);

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let tree = Arc::clone(&tree);
            std::thread::spawn(move || {
                let q = Region::new(0.0, 0.0, 25.0 * (t + 1) as f64, 100.0);
                tree.search_with_batch_size(q, 11)
                    .unwrap()
                    .collect::<Result<Vec<SearchHit>>>()
                    .unwrap()
                    .len()
            })
        })
        .collect();

    let mut counts: Vec<usize> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    // Wider queries see at least as many candidates.
    let sorted = {
        let mut c = counts.clone();
        c.sort_unstable();
        c
    };
    assert_eq!(counts, sorted);
    counts.dedup();
    assert!(*counts.last().unwrap() == 400);
}

#[test]
fn test_close_refuses_while_iterator_open() {
    let world = Region::new(0.0, 0.0, 100.0, 100.0);
    let offsets = Arc::new(MemoryOffsetStore::new((0..10u64).collect()));
    let mut tree = QuadTree::new(10, 1, world, offsets).unwrap();
    for i in 0..10u32 {
        tree.insert(i, Region::new(1.0, 1.0, 2.0, 2.0)).unwrap();
    }

    let iter = tree.search(world).unwrap();
    assert!(matches!(
        tree.close(),
        Err(QuadtileError::OpenIterators(1))
    ));

    iter.close();
    tree.close().unwrap();
    assert!(matches!(tree.search(world), Err(QuadtileError::Closed)));
}
