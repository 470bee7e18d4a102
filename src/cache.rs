//! Tile-based feature cache layered over a slower backing source.
//!
//! The cache asks its [`GridTracker`] which grid cells of a requested
//! envelope are already valid; hits are answered from the tracker's cached
//! payloads, misses are fetched from the backing [`FeatureSource`] and
//! registered. All tracker mutation happens under a write lock, read-only
//! traversal under a read lock, and backing-store fetches run with no lock
//! held at all so a slow fetch never blocks concurrent readers.

use crate::error::{QuadtileError, Result};
use crate::feature::{FeatureCollection, FeatureSource};
use crate::region::Region;
use crate::tracker::{CollectVisitor, GridTracker, NodeOp};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cache configuration.
///
/// Serializable with defaulted fields so it can be loaded from JSON or
/// embedded in a larger application config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Maximum number of features a single `put` may carry; `None` means
    /// unlimited.
    #[serde(default)]
    pub capacity: Option<usize>,

    /// Above this many missing cells, a match collapses them into one
    /// enclosing envelope: fewer, larger backing-store queries beat many
    /// small ones once fragmentation is high.
    #[serde(default = "CacheConfig::default_max_tiles")]
    pub max_tiles: usize,

    /// Grid rows in the tracker.
    #[serde(default = "CacheConfig::default_grid_dimension")]
    pub grid_rows: usize,

    /// Grid columns in the tracker.
    #[serde(default = "CacheConfig::default_grid_dimension")]
    pub grid_cols: usize,
}

impl CacheConfig {
    const fn default_max_tiles() -> usize {
        10
    }

    const fn default_grid_dimension() -> usize {
        32
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: None,
            max_tiles: Self::default_max_tiles(),
            grid_rows: Self::default_grid_dimension(),
            grid_cols: Self::default_grid_dimension(),
        }
    }
}

/// Counters describing cache behavior since creation (or the last `clear`).
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStats {
    /// Envelope matches answered.
    pub accesses: u64,
    /// Matches with no missing cells.
    pub hits: u64,
    /// Matches with at least one missing cell.
    pub misses: u64,
    /// Successful puts.
    pub puts: u64,
    /// Invalidations via `remove`.
    pub invalidations: u64,
}

/// Result of matching a query envelope against the cache.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheMatch {
    /// The query clipped to the cache universe; `None` when disjoint.
    pub query: Option<Region>,
    /// Regions that must be fetched from the backing source. Empty for a
    /// full hit (or a disjoint query).
    pub missing: Vec<Region>,
}

impl CacheMatch {
    /// True when the clipped query is fully covered by valid cells.
    pub fn is_hit(&self) -> bool {
        self.query.is_some() && self.missing.is_empty()
    }
}

/// A read/write-locked feature cache over a grid tracker and a backing
/// source.
///
/// Validity follows `unknown -> missing -> valid` per region, with
/// `valid -> missing` on invalidation and a full reset only via
/// [`clear`](FeatureCache::clear). Two racing readers may both see a region
/// as missing and fetch it twice; that duplicate fetch is an accepted
/// trade-off of fetching outside the lock, not an error.
pub struct FeatureCache {
    tracker: RwLock<GridTracker>,
    source: Arc<dyn FeatureSource>,
    capacity: Option<usize>,
    max_tiles: usize,
    disposed: AtomicBool,
    stats: Mutex<CacheStats>,
}

impl FeatureCache {
    /// Start building a cache.
    pub fn builder() -> FeatureCacheBuilder {
        FeatureCacheBuilder::new()
    }

    fn new(
        source: Arc<dyn FeatureSource>,
        bounds: Region,
        config: CacheConfig,
    ) -> Result<Self> {
        let tracker = GridTracker::new(bounds, config.grid_rows, config.grid_cols)?;
        Ok(Self {
            tracker: RwLock::new(tracker),
            source,
            capacity: config.capacity,
            max_tiles: config.max_tiles,
            disposed: AtomicBool::new(false),
            stats: Mutex::new(CacheStats::default()),
        })
    }

    fn ensure_open(&self) -> Result<()> {
        if self.disposed.load(Ordering::SeqCst) {
            return Err(QuadtileError::Closed);
        }
        Ok(())
    }

    /// The cache's addressable universe: the tracker root region, which may
    /// exceed the occupied data extent.
    pub fn bounds(&self) -> Result<Region> {
        self.ensure_open()?;
        Ok(*self.tracker.read().bounds())
    }

    /// Match a query envelope against the cache: which parts are missing?
    ///
    /// The envelope is clipped to the cache universe; a disjoint envelope
    /// matches nothing. When more than `max_tiles` cells are missing, they
    /// collapse into a single enclosing envelope.
    pub fn match_regions(&self, envelope: &Region) -> Result<CacheMatch> {
        self.ensure_open()?;
        let result = {
            let tracker = self.tracker.read();
            match tracker.bounds().intersection(envelope) {
                None => CacheMatch {
                    query: None,
                    missing: Vec::new(),
                },
                Some(clipped) => {
                    let mut missing = tracker.missing_regions(&clipped);
                    if missing.len() > self.max_tiles {
                        log::debug!(
                            "collapsing {} missing cells into one fetch envelope",
                            missing.len()
                        );
                        let mut enclosing = missing[0];
                        for region in &missing[1..] {
                            enclosing.expand_to_include(region);
                        }
                        missing = vec![enclosing];
                    }
                    CacheMatch {
                        query: Some(clipped),
                        missing,
                    }
                }
            }
        };

        let mut stats = self.stats.lock();
        stats.accesses += 1;
        if result.query.is_some() {
            if result.missing.is_empty() {
                stats.hits += 1;
            } else {
                stats.misses += 1;
            }
        }
        Ok(result)
    }

    /// Reject collections larger than the configured capacity, before any
    /// mutation.
    pub fn is_oversized(&self, collection: &FeatureCollection) -> Result<()> {
        if let Some(capacity) = self.capacity {
            if collection.len() > capacity {
                return Err(QuadtileError::CapacityExceeded {
                    size: collection.len(),
                    capacity,
                });
            }
        }
        Ok(())
    }

    /// Store fetched features and mark `envelope` valid.
    ///
    /// Runs entirely under the write lock: register first, then insert. If
    /// any insertion fails the envelope is unregistered again, so validity
    /// flags never claim coverage that was not stored; features inserted
    /// before the failure are not removed (the flags are the source of
    /// truth for coverage).
    pub fn put(&self, collection: &FeatureCollection, envelope: &Region) -> Result<()> {
        self.ensure_open()?;
        self.is_oversized(collection)?;

        let mut tracker = self.tracker.write();
        tracker.apply(envelope, NodeOp::Validate);
        for feature in collection {
            if let Err(err) = tracker.insert(feature) {
                tracker.apply(envelope, NodeOp::Invalidate);
                return Err(err);
            }
        }
        drop(tracker);

        self.stats.lock().puts += 1;
        Ok(())
    }

    /// Return whatever is currently cached intersecting `envelope`, without
    /// triggering any fetch. Contents of cells not marked valid are
    /// included as-is; callers wanting guaranteed coverage use
    /// [`get`](FeatureCache::get).
    pub fn peek(&self, envelope: &Region) -> Result<FeatureCollection> {
        self.ensure_open()?;
        let tracker = self.tracker.read();
        let Some(clipped) = tracker.bounds().intersection(envelope) else {
            return Ok(FeatureCollection::new());
        };
        let mut visitor = CollectVisitor::new(clipped);
        tracker.visit(&clipped, &mut visitor);
        Ok(visitor.into_collection())
    }

    /// Answer a query, fetching missing regions from the backing source.
    ///
    /// The fetch runs with no cache lock held; a concurrent reader may
    /// observe the same region as missing and fetch it again, which is
    /// accepted.
    pub fn get(&self, envelope: &Region) -> Result<FeatureCollection> {
        let matched = self.match_regions(envelope)?;
        let Some(clipped) = matched.query else {
            return Ok(FeatureCollection::new());
        };

        for region in &matched.missing {
            let fetched = self.source.query(region)?;
            self.put(&fetched, region)?;
        }

        self.peek(&clipped)
    }

    /// Mark every cell intersecting `envelope` as missing. Payloads are
    /// kept; re-validation amortizes the write-back.
    pub fn remove(&self, envelope: &Region) -> Result<()> {
        self.ensure_open()?;
        self.tracker.write().apply(envelope, NodeOp::Invalidate);
        self.stats.lock().invalidations += 1;
        Ok(())
    }

    /// Mark every cell intersecting `envelope` valid, without touching
    /// access statistics.
    pub fn register(&self, envelope: &Region) -> Result<()> {
        self.ensure_open()?;
        self.tracker.write().apply(envelope, NodeOp::Validate);
        Ok(())
    }

    /// Mark every cell intersecting `envelope` missing, without touching
    /// access statistics.
    pub fn unregister(&self, envelope: &Region) -> Result<()> {
        self.ensure_open()?;
        self.tracker.write().apply(envelope, NodeOp::Invalidate);
        Ok(())
    }

    /// Drop all cached data and reset every region to unknown.
    pub fn clear(&self) -> Result<()> {
        self.ensure_open()?;
        self.tracker.write().clear();
        *self.stats.lock() = CacheStats::default();
        Ok(())
    }

    /// Clear and permanently close the cache; every subsequent operation
    /// fails with [`QuadtileError::Closed`].
    pub fn dispose(&self) -> Result<()> {
        self.clear()?;
        self.disposed.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Snapshot of the cache counters.
    pub fn stats(&self) -> CacheStats {
        *self.stats.lock()
    }
}

/// Builder for [`FeatureCache`], following the crate's builder conventions.
pub struct FeatureCacheBuilder {
    source: Option<Arc<dyn FeatureSource>>,
    bounds: Option<Region>,
    config: CacheConfig,
}

impl FeatureCacheBuilder {
    pub fn new() -> Self {
        Self {
            source: None,
            bounds: None,
            config: CacheConfig::default(),
        }
    }

    /// The backing feature source. Required.
    pub fn source(mut self, source: Arc<dyn FeatureSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// The cache universe. Defaults to the source's own bounds.
    pub fn bounds(mut self, bounds: Region) -> Self {
        self.bounds = Some(bounds);
        self
    }

    /// Cap the feature count of a single put.
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.config.capacity = Some(capacity);
        self
    }

    /// Missing-cell count above which a match collapses into one envelope.
    pub fn max_tiles(mut self, max_tiles: usize) -> Self {
        self.config.max_tiles = max_tiles;
        self
    }

    /// Tracker grid resolution.
    pub fn grid(mut self, rows: usize, cols: usize) -> Self {
        self.config.grid_rows = rows;
        self.config.grid_cols = cols;
        self
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: CacheConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Result<FeatureCache> {
        let source = self.source.ok_or_else(|| {
            QuadtileError::InvalidInput("feature cache requires a backing source".into())
        })?;
        let bounds = match self.bounds {
            Some(bounds) => bounds,
            None => source.bounds()?,
        };
        FeatureCache::new(source, bounds, self.config)
    }
}

impl Default for FeatureCacheBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::{Feature, MemoryFeatureSource};
    use bytes::Bytes;

    fn world() -> Region {
        Region::new(0.0, 0.0, 100.0, 100.0)
    }

    fn feature(id: &str, x: f64, y: f64) -> Feature {
        Feature::new(id, Region::new(x, y, x + 1.0, y + 1.0), Bytes::from("p"))
    }

    fn cache_over(features: Vec<Feature>) -> FeatureCache {
        FeatureCache::builder()
            .source(Arc::new(MemoryFeatureSource::new(features)))
            .bounds(world())
            .grid(10, 10)
            .build()
            .unwrap()
    }

    #[test]
    fn test_builder_requires_source() {
        assert!(matches!(
            FeatureCache::builder().bounds(world()).build(),
            Err(QuadtileError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_builder_defaults_bounds_to_source() {
        let cache = FeatureCache::builder()
            .source(Arc::new(MemoryFeatureSource::new(vec![
                feature("a", 0.0, 0.0),
                feature("b", 49.0, 49.0),
            ])))
            .build()
            .unwrap();
        assert_eq!(cache.bounds().unwrap(), Region::new(0.0, 0.0, 50.0, 50.0));
    }

    #[test]
    fn test_disjoint_match_is_nothing() {
        let cache = cache_over(vec![feature("a", 1.0, 1.0)]);
        let matched = cache
            .match_regions(&Region::new(500.0, 500.0, 600.0, 600.0))
            .unwrap();
        assert_eq!(matched.query, None);
        assert!(matched.missing.is_empty());
        assert!(!matched.is_hit());
    }

    #[test]
    fn test_partially_overlapping_match_is_clipped() {
        let cache = cache_over(vec![feature("a", 1.0, 1.0)]);
        let matched = cache
            .match_regions(&Region::new(90.0, 90.0, 200.0, 200.0))
            .unwrap();
        assert_eq!(matched.query, Some(Region::new(90.0, 90.0, 100.0, 100.0)));
        assert!(!matched.missing.is_empty());
    }

    #[test]
    fn test_excess_missing_cells_collapse() {
        let cache = FeatureCache::builder()
            .source(Arc::new(MemoryFeatureSource::new(vec![feature(
                "a", 1.0, 1.0,
            )])))
            .bounds(world())
            .grid(10, 10)
            .max_tiles(3)
            .build()
            .unwrap();

        // 25 missing cells > 3: collapsed to one enclosing envelope.
        let query = Region::new(0.0, 0.0, 49.0, 49.0);
        let matched = cache.match_regions(&query).unwrap();
        assert_eq!(matched.missing.len(), 1);
        assert!(matched.missing[0].contains(&query));
    }

    #[test]
    fn test_collapsed_fetch_leaves_boundary_neighbors_missing() {
        // The collapsed fetch envelope for a query over [0,35]^2 is the
        // cell-aligned [0,40]^2; cells that only touch its boundary hold no
        // fetched data and must stay missing.
        let cache = FeatureCache::builder()
            .source(Arc::new(MemoryFeatureSource::new(vec![
                feature("inside", 5.0, 5.0),
                feature("edge", 44.0, 44.0),
            ])))
            .bounds(world())
            .grid(10, 10)
            .max_tiles(3)
            .build()
            .unwrap();

        let got = cache.get(&Region::new(0.0, 0.0, 35.0, 35.0)).unwrap();
        assert!(got.contains_id("inside"));

        let beyond = Region::new(42.0, 42.0, 48.0, 48.0);
        let matched = cache.match_regions(&beyond).unwrap();
        assert!(!matched.missing.is_empty());

        let got = cache.get(&beyond).unwrap();
        assert!(got.contains_id("edge"));
    }

    #[test]
    fn test_put_does_not_validate_untouched_neighbor_cells() {
        let cache = cache_over(vec![feature("a", 1.0, 1.0)]);
        let fc: FeatureCollection = vec![feature("a", 1.0, 1.0)].into();

        cache.put(&fc, &Region::new(0.0, 0.0, 10.0, 10.0)).unwrap();

        // The envelope ends exactly on the cell boundary at 10; the next
        // cell over was never stored and must still report missing.
        let neighbor = Region::new(10.0, 0.0, 20.0, 10.0);
        assert!(!cache.match_regions(&neighbor).unwrap().is_hit());
    }

    #[test]
    fn test_oversized_put_rejected_before_mutation() {
        let cache = FeatureCache::builder()
            .source(Arc::new(MemoryFeatureSource::new(vec![feature(
                "a", 1.0, 1.0,
            )])))
            .bounds(world())
            .capacity(5)
            .build()
            .unwrap();

        let six: FeatureCollection = (0..6)
            .map(|i| feature(&format!("f{}", i), i as f64, 0.0))
            .collect::<Vec<_>>()
            .into();

        let before = cache.peek(&world()).unwrap();
        let err = cache
            .put(&six, &Region::new(0.0, 0.0, 10.0, 10.0))
            .unwrap_err();
        assert!(matches!(
            err,
            QuadtileError::CapacityExceeded {
                size: 6,
                capacity: 5
            }
        ));

        // Nothing changed: no features stored, no cells registered.
        assert_eq!(cache.peek(&world()).unwrap(), before);
        let matched = cache.match_regions(&Region::new(0.0, 0.0, 10.0, 10.0)).unwrap();
        assert!(!matched.missing.is_empty());
    }

    #[test]
    fn test_put_rollback_unregisters_on_insert_failure() {
        let cache = cache_over(vec![feature("a", 1.0, 1.0)]);
        let envelope = Region::new(0.0, 0.0, 20.0, 20.0);

        // The second feature lies outside the cache universe, failing the
        // insert after registration already happened.
        let poisoned: FeatureCollection =
            vec![feature("ok", 1.0, 1.0), feature("bad", 500.0, 500.0)].into();

        let err = cache.put(&poisoned, &envelope).unwrap_err();
        assert!(matches!(err, QuadtileError::InvalidInput(_)));

        // The envelope reports missing again.
        let matched = cache.match_regions(&envelope).unwrap();
        assert!(!matched.missing.is_empty());
    }

    #[test]
    fn test_register_unregister_flip_validity() {
        let cache = cache_over(vec![feature("a", 1.0, 1.0)]);
        let envelope = Region::new(0.0, 0.0, 9.0, 9.0);

        cache.register(&envelope).unwrap();
        assert!(cache.match_regions(&envelope).unwrap().is_hit());

        cache.unregister(&envelope).unwrap();
        assert!(!cache.match_regions(&envelope).unwrap().is_hit());

        // Bookkeeping does not count as access beyond the two matches above.
        assert_eq!(cache.stats().accesses, 2);
    }

    #[test]
    fn test_remove_invalidates_but_keeps_payload() {
        let cache = cache_over(vec![feature("a", 1.0, 1.0)]);
        let envelope = Region::new(0.0, 0.0, 10.0, 10.0);

        let fc: FeatureCollection = vec![feature("a", 1.0, 1.0)].into();
        cache.put(&fc, &envelope).unwrap();
        cache.remove(&envelope).unwrap();

        assert!(!cache.match_regions(&envelope).unwrap().is_hit());
        // Payload survives invalidation.
        assert_eq!(cache.peek(&envelope).unwrap().len(), 1);
        assert_eq!(cache.stats().invalidations, 1);
    }

    #[test]
    fn test_dispose_closes_cache() {
        let cache = cache_over(vec![feature("a", 1.0, 1.0)]);
        cache.dispose().unwrap();
        assert!(matches!(cache.bounds(), Err(QuadtileError::Closed)));
        assert!(matches!(
            cache.peek(&world()),
            Err(QuadtileError::Closed)
        ));
    }

    #[test]
    fn test_stats_track_hits_and_misses() {
        let cache = cache_over(vec![feature("a", 1.0, 1.0)]);
        let envelope = Region::new(0.0, 0.0, 9.0, 9.0);

        assert!(!cache.match_regions(&envelope).unwrap().is_hit());
        cache.register(&envelope).unwrap();
        assert!(cache.match_regions(&envelope).unwrap().is_hit());

        let stats = cache.stats();
        assert_eq!(stats.accesses, 2);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }
}
