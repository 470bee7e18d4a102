//! Grid node store backing the feature cache.
//!
//! The tracker divides a fixed root region into a grid of cells, each
//! carrying a validity flag (is this cell's cached data trustworthy) and a
//! payload of cached features. The cache registers a region by flipping the
//! covered cells valid, and invalidates without necessarily deleting the
//! payload.

use crate::error::{QuadtileError, Result};
use crate::feature::{Feature, FeatureCollection};
use crate::region::Region;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

/// One grid cell: its region, a validity flag, and cached features.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridNode {
    region: Region,
    valid: bool,
    data: Vec<Feature>,
}

impl GridNode {
    fn new(region: Region) -> Self {
        Self {
            region,
            valid: false,
            data: Vec::new(),
        }
    }

    pub fn region(&self) -> &Region {
        &self.region
    }

    /// Whether this cell's cached contents currently reflect the backing
    /// source.
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn features(&self) -> &[Feature] {
        &self.data
    }
}

/// Validity operations applied to the nodes covering a region.
///
/// A closed set instead of an open visitor hierarchy: validity flips are
/// bookkeeping, dispatched with a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeOp {
    /// Mark covered cells as trustworthy.
    Validate,
    /// Mark covered cells as missing; cached payloads are kept.
    Invalidate,
}

/// Read-only traversal callback over nodes and their cached payloads.
///
/// `visit_node` runs for every node intersecting the traversal region;
/// `visit_data` runs for each cached feature, but only when
/// `is_data_visitor` returns true, letting node-only visitors skip payload
/// iteration entirely.
pub trait Visitor {
    fn visit_node(&mut self, node: &GridNode);

    fn visit_data(&mut self, feature: &Feature);

    fn is_data_visitor(&self) -> bool {
        true
    }
}

/// Collects cached features intersecting a region, deduplicated by id.
///
/// A feature spanning several cells is stored in each of them; collection
/// must not report it twice.
pub struct CollectVisitor {
    region: Region,
    seen: FxHashSet<String>,
    collected: FeatureCollection,
}

impl CollectVisitor {
    pub fn new(region: Region) -> Self {
        Self {
            region,
            seen: FxHashSet::default(),
            collected: FeatureCollection::new(),
        }
    }

    pub fn into_collection(self) -> FeatureCollection {
        self.collected
    }
}

impl Visitor for CollectVisitor {
    fn visit_node(&mut self, _node: &GridNode) {}

    fn visit_data(&mut self, feature: &Feature) {
        if feature.bounds.intersects(&self.region) && self.seen.insert(feature.id.clone()) {
            self.collected.push(feature.clone());
        }
    }
}

/// Counts nodes by validity; a node-only visitor.
#[derive(Debug, Default)]
pub struct ValidityCountVisitor {
    pub valid: usize,
    pub missing: usize,
}

impl Visitor for ValidityCountVisitor {
    fn visit_node(&mut self, node: &GridNode) {
        if node.is_valid() {
            self.valid += 1;
        } else {
            self.missing += 1;
        }
    }

    fn visit_data(&mut self, _feature: &Feature) {}

    fn is_data_visitor(&self) -> bool {
        false
    }
}

/// A persistent container of region-keyed nodes with validity flags.
///
/// The root region is the cache's addressable universe; it may be larger
/// than the occupied data extent. Cells are laid out row-major.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridTracker {
    bounds: Region,
    rows: usize,
    cols: usize,
    nodes: Vec<GridNode>,
}

impl GridTracker {
    /// Create a tracker dividing `bounds` into `rows x cols` cells.
    pub fn new(bounds: Region, rows: usize, cols: usize) -> Result<Self> {
        if rows == 0 || cols == 0 {
            return Err(QuadtileError::InvalidInput(
                "tracker grid must have at least one row and one column".into(),
            ));
        }
        let cell_w = bounds.width() / cols as f64;
        let cell_h = bounds.height() / rows as f64;
        let mut nodes = Vec::with_capacity(rows * cols);
        for row in 0..rows {
            for col in 0..cols {
                let min_x = bounds.min_x + col as f64 * cell_w;
                let min_y = bounds.min_y + row as f64 * cell_h;
                nodes.push(GridNode::new(Region::new(
                    min_x,
                    min_y,
                    min_x + cell_w,
                    min_y + cell_h,
                )));
            }
        }
        Ok(Self {
            bounds,
            rows,
            cols,
            nodes,
        })
    }

    /// The tracker's root region.
    pub fn bounds(&self) -> &Region {
        &self.bounds
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of cells currently flagged valid.
    pub fn valid_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.valid).count()
    }

    /// Row/column index ranges of the cells intersecting `region`, or
    /// `None` when the region is disjoint from the tracker bounds.
    ///
    /// The min edge is inclusive, the max edge exclusive: an envelope whose
    /// max coordinate sits exactly on a cell boundary does not address the
    /// cell beyond it. Without this, validating a cell-aligned envelope
    /// would flip neighbor cells valid whose contents were never stored.
    fn cell_range(&self, region: &Region) -> Option<(usize, usize, usize, usize)> {
        let clipped = self.bounds.intersection(region)?;
        let cell_w = self.bounds.width() / self.cols as f64;
        let cell_h = self.bounds.height() / self.rows as f64;

        let col0 = (((clipped.min_x - self.bounds.min_x) / cell_w).floor() as usize)
            .min(self.cols - 1);
        let col1 = ((((clipped.max_x - self.bounds.min_x) / cell_w).ceil() as usize)
            .saturating_sub(1))
        .clamp(col0, self.cols - 1);
        let row0 = (((clipped.min_y - self.bounds.min_y) / cell_h).floor() as usize)
            .min(self.rows - 1);
        let row1 = ((((clipped.max_y - self.bounds.min_y) / cell_h).ceil() as usize)
            .saturating_sub(1))
        .clamp(row0, self.rows - 1);
        Some((row0, row1, col0, col1))
    }

    /// Regions of the cells intersecting `region` that are not flagged
    /// valid.
    pub fn missing_regions(&self, region: &Region) -> Vec<Region> {
        let Some((row0, row1, col0, col1)) = self.cell_range(region) else {
            return Vec::new();
        };
        let mut missing = Vec::new();
        for row in row0..=row1 {
            for col in col0..=col1 {
                let node = &self.nodes[row * self.cols + col];
                if !node.valid {
                    missing.push(node.region);
                }
            }
        }
        missing
    }

    /// Apply a validity operation to every cell intersecting `region`.
    ///
    /// This path deliberately bypasses any access accounting: a bulk
    /// register/unregister is bookkeeping, not a real access.
    pub fn apply(&mut self, region: &Region, op: NodeOp) {
        let Some((row0, row1, col0, col1)) = self.cell_range(region) else {
            return;
        };
        for row in row0..=row1 {
            for col in col0..=col1 {
                let node = &mut self.nodes[row * self.cols + col];
                match op {
                    NodeOp::Validate => node.valid = true,
                    NodeOp::Invalidate => node.valid = false,
                }
            }
        }
    }

    /// Route a feature into every cell its bounds intersect.
    ///
    /// Fails with `InvalidInput` if the feature lies entirely outside the
    /// tracker's addressable universe; nothing is inserted in that case.
    pub fn insert(&mut self, feature: &Feature) -> Result<()> {
        let Some((row0, row1, col0, col1)) = self.cell_range(&feature.bounds) else {
            return Err(QuadtileError::InvalidInput(format!(
                "feature '{}' is outside the cache universe",
                feature.id
            )));
        };
        for row in row0..=row1 {
            for col in col0..=col1 {
                let node = &mut self.nodes[row * self.cols + col];
                if !node.data.iter().any(|f| f.id == feature.id) {
                    node.data.push(feature.clone());
                }
            }
        }
        Ok(())
    }

    /// Walk every node intersecting `region`, then its payload when the
    /// visitor asks for data.
    pub fn visit(&self, region: &Region, visitor: &mut dyn Visitor) {
        let Some((row0, row1, col0, col1)) = self.cell_range(region) else {
            return;
        };
        for row in row0..=row1 {
            for col in col0..=col1 {
                let node = &self.nodes[row * self.cols + col];
                visitor.visit_node(node);
                if visitor.is_data_visitor() {
                    for feature in &node.data {
                        visitor.visit_data(feature);
                    }
                }
            }
        }
    }

    /// Reset every cell: invalid, payload dropped.
    pub fn clear(&mut self) {
        for node in &mut self.nodes {
            node.valid = false;
            node.data.clear();
        }
    }

    /// Persist the tracker to `path`.
    #[cfg(feature = "snapshot")]
    pub fn save<P: AsRef<std::path::Path>>(&self, path: P) -> Result<()> {
        let file = std::fs::File::create(path)?;
        let writer = std::io::BufWriter::new(file);
        bincode::serialize_into(writer, self)?;
        Ok(())
    }

    /// Load a tracker previously written by [`save`](GridTracker::save).
    #[cfg(feature = "snapshot")]
    pub fn load<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        let reader = std::io::BufReader::new(file);
        let tracker: GridTracker = bincode::deserialize_from(reader)?;
        log::debug!(
            "loaded tracker snapshot: {} cells, {} valid",
            tracker.node_count(),
            tracker.valid_count()
        );
        Ok(tracker)
    }
}
