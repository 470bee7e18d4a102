//! Disk-backed quadtree spatial index.
//!
//! The tree maps geometry bounding boxes to dense record ids. Records are
//! inserted once at index-build time; queries stream matching ids through a
//! [`LazySearch`](crate::search::LazySearch) iterator that resolves byte
//! offsets via a companion [`OffsetSource`](crate::offsets::OffsetSource).

use crate::error::{QuadtileError, Result};
use crate::node::Node;
use crate::offsets::OffsetSource;
use crate::region::Region;
use crate::search::{LazySearch, DEFAULT_BATCH_SIZE};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Hard limit on the tree depth.
pub const MAX_TREE_DEPTH: u32 = 65_535;

/// Split position as a fraction of the axis range, applied from each side.
///
/// 0.55 from both ends makes the two halves overlap by 10% of the range, so
/// a bounding box near the split line still has a chance to fit entirely
/// inside one half instead of bloating the parent's leaf list. The ratio and
/// the larger-axis-first rule below are load-bearing for tree shape and must
/// not change.
const SPLIT_RATIO: f64 = 0.55;

/// Split a region along its larger axis into two overlapping halves.
///
/// Each half covers `SPLIT_RATIO` of the split axis range from its own side;
/// the other axis is covered in full by both. Ties split along x.
pub fn split_bounds(region: &Region) -> [Region; 2] {
    if region.width() >= region.height() {
        let range = region.width();
        [
            Region::new(
                region.min_x,
                region.min_y,
                region.min_x + range * SPLIT_RATIO,
                region.max_y,
            ),
            Region::new(
                region.max_x - range * SPLIT_RATIO,
                region.min_y,
                region.max_x,
                region.max_y,
            ),
        ]
    } else {
        let range = region.height();
        [
            Region::new(
                region.min_x,
                region.min_y,
                region.max_x,
                region.min_y + range * SPLIT_RATIO,
            ),
            Region::new(
                region.min_x,
                region.max_y - range * SPLIT_RATIO,
                region.max_x,
                region.max_y,
            ),
        ]
    }
}

/// The four candidate child quadrants of a region, in fixed order:
/// both splits of the first half, then both splits of the second half.
pub fn split_quadrants(region: &Region) -> [Region; 4] {
    let halves = split_bounds(region);
    let [q1, q2] = split_bounds(&halves[0]);
    let [q3, q4] = split_bounds(&halves[1]);
    [q1, q2, q3, q4]
}

/// A quadtree over record bounding boxes, with bounded-memory lazy search.
///
/// The tree is built by a single writer via [`insert`](QuadTree::insert) and
/// then queried concurrently: every [`search`](QuadTree::search) iterator
/// receives its own handle on the root (an `Arc` clone, the shallow-copy
/// idea) and owns all of its traversal state, so searches never mutate
/// shared node memory. Mutating the tree while searches are live is outside
/// the contract.
///
/// Open iterators are registered with the tree; [`close`](QuadTree::close)
/// refuses to tear the tree down while any remain, which turns iterator
/// leaks elsewhere into loud errors instead of use-after-close bugs.
pub struct QuadTree {
    root: Option<Arc<Node>>,
    num_shapes: u32,
    max_depth: u32,
    offsets: Arc<dyn OffsetSource>,
    open_iterators: Arc<AtomicUsize>,
}

impl QuadTree {
    /// Create an empty tree covering `bounds`.
    ///
    /// `num_shapes` is the expected total record count; it is used only to
    /// derive a default depth when `max_depth` is 0 (aiming for roughly 8
    /// records per leaf). An explicit `max_depth` above 65535 is rejected.
    pub fn new(
        num_shapes: u32,
        max_depth: u32,
        bounds: Region,
        offsets: Arc<dyn OffsetSource>,
    ) -> Result<Self> {
        if max_depth > MAX_TREE_DEPTH {
            return Err(QuadtileError::DepthLimitExceeded(max_depth));
        }
        let max_depth = if max_depth == 0 {
            default_max_depth(num_shapes)
        } else {
            max_depth
        };
        Ok(Self {
            root: Some(Arc::new(Node::new(bounds))),
            num_shapes,
            max_depth,
            offsets,
            open_iterators: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Expected total record count supplied at construction.
    pub fn num_shapes(&self) -> u32 {
        self.num_shapes
    }

    /// Effective maximum depth (explicit or derived).
    pub fn max_depth(&self) -> u32 {
        self.max_depth
    }

    /// Bounding region of the root, if the tree is open.
    pub fn bounds(&self) -> Option<Region> {
        self.root.as_ref().map(|root| *root.region())
    }

    /// Root node, if the tree is open. Mainly for inspection and tests.
    pub fn root(&self) -> Option<&Node> {
        self.root.as_deref()
    }

    /// Number of search iterators currently registered.
    pub fn open_iterator_count(&self) -> usize {
        self.open_iterators.load(Ordering::SeqCst)
    }

    /// Insert a record with its bounding box.
    ///
    /// The record lands in the deepest node whose region fully contains
    /// `bounds`, subject to the depth budget; bounds spanning every
    /// candidate quadrant stay in the current node's leaf list.
    pub fn insert(&mut self, record: u32, bounds: Region) -> Result<()> {
        let root = self.root.as_mut().ok_or(QuadtileError::Closed)?;
        insert_into(Arc::make_mut(root), record, &bounds, self.max_depth);
        Ok(())
    }

    /// Collapse empty subtrees and promote degenerate chains.
    ///
    /// Post-order: children are trimmed first and removed when they end up
    /// with no records and no children of their own; a node left with
    /// exactly one child and no records adopts that child in place. A second
    /// pass is a no-op.
    pub fn trim(&mut self) -> Result<()> {
        let root = self.root.as_mut().ok_or(QuadtileError::Closed)?;
        trim_node(Arc::make_mut(root));
        log::debug!("trimmed quadtree, root children: {}", root.num_children());
        Ok(())
    }

    /// Open a lazy search over `bounds` with the default batch size.
    pub fn search(&self, bounds: Region) -> Result<LazySearch> {
        self.search_with_batch_size(bounds, DEFAULT_BATCH_SIZE)
    }

    /// Open a lazy search with an explicit read-ahead batch size.
    ///
    /// Smaller batches bound memory more tightly at the cost of more offset
    /// lookups per pass; mainly useful for tests and tight-memory callers.
    pub fn search_with_batch_size(&self, bounds: Region, batch_size: usize) -> Result<LazySearch> {
        if batch_size == 0 {
            return Err(QuadtileError::InvalidInput(
                "search batch size must be at least 1".into(),
            ));
        }
        let root = self.root.as_ref().ok_or(QuadtileError::Closed)?;
        self.open_iterators.fetch_add(1, Ordering::SeqCst);
        Ok(LazySearch::new(
            Arc::clone(root),
            Arc::clone(&self.offsets),
            bounds,
            batch_size,
            Arc::clone(&self.open_iterators),
        ))
    }

    /// Close the tree, releasing the root.
    ///
    /// Fails with [`QuadtileError::OpenIterators`] if any search iterator
    /// has not been closed or dropped; this is a leak-detection invariant,
    /// not cleanup convenience.
    pub fn close(&mut self) -> Result<()> {
        let open = self.open_iterators.load(Ordering::SeqCst);
        if open > 0 {
            return Err(QuadtileError::OpenIterators(open));
        }
        self.root = None;
        Ok(())
    }
}

impl fmt::Debug for QuadTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuadTree")
            .field("num_shapes", &self.num_shapes)
            .field("max_depth", &self.max_depth)
            .field("bounds", &self.bounds())
            .field("open_iterators", &self.open_iterator_count())
            .finish_non_exhaustive()
    }
}

/// Smallest depth d with `4^d >= num_shapes / 8` (about 8 records per leaf).
fn default_max_depth(num_shapes: u32) -> u32 {
    let mut depth = 0u32;
    let mut leaves = 1u64;
    while leaves * 8 < u64::from(num_shapes) {
        depth += 1;
        leaves *= 4;
    }
    depth
}

fn insert_into(node: &mut Node, record: u32, bounds: &Region, depth: u32) {
    if depth > 1 && node.num_children() > 0 {
        for child in node.children_mut().iter_mut() {
            if child.region().contains(bounds) {
                insert_into(child, record, bounds, depth - 1);
                return;
            }
        }
    }
    if depth > 1 && node.num_children() < 4 {
        for quadrant in split_quadrants(node.region()) {
            if quadrant.contains(bounds) {
                let mut child = Node::new(quadrant);
                insert_into(&mut child, record, bounds, depth - 1);
                node.add_child(child);
                return;
            }
        }
    }
    node.add_record(record);
}

/// Returns true if `node` should be removed by its parent.
fn trim_node(node: &mut Node) -> bool {
    node.children_mut().retain(|child| !trim_node(child));

    if node.num_children() == 1 && node.num_records() == 0 {
        let child = node.children_mut().remove(0);
        node.adopt(*child);
    }

    node.num_children() == 0 && node.num_records() == 0
}
