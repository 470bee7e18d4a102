//! Mutable quadtree node: a bounding region, a record-id list, and up to
//! four children.

use crate::error::{QuadtileError, Result};
use crate::region::Region;
use smallvec::SmallVec;

/// Initial capacity of a node's record array.
const INITIAL_RECORD_CAPACITY: usize = 4;

/// A single node of the quadtree.
///
/// A node owns its bounding [`Region`], an ordered list of leaf record ids
/// with an explicit count, and a list of at most four child nodes. The
/// four-child bound is produced by the insertion algorithm in
/// [`QuadTree`](crate::QuadTree) rather than enforced structurally here.
#[derive(Debug, Clone)]
pub struct Node {
    region: Region,
    records: Vec<u32>,
    children: SmallVec<[Box<Node>; 4]>,
}

impl Node {
    /// Create an empty node covering `region`.
    pub fn new(region: Region) -> Self {
        Self {
            region,
            records: Vec::new(),
            children: SmallVec::new(),
        }
    }

    /// The node's bounding region.
    pub fn region(&self) -> &Region {
        &self.region
    }

    /// Number of record ids held directly by this node.
    pub fn num_records(&self) -> usize {
        self.records.len()
    }

    /// Append a record id, growing the backing array by `ceil(n * 1.5)` when
    /// full (initial capacity 4). Amortized O(1).
    pub fn add_record(&mut self, id: u32) {
        if self.records.len() == self.records.capacity() {
            let target = if self.records.is_empty() {
                INITIAL_RECORD_CAPACITY
            } else {
                (self.records.len() * 3).div_ceil(2)
            };
            self.records.reserve_exact(target - self.records.len());
        }
        self.records.push(id);
    }

    /// The record id at `pos`, or `OutOfBounds` past the logical count.
    pub fn record(&self, pos: usize) -> Result<u32> {
        self.records
            .get(pos)
            .copied()
            .ok_or(QuadtileError::OutOfBounds {
                index: pos,
                len: self.records.len(),
            })
    }

    /// All record ids held directly by this node.
    pub fn records(&self) -> &[u32] {
        &self.records
    }

    /// Replace the record array from an externally constructed, possibly
    /// sentinel-padded buffer of 32-bit signed ids.
    ///
    /// The logical count is the position of the first negative value;
    /// everything from the sentinel on is ignored. Negative ids are not
    /// legal record ids anywhere else in this crate, so a mid-array sentinel
    /// always means end-of-data. Every non-negative `i32` converts to `u32`
    /// without loss.
    pub fn set_records(&mut self, ids: &[i32]) {
        let count = ids.iter().position(|&id| id < 0).unwrap_or(ids.len());
        self.records = ids[..count].iter().map(|&id| id as u32).collect();
    }

    /// Add a child node. The insertion algorithm never adds more than four.
    pub fn add_child(&mut self, child: Node) {
        self.children.push(Box::new(child));
    }

    /// Number of children.
    pub fn num_children(&self) -> usize {
        self.children.len()
    }

    /// The child at `pos`, if present.
    pub fn child(&self, pos: usize) -> Option<&Node> {
        self.children.get(pos).map(|boxed| boxed.as_ref())
    }

    pub(crate) fn children_mut(&mut self) -> &mut SmallVec<[Box<Node>; 4]> {
        &mut self.children
    }

    /// Drop all children.
    pub fn clear_children(&mut self) {
        self.children.clear();
    }

    /// Structural copy of region and records, without children.
    ///
    /// This is the per-iterator traversal-safe view of a node; the search
    /// cursor never needs a node's subtree copied.
    pub fn shallow_copy(&self) -> Node {
        Node {
            region: self.region,
            records: self.records.clone(),
            children: SmallVec::new(),
        }
    }

    /// Shrink the record array to exactly its logical count, freeing it
    /// entirely when empty. Meant to be called after bulk load.
    pub fn pack(&mut self) {
        if self.records.is_empty() {
            self.records = Vec::new();
        } else {
            self.records.shrink_to_fit();
        }
    }

    /// Hard reset: drop records and children. Only for in-memory nodes
    /// being rebuilt.
    pub fn clean(&mut self) {
        self.records = Vec::new();
        self.children.clear();
    }

    /// Adopt another node's region, records and children in place.
    ///
    /// Used by trimming to promote a sole surviving child into its parent.
    pub(crate) fn adopt(&mut self, other: Node) {
        self.region = other.region;
        self.records = other.records;
        self.children = other.children;
    }
}
