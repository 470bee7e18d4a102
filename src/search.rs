//! Bounded-memory lazy search over the quadtree.
//!
//! The iterator performs a resumable depth-first traversal with an explicit
//! ancestor stack (never recursion, so tree depth cannot overflow the call
//! stack), collecting candidate record ids in batches. Each batch is sorted
//! ascending before offsets are resolved, turning random index-file access
//! into sequential reads.

use crate::error::Result;
use crate::node::Node;
use crate::offsets::OffsetSource;
use crate::region::Region;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Records buffered per traversal pass before offsets are resolved.
pub const DEFAULT_BATCH_SIZE: usize = 32_768;

/// One search result: a record number and its byte offset in the primary
/// data file.
///
/// `record_number` follows the external 1-based convention: record id `i`
/// (the dense, 0-based id used at insertion time) is reported as `i + 1`.
/// The offset is resolved through the companion index with the 0-based id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchHit {
    pub record_number: u32,
    pub offset: u64,
}

/// Traversal position at one level of the ancestor stack.
#[derive(Debug, Clone, Copy)]
struct Frame {
    /// Index of this node within its parent's child list (0 for the root).
    child_in_parent: usize,
    /// Next child index to consider descending into.
    next_child: usize,
    /// Next unread position in this node's record list.
    next_record: usize,
}

impl Frame {
    fn new(child_in_parent: usize) -> Self {
        Self {
            child_in_parent,
            next_child: 0,
            next_record: 0,
        }
    }
}

/// Decrements the owning tree's open-iterator count when the search ends,
/// whether it is closed explicitly or dropped.
struct Registration {
    counter: Arc<AtomicUsize>,
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A closeable, resumable search iterator.
///
/// The cursor owns every piece of traversal state (frame stack, read-ahead
/// buffer, its own handle on the root), so concurrent searches over a stable
/// tree are independent: no shared node memory is ever mutated. Two
/// overlapping searches will each resolve the same offsets on their own;
/// drained batches are not shared.
///
/// Yields `Result<SearchHit>`: an I/O failure while resolving offsets aborts
/// that batch fill and surfaces as an `Err` item, without retry.
pub struct LazySearch {
    root: Arc<Node>,
    offsets: Arc<dyn OffsetSource>,
    bounds: Region,
    batch_size: usize,
    frames: Vec<Frame>,
    started: bool,
    done: bool,
    buffer: VecDeque<SearchHit>,
    _registration: Registration,
}

impl LazySearch {
    pub(crate) fn new(
        root: Arc<Node>,
        offsets: Arc<dyn OffsetSource>,
        bounds: Region,
        batch_size: usize,
        counter: Arc<AtomicUsize>,
    ) -> Self {
        Self {
            root,
            offsets,
            bounds,
            batch_size,
            frames: Vec::new(),
            started: false,
            done: false,
            buffer: VecDeque::new(),
            _registration: Registration { counter },
        }
    }

    /// Close the search, unregistering it from the owning tree.
    ///
    /// Consuming `self` makes use-after-close unrepresentable; dropping the
    /// iterator unregisters it as well, so a leaked iterator cannot wedge
    /// the tree's registry permanently.
    pub fn close(self) {}

    /// The search envelope.
    pub fn bounds(&self) -> &Region {
        &self.bounds
    }

    /// Drain the tree depth-first into the read-ahead buffer, up to one
    /// batch worth of records.
    fn fill_batch(&mut self) -> Result<()> {
        let mut ids: Vec<u32> = Vec::new();

        {
            let root: &Node = self.root.as_ref();

            if !self.started {
                self.started = true;
                if root.region().intersects(&self.bounds) {
                    self.frames.push(Frame::new(0));
                } else {
                    self.done = true;
                }
            }

            // Rebuild the ancestor reference chain for the stored frames.
            let mut nodes: Vec<&Node> = Vec::with_capacity(self.frames.len());
            if !self.frames.is_empty() {
                nodes.push(root);
                for frame in &self.frames[1..] {
                    let parent = *nodes.last().expect("chain starts at the root");
                    nodes.push(
                        parent
                            .child(frame.child_in_parent)
                            .expect("cursor path stays valid on a stable tree"),
                    );
                }
            }

            while !self.frames.is_empty() && ids.len() < self.batch_size {
                let depth = self.frames.len() - 1;
                let node = nodes[depth];

                // Unread records at this node first.
                let pos = self.frames[depth].next_record;
                if pos < node.num_records() {
                    ids.push(node.record(pos)?);
                    self.frames[depth].next_record += 1;
                    continue;
                }

                // Then the first unvisited child intersecting the bounds.
                let mut descended = false;
                while self.frames[depth].next_child < node.num_children() {
                    let idx = self.frames[depth].next_child;
                    self.frames[depth].next_child += 1;
                    let child = node.child(idx).expect("child index in range");
                    if child.region().intersects(&self.bounds) {
                        self.frames.push(Frame::new(idx));
                        nodes.push(child);
                        descended = true;
                        break;
                    }
                }

                // Fully visited: pop back to the parent.
                if !descended {
                    self.frames.pop();
                    nodes.pop();
                }
            }

            if self.frames.is_empty() {
                self.done = true;
            }
        }

        // Ascending ids turn offset resolution into sequential file access.
        ids.sort_unstable();

        // Resolve the whole batch before exposing any of it, so a failure
        // aborts the batch fill entirely.
        let mut hits = Vec::with_capacity(ids.len());
        for id in ids {
            let offset = self.offsets.offset_in_bytes(id)?;
            hits.push(SearchHit {
                record_number: id + 1,
                offset,
            });
        }
        self.buffer.extend(hits);
        Ok(())
    }
}

impl std::fmt::Debug for LazySearch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LazySearch")
            .field("bounds", &self.bounds)
            .field("batch_size", &self.batch_size)
            .field("done", &self.done)
            .field("buffered", &self.buffer.len())
            .finish_non_exhaustive()
    }
}

impl Iterator for LazySearch {
    type Item = Result<SearchHit>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.buffer.is_empty() && !self.done {
            if let Err(err) = self.fill_batch() {
                self.done = true;
                return Some(Err(err));
            }
        }
        self.buffer.pop_front().map(Ok)
    }
}
