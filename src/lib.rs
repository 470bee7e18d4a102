//! Disk-backed quadtree spatial index and grid-based feature cache.
//!
//! ```rust
//! use quadtile::{MemoryOffsetStore, QuadTree, Region};
//! use std::sync::Arc;
//!
//! let offsets = Arc::new(MemoryOffsetStore::new(vec![0, 64, 128]));
//! let mut tree = QuadTree::new(3, 0, Region::new(0.0, 0.0, 10.0, 10.0), offsets)?;
//! tree.insert(0, Region::new(1.0, 1.0, 2.0, 2.0))?;
//! tree.insert(1, Region::new(6.0, 6.0, 7.0, 7.0))?;
//! tree.insert(2, Region::new(4.0, 4.0, 5.0, 5.0))?;
//!
//! let hits: Vec<_> = tree
//!     .search(Region::new(0.0, 0.0, 3.0, 3.0))?
//!     .collect::<quadtile::Result<Vec<_>>>()?;
//! assert!(hits.iter().any(|h| h.record_number == 1));
//! # Ok::<(), quadtile::QuadtileError>(())
//! ```

pub mod cache;
pub mod error;
pub mod feature;
pub mod node;
pub mod offsets;
pub mod quadtree;
pub mod region;
pub mod search;
pub mod tracker;

pub use error::{QuadtileError, Result};

pub use region::Region;

pub use node::Node;

pub use quadtree::{QuadTree, MAX_TREE_DEPTH};

pub use search::{LazySearch, SearchHit, DEFAULT_BATCH_SIZE};

pub use offsets::{FileOffsetStore, MemoryOffsetStore, OffsetSource};

pub use feature::{Feature, FeatureCollection, FeatureSource, MemoryFeatureSource};

pub use tracker::{CollectVisitor, GridNode, GridTracker, NodeOp, Visitor};

pub use cache::{
    CacheConfig, CacheMatch, CacheStats, FeatureCache, FeatureCacheBuilder,
};

pub use geo::Rect;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Common imports
pub mod prelude {

    pub use crate::{QuadtileError, Result};

    pub use crate::{QuadTree, Region, SearchHit};

    pub use crate::{FileOffsetStore, MemoryOffsetStore, OffsetSource};

    pub use crate::{Feature, FeatureCollection, FeatureSource};

    pub use crate::{FeatureCache, FeatureCacheBuilder};

    pub use crate::{GridTracker, Visitor};
}
