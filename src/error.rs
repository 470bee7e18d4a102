//! Error types for quadtile.

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, QuadtileError>;

/// All failures surfaced by the index and the feature cache.
///
/// Structural errors (out-of-bounds access, invalid depth) indicate a
/// contract violation at the call site and are never retried. Store errors
/// wrap I/O failures from the companion offset file or a snapshot; a failure
/// mid batch-fill aborts that fill entirely.
#[derive(Error, Debug)]
pub enum QuadtileError {
    /// I/O failure reading or writing a companion file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A caller-supplied argument violated a documented contract.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Positional access past the logical length of a record list.
    #[error("index {index} out of bounds (len {len})")]
    OutOfBounds { index: usize, len: usize },

    /// Requested tree depth exceeds the hard limit of 65535.
    #[error("maximum depth {0} exceeds the limit of 65535")]
    DepthLimitExceeded(u32),

    /// `QuadTree::close` was called while search iterators were still open.
    #[error("{0} search iterator(s) still open")]
    OpenIterators(usize),

    /// Operation attempted on a closed tree or a disposed cache.
    #[error("operation on a closed index")]
    Closed,

    /// An incoming feature collection is larger than the cache capacity.
    #[error("collection of {size} features exceeds cache capacity {capacity}")]
    CapacityExceeded { size: usize, capacity: usize },

    /// A persisted snapshot could not be decoded.
    #[error("invalid snapshot format")]
    InvalidFormat,

    /// Snapshot serialization failure.
    #[cfg(feature = "snapshot")]
    #[error("snapshot serialization error: {0}")]
    Serialization(String),
}

#[cfg(feature = "snapshot")]
impl From<bincode::Error> for QuadtileError {
    fn from(err: bincode::Error) -> Self {
        QuadtileError::Serialization(err.to_string())
    }
}
