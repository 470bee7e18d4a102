//! Features, feature collections, and the backing feature source seam.
//!
//! The cache treats its backing source as an opaque supplier of features: it
//! queries by envelope and never mutates the source. The trait mirrors the
//! storage-backend seam used elsewhere in this crate family, with an
//! in-memory implementation for tests and small datasets.

use crate::error::{QuadtileError, Result};
use crate::region::Region;
use bytes::Bytes;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

/// A feature: an identifier, its bounding box, and an opaque payload.
///
/// The payload is whatever the collaborator serialized (geometry plus
/// attributes); this layer only routes it by bounds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    pub id: String,
    pub bounds: Region,
    pub payload: Bytes,
}

impl Feature {
    pub fn new(id: impl Into<String>, bounds: Region, payload: impl Into<Bytes>) -> Self {
        Self {
            id: id.into(),
            bounds,
            payload: payload.into(),
        }
    }
}

/// An ordered collection of features.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureCollection {
    features: Vec<Feature>,
}

impl FeatureCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, feature: Feature) {
        self.features.push(feature);
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Feature> {
        self.features.iter()
    }

    /// Union of member bounds, or `None` when empty.
    pub fn bounds(&self) -> Option<Region> {
        let mut iter = self.features.iter();
        let mut bounds = iter.next()?.bounds;
        for feature in iter {
            bounds.expand_to_include(&feature.bounds);
        }
        Some(bounds)
    }

    /// True if a feature with this id is present.
    pub fn contains_id(&self, id: &str) -> bool {
        self.features.iter().any(|f| f.id == id)
    }

    /// Append every feature from `other` whose id is not already present.
    pub fn merge(&mut self, other: FeatureCollection) {
        let mut seen: FxHashSet<String> =
            self.features.iter().map(|f| f.id.clone()).collect();
        for feature in other.features {
            if seen.insert(feature.id.clone()) {
                self.features.push(feature);
            }
        }
    }

    /// The set of feature ids, for equality-by-id comparisons in callers.
    pub fn id_set(&self) -> FxHashSet<&str> {
        self.features.iter().map(|f| f.id.as_str()).collect()
    }
}

impl From<Vec<Feature>> for FeatureCollection {
    fn from(features: Vec<Feature>) -> Self {
        Self { features }
    }
}

impl IntoIterator for FeatureCollection {
    type Item = Feature;
    type IntoIter = std::vec::IntoIter<Feature>;

    fn into_iter(self) -> Self::IntoIter {
        self.features.into_iter()
    }
}

impl<'a> IntoIterator for &'a FeatureCollection {
    type Item = &'a Feature;
    type IntoIter = std::slice::Iter<'a, Feature>;

    fn into_iter(self) -> Self::IntoIter {
        self.features.iter()
    }
}

/// A backing source of features, queried on cache misses.
///
/// Implementations are expected to be slow relative to the cache (remote
/// service, large file); the cache deliberately calls `query` without
/// holding its own lock.
pub trait FeatureSource: Send + Sync {
    /// Bounding region of all data in the source.
    fn bounds(&self) -> Result<Region>;

    /// All features whose bounds intersect `region`.
    fn query(&self, region: &Region) -> Result<FeatureCollection>;

    /// Number of features `query(region)` would return.
    fn count(&self, region: &Region) -> Result<usize>;
}

/// In-memory feature source.
#[derive(Debug, Clone, Default)]
pub struct MemoryFeatureSource {
    features: Vec<Feature>,
}

impl MemoryFeatureSource {
    pub fn new(features: Vec<Feature>) -> Self {
        Self { features }
    }
}

impl FeatureSource for MemoryFeatureSource {
    fn bounds(&self) -> Result<Region> {
        let mut iter = self.features.iter();
        let first = iter.next().ok_or_else(|| {
            QuadtileError::InvalidInput("feature source is empty, bounds undefined".into())
        })?;
        let mut bounds = first.bounds;
        for feature in iter {
            bounds.expand_to_include(&feature.bounds);
        }
        Ok(bounds)
    }

    fn query(&self, region: &Region) -> Result<FeatureCollection> {
        Ok(self
            .features
            .iter()
            .filter(|f| f.bounds.intersects(region))
            .cloned()
            .collect::<Vec<_>>()
            .into())
    }

    fn count(&self, region: &Region) -> Result<usize> {
        Ok(self
            .features
            .iter()
            .filter(|f| f.bounds.intersects(region))
            .count())
    }
}
