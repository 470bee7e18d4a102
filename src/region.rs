//! Axis-aligned bounding boxes, the basic currency of the index.

use geo::{Coord, Rect};
use serde::{Deserialize, Serialize};

/// An axis-aligned bounding rectangle in a single planar coordinate space.
///
/// Invariant: `min <= max` on each axis. The constructor normalizes swapped
/// bounds rather than failing, mirroring how bounding-box queries are
/// auto-corrected elsewhere in the crate.
///
/// `Region` is a pure value type; every operation except
/// [`expand_to_include`](Region::expand_to_include) returns a new value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Region {
    /// Create a region, swapping coordinates if min/max arrive reversed.
    ///
    /// Non-finite coordinates are accepted but logged, since a NaN bound
    /// makes every containment test false.
    pub fn new(mut min_x: f64, mut min_y: f64, mut max_x: f64, mut max_y: f64) -> Self {
        if ![min_x, min_y, max_x, max_y].iter().all(|v| v.is_finite()) {
            log::warn!("constructing region with non-finite coordinates");
        }
        if min_x > max_x {
            std::mem::swap(&mut min_x, &mut max_x);
        }
        if min_y > max_y {
            std::mem::swap(&mut min_y, &mut max_y);
        }
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// Width of the region along the x axis.
    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    /// Height of the region along the y axis.
    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    /// True if the two regions share any point (boundary-inclusive).
    pub fn intersects(&self, other: &Region) -> bool {
        self.min_x <= other.max_x
            && self.max_x >= other.min_x
            && self.min_y <= other.max_y
            && self.max_y >= other.min_y
    }

    /// True iff this region fully encloses `other`, boundary-inclusive.
    pub fn contains(&self, other: &Region) -> bool {
        other.min_x >= self.min_x
            && other.max_x <= self.max_x
            && other.min_y >= self.min_y
            && other.max_y <= self.max_y
    }

    /// The smallest region covering both `self` and `other`.
    pub fn union(&self, other: &Region) -> Region {
        Region {
            min_x: self.min_x.min(other.min_x),
            min_y: self.min_y.min(other.min_y),
            max_x: self.max_x.max(other.max_x),
            max_y: self.max_y.max(other.max_y),
        }
    }

    /// Grow this region in place so that it covers `other`.
    pub fn expand_to_include(&mut self, other: &Region) {
        *self = self.union(other);
    }

    /// Clip this region to `other`, or `None` if the two are disjoint.
    pub fn intersection(&self, other: &Region) -> Option<Region> {
        if !self.intersects(other) {
            return None;
        }
        Some(Region {
            min_x: self.min_x.max(other.min_x),
            min_y: self.min_y.max(other.min_y),
            max_x: self.max_x.min(other.max_x),
            max_y: self.max_y.min(other.max_y),
        })
    }
}

impl From<Rect<f64>> for Region {
    fn from(rect: Rect<f64>) -> Self {
        Region::new(rect.min().x, rect.min().y, rect.max().x, rect.max().y)
    }
}

impl From<Region> for Rect<f64> {
    fn from(region: Region) -> Self {
        Rect::new(
            Coord {
                x: region.min_x,
                y: region.min_y,
            },
            Coord {
                x: region.max_x,
                y: region.max_y,
            },
        )
    }
}
