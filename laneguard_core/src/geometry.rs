//! The "GEOMETRY" Engine - Oriented Bounding Box Contact Test
//!
//! Obstacle footprints and lane corridors are both modelled as oriented
//! rectangles. Vicinity between the two is decided by a Separating Axis Test
//! over the four edge normals (two per box), which also yields the smallest
//! gap observed on a separating axis.
//!
//! This function sits in the hot path of every vicinity check, so it trusts
//! its inputs: extents must be strictly positive (see [`OrientedBox::new`]).

use nalgebra::{Rotation2, Vector2};
use serde::{Deserialize, Serialize};
use std::f64::consts::TAU;

/// Gaps at or below this value count as touching.
pub const CONTACT_TOLERANCE: f64 = 1e-3;

/// Two axes whose cross product is below this value are treated as the same axis.
const PARALLEL_TOLERANCE: f64 = 1e-9;

// ============================================================================
// ORIENTED BOX
// ============================================================================

/// A rectangle with a center, a heading and half-extents.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrientedBox {
    /// Center [x, y] in the common reference frame (meters)
    pub center: Vector2<f64>,

    /// Heading in radians, normalised to [0, 2π)
    pub heading: f64,

    /// Half of [size_x, size_y] (meters)
    pub half_extents: Vector2<f64>,
}

impl OrientedBox {
    /// Create a box from its center, heading and full size.
    ///
    /// # Precondition
    /// `size_x` and `size_y` must be strictly positive. Degenerate boxes are
    /// never built by this crate (zero-length lanes are not indexed); the
    /// contact test gives no meaningful answer for them.
    pub fn new(x: f64, y: f64, heading: f64, size_x: f64, size_y: f64) -> Self {
        debug_assert!(size_x > 0.0 && size_y > 0.0, "degenerate box extents");
        Self {
            center: Vector2::new(x, y),
            heading: heading.rem_euclid(TAU),
            half_extents: Vector2::new(size_x * 0.5, size_y * 0.5),
        }
    }

    /// Build the corridor box of a straight segment: centered on the midpoint,
    /// aligned with the segment, `width` wide.
    ///
    /// Returns `None` for a zero-length segment or a non-positive width.
    pub fn from_segment(start: [f64; 2], end: [f64; 2], width: f64) -> Option<Self> {
        let start = Vector2::new(start[0], start[1]);
        let end = Vector2::new(end[0], end[1]);
        let delta = end - start;
        let length = delta.norm();
        if length <= f64::EPSILON || width <= 0.0 {
            return None;
        }
        let mid = (start + end) * 0.5;
        Some(Self::new(mid.x, mid.y, delta.y.atan2(delta.x), length, width))
    }

    /// Full size [size_x, size_y].
    pub fn size(&self) -> Vector2<f64> {
        self.half_extents * 2.0
    }

    /// The box's local x and y axes expressed in the reference frame.
    #[inline]
    pub fn axes(&self) -> [Vector2<f64>; 2] {
        let rot = Rotation2::new(self.heading);
        [rot * Vector2::new(1.0, 0.0), rot * Vector2::new(0.0, 1.0)]
    }

    /// Corners in counter-clockwise order starting from local (-x, -y).
    pub fn corners(&self) -> [Vector2<f64>; 4] {
        let [ux, uy] = self.axes();
        let hx = ux * self.half_extents.x;
        let hy = uy * self.half_extents.y;
        [
            self.center - hx - hy,
            self.center + hx - hy,
            self.center + hx + hy,
            self.center - hx + hy,
        ]
    }

    /// Interval covered by the box when projected onto a unit `axis`.
    #[inline]
    fn project(&self, axis: &Vector2<f64>) -> (f64, f64) {
        let [ux, uy] = self.axes();
        let mid = self.center.dot(axis);
        let radius =
            self.half_extents.x * ux.dot(axis).abs() + self.half_extents.y * uy.dot(axis).abs();
        (mid - radius, mid + radius)
    }
}

// ============================================================================
// CONTACT TEST
// ============================================================================

/// Result of [`intersects`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Contact {
    /// No separating axis: overlapping or touching within tolerance.
    Intersecting,

    /// Separated; carries the smallest gap among the separating axes.
    Separated(f64),
}

impl Contact {
    pub fn is_intersecting(&self) -> bool {
        matches!(self, Contact::Intersecting)
    }

    /// Separation distance, `None` when intersecting.
    pub fn separation(&self) -> Option<f64> {
        match self {
            Contact::Intersecting => None,
            Contact::Separated(gap) => Some(*gap),
        }
    }

    /// True when intersecting, or separated by no more than `threshold`.
    pub fn within(&self, threshold: f64) -> bool {
        match self {
            Contact::Intersecting => true,
            Contact::Separated(gap) => *gap <= threshold,
        }
    }
}

/// Separating Axis Test between two oriented boxes.
///
/// Candidate axes are the two edge normals of each box; an axis of `b`
/// parallel to one already tested is skipped. On each axis the signed gap
/// between the projected intervals is measured. Any gap above
/// [`CONTACT_TOLERANCE`] separates the boxes, and the reported separation is
/// the smallest such gap.
///
/// The result does not depend on argument order.
///
/// Boxes rotate about their own centers: a 2×2 square at x = 1 and a 2×2
/// square at x = 4 turned 45° are `2 - √2` apart, not `√2 - 1`.
pub fn intersects(a: &OrientedBox, b: &OrientedBox) -> Contact {
    let mut tested: [Vector2<f64>; 4] = [Vector2::zeros(); 4];
    let mut n_tested = 0;
    let mut separation: Option<f64> = None;

    for axis in a.axes().into_iter().chain(b.axes()) {
        let duplicate = tested[..n_tested]
            .iter()
            .any(|t| (t.x * axis.y - t.y * axis.x).abs() < PARALLEL_TOLERANCE);
        if duplicate {
            continue;
        }
        tested[n_tested] = axis;
        n_tested += 1;

        let (a_min, a_max) = a.project(&axis);
        let (b_min, b_max) = b.project(&axis);
        let gap = (b_min - a_max).max(a_min - b_max);

        if gap > CONTACT_TOLERANCE {
            separation = Some(separation.map_or(gap, |s: f64| s.min(gap)));
        }
    }

    match separation {
        Some(gap) => Contact::Separated(gap),
        None => Contact::Intersecting,
    }
}

// ============================================================================
// TESTS
// ============================================================================
