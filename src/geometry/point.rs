//! A point in three-dimensional Euclidean space.

use nalgebra::Vector3;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};

/// A 3D point with `f64` coordinates.
///
/// Coordinates are not validated on construction; the input loaders reject
/// non-finite values before any point reaches the mesh kernel
/// (see [`crate::error::MeshError::MalformedInput`]).
///
/// # Examples
///
/// ```
/// use tetmesh::geometry::point::Point;
///
/// let p = Point::new([1.0, 2.0, 3.0]);
/// assert_eq!(p.x(), 1.0);
/// assert!(p.is_finite());
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    coords: [f64; 3],
}

impl Point {
    /// Creates a new point from its coordinates.
    #[inline]
    #[must_use]
    pub const fn new(coords: [f64; 3]) -> Self {
        Self { coords }
    }

    /// The coordinate array.
    #[inline]
    #[must_use]
    pub const fn coords(&self) -> &[f64; 3] {
        &self.coords
    }

    /// The x coordinate.
    #[inline]
    #[must_use]
    pub const fn x(&self) -> f64 {
        self.coords[0]
    }

    /// The y coordinate.
    #[inline]
    #[must_use]
    pub const fn y(&self) -> f64 {
        self.coords[1]
    }

    /// The z coordinate.
    #[inline]
    #[must_use]
    pub const fn z(&self) -> f64 {
        self.coords[2]
    }

    /// `true` when all three coordinates are finite.
    #[inline]
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.coords.iter().all(|c| c.is_finite())
    }

    /// This point as a nalgebra vector, for derived (inexact) computations.
    #[inline]
    #[must_use]
    pub fn to_vector(self) -> Vector3<f64> {
        Vector3::new(self.coords[0], self.coords[1], self.coords[2])
    }

    /// Euclidean distance to `other`.
    #[inline]
    #[must_use]
    pub fn distance(&self, other: &Self) -> f64 {
        self.distance_squared(other).sqrt()
    }

    /// Squared Euclidean distance to `other`.
    #[inline]
    #[must_use]
    pub fn distance_squared(&self, other: &Self) -> f64 {
        let dx = self.coords[0] - other.coords[0];
        let dy = self.coords[1] - other.coords[1];
        let dz = self.coords[2] - other.coords[2];
        dz.mul_add(dz, dx.mul_add(dx, dy * dy))
    }

    /// The midpoint of `a` and `b`.
    #[inline]
    #[must_use]
    pub fn midpoint(a: &Self, b: &Self) -> Self {
        Self::new([
            0.5 * (a.coords[0] + b.coords[0]),
            0.5 * (a.coords[1] + b.coords[1]),
            0.5 * (a.coords[2] + b.coords[2]),
        ])
    }

    /// The centroid of a non-empty point set.
    #[must_use]
    pub fn centroid(points: &[Self]) -> Self {
        let mut acc = [0.0_f64; 3];
        for p in points {
            acc[0] += p.coords[0];
            acc[1] += p.coords[1];
            acc[2] += p.coords[2];
        }
        #[allow(clippy::cast_precision_loss)]
        let n = points.len().max(1) as f64;
        Self::new([acc[0] / n, acc[1] / n, acc[2] / n])
    }
}

impl From<[f64; 3]> for Point {
    fn from(coords: [f64; 3]) -> Self {
        Self::new(coords)
    }
}

// Equality on points is coordinate-bit equality; NaN never reaches the kernel,
// so the reflexivity requirement of Eq holds in practice.
impl Eq for Point {}

impl Hash for Point {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for &c in &self.coords {
            OrderedFloat(c).hash(state);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn accessors() {
        let p = Point::new([1.0, -2.0, 0.5]);
        assert_eq!(p.coords(), &[1.0, -2.0, 0.5]);
        assert_eq!((p.x(), p.y(), p.z()), (1.0, -2.0, 0.5));
    }

    #[test]
    fn finite_detection() {
        assert!(Point::new([0.0, 0.0, 0.0]).is_finite());
        assert!(!Point::new([f64::NAN, 0.0, 0.0]).is_finite());
        assert!(!Point::new([0.0, f64::INFINITY, 0.0]).is_finite());
    }

    #[test]
    fn distances_and_midpoint() {
        let a = Point::new([0.0, 0.0, 0.0]);
        let b = Point::new([3.0, 4.0, 0.0]);
        assert_relative_eq!(a.distance(&b), 5.0);
        assert_relative_eq!(a.distance_squared(&b), 25.0);
        assert_eq!(Point::midpoint(&a, &b), Point::new([1.5, 2.0, 0.0]));
    }

    #[test]
    fn centroid_of_tetrahedron() {
        let pts = [
            Point::new([0.0, 0.0, 0.0]),
            Point::new([1.0, 0.0, 0.0]),
            Point::new([0.0, 1.0, 0.0]),
            Point::new([0.0, 0.0, 1.0]),
        ];
        let c = Point::centroid(&pts);
        assert_relative_eq!(c.x(), 0.25);
        assert_relative_eq!(c.y(), 0.25);
        assert_relative_eq!(c.z(), 0.25);
    }
}
