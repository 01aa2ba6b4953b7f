#![warn(missing_docs)]

//! Math types for the meshtrace ray-tracing kernel.
//!
//! Thin wrappers around nalgebra providing domain-specific types for
//! double-precision mesh geometry: points, vectors, directions, and
//! axis-aligned bounding boxes.

use nalgebra::{Unit, Vector3};

/// A point in 3D space.
pub type Point3 = nalgebra::Point3<f64>;

/// A vector in 3D space.
pub type Vec3 = Vector3<f64>;

/// A unit (normalized) direction vector in 3D space.
pub type Dir3 = Unit<Vector3<f64>>;

/// A spatial location handed to a geometric query.
pub type Position = Point3;

/// A ray direction handed to a geometric query.
///
/// Directions are used as given; query distances are reported in units
/// of the direction's length.
pub type Direction = Vec3;

/// An axis-aligned bounding box in 3D space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb3 {
    /// Minimum corner.
    pub min: Point3,
    /// Maximum corner.
    pub max: Point3,
}

impl Aabb3 {
    /// Create a box from its corners.
    pub fn new(min: Point3, max: Point3) -> Self {
        Self { min, max }
    }

    /// An inverted box that grows to fit the first point included.
    pub fn empty() -> Self {
        Self {
            min: Point3::new(f64::INFINITY, f64::INFINITY, f64::INFINITY),
            max: Point3::new(f64::NEG_INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY),
        }
    }

    /// Whether no point has been included yet.
    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x
    }

    /// Grow the box to contain `p`.
    pub fn include_point(&mut self, p: &Point3) {
        self.min.x = self.min.x.min(p.x);
        self.min.y = self.min.y.min(p.y);
        self.min.z = self.min.z.min(p.z);
        self.max.x = self.max.x.max(p.x);
        self.max.y = self.max.y.max(p.y);
        self.max.z = self.max.z.max(p.z);
    }

    /// Grow the box to contain another box.
    pub fn include(&mut self, other: &Aabb3) {
        self.include_point(&other.min);
        self.include_point(&other.max);
    }

    /// Expand the box outward by `margin` on every side.
    pub fn expand(&mut self, margin: f64) {
        self.min.x -= margin;
        self.min.y -= margin;
        self.min.z -= margin;
        self.max.x += margin;
        self.max.y += margin;
        self.max.z += margin;
    }

    /// Edge lengths along each axis.
    pub fn extent(&self) -> Vec3 {
        self.max - self.min
    }

    /// The largest edge length.
    pub fn max_extent(&self) -> f64 {
        let e = self.extent();
        e.x.max(e.y).max(e.z)
    }

    /// Geometric center of the box.
    pub fn center(&self) -> Point3 {
        Point3::new(
            (self.min.x + self.max.x) / 2.0,
            (self.min.y + self.max.y) / 2.0,
            (self.min.z + self.max.z) / 2.0,
        )
    }

    /// Whether `p` lies inside the box (closed on all faces).
    pub fn contains_point(&self, p: &Point3) -> bool {
        p.x >= self.min.x
            && p.x <= self.max.x
            && p.y >= self.min.y
            && p.y <= self.max.y
            && p.z >= self.min.z
            && p.z <= self.max.z
    }

    /// Squared distance from `p` to the box (zero when inside).
    pub fn distance_squared(&self, p: &Point3) -> f64 {
        let dx = (self.min.x - p.x).max(0.0).max(p.x - self.max.x);
        let dy = (self.min.y - p.y).max(0.0).max(p.y - self.max.y);
        let dz = (self.min.z - p.z).max(0.0).max(p.z - self.max.z);
        dx * dx + dy * dy + dz * dz
    }

    /// Surface area of the box.
    pub fn surface_area(&self) -> f64 {
        if self.is_empty() {
            return 0.0;
        }
        let d = self.extent();
        2.0 * (d.x * d.y + d.y * d.z + d.z * d.x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_box_grows() {
        let mut b = Aabb3::empty();
        assert!(b.is_empty());
        b.include_point(&Point3::new(1.0, 2.0, 3.0));
        assert!(!b.is_empty());
        assert_eq!(b.min, b.max);
        b.include_point(&Point3::new(-1.0, 0.0, 5.0));
        assert_eq!(b.min, Point3::new(-1.0, 0.0, 3.0));
        assert_eq!(b.max, Point3::new(1.0, 2.0, 5.0));
    }

    #[test]
    fn test_extent_and_center() {
        let b = Aabb3::new(Point3::new(-2.0, -3.0, -4.0), Point3::new(5.0, 6.0, 7.0));
        assert_eq!(b.extent(), Vec3::new(7.0, 9.0, 11.0));
        assert_eq!(b.max_extent(), 11.0);
        assert_eq!(b.center(), Point3::new(1.5, 1.5, 1.5));
    }

    #[test]
    fn test_contains_point() {
        let b = Aabb3::new(Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 1.0, 1.0));
        assert!(b.contains_point(&Point3::new(0.5, 0.5, 0.5)));
        assert!(b.contains_point(&Point3::new(1.0, 1.0, 1.0)));
        assert!(!b.contains_point(&Point3::new(1.0, 1.0, 1.1)));
    }

    #[test]
    fn test_distance_squared() {
        let b = Aabb3::new(Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 1.0, 1.0));
        assert_eq!(b.distance_squared(&Point3::new(0.5, 0.5, 0.5)), 0.0);
        assert!((b.distance_squared(&Point3::new(2.0, 0.5, 0.5)) - 1.0).abs() < 1e-12);
        assert!((b.distance_squared(&Point3::new(2.0, 2.0, 0.5)) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_expand() {
        let mut b = Aabb3::new(Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 1.0, 1.0));
        b.expand(0.5);
        assert_eq!(b.min, Point3::new(-0.5, -0.5, -0.5));
        assert_eq!(b.max, Point3::new(1.5, 1.5, 1.5));
    }

    #[test]
    fn test_surface_area() {
        let b = Aabb3::new(Point3::new(0.0, 0.0, 0.0), Point3::new(2.0, 3.0, 4.0));
        assert!((b.surface_area() - 52.0).abs() < 1e-12);
        assert_eq!(Aabb3::empty().surface_area(), 0.0);
    }
}
