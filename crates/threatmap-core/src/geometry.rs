//! Geometric primitives for diagram positioning.
//!
//! This module provides the geometric types used to place components and
//! trust boundaries on the diagram canvas.
//!
//! # Overview
//!
//! - [`Point`] - A 2D coordinate in diagram space
//! - [`Size`] - Width and height dimensions
//! - [`Bounds`] - A rectangular box defined by minimum and maximum coordinates
//!
//! # Coordinate System
//!
//! Threatmap uses the same coordinate system as the rendering layer:
//!
//! ```text
//!   (0,0) ────────► +X
//!     │
//!     │
//!     ▼
//!    +Y
//! ```
//!
//! Node positions always refer to the **top-left** corner of the node, which
//! is what the document's `x`/`y` fields store.

use serde::Serialize;

/// A 2D point in diagram coordinate space.
///
/// # Examples
///
/// ```
/// # use threatmap_core::geometry::Point;
/// let p1 = Point::new(10.0, 20.0);
/// let p2 = Point::new(5.0, 5.0);
///
/// let sum = p1.add_point(p2);
/// assert_eq!(sum.x(), 15.0);
/// assert_eq!(sum.y(), 25.0);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Point {
    x: f64,
    y: f64,
}

impl Point {
    /// Creates a new point with the specified coordinates
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Returns the x-coordinate of the point
    pub fn x(self) -> f64 {
        self.x
    }

    /// Returns the y-coordinate of the point
    pub fn y(self) -> f64 {
        self.y
    }

    /// Adds another point to this point, returning a new point
    pub fn add_point(self, other: Point) -> Self {
        Self {
            x: self.x + other.x,
            y: self.y + other.y,
        }
    }

    /// Subtracts another point from this point, returning a new point
    pub fn sub_point(self, other: Point) -> Self {
        Self {
            x: self.x - other.x,
            y: self.y - other.y,
        }
    }

    /// Calculates the midpoint between this point and another point
    pub fn midpoint(self, other: Point) -> Self {
        Self {
            x: (self.x + other.x) / 2.0,
            y: (self.y + other.y) / 2.0,
        }
    }

    /// Euclidean distance to another point.
    pub fn distance(self, other: Point) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    /// Rounds both coordinates to the nearest integer.
    ///
    /// ```
    /// # use threatmap_core::geometry::Point;
    /// let p = Point::new(10.4, 19.6).round();
    /// assert_eq!(p, Point::new(10.0, 20.0));
    /// ```
    pub fn round(self) -> Self {
        Self {
            x: self.x.round(),
            y: self.y.round(),
        }
    }

    /// Returns the centroid of a set of points, or `None` when empty.
    pub fn centroid(points: impl IntoIterator<Item = Point>) -> Option<Point> {
        let (sum, count) = points
            .into_iter()
            .fold((Point::default(), 0usize), |(acc, n), p| {
                (acc.add_point(p), n + 1)
            });
        if count == 0 {
            return None;
        }
        Some(Point::new(sum.x / count as f64, sum.y / count as f64))
    }
}

/// Width and height of an element.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Size {
    width: f64,
    height: f64,
}

impl Size {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// Returns the width dimension of this size
    pub fn width(self) -> f64 {
        self.width
    }

    /// Returns the height dimension of this size
    pub fn height(self) -> f64 {
        self.height
    }

    /// Returns the area covered by this size
    pub fn area(self) -> f64 {
        self.width * self.height
    }
}

/// A rectangular box with minimum and maximum coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Bounds {
    min_x: f64,
    min_y: f64,
    max_x: f64,
    max_y: f64,
}

impl Bounds {
    /// Creates a new bounds from a top-left point and a size
    pub fn new_from_top_left(top_left: Point, size: Size) -> Self {
        Self {
            min_x: top_left.x,
            min_y: top_left.y,
            max_x: top_left.x + size.width,
            max_y: top_left.y + size.height,
        }
    }

    /// Returns the minimum x-coordinate of the bounds
    pub fn min_x(self) -> f64 {
        self.min_x
    }

    /// Returns the minimum y-coordinate of the bounds
    pub fn min_y(self) -> f64 {
        self.min_y
    }

    /// Returns the maximum x-coordinate of the bounds
    pub fn max_x(self) -> f64 {
        self.max_x
    }

    /// Returns the maximum y-coordinate of the bounds
    pub fn max_y(self) -> f64 {
        self.max_y
    }

    /// Returns the width of the bounds
    pub fn width(self) -> f64 {
        self.max_x - self.min_x
    }

    /// Returns the height of the bounds
    pub fn height(self) -> f64 {
        self.max_y - self.min_y
    }

    /// Returns the top-left corner as a Point
    pub fn min_point(self) -> Point {
        Point::new(self.min_x, self.min_y)
    }

    /// Returns the center point of the bounds
    pub fn center(self) -> Point {
        Point::new(
            (self.min_x + self.max_x) / 2.0,
            (self.min_y + self.max_y) / 2.0,
        )
    }

    /// Converts bounds to a Size object
    pub fn to_size(self) -> Size {
        Size::new(self.width(), self.height())
    }

    /// Returns the area covered by the bounds
    pub fn area(self) -> f64 {
        self.width() * self.height()
    }

    /// Merges two bounds into the smallest bounds containing both.
    ///
    /// # Examples
    ///
    /// ```
    /// # use threatmap_core::geometry::{Bounds, Point, Size};
    /// let a = Bounds::new_from_top_left(Point::new(0.0, 0.0), Size::new(100.0, 30.0));
    /// let b = Bounds::new_from_top_left(Point::new(10.0, 40.0), Size::new(120.0, 80.0));
    ///
    /// let combined = a.merge(&b);
    /// assert_eq!(combined.width(), 130.0);
    /// assert_eq!(combined.height(), 120.0);
    /// ```
    pub fn merge(&self, other: &Self) -> Self {
        Self {
            min_x: self.min_x.min(other.min_x),
            min_y: self.min_y.min(other.min_y),
            max_x: self.max_x.max(other.max_x),
            max_y: self.max_y.max(other.max_y),
        }
    }

    /// Grows the bounds by `padding` on every side.
    pub fn expand(&self, padding: f64) -> Self {
        Self {
            min_x: self.min_x - padding,
            min_y: self.min_y - padding,
            max_x: self.max_x + padding,
            max_y: self.max_y + padding,
        }
    }

    /// Checks whether a point lies inside the bounds (edges inclusive).
    pub fn contains(&self, point: Point) -> bool {
        point.x >= self.min_x
            && point.x <= self.max_x
            && point.y >= self.min_y
            && point.y <= self.max_y
    }
}

#[cfg(test)]
mod tests {
    use float_cmp::assert_approx_eq;

    use super::*;

    #[test]
    fn test_point_round() {
        let p = Point::new(99.5, -0.4).round();
        assert_approx_eq!(f64, p.x(), 100.0);
        assert_approx_eq!(f64, p.y(), 0.0);
    }

    #[test]
    fn test_centroid() {
        let c = Point::centroid([Point::new(0.0, 0.0), Point::new(10.0, 20.0)]).unwrap();
        assert_approx_eq!(f64, c.x(), 5.0);
        assert_approx_eq!(f64, c.y(), 10.0);

        assert!(Point::centroid(Vec::new()).is_none());
    }

    #[test]
    fn test_bounds_contains_edges() {
        let b = Bounds::new_from_top_left(Point::new(10.0, 10.0), Size::new(20.0, 20.0));
        assert!(b.contains(Point::new(10.0, 10.0)));
        assert!(b.contains(Point::new(30.0, 30.0)));
        assert!(b.contains(Point::new(20.0, 15.0)));
        assert!(!b.contains(Point::new(31.0, 15.0)));
        assert!(!b.contains(Point::new(20.0, 9.0)));
    }

    #[test]
    fn test_bounds_expand() {
        let b = Bounds::new_from_top_left(Point::new(100.0, 100.0), Size::new(140.0, 80.0))
            .expand(40.0);
        assert_approx_eq!(f64, b.min_x(), 60.0);
        assert_approx_eq!(f64, b.min_y(), 60.0);
        assert_approx_eq!(f64, b.width(), 220.0);
        assert_approx_eq!(f64, b.height(), 160.0);
    }

    #[test]
    fn test_bounds_center_and_area() {
        let b = Bounds::new_from_top_left(Point::new(0.0, 0.0), Size::new(40.0, 10.0));
        assert_eq!(b.center(), Point::new(20.0, 5.0));
        assert_approx_eq!(f64, b.area(), 400.0);
        assert_eq!(b.to_size(), Size::new(40.0, 10.0));
    }
}
