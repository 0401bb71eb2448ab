//! 2D vector math and the tolerance-aware predicates shared by the
//! polygon decomposer and the server's physics engine.
//!
//! Coordinates follow screen space: x grows to the right, y grows down.
//! None of the predicates compare floats exactly; every test goes through
//! [`scalar_eq`] or a signed-area threshold.

use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign, Mul, Neg, Sub};

///Represents a vector in 2D space.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
pub struct Vector2 {
    ///Value along the x-axis.
    /// Positive direction is to the right.
    pub x: f32,
    ///Value along the y-axis.
    /// Positive direction is down.
    pub y: f32,
}

impl Vector2 {
    pub const ZERO: Vector2 = Vector2 { x: 0.0, y: 0.0 };

    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    ///Returns the magnitude of the vector.
    pub fn magnitude(&self) -> f32 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    ///Returns the normalized vector.
    pub fn normalize(&self) -> Vector2 {
        let mag = self.magnitude();
        if scalar_eq(mag, 0.0, f32::EPSILON) {
            Vector2::ZERO
        } else {
            Vector2 {
                x: self.x / mag,
                y: self.y / mag,
            }
        }
    }

    ///Returns the scaled vector.
    pub fn scale(&self, scalar: f32) -> Vector2 {
        Vector2 {
            x: self.x * scalar,
            y: self.y * scalar,
        }
    }

    pub fn dot(&self, other: Vector2) -> f32 {
        self.x * other.x + self.y * other.y
    }

    ///Returns the z component of the 3D cross product.
    pub fn cross(&self, other: Vector2) -> f32 {
        self.x * other.y - self.y * other.x
    }

    ///Returns the vector rotated by `angle` radians.
    pub fn rotate(&self, angle: f32) -> Vector2 {
        let (sin, cos) = angle.sin_cos();
        Vector2 {
            x: self.x * cos - self.y * sin,
            y: self.x * sin + self.y * cos,
        }
    }

    ///Returns the perpendicular vector (rotated a quarter turn).
    pub fn perp(&self) -> Vector2 {
        Vector2 {
            x: -self.y,
            y: self.x,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl Add for Vector2 {
    type Output = Vector2;

    fn add(self, other: Vector2) -> Vector2 {
        Vector2::new(self.x + other.x, self.y + other.y)
    }
}

impl AddAssign for Vector2 {
    fn add_assign(&mut self, other: Vector2) {
        self.x += other.x;
        self.y += other.y;
    }
}

impl Sub for Vector2 {
    type Output = Vector2;

    fn sub(self, other: Vector2) -> Vector2 {
        Vector2::new(self.x - other.x, self.y - other.y)
    }
}

impl Mul<f32> for Vector2 {
    type Output = Vector2;

    fn mul(self, scalar: f32) -> Vector2 {
        self.scale(scalar)
    }
}

impl Neg for Vector2 {
    type Output = Vector2;

    fn neg(self) -> Vector2 {
        Vector2::new(-self.x, -self.y)
    }
}

/// An ordered vertex loop. The closing edge from the last vertex back to
/// the first is implicit.
pub type Polygon = Vec<Vector2>;

pub fn scalar_eq(a: f32, b: f32, precision: f32) -> bool {
    (a - b).abs() <= precision
}

pub fn points_eq(a: Vector2, b: Vector2, precision: f32) -> bool {
    scalar_eq(a.x, b.x, precision) && scalar_eq(a.y, b.y, precision)
}

/// Twice the signed area of the triangle `a b c`. Positive when the points
/// turn left (counter-clockwise).
pub fn triangle_area(a: Vector2, b: Vector2, c: Vector2) -> f32 {
    (b.x - a.x) * (c.y - a.y) - (c.x - a.x) * (b.y - a.y)
}

pub fn is_left(a: Vector2, b: Vector2, c: Vector2, eps: f32) -> bool {
    triangle_area(a, b, c) > eps
}

pub fn is_left_on(a: Vector2, b: Vector2, c: Vector2, eps: f32) -> bool {
    triangle_area(a, b, c) >= -eps
}

pub fn is_right(a: Vector2, b: Vector2, c: Vector2, eps: f32) -> bool {
    triangle_area(a, b, c) < -eps
}

pub fn is_right_on(a: Vector2, b: Vector2, c: Vector2, eps: f32) -> bool {
    triangle_area(a, b, c) <= eps
}

/// Checks whether `a b c` are collinear: the angle between `ab` and `bc`
/// is below `threshold_angle` radians. Zero-length edges count as
/// collinear.
pub fn collinear(a: Vector2, b: Vector2, c: Vector2, threshold_angle: f32) -> bool {
    let ab = b - a;
    let bc = c - b;
    let mags = ab.magnitude() * bc.magnitude();
    if scalar_eq(mags, 0.0, f32::EPSILON) {
        return true;
    }
    let cos = (ab.dot(bc) / mags).clamp(-1.0, 1.0);
    cos.acos() < threshold_angle
}

pub fn sq_dist(a: Vector2, b: Vector2) -> f32 {
    let d = b - a;
    d.x * d.x + d.y * d.y
}

/// Intersection of the infinite lines through `l1` and `l2`. `None` when
/// the lines are parallel within `precision`.
pub fn line_intersection(
    l1: (Vector2, Vector2),
    l2: (Vector2, Vector2),
    precision: f32,
) -> Option<Vector2> {
    let a1 = l1.1.y - l1.0.y;
    let b1 = l1.0.x - l1.1.x;
    let c1 = a1 * l1.0.x + b1 * l1.0.y;
    let a2 = l2.1.y - l2.0.y;
    let b2 = l2.0.x - l2.1.x;
    let c2 = a2 * l2.0.x + b2 * l2.0.y;
    let det = a1 * b2 - a2 * b1;
    if scalar_eq(det, 0.0, precision) {
        return None;
    }
    Some(Vector2::new(
        (b2 * c1 - b1 * c2) / det,
        (a1 * c2 - a2 * c1) / det,
    ))
}

/// Checks whether segment `p1 p2` intersects segment `q1 q2`. Touching
/// endpoints count as an intersection, parallel segments never do.
pub fn segments_intersect(p1: Vector2, p2: Vector2, q1: Vector2, q2: Vector2, eps: f32) -> bool {
    let dx = p2.x - p1.x;
    let dy = p2.y - p1.y;
    let da = q2.x - q1.x;
    let db = q2.y - q1.y;

    let denom = da * dy - db * dx;
    if scalar_eq(denom, 0.0, eps) {
        return false;
    }

    let s = (dx * (q1.y - p1.y) + dy * (p1.x - q1.x)) / denom;
    let t = (da * (p1.y - q1.y) + db * (q1.x - p1.x)) / -denom;

    (0.0..=1.0).contains(&s) && (0.0..=1.0).contains(&t)
}

/// Vertex at position `i`, wrapping around in both directions.
pub fn polygon_at(polygon: &[Vector2], i: isize) -> Vector2 {
    let s = polygon.len() as isize;
    polygon[i.rem_euclid(s) as usize]
}

/// Signed area; positive for counter-clockwise loops.
pub fn polygon_area(polygon: &[Vector2]) -> f32 {
    let n = polygon.len();
    if n < 3 {
        return 0.0;
    }
    let twice: f32 = (0..n)
        .map(|i| polygon[i].cross(polygon[(i + 1) % n]))
        .sum();
    twice / 2.0
}

/// Area-weighted centroid. `None` for degenerate (zero-area) loops.
pub fn polygon_centroid(polygon: &[Vector2]) -> Option<Vector2> {
    let area = polygon_area(polygon);
    if scalar_eq(area, 0.0, f32::EPSILON) {
        return None;
    }
    let n = polygon.len();
    let mut sum = Vector2::ZERO;
    for i in 0..n {
        let a = polygon[i];
        let b = polygon[(i + 1) % n];
        let cross = a.cross(b);
        sum += (a + b) * cross;
    }
    Some(sum * (1.0 / (6.0 * area)))
}

/// True when no vertex of a counter-clockwise loop turns right.
pub fn is_convex(polygon: &[Vector2], eps: f32) -> bool {
    let n = polygon.len() as isize;
    n >= 3
        && (0..n).all(|i| {
            !is_right(
                polygon_at(polygon, i - 1),
                polygon_at(polygon, i),
                polygon_at(polygon, i + 1),
                eps,
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn square(size: f32) -> Polygon {
        vec![
            Vector2::new(0.0, 0.0),
            Vector2::new(size, 0.0),
            Vector2::new(size, size),
            Vector2::new(0.0, size),
        ]
    }

    #[test]
    fn test_vector_rotate_quarter_turn() {
        let v = Vector2::new(1.0, 0.0).rotate(std::f32::consts::FRAC_PI_2);
        assert_approx_eq!(v.x, 0.0, 1e-6);
        assert_approx_eq!(v.y, 1.0, 1e-6);
    }

    #[test]
    fn test_normalize_zero_vector() {
        let v = Vector2::ZERO.normalize();
        assert_eq!(v.x, 0.0);
        assert_eq!(v.y, 0.0);
    }

    #[test]
    fn test_turn_predicates() {
        let a = Vector2::new(0.0, 0.0);
        let b = Vector2::new(10.0, 0.0);
        let left = Vector2::new(10.0, 10.0);
        let right = Vector2::new(10.0, -10.0);
        let ahead = Vector2::new(20.0, 0.0);

        assert!(is_left(a, b, left, 1e-4));
        assert!(is_right(a, b, right, 1e-4));
        assert!(!is_left(a, b, ahead, 1e-4));
        assert!(!is_right(a, b, ahead, 1e-4));
        assert!(is_left_on(a, b, ahead, 1e-4));
        assert!(is_right_on(a, b, ahead, 1e-4));
    }

    #[test]
    fn test_collinear_threshold() {
        let a = Vector2::new(0.0, 0.0);
        let b = Vector2::new(10.0, 0.0);
        let nearly = Vector2::new(20.0, 0.01);
        let bent = Vector2::new(20.0, 5.0);

        assert!(collinear(a, b, nearly, 0.01));
        assert!(!collinear(a, b, bent, 0.01));
        assert!(!collinear(a, b, nearly, 0.0));
    }

    #[test]
    fn test_line_intersection() {
        let p = line_intersection(
            (Vector2::new(0.0, 0.0), Vector2::new(10.0, 10.0)),
            (Vector2::new(0.0, 10.0), Vector2::new(10.0, 0.0)),
            1e-4,
        )
        .unwrap();
        assert_approx_eq!(p.x, 5.0, 1e-4);
        assert_approx_eq!(p.y, 5.0, 1e-4);

        let parallel = line_intersection(
            (Vector2::new(0.0, 0.0), Vector2::new(10.0, 0.0)),
            (Vector2::new(0.0, 5.0), Vector2::new(10.0, 5.0)),
            1e-4,
        );
        assert!(parallel.is_none());
    }

    #[test]
    fn test_segments_intersect() {
        let eps = 1e-4;
        assert!(segments_intersect(
            Vector2::new(0.0, 0.0),
            Vector2::new(10.0, 10.0),
            Vector2::new(0.0, 10.0),
            Vector2::new(10.0, 0.0),
            eps
        ));
        assert!(!segments_intersect(
            Vector2::new(0.0, 0.0),
            Vector2::new(4.0, 4.0),
            Vector2::new(0.0, 10.0),
            Vector2::new(10.0, 0.0),
            eps
        ));
    }

    #[test]
    fn test_polygon_at_wraps() {
        let poly = square(1.0);
        assert_approx_eq!(polygon_at(&poly, -1).y, 1.0);
        assert_approx_eq!(polygon_at(&poly, 4).x, 0.0);
        assert_approx_eq!(polygon_at(&poly, 5).x, 1.0);
    }

    #[test]
    fn test_polygon_area_and_centroid() {
        let poly = square(20.0);
        assert_approx_eq!(polygon_area(&poly), 400.0);

        let reversed: Polygon = poly.iter().rev().copied().collect();
        assert_approx_eq!(polygon_area(&reversed), -400.0);

        let c = polygon_centroid(&poly).unwrap();
        assert_approx_eq!(c.x, 10.0, 1e-4);
        assert_approx_eq!(c.y, 10.0, 1e-4);
    }

    #[test]
    fn test_degenerate_centroid() {
        let line = vec![
            Vector2::new(0.0, 0.0),
            Vector2::new(5.0, 0.0),
            Vector2::new(10.0, 0.0),
        ];
        assert!(polygon_centroid(&line).is_none());
    }

    #[test]
    fn test_is_convex() {
        assert!(is_convex(&square(5.0), 1e-4));

        let notch = vec![
            Vector2::new(0.0, 0.0),
            Vector2::new(20.0, 0.0),
            Vector2::new(20.0, 40.0),
            Vector2::new(40.0, 40.0),
            Vector2::new(40.0, 60.0),
            Vector2::new(0.0, 60.0),
        ];
        assert!(!is_convex(&notch, 1e-4));
    }
}
