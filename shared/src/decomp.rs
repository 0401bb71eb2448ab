//! Convex decomposition of simple polygons.
//!
//! The physics engine only collides convex shapes, so every block outline
//! is split into convex pieces before it becomes a body. Two strategies
//! are available:
//!
//! - [`decomp`] searches every diagonal from every reflex vertex for the
//!   cut set with the fewest edges. Exhaustive and O(n^4); only suitable
//!   for small outlines such as tetrominoes.
//! - [`quick_decomp`] splits at the first reflex vertex it finds, either
//!   towards the closest visible vertex or, when none is reachable, at a
//!   synthetic Steiner point, then recurses on both halves.
//!
//! Both expect a counter-clockwise loop without duplicate or collinear
//! points; run [`make_ccw`], [`remove_duplicate_points`] and
//! [`remove_collinear_points`] first.

use crate::geometry::{
    is_left, is_left_on, is_right, is_right_on, line_intersection, points_eq, polygon_at,
    scalar_eq, segments_intersect, sq_dist, Polygon, Vector2,
};
use thiserror::Error;

pub const DEFAULT_TOLERANCE: f32 = 1e-4;
pub const DEFAULT_MAX_LEVEL: usize = 100;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecompError {
    #[error("quick decomposition reached max level ({max_level})")]
    MaxLevelReached { max_level: usize },
    #[error("polygon needs at least 3 vertices, got {count}")]
    TooFewVertices { count: usize },
    #[error("decomposition left no usable pieces")]
    Degenerate,
}

#[derive(Debug, Clone, Copy)]
pub struct DecompOptions {
    /// Threshold for every turn test, parallel-line test and point equality.
    pub tolerance: f32,
    /// Recursion limit for [`quick_decomp`]. Hitting it is an error.
    pub max_level: usize,
}

impl Default for DecompOptions {
    fn default() -> Self {
        Self {
            tolerance: DEFAULT_TOLERANCE,
            max_level: DEFAULT_MAX_LEVEL,
        }
    }
}

/// Output of [`quick_decomp`].
#[derive(Debug, Clone, Default)]
pub struct QuickDecomp {
    pub pieces: Vec<Polygon>,
    /// Every reflex vertex the recursion split at.
    pub reflex_vertices: Vec<Vector2>,
    /// Synthetic vertices inserted where no original vertex was visible.
    pub steiner_points: Vec<Vector2>,
}

type Edge = (Vector2, Vector2);

/// Makes sure the vertices are ordered counter-clockwise. Returns true if
/// the polygon was reversed.
pub fn make_ccw(polygon: &mut Polygon, eps: f32) -> bool {
    if polygon.len() < 3 {
        return false;
    }

    // lowest, then rightmost
    let mut br = 0;
    for i in 1..polygon.len() {
        let (p, b) = (polygon[i], polygon[br]);
        if p.y < b.y - eps || (scalar_eq(p.y, b.y, eps) && p.x > b.x + eps) {
            br = i;
        }
    }

    let br = br as isize;
    if !is_left(
        polygon_at(polygon, br - 1),
        polygon_at(polygon, br),
        polygon_at(polygon, br + 1),
        eps,
    ) {
        polygon.reverse();
        return true;
    }
    false
}

pub fn is_reflex(polygon: &[Vector2], i: usize, eps: f32) -> bool {
    let i = i as isize;
    is_right(
        polygon_at(polygon, i - 1),
        polygon_at(polygon, i),
        polygon_at(polygon, i + 1),
        eps,
    )
}

/// Visibility between vertices `a` and `b`: `b` must lie inside the
/// interior cone at `a`, and no edge may cross the diagonal before it
/// reaches `b`.
fn can_see(polygon: &[Vector2], a: usize, b: usize, eps: f32) -> bool {
    let n = polygon.len();
    let at = |i: isize| polygon_at(polygon, i);
    let (ai, bi) = (a as isize, b as isize);

    if is_left_on(at(ai + 1), at(ai), at(bi), eps) && is_right_on(at(ai - 1), at(ai), at(bi), eps)
    {
        return false;
    }

    let dist = sq_dist(at(ai), at(bi));
    let dir = at(bi) - at(ai);
    for i in 0..n {
        let next = (i + 1) % n;
        // edges touching either endpoint can only meet the diagonal there
        if i == a || next == a || i == b || next == b {
            continue;
        }
        let ii = i as isize;
        if is_left_on(at(ai), at(bi), at(ii + 1), eps) && is_right_on(at(ai), at(bi), at(ii), eps)
        {
            let Some(p) = line_intersection((at(ai), at(bi)), (at(ii), at(ii + 1)), eps) else {
                continue;
            };
            let ahead = (p - at(ai)).dot(dir) > 0.0;
            if ahead && sq_dist(at(ai), p) < dist {
                return false;
            }
        }
    }

    true
}

/// Plain visibility: the segment `a b` crosses no edge that is not
/// incident to `a` or `b`.
fn can_see_unobstructed(polygon: &[Vector2], a: usize, b: usize, eps: f32) -> bool {
    let n = polygon.len();
    for i in 0..n {
        let next = (i + 1) % n;
        if i == a || i == b || next == a || next == b {
            continue;
        }
        if segments_intersect(polygon[a], polygon[b], polygon[i], polygon[next], eps) {
            return false;
        }
    }
    true
}

/// Copy of the loop from vertex `i` to vertex `j`, both inclusive.
fn copy_span(polygon: &[Vector2], i: usize, j: usize) -> Polygon {
    if i < j {
        polygon[i..=j].to_vec()
    } else {
        let mut p = polygon[..=j].to_vec();
        p.extend_from_slice(&polygon[i..]);
        p
    }
}

/// Appends `polygon[from..to]`; an empty or inverted range appends nothing.
fn append(target: &mut Polygon, polygon: &[Vector2], from: usize, to: usize) {
    if from < to {
        target.extend_from_slice(&polygon[from..to]);
    }
}

/// Finds the smallest set of diagonals that cuts the polygon into convex
/// pieces.
pub fn get_cut_edges(polygon: &[Vector2], eps: f32) -> Vec<Edge> {
    let n = polygon.len();
    let mut min: Vec<Edge> = Vec::new();
    let mut n_diags = usize::MAX;

    for i in 0..n {
        if !is_reflex(polygon, i, eps) {
            continue;
        }
        for j in 0..n {
            if !can_see(polygon, i, j, eps) {
                continue;
            }
            let mut cuts = get_cut_edges(&copy_span(polygon, i, j), eps);
            cuts.extend(get_cut_edges(&copy_span(polygon, j, i), eps));
            if cuts.len() < n_diags {
                n_diags = cuts.len();
                min = cuts;
                min.push((polygon[i], polygon[j]));
            }
        }
    }

    min
}

/// Splits the polygon along a single diagonal. `None` if either endpoint
/// is missing or the two are neighbours.
fn slice_once(polygon: &[Vector2], cut: Edge, eps: f32) -> Option<(Polygon, Polygon)> {
    let n = polygon.len();
    let i = polygon.iter().position(|p| points_eq(*p, cut.0, eps))?;
    let j = polygon.iter().position(|p| points_eq(*p, cut.1, eps))?;
    if i == j || (i + 1) % n == j || (j + 1) % n == i {
        return None;
    }
    Some((copy_span(polygon, i, j), copy_span(polygon, j, i)))
}

/// Cuts the polygon along every edge in `cut_edges`.
pub fn slice(polygon: &[Vector2], cut_edges: &[Edge], eps: f32) -> Vec<Polygon> {
    let mut polys = vec![polygon.to_vec()];
    for &cut in cut_edges {
        for k in 0..polys.len() {
            if let Some((first, second)) = slice_once(&polys[k], cut, eps) {
                polys.remove(k);
                polys.push(first);
                polys.push(second);
                break;
            }
        }
    }
    polys
}

/// Exact decomposition into the fewest convex pieces.
pub fn decomp(polygon: &[Vector2], eps: f32) -> Vec<Polygon> {
    let edges = get_cut_edges(polygon, eps);
    if edges.is_empty() {
        return vec![polygon.to_vec()];
    }
    slice(polygon, &edges, eps)
}

/// Checks that no two non-adjacent edges of the loop intersect.
pub fn is_simple(path: &[Vector2], eps: f32) -> bool {
    let n = path.len();
    if n < 4 {
        return true;
    }
    for i in 0..n - 1 {
        for j in 0..i.saturating_sub(1) {
            if segments_intersect(path[i], path[i + 1], path[j], path[j + 1], eps) {
                return false;
            }
        }
    }
    // closing edge against everything it does not touch
    for i in 1..n - 2 {
        if segments_intersect(path[0], path[n - 1], path[i], path[i + 1], eps) {
            return false;
        }
    }
    true
}

/// Fast decomposition into convex pieces.
pub fn quick_decomp(polygon: &[Vector2], options: DecompOptions) -> Result<QuickDecomp, DecompError> {
    if polygon.len() < 3 {
        return Err(DecompError::TooFewVertices {
            count: polygon.len(),
        });
    }
    let mut out = QuickDecomp::default();
    quick_decomp_level(polygon, &mut out, options, 0)?;
    Ok(out)
}

fn quick_decomp_level(
    poly: &[Vector2],
    out: &mut QuickDecomp,
    options: DecompOptions,
    level: usize,
) -> Result<(), DecompError> {
    let n = poly.len();
    if n < 3 {
        return Ok(());
    }

    let level = level + 1;
    if level > options.max_level {
        return Err(DecompError::MaxLevelReached {
            max_level: options.max_level,
        });
    }

    let eps = options.tolerance;
    let at = |i: isize| polygon_at(poly, i);

    for i in 0..n {
        if !is_reflex(poly, i, eps) {
            continue;
        }
        out.reflex_vertices.push(poly[i]);

        let ii = i as isize;
        let mut lower_dist = f32::MAX;
        let mut upper_dist = f32::MAX;
        let mut lower_int = Vector2::ZERO;
        let mut upper_int = Vector2::ZERO;
        let mut lower_index = 0;
        let mut upper_index = 0;

        // cast both edges adjacent to the reflex vertex and keep the
        // nearest hit on each side
        for j in 0..n {
            let jj = j as isize;
            if is_left(at(ii - 1), at(ii), at(jj), eps)
                && is_right_on(at(ii - 1), at(ii), at(jj - 1), eps)
            {
                if let Some(p) = line_intersection((at(ii - 1), at(ii)), (at(jj), at(jj - 1)), eps) {
                    if is_right(at(ii + 1), at(ii), p, eps) {
                        let d = sq_dist(poly[i], p);
                        if d < lower_dist {
                            lower_dist = d;
                            lower_int = p;
                            lower_index = j;
                        }
                    }
                }
            }
            if is_left(at(ii + 1), at(ii), at(jj + 1), eps)
                && is_right_on(at(ii + 1), at(ii), at(jj), eps)
            {
                if let Some(p) = line_intersection((at(ii + 1), at(ii)), (at(jj), at(jj + 1)), eps) {
                    if is_left(at(ii - 1), at(ii), p, eps) {
                        let d = sq_dist(poly[i], p);
                        if d < upper_dist {
                            upper_dist = d;
                            upper_int = p;
                            upper_index = j;
                        }
                    }
                }
            }
        }

        let mut lower_poly = Polygon::new();
        let mut upper_poly = Polygon::new();

        if lower_index == (upper_index + 1) % n {
            // both rays hit the same edge: split at its midpoint
            let p = (lower_int + upper_int) * 0.5;
            out.steiner_points.push(p);

            if i < upper_index {
                append(&mut lower_poly, poly, i, upper_index + 1);
                lower_poly.push(p);
                upper_poly.push(p);
                if lower_index != 0 {
                    append(&mut upper_poly, poly, lower_index, n);
                }
                append(&mut upper_poly, poly, 0, i + 1);
            } else {
                if i != 0 {
                    append(&mut lower_poly, poly, i, n);
                }
                append(&mut lower_poly, poly, 0, upper_index + 1);
                lower_poly.push(p);
                upper_poly.push(p);
                append(&mut upper_poly, poly, lower_index, i + 1);
            }
        } else {
            // connect to the closest visible vertex between the two hits
            let upper_index = if lower_index > upper_index {
                upper_index + n
            } else {
                upper_index
            };
            let mut closest_dist = f32::MAX;
            let mut closest_index = 0;

            for j in lower_index..=upper_index {
                let jj = j as isize;
                if is_left_on(at(ii - 1), at(ii), at(jj), eps)
                    && is_right_on(at(ii + 1), at(ii), at(jj), eps)
                {
                    let d = sq_dist(at(ii), at(jj));
                    if d < closest_dist && can_see_unobstructed(poly, i, j % n, eps) {
                        closest_dist = d;
                        closest_index = j % n;
                    }
                }
            }

            if i < closest_index {
                append(&mut lower_poly, poly, i, closest_index + 1);
                if closest_index != 0 {
                    append(&mut upper_poly, poly, closest_index, n);
                }
                append(&mut upper_poly, poly, 0, i + 1);
            } else {
                if i != 0 {
                    append(&mut lower_poly, poly, i, n);
                }
                append(&mut lower_poly, poly, 0, closest_index + 1);
                append(&mut upper_poly, poly, closest_index, i + 1);
            }
        }

        // smaller piece first
        if lower_poly.len() < upper_poly.len() {
            quick_decomp_level(&lower_poly, out, options, level)?;
            quick_decomp_level(&upper_poly, out, options, level)?;
        } else {
            quick_decomp_level(&upper_poly, out, options, level)?;
            quick_decomp_level(&lower_poly, out, options, level)?;
        }
        return Ok(());
    }

    out.pieces.push(poly.to_vec());
    Ok(())
}

/// Removes points whose adjacent edges bend by less than `precision`
/// radians. Never shrinks the loop below a triangle. Returns the number of
/// points removed.
pub fn remove_collinear_points(polygon: &mut Polygon, precision: f32) -> usize {
    let mut removed = 0;
    let mut i = polygon.len() as isize - 1;
    while polygon.len() > 3 && i >= 0 {
        if crate::geometry::collinear(
            polygon_at(polygon, i - 1),
            polygon_at(polygon, i),
            polygon_at(polygon, i + 1),
            precision,
        ) {
            let idx = i as usize % polygon.len();
            polygon.remove(idx);
            removed += 1;
        }
        i -= 1;
    }
    removed
}

/// Removes every point that equals an earlier point within `precision`.
/// Returns the number of points removed.
pub fn remove_duplicate_points(polygon: &mut Polygon, precision: f32) -> usize {
    let mut removed = 0;
    for i in (1..polygon.len()).rev() {
        let p = polygon[i];
        if polygon[..i].iter().any(|q| points_eq(p, *q, precision)) {
            polygon.remove(i);
            removed += 1;
        }
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{is_convex, polygon_area};
    use crate::shapes::ShapeType;
    use assert_approx_eq::assert_approx_eq;

    const EPS: f32 = DEFAULT_TOLERANCE;

    fn poly(points: &[(f32, f32)]) -> Polygon {
        points.iter().map(|&(x, y)| Vector2::new(x, y)).collect()
    }

    fn l_shape() -> Polygon {
        poly(&[
            (0.0, 0.0),
            (20.0, 0.0),
            (20.0, 40.0),
            (40.0, 40.0),
            (40.0, 60.0),
            (0.0, 60.0),
        ])
    }

    fn total_area(pieces: &[Polygon]) -> f32 {
        pieces.iter().map(|p| polygon_area(p).abs()).sum()
    }

    #[test]
    fn test_make_ccw_reverses_clockwise() {
        let mut square = poly(&[(0.0, 0.0), (0.0, 10.0), (10.0, 10.0), (10.0, 0.0)]);
        assert!(polygon_area(&square) < 0.0);
        assert!(make_ccw(&mut square, EPS));
        assert!(polygon_area(&square) > 0.0);

        assert!(!make_ccw(&mut square, EPS));
    }

    #[test]
    fn test_is_reflex() {
        let l = l_shape();
        let reflex: Vec<usize> = (0..l.len()).filter(|&i| is_reflex(&l, i, EPS)).collect();
        assert_eq!(reflex, vec![2]);
    }

    #[test]
    fn test_convex_polygon_unchanged() {
        let square = poly(&[(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 10.0)]);

        let quick = quick_decomp(&square, DecompOptions::default()).unwrap();
        assert_eq!(quick.pieces.len(), 1);
        assert_eq!(quick.pieces[0].len(), 4);
        for (a, b) in quick.pieces[0].iter().zip(square.iter()) {
            assert!(points_eq(*a, *b, EPS));
        }
        assert!(quick.steiner_points.is_empty());

        let exact = decomp(&square, EPS);
        assert_eq!(exact.len(), 1);
        assert_eq!(exact[0].len(), 4);
    }

    #[test]
    fn test_quick_decomp_l_shape() {
        let l = l_shape();
        let result = quick_decomp(&l, DecompOptions::default()).unwrap();

        assert_eq!(result.pieces.len(), 2);
        assert_eq!(result.reflex_vertices.len(), 1);
        assert_approx_eq!(total_area(&result.pieces), 1600.0, 1e-2);
        for piece in &result.pieces {
            assert!(is_convex(piece, EPS));
            assert!(polygon_area(piece) > 0.0);
        }
    }

    #[test]
    fn test_quick_decomp_inserts_steiner_point() {
        // both rays from the first notch land on the bottom edge
        let mut notched = poly(&[
            (0.0, 0.0),
            (20.0, 0.0),
            (20.0, 10.0),
            (15.0, 5.0),
            (10.0, 10.0),
            (5.0, 5.0),
            (0.0, 10.0),
        ]);
        assert!(!make_ccw(&mut notched, EPS));

        let result = quick_decomp(&notched, DecompOptions::default()).unwrap();
        assert_eq!(result.steiner_points.len(), 1);
        let steiner = result.steiner_points[0];
        assert_approx_eq!(steiner.y, 0.0, 1e-3);
        assert!(steiner.x > 0.0 && steiner.x < 20.0);

        assert_eq!(result.pieces.len(), 3);
        assert_approx_eq!(total_area(&result.pieces), polygon_area(&notched), 1e-2);
        for piece in &result.pieces {
            assert!(is_convex(piece, EPS));
            assert!(polygon_area(piece) > 0.0);
        }
    }

    #[test]
    fn test_exact_decomp_t_uses_single_cut() {
        let mut t = ShapeType::T.outline();
        make_ccw(&mut t, EPS);

        let cuts = get_cut_edges(&t, EPS);
        assert_eq!(cuts.len(), 1);

        let pieces = decomp(&t, EPS);
        assert_eq!(pieces.len(), 2);
        assert_approx_eq!(total_area(&pieces), polygon_area(&t), 1e-2);
    }

    #[test]
    fn test_every_shape_decomposes_into_convex_pieces() {
        for shape in ShapeType::ALL {
            let mut outline = shape.outline();
            make_ccw(&mut outline, EPS);
            let area = polygon_area(&outline);

            let quick = quick_decomp(&outline, DecompOptions::default()).unwrap();
            assert_approx_eq!(total_area(&quick.pieces), area, 1e-2);
            for piece in &quick.pieces {
                assert!(is_convex(piece, EPS), "{shape:?} quick piece not convex");
                assert!(polygon_area(piece) > 0.0, "{shape:?} quick piece not ccw");
            }

            let exact = decomp(&outline, EPS);
            assert_approx_eq!(total_area(&exact), area, 1e-2);
            for piece in &exact {
                assert!(is_convex(piece, EPS), "{shape:?} exact piece not convex");
                assert!(polygon_area(piece) > 0.0, "{shape:?} exact piece not ccw");
            }
        }
    }

    #[test]
    fn test_max_level_is_an_error() {
        let l = l_shape();
        let options = DecompOptions {
            max_level: 1,
            ..DecompOptions::default()
        };
        let err = quick_decomp(&l, options).unwrap_err();
        assert_eq!(err, DecompError::MaxLevelReached { max_level: 1 });
    }

    #[test]
    fn test_too_few_vertices() {
        let line = poly(&[(0.0, 0.0), (1.0, 1.0)]);
        assert_eq!(
            quick_decomp(&line, DecompOptions::default()).unwrap_err(),
            DecompError::TooFewVertices { count: 2 }
        );
    }

    #[test]
    fn test_remove_collinear_points() {
        let mut square = poly(&[
            (0.0, 0.0),
            (5.0, 0.0),
            (10.0, 0.0),
            (10.0, 10.0),
            (0.0, 10.0),
        ]);
        assert_eq!(remove_collinear_points(&mut square, 0.01), 1);
        assert_eq!(square.len(), 4);

        let mut triangle = poly(&[(0.0, 0.0), (10.0, 0.0), (0.0, 10.0)]);
        assert_eq!(remove_collinear_points(&mut triangle, 0.01), 0);
    }

    #[test]
    fn test_remove_duplicate_points() {
        let mut square = poly(&[
            (0.0, 0.0),
            (10.0, 0.0),
            (10.005, 0.0),
            (10.0, 10.0),
            (0.0, 10.0),
        ]);
        assert_eq!(remove_duplicate_points(&mut square, 0.01), 1);
        assert_eq!(square.len(), 4);
    }

    #[test]
    fn test_is_simple() {
        assert!(is_simple(&l_shape(), EPS));

        let bowtie = poly(&[(0.0, 0.0), (10.0, 10.0), (10.0, 0.0), (0.0, 10.0)]);
        assert!(!is_simple(&bowtie, EPS));
    }
}
