//! Boundary curves: construction from control points, uniform arc-length
//! regridding, normals, and optional geometry inspection.
//!
//! A [`Boundary`] is an ordered list of points, each carrying a unit
//! normal `(u1, u2)`. The normal is the tangent rotated by +90 degrees,
//! `u = (-t2, t1)`, with the tangent taken from neighbor differencing.
//!
//! Refinement does not detect self-intersections on its own. Callers that
//! care run [`Boundary::self_intersections`] or
//! [`Boundary::check_geometry`] on the result.

use geo::{Intersects, Line};
use rstar::RTree;
use rstar::primitives::GeomWithData;
use serde::{Deserialize, Serialize};

use crate::types::{PickError, Point, Polyline};

/// Points closer than this are considered coincident.
const COINCIDENT: f64 = 1e-9;

/// One boundary sample: position and unit normal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundaryPoint {
    /// Row coordinate.
    pub p1: f64,
    /// Column coordinate.
    pub p2: f64,
    /// Row component of the unit normal.
    pub u1: f64,
    /// Column component of the unit normal.
    pub u2: f64,
}

impl BoundaryPoint {
    /// Position as a [`Point`].
    #[must_use]
    pub const fn position(&self) -> Point {
        Point::new(self.p1, self.p2)
    }

    /// Unit tangent `(t1, t2)`, recovered from the normal.
    #[must_use]
    pub const fn tangent(&self) -> (f64, f64) {
        (self.u2, -self.u1)
    }
}

/// An open or closed curve with per-point unit normals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Boundary {
    points: Vec<BoundaryPoint>,
    closed: bool,
}

impl Boundary {
    /// Build a boundary from positions, computing normals.
    ///
    /// Positions are used as given; no resampling happens. A closed
    /// boundary must not repeat its first point at the end.
    ///
    /// # Errors
    ///
    /// Returns [`PickError::InvalidInput`] for non-finite coordinates and
    /// [`PickError::DegenerateGeometry`] for fewer than two points.
    pub fn from_points(positions: &[Point], closed: bool) -> Result<Self, PickError> {
        if positions
            .iter()
            .any(|p| !p.x1.is_finite() || !p.x2.is_finite())
        {
            return Err(PickError::InvalidInput(
                "boundary coordinates must be finite".to_string(),
            ));
        }
        if positions.len() < 2 {
            return Err(PickError::DegenerateGeometry(format!(
                "boundary needs at least two points, got {}",
                positions.len()
            )));
        }
        let mut boundary = Self {
            points: Vec::with_capacity(positions.len()),
            closed,
        };
        boundary.set_positions(positions);
        Ok(boundary)
    }

    /// The boundary samples.
    #[must_use]
    pub fn points(&self) -> &[BoundaryPoint] {
        &self.points
    }

    /// Number of samples.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.points.len()
    }

    /// Returns `true` if there are no samples.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Whether the last point connects back to the first.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.closed
    }

    /// Sample positions.
    #[must_use]
    pub fn positions(&self) -> Vec<Point> {
        self.points.iter().map(BoundaryPoint::position).collect()
    }

    /// The boundary as a polyline; closed boundaries repeat their first
    /// point at the end.
    #[must_use]
    pub fn to_polyline(&self) -> Polyline {
        let mut positions = self.positions();
        if self.closed
            && let Some(&first) = positions.first()
        {
            positions.push(first);
        }
        Polyline::new(positions)
    }

    /// Total arc length, including the closing segment when closed.
    #[must_use]
    pub fn arc_length(&self) -> f64 {
        self.to_polyline().length()
    }

    /// Arc length divided by the number of segments.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn mean_spacing(&self) -> f64 {
        let segments = if self.closed {
            self.points.len()
        } else {
            self.points.len().saturating_sub(1)
        };
        if segments == 0 {
            return 0.0;
        }
        self.arc_length() / segments as f64
    }

    /// Replace every position and recompute normals.
    ///
    /// `positions` must hold at least two finite points.
    pub(crate) fn set_positions(&mut self, positions: &[Point]) {
        let normals = compute_normals(positions, self.closed);
        self.points = positions
            .iter()
            .zip(normals)
            .map(|(p, (u1, u2))| BoundaryPoint {
                p1: p.x1,
                p2: p.x2,
                u1,
                u2,
            })
            .collect();
    }

    /// Discrete curvature per sample: turning angle (radians) divided by
    /// the mean length of the two adjacent segments.
    ///
    /// Endpoints of an open boundary report `0.0`.
    #[must_use]
    pub fn curvature(&self) -> Vec<f64> {
        let positions = self.positions();
        let n = positions.len();
        (0..n)
            .map(|i| {
                let Some((prev, next)) = neighbors(i, n, self.closed) else {
                    return 0.0;
                };
                let a = positions[prev];
                let b = positions[i];
                let c = positions[next];
                let (d1, d2) = (b.x1 - a.x1, b.x2 - a.x2);
                let (e1, e2) = (c.x1 - b.x1, c.x2 - b.x2);
                let cross = d1.mul_add(e2, -(d2 * e1));
                let dot = d1.mul_add(e1, d2 * e2);
                let mean_len = (a.distance(b) + b.distance(c)) / 2.0;
                if mean_len < COINCIDENT {
                    return 0.0;
                }
                cross.atan2(dot).abs() / mean_len
            })
            .collect()
    }

    /// Largest absolute discrete curvature, or `0.0` for a straight
    /// boundary.
    #[must_use]
    pub fn max_curvature(&self) -> f64 {
        self.curvature().into_iter().fold(0.0, f64::max)
    }

    /// Pairs of non-adjacent segments that cross or touch.
    ///
    /// Segment `i` runs from point `i` to point `i + 1` (wrapping to point
    /// 0 for the closing segment of a closed boundary). Pairs are reported
    /// as `(i, j)` with `i < j`, sorted.
    #[must_use]
    pub fn self_intersections(&self) -> Vec<(usize, usize)> {
        let positions = self.positions();
        let n = positions.len();
        let segment_count = if self.closed { n } else { n.saturating_sub(1) };
        let segments: Vec<IndexedSegment> = (0..segment_count)
            .map(|i| {
                let a = point_to_coord(positions[i]);
                let b = point_to_coord(positions[(i + 1) % n]);
                GeomWithData::new(Line::new(a, b), i)
            })
            .collect();

        let tree = RTree::bulk_load(segments);
        let mut pairs: Vec<(usize, usize)> = tree
            .intersection_candidates_with_other_tree(&tree)
            .filter_map(|(a, b)| {
                let (i, j) = (a.data.min(b.data), a.data.max(b.data));
                let adjacent = j == i + 1 || (self.closed && i == 0 && j + 1 == segment_count);
                if i == j || adjacent {
                    return None;
                }
                a.geom().intersects(b.geom()).then_some((i, j))
            })
            .collect();
        pairs.sort_unstable();
        pairs.dedup();
        pairs
    }

    /// Fail if the boundary crosses itself.
    ///
    /// # Errors
    ///
    /// Returns [`PickError::DegenerateGeometry`] naming the first pair of
    /// crossing segments.
    pub fn check_geometry(&self) -> Result<(), PickError> {
        match self.self_intersections().first() {
            None => Ok(()),
            Some(&(i, j)) => Err(PickError::DegenerateGeometry(format!(
                "segments {i} and {j} intersect"
            ))),
        }
    }
}

/// A boundary segment tagged with its index, for R*-tree insertion.
type IndexedSegment = GeomWithData<Line<f64>, usize>;

const fn point_to_coord(p: Point) -> geo::Coord<f64> {
    geo::Coord { x: p.x2, y: p.x1 }
}

/// Indices of the neighbors of point `i`, or `None` at an open endpoint.
const fn neighbors(i: usize, n: usize, closed: bool) -> Option<(usize, usize)> {
    if closed {
        Some(((i + n - 1) % n, (i + 1) % n))
    } else if i == 0 || i + 1 >= n {
        None
    } else {
        Some((i - 1, i + 1))
    }
}

/// Unit normals from neighbor differencing.
///
/// Interior points use the central difference, open endpoints the
/// one-sided one. Where the difference vanishes (a hairpin or repeated
/// point) the one-sided differences are tried, then the previous
/// normal is reused.
fn compute_normals(positions: &[Point], closed: bool) -> Vec<(f64, f64)> {
    let n = positions.len();
    let mut normals = Vec::with_capacity(n);
    let mut last = (1.0, 0.0);
    for i in 0..n {
        let (prev, next) = if closed {
            ((i + n - 1) % n, (i + 1) % n)
        } else {
            (i.saturating_sub(1), (i + 1).min(n - 1))
        };
        let candidates = [(prev, next), (i, next), (prev, i)];
        let tangent = candidates.iter().find_map(|&(a, b)| {
            let t1 = positions[b].x1 - positions[a].x1;
            let t2 = positions[b].x2 - positions[a].x2;
            let len = t1.hypot(t2);
            (len > COINCIDENT).then(|| (t1 / len, t2 / len))
        });
        if let Some((t1, t2)) = tangent {
            last = (-t2, t1);
        }
        normals.push(last);
    }
    normals
}

/// Build a boundary through control points, sampled every `step` units
/// of arc length.
///
/// The curve is piecewise-linear through `(p1[i], p2[i])`. If the first
/// and last control points coincide the boundary is closed.
///
/// # Errors
///
/// Returns [`PickError::InvalidInput`] if the arrays differ in length,
/// hold fewer than two points, or contain non-finite values;
/// [`PickError::InvalidConfig`] for a non-positive `step`; and
/// [`PickError::DegenerateGeometry`] if all control points coincide.
pub fn initial_boundary(step: f64, p1: &[f64], p2: &[f64]) -> Result<Boundary, PickError> {
    if p1.len() != p2.len() {
        return Err(PickError::InvalidInput(format!(
            "control point arrays differ in length: {} vs {}",
            p1.len(),
            p2.len()
        )));
    }
    if p1.len() < 2 {
        return Err(PickError::InvalidInput(format!(
            "need at least two control points, got {}",
            p1.len()
        )));
    }
    let points = p1
        .iter()
        .zip(p2)
        .map(|(&x1, &x2)| Point::new(x1, x2))
        .collect();
    regrid_boundary(step, &Polyline::new(points))
}

/// Resample a polyline to uniform arc-length spacing close to `step`.
///
/// The number of segments is `max(1, round(L / step))`, so the realized
/// spacing `L / count` is exactly uniform and within half a step of
/// `step`. Open polylines keep both endpoints; a polyline whose last
/// point repeats its first is treated as closed and resampled around the
/// loop starting at the first point.
///
/// # Errors
///
/// Returns [`PickError::InvalidConfig`] for a non-positive `step`,
/// [`PickError::InvalidInput`] for non-finite or too few points, and
/// [`PickError::DegenerateGeometry`] for zero total length.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn regrid_boundary(step: f64, polyline: &Polyline) -> Result<Boundary, PickError> {
    if !step.is_finite() || step <= 0.0 {
        return Err(PickError::InvalidConfig(format!(
            "regrid step must be positive, got {step}"
        )));
    }
    let points = polyline.points();
    if points.len() < 2 {
        return Err(PickError::InvalidInput(format!(
            "need at least two points to regrid, got {}",
            points.len()
        )));
    }
    if points.iter().any(|p| !p.x1.is_finite() || !p.x2.is_finite()) {
        return Err(PickError::InvalidInput(
            "polyline coordinates must be finite".to_string(),
        ));
    }

    let closed = points.len() > 2 && points[0].distance(points[points.len() - 1]) < COINCIDENT;

    // Cumulative arc length at each vertex of the (closed) polyline.
    let mut cumulative = Vec::with_capacity(points.len());
    cumulative.push(0.0);
    for w in points.windows(2) {
        let last = cumulative.last().copied().unwrap_or(0.0);
        cumulative.push(last + w[0].distance(w[1]));
    }
    let total = cumulative.last().copied().unwrap_or(0.0);
    if total < COINCIDENT {
        return Err(PickError::DegenerateGeometry(
            "boundary has zero length".to_string(),
        ));
    }

    let count = ((total / step).round() as usize).max(1);
    let spacing = total / count as f64;
    let sample_count = if closed { count } else { count + 1 };

    let mut resampled = Vec::with_capacity(sample_count);
    let mut seg = 0;
    for k in 0..sample_count {
        let s = k as f64 * spacing;
        while seg + 2 < cumulative.len() && cumulative[seg + 1] < s {
            seg += 1;
        }
        let seg_len = cumulative[seg + 1] - cumulative[seg];
        let t = if seg_len > 0.0 {
            ((s - cumulative[seg]) / seg_len).clamp(0.0, 1.0)
        } else {
            0.0
        };
        resampled.push(points[seg].lerp(points[seg + 1], t));
    }
    if !closed && let Some(end) = resampled.last_mut() {
        *end = points[points.len() - 1];
    }

    Boundary::from_points(&resampled, closed)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn straight(n: usize, spacing: f64) -> Polyline {
        #[allow(clippy::cast_precision_loss)]
        let points = (0..n)
            .map(|i| Point::new(10.0, i as f64 * spacing))
            .collect();
        Polyline::new(points)
    }

    fn square(side: f64) -> Polyline {
        Polyline::new(vec![
            Point::new(0.0, 0.0),
            Point::new(0.0, side),
            Point::new(side, side),
            Point::new(side, 0.0),
            Point::new(0.0, 0.0),
        ])
    }

    #[test]
    fn initial_boundary_spacing_is_uniform() {
        let b = initial_boundary(1.0, &[0.0, 0.0, 4.0], &[0.0, 3.0, 3.0]).unwrap();
        // Total length 3 + 4 = 7 → 7 segments, 8 points.
        assert_eq!(b.len(), 8);
        assert!(!b.is_closed());
        let positions = b.positions();
        for w in positions.windows(2) {
            assert!((w[0].distance(w[1]) - 1.0).abs() < 1e-9);
        }
        assert_eq!(positions[0], Point::new(0.0, 0.0));
        assert_eq!(positions[7], Point::new(4.0, 3.0));
    }

    #[test]
    fn initial_boundary_rejects_mismatched_arrays() {
        let result = initial_boundary(1.0, &[0.0, 1.0], &[0.0]);
        assert!(matches!(result, Err(PickError::InvalidInput(_))));
    }

    #[test]
    fn initial_boundary_rejects_coincident_points() {
        let result = initial_boundary(1.0, &[2.0, 2.0], &[3.0, 3.0]);
        assert!(matches!(result, Err(PickError::DegenerateGeometry(_))));
    }

    #[test]
    fn regrid_rejects_bad_step() {
        let result = regrid_boundary(0.0, &straight(3, 1.0));
        assert!(matches!(result, Err(PickError::InvalidConfig(_))));
    }

    #[test]
    fn regrid_round_trip_preserves_uniform_boundary() {
        let source = straight(12, 2.0);
        let b = regrid_boundary(2.0, &source).unwrap();
        assert!(b.len().abs_diff(source.len()) <= 1);
        for (got, want) in b.positions().iter().zip(source.points()) {
            assert!(got.distance(*want) < 1e-9, "{got:?} vs {want:?}");
        }
    }

    #[test]
    fn regrid_spacing_rounds_to_nearest_count() {
        // Length 10 with step 3 → round(3.33) = 3 segments of 10/3.
        let b = regrid_boundary(3.0, &straight(2, 10.0)).unwrap();
        assert_eq!(b.len(), 4);
        let positions = b.positions();
        assert!((positions[1].x2 - 10.0 / 3.0).abs() < 1e-9);
        assert_eq!(positions[3], Point::new(10.0, 10.0));
    }

    #[test]
    fn regrid_closed_square() {
        let b = regrid_boundary(1.0, &square(4.0)).unwrap();
        assert!(b.is_closed());
        // Perimeter 16 → 16 samples, first point kept, no duplicate end.
        assert_eq!(b.len(), 16);
        assert_eq!(b.positions()[0], Point::new(0.0, 0.0));
        assert!((b.arc_length() - 16.0).abs() < 1e-9);
        assert!((b.mean_spacing() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn normals_are_unit_and_perpendicular() {
        let b = regrid_boundary(0.5, &square(3.0)).unwrap();
        for p in b.points() {
            assert!((p.u1.hypot(p.u2) - 1.0).abs() < 1e-9);
        }
        // Straight horizontal run along +x2: tangent (0, 1), normal (-1, 0).
        let b = regrid_boundary(1.0, &straight(5, 1.0)).unwrap();
        for p in b.points() {
            assert!((p.u1 + 1.0).abs() < 1e-12);
            assert!(p.u2.abs() < 1e-12);
            let (t1, t2) = p.tangent();
            assert!(t1.abs() < 1e-12 && (t2 - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn hairpin_reuses_previous_normal() {
        let positions = [
            Point::new(0.0, 0.0),
            Point::new(0.0, 1.0),
            Point::new(0.0, 0.0),
        ];
        let b = Boundary::from_points(&positions, false).unwrap();
        // The middle central difference vanishes; a one-sided difference
        // still gives a unit normal.
        let mid = b.points()[1];
        assert!((mid.u1.hypot(mid.u2) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn from_points_requires_two_points() {
        let result = Boundary::from_points(&[Point::new(1.0, 1.0)], false);
        assert!(matches!(result, Err(PickError::DegenerateGeometry(_))));
    }

    #[test]
    fn straight_boundary_has_zero_curvature() {
        let b = regrid_boundary(1.0, &straight(6, 1.0)).unwrap();
        assert!(b.max_curvature() < 1e-12);
    }

    #[test]
    fn square_corners_have_curvature() {
        let b = Boundary::from_points(
            &[
                Point::new(0.0, 0.0),
                Point::new(0.0, 1.0),
                Point::new(1.0, 1.0),
                Point::new(1.0, 0.0),
            ],
            true,
        )
        .unwrap();
        let k = b.curvature();
        for v in k {
            assert!((v - std::f64::consts::FRAC_PI_2).abs() < 1e-9);
        }
    }

    #[test]
    fn simple_loop_has_no_self_intersections() {
        let b = regrid_boundary(1.0, &square(4.0)).unwrap();
        assert!(b.self_intersections().is_empty());
        b.check_geometry().unwrap();
    }

    #[test]
    fn figure_eight_is_detected() {
        // A bow-tie: segments 0 and 2 cross at the center.
        let b = Boundary::from_points(
            &[
                Point::new(0.0, 0.0),
                Point::new(2.0, 2.0),
                Point::new(2.0, 0.0),
                Point::new(0.0, 2.0),
            ],
            true,
        )
        .unwrap();
        assert_eq!(b.self_intersections(), vec![(0, 2)]);
        assert!(matches!(
            b.check_geometry(),
            Err(PickError::DegenerateGeometry(_))
        ));
    }
}
