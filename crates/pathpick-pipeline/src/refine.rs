//! Snake-style boundary refinement and straightened band sampling.
//!
//! Each iteration samples the attribute along every boundary point's
//! normal, finds the sub-pixel maximum of that profile, and moves the
//! point part of the way toward it. Every `regrid_interval` iterations
//! the boundary is regridded at its starting mean spacing so points do
//! not bunch up where the attribute pulls them together.
//!
//! Once the boundary settles, [`Band`] sampling straightens the strip
//! around it: row `k` of the band holds the attribute at offset
//! `(k - search_radius) * stride` along each normal, column `j` is
//! boundary point `j`. Tracking the boundary then reduces to picking one
//! offset per column.
//!
//! All sampling is bilinear and clamped at the image edges.

use serde::{Deserialize, Serialize};

use crate::boundary::{Boundary, regrid_boundary};
use crate::image::Image2D;
use crate::types::{Path, PickError, Point, Polyline};

/// Refinement and band-sampling parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RefineOptions {
    /// How far (in samples) to search along each normal, and the band's
    /// half-width in stride units. The band has `2 * search_radius + 1`
    /// rows.
    pub search_radius: usize,
    /// Spacing between band rows along the normal, in samples.
    pub band_stride: f64,
    /// Number of refinement passes; `0` samples the band around the
    /// boundary as given.
    pub iterations: usize,
    /// Fraction of the distance to the profile maximum moved per pass.
    pub step_size: f64,
    /// Regrid after every this many passes.
    pub regrid_interval: usize,
}

impl RefineOptions {
    /// Default search radius in samples.
    pub const DEFAULT_SEARCH_RADIUS: usize = 10;
    /// Default band stride in samples.
    pub const DEFAULT_BAND_STRIDE: f64 = 1.0;
    /// Default number of refinement passes.
    pub const DEFAULT_ITERATIONS: usize = 10;
    /// Default fraction of the way moved per pass.
    pub const DEFAULT_STEP_SIZE: f64 = 0.5;
    /// Default number of passes between regrids.
    pub const DEFAULT_REGRID_INTERVAL: usize = 5;

    /// Check every parameter against its domain.
    ///
    /// # Errors
    ///
    /// Returns [`PickError::InvalidConfig`] for a non-positive stride, a
    /// step size outside `(0, 1]`, or a zero regrid interval.
    pub fn validate(&self) -> Result<(), PickError> {
        if !self.band_stride.is_finite() || self.band_stride <= 0.0 {
            return Err(PickError::InvalidConfig(format!(
                "band stride must be positive, got {}",
                self.band_stride
            )));
        }
        if !(self.step_size > 0.0 && self.step_size <= 1.0) {
            return Err(PickError::InvalidConfig(format!(
                "step size must be in (0, 1], got {}",
                self.step_size
            )));
        }
        if self.regrid_interval == 0 {
            return Err(PickError::InvalidConfig(
                "regrid interval must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for RefineOptions {
    fn default() -> Self {
        Self {
            search_radius: Self::DEFAULT_SEARCH_RADIUS,
            band_stride: Self::DEFAULT_BAND_STRIDE,
            iterations: Self::DEFAULT_ITERATIONS,
            step_size: Self::DEFAULT_STEP_SIZE,
            regrid_interval: Self::DEFAULT_REGRID_INTERVAL,
        }
    }
}

/// A straightened strip sampled along a boundary's normals.
///
/// Shape is `(2 * search_radius + 1, boundary.len())`: rows are lateral
/// offsets, columns are arc-length positions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Band {
    image: Image2D,
    search_radius: usize,
    stride: f64,
}

impl Band {
    /// Sample the band around `boundary`.
    ///
    /// # Errors
    ///
    /// Returns [`PickError::InvalidConfig`] for a non-positive stride.
    #[allow(clippy::cast_precision_loss)]
    pub fn sample(
        attribute: &Image2D,
        boundary: &Boundary,
        search_radius: usize,
        stride: f64,
    ) -> Result<Self, PickError> {
        if !stride.is_finite() || stride <= 0.0 {
            return Err(PickError::InvalidConfig(format!(
                "band stride must be positive, got {stride}"
            )));
        }
        let rows = 2 * search_radius + 1;
        let points = boundary.points();
        let image = Image2D::from_fn(rows, points.len(), |k, j| {
            let p = points[j];
            let offset = (k as f64 - search_radius as f64) * stride;
            attribute.sample_clamped(
                p.u1.mul_add(offset, p.p1),
                p.u2.mul_add(offset, p.p2),
            )
        })?;
        Ok(Self {
            image,
            search_radius,
            stride,
        })
    }

    /// The band samples.
    #[must_use]
    pub const fn image(&self) -> &Image2D {
        &self.image
    }

    /// Number of rows: `2 * search_radius + 1`.
    #[must_use]
    pub const fn width(&self) -> usize {
        self.image.n1()
    }

    /// Number of columns: one per boundary point.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.image.n2()
    }

    /// Always `false`; a band has at least one column.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.image.n2() == 0
    }

    /// Half-width in rows; the row holding the boundary itself.
    #[must_use]
    pub const fn search_radius(&self) -> usize {
        self.search_radius
    }

    /// Spacing between rows along the normal.
    #[must_use]
    pub const fn stride(&self) -> f64 {
        self.stride
    }

    /// Map a pick over the band back into image coordinates.
    ///
    /// `path` is indexed by boundary point and holds a band row per
    /// point, i.e. it was picked on the transposed band.
    ///
    /// # Errors
    ///
    /// Returns [`PickError::InvalidInput`] if the path length differs
    /// from the boundary length or a row index exceeds the band width.
    #[allow(clippy::cast_precision_loss)]
    pub fn to_image_points(&self, path: &Path, boundary: &Boundary) -> Result<Polyline, PickError> {
        if path.len() != boundary.len() {
            return Err(PickError::InvalidInput(format!(
                "path covers {} boundary points, boundary has {}",
                path.len(),
                boundary.len()
            )));
        }
        path.columns()
            .iter()
            .zip(boundary.points())
            .map(|(&row, p)| {
                if row >= self.width() {
                    return Err(PickError::InvalidInput(format!(
                        "band row {row} outside width {}",
                        self.width()
                    )));
                }
                let offset = (row as f64 - self.search_radius as f64) * self.stride;
                Ok(p.position().offset(p.u1, p.u2, offset))
            })
            .collect::<Result<Vec<Point>, PickError>>()
            .map(Polyline::new)
    }
}

/// Movement statistics from one refinement run.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RefineStats {
    /// Passes performed.
    pub iterations: usize,
    /// Regrids performed.
    pub regrids: usize,
    /// Mean per-point displacement over all passes, in samples.
    pub mean_displacement: f64,
    /// Largest single-point displacement in any pass, in samples.
    pub max_displacement: f64,
}

/// Refine `boundary` in place against `attribute`, then sample the band.
///
/// The attribute's high values mark the structure the boundary should
/// lock onto.
///
/// # Errors
///
/// Returns [`PickError::InvalidConfig`] for invalid options,
/// [`PickError::InvalidInput`] for a non-finite attribute, and
/// [`PickError::DegenerateGeometry`] if a regrid collapses the boundary.
pub fn refine(
    options: &RefineOptions,
    boundary: &mut Boundary,
    attribute: &Image2D,
) -> Result<Band, PickError> {
    refine_with_stats(options, boundary, attribute).map(|(band, _)| band)
}

/// [`refine`], also returning movement statistics.
///
/// # Errors
///
/// Same as [`refine`].
#[allow(clippy::cast_precision_loss)]
pub fn refine_with_stats(
    options: &RefineOptions,
    boundary: &mut Boundary,
    attribute: &Image2D,
) -> Result<(Band, RefineStats), PickError> {
    options.validate()?;
    attribute.ensure_finite()?;

    let spacing = boundary.mean_spacing();
    let mut stats = RefineStats::default();
    let mut total_displacement = 0.0;
    let mut moves = 0_usize;

    for iteration in 0..options.iterations {
        // Each point's move depends only on the previous pass.
        let moved: Vec<Point> = boundary
            .points()
            .iter()
            .map(|p| {
                let offset = profile_peak(attribute, p.position(), p.u1, p.u2, options.search_radius);
                let displacement = offset * options.step_size;
                total_displacement += displacement.abs();
                stats.max_displacement = stats.max_displacement.max(displacement.abs());
                p.position().offset(p.u1, p.u2, displacement)
            })
            .collect();
        moves += moved.len();
        boundary.set_positions(&moved);

        if (iteration + 1) % options.regrid_interval == 0 {
            *boundary = regrid_boundary(spacing, &boundary.to_polyline())?;
            stats.regrids += 1;
        }
        stats.iterations += 1;
        tracing::trace!(
            iteration,
            points = boundary.len(),
            max_displacement = stats.max_displacement,
            "refinement pass"
        );
    }

    if moves > 0 {
        stats.mean_displacement = total_displacement / moves as f64;
    }

    let band = Band::sample(attribute, boundary, options.search_radius, options.band_stride)?;
    Ok((band, stats))
}

/// Signed offset along `(u1, u2)` of the attribute maximum within
/// `radius` samples of `center`.
///
/// The discrete maximum (nearest to the center on ties) is refined by a
/// three-point parabola when it is an interior peak.
#[allow(clippy::cast_precision_loss, clippy::cast_possible_wrap)]
fn profile_peak(attribute: &Image2D, center: Point, u1: f64, u2: f64, radius: usize) -> f64 {
    if radius == 0 {
        return 0.0;
    }
    let r = radius as isize;
    let profile: Vec<f32> = (-r..=r)
        .map(|k| {
            let p = center.offset(u1, u2, k as f64);
            attribute.sample_clamped(p.x1, p.x2)
        })
        .collect();

    // Visit offsets 0, -1, +1, -2, +2, ... so ties go to the center.
    let mut best = radius;
    for d in 1..=radius {
        for idx in [radius - d, radius + d] {
            if profile[idx] > profile[best] {
                best = idx;
            }
        }
    }

    let mut offset = best as f64 - radius as f64;
    if best > 0 && best + 1 < profile.len() {
        let y0 = f64::from(profile[best - 1]);
        let y1 = f64::from(profile[best]);
        let y2 = f64::from(profile[best + 1]);
        let denom = y0 - 2.0 * y1 + y2;
        if denom < 0.0 {
            offset += (0.5 * (y0 - y2) / denom).clamp(-0.5, 0.5);
        }
    }
    offset
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::boundary::initial_boundary;

    /// A horizontal bright line at row `row` on an otherwise dark image.
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
    fn ridge(n1: usize, n2: usize, row: f64) -> Image2D {
        Image2D::from_fn(n1, n2, |i1, _| {
            let d = i1 as f64 - row;
            (-d * d / 2.0).exp() as f32
        })
        .unwrap()
    }

    fn options(iterations: usize) -> RefineOptions {
        RefineOptions {
            search_radius: 6,
            band_stride: 1.0,
            iterations,
            step_size: 0.5,
            regrid_interval: 2,
        }
    }

    #[test]
    fn validate_rejects_bad_step_size() {
        let opts = RefineOptions {
            step_size: 2.0,
            ..RefineOptions::default()
        };
        assert!(matches!(opts.validate(), Err(PickError::InvalidConfig(_))));
        let opts = RefineOptions {
            step_size: 0.0,
            ..RefineOptions::default()
        };
        assert!(matches!(opts.validate(), Err(PickError::InvalidConfig(_))));
    }

    #[test]
    fn validate_rejects_zero_regrid_interval() {
        let opts = RefineOptions {
            regrid_interval: 0,
            ..RefineOptions::default()
        };
        assert!(matches!(opts.validate(), Err(PickError::InvalidConfig(_))));
    }

    #[test]
    fn band_shape_matches_radius_and_boundary() {
        let attr = ridge(30, 30, 15.0);
        let mut boundary = initial_boundary(1.0, &[12.0, 12.0], &[5.0, 25.0]).unwrap();
        let band = refine(&options(0), &mut boundary, &attr).unwrap();
        assert_eq!(band.width(), 13);
        assert_eq!(band.len(), boundary.len());
        assert_eq!(band.search_radius(), 6);
    }

    #[test]
    fn profile_peak_finds_subpixel_maximum() {
        let attr = ridge(40, 10, 20.3);
        // Normal along +x1 from row 17: peak is 3.3 rows away.
        let offset = profile_peak(&attr, Point::new(17.0, 5.0), 1.0, 0.0, 6);
        assert!((offset - 3.3).abs() < 0.15, "got {offset}");
    }

    #[test]
    fn profile_peak_flat_stays_put() {
        let attr = Image2D::filled(10, 10, 1.0).unwrap();
        let offset = profile_peak(&attr, Point::new(5.0, 5.0), 1.0, 0.0, 3);
        assert!(offset.abs() < f64::EPSILON);
    }

    #[test]
    fn refinement_converges_to_ridge() {
        let attr = ridge(40, 40, 20.0);
        // Start three rows above the ridge, horizontal (normal along -x1).
        let mut boundary = initial_boundary(1.0, &[17.0, 17.0], &[5.0, 35.0]).unwrap();
        let (_, stats) = refine_with_stats(&options(12), &mut boundary, &attr).unwrap();
        assert_eq!(stats.iterations, 12);
        assert_eq!(stats.regrids, 6);
        assert!(stats.mean_displacement > 0.0);
        for p in boundary.points() {
            assert!((p.p1 - 20.0).abs() < 0.1, "point stayed at row {}", p.p1);
        }
    }

    #[test]
    fn regridding_keeps_spacing_uniform() {
        let attr = ridge(40, 40, 20.0);
        let mut boundary = initial_boundary(1.0, &[17.0, 23.0], &[5.0, 35.0]).unwrap();
        refine(&options(4), &mut boundary, &attr).unwrap();
        let positions = boundary.positions();
        let first = positions[0].distance(positions[1]);
        for w in positions.windows(2) {
            assert!((w[0].distance(w[1]) - first).abs() < 1e-6);
        }
    }

    #[test]
    fn band_to_image_points_round_trip() {
        let attr = ridge(30, 30, 15.0);
        let mut boundary = initial_boundary(2.0, &[10.0, 10.0], &[4.0, 24.0]).unwrap();
        let band = refine(&options(0), &mut boundary, &attr).unwrap();
        // Row search_radius is the boundary itself.
        let center = Path::new(vec![band.search_radius(); boundary.len()]);
        let picked = band.to_image_points(&center, &boundary).unwrap();
        for (got, want) in picked.points().iter().zip(boundary.positions()) {
            assert!(got.distance(want) < 1e-12);
        }
        // Row 0 lies search_radius * stride along the negative normal.
        let edge = Path::new(vec![0; boundary.len()]);
        let picked = band.to_image_points(&edge, &boundary).unwrap();
        let p = boundary.points()[0];
        assert!((picked.points()[0].x1 - (p.p1 - 6.0 * p.u1)).abs() < 1e-12);
    }

    #[test]
    fn band_to_image_points_rejects_bad_path() {
        let attr = ridge(30, 30, 15.0);
        let mut boundary = initial_boundary(2.0, &[10.0, 10.0], &[4.0, 24.0]).unwrap();
        let band = refine(&options(0), &mut boundary, &attr).unwrap();
        let short = Path::new(vec![0; 2]);
        assert!(band.to_image_points(&short, &boundary).is_err());
        let wide = Path::new(vec![band.width(); boundary.len()]);
        assert!(band.to_image_points(&wide, &boundary).is_err());
    }
}
