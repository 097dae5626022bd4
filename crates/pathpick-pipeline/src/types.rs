//! Shared types for the pathpick picking pipeline.

use serde::{Deserialize, Serialize};

use crate::boundary::Boundary;
use crate::image::{CostField, Image2D, TravelTimeField};
use crate::picker::Seed;
use crate::refine::{Band, RefineOptions};
use crate::transform::CostMode;

/// A 2D point in image sample coordinates.
///
/// `x1` runs down the rows (depth/time), `x2` across the columns
/// (lateral position). Both are fractional sample indices.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// Row coordinate.
    pub x1: f64,
    /// Column coordinate.
    pub x2: f64,
}

impl Point {
    /// Create a new point.
    #[must_use]
    pub const fn new(x1: f64, x2: f64) -> Self {
        Self { x1, x2 }
    }

    /// Squared Euclidean distance to another point.
    #[must_use]
    pub fn distance_squared(self, other: Self) -> f64 {
        let d1 = self.x1 - other.x1;
        let d2 = self.x2 - other.x2;
        d1.mul_add(d1, d2 * d2)
    }

    /// Euclidean distance to another point.
    #[must_use]
    pub fn distance(self, other: Self) -> f64 {
        self.distance_squared(other).sqrt()
    }

    /// Linear interpolation: `self` at `t = 0`, `other` at `t = 1`.
    #[must_use]
    pub fn lerp(self, other: Self, t: f64) -> Self {
        Self::new(
            (other.x1 - self.x1).mul_add(t, self.x1),
            (other.x2 - self.x2).mul_add(t, self.x2),
        )
    }

    /// The point displaced by `distance` along the direction `(u1, u2)`.
    #[must_use]
    pub fn offset(self, u1: f64, u2: f64, distance: f64) -> Self {
        Self::new(u1.mul_add(distance, self.x1), u2.mul_add(distance, self.x2))
    }
}

/// A sequence of connected points.
///
/// A polyline whose last point repeats its first is treated as closed by
/// the boundary regridder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polyline(Vec<Point>);

impl Polyline {
    /// Create a new polyline from a vector of points.
    #[must_use]
    pub const fn new(points: Vec<Point>) -> Self {
        Self(points)
    }

    /// Returns `true` if the polyline has no points.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the number of points in the polyline.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns a slice of all points.
    #[must_use]
    pub fn points(&self) -> &[Point] {
        &self.0
    }

    /// Consumes the polyline and returns the underlying vector of points.
    #[must_use]
    pub fn into_points(self) -> Vec<Point> {
        self.0
    }

    /// Total Euclidean length of all segments.
    #[must_use]
    pub fn length(&self) -> f64 {
        self.0.windows(2).map(|w| w[0].distance(w[1])).sum()
    }
}

/// A picked path: one column index per row of the picked grid.
///
/// Entry `i` is the column visited at row `i`, so the path is
/// row-monotone by construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Path(Vec<usize>);

impl Path {
    /// Create a path from per-row column indices.
    #[must_use]
    pub const fn new(columns: Vec<usize>) -> Self {
        Self(columns)
    }

    /// Column index per row.
    #[must_use]
    pub fn columns(&self) -> &[usize] {
        &self.0
    }

    /// Number of rows covered.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if the path covers no rows.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Column at the first row.
    #[must_use]
    pub fn first(&self) -> Option<usize> {
        self.0.first().copied()
    }

    /// Column at the last row.
    #[must_use]
    pub fn last(&self) -> Option<usize> {
        self.0.last().copied()
    }

    /// Largest column change between adjacent rows.
    #[must_use]
    pub fn max_jump(&self) -> usize {
        self.0
            .windows(2)
            .map(|w| w[0].abs_diff(w[1]))
            .max()
            .unwrap_or(0)
    }

    /// Sum of the visited weights, accumulated from the first row down.
    ///
    /// For a path returned by a forward sweep this equals the travel time
    /// at its last row exactly, since both sums add the same values in
    /// the same order. Rows or columns outside `weights` contribute
    /// nothing.
    #[must_use]
    pub fn total_cost(&self, weights: &CostField) -> f32 {
        let mut total = 0.0_f32;
        for (i1, &i2) in self.0.iter().enumerate() {
            if i1 < weights.n1() && i2 < weights.n2() {
                total += weights.get(i1, i2);
            }
        }
        total
    }

    /// Consumes the path and returns the column indices.
    #[must_use]
    pub fn into_columns(self) -> Vec<usize> {
        self.0
    }
}

/// Boundary-tracking settings: control points plus refinement.
///
/// When present in a [`PickConfig`], `attribute_modes` replace the
/// config's `image_modes`: their output is the refinement attribute
/// (high = salient structure), and the band sampled along the refined
/// boundary is what gets picked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundaryConfig {
    /// Arc-length spacing of the initial boundary, in samples.
    pub step: f64,
    /// Control-point row coordinates.
    pub p1: Vec<f64>,
    /// Control-point column coordinates.
    pub p2: Vec<f64>,
    /// Transforms producing the refinement attribute from the input image.
    #[serde(default = "BoundaryConfig::default_attribute_modes")]
    pub attribute_modes: Vec<CostMode>,
    /// Snake refinement and band sampling settings.
    pub refine: RefineOptions,
}

impl BoundaryConfig {
    /// A boundary through the given control points with the default
    /// attribute chain and refinement settings.
    #[must_use]
    pub fn new(step: f64, p1: Vec<f64>, p2: Vec<f64>) -> Self {
        Self {
            step,
            p1,
            p2,
            attribute_modes: Self::default_attribute_modes(),
            refine: RefineOptions::default(),
        }
    }

    /// Local amplitude rescaled to `[0, 1]`, strong structure high.
    #[must_use]
    pub fn default_attribute_modes() -> Vec<CostMode> {
        vec![
            CostMode::LocalAmplitude {
                sigma: PickConfig::DEFAULT_AMPLITUDE_SIGMA,
            },
            CostMode::ComplementAndNormalize {
                power: PickConfig::DEFAULT_POWER,
                complement: false,
            },
        ]
    }

    /// Check control points, spacing, attribute chain and refinement.
    ///
    /// # Errors
    ///
    /// Returns [`PickError::InvalidConfig`] describing the first invalid
    /// parameter.
    pub fn validate(&self) -> Result<(), PickError> {
        if !self.step.is_finite() || self.step <= 0.0 {
            return Err(PickError::InvalidConfig(format!(
                "boundary step must be positive, got {}",
                self.step
            )));
        }
        if self.p1.len() != self.p2.len() || self.p1.len() < 2 {
            return Err(PickError::InvalidConfig(format!(
                "boundary needs at least two control points with matching coordinates, got {} and {}",
                self.p1.len(),
                self.p2.len(),
            )));
        }
        for mode in &self.attribute_modes {
            mode.validate()?;
        }
        // Refinement climbs toward attribute maxima.
        if let Some(CostMode::ComplementAndNormalize {
            complement: true, ..
        }) = self.attribute_modes.last()
        {
            return Err(PickError::InvalidConfig(
                "boundary attribute chain must not end in a complement; refinement seeks high values"
                    .to_owned(),
            ));
        }
        self.refine.validate()
    }
}

/// Configuration for the picking pipeline.
///
/// One explicit value passed to [`crate::process`]; nothing is read
/// from process-wide state. Use
/// [`validate`](Self::validate) to check it before running; `process`
/// validates as well.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PickConfig {
    /// Transforms applied to the input image, in order. Replaced by the
    /// boundary's `attribute_modes` when a boundary is set.
    pub image_modes: Vec<CostMode>,

    /// Optional boundary refinement; picks on the straightened band
    /// instead of the image when set.
    pub boundary: Option<BoundaryConfig>,

    /// Transforms applied to the band before picking. Ignored without a
    /// boundary.
    pub band_modes: Vec<CostMode>,

    /// Pick one column per image column instead of one per image row.
    ///
    /// Horizons are usually picked this way: one depth per trace.
    /// Ignored when picking on a band.
    pub transpose: bool,

    /// Maximum column change between adjacent rows of a path.
    pub max_step: usize,

    /// Half-width of the lateral cost smoothing applied before sweeping.
    pub radius: usize,

    /// Where the forward sweep starts.
    pub seed: Seed,
}

impl PickConfig {
    /// Default amplitude smoothing length in samples.
    pub const DEFAULT_AMPLITUDE_SIGMA: f32 = 4.0;
    /// Default contrast exponent for the normalize step.
    pub const DEFAULT_POWER: f32 = 1.0;
    /// Default maximum lateral step per row.
    pub const DEFAULT_MAX_STEP: usize = 4;
    /// Default lateral smoothing half-width.
    pub const DEFAULT_RADIUS: usize = 3;

    /// Check every parameter against its domain.
    ///
    /// # Errors
    ///
    /// Returns [`PickError::InvalidConfig`] describing the first invalid
    /// parameter.
    pub fn validate(&self) -> Result<(), PickError> {
        for mode in self.image_modes.iter().chain(&self.band_modes) {
            mode.validate()?;
        }
        match &self.boundary {
            Some(boundary) => boundary.validate(),
            None => Ok(()),
        }
    }
}

impl Default for PickConfig {
    fn default() -> Self {
        Self {
            image_modes: vec![
                CostMode::LocalAmplitude {
                    sigma: Self::DEFAULT_AMPLITUDE_SIGMA,
                },
                CostMode::ComplementAndNormalize {
                    power: Self::DEFAULT_POWER,
                    complement: true,
                },
            ],
            boundary: None,
            band_modes: vec![CostMode::ComplementAndNormalize {
                power: Self::DEFAULT_POWER,
                complement: true,
            }],
            transpose: false,
            max_step: Self::DEFAULT_MAX_STEP,
            radius: Self::DEFAULT_RADIUS,
            seed: Seed::Free,
        }
    }
}

/// Output of boundary refinement and band picking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundaryPick {
    /// The boundary after refinement.
    pub boundary: Boundary,
    /// The straightened band sampled along the refined boundary.
    pub band: Band,
    /// The band pick mapped back to image coordinates.
    pub picked: Polyline,
}

/// Result of running the picking pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PickResult {
    /// The weights that were swept (after lateral smoothing).
    pub weights: CostField,
    /// Forward-sweep path from the configured seed.
    pub forward: Path,
    /// Travel times of the forward sweep.
    pub forward_travel_time: TravelTimeField,
    /// Backward-sweep path seeded at the forward path's end column; the
    /// point-to-point pick.
    pub backward: Path,
    /// Travel times of the backward sweep.
    pub backward_travel_time: TravelTimeField,
    /// Present when the pick ran on a boundary band.
    pub boundary: Option<BoundaryPick>,
}

impl PickResult {
    /// The final pick: the backward path.
    #[must_use]
    pub const fn path(&self) -> &Path {
        &self.backward
    }

    /// Convenience accessor for the forward travel-time field.
    #[must_use]
    pub const fn travel_time(&self) -> &Image2D {
        &self.forward_travel_time
    }
}

/// Errors that can occur while picking.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PickError {
    /// Non-finite values, negative costs, or mismatched shapes.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A seed column outside the picked grid.
    #[error("seed column {column} is outside [0, {}]", .columns.saturating_sub(1))]
    OutOfBounds {
        /// The requested seed column.
        column: usize,
        /// Number of columns in the grid.
        columns: usize,
    },

    /// A zero-length or self-intersecting boundary.
    #[error("degenerate boundary geometry: {0}")]
    DegenerateGeometry(String),

    /// A configuration value outside its domain.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    // --- Point tests ---

    #[test]
    fn point_distance() {
        let a = Point::new(0.0, 0.0);
        let b = Point::new(3.0, 4.0);
        assert!((a.distance(b) - 5.0).abs() < f64::EPSILON);
        assert!((a.distance_squared(b) - 25.0).abs() < f64::EPSILON);
    }

    #[test]
    fn point_lerp_endpoints_and_midpoint() {
        let a = Point::new(1.0, 2.0);
        let b = Point::new(3.0, 6.0);
        assert_eq!(a.lerp(b, 0.0), a);
        assert_eq!(a.lerp(b, 1.0), b);
        assert_eq!(a.lerp(b, 0.5), Point::new(2.0, 4.0));
    }

    #[test]
    fn point_offset_along_direction() {
        let p = Point::new(5.0, 5.0).offset(0.0, 1.0, -2.0);
        assert_eq!(p, Point::new(5.0, 3.0));
    }

    // --- Polyline tests ---

    #[test]
    fn polyline_length() {
        let poly = Polyline::new(vec![
            Point::new(0.0, 0.0),
            Point::new(3.0, 4.0),
            Point::new(3.0, 10.0),
        ]);
        assert!((poly.length() - 11.0).abs() < 1e-12);
        assert_eq!(poly.len(), 3);
    }

    // --- Path tests ---

    #[test]
    fn path_max_jump() {
        let path = Path::new(vec![3, 4, 2, 2, 5]);
        assert_eq!(path.max_jump(), 3);
        assert_eq!(Path::new(vec![7]).max_jump(), 0);
        assert_eq!(path.first(), Some(3));
        assert_eq!(path.last(), Some(5));
    }

    #[test]
    fn path_total_cost_sums_visited_weights() {
        let weights =
            CostField::new(Image2D::new(2, 3, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap())
                .unwrap();
        let path = Path::new(vec![2, 0]);
        assert!((path.total_cost(&weights) - 7.0).abs() < f32::EPSILON);
    }

    // --- Config tests ---

    #[test]
    fn default_config_is_valid() {
        PickConfig::default().validate().unwrap();
    }

    #[test]
    fn config_rejects_bad_boundary_step() {
        let config = PickConfig {
            boundary: Some(BoundaryConfig::new(0.0, vec![0.0, 10.0], vec![0.0, 0.0])),
            ..PickConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(PickError::InvalidConfig(_))
        ));
    }

    #[test]
    fn config_rejects_mismatched_control_points() {
        let config = PickConfig {
            boundary: Some(BoundaryConfig::new(
                1.0,
                vec![0.0, 10.0, 20.0],
                vec![0.0, 0.0],
            )),
            ..PickConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(PickError::InvalidConfig(_))
        ));
    }

    #[test]
    fn boundary_rejects_complemented_attribute() {
        let mut boundary = BoundaryConfig::new(1.0, vec![0.0, 10.0], vec![0.0, 0.0]);
        boundary.attribute_modes = PickConfig::default().image_modes;
        assert!(matches!(
            boundary.validate(),
            Err(PickError::InvalidConfig(_))
        ));
        boundary.attribute_modes.clear();
        boundary.validate().unwrap();
    }

    #[test]
    fn boundary_json_defaults_attribute_chain() {
        let json = r#"{
            "step": 1.0,
            "p1": [0.0, 10.0],
            "p2": [0.0, 0.0],
            "refine": { "search_radius": 4, "band_stride": 1.0, "iterations": 3,
                        "step_size": 0.5, "regrid_interval": 2 }
        }"#;
        let boundary: BoundaryConfig = serde_json::from_str(json).unwrap();
        assert_eq!(boundary.attribute_modes, BoundaryConfig::default_attribute_modes());
    }

    #[test]
    fn config_json_round_trip() {
        let config = PickConfig {
            seed: Seed::Column(12),
            transpose: true,
            ..PickConfig::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        let back: PickConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }

    // --- Error tests ---

    #[test]
    fn out_of_bounds_message_names_range() {
        let err = PickError::OutOfBounds {
            column: 9,
            columns: 5,
        };
        assert_eq!(err.to_string(), "seed column 9 is outside [0, 4]");
    }
}
