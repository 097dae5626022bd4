//! Dense row-major raster types shared by every picking stage.
//!
//! [`Image2D`] is the plain `f32` grid (n1 rows = depth/time, n2 columns =
//! lateral position). [`CostField`] wraps an `Image2D` whose values are
//! known to be finite and non-negative, which is what the path picker
//! consumes. Travel-time fields are ordinary `Image2D`s
//! ([`TravelTimeField`]) because cells a constrained sweep cannot reach
//! hold `+inf`.

use serde::{Deserialize, Serialize};

use crate::types::PickError;

/// Accumulated minimum cost per cell, written by the path picker.
pub type TravelTimeField = Image2D;

/// A dense row-major `f32` grid with `n1` rows and `n2` columns.
///
/// Shapes are always non-empty and the backing buffer always holds
/// exactly `n1 * n2` values; both are checked at construction (including
/// deserialization).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawImage", into = "RawImage")]
pub struct Image2D {
    n1: usize,
    n2: usize,
    data: Vec<f32>,
}

/// Serde-compatible proxy so deserialization goes through [`Image2D::new`].
#[derive(Serialize, Deserialize)]
struct RawImage {
    n1: usize,
    n2: usize,
    data: Vec<f32>,
}

impl TryFrom<RawImage> for Image2D {
    type Error = PickError;

    fn try_from(raw: RawImage) -> Result<Self, Self::Error> {
        Self::new(raw.n1, raw.n2, raw.data)
    }
}

impl From<Image2D> for RawImage {
    fn from(image: Image2D) -> Self {
        Self {
            n1: image.n1,
            n2: image.n2,
            data: image.data,
        }
    }
}

impl Image2D {
    /// Wrap a row-major buffer of `n1 * n2` samples.
    ///
    /// # Errors
    ///
    /// Returns [`PickError::InvalidInput`] if either dimension is zero,
    /// `n1 * n2` overflows, or `data.len() != n1 * n2`.
    pub fn new(n1: usize, n2: usize, data: Vec<f32>) -> Result<Self, PickError> {
        let len = checked_len(n1, n2)?;
        if data.len() != len {
            return Err(PickError::InvalidInput(format!(
                "buffer holds {} samples, expected {n1}x{n2} = {len}",
                data.len(),
            )));
        }
        Ok(Self { n1, n2, data })
    }

    /// A grid with every sample set to `value`.
    ///
    /// # Errors
    ///
    /// Returns [`PickError::InvalidInput`] if either dimension is zero or
    /// `n1 * n2` overflows.
    pub fn filled(n1: usize, n2: usize, value: f32) -> Result<Self, PickError> {
        let len = checked_len(n1, n2)?;
        Ok(Self {
            n1,
            n2,
            data: vec![value; len],
        })
    }

    /// Build a grid by evaluating `f(i1, i2)` at every sample.
    ///
    /// # Errors
    ///
    /// Returns [`PickError::InvalidInput`] if either dimension is zero or
    /// `n1 * n2` overflows.
    pub fn from_fn(
        n1: usize,
        n2: usize,
        mut f: impl FnMut(usize, usize) -> f32,
    ) -> Result<Self, PickError> {
        let mut data = Vec::with_capacity(checked_len(n1, n2)?);
        for i1 in 0..n1 {
            for i2 in 0..n2 {
                data.push(f(i1, i2));
            }
        }
        Ok(Self { n1, n2, data })
    }

    /// Number of rows (depth/time samples).
    #[must_use]
    pub const fn n1(&self) -> usize {
        self.n1
    }

    /// Number of columns (lateral positions).
    #[must_use]
    pub const fn n2(&self) -> usize {
        self.n2
    }

    /// `(n1, n2)`.
    #[must_use]
    pub const fn shape(&self) -> (usize, usize) {
        (self.n1, self.n2)
    }

    /// Sample at row `i1`, column `i2`.
    ///
    /// Indices must be in range.
    #[must_use]
    pub fn get(&self, i1: usize, i2: usize) -> f32 {
        self.data[i1 * self.n2 + i2]
    }

    /// Overwrite the sample at row `i1`, column `i2`.
    pub fn set(&mut self, i1: usize, i2: usize, value: f32) {
        self.data[i1 * self.n2 + i2] = value;
    }

    /// One row as a slice of `n2` samples.
    #[must_use]
    pub fn row(&self, i1: usize) -> &[f32] {
        &self.data[i1 * self.n2..(i1 + 1) * self.n2]
    }

    /// One row as a mutable slice of `n2` samples.
    pub fn row_mut(&mut self, i1: usize) -> &mut [f32] {
        &mut self.data[i1 * self.n2..(i1 + 1) * self.n2]
    }

    /// The whole row-major buffer.
    #[must_use]
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Consume the grid and return its row-major buffer.
    #[must_use]
    pub fn into_vec(self) -> Vec<f32> {
        self.data
    }

    /// Apply `f` to every sample, keeping the shape.
    #[must_use]
    pub fn map(&self, f: impl Fn(f32) -> f32) -> Self {
        Self {
            n1: self.n1,
            n2: self.n2,
            data: self.data.iter().map(|&v| f(v)).collect(),
        }
    }

    /// Swap rows and columns.
    #[must_use]
    pub fn transpose(&self) -> Self {
        let mut data = Vec::with_capacity(self.data.len());
        for i2 in 0..self.n2 {
            for i1 in 0..self.n1 {
                data.push(self.get(i1, i2));
            }
        }
        Self {
            n1: self.n2,
            n2: self.n1,
            data,
        }
    }

    /// Minimum and maximum sample values.
    ///
    /// NaNs are ignored; callers that care check [`Self::ensure_finite`]
    /// first.
    #[must_use]
    pub fn min_max(&self) -> (f32, f32) {
        self.data
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            })
    }

    /// Fail if any sample is NaN or infinite.
    ///
    /// # Errors
    ///
    /// Returns [`PickError::InvalidInput`] naming the first offending
    /// sample.
    pub fn ensure_finite(&self) -> Result<(), PickError> {
        match self.data.iter().position(|v| !v.is_finite()) {
            None => Ok(()),
            Some(idx) => Err(PickError::InvalidInput(format!(
                "non-finite sample {} at ({}, {})",
                self.data[idx],
                idx / self.n2,
                idx % self.n2,
            ))),
        }
    }

    /// Bilinear interpolation at fractional position `(x1, x2)`.
    ///
    /// Positions outside the grid are clamped to the nearest edge sample
    /// rather than rejected, so a sampling window that leaves the image
    /// saturates at the border value.
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn sample_clamped(&self, x1: f64, x2: f64) -> f32 {
        let max1 = (self.n1 - 1) as f64;
        let max2 = (self.n2 - 1) as f64;
        let x1 = if x1.is_nan() { 0.0 } else { x1.clamp(0.0, max1) };
        let x2 = if x2.is_nan() { 0.0 } else { x2.clamp(0.0, max2) };

        let i1 = (x1.floor() as usize).min(self.n1.saturating_sub(2));
        let i2 = (x2.floor() as usize).min(self.n2.saturating_sub(2));
        let j1 = (i1 + 1).min(self.n1 - 1);
        let j2 = (i2 + 1).min(self.n2 - 1);
        let t1 = (x1 - i1 as f64) as f32;
        let t2 = (x2 - i2 as f64) as f32;

        let top = self.get(i1, i2).mul_add(1.0 - t2, self.get(i1, j2) * t2);
        let bottom = self.get(j1, i2).mul_add(1.0 - t2, self.get(j1, j2) * t2);
        top.mul_add(1.0 - t1, bottom * t1)
    }
}

/// Sample count of an `n1 x n2` grid, rejecting empty and overflowing shapes.
fn checked_len(n1: usize, n2: usize) -> Result<usize, PickError> {
    if n1 == 0 || n2 == 0 {
        return Err(PickError::InvalidInput(format!(
            "image shape must be non-empty, got {n1}x{n2}"
        )));
    }
    n1.checked_mul(n2).ok_or_else(|| {
        PickError::InvalidInput(format!("image shape {n1}x{n2} overflows the sample count"))
    })
}

/// A grid of finite, non-negative picking weights.
///
/// Low values mark favorable path locations. The invariant is checked
/// once by [`CostField::new`]; the picker relies on it without
/// re-validating.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Image2D", into = "Image2D")]
pub struct CostField(Image2D);

impl TryFrom<Image2D> for CostField {
    type Error = PickError;

    fn try_from(image: Image2D) -> Result<Self, Self::Error> {
        Self::new(image)
    }
}

impl From<CostField> for Image2D {
    fn from(cost: CostField) -> Self {
        cost.0
    }
}

impl CostField {
    /// Validate and wrap an image as a cost field.
    ///
    /// # Errors
    ///
    /// Returns [`PickError::InvalidInput`] if any value is non-finite or
    /// negative.
    pub fn new(image: Image2D) -> Result<Self, PickError> {
        image.ensure_finite()?;
        if let Some(idx) = image.as_slice().iter().position(|&v| v < 0.0) {
            return Err(PickError::InvalidInput(format!(
                "negative cost {} at ({}, {})",
                image.as_slice()[idx],
                idx / image.n2(),
                idx % image.n2(),
            )));
        }
        Ok(Self(image))
    }

    /// Wrap values the caller has already kept finite and non-negative.
    pub(crate) fn from_valid(image: Image2D) -> Self {
        debug_assert!(image.as_slice().iter().all(|v| v.is_finite() && *v >= 0.0));
        Self(image)
    }

    /// Borrow the underlying image.
    #[must_use]
    pub const fn as_image(&self) -> &Image2D {
        &self.0
    }

    /// Consume the cost field and return the underlying image.
    #[must_use]
    pub fn into_image(self) -> Image2D {
        self.0
    }

    /// Number of rows.
    #[must_use]
    pub const fn n1(&self) -> usize {
        self.0.n1()
    }

    /// Number of columns.
    #[must_use]
    pub const fn n2(&self) -> usize {
        self.0.n2()
    }

    /// `(n1, n2)`.
    #[must_use]
    pub const fn shape(&self) -> (usize, usize) {
        self.0.shape()
    }

    /// Weight at row `i1`, column `i2`.
    #[must_use]
    pub fn get(&self, i1: usize, i2: usize) -> f32 {
        self.0.get(i1, i2)
    }

    /// One row of weights.
    #[must_use]
    pub fn row(&self, i1: usize) -> &[f32] {
        self.0.row(i1)
    }

    /// Swap rows and columns; the invariant survives transposition.
    #[must_use]
    pub fn transpose(&self) -> Self {
        Self(self.0.transpose())
    }
}
