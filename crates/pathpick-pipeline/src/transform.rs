//! Attribute transforms: turn a raw amplitude/attribute image into a
//! non-negative picking cost field.
//!
//! The picker always minimizes, so every polarity decision lives here:
//! structure the caller wants the path to follow must come out of the
//! chain of [`CostMode`]s as *low* values. The usual horizon chain is
//! [`CostMode::LocalAmplitude`] followed by a complementing
//! [`CostMode::ComplementAndNormalize`], which turns strong reflections
//! into cheap cells.

use serde::{Deserialize, Serialize};

use crate::image::{CostField, Image2D};
use crate::types::PickError;

/// Smoothed energies at or below this are treated as silent samples.
const MIN_ENERGY: f32 = 1e-12;

/// Selects one attribute transform.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum CostMode {
    /// Divide the signal by its local RMS amplitude.
    ///
    /// The local energy is the squared signal smoothed with a one-sided
    /// exponential filter down each column. Removes the large-scale
    /// amplitude trend (e.g. decay with depth) while keeping local
    /// contrast; negative lobes clamp to zero.
    Envelope {
        /// Smoothing length in samples (`0` disables smoothing).
        sigma: f32,
    },

    /// Local RMS amplitude: the square root of the smoothed energy.
    ///
    /// Non-negative and high on strong reflections of either polarity.
    LocalAmplitude {
        /// Smoothing length in samples (`0` disables smoothing).
        sigma: f32,
    },

    /// [`Envelope`](Self::Envelope) without the clamp, rescaled to
    /// `[0, 1]` so negative lobes stay distinguishable.
    GainNormalize {
        /// Smoothing length in samples (`0` disables smoothing).
        sigma: f32,
    },

    /// Rescale to `[0, 1]`, raise to `power`, and optionally complement
    /// (`1 - x`).
    ComplementAndNormalize {
        /// Contrast exponent; values below 1 lift weak samples, values
        /// above 1 suppress them.
        power: f32,
        /// Whether to flip polarity after rescaling.
        complement: bool,
    },
}

impl CostMode {
    /// Short name used in diagnostics.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Envelope { .. } => "envelope",
            Self::LocalAmplitude { .. } => "local_amplitude",
            Self::GainNormalize { .. } => "gain_normalize",
            Self::ComplementAndNormalize { .. } => "complement_and_normalize",
        }
    }

    /// Check the mode's parameters.
    ///
    /// # Errors
    ///
    /// Returns [`PickError::InvalidConfig`] for a negative or non-finite
    /// `sigma`, or a non-positive or non-finite `power`.
    pub fn validate(&self) -> Result<(), PickError> {
        match *self {
            Self::Envelope { sigma }
            | Self::LocalAmplitude { sigma }
            | Self::GainNormalize { sigma } => {
                if !sigma.is_finite() || sigma < 0.0 {
                    return Err(PickError::InvalidConfig(format!(
                        "{} sigma must be finite and non-negative, got {sigma}",
                        self.name()
                    )));
                }
            }
            Self::ComplementAndNormalize { power, .. } => {
                if !power.is_finite() || power <= 0.0 {
                    return Err(PickError::InvalidConfig(format!(
                        "contrast power must be finite and positive, got {power}"
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Apply one transform and return the result as a cost field.
///
/// Outputs are clamped non-negative.
///
/// # Errors
///
/// Returns [`PickError::InvalidInput`] if `image` contains non-finite
/// values (or the transform overflows to infinity), and
/// [`PickError::InvalidConfig`] if the mode's parameters are invalid.
pub fn build_cost_field(image: &Image2D, mode: CostMode) -> Result<CostField, PickError> {
    mode.validate()?;
    image.ensure_finite()?;

    let out = match mode {
        CostMode::Envelope { sigma } => gain(image, sigma),
        CostMode::LocalAmplitude { sigma } => local_amplitude(image, sigma),
        CostMode::GainNormalize { sigma } => rescale_unit(&gain(image, sigma)),
        CostMode::ComplementAndNormalize { power, complement } => {
            complement_and_normalize(image, power, complement)
        }
    };

    CostField::new(out.map(|v| v.max(0.0)))
}

/// Apply a sequence of transforms, feeding each output into the next.
///
/// An empty chain validates `image` as a cost field unchanged.
///
/// # Errors
///
/// Same as [`build_cost_field`]; with an empty chain, also fails if
/// `image` has negative values.
pub fn build_cost_field_chain(image: &Image2D, modes: &[CostMode]) -> Result<CostField, PickError> {
    let Some((first, rest)) = modes.split_first() else {
        return CostField::new(image.clone());
    };
    let mut current = build_cost_field(image, *first)?;
    for mode in rest {
        current = build_cost_field(current.as_image(), *mode)?;
    }
    Ok(current)
}

/// One-sided exponential smoothing down each column.
///
/// `y[0] = x[0]`, `y[i] = a * y[i-1] + (1 - a) * x[i]` with
/// `a = exp(-1 / sigma)`.
fn smooth_down_columns(image: &Image2D, sigma: f32) -> Image2D {
    let mut out = image.clone();
    if sigma <= 0.0 {
        return out;
    }
    let a = (-1.0 / sigma).exp();
    let b = 1.0 - a;
    for i1 in 1..out.n1() {
        let prev = out.row(i1 - 1).to_vec();
        for (y, p) in out.row_mut(i1).iter_mut().zip(prev) {
            *y = a.mul_add(p, b * *y);
        }
    }
    out
}

fn local_energy(image: &Image2D, sigma: f32) -> Image2D {
    smooth_down_columns(&image.map(|v| v * v), sigma)
}

fn local_amplitude(image: &Image2D, sigma: f32) -> Image2D {
    local_energy(image, sigma).map(|e| e.max(0.0).sqrt())
}

fn gain(image: &Image2D, sigma: f32) -> Image2D {
    let energy = local_energy(image, sigma);
    let mut out = image.clone();
    for i1 in 0..out.n1() {
        for (v, &e) in out.row_mut(i1).iter_mut().zip(energy.row(i1)) {
            *v = if e > MIN_ENERGY { *v / e.sqrt() } else { 0.0 };
        }
    }
    out
}

/// `(x - min) / (max - min)`; a flat image maps to all zeros.
fn rescale_unit(image: &Image2D) -> Image2D {
    let (lo, hi) = image.min_max();
    let span = hi - lo;
    if span <= 0.0 || !span.is_finite() {
        return image.map(|_| 0.0);
    }
    image.map(|v| ((v - lo) / span).clamp(0.0, 1.0))
}

fn complement_and_normalize(image: &Image2D, power: f32, complement: bool) -> Image2D {
    let unit = rescale_unit(image);
    #[allow(clippy::float_cmp)]
    let sharpened = if power == 1.0 {
        unit
    } else {
        unit.map(|v| v.powf(power))
    };
    if complement {
        sharpened.map(|v| 1.0 - v)
    } else {
        sharpened
    }
}
