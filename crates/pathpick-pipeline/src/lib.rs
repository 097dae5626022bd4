//! pathpick-pipeline: optimal path and boundary picking (sans-IO).
//!
//! Picks a laterally continuous path through a 2-D attribute slice, one
//! column per row, minimizing accumulated cost:
//!
//! attribute transform -> (optional boundary refinement + band) ->
//! lateral weight smoothing -> forward sweep -> backward sweep.
//!
//! This crate has **no I/O dependencies**. It operates on in-memory
//! [`Image2D`] grids and returns structured data; decoding and output
//! live in `pathpick-bench`.

pub mod boundary;
pub mod diagnostics;
pub mod image;
pub mod picker;
pub mod pipeline;
pub mod refine;
pub mod transform;
pub mod types;

pub use boundary::{Boundary, BoundaryPoint, initial_boundary, regrid_boundary};
pub use image::{CostField, Image2D, TravelTimeField};
pub use picker::{PathPicker, Seed, Sweep};
pub use refine::{Band, RefineOptions, RefineStats, refine, refine_with_stats};
pub use transform::{CostMode, build_cost_field, build_cost_field_chain};
pub use types::{
    BoundaryConfig, BoundaryPick, Path, PickConfig, PickError, PickResult, Point, Polyline,
};

/// Run the full picking pipeline.
///
/// # Pipeline steps
///
/// 1. Apply `config.image_modes` to `image`, or the boundary's
///    `attribute_modes` when `config.boundary` is set
/// 2. If `config.boundary` is set: build and refine the boundary against
///    the step-1 output, sample the band, apply `config.band_modes`
/// 3. Otherwise optionally transpose the step-1 cost
/// 4. Smooth weights laterally over `config.radius`
/// 5. Forward sweep from `config.seed`
/// 6. Backward sweep seeded at the forward path's end column (the seed
///    column itself when `config.seed` is constrained)
///
/// # Errors
///
/// Returns [`PickError::InvalidConfig`] if `config` fails validation,
/// [`PickError::InvalidInput`] for non-finite input,
/// [`PickError::OutOfBounds`] for a seed outside the swept grid, and
/// [`PickError::DegenerateGeometry`] if the boundary collapses.
pub fn process(image: &Image2D, config: &PickConfig) -> Result<PickResult, PickError> {
    diagnostics::process_staged_with_diagnostics(image, config, &diagnostics::SystemClock)
        .map(|(result, _)| result)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn raw_config(max_step: usize, seed: Seed) -> PickConfig {
        PickConfig {
            image_modes: Vec::new(),
            max_step,
            radius: 0,
            seed,
            ..PickConfig::default()
        }
    }

    #[test]
    fn seeded_valley_is_followed() {
        let image = Image2D::from_fn(5, 5, |_, i2| if i2 == 2 { 0.0 } else { 1.0 }).unwrap();
        let result = process(&image, &raw_config(1, Seed::Column(2))).unwrap();
        assert_eq!(result.forward.columns(), &[2, 2, 2, 2, 2]);
        assert!(result.forward.total_cost(&result.weights).abs() < f32::EPSILON);
    }

    #[test]
    fn free_diagonal_is_followed() {
        let image = Image2D::from_fn(5, 5, |i1, i2| if i1 == i2 { 0.0 } else { 1.0 }).unwrap();
        let result = process(&image, &raw_config(1, Seed::Free)).unwrap();
        assert_eq!(result.forward.columns(), &[0, 1, 2, 3, 4]);
        assert_eq!(result.path().columns(), &[0, 1, 2, 3, 4]);
    }

    #[test]
    fn non_finite_input_is_rejected() {
        let mut image = Image2D::filled(3, 3, 0.5).unwrap();
        image.set(1, 1, f32::NAN);
        let result = process(&image, &PickConfig::default());
        assert!(matches!(result, Err(PickError::InvalidInput(_))));
    }

    #[test]
    fn default_config_runs_on_dipping_reflector() {
        // A bright reflector dipping one column every two rows.
        let image = Image2D::from_fn(24, 16, |i1, i2| {
            let center = 3 + i1 / 2;
            if i2 == center { 1.0 } else { 0.0 }
        })
        .unwrap();
        let result = process(&image, &PickConfig::default()).unwrap();
        assert_eq!(result.path().len(), 24);
        assert!(result.path().max_jump() <= PickConfig::DEFAULT_MAX_STEP);
    }
}
