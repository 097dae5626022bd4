//! The full picking pipeline with per-stage timing.
//!
//! Stages, in order:
//!
//! 1. Image transform chain: the config's image modes, or the boundary's
//!    attribute modes when a boundary is set.
//! 2. Optional boundary: build from control points, refine against the
//!    stage-1 attribute, transform the sampled band, transpose it so each
//!    boundary point is one row.
//! 3. Otherwise, optional transpose of the stage-1 cost.
//! 4. Lateral weight smoothing.
//! 5. Forward sweep from the configured seed.
//! 6. Backward sweep seeded at the forward end column.
//!
//! [`crate::process`] runs the same stages and drops the diagnostics.

use crate::boundary::{Boundary, initial_boundary};
use crate::diagnostics::{Clock, PipelineDiagnostics, PipelineSummary, StageDiagnostics, StageMetrics};
use crate::image::{CostField, Image2D};
use crate::picker::{PathPicker, Seed, Sweep};
use crate::refine::{Band, refine_with_stats};
use crate::transform::{CostMode, build_cost_field_chain};
use crate::types::{BoundaryConfig, BoundaryPick, Path, PickConfig, PickError, PickResult};

/// Run the pipeline, timing every stage with `clock`.
///
/// # Errors
///
/// Returns [`PickError::InvalidConfig`] if `config` fails validation,
/// and otherwise propagates the first error raised by a stage.
pub fn process_staged_with_diagnostics<C: Clock>(
    image: &Image2D,
    config: &PickConfig,
    clock: &C,
) -> Result<(PickResult, PipelineDiagnostics), PickError> {
    config.validate()?;
    let pipeline_start = clock.now();

    // 1. Image transforms.
    let image_modes = config
        .boundary
        .as_ref()
        .map_or(&config.image_modes, |b| &b.attribute_modes);
    let (cost, image_transform) = timed(clock, || {
        let cost = build_cost_field_chain(image, image_modes)?;
        let metrics = transform_metrics(image_modes, &cost);
        Ok((cost, metrics))
    })?;

    // 2./3. Boundary band or the image cost itself.
    let mut boundary_stages = None;
    let (swept, boundary_state) = if let Some(ref boundary_config) = config.boundary {
        let (staged, stages) = run_boundary(clock, boundary_config, &cost, &config.band_modes)?;
        boundary_stages = Some(stages);
        (staged.band_cost.transpose(), Some(staged))
    } else if config.transpose {
        (cost.transpose(), None)
    } else {
        (cost, None)
    };

    // 4. Weight smoothing.
    let picker = PathPicker::new(config.max_step, config.radius);
    let (weights, weight) = timed(clock, || {
        let weights = picker.apply_for_weight(&swept);
        let metrics = StageMetrics::Weight {
            radius: picker.radius(),
            mean_cost: mean(weights.as_image()),
        };
        Ok((weights, metrics))
    })?;

    // 5. Forward sweep.
    let mut forward_travel_time = Image2D::filled(weights.n1(), weights.n2(), 0.0)?;
    let (forward, forward_pick) = timed(clock, || {
        let path = picker.forward_pick(config.seed, &weights, &mut forward_travel_time)?;
        let metrics = pick_metrics(Sweep::Forward, config.seed, &picker, &path, &weights);
        Ok((path, metrics))
    })?;

    // 6. Backward sweep, closing the point-to-point pick.
    let end = forward.last().ok_or_else(|| {
        PickError::DegenerateGeometry("forward sweep returned an empty path".to_owned())
    })?;
    let backward_seed = Seed::Column(end);
    let mut backward_travel_time = Image2D::filled(weights.n1(), weights.n2(), 0.0)?;
    let (backward, backward_pick) = timed(clock, || {
        let path = picker.backward_pick(backward_seed, &weights, &mut backward_travel_time)?;
        let metrics = pick_metrics(Sweep::Backward, backward_seed, &picker, &path, &weights);
        Ok((path, metrics))
    })?;

    let boundary = match boundary_state {
        Some(staged) => {
            let picked = staged.band.to_image_points(&backward, &staged.boundary)?;
            Some(BoundaryPick {
                boundary: staged.boundary,
                band: staged.band,
                picked,
            })
        }
        None => None,
    };

    let summary = PipelineSummary {
        image_rows: image.n1(),
        image_columns: image.n2(),
        picked_rows: weights.n1(),
        picked_columns: weights.n2(),
        path_cost: backward.total_cost(&weights),
    };
    tracing::debug!(
        rows = summary.picked_rows,
        columns = summary.picked_columns,
        path_cost = summary.path_cost,
        with_boundary = boundary.is_some(),
        "pipeline complete"
    );

    let (boundary_diag, refine_diag, band_diag) = match boundary_stages {
        Some(stages) => (Some(stages.boundary), Some(stages.refine), Some(stages.band)),
        None => (None, None, None),
    };
    let diagnostics = PipelineDiagnostics {
        image_transform,
        boundary: boundary_diag,
        refine: refine_diag,
        band_transform: band_diag,
        weight,
        forward_pick,
        backward_pick,
        total_duration: clock.elapsed(&pipeline_start),
        summary,
    };
    let result = PickResult {
        weights,
        forward,
        forward_travel_time,
        backward,
        backward_travel_time,
        boundary,
    };
    Ok((result, diagnostics))
}

/// Products of the boundary stages.
struct BoundaryStaged {
    boundary: Boundary,
    band: Band,
    band_cost: CostField,
}

/// Diagnostics of the boundary stages.
struct BoundaryStages {
    boundary: StageDiagnostics,
    refine: StageDiagnostics,
    band: StageDiagnostics,
}

fn run_boundary<C: Clock>(
    clock: &C,
    config: &BoundaryConfig,
    attribute: &CostField,
    band_modes: &[CostMode],
) -> Result<(BoundaryStaged, BoundaryStages), PickError> {
    let (mut boundary, boundary_diag) = timed(clock, || {
        let boundary = initial_boundary(config.step, &config.p1, &config.p2)?;
        let metrics = StageMetrics::Boundary {
            control_points: config.p1.len(),
            points: boundary.len(),
            arc_length: boundary.arc_length(),
            closed: boundary.is_closed(),
        };
        Ok((boundary, metrics))
    })?;

    let (band, refine_diag) = timed(clock, || {
        let (band, stats) = refine_with_stats(&config.refine, &mut boundary, attribute.as_image())?;
        let crossings = boundary.self_intersections().len();
        if crossings > 0 {
            tracing::warn!(crossings, "refined boundary intersects itself");
        }
        let metrics = StageMetrics::Refine {
            iterations: stats.iterations,
            regrids: stats.regrids,
            points: boundary.len(),
            mean_displacement: stats.mean_displacement,
            max_displacement: stats.max_displacement,
            max_curvature: boundary.max_curvature(),
            self_intersections: crossings,
            band_shape: band.image().shape(),
        };
        Ok((band, metrics))
    })?;

    let (band_cost, band_diag) = timed(clock, || {
        let cost = build_cost_field_chain(band.image(), band_modes)?;
        let metrics = transform_metrics(band_modes, &cost);
        Ok((cost, metrics))
    })?;

    Ok((
        BoundaryStaged {
            boundary,
            band,
            band_cost,
        },
        BoundaryStages {
            boundary: boundary_diag,
            refine: refine_diag,
            band: band_diag,
        },
    ))
}

/// Run one stage and wrap its metrics with the elapsed time.
fn timed<C: Clock, T>(
    clock: &C,
    stage: impl FnOnce() -> Result<(T, StageMetrics), PickError>,
) -> Result<(T, StageDiagnostics), PickError> {
    let start = clock.now();
    let (value, metrics) = stage()?;
    let diagnostics = StageDiagnostics {
        duration: clock.elapsed(&start),
        metrics,
    };
    Ok((value, diagnostics))
}

fn transform_metrics(modes: &[CostMode], cost: &CostField) -> StageMetrics {
    let (min, max) = cost.as_image().min_max();
    StageMetrics::Transform {
        modes: modes.iter().map(|m| m.name().to_owned()).collect(),
        rows: cost.n1(),
        columns: cost.n2(),
        min,
        max,
    }
}

fn pick_metrics(
    sweep: Sweep,
    seed: Seed,
    picker: &PathPicker,
    path: &Path,
    weights: &CostField,
) -> StageMetrics {
    StageMetrics::Pick {
        sweep: sweep.name().to_owned(),
        seed: match seed {
            Seed::Free => None,
            Seed::Column(c) => Some(c),
        },
        max_step: picker.max_step(),
        start_column: path.first().unwrap_or(0),
        end_column: path.last().unwrap_or(0),
        total_cost: path.total_cost(weights),
        max_jump: path.max_jump(),
    }
}

#[allow(clippy::cast_precision_loss)]
fn mean(image: &Image2D) -> f64 {
    let values = image.as_slice();
    if values.is_empty() {
        return 0.0;
    }
    values.iter().map(|&v| f64::from(v)).sum::<f64>() / values.len() as f64
}
