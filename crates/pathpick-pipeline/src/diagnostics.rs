//! Pipeline diagnostics: timing and per-stage metrics.
//!
//! Every call to [`process_staged_with_diagnostics`] collects these
//! alongside the pick result. They exist for tuning picker and transform
//! parameters, not for production monitoring.
//!
//! Time is read through the [`Clock`] trait so callers (and tests) can
//! supply their own time source. [`SystemClock`] uses the `web-time`
//! crate, which maps to `performance.now()` on WASM and
//! `std::time::Instant` elsewhere.
//!
//! Durations are serialized as fractional seconds (`f64`), since
//! `std::time::Duration` does not implement serde traits.

use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use crate::pipeline::process_staged_with_diagnostics;

/// A monotonic time source.
pub trait Clock {
    /// Opaque point in time.
    type Instant;

    /// The current instant.
    fn now(&self) -> Self::Instant;

    /// Time elapsed since `since`.
    fn elapsed(&self, since: &Self::Instant) -> Duration;
}

/// [`Clock`] backed by [`web_time::Instant`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    type Instant = web_time::Instant;

    fn now(&self) -> web_time::Instant {
        web_time::Instant::now()
    }

    fn elapsed(&self, since: &web_time::Instant) -> Duration {
        since.elapsed()
    }
}

/// Serde support for `std::time::Duration` as fractional seconds.
mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs_f64().serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(|_| {
            serde::de::Error::custom(
                "duration seconds must be finite, non-negative, and representable as a Duration",
            )
        })
    }
}

/// Diagnostics collected from a single pipeline run.
///
/// Boundary stages are `None` when the config has no boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineDiagnostics {
    /// Attribute transforms applied to the input image.
    pub image_transform: StageDiagnostics,
    /// Initial boundary construction.
    pub boundary: Option<StageDiagnostics>,
    /// Snake refinement and band sampling.
    pub refine: Option<StageDiagnostics>,
    /// Transforms applied to the band.
    pub band_transform: Option<StageDiagnostics>,
    /// Lateral smoothing of the cost field.
    pub weight: StageDiagnostics,
    /// Forward sweep.
    pub forward_pick: StageDiagnostics,
    /// Backward sweep seeded at the forward end column.
    pub backward_pick: StageDiagnostics,
    /// Total wall-clock duration of the run (seconds).
    #[serde(with = "duration_serde")]
    pub total_duration: Duration,
    /// Summary across all stages.
    pub summary: PipelineSummary,
}

/// Diagnostics for a single pipeline stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageDiagnostics {
    /// Wall-clock duration of this stage (seconds).
    #[serde(with = "duration_serde")]
    pub duration: Duration,
    /// Stage-specific metrics.
    pub metrics: StageMetrics,
}

/// Stage-specific metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StageMetrics {
    /// Attribute transform chain.
    Transform {
        /// Mode names in application order.
        modes: Vec<String>,
        /// Output rows.
        rows: usize,
        /// Output columns.
        columns: usize,
        /// Smallest output value.
        min: f32,
        /// Largest output value.
        max: f32,
    },
    /// Initial boundary construction.
    Boundary {
        /// User control points.
        control_points: usize,
        /// Points after resampling.
        points: usize,
        /// Arc length of the resampled boundary.
        arc_length: f64,
        /// Whether the control points formed a closed curve.
        closed: bool,
    },
    /// Snake refinement.
    Refine {
        /// Passes performed.
        iterations: usize,
        /// Regrids performed.
        regrids: usize,
        /// Boundary points after refinement.
        points: usize,
        /// Mean per-point displacement.
        mean_displacement: f64,
        /// Largest per-point displacement.
        max_displacement: f64,
        /// Largest absolute turning angle per unit length.
        max_curvature: f64,
        /// Crossing segment pairs in the refined boundary.
        self_intersections: usize,
        /// Band rows (offsets) and columns (boundary points).
        band_shape: (usize, usize),
    },
    /// Lateral cost smoothing.
    Weight {
        /// Smoothing half-width.
        radius: usize,
        /// Mean smoothed cost.
        mean_cost: f64,
    },
    /// One dynamic-programming sweep.
    Pick {
        /// `"forward"` or `"backward"`.
        sweep: String,
        /// Seed column, if constrained.
        seed: Option<usize>,
        /// Step bound used.
        max_step: usize,
        /// Column of the path in its first row.
        start_column: usize,
        /// Column of the path in its last row.
        end_column: usize,
        /// Summed cost along the path.
        total_cost: f32,
        /// Largest column change between adjacent rows.
        max_jump: usize,
    },
}

/// High-level summary of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineSummary {
    /// Input image rows.
    pub image_rows: usize,
    /// Input image columns.
    pub image_columns: usize,
    /// Rows of the swept cost field (one path entry per row).
    pub picked_rows: usize,
    /// Columns of the swept cost field.
    pub picked_columns: usize,
    /// Cost of the final (backward) path.
    pub path_cost: f32,
}

impl PipelineDiagnostics {
    /// Format diagnostics as a human-readable report.
    #[must_use]
    pub fn report(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!("Pick Diagnostics Report\n{}", "=".repeat(60)));
        lines.push(format!(
            "Image: {}x{}  |  Swept grid: {}x{}",
            self.summary.image_rows,
            self.summary.image_columns,
            self.summary.picked_rows,
            self.summary.picked_columns,
        ));
        lines.push(format!(
            "Total duration: {:.3}ms",
            duration_ms(self.total_duration),
        ));
        lines.push(String::new());

        lines.push(format!(
            "{:<20} {:>10} {:>10}  {}",
            "Stage", "Duration", "% Total", "Details"
        ));
        lines.push("-".repeat(80));

        let total_ms = duration_ms(self.total_duration);
        for (name, diag) in self.stages() {
            let ms = duration_ms(diag.duration);
            let pct = if total_ms > 0.0 {
                ms / total_ms * 100.0
            } else {
                0.0
            };
            let details = format_metrics(&diag.metrics);
            lines.push(format!("{name:<20} {ms:>8.3}ms {pct:>9.1}%  {details}"));
        }

        lines.push(String::new());
        lines.push(format!("Path cost: {:.4}", self.summary.path_cost));

        lines.join("\n")
    }

    /// Executed stages in pipeline order, with display names.
    #[must_use]
    pub fn stages(&self) -> Vec<(&'static str, &StageDiagnostics)> {
        let mut stages = vec![("Image Transform", &self.image_transform)];
        if let Some(ref b) = self.boundary {
            stages.push(("Boundary", b));
        }
        if let Some(ref r) = self.refine {
            stages.push(("Refine", r));
        }
        if let Some(ref t) = self.band_transform {
            stages.push(("Band Transform", t));
        }
        stages.push(("Weight", &self.weight));
        stages.push(("Forward Pick", &self.forward_pick));
        stages.push(("Backward Pick", &self.backward_pick));
        stages
    }
}

fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

/// Compact one-line detail string for a stage.
fn format_metrics(metrics: &StageMetrics) -> String {
    match metrics {
        StageMetrics::Transform {
            modes,
            rows,
            columns,
            min,
            max,
        } => {
            let chain = if modes.is_empty() {
                "identity".to_owned()
            } else {
                modes.join(" -> ")
            };
            format!("{chain} {rows}x{columns} range=[{min:.3}, {max:.3}]")
        }
        StageMetrics::Boundary {
            control_points,
            points,
            arc_length,
            closed,
        } => {
            let kind = if *closed { "closed" } else { "open" };
            format!("{control_points} controls -> {points} pts, length={arc_length:.1} ({kind})")
        }
        StageMetrics::Refine {
            iterations,
            regrids,
            points,
            mean_displacement,
            max_displacement,
            max_curvature,
            self_intersections,
            band_shape,
        } => {
            format!(
                "{iterations} iters, {regrids} regrids, {points} pts, move mean={mean_displacement:.3} max={max_displacement:.3}, curv={max_curvature:.3}, crossings={self_intersections}, band={}x{}",
                band_shape.0, band_shape.1,
            )
        }
        StageMetrics::Weight { radius, mean_cost } => {
            format!("radius={radius} mean={mean_cost:.4}")
        }
        StageMetrics::Pick {
            sweep,
            seed,
            max_step,
            start_column,
            end_column,
            total_cost,
            max_jump,
        } => {
            let seed = seed.map_or_else(|| "free".to_owned(), |c| c.to_string());
            format!(
                "{sweep} seed={seed} max_step={max_step} {start_column}->{end_column} cost={total_cost:.4} max_jump={max_jump}",
            )
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn stage(ms: u64, metrics: StageMetrics) -> StageDiagnostics {
        StageDiagnostics {
            duration: Duration::from_millis(ms),
            metrics,
        }
    }

    fn pick(sweep: &str) -> StageMetrics {
        StageMetrics::Pick {
            sweep: sweep.to_owned(),
            seed: None,
            max_step: 2,
            start_column: 1,
            end_column: 3,
            total_cost: 0.5,
            max_jump: 1,
        }
    }

    fn sample(with_boundary: bool) -> PipelineDiagnostics {
        let boundary = with_boundary.then(|| {
            stage(
                1,
                StageMetrics::Boundary {
                    control_points: 3,
                    points: 20,
                    arc_length: 19.0,
                    closed: false,
                },
            )
        });
        PipelineDiagnostics {
            image_transform: stage(
                4,
                StageMetrics::Transform {
                    modes: vec!["envelope".to_owned()],
                    rows: 10,
                    columns: 12,
                    min: 0.0,
                    max: 1.0,
                },
            ),
            boundary,
            refine: None,
            band_transform: None,
            weight: stage(
                1,
                StageMetrics::Weight {
                    radius: 1,
                    mean_cost: 0.25,
                },
            ),
            forward_pick: stage(2, pick("forward")),
            backward_pick: stage(2, pick("backward")),
            total_duration: Duration::from_millis(10),
            summary: PipelineSummary {
                image_rows: 10,
                image_columns: 12,
                picked_rows: 10,
                picked_columns: 12,
                path_cost: 0.5,
            },
        }
    }

    #[test]
    fn duration_ms_converts_correctly() {
        let ms = duration_ms(Duration::from_millis(1234));
        assert!((ms - 1234.0).abs() < 0.01);
    }

    #[test]
    fn stages_skip_absent_boundary() {
        let names: Vec<&str> = sample(false).stages().iter().map(|(n, _)| *n).collect();
        assert_eq!(
            names,
            ["Image Transform", "Weight", "Forward Pick", "Backward Pick"]
        );
        assert_eq!(sample(true).stages().len(), 5);
    }

    #[test]
    fn report_lists_stages_and_percentages() {
        let report = sample(true).report();
        assert!(report.contains("Image: 10x12"));
        assert!(report.contains("Boundary"));
        assert!(report.contains("40.0%"));
        assert!(report.contains("envelope 10x12"));
        assert!(report.contains("forward seed=free"));
    }

    #[test]
    fn durations_serialize_as_seconds() {
        let json = serde_json::to_value(sample(false)).unwrap();
        let total = json["total_duration"].as_f64().unwrap();
        assert!((total - 0.01).abs() < 1e-12);
        let back: PipelineDiagnostics = serde_json::from_value(json).unwrap();
        assert!((back.total_duration.as_secs_f64() - 0.01).abs() < 1e-9);
    }

    #[test]
    fn negative_duration_is_rejected() {
        let mut json = serde_json::to_value(sample(false)).unwrap();
        json["total_duration"] = serde_json::json!(-1.0);
        assert!(serde_json::from_value::<PipelineDiagnostics>(json).is_err());
    }

    #[test]
    fn system_clock_is_monotonic() {
        let clock = SystemClock;
        let start = clock.now();
        let first = clock.elapsed(&start);
        let second = clock.elapsed(&start);
        assert!(second >= first);
    }
}
