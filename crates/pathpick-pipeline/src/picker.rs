//! Optimal path picking by dynamic programming over a cost field.
//!
//! A sweep accumulates, row by row, the cheapest cost of reaching every
//! cell from the seed row:
//!
//! ```text
//! T[r][c] = w[r][c] + min over d in [-max_step, max_step] of T[r-1][c-d]
//! ```
//!
//! Predecessors outside `[0, n2)` are skipped, never wrapped. Ties go to
//! the smallest `|d|`; between `+d` and `-d` the lower predecessor column
//! wins. The arg-min predecessor of every cell is remembered, so after
//! the sweep the path is traced back from the cheapest cell of the final
//! row (lowest column on ties). A forward sweep with a constrained seed
//! instead traces back from the seed column of the final row.
//!
//! Because every path obeying the step bound is a path through this
//! banded grid, the traced path has the globally minimal total cost.
//! Work is `O(n1 * n2 * max_step)`, memory `O(n1 * n2)`.
//!
//! [`PathPicker::backward_pick`] runs the same recurrence from the last
//! row up. Seeding it at the end column of a forward pick gives a
//! point-to-point pick between the forward seed row and that column.

use serde::{Deserialize, Serialize};

use crate::image::{CostField, Image2D, TravelTimeField};
use crate::types::{Path, PickError};

/// Where a sweep starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Seed {
    /// Every column of the first swept row is a valid start.
    #[default]
    Free,
    /// Only this column of the first swept row is a valid start; all
    /// other start cells get infinite travel time.
    Column(usize),
}

/// Sweep direction through the rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sweep {
    /// Row 0 first.
    Forward,
    /// Last row first.
    Backward,
}

impl Sweep {
    /// Row visited at sweep step `step` of `n1`.
    const fn row(self, step: usize, n1: usize) -> usize {
        match self {
            Self::Forward => step,
            Self::Backward => n1 - 1 - step,
        }
    }

    /// Short name used in diagnostics.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Forward => "forward",
            Self::Backward => "backward",
        }
    }
}

/// The dynamic-programming path picker.
///
/// Holds only its two parameters; every call reads caller-owned inputs
/// and writes only the caller-supplied travel-time buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathPicker {
    max_step: usize,
    radius: usize,
}

impl PathPicker {
    /// A picker allowing at most `max_step` columns of lateral movement
    /// per row, smoothing weights over `radius` columns on each side in
    /// [`apply_for_weight`](Self::apply_for_weight).
    #[must_use]
    pub const fn new(max_step: usize, radius: usize) -> Self {
        Self { max_step, radius }
    }

    /// Maximum column change between adjacent rows.
    #[must_use]
    pub const fn max_step(&self) -> usize {
        self.max_step
    }

    /// Lateral smoothing half-width.
    #[must_use]
    pub const fn radius(&self) -> usize {
        self.radius
    }

    /// Smooth weights laterally with a box of half-width `radius`.
    ///
    /// Averages each cell with its row neighbors (the window is clipped
    /// at the grid edges). Suppresses isolated cheap cells so picks
    /// prefer laterally continuous structure. `radius == 0` returns the
    /// weights unchanged.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn apply_for_weight(&self, weights: &CostField) -> CostField {
        if self.radius == 0 {
            return weights.clone();
        }
        let (n1, n2) = weights.shape();
        let mut out = weights.as_image().clone();
        let mut prefix = vec![0.0_f64; n2 + 1];
        for i1 in 0..n1 {
            for (i2, &w) in weights.row(i1).iter().enumerate() {
                prefix[i2 + 1] = prefix[i2] + f64::from(w);
            }
            for (i2, v) in out.row_mut(i1).iter_mut().enumerate() {
                let lo = i2.saturating_sub(self.radius);
                let hi = (i2 + self.radius + 1).min(n2);
                #[allow(clippy::cast_possible_truncation)]
                let mean = ((prefix[hi] - prefix[lo]) / (hi - lo) as f64) as f32;
                // A mean never exceeds the largest input, up to rounding.
                *v = mean.clamp(0.0, f32::MAX);
            }
        }
        CostField::from_valid(out)
    }

    /// Sweep from row 0 to the last row.
    ///
    /// Writes the accumulated travel times into `travel_time` and returns
    /// the cheapest path, one column per row. With [`Seed::Column`] the
    /// path both starts and ends in the seed column.
    ///
    /// # Errors
    ///
    /// Returns [`PickError::InvalidInput`] if `travel_time` does not match
    /// the shape of `weights` or the accumulated travel time could exceed
    /// `f32::MAX`, and [`PickError::OutOfBounds`] if the seed column is
    /// outside the grid.
    pub fn forward_pick(
        &self,
        seed: Seed,
        weights: &CostField,
        travel_time: &mut TravelTimeField,
    ) -> Result<Path, PickError> {
        self.pick(Sweep::Forward, seed, weights, travel_time)
    }

    /// Sweep from the last row to row 0.
    ///
    /// Identical to [`forward_pick`](Self::forward_pick) with the row
    /// order reversed; the seed applies to the last row and the path is
    /// traced back from the cheapest cell of row 0.
    ///
    /// # Errors
    ///
    /// Same as [`forward_pick`](Self::forward_pick).
    pub fn backward_pick(
        &self,
        seed: Seed,
        weights: &CostField,
        travel_time: &mut TravelTimeField,
    ) -> Result<Path, PickError> {
        self.pick(Sweep::Backward, seed, weights, travel_time)
    }

    /// Sweep in either direction.
    ///
    /// # Errors
    ///
    /// Same as [`forward_pick`](Self::forward_pick).
    pub fn pick(
        &self,
        sweep: Sweep,
        seed: Seed,
        weights: &CostField,
        travel_time: &mut TravelTimeField,
    ) -> Result<Path, PickError> {
        let (n1, n2) = weights.shape();
        if travel_time.shape() != (n1, n2) {
            return Err(PickError::InvalidInput(format!(
                "travel-time buffer is {}x{}, weights are {n1}x{n2}",
                travel_time.n1(),
                travel_time.n2(),
            )));
        }
        if let Seed::Column(column) = seed
            && column >= n2
        {
            return Err(PickError::OutOfBounds {
                column,
                columns: n2,
            });
        }

        let (_, heaviest) = weights.as_image().min_max();
        #[allow(clippy::cast_precision_loss)]
        let rows = n1 as f64;
        if f64::from(heaviest) * rows > f64::from(f32::MAX) {
            return Err(PickError::InvalidInput(format!(
                "weights up to {heaviest:e} over {n1} rows overflow the travel time"
            )));
        }

        let first = sweep.row(0, n1);
        match seed {
            Seed::Free => travel_time.row_mut(first).copy_from_slice(weights.row(first)),
            Seed::Column(column) => {
                let row = travel_time.row_mut(first);
                row.fill(f32::INFINITY);
                row[column] = weights.get(first, column);
            }
        }

        let mut from = vec![0_usize; n1 * n2];
        let mut prev = vec![0.0_f32; n2];
        for step in 1..n1 {
            let r = sweep.row(step, n1);
            prev.copy_from_slice(travel_time.row(sweep.row(step - 1, n1)));
            let w = weights.row(r);
            let from_row = &mut from[r * n2..(r + 1) * n2];
            for (c, t) in travel_time.row_mut(r).iter_mut().enumerate() {
                let (best_col, best_t) = self.best_predecessor(&prev, c);
                *t = w[c] + best_t;
                from_row[c] = best_col;
            }
        }

        let path = trace_back(sweep, seed, travel_time, &from);
        tracing::debug!(
            sweep = sweep.name(),
            rows = n1,
            columns = n2,
            max_step = self.max_step,
            end_column = path.last(),
            "picked path"
        );
        Ok(path)
    }

    /// Cheapest predecessor of column `c` in the previous swept row.
    ///
    /// Candidates are visited by increasing `|d|`, lower column first,
    /// and only a strictly smaller travel time replaces the current best.
    /// An unreachable (infinite) predecessor is kept only when every
    /// candidate is unreachable.
    fn best_predecessor(&self, prev: &[f32], c: usize) -> (usize, f32) {
        let mut best = (c, prev[c]);
        for d in 1..=self.max_step {
            if let Some(lower) = c.checked_sub(d)
                && prev[lower] < best.1
            {
                best = (lower, prev[lower]);
            }
            let upper = c + d;
            if upper < prev.len() && prev[upper] < best.1 {
                best = (upper, prev[upper]);
            }
        }
        best
    }
}

/// Follow stored predecessors from the end cell of the last swept row
/// back to the first swept row.
///
/// A constrained forward sweep ends at its seed column, which makes the
/// pick point-to-point; otherwise the end is the cheapest cell.
fn trace_back(sweep: Sweep, seed: Seed, travel_time: &Image2D, from: &[usize]) -> Path {
    let (n1, n2) = travel_time.shape();
    let last = sweep.row(n1 - 1, n1);
    let end = match (sweep, seed) {
        (Sweep::Forward, Seed::Column(column)) => column,
        _ => argmin(travel_time.row(last)),
    };

    let mut columns = vec![0_usize; n1];
    columns[last] = end;
    for step in (1..n1).rev() {
        let r = sweep.row(step, n1);
        columns[sweep.row(step - 1, n1)] = from[r * n2 + columns[r]];
    }
    Path::new(columns)
}

/// Index of the smallest value; the lowest index wins ties.
fn argmin(values: &[f32]) -> usize {
    let mut best = 0;
    for (i, &v) in values.iter().enumerate().skip(1) {
        if v < values[best] {
            best = i;
        }
    }
    best
}
