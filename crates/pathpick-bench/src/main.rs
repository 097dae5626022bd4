//! pathpick-bench: CLI tool for picker parameter experimentation and diagnostics.
//!
//! Runs the picking pipeline on a PNG slice (or a synthetic dipping
//! reflector) with configurable parameters, printing per-stage
//! diagnostics. Useful for:
//!
//! - Tuning `max_step`, `radius`, and transform parameters
//! - Comparing free and seeded starts
//! - Trying boundary refinement on hand-placed control points
//! - Measuring per-stage durations
//!
//! # Usage
//!
//! ```text
//! cargo run --release --bin pathpick-bench -- [OPTIONS] [IMAGE_PATH]
//! ```

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use pathpick_pipeline::diagnostics::{PipelineDiagnostics, SystemClock};
use pathpick_pipeline::{
    BoundaryConfig, CostMode, Image2D, PickConfig, PickResult, RefineOptions, Seed,
};
use tracing_subscriber::EnvFilter;

/// Picker parameter experimentation and diagnostics for pathpick.
///
/// Picks a minimum-cost path through a 2-D slice and prints per-stage
/// timing and metrics.
#[derive(Parser)]
#[command(name = "pathpick-bench", version)]
struct Cli {
    /// Path to a PNG slice. Rows are samples, columns are traces.
    /// A synthetic dipping reflector is generated when omitted.
    image_path: Option<PathBuf>,

    /// Rows of the synthetic slice.
    #[arg(long, default_value_t = 200)]
    rows: usize,

    /// Columns of the synthetic slice.
    #[arg(long, default_value_t = 300)]
    columns: usize,

    /// Maximum column change between adjacent rows.
    #[arg(long, default_value_t = PickConfig::DEFAULT_MAX_STEP)]
    max_step: usize,

    /// Half-width of the lateral weight smoothing.
    #[arg(long, default_value_t = PickConfig::DEFAULT_RADIUS)]
    radius: usize,

    /// Start the forward sweep at this column instead of anywhere.
    #[arg(long)]
    seed: Option<usize>,

    /// Pick one row per image column (horizon layout).
    #[arg(long)]
    transpose: bool,

    /// Local amplitude smoothing length in samples; 0 skips the
    /// amplitude transform.
    #[arg(long, default_value_t = PickConfig::DEFAULT_AMPLITUDE_SIGMA)]
    amplitude_sigma: f32,

    /// Contrast exponent applied after normalizing.
    #[arg(long, default_value_t = PickConfig::DEFAULT_POWER)]
    power: f32,

    /// Keep high attribute values expensive (skip the complement).
    #[arg(long)]
    no_complement: bool,

    /// Boundary control-point rows, comma separated. Enables boundary
    /// refinement together with `--boundary-p2`.
    #[arg(long, value_delimiter = ',', requires = "boundary_p2")]
    boundary_p1: Vec<f64>,

    /// Boundary control-point columns, comma separated.
    #[arg(long, value_delimiter = ',', requires = "boundary_p1")]
    boundary_p2: Vec<f64>,

    /// Arc-length spacing of the initial boundary.
    #[arg(long, default_value_t = 1.0)]
    boundary_step: f64,

    /// Normal search radius and band half-width.
    #[arg(long, default_value_t = RefineOptions::DEFAULT_SEARCH_RADIUS)]
    search_radius: usize,

    /// Refinement passes.
    #[arg(long, default_value_t = RefineOptions::DEFAULT_ITERATIONS)]
    iterations: usize,

    /// Number of runs for averaging.
    #[arg(long, default_value_t = 1, value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..))]
    runs: usize,

    /// Output diagnostics as JSON instead of human-readable report.
    #[arg(long)]
    json: bool,

    /// Full pick config as a JSON string.
    ///
    /// When provided, all other pipeline parameter flags are ignored.
    /// The JSON must be a valid `PickConfig` serialization.
    #[arg(long)]
    config_json: Option<String>,

    /// Write the forward, backward, and boundary picks as JSON.
    #[arg(long)]
    picks_out: Option<PathBuf>,
}

/// Build a [`PickConfig`] from CLI arguments.
///
/// If `--config-json` is provided, the JSON is parsed directly and all
/// individual parameter flags are ignored. Otherwise, a config is
/// assembled from the individual flags.
fn config_from_cli(cli: &Cli) -> Result<PickConfig, String> {
    if let Some(ref json) = cli.config_json {
        return serde_json::from_str(json).map_err(|e| format!("Error parsing --config-json: {e}"));
    }

    let amplitude = (cli.amplitude_sigma > 0.0).then_some(CostMode::LocalAmplitude {
        sigma: cli.amplitude_sigma,
    });
    let normalize = CostMode::ComplementAndNormalize {
        power: cli.power,
        complement: !cli.no_complement,
    };
    let image_modes = amplitude.into_iter().chain([normalize]).collect();

    let boundary = if cli.boundary_p1.is_empty() {
        None
    } else {
        // The refinement attribute must stay high on the structure; the
        // complement is applied to the band instead.
        let attribute_modes = amplitude
            .into_iter()
            .chain([CostMode::ComplementAndNormalize {
                power: cli.power,
                complement: false,
            }])
            .collect();
        Some(BoundaryConfig {
            attribute_modes,
            refine: RefineOptions {
                search_radius: cli.search_radius,
                iterations: cli.iterations,
                ..RefineOptions::default()
            },
            ..BoundaryConfig::new(
                cli.boundary_step,
                cli.boundary_p1.clone(),
                cli.boundary_p2.clone(),
            )
        })
    };

    let seed = match (cli.seed, &boundary) {
        (Some(column), _) => Seed::Column(column),
        (None, Some(_)) => Seed::Column(cli.search_radius),
        (None, None) => Seed::Free,
    };

    Ok(PickConfig {
        image_modes,
        boundary,
        band_modes: vec![normalize],
        transpose: cli.transpose,
        max_step: cli.max_step,
        radius: cli.radius,
        seed,
    })
}

/// Decode a PNG into a luma slice scaled to `[0, 1]`.
fn load_slice(path: &Path) -> Result<Image2D, String> {
    let bytes =
        std::fs::read(path).map_err(|e| format!("Error reading {}: {e}", path.display()))?;
    let luma = image::load_from_memory(&bytes)
        .map_err(|e| format!("Error decoding {}: {e}", path.display()))?
        .to_luma8();
    let (width, height) = luma.dimensions();
    let data = luma.as_raw().iter().map(|&v| f32::from(v) / 255.0).collect();
    Image2D::new(height as usize, width as usize, data).map_err(|e| e.to_string())
}

/// A dipping Ricker reflector plus a weaker flat one.
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
fn synthetic_slice(rows: usize, columns: usize) -> Result<Image2D, String> {
    let ricker = |t: f64| {
        let a = (std::f64::consts::PI * 0.08 * t).powi(2);
        (1.0 - 2.0 * a) * (-a).exp()
    };
    let dip = 0.25 * rows as f64 / columns.max(1) as f64;
    Image2D::from_fn(rows, columns, |i1, i2| {
        let t = i1 as f64;
        let dipping = ricker(t - dip.mul_add(i2 as f64, rows as f64 / 3.0));
        let flat = 0.4 * ricker(t - 0.75 * rows as f64);
        let wobble = 0.05 * (0.37 * t + 0.11 * i2 as f64).sin();
        0.45f64.mul_add(dipping + flat + wobble, 0.5) as f32
    })
    .map_err(|e| e.to_string())
}

/// Serialize the picks for inspection in other tools.
fn picks_json(result: &PickResult) -> serde_json::Value {
    serde_json::json!({
        "forward": result.forward,
        "backward": result.backward,
        "path_cost": result.path().total_cost(&result.weights),
        "boundary": result.boundary.as_ref().map(|b| &b.picked),
    })
}

/// Write [`picks_json`] to `out`, returning the number of bytes written.
fn write_picks(out: &Path, result: &PickResult) -> Result<usize, String> {
    let json = picks_json(result).to_string();
    std::fs::write(out, &json)
        .map_err(|e| format!("Error writing picks to {}: {e}", out.display()))?;
    Ok(json.len())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();

    let config = match config_from_cli(&cli) {
        Ok(c) => c,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
    };

    let slice = match cli.image_path {
        Some(ref path) => load_slice(path),
        None => synthetic_slice(cli.rows, cli.columns),
    };
    let slice = match slice {
        Ok(s) => s,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
    };

    let source = cli
        .image_path
        .as_ref()
        .map_or_else(|| "synthetic".to_owned(), |p| p.display().to_string());
    tracing::info!(
        %source,
        rows = slice.n1(),
        columns = slice.n2(),
        runs = cli.runs,
        "loaded slice"
    );
    eprintln!("Config: {config:#?}");
    eprintln!();

    let mut all_diagnostics = Vec::with_capacity(cli.runs);

    for run in 0..cli.runs {
        if cli.runs > 1 {
            eprintln!("--- Run {}/{} ---", run + 1, cli.runs);
        }

        match pathpick_pipeline::diagnostics::process_staged_with_diagnostics(
            &slice,
            &config,
            &SystemClock,
        ) {
            Ok((result, diagnostics)) => {
                if cli.json {
                    match serde_json::to_string_pretty(&diagnostics) {
                        Ok(json) => println!("{json}"),
                        Err(e) => {
                            eprintln!("Error serializing diagnostics: {e}");
                            return ExitCode::FAILURE;
                        }
                    }
                } else {
                    println!("{}", diagnostics.report());
                }

                // Write picks on the first run only.
                if run == 0
                    && let Some(ref out) = cli.picks_out
                {
                    match write_picks(out, &result) {
                        Ok(bytes) => {
                            eprintln!("Picks written to {} ({bytes} bytes)", out.display());
                        }
                        Err(msg) => {
                            eprintln!("{msg}");
                            return ExitCode::FAILURE;
                        }
                    }
                }

                all_diagnostics.push(diagnostics);
            }
            Err(e) => {
                eprintln!("Pipeline error: {e}");
                return ExitCode::FAILURE;
            }
        }

        if cli.runs > 1 {
            eprintln!();
        }
    }

    if cli.runs > 1 {
        print_multi_run_summary(&all_diagnostics);
    }

    ExitCode::SUCCESS
}

/// Print aggregated statistics across multiple runs.
#[allow(clippy::cast_precision_loss)]
fn print_multi_run_summary(all_diagnostics: &[PipelineDiagnostics]) {
    if all_diagnostics.is_empty() {
        println!("Warning: no diagnostics to summarize");
        return;
    }

    println!();
    println!(
        "Summary ({} runs)\n{}",
        all_diagnostics.len(),
        "=".repeat(60),
    );

    let durations: Vec<f64> = all_diagnostics
        .iter()
        .map(|d| d.total_duration.as_secs_f64() * 1000.0)
        .collect();

    let min = durations.iter().copied().reduce(f64::min).unwrap_or(0.0);
    let max = durations.iter().copied().reduce(f64::max).unwrap_or(0.0);
    let mean = durations.iter().sum::<f64>() / durations.len() as f64;

    println!("Total duration: min={min:.3}ms  mean={mean:.3}ms  max={max:.3}ms");

    println!();
    println!("{:<20} {:>12}", "Stage", "Mean (ms)");
    println!("{}", "-".repeat(36));

    // Every run uses the same config, so the first run's stage list
    // names the stages of all of them.
    let names: Vec<&str> = all_diagnostics[0]
        .stages()
        .iter()
        .map(|(name, _)| *name)
        .collect();
    for (index, name) in names.iter().enumerate() {
        let stage_durations: Vec<f64> = all_diagnostics
            .iter()
            .filter_map(|d| d.stages().get(index).map(|(_, s)| s.duration))
            .map(|dur| dur.as_secs_f64() * 1000.0)
            .collect();

        if stage_durations.is_empty() {
            continue;
        }

        let stage_mean = stage_durations.iter().sum::<f64>() / stage_durations.len() as f64;
        println!("{name:<20} {stage_mean:>10.3}ms");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("pathpick-bench").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn defaults_match_library_config() {
        let config = config_from_cli(&parse(&[])).unwrap();
        assert_eq!(config, PickConfig::default());
    }

    #[test]
    fn boundary_flags_enable_refinement() {
        let cli = parse(&[
            "--boundary-p1",
            "10,12",
            "--boundary-p2",
            "0,40",
            "--search-radius",
            "5",
        ]);
        let config = config_from_cli(&cli).unwrap();
        let boundary = config.boundary.as_ref().unwrap();
        assert_eq!(boundary.p1, vec![10.0, 12.0]);
        assert_eq!(boundary.refine.search_radius, 5);
        assert_eq!(config.seed, Seed::Column(5));
        assert_eq!(boundary.attribute_modes, BoundaryConfig::default_attribute_modes());
        config.validate().unwrap();
    }

    #[test]
    fn picks_write_failure_is_reported() {
        let slice = synthetic_slice(20, 16).unwrap();
        let result = pathpick_pipeline::process(&slice, &PickConfig::default()).unwrap();
        let missing_dir = std::env::temp_dir()
            .join("pathpick-bench-missing-dir")
            .join("picks.json");
        let err = write_picks(&missing_dir, &result).unwrap_err();
        assert!(err.contains("Error writing picks"), "{err}");
    }

    #[test]
    fn boundary_flags_require_each_other() {
        let result = Cli::try_parse_from(["pathpick-bench", "--boundary-p1", "1,2"]);
        assert!(result.is_err());
    }

    #[test]
    fn config_json_overrides_flags() {
        let json = serde_json::to_string(&PickConfig {
            max_step: 9,
            ..PickConfig::default()
        })
        .unwrap();
        let cli = parse(&["--max-step", "1", "--config-json", &json]);
        assert_eq!(config_from_cli(&cli).unwrap().max_step, 9);
    }

    #[test]
    fn synthetic_slice_is_unit_range() {
        let slice = synthetic_slice(60, 80).unwrap();
        let (min, max) = slice.min_max();
        assert!(min >= 0.0 && max <= 1.0);
        assert_eq!(slice.shape(), (60, 80));
    }

    #[test]
    fn synthetic_slice_picks_end_to_end() {
        let slice = synthetic_slice(80, 60).unwrap();
        let config = PickConfig {
            transpose: true,
            ..PickConfig::default()
        };
        let result = pathpick_pipeline::process(&slice, &config).unwrap();
        assert_eq!(result.path().len(), 60);
        let json = picks_json(&result);
        assert!(json["boundary"].is_null());
        assert_eq!(json["backward"].as_array().unwrap().len(), 60);
    }
}
