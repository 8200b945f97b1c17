//! Round-trip checker for geocodings built from a synthetic swath.
//!
//! Samples an analytic swath into tie-point grids (and optionally GCPs),
//! builds the geocoding, and reports forward and inverse errors as JSON.

use std::fs;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use rayon::prelude::*;
use serde::Serialize;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use geocoding::{
    Datum, GeoCoding, GeoCodingConfig, GeoPos, Gcp, GcpGeoCoding, GcpMethod, PixelPos,
    PixelRegion, Scene, SubsetDef, SwathModel, TiePointGeoCoding, TiePointGrid,
};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Variant {
    TiePoint,
    Gcp,
}

#[derive(Parser, Debug)]
#[command(name = "geocode-check")]
#[command(about = "Round-trip accuracy check for raster geocodings")]
struct Args {
    /// Geocoding variant to check
    #[arg(long, value_enum, default_value = "tie-point")]
    variant: Variant,

    /// Raster width in pixels
    #[arg(long, default_value_t = 1121)]
    width: usize,

    /// Raster height in pixels
    #[arg(long, default_value_t = 2241)]
    height: usize,

    /// Tie-point sub-sampling
    #[arg(long, default_value_t = 16)]
    sub_sampling: usize,

    /// Centre the swath on the antimeridian
    #[arg(long)]
    antimeridian: bool,

    /// Distance between checked pixels
    #[arg(long, default_value_t = 7)]
    step: usize,

    /// Also check a subset with this sub-sampling
    #[arg(long)]
    subset_step: Option<usize>,

    /// JSON file with geocoding numerics
    #[arg(short, long, env = "GEOCODING_CONFIG")]
    config: Option<String>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[derive(Debug, Default, Serialize)]
struct Stats {
    checked: usize,
    failed: usize,
    max_pixel_error: f64,
    mean_pixel_error: f64,
    max_model_error_deg: f64,
}

#[derive(Debug, Serialize)]
struct Report {
    variant: String,
    width: usize,
    height: usize,
    crossing_meridian_at_180: bool,
    full: Stats,
    #[serde(skip_serializing_if = "Option::is_none")]
    subset: Option<Stats>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = match &args.config {
        Some(path) => {
            let json = fs::read_to_string(path)
                .with_context(|| format!("reading geocoding config {}", path))?;
            GeoCodingConfig::from_json_str(&json)?
        }
        None => GeoCodingConfig::from_env(),
    };
    config.validate()?;

    check_raster_size(&args)?;
    let swath = if args.antimeridian {
        SwathModel::centred(args.width, args.height, -12.0, 179.5)
    } else {
        SwathModel::centred(args.width, args.height, 52.0, 8.0)
    };
    info!(
        variant = ?args.variant,
        width = swath.width,
        height = swath.height,
        antimeridian = args.antimeridian,
        "building geocoding"
    );

    let geo_coding: Box<dyn GeoCoding> = match args.variant {
        Variant::TiePoint => Box::new(build_tie_point(&swath, args.sub_sampling, config)?),
        Variant::Gcp => Box::new(build_gcp(&swath, config)?),
    };
    let scene = Scene::new(swath.width, swath.height).with_geo_coding(geo_coding);

    let full = check(&scene, args.step, |x, y| swath.geo_at(x, y))?;
    info!(checked = full.checked, failed = full.failed, "checked full raster");

    let subset = match args.subset_step {
        Some(step) => {
            let region = PixelRegion::new(
                swath.width / 4,
                swath.height / 4,
                swath.width / 2,
                swath.height / 2,
            );
            let def = SubsetDef::new()
                .with_region(region)
                .with_sub_sampling(step, step);
            let (w, h) = def.derived_size(swath.width, swath.height);
            let mut derived = Scene::new(w, h);
            anyhow::ensure!(
                scene.transfer_geo_coding_to(&mut derived, Some(&def)),
                "geocoding could not be transferred to subset {:?}",
                def
            );
            let stats = check(&derived, args.step, |x, y| {
                swath.geo_at(
                    region.x as f64 + x * step as f64,
                    region.y as f64 + y * step as f64,
                )
            })?;
            info!(checked = stats.checked, failed = stats.failed, "checked subset");
            Some(stats)
        }
        None => None,
    };

    let report = Report {
        variant: format!("{:?}", args.variant),
        width: swath.width,
        height: swath.height,
        crossing_meridian_at_180: scene
            .geo_coding()
            .map(|g| g.is_crossing_meridian_at_180())
            .unwrap_or(false),
        full,
        subset,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn check_raster_size(args: &Args) -> Result<()> {
    anyhow::ensure!(
        args.width > 0 && args.height > 0,
        "raster size must be positive, got {}x{}",
        args.width,
        args.height
    );
    Ok(())
}

fn build_tie_point(
    swath: &SwathModel,
    sub_sampling: usize,
    config: GeoCodingConfig,
) -> Result<TiePointGeoCoding> {
    anyhow::ensure!(sub_sampling > 0, "sub-sampling must be positive");
    let (lat_grid, lon_grid) = TiePointGrid::lat_lon_from(&swath.tie_points(sub_sampling))?;
    Ok(TiePointGeoCoding::with_config(
        lat_grid,
        lon_grid,
        Datum::wgs84(),
        config,
    )?)
}

fn build_gcp(swath: &SwathModel, config: GeoCodingConfig) -> Result<GcpGeoCoding> {
    let gcps = swath
        .gcps(6, 10)
        .into_iter()
        .map(|[x, y, lat, lon]| Gcp::new(PixelPos::new(x, y), GeoPos::new(lat, lon)))
        .collect();
    Ok(GcpGeoCoding::with_config(
        GcpMethod::Polynomial3,
        gcps,
        swath.width,
        swath.height,
        Datum::wgs84(),
        None,
        config,
    )?)
}

/// Forward/inverse round trip over a lattice of pixel centres.
fn check<F>(scene: &Scene, step: usize, model: F) -> Result<Stats>
where
    F: Fn(f64, f64) -> (f64, f64) + Sync,
{
    let geo_coding = scene.geo_coding().context("scene has no geocoding")?;
    let step = step.max(1);
    let pixels: Vec<(f64, f64)> = (0..scene.height())
        .step_by(step)
        .flat_map(|y| {
            (0..scene.width())
                .step_by(step)
                .map(move |x| (x as f64 + 0.5, y as f64 + 0.5))
        })
        .collect();

    let errors: Vec<Option<(f64, f64)>> = pixels
        .par_iter()
        .map(|&(x, y)| {
            let geo = geo_coding.get_geo_pos(PixelPos::new(x, y));
            let back = geo_coding.get_pixel_pos(geo);
            if !back.is_valid() {
                return None;
            }
            let (lat, lon) = model(x, y);
            let dlon = (geo.lon - lon + 540.0).rem_euclid(360.0) - 180.0;
            let model_error = (geo.lat - lat).abs().max(dlon.abs());
            Some((((back.x - x).powi(2) + (back.y - y).powi(2)).sqrt(), model_error))
        })
        .collect();

    let mut stats = Stats {
        checked: errors.len(),
        ..Stats::default()
    };
    let mut sum = 0.0;
    for error in &errors {
        match error {
            Some((pixel_error, model_error)) => {
                sum += pixel_error;
                stats.max_pixel_error = stats.max_pixel_error.max(*pixel_error);
                stats.max_model_error_deg = stats.max_model_error_deg.max(*model_error);
            }
            None => stats.failed += 1,
        }
    }
    let ok = stats.checked - stats.failed;
    if ok > 0 {
        stats.mean_pixel_error = sum / ok as f64;
    }
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &[&str]) -> Args {
        let mut argv = vec!["geocode-check"];
        argv.extend_from_slice(extra);
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_empty_raster_is_rejected() {
        assert!(check_raster_size(&parse(&[])).is_ok());
        for extra in [["--width", "0"], ["--height", "0"]] {
            let err = check_raster_size(&parse(&extra)).unwrap_err();
            assert!(err.to_string().contains("raster size must be positive"));
        }
    }

    #[test]
    fn test_builders_sample_the_shared_swath() {
        let swath = SwathModel::centred(129, 257, 52.0, 8.0);
        let config = GeoCodingConfig::default();

        let tie_point = build_tie_point(&swath, 16, config).unwrap();
        assert_eq!(tie_point.lat_grid().grid_width(), 9);
        assert_eq!(tie_point.lat_grid().grid_height(), 17);
        let gcp = build_gcp(&swath, config).unwrap();
        assert_eq!(gcp.gcps().len(), 60);

        let stats = check(
            &Scene::new(swath.width, swath.height).with_geo_coding(Box::new(tie_point)),
            16,
            |x, y| swath.geo_at(x, y),
        )
        .unwrap();
        assert_eq!(stats.failed, 0);
        assert!(stats.max_pixel_error < 1e-2);
        assert!(stats.max_model_error_deg < 1e-1);
    }
}
