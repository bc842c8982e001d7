use std::fs::File;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Parser;
use log::info;
use serde_json::json;

use trackside::finder::{PoiFinder, PoiFinderConfig};
use trackside::opening_hours::OpenState;
use trackside::poi::{PoiCategory, PoiStats};
use trackside::track_loader;

/// Finds points of interest along a GPX route.
#[derive(Parser, Debug)]
#[command(name = "trackside", version, about)]
struct Args {
    /// GPX file containing the route
    gpx: PathBuf,

    /// Maximum detour distance from the route, in meters
    #[arg(long, default_value_t = 500, value_parser = clap::value_parser!(u32).range(10..=5000))]
    max_detour: u32,

    /// Comma-separated POI categories (bakery, cafe, water, toilets, hotel)
    #[arg(long, default_value = "bakery", value_delimiter = ',')]
    categories: Vec<PoiCategory>,

    /// Only report POIs whose schedule says they are open right now
    #[arg(long)]
    open_only: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .format_target(false)
        .format_timestamp(None)
        .target(env_logger::Target::Stderr)
        .init();

    let args = Args::parse();

    let file =
        File::open(&args.gpx).with_context(|| format!("cannot open {}", args.gpx.display()))?;
    let track = track_loader::read_track(file)?;
    if track.is_empty() {
        bail!(
            "no route data: {} contains no track or route points",
            args.gpx.display()
        );
    }
    info!(
        "Loaded {} track points from {}",
        track.len(),
        args.gpx.display()
    );

    let finder = PoiFinder::new(PoiFinderConfig::default());
    let mut pois = finder
        .find_along_route(&track, args.max_detour as f64, &args.categories)
        .await?;

    if args.open_only {
        // The evaluator leaves the meaning of Unknown to callers; this
        // one treats it as closed.
        pois.retain(|poi| poi.open_now == OpenState::Open);
    }

    let stats = PoiStats::from_pois(&pois);
    info!(
        "Found {} POIs ({} bakeries, {} cafes, {} water points, {} toilets, {} hotels)",
        stats.total, stats.bakeries, stats.cafes, stats.water_points, stats.toilets, stats.hotels
    );

    let report = json!({
        "track": track,
        "pois": pois,
        "stats": stats,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}
