//! Coverage of a synthetic street grid by a handful of runs and rides.
//!
//! Run with: RUST_LOG=info cargo run --example city_coverage --features parallel

use std::sync::atomic::AtomicBool;

use street_coverage::{ActivityTrack, CompletionPolicy, CoverageConfig, CoverageEngine, GpsPoint, RawStreet, TrackPoint};

// Somerville, MA
const ORIGIN: GpsPoint = GpsPoint {
    latitude: 42.3876,
    longitude: -71.0995,
};

/// Roughly 1 degree of latitude in meters.
const METERS_PER_DEG_LAT: f64 = 111_195.0;

fn offset(north_m: f64, east_m: f64) -> GpsPoint {
    let meters_per_deg_lng = METERS_PER_DEG_LAT * ORIGIN.latitude.to_radians().cos();
    GpsPoint::new(
        ORIGIN.latitude + north_m / METERS_PER_DEG_LAT,
        ORIGIN.longitude + east_m / meters_per_deg_lng,
    )
}

/// 8x8 blocks of 120m, with a motorway along the southern edge.
fn city() -> Vec<RawStreet> {
    let mut streets = Vec::new();
    let size = 8.0 * 120.0;
    for i in 0..=8 {
        let d = i as f64 * 120.0;
        let class = if i % 4 == 0 { "secondary" } else { "residential" };
        streets.push(RawStreet::new(streets.len() as u64, vec![offset(d, 0.0), offset(d, size)], class));
        streets.push(RawStreet::new(streets.len() as u64, vec![offset(0.0, d), offset(size, d)], class));
    }
    streets.push(RawStreet::new(
        streets.len() as u64,
        vec![offset(-60.0, -200.0), offset(-60.0, size + 200.0)],
        "motorway",
    ));
    streets
}

/// Tracks snaking through the grid with a few meters of jitter.
fn activities() -> Vec<ActivityTrack> {
    let mut tracks = Vec::new();
    for k in 0..6 {
        let row = (k as f64 + 1.0) * 120.0;
        let mut points = Vec::new();
        for step in 0..=96 {
            let east = step as f64 * 10.0;
            let jitter = ((step * 7 + k * 3) % 11) as f64 - 5.0;
            points.push(
                TrackPoint::from(offset(row + jitter, east))
                    .with_timestamp(1_700_000_000 + step as i64 * 4)
                    .with_accuracy(4.0 + (step % 5) as f64),
            );
        }
        let source = if k % 2 == 0 { "Run" } else { "Ride" };
        tracks.push(ActivityTrack::new(format!("activity-{}", k), points, source));
    }
    // A watch left on a bench
    tracks.push(ActivityTrack::from_points("stationary", &[offset(240.0, 240.0); 5], "Walk"));
    tracks
}

fn main() {
    pretty_env_logger::init();

    let streets = city();
    let tracks = activities();

    for (name, config) in [
        ("lenient", CoverageConfig::lenient()),
        ("strict", CoverageConfig::strict()),
        (
            "union",
            CoverageConfig {
                completion_policy: CompletionPolicy::UnionOfSpans,
                ..CoverageConfig::strict()
            },
        ),
    ] {
        let mut engine = match CoverageEngine::new(&streets, config) {
            Ok(engine) => engine,
            Err(e) => {
                eprintln!("{}: {}", name, e);
                continue;
            }
        };
        engine.process_tracks_cancellable(&tracks, &AtomicBool::new(false));
        let report = engine.report();
        let summary = &report.summary;

        println!("== {} ==", name);
        println!(
            "  streets: {}  segments: {}  completed: {} ({:.1}%)",
            summary.total_streets, summary.total_segments, summary.completed_segments, summary.coverage_percentage
        );
        println!(
            "  length: {:.0}m of {:.0}m ({:.1}%)",
            summary.completed_length_m, summary.total_length_m, summary.length_coverage_percentage
        );
        for class in &summary.road_classes {
            println!(
                "  {:<12} {:>4}/{:<4} {:.1}%",
                class.road_class, class.completed, class.segments, class.percentage
            );
        }
        println!(
            "  tracks: {} matched, {} inert, {} filtered; {} streets excluded",
            report.stats.tracks_processed,
            report.stats.tracks_inert,
            report.stats.tracks_filtered,
            report.stats.segmentation.streets_excluded
        );
    }
}
