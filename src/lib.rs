//! # Street Coverage
//!
//! Street segmentation and GPS coverage matching for city street networks.
//!
//! This library provides:
//! - Segmentation of street polylines into bounded-length segments
//! - Buffered matching of noisy GPS tracks against an R-tree of segments
//! - Monotonic per-segment completion from accumulated observations
//! - Run summaries with totals, percentages and a per-road-class breakdown
//!
//! ## Features
//!
//! - **`parallel`** - Match tracks in parallel with rayon
//! - **`serde`** - Serialize/deserialize configuration and reports
//! - **`full`** - Enable all features
//!
//! ## Quick Start
//!
//! ```rust
//! use street_coverage::{run_coverage, ActivityTrack, CoverageConfig, GpsPoint, RawStreet};
//!
//! // A ~330m east-west street
//! let streets = vec![RawStreet::new(
//!     1,
//!     vec![GpsPoint::new(42.3876, -71.1000), GpsPoint::new(42.3876, -71.0960)],
//!     "residential",
//! )];
//!
//! // A run along the first half of it
//! let tracks = vec![ActivityTrack::from_points(
//!     "run-1",
//!     &[GpsPoint::new(42.3877, -71.1000), GpsPoint::new(42.3877, -71.0980)],
//!     "Run",
//! )];
//!
//! let report = run_coverage(&streets, &tracks, CoverageConfig::default()).unwrap();
//! println!(
//!     "{}/{} segments completed",
//!     report.summary.completed_segments, report.summary.total_segments
//! );
//! ```

pub mod aggregator;
pub mod config;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod geo_utils;
pub mod matcher;
pub mod segmenter;
pub mod spatial_index;

pub use aggregator::{segment_records, summarize, CoverageSummary, RoadClassCoverage, SegmentRecord};
pub use config::{CompletionPolicy, CoverageConfig};
pub use engine::{CoverageEngine, CoverageReport, RunStats};
pub use error::{CoverageError, ErrorKind, Result};
pub use evaluator::{CompletionEvaluator, SegmentCoverageState};
pub use geo_utils::LocalProjection;
pub use matcher::{ActivityTrack, CoverageMatcher, CoverageObservation, Span, TrackPoint};
pub use segmenter::{segment_streets, RawStreet, Segmentation, SegmentationReport, StreetSegment};
pub use spatial_index::SegmentIndex;

/// Dense segment identifier, assigned 0, 1, 2, ... during segmentation.
pub type SegmentId = u32;

// ============================================================================
// Core Types
// ============================================================================

/// A GPS coordinate with latitude and longitude.
///
/// # Example
/// ```
/// use street_coverage::GpsPoint;
/// let point = GpsPoint::new(42.3876, -71.0995); // Somerville, MA
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GpsPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GpsPoint {
    /// Create a new GPS point.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    /// Check if the point has valid coordinates.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

/// Latitude/longitude bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Bounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl Bounds {
    /// Create bounds from GPS points. `None` for empty input.
    pub fn from_points(points: &[GpsPoint]) -> Option<Self> {
        if points.is_empty() {
            return None;
        }
        Some(geo_utils::compute_bounds(points))
    }

    /// Smallest bounds containing both.
    pub fn union(&self, other: &Bounds) -> Bounds {
        Bounds {
            min_lat: self.min_lat.min(other.min_lat),
            max_lat: self.max_lat.max(other.max_lat),
            min_lng: self.min_lng.min(other.min_lng),
            max_lng: self.max_lng.max(other.max_lng),
        }
    }

    /// Get the center point of the bounds.
    pub fn center(&self) -> GpsPoint {
        GpsPoint::new(
            (self.min_lat + self.max_lat) / 2.0,
            (self.min_lng + self.max_lng) / 2.0,
        )
    }
}

// ============================================================================
// One-shot Run
// ============================================================================

/// Segment `streets`, match every track and report the result.
///
/// Shorthand for [`CoverageEngine::new`], [`CoverageEngine::process_tracks`]
/// and [`CoverageEngine::report`].
pub fn run_coverage(streets: &[RawStreet], tracks: &[ActivityTrack], config: CoverageConfig) -> Result<CoverageReport> {
    let mut engine = CoverageEngine::new(streets, config)?;
    engine.process_tracks(tracks);
    Ok(engine.report())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gps_point_validation() {
        assert!(GpsPoint::new(51.5074, -0.1278).is_valid());
        assert!(!GpsPoint::new(91.0, 0.0).is_valid());
        assert!(!GpsPoint::new(0.0, 181.0).is_valid());
        assert!(!GpsPoint::new(f64::NAN, 0.0).is_valid());
    }

    #[test]
    fn test_bounds() {
        assert!(Bounds::from_points(&[]).is_none());

        let a = Bounds::from_points(&[GpsPoint::new(42.0, -71.0), GpsPoint::new(42.2, -71.2)]).unwrap();
        let b = Bounds::from_points(&[GpsPoint::new(42.4, -70.8)]).unwrap();
        let merged = a.union(&b);
        assert_eq!(merged.min_lat, 42.0);
        assert_eq!(merged.max_lat, 42.4);
        assert_eq!(merged.min_lng, -71.2);
        assert_eq!(merged.max_lng, -70.8);

        let center = merged.center();
        assert!((center.latitude - 42.2).abs() < 1e-12);
        assert!((center.longitude - -71.0).abs() < 1e-12);
    }

    #[test]
    fn test_run_coverage() {
        let streets = vec![
            RawStreet::new(
                1,
                vec![GpsPoint::new(42.3876, -71.1000), GpsPoint::new(42.3884, -71.1000)],
                "residential",
            ),
            RawStreet::new(
                2,
                vec![GpsPoint::new(42.3876, -71.0900), GpsPoint::new(42.3884, -71.0900)],
                "residential",
            ),
        ];
        let tracks = vec![ActivityTrack::from_points(
            "run-1",
            &[GpsPoint::new(42.3875, -71.1000), GpsPoint::new(42.3885, -71.1000)],
            "Run",
        )];

        let report = run_coverage(&streets, &tracks, CoverageConfig::default()).unwrap();
        assert_eq!(report.summary.total_streets, 2);
        assert_eq!(report.summary.total_segments, 2);
        assert_eq!(report.summary.completed_segments, 1);
        assert!((report.summary.coverage_percentage - 50.0).abs() < 1e-9);
        assert_eq!(report.stats.tracks_processed, 1);
    }
}
