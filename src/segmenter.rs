//! # Street Segmentation
//!
//! Splits raw street polylines into bounded-length [`StreetSegment`]s, the
//! atomic unit of coverage tracking.
//!
//! ## Algorithm
//! 1. Drop streets whose road class is excluded
//! 2. Drop invalid coordinates and repeated vertices; skip streets left with
//!    fewer than 2 points or zero length
//! 3. Streets no longer than `max_segment_length_m` (within
//!    [`LENGTH_EPSILON_M`]) become one segment, even when shorter than
//!    `min_segment_length_m`
//! 4. Longer streets are cut at `ceil(length / max) + 1` points evenly spaced by
//!    arc length; each piece keeps the street's interior vertices so it follows
//!    the street's shape
//! 5. Pieces shorter than `min_segment_length_m` are dropped and counted

use log::{debug, info, warn};

use crate::config::CoverageConfig;
use crate::error::CoverageError;
use crate::geo_utils::{compute_bounds, cumulative_lengths, polyline_length};
use crate::{Bounds, GpsPoint, SegmentId};

/// Length tolerance for split decisions. Haversine lengths of streets drawn
/// at a whole multiple of the maximum land a few micrometers either side.
pub const LENGTH_EPSILON_M: f64 = 1e-3;

/// A street as delivered by the street network loader.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RawStreet {
    pub id: u64,
    pub polyline: Vec<GpsPoint>,
    /// OSM-style highway class ("residential", "motorway", ...)
    pub road_class: String,
}

impl RawStreet {
    pub fn new(id: u64, polyline: Vec<GpsPoint>, road_class: impl Into<String>) -> Self {
        Self {
            id,
            polyline,
            road_class: road_class.into(),
        }
    }
}

/// A bounded-length portion of a street. Immutable once created.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StreetSegment {
    /// Dense id, equal to the segment's position in the segmentation output
    pub id: SegmentId,
    /// Id of the street this segment was cut from
    pub street_id: u64,
    /// At least 2 points
    pub points: Vec<GpsPoint>,
    /// Haversine length in meters
    pub length_m: f64,
    pub road_class: String,
}

impl StreetSegment {
    pub fn bounds(&self) -> Bounds {
        compute_bounds(&self.points)
    }
}

/// What happened to the input streets during segmentation.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SegmentationReport {
    pub streets_seen: usize,
    pub streets_excluded: usize,
    pub streets_skipped: usize,
    pub dropped_pieces: usize,
    /// Street length lost to dropped pieces, in meters
    pub dropped_length_m: f64,
    pub errors: Vec<CoverageError>,
}

/// Output of [`segment_streets`].
#[derive(Debug, Clone, Default)]
pub struct Segmentation {
    pub segments: Vec<StreetSegment>,
    pub report: SegmentationReport,
}

/// Split streets into segments.
///
/// Segment ids start at 0 and increase in input order. Never fails as a whole:
/// unusable streets are recorded in the report and skipped.
///
/// # Example
/// ```
/// use street_coverage::{CoverageConfig, GpsPoint, RawStreet, segment_streets};
///
/// // ~1.1 km north-south street
/// let street = RawStreet::new(
///     1,
///     vec![GpsPoint::new(42.380, -71.100), GpsPoint::new(42.390, -71.100)],
///     "residential",
/// );
/// let config = CoverageConfig { max_segment_length_m: 200.0, ..CoverageConfig::default() };
/// let segmentation = segment_streets(&[street], &config);
/// assert_eq!(segmentation.segments.len(), 6);
/// ```
pub fn segment_streets(streets: &[RawStreet], config: &CoverageConfig) -> Segmentation {
    let start = std::time::Instant::now();
    let mut segments: Vec<StreetSegment> = Vec::new();
    let mut report = SegmentationReport {
        streets_seen: streets.len(),
        ..SegmentationReport::default()
    };

    for street in streets {
        if config.is_excluded_class(&street.road_class) {
            report.streets_excluded += 1;
            continue;
        }

        let points = match clean_polyline(street) {
            Ok(points) => points,
            Err(err) => {
                debug!("[Segmenter] {}", err);
                report.streets_skipped += 1;
                report.errors.push(err);
                continue;
            }
        };

        let cumulative = cumulative_lengths(&points);
        let length = cumulative.last().copied().unwrap_or(0.0);

        let max = config.max_segment_length_m;
        if length <= max + LENGTH_EPSILON_M {
            push_segment(&mut segments, street, points, snap_to_max(length, max));
            continue;
        }

        let piece_count = ((length - LENGTH_EPSILON_M) / max).ceil().max(2.0) as usize;
        for k in 0..piece_count {
            let from = length * k as f64 / piece_count as f64;
            let to = if k + 1 == piece_count {
                length
            } else {
                length * (k + 1) as f64 / piece_count as f64
            };

            let piece = substring(&points, &cumulative, from, to);
            let piece_length = polyline_length(&piece);

            if piece_length < config.min_segment_length_m || piece_length <= 0.0 {
                report.dropped_pieces += 1;
                report.dropped_length_m += piece_length;
                continue;
            }
            push_segment(&mut segments, street, piece, snap_to_max(piece_length, max));
        }
    }

    if report.dropped_pieces > 0 {
        warn!(
            "[Segmenter] Dropped {} pieces shorter than {}m ({:.0}m of street length)",
            report.dropped_pieces, config.min_segment_length_m, report.dropped_length_m
        );
    }

    info!(
        "[Segmenter] {} streets -> {} segments ({} excluded, {} skipped) in {}ms",
        report.streets_seen,
        segments.len(),
        report.streets_excluded,
        report.streets_skipped,
        start.elapsed().as_millis()
    );

    Segmentation { segments, report }
}

/// Lengths within tolerance above the maximum are reported as the maximum.
fn snap_to_max(length: f64, max: f64) -> f64 {
    if length > max && length - max <= LENGTH_EPSILON_M {
        max
    } else {
        length
    }
}

fn push_segment(segments: &mut Vec<StreetSegment>, street: &RawStreet, points: Vec<GpsPoint>, length_m: f64) {
    segments.push(StreetSegment {
        id: segments.len() as SegmentId,
        street_id: street.id,
        points,
        length_m,
        road_class: street.road_class.clone(),
    });
}

/// Valid, de-duplicated street vertices with non-zero length.
fn clean_polyline(street: &RawStreet) -> Result<Vec<GpsPoint>, CoverageError> {
    let mut points: Vec<GpsPoint> = street
        .polyline
        .iter()
        .filter(|p| p.is_valid())
        .copied()
        .collect();
    points.dedup();

    if points.len() < 2 {
        return Err(CoverageError::invalid_street(
            street.id,
            format!("{} usable points, need at least 2", points.len()),
        ));
    }
    if polyline_length(&points) <= 0.0 {
        return Err(CoverageError::invalid_street(street.id, "zero length"));
    }
    Ok(points)
}

/// Point at arc length `target` along the polyline.
fn interpolate_at(points: &[GpsPoint], cumulative: &[f64], target: f64) -> GpsPoint {
    let j = cumulative.partition_point(|&d| d < target);
    if j == 0 {
        return points[0];
    }
    if j >= points.len() {
        return points[points.len() - 1];
    }

    let (d0, d1) = (cumulative[j - 1], cumulative[j]);
    let span = d1 - d0;
    if span <= 0.0 {
        return points[j];
    }

    let ratio = (target - d0) / span;
    let prev = &points[j - 1];
    let curr = &points[j];
    GpsPoint::new(
        prev.latitude + ratio * (curr.latitude - prev.latitude),
        prev.longitude + ratio * (curr.longitude - prev.longitude),
    )
}

/// Portion of the polyline between two arc lengths, keeping interior vertices.
fn substring(points: &[GpsPoint], cumulative: &[f64], from: f64, to: f64) -> Vec<GpsPoint> {
    let mut piece = vec![interpolate_at(points, cumulative, from)];
    piece.extend(
        points
            .iter()
            .zip(cumulative)
            .filter(|&(_, &d)| d > from && d < to)
            .map(|(p, _)| *p),
    );
    piece.push(interpolate_at(points, cumulative, to));
    piece
}
