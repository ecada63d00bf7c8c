//! # Coverage Matching
//!
//! Measures how much of each nearby street segment a GPS track covers.
//!
//! ## Algorithm
//! 1. Clean the track (invalid coordinates, poor accuracy, repeated points);
//!    fewer than 2 distinct points means the track is inert
//! 2. Project it and buffer it by `buffer_distance_m`. The buffer of a polyline
//!    with round caps and joins is exactly the union of one capsule per edge
//!    (disk ∪ rectangle ∪ disk), so the buffer is kept as its edges in an R-tree
//! 3. Query the segment index with the buffer's bounding box
//! 4. For every candidate, intersect each segment edge with the nearby
//!    capsules. A capsule is convex, so each intersection is one parameter
//!    interval; intervals are mapped to arc length and merged
//! 5. `ratio = covered length / segment length`, clamped to [0, 1]; ratios at or
//!    below `min_coverage_threshold` are discarded
//!
//! Matching a (track, segment) pair is a pure function of the two geometries
//! and the configuration, so results are deterministic and workers can run in
//! parallel without shared state.

use geo::Coord;
use rstar::{RTree, RTreeObject, AABB};

use crate::config::CoverageConfig;
use crate::error::{CoverageError, Result};
use crate::geo_utils::LocalProjection;
use crate::spatial_index::{IndexedSegment, SegmentIndex};
use crate::{GpsPoint, SegmentId};

// =============================================================================
// Types
// =============================================================================

/// A recorded GPS fix.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TrackPoint {
    pub latitude: f64,
    pub longitude: f64,
    /// Unix timestamp in seconds
    pub timestamp: Option<i64>,
    /// Reported horizontal accuracy in meters
    pub accuracy_m: Option<f64>,
}

impl TrackPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            timestamp: None,
            accuracy_m: None,
        }
    }

    pub fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn with_accuracy(mut self, accuracy_m: f64) -> Self {
        self.accuracy_m = Some(accuracy_m);
        self
    }

    pub fn position(&self) -> GpsPoint {
        GpsPoint::new(self.latitude, self.longitude)
    }
}

impl From<GpsPoint> for TrackPoint {
    fn from(p: GpsPoint) -> Self {
        TrackPoint::new(p.latitude, p.longitude)
    }
}

/// A recorded activity as delivered by activity ingestion.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ActivityTrack {
    pub id: String,
    pub points: Vec<TrackPoint>,
    /// Where the track came from, e.g. the activity type ("Run", "Ride")
    pub source_name: String,
}

impl ActivityTrack {
    pub fn new(id: impl Into<String>, points: Vec<TrackPoint>, source_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            points,
            source_name: source_name.into(),
        }
    }

    /// Build a track from bare coordinates.
    pub fn from_points(id: impl Into<String>, points: &[GpsPoint], source_name: impl Into<String>) -> Self {
        Self::new(id, points.iter().map(|&p| TrackPoint::from(p)).collect(), source_name)
    }

    /// Tracks with fewer than 2 points contribute nothing.
    pub fn is_inert(&self) -> bool {
        self.points.len() < 2
    }
}

/// A covered stretch of a segment, as fractions of its length.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Span {
    pub start: f64,
    pub end: f64,
}

impl Span {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> f64 {
        (self.end - self.start).max(0.0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() <= 0.0
    }
}

/// Fraction of one segment covered by one buffered track.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CoverageObservation {
    pub segment_id: SegmentId,
    pub track_id: String,
    /// In [0, 1]
    pub ratio: f64,
    /// Merged, sorted covered spans
    pub spans: Vec<Span>,
}

// =============================================================================
// Span Helpers
// =============================================================================

/// Sort and merge overlapping or touching spans.
pub fn merge_spans(mut spans: Vec<Span>) -> Vec<Span> {
    spans.retain(|s| s.start.is_finite() && s.end.is_finite() && s.end >= s.start);
    spans.sort_by(|a, b| a.start.total_cmp(&b.start));

    let mut merged: Vec<Span> = Vec::with_capacity(spans.len());
    for span in spans {
        match merged.last_mut() {
            Some(last) if span.start <= last.end => last.end = last.end.max(span.end),
            _ => merged.push(span),
        }
    }
    merged
}

/// Total length of spans, assumed merged.
pub fn spans_length(spans: &[Span]) -> f64 {
    spans.iter().map(Span::len).sum()
}

// =============================================================================
// Buffered Track
// =============================================================================

/// One projected track edge; its capsule is the edge buffered by the radius.
#[derive(Debug, Clone, Copy)]
struct TrackEdge {
    a: Coord<f64>,
    b: Coord<f64>,
}

impl RTreeObject for TrackEdge {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_corners([self.a.x, self.a.y], [self.b.x, self.b.y])
    }
}

/// A projected track with its buffer radius.
#[derive(Debug)]
pub struct BufferedTrack {
    pub track_id: String,
    radius: f64,
    edges: RTree<TrackEdge>,
    envelope: AABB<[f64; 2]>,
}

impl BufferedTrack {
    /// Buffer a track. Fails for tracks that cannot form a line.
    pub fn new(track: &ActivityTrack, projection: &LocalProjection, config: &CoverageConfig) -> Result<Self> {
        if track.is_inert() {
            return Err(CoverageError::invalid_track(&track.id, "fewer than 2 points"));
        }

        let mut coords: Vec<Coord<f64>> = track
            .points
            .iter()
            .filter(|p| p.position().is_valid())
            .filter(|p| match (config.max_point_accuracy_m, p.accuracy_m) {
                (Some(max), Some(accuracy)) => accuracy <= max,
                _ => true,
            })
            .map(|p| projection.project(&p.position()))
            .collect();
        coords.dedup();

        if coords.len() < 2 {
            return Err(CoverageError::invalid_track(
                &track.id,
                "fewer than 2 distinct usable points (zero-length buffer)",
            ));
        }

        let radius = config.buffer_distance_m;
        let edges: Vec<TrackEdge> = coords.windows(2).map(|w| TrackEdge { a: w[0], b: w[1] }).collect();

        let (mut min_x, mut min_y) = (f64::MAX, f64::MAX);
        let (mut max_x, mut max_y) = (f64::MIN, f64::MIN);
        for c in &coords {
            min_x = min_x.min(c.x);
            min_y = min_y.min(c.y);
            max_x = max_x.max(c.x);
            max_y = max_y.max(c.y);
        }
        let envelope = AABB::from_corners([min_x - radius, min_y - radius], [max_x + radius, max_y + radius]);

        Ok(Self {
            track_id: track.id.clone(),
            radius,
            edges: RTree::bulk_load(edges),
            envelope,
        })
    }

    /// Bounding box of the buffer.
    pub fn envelope(&self) -> AABB<[f64; 2]> {
        self.envelope
    }

    /// Covered spans of a segment, merged and normalized by its length.
    pub fn covered_spans(&self, segment: &IndexedSegment) -> Vec<Span> {
        if segment.length <= 0.0 || segment.coords.len() < 2 {
            return Vec::new();
        }

        let r = self.radius;
        let mut arcs: Vec<Span> = Vec::new();

        for k in 0..segment.coords.len() - 1 {
            let p0 = segment.coords[k];
            let p1 = segment.coords[k + 1];
            let edge_length = segment.cumulative[k + 1] - segment.cumulative[k];
            if edge_length <= 0.0 {
                continue;
            }

            let query = AABB::from_corners(
                [p0.x.min(p1.x) - r, p0.y.min(p1.y) - r],
                [p0.x.max(p1.x) + r, p0.y.max(p1.y) + r],
            );
            let d = p1 - p0;
            let offset = segment.cumulative[k];

            for edge in self.edges.locate_in_envelope_intersecting(&query) {
                if let Some((t0, t1)) = capsule_interval(p0, d, edge.a, edge.b, r) {
                    arcs.push(Span::new(offset + t0 * edge_length, offset + t1 * edge_length));
                }
            }
        }

        merge_spans(arcs)
            .into_iter()
            .map(|s| {
                Span::new(
                    (s.start / segment.length).clamp(0.0, 1.0),
                    (s.end / segment.length).clamp(0.0, 1.0),
                )
            })
            .filter(|s| !s.is_empty())
            .collect()
    }

    /// Fraction of the segment inside the buffer, in [0, 1].
    pub fn coverage_ratio(&self, segment: &IndexedSegment) -> f64 {
        spans_length(&self.covered_spans(segment)).clamp(0.0, 1.0)
    }
}

// =============================================================================
// Capsule Intersection
// =============================================================================

#[inline]
fn dot(a: Coord<f64>, b: Coord<f64>) -> f64 {
    a.x * b.x + a.y * b.y
}

/// Clip `[t0, t1]` to `[0, 1]`.
#[inline]
fn clip_unit(t0: f64, t1: f64) -> Option<(f64, f64)> {
    let start = t0.max(0.0);
    let end = t1.min(1.0);
    (start <= end).then_some((start, end))
}

/// Parameters t where `alpha + beta * t` lies within `[lo, hi]`.
fn linear_range(alpha: f64, beta: f64, lo: f64, hi: f64) -> Option<(f64, f64)> {
    if beta == 0.0 {
        return (lo..=hi).contains(&alpha).then_some((f64::NEG_INFINITY, f64::INFINITY));
    }
    let t1 = (lo - alpha) / beta;
    let t2 = (hi - alpha) / beta;
    Some((t1.min(t2), t1.max(t2)))
}

/// Parameters in [0, 1] where `p0 + t*d` lies within `r` of `center`.
fn disk_interval(p0: Coord<f64>, d: Coord<f64>, center: Coord<f64>, r: f64) -> Option<(f64, f64)> {
    let f = p0 - center;
    let qa = dot(d, d);
    let qc = dot(f, f) - r * r;
    if qa <= 0.0 {
        return (qc <= 0.0).then_some((0.0, 1.0));
    }
    let qb = 2.0 * dot(f, d);
    let discriminant = qb * qb - 4.0 * qa * qc;
    if discriminant < 0.0 {
        return None;
    }
    let root = discriminant.sqrt();
    clip_unit((-qb - root) / (2.0 * qa), (-qb + root) / (2.0 * qa))
}

/// Parameters in [0, 1] where `p0 + t*d` lies in the rectangle swept by
/// edge `a`-`b` offset by `r` on both sides.
fn slab_interval(p0: Coord<f64>, d: Coord<f64>, a: Coord<f64>, b: Coord<f64>, r: f64) -> Option<(f64, f64)> {
    let axis = b - a;
    let length = axis.x.hypot(axis.y);
    if length <= 0.0 {
        return None;
    }
    let u = Coord { x: axis.x / length, y: axis.y / length };
    let n = Coord { x: -u.y, y: u.x };
    let rel = p0 - a;

    let (along_lo, along_hi) = linear_range(dot(rel, u), dot(d, u), 0.0, length)?;
    let (perp_lo, perp_hi) = linear_range(dot(rel, n), dot(d, n), -r, r)?;
    clip_unit(along_lo.max(perp_lo), along_hi.min(perp_hi))
}

/// Parameters in [0, 1] where `p0 + t*d` lies in the capsule around `a`-`b`.
///
/// The capsule is convex, so the union of the disk and rectangle pieces is a
/// single interval.
fn capsule_interval(p0: Coord<f64>, d: Coord<f64>, a: Coord<f64>, b: Coord<f64>, r: f64) -> Option<(f64, f64)> {
    let mut lo = f64::INFINITY;
    let mut hi = f64::NEG_INFINITY;
    for (s, e) in [
        disk_interval(p0, d, a, r),
        disk_interval(p0, d, b, r),
        slab_interval(p0, d, a, b, r),
    ]
    .into_iter()
    .flatten()
    {
        lo = lo.min(s);
        hi = hi.max(e);
    }
    (lo <= hi).then_some((lo, hi))
}

// =============================================================================
// Matcher
// =============================================================================

/// Matches tracks against an indexed street network.
#[derive(Debug, Clone, Copy)]
pub struct CoverageMatcher<'a> {
    index: &'a SegmentIndex,
    projection: LocalProjection,
    config: &'a CoverageConfig,
}

impl<'a> CoverageMatcher<'a> {
    pub fn new(index: &'a SegmentIndex, projection: LocalProjection, config: &'a CoverageConfig) -> Self {
        Self { index, projection, config }
    }

    pub fn buffer_track(&self, track: &ActivityTrack) -> Result<BufferedTrack> {
        BufferedTrack::new(track, &self.projection, self.config)
    }

    /// Observation for one (track, segment) pair, if the coverage clears the
    /// threshold.
    pub fn match_pair(&self, buffered: &BufferedTrack, segment: &IndexedSegment) -> Result<Option<CoverageObservation>> {
        let spans = buffered.covered_spans(segment);
        let ratio = spans_length(&spans);

        if !ratio.is_finite() {
            return Err(CoverageError::Computation {
                track_id: buffered.track_id.clone(),
                segment_id: segment.id,
                reason: format!("non-finite coverage ratio {}", ratio),
            });
        }

        let ratio = ratio.clamp(0.0, 1.0);
        if ratio <= self.config.min_coverage_threshold {
            return Ok(None);
        }

        Ok(Some(CoverageObservation {
            segment_id: segment.id,
            track_id: buffered.track_id.clone(),
            ratio,
            spans,
        }))
    }

    /// All observations for a track, ordered by segment id.
    ///
    /// Inert or degenerate tracks return [`CoverageError::InvalidTrack`] and a
    /// failed computation returns [`CoverageError::Computation`]; both mean the
    /// track contributes nothing.
    pub fn match_track(&self, track: &ActivityTrack) -> Result<Vec<CoverageObservation>> {
        let buffered = self.buffer_track(track)?;

        let mut observations = Vec::new();
        for segment in self.index.candidates(&buffered.envelope()) {
            if let Some(observation) = self.match_pair(&buffered, segment)? {
                observations.push(observation);
            }
        }
        observations.sort_by_key(|o| o.segment_id);
        Ok(observations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segmenter::StreetSegment;

    fn c(x: f64, y: f64) -> Coord<f64> {
        Coord { x, y }
    }

    fn approx_eq(a: f64, b: f64, epsilon: f64) -> bool {
        (a - b).abs() < epsilon
    }

    fn interval_length(iv: Option<(f64, f64)>) -> f64 {
        iv.map(|(s, e)| e - s).unwrap_or(0.0)
    }

    #[test]
    fn test_merge_spans() {
        let merged = merge_spans(vec![
            Span::new(0.5, 0.7),
            Span::new(0.0, 0.2),
            Span::new(0.1, 0.3),
            Span::new(0.7, 0.8),
        ]);
        assert_eq!(merged, vec![Span::new(0.0, 0.3), Span::new(0.5, 0.8)]);
        assert!(approx_eq(spans_length(&merged), 0.6, 1e-12));
    }

    #[test]
    fn test_capsule_parallel_line_inside() {
        // Street edge from (0,0) to (100,0); track edge 10m north, x 20..60
        let iv = capsule_interval(c(0.0, 0.0), c(100.0, 0.0), c(20.0, 10.0), c(60.0, 10.0), 15.0);
        // Caps extend by sqrt(15^2 - 10^2) ~ 11.18m on each side
        let expected = (40.0 + 2.0 * (125.0f64).sqrt()) / 100.0;
        assert!(approx_eq(interval_length(iv), expected, 1e-9));
    }

    #[test]
    fn test_capsule_too_far() {
        let iv = capsule_interval(c(0.0, 0.0), c(100.0, 0.0), c(0.0, 30.0), c(100.0, 30.0), 15.0);
        assert!(iv.is_none());
    }

    #[test]
    fn test_capsule_perpendicular_crossing() {
        let iv = capsule_interval(c(0.0, 0.0), c(100.0, 0.0), c(50.0, -50.0), c(50.0, 50.0), 15.0);
        assert!(approx_eq(interval_length(iv), 0.30, 1e-9));
    }

    #[test]
    fn test_capsule_degenerate_edge_is_disk() {
        let iv = capsule_interval(c(0.0, 0.0), c(100.0, 0.0), c(50.0, 0.0), c(50.0, 0.0), 10.0);
        assert!(approx_eq(interval_length(iv), 0.20, 1e-9));
    }

    fn indexed(points: Vec<GpsPoint>, projection: &LocalProjection) -> IndexedSegment {
        let segment = StreetSegment {
            id: 0,
            street_id: 0,
            length_m: crate::geo_utils::polyline_length(&points),
            points,
            road_class: "residential".to_string(),
        };
        IndexedSegment::from_segment(&segment, projection)
    }

    #[test]
    fn test_self_overlapping_track_ratio_bounded() {
        let projection = LocalProjection::new(GpsPoint::new(42.39, -71.10));
        let segment = indexed(
            vec![projection.unproject(c(0.0, 0.0)), projection.unproject(c(100.0, 0.0))],
            &projection,
        );
        // Out and back three times along the street
        let mut points = Vec::new();
        for _ in 0..3 {
            points.push(projection.unproject(c(-20.0, 1.0)));
            points.push(projection.unproject(c(120.0, -1.0)));
        }
        let track = ActivityTrack::from_points("loop", &points, "Run");
        let buffered = BufferedTrack::new(&track, &projection, &CoverageConfig::default()).unwrap();
        let ratio = buffered.coverage_ratio(&segment);
        assert!(ratio <= 1.0);
        assert!(approx_eq(ratio, 1.0, 1e-9));
    }

    #[test]
    fn test_inert_and_degenerate_tracks_rejected() {
        let projection = LocalProjection::new(GpsPoint::new(42.39, -71.10));
        let config = CoverageConfig::default();

        let single = ActivityTrack::from_points("one", &[GpsPoint::new(42.39, -71.10)], "Run");
        assert!(matches!(
            BufferedTrack::new(&single, &projection, &config),
            Err(CoverageError::InvalidTrack { .. })
        ));

        let p = GpsPoint::new(42.39, -71.10);
        let stationary = ActivityTrack::from_points("still", &[p, p, p], "Run");
        assert!(matches!(
            BufferedTrack::new(&stationary, &projection, &config),
            Err(CoverageError::InvalidTrack { .. })
        ));
    }

    #[test]
    fn test_inaccurate_points_dropped() {
        let projection = LocalProjection::new(GpsPoint::new(42.39, -71.10));
        let config = CoverageConfig {
            max_point_accuracy_m: Some(25.0),
            ..CoverageConfig::default()
        };
        let track = ActivityTrack::new(
            "noisy",
            vec![
                TrackPoint::new(42.390, -71.100).with_accuracy(5.0),
                TrackPoint::new(42.391, -71.100).with_accuracy(80.0),
            ],
            "Run",
        );
        assert!(BufferedTrack::new(&track, &projection, &config).is_err());
    }

    #[test]
    fn test_zero_length_segment_ratio_zero() {
        let projection = LocalProjection::new(GpsPoint::new(42.39, -71.10));
        let p = projection.unproject(c(0.0, 0.0));
        let segment = indexed(vec![p, p], &projection);
        let track = ActivityTrack::from_points(
            "t",
            &[projection.unproject(c(-50.0, 0.0)), projection.unproject(c(50.0, 0.0))],
            "Run",
        );
        let buffered = BufferedTrack::new(&track, &projection, &CoverageConfig::default()).unwrap();
        assert_eq!(buffered.coverage_ratio(&segment), 0.0);
    }
}
