//! # Coverage Aggregation
//!
//! Read-only pass over the final completion states: per-segment records and a
//! run summary with totals, percentages and a per-road-class breakdown.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};

use crate::config::CoverageConfig;
use crate::evaluator::CompletionEvaluator;
use crate::segmenter::StreetSegment;
use crate::SegmentId;

/// Final coverage of one segment.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SegmentRecord {
    pub segment_id: SegmentId,
    pub street_id: u64,
    pub road_class: String,
    pub length_m: f64,
    pub is_completed: bool,
    /// Tracks that produced an observation for this segment
    pub activity_count: usize,
    pub max_ratio: f64,
    pub union_ratio: f64,
}

/// Completion within one road class.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RoadClassCoverage {
    pub road_class: String,
    pub segments: usize,
    pub completed: usize,
    pub percentage: f64,
}

/// Totals for one run.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CoverageSummary {
    /// Distinct streets that produced at least one segment
    pub total_streets: usize,
    pub total_segments: usize,
    pub completed_segments: usize,
    /// Completed segments as a percentage of all segments
    pub coverage_percentage: f64,
    pub total_length_m: f64,
    pub completed_length_m: f64,
    /// Completed length as a percentage of total length
    pub length_coverage_percentage: f64,
    /// Tracks matched during the run
    pub total_activities: usize,
    /// Sorted by road class
    pub road_classes: Vec<RoadClassCoverage>,
    pub configuration: CoverageConfig,
    pub timestamp: DateTime<Utc>,
}

fn percentage(part: f64, whole: f64) -> f64 {
    if whole > 0.0 {
        part / whole * 100.0
    } else {
        0.0
    }
}

/// One record per segment, in segment id order.
///
/// Segments without a state in `evaluator` are reported as untouched.
pub fn segment_records(segments: &[StreetSegment], evaluator: &CompletionEvaluator) -> Vec<SegmentRecord> {
    segments
        .iter()
        .map(|segment| {
            let state = evaluator.state(segment.id);
            SegmentRecord {
                segment_id: segment.id,
                street_id: segment.street_id,
                road_class: segment.road_class.clone(),
                length_m: segment.length_m,
                is_completed: state.is_some_and(|s| s.is_completed()),
                activity_count: state.map_or(0, |s| s.activity_count()),
                max_ratio: state.map_or(0.0, |s| s.max_ratio()),
                union_ratio: state.map_or(0.0, |s| s.union_ratio()),
            }
        })
        .collect()
}

/// Summarize per-segment records.
pub fn summarize(records: &[SegmentRecord], config: &CoverageConfig, total_activities: usize) -> CoverageSummary {
    let streets: HashSet<u64> = records.iter().map(|r| r.street_id).collect();

    let mut completed_segments = 0;
    let mut total_length_m = 0.0;
    let mut completed_length_m = 0.0;
    let mut by_class: BTreeMap<&str, (usize, usize)> = BTreeMap::new();

    for record in records {
        total_length_m += record.length_m;
        let entry = by_class.entry(record.road_class.as_str()).or_default();
        entry.0 += 1;
        if record.is_completed {
            completed_segments += 1;
            completed_length_m += record.length_m;
            entry.1 += 1;
        }
    }

    let road_classes = by_class
        .into_iter()
        .map(|(road_class, (segments, completed))| RoadClassCoverage {
            road_class: road_class.to_string(),
            segments,
            completed,
            percentage: percentage(completed as f64, segments as f64),
        })
        .collect();

    CoverageSummary {
        total_streets: streets.len(),
        total_segments: records.len(),
        completed_segments,
        coverage_percentage: percentage(completed_segments as f64, records.len() as f64),
        total_length_m,
        completed_length_m,
        length_coverage_percentage: percentage(completed_length_m, total_length_m),
        total_activities,
        road_classes,
        configuration: config.clone(),
        timestamp: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::{CoverageObservation, Span};
    use crate::GpsPoint;

    fn segment(id: SegmentId, street_id: u64, length_m: f64, road_class: &str) -> StreetSegment {
        StreetSegment {
            id,
            street_id,
            points: vec![GpsPoint::new(42.38, -71.10), GpsPoint::new(42.381, -71.10)],
            length_m,
            road_class: road_class.to_string(),
        }
    }

    fn observation(segment_id: SegmentId, ratio: f64) -> CoverageObservation {
        CoverageObservation {
            segment_id,
            track_id: "t".to_string(),
            ratio,
            spans: vec![Span::new(0.0, ratio)],
        }
    }

    #[test]
    fn test_empty_summary_has_zero_percentages() {
        let summary = summarize(&[], &CoverageConfig::default(), 0);
        assert_eq!(summary.total_segments, 0);
        assert_eq!(summary.coverage_percentage, 0.0);
        assert_eq!(summary.length_coverage_percentage, 0.0);
        assert!(summary.road_classes.is_empty());
    }

    #[test]
    fn test_records_and_summary() {
        let config = CoverageConfig::default();
        let segments = vec![
            segment(0, 1, 100.0, "residential"),
            segment(1, 1, 100.0, "residential"),
            segment(2, 2, 50.0, "primary"),
            segment(3, 3, 50.0, "primary"),
        ];
        let mut evaluator = CompletionEvaluator::new(segments.len(), &config);
        evaluator.record(observation(0, 0.9)).unwrap();
        evaluator.record(observation(0, 0.5)).unwrap();
        evaluator.record(observation(2, 0.05)).unwrap();
        evaluator.record(observation(3, 1.0)).unwrap();

        let records = segment_records(&segments, &evaluator);
        assert_eq!(records.len(), 4);
        assert!(records[0].is_completed);
        assert_eq!(records[0].activity_count, 2);
        assert!((records[0].max_ratio - 0.9).abs() < 1e-12);
        assert!(!records[1].is_completed);
        assert!(!records[2].is_completed);

        let summary = summarize(&records, &config, 3);
        assert_eq!(summary.total_streets, 3);
        assert_eq!(summary.total_segments, 4);
        assert_eq!(summary.completed_segments, 2);
        assert!((summary.coverage_percentage - 50.0).abs() < 1e-9);
        assert!((summary.total_length_m - 300.0).abs() < 1e-9);
        assert!((summary.completed_length_m - 150.0).abs() < 1e-9);
        assert!((summary.length_coverage_percentage - 50.0).abs() < 1e-9);
        assert_eq!(summary.total_activities, 3);

        assert_eq!(summary.road_classes.len(), 2);
        assert_eq!(summary.road_classes[0].road_class, "primary");
        assert_eq!(summary.road_classes[0].completed, 1);
        assert!((summary.road_classes[1].percentage - 50.0).abs() < 1e-9);
    }
}
