//! Run configuration.
//!
//! A [`CoverageConfig`] is built once by the caller and handed by reference to
//! every component. Nothing in the crate keeps configuration in global state.

use crate::error::{CoverageError, Result};

/// How accumulated observations decide whether a segment is completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CompletionPolicy {
    /// Completed when the single best observation reaches the ratio.
    /// Partial passes by different tracks never add up.
    #[default]
    MaxRatio,
    /// Completed when the union of all covered spans reaches the ratio.
    UnionOfSpans,
}

/// Configuration for segmentation, matching and completion.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct CoverageConfig {
    /// Buffer radius around GPS tracks in meters, modelling positional error.
    /// Default: 20.0
    pub buffer_distance_m: f64,

    /// Pieces shorter than this are dropped after splitting (meters).
    /// Streets shorter than this are still kept whole. Default: 10.0
    pub min_segment_length_m: f64,

    /// Streets longer than this are split (meters). Default: 100.0
    pub max_segment_length_m: f64,

    /// Coverage needed to mark a segment completed (0.0-1.0).
    /// 0.0 means any touch counts. Default: 0.1
    pub min_coverage_ratio: f64,

    /// Observations at or below this ratio are discarded as grazes.
    /// Default: 0.005
    pub min_coverage_threshold: f64,

    /// Road classes never tracked (case-insensitive).
    pub excluded_road_classes: Vec<String>,

    /// Completion rule. Default: [`CompletionPolicy::MaxRatio`]
    pub completion_policy: CompletionPolicy,

    /// Only tracks whose source name contains one of these (case-insensitive)
    /// are processed. Empty means all tracks.
    pub activity_types: Vec<String>,

    /// Track points reporting a worse horizontal accuracy are ignored.
    pub max_point_accuracy_m: Option<f64>,

    /// Tracks matched per dispatch chunk. Default: 256
    pub track_batch_size: usize,
}

impl Default for CoverageConfig {
    fn default() -> Self {
        Self {
            buffer_distance_m: 20.0,
            min_segment_length_m: 10.0,
            max_segment_length_m: 100.0,
            min_coverage_ratio: 0.1,
            min_coverage_threshold: 0.005,
            excluded_road_classes: ["motorway", "motorway_link", "trunk", "trunk_link"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            completion_policy: CompletionPolicy::MaxRatio,
            activity_types: Vec::new(),
            max_point_accuracy_m: None,
            track_batch_size: 256,
        }
    }
}

impl CoverageConfig {
    /// Any meaningful pass over a segment counts.
    pub fn lenient() -> Self {
        Self {
            min_coverage_ratio: 0.1,
            ..Self::default()
        }
    }

    /// Most of a segment has to be covered by one track.
    pub fn strict() -> Self {
        Self {
            min_coverage_ratio: 0.7,
            buffer_distance_m: 15.0,
            ..Self::default()
        }
    }

    /// A single observation completes a segment.
    pub fn binary() -> Self {
        Self {
            min_coverage_ratio: 0.0,
            ..Self::default()
        }
    }

    /// Check that the values are usable together.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(CoverageError::InvalidConfig(msg));

        if !self.buffer_distance_m.is_finite() || self.buffer_distance_m <= 0.0 {
            return invalid(format!(
                "buffer_distance_m must be positive, got {}",
                self.buffer_distance_m
            ));
        }
        if !self.min_segment_length_m.is_finite() || self.min_segment_length_m < 0.0 {
            return invalid(format!(
                "min_segment_length_m must be non-negative, got {}",
                self.min_segment_length_m
            ));
        }
        if !self.max_segment_length_m.is_finite() || self.max_segment_length_m <= 0.0 {
            return invalid(format!(
                "max_segment_length_m must be positive, got {}",
                self.max_segment_length_m
            ));
        }
        if self.min_segment_length_m > self.max_segment_length_m {
            return invalid(format!(
                "min_segment_length_m ({}) exceeds max_segment_length_m ({})",
                self.min_segment_length_m, self.max_segment_length_m
            ));
        }
        if !(0.0..=1.0).contains(&self.min_coverage_ratio) {
            return invalid(format!(
                "min_coverage_ratio must be within [0, 1], got {}",
                self.min_coverage_ratio
            ));
        }
        if !(0.0..1.0).contains(&self.min_coverage_threshold) {
            return invalid(format!(
                "min_coverage_threshold must be within [0, 1), got {}",
                self.min_coverage_threshold
            ));
        }
        if let Some(accuracy) = self.max_point_accuracy_m {
            if !accuracy.is_finite() || accuracy <= 0.0 {
                return invalid(format!("max_point_accuracy_m must be positive, got {}", accuracy));
            }
        }
        if self.track_batch_size == 0 {
            return invalid("track_batch_size must be at least 1".to_string());
        }
        Ok(())
    }

    /// Whether streets of this class are filtered out.
    pub fn is_excluded_class(&self, road_class: &str) -> bool {
        self.excluded_road_classes
            .iter()
            .any(|c| c.eq_ignore_ascii_case(road_class.trim()))
    }

    /// Whether a track from this source should be processed.
    pub fn accepts_source(&self, source_name: &str) -> bool {
        if self.activity_types.is_empty() {
            return true;
        }
        let source = source_name.to_lowercase();
        self.activity_types
            .iter()
            .any(|t| source.contains(&t.to_lowercase()))
    }
}
