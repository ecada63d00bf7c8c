//! Error types for street coverage runs.
//!
//! Errors fall into three kinds (see [`ErrorKind`]). Per-item failures, such as
//! a malformed street or track or a non-finite geometry result, are
//! recoverable: the engine records them and moves on. Invalid configuration
//! and a network with no usable segments abort the run.

use thiserror::Error;

use crate::SegmentId;

/// Broad category of a [`CoverageError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ErrorKind {
    Configuration,
    Input,
    Computation,
}

/// Errors produced while segmenting streets or matching tracks.
#[derive(Debug, Clone, PartialEq, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CoverageError {
    /// A configuration value is out of range or inconsistent.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A street's geometry cannot be segmented.
    #[error("street {street_id} skipped: {reason}")]
    InvalidStreet { street_id: u64, reason: String },

    /// A track's geometry cannot be matched.
    #[error("track {track_id} skipped: {reason}")]
    InvalidTrack { track_id: String, reason: String },

    /// An observation referenced a segment id the evaluator does not own.
    #[error("unknown segment id {0}")]
    UnknownSegment(SegmentId),

    /// A geometry operation produced an unusable result.
    #[error("computation failed for track {track_id} on segment {segment_id}: {reason}")]
    Computation {
        track_id: String,
        segment_id: SegmentId,
        reason: String,
    },

    /// Filtering and segmentation left nothing to track.
    #[error("no segments remain after processing {street_count} streets")]
    NoSegments { street_count: usize },
}

impl CoverageError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoverageError::InvalidConfig(_) => ErrorKind::Configuration,
            CoverageError::InvalidStreet { .. }
            | CoverageError::InvalidTrack { .. }
            | CoverageError::UnknownSegment(_)
            | CoverageError::NoSegments { .. } => ErrorKind::Input,
            CoverageError::Computation { .. } => ErrorKind::Computation,
        }
    }

    /// Whether the run can continue after this error (the offending item is skipped).
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            CoverageError::InvalidStreet { .. }
                | CoverageError::InvalidTrack { .. }
                | CoverageError::Computation { .. }
        )
    }

    pub(crate) fn invalid_track(track_id: &str, reason: impl Into<String>) -> Self {
        CoverageError::InvalidTrack {
            track_id: track_id.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_street(street_id: u64, reason: impl Into<String>) -> Self {
        CoverageError::InvalidStreet {
            street_id,
            reason: reason.into(),
        }
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, CoverageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CoverageError::invalid_track("run-7", "fewer than 2 points");
        assert!(err.to_string().contains("run-7"));
        assert!(err.to_string().contains("fewer than 2 points"));
    }

    #[test]
    fn test_kinds_and_recoverability() {
        let config = CoverageError::InvalidConfig("bad".into());
        assert_eq!(config.kind(), ErrorKind::Configuration);
        assert!(!config.is_recoverable());

        let street = CoverageError::invalid_street(3, "zero length");
        assert_eq!(street.kind(), ErrorKind::Input);
        assert!(street.is_recoverable());

        let computation = CoverageError::Computation {
            track_id: "a".into(),
            segment_id: 1,
            reason: "NaN".into(),
        };
        assert_eq!(computation.kind(), ErrorKind::Computation);
        assert!(computation.is_recoverable());

        let empty = CoverageError::NoSegments { street_count: 0 };
        assert_eq!(empty.kind(), ErrorKind::Input);
        assert!(!empty.is_recoverable());
    }
}
