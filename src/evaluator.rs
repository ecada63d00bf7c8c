//! Completion evaluation.
//!
//! Keeps one [`SegmentCoverageState`] per segment in a dense arena indexed by
//! segment id. Observations are only ever appended, so a segment moves from
//! incomplete to completed at most once and never back.

use crate::config::{CompletionPolicy, CoverageConfig};
use crate::error::{CoverageError, Result};
use crate::matcher::{merge_spans, spans_length, CoverageObservation, Span};
use crate::SegmentId;

/// Accumulated evidence for one segment.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SegmentCoverageState {
    observations: Vec<CoverageObservation>,
    max_ratio: f64,
    /// Union of every observation's spans
    covered: Vec<Span>,
    completed: bool,
}

impl SegmentCoverageState {
    pub fn observations(&self) -> &[CoverageObservation] {
        &self.observations
    }

    /// Number of tracks that covered this segment.
    pub fn activity_count(&self) -> usize {
        self.observations.len()
    }

    /// Best single-track ratio, 0.0 without observations.
    pub fn max_ratio(&self) -> f64 {
        self.max_ratio
    }

    /// Fraction of the segment covered by the union of all tracks.
    pub fn union_ratio(&self) -> f64 {
        spans_length(&self.covered).clamp(0.0, 1.0)
    }

    pub fn covered_spans(&self) -> &[Span] {
        &self.covered
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    fn push(&mut self, observation: CoverageObservation, policy: CompletionPolicy, min_ratio: f64) {
        self.max_ratio = self.max_ratio.max(observation.ratio);
        let mut spans = std::mem::take(&mut self.covered);
        spans.extend_from_slice(&observation.spans);
        self.covered = merge_spans(spans);
        self.observations.push(observation);

        let score = match policy {
            CompletionPolicy::MaxRatio => self.max_ratio,
            CompletionPolicy::UnionOfSpans => self.union_ratio(),
        };
        self.completed = self.completed || score >= min_ratio;
    }
}

/// Owns the coverage state of every segment for one run.
#[derive(Debug, Clone)]
pub struct CompletionEvaluator {
    policy: CompletionPolicy,
    min_ratio: f64,
    states: Vec<SegmentCoverageState>,
}

impl CompletionEvaluator {
    /// One empty state per segment id in `0..segment_count`.
    pub fn new(segment_count: usize, config: &CoverageConfig) -> Self {
        Self {
            policy: config.completion_policy,
            min_ratio: config.min_coverage_ratio,
            states: vec![SegmentCoverageState::default(); segment_count],
        }
    }

    pub fn policy(&self) -> CompletionPolicy {
        self.policy
    }

    /// Append an observation to its segment's state.
    pub fn record(&mut self, observation: CoverageObservation) -> Result<()> {
        let (policy, min_ratio) = (self.policy, self.min_ratio);
        let state = self
            .states
            .get_mut(observation.segment_id as usize)
            .ok_or(CoverageError::UnknownSegment(observation.segment_id))?;
        state.push(observation, policy, min_ratio);
        Ok(())
    }

    /// Record many observations; returns how many were accepted.
    pub fn record_all(&mut self, observations: impl IntoIterator<Item = CoverageObservation>) -> Result<usize> {
        let mut recorded = 0;
        for observation in observations {
            self.record(observation)?;
            recorded += 1;
        }
        Ok(recorded)
    }

    pub fn state(&self, id: SegmentId) -> Option<&SegmentCoverageState> {
        self.states.get(id as usize)
    }

    /// States in segment id order.
    pub fn states(&self) -> &[SegmentCoverageState] {
        &self.states
    }

    pub fn is_completed(&self, id: SegmentId) -> bool {
        self.state(id).is_some_and(|s| s.is_completed())
    }

    pub fn completed_count(&self) -> usize {
        self.states.iter().filter(|s| s.is_completed()).count()
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn observation(segment_id: SegmentId, track: &str, start: f64, end: f64) -> CoverageObservation {
        CoverageObservation {
            segment_id,
            track_id: track.to_string(),
            ratio: end - start,
            spans: vec![Span::new(start, end)],
        }
    }

    fn evaluator(policy: CompletionPolicy, min_ratio: f64) -> CompletionEvaluator {
        let config = CoverageConfig {
            completion_policy: policy,
            min_coverage_ratio: min_ratio,
            ..CoverageConfig::default()
        };
        CompletionEvaluator::new(3, &config)
    }

    #[test]
    fn test_starts_incomplete() {
        let evaluator = evaluator(CompletionPolicy::MaxRatio, 0.0);
        assert_eq!(evaluator.len(), 3);
        assert!(evaluator.states().iter().all(|s| !s.is_completed()));
        assert_eq!(evaluator.state(0).unwrap().max_ratio(), 0.0);
    }

    #[test]
    fn test_max_ratio_does_not_accumulate() {
        let mut evaluator = evaluator(CompletionPolicy::MaxRatio, 0.7);
        evaluator.record(observation(1, "a", 0.0, 0.4)).unwrap();
        evaluator.record(observation(1, "b", 0.6, 1.0)).unwrap();

        let state = evaluator.state(1).unwrap();
        assert!(!state.is_completed());
        assert!((state.max_ratio() - 0.4).abs() < 1e-12);
        assert!((state.union_ratio() - 0.8).abs() < 1e-12);
        assert_eq!(state.activity_count(), 2);
    }

    #[test]
    fn test_union_policy_accumulates() {
        let mut evaluator = evaluator(CompletionPolicy::UnionOfSpans, 0.7);
        evaluator.record(observation(1, "a", 0.0, 0.4)).unwrap();
        assert!(!evaluator.is_completed(1));
        evaluator.record(observation(1, "b", 0.6, 1.0)).unwrap();

        assert!(evaluator.is_completed(1));
        assert!((evaluator.state(1).unwrap().union_ratio() - 0.8).abs() < 1e-12);
    }

    #[test]
    fn test_zero_ratio_any_touch_counts() {
        let mut evaluator = evaluator(CompletionPolicy::MaxRatio, 0.0);
        evaluator.record(observation(2, "a", 0.5, 0.51)).unwrap();
        assert!(evaluator.is_completed(2));
        assert!(!evaluator.is_completed(0));
    }

    #[test]
    fn test_monotonic() {
        let mut evaluator = evaluator(CompletionPolicy::MaxRatio, 0.5);
        evaluator.record(observation(0, "a", 0.0, 0.9)).unwrap();
        assert!(evaluator.is_completed(0));

        evaluator.record(observation(0, "b", 0.0, 0.1)).unwrap();
        let state = evaluator.state(0).unwrap();
        assert!(state.is_completed());
        assert!((state.max_ratio() - 0.9).abs() < 1e-12);
    }

    #[test]
    fn test_unknown_segment() {
        let mut evaluator = evaluator(CompletionPolicy::MaxRatio, 0.1);
        let err = evaluator.record(observation(7, "a", 0.0, 0.5)).unwrap_err();
        assert_eq!(err, CoverageError::UnknownSegment(7));
    }

    #[test]
    fn test_record_all_counts() {
        let mut evaluator = evaluator(CompletionPolicy::MaxRatio, 0.1);
        let recorded = evaluator
            .record_all(vec![observation(0, "a", 0.0, 0.5), observation(2, "a", 0.0, 0.2)])
            .unwrap();
        assert_eq!(recorded, 2);
        assert_eq!(evaluator.completed_count(), 2);
    }
}
