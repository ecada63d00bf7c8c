//! # Coverage Engine
//!
//! Owns one coverage run: segments the street network and builds the spatial
//! index once, then matches tracks in bounded chunks and folds their
//! observations into the completion evaluator.
//!
//! Tracks within a chunk are matched in parallel when the `parallel` feature
//! is enabled. Observations are merged on the calling thread after each chunk,
//! so evaluator state never needs locking. Cancellation is checked between
//! chunks; a cancelled run still produces a consistent partial report.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use log::{debug, info, warn};

use crate::aggregator::{segment_records, summarize, CoverageSummary, SegmentRecord};
use crate::config::CoverageConfig;
use crate::error::{CoverageError, Result};
use crate::evaluator::CompletionEvaluator;
use crate::geo_utils::LocalProjection;
use crate::matcher::{ActivityTrack, CoverageMatcher, CoverageObservation};
use crate::segmenter::{segment_streets, RawStreet, SegmentationReport, StreetSegment};
use crate::spatial_index::SegmentIndex;

/// Counters for one run.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RunStats {
    /// Tracks handed to the engine, including skipped ones
    pub tracks_seen: usize,
    /// Tracks that were matched against the network
    pub tracks_processed: usize,
    /// Tracks with fewer than 2 usable points
    pub tracks_inert: usize,
    /// Tracks rejected by the activity type filter
    pub tracks_filtered: usize,
    /// Tracks whose matching failed
    pub tracks_errored: usize,
    pub observations_recorded: usize,
    pub segmentation: SegmentationReport,
    pub cancelled: bool,
    /// Messages for every skipped street and track
    pub errors: Vec<String>,
}

/// Everything a run produces.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CoverageReport {
    pub summary: CoverageSummary,
    pub records: Vec<SegmentRecord>,
    pub stats: RunStats,
}

/// Result of matching one track, before it is merged.
enum TrackOutcome {
    Matched(Vec<CoverageObservation>),
    Filtered,
    Inert(CoverageError),
    Failed(CoverageError),
}

fn match_one(matcher: &CoverageMatcher<'_>, config: &CoverageConfig, track: &ActivityTrack) -> TrackOutcome {
    if !config.accepts_source(&track.source_name) {
        return TrackOutcome::Filtered;
    }
    match matcher.match_track(track) {
        Ok(observations) => TrackOutcome::Matched(observations),
        Err(err @ CoverageError::InvalidTrack { .. }) => TrackOutcome::Inert(err),
        Err(err) => TrackOutcome::Failed(err),
    }
}

/// A coverage run over one street network.
///
/// # Example
/// ```
/// use street_coverage::{ActivityTrack, CoverageConfig, CoverageEngine, GpsPoint, RawStreet};
///
/// let street = RawStreet::new(
///     7,
///     vec![GpsPoint::new(42.3800, -71.1000), GpsPoint::new(42.3808, -71.1000)],
///     "residential",
/// );
/// let mut engine = CoverageEngine::new(&[street], CoverageConfig::default()).unwrap();
///
/// let track = ActivityTrack::from_points(
///     "morning-run",
///     &[GpsPoint::new(42.3799, -71.1000), GpsPoint::new(42.3809, -71.1000)],
///     "Run",
/// );
/// engine.process_tracks(&[track]);
///
/// let summary = engine.summary();
/// assert_eq!(summary.completed_segments, summary.total_segments);
/// ```
#[derive(Debug)]
pub struct CoverageEngine {
    config: CoverageConfig,
    segments: Vec<StreetSegment>,
    projection: LocalProjection,
    index: SegmentIndex,
    evaluator: CompletionEvaluator,
    stats: RunStats,
}

impl CoverageEngine {
    /// Validate the configuration, segment the streets and index the segments.
    ///
    /// Fails on invalid configuration and when no segment survives filtering
    /// and segmentation. Individually malformed streets are skipped and
    /// reported in [`RunStats::segmentation`].
    pub fn new(streets: &[RawStreet], config: CoverageConfig) -> Result<Self> {
        let start = Instant::now();
        config.validate()?;

        let segmentation = segment_streets(streets, &config);
        if segmentation.segments.is_empty() {
            return Err(CoverageError::NoSegments {
                street_count: streets.len(),
            });
        }

        let projection = segmentation
            .segments
            .iter()
            .map(StreetSegment::bounds)
            .reduce(|a, b| a.union(&b))
            .map(|bounds| LocalProjection::from_bounds(&bounds))
            .ok_or(CoverageError::NoSegments {
                street_count: streets.len(),
            })?;

        let index = SegmentIndex::build(&segmentation.segments, &projection);
        let evaluator = CompletionEvaluator::new(segmentation.segments.len(), &config);

        let stats = RunStats {
            errors: segmentation.report.errors.iter().map(|e| e.to_string()).collect(),
            segmentation: segmentation.report,
            ..RunStats::default()
        };

        info!(
            "[Coverage] Indexed {} segments from {} streets in {:?}",
            index.len(),
            streets.len(),
            start.elapsed()
        );

        Ok(Self {
            config,
            segments: segmentation.segments,
            projection,
            index,
            evaluator,
            stats,
        })
    }

    pub fn config(&self) -> &CoverageConfig {
        &self.config
    }

    /// Segments in id order.
    pub fn segments(&self) -> &[StreetSegment] {
        &self.segments
    }

    pub fn projection(&self) -> &LocalProjection {
        &self.projection
    }

    pub fn index(&self) -> &SegmentIndex {
        &self.index
    }

    pub fn evaluator(&self) -> &CompletionEvaluator {
        &self.evaluator
    }

    pub fn stats(&self) -> &RunStats {
        &self.stats
    }

    fn matcher(&self) -> CoverageMatcher<'_> {
        CoverageMatcher::new(&self.index, self.projection, &self.config)
    }

    /// Match one track and record its observations.
    ///
    /// Returns the number of observations recorded. Inert and failed tracks
    /// are counted in [`RunStats`] and their error is returned as well.
    pub fn process_track(&mut self, track: &ActivityTrack) -> Result<usize> {
        let outcome = match_one(&self.matcher(), &self.config, track);
        let failure = match &outcome {
            TrackOutcome::Inert(err) | TrackOutcome::Failed(err) => Some(err.clone()),
            TrackOutcome::Matched(_) | TrackOutcome::Filtered => None,
        };

        let recorded = self.merge(&track.id, outcome);
        match failure {
            Some(err) => Err(err),
            None => Ok(recorded),
        }
    }

    /// Match all tracks. Returns how many tracks were handled.
    pub fn process_tracks(&mut self, tracks: &[ActivityTrack]) -> usize {
        self.process_tracks_cancellable(tracks, &AtomicBool::new(false))
    }

    /// Match tracks chunk by chunk until done or `cancel` is set.
    ///
    /// Returns how many tracks were handled before stopping. Tracks of a chunk
    /// that started are always merged completely.
    pub fn process_tracks_cancellable(&mut self, tracks: &[ActivityTrack], cancel: &AtomicBool) -> usize {
        let start = Instant::now();
        let observations_before = self.stats.observations_recorded;
        let mut handled = 0;

        for chunk in tracks.chunks(self.config.track_batch_size) {
            if cancel.load(Ordering::Relaxed) {
                self.stats.cancelled = true;
                warn!(
                    "[Coverage] Cancelled after {} of {} tracks",
                    handled,
                    tracks.len()
                );
                break;
            }

            let outcomes = self.match_chunk(chunk);
            for (track, outcome) in chunk.iter().zip(outcomes) {
                self.merge(&track.id, outcome);
            }
            handled += chunk.len();
            debug!("[Coverage] Merged chunk of {} tracks ({}/{})", chunk.len(), handled, tracks.len());
        }

        info!(
            "[Coverage] Matched {} tracks -> {} observations in {:?}",
            handled,
            self.stats.observations_recorded - observations_before,
            start.elapsed()
        );
        handled
    }

    #[cfg(feature = "parallel")]
    fn match_chunk(&self, chunk: &[ActivityTrack]) -> Vec<TrackOutcome> {
        use rayon::prelude::*;

        let matcher = self.matcher();
        chunk
            .par_iter()
            .map(|track| match_one(&matcher, &self.config, track))
            .collect()
    }

    #[cfg(not(feature = "parallel"))]
    fn match_chunk(&self, chunk: &[ActivityTrack]) -> Vec<TrackOutcome> {
        let matcher = self.matcher();
        chunk
            .iter()
            .map(|track| match_one(&matcher, &self.config, track))
            .collect()
    }

    /// Fold one outcome into the evaluator and stats; returns observations recorded.
    fn merge(&mut self, track_id: &str, outcome: TrackOutcome) -> usize {
        self.stats.tracks_seen += 1;
        match outcome {
            TrackOutcome::Filtered => {
                self.stats.tracks_filtered += 1;
                0
            }
            TrackOutcome::Inert(err) => {
                debug!("[Coverage] {}", err);
                self.stats.tracks_inert += 1;
                self.stats.errors.push(err.to_string());
                0
            }
            TrackOutcome::Failed(err) => {
                warn!("[Coverage] {}", err);
                self.stats.tracks_errored += 1;
                self.stats.errors.push(err.to_string());
                0
            }
            TrackOutcome::Matched(observations) => match self.evaluator.record_all(observations) {
                Ok(count) => {
                    self.stats.tracks_processed += 1;
                    self.stats.observations_recorded += count;
                    count
                }
                Err(err) => {
                    warn!("[Coverage] Track {}: {}", track_id, err);
                    self.stats.tracks_errored += 1;
                    self.stats.errors.push(err.to_string());
                    0
                }
            },
        }
    }

    /// Per-segment records in segment id order.
    pub fn segment_records(&self) -> Vec<SegmentRecord> {
        segment_records(&self.segments, &self.evaluator)
    }

    pub fn summary(&self) -> CoverageSummary {
        summarize(&self.segment_records(), &self.config, self.stats.tracks_processed)
    }

    /// Summary, records and run statistics.
    pub fn report(&self) -> CoverageReport {
        let records = self.segment_records();
        let summary = summarize(&records, &self.config, self.stats.tracks_processed);
        info!(
            "[Coverage] {}/{} segments completed ({:.1}%, {:.1}% of length)",
            summary.completed_segments,
            summary.total_segments,
            summary.coverage_percentage,
            summary.length_coverage_percentage
        );
        CoverageReport {
            summary,
            records,
            stats: self.stats.clone(),
        }
    }
}
