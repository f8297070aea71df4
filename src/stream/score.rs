//! C3 (score half): per-representation "maintainability" score (§4.3).
//!
//! Tracks, per representation, an EWMA of `segmentDuration / requestDuration`
//! — above 1.0 means the representation downloads faster than it plays, i.e.
//! it's sustainable at current network conditions. Grounded on the same
//! per-target bookkeeping pattern as `crates/mesio/src/hls/metrics.rs`, keyed
//! here by `RepresentationId` instead of a stream URL.

use std::collections::HashMap;

use crate::manifest::RepresentationId;

#[derive(Debug, Clone, Copy)]
struct ScoreState {
    ewma: f64,
    samples: u32,
}

/// Minimum sample count before a score is trusted enough to gate a switch
/// (§4.3 "confidence").
const MIN_CONFIDENT_SAMPLES: u32 = 3;
const SCORE_EWMA_ALPHA: f64 = 0.4;
/// A representation is "maintainable" once its score EWMA is at or above this.
const MAINTAINABLE_THRESHOLD: f64 = 1.0;

#[derive(Debug, Default)]
pub struct ScoreTracker {
    scores: HashMap<RepresentationId, ScoreState>,
    last_stable: Option<RepresentationId>,
}

impl ScoreTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, representation: RepresentationId, segment_duration: f64, request_duration: f64) {
        if request_duration <= 0.0 {
            return;
        }
        let sample = segment_duration / request_duration;
        let entry = self.scores.entry(representation).or_insert(ScoreState {
            ewma: sample,
            samples: 0,
        });
        entry.ewma = SCORE_EWMA_ALPHA * sample + (1.0 - SCORE_EWMA_ALPHA) * entry.ewma;
        entry.samples += 1;

        if self.is_maintainable(representation) {
            self.last_stable = Some(representation);
        }
    }

    /// `None` until at least one sample has landed (§4.3 "unknown until
    /// observed").
    pub fn score_of(&self, representation: RepresentationId) -> Option<f64> {
        self.scores.get(&representation).map(|s| s.ewma)
    }

    pub fn is_confident(&self, representation: RepresentationId) -> bool {
        self.scores
            .get(&representation)
            .is_some_and(|s| s.samples >= MIN_CONFIDENT_SAMPLES)
    }

    pub fn is_maintainable(&self, representation: RepresentationId) -> bool {
        self.scores
            .get(&representation)
            .is_some_and(|s| s.ewma >= MAINTAINABLE_THRESHOLD && s.samples >= MIN_CONFIDENT_SAMPLES)
    }

    /// The last representation confirmed maintainable, used as a fallback
    /// target when bandwidth estimation is unavailable or untrustworthy.
    pub fn last_stable_representation(&self) -> Option<RepresentationId> {
        self.last_stable
    }
}
