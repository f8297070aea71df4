//! C4: ABR decision algorithm (§4.4). Combines the bandwidth estimate, the
//! per-representation score, and buffer gap into a chosen representation for
//! an Adaptation, with manual override and a hysteresis flag that forces a
//! conservative bandwidth-only choice when the buffer runs low.
//!
//! No direct teacher analogue; grounded on the fact-gathering shape of
//! `crates/mesio/src/hls/fetcher.rs`'s config resolution (read several inputs,
//! fold them into one decision) generalized to bitrate selection.

use crate::config::AbrConfig;
use crate::manifest::Representation;
use crate::stream::bandwidth::BandwidthEstimator;
use crate::stream::score::ScoreTracker;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionReason {
    ManualOverride,
    BandwidthEstimate,
    BufferBased,
    LastStable,
    OnlyRepresentation,
}

#[derive(Debug, Clone)]
pub struct AbrDecision {
    pub representation_id: crate::manifest::RepresentationId,
    pub bitrate: u64,
    pub reason: SelectionReason,
    /// True when bandwidth is falling fast enough that the switch should not
    /// wait for the current segment's in-flight request to finish (§4.4).
    pub urgent: bool,
}

/// Holds the `forceBandwidthMode` hysteresis bit and exposes the selection
/// function (§4.4: "switch between algorithms with hysteresis at bufferGap
/// thresholds of 5 and 10 seconds by default").
#[derive(Debug, Clone)]
pub struct AbrController {
    config: AbrConfig,
    force_bandwidth_mode: bool,
}

impl AbrController {
    pub fn new(config: AbrConfig) -> Self {
        Self {
            config,
            force_bandwidth_mode: false,
        }
    }

    fn update_force_bandwidth_mode(&mut self, buffer_gap: f64) {
        if self.force_bandwidth_mode {
            if buffer_gap > self.config.force_bandwidth_mode_exit_gap {
                self.force_bandwidth_mode = false;
            }
        } else if buffer_gap <= self.config.force_bandwidth_mode_enter_gap {
            self.force_bandwidth_mode = true;
        }
    }

    pub fn is_force_bandwidth_mode(&self) -> bool {
        self.force_bandwidth_mode
    }

    /// Select the representation to request next out of `candidates`
    /// (assumed pre-filtered to decipherable/playable and sorted ascending
    /// by bitrate), given the current buffer gap.
    pub fn select(
        &mut self,
        candidates: &[Representation],
        bandwidth: &BandwidthEstimator,
        scores: &ScoreTracker,
        buffer_gap: f64,
        current: Option<&Representation>,
        speed: f64,
    ) -> Option<AbrDecision> {
        if candidates.is_empty() {
            return None;
        }

        if self.config.manual_bitrate >= 0 {
            let manual = self.config.manual_bitrate as u64;
            let chosen = closest_by_bitrate(candidates, manual);
            return Some(AbrDecision {
                representation_id: chosen.id,
                bitrate: chosen.bitrate,
                reason: SelectionReason::ManualOverride,
                urgent: true,
            });
        }

        self.update_force_bandwidth_mode(buffer_gap);

        if candidates.len() == 1 {
            return Some(AbrDecision {
                representation_id: candidates[0].id,
                bitrate: candidates[0].bitrate,
                reason: SelectionReason::OnlyRepresentation,
                urgent: false,
            });
        }

        let bounded: Vec<&Representation> = candidates
            .iter()
            .filter(|r| r.bitrate >= self.config.min_auto_bitrate && r.bitrate <= self.config.max_auto_bitrate)
            .collect();
        let pool: &[&Representation] = if bounded.is_empty() { &[] } else { &bounded };
        let pool = if pool.is_empty() {
            candidates.iter().collect::<Vec<_>>()
        } else {
            pool.to_vec()
        };

        if self.force_bandwidth_mode {
            if let Some(estimate) = bandwidth.estimate() {
                let chosen = select_by_bandwidth(&pool, estimate);
                return Some(AbrDecision {
                    representation_id: chosen.id,
                    bitrate: chosen.bitrate,
                    reason: SelectionReason::BandwidthEstimate,
                    urgent: buffer_gap <= self.config.force_bandwidth_mode_enter_gap,
                });
            }
            if let Some(stable_id) = scores.last_stable_representation() {
                if let Some(chosen) = pool.iter().find(|r| r.id == stable_id) {
                    return Some(AbrDecision {
                        representation_id: chosen.id,
                        bitrate: chosen.bitrate,
                        reason: SelectionReason::LastStable,
                        urgent: true,
                    });
                }
            }
            let chosen = pool.first().copied().unwrap_or(&candidates[0]);
            return Some(AbrDecision {
                representation_id: chosen.id,
                bitrate: chosen.bitrate,
                reason: SelectionReason::LastStable,
                urgent: true,
            });
        }

        // §4.4 steps 3-5: bandwidth's selectOptimal is the default; the
        // buffer-based pick only overrides it when it is strictly lower,
        // acting as a conservative ceiling rather than the primary choice.
        let chosen_by_bandwidth = bandwidth.estimate().map(|estimate| select_by_bandwidth(&pool, estimate));
        let current_bitrate = current.map(|r| r.bitrate);
        let current_score = current.and_then(|r| scores.score_of(r.id));
        let buffer_based = select_by_buffer_steps(&pool, buffer_gap, current_bitrate, current_score, speed);

        let (chosen, reason) = match (chosen_by_bandwidth, buffer_based) {
            (Some(bw_rep), Some(buf_rep)) if buf_rep.bitrate < bw_rep.bitrate => {
                (buf_rep, SelectionReason::BufferBased)
            }
            (Some(bw_rep), _) => (bw_rep, SelectionReason::BandwidthEstimate),
            (None, Some(buf_rep)) => (buf_rep, SelectionReason::BufferBased),
            (None, None) => (pool.last().copied().unwrap_or(&candidates[0]), SelectionReason::BufferBased),
        };

        Some(AbrDecision {
            representation_id: chosen.id,
            bitrate: chosen.bitrate,
            reason,
            urgent: false,
        })
    }
}

fn closest_by_bitrate<'a>(candidates: &'a [Representation], target: u64) -> &'a Representation {
    candidates
        .iter()
        .min_by_key(|r| r.bitrate.abs_diff(target))
        .expect("candidates non-empty")
}

/// `selectOptimal` (§4.4 step 3): highest-bitrate representation with
/// bitrate ≤ `target`, never empty.
fn select_by_bandwidth<'a>(candidates: &[&'a Representation], target: f64) -> &'a Representation {
    candidates
        .iter()
        .rev()
        .find(|r| (r.bitrate as f64) <= target)
        .copied()
        .unwrap_or_else(|| candidates.first().copied().expect("candidates non-empty"))
}

/// Minimum effective buffer gap, in seconds, at which the lowest ladder tier
/// is reachable; the top tier's threshold sits at `BUFFER_STEP_MAX_SECONDS`.
/// Intermediate tiers are spaced logarithmically by bitrate between the two
/// (§4.4: "thresholds derived from the bitrate ladder, logarithmic spacing").
const BUFFER_STEP_MIN_SECONDS: f64 = 5.0;
const BUFFER_STEP_MAX_SECONDS: f64 = 30.0;

fn buffer_step_threshold(min_bitrate: f64, max_bitrate: f64, bitrate: f64) -> f64 {
    if max_bitrate <= min_bitrate {
        return BUFFER_STEP_MIN_SECONDS;
    }
    let normalized = (bitrate / min_bitrate).ln() / (max_bitrate / min_bitrate).ln();
    BUFFER_STEP_MIN_SECONDS + normalized * (BUFFER_STEP_MAX_SECONDS - BUFFER_STEP_MIN_SECONDS)
}

/// Piecewise buffer-based sub-estimator (§4.4): the longer the buffer gap,
/// the higher up the bitrate ladder we're willing to reach, independent of
/// the measured bandwidth. `speed` discounts the gap (a buffer drains faster
/// at higher playback speed, matching `stableBitrateHint`'s `/ max(1, speed)`
/// treatment); `current_bitrate`/`current_score` keep an already-maintainable
/// pick from being stepped down by this estimator alone. Returns `None` below
/// the lowest step, or when the ladder has fewer than two tiers, so the
/// caller falls back to the bandwidth-based estimate.
fn select_by_buffer_steps<'a>(
    candidates: &[&'a Representation],
    buffer_gap: f64,
    current_bitrate: Option<u64>,
    current_score: Option<f64>,
    speed: f64,
) -> Option<&'a Representation> {
    if candidates.len() < 2 {
        return None;
    }
    let effective_gap = buffer_gap / speed.max(1.0);
    let min_bitrate = candidates[0].bitrate as f64;
    let max_bitrate = candidates[candidates.len() - 1].bitrate as f64;

    let mut chosen_index = None;
    for (i, rep) in candidates.iter().enumerate() {
        let threshold = buffer_step_threshold(min_bitrate, max_bitrate, rep.bitrate as f64);
        if effective_gap >= threshold {
            chosen_index = Some(i);
        }
    }
    let mut chosen_index = chosen_index?;

    if current_score.is_some_and(|score| score >= 1.0) {
        if let Some(current_index) = current_bitrate.and_then(|b| candidates.iter().position(|r| r.bitrate == b)) {
            chosen_index = chosen_index.max(current_index);
        }
    }

    Some(candidates[chosen_index])
}
