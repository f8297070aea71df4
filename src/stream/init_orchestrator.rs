//! C10: Init Orchestrator (§4.10). Resolves the initial seek target once
//! metadata loads, waits for a playable, non-rebuffering state before
//! autoplaying, translates a blocked autoplay into a warning event, and
//! forces `playbackRate = 0` for the duration of a rebuffer.
//!
//! Grounded on the startup sequencing in `crates/mesio/src/hls/coordinator.rs`
//! (wait for a precondition, then perform one side-effecting action, with
//! errors downgraded to warnings where the spec calls for it).

use tracing::{info, warn};

use crate::config::StartAt;
use crate::stream::clock::Observation;
use crate::stream::events::StreamEvent;

/// Resolves the initial seek target from `start_at` and the manifest
/// duration (§4.10 b).
pub fn resolve_initial_seek(start_at: Option<StartAt>, duration: f64) -> f64 {
    start_at.map(|s| s.resolve(duration)).unwrap_or(0.0)
}

/// Whether the stream is ready to attempt autoplay: readyState >= 1, not
/// currently rebuffering, and not already ended (§4.10 c; §8 "autoplay on
/// an already-ended media resolves as skipped, not replay").
pub fn is_playable(observation: &Observation) -> bool {
    observation.ready_state >= 1 && observation.rebuffering.is_none() && !observation.ended
}

/// What the host should be told to do about playback rate, given whether
/// we're currently rebuffering (§4.10 e).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlaybackRateDirective {
    /// Force to 0 for the duration of the rebuffer.
    ForceZero,
    /// Restore this previously-requested rate.
    Restore(f64),
    /// No change needed.
    NoOp,
}

pub struct InitOrchestrator {
    user_requested_rate: f64,
    forced_zero: bool,
    autoplay_attempted: bool,
}

impl InitOrchestrator {
    pub fn new(user_requested_rate: f64) -> Self {
        Self {
            user_requested_rate,
            forced_zero: false,
            autoplay_attempted: false,
        }
    }

    pub fn set_user_requested_rate(&mut self, rate: f64) {
        self.user_requested_rate = rate;
    }

    /// Recomputes the playback-rate directive for the given observation.
    pub fn playback_rate_directive(&mut self, observation: &Observation) -> PlaybackRateDirective {
        let rebuffering = observation.rebuffering.is_some();
        if rebuffering && !self.forced_zero {
            self.forced_zero = true;
            return PlaybackRateDirective::ForceZero;
        }
        if !rebuffering && self.forced_zero {
            self.forced_zero = false;
            return PlaybackRateDirective::Restore(self.user_requested_rate);
        }
        PlaybackRateDirective::NoOp
    }

    /// Attempts autoplay once the stream becomes playable; returns the event
    /// to emit, if any. No-op if autoplay was already attempted or the
    /// stream isn't yet playable.
    pub fn maybe_autoplay(
        &mut self,
        observation: &Observation,
        auto_play: bool,
        play_result: impl FnOnce() -> Result<(), AutoplayError>,
    ) -> Option<StreamEvent> {
        if !auto_play || self.autoplay_attempted || !is_playable(observation) {
            return None;
        }
        self.autoplay_attempted = true;
        match play_result() {
            Ok(()) => {
                info!("autoplay started");
                None
            }
            Err(AutoplayError::NotAllowed) => {
                warn!("autoplay blocked by host policy");
                Some(StreamEvent::Warning("blocked-autoplay".to_string()))
            }
        }
    }
}

/// Host play-error classification relevant to autoplay (§4.10 d). Only
/// `NotAllowed` is translated into a warning; other play errors are the
/// host's concern and are not modeled here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoplayError {
    NotAllowed,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn observation(ready_state: u8, rebuffering: bool) -> Observation {
        ended_observation(ready_state, rebuffering, false)
    }

    fn ended_observation(ready_state: u8, rebuffering: bool, ended: bool) -> Observation {
        Observation {
            position: 0.0,
            buffer_gap: 10.0,
            buffered: crate::stream::range::RangeSet::new(),
            duration: 100.0,
            playback_rate: 1.0,
            ready_state,
            paused: false,
            seeking: false,
            ended,
            event: "timeupdate",
            rebuffering: rebuffering.then(|| crate::stream::clock::RebufferingStatus {
                reason: crate::config::RebufferingReason::Buffering,
                since: Instant::now(),
                target: None,
            }),
            freezing: None,
            internal_seek: false,
            timestamp: Instant::now(),
        }
    }

    #[test]
    fn percentage_start_at_resolves_through_clock_config() {
        assert_eq!(resolve_initial_seek(Some(StartAt::Percentage(50.0)), 100.0), 50.0);
        assert_eq!(resolve_initial_seek(None, 100.0), 0.0);
    }

    #[test]
    fn playable_requires_ready_state_and_no_rebuffering() {
        assert!(is_playable(&observation(1, false)));
        assert!(!is_playable(&observation(0, false)));
        assert!(!is_playable(&observation(2, true)));
    }

    #[test]
    fn rebuffer_forces_rate_to_zero_then_restores() {
        let mut orchestrator = InitOrchestrator::new(1.5);
        let directive = orchestrator.playback_rate_directive(&observation(2, true));
        assert_eq!(directive, PlaybackRateDirective::ForceZero);
        let noop = orchestrator.playback_rate_directive(&observation(2, true));
        assert_eq!(noop, PlaybackRateDirective::NoOp);
        let restore = orchestrator.playback_rate_directive(&observation(2, false));
        assert_eq!(restore, PlaybackRateDirective::Restore(1.5));
    }

    #[test]
    fn blocked_autoplay_becomes_a_warning_event() {
        let mut orchestrator = InitOrchestrator::new(1.0);
        let event = orchestrator.maybe_autoplay(&observation(2, false), true, || Err(AutoplayError::NotAllowed));
        assert!(matches!(event, Some(StreamEvent::Warning(_))));
    }

    #[test]
    fn autoplay_on_already_ended_media_is_skipped_not_replayed() {
        let mut orchestrator = InitOrchestrator::new(1.0);
        let event = orchestrator.maybe_autoplay(&ended_observation(2, false, true), true, || {
            panic!("should not attempt to play already-ended media")
        });
        assert!(event.is_none());
        assert!(!is_playable(&ended_observation(2, false, true)));
    }

    #[test]
    fn autoplay_is_attempted_only_once() {
        let mut orchestrator = InitOrchestrator::new(1.0);
        let first = orchestrator.maybe_autoplay(&observation(2, false), true, || Ok(()));
        assert!(first.is_none());
        let second = orchestrator.maybe_autoplay(&observation(2, false), true, || {
            panic!("should not be called twice")
        });
        assert!(second.is_none());
    }
}
