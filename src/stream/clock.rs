//! C2: Playback Observer (§4.2). Samples media state on a timer plus on
//! media events, derives rebuffering/freezing status, and broadcasts
//! [`Observation`]s via a [`SharedReference`].
//!
//! Grounded on the `tokio::select!`-driven run loop shape used throughout
//! `crates/mesio/src/hls/scheduler.rs`, generalized from "drain a channel of
//! jobs" to "sample media state on an interval, in addition to events".

use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::config::{ClockConfig, RebufferingReason};
use crate::shared::{SharedReference, Subscription};
use crate::stream::range::RangeSet;

/// Media-level facts read from the host each tick (§3 `Observation`, input
/// half — `ready_state`/`paused`/etc. come from the host media element,
/// itself out of scope; this struct is what the host reports to us).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MediaState {
    pub position: f64,
    pub duration: f64,
    pub playback_rate: f64,
    pub ready_state: u8,
    pub paused: bool,
    pub seeking: bool,
    pub ended: bool,
    pub has_media_source: bool,
    pub fully_loaded: bool,
}

/// Events the host can push in addition to timer ticks (§4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaEvent {
    CanPlay,
    Play,
    Seeking,
    Seeked,
    LoadedMetadata,
    RateChange,
    TimeUpdate,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RebufferingStatus {
    pub reason: RebufferingReason,
    pub since: Instant,
    pub target: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FreezingStatus {
    pub since: Instant,
}

/// §3 `Observation`.
#[derive(Debug, Clone)]
pub struct Observation {
    pub position: f64,
    pub buffer_gap: f64,
    pub buffered: RangeSet,
    pub duration: f64,
    pub playback_rate: f64,
    pub ready_state: u8,
    pub paused: bool,
    pub seeking: bool,
    pub ended: bool,
    pub event: &'static str,
    pub rebuffering: Option<RebufferingStatus>,
    pub freezing: Option<FreezingStatus>,
    pub internal_seek: bool,
    /// Monotonic sample timestamp (§4.2 "monotonic timestamp from a steady clock").
    pub timestamp: Instant,
}

struct InternalSeekTracker {
    pending: u32,
    marked_at: Option<Instant>,
}

impl InternalSeekTracker {
    fn new() -> Self {
        Self {
            pending: 0,
            marked_at: None,
        }
    }

    fn mark(&mut self, now: Instant) {
        self.pending += 1;
        self.marked_at = Some(now);
    }

    /// Consumes one pending mark if the incoming `seeking` event should be
    /// treated as internal; reconciles (clears) a stale mark that has sat
    /// unconfirmed past the timeout (Open Question #2 in DESIGN.md).
    fn consume_on_seeking(&mut self, now: Instant, timeout: Duration) -> bool {
        if let Some(marked_at) = self.marked_at {
            if now.duration_since(marked_at) > timeout {
                self.pending = 0;
                self.marked_at = None;
                return false;
            }
        }
        if self.pending > 0 {
            self.pending -= 1;
            if self.pending == 0 {
                self.marked_at = None;
            }
            true
        } else {
            false
        }
    }
}

/// C2: samples media state, derives rebuffering/freezing, and broadcasts
/// observations.
pub struct PlaybackObserver {
    config: ClockConfig,
    low_latency: bool,
    shared: SharedReference<Option<Observation>>,
    event_tx: mpsc::UnboundedSender<MediaEvent>,
    event_rx: mpsc::UnboundedReceiver<MediaEvent>,
    seek_tracker: InternalSeekTracker,
}

impl PlaybackObserver {
    pub fn new(config: ClockConfig, low_latency: bool) -> Self {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        Self {
            config,
            low_latency,
            shared: SharedReference::new(None),
            event_tx,
            event_rx,
            seek_tracker: InternalSeekTracker::new(),
        }
    }

    pub fn subscribe(&self) -> Subscription<Option<Observation>> {
        self.shared.subscribe()
    }

    /// Handle for pushing host media events in from outside the run loop.
    pub fn event_sender(&self) -> mpsc::UnboundedSender<MediaEvent> {
        self.event_tx.clone()
    }

    /// Marks the next `seeking` event as internally triggered (§4.2
    /// `setCurrentTime`), so it is distinguishable from a user seek.
    pub fn mark_internal_seek(&mut self) {
        self.seek_tracker.mark(Instant::now());
    }

    /// Runs until `token` is cancelled, sampling on a timer and on pushed
    /// media events, computing and broadcasting one [`Observation`] per tick.
    pub async fn run(
        &mut self,
        mut read_state: impl FnMut() -> (MediaState, RangeSet) + Send,
        token: CancellationToken,
    ) {
        let mut rebuffering: Option<RebufferingStatus> = None;
        let mut freezing: Option<FreezingStatus> = None;
        let mut last_seen_position: Option<f64> = None;
        let mut initial_load = true;

        loop {
            let (state, buffered) = read_state();
            let interval = self
                .config
                .sampling_interval(self.low_latency, state.has_media_source);

            let event: &'static str;
            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(interval) => { event = "timeupdate"; }
                maybe_event = self.event_rx.recv() => {
                    match maybe_event {
                        Some(MediaEvent::CanPlay) => event = "canplay",
                        Some(MediaEvent::Play) => event = "play",
                        Some(MediaEvent::Seeking) => event = "seeking",
                        Some(MediaEvent::Seeked) => event = "seeked",
                        Some(MediaEvent::LoadedMetadata) => event = "loadedmetadata",
                        Some(MediaEvent::RateChange) => event = "ratechange",
                        Some(MediaEvent::TimeUpdate) => event = "timeupdate",
                        None => break,
                    }
                }
            }

            let now = Instant::now();
            let buffer_gap = buffered.left_size(state.position);
            let is_internal_seek = event == "seeking"
                && self
                    .seek_tracker
                    .consume_on_seeking(now, self.config.internal_seek_reconcile_timeout);

            if state.has_media_source {
                self.update_rebuffering_with_media_source(
                    &state,
                    buffer_gap,
                    event,
                    initial_load,
                    now,
                    &mut rebuffering,
                );
            } else {
                self.update_rebuffering_without_media_source(
                    &state,
                    buffer_gap,
                    event,
                    &mut last_seen_position,
                    now,
                    &mut rebuffering,
                );
            }

            if rebuffering.is_none() {
                self.update_freezing(&state, buffer_gap, &mut last_seen_position, now, &mut freezing);
            } else {
                freezing = None;
            }

            if event != "timeupdate" || state.ready_state > 0 {
                initial_load = false;
            }

            let observation = Observation {
                position: state.position,
                buffer_gap,
                buffered,
                duration: state.duration,
                playback_rate: state.playback_rate,
                ready_state: state.ready_state,
                paused: state.paused,
                seeking: state.seeking,
                ended: state.ended,
                event,
                rebuffering,
                freezing,
                internal_seek: is_internal_seek,
                timestamp: now,
            };
            trace!(?observation.position, ?observation.buffer_gap, ?observation.rebuffering, "observation");
            self.shared.set(Some(observation));
        }
    }

    fn update_rebuffering_with_media_source(
        &self,
        state: &MediaState,
        buffer_gap: f64,
        event: &str,
        initial_load: bool,
        now: Instant,
        rebuffering: &mut Option<RebufferingStatus>,
    ) {
        let rebuffer_gap = self.config.rebuffer_gap(self.low_latency);

        if let Some(status) = *rebuffering {
            let resume_gap = self.config.resume_gap(status.reason, self.low_latency);
            let should_exit = state.ready_state > 1
                && (state.fully_loaded || state.ended || (buffer_gap.is_finite() && buffer_gap > resume_gap));
            if should_exit {
                *rebuffering = None;
            }
            return;
        }

        let can_enter = state.ready_state >= 1 && !initial_load && !state.ended && !state.fully_loaded;
        if !can_enter {
            return;
        }

        let gap_triggers = buffer_gap <= rebuffer_gap || buffer_gap.is_infinite();
        if gap_triggers {
            let reason = if event == "seeking" || state.seeking {
                RebufferingReason::Seeking
            } else if state.ready_state < 2 {
                RebufferingReason::NotReady
            } else {
                RebufferingReason::Buffering
            };
            *rebuffering = Some(RebufferingStatus {
                reason,
                since: now,
                target: None,
            });
        }
    }

    fn update_rebuffering_without_media_source(
        &mut self,
        state: &MediaState,
        buffer_gap: f64,
        event: &str,
        last_seen_position: &mut Option<f64>,
        now: Instant,
        rebuffering: &mut Option<RebufferingStatus>,
    ) {
        if let Some(_status) = *rebuffering {
            if state.position != last_seen_position.unwrap_or(f64::NAN) {
                *rebuffering = None;
            }
            *last_seen_position = Some(state.position);
            return;
        }

        let unchanged_twice = *last_seen_position == Some(state.position);
        *last_seen_position = Some(state.position);

        let enters_on_stall = !state.paused && unchanged_twice;
        let enters_on_seek = event == "seeking" && buffer_gap.is_infinite();

        if enters_on_stall || enters_on_seek {
            *rebuffering = Some(RebufferingStatus {
                reason: if enters_on_seek {
                    RebufferingReason::Seeking
                } else {
                    RebufferingReason::Buffering
                },
                since: now,
                target: None,
            });
        }
    }

    fn update_freezing(
        &self,
        state: &MediaState,
        buffer_gap: f64,
        last_seen_position: &mut Option<f64>,
        now: Instant,
        freezing: &mut Option<FreezingStatus>,
    ) {
        let unchanged = *last_seen_position == Some(state.position);
        *last_seen_position = Some(state.position);
        let should_freeze = state.ready_state >= 1
            && !state.paused
            && !state.ended
            && state.playback_rate != 0.0
            && buffer_gap > self.config.freezing_gap_threshold
            && unchanged;

        match (should_freeze, *freezing) {
            (true, None) => *freezing = Some(FreezingStatus { since: now }),
            (false, Some(_)) => *freezing = None,
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::range::BufferedRange;

    fn state(position: f64, ready_state: u8, has_media_source: bool) -> MediaState {
        MediaState {
            position,
            duration: 120.0,
            playback_rate: 1.0,
            ready_state,
            paused: false,
            seeking: false,
            ended: false,
            has_media_source,
            fully_loaded: false,
        }
    }

    #[test]
    fn rebuffer_enters_at_low_gap_and_exits_past_resume_gap() {
        let cfg = ClockConfig {
            resume_gap_buffering: 3.0,
            ..ClockConfig::default()
        };
        let observer = PlaybackObserver::new(cfg, false);
        let mut rebuffering = None;

        let trajectory = [3.0, 1.5, 0.8, 0.4, 0.6, 1.2, 2.5, 4.0];
        let mut entered_at = None;
        let mut exited_at = None;
        for (i, gap) in trajectory.iter().enumerate() {
            let st = state(10.0 + i as f64, 2, true);
            observer.update_rebuffering_with_media_source(
                &st,
                *gap,
                "timeupdate",
                false,
                Instant::now(),
                &mut rebuffering,
            );
            if rebuffering.is_some() && entered_at.is_none() {
                entered_at = Some(i);
            }
            if rebuffering.is_none() && entered_at.is_some() && exited_at.is_none() {
                exited_at = Some(i);
            }
        }
        assert_eq!(entered_at, Some(2)); // gap 0.8 <= default rebuffer_gap 1.0
        assert_eq!(exited_at, Some(7)); // gap 4.0 > resume_gap 3.0
    }

    #[test]
    fn freezing_requires_stalled_position_with_sufficient_gap() {
        let observer = PlaybackObserver::new(ClockConfig::default(), false);
        let mut last_seen = Some(5.0);
        let mut freezing = None;
        let st = state(5.0, 2, true);
        observer.update_freezing(&st, 15.0, &mut last_seen, Instant::now(), &mut freezing);
        assert!(freezing.is_some());
    }

    #[test]
    fn no_freezing_when_position_advances() {
        let observer = PlaybackObserver::new(ClockConfig::default(), false);
        let mut last_seen = Some(4.0);
        let mut freezing = None;
        let st = state(5.0, 2, true);
        observer.update_freezing(&st, 15.0, &mut last_seen, Instant::now(), &mut freezing);
        assert!(freezing.is_none());
    }

    #[test]
    fn internal_seek_marker_is_consumed_once() {
        let mut tracker = InternalSeekTracker::new();
        let now = Instant::now();
        tracker.mark(now);
        assert!(tracker.consume_on_seeking(now, Duration::from_secs(2)));
        assert!(!tracker.consume_on_seeking(now, Duration::from_secs(2)));
    }

    #[test]
    fn internal_seek_marker_expires_after_timeout() {
        let mut tracker = InternalSeekTracker::new();
        let marked_at = Instant::now();
        tracker.mark(marked_at);
        let later = marked_at + Duration::from_secs(5);
        assert!(!tracker.consume_on_seeking(later, Duration::from_secs(2)));
    }

    #[tokio::test]
    async fn run_emits_observations_until_cancelled() {
        tokio::time::pause();
        let mut observer = PlaybackObserver::new(
            ClockConfig {
                with_media_source_interval: Duration::from_millis(5),
                ..ClockConfig::default()
            },
            false,
        );
        let mut sub = observer.subscribe();
        let token = CancellationToken::new();
        let token_clone = token.clone();

        let buffered = RangeSet::from_ranges(vec![BufferedRange::new(0.0, 100.0)]);
        let handle = tokio::spawn(async move {
            observer
                .run(move || (state(1.0, 4, true), buffered.clone()), token_clone)
                .await;
        });

        let first = sub.next().await;
        assert!(first.unwrap().is_some());
        token.cancel();
        handle.await.unwrap();
    }
}
