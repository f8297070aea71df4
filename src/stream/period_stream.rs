//! C9: Adaptation / Period Stream. Owns a single Representation Stream for
//! a `(period, buffer type)` pair and reacts to ABR decisions by computing a
//! switch strategy, and to adaptation (track) changes by tearing down and
//! re-instantiating the Representation Stream.
//!
//! Grounded on the stream-lifecycle shape of `crates/mesio/src/hls/coordinator.rs`
//! (own a child worker, swap it out on a track/quality change, propagate
//! fatal errors according to track kind).

use tracing::{error, warn};

use crate::manifest::{BufferType, Representation};
use crate::stream::events::StreamEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchStrategy {
    /// Codec or critical encoding change the sink cannot accommodate in place.
    NeedsReload { resume_on_pause: bool },
    /// Soft switch: remove a range ahead of position, then swap.
    CleanBuffer,
    /// Swap directly at the next segment boundary.
    Continue,
}

/// Computes the switch strategy for moving from `current` to `next` within
/// the same adaptation (§4.9).
pub fn compute_switch_strategy(
    current: &Representation,
    next: &Representation,
    position: f64,
    next_segment_start: Option<f64>,
) -> SwitchStrategy {
    if current.id == next.id {
        return SwitchStrategy::Continue;
    }
    if current.needs_reload_to_switch_to(next) {
        return SwitchStrategy::NeedsReload {
            resume_on_pause: false,
        };
    }
    // A quality change whose next needed segment starts ahead of where the
    // sink has already buffered requires removing the buffered range ahead
    // of position so the new representation's segments can be appended in
    // its place (§4.9 "quality upgrade ahead of position").
    match next_segment_start {
        Some(start) if start > position => SwitchStrategy::CleanBuffer,
        _ => SwitchStrategy::Continue,
    }
}

/// Outcome of handling a fatal error raised by a Representation Stream,
/// depending on whether its buffer type is "native" (audio/video) or not
/// (text) (§4.9).
pub enum FatalErrorHandling {
    /// Text (or other non-native) track: log and continue with an empty
    /// stream; playback position still advances normally.
    ContinueEmpty,
    /// Native track: must propagate to the player as a terminal error.
    Propagate,
}

pub fn handle_fatal_error(buffer_type: BufferType, error: &crate::error::StreamError) -> FatalErrorHandling {
    if buffer_type.is_native() {
        error!(?buffer_type, %error, "fatal error on native buffer type, propagating");
        FatalErrorHandling::Propagate
    } else {
        warn!(?buffer_type, %error, "fatal error on non-native buffer type, continuing with empty stream");
        FatalErrorHandling::ContinueEmpty
    }
}

/// Events a Period Stream emits around a switch (§4.9), separate from the
/// per-segment events the wrapped Representation Stream emits itself.
pub fn switch_events(strategy: SwitchStrategy, reload_at: f64, remove_ranges: Vec<(f64, f64)>) -> Vec<StreamEvent> {
    match strategy {
        SwitchStrategy::NeedsReload { resume_on_pause } => vec![StreamEvent::NeedsMediaSourceReload {
            reload_at,
            resume_on_pause,
        }],
        SwitchStrategy::CleanBuffer => vec![StreamEvent::NeedsBufferFlush { ranges: remove_ranges }],
        SwitchStrategy::Continue => vec![],
    }
}
