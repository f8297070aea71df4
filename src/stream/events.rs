//! Emitted events (§6 "Emitted events"), grounded on the tagged-variant
//! shape of `crates/mesio/src/hls/events.rs`'s `HlsStreamEvent`.

use crate::manifest::{AdaptationId, BufferType, PeriodId, RepresentationId};
use crate::stream::range::RangeSet;
use std::time::Duration;

#[derive(Debug, Clone)]
pub enum StreamEvent {
    PeriodStreamReady {
        period: PeriodId,
        buffer_type: BufferType,
    },
    AdaptationChange {
        period: PeriodId,
        adaptation: AdaptationId,
        buffer_type: BufferType,
    },
    RepresentationChange {
        period: PeriodId,
        representation: RepresentationId,
        buffer_type: BufferType,
    },
    BitrateEstimationChange {
        buffer_type: BufferType,
        bitrate: Option<u64>,
    },
    AddedSegment {
        period: PeriodId,
        representation: RepresentationId,
        segment_id: u64,
        buffered: RangeSet,
    },
    StreamComplete {
        buffer_type: BufferType,
    },
    NeedsManifestRefresh,
    NeedsMediaSourceReload {
        reload_at: f64,
        resume_on_pause: bool,
    },
    NeedsBufferFlush {
        ranges: Vec<(f64, f64)>,
    },
    NeedsDecipherabilityFlush,
    EndOfStream,
    ResumeStream,
    Warning(String),
    Stalled {
        reason: GapSkipReasonLike,
    },
    Unstalled,
    EncryptionDataEncountered,
}

/// Mirrors the teacher's `GapSkipReason` shape (`crates/mesio/src/hls/events.rs`)
/// generalized to this crate's own stall cause taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GapSkipReasonLike {
    BufferUnderrun,
    AwaitingSegment,
    SinkRecovering,
}

impl GapSkipReasonLike {
    /// How long a stall of this kind is expected to self-resolve without
    /// intervention, purely informational for logging/telemetry.
    pub fn typical_resolution_hint(&self) -> Duration {
        match self {
            GapSkipReasonLike::BufferUnderrun => Duration::from_secs(2),
            GapSkipReasonLike::AwaitingSegment => Duration::from_millis(500),
            GapSkipReasonLike::SinkRecovering => Duration::from_secs(1),
        }
    }
}
