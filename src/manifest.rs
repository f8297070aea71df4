//! §3 data model: Periods, Adaptations, Representations, Segments.
//!
//! The manifest parser itself is an external collaborator (§6); this module
//! only defines the shapes the streaming orchestration layer consumes. The
//! Period/Adaptation relationship is modeled with index-based handles rather
//! than owning back-pointers, per the §9 redesign note ("Cyclic reference
//! between Adaptation and Period... use index-based handles resolved via the
//! Manifest accessor").

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeriodId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AdaptationId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RepresentationId(pub u32);

/// Audio / video / text track kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferType {
    Audio,
    Video,
    Text,
}

impl BufferType {
    /// Native types propagate fatal sink errors; text does not (§4.9).
    pub fn is_native(&self) -> bool {
        !matches!(self, BufferType::Text)
    }
}

/// A single time-contiguous media chunk within a Representation (§3).
#[derive(Debug, Clone)]
pub struct Segment {
    pub id: u64,
    /// Presentation start time, in seconds.
    pub time: f64,
    pub duration: f64,
    pub byte_range: Option<(u64, u64)>,
    pub is_init: bool,
    pub timestamp_offset: f64,
}

impl Segment {
    pub fn end(&self) -> f64 {
        self.time + self.duration
    }
}

/// Lazy sequence of segments for a Representation. Segments within a
/// Representation have non-decreasing start times (§3 invariant).
#[derive(Debug, Clone, Default)]
pub struct SegmentIndex {
    segments: Vec<Segment>,
}

impl SegmentIndex {
    pub fn new(segments: Vec<Segment>) -> Self {
        debug_assert!(
            segments.windows(2).all(|w| w[0].time <= w[1].time),
            "segments must have non-decreasing start times"
        );
        Self { segments }
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Segments overlapping `[start, end)`.
    pub fn segments_in_range(&self, start: f64, end: f64) -> Vec<&Segment> {
        self.segments
            .iter()
            .filter(|s| s.end() > start && s.time < end)
            .collect()
    }

    pub fn init_segment(&self) -> Option<&Segment> {
        self.segments.iter().find(|s| s.is_init)
    }

    pub fn last_segment_end(&self) -> Option<f64> {
        self.segments.last().map(|s| s.end())
    }

    pub fn all(&self) -> &[Segment] {
        &self.segments
    }
}

/// A single encoding (bitrate/codec) of an Adaptation.
#[derive(Debug, Clone)]
pub struct Representation {
    pub id: RepresentationId,
    pub bitrate: u64,
    pub codec: String,
    pub mime: String,
    pub segment_index: SegmentIndex,
    /// Updated atomically by the DRM supervisor (§3 Ownership).
    decipherable: Arc<AtomicBool>,
}

impl Representation {
    pub fn new(
        id: RepresentationId,
        bitrate: u64,
        codec: impl Into<String>,
        mime: impl Into<String>,
        segment_index: SegmentIndex,
    ) -> Self {
        Self {
            id,
            bitrate,
            codec: codec.into(),
            mime: mime.into(),
            segment_index,
            decipherable: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn is_decipherable(&self) -> bool {
        self.decipherable.load(Ordering::Acquire)
    }

    pub fn set_decipherable(&self, value: bool) {
        self.decipherable.store(value, Ordering::Release);
    }

    /// Whether `other` requires a media-source reload to switch into from
    /// this representation (different codec family), used by §4.9's
    /// switch-strategy computation.
    pub fn needs_reload_to_switch_to(&self, other: &Representation) -> bool {
        codec_family(&self.codec) != codec_family(&other.codec)
    }
}

/// Crude codec-family extraction (e.g. `avc1.4d401e` -> `avc1`,
/// `hvc1.2.4.L93.B0` -> `hvc1`). Real codec negotiation is out of scope
/// (§1); this only needs to tell "same family" from "different family".
fn codec_family(codec: &str) -> &str {
    codec.split('.').next().unwrap_or(codec)
}

/// A track-variant family (e.g. "English audio"), holding alternative
/// Representations ordered by bitrate.
#[derive(Debug, Clone)]
pub struct Adaptation {
    pub id: AdaptationId,
    pub buffer_type: BufferType,
    pub representations: Vec<Representation>,
}

impl Adaptation {
    /// Representations currently usable: decipherable.
    pub fn playable_representations(&self) -> Vec<&Representation> {
        self.representations
            .iter()
            .filter(|r| r.is_decipherable())
            .collect()
    }

    pub fn representation(&self, id: RepresentationId) -> Option<&Representation> {
        self.representations.iter().find(|r| r.id == id)
    }
}

/// A time interval of the presentation with a fixed set of Adaptations.
#[derive(Debug, Clone)]
pub struct Period {
    pub id: PeriodId,
    pub start: f64,
    pub end: Option<f64>,
    pub adaptations: Vec<Adaptation>,
}

impl Period {
    pub fn adaptation(&self, id: AdaptationId) -> Option<&Adaptation> {
        self.adaptations.iter().find(|a| a.id == id)
    }

    pub fn adaptation_of_kind(&self, kind: BufferType) -> Option<&Adaptation> {
        self.adaptations.iter().find(|a| a.buffer_type == kind)
    }
}

/// Ordered sequence of Periods (§3). Immutable after construction except for
/// representation decipherability flags.
#[derive(Debug, Clone, Default)]
pub struct Manifest {
    pub periods: Vec<Period>,
    pub duration: Option<f64>,
}

impl Manifest {
    pub fn period(&self, id: PeriodId) -> Option<&Period> {
        self.periods.iter().find(|p| p.id == id)
    }

    pub fn get_duration(&self) -> Option<f64> {
        self.duration
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(id: u64, time: f64, duration: f64, is_init: bool) -> Segment {
        Segment {
            id,
            time,
            duration,
            byte_range: None,
            is_init,
            timestamp_offset: 0.0,
        }
    }

    #[test]
    fn segments_in_range_is_half_open_overlap() {
        let idx = SegmentIndex::new(vec![seg(0, 0.0, 4.0, false), seg(1, 4.0, 4.0, false)]);
        let hits = idx.segments_in_range(3.0, 4.0);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, 0);
    }

    #[test]
    fn decipherability_flag_is_shared_and_atomic() {
        let rep = Representation::new(
            RepresentationId(0),
            1000,
            "avc1.4d401e",
            "video/mp4",
            SegmentIndex::default(),
        );
        assert!(rep.is_decipherable());
        rep.set_decipherable(false);
        assert!(!rep.is_decipherable());
    }

    #[test]
    fn reload_needed_across_codec_families_only() {
        let avc = Representation::new(
            RepresentationId(0),
            1000,
            "avc1.4d401e",
            "video/mp4",
            SegmentIndex::default(),
        );
        let avc_other_level = Representation::new(
            RepresentationId(1),
            2000,
            "avc1.640028",
            "video/mp4",
            SegmentIndex::default(),
        );
        let hevc = Representation::new(
            RepresentationId(2),
            2000,
            "hvc1.2.4.L93.B0",
            "video/mp4",
            SegmentIndex::default(),
        );
        assert!(!avc.needs_reload_to_switch_to(&avc_other_level));
        assert!(avc.needs_reload_to_switch_to(&hevc));
    }
}
