//! Engine configuration.
//!
//! Grouped into small `*Config` structs the way `crates/mesio/src/config.rs`
//! and `crates/mesio/src/hls/config.rs` group `DownloaderConfig` /
//! `HlsPerformanceConfig`, rather than one flat struct.

use std::time::Duration;

/// Where playback should start (§6 `startAt`, §9 redesign: tagged variants
/// instead of a dynamic parameter object).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StartAt {
    Position(f64),
    WallClockTime(f64),
    FromFirstPosition(f64),
    FromLastPosition(f64),
    /// `0` -> start, `>= 100` -> duration, else `duration * pct / 100`.
    /// Negative values are treated as 0 (§8 boundary behaviors).
    Percentage(f64),
}

impl StartAt {
    /// Resolve to an absolute position given the presentation duration.
    pub fn resolve(&self, duration: f64) -> f64 {
        match *self {
            StartAt::Position(p) => p,
            StartAt::WallClockTime(t) => t,
            StartAt::FromFirstPosition(p) => p,
            StartAt::FromLastPosition(p) => (duration - p).max(0.0),
            StartAt::Percentage(pct) => {
                let pct = pct.max(0.0);
                if pct <= 0.0 {
                    0.0
                } else if pct >= 100.0 {
                    duration
                } else {
                    duration * (pct / 100.0)
                }
            }
        }
    }
}

/// Sampling intervals and rebuffer/resume gaps for the playback observer (§4.2).
#[derive(Debug, Clone)]
pub struct ClockConfig {
    /// Sampling interval in low-latency mode.
    pub low_latency_interval: Duration,
    /// Sampling interval with a media source attached, default profile.
    pub with_media_source_interval: Duration,
    /// Sampling interval with no media source attached.
    pub no_media_source_interval: Duration,
    /// Enter rebuffering when bufferGap <= this (default profile).
    pub rebuffer_gap: f64,
    /// Enter rebuffering when bufferGap <= this (low-latency profile).
    pub low_latency_rebuffer_gap: f64,
    /// Resume gap per rebuffer reason, default profile.
    pub resume_gap_seeking: f64,
    pub resume_gap_not_ready: f64,
    pub resume_gap_buffering: f64,
    /// Resume gap per rebuffer reason, low-latency profile.
    pub low_latency_resume_gap_seeking: f64,
    pub low_latency_resume_gap_not_ready: f64,
    pub low_latency_resume_gap_buffering: f64,
    /// Freezing threshold: bufferGap above which a stalled position is
    /// reported as "freezing" rather than "rebuffering".
    pub freezing_gap_threshold: f64,
    /// How long an internal-seek marker may sit unconfirmed before the
    /// clock reconciles it away (Open Question #2 in DESIGN.md).
    pub internal_seek_reconcile_timeout: Duration,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            low_latency_interval: Duration::from_millis(100),
            with_media_source_interval: Duration::from_millis(1000),
            no_media_source_interval: Duration::from_millis(500),
            rebuffer_gap: 1.0,
            low_latency_rebuffer_gap: 0.5,
            resume_gap_seeking: 5.0,
            resume_gap_not_ready: 5.0,
            resume_gap_buffering: 5.0,
            low_latency_resume_gap_seeking: 3.0,
            low_latency_resume_gap_not_ready: 3.0,
            low_latency_resume_gap_buffering: 3.0,
            freezing_gap_threshold: 10.0,
            internal_seek_reconcile_timeout: Duration::from_secs(2),
        }
    }
}

impl ClockConfig {
    pub fn rebuffer_gap(&self, low_latency: bool) -> f64 {
        if low_latency {
            self.low_latency_rebuffer_gap
        } else {
            self.rebuffer_gap
        }
    }

    pub fn sampling_interval(&self, low_latency: bool, has_media_source: bool) -> Duration {
        if low_latency {
            self.low_latency_interval
        } else if has_media_source {
            self.with_media_source_interval
        } else {
            self.no_media_source_interval
        }
    }

    pub fn resume_gap(&self, reason: RebufferingReason, low_latency: bool) -> f64 {
        match (reason, low_latency) {
            (RebufferingReason::Seeking, false) => self.resume_gap_seeking,
            (RebufferingReason::NotReady, false) => self.resume_gap_not_ready,
            (RebufferingReason::Buffering, false) => self.resume_gap_buffering,
            (RebufferingReason::Seeking, true) => self.low_latency_resume_gap_seeking,
            (RebufferingReason::NotReady, true) => self.low_latency_resume_gap_not_ready,
            (RebufferingReason::Buffering, true) => self.low_latency_resume_gap_buffering,
        }
    }
}

/// Why playback is currently rebuffering (§3 `Observation.rebuffering.reason`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebufferingReason {
    Seeking,
    NotReady,
    Buffering,
}

/// ABR bitrate bounds and manual override (§6).
#[derive(Debug, Clone, Copy)]
pub struct AbrConfig {
    pub min_auto_bitrate: u64,
    pub max_auto_bitrate: u64,
    /// `< 0` means auto; `>= 0` is a manual bitrate override.
    pub manual_bitrate: i64,
    pub initial_bitrate: u64,
    /// bufferGap at or below which `forceBandwidthMode` flips true.
    pub force_bandwidth_mode_enter_gap: f64,
    /// bufferGap above which `forceBandwidthMode` flips back false.
    pub force_bandwidth_mode_exit_gap: f64,
}

impl Default for AbrConfig {
    fn default() -> Self {
        Self {
            min_auto_bitrate: 0,
            max_auto_bitrate: u64::MAX,
            manual_bitrate: -1,
            initial_bitrate: 0,
            force_bandwidth_mode_enter_gap: 5.0,
            force_bandwidth_mode_exit_gap: 10.0,
        }
    }
}

/// Retry/backoff knobs shared by segment and manifest fetches (§7 item 1).
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// `None` means unbounded retries (each attempt still individually bounded).
    pub max_retry: Option<u32>,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter: bool,
    pub request_timeout: Duration,
    pub connection_timeout: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retry: Some(4),
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(3),
            jitter: true,
            request_timeout: Duration::from_secs(15),
            connection_timeout: Duration::from_secs(8),
        }
    }
}

/// CDN cooldown/scoring knobs (§4.6.1).
#[derive(Debug, Clone)]
pub struct CdnConfig {
    pub cooldown: Duration,
    /// EWMA weight given to the most recent outcome when updating a CDN's score.
    pub score_ewma_alpha: f64,
}

impl Default for CdnConfig {
    fn default() -> Self {
        Self {
            cooldown: Duration::from_secs(30),
            score_ewma_alpha: 0.3,
        }
    }
}

/// Task prioritizer thresholds (§4.5): `high < low`.
#[derive(Debug, Clone, Copy)]
pub struct PrioritizerConfig {
    pub high: i32,
    pub low: i32,
    /// Maximum concurrently running tasks (ambient addition: §C in
    /// SPEC_FULL.md, grounded on `download_concurrency` in `scheduler.rs`).
    pub max_concurrency: usize,
}

impl Default for PrioritizerConfig {
    fn default() -> Self {
        Self {
            high: 0,
            low: 10,
            max_concurrency: 6,
        }
    }
}

/// Buffer goal and garbage-collection bounds (§6).
#[derive(Debug, Clone, Copy)]
pub struct BufferConfig {
    pub wanted_buffer_ahead: f64,
    pub max_buffer_ahead: f64,
    pub max_buffer_behind: f64,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            wanted_buffer_ahead: 30.0,
            max_buffer_ahead: f64::INFINITY,
            max_buffer_behind: 30.0,
        }
    }
}

/// Top-level engine configuration (§6 "Configuration (options recognized)").
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub low_latency_mode: bool,
    pub buffer: BufferConfig,
    pub abr: AbrConfig,
    pub clock: ClockConfig,
    pub retry: RetryConfig,
    pub cdn: CdnConfig,
    pub prioritizer: PrioritizerConfig,
    pub check_media_segment_integrity: bool,
    pub start_at: Option<StartAt>,
    pub auto_play: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            low_latency_mode: false,
            buffer: BufferConfig::default(),
            abr: AbrConfig::default(),
            clock: ClockConfig::default(),
            retry: RetryConfig::default(),
            cdn: CdnConfig::default(),
            prioritizer: PrioritizerConfig::default(),
            check_media_segment_integrity: false,
            start_at: None,
            auto_play: false,
        }
    }
}
