//! C8: Representation Stream. Drives one `(period, adaptation,
//! representation)` against a dedicated sink: computes the wanted range,
//! finds holes via C1, schedules segment fetches at priorities derived from
//! distance-to-playhead, and appends parsed chunks through C7.
//!
//! Grounded on the fetch-loop shape of `crates/mesio/src/hls/scheduler.rs`
//! (a loop that reads current state, decides what to fetch next, and awaits
//! a `FuturesUnordered` of in-flight requests), generalized from "next HLS
//! media sequence" to "holes in the wanted range".

use std::sync::Arc;

use futures::stream::FuturesUnordered;
use futures::StreamExt;
use parking_lot::Mutex as SyncMutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use crate::config::BufferConfig;
use crate::manifest::{AdaptationId, BufferType, PeriodId, Representation, RepresentationId};
use crate::stream::bandwidth::{BandwidthEstimator, ThroughputSample};
use crate::stream::clock::Observation;
use crate::stream::events::StreamEvent;
use crate::stream::fetcher::SegmentFetcher;
use crate::stream::prioritizer::Prioritizer;
use crate::stream::score::ScoreTracker;
use crate::stream::sink::SegmentSink;
use crate::transport::{AppendWindow, ParsedSegment, Progress, SegmentContext};
use url::Url;

/// Bucketed priority: closer to the playhead is lower (higher priority),
/// per §4.8 step 4 ("priorityLevel(segment.start - position)").
pub fn priority_level(distance_from_playhead: f64) -> i32 {
    match distance_from_playhead {
        d if d <= 0.0 => 0,
        d if d <= 4.0 => 1,
        d if d <= 12.0 => 2,
        d if d <= 30.0 => 3,
        _ => 4,
    }
}

pub struct RepresentationStreamContext {
    pub period: PeriodId,
    pub adaptation: AdaptationId,
    pub buffer_type: BufferType,
    pub base_url: Url,
}

/// Drives segment acquisition for a single representation.
pub struct RepresentationStream {
    ctx: RepresentationStreamContext,
    representation: Representation,
    sink: Arc<SegmentSink>,
    fetcher: Arc<SegmentFetcher>,
    prioritizer: Arc<SyncMutex<Prioritizer>>,
    bandwidth: Arc<SyncMutex<BandwidthEstimator>>,
    scores: Arc<SyncMutex<ScoreTracker>>,
    buffer_config: BufferConfig,
    events: mpsc::UnboundedSender<StreamEvent>,
    init_appended: SyncMutex<bool>,
}

impl RepresentationStream {
    pub fn new(
        ctx: RepresentationStreamContext,
        representation: Representation,
        sink: Arc<SegmentSink>,
        fetcher: Arc<SegmentFetcher>,
        prioritizer: Arc<SyncMutex<Prioritizer>>,
        bandwidth: Arc<SyncMutex<BandwidthEstimator>>,
        scores: Arc<SyncMutex<ScoreTracker>>,
        buffer_config: BufferConfig,
        events: mpsc::UnboundedSender<StreamEvent>,
    ) -> Self {
        Self {
            ctx,
            representation,
            sink,
            fetcher,
            prioritizer,
            bandwidth,
            scores,
            buffer_config,
            events,
            init_appended: SyncMutex::new(false),
        }
    }

    pub fn representation_id(&self) -> RepresentationId {
        self.representation.id
    }

    /// One scheduling pass: given the latest observation and period end,
    /// determines holes in the wanted range and fetches what's missing.
    /// Runs fetches concurrently, honoring `token` for cancellation on
    /// representation switch or a position jump past the fetched range.
    #[instrument(skip_all, fields(representation = self.representation.id.0))]
    pub async fn run_once(
        &self,
        observation: &Observation,
        period_end: Option<f64>,
        token: &CancellationToken,
    ) -> Result<(), crate::error::StreamError> {
        let position = observation.position;
        let wanted_end = match period_end {
            Some(end) => (position + self.buffer_config.wanted_buffer_ahead).min(end),
            None => position + self.buffer_config.wanted_buffer_ahead,
        };
        if wanted_end <= position {
            return Ok(());
        }

        let buffered = self.sink.buffered_ranges();
        let needs_init = !*self.init_appended.lock() && self.representation.segment_index.init_segment().is_some();

        let holes = buffered.holes(position, wanted_end);
        if holes.is_empty() && !needs_init {
            if period_end.is_some_and(|end| buffered.contains_range(position, end)) {
                self.events
                    .send(StreamEvent::StreamComplete {
                        buffer_type: self.ctx.buffer_type,
                    })
                    .ok();
            }
            return Ok(());
        }

        let mut pending = FuturesUnordered::new();

        if needs_init {
            if let Some(init_segment) = self.representation.segment_index.init_segment().cloned() {
                pending.push(self.fetch_and_append(init_segment, position, token.clone()));
            }
        }

        if let Some(first_hole) = holes.first() {
            let segments = self
                .representation
                .segment_index
                .segments_in_range(first_hole.start, first_hole.end);
            for segment in segments {
                pending.push(self.fetch_and_append(segment.clone(), position, token.clone()));
            }
        }

        while let Some(result) = pending.next().await {
            if let Err(err) = result {
                if matches!(err, crate::error::StreamError::Cancelled) {
                    debug!("fetch cancelled mid-pass");
                    continue;
                }
                return Err(err);
            }
        }

        Ok(())
    }

    async fn fetch_and_append(
        &self,
        segment: crate::manifest::Segment,
        position: f64,
        token: CancellationToken,
    ) -> Result<(), crate::error::StreamError> {
        let priority = priority_level(segment.time - position);
        let (task_id, fetch_token, resume_rx) = self.prioritizer.lock().submit(priority);
        let combined = token.child_token();

        tokio::select! {
            _ = combined.cancelled() => {
                self.prioritizer.lock().cancel(task_id);
                return Err(crate::error::StreamError::Cancelled);
            }
            _ = fetch_token.cancelled() => {
                return Err(crate::error::StreamError::Cancelled);
            }
            res = resume_rx => {
                if res.is_err() {
                    return Err(crate::error::StreamError::Cancelled);
                }
            }
        }

        let context = SegmentContext {
            representation: self.representation.clone(),
            segment: segment.clone(),
            base_url: self.ctx.base_url.clone(),
        };

        let no_progress = |_: Progress| {};
        let no_chunk = |_: bytes::Bytes| {};

        let result = self
            .fetcher
            .fetch(&context, &[], &no_progress, &no_chunk, None, combined.clone())
            .await;

        self.prioritizer.lock().complete(task_id);

        let fetch_result = result?;
        self.bandwidth.lock().add_sample(ThroughputSample {
            bytes: fetch_result.sample.bytes,
            duration: fetch_result.sample.duration,
        });
        let request_duration = fetch_result.sample.duration.as_secs_f64();
        self.scores
            .lock()
            .record(self.representation.id, segment.duration, request_duration);

        match fetch_result.parsed {
            ParsedSegment::Init {
                initialization_data,
                ..
            } => {
                self.sink
                    .append_buffer(initialization_data, AppendWindow { start: 0.0, end: f64::INFINITY }, 0.0, &self.representation.codec)
                    .await?;
                *self.init_appended.lock() = true;
            }
            ParsedSegment::Media {
                chunk_data,
                chunk_offset,
                append_window,
                ..
            } => {
                self.sink
                    .append_buffer(chunk_data, append_window, chunk_offset, &self.representation.codec)
                    .await?;
                self.events
                    .send(StreamEvent::AddedSegment {
                        period: self.ctx.period,
                        representation: self.representation.id,
                        segment_id: segment.id,
                        buffered: self.sink.buffered_ranges(),
                    })
                    .ok();
            }
        }

        Ok(())
    }

    pub fn emit_representation_change(&self) {
        self.events
            .send(StreamEvent::RepresentationChange {
                period: self.ctx.period,
                representation: self.representation.id,
                buffer_type: self.ctx.buffer_type,
            })
            .ok();
    }
}

/// Whether, given the previous and current buffered ranges and a jump
/// target, in-flight fetches should be cancelled because the position moved
/// past the previously fetched range beyond a policy margin (§4.8 step 6).
pub fn position_jumped_past_fetch_margin(previous_position: f64, new_position: f64, margin: f64) -> bool {
    (new_position - previous_position).abs() > margin
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_level_is_monotonic_in_distance() {
        assert_eq!(priority_level(-1.0), 0);
        assert_eq!(priority_level(0.0), 0);
        assert_eq!(priority_level(3.0), 1);
        assert_eq!(priority_level(10.0), 2);
        assert_eq!(priority_level(20.0), 3);
        assert_eq!(priority_level(100.0), 4);
        let mut last = priority_level(0.0);
        for d in [2.0, 6.0, 15.0, 40.0] {
            let p = priority_level(d);
            assert!(p >= last);
            last = p;
        }
    }

    #[test]
    fn small_jumps_do_not_trigger_cancellation() {
        assert!(!position_jumped_past_fetch_margin(10.0, 11.0, 5.0));
    }

    #[test]
    fn large_jumps_trigger_cancellation() {
        assert!(position_jumped_past_fetch_margin(10.0, 50.0, 5.0));
    }
}
