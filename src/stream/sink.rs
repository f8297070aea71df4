//! C7: FIFO-ordered wrapper over the external [`MediaSink`] (§4.7).
//!
//! Queues `appendBuffer`/`removeBuffer`/`endOfStream` operations so the sink
//! always sees one at a time in submission order (the browser `SourceBuffer`
//! analogue this wraps is itself single-operation-at-a-time), tracks buffered
//! ranges via [`RangeSet`], and on a quota-exceeded error evicts the oldest
//! buffered range once and retries the append exactly once (§4.7 edge case).
//!
//! Grounded on the request-queue discipline in
//! `crates/mesio/src/hls/fetcher.rs` (operations processed one at a time
//! off an internal queue), generalized from "download requests" to
//! "append/remove operations against a sink".

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Mutex as AsyncMutex;
use tracing::warn;

use crate::error::StreamError;
use crate::manifest::BufferType;
use crate::stream::range::{BufferedRange, RangeSet};
use crate::transport::{AppendWindow, MediaSink};

pub struct SegmentSink {
    sink: Arc<dyn MediaSink>,
    buffer_type: BufferType,
    /// Serializes operations against the sink; the sink itself is not
    /// expected to be internally concurrency-safe (§4.7).
    op_lock: AsyncMutex<()>,
    buffered: Mutex<RangeSet>,
}

impl SegmentSink {
    pub fn new(sink: Arc<dyn MediaSink>, buffer_type: BufferType) -> Self {
        Self {
            sink,
            buffer_type,
            op_lock: AsyncMutex::new(()),
            buffered: Mutex::new(RangeSet::new()),
        }
    }

    pub fn buffered_ranges(&self) -> RangeSet {
        self.buffered.lock().clone()
    }

    fn refresh_buffered(&self) {
        let ranges = self
            .sink
            .buffered_ranges()
            .into_iter()
            .map(|(start, end)| BufferedRange::new(start, end))
            .collect();
        *self.buffered.lock() = RangeSet::from_ranges(ranges);
    }

    /// Appends `data`; on `SinkQuotaExceeded`, evicts the oldest buffered
    /// range and retries exactly once (§4.7: "evict, then retry once before
    /// surfacing as fatal").
    pub async fn append_buffer(
        &self,
        data: bytes::Bytes,
        append_window: AppendWindow,
        timestamp_offset: f64,
        codec: &str,
    ) -> Result<(), StreamError> {
        let _guard = self.op_lock.lock().await;

        match self
            .sink
            .append_buffer(data.clone(), append_window, timestamp_offset, codec)
            .await
        {
            Ok(()) => {
                self.refresh_buffered();
                Ok(())
            }
            Err(StreamError::SinkQuotaExceeded) => {
                warn!(buffer_type = ?self.buffer_type, "sink quota exceeded, evicting oldest range");
                self.evict_oldest_locked().await?;
                self.sink
                    .append_buffer(data, append_window, timestamp_offset, codec)
                    .await?;
                self.refresh_buffered();
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    async fn evict_oldest_locked(&self) -> Result<(), StreamError> {
        let oldest = {
            let buffered = self.buffered.lock();
            buffered.as_slice().first().copied()
        };
        if let Some(range) = oldest {
            self.sink.remove_buffer(range.start, range.end).await?;
            self.refresh_buffered();
        }
        Ok(())
    }

    pub async fn remove_buffer(&self, start: f64, end: f64) -> Result<(), StreamError> {
        let _guard = self.op_lock.lock().await;
        self.sink.remove_buffer(start, end).await?;
        self.refresh_buffered();
        Ok(())
    }

    pub async fn end_of_stream(&self) -> Result<(), StreamError> {
        let _guard = self.op_lock.lock().await;
        self.sink.end_of_stream().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex as SyncMutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeSink {
        ranges: SyncMutex<Vec<(f64, f64)>>,
        fail_next_append: AtomicUsize,
        append_calls: AtomicUsize,
    }

    #[async_trait]
    impl MediaSink for FakeSink {
        async fn append_buffer(
            &self,
            data: bytes::Bytes,
            append_window: AppendWindow,
            _timestamp_offset: f64,
            _codec: &str,
        ) -> Result<(), StreamError> {
            self.append_calls.fetch_add(1, Ordering::Relaxed);
            if self.fail_next_append.swap(0, Ordering::Relaxed) == 1 {
                return Err(StreamError::SinkQuotaExceeded);
            }
            let _ = data;
            self.ranges.lock().push((append_window.start, append_window.end));
            Ok(())
        }

        async fn remove_buffer(&self, start: f64, end: f64) -> Result<(), StreamError> {
            self.ranges.lock().retain(|r| *r != (start, end));
            Ok(())
        }

        async fn end_of_stream(&self) -> Result<(), StreamError> {
            Ok(())
        }

        fn buffered_ranges(&self) -> Vec<(f64, f64)> {
            self.ranges.lock().clone()
        }
    }

    #[tokio::test]
    async fn successful_append_updates_buffered_ranges() {
        let fake = Arc::new(FakeSink {
            ranges: SyncMutex::new(vec![]),
            fail_next_append: AtomicUsize::new(0),
            append_calls: AtomicUsize::new(0),
        });
        let sink = SegmentSink::new(fake, BufferType::Video);
        sink.append_buffer(
            bytes::Bytes::from_static(b"data"),
            AppendWindow { start: 0.0, end: 4.0 },
            0.0,
            "avc1",
        )
        .await
        .unwrap();
        assert!(!sink.buffered_ranges().is_empty());
    }

    #[tokio::test]
    async fn quota_exceeded_evicts_then_retries_once() {
        let fake = Arc::new(FakeSink {
            ranges: SyncMutex::new(vec![(0.0, 4.0)]),
            fail_next_append: AtomicUsize::new(1),
            append_calls: AtomicUsize::new(0),
        });
        let sink = SegmentSink::new(fake.clone(), BufferType::Video);
        sink.refresh_buffered_for_test();
        let result = sink
            .append_buffer(
                bytes::Bytes::from_static(b"data"),
                AppendWindow { start: 4.0, end: 8.0 },
                0.0,
                "avc1",
            )
            .await;
        assert!(result.is_ok());
        assert_eq!(fake.append_calls.load(Ordering::Relaxed), 2);
    }

    impl SegmentSink {
        fn refresh_buffered_for_test(&self) {
            self.refresh_buffered();
        }
    }
}
