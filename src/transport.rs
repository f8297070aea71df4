//! External collaborator interfaces (§6 "External Interfaces").
//!
//! These traits describe the boundary of THE CORE: manifest parsing,
//! container/codec parsing, and the raw host media sink are all external
//! (§1 "OUT OF SCOPE"). The orchestration layer only depends on these
//! trait shapes, grounded on `SegmentDownloader` in
//! `crates/mesio/src/hls/fetcher.rs` generalized beyond one container format.

use async_trait::async_trait;
use bytes::Bytes;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::StreamError;
use crate::manifest::{Manifest, Representation, Segment};

/// Everything a loader/parser needs to identify one fetch.
#[derive(Debug, Clone)]
pub struct SegmentContext {
    pub representation: Representation,
    pub segment: Segment,
    pub base_url: Url,
}

/// Progress callback payload (§3 `Request.progress`).
#[derive(Debug, Clone, Copy, Default)]
pub struct Progress {
    pub loaded: u64,
    pub total: Option<u64>,
    pub elapsed: std::time::Duration,
}

/// Raw bytes plus transport-level metadata handed to the parser.
#[derive(Debug, Clone)]
pub struct LoadedSegment {
    pub data: Bytes,
    pub http_status: u16,
}

/// Window within which an append is clamped.
#[derive(Debug, Clone, Copy)]
pub struct AppendWindow {
    pub start: f64,
    pub end: f64,
}

/// Container-specific parse result (§6 `ParsedSegment`).
#[derive(Debug, Clone)]
pub enum ParsedSegment {
    Init {
        initialization_data: Bytes,
        init_timescale: Option<u32>,
    },
    Media {
        chunk_data: Bytes,
        chunk_infos: Option<ChunkInfo>,
        chunk_offset: f64,
        append_window: AppendWindow,
    },
}

#[derive(Debug, Clone, Copy)]
pub struct ChunkInfo {
    pub time: f64,
    pub duration: f64,
    pub timescale: u32,
}

/// Per-buffer-type transport pipeline: resolve a URL, load bytes (optionally
/// chunked), and parse into a container-agnostic shape. One implementation
/// per container format lives outside this crate.
#[async_trait]
pub trait TransportPipeline: Send + Sync {
    fn resolve_segment_url(&self, context: &SegmentContext) -> Option<Url>;

    /// Loads a segment. `on_progress` fires as bytes arrive; `on_chunk` fires
    /// when a self-contained chunk (e.g. a complete `moof+mdat` pair) is
    /// available before the whole segment has loaded (§4.6 step 3).
    async fn load_segment(
        &self,
        url: &Url,
        context: &SegmentContext,
        on_progress: &(dyn Fn(Progress) + Send + Sync),
        on_chunk: &(dyn Fn(Bytes) + Send + Sync),
        cancel: CancellationToken,
    ) -> Result<LoadedSegment, StreamError>;

    fn parse_segment(
        &self,
        loaded: &LoadedSegment,
        context: &SegmentContext,
        init_timescale: Option<u32>,
    ) -> Result<ParsedSegment, StreamError>;

    /// Whether this pipeline can parse chunks incrementally as they arrive
    /// (§4.6 step 3: "container is MP4... streaming fetch is available").
    fn supports_chunked_streaming(&self) -> bool {
        false
    }
}

/// Manifest acquisition and parsing (§6).
#[async_trait]
pub trait ManifestSource: Send + Sync {
    async fn load_manifest(
        &self,
        url: &Url,
        cancel: CancellationToken,
    ) -> Result<Bytes, StreamError>;

    fn parse_manifest(&self, raw: &[u8], base_url: &Url) -> Result<Manifest, StreamError>;
}

/// The raw, opaque media sink (e.g. a browser `SourceBuffer` equivalent).
/// `stream::sink::SegmentSink` wraps this with FIFO ordering and buffered-
/// range bookkeeping per §4.7.
#[async_trait]
pub trait MediaSink: Send + Sync {
    async fn append_buffer(
        &self,
        data: Bytes,
        append_window: AppendWindow,
        timestamp_offset: f64,
        codec: &str,
    ) -> Result<(), StreamError>;

    async fn remove_buffer(&self, start: f64, end: f64) -> Result<(), StreamError>;

    async fn end_of_stream(&self) -> Result<(), StreamError>;

    /// Buffered ranges as raw `(start, end)` pairs; the wrapper turns these
    /// into a `RangeSet`.
    fn buffered_ranges(&self) -> Vec<(f64, f64)>;
}
