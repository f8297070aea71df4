//! C6: segment fetcher. Resolves a URL through the CDN prioritizer, loads
//! bytes through a [`TransportPipeline`] with retry/backoff and CDN
//! failover, optionally streaming chunks as they complete, checks integrity
//! of the full buffer, and reports throughput back to the bandwidth
//! estimator.
//!
//! Adapted from the request lifecycle of `fetch_with_retries` /
//! `SegmentDownloader` in `crates/mesio/src/hls/fetcher.rs`: per-CDN attempt
//! loop wrapped in the shared backoff helper, advancing to the next CDN
//! candidate on a CDN-local failure rather than counting it as a full retry.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use tokio_util::sync::CancellationToken;
use tracing::{instrument, warn};
use url::Url;

use crate::config::RetryConfig;
use crate::error::StreamError;
use crate::stream::bandwidth::ThroughputSample;
use crate::stream::cdn::{is_cdn_local_failure, CdnPrioritizer};
use crate::stream::integrity::check_integrity;
use crate::stream::metrics::PerformanceMetrics;
use crate::stream::retry::{retry_with_backoff, RetryAction, RetryPolicy};
use crate::transport::{LoadedSegment, ParsedSegment, Progress, SegmentContext, TransportPipeline};

/// Outcome of one successful fetch, including timing for the bandwidth
/// estimator (§4.3, folded in by the caller).
pub struct FetchResult {
    pub parsed: ParsedSegment,
    pub sample: ThroughputSample,
    pub cdn_host: Option<String>,
}

pub struct SegmentFetcher {
    pipeline: Arc<dyn TransportPipeline>,
    cdn: Arc<CdnPrioritizer>,
    retry_config: RetryConfig,
    check_integrity: bool,
    metrics: Arc<PerformanceMetrics>,
}

impl SegmentFetcher {
    pub fn new(
        pipeline: Arc<dyn TransportPipeline>,
        cdn: Arc<CdnPrioritizer>,
        retry_config: RetryConfig,
        check_integrity: bool,
    ) -> Self {
        Self::with_metrics(pipeline, cdn, retry_config, check_integrity, Arc::new(PerformanceMetrics::new()))
    }

    /// Like [`Self::new`], sharing an existing metrics sink across fetchers
    /// (e.g. one per buffer type, aggregated at the engine level).
    pub fn with_metrics(
        pipeline: Arc<dyn TransportPipeline>,
        cdn: Arc<CdnPrioritizer>,
        retry_config: RetryConfig,
        check_integrity: bool,
        metrics: Arc<PerformanceMetrics>,
    ) -> Self {
        Self {
            pipeline,
            cdn,
            retry_config,
            check_integrity,
            metrics,
        }
    }

    pub fn metrics(&self) -> &Arc<PerformanceMetrics> {
        &self.metrics
    }

    /// Fetches and parses one segment. `candidate_urls` are alternate CDN
    /// base URLs for the same segment; an empty slice falls back to the
    /// pipeline's own URL resolution.
    #[instrument(skip_all, fields(segment_id = context.segment.id, is_init = context.segment.is_init))]
    pub async fn fetch(
        &self,
        context: &SegmentContext,
        candidate_urls: &[Url],
        on_progress: &(dyn Fn(Progress) + Send + Sync),
        on_chunk: &(dyn Fn(Bytes) + Send + Sync),
        init_timescale: Option<u32>,
        cancel: CancellationToken,
    ) -> Result<FetchResult, StreamError> {
        let urls: Vec<Url> = if candidate_urls.is_empty() {
            self.pipeline
                .resolve_segment_url(context)
                .into_iter()
                .collect()
        } else {
            self.cdn.order(candidate_urls).into_iter().cloned().collect()
        };
        if urls.is_empty() {
            return Err(StreamError::internal("no resolvable URL for segment"));
        }

        let policy = RetryPolicy {
            max_retries: self.retry_config.max_retry,
            base_delay: self.retry_config.base_delay,
            max_delay: self.retry_config.max_delay,
            jitter: self.retry_config.jitter,
        };

        let url_index = AtomicU64::new(0);

        // §4.6.1/§7: a CDN-local failure (5xx/429) advances to the next
        // candidate without spending the retry budget; a full lap through
        // every candidate with no success is what finally counts as one
        // retry (and pays the backoff delay), so each CDN gets retried the
        // configured number of times rather than splitting one shared
        // budget across candidates.
        let result = retry_with_backoff(&policy, &cancel, |_attempt| {
            let url_index = &url_index;
            async move {
                let mut candidates_tried = 0usize;
                loop {
                    let idx = (url_index.load(Ordering::Relaxed) as usize) % urls.len();
                    let url = urls[idx].clone();
                    let start = Instant::now();
                    let load_result = self
                        .pipeline
                        .load_segment(&url, context, on_progress, on_chunk, cancel.clone())
                        .await;

                    let err = match load_result {
                        Ok(loaded) => {
                            let elapsed = start.elapsed();
                            let integrity_failure = if self.check_integrity && !context.segment.is_init {
                                check_integrity(&loaded.data).err()
                            } else {
                                None
                            };
                            match integrity_failure {
                                None => {
                                    self.cdn.record_success(&url);
                                    self.metrics
                                        .record_download(loaded.data.len() as u64, elapsed.as_millis() as u64);
                                    return RetryAction::Success((loaded, elapsed, url.clone()));
                                }
                                Some(reason) => {
                                    // §7 item 3: integrity/parse errors retry the same CDN
                                    // rather than joining the CDN-candidate lap below.
                                    warn!(url = %url, reason, "segment integrity check failed");
                                    self.cdn.record_failure(&url);
                                    self.metrics.record_download_error();
                                    self.metrics.record_retry();
                                    return RetryAction::Retry(StreamError::Integrity { reason });
                                }
                            }
                        }
                        Err(err) => {
                            self.cdn.record_failure(&url);
                            self.metrics.record_download_error();
                            if let StreamError::HttpStatus { status, .. } = &err {
                                if !is_cdn_local_failure(*status) {
                                    return RetryAction::Fail(err);
                                }
                            }
                            if !err.is_retryable() && !matches!(err, StreamError::HttpStatus { .. }) {
                                return RetryAction::Fail(err);
                            }
                            err
                        }
                    };

                    candidates_tried += 1;
                    url_index.fetch_add(1, Ordering::Relaxed);
                    if candidates_tried >= urls.len() {
                        self.metrics.record_retry();
                        return RetryAction::Retry(err);
                    }
                    self.metrics.record_cdn_failover();
                }
            }
        })
        .await?;

        let (loaded, elapsed, used_url) = result;
        let parsed = self
            .pipeline
            .parse_segment(&loaded, context, init_timescale)?;

        Ok(FetchResult {
            parsed,
            sample: ThroughputSample {
                bytes: loaded.data.len() as u64,
                duration: elapsed,
            },
            cdn_host: used_url.host_str().map(str::to_string),
        })
    }
}
