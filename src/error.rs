//! Crate-wide error type.
//!
//! Mirrors the shape described in spec §7: every error carries a `kind` that
//! drives retry/propagation policy, plus an optional cause.

use std::time::Duration;

/// Coarse classification used by callers to decide whether to retry,
/// downgrade to a warning, or treat the owning stream as terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamErrorKind {
    /// Timeout, 5xx, connection reset. Retried with backoff.
    TransientNetwork,
    /// 4xx other than 408/429. Fails fast.
    NonRetryableNetwork,
    /// Truncated/invalid segment payload. One retry, then escalates.
    Integrity,
    /// Sink quota exceeded. Not a retry; triggers a buffer cleanup.
    SinkQuota,
    /// Sink rejected the codec/format, or the underlying source closed.
    SinkFatal,
    /// Manifest fetch/parse failure.
    Manifest,
    /// Representation can no longer be decrypted.
    Undecipherable,
    /// Autoplay blocked by host policy. Always a warning.
    AutoplayBlocked,
    /// Request or task was cancelled; never retried.
    Cancelled,
    /// Anything else internal to this crate.
    Internal,
}

#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("request cancelled")]
    Cancelled,

    #[error("network request failed: {source}")]
    Network {
        #[from]
        source: reqwest::Error,
    },

    #[error("http {status} for {operation} on {url}")]
    HttpStatus {
        status: reqwest::StatusCode,
        url: String,
        operation: &'static str,
    },

    #[error("segment integrity check failed: {reason}")]
    Integrity { reason: String },

    #[error("sink quota exceeded")]
    SinkQuotaExceeded,

    #[error("sink rejected segment: {reason}")]
    SinkFatal { reason: String },

    #[error("underlying media source closed")]
    SinkClosed,

    #[error("manifest error: {reason}")]
    Manifest { reason: String },

    #[error("representation {representation_id} is undecipherable")]
    Undecipherable { representation_id: String },

    #[error("no playable representation remains")]
    NoPlayableRepresentation,

    #[error("autoplay blocked by host policy")]
    AutoplayBlocked,

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    #[error("internal error: {reason}")]
    Internal { reason: String },
}

impl StreamError {
    pub fn kind(&self) -> StreamErrorKind {
        match self {
            Self::Cancelled => StreamErrorKind::Cancelled,
            Self::Network { .. } | Self::Timeout(_) | Self::Io { .. } => {
                StreamErrorKind::TransientNetwork
            }
            Self::HttpStatus { status, .. } => {
                if status.is_server_error() || *status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                    StreamErrorKind::TransientNetwork
                } else {
                    StreamErrorKind::NonRetryableNetwork
                }
            }
            Self::Integrity { .. } => StreamErrorKind::Integrity,
            Self::SinkQuotaExceeded => StreamErrorKind::SinkQuota,
            Self::SinkFatal { .. } | Self::SinkClosed => StreamErrorKind::SinkFatal,
            Self::Manifest { .. } => StreamErrorKind::Manifest,
            Self::Undecipherable { .. } | Self::NoPlayableRepresentation => {
                StreamErrorKind::Undecipherable
            }
            Self::AutoplayBlocked => StreamErrorKind::AutoplayBlocked,
            Self::Internal { .. } => StreamErrorKind::Internal,
        }
    }

    /// Whether this error should be retried by the fetcher's backoff loop.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            StreamErrorKind::TransientNetwork | StreamErrorKind::Integrity
        )
    }

    /// Whether this error, surfaced from a sink, should tear the sink down
    /// rather than be recovered locally (§7 item 5).
    pub fn is_fatal_to_sink(&self) -> bool {
        matches!(self.kind(), StreamErrorKind::SinkFatal)
    }

    pub fn internal(reason: impl Into<String>) -> Self {
        Self::Internal {
            reason: reason.into(),
        }
    }

    pub fn manifest(reason: impl Into<String>) -> Self {
        Self::Manifest {
            reason: reason.into(),
        }
    }

    pub fn http_status(
        status: reqwest::StatusCode,
        url: impl Into<String>,
        operation: &'static str,
    ) -> Self {
        Self::HttpStatus {
            status,
            url: url.into(),
            operation,
        }
    }
}
