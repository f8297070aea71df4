//! §4.6.1 CDN selection: orders candidate CDNs by a moving success/latency
//! score, with temporary downranking of recently-failed CDNs.
//!
//! Grounded on the retry-then-failover shape of `fetch_with_retries` in
//! `crates/mesio/src/hls/fetcher.rs` (5xx/network errors advance to the next
//! CDN before counting as a full retry); the scoring table itself is new.

use crate::config::CdnConfig;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::Instant;
use url::Url;

#[derive(Debug, Clone, Copy)]
struct CdnState {
    /// EWMA of success (1.0) / failure (0.0) outcomes.
    score: f64,
    cooldown_until: Option<Instant>,
    samples: u32,
}

impl Default for CdnState {
    fn default() -> Self {
        Self {
            score: 1.0,
            cooldown_until: None,
            samples: 0,
        }
    }
}

/// Orders candidate CDN base URLs for a segment by score, skipping any
/// still in cooldown from a recent failure.
pub struct CdnPrioritizer {
    config: CdnConfig,
    state: RwLock<HashMap<String, CdnState>>,
}

impl CdnPrioritizer {
    pub fn new(config: CdnConfig) -> Self {
        Self {
            config,
            state: RwLock::new(HashMap::new()),
        }
    }

    fn key(url: &Url) -> String {
        url.host_str().unwrap_or("").to_string()
    }

    /// Candidate CDNs ordered best-first: in-cooldown CDNs sort last but are
    /// still present (fetcher exhausts all candidates before failing).
    pub fn order<'a>(&self, candidates: &'a [Url]) -> Vec<&'a Url> {
        let state = self.state.read();
        let now = Instant::now();
        let mut scored: Vec<(&Url, bool, f64)> = candidates
            .iter()
            .map(|url| {
                let s = state.get(&Self::key(url)).copied().unwrap_or_default();
                let in_cooldown = s.cooldown_until.is_some_and(|t| now < t);
                (url, in_cooldown, s.score)
            })
            .collect();
        scored.sort_by(|a, b| {
            a.1.cmp(&b.1)
                .then(b.2.partial_cmp(&a.2).unwrap_or(std::cmp::Ordering::Equal))
        });
        scored.into_iter().map(|(url, _, _)| url).collect()
    }

    pub fn record_success(&self, url: &Url) {
        let mut state = self.state.write();
        let entry = state.entry(Self::key(url)).or_default();
        entry.score = ewma(entry.score, 1.0, self.config.score_ewma_alpha);
        entry.samples += 1;
        entry.cooldown_until = None;
    }

    pub fn record_failure(&self, url: &Url) {
        let mut state = self.state.write();
        let entry = state.entry(Self::key(url)).or_default();
        entry.score = ewma(entry.score, 0.0, self.config.score_ewma_alpha);
        entry.samples += 1;
        entry.cooldown_until = Some(Instant::now() + self.config.cooldown);
    }

    pub fn score_of(&self, url: &Url) -> f64 {
        self.state
            .read()
            .get(&Self::key(url))
            .map(|s| s.score)
            .unwrap_or(1.0)
    }

    #[cfg(test)]
    fn is_in_cooldown(&self, url: &Url) -> bool {
        self.state
            .read()
            .get(&Self::key(url))
            .and_then(|s| s.cooldown_until)
            .is_some_and(|t| Instant::now() < t)
    }
}

fn ewma(previous: f64, sample: f64, alpha: f64) -> f64 {
    alpha * sample + (1.0 - alpha) * previous
}

/// Whether an HTTP status on one CDN should fail the whole request fast
/// (non-retryable 4xx) or just advance to the next CDN candidate.
pub fn is_cdn_local_failure(status: reqwest::StatusCode) -> bool {
    status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(host: &str) -> Url {
        Url::parse(&format!("https://{host}/seg.mp4")).unwrap()
    }

    #[test]
    fn failed_cdn_is_downranked_relative_to_healthy_one() {
        let cdn = CdnPrioritizer::new(CdnConfig::default());
        let a = url("a.example.com");
        let b = url("b.example.com");
        cdn.record_failure(&a);
        cdn.record_failure(&a);
        cdn.record_success(&b);
        assert!(cdn.score_of(&a) < cdn.score_of(&b));
    }

    #[test]
    fn order_prefers_non_cooldown_candidates_first() {
        let cdn = CdnPrioritizer::new(CdnConfig::default());
        let a = url("a.example.com");
        let b = url("b.example.com");
        cdn.record_failure(&a);
        assert!(cdn.is_in_cooldown(&a));
        let ordered = cdn.order(&[a.clone(), b.clone()]);
        assert_eq!(ordered[0].host_str(), b.host_str());
    }

    #[test]
    fn success_clears_cooldown() {
        let cdn = CdnPrioritizer::new(CdnConfig::default());
        let a = url("a.example.com");
        cdn.record_failure(&a);
        assert!(cdn.is_in_cooldown(&a));
        cdn.record_success(&a);
        assert!(!cdn.is_in_cooldown(&a));
    }

    #[test]
    fn server_errors_are_cdn_local_failures_client_errors_are_not() {
        assert!(is_cdn_local_failure(reqwest::StatusCode::SERVICE_UNAVAILABLE));
        assert!(is_cdn_local_failure(reqwest::StatusCode::TOO_MANY_REQUESTS));
        assert!(!is_cdn_local_failure(reqwest::StatusCode::NOT_FOUND));
    }
}
