//! Counters, histograms, and tracing attributes.
//!
//! This module does not implement an exporter. It exposes plain atomics
//! the caller can read, or that the rest of the crate updates internally
//! in response to an [`Outcome`](crate::middleware::outcome::Outcome).

use std::sync::atomic::{AtomicU64, Ordering};

use crate::middleware::outcome::Outcome;

/// Per-outcome request counters plus a couple of latency histograms kept as
/// running sums (min/max/count), cheap enough to update on every request
/// without a dependency on a full metrics crate.
#[derive(Default)]
pub struct Counters {
    success: AtomicU64,
    http_error: AtomicU64,
    rate_limit_exceeded: AtomicU64,
    authentication_error: AtomicU64,
    timeout: AtomicU64,
    network_error: AtomicU64,
    circuit_breaker_open: AtomicU64,
    unknown_error: AtomicU64,

    retry_attempts: AtomicU64,
    rate_limiter_hits: AtomicU64,
    rate_limiter_warnings: AtomicU64,

    latency_count: AtomicU64,
    latency_sum_micros: AtomicU64,
    latency_max_micros: AtomicU64,
}

impl Counters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records exactly one outcome for a completed request; every request
    /// issued through the stack emits exactly one outcome tag to metrics.
    pub fn record_outcome(&self, outcome: Outcome) {
        let counter = match outcome {
            Outcome::Success => &self.success,
            Outcome::HttpError => &self.http_error,
            Outcome::RateLimitExceeded => &self.rate_limit_exceeded,
            Outcome::AuthenticationError => &self.authentication_error,
            Outcome::Timeout => &self.timeout,
            Outcome::NetworkError => &self.network_error,
            Outcome::CircuitBreakerOpen => &self.circuit_breaker_open,
            Outcome::UnknownError => &self.unknown_error,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_retry_attempt(&self) {
        self.retry_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rate_limiter_hit(&self) {
        self.rate_limiter_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rate_limiter_warning(&self) {
        self.rate_limiter_warnings.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_latency(&self, latency: std::time::Duration) {
        let micros = latency.as_micros() as u64;
        self.latency_count.fetch_add(1, Ordering::Relaxed);
        self.latency_sum_micros.fetch_add(micros, Ordering::Relaxed);
        self.latency_max_micros.fetch_max(micros, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CountersSnapshot {
        let count = self.latency_count.load(Ordering::Relaxed);
        let sum = self.latency_sum_micros.load(Ordering::Relaxed);
        CountersSnapshot {
            success: self.success.load(Ordering::Relaxed),
            http_error: self.http_error.load(Ordering::Relaxed),
            rate_limit_exceeded: self.rate_limit_exceeded.load(Ordering::Relaxed),
            authentication_error: self.authentication_error.load(Ordering::Relaxed),
            timeout: self.timeout.load(Ordering::Relaxed),
            network_error: self.network_error.load(Ordering::Relaxed),
            circuit_breaker_open: self.circuit_breaker_open.load(Ordering::Relaxed),
            unknown_error: self.unknown_error.load(Ordering::Relaxed),
            retry_attempts: self.retry_attempts.load(Ordering::Relaxed),
            rate_limiter_hits: self.rate_limiter_hits.load(Ordering::Relaxed),
            rate_limiter_warnings: self.rate_limiter_warnings.load(Ordering::Relaxed),
            latency_count: count,
            mean_latency_micros: if count == 0 { 0 } else { sum / count },
            max_latency_micros: self.latency_max_micros.load(Ordering::Relaxed),
        }
    }
}

/// An immutable point-in-time read of [`Counters`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CountersSnapshot {
    pub success: u64,
    pub http_error: u64,
    pub rate_limit_exceeded: u64,
    pub authentication_error: u64,
    pub timeout: u64,
    pub network_error: u64,
    pub circuit_breaker_open: u64,
    pub unknown_error: u64,
    pub retry_attempts: u64,
    pub rate_limiter_hits: u64,
    pub rate_limiter_warnings: u64,
    pub latency_count: u64,
    pub mean_latency_micros: u64,
    pub max_latency_micros: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_exactly_one_outcome() {
        let counters = Counters::new();
        counters.record_outcome(Outcome::Success);
        counters.record_outcome(Outcome::Timeout);
        let snap = counters.snapshot();
        assert_eq!(snap.success, 1);
        assert_eq!(snap.timeout, 1);
        assert_eq!(snap.http_error, 0);
    }

    #[test]
    fn latency_histogram_tracks_mean_and_max() {
        let counters = Counters::new();
        counters.record_latency(std::time::Duration::from_millis(10));
        counters.record_latency(std::time::Duration::from_millis(30));
        let snap = counters.snapshot();
        assert_eq!(snap.latency_count, 2);
        assert_eq!(snap.mean_latency_micros, 20_000);
        assert_eq!(snap.max_latency_micros, 30_000);
    }
}
