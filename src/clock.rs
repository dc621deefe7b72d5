//! Server-time offset estimation.
//!
//! Every response that carries a trustworthy `Date` header nudges a shared,
//! signed offset `Δ = serverTime − localTime`. Signing code asks the clock
//! for a corrected timestamp instead of calling `Utc::now()` directly.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Timelike, Utc};

/// Process-wide (per facade instance) estimator of the skew between the
/// exchange's clock and the local clock.
#[derive(Debug, Default)]
pub struct ServerTimeEstimator {
    /// Offset in milliseconds, `serverTime - localTime`.
    offset_ms: AtomicI64,
}

impl ServerTimeEstimator {
    /// Creates an estimator with zero offset.
    pub fn new() -> Self {
        Self {
            offset_ms: AtomicI64::new(0),
        }
    }

    /// Updates the offset from a response `Date` header value.
    ///
    /// Parses HTTP-date (RFC 7231) format. Unparsable headers are ignored;
    /// an untrustworthy `Date` must never regress the offset.
    pub fn observe_date_header(&self, date_header: &str) {
        if let Ok(server_time) = DateTime::parse_from_rfc2822(date_header) {
            let server_ms = server_time.timestamp_millis();
            let local_ms = Utc::now().timestamp_millis();
            self.offset_ms.store(server_ms - local_ms, Ordering::Relaxed);
        } else {
            tracing::debug!(raw = date_header, "ignoring unparsable Date header");
        }
    }

    /// Returns the current estimated offset.
    pub fn offset(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(self.offset_ms.load(Ordering::Relaxed))
    }

    /// Returns `Utc::now()` corrected by the current offset, truncated to
    /// seconds precision as required for request signing.
    pub fn corrected_now(&self) -> DateTime<Utc> {
        let corrected = Utc::now() + self.offset();
        corrected
            .date_naive()
            .and_hms_opt(corrected.hour(), corrected.minute(), corrected.second())
            .map(|naive| DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc))
            .unwrap_or(corrected)
    }

    /// Seconds-precision unix timestamp corrected by the offset, the unit
    /// most request-signing schemes want.
    pub fn corrected_unix_seconds(&self) -> i64 {
        self.corrected_now().timestamp()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_at_zero_offset() {
        let clock = ServerTimeEstimator::new();
        assert_eq!(clock.offset(), chrono::Duration::zero());
    }

    #[test]
    fn observes_valid_date_header() {
        let clock = ServerTimeEstimator::new();
        let future = Utc::now() + chrono::Duration::hours(1);
        let header = future.to_rfc2822();
        clock.observe_date_header(&header);
        // Should now read an offset close to +1h (within a few seconds of
        // test execution jitter).
        let offset_secs = clock.offset().num_seconds();
        assert!((3595..=3605).contains(&offset_secs), "offset={offset_secs}");
    }

    #[test]
    fn ignores_garbage_date_header() {
        let clock = ServerTimeEstimator::new();
        clock.observe_date_header("not a date");
        assert_eq!(clock.offset(), chrono::Duration::zero());
    }
}
