//! Hierarchical rate limiter.
//!
//! Four independent scopes; every request acquires from the `Global` scope
//! *and* whichever specific scope it belongs to before proceeding.
//! Acquisition is non-blocking by default; [`RateLimiter::acquire_blocking`]
//! waits (with a timeout) instead of failing fast.

mod bucket;

use std::time::Duration;

use bucket::TokenBucket;

use crate::telemetry::Counters;

/// Which specific scope a request belongs to, in addition to `Global`
/// (every request always also consumes a `Global` token).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateLimitScope {
    /// POST/DELETE order operations: 3/s.
    Trading,
    /// Unauthenticated market-data endpoints: 1/s per endpoint.
    PublicData,
    /// List-orders style endpoints: 10/s.
    ListOrders,
}

/// Which scope rejected an acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LimitedScope {
    Global,
    Trading,
    PublicData,
    ListOrders,
}

impl From<RateLimitScope> for LimitedScope {
    fn from(s: RateLimitScope) -> Self {
        match s {
            RateLimitScope::Trading => LimitedScope::Trading,
            RateLimitScope::PublicData => LimitedScope::PublicData,
            RateLimitScope::ListOrders => LimitedScope::ListOrders,
        }
    }
}

/// Configuration for bucket sizes; part of the client's configuration
/// surface.
#[derive(Debug, Clone, Copy)]
pub struct RateLimiterConfig {
    pub global_per_minute: u32,
    pub trading_per_second: u32,
    pub public_per_second: u32,
    pub list_orders_per_second: u32,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            global_per_minute: 500,
            trading_per_second: 3,
            public_per_second: 1,
            list_orders_per_second: 10,
        }
    }
}

/// A hit event: which scope rejected, and how long an `acquire_blocking`
/// caller should wait before retrying.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitHit {
    pub scope: LimitedScope,
    pub retry_after: Duration,
}

/// The hierarchical limiter: one `Global` bucket plus one bucket per
/// specific scope.
pub struct RateLimiter {
    global: TokenBucket,
    trading: TokenBucket,
    public_data: TokenBucket,
    list_orders: TokenBucket,
    config: RateLimiterConfig,
}

impl RateLimiter {
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            global: TokenBucket::new(config.global_per_minute, Duration::from_secs(60)),
            trading: TokenBucket::new(config.trading_per_second, Duration::from_secs(1)),
            public_data: TokenBucket::new(config.public_per_second, Duration::from_secs(1)),
            list_orders: TokenBucket::new(config.list_orders_per_second, Duration::from_secs(1)),
            config,
        }
    }

    fn bucket_for(&self, scope: RateLimitScope) -> &TokenBucket {
        match scope {
            RateLimitScope::Trading => &self.trading,
            RateLimitScope::PublicData => &self.public_data,
            RateLimitScope::ListOrders => &self.list_orders,
        }
    }

    /// Non-blocking acquisition from `Global` and the given scope. On
    /// success, both tokens have been consumed. On failure, returns which
    /// scope was exhausted; no token is consumed from the other bucket
    /// (idempotent partial acquisition is not observable by callers, since
    /// only the rejecting scope's state changes).
    pub fn try_acquire(&self, scope: RateLimitScope, counters: &Counters) -> Result<(), RateLimitHit> {
        if !self.global.try_acquire() {
            counters.record_rate_limiter_hit();
            return Err(RateLimitHit {
                scope: LimitedScope::Global,
                retry_after: self.global.time_to_refill(),
            });
        }
        self.warn_if_near_global_cap(counters);

        let bucket = self.bucket_for(scope);
        if !bucket.try_acquire() {
            counters.record_rate_limiter_hit();
            return Err(RateLimitHit {
                scope: scope.into(),
                retry_after: bucket.time_to_refill(),
            });
        }
        Ok(())
    }

    /// Blocking variant: waits (honoring `deadline`) instead of failing
    /// fast. Returns `Err` only once `deadline` has elapsed without
    /// acquiring.
    pub async fn acquire_blocking(
        &self,
        scope: RateLimitScope,
        deadline: Duration,
        counters: &Counters,
    ) -> Result<(), RateLimitHit> {
        let start = tokio::time::Instant::now();
        loop {
            match self.try_acquire(scope, counters) {
                Ok(()) => return Ok(()),
                Err(hit) => {
                    if start.elapsed() >= deadline {
                        return Err(hit);
                    }
                    let wait = hit.retry_after.min(deadline.saturating_sub(start.elapsed()));
                    tokio::time::sleep(wait.max(Duration::from_millis(1))).await;
                }
            }
        }
    }

    /// Emits a warning observability event at 80% global utilization.
    /// Called after a successful global acquisition.
    fn warn_if_near_global_cap(&self, counters: &Counters) {
        let used = self.config.global_per_minute - self.global.available();
        let threshold = (self.config.global_per_minute as f64 * 0.8) as u32;
        if used >= threshold {
            counters.record_rate_limiter_warning();
            tracing::warn!(
                used,
                cap = self.config.global_per_minute,
                "global rate-limit utilization at or above 80%"
            );
        }
    }
}
