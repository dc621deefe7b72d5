//! Retry layer: exponential backoff with jitter over a retryable status set.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;

use crate::error::Error;
use crate::middleware::circuit_breaker::CircuitBreaker;
use crate::middleware::transport::{HttpRequest, HttpResponse, Transport, TransportError};
use crate::telemetry::Counters;

/// Retry configuration. All fields are plain knobs on the client's
/// configuration surface.
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub backoff_multiplier: f64,
    pub max_delay: Duration,
    pub jitter_max: Duration,
    pub respect_retry_after: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            backoff_multiplier: 2.0,
            max_delay: Duration::from_secs(30),
            jitter_max: Duration::from_millis(250),
            respect_retry_after: true,
        }
    }
}

/// HTTP statuses the retry layer considers retryable on their own.
pub fn is_retryable_status(status: u16) -> bool {
    matches!(status, 408 | 429 | 500 | 502 | 503 | 504)
}

impl RetryConfig {
    /// Delay for attempt `n` (1-indexed): `min(maxDelay, baseDelay *
    /// multiplier^(n-1)) + U(0, jitterMax)`, optionally overridden upward
    /// by a server-supplied `Retry-After`.
    pub fn delay_for_attempt(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        let computed_secs =
            self.base_delay.as_secs_f64() * self.backoff_multiplier.powi(attempt as i32 - 1);
        let capped = Duration::from_secs_f64(computed_secs).min(self.max_delay);
        let jitter = if self.jitter_max.is_zero() {
            Duration::ZERO
        } else {
            let millis = rand::thread_rng().gen_range(0..=self.jitter_max.as_millis() as u64);
            Duration::from_millis(millis)
        };
        let computed = capped + jitter;

        match retry_after {
            Some(ra) if self.respect_retry_after && ra > computed => ra,
            _ => computed,
        }
    }
}

/// Wraps the circuit breaker + transport with retry/backoff: transport ->
/// CircuitBreaker -> Retry.
pub struct RetryLayer {
    transport: Arc<dyn Transport>,
    breaker: Arc<CircuitBreaker>,
    config: RetryConfig,
    counters: Option<Arc<Counters>>,
}

impl RetryLayer {
    pub fn new(transport: Arc<dyn Transport>, breaker: Arc<CircuitBreaker>, config: RetryConfig) -> Self {
        Self {
            transport,
            breaker,
            config,
            counters: None,
        }
    }

    pub fn with_counters(mut self, counters: Arc<Counters>) -> Self {
        self.counters = Some(counters);
        self
    }

    fn retry_after_header(response: &HttpResponse) -> Option<Duration> {
        response
            .header("Retry-After")
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_secs)
    }

    pub async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, Error> {
        let mut last_network_err: Option<String> = None;

        for attempt in 1..=self.config.max_attempts {
            if attempt > 1 {
                if let Some(counters) = &self.counters {
                    counters.record_retry_attempt();
                }
            }

            let permit = match self.breaker.try_acquire() {
                Ok(p) => p,
                Err(()) => return Err(Error::CircuitOpen),
            };

            match self.transport.send(request.clone()).await {
                Ok(response) => {
                    let is_server_fault = response.status >= 500;
                    if response.is_success() {
                        self.breaker.on_success(permit);
                        return Ok(response);
                    }
                    if is_server_fault {
                        self.breaker.on_failure(permit);
                    } else {
                        self.breaker.on_success(permit);
                    }

                    if !is_retryable_status(response.status) || attempt == self.config.max_attempts {
                        return if response.status == 429 {
                            Err(Error::RateLimit {
                                retry_after: Self::retry_after_header(&response),
                            })
                        } else if is_retryable_status(response.status) {
                            Err(Error::Transient(format!("http {}", response.status)))
                        } else {
                            Ok(response)
                        };
                    }

                    let delay = self.config.delay_for_attempt(attempt, Self::retry_after_header(&response));
                    tracing::debug!(attempt, ?delay, status = response.status, "retrying after response");
                    tokio::time::sleep(delay).await;
                }
                Err(TransportError::Cancelled) => {
                    self.breaker.on_failure(permit);
                    return Err(Error::Cancelled);
                }
                Err(e) => {
                    self.breaker.on_failure(permit);
                    let is_timeout = matches!(e, TransportError::Timeout);
                    last_network_err = Some(e.to_string());
                    if attempt == self.config.max_attempts {
                        return if is_timeout {
                            Err(Error::Timeout)
                        } else {
                            Err(Error::Transient(last_network_err.unwrap_or_default()))
                        };
                    }
                    let delay = self.config.delay_for_attempt(attempt, None);
                    tracing::debug!(attempt, ?delay, error = %e, "retrying after transport error");
                    tokio::time::sleep(delay).await;
                }
            }
        }

        Err(Error::Transient(
            last_network_err.unwrap_or_else(|| "retry budget exhausted".to_string()),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_law_without_jitter() {
        let config = RetryConfig {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            backoff_multiplier: 2.0,
            max_delay: Duration::from_secs(30),
            jitter_max: Duration::ZERO,
            respect_retry_after: true,
        };
        let delays: Vec<Duration> = (1..=3).map(|n| config.delay_for_attempt(n, None)).collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4),
            ]
        );
    }

    #[test]
    fn delay_is_capped_at_max_delay() {
        let config = RetryConfig {
            max_attempts: 10,
            base_delay: Duration::from_secs(1),
            backoff_multiplier: 2.0,
            max_delay: Duration::from_secs(5),
            jitter_max: Duration::ZERO,
            respect_retry_after: true,
        };
        assert_eq!(config.delay_for_attempt(10, None), Duration::from_secs(5));
    }

    #[test]
    fn retry_after_overrides_when_larger() {
        let config = RetryConfig {
            jitter_max: Duration::ZERO,
            ..RetryConfig::default()
        };
        let delay = config.delay_for_attempt(1, Some(Duration::from_secs(60)));
        assert_eq!(delay, Duration::from_secs(60));
    }

    #[test]
    fn retry_after_ignored_when_smaller_than_computed() {
        let config = RetryConfig {
            base_delay: Duration::from_secs(10),
            jitter_max: Duration::ZERO,
            ..RetryConfig::default()
        };
        let delay = config.delay_for_attempt(1, Some(Duration::from_secs(1)));
        assert_eq!(delay, Duration::from_secs(10));
    }

    #[test]
    fn retryable_statuses_match_spec() {
        for s in [408, 429, 500, 502, 503, 504] {
            assert!(is_retryable_status(s));
        }
        assert!(!is_retryable_status(404));
        assert!(!is_retryable_status(401));
    }

    fn fast_retry_config() -> RetryConfig {
        RetryConfig {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            backoff_multiplier: 1.0,
            max_delay: Duration::from_millis(5),
            jitter_max: Duration::ZERO,
            respect_retry_after: true,
        }
    }

    fn layer(
        responses: Vec<Result<HttpResponse, TransportError>>,
    ) -> (RetryLayer, Arc<crate::middleware::transport::MockTransport>) {
        let transport = Arc::new(crate::middleware::transport::MockTransport::new(responses));
        let breaker = Arc::new(CircuitBreaker::new(
            crate::middleware::circuit_breaker::CircuitBreakerConfig::default(),
        ));
        (
            RetryLayer::new(transport.clone(), breaker, fast_retry_config()),
            transport,
        )
    }

    #[tokio::test]
    async fn retries_transient_5xx_then_succeeds() {
        let (layer, transport) = layer(vec![
            crate::middleware::transport::MockTransport::ok(500, "err"),
            crate::middleware::transport::MockTransport::ok(200, "ok"),
        ]);
        let response = layer
            .execute(HttpRequest::new(crate::middleware::transport::Method::Get, "http://x"))
            .await
            .unwrap();
        assert!(response.is_success());
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test]
    async fn exhausts_budget_and_surfaces_transient() {
        let (layer, transport) = layer(vec![
            crate::middleware::transport::MockTransport::ok(500, "e1"),
            crate::middleware::transport::MockTransport::ok(500, "e2"),
            crate::middleware::transport::MockTransport::ok(500, "e3"),
        ]);
        let err = layer
            .execute(HttpRequest::new(crate::middleware::transport::Method::Get, "http://x"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Transient(_)));
        assert_eq!(transport.calls(), 3);
    }

    #[tokio::test]
    async fn non_retryable_4xx_is_not_retried() {
        let (layer, transport) = layer(vec![crate::middleware::transport::MockTransport::ok(404, "nope")]);
        let response = layer
            .execute(HttpRequest::new(crate::middleware::transport::Method::Get, "http://x"))
            .await
            .unwrap();
        assert_eq!(response.status, 404);
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn exhausted_429_surfaces_rate_limit_error() {
        let (layer, _transport) = layer(vec![
            crate::middleware::transport::MockTransport::ok(429, "slow down"),
            crate::middleware::transport::MockTransport::ok(429, "slow down"),
            crate::middleware::transport::MockTransport::ok(429, "slow down"),
        ]);
        let err = layer
            .execute(HttpRequest::new(crate::middleware::transport::Method::Get, "http://x"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::RateLimit { .. }));
    }

    #[tokio::test]
    async fn open_circuit_fails_fast_without_retry() {
        let transport = Arc::new(crate::middleware::transport::MockTransport::new(vec![]));
        let breaker = Arc::new(CircuitBreaker::new(crate::middleware::circuit_breaker::CircuitBreakerConfig {
            minimum_throughput: 1,
            sampling_window: 4,
            failure_ratio_threshold: 0.5,
            break_duration: Duration::from_secs(60),
        }));
        // Force the breaker open directly.
        let permit = breaker.try_acquire().unwrap();
        breaker.on_failure(permit);

        let layer = RetryLayer::new(transport.clone(), breaker, fast_retry_config());
        let err = layer
            .execute(HttpRequest::new(crate::middleware::transport::Method::Get, "http://x"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::CircuitOpen));
        assert_eq!(transport.calls(), 0);
    }
}
