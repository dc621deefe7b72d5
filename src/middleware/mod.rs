//! The layered HTTP middleware stack: transport -> Circuit Breaker ->
//! Retry -> Authentication, composed as a straight chain of owned values
//! rather than mutual back-references.

pub mod auth;
pub mod circuit_breaker;
pub mod outcome;
pub mod retry;
pub mod transport;

use std::sync::Arc;
use std::time::Instant;

use crate::credential::CredentialProvider;
use crate::error::Error;
use crate::rate_limit::{RateLimitScope, RateLimiter};
use crate::telemetry::Counters;
use crate::token::TokenStore;

use auth::AuthLayer;
use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use outcome::Outcome;
use retry::{RetryConfig, RetryLayer};
use transport::{HttpRequest, HttpResponse, Transport};

/// Everything needed to build a [`MiddlewareStack`]; the rest of the
/// configuration surface (base URL, timeouts) lives in
/// [`crate::config::ClientConfig`].
pub struct MiddlewareStackConfig {
    pub retry: RetryConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub authorize_url: String,
}

/// The full chain plus the rate limiter and counters every dispatched
/// request passes through. Owned by the facade; the token store and rate
/// limiter live for the lifetime of the facade instance.
pub struct MiddlewareStack {
    auth: AuthLayer,
    rate_limiter: Arc<RateLimiter>,
    counters: Arc<Counters>,
}

impl MiddlewareStack {
    pub fn new(
        transport: Arc<dyn Transport>,
        token_store: Arc<TokenStore>,
        credential_provider: Arc<dyn CredentialProvider>,
        rate_limiter: Arc<RateLimiter>,
        counters: Arc<Counters>,
        config: MiddlewareStackConfig,
    ) -> Self {
        let breaker = Arc::new(CircuitBreaker::new(config.circuit_breaker));
        let retry = Arc::new(
            RetryLayer::new(transport, breaker, config.retry).with_counters(counters.clone()),
        );
        let auth = AuthLayer::new(retry, token_store, credential_provider, config.authorize_url);

        Self {
            auth,
            rate_limiter,
            counters,
        }
    }

    /// Dispatches `request` through the full stack: rate-limit acquisition,
    /// then auth/retry/circuit-breaker/transport, recording exactly one
    /// [`Outcome`] and one latency sample regardless of how it resolves.
    pub async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, Error> {
        let scope = request.rate_limit_scope;
        let started = Instant::now();
        let result = self.dispatch(request, scope).await;

        self.counters.record_latency(started.elapsed());
        self.counters.record_outcome(Outcome::classify(&result));
        result
    }

    async fn dispatch(&self, request: HttpRequest, scope: RateLimitScope) -> Result<HttpResponse, Error> {
        if let Err(hit) = self.rate_limiter.try_acquire(scope, &self.counters) {
            return Err(Error::RateLimit {
                retry_after: Some(hit.retry_after),
            });
        }
        self.auth.execute(request).await
    }

    pub fn counters(&self) -> &Arc<Counters> {
        &self.counters
    }
}
