//! Client configuration surface.
//!
//! Everything the facade needs to construct the middleware stack, order
//! book, WebSocket client, cache, and order tracker, gathered into one
//! plain struct with `with_*` setters and a `Default` impl. Env/secret-store
//! loading belongs to an external collaborator, not this crate.

use std::time::Duration;

use crate::middleware::circuit_breaker::CircuitBreakerConfig;
use crate::middleware::retry::RetryConfig;
use crate::rate_limit::RateLimiterConfig;

/// HTTP version negotiation preference. HTTP/2 is the default; HTTP/3 is
/// used when the server negotiates it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpVersionPolicy {
    Http1Only,
    PreferHttp2,
    PreferHttp3,
}

impl Default for HttpVersionPolicy {
    fn default() -> Self {
        HttpVersionPolicy::PreferHttp2
    }
}

/// WebSocket reconnect/keep-alive knobs.
#[derive(Debug, Clone, Copy)]
pub struct WebSocketConfig {
    pub keep_alive_interval: Duration,
    pub keep_alive_timeout: Duration,
    pub initial_reconnect_delay: Duration,
    pub max_reconnect_delay: Duration,
    pub max_reconnect_attempts: u32,
    pub channel_capacity: usize,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            keep_alive_interval: Duration::from_secs(15),
            keep_alive_timeout: Duration::from_secs(5),
            initial_reconnect_delay: Duration::from_millis(500),
            max_reconnect_delay: Duration::from_secs(30),
            max_reconnect_attempts: 10,
            channel_capacity: 256,
        }
    }
}

/// Order tracker polling knobs.
#[derive(Debug, Clone, Copy)]
pub struct OrderTrackerConfig {
    pub polling_interval: Duration,
    pub min_poll_interval: Duration,
    pub max_poll_interval: Duration,
    pub completed_order_retention: Duration,
    pub tracking_timeout: Duration,
}

impl Default for OrderTrackerConfig {
    fn default() -> Self {
        Self {
            polling_interval: Duration::from_secs(1),
            min_poll_interval: Duration::from_secs(1),
            max_poll_interval: Duration::from_secs(30),
            completed_order_retention: Duration::from_secs(300),
            tracking_timeout: Duration::from_secs(3600),
        }
    }
}

/// Cache + coalescer knobs.
#[derive(Debug, Clone, Copy)]
pub struct CacheConfig {
    pub default_ttl: Duration,
    pub negative_ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(2),
            negative_ttl: Duration::from_secs(1),
        }
    }
}

/// Order book depth cap and spread-change notification threshold.
#[derive(Debug, Clone, Copy)]
pub struct OrderBookConfig {
    pub max_depth: Option<usize>,
    pub spread_change_threshold_pct: f64,
}

impl Default for OrderBookConfig {
    fn default() -> Self {
        Self {
            max_depth: Some(50),
            spread_change_threshold_pct: 1.0,
        }
    }
}

/// The full configuration surface for a facade instance.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub websocket_url: String,
    pub request_timeout: Duration,
    pub http_version_policy: HttpVersionPolicy,
    pub retry: RetryConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub rate_limiter: RateLimiterConfig,
    pub cache: CacheConfig,
    pub websocket: WebSocketConfig,
    pub order_tracker: OrderTrackerConfig,
    pub order_book: OrderBookConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.exchange.example/v4".to_string(),
            websocket_url: "wss://stream.exchange.example/v4".to_string(),
            request_timeout: Duration::from_secs(30),
            http_version_policy: HttpVersionPolicy::default(),
            retry: RetryConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            rate_limiter: RateLimiterConfig::default(),
            cache: CacheConfig::default(),
            websocket: WebSocketConfig::default(),
            order_tracker: OrderTrackerConfig::default(),
            order_book: OrderBookConfig::default(),
        }
    }
}

impl ClientConfig {
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_websocket_url(mut self, url: impl Into<String>) -> Self {
        self.websocket_url = url.into();
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_http_version_policy(mut self, policy: HttpVersionPolicy) -> Self {
        self.http_version_policy = policy;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_circuit_breaker(mut self, circuit_breaker: CircuitBreakerConfig) -> Self {
        self.circuit_breaker = circuit_breaker;
        self
    }

    pub fn with_rate_limiter(mut self, rate_limiter: RateLimiterConfig) -> Self {
        self.rate_limiter = rate_limiter;
        self
    }

    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_websocket(mut self, websocket: WebSocketConfig) -> Self {
        self.websocket = websocket;
        self
    }

    pub fn with_order_tracker(mut self, order_tracker: OrderTrackerConfig) -> Self {
        self.order_tracker = order_tracker;
        self
    }

    pub fn with_order_book(mut self, order_book: OrderBookConfig) -> Self {
        self.order_book = order_book;
        self
    }
}
