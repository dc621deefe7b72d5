//! Domain error taxonomy.
//!
//! Every facade-level operation resolves to exactly one of these kinds. The
//! middleware stack retries `Transient`/`RateLimit`/`Timeout` internally up
//! to its configured budget; anything that reaches the caller here is final.

use std::time::Duration;

use crate::middleware::outcome::Outcome;

/// The error type returned by every facade operation.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Input failed a local invariant before any network call was made.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Missing/invalid/expired token, or authorization itself failed.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// Server-side 429 or client-side limiter rejection.
    #[error("rate limit exceeded{}", retry_after_suffix(.retry_after))]
    RateLimit {
        /// Seconds to wait, when known (from `Retry-After` or the limiter).
        retry_after: Option<Duration>,
    },

    /// Network-level failure or a retryable 5xx/408, after exhausting the
    /// retry budget.
    #[error("transient failure: {0}")]
    Transient(String),

    /// The circuit breaker is open; no network call was attempted.
    #[error("circuit breaker open")]
    CircuitOpen,

    /// The per-request deadline elapsed.
    #[error("request timed out")]
    Timeout,

    /// The caller's context was cancelled.
    #[error("request cancelled")]
    Cancelled,

    /// The exchange returned a typed 4xx error.
    #[error("domain error {code}: {message} (http {status})")]
    Domain {
        /// The exchange's own error code string, unchanged.
        code: String,
        /// HTTP status of the response carrying this error.
        status: u16,
        /// Human-readable message from the exchange.
        message: String,
    },

    /// Anything that does not fit the taxonomy above (should be rare; a
    /// catch-all so the outcome classifier always has somewhere to put an
    /// unrecognized failure).
    #[error("unknown error: {0}")]
    Unknown(String),
}

fn retry_after_suffix(retry_after: &Option<Duration>) -> String {
    match retry_after {
        Some(d) => format!(" (retry after {:?})", d),
        None => String::new(),
    }
}

impl Error {
    /// The outcome tag this error maps to for metrics/tracing.
    pub fn outcome(&self) -> Outcome {
        match self {
            Error::Validation(_) => Outcome::UnknownError,
            Error::Authentication(_) => Outcome::AuthenticationError,
            Error::RateLimit { .. } => Outcome::RateLimitExceeded,
            Error::Transient(_) => Outcome::NetworkError,
            Error::CircuitOpen => Outcome::CircuitBreakerOpen,
            Error::Timeout => Outcome::Timeout,
            Error::Cancelled => Outcome::UnknownError,
            Error::Domain { .. } => Outcome::HttpError,
            Error::Unknown(_) => Outcome::UnknownError,
        }
    }

    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Error::Timeout
        } else {
            Error::Transient(e.to_string())
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Unknown(format!("deserialization failed: {e}"))
    }
}

/// A helper `Result` alias over this crate's [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
