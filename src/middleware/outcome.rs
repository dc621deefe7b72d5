//! Outcome classification: the sole input to metrics and tracing spans,
//! produced once per request after the whole pipeline resolves.

use crate::error::Error;

/// The canonical tag summarizing the fate of one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    Success,
    HttpError,
    RateLimitExceeded,
    AuthenticationError,
    Timeout,
    NetworkError,
    CircuitBreakerOpen,
    UnknownError,
}

impl Outcome {
    /// Classifies a finished pipeline call: `Ok` is always `Success`, `Err`
    /// defers to [`Error::outcome`].
    pub fn classify<T>(result: &Result<T, Error>) -> Outcome {
        match result {
            Ok(_) => Outcome::Success,
            Err(e) => e.outcome(),
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Outcome::Success => "success",
            Outcome::HttpError => "http_error",
            Outcome::RateLimitExceeded => "rate_limit_exceeded",
            Outcome::AuthenticationError => "authentication_error",
            Outcome::Timeout => "timeout",
            Outcome::NetworkError => "network_error",
            Outcome::CircuitBreakerOpen => "circuit_breaker_open",
            Outcome::UnknownError => "unknown_error",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_classifies_as_success() {
        let r: Result<u8, Error> = Ok(1);
        assert_eq!(Outcome::classify(&r), Outcome::Success);
    }

    #[test]
    fn circuit_open_classifies_correctly() {
        let r: Result<u8, Error> = Err(Error::CircuitOpen);
        assert_eq!(Outcome::classify(&r), Outcome::CircuitBreakerOpen);
    }
}
