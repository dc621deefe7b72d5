//! Process-wide (per-facade) bearer token holder.
//!
//! The token store is shared across all callers using the same facade
//! instance. Writes are serialized behind a `Mutex`; reads clone the
//! small `Token` value out rather than holding the lock.

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

/// A bearer token and its expiration instant.
#[derive(Debug, Clone)]
pub struct Token {
    value: String,
    expires_at: DateTime<Utc>,
}

impl Token {
    pub fn new(value: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            value: value.into(),
            expires_at,
        }
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// `true` if `now >= expires_at - skew`.
    pub fn is_expired(&self, now: DateTime<Utc>, skew: chrono::Duration) -> bool {
        now >= self.expires_at - skew
    }
}

/// Holds at most one live token, shared across all callers of a facade.
#[derive(Default)]
pub struct TokenStore {
    inner: Mutex<Option<Token>>,
}

impl TokenStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(None),
        }
    }

    /// Returns the current token if present and not expired (with `skew`
    /// applied), `None` otherwise.
    pub async fn get_valid(&self, skew: chrono::Duration) -> Option<Token> {
        let guard = self.inner.lock().await;
        match guard.as_ref() {
            Some(token) if !token.is_expired(Utc::now(), skew) => Some(token.clone()),
            _ => None,
        }
    }

    /// Stores a freshly obtained token, replacing any previous one.
    pub async fn set(&self, token: Token) {
        let mut guard = self.inner.lock().await;
        *guard = Some(token);
    }

    /// Clears the token (explicit invalidation, e.g. after a second 401).
    pub async fn invalidate(&self) {
        let mut guard = self.inner.lock().await;
        *guard = None;
    }
}
