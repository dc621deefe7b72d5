//! Authentication layer.
//!
//! Attaches `Authorization: Bearer <token>` to non-public requests,
//! obtaining a token on demand from the configured
//! [`CredentialProvider`](crate::credential::CredentialProvider), and
//! retries exactly once on a `401` after a single re-authorization.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::credential::CredentialProvider;
use crate::error::Error;
use crate::middleware::retry::RetryLayer;
use crate::middleware::transport::{HttpRequest, HttpResponse, Method};
use crate::token::{Token, TokenStore};

/// Response body of the authorization endpoint.
#[derive(Debug, Deserialize)]
struct AuthorizeResponse {
    access_token: String,
    /// Seconds until expiration, relative to the response's receive time.
    expiration: i64,
}

/// How much earlier than the server's stated expiry the token is treated
/// as expired: `now >= expiresAt - skew`.
const DEFAULT_TOKEN_SKEW: Duration = Duration::from_secs(10);

pub struct AuthLayer {
    inner: Arc<RetryLayer>,
    token_store: Arc<TokenStore>,
    credential_provider: Arc<dyn CredentialProvider>,
    authorize_url: String,
    token_skew: chrono::Duration,
}

impl AuthLayer {
    pub fn new(
        inner: Arc<RetryLayer>,
        token_store: Arc<TokenStore>,
        credential_provider: Arc<dyn CredentialProvider>,
        authorize_url: impl Into<String>,
    ) -> Self {
        Self {
            inner,
            token_store,
            credential_provider,
            authorize_url: authorize_url.into(),
            token_skew: chrono::Duration::from_std(DEFAULT_TOKEN_SKEW).unwrap(),
        }
    }

    /// POSTs `{login, password}` to the authorization endpoint and stores
    /// the resulting token. Bypasses `self` (sent straight through the
    /// inner retry/circuit-breaker/transport chain) since the authorize
    /// call itself carries no bearer token.
    async fn authorize(&self) -> Result<Token, Error> {
        let credential = self
            .credential_provider
            .credential()
            .await
            .ok_or_else(|| Error::Authentication("no credential provider configured".into()))?;

        #[derive(serde::Serialize)]
        struct Body<'a> {
            login: &'a str,
            password: &'a str,
        }

        let body = Body {
            login: credential.login(),
            password: credential.password(),
        };
        let request = HttpRequest::new(Method::Post, &self.authorize_url)
            .public()
            .with_json_body(&body)
            .map_err(|e| Error::Unknown(e.to_string()))?;

        tracing::debug!("authorizing against {}", self.authorize_url);
        let response = self.inner.execute(request).await?;
        if !response.is_success() {
            return Err(Error::Authentication(format!(
                "authorization failed with status {}",
                response.status
            )));
        }

        let parsed: AuthorizeResponse = response
            .json()
            .map_err(|e| Error::Authentication(format!("malformed authorize response: {e}")))?;
        let expires_at: DateTime<Utc> =
            response.received_at + chrono::Duration::seconds(parsed.expiration);
        let token = Token::new(parsed.access_token, expires_at);
        self.token_store.set(token.clone()).await;
        Ok(token)
    }

    async fn attach_if_present(&self, mut request: HttpRequest) -> HttpRequest {
        if let Some(token) = self.token_store.get_valid(self.token_skew).await {
            request = request.with_header("Authorization", format!("Bearer {}", token.value()));
        }
        request
    }

    /// Runs `request` through the authentication layer: attach token,
    /// dispatch, and on a single `401` re-authorize and retry once.
    pub async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, Error> {
        if request.public {
            return self.inner.execute(request).await;
        }

        if self.token_store.get_valid(self.token_skew).await.is_none() {
            // Best-effort: if no provider is configured this simply leaves
            // the request unauthenticated and lets the server reject it.
            let _ = self.authorize().await;
        }

        let attempt1 = self.attach_if_present(request.clone()).await;
        let response = self.inner.execute(attempt1).await?;

        if response.status != 401 {
            return Ok(response);
        }

        tracing::warn!("received 401, invalidating token and re-authorizing once");
        self.token_store.invalidate().await;
        self.authorize().await?;

        let attempt2 = self.attach_if_present(request).await;
        let retried = self.inner.execute(attempt2).await?;
        if retried.status == 401 {
            return Err(Error::Authentication(
                "authentication failed after token refresh".into(),
            ));
        }
        Ok(retried)
    }
}
