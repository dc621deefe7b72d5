//! Authenticated wallet endpoints: deposits, withdrawals, bank accounts.

use std::sync::Arc;

use crate::error::Error;
use crate::middleware::transport::{HttpRequest, Method};
use crate::middleware::MiddlewareStack;
use crate::models::{AssetNetwork, BankAccount, Deposit, DepositAddress, WithdrawLimits, WithdrawRequest, Withdrawal};
use crate::rate_limit::RateLimitScope;

use super::{execute_json, require_non_empty, RestContext};

/// Deposits, withdrawals, deposit addresses, and linked bank accounts.
pub struct WalletApi {
    ctx: RestContext,
}

impl WalletApi {
    pub(crate) fn new(stack: Arc<MiddlewareStack>, base_url: String) -> Self {
        Self {
            ctx: RestContext { stack, base_url },
        }
    }

    /// `GET deposits?pageSize=...&pageNumber=...` (paginated; pair with
    /// [`crate::pagination::Paginator::by_page_number`] for a lazy stream).
    pub async fn deposits(&self, page_size: usize, page_number: u64) -> Result<Vec<Deposit>, Error> {
        let request = HttpRequest::new(
            Method::Get,
            self.ctx.url(&format!("/wallet/deposits?pageSize={page_size}&pageNumber={page_number}")),
        )
        .scoped(RateLimitScope::ListOrders);
        execute_json(&self.ctx.stack, request).await
    }

    /// `GET deposit-addresses?asset=...&network=...`.
    pub async fn deposit_address(&self, asset: &str, network: &AssetNetwork) -> Result<DepositAddress, Error> {
        require_non_empty("asset", asset)?;
        let request = HttpRequest::new(
            Method::Get,
            self.ctx.url(&format!("/wallet/deposit-addresses?asset={asset}&network={}", network.as_str())),
        )
        .scoped(RateLimitScope::PublicData);
        execute_json(&self.ctx.stack, request).await
    }

    /// `POST withdrawals`.
    pub async fn withdraw(&self, request: WithdrawRequest) -> Result<Withdrawal, Error> {
        require_non_empty("asset", &request.asset)?;
        require_non_empty("address", &request.address)?;
        if request.amount <= rust_decimal::Decimal::ZERO {
            return Err(Error::validation("withdraw amount must be positive"));
        }
        let http_request = HttpRequest::new(Method::Post, self.ctx.url("/wallet/withdrawals"))
            .scoped(RateLimitScope::Trading)
            .with_json_body(&request)
            .map_err(|e| Error::Unknown(e.to_string()))?;
        execute_json(&self.ctx.stack, http_request).await
    }

    /// `GET withdrawals?pageSize=...&pageNumber=...`.
    pub async fn withdrawals(&self, page_size: usize, page_number: u64) -> Result<Vec<Withdrawal>, Error> {
        let request = HttpRequest::new(
            Method::Get,
            self.ctx.url(&format!("/wallet/withdrawals?pageSize={page_size}&pageNumber={page_number}")),
        )
        .scoped(RateLimitScope::ListOrders);
        execute_json(&self.ctx.stack, request).await
    }

    /// `GET withdrawals/{id}`.
    pub async fn withdrawal(&self, withdrawal_id: &str) -> Result<Withdrawal, Error> {
        require_non_empty("withdrawal_id", withdrawal_id)?;
        let request = HttpRequest::new(Method::Get, self.ctx.url(&format!("/wallet/withdrawals/{withdrawal_id}")))
            .scoped(RateLimitScope::PublicData);
        execute_json(&self.ctx.stack, request).await
    }

    /// `GET withdraw-limits?asset=...`.
    pub async fn withdraw_limits(&self, asset: &str) -> Result<WithdrawLimits, Error> {
        require_non_empty("asset", asset)?;
        let request = HttpRequest::new(Method::Get, self.ctx.url(&format!("/wallet/withdraw-limits?asset={asset}")))
            .scoped(RateLimitScope::PublicData);
        execute_json(&self.ctx.stack, request).await
    }

    /// `GET bank-accounts`: registered fiat withdrawal destinations.
    pub async fn bank_accounts(&self) -> Result<Vec<BankAccount>, Error> {
        let request = HttpRequest::new(Method::Get, self.ctx.url("/wallet/bank-accounts")).scoped(RateLimitScope::PublicData);
        execute_json(&self.ctx.stack, request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::circuit_breaker::CircuitBreakerConfig;
    use crate::middleware::retry::RetryConfig;
    use crate::middleware::transport::MockTransport;
    use crate::middleware::MiddlewareStackConfig;
    use crate::rate_limit::RateLimiterConfig;
    use crate::telemetry::Counters;

    fn api(responses: Vec<Result<crate::middleware::transport::HttpResponse, crate::middleware::transport::TransportError>>) -> WalletApi {
        let transport = Arc::new(MockTransport::new(responses));
        let stack = Arc::new(MiddlewareStack::new(
            transport,
            Arc::new(crate::token::TokenStore::new()),
            Arc::new(crate::credential::StaticCredentialProvider::new(crate::credential::Credential::new("u", "p"))),
            Arc::new(crate::rate_limit::RateLimiter::new(RateLimiterConfig::default())),
            Arc::new(Counters::new()),
            MiddlewareStackConfig {
                retry: RetryConfig {
                    max_attempts: 1,
                    ..RetryConfig::default()
                },
                circuit_breaker: CircuitBreakerConfig::default(),
                authorize_url: "https://x/authorize".to_string(),
            },
        ));
        WalletApi::new(stack, "https://x".to_string())
    }

    #[tokio::test]
    async fn zero_amount_withdrawal_is_rejected() {
        let api = api(vec![]);
        let err = api
            .withdraw(WithdrawRequest {
                asset: "BTC".to_string(),
                network: "BTC".into(),
                address: "addr".to_string(),
                tag: None,
                amount: rust_decimal::Decimal::ZERO,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn withdraw_round_trips() {
        let body = r#"{"id":"w1","asset":"BTC","network":"BTC","amount":"0.01","status":"pending","createdAt":"2026-01-01T00:00:00Z"}"#;
        let api = api(vec![
            MockTransport::ok(200, r#"{"access_token":"tok","expiration":3600}"#),
            MockTransport::ok(200, body),
        ]);
        let withdrawal = api
            .withdraw(WithdrawRequest {
                asset: "BTC".to_string(),
                network: "BTC".into(),
                address: "addr".to_string(),
                tag: None,
                amount: "0.01".parse().unwrap(),
            })
            .await
            .unwrap();
        assert_eq!(withdrawal.id, "w1");
    }
}
