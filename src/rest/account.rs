//! Authenticated account endpoints: balances, positions, trading fee tier.

use std::sync::Arc;

use crate::error::Error;
use crate::middleware::transport::{HttpRequest, Method};
use crate::middleware::MiddlewareStack;
use crate::models::{Balance, Position, TradingFee};
use crate::rate_limit::RateLimitScope;

use super::{execute_json, require_non_empty, RestContext};

/// Balances, fee tier, and positions for the authenticated account.
pub struct AccountApi {
    ctx: RestContext,
}

impl AccountApi {
    pub(crate) fn new(stack: Arc<MiddlewareStack>, base_url: String) -> Self {
        Self {
            ctx: RestContext { stack, base_url },
        }
    }

    fn request(&self, method: Method, path: &str) -> HttpRequest {
        HttpRequest::new(method, self.ctx.url(path)).scoped(RateLimitScope::PublicData)
    }

    pub async fn balances(&self) -> Result<Vec<Balance>, Error> {
        execute_json(&self.ctx.stack, self.request(Method::Get, "/account/balances")).await
    }

    pub async fn positions(&self) -> Result<Vec<Position>, Error> {
        execute_json(&self.ctx.stack, self.request(Method::Get, "/account/positions")).await
    }

    pub async fn trading_fee(&self, symbol: &str) -> Result<TradingFee, Error> {
        require_non_empty("symbol", symbol)?;
        execute_json(&self.ctx.stack, self.request(Method::Get, &format!("/account/fees?symbol={symbol}"))).await
    }
}
