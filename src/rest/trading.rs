//! Authenticated trading endpoints: place, inspect, and cancel orders.

use std::sync::Arc;

use crate::error::Error;
use crate::middleware::transport::{HttpRequest, Method};
use crate::middleware::MiddlewareStack;
use crate::models::{OrderPayload, PlaceOrderRequest};
use crate::rate_limit::RateLimitScope;

use super::{execute_empty, execute_json, require_non_empty, RestContext};

/// Order placement, inspection, and cancellation.
pub struct TradingApi {
    ctx: RestContext,
}

impl TradingApi {
    pub(crate) fn new(stack: Arc<MiddlewareStack>, base_url: String) -> Self {
        Self {
            ctx: RestContext { stack, base_url },
        }
    }

    /// `POST order`. Requires either `quantity` or `cost`; which price
    /// fields are required depends on `order_type`.
    pub async fn place_order(&self, request: PlaceOrderRequest) -> Result<OrderPayload, Error> {
        require_non_empty("symbol", &request.symbol)?;
        if request.quantity.is_none() && request.cost.is_none() {
            return Err(Error::validation("place_order requires quantity or cost"));
        }

        let http_request = HttpRequest::new(Method::Post, self.ctx.url("/orders"))
            .scoped(RateLimitScope::Trading)
            .with_json_body(&request)
            .map_err(|e| Error::Unknown(e.to_string()))?;
        execute_json(&self.ctx.stack, http_request).await
    }

    /// `GET order/{id}`.
    pub async fn get_order(&self, order_id: &str) -> Result<OrderPayload, Error> {
        require_non_empty("order_id", order_id)?;
        let request = HttpRequest::new(Method::Get, self.ctx.url(&format!("/orders/{order_id}")))
            .scoped(RateLimitScope::ListOrders);
        execute_json(&self.ctx.stack, request).await
    }

    /// `GET orders`, kept as a symbol filter plus a page cursor; richer
    /// filters are additive and fold into the same query string.
    pub async fn list_orders(&self, symbol: Option<&str>, page_size: usize, page_number: u64) -> Result<Vec<OrderPayload>, Error> {
        let mut path = format!("/orders?pageSize={page_size}&pageNumber={page_number}");
        if let Some(symbol) = symbol {
            path.push_str(&format!("&symbol={symbol}"));
        }
        let request = HttpRequest::new(Method::Get, self.ctx.url(&path)).scoped(RateLimitScope::ListOrders);
        execute_json(&self.ctx.stack, request).await
    }

    /// `DELETE order/{id}?async=...`.
    pub async fn cancel_order(&self, order_id: &str, r#async: bool) -> Result<(), Error> {
        require_non_empty("order_id", order_id)?;
        let request = HttpRequest::new(Method::Delete, self.ctx.url(&format!("/orders/{order_id}?async={async}")))
            .scoped(RateLimitScope::Trading);
        execute_empty(&self.ctx.stack, request).await
    }

    /// `DELETE orders?symbol=...` (cancel-all, optionally scoped to a
    /// symbol).
    pub async fn cancel_all(&self, symbol: Option<&str>) -> Result<(), Error> {
        let path = match symbol {
            Some(symbol) => format!("/orders?symbol={symbol}"),
            None => "/orders".to_string(),
        };
        let request = HttpRequest::new(Method::Delete, self.ctx.url(&path)).scoped(RateLimitScope::Trading);
        execute_empty(&self.ctx.stack, request).await
    }
}
