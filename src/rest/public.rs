//! Public (unauthenticated) market-data endpoints.

use std::sync::Arc;

use crate::cache::Cache;
use crate::error::Error;
use crate::middleware::transport::{HttpRequest, Method};
use crate::middleware::MiddlewareStack;
use crate::models::{Candle, CandleResolution, OrderBookPayload, SymbolMetadata, TickerPayload, TradePayload};
use crate::rate_limit::RateLimitScope;

use super::{execute_json, require_non_empty, RestContext};

/// Public market-data operations, with short-TTL caching on tickers and
/// symbol metadata.
pub struct PublicApi {
    ctx: RestContext,
    ticker_cache: Cache<Vec<TickerPayload>>,
    metadata_cache: Cache<Vec<SymbolMetadata>>,
}

impl PublicApi {
    pub(crate) fn new(stack: Arc<MiddlewareStack>, base_url: String, default_ttl: std::time::Duration, negative_ttl: std::time::Duration) -> Self {
        Self {
            ctx: RestContext { stack, base_url },
            ticker_cache: Cache::new(default_ttl, negative_ttl),
            metadata_cache: Cache::new(default_ttl, negative_ttl),
        }
    }

    fn request(&self, path: &str) -> HttpRequest {
        HttpRequest::new(Method::Get, self.ctx.url(path))
            .public()
            .scoped(RateLimitScope::PublicData)
    }

    /// `GET tickers?symbols=a,b,c`, served from the short-TTL cache on a hit.
    pub async fn tickers(&self, symbols: &[String]) -> Result<Arc<Vec<TickerPayload>>, Error> {
        if symbols.is_empty() {
            return Err(Error::validation("symbols must not be empty"));
        }
        let key = format!("tickers:{}", symbols.join(","));
        let stack = self.ctx.stack.clone();
        let request = self.request(&format!("/tickers?symbols={}", symbols.join(",")));

        let cached = self
            .ticker_cache
            .get_or_fetch(&key, || async move {
                let payload: Vec<TickerPayload> = execute_json(&stack, request).await?;
                Ok(Some(payload))
            })
            .await?;
        Ok(cached.expect("tickers fetch never caches a negative result"))
    }

    /// `GET orderbook?symbol=...&depth=...`.
    pub async fn order_book(&self, symbol: &str, depth: Option<u32>) -> Result<OrderBookPayload, Error> {
        require_non_empty("symbol", symbol)?;
        let mut path = format!("/orderbook?symbol={symbol}");
        if let Some(depth) = depth {
            path.push_str(&format!("&depth={depth}"));
        }
        execute_json(&self.ctx.stack, self.request(&path)).await
    }

    /// `GET trades?symbol=...` with optional `tid|since|from|to|limit`
    /// filters.
    pub async fn trades(&self, symbol: &str, since_trade_id: Option<u64>, limit: Option<u32>) -> Result<Vec<TradePayload>, Error> {
        require_non_empty("symbol", symbol)?;
        let mut path = format!("/trades?symbol={symbol}");
        if let Some(tid) = since_trade_id {
            path.push_str(&format!("&tid={tid}"));
        }
        if let Some(limit) = limit {
            path.push_str(&format!("&limit={limit}"));
        }
        execute_json(&self.ctx.stack, self.request(&path)).await
    }

    /// `GET candles?symbol=...&resolution=...&from=...&to=...`.
    pub async fn candles(
        &self,
        symbol: &str,
        resolution: CandleResolution,
        from: chrono::DateTime<chrono::Utc>,
        to: chrono::DateTime<chrono::Utc>,
    ) -> Result<Vec<Candle>, Error> {
        require_non_empty("symbol", symbol)?;
        if from >= to {
            return Err(Error::validation("candle window must satisfy from < to"));
        }
        let path = format!(
            "/candles?symbol={symbol}&resolution={}&from={}&to={}",
            resolution.as_query_value(),
            from.timestamp(),
            to.timestamp()
        );
        execute_json(&self.ctx.stack, self.request(&path)).await
    }

    /// `GET symbols`: metadata for every tradeable symbol, cached like
    /// tickers.
    pub async fn symbols(&self) -> Result<Arc<Vec<SymbolMetadata>>, Error> {
        let stack = self.ctx.stack.clone();
        let request = self.request("/symbols");
        let cached = self
            .metadata_cache
            .get_or_fetch("symbols", || async move {
                let payload: Vec<SymbolMetadata> = execute_json(&stack, request).await?;
                Ok(Some(payload))
            })
            .await?;
        Ok(cached.expect("symbol metadata fetch never caches a negative result"))
    }
}
