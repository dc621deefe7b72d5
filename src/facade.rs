//! The facade: wires every component into the public surface, grouped as
//! public data, account, trading, wallet, streaming.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::aggregator::MarketDataAggregator;
use crate::config::ClientConfig;
use crate::credential::CredentialProvider;
use crate::error::Error;
use crate::middleware::transport::{ReqwestTransport, Transport};
use crate::middleware::{MiddlewareStack, MiddlewareStackConfig};
use crate::order_tracker::{OrderEvent, OrderStatus, OrderStatusPayload, OrderStatusSource, OrderTracker};
use crate::orderbook::OrderBook;
use crate::rate_limit::RateLimiter;
use crate::rest::account::AccountApi;
use crate::rest::public::PublicApi;
use crate::rest::trading::TradingApi;
use crate::rest::wallet::WalletApi;
use crate::telemetry::Counters;
use crate::token::TokenStore;
use crate::websocket::{Channel, DropOldestReceiver, StreamEvent, SubscriptionKey, WebSocketManager};

/// Adapts [`TradingApi::get_order`] to the [`OrderStatusSource`] seam the
/// order tracker polls through.
struct TradingOrderStatusSource {
    trading: Arc<TradingApi>,
}

#[async_trait]
impl OrderStatusSource for TradingOrderStatusSource {
    async fn fetch_status(&self, order_id: &str, _symbol: &str, _account_id: &str) -> Result<OrderStatusPayload, Error> {
        let order = self.trading.get_order(order_id).await?;
        Ok(OrderStatusPayload {
            status: OrderStatus::from_wire(&order.status),
            filled_quantity: order.filled_quantity,
            average_price: order.average_price,
            cancel_reason: None,
        })
    }
}

/// The composed client: one instance per application, constructed from a
/// [`ClientConfig`] and a credential provider.
pub struct Client {
    public: PublicApi,
    account: AccountApi,
    trading: Arc<TradingApi>,
    wallet: WalletApi,
    order_books: DashMap<String, Arc<OrderBook>>,
    order_book_config: crate::config::OrderBookConfig,
    websocket: Arc<WebSocketManager>,
    aggregator: Arc<MarketDataAggregator>,
    order_tracker: Arc<OrderTracker>,
    counters: Arc<Counters>,
}

impl Client {
    /// Builds a client over the real network transport.
    pub fn new(config: ClientConfig, credential_provider: Arc<dyn CredentialProvider>) -> Arc<Self> {
        Self::with_transport(config, credential_provider, Arc::new(ReqwestTransport::new()))
    }

    /// As [`Client::new`], but over a caller-supplied [`Transport`], used
    /// in integration tests to inject a mock transport.
    pub fn with_transport(config: ClientConfig, credential_provider: Arc<dyn CredentialProvider>, transport: Arc<dyn Transport>) -> Arc<Self> {
        let counters = Arc::new(Counters::new());
        let token_store = Arc::new(TokenStore::new());
        let rate_limiter = Arc::new(RateLimiter::new(config.rate_limiter));

        let stack = Arc::new(MiddlewareStack::new(
            transport,
            token_store,
            credential_provider,
            rate_limiter,
            counters.clone(),
            MiddlewareStackConfig {
                retry: config.retry,
                circuit_breaker: config.circuit_breaker,
                authorize_url: format!("{}/authorize", config.base_url),
            },
        ));

        let public = PublicApi::new(stack.clone(), config.base_url.clone(), config.cache.default_ttl, config.cache.negative_ttl);
        let account = AccountApi::new(stack.clone(), config.base_url.clone());
        let trading = Arc::new(TradingApi::new(stack.clone(), config.base_url.clone()));
        let wallet = WalletApi::new(stack.clone(), config.base_url.clone());

        let websocket = WebSocketManager::new(config.websocket_url.clone(), config.websocket);
        let aggregator = Arc::new(MarketDataAggregator::new(config.websocket.channel_capacity));
        let order_tracker = OrderTracker::new(Arc::new(TradingOrderStatusSource { trading: trading.clone() }), config.order_tracker);

        Arc::new(Self {
            public,
            account,
            trading,
            wallet,
            order_books: DashMap::new(),
            order_book_config: config.order_book,
            websocket,
            aggregator,
            order_tracker,
            counters,
        })
    }

    /// Spawns the WebSocket receive loop, the order tracker poller, and the
    /// aggregator feed. Call once after construction; the returned handles
    /// may be dropped (the tasks keep running) or awaited for shutdown.
    pub fn spawn_background_tasks(self: &Arc<Self>) -> (tokio::task::JoinHandle<()>, tokio::task::JoinHandle<()>, tokio::task::JoinHandle<()>) {
        let ws_handle = tokio::spawn(self.websocket.clone().run());
        let tracker_handle = tokio::spawn(self.order_tracker.clone().run());

        let aggregator = self.aggregator.clone();
        let mut events = self.websocket.watch_events();
        let feed_handle = tokio::spawn(async move {
            while let Ok(event) = events.recv().await {
                aggregator.ingest(event);
            }
        });

        (ws_handle, tracker_handle, feed_handle)
    }

    pub fn public(&self) -> &PublicApi {
        &self.public
    }

    pub fn account(&self) -> &AccountApi {
        &self.account
    }

    pub fn trading(&self) -> &TradingApi {
        &self.trading
    }

    pub fn wallet(&self) -> &WalletApi {
        &self.wallet
    }

    pub fn aggregator(&self) -> &MarketDataAggregator {
        &self.aggregator
    }

    pub fn counters(&self) -> &Arc<Counters> {
        &self.counters
    }

    /// Returns the shared order book for `symbol`, creating it on first
    /// access.
    pub fn order_book(&self, symbol: &str) -> Arc<OrderBook> {
        self.order_books
            .entry(symbol.to_string())
            .or_insert_with(|| {
                Arc::new(OrderBook::new(symbol, self.order_book_config.max_depth, self.order_book_config.spread_change_threshold_pct))
            })
            .clone()
    }

    /// Subscribes to a streaming channel for `symbol`, wiring the incoming
    /// frames into both the returned queue and, for order book frames, the
    /// corresponding [`OrderBook`].
    pub async fn subscribe(self: &Arc<Self>, channel: Channel, symbol: &str) -> DropOldestReceiver<StreamEvent> {
        let key = SubscriptionKey::new(channel, symbol);
        if channel == Channel::OrderBook {
            let _ = self.order_book(symbol);
        }
        self.websocket.subscribe(key).await
    }

    pub fn unsubscribe(&self, channel: Channel, symbol: &str) {
        self.websocket.unsubscribe(&SubscriptionKey::new(channel, symbol));
    }

    /// Registers an order for lifecycle tracking.
    pub fn track_order(&self, order_id: impl Into<String>, symbol: impl Into<String>, account_id: impl Into<String>, initial_status: OrderStatus) {
        self.order_tracker.track(order_id, symbol, account_id, initial_status);
    }

    pub fn order_events(&self) -> broadcast::Receiver<OrderEvent> {
        self.order_tracker.events()
    }
}

/// Feeds order-book frames from a subscription into the matching
/// [`OrderBook`]; callers that subscribed via [`Client::subscribe`] with
/// `Channel::OrderBook` should drive this alongside their own consumption,
/// or simply rely on [`Client::order_book`] being kept current by calling
/// this once per received frame.
pub fn apply_order_book_frame(book: &OrderBook, event: &StreamEvent) {
    if let StreamEvent::OrderBook { update_id, is_snapshot, bids, asks, .. } = event {
        if *is_snapshot {
            book.apply_snapshot(bids.clone(), asks.clone(), *update_id);
        } else {
            book.apply_delta(*update_id, bids.clone(), asks.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::{Credential, StaticCredentialProvider};
    use crate::middleware::transport::MockTransport;

    fn client(responses: Vec<Result<crate::middleware::transport::HttpResponse, crate::middleware::transport::TransportError>>) -> Arc<Client> {
        let transport = Arc::new(MockTransport::new(responses));
        let provider = Arc::new(StaticCredentialProvider::new(Credential::new("u", "p")));
        Client::with_transport(ClientConfig::default(), provider, transport)
    }

    #[tokio::test]
    async fn order_book_lookup_creates_and_reuses_the_same_instance() {
        let client = client(vec![]);
        let a = client.order_book("BTC-BRL");
        let b = client.order_book("BTC-BRL");
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn tickers_round_trip_through_the_composed_stack() {
        let body = r#"[{"symbol":"BTC-BRL","bid":"100","ask":"101","last":"100.5","volume24h":"1","timestamp":"2026-01-01T00:00:00Z"}]"#;
        let client = client(vec![MockTransport::ok(200, body)]);
        let tickers = client.public().tickers(&["BTC-BRL".to_string()]).await.unwrap();
        assert_eq!(tickers[0].symbol, "BTC-BRL");
    }

    #[test]
    fn apply_order_book_frame_routes_snapshot_into_the_book() {
        let book = OrderBook::new("BTC-BRL", Some(50), 1.0);
        apply_order_book_frame(
            &book,
            &StreamEvent::OrderBook {
                symbol: "BTC-BRL".to_string(),
                update_id: 1,
                is_snapshot: true,
                bids: vec![crate::orderbook::Level::new(rust_decimal::Decimal::from(100), rust_decimal::Decimal::ONE)],
                asks: vec![crate::orderbook::Level::new(rust_decimal::Decimal::from(101), rust_decimal::Decimal::ONE)],
            },
        );
        assert_eq!(
            book.best_bid(),
            Some(crate::orderbook::Level::new(rust_decimal::Decimal::from(100), rust_decimal::Decimal::ONE))
        );
    }
}
