//! Market data aggregator: per-symbol last-snapshot maps with O(1)
//! lock-free reads.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rust_decimal::Decimal;
use tokio::sync::broadcast;

use crate::websocket::StreamEvent;

/// An immutable ticker snapshot, stamped with the local receive time.
#[derive(Debug, Clone)]
pub struct TickerSnapshot {
    pub symbol: String,
    pub bid: Decimal,
    pub ask: Decimal,
    pub last: Decimal,
    pub received_at: DateTime<Utc>,
}

/// An immutable trade snapshot.
#[derive(Debug, Clone)]
pub struct TradeSnapshot {
    pub symbol: String,
    pub price: Decimal,
    pub quantity: Decimal,
    pub taker_side: String,
    pub received_at: DateTime<Utc>,
}

/// An immutable order book top-of-book snapshot, as seen by the aggregator
/// (the full ladder lives in [`crate::orderbook::OrderBook`]; the
/// aggregator only tracks what it needs for its derived helpers).
#[derive(Debug, Clone)]
pub struct BookTopSnapshot {
    pub symbol: String,
    pub best_bid: Option<Decimal>,
    pub best_ask: Option<Decimal>,
    pub received_at: DateTime<Utc>,
}

/// One update published to [`MarketDataAggregator::subscribe_updates`].
#[derive(Debug, Clone)]
pub enum AggregatorUpdate {
    Ticker(Arc<TickerSnapshot>),
    Trade(Arc<TradeSnapshot>),
    BookTop(Arc<BookTopSnapshot>),
}

/// Maintains `lastTicker`/`lastOrderBook`/`lastTrade` per symbol and
/// republishes every update on a bounded broadcast stream.
pub struct MarketDataAggregator {
    last_ticker: DashMap<String, Arc<TickerSnapshot>>,
    last_trade: DashMap<String, Arc<TradeSnapshot>>,
    last_book_top: DashMap<String, Arc<BookTopSnapshot>>,
    updates: broadcast::Sender<AggregatorUpdate>,
}

impl MarketDataAggregator {
    pub fn new(channel_capacity: usize) -> Self {
        let (updates, _) = broadcast::channel(channel_capacity.max(1));
        Self {
            last_ticker: DashMap::new(),
            last_trade: DashMap::new(),
            last_book_top: DashMap::new(),
            updates,
        }
    }

    pub fn subscribe_updates(&self) -> broadcast::Receiver<AggregatorUpdate> {
        self.updates.subscribe()
    }

    /// Feeds one streamed frame into the aggregator: stamps it, publishes
    /// it, then updates the per-symbol map. Callers observe updates via
    /// `subscribe_updates`.
    pub fn ingest(&self, event: StreamEvent) {
        let now = Utc::now();
        match event {
            StreamEvent::Ticker { symbol, bid, ask, last } => {
                let snapshot = Arc::new(TickerSnapshot {
                    symbol: symbol.clone(),
                    bid,
                    ask,
                    last,
                    received_at: now,
                });
                let _ = self.updates.send(AggregatorUpdate::Ticker(snapshot.clone()));
                self.last_ticker.insert(symbol, snapshot);
            }
            StreamEvent::Trade { symbol, price, quantity, taker_side } => {
                let snapshot = Arc::new(TradeSnapshot {
                    symbol: symbol.clone(),
                    price,
                    quantity,
                    taker_side,
                    received_at: now,
                });
                let _ = self.updates.send(AggregatorUpdate::Trade(snapshot.clone()));
                self.last_trade.insert(symbol, snapshot);
            }
            StreamEvent::OrderBook { symbol, bids, asks, .. } => {
                let snapshot = Arc::new(BookTopSnapshot {
                    symbol: symbol.clone(),
                    best_bid: bids.first().map(|l| l.price),
                    best_ask: asks.first().map(|l| l.price),
                    received_at: now,
                });
                let _ = self.updates.send(AggregatorUpdate::BookTop(snapshot.clone()));
                self.last_book_top.insert(symbol, snapshot);
            }
        }
    }

    pub fn last_ticker(&self, symbol: &str) -> Option<Arc<TickerSnapshot>> {
        self.last_ticker.get(symbol).map(|e| e.clone())
    }

    pub fn last_trade(&self, symbol: &str) -> Option<Arc<TradeSnapshot>> {
        self.last_trade.get(symbol).map(|e| e.clone())
    }

    pub fn last_book_top(&self, symbol: &str) -> Option<Arc<BookTopSnapshot>> {
        self.last_book_top.get(symbol).map(|e| e.clone())
    }

    /// `ask - bid` from the latest ticker, if one has arrived.
    pub fn spread(&self, symbol: &str) -> Option<Decimal> {
        self.last_ticker(symbol).map(|t| t.ask - t.bid)
    }

    /// `(bid + ask) / 2` from the latest ticker.
    pub fn mid_price(&self, symbol: &str) -> Option<Decimal> {
        self.last_ticker(symbol).map(|t| (t.bid + t.ask) / Decimal::TWO)
    }

    pub fn best_bid(&self, symbol: &str) -> Option<Decimal> {
        self.last_ticker(symbol).map(|t| t.bid)
    }

    pub fn best_ask(&self, symbol: &str) -> Option<Decimal> {
        self.last_ticker(symbol).map(|t| t.ask)
    }

    pub fn last_price(&self, symbol: &str) -> Option<Decimal> {
        self.last_ticker(symbol).map(|t| t.last)
    }
}
