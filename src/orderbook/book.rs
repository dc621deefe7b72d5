//! Per-symbol incremental order book.
//!
//! Mutation is single-writer; the whole ladder pair is swapped atomically
//! via [`arc_swap::ArcSwap`] so readers never observe a torn snapshot of
//! the best-bid/best-ask pair. Writers are serialized; readers may observe
//! any consistent past state but never a torn one.

use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::broadcast;

use super::events::{BookEvent, UpdateKind};

/// One `(price, quantity)` level. `quantity == 0` is a delete marker inside
/// a delta; [`Level`] itself does not enforce `quantity > 0` so it can also
/// represent that marker on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Level {
    pub price: Decimal,
    pub quantity: Decimal,
}

impl Level {
    pub fn new(price: Decimal, quantity: Decimal) -> Self {
        Self { price, quantity }
    }
}

/// Which side of the book a query concerns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Bid,
    Ask,
}

struct BookState {
    /// Keyed by `Reverse(price)` so ascending key order is descending
    /// price order, the bid ladder's natural, most-aggressive-first order.
    bids: BTreeMap<Reverse<Decimal>, Decimal>,
    asks: BTreeMap<Decimal, Decimal>,
    last_update_id: u64,
    last_update_time: DateTime<Utc>,
}

impl BookState {
    fn empty() -> Self {
        Self {
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            last_update_id: 0,
            last_update_time: Utc::now(),
        }
    }

    fn best_bid(&self) -> Option<Level> {
        self.bids
            .iter()
            .next()
            .map(|(Reverse(price), qty)| Level::new(*price, *qty))
    }

    fn best_ask(&self) -> Option<Level> {
        self.asks.iter().next().map(|(price, qty)| Level::new(*price, *qty))
    }

    fn spread(&self) -> Option<Decimal> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some(ask.price - bid.price),
            _ => None,
        }
    }
}

/// Discards levels beyond `depth`, keeping the `depth` most-aggressive
/// entries for whichever key ordering `map` uses.
fn trim_depth<K: Ord + Clone, V>(map: &mut BTreeMap<K, V>, depth: Option<usize>) {
    let Some(depth) = depth else { return };
    if map.len() <= depth {
        return;
    }
    if let Some(cutoff) = map.keys().nth(depth).cloned() {
        map.split_off(&cutoff);
    }
}

/// A single symbol's sorted bid/ask ladder with snapshot+delta application
/// and derived analytics.
pub struct OrderBook {
    symbol: String,
    max_depth: Option<usize>,
    spread_change_threshold_pct: Decimal,
    state: ArcSwap<BookState>,
    events: broadcast::Sender<BookEvent>,
}

impl OrderBook {
    pub fn new(symbol: impl Into<String>, max_depth: Option<usize>, spread_change_threshold_pct: f64) -> Self {
        let (events, _rx) = broadcast::channel(64);
        Self {
            symbol: symbol.into(),
            max_depth,
            spread_change_threshold_pct: Decimal::try_from(spread_change_threshold_pct)
                .unwrap_or(Decimal::ONE),
            state: ArcSwap::from_pointee(BookState::empty()),
            events,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BookEvent> {
        self.events.subscribe()
    }

    pub fn last_update_id(&self) -> u64 {
        self.state.load().last_update_id
    }

    /// Atomically replaces both ladders. Zero-quantity entries are
    /// filtered out on the way in.
    pub fn apply_snapshot(&self, bids: Vec<Level>, asks: Vec<Level>, update_id: u64) {
        let prev_spread = self.state.load().spread();

        let mut bid_map = BTreeMap::new();
        for level in bids {
            if level.quantity > Decimal::ZERO {
                bid_map.insert(Reverse(level.price), level.quantity);
            }
        }
        let mut ask_map = BTreeMap::new();
        for level in asks {
            if level.quantity > Decimal::ZERO {
                ask_map.insert(level.price, level.quantity);
            }
        }
        trim_depth(&mut bid_map, self.max_depth);
        trim_depth(&mut ask_map, self.max_depth);

        let new_state = Arc::new(BookState {
            bids: bid_map,
            asks: ask_map,
            last_update_id: update_id,
            last_update_time: Utc::now(),
        });
        self.warn_if_crossed(&new_state);
        self.publish(UpdateKind::Snapshot, &new_state, prev_spread);
        self.state.store(new_state);
    }

    /// Applies an incremental delta. Returns `false` (no-op) if `update_id`
    /// is not newer than the last applied update.
    pub fn apply_delta(&self, update_id: u64, bids: Vec<Level>, asks: Vec<Level>) -> bool {
        let current = self.state.load_full();
        if update_id <= current.last_update_id {
            return false;
        }

        let mut bid_map = current.bids.clone();
        for level in bids {
            if level.quantity.is_zero() {
                bid_map.remove(&Reverse(level.price));
            } else {
                bid_map.insert(Reverse(level.price), level.quantity);
            }
        }
        let mut ask_map = current.asks.clone();
        for level in asks {
            if level.quantity.is_zero() {
                ask_map.remove(&level.price);
            } else {
                ask_map.insert(level.price, level.quantity);
            }
        }
        trim_depth(&mut bid_map, self.max_depth);
        trim_depth(&mut ask_map, self.max_depth);

        let new_state = Arc::new(BookState {
            bids: bid_map,
            asks: ask_map,
            last_update_id: update_id,
            last_update_time: Utc::now(),
        });
        self.warn_if_crossed(&new_state);
        self.publish(UpdateKind::Delta, &new_state, current.spread());
        self.state.store(new_state);
        true
    }

    pub fn best_bid(&self) -> Option<Level> {
        self.state.load().best_bid()
    }

    pub fn best_ask(&self) -> Option<Level> {
        self.state.load().best_ask()
    }

    pub fn spread(&self) -> Option<Decimal> {
        self.state.load().spread()
    }

    pub fn mid(&self) -> Option<Decimal> {
        let state = self.state.load();
        match (state.best_bid(), state.best_ask()) {
            (Some(bid), Some(ask)) => Some((bid.price + ask.price) / Decimal::TWO),
            _ => None,
        }
    }

    pub fn spread_pct(&self) -> Option<Decimal> {
        let state = self.state.load();
        match (state.spread(), self.mid()) {
            (Some(spread), Some(mid)) if !mid.is_zero() => Some(spread / mid * Decimal::from(100u32)),
            _ => None,
        }
    }

    pub fn top_n_bids(&self, n: usize) -> Vec<Level> {
        self.state
            .load()
            .bids
            .iter()
            .take(n)
            .map(|(Reverse(price), qty)| Level::new(*price, *qty))
            .collect()
    }

    pub fn top_n_asks(&self, n: usize) -> Vec<Level> {
        self.state
            .load()
            .asks
            .iter()
            .take(n)
            .map(|(price, qty)| Level::new(*price, *qty))
            .collect()
    }

    /// Sum of quantity across the top `depth` levels of `side`.
    pub fn total_volume(&self, side: Side, depth: usize) -> Decimal {
        match side {
            Side::Bid => self.top_n_bids(depth).iter().map(|l| l.quantity).sum(),
            Side::Ask => self.top_n_asks(depth).iter().map(|l| l.quantity).sum(),
        }
    }

    /// Volume-weighted average price to fill `quantity` against `side`.
    /// `None` if the side has no depth at all; otherwise
    /// `(average_price, filled)` with `filled <= quantity`.
    pub fn vwap(&self, side: Side, quantity: Decimal) -> Option<(Decimal, Decimal)> {
        let state = self.state.load_full();
        let mut remaining = quantity;
        let mut total_cost = Decimal::ZERO;
        let mut filled = Decimal::ZERO;
        let mut touched_any_level = false;

        macro_rules! walk {
            ($iter:expr) => {
                for (price, qty) in $iter {
                    touched_any_level = true;
                    if remaining <= Decimal::ZERO {
                        break;
                    }
                    let take = remaining.min(qty);
                    total_cost += take * price;
                    filled += take;
                    remaining -= take;
                }
            };
        }

        match side {
            Side::Bid => walk!(state.bids.iter().map(|(Reverse(p), q)| (*p, *q))),
            Side::Ask => walk!(state.asks.iter().map(|(p, q)| (*p, *q))),
        }

        if !touched_any_level || filled.is_zero() {
            return None;
        }
        Some((total_cost / filled, filled))
    }

    /// `bid_volume / (bid_volume + ask_volume)` over the top `n` levels of
    /// each side. `None` if both sides are empty.
    pub fn imbalance_ratio(&self, n: usize) -> Option<Decimal> {
        let bid_volume = self.total_volume(Side::Bid, n);
        let ask_volume = self.total_volume(Side::Ask, n);
        let total = bid_volume + ask_volume;
        if total.is_zero() {
            return None;
        }
        Some(bid_volume / total)
    }

    fn warn_if_crossed(&self, state: &BookState) {
        if let (Some(bid), Some(ask)) = (state.best_bid(), state.best_ask()) {
            if ask.price <= bid.price {
                tracing::warn!(
                    symbol = %self.symbol,
                    best_bid = %bid.price,
                    best_ask = %ask.price,
                    "order book crossed: best_ask <= best_bid"
                );
            }
        }
    }

    fn publish(&self, kind: UpdateKind, state: &Arc<BookState>, prev_spread: Option<Decimal>) {
        let bids: Vec<Level> = state
            .bids
            .iter()
            .map(|(Reverse(price), qty)| Level::new(*price, *qty))
            .collect();
        let asks: Vec<Level> = state.asks.iter().map(|(price, qty)| Level::new(*price, *qty)).collect();

        let _ = self.events.send(BookEvent::Updated {
            kind,
            update_id: state.last_update_id,
            bids,
            asks,
            timestamp: state.last_update_time,
        });

        let curr_spread = state.spread();
        if let (Some(prev), Some(curr)) = (prev_spread, curr_spread) {
            if !prev.is_zero() {
                let pct = ((curr - prev) / prev * Decimal::from(100u32)).abs();
                if pct >= self.spread_change_threshold_pct {
                    let _ = self.events.send(BookEvent::SpreadChanged {
                        previous: Some(prev),
                        current: Some(curr),
                        pct,
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn level(price: &str, qty: &str) -> Level {
        Level::new(price.parse().unwrap(), qty.parse().unwrap())
    }

    #[test]
    fn snapshot_then_empty_delta_leaves_queries_unchanged() {
        let book = OrderBook::new("BTC-BRL", None, 1.0);
        book.apply_snapshot(vec![level("100", "1"), level("99", "2")], vec![level("101", "1")], 1);
        let before = (book.best_bid(), book.best_ask());
        assert!(book.apply_delta(2, vec![], vec![]));
        assert_eq!((book.best_bid(), book.best_ask()), before);
    }

    #[test]
    fn stale_delta_is_a_no_op() {
        let book = OrderBook::new("BTC-BRL", None, 1.0);
        book.apply_snapshot(vec![level("100", "1")], vec![level("101", "1")], 10);
        assert!(!book.apply_delta(10, vec![level("100", "5")], vec![]));
        assert!(!book.apply_delta(5, vec![level("100", "5")], vec![]));
        assert_eq!(book.best_bid(), Some(level("100", "1")));
    }

    #[test]
    fn scenario_3_order_book_delta() {
        let book = OrderBook::new("BTC-BRL", None, 1.0);
        book.apply_snapshot(
            vec![level("100", "1"), level("99", "2")],
            vec![level("101", "1"), level("102", "2")],
            10,
        );
        let applied = book.apply_delta(11, vec![level("100", "0"), level("98", "3")], vec![level("101", "2")]);
        assert!(applied);

        assert_eq!(book.top_n_bids(10), vec![level("99", "2"), level("98", "3")]);
        assert_eq!(book.top_n_asks(10), vec![level("101", "2"), level("102", "2")]);
        assert_eq!(book.best_bid(), Some(level("99", "2")));
        assert_eq!(book.best_ask(), Some(level("101", "2")));
        assert_eq!(book.spread(), Some("2".parse().unwrap()));
    }

    #[test]
    fn depth_cap_trims_least_aggressive_levels() {
        let book = OrderBook::new("BTC-BRL", Some(2), 1.0);
        book.apply_snapshot(
            vec![level("100", "1"), level("99", "1"), level("98", "1")],
            vec![level("101", "1"), level("102", "1"), level("103", "1")],
            1,
        );
        assert_eq!(book.top_n_bids(10).len(), 2);
        assert_eq!(book.top_n_asks(10).len(), 2);
        assert_eq!(book.best_bid(), Some(level("100", "1")));
        assert_eq!(book.best_ask(), Some(level("101", "1")));
    }

    #[test]
    fn vwap_returns_none_when_side_has_no_depth() {
        let book = OrderBook::new("BTC-BRL", None, 1.0);
        book.apply_snapshot(vec![], vec![level("101", "1")], 1);
        assert_eq!(book.vwap(Side::Bid, "1".parse().unwrap()), None);
    }

    #[test]
    fn vwap_fills_across_multiple_levels() {
        let book = OrderBook::new("BTC-BRL", None, 1.0);
        book.apply_snapshot(vec![], vec![level("100", "1"), level("101", "2")], 1);
        let (avg_price, filled) = book.vwap(Side::Ask, "2".parse().unwrap()).unwrap();
        // 1 @ 100 + 1 @ 101 = 201 / 2 = 100.5
        assert_eq!(avg_price, "100.5".parse().unwrap());
        assert_eq!(filled, "2".parse().unwrap());
    }

    #[test]
    fn vwap_caps_filled_at_available_depth() {
        let book = OrderBook::new("BTC-BRL", None, 1.0);
        book.apply_snapshot(vec![], vec![level("100", "1")], 1);
        let (_avg, filled) = book.vwap(Side::Ask, "5".parse().unwrap()).unwrap();
        assert_eq!(filled, "1".parse().unwrap());
    }

    #[test]
    fn snapshot_round_trip_is_idempotent() {
        let book = OrderBook::new("BTC-BRL", None, 1.0);
        book.apply_snapshot(vec![level("100", "1")], vec![level("101", "1")], 1);
        let (bid, ask) = (book.best_bid(), book.best_ask());
        book.apply_snapshot(book.top_n_bids(10), book.top_n_asks(10), 2);
        assert_eq!(book.best_bid(), bid);
        assert_eq!(book.best_ask(), ask);
    }

    #[tokio::test]
    async fn spread_changed_event_fires_above_threshold() {
        let book = OrderBook::new("BTC-BRL", None, 1.0);
        let mut rx = book.subscribe();
        book.apply_snapshot(vec![level("100", "1")], vec![level("101", "1")], 1);
        let _ = rx.recv().await.unwrap(); // Updated
        book.apply_snapshot(vec![level("100", "1")], vec![level("150", "1")], 2);
        let _ = rx.recv().await.unwrap(); // Updated
        let event = rx.recv().await.unwrap();
        assert!(matches!(event, BookEvent::SpreadChanged { .. }));
    }
}
