//! Order lifecycle tracker: a single poller with adaptive per-order
//! backoff.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use tokio::sync::broadcast;
use tokio::time::Instant;

use crate::config::OrderTrackerConfig;
use crate::error::Error;

/// Internal order status enum, mapped from the REST `/order/{id}` payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderStatus {
    Pending,
    Open,
    PartiallyFilled,
    Filled,
    Cancelled,
    Rejected,
    Expired,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Filled | OrderStatus::Cancelled | OrderStatus::Rejected | OrderStatus::Expired
        )
    }

    /// Position in the forward lifecycle ordering (`Pending` < `Open` <
    /// `PartiallyFilled` < any terminal state). Used to discard a wire
    /// status that would move an order backward.
    fn rank(&self) -> u8 {
        match self {
            OrderStatus::Pending => 0,
            OrderStatus::Open => 1,
            OrderStatus::PartiallyFilled => 2,
            OrderStatus::Filled | OrderStatus::Cancelled | OrderStatus::Rejected | OrderStatus::Expired => 3,
        }
    }

    /// Maps the REST `/order/{id}` status string onto the internal enum.
    /// Unrecognized strings are treated as `Pending` rather than failing
    /// the poll outright.
    pub fn from_wire(status: &str) -> Self {
        match status {
            "open" => OrderStatus::Open,
            "partially_filled" | "partiallyFilled" => OrderStatus::PartiallyFilled,
            "filled" => OrderStatus::Filled,
            "cancelled" | "canceled" => OrderStatus::Cancelled,
            "rejected" => OrderStatus::Rejected,
            "expired" => OrderStatus::Expired,
            _ => OrderStatus::Pending,
        }
    }
}

/// What a status refresh returns.
#[derive(Debug, Clone)]
pub struct OrderStatusPayload {
    pub status: OrderStatus,
    pub filled_quantity: Decimal,
    pub average_price: Option<Decimal>,
    pub cancel_reason: Option<String>,
}

/// Refreshes one order's status from the exchange. Implemented by the REST
/// account surface; kept as a trait here so the tracker has no dependency
/// on the concrete HTTP client.
#[async_trait]
pub trait OrderStatusSource: Send + Sync {
    async fn fetch_status(&self, order_id: &str, symbol: &str, account_id: &str) -> Result<OrderStatusPayload, Error>;
}

/// Events the tracker emits as it observes an order.
#[derive(Debug, Clone)]
pub enum OrderEvent {
    StatusChanged {
        order_id: String,
        previous: OrderStatus,
        current: OrderStatus,
    },
    Filled {
        order_id: String,
        quantity: Decimal,
        price: Decimal,
    },
    Cancelled {
        order_id: String,
        reason: Option<String>,
    },
    TrackingError {
        order_id: String,
        error: String,
    },
}

struct TrackedOrder {
    symbol: String,
    account_id: String,
    status: OrderStatus,
    registered_at: Instant,
    last_checked: Instant,
    next_poll_delay: Duration,
    consecutive_unchanged: u32,
    retained_since: Option<Instant>,
}

/// Tracks a set of live orders, polling each on an adaptive schedule and
/// retiring terminal orders after `completed_order_retention`.
pub struct OrderTracker {
    config: OrderTrackerConfig,
    source: Arc<dyn OrderStatusSource>,
    orders: StdMutex<HashMap<String, TrackedOrder>>,
    events: broadcast::Sender<OrderEvent>,
}

impl OrderTracker {
    pub fn new(source: Arc<dyn OrderStatusSource>, config: OrderTrackerConfig) -> Arc<Self> {
        let (events, _) = broadcast::channel(256);
        Arc::new(Self {
            config,
            source,
            orders: StdMutex::new(HashMap::new()),
            events,
        })
    }

    pub fn events(&self) -> broadcast::Receiver<OrderEvent> {
        self.events.subscribe()
    }

    /// Registers an order for tracking.
    pub fn track(&self, order_id: impl Into<String>, symbol: impl Into<String>, account_id: impl Into<String>, initial_status: OrderStatus) {
        let now = Instant::now();
        let retained_since = if initial_status.is_terminal() { Some(now) } else { None };
        self.orders.lock().unwrap().insert(
            order_id.into(),
            TrackedOrder {
                symbol: symbol.into(),
                account_id: account_id.into(),
                status: initial_status,
                registered_at: now,
                last_checked: now,
                next_poll_delay: self.config.min_poll_interval,
                consecutive_unchanged: 0,
                retained_since,
            },
        );
    }

    pub fn status(&self, order_id: &str) -> Option<OrderStatus> {
        self.orders.lock().unwrap().get(order_id).map(|o| o.status)
    }

    pub fn tracked_count(&self) -> usize {
        self.orders.lock().unwrap().len()
    }

    /// Runs the poller forever at `polling_interval`. Intended to be
    /// spawned as a background task by the facade.
    pub async fn run(self: Arc<Self>) {
        loop {
            tokio::time::sleep(self.config.polling_interval).await;
            self.poll_due().await;
        }
    }

    /// One scan: refreshes every order whose adaptive backoff has elapsed,
    /// expires orders that exceeded `tracking_timeout`, and evicts terminal
    /// orders past `completed_order_retention`. Exposed directly so tests
    /// can drive it without a real sleep loop.
    pub async fn poll_due(&self) {
        let now = Instant::now();

        let due: Vec<String> = {
            let orders = self.orders.lock().unwrap();
            orders
                .iter()
                .filter(|(_, o)| !o.status.is_terminal() && now.duration_since(o.last_checked) >= o.next_poll_delay)
                .map(|(id, _)| id.clone())
                .collect()
        };

        for order_id in due {
            let (symbol, account_id, timed_out) = {
                let orders = self.orders.lock().unwrap();
                let Some(o) = orders.get(&order_id) else { continue };
                (o.symbol.clone(), o.account_id.clone(), now.duration_since(o.registered_at) >= self.config.tracking_timeout)
            };

            if timed_out {
                self.transition(&order_id, OrderStatus::Expired, Decimal::ZERO, None, None);
                continue;
            }

            match self.source.fetch_status(&order_id, &symbol, &account_id).await {
                Ok(payload) => self.apply(&order_id, payload),
                Err(e) => {
                    self.record_poll(&order_id);
                    let _ = self.events.send(OrderEvent::TrackingError {
                        order_id: order_id.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        self.evict_retained(now);
    }

    fn apply(&self, order_id: &str, payload: OrderStatusPayload) {
        let previous = {
            let orders = self.orders.lock().unwrap();
            orders.get(order_id).map(|o| o.status)
        };
        let Some(previous) = previous else { return };

        if payload.status == previous {
            self.record_poll(order_id);
            return;
        }

        if payload.status.rank() < previous.rank() {
            self.record_poll(order_id);
            return;
        }

        self.transition(order_id, payload.status, payload.filled_quantity, payload.average_price, payload.cancel_reason);
    }

    fn transition(
        &self,
        order_id: &str,
        new_status: OrderStatus,
        filled_quantity: Decimal,
        average_price: Option<Decimal>,
        cancel_reason: Option<String>,
    ) {
        let previous = {
            let mut orders = self.orders.lock().unwrap();
            let Some(order) = orders.get_mut(order_id) else { return };
            let previous = order.status;
            order.status = new_status;
            order.last_checked = Instant::now();
            order.consecutive_unchanged = 0;
            order.next_poll_delay = self.config.min_poll_interval;
            if new_status.is_terminal() {
                order.retained_since = Some(Instant::now());
            }
            previous
        };

        let _ = self.events.send(OrderEvent::StatusChanged {
            order_id: order_id.to_string(),
            previous,
            current: new_status,
        });

        match new_status {
            OrderStatus::Filled => {
                let _ = self.events.send(OrderEvent::Filled {
                    order_id: order_id.to_string(),
                    quantity: filled_quantity,
                    price: average_price.unwrap_or(Decimal::ZERO),
                });
            }
            OrderStatus::Cancelled => {
                let _ = self.events.send(OrderEvent::Cancelled {
                    order_id: order_id.to_string(),
                    reason: cancel_reason,
                });
            }
            _ => {}
        }
    }

    fn record_poll(&self, order_id: &str) {
        let mut orders = self.orders.lock().unwrap();
        if let Some(order) = orders.get_mut(order_id) {
            order.last_checked = Instant::now();
            order.consecutive_unchanged += 1;
            let scaled = self.config.min_poll_interval.as_secs_f64() * 2f64.powi(order.consecutive_unchanged as i32);
            order.next_poll_delay = Duration::from_secs_f64(scaled).min(self.config.max_poll_interval);
        }
    }

    fn evict_retained(&self, now: Instant) {
        let mut orders = self.orders.lock().unwrap();
        orders.retain(|_, o| match o.retained_since {
            Some(since) => now.duration_since(since) < self.config.completed_order_retention,
            None => true,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn from_wire_maps_known_statuses() {
        assert_eq!(OrderStatus::from_wire("filled"), OrderStatus::Filled);
        assert_eq!(OrderStatus::from_wire("partiallyFilled"), OrderStatus::PartiallyFilled);
        assert_eq!(OrderStatus::from_wire("canceled"), OrderStatus::Cancelled);
        assert_eq!(OrderStatus::from_wire("unknown-status"), OrderStatus::Pending);
    }

    struct ScriptedSource {
        responses: Vec<OrderStatusPayload>,
        call_count: AtomicUsize,
    }

    #[async_trait]
    impl OrderStatusSource for ScriptedSource {
        async fn fetch_status(&self, _order_id: &str, _symbol: &str, _account_id: &str) -> Result<OrderStatusPayload, Error> {
            let idx = self.call_count.fetch_add(1, Ordering::SeqCst);
            Ok(self.responses[idx.min(self.responses.len() - 1)].clone())
        }
    }

    fn config() -> OrderTrackerConfig {
        OrderTrackerConfig {
            polling_interval: Duration::from_millis(1),
            min_poll_interval: Duration::from_millis(1),
            max_poll_interval: Duration::from_millis(10),
            completed_order_retention: Duration::from_millis(50),
            tracking_timeout: Duration::from_secs(3600),
        }
    }

    #[tokio::test]
    async fn status_change_to_filled_emits_status_changed_and_filled() {
        let source = Arc::new(ScriptedSource {
            responses: vec![OrderStatusPayload {
                status: OrderStatus::Filled,
                filled_quantity: Decimal::ONE,
                average_price: Some(Decimal::from(100)),
                cancel_reason: None,
            }],
            call_count: AtomicUsize::new(0),
        });
        let tracker = OrderTracker::new(source, config());
        let mut events = tracker.events();
        tracker.track("o1", "BTC-BRL", "acct1", OrderStatus::Open);

        tracker.poll_due().await;

        let first = events.recv().await.unwrap();
        assert!(matches!(first, OrderEvent::StatusChanged { current: OrderStatus::Filled, .. }));
        let second = events.recv().await.unwrap();
        assert!(matches!(second, OrderEvent::Filled { .. }));
        assert_eq!(tracker.status("o1"), Some(OrderStatus::Filled));
    }

    #[tokio::test]
    async fn unchanged_status_does_not_emit_event() {
        let source = Arc::new(ScriptedSource {
            responses: vec![OrderStatusPayload {
                status: OrderStatus::Open,
                filled_quantity: Decimal::ZERO,
                average_price: None,
                cancel_reason: None,
            }],
            call_count: AtomicUsize::new(0),
        });
        let tracker = OrderTracker::new(source, config());
        let mut events = tracker.events();
        tracker.track("o1", "BTC-BRL", "acct1", OrderStatus::Open);

        tracker.poll_due().await;
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn backward_status_is_discarded_without_emitting_an_event() {
        let source = Arc::new(ScriptedSource {
            responses: vec![OrderStatusPayload {
                status: OrderStatus::Open,
                filled_quantity: Decimal::ZERO,
                average_price: None,
                cancel_reason: None,
            }],
            call_count: AtomicUsize::new(0),
        });
        let tracker = OrderTracker::new(source, config());
        let mut events = tracker.events();
        tracker.track("o1", "BTC-BRL", "acct1", OrderStatus::PartiallyFilled);

        tracker.poll_due().await;

        assert!(events.try_recv().is_err());
        assert_eq!(tracker.status("o1"), Some(OrderStatus::PartiallyFilled));
    }

    #[tokio::test]
    async fn tracking_timeout_expires_order_without_fetch() {
        let source = Arc::new(ScriptedSource {
            responses: vec![OrderStatusPayload {
                status: OrderStatus::Open,
                filled_quantity: Decimal::ZERO,
                average_price: None,
                cancel_reason: None,
            }],
            call_count: AtomicUsize::new(0),
        });
        let mut cfg = config();
        cfg.tracking_timeout = Duration::ZERO;
        let tracker = OrderTracker::new(source.clone(), cfg);
        tracker.track("o1", "BTC-BRL", "acct1", OrderStatus::Open);

        tracker.poll_due().await;

        assert_eq!(tracker.status("o1"), Some(OrderStatus::Expired));
        assert_eq!(source.call_count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn terminal_order_is_evicted_after_retention() {
        let source = Arc::new(ScriptedSource {
            responses: vec![OrderStatusPayload {
                status: OrderStatus::Cancelled,
                filled_quantity: Decimal::ZERO,
                average_price: None,
                cancel_reason: Some("user".to_string()),
            }],
            call_count: AtomicUsize::new(0),
        });
        let mut cfg = config();
        cfg.completed_order_retention = Duration::ZERO;
        let tracker = OrderTracker::new(source, cfg);
        tracker.track("o1", "BTC-BRL", "acct1", OrderStatus::Open);

        tracker.poll_due().await;
        assert_eq!(tracker.tracked_count(), 0);
    }
}
