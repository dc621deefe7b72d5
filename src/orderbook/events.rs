//! Order book notifications.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use super::book::Level;

/// What kind of mutation produced an [`BookEvent::Updated`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateKind {
    Snapshot,
    Delta,
}

/// Notifications a symbol's [`super::book::OrderBook`] publishes after each
/// mutation. Events are a convenience layered over the broadcast channel;
/// callers equally happy with polling the latest state can ignore this and
/// just call the book's accessor methods.
#[derive(Debug, Clone)]
pub enum BookEvent {
    /// A snapshot or delta was applied.
    Updated {
        kind: UpdateKind,
        update_id: u64,
        bids: Vec<Level>,
        asks: Vec<Level>,
        timestamp: DateTime<Utc>,
    },
    /// The spread moved by at least the configured threshold percentage.
    SpreadChanged {
        previous: Option<Decimal>,
        current: Option<Decimal>,
        pct: Decimal,
    },
}
