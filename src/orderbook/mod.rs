//! Incremental order book engine.

pub mod book;
pub mod events;

pub use book::{Level, OrderBook, Side};
pub use events::{BookEvent, UpdateKind};
