//! WebSocket subscription manager.

pub mod client;
pub mod subscription;

pub use client::{ConnectionState, StreamEvent, WebSocketManager};
pub use subscription::{drop_oldest_channel, Channel, DropOldestReceiver, DropOldestSender, SubscriptionKey};
