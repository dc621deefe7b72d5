//! Subscriptions and the bounded `DropOldest` channel their consumers read
//! from.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tokio::sync::Notify;

/// A streamed channel kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Ticker,
    Trade,
    #[serde(rename = "orderbook")]
    OrderBook,
}

/// `(channel, symbol)`, the unit of subscription.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionKey {
    pub channel: Channel,
    pub symbol: String,
}

impl SubscriptionKey {
    pub fn new(channel: Channel, symbol: impl Into<String>) -> Self {
        Self {
            channel,
            symbol: symbol.into(),
        }
    }
}

struct Shared<T> {
    queue: Mutex<VecDeque<T>>,
    capacity: usize,
    notify: Notify,
    closed: AtomicBool,
}

/// The writer half of a bounded channel that drops the *oldest* buffered
/// item on overflow rather than blocking or erroring on a slow consumer.
pub struct DropOldestSender<T> {
    inner: Arc<Shared<T>>,
}

/// The reader half; `recv` suspends until an item is available or the
/// sender is dropped.
pub struct DropOldestReceiver<T> {
    inner: Arc<Shared<T>>,
}

/// Builds a bounded `DropOldest` channel of the given capacity.
pub fn drop_oldest_channel<T>(capacity: usize) -> (DropOldestSender<T>, DropOldestReceiver<T>) {
    let shared = Arc::new(Shared {
        queue: Mutex::new(VecDeque::with_capacity(capacity)),
        capacity: capacity.max(1),
        notify: Notify::new(),
        closed: AtomicBool::new(false),
    });
    (
        DropOldestSender { inner: shared.clone() },
        DropOldestReceiver { inner: shared },
    )
}

impl<T> DropOldestSender<T> {
    /// Pushes `item`, dropping the oldest buffered entry if the channel is
    /// already at capacity.
    pub fn send(&self, item: T) {
        let mut queue = self.inner.queue.lock().unwrap();
        if queue.len() >= self.inner.capacity {
            queue.pop_front();
        }
        queue.push_back(item);
        drop(queue);
        self.inner.notify.notify_one();
    }
}

impl<T> Clone for DropOldestSender<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Drop for DropOldestSender<T> {
    fn drop(&mut self) {
        // Only the manager holds a sender per subscription, so a drop means
        // the subscription is being torn down.
        if Arc::strong_count(&self.inner) == 1 {
            self.inner.closed.store(true, Ordering::SeqCst);
            self.inner.notify.notify_waiters();
        }
    }
}

impl<T> DropOldestReceiver<T> {
    /// Awaits the next item, or `None` once the sender side has been
    /// dropped and the buffer has drained.
    pub async fn recv(&mut self) -> Option<T> {
        loop {
            {
                let mut queue = self.inner.queue.lock().unwrap();
                if let Some(item) = queue.pop_front() {
                    return Some(item);
                }
                if self.inner.closed.load(Ordering::SeqCst) {
                    return None;
                }
            }
            self.inner.notify.notified().await;
        }
    }
}
