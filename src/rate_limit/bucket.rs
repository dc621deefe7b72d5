//! Token-bucket primitive shared by the three per-second scopes.

use std::sync::Mutex;
use std::time::{Duration, Instant};

/// A token bucket that refills to `capacity` once every `refill_interval`.
///
/// This is a "refill to full" bucket, not a steady trickle.
pub struct TokenBucket {
    capacity: u32,
    refill_interval: Duration,
    state: Mutex<BucketState>,
}

struct BucketState {
    tokens: u32,
    last_refill: Instant,
}

impl TokenBucket {
    pub fn new(capacity: u32, refill_interval: Duration) -> Self {
        Self {
            capacity,
            refill_interval,
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    fn refill_if_due(&self, state: &mut BucketState, now: Instant) {
        if now.duration_since(state.last_refill) >= self.refill_interval {
            state.tokens = self.capacity;
            state.last_refill = now;
        }
    }

    /// Non-blocking: consumes a token if available, returns whether it did.
    pub fn try_acquire(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        self.refill_if_due(&mut state, Instant::now());
        if state.tokens > 0 {
            state.tokens -= 1;
            true
        } else {
            false
        }
    }

    /// Number of tokens currently available, for diagnostics.
    pub fn available(&self) -> u32 {
        let mut state = self.state.lock().unwrap();
        self.refill_if_due(&mut state, Instant::now());
        state.tokens
    }

    /// How long until the next refill, for the blocking variant's sleep.
    pub fn time_to_refill(&self) -> Duration {
        let state = self.state.lock().unwrap();
        let elapsed = Instant::now().duration_since(state.last_refill);
        self.refill_interval.saturating_sub(elapsed)
    }
}
