//! Circuit breaker.
//!
//! `Closed` counts failures in a rolling sampling window; opens when
//! failures reach `minimum_throughput` and the failure ratio is `>= 0.5`.
//! `Open` fast-fails every call. After `break_duration`, exactly one probe
//! is let through in `HalfOpen`; success closes, failure re-opens.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Observable state, exposed for callers that want to display it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone, Copy)]
pub struct CircuitBreakerConfig {
    /// Minimum number of calls in the sampling window before the breaker is
    /// eligible to open.
    pub minimum_throughput: u32,
    /// Size of the rolling sampling window, in call outcomes.
    pub sampling_window: usize,
    /// Failure ratio (0.0-1.0) at or above which the breaker opens.
    pub failure_ratio_threshold: f64,
    /// How long the breaker stays `Open` before allowing a probe.
    pub break_duration: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            minimum_throughput: 4,
            sampling_window: 20,
            failure_ratio_threshold: 0.5,
            break_duration: Duration::from_secs(30),
        }
    }
}

enum InnerState {
    Closed { outcomes: VecDeque<bool> },
    Open { opened_at: Instant },
    HalfOpen { probe_in_flight: bool },
}

/// The breaker itself. Cheap to share behind an `Arc`; all mutable state
/// is behind one internal mutex.
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    state: Mutex<InnerState>,
}

/// A permit returned by [`CircuitBreaker::try_acquire`]; the caller must
/// report the outcome via [`CircuitBreaker::on_success`] /
/// [`CircuitBreaker::on_failure`] exactly once.
#[derive(Debug, Clone, Copy)]
pub struct Permit {
    was_probe: bool,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            state: Mutex::new(InnerState::Closed {
                outcomes: VecDeque::with_capacity(config.sampling_window),
            }),
        }
    }

    pub fn state(&self) -> CircuitState {
        match &*self.state.lock().unwrap() {
            InnerState::Closed { .. } => CircuitState::Closed,
            InnerState::Open { .. } => CircuitState::Open,
            InnerState::HalfOpen { .. } => CircuitState::HalfOpen,
        }
    }

    /// Attempts to acquire permission to make a call. `Open` rejects
    /// immediately; `HalfOpen` allows exactly one concurrent probe.
    pub fn try_acquire(&self) -> Result<Permit, ()> {
        let mut state = self.state.lock().unwrap();
        match &mut *state {
            InnerState::Closed { .. } => Ok(Permit { was_probe: false }),
            InnerState::Open { opened_at } => {
                if opened_at.elapsed() >= self.config.break_duration {
                    tracing::info!("circuit breaker transitioning Open -> HalfOpen");
                    *state = InnerState::HalfOpen { probe_in_flight: true };
                    Ok(Permit { was_probe: true })
                } else {
                    Err(())
                }
            }
            InnerState::HalfOpen { probe_in_flight } => {
                if *probe_in_flight {
                    Err(())
                } else {
                    *probe_in_flight = true;
                    Ok(Permit { was_probe: true })
                }
            }
        }
    }

    pub fn on_success(&self, permit: Permit) {
        let mut state = self.state.lock().unwrap();
        if permit.was_probe {
            tracing::info!("circuit breaker probe succeeded, closing");
            *state = InnerState::Closed {
                outcomes: VecDeque::with_capacity(self.config.sampling_window),
            };
            return;
        }
        if let InnerState::Closed { outcomes } = &mut *state {
            push_outcome(outcomes, true, self.config.sampling_window);
        }
    }

    pub fn on_failure(&self, permit: Permit) {
        let mut state = self.state.lock().unwrap();
        if permit.was_probe {
            tracing::warn!("circuit breaker probe failed, re-opening");
            *state = InnerState::Open {
                opened_at: Instant::now(),
            };
            return;
        }
        if let InnerState::Closed { outcomes } = &mut *state {
            push_outcome(outcomes, false, self.config.sampling_window);
            let total = outcomes.len() as u32;
            let failures = outcomes.iter().filter(|ok| !**ok).count() as u32;
            if total >= self.config.minimum_throughput
                && (failures as f64 / total as f64) >= self.config.failure_ratio_threshold
            {
                tracing::warn!(failures, total, "circuit breaker opening");
                *state = InnerState::Open {
                    opened_at: Instant::now(),
                };
            }
        }
    }

    /// Manual reset back to `Closed`, for operator/test use.
    pub fn reset(&self) {
        let mut state = self.state.lock().unwrap();
        *state = InnerState::Closed {
            outcomes: VecDeque::with_capacity(self.config.sampling_window),
        };
    }
}

fn push_outcome(outcomes: &mut VecDeque<bool>, ok: bool, window: usize) {
    outcomes.push_back(ok);
    while outcomes.len() > window {
        outcomes.pop_front();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_after_threshold_failures() {
        let breaker = CircuitBreaker::new(CircuitBreakerConfig {
            minimum_throughput: 4,
            sampling_window: 20,
            failure_ratio_threshold: 0.5,
            break_duration: Duration::from_millis(50),
        });

        for _ in 0..8 {
            let permit = breaker.try_acquire().unwrap();
            breaker.on_failure(permit);
        }
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(breaker.try_acquire().is_err());
    }

    #[test]
    fn half_open_allows_exactly_one_probe() {
        let breaker = CircuitBreaker::new(CircuitBreakerConfig {
            minimum_throughput: 1,
            sampling_window: 4,
            failure_ratio_threshold: 0.5,
            break_duration: Duration::from_millis(1),
        });
        let permit = breaker.try_acquire().unwrap();
        breaker.on_failure(permit);
        assert_eq!(breaker.state(), CircuitState::Open);

        std::thread::sleep(Duration::from_millis(5));
        let probe = breaker.try_acquire().unwrap();
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        // A second acquisition attempt while the probe is in flight fails.
        assert!(breaker.try_acquire().is_err());

        breaker.on_success(probe);
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn failed_probe_reopens() {
        let breaker = CircuitBreaker::new(CircuitBreakerConfig {
            minimum_throughput: 1,
            sampling_window: 4,
            failure_ratio_threshold: 0.5,
            break_duration: Duration::from_millis(1),
        });
        let permit = breaker.try_acquire().unwrap();
        breaker.on_failure(permit);
        std::thread::sleep(Duration::from_millis(5));
        let probe = breaker.try_acquire().unwrap();
        breaker.on_failure(probe);
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[test]
    fn below_minimum_throughput_never_opens() {
        let breaker = CircuitBreaker::new(CircuitBreakerConfig {
            minimum_throughput: 10,
            sampling_window: 20,
            failure_ratio_threshold: 0.5,
            break_duration: Duration::from_millis(1),
        });
        for _ in 0..3 {
            let permit = breaker.try_acquire().unwrap();
            breaker.on_failure(permit);
        }
        assert_eq!(breaker.state(), CircuitState::Closed);
    }
}
