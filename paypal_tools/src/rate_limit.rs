//! A token bucket shared by every request made through a [`crate::PayPalApi`] instance (and its clones).
//!
//! When PayPal answers `429`, the whole bucket is drained and blocked for the advertised `Retry-After` period, so the
//! back-off applies to every caller, not just the one that was rejected.
use std::{sync::Mutex, time::Duration};

use log::*;
use tokio::time::Instant;

struct BucketState {
    tokens: f64,
    last_refill: Instant,
    blocked_until: Option<Instant>,
}

pub struct RateLimiter {
    capacity: f64,
    refill_per_sec: f64,
    state: Mutex<BucketState>,
}

impl RateLimiter {
    /// Creates a full bucket holding `capacity` tokens that refills at `refill_per_sec`.
    pub fn new(capacity: u32, refill_per_sec: f64) -> Self {
        let capacity = f64::from(capacity.max(1));
        let refill_per_sec = if refill_per_sec > 0.0 { refill_per_sec } else { 1.0 };
        let state = BucketState { tokens: capacity, last_refill: Instant::now(), blocked_until: None };
        Self { capacity, refill_per_sec, state: Mutex::new(state) }
    }

    /// Waits until a token is available and takes it.
    pub async fn acquire(&self) {
        loop {
            let wait = match self.try_take() {
                None => return,
                Some(wait) => wait,
            };
            trace!("⏳️ Rate limiter is empty. Waiting {}ms", wait.as_millis());
            tokio::time::sleep(wait).await;
        }
    }

    /// Takes a token if one is available, otherwise returns how long to wait before trying again.
    fn try_take(&self) -> Option<Duration> {
        let now = Instant::now();
        let mut state = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(until) = state.blocked_until {
            if until > now {
                return Some(until - now);
            }
            state.blocked_until = None;
        }
        let elapsed = now.saturating_duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        state.last_refill = now;
        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            None
        } else {
            let deficit = 1.0 - state.tokens;
            Some(Duration::from_secs_f64(deficit / self.refill_per_sec))
        }
    }

    /// Drains the bucket and blocks all callers for `retry_after`.
    pub fn back_off(&self, retry_after: Duration) {
        let until = Instant::now() + retry_after;
        let mut state = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        state.tokens = 0.0;
        state.blocked_until = Some(state.blocked_until.map_or(until, |current| current.max(until)));
        warn!("⏳️ PayPal rate limit hit. All gateway calls are paused for {}ms", retry_after.as_millis());
    }

    pub fn available(&self) -> f64 {
        match self.state.lock() {
            Ok(guard) => guard.tokens,
            Err(poisoned) => poisoned.into_inner().tokens,
        }
    }
}
